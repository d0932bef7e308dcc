//! The dedicated decode thread: request in, construct task out, one at a
//! time, acknowledged by the main thread before the next decode begins.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, select};
use tracing::{debug, warn};

use crate::decode::{DecodeLimits, decode_image};
use crate::error::ReadError;
use crate::events::{ConstructTask, ReadRequest, ReadResult};
use crate::reader::{ResultStore, WorkTracker};
use crate::source::ImageSource;
use crate::transform::{FinalImage, apply_transform};

enum Flow {
    Continue,
    Exit,
}

pub(crate) struct Worker<H> {
    pub(crate) requests: Receiver<ReadRequest>,
    pub(crate) shutdown: Receiver<()>,
    pub(crate) construct_tx: Sender<ConstructTask>,
    pub(crate) ack_rx: Receiver<()>,
    pub(crate) source: Arc<dyn ImageSource>,
    pub(crate) limits: DecodeLimits,
    pub(crate) results: Arc<ResultStore<H>>,
    pub(crate) tracker: Arc<WorkTracker>,
}

impl<H: Send + 'static> Worker<H> {
    /// Loop until shutdown is observed at a suspension point. Remaining
    /// queued requests are abandoned, not drained.
    pub(crate) fn run(self) {
        debug!("image worker started");
        loop {
            let request = select! {
                recv(self.requests) -> msg => match msg {
                    Ok(request) => request,
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => break,
            };

            match self.process(request) {
                Flow::Continue => {}
                Flow::Exit => break,
            }
        }
        debug!("image worker exited");
    }

    fn process(&self, request: ReadRequest) -> Flow {
        debug!(source_id = %request.source_id, "decoding");
        match self.load(&request) {
            Ok(image) => self.publish(request.source_id, image),
            Err(err) => {
                warn!(source_id = %request.source_id, error = %err, "image read failed");
                // No GPU step is meaningful for a failed decode: the result
                // bypasses the construct handoff entirely.
                self.results
                    .push(ReadResult::failure(request.source_id, err.to_string()));
                self.tracker.finish_one();
                Flow::Continue
            }
        }
    }

    fn load(&self, request: &ReadRequest) -> Result<FinalImage, ReadError> {
        request.transform.validate()?;
        let source = self.source.read(&request.source_id)?;
        let mut raw = decode_image(&source.bytes, &self.limits)?;
        raw.modified_at = source.modified_at;
        apply_transform(raw, &request.transform)
    }

    /// Hand the image to the main thread and wait for the acknowledgment.
    /// This is the backpressure point: no further request is dequeued until
    /// the previous texture exists (or shutdown discards it).
    fn publish(&self, source_id: String, image: FinalImage) -> Flow {
        let task = ConstructTask { source_id, image };
        if self.construct_tx.send(task).is_err() {
            return Flow::Exit;
        }
        select! {
            recv(self.ack_rx) -> msg => match msg {
                Ok(()) => Flow::Continue,
                Err(_) => Flow::Exit,
            },
            recv(self.shutdown) -> _ => Flow::Exit,
        }
    }
}
