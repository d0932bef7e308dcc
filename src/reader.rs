//! Pipeline orchestrator: owns the channels, the worker thread, and the
//! main-thread construction step.
//!
//! Two threads touch this state: the dedicated worker and the host's main
//! thread. Requests flow through an unbounded MPSC channel; decoded images
//! come back through a single-slot handoff that is acknowledged only after
//! the texture exists, so at most one decoded image is ever buffered.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::decode::DecodeLimits;
use crate::events::{ConstructTask, ReadRequest, ReadResult};
use crate::gpu::TextureCreator;
use crate::source::ImageSource;
use crate::worker::Worker;

/// Lifecycle of one reader. Transitions only move forward; `Running` is
/// re-entrant across any number of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Stopping,
    Stopped,
}

pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> PipelineState {
        match self.0.load(Ordering::Acquire) {
            0 => PipelineState::Running,
            1 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }

    fn store(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Count of accepted-but-unresolved requests. Incremented at submit,
/// decremented when a result is published, cleared when shutdown discards
/// work. `flush` parks on the condvar; `is_idle` reads the count.
pub(crate) struct WorkTracker {
    pending: Mutex<usize>,
    idle: Condvar,
}

impl WorkTracker {
    fn new() -> Self {
        Self {
            pending: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    pub(crate) fn start_one(&self) {
        let mut pending = self.pending.lock().expect("work tracker poisoned");
        *pending += 1;
    }

    pub(crate) fn finish_one(&self) {
        let mut pending = self.pending.lock().expect("work tracker poisoned");
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn reset(&self) {
        let mut pending = self.pending.lock().expect("work tracker poisoned");
        *pending = 0;
        self.idle.notify_all();
    }

    fn is_idle(&self) -> bool {
        *self.pending.lock().expect("work tracker poisoned") == 0
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().expect("work tracker poisoned");
        if *pending == 0 {
            return true;
        }
        let (pending, _) = self
            .idle
            .wait_timeout(pending, timeout)
            .expect("work tracker poisoned");
        *pending == 0
    }
}

/// Completed results awaiting `poll`. Locked because the worker publishes
/// decode failures directly from its own thread.
pub(crate) struct ResultStore<H> {
    inner: Mutex<VecDeque<ReadResult<H>>>,
}

impl<H> ResultStore<H> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push(&self, result: ReadResult<H>) {
        self.inner
            .lock()
            .expect("result store poisoned")
            .push_back(result);
    }

    fn pop(&self) -> Option<ReadResult<H>> {
        self.inner.lock().expect("result store poisoned").pop_front()
    }

    fn clear(&self) -> usize {
        let mut inner = self.inner.lock().expect("result store poisoned");
        let discarded = inner.len();
        inner.clear();
        discarded
    }
}

/// Cheap cloneable producer handle; hand one to every thread that submits
/// requests.
#[derive(Clone)]
pub struct RequestSubmitter {
    requests_tx: Sender<ReadRequest>,
    state: Arc<SharedState>,
    tracker: Arc<WorkTracker>,
}

impl RequestSubmitter {
    pub fn submit(&self, request: ReadRequest) {
        submit_request(&self.requests_tx, &self.state, &self.tracker, request);
    }
}

fn submit_request(
    requests_tx: &Sender<ReadRequest>,
    state: &SharedState,
    tracker: &WorkTracker,
    request: ReadRequest,
) {
    if state.load() != PipelineState::Running {
        debug!(source_id = %request.source_id, "request ignored; reader is shutting down");
        return;
    }
    tracker.start_one();
    if requests_tx.send(request).is_err() {
        // Worker already gone; nothing will resolve this request.
        tracker.finish_one();
    }
}

/// The public pipeline. `initialize` returns a running reader; the host calls
/// `drain` once per tick and `poll` to claim results, both from the thread
/// that owns the texture creator.
pub struct ImageReader<C: TextureCreator> {
    creator: C,
    requests_tx: Sender<ReadRequest>,
    shutdown_tx: Sender<()>,
    construct_rx: Receiver<ConstructTask>,
    ack_tx: Sender<()>,
    results: Arc<ResultStore<C::Handle>>,
    tracker: Arc<WorkTracker>,
    state: Arc<SharedState>,
    worker: Option<JoinHandle<()>>,
    construct_budget: usize,
    flush_poll_interval: Duration,
}

impl<C: TextureCreator> ImageReader<C> {
    /// Validate the config, wire the channels, spawn the worker, and enter
    /// `Running`.
    pub fn initialize(
        config: &ReaderConfig,
        source: Arc<dyn ImageSource>,
        creator: C,
    ) -> Result<Self> {
        config.validate().context("validating reader configuration")?;

        let (requests_tx, requests_rx) = unbounded::<ReadRequest>();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        // Single-slot handoff plus its acknowledgment: the backpressure pair.
        let (construct_tx, construct_rx) = bounded::<ConstructTask>(1);
        let (ack_tx, ack_rx) = bounded::<()>(1);

        let results = Arc::new(ResultStore::new());
        let tracker = Arc::new(WorkTracker::new());
        let state = Arc::new(SharedState::new(PipelineState::Running));

        let worker = Worker {
            requests: requests_rx,
            shutdown: shutdown_rx,
            construct_tx,
            ack_rx,
            source,
            limits: DecodeLimits::from(config),
            results: results.clone(),
            tracker: tracker.clone(),
        };
        let worker = std::thread::Builder::new()
            .name("texture-reader".to_string())
            .spawn(move || worker.run())
            .context("spawning image worker thread")?;

        info!("image reader initialized");
        Ok(Self {
            creator,
            requests_tx,
            shutdown_tx,
            construct_rx,
            ack_tx,
            results,
            tracker,
            state,
            worker: Some(worker),
            construct_budget: config.construct_budget_per_tick,
            flush_poll_interval: config.flush_poll_interval,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state.load()
    }

    /// Enqueue a request. Non-blocking; wakes the worker if it is idle.
    /// Silently ignored once shutdown has begun.
    pub fn submit(&self, request: ReadRequest) {
        submit_request(&self.requests_tx, &self.state, &self.tracker, request);
    }

    /// Producer handle for other threads.
    pub fn submitter(&self) -> RequestSubmitter {
        RequestSubmitter {
            requests_tx: self.requests_tx.clone(),
            state: self.state.clone(),
            tracker: self.tracker.clone(),
        }
    }

    /// Claim one completed result, oldest first. Main-thread companion of
    /// `drain`.
    pub fn poll(&mut self) -> Option<ReadResult<C::Handle>> {
        self.results.pop()
    }

    /// Discard all unclaimed results, dropping their texture handles.
    pub fn clear(&mut self) {
        let discarded = self.results.clear();
        if discarded > 0 {
            debug!(discarded, "cleared unclaimed read results");
        }
    }

    /// One construction pass. Called by the host once per tick on the thread
    /// that owns the texture creator; never blocks. Consumes at most
    /// `construct-budget-per-tick` tasks (default 1) to keep per-tick cost
    /// bounded.
    pub fn drain(&mut self) {
        for _ in 0..self.construct_budget {
            let Ok(task) = self.construct_rx.try_recv() else {
                return;
            };
            let ConstructTask { source_id, image } = task;

            let result = match self.creator.create_texture(&source_id, &image) {
                Ok(handle) => {
                    debug!(
                        source_id = %source_id,
                        width = image.width,
                        height = image.height,
                        "texture constructed"
                    );
                    ReadResult::success(source_id, handle)
                }
                Err(err) => {
                    warn!(source_id = %source_id, error = %err, "texture creation failed");
                    ReadResult::failure(source_id, err.to_string())
                }
            };

            self.results.push(result);
            self.tracker.finish_one();
            // Pixel buffer is released before the worker is allowed to decode
            // the next image.
            drop(image);
            let _ = self.ack_tx.send(());
        }
    }

    /// True when both channels are empty and no task is in flight. Unclaimed
    /// results do not count against idleness.
    pub fn is_idle(&self) -> bool {
        self.tracker.is_idle()
    }

    /// Block until every accepted request has resolved into a result.
    ///
    /// Texture construction is a main-thread duty, so flush pumps `drain`
    /// itself while it waits; call it from the thread that drives `drain`.
    /// Returns immediately once shutdown has begun.
    pub fn flush(&mut self) {
        while self.state.load() == PipelineState::Running {
            self.drain();
            if self.tracker.is_idle() {
                return;
            }
            // Worker death with an empty handoff means nothing can resolve.
            if self.worker.as_ref().is_none_or(JoinHandle::is_finished)
                && self.construct_rx.is_empty()
            {
                warn!("flush aborted; worker exited with requests unresolved");
                return;
            }
            self.tracker.wait_idle(self.flush_poll_interval);
        }
    }

    /// Stop the worker, discard queued and in-flight work, release held
    /// buffers, and enter `Stopped`. Idempotent; requests dropped here never
    /// produce a result.
    pub fn shutdown(&mut self) {
        match self.state.load() {
            PipelineState::Stopped => return,
            _ => self.state.store(PipelineState::Stopping),
        }
        info!("image reader shutting down");

        // Wakes the worker at either suspension point.
        let _ = self.shutdown_tx.try_send(());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("image worker panicked during shutdown");
            }
        }

        // Unconsumed handoff entries are dropped, releasing their buffers.
        while let Ok(task) = self.construct_rx.try_recv() {
            debug!(source_id = %task.source_id, "discarding unconsumed construct task");
        }

        self.tracker.reset();
        self.state.store(PipelineState::Stopped);
        info!("image reader stopped");
    }
}

impl<C: TextureCreator> Drop for ImageReader<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
