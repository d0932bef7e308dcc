use crate::error::ReadError;
use crate::transform::FinalImage;

/// What the decoded texture will be used for. UI textures always end up
/// 4-channel; world textures keep single-channel masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetUsage {
    #[default]
    Ui,
    World,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub usage: TargetUsage,
    pub percent_size_x: u32,
    pub percent_size_y: u32,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            usage: TargetUsage::Ui,
            percent_size_x: 100,
            percent_size_y: 100,
        }
    }
}

impl TransformParams {
    /// True when a resize should actually run: both percentages strictly
    /// inside (0, 100).
    pub fn is_percent_size_valid(&self) -> bool {
        self.percent_size_x > 0
            && self.percent_size_x < 100
            && self.percent_size_y > 0
            && self.percent_size_y < 100
    }

    /// Percentages are accepted either as the 100/100 no-op or as a real
    /// downscale; everything else is rejected before any decode work runs.
    pub fn validate(&self) -> Result<(), ReadError> {
        let no_op = self.percent_size_x == 100 && self.percent_size_y == 100;
        if no_op || self.is_percent_size_valid() {
            Ok(())
        } else {
            Err(ReadError::InvalidTransformParams {
                x: self.percent_size_x,
                y: self.percent_size_y,
            })
        }
    }
}

/// One image to load. Immutable once submitted; consumed exactly once by the
/// worker.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub source_id: String,
    pub transform: TransformParams,
}

impl ReadRequest {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            transform: TransformParams::default(),
        }
    }

    pub fn with_transform(source_id: impl Into<String>, transform: TransformParams) -> Self {
        Self {
            source_id: source_id.into(),
            transform,
        }
    }
}

/// A decoded image travelling from the worker to the main thread. Ownership
/// of the pixel buffer moves with it.
#[derive(Debug)]
pub struct ConstructTask {
    pub source_id: String,
    pub image: FinalImage,
}

/// Outcome of one request: a texture handle or an error string, never both.
#[derive(Debug)]
pub struct ReadResult<H> {
    pub source_id: String,
    pub texture: Option<H>,
    pub error: Option<String>,
}

impl<H> ReadResult<H> {
    pub(crate) fn success(source_id: String, texture: H) -> Self {
        Self {
            source_id,
            texture: Some(texture),
            error: None,
        }
    }

    pub(crate) fn failure(source_id: String, error: String) -> Self {
        Self {
            source_id,
            texture: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.texture.is_some()
    }
}
