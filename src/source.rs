use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use crate::error::ReadError;

/// Raw file contents plus the timestamp carried into the decoded image.
#[derive(Debug, Clone)]
pub struct SourceBytes {
    pub bytes: Vec<u8>,
    pub modified_at: Option<SystemTime>,
}

/// Where request bytes come from. The worker only ever sees this seam, so
/// tests can feed in-memory fixtures and hosts can plug in pak files or
/// network caches.
pub trait ImageSource: Send + Sync {
    fn read(&self, source_id: &str) -> Result<SourceBytes, ReadError>;
}

/// Default source: the local filesystem, with a size cap enforced before the
/// file is pulled into memory.
#[derive(Debug, Clone)]
pub struct FsImageSource {
    max_file_size_bytes: u64,
}

impl FsImageSource {
    pub fn new(max_file_size_bytes: u64) -> Self {
        Self { max_file_size_bytes }
    }
}

impl ImageSource for FsImageSource {
    fn read(&self, source_id: &str) -> Result<SourceBytes, ReadError> {
        let path = Path::new(source_id);
        let metadata = fs::metadata(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ReadError::NotFound(source_id.to_string())
            } else {
                ReadError::Io {
                    path: source_id.to_string(),
                    source,
                }
            }
        })?;

        let size = metadata.len();
        if size > self.max_file_size_bytes {
            return Err(ReadError::TooLarge {
                path: source_id.to_string(),
                size,
                limit: self.max_file_size_bytes,
            });
        }

        let bytes = fs::read(path).map_err(|source| ReadError::Io {
            path: source_id.to_string(),
            source,
        })?;

        // Newer of creation and modification, when the platform reports both.
        let modified_at = match (metadata.created().ok(), metadata.modified().ok()) {
            (Some(created), Some(modified)) => Some(created.max(modified)),
            (created, modified) => created.or(modified),
        };

        Ok(SourceBytes { bytes, modified_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_not_found() {
        let source = FsImageSource::new(1024);
        let err = source.read("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, ReadError::NotFound(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn oversized_file_is_rejected_without_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let source = FsImageSource::new(16);
        let err = source.read(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ReadError::TooLarge { size: 64, limit: 16, .. }));
    }

    #[test]
    fn reads_bytes_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.bin");
        std::fs::write(&path, b"pixels").unwrap();

        let source = FsImageSource::new(1024);
        let read = source.read(path.to_str().unwrap()).unwrap();
        assert_eq!(read.bytes, b"pixels");
        assert!(read.modified_at.is_some());
    }
}
