use linelight_io::SourceError;
use std::path::PathBuf;

/// Everything that can stop a record, or the whole capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("cannot prepare capture directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create record file {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free file name for record {stem} in {}", dir.display())]
    NameExhausted { stem: String, dir: PathBuf },

    #[error("write to record {name} failed: {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("record {name} is not valid UTF-8 at payload byte {offset}")]
    Decode { name: String, offset: u64 },
}

impl CaptureError {
    /// Per-record faults; the loop abandons the record and keeps capturing.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CaptureError::Decode { .. })
    }
}
