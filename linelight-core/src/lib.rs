//! # Linelight Core
//!
//! Splits an instrument's serial stream into STX/ETX delimited records and
//! writes each one to its own timestamped `.csv` file.

pub mod capture;
pub mod error;
pub mod framer;
pub mod observer;
pub mod sink;

pub use capture::{CancelToken, CaptureLoop, CaptureReport, DEFAULT_CHUNK_SIZE, RecordOutcome};
pub use error::CaptureError;
pub use framer::{ETX, FrameEvent, FrameState, Framer, STX};
pub use observer::{CaptureObserver, NullObserver, TracingObserver};
pub use sink::{FileSink, RecordName, RecordSummary, RecordWriter, ensure_capture_dir};

/// Directory under the user's home that receives the records.
pub const CAPTURE_DIR_NAME: &str = "rt-linelight";
