//! Record files.
//!
//! One record, one `.csv` file named after the second its STX arrived.
//! Payload bytes are written verbatim; nothing is added around them.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

pub const RECORD_EXTENSION: &str = "csv";
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
/// Highest `_N` suffix tried when a second already has a record.
pub const MAX_NAME_SUFFIX: u32 = 999;

// ════════════════════════════════════════════════════════════════════
// Capture directory
// ════════════════════════════════════════════════════════════════════

/// Create `path` (and its parents) if it is missing.
pub fn ensure_capture_dir(path: &Path) -> Result<PathBuf, CaptureError> {
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }
    std::fs::create_dir_all(path).map_err(|source| CaptureError::Directory {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Created capture directory {}", path.display());
    Ok(path.to_path_buf())
}

// ════════════════════════════════════════════════════════════════════
// Record naming
// ════════════════════════════════════════════════════════════════════

/// File name of a record; `Display` includes the extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordName(String);

impl RecordName {
    pub fn from_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(format!("{}.{}", ts.format(STAMP_FORMAT), RECORD_EXTENSION))
    }

    /// `2024-05-01_12-00-00.csv` -> `2024-05-01_12-00-00_2.csv`
    pub fn with_suffix(&self, n: u32) -> Self {
        if n == 0 {
            return self.clone();
        }
        Self(format!("{}_{}.{}", self.stem(), n, RECORD_EXTENSION))
    }

    pub fn stem(&self) -> &str {
        self.0
            .strip_suffix(RECORD_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ════════════════════════════════════════════════════════════════════
// Sink + writer
// ════════════════════════════════════════════════════════════════════

/// What a closed record left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub name: RecordName,
    pub path: PathBuf,
    pub bytes_written: u64,
    pub opened_at: DateTime<Local>,
}

/// Opens record files inside one capture directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a fresh record file for a record that started at `opened_at`.
    ///
    /// Existing files are never overwritten: a second record in the same
    /// second gets `_1`, the next `_2`, and so on.
    pub fn open(&self, opened_at: DateTime<Local>) -> Result<RecordWriter, CaptureError> {
        let base = RecordName::from_timestamp(&opened_at);

        for n in 0..=MAX_NAME_SUFFIX {
            let name = base.with_suffix(n);
            let path = self.dir.join(name.as_str());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::debug!("Opened record file {}", path.display());
                    return Ok(RecordWriter::new(name, path, file, opened_at));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!("{} already exists, trying next suffix", path.display());
                }
                Err(source) => return Err(CaptureError::Create { path, source }),
            }
        }

        Err(CaptureError::NameExhausted {
            stem: base.stem().to_string(),
            dir: self.dir.clone(),
        })
    }
}

/// An open record. `close` consumes it, so a record is closed exactly once.
#[derive(Debug)]
pub struct RecordWriter {
    name: RecordName,
    path: PathBuf,
    file: BufWriter<File>,
    bytes_written: u64,
    utf8: Utf8Tracker,
    opened_at: DateTime<Local>,
}

impl RecordWriter {
    fn new(name: RecordName, path: PathBuf, file: File, opened_at: DateTime<Local>) -> Self {
        Self {
            name,
            path,
            file: BufWriter::new(file),
            bytes_written: 0,
            utf8: Utf8Tracker::default(),
            opened_at,
        }
    }

    pub fn name(&self) -> &RecordName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write one payload fragment and return the running total.
    ///
    /// Only complete characters reach the file. The lead bytes of a character
    /// split across fragments are held back until the rest arrives, so the
    /// total may trail the payload seen so far by up to three bytes. A
    /// fragment that breaks UTF-8 is not written.
    pub fn append(&mut self, fragment: &[u8]) -> Result<u64, CaptureError> {
        let ready = self
            .utf8
            .accept(fragment)
            .map_err(|offset| CaptureError::Decode {
                name: self.name.to_string(),
                offset,
            })?;

        self.file
            .write_all(&ready)
            .map_err(|source| CaptureError::Write {
                name: self.name.to_string(),
                source,
            })?;

        self.bytes_written += ready.len() as u64;
        Ok(self.bytes_written)
    }

    /// Fails if the payload stops in the middle of a multi-byte character.
    pub fn ensure_complete(&self) -> Result<(), CaptureError> {
        self.utf8.finish().map_err(|offset| CaptureError::Decode {
            name: self.name.to_string(),
            offset,
        })
    }

    /// Flush and release the file.
    pub fn close(mut self) -> Result<RecordSummary, CaptureError> {
        self.file.flush().map_err(|source| CaptureError::Write {
            name: self.name.to_string(),
            source,
        })?;

        tracing::debug!(
            "Closed record file {} ({} bytes)",
            self.path.display(),
            self.bytes_written
        );

        Ok(RecordSummary {
            name: self.name,
            path: self.path,
            bytes_written: self.bytes_written,
            opened_at: self.opened_at,
        })
    }
}

// ════════════════════════════════════════════════════════════════════
// Streaming UTF-8 check
// ════════════════════════════════════════════════════════════════════

/// Validates UTF-8 across fragment boundaries.
///
/// Up to three bytes of an unfinished character are carried into the next
/// fragment. Errors carry the payload offset of the first bad byte.
#[derive(Debug, Default)]
struct Utf8Tracker {
    carry: Vec<u8>,
    /// Payload bytes already known to form complete characters.
    offset: u64,
}

impl Utf8Tracker {
    /// Returns the bytes that now form complete characters, carried lead
    /// bytes included. Trailing bytes of an unfinished character stay in
    /// `carry`.
    fn accept<'a>(&mut self, fragment: &'a [u8]) -> Result<Cow<'a, [u8]>, u64> {
        let joined: Cow<'a, [u8]> = if self.carry.is_empty() {
            Cow::Borrowed(fragment)
        } else {
            let mut v = std::mem::take(&mut self.carry);
            v.extend_from_slice(fragment);
            Cow::Owned(v)
        };

        let valid = match std::str::from_utf8(&joined) {
            Ok(_) => joined.len(),
            Err(e) => match e.error_len() {
                None => e.valid_up_to(),
                Some(_) => return Err(self.offset + e.valid_up_to() as u64),
            },
        };

        self.offset += valid as u64;
        self.carry = joined[valid..].to_vec();
        Ok(match joined {
            Cow::Borrowed(b) => Cow::Borrowed(&b[..valid]),
            Cow::Owned(mut v) => {
                v.truncate(valid);
                Cow::Owned(v)
            }
        })
    }

    fn finish(&self) -> Result<(), u64> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err(self.offset)
        }
    }
}
