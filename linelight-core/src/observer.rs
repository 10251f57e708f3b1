//! Capture observers.
//!
//! The capture loop reports everything it does through [`CaptureObserver`];
//! it never prints on its own. Every method has a no-op default.

use std::path::Path;

use crate::error::CaptureError;
use crate::sink::{RecordName, RecordSummary};

pub trait CaptureObserver {
    /// Bytes seen outside any record.
    fn on_chatter(&mut self, _bytes: &[u8]) {}

    /// STX seen, record file created.
    fn on_record_opened(&mut self, _name: &RecordName, _path: &Path) {}

    /// Running payload total after a non-final fragment.
    fn on_progress(&mut self, _name: &RecordName, _total: u64) {}

    /// ETX seen, record file closed.
    fn on_record_closed(&mut self, _summary: &RecordSummary) {}

    /// Record dropped because of a per-record fault. The file keeps its valid prefix.
    fn on_record_abandoned(&mut self, _summary: &RecordSummary, _error: &CaptureError) {}

    /// Capture cancelled while this record was open.
    fn on_record_interrupted(&mut self, _summary: &RecordSummary) {}

    /// The capture is about to stop with `error`.
    fn on_fatal(&mut self, _error: &CaptureError) {}
}

impl<O: CaptureObserver + ?Sized> CaptureObserver for Box<O> {
    fn on_chatter(&mut self, bytes: &[u8]) {
        (**self).on_chatter(bytes)
    }

    fn on_record_opened(&mut self, name: &RecordName, path: &Path) {
        (**self).on_record_opened(name, path)
    }

    fn on_progress(&mut self, name: &RecordName, total: u64) {
        (**self).on_progress(name, total)
    }

    fn on_record_closed(&mut self, summary: &RecordSummary) {
        (**self).on_record_closed(summary)
    }

    fn on_record_abandoned(&mut self, summary: &RecordSummary, error: &CaptureError) {
        (**self).on_record_abandoned(summary, error)
    }

    fn on_record_interrupted(&mut self, summary: &RecordSummary) {
        (**self).on_record_interrupted(summary)
    }

    fn on_fatal(&mut self, error: &CaptureError) {
        (**self).on_fatal(error)
    }
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl CaptureObserver for NullObserver {}

/// Routes notifications into `tracing`. Used when stdout is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CaptureObserver for TracingObserver {
    fn on_chatter(&mut self, bytes: &[u8]) {
        tracing::debug!("chatter: {:?}", String::from_utf8_lossy(bytes));
    }

    fn on_record_opened(&mut self, name: &RecordName, path: &Path) {
        tracing::info!("STX is received, create {:?} ({})", name.as_str(), path.display());
    }

    fn on_progress(&mut self, name: &RecordName, total: u64) {
        tracing::trace!("{}: {} bytes received", name, total);
    }

    fn on_record_closed(&mut self, summary: &RecordSummary) {
        tracing::info!(
            "ETX is received (Total: {} bytes), close {:?}",
            summary.bytes_written,
            summary.name.as_str()
        );
    }

    fn on_record_abandoned(&mut self, summary: &RecordSummary, error: &CaptureError) {
        tracing::warn!(
            "Abandoned {} after {} bytes: {}",
            summary.name,
            summary.bytes_written,
            error
        );
    }

    fn on_record_interrupted(&mut self, summary: &RecordSummary) {
        tracing::warn!(
            "Interrupted during {}, kept {} bytes",
            summary.name,
            summary.bytes_written
        );
    }

    fn on_fatal(&mut self, error: &CaptureError) {
        tracing::error!("Capture stopped: {}", error);
    }
}
