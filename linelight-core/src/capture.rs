//! The capture loop.
//!
//! Pulls chunks from a [`ByteSource`], runs them through the [`Framer`] and
//! turns the resulting events into record files. One record at a time, one
//! thread, until the [`CancelToken`] trips or something fatal happens.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use linelight_io::ByteSource;

use crate::error::CaptureError;
use crate::framer::{FrameEvent, Framer};
use crate::observer::CaptureObserver;
use crate::sink::{FileSink, RecordSummary, RecordWriter};

/// Bytes requested per read.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

// ════════════════════════════════════════════════════════════════════
// Cancellation
// ════════════════════════════════════════════════════════════════════

/// Shared stop flag. Checked between reads, so the worst-case reaction time
/// is one source timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ════════════════════════════════════════════════════════════════════
// Results
// ════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum RecordOutcome {
    /// ETX seen, file closed.
    Completed(RecordSummary),
    /// Per-record fault; the file keeps whatever was written before it.
    Abandoned {
        summary: RecordSummary,
        error: CaptureError,
    },
    /// Cancelled. Carries the partial record if one was open.
    Cancelled(Option<RecordSummary>),
}

/// Totals for one capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub records_completed: u64,
    pub records_abandoned: u64,
    /// Payload bytes across completed records.
    pub payload_bytes: u64,
    pub chatter_bytes: u64,
    pub interrupted: Option<RecordSummary>,
}

// ════════════════════════════════════════════════════════════════════
// Loop
// ════════════════════════════════════════════════════════════════════

type Clock = Box<dyn FnMut() -> DateTime<Local> + Send>;

pub struct CaptureLoop<S, O> {
    source: S,
    sink: FileSink,
    observer: O,
    framer: Framer,
    cancel: CancelToken,
    buf: Vec<u8>,
    clock: Clock,
    report: CaptureReport,
}

impl<S, O> std::fmt::Debug for CaptureLoop<S, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoop")
            .field("dir", &self.sink.dir())
            .field("state", &self.framer.state())
            .field("chunk_size", &self.buf.len())
            .field("report", &self.report)
            .finish()
    }
}

impl<S: ByteSource, O: CaptureObserver> CaptureLoop<S, O> {
    pub fn new(source: S, sink: FileSink, observer: O, cancel: CancelToken) -> Self {
        Self {
            source,
            sink,
            observer,
            framer: Framer::new(),
            cancel,
            buf: vec![0; DEFAULT_CHUNK_SIZE],
            clock: Box::new(Local::now),
            report: CaptureReport::default(),
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.buf = vec![0; size.max(1)];
        self
    }

    /// Replace the wall clock used to name records.
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Local> + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn report(&self) -> &CaptureReport {
        &self.report
    }

    /// Hand the source back, e.g. to reuse the connection.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Capture records until cancelled.
    ///
    /// Per-record faults are reported and skipped. Anything else ends the
    /// capture; the open record, if any, is closed as-is first.
    pub fn run(&mut self) -> Result<CaptureReport, CaptureError> {
        loop {
            match self.capture_record() {
                Ok(RecordOutcome::Cancelled(_)) => return Ok(self.report.clone()),
                Ok(_) => {}
                Err(e) => {
                    self.observer.on_fatal(&e);
                    return Err(e);
                }
            }
        }
    }

    /// Capture a single record: seek STX, stream payload, stop at ETX.
    pub fn capture_record(&mut self) -> Result<RecordOutcome, CaptureError> {
        // A previous call that was cancelled mid-record already closed its file.
        if self.framer.is_capturing() {
            self.framer.abandon();
        }

        let mut writer: Option<RecordWriter> = None;

        loop {
            while let Some(event) = self.framer.next_event() {
                match event {
                    FrameEvent::Chatter(bytes) => {
                        self.report.chatter_bytes += bytes.len() as u64;
                        self.observer.on_chatter(&bytes);
                    }
                    FrameEvent::RecordStart => {
                        let opened = self.sink.open((self.clock)())?;
                        self.observer.on_record_opened(opened.name(), opened.path());
                        writer = Some(opened);
                    }
                    FrameEvent::Payload(bytes) => {
                        // The framer only yields payload after RecordStart,
                        // which always opens a writer in this call.
                        let Some(w) = writer.as_mut() else {
                            tracing::warn!(
                                "Dropped {} payload bytes with no record open",
                                bytes.len()
                            );
                            continue;
                        };
                        match w.append(&bytes) {
                            Ok(total) => self.observer.on_progress(w.name(), total),
                            Err(e) => return self.fail_record(writer, e),
                        }
                    }
                    FrameEvent::RecordEnd { tail } => {
                        let Some(mut w) = writer.take() else {
                            tracing::warn!(
                                "ETX with no record open, dropped {} tail bytes",
                                tail.len()
                            );
                            continue;
                        };
                        if let Err(e) = w.append(&tail) {
                            return self.fail_record(Some(w), e);
                        }
                        if let Err(e) = w.ensure_complete() {
                            return self.fail_record(Some(w), e);
                        }

                        let summary = w.close()?;
                        self.report.records_completed += 1;
                        self.report.payload_bytes += summary.bytes_written;
                        self.observer.on_record_closed(&summary);
                        return Ok(RecordOutcome::Completed(summary));
                    }
                }
            }

            if self.cancel.is_cancelled() {
                let partial = match writer.take() {
                    Some(w) => {
                        let summary = w.close()?;
                        self.observer.on_record_interrupted(&summary);
                        Some(summary)
                    }
                    None => None,
                };
                self.report.interrupted = partial.clone();
                return Ok(RecordOutcome::Cancelled(partial));
            }

            let n = match self.source.read_chunk(&mut self.buf) {
                Ok(n) => n,
                Err(e) => return self.fail_record(writer, e.into()),
            };
            if n > 0 {
                self.framer.feed(&self.buf[..n]);
            }
        }
    }

    fn fail_record(
        &mut self,
        writer: Option<RecordWriter>,
        error: CaptureError,
    ) -> Result<RecordOutcome, CaptureError> {
        match writer {
            Some(w) if error.is_recoverable() => {
                self.framer.abandon();
                let summary = w.close()?;
                self.report.records_abandoned += 1;
                self.observer.on_record_abandoned(&summary, &error);
                Ok(RecordOutcome::Abandoned { summary, error })
            }
            Some(w) => {
                if let Err(close_err) = w.close() {
                    tracing::debug!("Closing record after fatal error also failed: {}", close_err);
                }
                Err(error)
            }
            None => Err(error),
        }
    }
}
