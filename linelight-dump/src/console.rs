//! Terminal presentation.
//!
//! Milestones (STX/ETX) stay in scroll-back; the byte counter rewrites a
//! single line in place.

use crossterm::cursor::MoveToPreviousLine;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{execute, queue};
use linelight_core::{
    CaptureError, CaptureObserver, RecordName, RecordSummary, TracingObserver,
};
use std::io::{self, IsTerminal, Write};
use std::path::Path;

pub type BoxedObserver = Box<dyn CaptureObserver + Send>;

/// Console output when stdout is a terminal, `tracing` otherwise.
pub fn select_observer() -> BoxedObserver {
    observer_for(io::stdout().is_terminal())
}

pub fn observer_for(stdout_is_terminal: bool) -> BoxedObserver {
    if stdout_is_terminal {
        Box::new(ConsoleObserver::new(io::stdout()))
    } else {
        Box::new(TracingObserver)
    }
}

/// Leave the terminal in its default colours.
pub fn reset_terminal() {
    let mut out = io::stdout();
    if out.is_terminal() {
        let _ = execute!(out, ResetColor);
    }
}

pub fn progress_line(total: u64) -> String {
    format!("{:>10} bytes received", total)
}

pub struct ConsoleObserver<W: Write> {
    out: W,
    /// Last chatter write did not end with a newline.
    mid_line: bool,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, write: impl FnOnce(&mut W) -> io::Result<()>) {
        let result = write(&mut self.out).and_then(|_| self.out.flush());
        if let Err(e) = result {
            tracing::debug!("Console write failed: {}", e);
        }
    }

    fn end_chatter_line(&mut self) {
        if std::mem::take(&mut self.mid_line) {
            self.emit(|out| queue!(out, Print("\n")));
        }
    }
}

impl<W: Write> CaptureObserver for ConsoleObserver<W> {
    fn on_chatter(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.mid_line = !text.ends_with('\n');
        self.emit(|out| queue!(out, Print(text)));
    }

    fn on_record_opened(&mut self, name: &RecordName, _path: &Path) {
        self.end_chatter_line();
        // The blank line is where the progress counter lands.
        self.emit(|out| {
            queue!(
                out,
                SetForegroundColor(Color::Green),
                Print(format!("STX is received, create \"{}\"\n\n", name))
            )
        });
    }

    fn on_progress(&mut self, _name: &RecordName, total: u64) {
        self.emit(|out| {
            queue!(
                out,
                MoveToPreviousLine(1),
                Clear(ClearType::CurrentLine),
                Print(format!("{}\n", progress_line(total)))
            )
        });
    }

    fn on_record_closed(&mut self, summary: &RecordSummary) {
        self.emit(|out| {
            queue!(
                out,
                Print(format!(
                    "ETX is received (Total: {} bytes), close \"{}\"\n",
                    summary.bytes_written, summary.name
                )),
                ResetColor,
                Print("\n")
            )
        });
    }

    fn on_record_abandoned(&mut self, summary: &RecordSummary, error: &CaptureError) {
        self.emit(|out| {
            queue!(
                out,
                SetForegroundColor(Color::Red),
                Print(format!(
                    "Abandoned \"{}\" after {} bytes: {}\n",
                    summary.name, summary.bytes_written, error
                )),
                ResetColor,
                Print("\n")
            )
        });
    }

    fn on_record_interrupted(&mut self, summary: &RecordSummary) {
        self.emit(|out| {
            queue!(
                out,
                ResetColor,
                Print(format!(
                    "\nInterrupted, kept {} bytes in \"{}\"\n",
                    summary.bytes_written, summary.name
                ))
            )
        });
    }

    fn on_fatal(&mut self, _error: &CaptureError) {
        self.end_chatter_line();
        self.emit(|out| queue!(out, ResetColor));
    }
}
