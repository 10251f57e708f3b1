//! STX/ETX framing state machine.
//!
//! Inputs:
//! - raw chunks from a byte source, split at arbitrary points
//!
//! Output:
//! - a stream of [`FrameEvent`]s describing chatter and record boundaries
//!
//! The framer never assumes a sentinel sits at a chunk edge. Bytes left over
//! after an ETX stay buffered and are scanned for the next STX.

use bytes::{Buf, Bytes, BytesMut};

/// Start-of-text: opens a record.
pub const STX: u8 = 0x02;
/// End-of-text: closes a record.
pub const ETX: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    SeekingStart,
    Capturing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// Bytes outside any record.
    Chatter(Bytes),
    /// STX consumed; a record is now open.
    RecordStart,
    /// Payload with no ETX behind it yet.
    Payload(Bytes),
    /// ETX consumed. `tail` is the final payload fragment, possibly empty.
    RecordEnd { tail: Bytes },
}

#[derive(Debug)]
pub struct Framer {
    state: FrameState,
    pending: BytesMut,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            state: FrameState::SeekingStart,
            pending: BytesMut::with_capacity(1024),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == FrameState::Capturing
    }

    /// Bytes fed but not yet turned into events.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Next event from the buffered bytes, or `None` once they are exhausted.
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        if self.pending.is_empty() {
            return None;
        }

        match self.state {
            FrameState::SeekingStart => match find(&self.pending, STX) {
                None => Some(FrameEvent::Chatter(self.take_all())),
                Some(0) => {
                    self.pending.advance(1);
                    self.state = FrameState::Capturing;
                    Some(FrameEvent::RecordStart)
                }
                Some(i) => Some(FrameEvent::Chatter(self.pending.split_to(i).freeze())),
            },
            FrameState::Capturing => match find(&self.pending, ETX) {
                None => Some(FrameEvent::Payload(self.take_all())),
                Some(j) => {
                    let tail = self.pending.split_to(j).freeze();
                    self.pending.advance(1);
                    self.state = FrameState::SeekingStart;
                    Some(FrameEvent::RecordEnd { tail })
                }
            },
        }
    }

    /// Give up on the open record. Whatever is still buffered is rescanned
    /// from SEEKING_START.
    pub fn abandon(&mut self) {
        self.state = FrameState::SeekingStart;
    }

    fn take_all(&mut self) -> Bytes {
        self.pending.split().freeze()
    }
}

fn find(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}
