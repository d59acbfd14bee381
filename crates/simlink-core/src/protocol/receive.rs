//! Receive state machine: reassembles frames from arbitrary partial reads.
//!
//! # Why a state machine? (for beginners)
//!
//! TCP is a byte stream.  A single `read()` may return three bytes of a
//! header, or the end of one payload and the start of the next header.  The
//! receiver therefore keeps an explicit record of *what it is waiting for*
//! and *how much of it has arrived*:
//!
//! ```text
//!            12 header bytes read
//!   ┌────────────────┐ length == 0 (heartbeat)  ┌─────────────────┐
//!   │ AwaitingHeader │ ◄──────────┐            │ AwaitingPayload │
//!   │  buffer = 12   │ ───────────┘            │ buffer = len-8  │
//!   └────────────────┘ ──── length >= 8 ─────► └─────────────────┘
//!            ▲                                          │
//!            └───────── payload bytes read: Frame ──────┘
//! ```
//!
//! # Driving it
//!
//! The machine owns its buffer and never touches a socket.  The I/O loop asks
//! for the still-unfilled tail with [`ReceiveState::unfilled_mut`], reads into
//! it, and reports how many bytes arrived with [`ReceiveState::advance`]:
//!
//! ```rust
//! use simlink_core::protocol::{CommandId, FrameHeader, Progress, ReceiveState};
//! use simlink_core::protocol::header::encode_frame;
//!
//! let header = FrameHeader::for_payload(0, CommandId(7), 2).unwrap();
//! let wire = encode_frame(&header, &[0xAB, 0xCD]);
//!
//! let mut state = ReceiveState::new();
//! let mut events = Vec::new();
//! for chunk in wire.chunks(5) {
//!     events.extend(state.feed(chunk).unwrap());
//! }
//!
//! assert_eq!(events.len(), 1);
//! assert!(matches!(&events[0], Progress::Frame(f) if f.payload == [0xAB, 0xCD]));
//! ```
//!
//! Because a short read only advances `bytes_read`, the next read lands at
//! exactly the right offset of the same buffer; the full size is never
//! re-requested.

use tracing::warn;

use crate::protocol::error::ProtocolError;
use crate::protocol::header::{FrameHeader, HEADER_SIZE, PROTOCOL_VERSION};

/// Default upper bound for a single payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A complete frame whose payload has not been decoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Outcome of feeding bytes into the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The current header or payload is still incomplete.
    NeedMore,
    /// A `length == 0` header was read; no command follows.
    Heartbeat(FrameHeader),
    /// A whole frame is available.
    Frame(RawFrame),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    AwaitingHeader,
    AwaitingPayload(FrameHeader),
}

/// In-flight partial read.
///
/// Invariant: `bytes_read <= buffer.len()`, where `buffer.len()` is the
/// number of bytes required by the current phase.
#[derive(Debug)]
pub struct ReceiveState {
    phase: Phase,
    buffer: Vec<u8>,
    bytes_read: usize,
    max_payload: usize,
}

impl ReceiveState {
    /// Creates a state machine awaiting its first header, with the default
    /// payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            phase: Phase::AwaitingHeader,
            buffer: vec![0u8; HEADER_SIZE],
            bytes_read: 0,
            max_payload,
        }
    }

    pub fn is_awaiting_header(&self) -> bool {
        self.phase == Phase::AwaitingHeader
    }

    /// The header of the frame whose payload is being read, if any.
    pub fn pending_header(&self) -> Option<&FrameHeader> {
        match &self.phase {
            Phase::AwaitingPayload(header) => Some(header),
            Phase::AwaitingHeader => None,
        }
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Bytes required to complete the current phase.
    pub fn bytes_required(&self) -> usize {
        self.buffer.len()
    }

    /// The part of the buffer that still has to be filled.
    ///
    /// Never empty: a phase completes (and re-arms) as soon as it is full.
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.bytes_read..]
    }

    /// Records that `n` more bytes were written into [`unfilled_mut`](Self::unfilled_mut).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidFrameLength`] for a header length of `1..=7` and
    /// [`ProtocolError::FrameTooLarge`] for payloads above the limit.  Either
    /// leaves the stream unrecoverable; the caller should drop the connection.
    ///
    /// `n` larger than the unfilled length is a caller bug.  Debug builds
    /// panic on it; release builds clamp it to the unfilled length.
    pub fn advance(&mut self, n: usize) -> Result<Progress, ProtocolError> {
        let remaining = self.buffer.len() - self.bytes_read;
        debug_assert!(
            n <= remaining,
            "advance({n}) past the end of the receive buffer"
        );
        self.bytes_read += n.min(remaining);
        if self.bytes_read < self.buffer.len() {
            return Ok(Progress::NeedMore);
        }

        match std::mem::replace(&mut self.phase, Phase::AwaitingHeader) {
            Phase::AwaitingHeader => self.complete_header(),
            Phase::AwaitingPayload(header) => {
                let payload = std::mem::take(&mut self.buffer);
                self.rearm();
                Ok(Progress::Frame(RawFrame { header, payload }))
            }
        }
    }

    /// Copies `data` through the state machine and returns every completed
    /// heartbeat or frame, in order.  Incomplete trailing bytes stay buffered.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<Vec<Progress>, ProtocolError> {
        let mut events = Vec::new();
        while !data.is_empty() {
            let unfilled = self.unfilled_mut();
            let n = unfilled.len().min(data.len());
            unfilled[..n].copy_from_slice(&data[..n]);
            data = &data[n..];
            match self.advance(n)? {
                Progress::NeedMore => {}
                event => events.push(event),
            }
        }
        Ok(events)
    }

    /// Discards any partial frame and waits for a fresh header.
    pub fn reset(&mut self) {
        self.phase = Phase::AwaitingHeader;
        self.rearm();
    }

    fn rearm(&mut self) {
        self.buffer.clear();
        self.buffer.resize(HEADER_SIZE, 0);
        self.bytes_read = 0;
    }

    fn complete_header(&mut self) -> Result<Progress, ProtocolError> {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.buffer[..HEADER_SIZE]);
        let header = FrameHeader::decode(&raw);
        if header.version != PROTOCOL_VERSION {
            warn!(
                version = header.version,
                expected = PROTOCOL_VERSION,
                command_id = %header.command_id,
                "frame carries an unexpected protocol version"
            );
        }

        if header.is_heartbeat() {
            self.rearm();
            return Ok(Progress::Heartbeat(header));
        }

        let payload_len = match header.payload_len() {
            Ok(len) => len,
            Err(e) => {
                self.rearm();
                return Err(e);
            }
        };
        if payload_len > self.max_payload {
            self.rearm();
            return Err(ProtocolError::FrameTooLarge {
                payload_len,
                max: self.max_payload,
            });
        }

        if payload_len == 0 {
            self.rearm();
            return Ok(Progress::Frame(RawFrame {
                header,
                payload: Vec::new(),
            }));
        }

        self.buffer = vec![0u8; payload_len];
        self.bytes_read = 0;
        self.phase = Phase::AwaitingPayload(header);
        Ok(Progress::NeedMore)
    }
}

impl Default for ReceiveState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
