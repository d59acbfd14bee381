//! The fixed 12-byte frame header.
//!
//! Wire format:
//! ```text
//! [length:u32][sequence:u32][command_id:u16][version:u16]
//! ```
//! All fields are big-endian.
//!
//! # The `length` field (read this before touching it)
//!
//! `length` counts every byte that follows the length field itself, i.e. the
//! remaining 8 header bytes **plus** the payload:
//!
//! | payload bytes | `length` on the wire |
//! |---------------|----------------------|
//! | heartbeat     | `0`                  |
//! | 0             | `8`                  |
//! | N             | `8 + N`              |
//!
//! A receiver computes the payload size as `length - 8`.  A `length` of
//! exactly `0` is reserved for heartbeats and carries no payload.  Values
//! `1..=7` cannot describe a frame and are rejected.  Existing peers depend on
//! this convention, so it must not be "simplified" to a payload-only length.

use crate::protocol::command::CommandId;
use crate::protocol::ProtocolError;

/// Total size of the frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Number of header bytes counted by the `length` field.
pub const LENGTH_OVERHEAD: u32 = 8;

/// Protocol version stamped into every outbound header.
pub const PROTOCOL_VERSION: u16 = 1;

/// 12-byte header that precedes every frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Bytes following the length field (`8 + payload`), or `0` for a heartbeat.
    pub length: u32,
    /// Sender-assigned, increasing per connection.  Diagnostics only.
    pub sequence: u32,
    /// Selects the decoder and handler for the payload.
    pub command_id: CommandId,
    /// Protocol version of the sender.
    pub version: u16,
}

impl FrameHeader {
    /// Builds the header for an outbound frame carrying `payload_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] if `8 + payload_len` does not
    /// fit the 32-bit length field.
    pub fn for_payload(
        sequence: u32,
        command_id: CommandId,
        payload_len: usize,
    ) -> Result<Self, ProtocolError> {
        let length = u32::try_from(payload_len)
            .ok()
            .and_then(|n| n.checked_add(LENGTH_OVERHEAD))
            .ok_or(ProtocolError::FrameTooLarge {
                payload_len,
                max: (u32::MAX - LENGTH_OVERHEAD) as usize,
            })?;
        Ok(Self {
            length,
            sequence,
            command_id,
            version: PROTOCOL_VERSION,
        })
    }

    /// A zero-length heartbeat header.
    pub fn heartbeat(sequence: u32) -> Self {
        Self {
            length: 0,
            sequence,
            command_id: CommandId(0),
            version: PROTOCOL_VERSION,
        }
    }

    /// `true` for the reserved `length == 0` marker.
    pub fn is_heartbeat(&self) -> bool {
        self.length == 0
    }

    /// Payload size declared by this header (`length - 8`).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidFrameLength`] for heartbeats and for
    /// lengths smaller than the 8 counted header bytes.
    pub fn payload_len(&self) -> Result<usize, ProtocolError> {
        self.length
            .checked_sub(LENGTH_OVERHEAD)
            .filter(|_| self.length != 0)
            .map(|n| n as usize)
            .ok_or(ProtocolError::InvalidFrameLength(self.length))
    }

    /// Encodes the header into its 12-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        out[8..10].copy_from_slice(&self.command_id.0.to_be_bytes());
        out[10..12].copy_from_slice(&self.version.to_be_bytes());
        out
    }

    /// Decodes a header from exactly 12 bytes.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            length: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            sequence: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            command_id: CommandId(u16::from_be_bytes([bytes[8], bytes[9]])),
            version: u16::from_be_bytes([bytes[10], bytes[11]]),
        }
    }
}

/// Concatenates an encoded header and its payload into one buffer, ready for
/// a single socket write.
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

// ── Tests ─────────────────────────────────────────────────────────────────────
