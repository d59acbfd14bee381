//! Frame- and command-level protocol errors.

use thiserror::Error;

use crate::protocol::command::CommandId;
use crate::protocol::wire::WireError;

/// Errors raised while framing or decoding commands.
///
/// [`UnknownCommand`](Self::UnknownCommand) and
/// [`MalformedPayload`](Self::MalformedPayload) are local failures: the frame
/// was consumed in full, so the stream stays aligned and the next frame can be
/// read.  The framing variants mean the byte stream can no longer be trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// No decoder is registered for the header's command id.
    #[error("unknown command id {0}")]
    UnknownCommand(CommandId),

    /// A decoder rejected the payload of an otherwise well-formed frame.
    #[error("malformed payload for command {id}: {source}")]
    MalformedPayload {
        id: CommandId,
        #[source]
        source: WireError,
    },

    /// The header's length is neither the heartbeat marker nor `>= 8`.
    #[error("invalid frame length {0}: must be 0 (heartbeat) or at least 8")]
    InvalidFrameLength(u32),

    /// The declared payload exceeds the configured limit.
    #[error("frame payload of {payload_len} bytes exceeds the limit of {max}")]
    FrameTooLarge { payload_len: usize, max: usize },
}

impl ProtocolError {
    /// `true` when the frame was consumed and the stream is still aligned.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCommand(_) | ProtocolError::MalformedPayload { .. }
        )
    }
}
