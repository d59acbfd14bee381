//! Commands and the factory that reconstructs them from raw payloads.
//!
//! The engine never knows the concrete command catalogue.  Application code
//! supplies it in two halves:
//!
//! - **Encoding** – the command type implements [`Command`], which reports its
//!   command-type identifier and writes its payload.
//! - **Decoding** – a decoder per identifier is registered in a
//!   [`CommandFactory`].  The receive path looks the decoder up by the
//!   `command_id` of each frame header.
//!
//! ```rust
//! use simlink_core::protocol::{Command, CommandFactory, CommandId};
//! use simlink_core::protocol::wire::{read_i32, write_i32, WireError};
//!
//! #[derive(Debug, PartialEq)]
//! struct SetSpeed(i32);
//!
//! const SET_SPEED: CommandId = CommandId(0x10);
//!
//! impl Command for SetSpeed {
//!     fn command_id(&self) -> CommandId {
//!         SET_SPEED
//!     }
//!     fn encode_payload(&self, buf: &mut Vec<u8>) {
//!         write_i32(buf, self.0);
//!     }
//! }
//!
//! fn decode_set_speed(p: &[u8]) -> Result<SetSpeed, WireError> {
//!     Ok(SetSpeed(read_i32(p, 0)?.0))
//! }
//!
//! let mut factory = CommandFactory::new();
//! factory.register_decoder(SET_SPEED, decode_set_speed);
//!
//! let mut payload = Vec::new();
//! SetSpeed(42).encode_payload(&mut payload);
//! assert_eq!(factory.decode(SET_SPEED, &payload).unwrap(), SetSpeed(42));
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::protocol::error::ProtocolError;
use crate::protocol::wire::WireError;

/// Command-type identifier carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u16);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for CommandId {
    fn from(value: u16) -> Self {
        CommandId(value)
    }
}

/// A strongly typed command that can be put on the wire.
///
/// Commands are immutable values; ownership moves from the producer into the
/// outbound path, or from the decoder into the inbound queue and finally into
/// the handler.
pub trait Command: Send + 'static {
    /// The identifier written into the frame header.
    fn command_id(&self) -> CommandId;

    /// Appends the payload bytes (everything after the header) to `buf`.
    fn encode_payload(&self, buf: &mut Vec<u8>);

    /// Convenience wrapper returning the payload as a fresh buffer.
    fn to_payload(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_payload(&mut buf);
        buf
    }
}

/// Decoder for a single command identifier.
pub type DecodeFn<C> = fn(&[u8]) -> Result<C, WireError>;

/// Maps command identifiers to their decoders.
///
/// The factory is built once at startup and then shared read-only with the
/// receive task (typically behind an `Arc`).
pub struct CommandFactory<C> {
    decoders: HashMap<CommandId, DecodeFn<C>>,
}

impl<C> CommandFactory<C> {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `decoder` for `id`.  A later registration replaces an earlier
    /// one; returns `true` when that happened.
    pub fn register_decoder(&mut self, id: CommandId, decoder: DecodeFn<C>) -> bool {
        self.decoders.insert(id, decoder).is_some()
    }

    /// Whether a decoder exists for `id`.
    pub fn contains(&self, id: CommandId) -> bool {
        self.decoders.contains_key(&id)
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Reconstructs a command from its payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownCommand`] when no decoder is registered for
    /// `id`, [`ProtocolError::MalformedPayload`] when the decoder fails.
    pub fn decode(&self, id: CommandId, payload: &[u8]) -> Result<C, ProtocolError> {
        let decoder = self
            .decoders
            .get(&id)
            .ok_or(ProtocolError::UnknownCommand(id))?;
        decoder(payload).map_err(|source| ProtocolError::MalformedPayload { id, source })
    }
}

impl<C> Default for CommandFactory<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CommandFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.decoders.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("CommandFactory").field("ids", &ids).finish()
    }
}
