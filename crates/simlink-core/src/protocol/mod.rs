//! The simlink wire protocol: value codec, frame header, command factory and
//! the incremental receive state machine.
//!
//! Nothing in this module touches a socket.  The client crate drives
//! [`ReceiveState`] from its socket reads and writes frames built with
//! [`encode_frame`].

pub mod command;
pub mod error;
pub mod header;
pub mod receive;
pub mod sequence;
pub mod wire;

pub use command::{Command, CommandFactory, CommandId, DecodeFn};
pub use error::ProtocolError;
pub use header::{encode_frame, FrameHeader, HEADER_SIZE, PROTOCOL_VERSION};
pub use receive::{Progress, RawFrame, ReceiveState, DEFAULT_MAX_PAYLOAD};
pub use sequence::SequenceCounter;
pub use wire::{Vec3, WireError};
