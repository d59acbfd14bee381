//! # simlink-core
//!
//! Binary command protocol shared by the simulation visualization client and
//! the simulation host.
//!
//! # Architecture overview (for beginners)
//!
//! The two programs exchange *commands* over one TCP connection.  Each command
//! travels as a frame: a fixed 12-byte header followed by a payload.
//!
//! ```text
//! [length:u32][sequence:u32][command_id:u16][version:u16][payload ...]
//! ```
//!
//! `length` counts the payload plus the 8 header bytes after it, so a frame
//! with a 30-byte payload carries `length = 38`.  `length = 0` is a heartbeat
//! with no bytes after the header.
//!
//! This crate has no dependency on sockets or an async runtime.  It defines:
//!
//! - **`protocol::wire`** – big-endian encoding of scalars, UTF-16 strings,
//!   lists and vectors, with an explicit null marker for strings and lists.
//!
//! - **`protocol::header`** / **`protocol::receive`** – the frame header and a
//!   state machine that reassembles frames from arbitrarily split reads.
//!
//! - **`protocol::command`** – the [`Command`] trait and a [`CommandFactory`]
//!   that maps a command id back to a typed value.
//!
//! - **`commands`** – the reference command catalogue ([`SimCommand`]).

pub mod commands;
pub mod protocol;

pub use commands::{register_sim_commands, sim_command_factory, SimCommand};
pub use protocol::{
    encode_frame, Command, CommandFactory, CommandId, FrameHeader, Progress, ProtocolError,
    RawFrame, ReceiveState, SequenceCounter, Vec3, WireError,
};
