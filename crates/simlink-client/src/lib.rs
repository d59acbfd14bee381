//! simlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `simlink-monitor` binary share the same module tree.
//!
//! # What does simlink-client do? (for beginners)
//!
//! The client is the visualization side of a simulation link.  It:
//!
//! 1. Connects to the simulation over TCP, retrying with backoff until the
//!    simulation is reachable.
//! 2. Reassembles frames from the socket and decodes them into typed commands
//!    through a [`CommandFactory`](simlink_core::protocol::CommandFactory).
//! 3. Buffers decoded commands in an inbound queue that the application drains
//!    once per tick, calling the handler registered for each command id.
//! 4. Sends commands back to the simulation while a connection is live.
//!
//! The connection runs on a background Tokio task; handlers always run on the
//! caller's side of [`Dispatcher::dispatch`](application::dispatch::Dispatcher::dispatch).

/// Application layer: inbound queue and handler dispatch.
pub mod application;

/// Infrastructure layer: settings file and network connection.
pub mod infrastructure;

pub use application::dispatch::{CommandRegistry, DispatchReport, Dispatcher, InboundQueue};
pub use infrastructure::config::{load_settings, parse_settings, ClientSettings, ConfigError};
pub use infrastructure::network::{
    CommandSender, ConnectionError, ConnectionManager, ConnectionState, SendError,
};
