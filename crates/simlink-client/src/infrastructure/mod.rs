//! Infrastructure layer for the client.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `simlink_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`config`** – Parses the `KEY value` settings file into
//!   `ClientSettings`.
//!
//! - **`network`** – TCP connection manager: connects to the simulation,
//!   reads framed commands from the socket, writes outbound frames, and
//!   reconnects automatically if the connection drops.

pub mod config;
pub mod network;
