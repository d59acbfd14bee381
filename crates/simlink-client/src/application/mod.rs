//! Application layer for the client.
//!
//! - **`dispatch`** – The inbound queue filled by the network task and the
//!   dispatcher that drains it once per application tick, routing each
//!   command to the handler registered for its command id.

pub mod dispatch;
