//! TCP relay that rebroadcasts every client's bytes to all connected clients.
//!
//! Each read from a client is prefixed with a marker byte and offered to
//! every live session, the sender included. Delivery is best effort: a client
//! whose writer falls behind simply misses messages so it cannot stall the
//! others. Each module focuses on one concern:
//!
//! - [`cli`] parses the command-line flags into a [`relay::RelayConfig`].
//! - [`relay`] binds the listener and registers a session per accepted socket.
//! - [`registry`] tracks live sessions and runs the single broadcast loop.
//! - [`session`] pumps one connection through its reader and writer tasks.
//! - [`message`] builds the marked wire form of a relayed chunk.
//! - [`error`] holds the startup and per-session error types.

pub mod cli;
pub mod error;
pub mod message;
pub mod registry;
pub mod relay;
pub mod session;
