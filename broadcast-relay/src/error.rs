use std::{io, net::SocketAddr};

use thiserror::Error;
use tokio::task::JoinError;

/// Errors that stop the relay before it starts accepting connections.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid relay configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to read listener address")]
    LocalAddr(#[source] io::Error),
}

/// Why a single client session ended. Never propagated past that session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read from client")]
    Read(#[source] io::Error),

    #[error("failed to write to client")]
    Write(#[source] io::Error),

    #[error("inbound channel closed")]
    InboundClosed,

    #[error("session task failed")]
    Task(#[source] JoinError),
}
