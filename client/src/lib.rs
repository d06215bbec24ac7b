//! Blocking client for the Serf agent RPC protocol.
//!
//! A [`Connection`] speaks MessagePack over a single TCP stream: every
//! request carries a sequence number, and the agent answers with a head
//! (and, for some commands, a body) tagged with the same number.
//!
//! ```no_run
//! use serf_rpc_client::{Connection, ConnectionConfig};
//!
//! let mut connection = Connection::new(ConnectionConfig::default());
//! connection.handshake()?;
//! let members = connection.call("members", None, true)?;
//! assert!(members.is_ok());
//! # Ok::<(), serf_rpc_client::SerfClientError>(())
//! ```

use std::{io, time::Duration};

use derive_more::Display;
use thiserror::Error;

pub mod codec;
pub mod config;
pub mod messaging;
pub mod remote;

pub use crate::config::{ConnectionConfig, Endpoint};
pub use crate::messaging::{Response, ResponseHead};
pub use crate::remote::connection::Connection;
pub use crate::remote::transport::Transport;

pub type Result<T> = std::result::Result<T, SerfClientError>;

/// Broad failure category, see [`SerfClientError::kind`].
#[derive(Display, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    #[display(fmt = "connection error")]
    Connection,
    #[display(fmt = "timeout")]
    Timeout,
    #[display(fmt = "protocol error")]
    Protocol,
    #[display(fmt = "format error")]
    Format,
}

#[derive(Error, Debug)]
pub enum SerfClientError {
    #[error("error connecting {endpoint}. {}.", os_reason(.source))]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("handshake must be made first")]
    HandshakeRequired,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out after {elapsed:?} waiting for a response")]
    Timeout { elapsed: Duration },
    #[error("sequence mismatch: expected {expected}, received {actual}")]
    SequenceMismatch { expected: u64, actual: u64 },
    #[error("unable to encode request: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("unable to decode message: {0}")]
    Decode(#[from] rmpv::decode::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid address field {field:?}: {reason}")]
    InvalidAddress { field: String, reason: String },
}

impl SerfClientError {
    pub fn kind(&self) -> ErrorKind {
        use SerfClientError::*;

        match self {
            Connect { .. } | ConnectionClosed | HandshakeRequired | Io(_) => ErrorKind::Connection,
            Timeout { .. } => ErrorKind::Timeout,
            SequenceMismatch { .. } => ErrorKind::Protocol,
            Encode(_) | Decode(_) | InvalidResponse(_) | InvalidAddress { .. } => {
                ErrorKind::Format
            }
        }
    }

    /// Whether the stream that produced this error can no longer be trusted.
    /// Timeouts still leave partial input behind, see [`Connection::call`].
    pub fn is_fatal(&self) -> bool {
        use SerfClientError::*;

        !matches!(self, Timeout { .. } | Encode(_) | InvalidAddress { .. })
    }
}

/// `Connection refused` rather than `Connection refused (os error 111)`.
fn os_reason(error: &io::Error) -> String {
    let text = error.to_string();
    match text.find(" (os error ") {
        Some(end) => text[..end].to_string(),
        None => text,
    }
}
