//! Errors raised by the hook command transport
//!
//! Display strings name the failing step only; the underlying cause is
//! exposed through `source()` so callers can print the full chain.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("dial unix {}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("rpc: encoding {what}")]
    Encode {
        what: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("rpc: decoding {what}")]
    Decode {
        what: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("rpc: unsupported protocol version {0}")]
    Version(u32),

    /// Error reported by the remote side instead of a response
    #[error("{0}")]
    Server(String),

    #[error("rpc: reply sequence {got} does not match call sequence {want}")]
    UnexpectedReply { want: u64, got: u64 },

    #[error("unexpected EOF")]
    Shutdown,
}

impl RpcError {
    /// True when the failure happened before any request reached the peer
    pub fn is_connect(&self) -> bool {
        matches!(self, RpcError::Connect { .. })
    }
}
