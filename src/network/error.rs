use std::time::Duration;

use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(u64),

    #[error("Invalid address for peer {peer}: {reason}")]
    InvalidAddress { peer: u64, reason: String },

    #[error("Receive buffer full at peer {0}")]
    ReceiveBufferFull(u64),

    #[error("Send to peer {peer} timed out after {after:?}")]
    Timeout { peer: u64, after: Duration },

    /// The peer answered `success: false`. Our own service reports
    /// failures as gRPC statuses; other implementations of the envelope
    /// may not.
    #[error("Peer {peer} rejected message: {reason}")]
    Rejected { peer: u64, reason: String },

    #[error("gRPC error: {0}")]
    Rpc(#[from] Status),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport is shut down")]
    Shutdown,

    #[error("Transport error: {0}")]
    Serve(#[from] tonic::transport::Error),
}

impl TransportError {
    /// True when the peer was reached but dropped the message.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, TransportError::ReceiveBufferFull(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}
