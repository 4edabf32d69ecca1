mod connection;
pub mod extension;
mod message;
mod protocol;

pub use connection::PeerConnection;
pub use extension::{ExtensionHandshake, MetadataMessage};
pub use message::{BlockInfo, PeerMessage};
pub use protocol::{Handshake, HANDSHAKE_LEN, PROTOCOL_STRING};

use crate::error::SwarmError;
use std::time::Duration;

/// Where a peer session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    HandshakeSent,
    HandshakeVerified,
    AwaitingBitfield,
    Interested,
    Unchoked,
    Requesting,
    AwaitingBlock,
    PieceComplete,
    Failed(FailureReason),
}

/// Why a session ended up in [`SessionState::Failed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ConnectionRejected,
    ProtocolViolation,
    Transport,
    IntegrityMismatch,
    NoExtensionSupport,
}

impl From<&SwarmError> for FailureReason {
    fn from(err: &SwarmError) -> Self {
        match err {
            SwarmError::ConnectionRejected(_) => FailureReason::ConnectionRejected,
            SwarmError::Transport(_) | SwarmError::Timeout(_) => FailureReason::Transport,
            SwarmError::IntegrityMismatch(_) => FailureReason::IntegrityMismatch,
            SwarmError::NoExtensionSupport => FailureReason::NoExtensionSupport,
            _ => FailureReason::ProtocolViolation,
        }
    }
}

/// Settings shared by every connection this client opens
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Our 20-byte peer id, sent in every handshake
    pub peer_id: [u8; 20],
    pub connect_timeout: Duration,
    /// Upper bound on any single read or write
    pub io_timeout: Duration,
}

impl PeerConfig {
    pub fn new(peer_id: [u8; 20]) -> Self {
        Self {
            peer_id,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
        }
    }
}
