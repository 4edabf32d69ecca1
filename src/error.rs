use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Bencode parsing error: {0}")]
    MalformedEncoding(String),

    #[error("Invalid torrent file: {0}")]
    InvalidTorrent(String),

    #[error("Invalid magnet link: {0}")]
    InvalidMagnet(String),

    #[error("Tracker error: {0}")]
    TrackerError(String),

    #[error("Connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Integrity check failed: {0}")]
    IntegrityMismatch(String),

    #[error("Peer does not support the metadata extension")]
    NoExtensionSupport,

    #[error("{missing} of {total} pieces could not be fetched from any peer")]
    InsufficientPeers { missing: usize, total: usize },

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(String),
}

impl From<url::ParseError> for SwarmError {
    fn from(err: url::ParseError) -> Self {
        SwarmError::UrlParseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
