use crate::error::{Result, SwarmError};
use crate::peer::extension::{METADATA_PIECE_SIZE, UT_METADATA};
use crate::peer::{MetadataMessage, PeerConfig, PeerConnection};
use crate::piece::verify::verify;
use crate::torrent::{MagnetLink, Metainfo};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Fetches a torrent's info dictionary from peers over `ut_metadata`.
///
/// Only metadata that fits in one 16 KiB piece is supported.
pub struct MetadataFetcher {
    config: PeerConfig,
}

impl MetadataFetcher {
    pub fn new(config: PeerConfig) -> Self {
        Self { config }
    }

    /// Try each peer in turn until one hands over metadata matching the
    /// link's info hash. Returns the last peer's error if none did.
    pub async fn fetch(&self, link: &MagnetLink, peers: &[SocketAddr]) -> Result<Metainfo> {
        let mut last_error = None;

        for &addr in peers {
            match self.fetch_from(link, addr).await {
                Ok(metainfo) => return Ok(metainfo),
                Err(e) => {
                    warn!("No metadata from {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(SwarmError::InsufficientPeers {
            missing: 1,
            total: 1,
        }))
    }

    /// Fetch and verify the metadata from a single peer
    pub async fn fetch_from(&self, link: &MagnetLink, addr: SocketAddr) -> Result<Metainfo> {
        let mut conn = PeerConnection::connect(addr, link.info_hash, &self.config, true).await?;

        let theirs = conn.extension_handshake().await?;
        let Some(ut_metadata) = theirs.extension_id(UT_METADATA) else {
            return Err(conn.fail(SwarmError::NoExtensionSupport));
        };
        if let Some(size) = theirs.metadata_size {
            if size > METADATA_PIECE_SIZE {
                return Err(conn.fail(multi_piece(size)));
            }
        }

        let raw_info = match conn.request_metadata(ut_metadata, 0).await? {
            MetadataMessage::Data {
                piece: 0,
                total_size,
                mut data,
            } => {
                if total_size > data.len() {
                    return Err(conn.fail(multi_piece(total_size)));
                }
                data.truncate(total_size);
                data
            }
            MetadataMessage::Reject { .. } => {
                return Err(conn.fail(SwarmError::ProtocolViolation(format!(
                    "{} rejected the metadata request",
                    addr
                ))))
            }
            other => {
                return Err(conn.fail(SwarmError::ProtocolViolation(format!(
                    "unexpected metadata answer from {}: {:?}",
                    addr, other
                ))))
            }
        };

        if !verify(&raw_info, &link.info_hash) {
            return Err(conn.fail(SwarmError::IntegrityMismatch(format!(
                "metadata from {} does not hash to {}",
                addr,
                link.info_hash_hex()
            ))));
        }

        let metainfo =
            Metainfo::from_info_bytes(link.tracker.clone(), &raw_info).map_err(|e| conn.fail(e))?;
        info!(
            "Fetched {} bytes of metadata for {} from {}",
            raw_info.len(),
            link.info_hash_hex(),
            addr
        );
        Ok(metainfo)
    }
}

fn multi_piece(size: usize) -> SwarmError {
    SwarmError::ProtocolViolation(format!(
        "metadata is {} bytes; only a single {} byte piece is supported",
        size, METADATA_PIECE_SIZE
    ))
}
