mod metadata;

pub use metadata::MetadataFetcher;

use crate::error::{Result, SwarmError};
use crate::peer::{extension::UT_METADATA, PeerConfig, PeerConnection};
use crate::piece::PieceScheduler;
use crate::torrent::{MagnetLink, Metainfo};
use crate::tracker::{generate_peer_id, TrackerClient, TrackerRequest};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Tracker `left` for a magnet link, before the real length is known.
/// Trackers only need it to be non-zero.
const UNKNOWN_LEFT: u64 = 999;

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port reported to the tracker
    pub listen_port: u16,
    /// Upper bound on peers taken from a tracker response
    pub max_peers: usize,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen_port: 6881,
            max_peers: 50,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
        }
    }
}

/// Main client: tracker lookups, peer sessions and downloads
pub struct TorrentClient {
    config: ClientConfig,
    peer_id: [u8; 20],
    tracker: TrackerClient,
}

impl TorrentClient {
    pub fn new(config: ClientConfig) -> Self {
        let peer_id = generate_peer_id();
        info!("Client initialized with peer_id: {}", hex::encode(peer_id));

        Self {
            config,
            peer_id,
            tracker: TrackerClient::new(),
        }
    }

    pub fn peer_id(&self) -> &[u8; 20] {
        &self.peer_id
    }

    fn peer_config(&self) -> PeerConfig {
        PeerConfig {
            peer_id: self.peer_id,
            connect_timeout: self.config.connect_timeout,
            io_timeout: self.config.io_timeout,
        }
    }

    async fn announce(
        &self,
        tracker_url: &str,
        info_hash: [u8; 20],
        left: u64,
    ) -> Result<Vec<SocketAddr>> {
        let request = TrackerRequest::new(info_hash, self.peer_id, self.config.listen_port, left);
        let response = self.tracker.announce(tracker_url, &request).await?;

        let mut peers: Vec<SocketAddr> =
            response.peers.into_iter().map(|peer| peer.addr).collect();
        if peers.len() > self.config.max_peers {
            info!(
                "Using {} of {} peers",
                self.config.max_peers,
                peers.len()
            );
            peers.truncate(self.config.max_peers);
        }
        Ok(peers)
    }

    /// Ask the torrent's tracker for peers
    pub async fn peers(&self, metainfo: &Metainfo) -> Result<Vec<SocketAddr>> {
        self.announce(&metainfo.announce, metainfo.info_hash, metainfo.info.length)
            .await
    }

    /// Handshake with one peer and return the id it reported
    pub async fn handshake(&self, metainfo: &Metainfo, addr: SocketAddr) -> Result<[u8; 20]> {
        let conn =
            PeerConnection::connect(addr, metainfo.info_hash, &self.peer_config(), false).await?;
        Ok(*conn.remote_id())
    }

    /// Download the whole content from the tracker's peers
    pub async fn download(&self, metainfo: Arc<Metainfo>) -> Result<Vec<u8>> {
        info!(
            "Starting download of {} ({} bytes, {} pieces)",
            metainfo.info_hash_hex(),
            metainfo.info.length,
            metainfo.info.piece_count()
        );

        let peers = self.peers(&metainfo).await?;
        PieceScheduler::new(metainfo, self.peer_config())
            .download(&peers)
            .await
    }

    /// Download and verify a single piece
    pub async fn download_piece(&self, metainfo: Arc<Metainfo>, index: u32) -> Result<Vec<u8>> {
        let peers = self.peers(&metainfo).await?;
        let mut pieces = PieceScheduler::new(metainfo, self.peer_config())
            .download_pieces([index], &peers)
            .await?;

        pieces.pop().ok_or(SwarmError::InsufficientPeers {
            missing: 1,
            total: 1,
        })
    }

    /// Ask the magnet link's tracker for peers
    pub async fn magnet_peers(&self, link: &MagnetLink) -> Result<Vec<SocketAddr>> {
        self.announce(&link.tracker, link.info_hash, UNKNOWN_LEFT).await
    }

    /// Extension handshake with the first peer of a magnet link's swarm.
    ///
    /// Returns the peer's id and the id it uses for `ut_metadata`.
    pub async fn magnet_handshake(&self, link: &MagnetLink) -> Result<([u8; 20], Option<u8>)> {
        let addr = *self
            .magnet_peers(link)
            .await?
            .first()
            .ok_or(SwarmError::InsufficientPeers {
                missing: 1,
                total: 1,
            })?;

        let mut conn =
            PeerConnection::connect(addr, link.info_hash, &self.peer_config(), true).await?;
        let theirs = conn.extension_handshake().await?;
        Ok((*conn.remote_id(), theirs.extension_id(UT_METADATA)))
    }

    /// Resolve a magnet link into a full torrent via its swarm
    pub async fn fetch_metadata(&self, link: &MagnetLink) -> Result<Metainfo> {
        let peers = self.magnet_peers(link).await?;
        MetadataFetcher::new(self.peer_config())
            .fetch(link, &peers)
            .await
    }
}

impl Default for TorrentClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
