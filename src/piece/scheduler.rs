use super::queue::WorkQueue;
use super::verify::verify;
use crate::error::{Result, SwarmError};
use crate::peer::{PeerConfig, PeerConnection};
use crate::torrent::Metainfo;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Downloads pieces from a set of peers, one worker per peer, all pulling
/// from a shared [`WorkQueue`].
pub struct PieceScheduler {
    metainfo: Arc<Metainfo>,
    config: PeerConfig,
}

impl PieceScheduler {
    pub fn new(metainfo: Arc<Metainfo>, config: PeerConfig) -> Self {
        Self { metainfo, config }
    }

    /// Download every piece and return the content in order
    pub async fn download(&self, peers: &[SocketAddr]) -> Result<Vec<u8>> {
        let count = self.metainfo.info.piece_count() as u32;
        let pieces = self.download_pieces(0..count, peers).await?;

        let content = pieces.concat();
        info!(
            "Downloaded {} bytes in {} pieces",
            content.len(),
            pieces.len()
        );
        Ok(content)
    }

    /// Download the given pieces, returned in ascending index order.
    ///
    /// Fails with [`SwarmError::InsufficientPeers`] if the workers all gave
    /// up before every index was verified.
    pub async fn download_pieces(
        &self,
        indices: impl IntoIterator<Item = u32>,
        peers: &[SocketAddr],
    ) -> Result<Vec<Vec<u8>>> {
        let count = self.metainfo.info.piece_count();
        let wanted: BTreeSet<u32> = indices.into_iter().collect();
        if let Some(&bad) = wanted.iter().find(|&&index| index as usize >= count) {
            return Err(SwarmError::InvalidTorrent(format!(
                "piece {} out of range, torrent has {} pieces",
                bad, count
            )));
        }

        let queue = Arc::new(WorkQueue::new(wanted.iter().copied()));
        info!(
            "Scheduling {} pieces across {} peers",
            wanted.len(),
            peers.len()
        );

        let mut workers = JoinSet::new();
        for &addr in peers {
            workers.spawn(run_worker(
                addr,
                self.metainfo.clone(),
                queue.clone(),
                self.config.clone(),
            ));
        }

        let mut slots: Vec<Option<Vec<u8>>> = vec![None; count];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(fetched) => {
                    for (index, data) in fetched {
                        slots[index as usize] = Some(data);
                    }
                }
                Err(e) => error!("Download worker failed: {}", e),
            }
        }

        let missing = wanted
            .iter()
            .filter(|&&index| slots[index as usize].is_none())
            .count();
        if missing > 0 {
            return Err(SwarmError::InsufficientPeers {
                missing,
                total: wanted.len(),
            });
        }

        Ok(wanted
            .iter()
            .filter_map(|&index| slots[index as usize].take())
            .collect())
    }
}

/// Claim, fetch and verify pieces from one peer until the queue runs dry.
///
/// The first failure ends the worker; whatever index it held goes back on
/// the queue for the others.
async fn run_worker(
    addr: SocketAddr,
    metainfo: Arc<Metainfo>,
    queue: Arc<WorkQueue>,
    config: PeerConfig,
) -> Vec<(u32, Vec<u8>)> {
    let mut fetched = Vec::new();

    let mut conn = match PeerConnection::connect(addr, metainfo.info_hash, &config, false).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Peer {} unavailable: {}", addr, e);
            return fetched;
        }
    };
    if let Err(e) = conn.prepare().await {
        warn!("Peer {} never unchoked us: {}", addr, e);
        return fetched;
    }

    while let Some(claim) = queue.claim().await {
        let index = claim.index();
        match fetch_verified(&mut conn, &metainfo, index).await {
            Ok(data) => {
                claim.complete();
                fetched.push((index, data));
            }
            Err(e) => {
                warn!("Returning piece {} to the queue after {}: {}", index, addr, e);
                claim.requeue();
                break;
            }
        }
    }

    debug!("Worker for {} done with {} pieces", addr, fetched.len());
    fetched
}

async fn fetch_verified<S>(
    conn: &mut PeerConnection<S>,
    metainfo: &Metainfo,
    index: u32,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (size, expected) = metainfo
        .info
        .piece_size(index)
        .zip(metainfo.info.pieces.get(index as usize))
        .ok_or_else(|| SwarmError::InvalidTorrent(format!("no piece {}", index)))?;

    let data = conn.download_piece(index, size).await?;
    if !verify(&data, expected.as_bytes()) {
        return Err(conn.fail(SwarmError::IntegrityMismatch(format!(
            "piece {} from {} does not match its hash",
            index,
            conn.addr()
        ))));
    }

    debug!("Piece {} verified", index);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{content, spawn_seeder, torrent_for, Seeder};
    use std::time::Duration;

    fn config() -> PeerConfig {
        let mut config = PeerConfig::new(*b"-SF0001-testtesttest");
        config.connect_timeout = Duration::from_secs(2);
        config.io_timeout = Duration::from_millis(500);
        config
    }

    #[tokio::test]
    async fn test_download_two_pieces_from_one_peer() {
        let data = content(65_536);
        let (_, metainfo) = torrent_for(&data, 32_768);
        let peer = spawn_seeder(&data, 32_768, metainfo.info_hash, Seeder::Honest).await;

        let scheduler = PieceScheduler::new(Arc::new(metainfo), config());
        assert_eq!(scheduler.download(&[peer]).await.unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_short_last_piece_across_peers() {
        let data = content(5 * 16_384 + 7_232);
        let (_, metainfo) = torrent_for(&data, 16_384);
        let hash = metainfo.info_hash;

        let mut peers = Vec::new();
        for _ in 0..3 {
            peers.push(spawn_seeder(&data, 16_384, hash, Seeder::Honest).await);
        }

        let scheduler = PieceScheduler::new(Arc::new(metainfo), config());
        assert_eq!(scheduler.download(&peers).await.unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bad_peers_do_not_break_download() {
        let data = content(4 * 16_384);
        let (_, metainfo) = torrent_for(&data, 16_384);
        let hash = metainfo.info_hash;

        let peers = vec![
            spawn_seeder(&data, 16_384, hash, Seeder::Refuses).await,
            spawn_seeder(&data, 16_384, hash, Seeder::Corrupts).await,
            spawn_seeder(&data, 16_384, hash, Seeder::Stalls).await,
            spawn_seeder(&data, 16_384, hash, Seeder::Honest).await,
        ];

        let scheduler = PieceScheduler::new(Arc::new(metainfo), config());
        assert_eq!(scheduler.download(&peers).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_corrupt_piece_is_requeued() {
        let data = content(3 * 16_384);
        let (_, metainfo) = torrent_for(&data, 16_384);
        let peer = spawn_seeder(&data, 16_384, metainfo.info_hash, Seeder::Corrupts).await;

        let queue = Arc::new(WorkQueue::new(0..3));
        let fetched = run_worker(peer, Arc::new(metainfo), queue.clone(), config()).await;

        assert!(fetched.is_empty());
        assert_eq!(queue.pending(), vec![1, 2, 0]);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_no_usable_peers() {
        let data = content(2 * 16_384);
        let (_, metainfo) = torrent_for(&data, 16_384);
        let refusing = spawn_seeder(&data, 16_384, metainfo.info_hash, Seeder::Refuses).await;
        let scheduler = PieceScheduler::new(Arc::new(metainfo), config());

        assert!(matches!(
            scheduler.download(&[]).await,
            Err(SwarmError::InsufficientPeers {
                missing: 2,
                total: 2
            })
        ));
        assert!(matches!(
            scheduler.download(&[refusing]).await,
            Err(SwarmError::InsufficientPeers {
                missing: 2,
                total: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_download_selected_pieces() {
        let data = content(3 * 16_384);
        let (_, metainfo) = torrent_for(&data, 16_384);
        let peer = spawn_seeder(&data, 16_384, metainfo.info_hash, Seeder::Honest).await;
        let scheduler = PieceScheduler::new(Arc::new(metainfo), config());

        let pieces = scheduler.download_pieces([2, 0], &[peer]).await.unwrap();
        assert_eq!(pieces, vec![data[..16_384].to_vec(), data[32_768..].to_vec()]);

        assert!(matches!(
            scheduler.download_pieces([3], &[peer]).await,
            Err(SwarmError::InvalidTorrent(_))
        ));
    }
}
