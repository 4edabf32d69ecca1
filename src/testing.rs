//! Scripted peers on loopback sockets for exercising the download paths.

use crate::peer::{ExtensionHandshake, Handshake, MetadataMessage, PeerMessage, HANDSHAKE_LEN};
use crate::piece::{self, verify::digest};
use crate::torrent::{Metainfo, Pieces, TorrentInfo};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const ANNOUNCE: &str = "http://127.0.0.1:6969/announce";
pub const SEEDER_ID: [u8; 20] = *b"-TS0001-seedseedseed";

/// Deterministic, non-repeating-per-piece content
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Raw info dictionary and parsed torrent for `data`
pub fn torrent_for(data: &[u8], piece_length: u32) -> (Vec<u8>, Metainfo) {
    let hashes: Vec<u8> = data
        .chunks(piece_length as usize)
        .flat_map(digest)
        .collect();
    let info = TorrentInfo::new(
        Some("content.bin".to_string()),
        data.len() as u64,
        piece_length,
        Pieces::from_bytes(&hashes).unwrap(),
    )
    .unwrap();
    let raw = info.to_bencode();
    let metainfo = Metainfo::from_info_bytes(ANNOUNCE.to_string(), &raw).unwrap();
    (raw, metainfo)
}

/// How a simulated seeder misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeder {
    Honest,
    /// Closes the socket as soon as our handshake arrives
    Refuses,
    /// Flips a byte in every block it serves
    Corrupts,
    /// Unchokes, then never answers a request
    Stalls,
}

struct Seed {
    data: Vec<u8>,
    piece_length: u32,
    info_hash: [u8; 20],
    behavior: Seeder,
}

/// Serve `data` from a fresh loopback listener until the test ends
pub async fn spawn_seeder(
    data: &[u8],
    piece_length: u32,
    info_hash: [u8; 20],
    behavior: Seeder,
) -> SocketAddr {
    let seed = Arc::new(Seed {
        data: data.to_vec(),
        piece_length,
        info_hash,
        behavior,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let seed = seed.clone();
            tokio::spawn(async move {
                let _ = serve_pieces(socket, seed).await;
            });
        }
    });

    addr
}

async fn read_frame(socket: &mut TcpStream) -> io::Result<PeerMessage> {
    let mut len = [0u8; 4];
    socket.read_exact(&mut len).await?;
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    socket.read_exact(&mut body).await?;
    PeerMessage::from_body(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn serve_pieces(mut socket: TcpStream, seed: Arc<Seed>) -> io::Result<()> {
    let mut handshake = [0u8; HANDSHAKE_LEN];
    socket.read_exact(&mut handshake).await?;
    if seed.behavior == Seeder::Refuses {
        return Ok(());
    }

    socket
        .write_all(&Handshake::new(seed.info_hash, SEEDER_ID).to_bytes())
        .await?;

    let count = piece::piece_count(seed.data.len() as u64, seed.piece_length);
    let bitfield = PeerMessage::Bitfield {
        bitfield: vec![0xff; count.div_ceil(8)],
    };
    socket.write_all(&bitfield.to_bytes()).await?;

    loop {
        match read_frame(&mut socket).await? {
            PeerMessage::Interested => {
                socket.write_all(&PeerMessage::Unchoke.to_bytes()).await?;
            }
            PeerMessage::Request { block } => {
                if seed.behavior == Seeder::Stalls {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    return Ok(());
                }

                let start = block.piece_index as usize * seed.piece_length as usize
                    + block.offset as usize;
                let mut data = seed.data[start..start + block.length as usize].to_vec();
                if seed.behavior == Seeder::Corrupts {
                    data[0] ^= 0xff;
                }

                let reply = PeerMessage::Piece {
                    piece_index: block.piece_index,
                    offset: block.offset,
                    data,
                };
                socket.write_all(&reply.to_bytes()).await?;
            }
            _ => {}
        }
    }
}

/// How a simulated metadata source behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    /// Sends the info dictionary it was given
    Honest,
    /// Sends the info dictionary with one byte changed
    Tampered,
    /// Does not set the extension bit in its handshake
    NoExtensions,
}

/// Serve `raw_info` over `ut_metadata`, advertised under `ut_metadata_id`.
///
/// A request addressed to any other id makes the seeder hang up.
pub async fn spawn_metadata_seeder(
    raw_info: &[u8],
    info_hash: [u8; 20],
    ut_metadata_id: u8,
    behavior: MetadataSource,
) -> SocketAddr {
    let raw_info = Arc::new(raw_info.to_vec());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let raw_info = raw_info.clone();
            tokio::spawn(async move {
                let _ = serve_metadata(socket, &raw_info, info_hash, ut_metadata_id, behavior)
                    .await;
            });
        }
    });

    addr
}

async fn serve_metadata(
    mut socket: TcpStream,
    raw_info: &[u8],
    info_hash: [u8; 20],
    ut_metadata_id: u8,
    behavior: MetadataSource,
) -> io::Result<()> {
    let mut handshake = [0u8; HANDSHAKE_LEN];
    socket.read_exact(&mut handshake).await?;
    let ours = Handshake::from_bytes(&handshake)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if !ours.supports_extensions() {
        return Ok(());
    }

    let reply = match behavior {
        MetadataSource::NoExtensions => Handshake::new(info_hash, SEEDER_ID),
        _ => Handshake::with_extensions(info_hash, SEEDER_ID),
    };
    socket.write_all(&reply.to_bytes()).await?;
    socket
        .write_all(&PeerMessage::Bitfield { bitfield: vec![0xff] }.to_bytes())
        .await?;

    let their_extensions = loop {
        if let PeerMessage::Extended { id: 0, payload } = read_frame(&mut socket).await? {
            break ExtensionHandshake::decode(&payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
    };
    let reply_id = their_extensions
        .extension_id("ut_metadata")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no ut_metadata"))?;

    let mut ours = ExtensionHandshake::default();
    ours.extensions.insert("ut_metadata".to_string(), ut_metadata_id);
    ours.metadata_size = Some(raw_info.len());
    socket
        .write_all(
            &PeerMessage::Extended {
                id: 0,
                payload: ours.encode(),
            }
            .to_bytes(),
        )
        .await?;

    loop {
        let (id, payload) = match read_frame(&mut socket).await? {
            PeerMessage::Extended { id, payload } => (id, payload),
            _ => continue,
        };
        if id != ut_metadata_id {
            return Ok(());
        }

        let piece = match MetadataMessage::decode(&payload) {
            Ok(MetadataMessage::Request { piece }) => piece,
            _ => return Ok(()),
        };

        let mut data = raw_info.to_vec();
        if behavior == MetadataSource::Tampered {
            let last = data.len() - 2;
            data[last] ^= 0x01;
        }

        let answer = MetadataMessage::Data {
            piece,
            total_size: data.len(),
            data,
        };
        socket
            .write_all(
                &PeerMessage::Extended {
                    id: reply_id,
                    payload: answer.encode(),
                }
                .to_bytes(),
            )
            .await?;
    }
}
