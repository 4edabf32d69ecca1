use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swarm_fetch::bencode::{self, BencodeValue};
use swarm_fetch::client::{ClientConfig, TorrentClient};
use swarm_fetch::torrent::{self, MagnetLink, Metainfo};
use tokio::fs;
use tracing::info;

#[derive(Parser)]
#[command(name = "swarm-fetch")]
#[command(about = "Fetch a file from a BitTorrent swarm", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Port reported to trackers
    #[arg(long, global = true, default_value = "6881")]
    port: u16,

    /// Maximum number of peers to connect to
    #[arg(long, global = true, default_value = "50")]
    max_peers: usize,

    /// Per-read/write timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a bencoded value and print it as JSON
    Decode { value: String },

    /// Show information about a torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },

    /// List the peers a torrent's tracker returns
    Peers { torrent: PathBuf },

    /// Handshake with one peer and print its id
    Handshake {
        torrent: PathBuf,
        /// Peer address, e.g. 127.0.0.1:6881
        peer: SocketAddr,
    },

    /// Download and verify a single piece
    DownloadPiece {
        /// Where to write the piece
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        index: u32,
    },

    /// Download the whole file
    Download {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
    },

    /// Print the tracker and info hash of a magnet link
    MagnetParse { link: String },

    /// Extension handshake with the first peer of a magnet link
    MagnetHandshake { link: String },

    /// Fetch a magnet link's metadata and show it
    MagnetInfo { link: String },

    /// Fetch a magnet link's metadata, then one piece
    MagnetDownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        link: String,
        index: u32,
    },

    /// Fetch a magnet link's metadata, then the whole file
    MagnetDownload {
        #[arg(short, long)]
        output: PathBuf,
        link: String,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    fn client(&self) -> TorrentClient {
        TorrentClient::new(ClientConfig {
            listen_port: self.port,
            max_peers: self.max_peers,
            io_timeout: Duration::from_secs(self.timeout),
            ..ClientConfig::default()
        })
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Decode { value } => {
                let json = to_json(&bencode::decode(value.as_bytes())?);
                println!("{}", serde_json::to_string(&json)?);
            }

            Commands::Info { torrent } => {
                let metainfo = load(torrent).await?;
                show_torrent_info(&metainfo);
            }

            Commands::Peers { torrent } => {
                let metainfo = load(torrent).await?;
                for peer in self.client().peers(&metainfo).await? {
                    println!("{}", peer);
                }
            }

            Commands::Handshake { torrent, peer } => {
                let metainfo = load(torrent).await?;
                let remote = self.client().handshake(&metainfo, *peer).await?;
                println!("Peer ID: {}", hex::encode(remote));
            }

            Commands::DownloadPiece {
                output,
                torrent,
                index,
            } => {
                let metainfo = Arc::new(load(torrent).await?);
                let piece = self.client().download_piece(metainfo, *index).await?;
                save(output, &piece).await?;
                println!("Piece {} downloaded to {}.", index, output.display());
            }

            Commands::Download { output, torrent } => {
                let metainfo = Arc::new(load(torrent).await?);
                let content = self.client().download(metainfo).await?;
                save(output, &content).await?;
                println!("Downloaded {} to {}.", torrent.display(), output.display());
            }

            Commands::MagnetParse { link } => {
                let link = MagnetLink::parse(link)?;
                println!("Tracker URL: {}", link.tracker);
                println!("Info Hash: {}", link.info_hash_hex());
                if let Some(name) = &link.display_name {
                    println!("Name: {}", name);
                }
            }

            Commands::MagnetHandshake { link } => {
                let link = MagnetLink::parse(link)?;
                let (remote, ut_metadata) = self.client().magnet_handshake(&link).await?;
                println!("Peer ID: {}", hex::encode(remote));
                match ut_metadata {
                    Some(id) => println!("Peer Metadata Extension ID: {}", id),
                    None => println!("Peer does not offer ut_metadata"),
                }
            }

            Commands::MagnetInfo { link } => {
                let link = MagnetLink::parse(link)?;
                let metainfo = self.client().fetch_metadata(&link).await?;
                show_torrent_info(&metainfo);
            }

            Commands::MagnetDownloadPiece {
                output,
                link,
                index,
            } => {
                let link = MagnetLink::parse(link)?;
                let client = self.client();
                let metainfo = Arc::new(client.fetch_metadata(&link).await?);
                let piece = client.download_piece(metainfo, *index).await?;
                save(output, &piece).await?;
                println!("Piece {} downloaded to {}.", index, output.display());
            }

            Commands::MagnetDownload { output, link } => {
                let link = MagnetLink::parse(link)?;
                let client = self.client();
                let metainfo = Arc::new(client.fetch_metadata(&link).await?);
                let content = client.download(metainfo).await?;
                save(output, &content).await?;
                println!("Downloaded {} to {}.", link.info_hash_hex(), output.display());
            }
        }

        Ok(())
    }
}

async fn load(path: &Path) -> Result<Metainfo> {
    torrent::load_torrent_file(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn save(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

fn show_torrent_info(metainfo: &Metainfo) {
    println!("Tracker URL: {}", metainfo.announce);
    if let Some(name) = &metainfo.info.name {
        println!("Name: {}", name);
    }
    println!("Length: {}", metainfo.info.length);
    println!("Info Hash: {}", metainfo.info_hash_hex());
    println!("Piece Length: {}", metainfo.info.piece_length);
    println!("Piece Hashes:");
    for hash in metainfo.info.pieces.iter() {
        println!("{}", hash.to_hex());
    }
}

/// JSON view of a bencoded value. Byte strings are shown lossily as UTF-8.
fn to_json(value: &BencodeValue) -> Value {
    match value {
        BencodeValue::Integer(n) => Value::from(*n),
        BencodeValue::String(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        BencodeValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
        BencodeValue::Dict(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (String::from_utf8_lossy(key).into_owned(), to_json(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}
