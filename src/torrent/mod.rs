mod magnet;
mod metainfo;
mod piece;

pub use magnet::MagnetLink;
pub use metainfo::{Metainfo, TorrentInfo};
pub use piece::{PieceHash, Pieces, HASH_LEN};

use crate::error::Result;
use std::path::Path;
use tokio::fs;

/// Load and parse a .torrent file
pub async fn load_torrent_file<P: AsRef<Path>>(path: P) -> Result<Metainfo> {
    let data = fs::read(path).await?;
    parse_torrent(&data)
}

/// Parse torrent data from bytes
pub fn parse_torrent(data: &[u8]) -> Result<Metainfo> {
    Metainfo::from_bytes(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode, BencodeValue};
    use crate::error::SwarmError;
    use crate::piece::verify::digest;

    fn torrent_bytes(length: i64, piece_length: i64, pieces: Vec<u8>) -> Vec<u8> {
        encode(&BencodeValue::dict([
            ("announce", BencodeValue::string("http://127.0.0.1:6969/announce")),
            (
                "info",
                BencodeValue::dict([
                    ("length", BencodeValue::Integer(length)),
                    ("name", BencodeValue::string("sample.txt")),
                    ("piece length", BencodeValue::Integer(piece_length)),
                    ("pieces", BencodeValue::String(pieces)),
                ]),
            ),
        ]))
    }

    #[test]
    fn test_parse_single_file_torrent() {
        let hashes: Vec<u8> = (0..3u8).flat_map(|i| [i; 20]).collect();
        let data = torrent_bytes(92063, 32768, hashes);
        let metainfo = parse_torrent(&data).unwrap();

        assert_eq!(metainfo.announce, "http://127.0.0.1:6969/announce");
        assert_eq!(metainfo.info.name.as_deref(), Some("sample.txt"));
        assert_eq!(metainfo.info.length, 92063);
        assert_eq!(metainfo.info.piece_length, 32768);
        assert_eq!(metainfo.info.piece_count(), 3);
        assert_eq!(metainfo.info.pieces.get(2).unwrap().as_bytes(), &[2u8; 20]);
        assert_eq!(metainfo.info.piece_size(0), Some(32768));
        assert_eq!(metainfo.info.piece_size(2), Some(92063 - 2 * 32768));
        assert_eq!(metainfo.info.piece_size(3), None);
    }

    #[test]
    fn test_info_hash_covers_exact_info_bytes() {
        let hashes = vec![0xAB; 20];
        let data = torrent_bytes(10, 16, hashes);
        let metainfo = parse_torrent(&data).unwrap();

        let info_start = data.windows(6).position(|w| w == b"4:info").unwrap() + 6;
        let info_bytes = &data[info_start..data.len() - 1];
        assert_eq!(metainfo.info_hash, digest(info_bytes));

        // Canonical input, so re-encoding the parsed info must agree
        assert_eq!(metainfo.info.to_bencode(), info_bytes);
    }

    #[test]
    fn test_from_info_bytes() {
        let info = TorrentInfo::new(
            Some("a.bin".to_string()),
            40000,
            16384,
            Pieces::from_bytes(&[1u8; 60]).unwrap(),
        )
        .unwrap();
        let raw = info.to_bencode();

        let metainfo = Metainfo::from_info_bytes("http://t/announce".to_string(), &raw).unwrap();
        assert_eq!(metainfo.info, info);
        assert_eq!(metainfo.info_hash, digest(&raw));
    }

    #[test]
    fn test_piece_count_must_match_length() {
        let data = torrent_bytes(1_000_000, 262_144, vec![0; 3 * 20]);
        assert!(matches!(
            parse_torrent(&data),
            Err(SwarmError::InvalidTorrent(_))
        ));

        let data = torrent_bytes(1_000_000, 262_144, vec![0; 4 * 20]);
        assert_eq!(parse_torrent(&data).unwrap().info.piece_count(), 4);
    }

    #[test]
    fn test_rejects_invalid_torrents() {
        assert!(matches!(
            parse_torrent(&torrent_bytes(10, 16, vec![0; 19])),
            Err(SwarmError::InvalidTorrent(_))
        ));
        assert!(matches!(
            parse_torrent(&torrent_bytes(-1, 16, vec![0; 20])),
            Err(SwarmError::InvalidTorrent(_))
        ));
        assert!(matches!(
            parse_torrent(&torrent_bytes(10, 0, vec![0; 20])),
            Err(SwarmError::InvalidTorrent(_))
        ));

        let multi_file = encode(&BencodeValue::dict([
            ("announce", BencodeValue::string("http://t/announce")),
            (
                "info",
                BencodeValue::dict([
                    ("files", BencodeValue::List(vec![])),
                    ("piece length", BencodeValue::Integer(16)),
                    ("pieces", BencodeValue::string("")),
                ]),
            ),
        ]));
        assert!(matches!(
            parse_torrent(&multi_file),
            Err(SwarmError::InvalidTorrent(_))
        ));

        assert!(matches!(
            parse_torrent(b"d8:announce1:xe"),
            Err(SwarmError::InvalidTorrent(_))
        ));
        assert!(matches!(
            parse_torrent(b"d8:announce"),
            Err(SwarmError::MalformedEncoding(_))
        ));
    }
}
