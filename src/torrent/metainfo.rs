use super::Pieces;
use crate::bencode::{decode, dict_value_span, encode, BencodeValue};
use crate::error::{Result, SwarmError};
use crate::piece::{self, verify::digest};

/// The `info` dictionary of a single-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    /// Suggested file name
    pub name: Option<String>,
    /// Total content length in bytes
    pub length: u64,
    /// Nominal size of every piece but the last
    pub piece_length: u32,
    /// SHA-1 digest of every piece, in order
    pub pieces: Pieces,
}

impl TorrentInfo {
    /// Build and validate an info dictionary from its parts.
    pub fn new(
        name: Option<String>,
        length: u64,
        piece_length: u32,
        pieces: Pieces,
    ) -> Result<Self> {
        if length == 0 {
            return Err(SwarmError::InvalidTorrent("content length is zero".to_string()));
        }
        if piece_length == 0 {
            return Err(SwarmError::InvalidTorrent("piece length is zero".to_string()));
        }

        let expected = piece::piece_count(length, piece_length);
        if pieces.len() != expected {
            return Err(SwarmError::InvalidTorrent(format!(
                "{} piece hashes for {} bytes at {} bytes per piece (expected {})",
                pieces.len(),
                length,
                piece_length,
                expected
            )));
        }

        Ok(Self {
            name,
            length,
            piece_length,
            pieces,
        })
    }

    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(SwarmError::InvalidTorrent("info must be a dict".to_string()));
        }

        if value.dict_get(b"files").is_some() {
            return Err(SwarmError::InvalidTorrent(
                "multi-file torrents are not supported".to_string(),
            ));
        }

        let length = value
            .dict_get_int(b"length")
            .ok_or_else(|| SwarmError::InvalidTorrent("missing 'length' field".to_string()))?;
        let length = u64::try_from(length)
            .map_err(|_| SwarmError::InvalidTorrent(format!("negative length {}", length)))?;

        let piece_length = value.dict_get_int(b"piece length").ok_or_else(|| {
            SwarmError::InvalidTorrent("missing 'piece length' field".to_string())
        })?;
        let piece_length = u32::try_from(piece_length).map_err(|_| {
            SwarmError::InvalidTorrent(format!("piece length {} out of range", piece_length))
        })?;

        let pieces = value
            .dict_get_bytes(b"pieces")
            .ok_or_else(|| SwarmError::InvalidTorrent("missing 'pieces' field".to_string()))?;

        let name = value.dict_get_str(b"name").map(String::from);

        Self::new(name, length, piece_length, Pieces::from_bytes(pieces)?)
    }

    /// Canonical bencoding of this info dictionary
    pub fn to_bencode(&self) -> Vec<u8> {
        let mut entries = vec![
            ("length", BencodeValue::Integer(self.length as i64)),
            ("piece length", BencodeValue::Integer(i64::from(self.piece_length))),
            ("pieces", BencodeValue::String(self.pieces.to_bytes())),
        ];
        if let Some(name) = &self.name {
            entries.push(("name", BencodeValue::string(name.as_str())));
        }
        encode(&BencodeValue::dict(entries))
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Size in bytes of piece `index`, or `None` past the end
    pub fn piece_size(&self, index: u32) -> Option<u32> {
        if index as usize >= self.piece_count() {
            return None;
        }
        Some(piece::piece_size(self.length, self.piece_length, index))
    }
}

/// A parsed torrent: where to announce, what to fetch, and its identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    /// Tracker announce URL
    pub announce: String,
    pub info: TorrentInfo,
    /// SHA-1 of the info dictionary's exact bytes
    pub info_hash: [u8; 20],
}

impl Metainfo {
    /// Parse a `.torrent` file.
    ///
    /// The info hash is taken over the `info` value's original byte range,
    /// so non-canonical files still hash the way every other client sees them.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let value = decode(data)?;

        let announce = value
            .dict_get_str(b"announce")
            .ok_or_else(|| SwarmError::InvalidTorrent("missing 'announce' field".to_string()))?
            .to_string();

        let info_value = value
            .dict_get(b"info")
            .ok_or_else(|| SwarmError::InvalidTorrent("missing 'info' field".to_string()))?;
        let info = TorrentInfo::from_bencode(info_value)?;

        let span = dict_value_span(data, b"info")?
            .ok_or_else(|| SwarmError::InvalidTorrent("missing 'info' field".to_string()))?;

        Ok(Self {
            announce,
            info,
            info_hash: digest(&data[span]),
        })
    }

    /// Build a torrent from a raw info dictionary fetched from a peer.
    pub fn from_info_bytes(announce: String, raw_info: &[u8]) -> Result<Self> {
        let info = TorrentInfo::from_bencode(&decode(raw_info)?)?;

        Ok(Self {
            announce,
            info,
            info_hash: digest(raw_info),
        })
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}
