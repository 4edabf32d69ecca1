//! Extension protocol (BEP 10) and the `ut_metadata` exchange (BEP 9).

use crate::bencode::{decode, decode_prefix, encode, BencodeValue};
use crate::error::{Result, SwarmError};
use std::collections::BTreeMap;

/// Extended-message id reserved for the extension handshake
pub const HANDSHAKE_ID: u8 = 0;

pub const UT_METADATA: &str = "ut_metadata";

/// The id we ask peers to use when sending us `ut_metadata` messages
pub const LOCAL_UT_METADATA_ID: u8 = 16;

/// Metadata is exchanged in 16 KiB pieces
pub const METADATA_PIECE_SIZE: usize = 16 * 1024;

/// The dictionary exchanged as extended message 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionHandshake {
    /// Extension name -> the id the sender wants to receive it under
    pub extensions: BTreeMap<String, u8>,
    /// Size of the info dictionary, if the sender has it
    pub metadata_size: Option<usize>,
}

impl ExtensionHandshake {
    /// Our own handshake: `{m: {ut_metadata: 16}}`
    pub fn local() -> Self {
        let mut extensions = BTreeMap::new();
        extensions.insert(UT_METADATA.to_string(), LOCAL_UT_METADATA_ID);
        Self {
            extensions,
            metadata_size: None,
        }
    }

    pub fn extension_id(&self, name: &str) -> Option<u8> {
        self.extensions.get(name).copied()
    }

    pub fn encode(&self) -> Vec<u8> {
        let m = self
            .extensions
            .iter()
            .map(|(name, id)| (name.as_bytes().to_vec(), BencodeValue::Integer(i64::from(*id))))
            .collect();

        let mut dict = BTreeMap::new();
        dict.insert(b"m".to_vec(), BencodeValue::Dict(m));
        if let Some(size) = self.metadata_size {
            dict.insert(b"metadata_size".to_vec(), BencodeValue::Integer(size as i64));
        }
        encode(&BencodeValue::Dict(dict))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let value = decode(payload)?;
        let m = value.dict_get(b"m").and_then(|m| m.as_dict()).ok_or_else(|| {
            SwarmError::ProtocolViolation("extension handshake has no 'm' dictionary".to_string())
        })?;

        // Id 0 means "disabled"; ids that do not fit a byte are ignored
        let extensions = m
            .iter()
            .filter_map(|(name, id)| {
                let name = std::str::from_utf8(name).ok()?;
                let id = u8::try_from(id.as_integer()?).ok().filter(|&id| id != 0)?;
                Some((name.to_string(), id))
            })
            .collect();

        let metadata_size = value
            .dict_get_int(b"metadata_size")
            .and_then(|size| usize::try_from(size).ok());

        Ok(Self {
            extensions,
            metadata_size,
        })
    }
}

/// A `ut_metadata` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataMessage {
    Request { piece: u32 },
    Data {
        piece: u32,
        total_size: usize,
        data: Vec<u8>,
    },
    Reject { piece: u32 },
}

impl MetadataMessage {
    const REQUEST: i64 = 0;
    const DATA: i64 = 1;
    const REJECT: i64 = 2;

    /// Bencoded header, followed by the raw piece for data messages
    pub fn encode(&self) -> Vec<u8> {
        let (msg_type, piece) = match self {
            MetadataMessage::Request { piece } => (Self::REQUEST, *piece),
            MetadataMessage::Data { piece, .. } => (Self::DATA, *piece),
            MetadataMessage::Reject { piece } => (Self::REJECT, *piece),
        };

        let mut header = vec![
            ("msg_type", BencodeValue::Integer(msg_type)),
            ("piece", BencodeValue::Integer(i64::from(piece))),
        ];
        if let MetadataMessage::Data { total_size, .. } = self {
            header.push(("total_size", BencodeValue::Integer(*total_size as i64)));
        }

        let mut out = encode(&BencodeValue::dict(header));
        if let MetadataMessage::Data { data, .. } = self {
            out.extend_from_slice(data);
        }
        out
    }

    /// Split a payload into its dictionary header and trailing raw bytes.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (header, consumed) = decode_prefix(payload)?;

        let field = |key: &str| -> Result<i64> {
            header.dict_get_int(key.as_bytes()).ok_or_else(|| {
                SwarmError::ProtocolViolation(format!("metadata message has no '{}'", key))
            })
        };

        let piece = u32::try_from(field("piece")?).map_err(|_| {
            SwarmError::ProtocolViolation("metadata piece index out of range".to_string())
        })?;

        match field("msg_type")? {
            Self::REQUEST => Ok(MetadataMessage::Request { piece }),
            Self::REJECT => Ok(MetadataMessage::Reject { piece }),
            Self::DATA => {
                let data = payload[consumed..].to_vec();
                // total_size is mandatory in BEP 9 but not every peer sends it
                let total_size = header
                    .dict_get_int(b"total_size")
                    .and_then(|size| usize::try_from(size).ok())
                    .unwrap_or(data.len());
                Ok(MetadataMessage::Data {
                    piece,
                    total_size,
                    data,
                })
            }
            other => Err(SwarmError::ProtocolViolation(format!(
                "unknown metadata msg_type {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_handshake_encoding() {
        assert_eq!(
            ExtensionHandshake::local().encode(),
            b"d1:md11:ut_metadatai16eee"
        );
    }

    #[test]
    fn test_decode_peer_handshake() {
        let payload = b"d1:md11:ut_metadatai3e6:ut_pexi0e5:largei999ee13:metadata_sizei132e1:v4:teste";
        let handshake = ExtensionHandshake::decode(payload).unwrap();

        assert_eq!(handshake.extension_id(UT_METADATA), Some(3));
        assert_eq!(handshake.extension_id("ut_pex"), None);
        assert_eq!(handshake.extension_id("large"), None);
        assert_eq!(handshake.metadata_size, Some(132));

        assert!(ExtensionHandshake::decode(b"d1:v4:teste").is_err());
    }

    #[test]
    fn test_request_encoding() {
        assert_eq!(
            MetadataMessage::Request { piece: 0 }.encode(),
            b"d8:msg_typei0e5:piecei0ee"
        );
    }

    #[test]
    fn test_data_message_splits_raw_tail() {
        let raw = b"d6:lengthi3ee\x00\xff".to_vec();
        let mut payload = b"d8:msg_typei1e5:piecei0e10:total_sizei15ee".to_vec();
        payload.extend_from_slice(&raw);

        assert_eq!(
            MetadataMessage::decode(&payload).unwrap(),
            MetadataMessage::Data {
                piece: 0,
                total_size: 15,
                data: raw,
            }
        );
    }

    #[test]
    fn test_reject_and_unknown_types() {
        assert_eq!(
            MetadataMessage::decode(b"d8:msg_typei2e5:piecei0ee").unwrap(),
            MetadataMessage::Reject { piece: 0 }
        );
        assert!(MetadataMessage::decode(b"d8:msg_typei7e5:piecei0ee").is_err());
        assert!(MetadataMessage::decode(b"d5:piecei0ee").is_err());
    }
}
