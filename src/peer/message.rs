use crate::error::{Result, SwarmError};
use bytes::{Buf, BufMut, BytesMut};

/// Information about a block within a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Piece index
    pub piece_index: u32,
    /// Byte offset within the piece
    pub offset: u32,
    /// Length of the block
    pub length: u32,
}

impl BlockInfo {
    pub fn new(piece_index: u32, offset: u32, length: u32) -> Self {
        Self {
            piece_index,
            offset,
            length,
        }
    }
}

/// Messages exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { block: BlockInfo },
    Piece {
        piece_index: u32,
        offset: u32,
        data: Vec<u8>,
    },
    Cancel { block: BlockInfo },
    /// BEP 10 extended message; `id` is the extension-local message id
    Extended { id: u8, payload: Vec<u8> },
}

impl PeerMessage {
    pub const CHOKE: u8 = 0;
    pub const UNCHOKE: u8 = 1;
    pub const INTERESTED: u8 = 2;
    pub const NOT_INTERESTED: u8 = 3;
    pub const HAVE: u8 = 4;
    pub const BITFIELD: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const PIECE: u8 = 7;
    pub const CANCEL: u8 = 8;
    pub const EXTENDED: u8 = 20;

    /// Short name for logging; piece payloads are too large to print
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::KeepAlive => "keep-alive",
            PeerMessage::Choke => "choke",
            PeerMessage::Unchoke => "unchoke",
            PeerMessage::Interested => "interested",
            PeerMessage::NotInterested => "not-interested",
            PeerMessage::Have { .. } => "have",
            PeerMessage::Bitfield { .. } => "bitfield",
            PeerMessage::Request { .. } => "request",
            PeerMessage::Piece { .. } => "piece",
            PeerMessage::Cancel { .. } => "cancel",
            PeerMessage::Extended { .. } => "extended",
        }
    }

    /// Serialize message to bytes
    /// Format: <length prefix><message ID><payload>
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        match self {
            PeerMessage::KeepAlive => buf.put_u32(0),
            PeerMessage::Choke => put_bare(&mut buf, Self::CHOKE),
            PeerMessage::Unchoke => put_bare(&mut buf, Self::UNCHOKE),
            PeerMessage::Interested => put_bare(&mut buf, Self::INTERESTED),
            PeerMessage::NotInterested => put_bare(&mut buf, Self::NOT_INTERESTED),
            PeerMessage::Have { piece_index } => {
                buf.put_u32(5);
                buf.put_u8(Self::HAVE);
                buf.put_u32(*piece_index);
            }
            PeerMessage::Bitfield { bitfield } => {
                buf.put_u32((1 + bitfield.len()) as u32);
                buf.put_u8(Self::BITFIELD);
                buf.put_slice(bitfield);
            }
            PeerMessage::Request { block } => put_block(&mut buf, Self::REQUEST, block),
            PeerMessage::Piece {
                piece_index,
                offset,
                data,
            } => {
                buf.put_u32((9 + data.len()) as u32);
                buf.put_u8(Self::PIECE);
                buf.put_u32(*piece_index);
                buf.put_u32(*offset);
                buf.put_slice(data);
            }
            PeerMessage::Cancel { block } => put_block(&mut buf, Self::CANCEL, block),
            PeerMessage::Extended { id, payload } => {
                buf.put_u32((2 + payload.len()) as u32);
                buf.put_u8(Self::EXTENDED);
                buf.put_u8(*id);
                buf.put_slice(payload);
            }
        }

        buf.to_vec()
    }

    /// Parse the body of a framed message (everything after the length prefix).
    ///
    /// An empty body is a keep-alive.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let Some((&message_id, mut payload)) = body.split_first() else {
            return Ok(PeerMessage::KeepAlive);
        };

        match message_id {
            Self::CHOKE => Ok(PeerMessage::Choke),
            Self::UNCHOKE => Ok(PeerMessage::Unchoke),
            Self::INTERESTED => Ok(PeerMessage::Interested),
            Self::NOT_INTERESTED => Ok(PeerMessage::NotInterested),
            Self::HAVE => {
                expect_len(payload, 4, "have")?;
                Ok(PeerMessage::Have {
                    piece_index: payload.get_u32(),
                })
            }
            Self::BITFIELD => Ok(PeerMessage::Bitfield {
                bitfield: payload.to_vec(),
            }),
            Self::REQUEST | Self::CANCEL => {
                expect_len(payload, 12, "request")?;
                let block = BlockInfo::new(payload.get_u32(), payload.get_u32(), payload.get_u32());
                if message_id == Self::REQUEST {
                    Ok(PeerMessage::Request { block })
                } else {
                    Ok(PeerMessage::Cancel { block })
                }
            }
            Self::PIECE => {
                expect_len(payload, 8, "piece")?;
                let piece_index = payload.get_u32();
                let offset = payload.get_u32();
                Ok(PeerMessage::Piece {
                    piece_index,
                    offset,
                    data: payload.to_vec(),
                })
            }
            Self::EXTENDED => {
                expect_len(payload, 1, "extended")?;
                let id = payload.get_u8();
                Ok(PeerMessage::Extended {
                    id,
                    payload: payload.to_vec(),
                })
            }
            _ => Err(SwarmError::ProtocolViolation(format!(
                "unknown message id {}",
                message_id
            ))),
        }
    }
}

fn expect_len(payload: &[u8], len: usize, name: &str) -> Result<()> {
    if payload.len() < len {
        return Err(SwarmError::ProtocolViolation(format!(
            "{} message has {} payload bytes, expected {}",
            name,
            payload.len(),
            len
        )));
    }
    Ok(())
}

fn put_bare(buf: &mut BytesMut, id: u8) {
    buf.put_u32(1);
    buf.put_u8(id);
}

fn put_block(buf: &mut BytesMut, id: u8, block: &BlockInfo) {
    buf.put_u32(13); // 1 + 4 + 4 + 4
    buf.put_u8(id);
    buf.put_u32(block.piece_index);
    buf.put_u32(block.offset);
    buf.put_u32(block.length);
}
