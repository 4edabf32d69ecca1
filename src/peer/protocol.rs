use crate::error::{Result, SwarmError};

pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// Handshake length: 1 + 19 + 8 + 20 + 20
pub const HANDSHAKE_LEN: usize = 68;

/// Reserved byte carrying the extension-protocol flag (BEP 10)
const EXTENSION_BYTE: usize = 5;
const EXTENSION_FLAG: u8 = 0x10;

/// Handshake message for peer wire protocol
/// Format: <pstrlen><pstr><reserved><info_hash><peer_id>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// A handshake advertising support for the extension protocol
    pub fn with_extensions(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut handshake = Self::new(info_hash, peer_id);
        handshake.reserved[EXTENSION_BYTE] |= EXTENSION_FLAG;
        handshake
    }

    pub fn supports_extensions(&self) -> bool {
        self.reserved[EXTENSION_BYTE] & EXTENSION_FLAG != 0
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = PROTOCOL_STRING.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL_STRING);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HANDSHAKE_LEN {
            return Err(SwarmError::ProtocolViolation(format!(
                "handshake is {} bytes, expected {}",
                data.len(),
                HANDSHAKE_LEN
            )));
        }

        if data[0] as usize != PROTOCOL_STRING.len() || &data[1..20] != PROTOCOL_STRING {
            return Err(SwarmError::ProtocolViolation(
                "peer did not speak the BitTorrent protocol".to_string(),
            ));
        }

        let mut handshake = Handshake::new([0u8; 20], [0u8; 20]);
        handshake.reserved.copy_from_slice(&data[20..28]);
        handshake.info_hash.copy_from_slice(&data[28..48]);
        handshake.peer_id.copy_from_slice(&data[48..68]);
        Ok(handshake)
    }
}
