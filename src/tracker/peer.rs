use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// A peer address handed out by a tracker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub addr: SocketAddr,
    pub peer_id: Option<Vec<u8>>,
}

impl Peer {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::new(ip, port),
            peer_id: None,
        }
    }

    pub fn with_peer_id(ip: IpAddr, port: u16, peer_id: Vec<u8>) -> Self {
        Self {
            addr: SocketAddr::new(ip, port),
            peer_id: Some(peer_id),
        }
    }

    /// Parse a peer from compact format (4 bytes IPv4, 2 bytes port)
    pub fn from_compact(data: &[u8; 6]) -> Self {
        let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
        let port = u16::from_be_bytes([data[4], data[5]]);
        Self::new(IpAddr::V4(ip), port)
    }

    /// Parse a compact peer list. A trailing partial record is ignored.
    pub fn from_compact_list(data: &[u8]) -> Vec<Self> {
        data.chunks_exact(6)
            .filter_map(|chunk| <&[u8; 6]>::try_from(chunk).ok())
            .map(Self::from_compact)
            .collect()
    }
}
