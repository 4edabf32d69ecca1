use super::Peer;
use crate::bencode::BencodeValue;
use crate::error::{Result, SwarmError};
use std::net::IpAddr;

/// Response from a tracker
#[derive(Debug, Clone)]
pub struct TrackerResponse {
    /// Seconds to wait before the next announce
    pub interval: Option<u64>,
    pub min_interval: Option<u64>,
    /// Number of seeders
    pub complete: Option<u64>,
    /// Number of leechers
    pub incomplete: Option<u64>,
    pub peers: Vec<Peer>,
}

impl TrackerResponse {
    pub fn from_bencode(value: &BencodeValue) -> Result<Self> {
        if value.as_dict().is_none() {
            return Err(SwarmError::TrackerError("response must be a dict".to_string()));
        }

        if let Some(failure) = value.dict_get(b"failure reason") {
            let reason = failure.as_str().unwrap_or("unknown failure").to_string();
            return Err(SwarmError::TrackerError(reason));
        }

        let peers = match value.dict_get(b"peers") {
            Some(BencodeValue::String(compact)) => Peer::from_compact_list(compact),
            Some(BencodeValue::List(list)) => parse_peer_list(list)?,
            Some(_) => {
                return Err(SwarmError::TrackerError(
                    "invalid 'peers' format".to_string(),
                ))
            }
            None => {
                return Err(SwarmError::TrackerError(
                    "missing 'peers' field".to_string(),
                ))
            }
        };

        Ok(TrackerResponse {
            interval: count(value, b"interval"),
            min_interval: count(value, b"min interval"),
            complete: count(value, b"complete"),
            incomplete: count(value, b"incomplete"),
            peers,
        })
    }
}

fn count(value: &BencodeValue, key: &[u8]) -> Option<u64> {
    value.dict_get_int(key).and_then(|n| u64::try_from(n).ok())
}

/// The non-compact form: a list of `{ip, port, peer id}` dicts
fn parse_peer_list(list: &[BencodeValue]) -> Result<Vec<Peer>> {
    list.iter()
        .map(|entry| {
            let ip: IpAddr = entry
                .dict_get_str(b"ip")
                .ok_or_else(|| SwarmError::TrackerError("missing peer 'ip'".to_string()))?
                .parse()
                .map_err(|_| SwarmError::TrackerError("invalid peer IP address".to_string()))?;

            let port = entry
                .dict_get_int(b"port")
                .and_then(|port| u16::try_from(port).ok())
                .ok_or_else(|| SwarmError::TrackerError("invalid peer 'port'".to_string()))?;

            Ok(match entry.dict_get_bytes(b"peer id") {
                Some(id) => Peer::with_peer_id(ip, port, id.to_vec()),
                None => Peer::new(ip, port),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decode;

    #[test]
    fn test_compact_response() {
        let mut body = b"d8:completei3e8:intervali1800e5:peers12:".to_vec();
        body.extend_from_slice(&[192, 168, 1, 10, 0x1A, 0xE1, 10, 0, 0, 1, 0xC8, 0xD5]);
        body.push(b'e');

        let response = TrackerResponse::from_bencode(&decode(&body).unwrap()).unwrap();
        assert_eq!(response.interval, Some(1800));
        assert_eq!(response.complete, Some(3));
        assert_eq!(response.min_interval, None);

        let addrs: Vec<String> = response.peers.iter().map(|p| p.addr.to_string()).collect();
        assert_eq!(addrs, vec!["192.168.1.10:6881", "10.0.0.1:51413"]);
    }

    #[test]
    fn test_interval_is_optional() {
        let response =
            TrackerResponse::from_bencode(&decode(b"d5:peers0:e").unwrap()).unwrap();
        assert_eq!(response.interval, None);
        assert!(response.peers.is_empty());
    }

    #[test]
    fn test_dict_peer_list() {
        let body = b"d5:peersld2:ip9:127.0.0.17:peer id3:abc4:porti6881eeee";
        let response = TrackerResponse::from_bencode(&decode(body).unwrap()).unwrap();

        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].addr.to_string(), "127.0.0.1:6881");
        assert_eq!(response.peers[0].peer_id.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_failures() {
        let failure = decode(b"d14:failure reason12:unregisterede").unwrap();
        match TrackerResponse::from_bencode(&failure) {
            Err(SwarmError::TrackerError(reason)) => assert_eq!(reason, "unregistered"),
            other => panic!("expected tracker error, got {:?}", other),
        }

        let no_peers = decode(b"d8:intervali60ee").unwrap();
        assert!(TrackerResponse::from_bencode(&no_peers).is_err());
        assert!(TrackerResponse::from_bencode(&decode(b"le").unwrap()).is_err());
    }
}
