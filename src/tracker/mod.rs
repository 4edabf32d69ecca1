//! HTTP tracker announces: request encoding, response parsing and our peer id.

mod client;
mod peer;
mod request;
mod response;

pub use client::TrackerClient;
pub use peer::Peer;
pub use request::TrackerRequest;
pub use response::TrackerResponse;

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Client tag at the front of every peer id we hand out
const PEER_ID_PREFIX: &[u8; 8] = b"-SF0001-";

/// A fresh peer id: the client tag followed by 12 random alphanumerics.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let (tag, suffix) = peer_id.split_at_mut(PEER_ID_PREFIX.len());
    tag.copy_from_slice(PEER_ID_PREFIX);

    let mut rng = rand::thread_rng();
    suffix.fill_with(|| rng.sample(Alphanumeric));
    peer_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_layout() {
        let peer_id = generate_peer_id();
        assert_eq!(&peer_id[..8], PEER_ID_PREFIX);
        assert!(peer_id[8..].iter().all(u8::is_ascii_alphanumeric));
        assert_ne!(peer_id, generate_peer_id());
    }
}
