use crate::error::Result;
use url::Url;

/// Announce parameters sent to an HTTP tracker
#[derive(Debug, Clone)]
pub struct TrackerRequest {
    /// SHA1 hash of the info dictionary
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    /// Port we claim to listen on
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    /// Bytes still to download
    pub left: u64,
    /// Ask for the 6-bytes-per-peer list
    pub compact: bool,
}

impl TrackerRequest {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
            compact: true,
        }
    }

    /// The announce URL with this request appended to its query.
    ///
    /// The hashes are raw bytes, so they are escaped by hand and the query is
    /// set verbatim; going through a form serializer would escape the `%`s a
    /// second time.
    pub fn announce_url(&self, tracker_url: &str) -> Result<Url> {
        let mut url = Url::parse(tracker_url)?;

        let mut query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&", existing),
            _ => String::new(),
        };
        query.push_str(&format!(
            "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact={}",
            urlencoded_hash(&self.info_hash),
            urlencoded_hash(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left,
            if self.compact { 1 } else { 0 },
        ));

        url.set_query(Some(&query));
        Ok(url)
    }
}

/// URL-encode a hash for tracker requests
fn urlencoded_hash(hash: &[u8; 20]) -> String {
    hash.iter().map(|b| format!("%{:02x}", b)).collect()
}
