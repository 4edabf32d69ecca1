use super::{TrackerRequest, TrackerResponse};
use crate::bencode::decode;
use crate::error::{Result, SwarmError};
use reqwest::Client;
use tracing::{debug, info};

/// HTTP announce client; one `reqwest` connection pool shared by all announces
pub struct TrackerClient {
    http: Client,
}

impl TrackerClient {
    pub fn new() -> Self {
        Self { http: Client::new() }
    }

    /// GET the announce URL and parse the bencoded peer list out of the reply
    pub async fn announce(
        &self,
        tracker_url: &str,
        request: &TrackerRequest,
    ) -> Result<TrackerResponse> {
        let url = request.announce_url(tracker_url)?;
        info!("Announcing {} to {}", hex::encode(request.info_hash), tracker_url);
        debug!("GET {}", url);

        let reply = self.http.get(url).send().await?;
        let status = reply.status();
        if !status.is_success() {
            return Err(SwarmError::TrackerError(format!(
                "{} answered with HTTP {}",
                tracker_url, status
            )));
        }

        let body = reply.bytes().await?;
        let response = TrackerResponse::from_bencode(&decode(&body)?)?;
        info!(
            "{} returned {} peers, re-announce interval {:?}",
            tracker_url,
            response.peers.len(),
            response.interval
        );
        Ok(response)
    }
}

impl Default for TrackerClient {
    fn default() -> Self {
        Self::new()
    }
}
