use crate::error::{Result, SwarmError};
use url::Url;

const BTIH_PREFIX: &str = "urn:btih:";

/// The parts of a magnet link needed to bootstrap a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: [u8; 20],
    /// Tracker announce URL (`tr`), already percent-decoded
    pub tracker: String,
    /// Display name (`dn`), informational only
    pub display_name: Option<String>,
}

impl MagnetLink {
    /// Parse `magnet:?xt=urn:btih:<40 hex>&tr=<url>[&dn=<name>]`.
    ///
    /// When several `tr` parameters are present the first one wins.
    pub fn parse(link: &str) -> Result<Self> {
        let url = Url::parse(link)
            .map_err(|e| SwarmError::InvalidMagnet(format!("{}: {}", link, e)))?;

        if url.scheme() != "magnet" {
            return Err(SwarmError::InvalidMagnet(format!(
                "unexpected scheme '{}'",
                url.scheme()
            )));
        }

        let mut info_hash = None;
        let mut tracker = None;
        let mut display_name = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if info_hash.is_none() => info_hash = Some(parse_btih(&value)?),
                "tr" if tracker.is_none() => tracker = Some(value.into_owned()),
                "dn" if display_name.is_none() => display_name = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            info_hash: info_hash
                .ok_or_else(|| SwarmError::InvalidMagnet("missing 'xt' parameter".to_string()))?,
            tracker: tracker
                .ok_or_else(|| SwarmError::InvalidMagnet("missing 'tr' parameter".to_string()))?,
            display_name,
        })
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

fn parse_btih(xt: &str) -> Result<[u8; 20]> {
    let hash = xt
        .strip_prefix(BTIH_PREFIX)
        .ok_or_else(|| SwarmError::InvalidMagnet(format!("unsupported 'xt' value {}", xt)))?;

    let mut info_hash = [0u8; 20];
    hex::decode_to_slice(hash, &mut info_hash)
        .map_err(|e| SwarmError::InvalidMagnet(format!("bad info hash '{}': {}", hash, e)))?;
    Ok(info_hash)
}
