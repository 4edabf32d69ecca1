//! A small BitTorrent client: bencode, the peer wire protocol, a
//! multi-peer piece scheduler and magnet-link metadata bootstrap.

pub mod bencode;
pub mod client;
pub mod error;
pub mod peer;
pub mod piece;
pub mod torrent;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use error::{Result, SwarmError};
