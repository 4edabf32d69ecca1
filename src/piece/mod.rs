mod queue;
mod scheduler;
pub mod verify;

pub use queue::{Claim, WorkQueue};
pub use scheduler::PieceScheduler;

use crate::peer::BlockInfo;

/// Standard block size (16 KB)
pub const BLOCK_SIZE: u32 = 16 * 1024;

/// Number of pieces needed to cover `length` bytes
pub fn piece_count(length: u64, piece_length: u32) -> usize {
    length.div_ceil(u64::from(piece_length)) as usize
}

/// Size of piece `index`: the nominal piece length, except for a short
/// final piece.
pub fn piece_size(length: u64, piece_length: u32, index: u32) -> u32 {
    let start = u64::from(index) * u64::from(piece_length);
    length
        .saturating_sub(start)
        .min(u64::from(piece_length)) as u32
}

/// Split a piece into the block requests that fetch it, in order
pub fn block_requests(index: u32, size: u32) -> Vec<BlockInfo> {
    (0..size)
        .step_by(BLOCK_SIZE as usize)
        .map(|offset| BlockInfo::new(index, offset, BLOCK_SIZE.min(size - offset)))
        .collect()
}
