use log::{debug, info};

use model::block::Block;
use model::{BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL};

/// Difficulty of the block to be mined on top of `chain`.
///
/// The tip's difficulty is kept, except when the tip index is a positive multiple of
/// `DIFFICULTY_ADJUSTMENT_INTERVAL`: the time elapsed since the block one interval back is then
/// compared with the expected time. Blocks found in less than half of it raise the difficulty by
/// one, blocks taking more than twice as long lower it by one.
pub fn next_difficulty(chain: &[Block]) -> u32 {
    let tip = match chain.last() {
        Some(tip) => tip,
        None => return 0,
    };
    let difficulty = tip.header.difficulty;
    if tip.header.index == 0 || tip.header.index % DIFFICULTY_ADJUSTMENT_INTERVAL != 0 {
        return difficulty;
    }

    let adjustment_index = (tip.header.index - DIFFICULTY_ADJUSTMENT_INTERVAL) as usize;
    let adjustment = match chain.get(adjustment_index) {
        Some(block) => block,
        None => return difficulty,
    };

    let actual = tip.header.timestamp as i128 - adjustment.header.timestamp as i128;
    let expected = (BLOCK_GENERATION_INTERVAL * DIFFICULTY_ADJUSTMENT_INTERVAL as u64) as i128;
    debug!(
        "Retarget at block {}: {}s elapsed, {}s expected",
        tip.header.index, actual, expected
    );

    if actual < expected / 2 {
        info!("Difficulty raised to {}", difficulty.saturating_add(1));
        difficulty.saturating_add(1)
    } else if actual > expected * 2 {
        info!("Difficulty lowered to {}", difficulty.saturating_sub(1));
        difficulty.saturating_sub(1)
    } else {
        difficulty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::block::BlockHeader;

    fn chain(timestamps: &[u64], difficulty: u32) -> Vec<Block> {
        timestamps
            .iter()
            .enumerate()
            .map(|(index, timestamp)| {
                let header = BlockHeader {
                    index: index as u32,
                    difficulty,
                    timestamp: *timestamp,
                    ..BlockHeader::default()
                };
                Block::from_parts(header, vec![], vec![], [0u8; 32]).unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_chain_has_zero_difficulty() {
        assert_eq!(next_difficulty(&[]), 0);
    }

    #[test]
    fn difficulty_is_inherited_between_retargets() {
        assert_eq!(next_difficulty(&chain(&[0, 0, 0, 0], 3)), 3);
        assert_eq!(next_difficulty(&[Block::genesis()]), 0);
    }

    #[test]
    fn fast_blocks_raise_difficulty() {
        assert_eq!(next_difficulty(&chain(&[100, 100, 100, 100, 100, 101], 3)), 4);
    }

    #[test]
    fn slow_blocks_lower_difficulty() {
        assert_eq!(next_difficulty(&chain(&[100, 110, 120, 130, 140, 150], 3)), 2);
        assert_eq!(next_difficulty(&chain(&[100, 110, 120, 130, 140, 150], 0)), 0);
    }

    #[test]
    fn on_time_blocks_keep_difficulty() {
        assert_eq!(next_difficulty(&chain(&[100, 101, 102, 103, 104, 105], 3)), 3);
        assert_eq!(next_difficulty(&chain(&[100, 101, 102, 103, 104, 110], 3)), 3);
    }

    #[test]
    fn clock_going_backwards_counts_as_fast() {
        assert_eq!(next_difficulty(&chain(&[200, 0, 0, 0, 0, 100], 1)), 2);
    }
}
