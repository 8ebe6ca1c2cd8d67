use std::fmt;

use log::{info, warn};

use model::block::Block;
use model::crypto::PublicKey;
use model::unspent::{UnspentOutput, UnspentSet};
use model::{Error, Result};

use crate::difficulty::next_difficulty;
use crate::update_unspent;
use crate::validation::block_is_valid;

/// The chain of blocks starting at genesis, together with the outputs it left unspent.
/// Appending is the only way to extend it and requires the block to be valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blockchain {
    chain: Vec<Block>,
    unspent: UnspentSet,
}

impl Blockchain {
    pub fn new() -> Self {
        Self {
            chain: vec![Block::genesis()],
            unspent: UnspentSet::new(),
        }
    }

    /// Restores a chain without validating it. Use [`Blockchain::verify`] to check it.
    pub fn from_parts(chain: Vec<Block>, unspent: UnspentSet) -> Result<Self> {
        if chain.is_empty() {
            return Err(Error::InvalidArgument("a chain holds at least the genesis block".to_string()));
        }
        Ok(Self { chain, unspent })
    }

    pub fn tip(&self) -> &Block {
        // The chain is never empty.
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.chain.get(index)
    }

    pub fn unspent(&self) -> &UnspentSet {
        &self.unspent
    }

    /// Validates `block` against the tip and links it. The block must claim the difficulty the
    /// chain requires next. On failure the chain is left untouched.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let checked = block_is_valid(&block, Some(self.tip()), &self.unspent)
            .and_then(|_| check_difficulty(&self.chain, &block));
        if let Err(e) = checked {
            warn!("Rejected block {}: {}", block.header.index, e);
            return Err(e);
        }
        self.unspent = update_unspent(&block.transactions, &block.hash, &self.unspent);
        info!("Appended {}", block);
        self.chain.push(block);
        Ok(())
    }

    /// Difficulty of the next block.
    pub fn difficulty(&self) -> u32 {
        next_difficulty(&self.chain)
    }

    /// Replays the whole chain from genesis and checks that the stored unspent set is the one
    /// the chain produces.
    pub fn verify(&self) -> Result<()> {
        let mut unspent = UnspentSet::new();
        let mut prev: Option<&Block> = None;
        for (position, block) in self.chain.iter().enumerate() {
            block_is_valid(block, prev, &unspent)?;
            if position > 0 {
                check_difficulty(&self.chain[..position], block)?;
            }
            unspent = update_unspent(&block.transactions, &block.hash, &unspent);
            prev = Some(block);
        }
        if !unspent.same_contents(&self.unspent) {
            return Err(Error::IntegrityMismatch(format!(
                "stored unspent set holds {} outputs, the chain leaves {}",
                self.unspent.len(),
                unspent.len()
            )));
        }
        Ok(())
    }

    pub fn balance(&self, public_key: &PublicKey) -> u64 {
        self.unspent.balance(public_key)
    }

    pub fn unspent_for<'a>(&'a self, public_key: &'a PublicKey) -> impl Iterator<Item = &'a UnspentOutput> {
        self.unspent.owned_by(public_key)
    }
}

fn check_difficulty(chain: &[Block], block: &Block) -> Result<()> {
    let expected = next_difficulty(chain);
    if block.header.difficulty != expected {
        return Err(Error::WrongDifficulty {
            expected,
            found: block.header.difficulty,
        });
    }
    Ok(())
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Blockchain [blocks: {}, unspent: {}, tip: {}]",
            self.chain.len(),
            self.unspent.len(),
            self.tip()
        )
    }
}
