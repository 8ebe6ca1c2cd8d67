use log::debug;

use model::block::{matches_difficulty, Block};
use model::unspent::UnspentSet;
use model::{Error, Result, BLOCK_DATA_MAX};

/// Validates `block` as the successor of `prev` given the unspent outputs of the chain up to `prev`.
/// The first violated rule is returned. Nothing is mutated.
///
/// Transactions after the coinbase are checked in block order, each against the unspent set
/// updated by the ones before it, so a block spending the same output twice is rejected.
pub fn block_is_valid(block: &Block, prev: Option<&Block>, unspent: &UnspentSet) -> Result<()> {
    if block.is_genesis() {
        return check_genesis(block, prev);
    }

    let prev = prev.ok_or_else(|| {
        Error::InvalidArgument(format!("block {} has no previous block", block.header.index))
    })?;

    if prev.header.index.checked_add(1) != Some(block.header.index) {
        return Err(Error::ChainLinkage(format!(
            "index {} does not follow {}",
            block.header.index, prev.header.index
        )));
    }
    if block.header.prev_hash != prev.hash {
        return Err(Error::ChainLinkage(format!(
            "block {} does not point to the hash of block {}",
            block.header.index, prev.header.index
        )));
    }
    if block.payload().len() > BLOCK_DATA_MAX {
        return Err(Error::InvalidArgument(format!(
            "payload of {} bytes exceeds {} bytes",
            block.payload().len(),
            BLOCK_DATA_MAX
        )));
    }
    if block.content_hash() != block.hash {
        return Err(Error::IntegrityMismatch(format!(
            "stored hash of block {} does not match its content",
            block.header.index
        )));
    }
    if !matches_difficulty(&block.hash, block.header.difficulty) {
        return Err(Error::DifficultyUnmet {
            hash: hex::encode(block.hash),
            difficulty: block.header.difficulty,
        });
    }

    let (coinbase, transactions) = block.transactions.split_first().ok_or_else(|| {
        Error::MalformedCoinbase(format!("block {} carries no transaction", block.header.index))
    })?;
    coinbase.check_coinbase(block.header.index)?;

    let mut running = unspent.clone();
    for (position, transaction) in transactions.iter().enumerate() {
        transaction.check(&running).map_err(|e| Error::InvalidTransaction {
            position: position + 1,
            source: Box::new(e),
        })?;
        running.spend(transaction);
    }

    debug!("Block {} is valid", block.header.index);
    Ok(())
}

fn check_genesis(block: &Block, prev: Option<&Block>) -> Result<()> {
    if prev.is_some() {
        return Err(Error::ChainLinkage("genesis block cannot have a predecessor".to_string()));
    }
    if *block != Block::genesis() {
        return Err(Error::IntegrityMismatch("block 0 is not the genesis block".to_string()));
    }
    Ok(())
}
