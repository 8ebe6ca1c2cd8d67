use log::{debug, info, warn};

use ledger::Blockchain;
use model::block::Block;
use model::crypto::PublicKey;
use model::transaction::Transaction;
use model::Result;

/// Assembles candidate blocks on top of a chain and mines them.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    /// Receiver of the coinbase reward.
    miner: PublicKey,
    payload: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(miner: PublicKey, payload: &[u8]) -> Self {
        Self {
            miner,
            payload: payload.to_vec(),
        }
    }

    /// Creates an unmined block on the tip of `blockchain`: the coinbase comes first, followed by
    /// the pending transactions that are valid in order. Invalid ones are dropped.
    pub fn assemble(&self, blockchain: &Blockchain, pending: Vec<Transaction>) -> Result<Block> {
        let mut block = Block::create(Some(blockchain.tip()), &self.payload)?;
        block.header.difficulty = blockchain.difficulty();
        block
            .transactions
            .push(Transaction::coinbase(&self.miner, block.header.index));

        let mut running = blockchain.unspent().clone();
        for transaction in pending {
            match transaction.check(&running) {
                Ok(()) => {
                    running.spend(&transaction);
                    block.transactions.push(transaction);
                }
                Err(e) => warn!("Dropping {}: {}", transaction, e),
            }
        }
        debug!(
            "Assembled block {} with {} transactions at difficulty {}",
            block.header.index,
            block.transactions.len(),
            block.header.difficulty
        );
        Ok(block)
    }

    /// Assembles a block and mines it. Blocks the calling thread until a nonce is found.
    pub fn build(&self, blockchain: &Blockchain, pending: Vec<Transaction>) -> Result<Block> {
        let mut block = self.assemble(blockchain, pending)?;
        let attempts = block.mine();
        info!("Mined {} after {} attempts", block, attempts);
        Ok(block)
    }
}
