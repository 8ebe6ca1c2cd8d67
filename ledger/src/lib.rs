use model::block::BlockHash;
use model::transaction::Transaction;
use model::unspent::UnspentSet;

pub use blockchain::Blockchain;
pub use difficulty::next_difficulty;
pub use validation::block_is_valid;

mod blockchain;
mod difficulty;
mod validation;

/// Returns a copy of `unspent` with `transactions` applied in order: every transaction first
/// consumes the outputs its inputs reference, then adds its own outputs keyed by `block_hash`.
pub fn update_unspent(transactions: &[Transaction], block_hash: &BlockHash, unspent: &UnspentSet) -> UnspentSet {
    transactions
        .iter()
        .fold(unspent.clone(), |mut updated, transaction| {
            updated.apply(transaction, block_hash);
            updated
        })
}
