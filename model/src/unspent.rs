use crate::block::BlockHash;
use crate::crypto::PublicKey;
use crate::transaction::{OutputRef, Transaction, TxId, TxOutput};

/// An output not yet consumed by any input, together with the block and transaction that created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub block_hash: BlockHash,
    pub tx_id: TxId,
    pub output: TxOutput,
}

impl UnspentOutput {
    pub fn new(block_hash: BlockHash, tx_id: TxId, output: TxOutput) -> Self {
        Self {
            block_hash,
            tx_id,
            output,
        }
    }

    /// The triple inputs use to point at this output.
    pub fn reference(&self) -> OutputRef {
        OutputRef {
            block_hash: self.block_hash,
            tx_id: self.tx_id,
            output_hash: self.output.hash,
        }
    }

    pub fn is_owned_by(&self, public_key: &PublicKey) -> bool {
        self.output.public_key == *public_key
    }
}

/// Ordered collection of unspent outputs. Insertion order is kept and drives coin selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnspentSet {
    outputs: Vec<UnspentOutput>,
}

impl UnspentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&UnspentOutput> {
        self.outputs.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UnspentOutput> {
        self.outputs.iter()
    }

    pub fn push(&mut self, unspent: UnspentOutput) {
        self.outputs.push(unspent);
    }

    pub fn find(&self, reference: &OutputRef) -> Option<&UnspentOutput> {
        self.outputs.iter().find(|u| u.reference() == *reference)
    }

    /// Removes every output matching the predicate and returns how many were dropped.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&UnspentOutput) -> bool,
    {
        let before = self.outputs.len();
        self.outputs.retain(|u| !predicate(u));
        before - self.outputs.len()
    }

    /// Removes the first output identified by `reference`. Returns whether one was found.
    pub fn remove(&mut self, reference: &OutputRef) -> bool {
        match self.outputs.iter().position(|u| u.reference() == *reference) {
            Some(position) => {
                self.outputs.remove(position);
                true
            }
            None => false,
        }
    }

    /// Drops the outputs consumed by the inputs of `transaction`, one per input. Inputs matching
    /// nothing (the coinbase input) are ignored.
    pub fn spend(&mut self, transaction: &Transaction) {
        for input in &transaction.inputs {
            self.remove(&input.reference());
        }
    }

    /// Spends the inputs of `transaction` then records its outputs as created in `block_hash`.
    pub fn apply(&mut self, transaction: &Transaction, block_hash: &BlockHash) {
        self.spend(transaction);
        for output in &transaction.outputs {
            self.outputs
                .push(UnspentOutput::new(*block_hash, transaction.id, output.clone()));
        }
    }

    pub fn owned_by<'a>(&'a self, public_key: &'a PublicKey) -> impl Iterator<Item = &'a UnspentOutput> {
        self.outputs.iter().filter(move |u| u.is_owned_by(public_key))
    }

    pub fn balance(&self, public_key: &PublicKey) -> u64 {
        self.owned_by(public_key).map(|u| u.output.amount as u64).sum()
    }

    /// Set equality, ignoring order.
    pub fn same_contents(&self, other: &UnspentSet) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut remaining: Vec<&UnspentOutput> = other.outputs.iter().collect();
        for unspent in &self.outputs {
            match remaining.iter().position(|u| *u == unspent) {
                Some(position) => {
                    remaining.swap_remove(position);
                }
                None => return false,
            }
        }
        true
    }
}

impl FromIterator<UnspentOutput> for UnspentSet {
    fn from_iter<I: IntoIterator<Item = UnspentOutput>>(iter: I) -> Self {
        Self {
            outputs: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a UnspentSet {
    type Item = &'a UnspentOutput;
    type IntoIter = std::slice::Iter<'a, UnspentOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PUBLIC_KEY_LEN;
    use crate::transaction::{Transaction, TxInput};

    fn key(byte: u8) -> PublicKey {
        [byte; PUBLIC_KEY_LEN]
    }

    fn unspent(block: u8, amount: u32, owner: u8) -> UnspentOutput {
        UnspentOutput::new([block; 32], [block ^ 0xff; 32], TxOutput::new(amount, key(owner)))
    }

    #[test]
    fn balance_counts_only_owned_outputs() {
        let set: UnspentSet = vec![unspent(1, 10, 1), unspent(2, 20, 2), unspent(3, 5, 1)]
            .into_iter()
            .collect();
        assert_eq!(set.balance(&key(1)), 15);
        assert_eq!(set.balance(&key(2)), 20);
        assert_eq!(set.balance(&key(3)), 0);
        assert_eq!(set.owned_by(&key(1)).count(), 2);

        let mut set = set;
        assert_eq!(set.remove_matching(|u| u.is_owned_by(&key(1))), 2);
        assert_eq!(set.balance(&key(1)), 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn apply_spends_then_creates() {
        let first = unspent(1, 10, 1);
        let mut set: UnspentSet = vec![first.clone(), unspent(2, 20, 2)].into_iter().collect();

        let transaction = Transaction::new(vec![TxInput::new(&first)], vec![TxOutput::new(10, key(9))]);
        set.apply(&transaction, &[7u8; 32]);

        assert_eq!(set.len(), 2);
        assert!(set.find(&first.reference()).is_none());
        let created = set.get(1).unwrap();
        assert_eq!(created.block_hash, [7u8; 32]);
        assert_eq!(created.tx_id, transaction.id);
        assert_eq!(created.output.amount, 10);
    }

    #[test]
    fn spending_an_unknown_reference_is_a_no_op() {
        let mut set: UnspentSet = vec![unspent(1, 10, 1)].into_iter().collect();
        let coinbase = Transaction::coinbase(&key(4), 3);
        set.spend(&coinbase);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn each_input_spends_a_single_entry() {
        let twin = unspent(1, 10, 1);
        let mut set: UnspentSet = vec![twin.clone(), twin.clone()].into_iter().collect();

        let transaction = Transaction::new(vec![TxInput::new(&twin)], vec![TxOutput::new(10, key(9))]);
        set.spend(&transaction);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(0), Some(&twin));
        assert!(set.remove(&twin.reference()));
        assert!(!set.remove(&twin.reference()));
    }

    #[test]
    fn same_contents_ignores_order() {
        let a: UnspentSet = vec![unspent(1, 10, 1), unspent(2, 20, 2)].into_iter().collect();
        let b: UnspentSet = vec![unspent(2, 20, 2), unspent(1, 10, 1)].into_iter().collect();
        let c: UnspentSet = vec![unspent(2, 20, 2), unspent(2, 20, 2)].into_iter().collect();
        assert!(a.same_contents(&b));
        assert_ne!(a, b);
        assert!(!a.same_contents(&c));
    }
}
