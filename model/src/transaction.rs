use std::collections::HashSet;
use std::fmt;

use log::debug;
use sha2::{Digest as _, Sha256};

use crate::block::BlockHash;
use crate::crypto::{self, Hash, KeyPair, PublicKey, Signature, HASH_LEN};
use crate::unspent::{UnspentOutput, UnspentSet};
use crate::{Error, Result, COINBASE_AMOUNT};

pub type TxId = Hash;

/// Identity of an unspent output: the block and transaction that created it plus the output hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub block_hash: BlockHash,
    pub tx_id: TxId,
    pub output_hash: Hash,
}

impl OutputRef {
    /// The synthetic reference carried by the coinbase input of the block at `block_index`.
    pub fn coinbase(block_index: u32) -> Self {
        let mut output_hash = [0u8; HASH_LEN];
        output_hash[..4].copy_from_slice(&block_index.to_le_bytes());
        Self {
            block_hash: [0u8; HASH_LEN],
            tx_id: [0u8; HASH_LEN],
            output_hash,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutput {
    pub amount: u32,
    /// Receiver of the coins.
    pub public_key: PublicKey,
    /// Content hash of `amount` and `public_key`.
    pub hash: Hash,
}

impl TxOutput {
    pub fn new(amount: u32, public_key: PublicKey) -> Self {
        Self {
            amount,
            public_key,
            hash: Self::compute_hash(amount, &public_key),
        }
    }

    pub fn compute_hash(amount: u32, public_key: &PublicKey) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(amount.to_le_bytes());
        hasher.update(public_key);
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub block_hash: BlockHash,
    pub tx_id: TxId,
    /// Hash of the referenced output.
    pub tx_out_hash: Hash,
    /// Signature over the id of the transaction holding this input.
    pub signature: Signature,
}

impl TxInput {
    /// Creates an unsigned input consuming `unspent`.
    pub fn new(unspent: &UnspentOutput) -> Self {
        Self::from_reference(unspent.reference())
    }

    pub fn from_reference(reference: OutputRef) -> Self {
        Self {
            block_hash: reference.block_hash,
            tx_id: reference.tx_id,
            tx_out_hash: reference.output_hash,
            signature: Signature::default(),
        }
    }

    pub fn reference(&self) -> OutputRef {
        OutputRef {
            block_hash: self.block_hash,
            tx_id: self.tx_id,
            output_hash: self.tx_out_hash,
        }
    }

    /// Signs `tx_id` with `sender` after checking that `sender` owns the referenced output.
    pub fn sign(&mut self, tx_id: &TxId, sender: &KeyPair, unspent: &UnspentSet) -> Result<&Signature> {
        let referenced = unspent.find(&self.reference()).ok_or(Error::UnknownOutput)?;
        if referenced.output.public_key != sender.public_key() {
            return Err(Error::OwnerMismatch);
        }
        self.signature = sender.sign(tx_id)?;
        Ok(&self.signature)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Builds a transaction and computes its id. Inputs are left as given (usually unsigned).
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut transaction = Self {
            id: TxId::default(),
            inputs,
            outputs,
        };
        transaction.id = transaction.compute_id();
        transaction
    }

    /// Sends `amount` from `sender` to `receiver`, selecting the sender's outputs in set order
    /// until the amount is covered. The remainder, if any, goes back to the sender.
    pub fn create(sender: &KeyPair, receiver: &PublicKey, amount: u32, unspent: &UnspentSet) -> Result<Self> {
        if amount == 0 {
            return Err(Error::InvalidArgument("cannot send a zero amount".to_string()));
        }
        let sender_key = sender.public_key();

        let mut total: u64 = 0;
        let mut inputs = Vec::new();
        for owned in unspent.owned_by(&sender_key) {
            if total >= amount as u64 {
                break;
            }
            inputs.push(TxInput::new(owned));
            total += owned.output.amount as u64;
        }
        if total < amount as u64 {
            return Err(Error::InsufficientFunds {
                requested: amount,
                available: total,
            });
        }

        // Paying oneself folds the change into the payment, two equal outputs would share a hash.
        let change = total - amount as u64;
        let outputs = if *receiver == sender_key {
            vec![TxOutput::new(output_amount(total)?, sender_key)]
        } else if change > 0 {
            vec![
                TxOutput::new(amount, *receiver),
                TxOutput::new(output_amount(change)?, sender_key),
            ]
        } else {
            vec![TxOutput::new(amount, *receiver)]
        };

        let mut transaction = Self::new(inputs, outputs);
        let id = transaction.id;
        for input in transaction.inputs.iter_mut() {
            input
                .sign(&id, sender, unspent)
                .map_err(|e| Error::SigningFailed(e.to_string()))?;
        }
        debug!("Created {}", transaction);
        Ok(transaction)
    }

    /// The reward-minting transaction for the block at `block_index`.
    pub fn coinbase(receiver: &PublicKey, block_index: u32) -> Self {
        Self::new(
            vec![TxInput::from_reference(OutputRef::coinbase(block_index))],
            vec![TxOutput::new(COINBASE_AMOUNT, *receiver)],
        )
    }

    /// Hash over every input reference followed by every output hash, in list order.
    pub fn compute_id(&self) -> TxId {
        let mut hasher = Sha256::new();
        for input in &self.inputs {
            hasher.update(input.block_hash);
            hasher.update(input.tx_id);
            hasher.update(input.tx_out_hash);
        }
        for output in &self.outputs {
            hasher.update(output.hash);
        }
        hasher.finalize().into()
    }

    /// Checks the transaction against `unspent` and reports the first violated rule.
    pub fn check(&self, unspent: &UnspentSet) -> Result<()> {
        if self.compute_id() != self.id {
            return Err(Error::IntegrityMismatch(format!(
                "transaction id {} does not match its content",
                hex::encode(self.id)
            )));
        }

        let mut hashes = HashSet::new();
        if !self.outputs.iter().all(|o| hashes.insert(o.hash)) {
            return Err(Error::DuplicateOutput);
        }

        let mut seen = HashSet::new();
        let mut inputs: u64 = 0;
        for input in &self.inputs {
            let reference = input.reference();
            if !seen.insert(reference) {
                return Err(Error::DuplicateInput);
            }
            let referenced = unspent.find(&reference).ok_or(Error::UnknownOutput)?;
            if !crypto::verify(&referenced.output.public_key, &self.id, &input.signature) {
                return Err(Error::InvalidSignature);
            }
            inputs += referenced.output.amount as u64;
        }

        let outputs: u64 = self.outputs.iter().map(|o| o.amount as u64).sum();
        if inputs != outputs {
            return Err(Error::Unbalanced { inputs, outputs });
        }
        Ok(())
    }

    pub fn is_valid(&self, unspent: &UnspentSet) -> bool {
        self.check(unspent).is_ok()
    }

    pub fn check_coinbase(&self, block_index: u32) -> Result<()> {
        if self.inputs.len() != 1 || self.outputs.len() != 1 {
            return Err(Error::MalformedCoinbase(format!(
                "expected one input and one output, got {} and {}",
                self.inputs.len(),
                self.outputs.len()
            )));
        }
        let input = &self.inputs[0];
        if input.reference() != OutputRef::coinbase(block_index) {
            return Err(Error::MalformedCoinbase(format!(
                "input does not reference block index {}",
                block_index
            )));
        }
        if !input.signature.is_empty() {
            return Err(Error::MalformedCoinbase("input carries a signature".to_string()));
        }
        if self.outputs[0].amount != COINBASE_AMOUNT {
            return Err(Error::MalformedCoinbase(format!(
                "minted {} instead of {}",
                self.outputs[0].amount, COINBASE_AMOUNT
            )));
        }
        if self.compute_id() != self.id {
            return Err(Error::IntegrityMismatch(format!(
                "coinbase id {} does not match its content",
                hex::encode(self.id)
            )));
        }
        Ok(())
    }

    pub fn is_valid_coinbase(&self, block_index: u32) -> bool {
        self.check_coinbase(block_index).is_ok()
    }
}

fn output_amount(amount: u64) -> Result<u32> {
    u32::try_from(amount).map_err(|_| Error::InvalidArgument(format!("{} does not fit an output", amount)))
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Transaction ({}) [inputs: {}, outputs: {}]",
            base64::encode(self.id),
            self.inputs.len(),
            self.outputs.len()
        )
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &hex::encode(self.id))
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A ledger state where `owner` holds one output per amount.
    fn funded(owner: &KeyPair, amounts: &[u32]) -> UnspentSet {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                let coinbase = Transaction::coinbase(&owner.public_key(), i as u32 + 1);
                UnspentOutput::new([i as u8 + 1; 32], coinbase.id, TxOutput::new(*amount, owner.public_key()))
            })
            .collect()
    }

    #[test]
    fn output_hash_covers_amount_and_key() {
        let key = KeyPair::generate().public_key();
        let output = TxOutput::new(10, key);
        assert_eq!(output.hash, TxOutput::compute_hash(10, &key));
        assert_ne!(output.hash, TxOutput::new(11, key).hash);
    }

    #[test]
    fn id_depends_on_order() {
        let a = TxOutput::new(1, [1u8; 65]);
        let b = TxOutput::new(2, [2u8; 65]);
        let forward = Transaction::new(vec![], vec![a.clone(), b.clone()]);
        let backward = Transaction::new(vec![], vec![b, a]);
        assert_ne!(forward.id, backward.id);
    }

    #[test]
    fn create_spends_and_returns_change() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let unspent = funded(&alice, &[30, 30, 30]);

        let transaction = Transaction::create(&alice, &bob.public_key(), 45, &unspent).unwrap();
        assert_eq!(transaction.inputs.len(), 2);
        assert_eq!(transaction.outputs.len(), 2);
        assert_eq!(transaction.outputs[0].amount, 45);
        assert_eq!(transaction.outputs[0].public_key, bob.public_key());
        assert_eq!(transaction.outputs[1].amount, 15);
        assert_eq!(transaction.outputs[1].public_key, alice.public_key());
        assert!(transaction.is_valid(&unspent));
    }

    #[test]
    fn exact_amount_has_no_change_output() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let unspent = funded(&alice, &[20, 30]);

        let transaction = Transaction::create(&alice, &bob.public_key(), 50, &unspent).unwrap();
        assert_eq!(transaction.outputs.len(), 1);
        assert!(transaction.is_valid(&unspent));
    }

    #[test]
    fn spending_more_than_owned_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let unspent = funded(&alice, &[20, 30]);

        let result = Transaction::create(&alice, &bob.public_key(), 51, &unspent);
        assert_eq!(
            result.unwrap_err(),
            Error::InsufficientFunds {
                requested: 51,
                available: 50
            }
        );
    }

    #[test]
    fn signing_requires_ownership() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let unspent = funded(&alice, &[20]);
        let mut input = TxInput::new(unspent.get(0).unwrap());

        assert_eq!(input.sign(&[1u8; 32], &mallory, &unspent).unwrap_err(), Error::OwnerMismatch);
        assert_eq!(
            input.sign(&[1u8; 32], &alice, &UnspentSet::new()).unwrap_err(),
            Error::UnknownOutput
        );
        assert!(input.sign(&[1u8; 32], &alice, &unspent).is_ok());
        assert!(!input.signature.is_empty());
    }

    #[test]
    fn tampered_transaction_is_rejected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let unspent = funded(&alice, &[50]);
        let transaction = Transaction::create(&alice, &bob.public_key(), 20, &unspent).unwrap();

        let mut inflated = transaction.clone();
        inflated.outputs[0] = TxOutput::new(40, bob.public_key());
        assert!(matches!(inflated.check(&unspent), Err(Error::IntegrityMismatch(_))));

        // Recomputing the id invalidates the signatures.
        inflated.id = inflated.compute_id();
        assert_eq!(inflated.check(&unspent).unwrap_err(), Error::InvalidSignature);

        assert_eq!(transaction.check(&UnspentSet::new()).unwrap_err(), Error::UnknownOutput);
    }

    #[test]
    fn unbalanced_transaction_is_rejected() {
        let alice = KeyPair::generate();
        let unspent = funded(&alice, &[50]);
        let mut transaction = Transaction::new(
            vec![TxInput::new(unspent.get(0).unwrap())],
            vec![TxOutput::new(49, alice.public_key())],
        );
        let id = transaction.id;
        transaction.inputs[0].sign(&id, &alice, &unspent).unwrap();

        assert_eq!(
            transaction.check(&unspent).unwrap_err(),
            Error::Unbalanced {
                inputs: 50,
                outputs: 49
            }
        );
    }

    #[test]
    fn duplicate_inputs_are_rejected() {
        let alice = KeyPair::generate();
        let unspent = funded(&alice, &[50]);
        let input = TxInput::new(unspent.get(0).unwrap());
        let mut transaction = Transaction::new(
            vec![input.clone(), input],
            vec![TxOutput::new(100, alice.public_key())],
        );
        let id = transaction.id;
        for input in transaction.inputs.iter_mut() {
            input.sign(&id, &alice, &unspent).unwrap();
        }
        assert_eq!(transaction.check(&unspent).unwrap_err(), Error::DuplicateInput);
    }

    #[test]
    fn paying_oneself_yields_a_single_output() {
        let alice = KeyPair::generate();
        let unspent = funded(&alice, &[50]);

        let transaction = Transaction::create(&alice, &alice.public_key(), 25, &unspent).unwrap();
        assert_eq!(transaction.outputs.len(), 1);
        assert_eq!(transaction.outputs[0].amount, 50);
        assert_eq!(transaction.outputs[0].public_key, alice.public_key());
        assert!(transaction.is_valid(&unspent));
    }

    #[test]
    fn duplicate_outputs_are_rejected() {
        let alice = KeyPair::generate();
        let unspent = funded(&alice, &[50]);
        let mut transaction = Transaction::new(
            vec![TxInput::new(unspent.get(0).unwrap())],
            vec![TxOutput::new(25, alice.public_key()), TxOutput::new(25, alice.public_key())],
        );
        let id = transaction.id;
        transaction.inputs[0].sign(&id, &alice, &unspent).unwrap();
        assert_eq!(transaction.check(&unspent).unwrap_err(), Error::DuplicateOutput);
    }

    #[test]
    fn coinbase_is_valid_only_for_its_block() {
        let miner = KeyPair::generate().public_key();
        let coinbase = Transaction::coinbase(&miner, 7);

        assert!(coinbase.is_valid_coinbase(7));
        assert!(!coinbase.is_valid_coinbase(8));
        assert_eq!(coinbase.outputs[0].amount, COINBASE_AMOUNT);
        assert_eq!(&coinbase.inputs[0].tx_out_hash[..4], &7u32.to_le_bytes());
    }

    #[test]
    fn malformed_coinbase_is_rejected() {
        let miner = KeyPair::generate().public_key();

        let greedy = Transaction::new(
            vec![TxInput::from_reference(OutputRef::coinbase(1))],
            vec![TxOutput::new(COINBASE_AMOUNT + 1, miner)],
        );
        assert!(matches!(greedy.check_coinbase(1), Err(Error::MalformedCoinbase(_))));

        let two_outputs = Transaction::new(
            vec![TxInput::from_reference(OutputRef::coinbase(1))],
            vec![TxOutput::new(25, miner), TxOutput::new(25, miner)],
        );
        assert!(matches!(two_outputs.check_coinbase(1), Err(Error::MalformedCoinbase(_))));

        let mut signed = Transaction::coinbase(&miner, 1);
        signed.inputs[0].signature = Signature::from_bytes(&[1, 2, 3]).unwrap();
        assert!(matches!(signed.check_coinbase(1), Err(Error::MalformedCoinbase(_))));

        let mut stale = Transaction::coinbase(&miner, 1);
        stale.id = [0u8; 32];
        assert!(matches!(stale.check_coinbase(1), Err(Error::IntegrityMismatch(_))));
    }
}
