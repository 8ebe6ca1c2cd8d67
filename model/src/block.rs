use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use sha2::{Digest as _, Sha256};

use crate::crypto::{Hash, HASH_LEN};
use crate::transaction::Transaction;
use crate::{Error, Result, BLOCK_DATA_MAX};

pub type BlockHash = Hash;

const GENESIS_TIMESTAMP: u64 = 1537578000;
const GENESIS_PAYLOAD: &[u8] = b"Holberton School";
pub const GENESIS_HASH: BlockHash = [
    0xc5, 0x2c, 0x26, 0xc8, 0xb5, 0x46, 0x16, 0x39, 0x63, 0x5d, 0x8e, 0xdf, 0x2a, 0x97, 0xd4, 0x8d,
    0x0c, 0x8e, 0x00, 0x09, 0xc8, 0x17, 0xf2, 0xb1, 0xd3, 0xd7, 0xff, 0x2f, 0x04, 0x51, 0x58, 0x03,
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Position in the chain, genesis is 0.
    pub index: u32,
    /// Leading zero bits required in the block hash.
    pub difficulty: u32,
    /// Seconds since the epoch.
    pub timestamp: u64,
    pub nonce: u64,
    pub prev_hash: BlockHash,
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    payload: Vec<u8>,
    pub transactions: Vec<Transaction>,
    pub hash: BlockHash,
}

impl Block {
    /// The first block of every chain.
    pub fn genesis() -> Self {
        Self {
            header: BlockHeader {
                index: 0,
                difficulty: 0,
                timestamp: GENESIS_TIMESTAMP,
                nonce: 0,
                prev_hash: [0u8; HASH_LEN],
            },
            payload: GENESIS_PAYLOAD.to_vec(),
            transactions: Vec::new(),
            hash: GENESIS_HASH,
        }
    }

    /// Creates an unmined block on top of `prev`, inheriting its difficulty.
    /// Payload bytes beyond `BLOCK_DATA_MAX` are dropped.
    pub fn create(prev: Option<&Block>, payload: &[u8]) -> Result<Self> {
        let prev = prev.ok_or_else(|| {
            Error::InvalidArgument("a block must be created on top of a previous block".to_string())
        })?;
        let index = prev
            .header
            .index
            .checked_add(1)
            .ok_or_else(|| Error::InvalidArgument("block index overflow".to_string()))?;

        let used = payload.len().min(BLOCK_DATA_MAX);
        if used < payload.len() {
            debug!("Payload of {} bytes truncated to {}", payload.len(), used);
        }

        Ok(Self {
            header: BlockHeader {
                index,
                difficulty: prev.header.difficulty,
                timestamp: now(),
                nonce: 0,
                prev_hash: prev.hash,
            },
            payload: payload[..used].to_vec(),
            transactions: Vec::new(),
            hash: BlockHash::default(),
        })
    }

    /// Rebuilds a block from stored fields. The stored hash is kept as is.
    pub fn from_parts(
        header: BlockHeader,
        payload: Vec<u8>,
        transactions: Vec<Transaction>,
        hash: BlockHash,
    ) -> Result<Self> {
        if payload.len() > BLOCK_DATA_MAX {
            return Err(Error::InvalidArgument(format!(
                "payload of {} bytes exceeds {} bytes",
                payload.len(),
                BLOCK_DATA_MAX
            )));
        }
        Ok(Self {
            header,
            payload,
            transactions,
            hash,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_genesis(&self) -> bool {
        self.header.index == 0
    }

    /// Hash of the header fields, the payload and the ids of the transactions, recomputed on every call.
    pub fn content_hash(&self) -> BlockHash {
        let mut hasher = Sha256::new();
        hasher.update(self.header.index.to_le_bytes());
        hasher.update(self.header.difficulty.to_le_bytes());
        hasher.update(self.header.timestamp.to_le_bytes());
        hasher.update(self.header.nonce.to_le_bytes());
        hasher.update(self.header.prev_hash);
        hasher.update(&self.payload);
        for transaction in &self.transactions {
            hasher.update(transaction.id);
        }
        hasher.finalize().into()
    }

    /// Searches nonces from 0 until the hash satisfies the difficulty, refreshing the timestamp
    /// on every attempt. Seals the block and returns the number of attempts. Never gives up.
    pub fn mine(&mut self) -> u64 {
        self.header.nonce = 0;
        let mut attempts = 0;
        loop {
            attempts += 1;
            self.header.timestamp = now();
            let hash = self.content_hash();
            if matches_difficulty(&hash, self.header.difficulty) {
                self.hash = hash;
                debug!("{} mined after {} attempts", self, attempts);
                return attempts;
            }
            self.header.nonce = self.header.nonce.wrapping_add(1);
        }
    }

    pub fn encoded_hash(&self) -> String {
        base64::encode(self.hash)
    }
}

/// True when the first `difficulty` bits of `hash`, most significant first, are all zero.
pub fn matches_difficulty(hash: &BlockHash, difficulty: u32) -> bool {
    if difficulty as usize > hash.len() * 8 {
        return false;
    }
    let zero_bytes = (difficulty / 8) as usize;
    let zero_bits = difficulty % 8;
    if hash[..zero_bytes].iter().any(|b| *b != 0) {
        return false;
    }
    zero_bits == 0 || hash[zero_bytes].leading_zeros() >= zero_bits
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Block ({}, {}) [difficulty: {}, transactions: {}]",
            self.header.index,
            self.encoded_hash(),
            self.header.difficulty,
            self.transactions.len()
        )
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Block")
            .field("header", &self.header)
            .field("payload", &hex::encode(&self.payload))
            .field("transactions", &self.transactions)
            .field("hash", &hex::encode(self.hash))
            .finish()
    }
}
