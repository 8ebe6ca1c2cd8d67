use thiserror::Error;

/// Maximum number of payload bytes a block carries. Longer payloads are truncated on creation.
pub const BLOCK_DATA_MAX: usize = 1024;
/// Expected number of seconds between two blocks.
pub const BLOCK_GENERATION_INTERVAL: u64 = 1;
/// Number of blocks between two difficulty adjustments.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u32 = 5;
/// Amount minted by every coinbase transaction.
pub const COINBASE_AMOUNT: u32 = 50;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Integrity mismatch: {0}")]
    IntegrityMismatch(String),

    #[error("Chain linkage broken: {0}")]
    ChainLinkage(String),

    #[error("Hash {hash} does not satisfy difficulty {difficulty}")]
    DifficultyUnmet { hash: String, difficulty: u32 },

    #[error("Input references an unknown unspent output")]
    UnknownOutput,

    #[error("Signer does not own the referenced output")]
    OwnerMismatch,

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: u32, available: u64 },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Input signature does not verify against the output owner")]
    InvalidSignature,

    #[error("The same output is spent twice by one transaction")]
    DuplicateInput,

    #[error("Two outputs of one transaction share the same hash")]
    DuplicateOutput,

    #[error("Inputs sum to {inputs} but outputs sum to {outputs}")]
    Unbalanced { inputs: u64, outputs: u64 },

    #[error("Block claims difficulty {found} but the chain requires {expected}")]
    WrongDifficulty { expected: u32, found: u32 },

    #[error("Malformed coinbase: {0}")]
    MalformedCoinbase(String),

    #[error("Transaction at position {position} is invalid: {source}")]
    InvalidTransaction { position: usize, source: Box<Error> },

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub mod block;
pub mod config;
pub mod crypto;
pub mod transaction;
pub mod unspent;
