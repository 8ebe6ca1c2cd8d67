use std::fs;
use std::path::Path;

use log::info;
use thiserror::Error;

use ledger::Blockchain;

pub use codec::{decode, encode};

mod codec;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Malformed ledger file: {0}")]
    FormatError(String),
}

/// Writes the whole ledger to `path`, replacing any previous content.
pub fn serialize<P: AsRef<Path>>(blockchain: &Blockchain, path: P) -> StoreResult<()> {
    let bytes = encode(blockchain);
    fs::write(path.as_ref(), &bytes)?;
    info!(
        "Saved {} blocks and {} unspent outputs to {} ({} bytes)",
        blockchain.len(),
        blockchain.unspent().len(),
        path.as_ref().display(),
        bytes.len()
    );
    Ok(())
}

/// Reads a ledger written by [`serialize`]. The chain is not validated, see [`Blockchain::verify`].
pub fn deserialize<P: AsRef<Path>>(path: P) -> StoreResult<Blockchain> {
    let bytes = fs::read(path.as_ref())?;
    let blockchain = decode(&bytes)?;
    info!(
        "Loaded {} blocks and {} unspent outputs from {}",
        blockchain.len(),
        blockchain.unspent().len(),
        path.as_ref().display()
    );
    Ok(blockchain)
}
