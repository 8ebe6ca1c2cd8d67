use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// The maximum delay the miner waits before sealing a block, even if it did not collect
    /// `max_block_transactions`. Denominated in ms.
    pub max_block_delay: u64,
    /// The miner seals a block as soon as this many transactions are pending.
    pub max_block_transactions: usize,
    /// Payload written into every block the miner seals.
    pub block_payload: String,
}

impl Parameters {
    pub fn new() -> Self {
        Self {
            max_block_delay: 5000,
            max_block_transactions: 100,
            block_payload: String::from("mined block"),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path.as_ref()).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;
        let parameters: Parameters = serde_json::from_slice(data.as_slice())
            .map_err(|e| Error::Config(format!("failed to parse parameters: {}", e)))?;
        if parameters.max_block_transactions == 0 {
            return Err(Error::Config("max_block_transactions must be positive".to_string()));
        }
        Ok(parameters)
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parameters: Parameters = serde_json::from_str(r#"{ "max_block_delay": 250 }"#).unwrap();
        assert_eq!(parameters.max_block_delay, 250);
        assert_eq!(parameters.max_block_transactions, 100);
        assert_eq!(parameters.block_payload, "mined block");
    }

    #[test]
    fn from_file_rejects_garbage() {
        let path = std::env::temp_dir().join("hblk_parameters_garbage.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(Parameters::from_file(&path), Err(Error::Config(_))));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn from_file_reads_values() {
        let path = std::env::temp_dir().join("hblk_parameters_values.json");
        fs::write(&path, br#"{ "max_block_transactions": 3, "block_payload": "node-1" }"#).unwrap();
        let parameters = Parameters::from_file(&path).unwrap();
        assert_eq!(parameters.max_block_transactions, 3);
        assert_eq!(parameters.block_payload, "node-1");
        assert_eq!(parameters.max_block_delay, 5000);
        let _ = fs::remove_file(&path);
    }
}
