//! Binary layout of a ledger file.
//!
//! ```text
//! magic "HBLK" | version "0.3" | endianness (1 little, 2 big) | block_count u32
//! blocks: index u32 | difficulty u32 | timestamp u64 | nonce u64 | prev_hash [32]
//!         | payload_len u32 | payload | hash [32] | tx_count u32 | transactions
//! transactions: id [32] | input_count u32 | inputs | output_count u32 | outputs
//! inputs: block_hash [32] | tx_id [32] | tx_out_hash [32] | sig_len u8 | sig
//! outputs: amount u32 | public_key [65] | hash [32]
//! unspent_count u32 | unspent: block_hash [32] | tx_id [32] | amount u32 | public_key [65] | hash [32]
//! ```
//!
//! Versions "0.1" and "0.2" carry neither transaction lists nor the unspent section.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;

use ledger::Blockchain;
use model::block::{Block, BlockHeader};
use model::crypto::{Hash, PublicKey, Signature, HASH_LEN, PUBLIC_KEY_LEN, SIGNATURE_MAX_LEN};
use model::transaction::{Transaction, TxInput, TxOutput};
use model::unspent::{UnspentOutput, UnspentSet};
use model::BLOCK_DATA_MAX;

use crate::{StoreError, StoreResult};

const MAGIC: &[u8; 4] = b"HBLK";
const VERSION: &[u8; 3] = b"0.3";
const LEGACY_VERSIONS: [&[u8; 3]; 2] = [b"0.1", b"0.2"];
const LITTLE_ENDIAN: u8 = 1;
const BIG_ENDIAN: u8 = 2;

/// Encodes the ledger in the current version, little endian.
pub fn encode(blockchain: &Blockchain) -> Bytes {
    let mut writer = Writer::new(false);
    writer.write_ledger(blockchain);
    writer.buf.freeze()
}

/// Decodes a ledger of any supported version and endianness. Trailing bytes are rejected.
pub fn decode(bytes: &[u8]) -> StoreResult<Blockchain> {
    let mut reader = Reader::new(bytes);

    if reader.take(MAGIC.len(), "magic")? != MAGIC {
        return Err(format_error("bad magic"));
    }
    let version = reader.take(VERSION.len(), "version")?;
    let legacy = if version == VERSION {
        false
    } else if LEGACY_VERSIONS.iter().any(|v| version == &v[..]) {
        true
    } else {
        return Err(format_error(format!(
            "unsupported version {}",
            String::from_utf8_lossy(version)
        )));
    };
    reader.big_endian = match reader.u8("endianness")? {
        LITTLE_ENDIAN => false,
        BIG_ENDIAN => true,
        other => return Err(format_error(format!("unknown endianness {}", other))),
    };
    debug!(
        "Reading ledger version {} ({} endian)",
        String::from_utf8_lossy(version),
        if reader.big_endian { "big" } else { "little" }
    );

    let block_count = reader.u32("block_count")?;
    if block_count == 0 {
        return Err(format_error("ledger holds no block"));
    }
    let mut chain = Vec::new();
    for _ in 0..block_count {
        chain.push(reader.block(legacy)?);
    }

    let mut unspent = UnspentSet::new();
    if !legacy {
        let unspent_count = reader.u32("unspent_count")?;
        for _ in 0..unspent_count {
            unspent.push(reader.unspent_output()?);
        }
    }

    if reader.buf.has_remaining() {
        return Err(format_error(format!("{} trailing bytes", reader.buf.remaining())));
    }
    Blockchain::from_parts(chain, unspent).map_err(|e| format_error(e.to_string()))
}

fn format_error<S: Into<String>>(message: S) -> StoreError {
    StoreError::FormatError(message.into())
}

struct Writer {
    buf: BytesMut,
    big_endian: bool,
}

impl Writer {
    fn new(big_endian: bool) -> Self {
        Self {
            buf: BytesMut::new(),
            big_endian,
        }
    }

    fn u32(&mut self, value: u32) {
        if self.big_endian {
            self.buf.put_u32(value)
        } else {
            self.buf.put_u32_le(value)
        }
    }

    fn u64(&mut self, value: u64) {
        if self.big_endian {
            self.buf.put_u64(value)
        } else {
            self.buf.put_u64_le(value)
        }
    }

    fn file_header(&mut self, version: &[u8; 3], block_count: u32) {
        self.buf.put_slice(MAGIC);
        self.buf.put_slice(version);
        self.buf.put_u8(if self.big_endian { BIG_ENDIAN } else { LITTLE_ENDIAN });
        self.u32(block_count);
    }

    fn write_ledger(&mut self, blockchain: &Blockchain) {
        self.file_header(VERSION, blockchain.len() as u32);
        for block in blockchain.blocks() {
            self.block_without_transactions(block);
            self.u32(block.transactions.len() as u32);
            for transaction in &block.transactions {
                self.transaction(transaction);
            }
        }
        self.u32(blockchain.unspent().len() as u32);
        for unspent in blockchain.unspent() {
            self.buf.put_slice(&unspent.block_hash);
            self.buf.put_slice(&unspent.tx_id);
            self.output(&unspent.output);
        }
    }

    fn block_without_transactions(&mut self, block: &Block) {
        self.u32(block.header.index);
        self.u32(block.header.difficulty);
        self.u64(block.header.timestamp);
        self.u64(block.header.nonce);
        self.buf.put_slice(&block.header.prev_hash);
        self.u32(block.payload().len() as u32);
        self.buf.put_slice(block.payload());
        self.buf.put_slice(&block.hash);
    }

    fn transaction(&mut self, transaction: &Transaction) {
        self.buf.put_slice(&transaction.id);
        self.u32(transaction.inputs.len() as u32);
        for input in &transaction.inputs {
            self.buf.put_slice(&input.block_hash);
            self.buf.put_slice(&input.tx_id);
            self.buf.put_slice(&input.tx_out_hash);
            self.buf.put_u8(input.signature.len() as u8);
            self.buf.put_slice(input.signature.as_bytes());
        }
        self.u32(transaction.outputs.len() as u32);
        for output in &transaction.outputs {
            self.output(output);
        }
    }

    fn output(&mut self, output: &TxOutput) {
        self.u32(output.amount);
        self.buf.put_slice(&output.public_key);
        self.buf.put_slice(&output.hash);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            big_endian: false,
        }
    }

    fn ensure(&self, len: usize, field: &str) -> StoreResult<()> {
        if self.buf.remaining() < len {
            return Err(format_error(format!(
                "truncated {}: {} bytes needed, {} left",
                field,
                len,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn take(&mut self, len: usize, field: &str) -> StoreResult<&'a [u8]> {
        self.ensure(len, field)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self, field: &str) -> StoreResult<u8> {
        self.ensure(1, field)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self, field: &str) -> StoreResult<u32> {
        self.ensure(4, field)?;
        Ok(if self.big_endian {
            self.buf.get_u32()
        } else {
            self.buf.get_u32_le()
        })
    }

    fn u64(&mut self, field: &str) -> StoreResult<u64> {
        self.ensure(8, field)?;
        Ok(if self.big_endian {
            self.buf.get_u64()
        } else {
            self.buf.get_u64_le()
        })
    }

    fn hash(&mut self, field: &str) -> StoreResult<Hash> {
        let mut hash = [0u8; HASH_LEN];
        hash.copy_from_slice(self.take(HASH_LEN, field)?);
        Ok(hash)
    }

    fn public_key(&mut self) -> StoreResult<PublicKey> {
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(self.take(PUBLIC_KEY_LEN, "public key")?);
        Ok(public_key)
    }

    fn block(&mut self, legacy: bool) -> StoreResult<Block> {
        let header = BlockHeader {
            index: self.u32("block index")?,
            difficulty: self.u32("difficulty")?,
            timestamp: self.u64("timestamp")?,
            nonce: self.u64("nonce")?,
            prev_hash: self.hash("previous hash")?,
        };
        let payload_len = self.u32("payload length")? as usize;
        if payload_len > BLOCK_DATA_MAX {
            return Err(format_error(format!(
                "payload of block {} is {} bytes long, at most {} allowed",
                header.index, payload_len, BLOCK_DATA_MAX
            )));
        }
        let payload = self.take(payload_len, "payload")?.to_vec();
        let hash = self.hash("block hash")?;

        let mut transactions = Vec::new();
        if !legacy {
            let tx_count = self.u32("transaction count")?;
            for _ in 0..tx_count {
                transactions.push(self.transaction()?);
            }
        }
        Block::from_parts(header, payload, transactions, hash).map_err(|e| format_error(e.to_string()))
    }

    fn transaction(&mut self) -> StoreResult<Transaction> {
        let id = self.hash("transaction id")?;

        let input_count = self.u32("input count")?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let block_hash = self.hash("input block hash")?;
            let tx_id = self.hash("input transaction id")?;
            let tx_out_hash = self.hash("input output hash")?;
            let sig_len = self.u8("signature length")? as usize;
            if sig_len > SIGNATURE_MAX_LEN {
                return Err(format_error(format!("signature of {} bytes", sig_len)));
            }
            let signature = Signature::from_bytes(self.take(sig_len, "signature")?)
                .map_err(|e| format_error(e.to_string()))?;
            inputs.push(TxInput {
                block_hash,
                tx_id,
                tx_out_hash,
                signature,
            });
        }

        let output_count = self.u32("output count")?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(self.output()?);
        }

        // The stored id is kept so that tampering stays detectable.
        Ok(Transaction { id, inputs, outputs })
    }

    fn output(&mut self) -> StoreResult<TxOutput> {
        Ok(TxOutput {
            amount: self.u32("amount")?,
            public_key: self.public_key()?,
            hash: self.hash("output hash")?,
        })
    }

    fn unspent_output(&mut self) -> StoreResult<UnspentOutput> {
        let block_hash = self.hash("unspent block hash")?;
        let tx_id = self.hash("unspent transaction id")?;
        let output = self.output()?;
        Ok(UnspentOutput::new(block_hash, tx_id, output))
    }
}
