use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use ledger::Blockchain;
use model::block::BlockHash;
use model::config::Parameters;
use model::crypto::PublicKey;
use model::transaction::Transaction;

use crate::block_builder::BlockBuilder;

/// Collects transactions and seals them into mined blocks appended to the shared chain.
///
/// A block is sealed as soon as `max_block_transactions` are pending, or when
/// `max_block_delay` expires. The service is the only writer of the chain. It stops once the
/// transaction channel is closed, after sealing what is still pending.
pub struct MinerService {
    blockchain: Arc<RwLock<Blockchain>>,
    builder: BlockBuilder,
    parameters: Parameters,
    transaction_receiver: Receiver<Transaction>,
    block_sender: Sender<BlockHash>,
    current_transactions: Vec<Transaction>,
}

impl MinerService {
    pub fn spawn(
        blockchain: Arc<RwLock<Blockchain>>,
        miner: PublicKey,
        parameters: Parameters,
        transaction_receiver: Receiver<Transaction>,
        block_sender: Sender<BlockHash>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            Self {
                blockchain,
                builder: BlockBuilder::new(miner, parameters.block_payload.as_bytes()),
                parameters,
                transaction_receiver,
                block_sender,
                current_transactions: vec![],
            }
            .run()
            .await;
        })
    }

    async fn run(&mut self) {
        let timer = sleep(Duration::from_millis(self.parameters.max_block_delay));
        tokio::pin!(timer);

        loop {
            tokio::select! {
                transaction = self.transaction_receiver.recv() => match transaction {
                    Some(transaction) => {
                        debug!("Miner received {}", transaction);
                        self.current_transactions.push(transaction);

                        if self.current_transactions.len() >= self.parameters.max_block_transactions {
                            debug!("Miner has enough transactions to seal a block");
                            self.seal().await;
                            timer.as_mut().reset(self.reset_time());
                        }
                    }
                    None => {
                        if !self.current_transactions.is_empty() {
                            self.seal().await;
                        }
                        info!("Transaction channel closed, miner stops");
                        return;
                    }
                },

                // When time runs out, seal a block with whatever is pending, even nothing.
                () = &mut timer => {
                    self.seal().await;
                    timer.as_mut().reset(self.reset_time());
                }
            }
        }
    }

    /// Mines the pending transactions into a block. If no block gets appended, the transactions
    /// go back to the front of the queue for the next attempt.
    async fn seal(&mut self) {
        let pending: Vec<Transaction> = self.current_transactions.drain(..).collect();
        let candidate = {
            let blockchain = self.blockchain.read().await;
            self.builder.assemble(&blockchain, pending.clone())
        };
        let mut block = match candidate {
            Ok(block) => block,
            Err(e) => {
                warn!("Failed to assemble a block: {}", e);
                self.requeue(pending);
                return;
            }
        };

        let mined = tokio::task::spawn_blocking(move || {
            let attempts = block.mine();
            (block, attempts)
        })
        .await;
        let (block, attempts) = match mined {
            Ok(mined) => mined,
            Err(e) => {
                warn!("Mining task failed: {}", e);
                self.requeue(pending);
                return;
            }
        };
        debug!("Mined {} after {} attempts", block, attempts);

        let hash = block.hash;
        let appended = self.blockchain.write().await.append(block);
        if let Err(e) = appended {
            warn!("Mined block was rejected: {}", e);
            self.requeue(pending);
            return;
        }
        if self.block_sender.send(hash).await.is_err() {
            debug!("Nobody listens for mined blocks");
        }
    }

    fn requeue(&mut self, pending: Vec<Transaction>) {
        debug!("Requeuing {} transactions", pending.len());
        self.current_transactions.splice(0..0, pending);
    }

    fn reset_time(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.parameters.max_block_delay)
    }
}
