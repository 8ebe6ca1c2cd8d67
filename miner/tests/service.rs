use std::sync::Arc;
use std::time::Duration;

use ledger::Blockchain;
use miner::MinerService;
use model::config::Parameters;
use model::crypto::KeyPair;
use model::transaction::Transaction;
use tokio::sync::mpsc::channel;
use tokio::sync::RwLock;
use tokio::time::timeout;

fn parameters(max_block_delay: u64, max_block_transactions: usize) -> Parameters {
    Parameters {
        max_block_delay,
        max_block_transactions,
        block_payload: "service test".to_string(),
    }
}

#[tokio::test]
async fn timer_seals_empty_blocks() {
    let miner = KeyPair::generate();
    let blockchain = Arc::new(RwLock::new(Blockchain::new()));
    let (_tx_sender, tx_receiver) = channel(10);
    let (block_sender, mut block_receiver) = channel(10);

    MinerService::spawn(blockchain.clone(), miner.public_key(), parameters(50, 100), tx_receiver, block_sender);

    let hash = timeout(Duration::from_secs(10), block_receiver.recv())
        .await
        .unwrap()
        .unwrap();
    let blockchain = blockchain.read().await;
    assert!(blockchain.blocks().iter().any(|b| b.hash == hash));
    assert!(blockchain.balance(&miner.public_key()) >= 50);
    assert!(blockchain.verify().is_ok());
}

#[tokio::test]
async fn threshold_seals_pending_transactions() {
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    let blockchain = Arc::new(RwLock::new(Blockchain::new()));
    let (tx_sender, tx_receiver) = channel(10);
    let (block_sender, mut block_receiver) = channel(10);

    // Fund alice through the first timer-sealed block.
    let handle = MinerService::spawn(
        blockchain.clone(),
        alice.public_key(),
        parameters(50, 2),
        tx_receiver,
        block_sender,
    );
    timeout(Duration::from_secs(10), block_receiver.recv()).await.unwrap().unwrap();
    drop(block_receiver);

    let payment = {
        let chain = blockchain.read().await;
        Transaction::create(&alice, &bob.public_key(), 10, chain.unspent()).unwrap()
    };
    let conflicting = {
        let chain = blockchain.read().await;
        Transaction::create(&alice, &bob.public_key(), 45, chain.unspent()).unwrap()
    };
    tx_sender.send(payment).await.unwrap();
    tx_sender.send(conflicting).await.unwrap();
    drop(tx_sender);

    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    let chain = blockchain.read().await;
    // Both payments spend alice's oldest output, only the first one is kept.
    assert_eq!(chain.balance(&bob.public_key()), 10);
    assert!(chain.verify().is_ok());
}

#[tokio::test]
async fn closing_the_channel_stops_the_service() {
    let miner = KeyPair::generate();
    let blockchain = Arc::new(RwLock::new(Blockchain::new()));
    let (tx_sender, tx_receiver) = channel::<Transaction>(10);
    let (block_sender, _block_receiver) = channel(10);

    let handle = MinerService::spawn(blockchain.clone(), miner.public_key(), parameters(60_000, 100), tx_receiver, block_sender);
    drop(tx_sender);

    timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    assert_eq!(blockchain.read().await.len(), 1);
}
