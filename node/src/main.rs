use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{App, AppSettings, ArgMatches, SubCommand};
use env_logger::Env;
use log::{info, warn};
use serde_json::json;
use tokio::sync::mpsc::channel;
use tokio::sync::RwLock;

use ledger::Blockchain;
use miner::{BlockBuilder, MinerService};
use model::block::BlockHash;
use model::config::Parameters;
use model::crypto::{load_public_key, KeyPair};
use model::transaction::Transaction;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("HBLK")
        .version("1.0")
        .about("A single node proof-of-work ledger")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("keygen")
                .about("Generate a key pair into a directory")
                .args_from_usage("--dir=<DIR> 'Directory receiving key.pem and key_pub.pem'"),
        )
        .subcommand(
            SubCommand::with_name("init")
                .about("Create a ledger holding the genesis block")
                .args_from_usage("--ledger=<FILE> 'Ledger file'"),
        )
        .subcommand(
            SubCommand::with_name("mine")
                .about("Mine one block rewarding the given key")
                .args_from_usage(
                    "--ledger=<FILE> 'Ledger file'
                    --key=<DIR> 'Directory holding the miner key'
                    --config=[FILE] 'JSON file holding the miner parameters'",
                ),
        )
        .subcommand(
            SubCommand::with_name("send")
                .about("Pay someone and mine the block carrying the payment")
                .args_from_usage(
                    "--ledger=<FILE> 'Ledger file'
                    --key=<DIR> 'Directory holding the sender key'
                    --to=<DIR> 'Directory holding the receiver public key'
                    --amount=<INT> 'Amount to send'
                    --config=[FILE] 'JSON file holding the miner parameters'",
                ),
        )
        .subcommand(
            SubCommand::with_name("balance")
                .about("Print the balance of a public key")
                .args_from_usage(
                    "--ledger=<FILE> 'Ledger file'
                    --key=<DIR> 'Directory holding the public key'",
                ),
        )
        .subcommand(
            SubCommand::with_name("validate")
                .about("Replay the whole ledger and check every block")
                .args_from_usage("--ledger=<FILE> 'Ledger file'"),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Print a JSON summary of the ledger")
                .args_from_usage("--ledger=<FILE> 'Ledger file'"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run the miner until interrupted or until enough blocks are mined")
                .args_from_usage(
                    "--ledger=<FILE> 'Ledger file'
                    --key=<DIR> 'Directory holding the miner key'
                    --config=[FILE] 'JSON file holding the miner parameters'
                    --blocks=[INT] 'Stop after mining this many blocks'",
                ),
        )
        .get_matches();

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    logger.format_timestamp_millis();
    logger.init();

    match matches.subcommand() {
        ("keygen", Some(sub_matches)) => keygen(sub_matches)?,
        ("init", Some(sub_matches)) => init(sub_matches)?,
        ("mine", Some(sub_matches)) => mine(sub_matches)?,
        ("send", Some(sub_matches)) => send(sub_matches)?,
        ("balance", Some(sub_matches)) => balance(sub_matches)?,
        ("validate", Some(sub_matches)) => validate(sub_matches)?,
        ("info", Some(sub_matches)) => print_info(sub_matches)?,
        ("run", Some(sub_matches)) => run(sub_matches).await?,
        _ => unreachable!(),
    }
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches<'_>, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| anyhow!("Missing argument --{}", name))
}

fn load_ledger(matches: &ArgMatches<'_>) -> Result<Blockchain> {
    let path = required(matches, "ledger")?;
    storage::deserialize(path).with_context(|| format!("Failed to load the ledger from {}", path))
}

fn save_ledger(matches: &ArgMatches<'_>, blockchain: &Blockchain) -> Result<()> {
    let path = required(matches, "ledger")?;
    storage::serialize(blockchain, path).with_context(|| format!("Failed to save the ledger to {}", path))
}

fn load_key(matches: &ArgMatches<'_>) -> Result<KeyPair> {
    let dir = required(matches, "key")?;
    KeyPair::load(dir).with_context(|| format!("Failed to load the key from {}", dir))
}

fn load_parameters(matches: &ArgMatches<'_>) -> Result<Parameters> {
    match matches.value_of("config") {
        Some(path) => Parameters::from_file(path).context("Failed to load the parameters"),
        None => Ok(Parameters::default()),
    }
}

fn keygen(matches: &ArgMatches<'_>) -> Result<()> {
    let dir = required(matches, "dir")?;
    let key = KeyPair::generate();
    key.save(dir).with_context(|| format!("Failed to save the key into {}", dir))?;
    info!("Generated key {} into {}", hex::encode(key.public_key()), dir);
    Ok(())
}

fn init(matches: &ArgMatches<'_>) -> Result<()> {
    let blockchain = Blockchain::new();
    save_ledger(matches, &blockchain)?;
    info!("Created {}", blockchain);
    Ok(())
}

fn mine(matches: &ArgMatches<'_>) -> Result<()> {
    let mut blockchain = load_ledger(matches)?;
    let key = load_key(matches)?;
    let parameters = load_parameters(matches)?;

    let builder = BlockBuilder::new(key.public_key(), parameters.block_payload.as_bytes());
    let block = builder.build(&blockchain, vec![])?;
    blockchain.append(block).context("Mined block was rejected")?;
    save_ledger(matches, &blockchain)
}

fn send(matches: &ArgMatches<'_>) -> Result<()> {
    let mut blockchain = load_ledger(matches)?;
    let sender = load_key(matches)?;
    let parameters = load_parameters(matches)?;
    let to = required(matches, "to")?;
    let receiver = load_public_key(to).with_context(|| format!("Failed to load the public key from {}", to))?;
    let amount = required(matches, "amount")?
        .parse::<u32>()
        .context("The amount must be a positive integer")?;

    let transaction = Transaction::create(&sender, &receiver, amount, blockchain.unspent())
        .context("Failed to create the transaction")?;
    info!("Created {}", transaction);

    let builder = BlockBuilder::new(sender.public_key(), parameters.block_payload.as_bytes());
    let block = builder.build(&blockchain, vec![transaction])?;
    if block.transactions.len() < 2 {
        bail!("The transaction was dropped from the block");
    }
    blockchain.append(block).context("Mined block was rejected")?;
    save_ledger(matches, &blockchain)
}

fn balance(matches: &ArgMatches<'_>) -> Result<()> {
    let blockchain = load_ledger(matches)?;
    let dir = required(matches, "key")?;
    let public_key = load_public_key(dir).with_context(|| format!("Failed to load the public key from {}", dir))?;
    println!("{}", blockchain.balance(&public_key));
    Ok(())
}

fn validate(matches: &ArgMatches<'_>) -> Result<()> {
    let blockchain = load_ledger(matches)?;
    blockchain.verify().context("The ledger is invalid")?;
    info!("{} is valid", blockchain);
    Ok(())
}

fn print_info(matches: &ArgMatches<'_>) -> Result<()> {
    let blockchain = load_ledger(matches)?;
    let tip = blockchain.tip();
    let summary = json!({
        "blocks": blockchain.len(),
        "unspent_outputs": blockchain.unspent().len(),
        "coins": blockchain.unspent().iter().map(|u| u.output.amount as u64).sum::<u64>(),
        "next_difficulty": blockchain.difficulty(),
        "tip": {
            "index": tip.header.index,
            "hash": hex::encode(tip.hash),
            "difficulty": tip.header.difficulty,
            "timestamp": tip.header.timestamp,
            "transactions": tip.transactions.len(),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run(matches: &ArgMatches<'_>) -> Result<()> {
    let blockchain = Arc::new(RwLock::new(load_ledger(matches)?));
    let key = load_key(matches)?;
    let parameters = load_parameters(matches)?;
    let limit = match matches.value_of("blocks") {
        Some(blocks) => Some(blocks.parse::<usize>().context("--blocks must be an integer")?),
        None => None,
    };

    let (transaction_sender, transaction_receiver) = channel::<Transaction>(DEFAULT_CHANNEL_CAPACITY);
    let (block_sender, mut block_receiver) = channel::<BlockHash>(DEFAULT_CHANNEL_CAPACITY);

    let handle = MinerService::spawn(
        blockchain.clone(),
        key.public_key(),
        parameters,
        transaction_receiver,
        block_sender,
    );

    let mut mined = 0;
    loop {
        tokio::select! {
            Some(hash) = block_receiver.recv() => {
                mined += 1;
                info!("Block {} mined ({} so far)", hex::encode(hash), mined);
                if limit.map_or(false, |limit| mined >= limit) {
                    break;
                }
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for interrupts: {}", e);
                }
                info!("Interrupted");
                break;
            }
        }
    }

    drop(transaction_sender);
    drop(block_receiver);
    handle.await.context("Miner task failed")?;

    let blockchain = blockchain.read().await;
    save_ledger(matches, &blockchain)?;
    info!("Stopped with {}", blockchain);
    Ok(())
}
