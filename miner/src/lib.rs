pub use block_builder::BlockBuilder;
pub use service::MinerService;

mod block_builder;
mod service;
