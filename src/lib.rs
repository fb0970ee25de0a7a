pub mod address;
pub mod amount;
pub mod bridge;
pub mod builder;
pub mod config;
pub mod error;
pub mod error_handling;
pub mod health;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod miner;
pub mod payload;
pub mod prng;
pub mod prometheus_metrics;
pub mod rpc;
pub mod server;
pub mod types;
pub mod utxo;

pub use address::L2Address;
pub use bridge::{Bridge, BridgeOutcome, BridgeSettings};
pub use error::{BridgeError, Result};
pub use ledger::{Blake3Ledger, LedgerCodec};
pub use payload::EntryPayload;
pub use types::{BridgeParams, CandidateTransaction, IdPrefix, MiningResult, TransactionId};
