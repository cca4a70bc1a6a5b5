/// RPC Client module (§4.1): a thin `ChainClient` trait over the chain's
/// JSON-RPC/WebSocket surface, so the pipeline, tailer, and backfill driver
/// depend on an interface rather than a concrete transport. Grounded on
/// `other_examples/...force23airr-stableguard__src-indexer-chain.rs` for the
/// alloy call shapes, since the teacher (rustyblox) talks to its PIVX node
/// via raw `reqwest` JSON-RPC in `monitor.rs` rather than a typed client.
pub mod client;

use crate::error::IndexError;
use crate::types::{Block, Transaction};
use futures::stream::BoxStream;

/// A new chain head as delivered by the subscription transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub number: u64,
    pub hash: String,
}

/// Capability set required by the pipeline, tailer, and backfill driver.
///
/// `block_by_number` and `receipt` are request/response; `subscribe_new_heads`
/// is a streaming push. Implementations map transport failures to
/// `TransientUpstream` (network, timeout, 5xx) or `PermanentUpstream`
/// (malformed response, unknown method) — the pipeline does not retry at
/// this layer, it treats both the same way (skip this unit of work).
pub trait ChainClient: Send + Sync {
    async fn block_by_number(&self, height: u64) -> Result<(Block, Vec<Transaction>), IndexError>;

    async fn receipt(&self, tx_hash: &str) -> Result<RawReceipt, IndexError>;

    async fn head_height(&self) -> Result<u64, IndexError>;

    async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, Result<Header, IndexError>>, IndexError>;
}

/// A receipt as returned by `eth_getTransactionReceipt`, before it is split
/// into the `Receipt` row and its `TransactionLog` children.
#[derive(Debug, Clone)]
pub struct RawReceipt {
    pub tx_hash: String,
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Clone)]
pub struct RawLog {
    pub log_index: i64,
    pub data: Vec<u8>,
}
