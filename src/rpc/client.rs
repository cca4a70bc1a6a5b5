/// Production `ChainClient` implementation, wrapping an HTTP JSON-RPC
/// endpoint for request/response calls and a WebSocket endpoint for the
/// head subscription. Grounded on
/// `other_examples/...force23airr-stableguard__src-indexer-chain.rs`, the
/// only file in the retrieval pack that drives `alloy`'s provider/subscription
/// API end to end (`ProviderBuilder::connect_http`/`connect_ws`,
/// `get_block_by_number(..).full()`, `subscribe_blocks().into_stream()`).
use alloy::eips::BlockNumberOrTag;
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::rpc::types::eth::{BlockTransactions, ReceiptResponse};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::IndexError;
use crate::metrics;
use crate::rpc::{ChainClient, Header, RawLog, RawReceipt};
use crate::signer;
use crate::types::{normalize_hash, Block, Transaction};

pub struct RpcClient {
    http: RootProvider,
    ws_url: String,
}

impl RpcClient {
    /// Connects the HTTP transport eagerly; the WS transport is dialed lazily
    /// on each `subscribe_new_heads()` call so a dropped subscription can
    /// reconnect without rebuilding the whole client (§4.5, Head Tailer).
    pub async fn connect(http_url: &str, ws_url: &str) -> Result<Self, IndexError> {
        let url = http_url
            .parse()
            .map_err(|e| IndexError::Initialization(format!("invalid RPC HTTP URL: {e}")))?;
        let http = ProviderBuilder::new().connect_http(url);
        Ok(Self {
            http,
            ws_url: ws_url.to_string(),
        })
    }

    fn map_rpc_err(context: &str, e: impl std::fmt::Display) -> IndexError {
        // alloy's transport error wraps both network-level failures and
        // well-formed JSON-RPC error responses in one type; we can't always
        // tell them apart, so we classify conservatively as transient — a
        // caller that treats Transient and Permanent identically (§4.1) loses
        // nothing, and a permanently-malformed call will simply keep failing
        // on the same height until it ages out of the backfill window.
        IndexError::transient(format!("{context}: {e}"))
    }
}

impl ChainClient for RpcClient {
    async fn block_by_number(&self, height: u64) -> Result<(Block, Vec<Transaction>), IndexError> {
        let histogram = metrics::RPC_CALL_DURATION.with_label_values(&["eth_getBlockByNumber"]);
        let rpc_block = metrics::timed(&histogram, self.http.get_block_by_number(BlockNumberOrTag::Number(height)).full())
            .await
            .map_err(|e| Self::map_rpc_err("eth_getBlockByNumber", e))?
            .ok_or_else(|| IndexError::permanent(format!("block {height} not found upstream")))?;

        let hash = normalize_hash(&rpc_block.header.hash.to_string());
        let parent = normalize_hash(&rpc_block.header.parent_hash.to_string());
        let block = Block {
            number: rpc_block.header.number,
            hash: hash.clone(),
            time: rpc_block.header.timestamp,
            parent,
            stable: false,
            created_at: crate::types::now_millis(),
            updated_at: crate::types::now_millis(),
        };

        let full_txs = match rpc_block.transactions {
            BlockTransactions::Full(txs) => txs,
            BlockTransactions::Hashes(_) | BlockTransactions::Uncle => {
                return Err(IndexError::permanent(format!(
                    "block {height}: upstream returned transaction hashes, not full bodies"
                )))
            }
        };

        let mut transactions = Vec::with_capacity(full_txs.len());
        for tx in &full_txs {
            let tx_from = match signer::recover_sender(tx) {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::warn!(tx_hash = %tx.inner.tx_hash(), error = %e, "sender recovery failed, skipping tx");
                    continue;
                }
            };
            let tx_to = tx
                .to()
                .map(|a| normalize_hash(&a.to_string()))
                .unwrap_or_else(|| crate::types::CONTRACT_CREATION_SENTINEL.to_string());

            transactions.push(Transaction {
                tx_hash: normalize_hash(&tx.inner.tx_hash().to_string()),
                block_hash: hash.clone(),
                tx_from: normalize_hash(&tx_from),
                tx_to,
                nonce: tx.nonce(),
                data: tx.input().to_vec(),
                value: tx.value().to_string(),
            });
        }

        Ok((block, transactions))
    }

    async fn receipt(&self, tx_hash: &str) -> Result<RawReceipt, IndexError> {
        let hash = tx_hash
            .parse()
            .map_err(|e| IndexError::permanent(format!("malformed tx hash {tx_hash}: {e}")))?;

        let histogram = metrics::RPC_CALL_DURATION.with_label_values(&["eth_getTransactionReceipt"]);
        let receipt = metrics::timed(&histogram, self.http.get_transaction_receipt(hash))
            .await
            .map_err(|e| Self::map_rpc_err("eth_getTransactionReceipt", e))?
            .ok_or_else(|| IndexError::permanent(format!("receipt for {tx_hash} not found upstream")))?;

        let logs = receipt
            .logs()
            .iter()
            .enumerate()
            .map(|(i, log)| RawLog {
                log_index: log.log_index.unwrap_or(i as u64) as i64,
                data: log.data().data.to_vec(),
            })
            .collect();

        Ok(RawReceipt {
            tx_hash: normalize_hash(tx_hash),
            logs,
        })
    }

    async fn head_height(&self) -> Result<u64, IndexError> {
        let histogram = metrics::RPC_CALL_DURATION.with_label_values(&["eth_blockNumber"]);
        metrics::timed(&histogram, self.http.get_block_number())
            .await
            .map_err(|e| Self::map_rpc_err("eth_blockNumber", e))
    }

    async fn subscribe_new_heads(&self) -> Result<BoxStream<'static, Result<Header, IndexError>>, IndexError> {
        let ws = WsConnect::new(&self.ws_url);
        let provider = ProviderBuilder::new()
            .connect_ws(ws)
            .await
            .map_err(|e| IndexError::transient(format!("eth_subscribe(newHeads) connect: {e}")))?;

        let sub = provider
            .subscribe_blocks()
            .await
            .map_err(|e| IndexError::transient(format!("eth_subscribe(newHeads): {e}")))?;

        let stream = sub.into_stream().map(|header| {
            Ok(Header {
                number: header.number,
                hash: normalize_hash(&header.hash_slow().to_string()),
            })
        });

        Ok(Box::pin(stream))
    }
}
