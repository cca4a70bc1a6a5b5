/// Decides whether a freshly-fetched block should be skipped, marked
/// stable, or replace a stale row at the same height, by comparing the
/// stored hash against the freshly-fetched one and deleting on mismatch.
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::IndexError;
use crate::metrics;
use crate::storage::StorageGateway;
use crate::types::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    MarkStable,
    Replace,
}

/// Serializes reconcile-then-write sequences for the same height behind a
/// sharded async mutex (§5), so two concurrent pipeline invocations for the
/// same `number` — one from the tailer, one from backfill — can never
/// interleave a partial cascade-delete with a concurrent upsert of stale
/// data.
pub struct Reconciler {
    storage: StorageGateway,
    shards: Vec<Arc<Mutex<()>>>,
}

const SHARD_COUNT: usize = 16;

impl Reconciler {
    pub fn new(storage: StorageGateway) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Arc::new(Mutex::new(()))).collect();
        Self { storage, shards }
    }

    fn shard_for(&self, number: u64) -> &Arc<Mutex<()>> {
        &self.shards[(number as usize) % self.shards.len()]
    }

    /// Runs `reconcile` and, on `Replace`, leaves the caller free to persist
    /// the new block — the delete (if any) has already happened under the
    /// per-height lock by the time this returns.
    pub async fn reconcile(&self, new_block: &Block) -> Decision {
        let shard = self.shard_for(new_block.number).clone();
        let _guard = shard.lock().await;

        let old = match self.storage.get_block_by_number(new_block.number).await {
            Ok(old) => old,
            Err(_) => return Decision::Skip,
        };

        let Some(old) = old else {
            return Decision::Replace;
        };

        if old.hash == new_block.hash {
            if self.storage.set_block_stable(new_block.number, true).await.is_err() {
                return Decision::Skip;
            }
            return Decision::MarkStable;
        }

        if let Err(e) = self.storage.delete_block(new_block.number).await {
            // Old row present but its delete failed (§7 `ReconcileRefusal`):
            // treated as `Skip` here, same as every other refusal, but
            // recorded under its own kind so it's distinguishable from a
            // plain storage failure elsewhere — a later pass retries the
            // delete once the old row is re-encountered.
            let refusal = IndexError::ReconcileRefusal(format!(
                "delete_block({}) failed: {e}",
                new_block.number
            ));
            tracing::warn!(number = new_block.number, error = %refusal, "reconcile refused, old row still present");
            metrics::ERRORS_TOTAL.with_label_values(&["reconcile_refusal"]).inc();
            return Decision::Skip;
        }
        metrics::REORGS_HANDLED.inc();
        Decision::Replace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::connect_sqlite_fixture;

    fn block(number: u64, hash: &str) -> Block {
        Block {
            number,
            hash: hash.to_string(),
            time: 1,
            parent: "0xparent".to_string(),
            stable: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn absent_row_is_replace() {
        let gw = StorageGateway::new(connect_sqlite_fixture().await);
        let reconciler = Reconciler::new(gw);
        let decision = reconciler.reconcile(&block(10, "0xnew")).await;
        assert_eq!(decision, Decision::Replace);
    }

    #[tokio::test]
    async fn matching_hash_is_mark_stable_and_flips_flag() {
        let gw = StorageGateway::new(connect_sqlite_fixture().await);
        gw.upsert_block(&block(10, "0xsame")).await.unwrap();
        let reconciler = Reconciler::new(gw.clone());

        let decision = reconciler.reconcile(&block(10, "0xsame")).await;
        assert_eq!(decision, Decision::MarkStable);

        let stored = gw.get_block_by_number(10).await.unwrap().unwrap();
        assert!(stored.stable);
    }

    #[tokio::test]
    async fn differing_hash_deletes_old_row_and_replaces() {
        let gw = StorageGateway::new(connect_sqlite_fixture().await);
        gw.upsert_block(&block(10, "0xstale")).await.unwrap();
        let reconciler = Reconciler::new(gw.clone());

        let decision = reconciler.reconcile(&block(10, "0xfresh")).await;
        assert_eq!(decision, Decision::Replace);
        assert!(gw.get_block_by_number(10).await.unwrap().is_none(), "stale row must be gone before caller re-persists");
    }
}
