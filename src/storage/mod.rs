/// Storage Gateway (§4.2): CRUD over blocks/transactions/receipts/logs on a
/// single process-wide `sqlx::AnyPool`, so the same code path runs against
/// postgres, mysql, or sqlite depending on `DATABASE_DIALECT`. Grounded on
/// the teacher's `db_handles.rs` for the "one gateway struct owns the pool,
/// callers never touch the connection directly" shape; the upsert-by-natural-
/// key semantics and cascading delete are new to this domain.
pub mod pool;

use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};

use crate::error::IndexError;
use crate::metrics;
use crate::types::{now_millis, Block, Receipt, Transaction, TransactionLog};

#[derive(Clone)]
pub struct StorageGateway {
    pool: AnyPool,
}

impl StorageGateway {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Insert if `number` absent, else no-op (§4.2, "first-or-create").
    pub async fn upsert_block(&self, block: &Block) -> Result<(), IndexError> {
        let now = now_millis();
        let histogram = metrics::STORAGE_CALL_DURATION.with_label_values(&["upsert_block"]);
        metrics::timed(
            &histogram,
            sqlx::query(
                "INSERT INTO blocks (number, hash, time, parent, stable, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (number) DO NOTHING",
            )
            .bind(block.number as i64)
            .bind(&block.hash)
            .bind(block.time as i64)
            .bind(&block.parent)
            .bind(block.stable)
            .bind(now)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn set_block_stable(&self, number: u64, stable: bool) -> Result<(), IndexError> {
        sqlx::query("UPDATE blocks SET stable = ?, updated_at = ? WHERE number = ?")
            .bind(stable)
            .bind(now_millis())
            .bind(number as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes the Block row; `ON DELETE CASCADE` takes its Transactions,
    /// Receipts, and Logs with it. A single statement is already atomic, so
    /// no explicit transaction wrapper is needed beyond what the driver gives.
    pub async fn delete_block(&self, number: u64) -> Result<(), IndexError> {
        let histogram = metrics::STORAGE_CALL_DURATION.with_label_values(&["delete_block"]);
        metrics::timed(
            &histogram,
            sqlx::query("DELETE FROM blocks WHERE number = ?")
                .bind(number as i64)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>, IndexError> {
        let row = sqlx::query(
            "SELECT number, hash, time, parent, stable, created_at, updated_at \
             FROM blocks WHERE number = ?",
        )
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_block))
    }

    pub async fn get_latest_blocks(&self, limit: u32) -> Result<Vec<Block>, IndexError> {
        let rows = sqlx::query(
            "SELECT number, hash, time, parent, stable, created_at, updated_at \
             FROM blocks ORDER BY number DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_block).collect())
    }

    pub async fn upsert_transaction(&self, tx: &Transaction) -> Result<(), IndexError> {
        sqlx::query(
            "INSERT INTO transactions (tx_hash, block_hash, tx_from, tx_to, nonce, data, value) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (tx_hash) DO NOTHING",
        )
        .bind(&tx.tx_hash)
        .bind(&tx.block_hash)
        .bind(&tx.tx_from)
        .bind(&tx.tx_to)
        .bind(tx.nonce as i64)
        .bind(&tx.data)
        .bind(&tx.value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_receipt(&self, tx_hash: &str) -> Result<(), IndexError> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO receipts (tx_hash, created_at, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (tx_hash) DO NOTHING",
        )
        .bind(tx_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_transaction_log(
        &self,
        tx_hash: &str,
        log_index: i64,
        data: &[u8],
    ) -> Result<(), IndexError> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO transaction_logs (tx_hash, log_index, data, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (tx_hash, log_index) DO NOTHING",
        )
        .bind(tx_hash)
        .bind(log_index)
        .bind(data)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_transaction_by_hash(&self, tx_hash: &str) -> Result<Option<Transaction>, IndexError> {
        let row = sqlx::query(
            "SELECT tx_hash, block_hash, tx_from, tx_to, nonce, data, value \
             FROM transactions WHERE tx_hash = ?",
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_transaction))
    }

    pub async fn get_transactions_by_block_hash(&self, block_hash: &str) -> Result<Vec<Transaction>, IndexError> {
        let rows = sqlx::query(
            "SELECT tx_hash, block_hash, tx_from, tx_to, nonce, data, value \
             FROM transactions WHERE block_hash = ?",
        )
        .bind(block_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_transaction).collect())
    }

    pub async fn get_logs_by_tx_hash(&self, tx_hash: &str) -> Result<Vec<TransactionLog>, IndexError> {
        let rows = sqlx::query(
            "SELECT tx_hash, log_index, data, created_at, updated_at \
             FROM transaction_logs WHERE tx_hash = ? ORDER BY log_index ASC",
        )
        .bind(tx_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| TransactionLog {
                tx_hash: r.get::<String, _>("tx_hash"),
                log_index: r.get::<i64, _>("log_index"),
                data: r.get::<Vec<u8>, _>("data"),
                created_at: r.get::<i64, _>("created_at"),
                updated_at: r.get::<i64, _>("updated_at"),
            })
            .collect())
    }

    pub async fn get_receipt_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Receipt>, IndexError> {
        let row = sqlx::query("SELECT tx_hash, created_at, updated_at FROM receipts WHERE tx_hash = ?")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Receipt {
            tx_hash: r.get::<String, _>("tx_hash"),
            created_at: r.get::<i64, _>("created_at"),
            updated_at: r.get::<i64, _>("updated_at"),
        }))
    }
}

fn row_to_block(row: &AnyRow) -> Block {
    Block {
        number: row.get::<i64, _>("number") as u64,
        hash: row.get::<String, _>("hash"),
        time: row.get::<i64, _>("time") as u64,
        parent: row.get::<String, _>("parent"),
        stable: row.get::<bool, _>("stable"),
        created_at: row.get::<i64, _>("created_at"),
        updated_at: row.get::<i64, _>("updated_at"),
    }
}

fn row_to_transaction(row: &AnyRow) -> Transaction {
    Transaction {
        tx_hash: row.get::<String, _>("tx_hash"),
        block_hash: row.get::<String, _>("block_hash"),
        tx_from: row.get::<String, _>("tx_from"),
        tx_to: row.get::<String, _>("tx_to"),
        nonce: row.get::<i64, _>("nonce") as u64,
        data: row.get::<Vec<u8>, _>("data"),
        value: row.get::<String, _>("value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pool::connect_sqlite_fixture;

    fn sample_block(number: u64, hash: &str, parent: &str) -> Block {
        Block {
            number,
            hash: hash.to_string(),
            time: 1_700_000_000,
            parent: parent.to_string(),
            stable: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn upsert_block_is_first_write_wins() {
        let gw = StorageGateway::new(connect_sqlite_fixture().await);
        gw.upsert_block(&sample_block(1, "0xaaa", "0xgenesis")).await.unwrap();
        gw.upsert_block(&sample_block(1, "0xbbb", "0xgenesis")).await.unwrap();

        let stored = gw.get_block_by_number(1).await.unwrap().unwrap();
        assert_eq!(stored.hash, "0xaaa", "second upsert at the same number must be a no-op");
    }

    #[tokio::test]
    async fn delete_block_cascades_to_children() {
        let gw = StorageGateway::new(connect_sqlite_fixture().await);
        gw.upsert_block(&sample_block(5, "0xblock5", "0xblock4")).await.unwrap();
        gw.upsert_transaction(&Transaction {
            tx_hash: "0xtx1".into(),
            block_hash: "0xblock5".into(),
            tx_from: "0xfrom".into(),
            tx_to: "0xto".into(),
            nonce: 0,
            data: vec![],
            value: "0".into(),
        })
        .await
        .unwrap();
        gw.upsert_receipt("0xtx1").await.unwrap();
        gw.upsert_transaction_log("0xtx1", 0, &[1, 2, 3]).await.unwrap();

        gw.delete_block(5).await.unwrap();

        assert!(gw.get_block_by_number(5).await.unwrap().is_none());
        assert!(gw.get_transaction_by_hash("0xtx1").await.unwrap().is_none());
        assert!(gw.get_logs_by_tx_hash("0xtx1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_latest_blocks_orders_descending() {
        let gw = StorageGateway::new(connect_sqlite_fixture().await);
        for n in 1..=3u64 {
            gw.upsert_block(&sample_block(n, &format!("0xh{n}"), &format!("0xh{}", n.saturating_sub(1))))
                .await
                .unwrap();
        }
        let latest = gw.get_latest_blocks(2).await.unwrap();
        assert_eq!(latest.iter().map(|b| b.number).collect::<Vec<_>>(), vec![3, 2]);
    }
}
