/// Connection pool construction (§4.2a): a single process-wide `AnyPool`,
/// sized from `DatabaseSettings`, dialing whichever dialect
/// `DATABASE_DIALECT` names. An unreachable store at startup is fatal
/// (`InitializationFailure`), the same posture the teacher's `db_handles.rs`
/// takes toward a missing column family.
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use std::time::Duration;

use crate::config::DatabaseSettings;
use crate::error::IndexError;

pub async fn connect(settings: &DatabaseSettings) -> Result<AnyPool, IndexError> {
    install_default_drivers();

    let url = settings
        .connect_url()
        .map_err(|e| IndexError::Initialization(e.to_string()))?;

    AnyPoolOptions::new()
        .min_connections(settings.max_idle_connections)
        .max_connections(settings.max_open_connections)
        .max_lifetime(Duration::from_millis(settings.max_conn_lifetime_ms))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // SQLite does not enforce FK cascades unless told to per
                // connection; postgres/mysql ignore this pragma via `Any`.
                let _ = sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await;
                Ok(())
            })
        })
        .connect(&url)
        .await
        .map_err(|e| IndexError::Initialization(format!("connecting to {}: {e}", settings.dialect)))
}

/// Fixture schema for the SQLite-backed integration test harness (§3a). Not a
/// migration system — just enough DDL for the Storage Gateway's contract to
/// run against a real SQL engine instead of mocks.
pub const FIXTURE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    number      INTEGER PRIMARY KEY,
    hash        TEXT NOT NULL UNIQUE,
    time        INTEGER NOT NULL,
    parent      TEXT NOT NULL,
    stable      INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    tx_hash     TEXT PRIMARY KEY,
    block_hash  TEXT NOT NULL REFERENCES blocks(hash) ON DELETE CASCADE,
    tx_from     TEXT NOT NULL,
    tx_to       TEXT NOT NULL,
    nonce       INTEGER NOT NULL,
    data        BLOB NOT NULL,
    value       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS receipts (
    tx_hash     TEXT PRIMARY KEY REFERENCES transactions(tx_hash) ON DELETE CASCADE,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS transaction_logs (
    tx_hash     TEXT NOT NULL REFERENCES transactions(tx_hash) ON DELETE CASCADE,
    log_index   INTEGER NOT NULL,
    data        BLOB NOT NULL,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (tx_hash, log_index)
);
"#;

#[cfg(test)]
pub async fn connect_sqlite_fixture() -> AnyPool {
    install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let _ = sqlx::query("PRAGMA foreign_keys = ON").execute(conn).await;
                Ok(())
            })
        })
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite connects");
    sqlx::raw_sql(FIXTURE_SCHEMA)
        .execute(&pool)
        .await
        .expect("fixture schema applies");
    pool
}
