use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::AppState;
use crate::types::{Transaction, TransactionLog};

#[derive(Serialize)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub logs: Vec<TransactionLog>,
}

/// `GET /transaction/{tx_hash}` → the Transaction plus its Logs.
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TransactionDetail>, (StatusCode, String)> {
    if !tx_hash.starts_with("0x") || tx_hash.len() < 3 {
        return Err((StatusCode::BAD_REQUEST, "malformed transaction hash".to_string()));
    }
    let tx_hash = crate::types::normalize_hash(&tx_hash);

    let transaction = state
        .storage
        .get_transaction_by_hash(&tx_hash)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, format!("transaction {tx_hash} not found")))?;

    let logs = state
        .storage
        .get_logs_by_tx_hash(&tx_hash)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(TransactionDetail { transaction, logs }))
}
