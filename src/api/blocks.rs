use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AppState;
use crate::types::Block;

#[derive(Deserialize)]
pub struct ListBlocksQuery {
    limit: Option<u32>,
}

/// `GET /blocks?limit=N` → `get_latest_blocks(min(N, API_MAX_BLOCK_REQ))`.
pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBlocksQuery>,
) -> Result<Json<Vec<Block>>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(state.api_max_block_req).min(state.api_max_block_req);
    let blocks = state
        .storage
        .get_latest_blocks(limit)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(blocks))
}

#[derive(Serialize)]
pub struct BlockDetail {
    #[serde(flatten)]
    pub block: Block,
    pub transaction_hashes: Vec<String>,
}

/// `GET /blocks/{number}` → the Block plus the hashes of its Transactions.
pub async fn get_block(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<BlockDetail>, (StatusCode, String)> {
    let number: u64 = number
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "block number must be a non-negative integer".to_string()))?;

    let block = state
        .storage
        .get_block_by_number(number)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, format!("block {number} not found")))?;

    let transactions = state
        .storage
        .get_transactions_by_block_hash(&block.hash)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(BlockDetail {
        block,
        transaction_hashes: transactions.into_iter().map(|t| t.tx_hash).collect(),
    }))
}
