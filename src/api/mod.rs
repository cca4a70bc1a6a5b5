/// HTTP Read API (§4.7): three GET endpoints projecting the Storage Gateway
/// into JSON. Grounded on the teacher's `api.rs`, which built its axum
/// router the same way — `Router::new().route(...)`, handlers taking
/// `State`/`Path`/`Query` extractors and returning `(StatusCode, Json<_>)`
/// — though none of the teacher's UTXO-specific handlers survive; only the
/// shape (router + extractor + typed response) is kept.
pub mod blocks;
pub mod transactions;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::liveness::Liveness;
use crate::storage::StorageGateway;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageGateway,
    pub api_max_block_req: u32,
    /// Process-wide liveness/readiness flags (§5, §6), read-only from here.
    /// No `/healthz` route is wired up against it yet; this just gives a
    /// future probe handler something to reach through `State<AppState>`.
    pub liveness: &'static Liveness,
}

pub fn router(storage: StorageGateway, api_max_block_req: u32, liveness: &'static Liveness) -> Router {
    let state = Arc::new(AppState {
        storage,
        api_max_block_req,
        liveness,
    });

    Router::new()
        .route("/blocks", get(blocks::list_blocks))
        .route("/blocks/{number}", get(blocks::get_block))
        .route("/transaction/{tx_hash}", get(transactions::get_transaction))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
