// SPDX-License-Identifier: MIT

//! Reference chunk host
//!
//! Serves a `MemoryChunkStore` over HTTP for `HttpChunkClient`. The `DELETE` route is
//! for the lifecycle owner; the offload path never calls it.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::offload::chunk::http::{IS_LAST_HEADER, TOTAL_SIZE_HEADER};
use crate::offload::chunk::{ChunkStoreClient, GetChunkRequest, MemoryChunkStore, StoreChunkRequest};
use crate::sdk::error::ChunkRpcError;

pub fn router(store: MemoryChunkStore) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/chunks/{ref_id}",
            get(get_chunk).put(store_chunk).delete(delete_chunk),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

pub async fn serve(
    port: u16,
    store: MemoryChunkStore,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, store).await
}

/// Serve on an already bound listener
pub async fn serve_listener(
    listener: TcpListener,
    store: MemoryChunkStore,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    log::info!("Chunk host listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct StoreParams {
    offset: u64,
    total_size: u64,
    #[serde(default)]
    is_last: bool,
}

#[derive(Debug, Deserialize)]
struct GetParams {
    offset: u64,
    length: u64,
}

async fn store_chunk(
    State(store): State<MemoryChunkStore>,
    Path(ref_id): Path<String>,
    Query(params): Query<StoreParams>,
    body: Bytes,
) -> Response {
    tracing::debug!(
        ref_id = %ref_id,
        offset = params.offset,
        len = body.len(),
        is_last = params.is_last,
        "store chunk"
    );

    let request = StoreChunkRequest {
        ref_id,
        data: body.to_vec(),
        offset: params.offset,
        total_size: params.total_size,
        is_last: params.is_last,
    };
    match store.store_chunk(request).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_chunk(
    State(store): State<MemoryChunkStore>,
    Path(ref_id): Path<String>,
    Query(params): Query<GetParams>,
) -> Response {
    tracing::debug!(ref_id = %ref_id, offset = params.offset, length = params.length, "get chunk");

    let request = GetChunkRequest {
        ref_id,
        offset: params.offset,
        length: params.length,
    };
    match store.get_chunk(request).await {
        Ok(chunk) => {
            let mut headers = HeaderMap::new();
            headers.insert(TOTAL_SIZE_HEADER, HeaderValue::from(chunk.total_size));
            headers.insert(
                IS_LAST_HEADER,
                HeaderValue::from_static(if chunk.is_last { "true" } else { "false" }),
            );
            (StatusCode::OK, headers, chunk.data).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn delete_chunk(State(store): State<MemoryChunkStore>, Path(ref_id): Path<String>) -> Response {
    if store.delete(&ref_id).await {
        log::info!("Deleted payload {}", ref_id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(ChunkRpcError::NotFound(ref_id))
    }
}

fn error_response(err: ChunkRpcError) -> Response {
    let status = match &err {
        ChunkRpcError::NotFound(_) => StatusCode::NOT_FOUND,
        ChunkRpcError::Rpc(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
