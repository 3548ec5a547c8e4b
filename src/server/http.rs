//! HTTP/JSON binding of the snapshot service.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::service::{OrderBookResponse, SnapshotError, SnapshotService, SymbolsResponse};

/// Failures of the HTTP listener
#[derive(Debug, Error)]
pub enum ServerError {
    /// Accepting or serving connections failed
    #[error("HTTP server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error body returned to callers: `{"error": CODE, "message": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<SnapshotError> for ApiError {
    fn from(err: SnapshotError) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

pub fn router(service: SnapshotService) -> Router {
    let api_routes = Router::new()
        .route("/orderbook/{symbol}", get(get_order_book))
        .route("/symbols", get(get_available_symbols));

    Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn get_order_book(
    State(service): State<SnapshotService>,
    Path(symbol): Path<String>,
) -> Result<Json<OrderBookResponse>, ApiError> {
    Ok(Json(service.get_order_book(&symbol)?))
}

async fn get_available_symbols(State(service): State<SnapshotService>) -> Json<SymbolsResponse> {
    Json(service.get_available_symbols())
}

/// Serve the API on `listener` until `cancel` fires, then drain.
pub async fn serve(
    listener: TcpListener,
    service: SnapshotService,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let addr = listener.local_addr()?;
    info!("Snapshot API listening on {}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Snapshot API stopped");
    Ok(())
}
