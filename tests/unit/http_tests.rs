use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use sfox_book_feed::orderbook::{OrderBookStore, OrderEntry};
use sfox_book_feed::server::{SnapshotService, router, serve};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

async fn get_json(service: SnapshotService, uri: &str) -> (StatusCode, Value) {
    let response = router(service)
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn seeded_service() -> SnapshotService {
    let store = Arc::new(OrderBookStore::new());
    store.register("ethbtc");
    store.register("btcusd");
    store
        .replace(
            "ethbtc",
            vec![OrderEntry::new("0.05".parse().unwrap(), "2".parse().unwrap())],
            vec![OrderEntry::new("0.06".parse().unwrap(), "1.5".parse().unwrap())],
        )
        .unwrap();
    SnapshotService::new(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_order_book_returns_snapshot() {
        let (status, body) = get_json(seeded_service(), "/v1/orderbook/ethbtc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "ethbtc");
        assert_eq!(body["bids"][0]["price"], 0.05);
        assert_eq!(body["bids"][0]["volume"], 2.0);
        assert_eq!(body["asks"][0]["volume"], 1.5);
        assert_eq!(body["best_bid"], 0.05);
        assert_eq!(body["best_ask"], 0.06);
        assert!(body["timestamp"].as_u64().is_some_and(|ts| ts > 0));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_books_are_404() {
        for symbol in ["zzz", "btcusd"] {
            let (status, body) =
                get_json(seeded_service(), &format!("/v1/orderbook/{symbol}")).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["error"], "NOT_FOUND");
            assert!(body["message"].as_str().unwrap().contains(symbol));
        }
    }

    #[tokio::test]
    async fn test_symbols_endpoint() {
        let (status, body) = get_json(seeded_service(), "/v1/symbols").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"symbols": ["btcusd", "ethbtc"]}));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve(listener, seeded_service(), cancel.clone()));

        cancel.cancel();
        let stopped = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped.is_ok());
    }
}
