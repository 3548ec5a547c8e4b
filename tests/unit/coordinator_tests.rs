use std::sync::Arc;
use std::time::Duration;

use sfox_book_feed::feed::{ConnectionPhase, IngestionCoordinator, MAX_INSTRUMENTS};
use sfox_book_feed::orderbook::OrderBookStore;
use tokio_util::sync::CancellationToken;

use crate::mock_feed::{MockFeed, Script, credentials, fast_config, unreachable_url, wait_until};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_registers_normalized_instruments_immediately() {
        let url = unreachable_url().await;
        let store = Arc::new(OrderBookStore::new());
        let coordinator = IngestionCoordinator::new(Arc::clone(&store), credentials(), fast_config(&url))
            .with_stagger(Duration::from_secs(60));

        let cancel = CancellationToken::new();
        let handle = coordinator.start(["ETHBTC", " btcusd ", "ethbtc", ""], cancel.clone());

        assert_eq!(handle.instruments(), ["ethbtc", "btcusd"]);
        let mut listed = store.list_instruments();
        listed.sort();
        assert_eq!(listed, vec!["btcusd", "ethbtc"]);

        cancel.cancel();
        let states = handle.join().await;
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|state| state.phase() == ConnectionPhase::Stopped));
    }

    #[tokio::test]
    async fn test_instrument_list_is_capped() {
        let url = unreachable_url().await;
        let store = Arc::new(OrderBookStore::new());
        let coordinator = IngestionCoordinator::new(Arc::clone(&store), credentials(), fast_config(&url))
            .with_stagger(Duration::from_secs(60));

        let symbols: Vec<String> = (0..12).map(|i| format!("sym{i}")).collect();
        let cancel = CancellationToken::new();
        let handle = coordinator.start(&symbols, cancel.clone());

        assert_eq!(handle.instruments().len(), MAX_INSTRUMENTS);
        assert_eq!(store.len(), MAX_INSTRUMENTS);
        assert!(!store.contains("sym10"));
        assert!(!store.contains("sym11"));

        cancel.cancel();
        assert_eq!(handle.join().await.len(), MAX_INSTRUMENTS);
    }

    #[tokio::test]
    async fn test_supervisor_starts_are_staggered() {
        let feed = MockFeed::start(vec![
            Script::default().with_heartbeat(Duration::from_millis(50)),
        ])
        .await;
        let store = Arc::new(OrderBookStore::new());
        let coordinator = IngestionCoordinator::new(Arc::clone(&store), credentials(), fast_config(feed.url()))
            .with_stagger(Duration::from_millis(600));

        let cancel = CancellationToken::new();
        let handle = coordinator.start(["ethbtc", "btcusd"], cancel.clone());

        assert!(wait_until(Duration::from_secs(2), || feed.connections() >= 1).await);
        assert_eq!(feed.connections(), 1);

        assert!(wait_until(Duration::from_secs(5), || feed.connections() >= 2).await);
        let subscriptions: Vec<_> = feed
            .requests()
            .into_iter()
            .filter(|request| request["type"] == "subscribe")
            .map(|request| request["feeds"][0].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            subscriptions,
            vec!["orderbook.sfox.ethbtc", "orderbook.sfox.btcusd"]
        );

        cancel.cancel();
        handle.join().await;
    }
}
