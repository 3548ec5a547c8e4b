use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use sfox_book_feed::feed::{ConnectionPhase, ConnectionSupervisor};
use sfox_book_feed::orderbook::OrderBookStore;
use tokio_util::sync::CancellationToken;

use crate::mock_feed::{
    CancelOnAttempt, MockFeed, Script, TEST_API_KEY, auth_ok_frame, book_frame, credentials,
    fast_config, unreachable_url, wait_until,
};

fn store_for(instruments: &[&str]) -> Arc<OrderBookStore> {
    let store = Arc::new(OrderBookStore::new());
    for instrument in instruments {
        store.register(instrument);
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_truncated_book_into_store() {
        let bid_prices: Vec<String> = (1..=15).map(|p| p.to_string()).collect();
        let bids: Vec<(&str, &str)> = bid_prices.iter().map(|p| (p.as_str(), "1")).collect();
        let frame = book_frame(&bids, &[("20", "2"), ("16", "0.5")]);
        let feed = MockFeed::start(vec![
            Script::frames(vec![auth_ok_frame(), frame]).with_heartbeat(Duration::from_millis(50)),
        ])
        .await;

        let store = store_for(&["ethbtc"]);
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("ethbtc", Arc::clone(&store), credentials(), fast_config(feed.url()));
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        assert!(wait_until(Duration::from_secs(5), || !store.get("ethbtc").is_empty()).await);

        let book = store.get("ethbtc");
        let bids = book.snapshot_bids();
        assert_eq!(bids.len(), 10);
        assert_eq!(bids[0].price, Decimal::from(15));
        assert_eq!(bids[9].price, Decimal::from(6));
        assert_eq!(book.best_ask(), Some(Decimal::from(16)));

        let requests = feed.requests();
        assert_eq!(requests[0], json!({"type": "authenticate", "apiKey": TEST_API_KEY}));
        assert_eq!(
            requests[1],
            json!({"type": "subscribe", "feeds": ["orderbook.sfox.ethbtc"]})
        );

        cancel.cancel();
        let state = task.await.unwrap();
        assert_eq!(state.phase(), ConnectionPhase::Stopped);
        assert_eq!(state.sessions(), 1);
        assert_eq!(state.book_updates(), 1);
        assert!(state.last_data().is_some());
        assert_eq!(feed.connections(), 1);
    }

    #[tokio::test]
    async fn test_phases_reach_streaming() {
        let feed = MockFeed::start(vec![
            Script::default().with_heartbeat(Duration::from_millis(50)),
        ])
        .await;
        let supervisor = ConnectionSupervisor::new(
            "btcusd",
            store_for(&["btcusd"]),
            credentials(),
            fast_config(feed.url()),
        );
        let mut phases = supervisor.phases();
        assert_eq!(*phases.borrow(), ConnectionPhase::Idle);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        let reached = tokio::time::timeout(
            Duration::from_secs(5),
            phases.wait_for(|phase| *phase == ConnectionPhase::Streaming),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(reached);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(*phases.borrow(), ConnectionPhase::Stopped);
    }

    #[tokio::test]
    async fn test_silent_connection_is_recycled() {
        let feed = MockFeed::start(vec![Script::frames(vec![book_frame(
            &[("100", "1")],
            &[("101", "1")],
        )])])
        .await;

        let store = store_for(&["ethbtc"]);
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("ethbtc", Arc::clone(&store), credentials(), fast_config(feed.url()));
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        assert!(wait_until(Duration::from_secs(5), || feed.connections() >= 2).await);
        // The last applied book stays readable while reconnecting.
        assert_eq!(store.get("ethbtc").best_bid(), Some(Decimal::from(100)));

        cancel.cancel();
        let state = task.await.unwrap();
        assert!(state.sessions() >= 2);
        assert_eq!(state.phase(), ConnectionPhase::Stopped);
    }

    #[tokio::test]
    async fn test_scheduled_refresh_recycles_healthy_connection() {
        let feed = MockFeed::start(vec![
            Script::frames(vec![book_frame(&[("100", "1")], &[])])
                .with_heartbeat(Duration::from_millis(40)),
        ])
        .await;

        let mut config = fast_config(feed.url());
        config.max_connection_age = Duration::from_millis(400);
        config.stale_after = Duration::from_secs(10);

        let cancel = CancellationToken::new();
        let supervisor = ConnectionSupervisor::new("ethbtc", store_for(&["ethbtc"]), credentials(), config);
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        assert!(wait_until(Duration::from_secs(5), || feed.connections() >= 2).await);

        cancel.cancel();
        let state = task.await.unwrap();
        assert!(state.book_updates() >= 1);
        // Each refreshed session applied data, so backoff never grows past one step.
        assert!(state.retry_count() <= 1);
    }

    #[tokio::test]
    async fn test_auth_rejection_closes_and_backs_off() {
        let feed = MockFeed::start(vec![Script::rejecting_auth()]).await;

        let store = store_for(&["ethbtc"]);
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("ethbtc", Arc::clone(&store), credentials(), fast_config(feed.url()));
        let mut phases = supervisor.phases();
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        let backed_off = tokio::time::timeout(
            Duration::from_secs(5),
            phases.wait_for(|phase| *phase == ConnectionPhase::Backoff),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(backed_off);
        assert!(wait_until(Duration::from_secs(5), || feed.connections() >= 2).await);

        cancel.cancel();
        let state = task.await.unwrap();
        assert_eq!(state.book_updates(), 0);
        assert!(state.retry_count() >= 1);
        assert!(store.get("ethbtc").is_empty());
    }

    #[tokio::test]
    async fn test_auth_rejection_during_settle_never_subscribes() {
        let feed = MockFeed::start(vec![Script::rejecting_auth()]).await;

        let mut config = fast_config(feed.url());
        config.settle_delay = Duration::from_millis(300);

        let cancel = CancellationToken::new();
        let supervisor = ConnectionSupervisor::new("ethbtc", store_for(&["ethbtc"]), credentials(), config);
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        assert!(wait_until(Duration::from_secs(5), || feed.connections() >= 2 && feed.requests().len() >= 2).await);

        cancel.cancel();
        let state = task.await.unwrap();
        let kinds: Vec<String> = feed
            .requests()
            .iter()
            .map(|request| request["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert!(kinds.iter().all(|kind| kind == "authenticate"), "requests: {kinds:?}");
        assert!(state.last_data().is_some());
        assert_eq!(state.book_updates(), 0);
    }

    #[tokio::test]
    async fn test_each_failed_session_takes_one_backoff_step() {
        let feed = MockFeed::start(vec![Script::rejecting_auth()]).await;
        let cancel = CancellationToken::new();
        // Six rejected sessions run the delays 2, 4, 8, 16, 30, 30 and wrap the
        // counter; the seventh fails again and takes the base delay.
        let credentials = CancelOnAttempt::new(7, cancel.clone());
        let supervisor =
            ConnectionSupervisor::new("ethbtc", store_for(&["ethbtc"]), credentials, fast_config(feed.url()));

        let state = tokio::time::timeout(Duration::from_secs(10), supervisor.run(cancel))
            .await
            .unwrap();
        assert_eq!(state.phase(), ConnectionPhase::Stopped);
        assert_eq!(state.sessions(), 7);
        assert_eq!(state.retry_count(), 1);
    }

    #[tokio::test]
    async fn test_backoff_restarts_after_session_with_data() {
        let feed = MockFeed::start(vec![
            Script::rejecting_auth(),
            Script::rejecting_auth(),
            Script::frames(vec![book_frame(&[("100", "1")], &[("101", "1")])]),
        ])
        .await;
        let cancel = CancellationToken::new();
        let credentials = CancelOnAttempt::new(4, cancel.clone());
        let supervisor =
            ConnectionSupervisor::new("ethbtc", store_for(&["ethbtc"]), credentials, fast_config(feed.url()));

        let state = tokio::time::timeout(Duration::from_secs(10), supervisor.run(cancel))
            .await
            .unwrap();
        // Two rejections, a session that applied a book and went stale, then a
        // final failure: the reset leaves two steps instead of four.
        assert_eq!(state.sessions(), 4);
        assert_eq!(state.book_updates(), 1);
        assert_eq!(state.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_message_keeps_connection_open() {
        let feed = MockFeed::start(vec![
            Script::frames(vec![
                "{not json".to_string(),
                json!({"type": "message", "payload": {"bids": "oops"}}).to_string(),
                book_frame(&[("5", "1")], &[("6", "1")]),
            ])
            .with_heartbeat(Duration::from_millis(50)),
        ])
        .await;

        let store = store_for(&["ethbtc"]);
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("ethbtc", Arc::clone(&store), credentials(), fast_config(feed.url()));
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        assert!(wait_until(Duration::from_secs(5), || !store.get("ethbtc").is_empty()).await);
        assert_eq!(store.get("ethbtc").best_ask(), Some(Decimal::from(6)));

        cancel.cancel();
        let state = task.await.unwrap();
        assert_eq!(state.sessions(), 1);
        assert_eq!(feed.connections(), 1);
    }

    #[tokio::test]
    async fn test_garbage_on_one_feed_does_not_touch_another() {
        let noisy = MockFeed::start(vec![
            Script::frames(vec!["garbage".to_string(), "[1,2".to_string()])
                .with_heartbeat(Duration::from_millis(50)),
        ])
        .await;
        let healthy = MockFeed::start(vec![
            Script::frames(vec![book_frame(&[("30000", "0.5")], &[("30001", "0.25")])])
                .with_heartbeat(Duration::from_millis(50)),
        ])
        .await;

        let store = store_for(&["ethbtc", "btcusd"]);
        let cancel = CancellationToken::new();
        let a = ConnectionSupervisor::new("ethbtc", Arc::clone(&store), credentials(), fast_config(noisy.url()));
        let b = ConnectionSupervisor::new("btcusd", Arc::clone(&store), credentials(), fast_config(healthy.url()));
        let task_a = tokio::spawn(a.run(cancel.clone()));
        let task_b = tokio::spawn(b.run(cancel.clone()));

        assert!(wait_until(Duration::from_secs(5), || !store.get("btcusd").is_empty()).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.get("ethbtc").is_empty());
        assert_eq!(store.get("btcusd").best_bid(), Some(Decimal::from(30000)));

        cancel.cancel();
        let state_a = task_a.await.unwrap();
        let state_b = task_b.await.unwrap();
        assert_eq!(state_a.sessions(), 1);
        assert_eq!(state_b.sessions(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_feed_retries_until_cancelled() {
        let url = unreachable_url().await;
        let cancel = CancellationToken::new();
        let supervisor =
            ConnectionSupervisor::new("ethbtc", store_for(&["ethbtc"]), credentials(), fast_config(&url));
        let task = tokio::spawn(supervisor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();

        let state = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor should stop promptly")
            .unwrap();
        assert_eq!(state.phase(), ConnectionPhase::Stopped);
        assert!(state.sessions() >= 2);
        assert!(state.last_data().is_none());
    }
}
