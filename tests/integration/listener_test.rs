use std::time::Duration as StdDuration;

use chrono::Duration;
use storehelper::{models::transaction::Transaction, StoreError};
use tokio::sync::mpsc;

use super::*;

async fn next_notified(rx: &mut mpsc::UnboundedReceiver<Transaction>) -> Transaction {
    tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for listener")
        .expect("Observer channel closed")
}

async fn start(service: &StoreService) -> mpsc::UnboundedReceiver<Transaction> {
    let (tx, rx) = mpsc::unbounded_channel();
    service
        .start_listener(move |transaction: &Transaction| {
            let _ = tx.send(transaction.clone());
        })
        .await
        .unwrap();
    rx
}

#[tokio::test]
async fn test_updates_are_finished_and_observed() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let mut rx = start(&service).await;
    assert!(service.is_listening().await);

    sandbox.push_update(verified(transaction(
        30,
        MONTHLY,
        Some(now() + Duration::days(30)),
        None,
    )));

    assert_eq!(next_notified(&mut rx).await.id, 30);
    assert_eq!(sandbox.finished(), vec![30]);

    service.shutdown().await;
}

#[tokio::test]
async fn test_bad_update_does_not_stop_listener() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let mut rx = start(&service).await;

    sandbox.push_update(unverified(transaction(31, MONTHLY, None, None)));
    sandbox.push_update(verified(transaction(32, MONTHLY, None, None)));

    assert_eq!(next_notified(&mut rx).await.id, 32);
    assert_eq!(sandbox.finished(), vec![32]);
    assert!(service.is_listening().await);

    service.shutdown().await;
}

#[tokio::test]
async fn test_no_finish_after_shutdown() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let mut rx = start(&service).await;

    sandbox.push_update(verified(transaction(40, MONTHLY, None, None)));
    assert_eq!(next_notified(&mut rx).await.id, 40);

    service.shutdown().await;
    assert!(!service.is_listening().await);

    sandbox.push_update(verified(transaction(41, MONTHLY, None, None)));
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    assert_eq!(sandbox.finished(), vec![40]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_listener_cannot_be_started_twice() {
    let (_sandbox, service) = setup(&[MONTHLY]);
    let _rx = start(&service).await;

    let second = service.start_listener(|_: &Transaction| {}).await;
    assert!(matches!(second, Err(StoreError::ListenerAlreadyRunning)));

    service.shutdown().await;

    let restarted = service.start_listener(|_: &Transaction| {}).await;
    assert!(matches!(restarted, Err(StoreError::ListenerStopped)));
}

#[tokio::test]
async fn test_shutdown_without_listener_is_noop() {
    let (_sandbox, service) = setup(&[MONTHLY]);
    service.shutdown().await;
    service.shutdown().await;
    assert!(!service.is_listening().await);
}

#[tokio::test]
async fn test_updates_pushed_before_start_are_delivered() {
    let (sandbox, service) = setup(&[MONTHLY]);
    assert_eq!(
        sandbox.push_update(verified(transaction(50, MONTHLY, None, None))),
        0
    );

    let mut rx = start(&service).await;

    assert_eq!(next_notified(&mut rx).await.id, 50);
    assert_eq!(sandbox.finished(), vec![50]);

    service.shutdown().await;
}

#[tokio::test]
async fn test_entitlement_sync_replays_valid_entitlements_only() {
    let mut config = test_config(&[MONTHLY, LIFETIME]);
    config.listener.sync_entitlements_on_start = true;
    let (sandbox, service) = setup_with(&config);

    sandbox.add_entitlement(verified(transaction(
        60,
        MONTHLY,
        Some(now() - Duration::days(1)),
        None,
    )));
    sandbox.add_entitlement(unverified(transaction(61, MONTHLY, None, None)));
    sandbox.add_entitlement(verified(transaction(62, LIFETIME, None, None)));

    let mut rx = start(&service).await;

    assert_eq!(next_notified(&mut rx).await.id, 62);
    // Replayed entitlements were acknowledged when first delivered
    assert!(sandbox.finished().is_empty());

    sandbox.push_update(verified(transaction(63, MONTHLY, None, None)));
    assert_eq!(next_notified(&mut rx).await.id, 63);
    assert_eq!(sandbox.finished(), vec![63]);

    service.shutdown().await;
}

#[tokio::test]
async fn test_drop_without_shutdown_stops_listener() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let _rx = start(&service).await;

    drop(service);

    sandbox.push_update(verified(transaction(70, MONTHLY, None, None)));
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    assert!(sandbox.finished().is_empty());
}

#[tokio::test]
async fn test_ended_update_stream_moves_listener_to_stopped() {
    let (sandbox, service) = setup(&[MONTHLY]);
    let mut rx = start(&service).await;

    // Make sure the listener holds an open update stream before closing it
    sandbox.push_update(verified(transaction(80, MONTHLY, None, None)));
    assert_eq!(next_notified(&mut rx).await.id, 80);

    sandbox.end_updates();
    tokio::time::timeout(StdDuration::from_secs(2), async {
        while service.is_listening().await {
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    })
    .await
    .expect("Listener did not exit after stream ended");

    let restarted = service.start_listener(|_: &Transaction| {}).await;
    assert!(matches!(restarted, Err(StoreError::ListenerStopped)));
}
