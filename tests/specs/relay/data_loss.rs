//! Data-loss watchdog specs
//!
//! A dispatcher waiting on a response gates the wait with the watchdog's
//! token, so a broker that fails over to an empty replica produces a bounded
//! failure instead of a hang.

use std::time::Duration;

use keel_broker::Broker;
use tokio::time::Instant;

use crate::prelude::*;

#[derive(Debug, PartialEq)]
enum Wait {
    Response(String),
    BrokerLostData,
}

/// Wait for a response on `channel`, abandoning the wait on data loss.
async fn await_response(deployment: &Deployment, channel: &str, data_loss: CancellationToken) -> Wait {
    let mut responses = deployment.broker.subscribe(channel).await.unwrap();
    tokio::select! {
        response = responses.next() => Wait::Response(response.unwrap()),
        _ = data_loss.cancelled() => Wait::BrokerLostData,
    }
}

#[tokio::test(start_paused = true)]
async fn failover_releases_pending_waits_within_one_check() {
    let deployment = Deployment::new();
    let watchdog = deployment.watchdog();
    let token = watchdog
        .token_for_data_loss_detection(Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();

    let waiter = {
        let deployment = deployment.clone();
        let token = token.clone();
        tokio::spawn(async move { await_response(&deployment, "spec:responses:1", token).await })
    };
    tokio::time::sleep(Duration::from_millis(250)).await;

    let failed_over = Instant::now();
    deployment.broker.wipe();
    let outcome = waiter.await.unwrap();

    assert_eq!(outcome, Wait::BrokerLostData);
    assert!(failed_over.elapsed() <= deployment.config.watchdog.watch_interval());

    let next = watchdog
        .token_for_data_loss_detection(Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!next.is_cancelled());
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn healthy_broker_delivers_response_and_keeps_token() {
    let deployment = Deployment::new();
    let watchdog = deployment.watchdog();
    let token = watchdog
        .token_for_data_loss_detection(Duration::from_secs(5), &CancellationToken::new())
        .await
        .unwrap();

    let waiter = {
        let deployment = deployment.clone();
        let token = token.clone();
        tokio::spawn(async move { await_response(&deployment, "spec:responses:2", token).await })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    deployment.broker.publish("spec:responses:2", "done").await.unwrap();

    assert_eq!(waiter.await.unwrap(), Wait::Response("done".to_string()));
    assert!(!token.is_cancelled());
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_broker_is_told_apart_from_data_loss() {
    let deployment = Deployment::new();
    deployment.broker.set_unavailable(true);
    let watchdog = deployment.watchdog();

    let err = watchdog
        .token_for_data_loss_detection(Duration::from_secs(2), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, DataLossError::TimedOut(Duration::from_secs(2)));
    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn dispatcher_shutdown_cancels_token_wait() {
    let deployment = Deployment::new();
    deployment.broker.set_unavailable(true);
    let watchdog = deployment.watchdog();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let err = watchdog
        .token_for_data_loss_detection(Duration::from_secs(60), &shutdown)
        .await
        .unwrap_err();

    assert_eq!(err, DataLossError::Cancelled);
}
