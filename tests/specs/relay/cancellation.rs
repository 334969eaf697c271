//! Cancellation relay specs
//!
//! A dispatcher enqueues a request over the broker, a worker picks it up and
//! watches for cancellation, and the dispatcher gives up part way through.

use std::time::Duration;

use keel_broker::Broker;
use keel_core::ActivityId;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::prelude::*;

#[derive(Debug, PartialEq)]
enum Outcome {
    Completed,
    CancelledBySender,
}

/// Worker loop for one request: run the "script" unless the sender cancels.
fn spawn_worker(deployment: &Deployment, work: Duration) -> JoinHandle<(ActivityId, Outcome)> {
    let deployment = deployment.clone();
    tokio::spawn(async move {
        let mut requests =
            deployment.broker.subscribe(&deployment.request_channel()).await.unwrap();
        let payload = requests.next().await.unwrap();
        let (request, _streams) = QueueMessageSerializer::default()
            .read_message::<ExecuteScript>(payload.as_bytes())
            .unwrap();

        let watcher = deployment.watcher(request.activity_id);
        let outcome = tokio::select! {
            _ = watcher.cancelled() => Outcome::CancelledBySender,
            _ = tokio::time::sleep(work) => Outcome::Completed,
        };
        assert_eq!(watcher.sender_cancelled_the_request(), outcome == Outcome::CancelledBySender);
        watcher.dispose().await;
        (request.activity_id, outcome)
    })
}

async fn enqueue(deployment: &Deployment) -> ActivityId {
    let request = ExecuteScript {
        activity_id: ActivityId::new(),
        script: "echo hello".to_string(),
        files: Vec::new(),
    };
    let (bytes, _) = QueueMessageSerializer::default().write_message(&request).unwrap();
    let payload = String::from_utf8(bytes).unwrap();
    deployment.broker.publish(&deployment.request_channel(), &payload).await.unwrap();
    request.activity_id
}

/// Let the worker subscribe before anything is published.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn worker_observes_dispatcher_cancellation_promptly() {
    let deployment = Deployment::new();
    let worker = spawn_worker(&deployment, Duration::from_secs(30));
    settle().await;

    let activity_id = enqueue(&deployment).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    deployment.sender().try_send_cancellation(&deployment.endpoint, activity_id).await;
    let (seen, outcome) = worker.await.unwrap();

    assert_eq!(seen, activity_id);
    assert_eq!(outcome, Outcome::CancelledBySender);
    assert!(started.elapsed() < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn dropped_notification_is_recovered_by_polling() {
    let deployment = Deployment::new();
    let worker = spawn_worker(&deployment, Duration::from_secs(30));
    settle().await;

    let activity_id = enqueue(&deployment).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    deployment.broker.drop_publishes(true);

    let started = Instant::now();
    deployment.sender().try_send_cancellation(&deployment.endpoint, activity_id).await;
    let (_, outcome) = worker.await.unwrap();

    assert_eq!(outcome, Outcome::CancelledBySender);
    assert!(started.elapsed() <= deployment.config.cancellation.poll_interval());
}

#[tokio::test(start_paused = true)]
async fn uncancelled_request_runs_to_completion() {
    let deployment = Deployment::new();
    let worker = spawn_worker(&deployment, Duration::from_secs(3));
    settle().await;

    enqueue(&deployment).await;
    let (_, outcome) = worker.await.unwrap();

    assert_eq!(outcome, Outcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn cancellation_for_another_request_is_ignored() {
    let deployment = Deployment::new();
    let worker = spawn_worker(&deployment, Duration::from_secs(3));
    settle().await;

    enqueue(&deployment).await;
    deployment.sender().try_send_cancellation(&deployment.endpoint, ActivityId::new()).await;
    let (_, outcome) = worker.await.unwrap();

    assert_eq!(outcome, Outcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn dispatcher_teardown_survives_broker_outage() {
    let deployment = Deployment::new();
    deployment.broker.set_latency(Some(Duration::from_secs(600)));

    let started = Instant::now();
    let sent = deployment.sender().try_send_cancellation(&deployment.endpoint, ActivityId::new()).await;

    let timeout = deployment.config.cancellation.send_timeout();
    assert!(!sent);
    assert!(started.elapsed() >= timeout);
    assert!(started.elapsed() < timeout + Duration::from_millis(100));
}
