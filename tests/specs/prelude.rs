//! Shared fixtures for specs.

use std::sync::{Arc, Once};
use std::time::Duration;

use keel_broker::{Broker, FakeBroker};
use keel_core::{ActivityId, DataStream, Endpoint};
use keel_relay::{CancellationConfig, KeySpace, RelayConfig, WatchdogConfig};
use serde::{Deserialize, Serialize};

pub use keel_relay::{CancellationSender, CancellationWatcher, DataLossError, DataLossWatchdog};
pub use keel_wire::{QueueMessageSerializer, TransformChain};
pub use tokio_util::sync::CancellationToken;

static TRACING: Once = Once::new();

/// Route relay logs to the test output. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Request a dispatcher enqueues for a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteScript {
    pub activity_id: ActivityId,
    pub script: String,
    pub files: Vec<DataStream>,
}

/// One broker shared by a dispatcher and a worker, with relay timings short
/// enough for paused-clock tests.
#[derive(Clone)]
pub struct Deployment {
    pub broker: FakeBroker,
    pub config: RelayConfig,
    pub endpoint: Endpoint,
}

impl Deployment {
    pub fn new() -> Self {
        init_tracing();
        let config = RelayConfig {
            namespace: "spec".to_string(),
            watchdog: WatchdogConfig::default()
                .with_watch_interval(Duration::from_millis(100))
                .with_retry_interval(Duration::from_millis(20)),
            cancellation: CancellationConfig::default()
                .with_poll_interval(Duration::from_millis(500))
                .with_send_timeout(Duration::from_secs(2))
                .with_resubscribe_delay(Duration::from_millis(50)),
        }
        .validated()
        .unwrap();
        Self { broker: FakeBroker::new(), config, endpoint: Endpoint::new("poll://worker-1/").unwrap() }
    }

    pub fn shared_broker(&self) -> Arc<dyn Broker> {
        Arc::new(self.broker.clone())
    }

    pub fn keys(&self) -> KeySpace {
        KeySpace::from(&self.config)
    }

    /// Queue channel the worker listens on.
    pub fn request_channel(&self) -> String {
        format!("{}:requests:{}", self.config.namespace, self.endpoint)
    }

    pub fn sender(&self) -> CancellationSender {
        CancellationSender::new(self.shared_broker(), self.keys(), self.config.cancellation.clone())
    }

    pub fn watcher(&self, activity_id: ActivityId) -> CancellationWatcher {
        CancellationWatcher::start(
            self.shared_broker(),
            &self.keys(),
            &self.config.cancellation,
            &self.endpoint,
            activity_id,
        )
    }

    pub fn watchdog(&self) -> DataLossWatchdog {
        DataLossWatchdog::start(self.shared_broker(), self.keys(), self.config.watchdog.clone())
    }
}
