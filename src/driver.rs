//! Driver runs the relay poll loop on a tokio task

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::RelayConfig;
use crate::persistence::{StateStore, YamlStateStore};
use crate::provider::{ByteSink, ByteSource, Clock};
use crate::relay::{BmsRelay, RelaySnapshot};

/// How the driver runs the relay.
#[derive(Clone)]
pub struct DriverOptions {
    /// Delay between two polls.
    pub poll_interval: Duration,
    /// Where gauge state goes on power off and on shutdown.
    pub store: Option<Arc<dyn StateStore>>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self { poll_interval: Duration::from_millis(10), store: None }
    }
}

impl std::fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverOptions")
            .field("poll_interval", &self.poll_interval)
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl DriverOptions {
    /// Poll interval from the config, and a YAML store if a state file is configured.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            store: config
                .state_file
                .as_ref()
                .map(|path| Arc::new(YamlStateStore::new(path)) as Arc<dyn StateStore>),
        }
    }
}

/// Handle on a running driver task. Dropping it stops the task.
pub struct DriverHandle {
    snapshots: watch::Receiver<Arc<RelaySnapshot>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Snapshots published after every poll, starting with the current one.
    ///
    /// Slow consumers only ever see the newest snapshot.
    pub fn status_updates(&self) -> impl Stream<Item = Arc<RelaySnapshot>> + Send + use<> {
        WatchStream::new(self.snapshots.clone())
    }

    pub fn latest(&self) -> Arc<RelaySnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop the task and wait for its final state write.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Relay driver task ended abnormally");
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Driver spawns and manages the relay task
pub struct Driver;

impl Driver {
    /// Move `relay` onto a tokio task that polls it every `poll_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, K, C>(relay: BmsRelay<S, K, C>, options: DriverOptions) -> DriverHandle
    where
        S: ByteSource + Send + 'static,
        K: ByteSink + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(relay.snapshot()));
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        let task = tokio::spawn(async move {
            Self::poll_task(relay, options, snapshot_tx, cancel_task).await;
        });

        DriverHandle { snapshots: snapshot_rx, cancel, task: Some(task) }
    }

    async fn poll_task<S, K, C>(
        mut relay: BmsRelay<S, K, C>,
        options: DriverOptions,
        snapshot_tx: watch::Sender<Arc<RelaySnapshot>>,
        cancel: CancellationToken,
    ) where
        S: ByteSource,
        K: ByteSink,
        C: Clock,
    {
        info!(poll_interval = ?options.poll_interval, "Relay driver started");
        let store = options.store.as_deref();
        let mut ticker = tokio::time::interval(options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut power_off_count = relay.state().power_off_count();
        let mut polls = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(polls, "Relay driver cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let read = relay.poll();
            polls += 1;
            trace!(read, "Relay poll");

            let count = relay.state().power_off_count();
            if count > power_off_count {
                power_off_count = count;
                info!(count, "Power off announced, saving fuel gauge state");
                Self::persist(store, &relay);
            }

            if snapshot_tx.send(Arc::new(relay.snapshot())).is_err() {
                debug!("No snapshot receivers left");
                break;
            }
        }

        Self::persist(store, &relay);
        info!(polls, "Relay driver stopped");
    }

    fn persist<S, K, C>(store: Option<&dyn StateStore>, relay: &BmsRelay<S, K, C>)
    where
        S: ByteSource,
        K: ByteSink,
        C: Clock,
    {
        let Some(store) = store else {
            return;
        };
        let state = relay.fuel_gauge().snapshot();
        match store.store(&state) {
            Ok(()) => debug!(?state, "Fuel gauge state saved"),
            Err(e) => warn!(error = %e, "Failed to save fuel gauge state"),
        }
    }
}
