use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::ws_types::{self, WsMessage};
use crate::config::AppConfig;
use crate::db::{CredentialStore, PositionStore};
use crate::exchanges::{ExchangeAdapter, ExchangeError};
use crate::models::Exchange;

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub interval: Duration,
    /// Upper bound on one adapter fetch.
    pub cycle_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            cycle_timeout: Duration::from_secs(120),
        }
    }
}

impl SyncConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            interval: config.sync_interval,
            cycle_timeout: config.sync_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Ticking,
    Fetching,
    Persisting,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No usable credential for the exchange.
    Skipped,
    Synced { count: usize, skipped: usize },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl SyncError {
    /// Rate limits, timeouts and retention errors clear up by themselves.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Exchange(e) => e.is_transient(),
            SyncError::Timeout(_) => true,
            SyncError::Store(_) => false,
        }
    }
}

/// Periodic closed-position sync for one exchange.
pub struct PositionSync {
    exchange: Exchange,
    adapter: Arc<dyn ExchangeAdapter>,
    credentials: Arc<dyn CredentialStore>,
    positions: Arc<dyn PositionStore>,
    ws_tx: broadcast::Sender<WsMessage>,
    config: SyncConfig,
    state: watch::Sender<SyncState>,
}

impl PositionSync {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        credentials: Arc<dyn CredentialStore>,
        positions: Arc<dyn PositionStore>,
        ws_tx: broadcast::Sender<WsMessage>,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            exchange: adapter.exchange(),
            adapter,
            credentials,
            positions,
            ws_tx,
            config,
            state,
        }
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    fn set_state(&self, state: SyncState) {
        self.state.send_replace(state);
    }

    /// One full cycle: load credentials, fetch, persist, notify.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, SyncError> {
        self.set_state(SyncState::Ticking);
        let credential = self
            .credentials
            .credential_for(self.exchange)
            .await
            .map_err(SyncError::Store)?;

        let Some(credential) = credential.filter(|c| c.is_usable()) else {
            tracing::debug!(exchange = %self.exchange, "No usable credentials, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        };

        self.set_state(SyncState::Fetching);
        let fetched = tokio::time::timeout(
            self.config.cycle_timeout,
            self.adapter.fetch_closed_positions(&credential),
        )
        .await
        .map_err(|_| SyncError::Timeout(self.config.cycle_timeout))??;

        self.set_state(SyncState::Persisting);
        let count = self
            .positions
            .upsert_positions(&fetched.items)
            .await
            .map_err(SyncError::Store)?;

        ws_types::broadcast(
            &self.ws_tx,
            WsMessage::PositionsUpdate {
                exchange: self.exchange.as_str().to_string(),
                count: fetched.items.len(),
                positions: fetched.items,
            },
        );

        Ok(CycleOutcome::Synced {
            count,
            skipped: fetched.skipped,
        })
    }

    /// Run a cycle and record its outcome. Never fails.
    async fn tick(&self) {
        let started = Instant::now();
        let exchange = self.exchange.as_str();
        let result = self.run_cycle().await;
        self.set_state(SyncState::Idle);

        histogram!("sync_cycle_seconds", "exchange" => exchange).record(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(CycleOutcome::Skipped) => "skipped",
            Ok(CycleOutcome::Synced { count, skipped }) => {
                counter!("positions_upserted_total", "exchange" => exchange).increment(*count as u64);
                counter!("records_skipped_total", "exchange" => exchange).increment(*skipped as u64);
                if *skipped > 0 {
                    tracing::info!(exchange, skipped, "Dropped malformed records");
                }
                tracing::info!(exchange, count, "Sync cycle complete");
                "synced"
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(exchange, error = %e, "Sync cycle ended early");
                "transient_error"
            }
            Err(e) => {
                tracing::error!(exchange, error = %e, "Sync cycle failed");
                "error"
            }
        };
        counter!("sync_cycles_total", "exchange" => exchange, "outcome" => outcome).increment(1);
    }

    /// Start the timer loop on its own task. The first cycle runs
    /// immediately. Stop requests are observed between cycles only.
    pub fn spawn(self) -> SyncHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let state_rx = self.state.subscribe();
        let exchange = self.exchange;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                exchange = %self.exchange,
                interval_secs = self.config.interval.as_secs(),
                "Position sync started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => self.tick().await,
                }
            }

            self.set_state(SyncState::Stopped);
            tracing::info!(exchange = %self.exchange, "Position sync stopped");
        });

        SyncHandle {
            exchange,
            stop_tx: Some(stop_tx),
            task,
            state: state_rx,
        }
    }
}

/// Owner of a running scheduler. Dropping it also stops the loop at the
/// next tick boundary.
pub struct SyncHandle {
    exchange: Exchange,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    state: watch::Receiver<SyncState>,
}

impl SyncHandle {
    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Signal the loop and wait for it to exit. An in-flight cycle runs to
    /// completion first.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(exchange = %self.exchange, error = %e, "Sync task panicked");
        }
    }
}

/// Spawn one scheduler per exchange that has an adapter.
pub fn spawn_all(
    exchanges: &[Exchange],
    adapters: &crate::exchanges::Adapters,
    credentials: Arc<dyn CredentialStore>,
    positions: Arc<dyn PositionStore>,
    ws_tx: &broadcast::Sender<WsMessage>,
    config: SyncConfig,
) -> Vec<SyncHandle> {
    exchanges
        .iter()
        .filter_map(|exchange| {
            let Some(adapter) = adapters.get(*exchange) else {
                tracing::warn!(%exchange, "No adapter registered, not syncing");
                return None;
            };
            let sync = PositionSync::new(
                adapter,
                credentials.clone(),
                positions.clone(),
                ws_tx.clone(),
                config,
            );
            Some(sync.spawn())
        })
        .collect()
}
