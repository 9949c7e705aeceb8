use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument};

use crate::metrics::{MetricsSnapshot, MetricsSource};
use crate::reporting::{ChannelTarget, DeliveryError, ReportingState, TickOutcome};

/// Where periodic reports go. Implemented by the Discord client; tests use fakes.
#[async_trait]
pub trait ReportSink: Send + Sync + 'static {
    type Destination: Send + Sync;

    /// Turn a channel id into a live destination handle.
    async fn resolve(&self, target: ChannelTarget) -> Result<Self::Destination, DeliveryError>;

    async fn ensure_can_send(&self, destination: &Self::Destination) -> Result<(), DeliveryError>;

    async fn send(
        &self,
        destination: &Self::Destination,
        snapshot: &MetricsSnapshot,
    ) -> Result<(), DeliveryError>;
}

/// Runs the recurring tick: collect a snapshot, deliver it to the target channel.
pub struct ReportingController<M, S> {
    state: ReportingState,
    metrics: Arc<M>,
    sink: Arc<S>,
}

impl<M: MetricsSource, S: ReportSink> ReportingController<M, S> {
    pub fn new(state: ReportingState, metrics: Arc<M>, sink: Arc<S>) -> Self {
        Self { state, metrics, sink }
    }

    /// One report cycle. Never fails: delivery problems are logged and the
    /// tick is skipped.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> TickOutcome {
        let snapshot = self.metrics.snapshot().await;

        let outcome = match self.deliver(&snapshot).await {
            Ok(()) => {
                debug!("System stats delivered");
                TickOutcome::Delivered
            }
            Err(e) => {
                error!(error = %e, "Skipping system stats delivery");
                TickOutcome::Skipped(e)
            }
        };

        self.state.record_tick(&outcome);
        outcome
    }

    async fn deliver(&self, snapshot: &MetricsSnapshot) -> Result<(), DeliveryError> {
        let target = self.state.channel().ok_or(DeliveryError::Unset)?;
        let destination = self.sink.resolve(target).await?;
        self.sink.ensure_can_send(&destination).await?;
        self.sink.send(&destination, snapshot).await
    }

    /// Start the timer loop. It runs until `shutdown` fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval_rx = self.state.subscribe_interval();
        let mut period = *interval_rx.borrow_and_update();
        let mut last_tick: Option<Instant> = None;
        let mut deadline = Instant::now();

        info!(interval_secs = period.secs(), "Reporting loop started");

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    let started = Instant::now();
                    last_tick = Some(started);
                    // Ticks are awaited inline, so they never overlap.
                    self.tick().await;
                    deadline = started + period.as_duration();
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    period = *interval_rx.borrow_and_update();
                    if let Some(started) = last_tick {
                        deadline = started + period.as_duration();
                    }
                    info!(interval_secs = period.secs(), "Reporting interval changed");
                }
                _ = shutdown.recv() => {
                    info!("Reporting loop shutting down");
                    break;
                }
            }
        }
    }
}
