pub mod controller;

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::watch;

use crate::errors::AppError;

pub use controller::{ReportSink, ReportingController};

/// Intervals offered by the `setinterval` picker.
pub const ALLOWED_INTERVALS: [u64; 5] = [30, 60, 120, 300, 600];
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

// ─── Channel target ──────────────────────────────────────────────────────────

/// Identifier of the channel periodic reports are delivered to.
/// Zero is never a valid channel, so "unset" is `Option<ChannelTarget>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelTarget(NonZeroU64);

impl ChannelTarget {
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Discord snowflakes exceed the safe JSON integer range.
impl Serialize for ChannelTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

// ─── Interval ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReportInterval(NonZeroU64);

impl ReportInterval {
    pub fn from_secs(secs: u64) -> Result<Self, AppError> {
        NonZeroU64::new(secs)
            .map(Self)
            .ok_or_else(|| AppError::InvalidRequest("interval must be a positive number of seconds".into()))
    }

    pub fn secs(self) -> u64 {
        self.0.get()
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.secs())
    }

    /// Whether this value is one of the picker's choices.
    pub fn is_menu_value(self) -> bool {
        ALLOWED_INTERVALS.contains(&self.secs())
    }
}

impl ReportInterval {
    pub const DEFAULT: Self = match NonZeroU64::new(DEFAULT_INTERVAL_SECS) {
        Some(secs) => Self(secs),
        None => panic!("DEFAULT_INTERVAL_SECS must be positive"),
    };
}

impl Default for ReportInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Startup values for the reporting controller. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReportingConfig {
    pub target: Option<ChannelTarget>,
    pub interval: ReportInterval,
}

// ─── Delivery ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("no logging channel configured")]
    Unset,

    #[error("channel with ID {channel} not found or inaccessible: {reason}")]
    Unresolved { channel: ChannelTarget, reason: String },

    #[error("no permission to send messages in channel {name} (ID: {channel})")]
    NoPermission { channel: ChannelTarget, name: String },

    #[error("forbidden to send messages in channel {name} (ID: {channel})")]
    Forbidden { channel: ChannelTarget, name: String },

    #[error("error sending stats to channel {name} (ID: {channel}): {reason}")]
    Transport { channel: ChannelTarget, name: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Delivered,
    Skipped(DeliveryError),
}

impl TickOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, TickOutcome::Delivered)
    }
}

/// Result of the most recent tick, as exposed on `/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    pub at: DateTime<Utc>,
    pub delivered: bool,
    pub error: Option<String>,
}

impl TickRecord {
    fn new(outcome: &TickOutcome) -> Self {
        let error = match outcome {
            TickOutcome::Delivered => None,
            TickOutcome::Skipped(e) => Some(e.to_string()),
        };
        Self { at: Utc::now(), delivered: outcome.is_delivered(), error }
    }
}

// ─── Shared state ────────────────────────────────────────────────────────────

/// Cheap-to-clone handle over the live reporting configuration.
///
/// Command handlers write through it, the reporting loop reads from it.
/// Each field is replaced with a single atomic store, so a reader never
/// observes a half-applied update.
#[derive(Clone)]
pub struct ReportingState {
    channel: Arc<AtomicU64>,
    interval: Arc<watch::Sender<ReportInterval>>,
    last_tick: Arc<watch::Sender<Option<TickRecord>>>,
}

impl ReportingState {
    pub fn new(config: ReportingConfig) -> Self {
        let (interval, _) = watch::channel(config.interval);
        let (last_tick, _) = watch::channel(None);
        Self {
            channel: Arc::new(AtomicU64::new(config.target.map_or(0, ChannelTarget::get))),
            interval: Arc::new(interval),
            last_tick: Arc::new(last_tick),
        }
    }

    pub fn set_channel(&self, target: ChannelTarget) {
        self.channel.store(target.get(), Ordering::Release);
    }

    pub fn channel(&self) -> Option<ChannelTarget> {
        ChannelTarget::new(self.channel.load(Ordering::Acquire))
    }

    /// Replaces the interval. The reporting loop reschedules its pending
    /// deadline from the start of the last tick.
    pub fn set_interval(&self, interval: ReportInterval) {
        self.interval.send_replace(interval);
    }

    pub fn interval(&self) -> ReportInterval {
        *self.interval.borrow()
    }

    pub fn config(&self) -> ReportingConfig {
        ReportingConfig { target: self.channel(), interval: self.interval() }
    }

    pub fn last_tick(&self) -> Option<TickRecord> {
        self.last_tick.borrow().clone()
    }

    pub(crate) fn record_tick(&self, outcome: &TickOutcome) {
        self.last_tick.send_replace(Some(TickRecord::new(outcome)));
    }

    pub(crate) fn subscribe_interval(&self) -> watch::Receiver<ReportInterval> {
        self.interval.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(v: u64) -> ReportInterval {
        ReportInterval::from_secs(v).unwrap()
    }

    #[test]
    fn default_interval_is_sixty_seconds() {
        assert_eq!(ReportInterval::default().secs(), 60);
        assert_eq!(ReportInterval::DEFAULT, secs(DEFAULT_INTERVAL_SECS));
        assert!(ReportInterval::DEFAULT.is_menu_value());
        assert_eq!(ReportingConfig::default().interval.as_duration(), Duration::from_secs(60));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(ReportInterval::from_secs(0), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn menu_values_are_recognised() {
        for v in ALLOWED_INTERVALS {
            assert!(secs(v).is_menu_value());
        }
        assert!(!secs(45).is_menu_value());
    }

    #[test]
    fn zero_channel_is_unset() {
        assert_eq!(ChannelTarget::new(0), None);
    }

    #[test]
    fn get_channel_without_default_is_unset() {
        let state = ReportingState::new(ReportingConfig::default());
        assert_eq!(state.channel(), None);
    }

    #[test]
    fn set_channel_then_get_channel_returns_it() {
        let state = ReportingState::new(ReportingConfig::default());
        let target = ChannelTarget::new(1_180_000_000_000_000_001).unwrap();
        state.set_channel(target);
        assert_eq!(state.channel(), Some(target));

        let other = ChannelTarget::new(7).unwrap();
        state.set_channel(other);
        assert_eq!(state.channel(), Some(other));
    }

    #[test]
    fn clones_share_configuration() {
        let state = ReportingState::new(ReportingConfig::default());
        let handle = state.clone();
        handle.set_interval(secs(300));
        handle.set_channel(ChannelTarget::new(99).unwrap());
        assert_eq!(
            state.config(),
            ReportingConfig { target: ChannelTarget::new(99), interval: secs(300) }
        );
    }

    #[test]
    fn set_interval_notifies_subscribers() {
        let state = ReportingState::new(ReportingConfig::default());
        let mut rx = state.subscribe_interval();
        state.set_interval(secs(120));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), secs(120));
    }

    #[test]
    fn tick_record_carries_skip_reason() {
        let state = ReportingState::new(ReportingConfig::default());
        assert!(state.last_tick().is_none());

        state.record_tick(&TickOutcome::Skipped(DeliveryError::Unset));
        let record = state.last_tick().unwrap();
        assert!(!record.delivered);
        assert_eq!(record.error.as_deref(), Some("no logging channel configured"));
    }

    #[test]
    fn channel_target_serializes_as_string() {
        let json = serde_json::to_value(ChannelTarget::new(42).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!("42"));
    }
}
