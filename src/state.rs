//! # Bridge State and Metrics
//!
//! Shared state handed to every part of the bridge that wants to record what
//! happened on the wire: the loaded configuration and a set of counters.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: the connection task and the host both hold a reference
//! - **RwLock**: counters are written from the connection task and read by the host
//!
//! Counters only ever increase; a fresh `BridgeState` starts at zero.

use crate::config::AppConfig;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// State shared between the host and the connection task.
#[derive(Debug, Clone)]
pub struct BridgeState {
    /// Configuration the bridge was started with
    pub config: Arc<AppConfig>,

    /// Wire-level counters, updated by the dispatcher
    pub metrics: Arc<RwLock<BridgeMetrics>>,

    /// When the bridge was created (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected while the connection is live.
///
/// ## Why these metrics matter:
/// - **frames_dropped** vs **frames_received**: how often the counterpart sends
///   frames we cannot parse
/// - **decode_failures** vs **audio_units_decoded**: a response with fewer audio
///   units than segments sent shows up here and nowhere else
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BridgeMetrics {
    /// Inbound text frames handed to the dispatcher
    pub frames_received: u64,

    /// Frames dropped because they failed to parse
    pub frames_dropped: u64,

    /// `audio` chunks appended to the accumulator
    pub audio_chunks: u64,

    /// Audio units successfully decoded from a WAV container
    pub audio_units_decoded: u64,

    /// `audio_end` cycles whose buffer was not a usable WAV container
    pub decode_failures: u64,

    /// Responses delivered to observers (both `response_end` and text-only)
    pub responses_delivered: u64,

    /// Acknowledgement frames queued for the counterpart
    pub acks_sent: u64,
}

impl BridgeState {
    /// Create a new state with zeroed counters.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(BridgeMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Apply a mutation to the counters under the write lock.
    ///
    /// ## Rust Concepts:
    /// - **impl FnOnce**: the closure runs exactly once with exclusive access
    /// - **PoisonError::into_inner**: a panic elsewhere never stops counting
    pub fn record(&self, update: impl FnOnce(&mut BridgeMetrics)) {
        let mut metrics = self
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics);
    }

    /// Get a snapshot of the current counters.
    pub fn get_metrics_snapshot(&self) -> BridgeMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seconds since the bridge was created.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl BridgeMetrics {
    /// Fraction of received frames that were dropped (0.0 to 1.0).
    pub fn drop_rate(&self) -> f64 {
        if self.frames_received > 0 {
            self.frames_dropped as f64 / self.frames_received as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let state = BridgeState::new(AppConfig::default());
        state.record(|m| {
            m.frames_received += 4;
            m.frames_dropped += 1;
        });

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.frames_received, 4);
        assert_eq!(snapshot.frames_dropped, 1);
        assert!((snapshot.drop_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clones_share_counters() {
        let state = BridgeState::new(AppConfig::default());
        let other = state.clone();
        other.record(|m| m.acks_sent += 1);
        assert_eq!(state.get_metrics_snapshot().acks_sent, 1);
        assert_eq!(BridgeMetrics::default().drop_rate(), 0.0);
    }
}
