//! # Response Aggregation
//!
//! A response is everything the counterpart sends between two `response_end`
//! frames: decoded audio units with their duration labels and animation tags.
//! Standalone text arrives outside that cycle and is delivered as its own
//! response.
//!
//! ## Lifecycle:
//! 1. **Open**: implicitly, with the first fragment after the previous finalize
//! 2. **Accumulate**: the dispatcher appends audio units and animation tags
//! 3. **Finalize**: on `response_end` a snapshot is retained and delivered
//! 4. **Reset**: every field goes back to empty for the next cycle

use crate::audio::wave::DecodedWave;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// One decoded WAV segment plus the metadata delivered with it.
///
/// Immutable once created; the host takes it as the playable-audio handle.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioUnit {
    /// Channels, sample rate and PCM payload from the container
    pub wave: DecodedWave,

    /// Duration label from the `audio_end` frame, untouched
    pub duration_label: String,

    /// When the unit was decoded
    pub created_at: DateTime<Utc>,
}

impl AudioUnit {
    pub fn new(wave: DecodedWave, duration_label: impl Into<String>) -> Self {
        Self {
            wave,
            duration_label: duration_label.into(),
            created_at: Utc::now(),
        }
    }

    pub fn channels(&self) -> u16 {
        self.wave.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.wave.sample_rate
    }

    pub fn pcm(&self) -> &[u8] {
        &self.wave.pcm
    }

    /// Duration computed from the PCM length, as opposed to the wire label.
    pub fn duration_seconds(&self) -> f32 {
        self.wave.duration_seconds()
    }
}

/// The aggregate unit delivered to the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    /// Standalone text (only set on text-only responses)
    pub text: Option<String>,

    /// Decoded audio units in arrival order
    pub audio_units: Vec<AudioUnit>,

    /// Duration labels, parallel to `audio_units`
    pub durations: Vec<String>,

    /// Animation tags in arrival order
    pub animation_tags: Vec<String>,

    /// Raw WAV bytes of the most recent audio unit (single-audio consumers)
    pub audio: Vec<u8>,

    /// Most recent audio unit (single-audio consumers)
    pub sound_wave: Option<AudioUnit>,

    /// Set when the response is finalized or delivered
    pub completed_at: Option<DateTime<Utc>>,
}

impl Response {
    /// A response carrying only standalone text.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// True when nothing has been accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.audio_units.is_empty()
            && self.durations.is_empty()
            && self.animation_tags.is_empty()
            && self.audio.is_empty()
            && self.sound_wave.is_none()
    }

    /// Sum of the computed durations of all audio units.
    pub fn total_duration_seconds(&self) -> f32 {
        self.audio_units.iter().map(AudioUnit::duration_seconds).sum()
    }
}

/// Callback invoked with every delivered response.
pub type ResponseCallback = Arc<dyn Fn(&Response) + Send + Sync>;

/// Ordered list of response observers.
///
/// Observers run synchronously, in registration order, on the task that
/// processes inbound frames.
#[derive(Clone, Default)]
pub struct ResponseObservers {
    callbacks: Vec<ResponseCallback>,
}

impl ResponseObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    /// Deliver a response to every observer.
    pub fn notify(&self, response: &Response) {
        for callback in &self.callbacks {
            callback(response);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl fmt::Debug for ResponseObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseObservers")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Shared slot holding the last finalized response, readable by the host.
pub type RetainedResponse = Arc<RwLock<Option<Response>>>;

/// Builds the in-progress response and retains the last finalized one.
#[derive(Debug, Default)]
pub struct ResponseAggregator {
    in_progress: Response,
    last_complete: RetainedResponse,
}

impl ResponseAggregator {
    pub fn new(last_complete: RetainedResponse) -> Self {
        Self {
            in_progress: Response::default(),
            last_complete,
        }
    }

    /// Append a decoded audio unit and its raw WAV bytes.
    ///
    /// The unit and its label go to the parallel lists; the raw bytes and a
    /// copy of the unit replace the single-audio fields.
    pub fn push_audio_unit(&mut self, unit: AudioUnit, raw: Vec<u8>) {
        self.in_progress.durations.push(unit.duration_label.clone());
        self.in_progress.sound_wave = Some(unit.clone());
        self.in_progress.audio_units.push(unit);
        self.in_progress.audio = raw;
    }

    pub fn push_animation_tag(&mut self, tag: impl Into<String>) {
        self.in_progress.animation_tags.push(tag.into());
    }

    /// Snapshot the in-progress response, retain it and reset for the next cycle.
    pub fn finalize(&mut self) -> Response {
        let mut snapshot = std::mem::take(&mut self.in_progress);
        snapshot.completed_at = Some(Utc::now());

        *self
            .last_complete
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());

        snapshot
    }

    /// Drop whatever has been accumulated without delivering it.
    pub fn discard(&mut self) {
        self.in_progress = Response::default();
    }

    pub fn in_progress(&self) -> &Response {
        &self.in_progress
    }

    pub fn last_complete(&self) -> Option<Response> {
        self.last_complete
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn unit(label: &str) -> AudioUnit {
        AudioUnit::new(
            DecodedWave {
                channels: 1,
                sample_rate: 16000,
                bits_per_sample: 16,
                pcm: vec![0u8; 3200],
            },
            label,
        )
    }

    #[test]
    fn test_finalize_retains_snapshot_and_resets() {
        let mut aggregator = ResponseAggregator::default();
        aggregator.push_audio_unit(unit("0.1"), vec![1, 2, 3]);
        aggregator.push_animation_tag("wave");

        let response = aggregator.finalize();
        assert_eq!(response.audio_units.len(), 1);
        assert_eq!(response.durations, vec!["0.1".to_string()]);
        assert_eq!(response.animation_tags, vec!["wave".to_string()]);
        assert_eq!(response.audio, vec![1, 2, 3]);
        assert!(response.sound_wave.is_some());
        assert!(response.completed_at.is_some());
        assert!((response.total_duration_seconds() - 0.1).abs() < 1e-6);

        assert!(aggregator.in_progress().is_empty());
        assert_eq!(aggregator.last_complete(), Some(response));
    }

    #[test]
    fn test_finalize_on_empty_response() {
        let mut aggregator = ResponseAggregator::default();
        let response = aggregator.finalize();
        assert!(response.is_empty());
        assert!(aggregator.last_complete().is_some());
    }

    #[test]
    fn test_observers_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers = ResponseObservers::new();

        let first = seen.clone();
        observers.subscribe(move |_| first.lock().unwrap().push("first"));
        let second = seen.clone();
        observers.subscribe(move |r| {
            assert_eq!(r.text.as_deref(), Some("hello"));
            second.lock().unwrap().push("second");
        });

        observers.notify(&Response::text_only("hello"));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(observers.len(), 2);
    }
}
