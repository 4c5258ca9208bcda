//! # Protocol Dispatcher
//!
//! Routes each inbound frame to the accumulator, the response aggregator, or
//! straight to the observers, and queues the matching acknowledgement.
//!
//! ## Frame Handling:
//! 1. **Parse**: JSON into an `InboundMessage`; failures drop the frame silently
//! 2. **Dispatch**: by `type`
//! 3. **Acknowledge**: `audio_end`, `response_end` and `animation` each queue one ack
//!
//! ## Ordering:
//! `handle_message` is called once per frame, in arrival order, and never
//! re-entered. All state lives in this struct, so no locking is needed.

use crate::audio::buffer::AudioAccumulator;
use crate::audio::wave;
use crate::error::BridgeResult;
use crate::protocol::messages::{Ack, AnimationKind, InboundMessage};
use crate::protocol::response::{AudioUnit, Response, ResponseAggregator, ResponseObservers, RetainedResponse};
use crate::state::BridgeState;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Number of leading bytes logged when a WAV buffer fails to decode.
const DECODE_FAILURE_PREVIEW_BYTES: usize = 64;

/// Per-connection protocol state machine.
pub struct ProtocolDispatcher {
    /// Bytes of the audio unit currently being streamed
    accumulator: AudioAccumulator,

    /// In-progress and last finalized responses
    aggregator: ResponseAggregator,

    /// Outbound text frames, drained by the connection task after each dispatch
    outbound: mpsc::UnboundedSender<String>,

    /// Host callbacks for finished responses
    observers: ResponseObservers,

    /// Shared counters and configuration
    state: BridgeState,
}

impl ProtocolDispatcher {
    /// Create a dispatcher that queues acks on `outbound`.
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        observers: ResponseObservers,
        last_complete: RetainedResponse,
        state: BridgeState,
    ) -> Self {
        Self {
            accumulator: AudioAccumulator::new(),
            aggregator: ResponseAggregator::new(last_complete),
            outbound,
            observers,
            state,
        }
    }

    /// Handle one inbound text frame.
    ///
    /// ## Error Handling:
    /// Parse errors are logged and the frame is dropped with no ack and no
    /// state change. Decode errors are handled inside the `audio_end` path.
    pub fn handle_message(&mut self, raw: &str) {
        debug!("Received message: {}", raw);
        self.state.record(|m| m.frames_received += 1);

        if let Err(err) = self.try_handle_message(raw) {
            self.state.record(|m| m.frames_dropped += 1);
            error!(kind = err.kind(), "Dropping inbound frame: {}", err);
        }
    }

    fn try_handle_message(&mut self, raw: &str) -> BridgeResult<()> {
        let message: InboundMessage = serde_json::from_str(raw)?;

        match message {
            InboundMessage::Audio { data } => self.handle_audio(&data)?,
            InboundMessage::AudioEnd { duration, checksum } => {
                self.handle_audio_end(duration, checksum.as_deref())
            }
            InboundMessage::ResponseEnd => self.handle_response_end(),
            InboundMessage::Animation {
                facial_expression,
                data,
            } => self.handle_animation(&facial_expression, data),
        }

        Ok(())
    }

    /// Decode one base64 chunk and append it to the accumulator.
    ///
    /// Invalid base64 fails the whole frame, so nothing is appended.
    fn handle_audio(&mut self, data: &str) -> BridgeResult<()> {
        let bytes = BASE64.decode(data)?;

        if self.state.config.audio.log_chunks {
            trace!("Received chunk: {}", data);
        }

        self.accumulator.append(&bytes);
        self.state.record(|m| m.audio_chunks += 1);
        debug!(
            chunk_bytes = bytes.len(),
            buffered_bytes = self.accumulator.len(),
            "Appended audio chunk"
        );
        Ok(())
    }

    /// Close the current audio unit: decode, attach to the response, ack.
    fn handle_audio_end(&mut self, duration: String, checksum: Option<&str>) {
        if self.state.config.audio.verify_checksum {
            self.verify_checksum(checksum);
        }

        let raw = self.accumulator.drain_and_reset();
        debug!("Cleared accumulated data ({} bytes)", raw.len());

        match wave::decode(&raw) {
            Ok(decoded) => {
                info!(
                    channels = decoded.channels,
                    sample_rate = decoded.sample_rate,
                    pcm_bytes = decoded.pcm.len(),
                    duration = %duration,
                    "Audio unit decoded"
                );
                let unit = AudioUnit::new(decoded, duration);
                self.aggregator.push_audio_unit(unit, raw);
                self.state.record(|m| m.audio_units_decoded += 1);
            }
            Err(err) => {
                let preview: Vec<String> = raw
                    .iter()
                    .take(DECODE_FAILURE_PREVIEW_BYTES)
                    .map(|b| format!("{:02x}", b))
                    .collect();
                error!(
                    data_size = raw.len(),
                    first_bytes = %preview.join(" "),
                    "Failed to decode audio unit: {}",
                    err
                );
                self.state.record(|m| m.decode_failures += 1);
            }
        }

        self.send_ack(Ack::AudioEnd);
    }

    /// Compare the accumulated bytes with the counterpart's SHA-1. Logging only.
    fn verify_checksum(&self, expected: Option<&str>) {
        let Some(expected) = expected else {
            debug!("audio_end carried no checksum");
            return;
        };

        let computed = self.accumulator.checksum();
        if computed.eq_ignore_ascii_case(expected) {
            debug!("Checksum matched: {}", computed);
        } else {
            error!("Checksum mismatch: received {}, computed {}", expected, computed);
        }
    }

    /// Finalize the in-progress response and deliver it.
    fn handle_response_end(&mut self) {
        let response = self.aggregator.finalize();
        info!(
            audio_units = response.audio_units.len(),
            animation_tags = response.animation_tags.len(),
            "Response complete"
        );
        self.deliver(&response);
        self.send_ack(Ack::ResponseEnd);
    }

    /// Record an animation tag or deliver standalone text.
    fn handle_animation(&mut self, facial_expression: &str, data: String) {
        match AnimationKind::from_flag(facial_expression) {
            Some(AnimationKind::FacialExpression) => {
                debug!("Animation tag queued: {}", data);
                self.aggregator.push_animation_tag(data);
            }
            Some(AnimationKind::Text) => {
                let response = Response::text_only(data);
                self.deliver(&response);
            }
            None => {
                warn!(
                    "Ignoring animation frame with facial_expression '{}'",
                    facial_expression
                );
            }
        }

        self.send_ack(Ack::Animation);
    }

    fn deliver(&self, response: &Response) {
        self.observers.notify(response);
        self.state.record(|m| m.responses_delivered += 1);
    }

    /// Queue an acknowledgement. Fire-and-forget: a closed channel is only logged.
    fn send_ack(&self, ack: Ack) {
        if let Ok(frame) = ack.to_frame() {
            if self.outbound.send(frame).is_err() {
                warn!("Outbound channel closed, dropping {}", ack.kind());
                return;
            }
            self.state.record(|m| m.acks_sent += 1);
        }
    }

    /// Drop all unfinalized state (used on shutdown).
    pub fn discard_in_progress(&mut self) {
        if !self.accumulator.is_empty() || !self.aggregator.in_progress().is_empty() {
            info!(
                buffered_bytes = self.accumulator.len(),
                "Discarding unfinished response"
            );
        }
        self.accumulator.clear();
        self.aggregator.discard();
    }

    pub fn accumulator(&self) -> &AudioAccumulator {
        &self.accumulator
    }

    pub fn in_progress(&self) -> &Response {
        self.aggregator.in_progress()
    }

    pub fn last_complete(&self) -> Option<Response> {
        self.aggregator.last_complete()
    }
}
