//! # Wire Messages
//!
//! Typed forms of every frame exchanged with the counterpart process.
//!
//! ## Message Format:
//! - **Counterpart → Bridge**: JSON objects tagged by `type`
//!   (`audio`, `audio_end`, `response_end`, `animation`)
//! - **Bridge → Counterpart**: fixed acknowledgement frames and one registration frame
//!
//! Frames with a missing or unknown `type`, or missing required fields, fail to
//! deserialize and are dropped by the dispatcher.

use serde::{Deserialize, Serialize};

/// Frames received from the counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// One base64-encoded chunk of the current WAV file
    Audio {
        data: String,
    },

    /// The current WAV file is complete
    AudioEnd {
        /// Duration label, passed through to the host untouched
        duration: String,
        /// Optional SHA-1 hex digest of the complete WAV file
        #[serde(default)]
        checksum: Option<String>,
    },

    /// The current response is complete
    ResponseEnd,

    /// Animation tag or standalone text, depending on `facial_expression`
    Animation {
        /// "True" for an animation tag, "False" for standalone text
        facial_expression: String,
        data: String,
    },
}

impl InboundMessage {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Audio { .. } => "audio",
            InboundMessage::AudioEnd { .. } => "audio_end",
            InboundMessage::ResponseEnd => "response_end",
            InboundMessage::Animation { .. } => "animation",
        }
    }
}

/// How an `animation` frame's `data` should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    /// `data` is an animation tag for the in-progress response
    FacialExpression,
    /// `data` is a standalone text response
    Text,
}

impl AnimationKind {
    /// Map the wire flag. Only the exact strings "True" and "False" are recognized.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "True" => Some(AnimationKind::FacialExpression),
            "False" => Some(AnimationKind::Text),
            _ => None,
        }
    }
}

/// Acknowledgements sent back to the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Sent for every `audio_end`
    AudioEnd,
    /// Sent for every `response_end`
    ResponseEnd,
    /// Sent for every `animation`
    Animation,
    /// Sent when the host reports that an animation finished playing
    AnimationEnd,
}

/// Serialized shape of an acknowledgement (`type` first, then `data`).
#[derive(Debug, Serialize)]
struct AckFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a str,
}

impl Ack {
    /// The `type` field of the acknowledgement frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Ack::AudioEnd => "audio_end_ack",
            Ack::ResponseEnd => "response_end_ack",
            Ack::Animation => "animation_ack",
            Ack::AnimationEnd => "animation_end_ack",
        }
    }

    /// The fixed `data` text of the acknowledgement frame.
    ///
    /// The counterpart matches these literally, spelling included.
    pub fn text(&self) -> &'static str {
        match self {
            Ack::AudioEnd => "Audio processing completed.",
            Ack::ResponseEnd => "Recieved end of message.",
            Ack::Animation | Ack::AnimationEnd => "Recieved animation request.",
        }
    }

    /// Render the acknowledgement as a text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(&AckFrame {
            kind: self.kind(),
            data: self.text(),
        })
    }
}

/// First frame sent after the connection opens.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
}

impl Registration {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_parsing() {
        let msg: InboundMessage = serde_json::from_str(r#"{"type":"audio","data":"AAE="}"#).unwrap();
        assert_eq!(msg, InboundMessage::Audio { data: "AAE=".to_string() });

        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"audio_end","duration":"1.0","checksum":"ab"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::AudioEnd {
                duration: "1.0".to_string(),
                checksum: Some("ab".to_string()),
            }
        );

        let msg: InboundMessage = serde_json::from_str(r#"{"type":"audio_end","duration":"2.5"}"#).unwrap();
        assert_eq!(msg.kind(), "audio_end");

        let msg: InboundMessage = serde_json::from_str(r#"{"type":"response_end"}"#).unwrap();
        assert_eq!(msg, InboundMessage::ResponseEnd);

        let msg: InboundMessage = serde_json::from_str(
            r#"{"type":"animation","facial_expression":"True","data":"smile"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "animation");
    }

    #[test]
    fn test_inbound_message_rejects_bad_frames() {
        // Unknown type
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"video","data":""}"#).is_err());
        // Missing type
        assert!(serde_json::from_str::<InboundMessage>(r#"{"data":"AAE="}"#).is_err());
        // Missing required field
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"audio_end"}"#).is_err());
        // Wrong field type
        assert!(serde_json::from_str::<InboundMessage>(r#"{"type":"audio","data":12}"#).is_err());
    }

    #[test]
    fn test_ack_frames_are_fixed_literals() {
        assert_eq!(
            Ack::AudioEnd.to_frame().unwrap(),
            r#"{"type":"audio_end_ack","data":"Audio processing completed."}"#
        );
        assert_eq!(
            Ack::ResponseEnd.to_frame().unwrap(),
            r#"{"type":"response_end_ack","data":"Recieved end of message."}"#
        );
        assert_eq!(
            Ack::Animation.to_frame().unwrap(),
            r#"{"type":"animation_ack","data":"Recieved animation request."}"#
        );
        assert_eq!(
            Ack::AnimationEnd.to_frame().unwrap(),
            r#"{"type":"animation_end_ack","data":"Recieved animation request."}"#
        );
    }

    #[test]
    fn test_registration_and_animation_flag() {
        let json = serde_json::to_string(&Registration::new("UnrealClient")).unwrap();
        assert_eq!(json, r#"{"name":"UnrealClient"}"#);

        assert_eq!(AnimationKind::from_flag("True"), Some(AnimationKind::FacialExpression));
        assert_eq!(AnimationKind::from_flag("False"), Some(AnimationKind::Text));
        assert_eq!(AnimationKind::from_flag("true"), None);
    }
}
