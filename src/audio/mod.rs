//! # Audio Handling
//!
//! Turns streamed audio chunks back into playable units.
//!
//! ## Key Components:
//! - **Audio Accumulator** (`buffer`): concatenates base64-decoded chunks of one unit
//! - **Wave Decoder** (`wave`): parses the finished buffer as a RIFF/WAVE container
//!
//! ## Audio Format Assumptions:
//! - **Container**: WAV with `fmt ` and `data` chunks
//! - **Bit Depth**: 16-bit PCM (used for duration math)
//! - **Channels / Sample Rate**: whatever the container header says

pub mod buffer;
pub mod wave;
