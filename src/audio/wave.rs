//! # WAV Container Decoding
//!
//! Parses a complete RIFF/WAVE file out of the bytes accumulated for one audio
//! unit. Only chunk boundaries are located; the PCM payload is returned as-is.
//!
//! ## Container Layout:
//! ```text
//! "RIFF" <u32 riff size> "WAVE"
//!   "fmt " <u32 size> format, channels, sample rate, byte rate, block align, bits
//!   ...other chunks (LIST, fact, ...) are skipped...
//!   "data" <u32 size> <PCM samples>
//! ```
//! Chunk bodies are word-aligned: an odd-sized body is followed by one pad byte.
//!
//! ## Assumptions:
//! Durations are derived assuming 16-bit samples whatever `bits_per_sample`
//! says. No resampling, transcoding or sample validation happens here.

use crate::error::{BridgeError, BridgeResult};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Bytes per sample used for duration math (16-bit PCM).
pub const BYTES_PER_SAMPLE: u32 = 2;

/// "RIFF" + size + "WAVE"
const RIFF_HEADER_LEN: usize = 12;

/// Chunk id + chunk size
const CHUNK_HEADER_LEN: usize = 8;

/// Mandatory part of a `fmt ` chunk body
const MIN_FORMAT_CHUNK_LEN: usize = 16;

/// Audio parameters and PCM payload of one decoded WAV buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWave {
    /// Number of interleaved channels
    pub channels: u16,

    /// Samples per second per channel
    pub sample_rate: u32,

    /// Bit depth declared by the container (informational)
    pub bits_per_sample: u16,

    /// Contents of the `data` chunk
    pub pcm: Vec<u8>,
}

impl DecodedWave {
    /// Playback length in seconds.
    ///
    /// ## Calculation:
    /// duration = pcm_bytes / (channels * sample_rate * 2)
    pub fn duration_seconds(&self) -> f32 {
        let bytes_per_second =
            self.channels as f64 * self.sample_rate as f64 * BYTES_PER_SAMPLE as f64;
        (self.pcm.len() as f64 / bytes_per_second) as f32
    }
}

/// Fields of the `fmt ` chunk that the decoder cares about.
#[derive(Debug, Clone, Copy)]
struct FormatChunk {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decode a byte buffer as a WAV container.
///
/// ## Errors:
/// Returns `BridgeError::Decode` when the buffer is empty, shorter than the RIFF
/// header, not tagged RIFF/WAVE, missing a `fmt ` or `data` chunk, or when a
/// chunk claims more bytes than the buffer holds. Callers treat this as "no
/// audio this cycle".
pub fn decode(bytes: &[u8]) -> BridgeResult<DecodedWave> {
    if bytes.is_empty() {
        return Err(BridgeError::Decode("audio buffer is empty".to_string()));
    }

    if bytes.len() < RIFF_HEADER_LEN {
        return Err(BridgeError::Decode(format!(
            "buffer too short for a RIFF header: {} bytes",
            bytes.len()
        )));
    }

    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(BridgeError::Decode(
            "buffer is not a RIFF/WAVE container".to_string(),
        ));
    }

    let mut format: Option<FormatChunk> = None;
    let mut data: Option<&[u8]> = None;
    let mut offset = RIFF_HEADER_LEN;

    while offset + CHUNK_HEADER_LEN <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = LittleEndian::read_u32(&bytes[offset + 4..offset + 8]) as usize;
        let body_start = offset + CHUNK_HEADER_LEN;
        let body_end = body_start.saturating_add(size);

        match id {
            b"fmt " => {
                if size < MIN_FORMAT_CHUNK_LEN || body_end > bytes.len() {
                    return Err(BridgeError::Decode(format!(
                        "fmt chunk is truncated ({} bytes declared, {} available)",
                        size,
                        bytes.len() - body_start
                    )));
                }
                format = Some(parse_format(&bytes[body_start..body_end])?);
            }
            b"data" => {
                if body_end > bytes.len() {
                    return Err(BridgeError::Decode(format!(
                        "data chunk declares {} bytes but only {} remain",
                        size,
                        bytes.len() - body_start
                    )));
                }
                data = Some(&bytes[body_start..body_end]);
            }
            _ => {}
        }

        if format.is_some() && data.is_some() {
            break;
        }

        offset = body_end.saturating_add(size & 1);
    }

    let format = format.ok_or_else(|| BridgeError::Decode("missing fmt chunk".to_string()))?;
    let pcm = data.ok_or_else(|| BridgeError::Decode("missing data chunk".to_string()))?;

    Ok(DecodedWave {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        pcm: pcm.to_vec(),
    })
}

/// Read the mandatory fields of a `fmt ` chunk body.
fn parse_format(body: &[u8]) -> BridgeResult<FormatChunk> {
    let mut cursor = Cursor::new(body);
    let read_err = |e: std::io::Error| BridgeError::Decode(format!("fmt chunk: {}", e));

    let _audio_format = cursor.read_u16::<LittleEndian>().map_err(read_err)?;
    let channels = cursor.read_u16::<LittleEndian>().map_err(read_err)?;
    let sample_rate = cursor.read_u32::<LittleEndian>().map_err(read_err)?;
    let _byte_rate = cursor.read_u32::<LittleEndian>().map_err(read_err)?;
    let _block_align = cursor.read_u16::<LittleEndian>().map_err(read_err)?;
    let bits_per_sample = cursor.read_u16::<LittleEndian>().map_err(read_err)?;

    if channels == 0 || sample_rate == 0 {
        return Err(BridgeError::Decode(format!(
            "fmt chunk has {} channels at {} Hz",
            channels, sample_rate
        )));
    }

    Ok(FormatChunk {
        channels,
        sample_rate,
        bits_per_sample,
    })
}
