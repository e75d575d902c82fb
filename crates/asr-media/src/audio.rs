//! Audio decoder — base64 payload + declared format/rate → mono 16 kHz f32 (spec §4.2).

use base64::Engine;
use rubato::{FftFixedIn, Resampler};
use tracing::warn;

use asr_core::error::{AsrError, Result};

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decoded, resampled audio ready for VAD/transcription: mono float32 in [-1, 1].
#[derive(Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// Decode one `input_audio_buffer.append` payload.
///
/// `declared_format` is the session's configured `input_audio_format`;
/// `declared_rate` is the session's configured sample rate. Unknown formats
/// fall back to `pcm16` per spec.
pub fn decode(audio_b64: &str, declared_format: &str, declared_rate: u32) -> Result<DecodedAudio> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(audio_b64)
        .map_err(|e| AsrError::AudioDecode(format!("invalid base64: {e}")))?;

    if bytes.is_empty() {
        return Ok(DecodedAudio { samples: Vec::new() });
    }

    let samples = match declared_format.to_lowercase().as_str() {
        "pcm" | "pcm16" | "pcm_s16le" => decode_pcm16(&bytes)?,
        "pcm32" | "pcm_s32le" => decode_pcm32(&bytes)?,
        #[cfg(feature = "opus")]
        "opus" => crate::opus_decode::decode(&bytes, declared_rate)?,
        #[cfg(not(feature = "opus"))]
        "opus" => {
            return Err(AsrError::AudioFormat(
                "opus support not compiled in (build with --features opus)".into(),
            ))
        }
        other => {
            warn!(format = other, "unknown input_audio_format, falling back to pcm16");
            decode_pcm16(&bytes)?
        }
    };

    let resampled = if declared_rate == TARGET_SAMPLE_RATE || samples.is_empty() {
        samples
    } else {
        resample(&samples, declared_rate, TARGET_SAMPLE_RATE)?
    };

    Ok(DecodedAudio { samples: resampled })
}

fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(AsrError::AudioFormat(
            "pcm16 payload length not a multiple of 2 bytes".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / (1i32 << 15) as f32)
        .collect())
}

fn decode_pcm32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AsrError::AudioFormat(
            "pcm32 payload length not a multiple of 4 bytes".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64 / (1i64 << 31) as f64)
        .map(|v| v as f32)
        .collect())
}

/// Resample mono float32 audio with a polyphase FFT resampler.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let chunk_size = samples.len();
    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        chunk_size,
        1,
        1,
    )
    .map_err(|e| AsrError::AudioFormat(format!("resampler init failed: {e}")))?;

    // FftFixedIn requires an exact chunk_size of input; pad with zeros and
    // trim the tail proportionally afterwards.
    let mut input = samples.to_vec();
    let needed = resampler.input_frames_next();
    input.resize(needed, 0.0);

    let output = resampler
        .process(&[input], None)
        .map_err(|e| AsrError::AudioFormat(format!("resample failed: {e}")))?;

    let expected_len = ((samples.len() as u64) * to_rate as u64 / from_rate as u64) as usize;
    let mut out = output.into_iter().next().unwrap_or_default();
    out.truncate(expected_len.max(1).min(out.len().max(1)).min(out.len()));
    Ok(out)
}
