//! Opus decode path, gated behind the `opus` feature (disabled by default —
//! the `audiopus_sys` build script requires `cmake`, which is not available
//! in every build environment; see DESIGN.md).

use asr_core::error::{AsrError, Result};
use opus::{Channels, Decoder};

/// Decode a single Opus packet to mono float32 at `sample_rate`.
pub fn decode(packet: &[u8], sample_rate: u32) -> Result<Vec<f32>> {
    let mut decoder = Decoder::new(sample_rate, Channels::Mono)
        .map_err(|e| AsrError::AudioDecode(format!("opus decoder init failed: {e}")))?;

    // Opus frames are at most 120ms; size the output buffer generously.
    let max_samples = (sample_rate as usize * 120) / 1000;
    let mut out = vec![0.0f32; max_samples];
    let written = decoder
        .decode_float(packet, &mut out, false)
        .map_err(|e| AsrError::AudioDecode(format!("opus decode failed: {e}")))?;
    out.truncate(written);
    Ok(out)
}
