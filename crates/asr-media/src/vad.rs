//! Fixed-window voice activity detection (spec §4.3).
//!
//! `P(speech)` is estimated from per-window RMS energy mapped through a
//! logistic curve — a stand-in for the opaque ML voice model the original
//! API assumes, which is out of scope here. The window/threshold/hysteresis
//! state machine around it is the part that matters and is exact.

/// A window-boundary event emitted by [`VoiceActivityDetector::push`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VadEvent {
    SpeechStarted { audio_start_ms: u64 },
    SpeechStopped { audio_end_ms: u64 },
}

/// Fixed-window VAD over mono float32 PCM at a fixed sample rate.
pub struct VoiceActivityDetector {
    sample_rate: u32,
    window_len: usize,
    threshold: f32,
    silence_window_samples: u64,

    leftover: Vec<f32>,
    samples_consumed: u64,

    is_speaking: bool,
    speech_start_sample: u64,
    last_speech_sample: u64,
    silence_counter: u64,
}

/// Map RMS energy to a pseudo-probability in [0, 1] via a logistic curve
/// centered so that typical speech RMS (~0.05 on a [-1, 1] float signal)
/// sits comfortably above 0.5.
fn rms_to_probability(rms: f32) -> f32 {
    const MIDPOINT: f32 = 0.02;
    const STEEPNESS: f32 = 80.0;
    1.0 / (1.0 + (-STEEPNESS * (rms - MIDPOINT)).exp())
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

impl VoiceActivityDetector {
    /// `sample_rate` determines the window size: 512 samples at 16 kHz, 256
    /// at 8 kHz (32 ms either way).
    pub fn new(sample_rate: u32, threshold: f32, silence_duration_ms: u32) -> Self {
        let window_len = (sample_rate as usize * 32) / 1000;
        let silence_window_samples =
            ((silence_duration_ms as u64) * (sample_rate as u64)).div_ceil(1000);
        Self {
            sample_rate,
            window_len: window_len.max(1),
            threshold,
            silence_window_samples,
            leftover: Vec::new(),
            samples_consumed: 0,
            is_speaking: false,
            speech_start_sample: 0,
            last_speech_sample: 0,
            silence_counter: 0,
        }
    }

    pub fn default_16khz(threshold: f32, silence_duration_ms: u32) -> Self {
        Self::new(16_000, threshold, silence_duration_ms)
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Feed new samples, forming and evaluating as many complete windows as
    /// possible. Remainder samples are buffered for the next call.
    pub fn push(&mut self, samples: &[f32]) -> Vec<VadEvent> {
        self.leftover.extend_from_slice(samples);
        let mut events = Vec::new();

        while self.leftover.len() >= self.window_len {
            let window: Vec<f32> = self.leftover.drain(..self.window_len).collect();
            let wstart = self.samples_consumed;
            let wend = wstart + self.window_len as u64;
            self.samples_consumed = wend;

            let p_speech = rms_to_probability(rms(&window));

            if p_speech > self.threshold {
                if !self.is_speaking {
                    self.is_speaking = true;
                    self.speech_start_sample = wstart;
                    events.push(VadEvent::SpeechStarted {
                        audio_start_ms: round_sample_to_ms(self.speech_start_sample, self.sample_rate),
                    });
                }
                self.last_speech_sample = wend;
                self.silence_counter = 0;
            } else if self.is_speaking {
                self.silence_counter += self.window_len as u64;
                if self.silence_counter >= self.silence_window_samples {
                    self.is_speaking = false;
                    events.push(VadEvent::SpeechStopped {
                        audio_end_ms: round_sample_to_ms(self.last_speech_sample, self.sample_rate),
                    });
                }
            }
        }

        events
    }

    /// Emit a synthetic `speech_stopped` if currently speaking (session
    /// finish while mid-utterance).
    pub fn force_stop(&mut self) -> Option<VadEvent> {
        if self.is_speaking {
            self.is_speaking = false;
            Some(VadEvent::SpeechStopped {
                audio_end_ms: round_sample_to_ms(self.last_speech_sample, self.sample_rate),
            })
        } else {
            None
        }
    }

    /// Clear all state and the leftover buffer (after commit).
    pub fn reset(&mut self) {
        self.leftover.clear();
        self.samples_consumed = 0;
        self.is_speaking = false;
        self.speech_start_sample = 0;
        self.last_speech_sample = 0;
        self.silence_counter = 0;
    }
}

/// `round(sample / 16)` for 16 kHz audio, generalised to arbitrary rates.
fn round_sample_to_ms(sample: u64, sample_rate: u32) -> u64 {
    (sample * 1000 + sample_rate as u64 / 2) / sample_rate as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(n: usize) -> Vec<f32> {
        vec![0.0; n]
    }

    fn loud(n: usize) -> Vec<f32> {
        vec![0.5; n]
    }

    #[test]
    fn rms_helper_matches_expectation() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0, 0.0]), 0.0);
        assert!((rms(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn silence_produces_no_events() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 400);
        let events = vad.push(&silence(16_000));
        assert!(events.is_empty());
        assert!(!vad.is_speaking());
    }

    #[test]
    fn speech_then_silence_emits_started_and_stopped() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 200);
        // Window-aligned (3 * 512) so no loud samples carry over into the
        // first silence window.
        let started = vad.push(&loud(1536));
        assert!(matches!(started[0], VadEvent::SpeechStarted { .. }));
        assert!(vad.is_speaking());

        // 200ms silence at 16kHz = 3200 samples, plus one window margin.
        let stopped = vad.push(&silence(4000));
        assert!(stopped
            .iter()
            .any(|e| matches!(e, VadEvent::SpeechStopped { .. })));
        assert!(!vad.is_speaking());
    }

    #[test]
    fn brief_silence_does_not_stop_speech() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 400);
        vad.push(&loud(1536));
        // One window (32ms) of silence is far short of 400ms threshold.
        let events = vad.push(&silence(512));
        assert!(events.is_empty());
        assert!(vad.is_speaking());
    }

    #[test]
    fn force_stop_emits_when_speaking() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 400);
        vad.push(&loud(1600));
        let event = vad.force_stop();
        assert!(matches!(event, Some(VadEvent::SpeechStopped { .. })));
        assert!(!vad.is_speaking());
    }

    #[test]
    fn force_stop_is_noop_when_silent() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 400);
        assert!(vad.force_stop().is_none());
    }

    #[test]
    fn reset_clears_state_and_leftover_buffer() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 400);
        vad.push(&loud(1600));
        vad.push(&silence(10)); // partial window, stays in leftover
        vad.reset();
        assert!(!vad.is_speaking());
        let events = vad.push(&silence(16_000));
        assert!(events.is_empty());
    }

    #[test]
    fn eight_khz_uses_256_sample_window() {
        let vad = VoiceActivityDetector::new(8_000, 0.5, 400);
        assert_eq!(vad.window_len, 256);
    }

    #[test]
    fn leftover_samples_persist_across_push_calls() {
        let mut vad = VoiceActivityDetector::default_16khz(0.5, 400);
        let events = vad.push(&loud(600)); // one full window (512) + 88 leftover
        assert_eq!(events.len(), 1);
        let events2 = vad.push(&loud(600)); // 88 + 600 = 688 -> one more window
        assert!(events2.is_empty()); // already speaking, no new SpeechStarted
    }
}
