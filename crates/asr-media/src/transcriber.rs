//! Streaming transcriber adapter (spec §4.4) — a three-call `init`/`feed`/
//! `finalize` contract over an opaque per-utterance backend state, plus the
//! interim text-splitting rule and language code normalisation tables.

use asr_core::error::Result;

/// Parameters for beginning a new utterance.
#[derive(Debug, Clone)]
pub struct TranscriberInit {
    pub context: String,
    pub language_hint: Option<String>,
    pub unfixed_chunk_num: u32,
    pub unfixed_token_num: u32,
    pub chunk_size_sec: f32,
}

impl Default for TranscriberInit {
    fn default() -> Self {
        Self {
            context: String::new(),
            language_hint: None,
            unfixed_chunk_num: 2,
            unfixed_token_num: 5,
            chunk_size_sec: 2.0,
        }
    }
}

/// Backend output at any point during an utterance.
#[derive(Debug, Clone, Default)]
pub struct TranscriptUpdate {
    pub text: String,
    /// Full English language name, as surfaced by the backend. Empty when
    /// not yet detected.
    pub language: String,
}

/// Per-utterance opaque backend state. A real inference backend would carry
/// model-specific fields here; the deterministic backend keeps plain text.
pub trait TranscriberState: Send {
    fn snapshot(&self) -> TranscriptUpdate;
}

/// The three-call streaming contract a backend must implement.
///
/// `feed`/`finalize` may block for tens to hundreds of milliseconds and must
/// be run off the connection's task via a worker-pool offload (spec §5); this
/// trait itself is synchronous so callers can dispatch it through
/// `tokio::task::spawn_blocking` or an equivalent executor.
pub trait StreamingTranscriber: Send + Sync {
    type State: TranscriberState;

    fn init(&self, params: &TranscriberInit) -> Result<Self::State>;
    fn feed(&self, state: Self::State, samples: &[f32]) -> Result<Self::State>;
    fn finalize(&self, state: Self::State) -> Result<TranscriptUpdate>;
}

/// Deterministic in-process backend: reports silence as empty text and
/// non-silent audio as a fixed placeholder transcript, scaling with the
/// amount of audio seen. Used as the default backend and in tests, since the
/// real inference model is out of scope.
pub struct DeterministicBackend;

pub struct DeterministicState {
    language_hint: Option<String>,
    voiced_windows: u32,
}

impl TranscriberState for DeterministicState {
    fn snapshot(&self) -> TranscriptUpdate {
        let language = self.language_hint.clone().unwrap_or_default();
        if self.voiced_windows == 0 {
            TranscriptUpdate { text: String::new(), language }
        } else {
            let words = "hello world this is a transcribed utterance".split(' ');
            let text = words
                .take(self.voiced_windows.min(8) as usize)
                .collect::<Vec<_>>()
                .join(" ");
            TranscriptUpdate { text, language }
        }
    }
}

impl StreamingTranscriber for DeterministicBackend {
    type State = DeterministicState;

    fn init(&self, params: &TranscriberInit) -> Result<Self::State> {
        Ok(DeterministicState {
            language_hint: params.language_hint.clone(),
            voiced_windows: 0,
        })
    }

    fn feed(&self, mut state: Self::State, samples: &[f32]) -> Result<Self::State> {
        let energy: f32 = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
        };
        if energy > 0.001 {
            state.voiced_windows += 1;
        }
        Ok(state)
    }

    fn finalize(&self, state: Self::State) -> Result<TranscriptUpdate> {
        Ok(state.snapshot())
    }
}

/// Split `text` into `(confirmed, stash)` per the interim-result rule: short
/// text is entirely unstable; longer text keeps all but a trailing tail of
/// `min(10, len/3)` characters stable.
pub fn split_interim(text: &str) -> (String, String) {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len <= 20 {
        return (String::new(), text.to_string());
    }
    let tail = 10.min(len / 3);
    let k = len - tail;
    let confirmed: String = chars[..k].iter().collect();
    let stash: String = chars[k..].iter().collect();
    (confirmed, stash)
}

/// Normalise an inbound language hint to the canonical full name the backend
/// expects. `auto` and unrecognised/empty hints map to `None` (no hint).
/// Strings starting with an uppercase letter are assumed to already be a
/// canonical full name and pass through unchanged.
pub fn normalize_inbound_language(hint: &str) -> Option<String> {
    let trimmed = hint.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        return None;
    }
    if trimmed.chars().next().is_some_and(|c| c.is_uppercase()) {
        return Some(trimmed.to_string());
    }
    iso_to_full_name(&trimmed.to_lowercase()).map(str::to_string)
}

fn iso_to_full_name(code: &str) -> Option<&'static str> {
    Some(match code {
        "zh" => "Chinese",
        "yue" => "Cantonese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "it" => "Italian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "id" => "Indonesian",
        "th" => "Thai",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "vi" => "Vietnamese",
        "cs" => "Czech",
        "da" => "Danish",
        "fil" => "Filipino",
        "fi" => "Finnish",
        "is" => "Icelandic",
        "ms" => "Malay",
        "no" => "Norwegian",
        "pl" => "Polish",
        "sv" => "Swedish",
        "nl" => "Dutch",
        "fa" => "Persian",
        "el" => "Greek",
        "ro" => "Romanian",
        "hu" => "Hungarian",
        "mk" => "Macedonian",
        _ => return None,
    })
}

/// Convert a backend-reported full language name to the outbound ISO code.
/// Unknown or unrecognised names default to `zh`, matching the backend's own
/// fallback behaviour.
pub fn language_to_iso_code(full_name: &str) -> &'static str {
    match full_name.to_lowercase().as_str() {
        "chinese" => "zh",
        "cantonese" => "yue",
        "english" => "en",
        "japanese" => "ja",
        "korean" => "ko",
        "french" => "fr",
        "german" => "de",
        "spanish" => "es",
        "portuguese" => "pt",
        "russian" => "ru",
        "italian" => "it",
        "arabic" => "ar",
        "hindi" => "hi",
        "indonesian" => "id",
        "thai" => "th",
        "turkish" => "tr",
        "ukrainian" => "uk",
        "vietnamese" => "vi",
        "czech" => "cs",
        "danish" => "da",
        "filipino" => "fil",
        "finnish" => "fi",
        "icelandic" => "is",
        "malay" => "ms",
        "norwegian" => "no",
        "polish" => "pl",
        "swedish" => "sv",
        "dutch" => "nl",
        "persian" => "fa",
        "greek" => "el",
        "romanian" => "ro",
        "hungarian" => "hu",
        "macedonian" => "mk",
        _ => "zh",
    }
}

/// Run a full utterance against a backend synchronously. Intended to be
/// invoked from within a `spawn_blocking` (or equivalent) offload by callers;
/// this function itself performs no async I/O.
pub fn run_utterance<B: StreamingTranscriber>(
    backend: &B,
    params: &TranscriberInit,
    chunks: &[Vec<f32>],
) -> Result<TranscriptUpdate> {
    let mut state = backend.init(params)?;
    for chunk in chunks {
        state = backend.feed(state, chunk)?;
    }
    backend.finalize(state)
}
