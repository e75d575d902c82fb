//! The per-connection session state machine (spec: session engine).
//!
//! Pure and synchronous so it can be driven by tests without a network
//! socket: [`SessionEngine::handle_event`] takes one parsed inbound event and
//! returns the ordered outbound wire events it produces. The owning
//! connection task is responsible for parsing frames, writing outbound
//! events, and offloading `handle_event` itself onto a blocking-friendly
//! executor when the configured backend does real compute (see `connection.rs`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use asr_core::config::Config;
use asr_core::error::AsrError;
use asr_core::events::{self, InboundEvent, SessionConfigUpdate, TurnDetectionWire};
use asr_core::ids::{generate_item_id, generate_session_id};
use asr_core::model::{ItemStatus, SessionState, UtteranceItem};
use asr_media::transcriber::{
    self, StreamingTranscriber, TranscriberInit, TranscriberState, TranscriptUpdate,
};
use asr_media::vad::{VadEvent, VoiceActivityDetector};

#[derive(Debug, Clone, Copy, PartialEq)]
struct EffectiveConfig {
    sample_rate: u32,
    vad_enabled: bool,
    vad_threshold: f32,
    vad_silence_ms: u32,
}

/// Owns all per-connection state: wire-level session attributes, the VAD
/// engine, the transcriber adapter handle, and the lifecycle state machine.
pub struct SessionEngine<B: StreamingTranscriber> {
    pub session_id: String,
    model: String,
    input_audio_format: String,
    sample_rate: u32,
    language_hint: Option<String>,

    vad_enabled: bool,
    vad_threshold: f32,
    vad_silence_ms: u32,
    vad: Option<VoiceActivityDetector>,

    backend: Arc<B>,
    transcriber_state: Option<B::State>,

    state: SessionState,
    current_item: Option<UtteranceItem>,
    /// Set when a `feed()` call into the backend fails mid-item; the item is
    /// abandoned at the next commit rather than retried.
    item_backend_failed: bool,
    item_start_samples: u64,
    previous_item_id: String,
    cumulative_samples: u64,

    segment_start: Instant,
    auto_commit_interval: Duration,
}

impl<B: StreamingTranscriber> SessionEngine<B> {
    pub fn new(config: &Config, backend: Arc<B>) -> Self {
        Self {
            session_id: generate_session_id(),
            model: config.model_path.clone(),
            input_audio_format: "pcm16".to_string(),
            sample_rate: 16_000,
            language_hint: None,
            vad_enabled: config.vad_enabled,
            vad_threshold: config.vad_threshold,
            vad_silence_ms: config.vad_silence_duration_ms,
            vad: None,
            backend,
            transcriber_state: None,
            state: SessionState::AwaitingConfig,
            current_item: None,
            item_backend_failed: false,
            item_start_samples: 0,
            previous_item_id: String::new(),
            cumulative_samples: 0,
            segment_start: Instant::now(),
            auto_commit_interval: Duration::from_secs_f32(config.auto_commit_interval_sec),
        }
    }

    /// Total decoded samples seen so far, at the session's 16 kHz internal
    /// rate. Used by the connection task to derive elapsed audio-seconds for
    /// the `/stats` gauge.
    pub fn cumulative_samples(&self) -> u64 {
        self.cumulative_samples
    }

    fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            sample_rate: self.sample_rate,
            vad_enabled: self.vad_enabled,
            vad_threshold: self.vad_threshold,
            vad_silence_ms: self.vad_silence_ms,
        }
    }

    fn turn_detection_wire(&self) -> Option<TurnDetectionWire> {
        self.vad_enabled
            .then(|| TurnDetectionWire::new(self.vad_threshold, self.vad_silence_ms))
    }

    /// Session-created event, emitted once right after the connection is
    /// accepted — before any inbound event is processed.
    pub fn session_created_event(&self) -> Value {
        events::session_created(
            &self.session_id,
            &self.model,
            &self.input_audio_format,
            self.turn_detection_wire().as_ref(),
        )
    }

    fn apply_config(&mut self, update: &SessionConfigUpdate) {
        if let Some(format) = &update.input_audio_format {
            self.input_audio_format = format.clone();
        }
        if let Some(rate) = update.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(transcription) = &update.input_audio_transcription {
            self.language_hint = transcription
                .language
                .as_deref()
                .and_then(transcriber::normalize_inbound_language);
        }
        if let Some(turn_detection) = &update.turn_detection {
            match turn_detection {
                None => self.vad_enabled = false,
                Some(cfg) => {
                    self.vad_enabled = true;
                    self.vad_threshold = cfg.threshold;
                    self.vad_silence_ms = cfg.silence_duration_ms;
                }
            }
        }
    }

    fn ensure_vad(&mut self) {
        if self.vad_enabled && self.vad.is_none() {
            self.vad = Some(VoiceActivityDetector::default_16khz(
                self.vad_threshold,
                self.vad_silence_ms,
            ));
        }
        if !self.vad_enabled {
            self.vad = None;
        }
    }

    fn transcriber_init_params(&self) -> TranscriberInit {
        TranscriberInit {
            language_hint: self.language_hint.clone(),
            ..TranscriberInit::default()
        }
    }

    /// Open a new item if none is open. Returns an `internal_error` wire
    /// event (and leaves no item open) if the backend fails to initialize;
    /// otherwise returns no events.
    fn ensure_item_open(&mut self) -> Vec<Value> {
        if self.current_item.is_some() {
            return Vec::new();
        }
        match self.backend.init(&self.transcriber_init_params()) {
            Ok(state) => {
                let item_id = generate_item_id();
                debug!(session_id = %self.session_id, item_id = %item_id, "item opened");
                self.transcriber_state = Some(state);
                self.item_backend_failed = false;
                self.item_start_samples = self.cumulative_samples;
                self.current_item = Some(UtteranceItem {
                    item_id,
                    previous_item_id: self.previous_item_id.clone(),
                    status: ItemStatus::Open,
                });
                self.state = SessionState::ItemOpen;
                self.segment_start = Instant::now();
                Vec::new()
            }
            Err(e) => {
                warn!(session_id = %self.session_id, %e, "transcriber init failed, item not opened");
                crate::metrics::record_error("backend_error");
                vec![events::error_event(
                    "internal_error",
                    "backend_error",
                    &e.to_string(),
                    None,
                    None,
                )]
            }
        }
    }

    /// Process one inbound wire event, returning the outbound events it
    /// produces in order.
    pub fn handle_event(&mut self, event: InboundEvent) -> Vec<Value> {
        match event {
            InboundEvent::SessionUpdate { event_id, session } => {
                self.handle_session_update(event_id, session)
            }
            InboundEvent::InputAudioBufferAppend { event_id, audio } => {
                self.handle_append(event_id, &audio)
            }
            InboundEvent::InputAudioBufferCommit { event_id } => self.handle_commit(event_id),
            InboundEvent::SessionFinish { .. } => self.handle_finish(),
        }
    }

    /// Handle a frame whose `type` the codec did not recognise.
    pub fn handle_unknown_event(&self, event_type: &str) -> Vec<Value> {
        vec![events::error_event(
            "invalid_request_error",
            "invalid_event",
            &format!("unknown event type: {event_type}"),
            None,
            None,
        )]
    }

    fn handle_session_update(
        &mut self,
        _event_id: Option<String>,
        update: SessionConfigUpdate,
    ) -> Vec<Value> {
        if self.current_item.is_some() {
            let before = self.effective_config();
            let mut probe = SessionEngineProbe::from(&*self);
            probe.apply_config(&update);
            if probe.effective_config() != before {
                warn!(session_id = %self.session_id, "rejected session.update: item open");
                return vec![events::error_event(
                    "invalid_request_error",
                    "reconfigure_while_open",
                    "cannot change session configuration while an item is open",
                    None,
                    None,
                )];
            }
        }

        self.apply_config(&update);
        self.ensure_vad();
        if self.state == SessionState::AwaitingConfig {
            info!(session_id = %self.session_id, "session configured, entering idle");
            self.state = SessionState::Idle;
        }
        debug!(session_id = %self.session_id, vad_enabled = self.vad_enabled, "session updated");
        vec![events::session_updated(
            &self.session_id,
            &self.model,
            &self.input_audio_format,
            self.turn_detection_wire().as_ref(),
        )]
    }

    fn handle_append(&mut self, event_id: Option<String>, audio_b64: &str) -> Vec<Value> {
        if self.state == SessionState::AwaitingConfig {
            self.ensure_vad();
            self.state = SessionState::Idle;
        }

        let decoded = match asr_media::audio::decode(audio_b64, &self.input_audio_format, self.sample_rate) {
            Ok(d) => d,
            Err(e) => {
                let code = match e {
                    AsrError::AudioDecode(_) => "invalid_audio",
                    _ => "invalid_audio_format",
                };
                warn!(session_id = %self.session_id, %e, code, "audio append rejected");
                crate::metrics::record_error(code);
                return vec![events::error_event(
                    "invalid_request_error",
                    code,
                    &e.to_string(),
                    None,
                    event_id.as_deref(),
                )];
            }
        };

        if decoded.samples.is_empty() {
            return Vec::new();
        }

        let mut outbound = Vec::new();

        if !self.vad_enabled {
            outbound.extend(self.ensure_item_open());
        }

        self.cumulative_samples += decoded.samples.len() as u64;

        if self.vad_enabled {
            self.ensure_vad();
            let vad_events = self.vad.as_mut().unwrap().push(&decoded.samples);
            for vad_event in vad_events {
                match vad_event {
                    VadEvent::SpeechStarted { audio_start_ms } => {
                        debug!(session_id = %self.session_id, audio_start_ms, "speech started");
                        outbound.extend(self.ensure_item_open());
                        if let Some(item) = &self.current_item {
                            outbound.push(events::speech_started(audio_start_ms, &item.item_id));
                        }
                    }
                    VadEvent::SpeechStopped { audio_end_ms } => {
                        if let Some(item) = &self.current_item {
                            debug!(session_id = %self.session_id, audio_end_ms, "speech stopped");
                            outbound.push(events::speech_stopped(audio_end_ms, &item.item_id));
                            outbound.extend(self.commit_procedure());
                        }
                    }
                }
            }
        }

        if let Some(state) = self.transcriber_state.take() {
            match self.backend.feed(state, &decoded.samples) {
                Ok(new_state) => {
                    let snapshot = new_state.snapshot();
                    self.transcriber_state = Some(new_state);
                    if !snapshot.text.is_empty() {
                        outbound.push(self.interim_event(&snapshot));
                    }
                }
                Err(e) => {
                    warn!(session_id = %self.session_id, %e, "transcriber feed failed, item will be abandoned");
                    crate::metrics::record_error("backend_error");
                    self.item_backend_failed = true;
                }
            }
        }

        if self.state == SessionState::ItemOpen
            && self.segment_start.elapsed() >= self.auto_commit_interval
        {
            info!(session_id = %self.session_id, "auto-commit interval elapsed");
            outbound.extend(self.commit_procedure());
            outbound.extend(self.ensure_item_open());
            if let Some(item) = &self.current_item {
                outbound.push(events::conversation_item_created(
                    &self.previous_item_id,
                    &item.item_id,
                ));
            }
        }

        outbound
    }

    fn interim_event(&self, snapshot: &TranscriptUpdate) -> Value {
        let item_id = self.current_item.as_ref().map(|i| i.item_id.as_str()).unwrap_or("");
        let (confirmed, stash) = transcriber::split_interim(&snapshot.text);
        let language = transcriber::language_to_iso_code(&snapshot.language);
        events::transcription_text(item_id, language, "neutral", &confirmed, &stash)
    }

    fn handle_commit(&mut self, event_id: Option<String>) -> Vec<Value> {
        if self.vad_enabled {
            warn!(session_id = %self.session_id, "rejected manual commit: VAD enabled");
            return vec![events::error_event(
                "invalid_request_error",
                "commit_not_allowed",
                "manual commit is not allowed while VAD is enabled",
                None,
                event_id.as_deref(),
            )];
        }
        let mut outbound = self.ensure_item_open();
        outbound.extend(self.commit_procedure());
        outbound
    }

    fn handle_finish(&mut self) -> Vec<Value> {
        info!(session_id = %self.session_id, "session finishing");
        let mut outbound = Vec::new();

        if let Some(vad) = self.vad.as_mut() {
            if let Some(VadEvent::SpeechStopped { audio_end_ms }) = vad.force_stop() {
                if let Some(item) = &self.current_item {
                    outbound.push(events::speech_stopped(audio_end_ms, &item.item_id));
                }
            }
        }

        if self.current_item.is_some() {
            outbound.extend(self.commit_procedure());
        }

        outbound.push(events::session_finished());
        self.state = SessionState::Finished;
        outbound
    }

    /// Close the current item: emit `committed`/`created`/`completed` (or an
    /// error event in place of `completed` if the backend failed), finalize
    /// the transcriber adapter, and reset per-item state.
    fn commit_procedure(&mut self) -> Vec<Value> {
        let item = match self.current_item.take() {
            Some(mut item) => {
                item.status = ItemStatus::Committed;
                item
            }
            None => return Vec::new(),
        };
        let item_id = item.item_id;

        let mut outbound = Vec::new();
        outbound.push(events::input_audio_buffer_committed(&self.previous_item_id, &item_id));
        outbound.push(events::conversation_item_created(&self.previous_item_id, &item_id));

        let audio_seconds = (self.cumulative_samples - self.item_start_samples) as f64
            / asr_media::audio::TARGET_SAMPLE_RATE as f64;

        match self.finalize_transcript() {
            Ok(result) => {
                let language = transcriber::language_to_iso_code(&result.language);
                outbound.push(events::transcription_completed(&item_id, language, "neutral", &result.text));
                info!(session_id = %self.session_id, item_id = %item_id, audio_seconds, "item committed");
            }
            Err(maybe_err) => {
                let message = match &maybe_err {
                    Some(e) => e.to_string(),
                    None => "transcriber backend failed earlier in this item".to_string(),
                };
                warn!(session_id = %self.session_id, item_id = %item_id, message, "item abandoned");
                crate::metrics::record_error("backend_error");
                outbound.push(events::error_event(
                    "server_error",
                    "internal_error",
                    &message,
                    None,
                    None,
                ));
            }
        }

        crate::metrics::record_session_committed(audio_seconds);

        self.previous_item_id = item_id;
        if let Some(vad) = self.vad.as_mut() {
            vad.reset();
        }
        self.state = SessionState::Idle;

        outbound
    }

    /// Finalize the transcriber state for the item currently being committed.
    /// `Err(Some(_))` means `finalize()` itself just failed; `Err(None)` means
    /// an earlier `feed()` in this item already failed, so no further backend
    /// call is attempted. Both cases abandon the item identically.
    fn finalize_transcript(&mut self) -> Result<TranscriptUpdate, Option<AsrError>> {
        if self.item_backend_failed {
            self.item_backend_failed = false;
            return Err(None);
        }
        match self.transcriber_state.take() {
            Some(state) => self.backend.finalize(state).map_err(Some),
            None => Ok(TranscriptUpdate::default()),
        }
    }
}

/// A throwaway clone of the fields `apply_config` touches, used to probe
/// whether an in-flight `session.update` would be a true no-op without
/// mutating the live engine before the reject/accept decision is made.
struct SessionEngineProbe {
    sample_rate: u32,
    vad_enabled: bool,
    vad_threshold: f32,
    vad_silence_ms: u32,
    input_audio_format: String,
    language_hint: Option<String>,
}

impl<B: StreamingTranscriber> From<&SessionEngine<B>> for SessionEngineProbe {
    fn from(engine: &SessionEngine<B>) -> Self {
        Self {
            sample_rate: engine.sample_rate,
            vad_enabled: engine.vad_enabled,
            vad_threshold: engine.vad_threshold,
            vad_silence_ms: engine.vad_silence_ms,
            input_audio_format: engine.input_audio_format.clone(),
            language_hint: engine.language_hint.clone(),
        }
    }
}

impl SessionEngineProbe {
    fn apply_config(&mut self, update: &SessionConfigUpdate) {
        if let Some(format) = &update.input_audio_format {
            self.input_audio_format = format.clone();
        }
        if let Some(rate) = update.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(transcription) = &update.input_audio_transcription {
            self.language_hint = transcription
                .language
                .as_deref()
                .and_then(transcriber::normalize_inbound_language);
        }
        if let Some(turn_detection) = &update.turn_detection {
            match turn_detection {
                None => self.vad_enabled = false,
                Some(cfg) => {
                    self.vad_enabled = true;
                    self.vad_threshold = cfg.threshold;
                    self.vad_silence_ms = cfg.silence_duration_ms;
                }
            }
        }
    }

    fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            sample_rate: self.sample_rate,
            vad_enabled: self.vad_enabled,
            vad_threshold: self.vad_threshold,
            vad_silence_ms: self.vad_silence_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asr_core::events::parse_inbound;
    use asr_media::transcriber::DeterministicBackend;
    use base64::Engine;

    fn engine() -> SessionEngine<DeterministicBackend> {
        SessionEngine::new(&Config::default(), Arc::new(DeterministicBackend))
    }

    fn silence_b64(samples: usize) -> String {
        let bytes = vec![0u8; samples * 2];
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn loud_b64(samples: usize) -> String {
        let pcm = vec![3000i16; samples];
        let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn feed(engine: &mut SessionEngine<DeterministicBackend>, text: &str) -> Vec<Value> {
        let parsed = parse_inbound(text).unwrap().unwrap();
        engine.handle_event(parsed)
    }

    fn event_types(events: &[Value]) -> Vec<String> {
        events
            .iter()
            .map(|e| e["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn manual_mode_happy_path() {
        let mut engine = engine();
        let created = engine.session_created_event();
        assert_eq!(created["type"], "session.created");

        let mut all = Vec::new();
        all.extend(feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null,"input_audio_transcription":{"language":"zh"}}}"#,
        ));
        all.extend(feed(
            &mut engine,
            &format!(
                r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                silence_b64(16_000)
            ),
        ));
        all.extend(feed(&mut engine, r#"{"type":"input_audio_buffer.commit"}"#));
        all.extend(feed(&mut engine, r#"{"type":"session.finish"}"#));

        assert_eq!(
            event_types(&all),
            vec![
                "session.updated",
                "input_audio_buffer.committed",
                "conversation.item.created",
                "conversation.item.input_audio_transcription.completed",
                "session.finished",
            ]
        );
        let completed = &all[3];
        assert_eq!(completed["transcript"], "");
    }

    #[test]
    fn commit_in_vad_mode_is_rejected() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":{"threshold":0.3,"silence_duration_ms":500}}}"#,
        );
        let events = feed(&mut engine, r#"{"type":"input_audio_buffer.commit"}"#);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
        assert_eq!(events[0]["error"]["code"], "commit_not_allowed");
    }

    #[test]
    fn unknown_event_type_reports_invalid_event() {
        let engine = engine();
        let parsed = parse_inbound(r#"{"type":"invalid.event.type"}"#).unwrap();
        assert!(parsed.is_err());
        let events = engine.handle_unknown_event("invalid.event.type");
        assert_eq!(events[0]["error"]["code"], "invalid_event");
    }

    #[test]
    fn reconfigure_while_item_open_is_rejected() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        feed(
            &mut engine,
            &format!(
                r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                loud_b64(1600)
            ),
        );
        let events = feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":{"threshold":0.9,"silence_duration_ms":200}}}"#,
        );
        assert_eq!(events[0]["error"]["code"], "reconfigure_while_open");
    }

    #[test]
    fn noop_reconfigure_while_open_is_accepted() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        feed(
            &mut engine,
            &format!(
                r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                loud_b64(1600)
            ),
        );
        let events = feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        assert_eq!(events[0]["type"], "session.updated");
    }

    #[test]
    fn vad_segmentation_emits_started_then_stopped_then_commit_sequence() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":{"threshold":0.3,"silence_duration_ms":200}}}"#,
        );

        let mut all = feed(
            &mut engine,
            &format!(
                r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                loud_b64(16_000) // 1s of speech
            ),
        );
        assert!(event_types(&all).contains(&"input_audio_buffer.speech_started".to_string()));

        all.extend(feed(
            &mut engine,
            &format!(
                r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                silence_b64(4_000) // 250ms silence > 200ms threshold
            ),
        ));

        let types = event_types(&all);
        let stopped_idx = types
            .iter()
            .position(|t| t == "input_audio_buffer.speech_stopped")
            .unwrap();
        let committed_idx = types
            .iter()
            .position(|t| t == "input_audio_buffer.committed")
            .unwrap();
        let created_idx = types
            .iter()
            .position(|t| t == "conversation.item.created")
            .unwrap();
        let completed_idx = types
            .iter()
            .position(|t| t == "conversation.item.input_audio_transcription.completed")
            .unwrap();
        assert!(stopped_idx < committed_idx);
        assert!(committed_idx < created_idx);
        assert!(created_idx < completed_idx);
    }

    #[test]
    fn finish_while_speaking_force_stops_then_commits() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":{"threshold":0.3,"silence_duration_ms":400}}}"#,
        );
        feed(
            &mut engine,
            &format!(
                r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                loud_b64(16_000)
            ),
        );
        let events = feed(&mut engine, r#"{"type":"session.finish"}"#);
        let types = event_types(&events);
        assert_eq!(types[0], "input_audio_buffer.speech_stopped");
        assert!(types.contains(&"input_audio_buffer.committed".to_string()));
        assert_eq!(*types.last().unwrap(), "session.finished");
    }

    #[test]
    fn empty_audio_append_produces_no_events() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        let events = feed(
            &mut engine,
            r#"{"type":"input_audio_buffer.append","audio":""}"#,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn commit_with_no_audio_commits_an_empty_item() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        let events = feed(&mut engine, r#"{"type":"input_audio_buffer.commit"}"#);
        let types = event_types(&events);
        assert_eq!(
            types,
            vec![
                "input_audio_buffer.committed",
                "conversation.item.created",
                "conversation.item.input_audio_transcription.completed",
            ]
        );
        assert_eq!(events[2]["transcript"], "");
    }

    #[test]
    fn finish_always_ends_with_session_finished() {
        let mut engine = engine();
        let events = feed(&mut engine, r#"{"type":"session.finish"}"#);
        assert_eq!(events.last().unwrap()["type"], "session.finished");
    }

    #[test]
    fn invalid_base64_audio_reports_invalid_audio() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        let events = feed(
            &mut engine,
            r#"{"type":"input_audio_buffer.append","audio":"not valid base64!!"}"#,
        );
        assert_eq!(events[0]["error"]["code"], "invalid_audio");
    }

    #[test]
    fn malformed_pcm_length_reports_invalid_audio_format() {
        let mut engine = engine();
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );
        let odd_byte = base64::engine::general_purpose::STANDARD.encode([0u8; 3]);
        let events = feed(
            &mut engine,
            &format!(r#"{{"type":"input_audio_buffer.append","audio":"{odd_byte}"}}"#),
        );
        assert_eq!(events[0]["error"]["code"], "invalid_audio_format");
    }

    /// SPEC_FULL §8 scenario 5: with VAD disabled and a 2s auto-commit
    /// interval, a continuous 5s audio stream fed in 1s chunks produces two
    /// completed items before `session.finish`.
    #[test]
    fn auto_commit_fires_twice_over_five_seconds_of_continuous_audio() {
        let config = Config {
            auto_commit_interval_sec: 0.0, // elapsed() >= 0 is always true; each 1s chunk crosses it
            ..Config::default()
        };
        let mut engine = SessionEngine::new(&config, Arc::new(DeterministicBackend));
        feed(
            &mut engine,
            r#"{"type":"session.update","session":{"turn_detection":null}}"#,
        );

        let mut all = Vec::new();
        for _ in 0..5 {
            all.extend(feed(
                &mut engine,
                &format!(
                    r#"{{"type":"input_audio_buffer.append","audio":"{}"}}"#,
                    loud_b64(16_000)
                ),
            ));
        }
        all.extend(feed(&mut engine, r#"{"type":"session.finish"}"#));

        let completed_count = event_types(&all)
            .iter()
            .filter(|t| *t == "conversation.item.input_audio_transcription.completed")
            .count();
        assert!(completed_count >= 2, "expected at least two completed items, saw {completed_count}");

        let finish_idx = event_types(&all)
            .iter()
            .position(|t| t == "session.finished")
            .unwrap();
        let last_completed_idx = event_types(&all)
            .iter()
            .rposition(|t| t == "conversation.item.input_audio_transcription.completed")
            .unwrap();
        assert!(last_completed_idx < finish_idx);
    }
}
