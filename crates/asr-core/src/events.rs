//! Wire protocol — inbound event parsing and outbound event construction.
//!
//! Inbound frames are parsed once into a tagged [`InboundEvent`] so the
//! session engine can dispatch via an exhaustive `match` rather than a
//! name-keyed table. Outbound frames are built with small typed helpers but
//! serialized as plain JSON objects, mirroring the envelope shape used by
//! the compatible realtime API bit-for-bit.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::generate_event_id;

/// Client-declared VAD configuration carried in `session.update`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TurnDetectionConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_silence_ms")]
    pub silence_duration_ms: u32,
}

fn default_threshold() -> f32 {
    0.5
}

fn default_silence_ms() -> u32 {
    400
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InputAudioTranscriptionConfig {
    pub language: Option<String>,
}

/// Body of a `session.update` event's `session` object. All fields optional —
/// an absent field leaves the current session value unchanged.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfigUpdate {
    pub input_audio_format: Option<String>,
    pub sample_rate: Option<u32>,
    pub input_audio_transcription: Option<InputAudioTranscriptionConfig>,
    /// `null` disables VAD; omitted means "leave unchanged"; `Some(Some(_))`
    /// enables VAD with the given parameters.
    #[serde(default, deserialize_with = "deserialize_turn_detection")]
    pub turn_detection: Option<Option<TurnDetectionConfig>>,
}

fn deserialize_turn_detection<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<TurnDetectionConfig>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

/// A parsed inbound wire event, dispatched exhaustively by the session engine.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    SessionUpdate {
        event_id: Option<String>,
        session: SessionConfigUpdate,
    },
    InputAudioBufferAppend {
        event_id: Option<String>,
        audio: String,
    },
    InputAudioBufferCommit {
        event_id: Option<String>,
    },
    SessionFinish {
        event_id: Option<String>,
    },
}

/// A raw frame's `type` did not match any recognised inbound event.
#[derive(Debug, Clone)]
pub struct UnknownEventType(pub String);

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    event_id: Option<String>,
    #[serde(default)]
    session: Value,
    #[serde(default)]
    audio: Value,
}

/// Parse one inbound JSON text frame.
///
/// Returns `Err(UnknownEventType)` for a well-formed object with an
/// unrecognised `type` (caller turns this into an `invalid_event` error
/// frame, per spec — the connection is never closed for this).
pub fn parse_inbound(
    text: &str,
) -> std::result::Result<std::result::Result<InboundEvent, UnknownEventType>, serde_json::Error> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let event = match raw.kind.as_str() {
        "session.update" => {
            let session = if raw.session.is_null() {
                SessionConfigUpdate::default()
            } else {
                serde_json::from_value(raw.session)?
            };
            InboundEvent::SessionUpdate {
                event_id: raw.event_id,
                session,
            }
        }
        "input_audio_buffer.append" => InboundEvent::InputAudioBufferAppend {
            event_id: raw.event_id,
            audio: raw.audio.as_str().unwrap_or("").to_string(),
        },
        "input_audio_buffer.commit" => InboundEvent::InputAudioBufferCommit {
            event_id: raw.event_id,
        },
        "session.finish" => InboundEvent::SessionFinish {
            event_id: raw.event_id,
        },
        other => return Ok(Err(UnknownEventType(other.to_string()))),
    };
    Ok(Ok(event))
}

/// Server-reported turn-detection block echoed in `session.created`/`updated`.
#[derive(Debug, Clone, Serialize)]
pub struct TurnDetectionWire {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub threshold: f32,
    pub silence_duration_ms: u32,
}

impl TurnDetectionWire {
    pub fn new(threshold: f32, silence_duration_ms: u32) -> Self {
        Self {
            kind: "server_vad",
            threshold,
            silence_duration_ms,
        }
    }
}

fn envelope(event_type: &str, mut body: Value) -> Value {
    let obj = body.as_object_mut().expect("event body must be an object");
    obj.insert("event_id".into(), json!(generate_event_id()));
    obj.insert("type".into(), json!(event_type));
    body
}

pub fn session_created(
    session_id: &str,
    model: &str,
    input_audio_format: &str,
    turn_detection: Option<&TurnDetectionWire>,
) -> Value {
    session_event("session.created", session_id, model, input_audio_format, turn_detection)
}

pub fn session_updated(
    session_id: &str,
    model: &str,
    input_audio_format: &str,
    turn_detection: Option<&TurnDetectionWire>,
) -> Value {
    session_event("session.updated", session_id, model, input_audio_format, turn_detection)
}

fn session_event(
    event_type: &str,
    session_id: &str,
    model: &str,
    input_audio_format: &str,
    turn_detection: Option<&TurnDetectionWire>,
) -> Value {
    envelope(
        event_type,
        json!({
            "session": {
                "id": session_id,
                "object": "realtime.session",
                "model": model,
                "modalities": ["text"],
                "input_audio_format": input_audio_format,
                "input_audio_transcription": Value::Null,
                "turn_detection": turn_detection,
            }
        }),
    )
}

pub fn speech_started(audio_start_ms: u64, item_id: &str) -> Value {
    envelope(
        "input_audio_buffer.speech_started",
        json!({ "audio_start_ms": audio_start_ms, "item_id": item_id }),
    )
}

pub fn speech_stopped(audio_end_ms: u64, item_id: &str) -> Value {
    envelope(
        "input_audio_buffer.speech_stopped",
        json!({ "audio_end_ms": audio_end_ms, "item_id": item_id }),
    )
}

pub fn input_audio_buffer_committed(previous_item_id: &str, item_id: &str) -> Value {
    envelope(
        "input_audio_buffer.committed",
        json!({ "previous_item_id": previous_item_id, "item_id": item_id }),
    )
}

pub fn conversation_item_created(previous_item_id: &str, item_id: &str) -> Value {
    envelope(
        "conversation.item.created",
        json!({
            "previous_item_id": previous_item_id,
            "item": {
                "id": item_id,
                "object": "realtime.item",
                "type": "message",
                "status": "completed",
                "role": "user",
                "content": [{ "type": "input_audio", "transcript": Value::Null }],
            }
        }),
    )
}

pub fn transcription_text(
    item_id: &str,
    language: &str,
    emotion: &str,
    text: &str,
    stash: &str,
) -> Value {
    envelope(
        "conversation.item.input_audio_transcription.text",
        json!({
            "item_id": item_id,
            "content_index": 0,
            "language": language,
            "emotion": emotion,
            "text": text,
            "stash": stash,
        }),
    )
}

pub fn transcription_completed(
    item_id: &str,
    language: &str,
    emotion: &str,
    transcript: &str,
) -> Value {
    envelope(
        "conversation.item.input_audio_transcription.completed",
        json!({
            "item_id": item_id,
            "content_index": 0,
            "language": language,
            "emotion": emotion,
            "transcript": transcript,
        }),
    )
}

pub fn error_event(
    error_type: &str,
    code: &str,
    message: &str,
    param: Option<&str>,
    source_event_id: Option<&str>,
) -> Value {
    let mut error = json!({ "type": error_type, "code": code, "message": message });
    if let Some(p) = param {
        error["param"] = json!(p);
    }
    if let Some(id) = source_event_id {
        error["event_id"] = json!(id);
    }
    envelope("error", json!({ "error": error }))
}

pub fn session_finished() -> Value {
    envelope("session.finished", json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_update() {
        let text = r#"{"type":"session.update","event_id":"e1","session":{"turn_detection":null,"input_audio_transcription":{"language":"zh"}}}"#;
        let parsed = parse_inbound(text).unwrap().unwrap();
        match parsed {
            InboundEvent::SessionUpdate { event_id, session } => {
                assert_eq!(event_id.as_deref(), Some("e1"));
                assert_eq!(session.turn_detection, Some(None));
                assert_eq!(
                    session.input_audio_transcription.unwrap().language.as_deref(),
                    Some("zh")
                );
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_session_update_with_vad() {
        let text = r#"{"type":"session.update","session":{"turn_detection":{"threshold":0.3,"silence_duration_ms":500}}}"#;
        let parsed = parse_inbound(text).unwrap().unwrap();
        match parsed {
            InboundEvent::SessionUpdate { session, .. } => {
                let td = session.turn_detection.unwrap().unwrap();
                assert_eq!(td.threshold, 0.3);
                assert_eq!(td.silence_duration_ms, 500);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_reported_not_errored() {
        let text = r#"{"type":"invalid.event.type"}"#;
        let result = parse_inbound(text).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn envelope_has_event_id_and_type() {
        let ev = session_finished();
        assert_eq!(ev["type"], "session.finished");
        assert!(ev["event_id"].as_str().unwrap().starts_with("event_"));
    }

    #[test]
    fn error_event_omits_absent_fields() {
        let ev = error_event("invalid_request_error", "invalid_event", "boom", None, None);
        assert!(ev["error"].get("param").is_none());
        assert!(ev["error"].get("event_id").is_none());
    }
}
