//! Session and utterance-item data model (spec §3).

use serde::{Deserialize, Serialize};

/// One logical "turn" of speech — opened implicitly and closed on commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtteranceItem {
    pub item_id: String,
    pub previous_item_id: String,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Open,
    Committed,
}

/// Effective VAD configuration for a session, as decided by the most recent
/// `session.update`.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub silence_duration_ms: u32,
}

impl VadConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: 0.5,
            silence_duration_ms: 400,
        }
    }
}

/// Session lifecycle state (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConfig,
    Idle,
    ItemOpen,
    Finishing,
    Finished,
}
