//! Turn event types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Events emitted while the controller drives a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A user turn started
    TurnStart { thread_id: String },

    /// The generation step returned a candidate
    CandidateGenerated { attempt: u32, has_code: bool },

    /// A validation pass finished
    ValidationFinished { errors: Vec<String> },

    /// An execution attempt finished
    ExecutionFinished {
        error: Option<String>,
        image_location: Option<PathBuf>,
    },

    /// Documentation was retrieved for validation errors
    DocumentationFetched { lookups: usize },

    /// The turn reached its terminal state
    TurnEnd {
        narrative: String,
        image_location: Option<PathBuf>,
    },
}

impl TurnEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::TurnEnd { .. })
    }
}
