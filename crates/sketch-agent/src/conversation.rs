//! Per-thread conversation state threaded through the turn controller.

use std::path::PathBuf;

use sketch_ai::Message;

use crate::generate::Candidate;

/// Conversation state for one thread: the message log, the last candidate
/// code pair, and the outcome of the most recent validation/execution pass.
///
/// Mutated only by the turn controller; never shared across thread ids.
#[derive(Debug, Default)]
pub struct Conversation {
    /// Ordered message log, append-only within a turn
    pub messages: Vec<Message>,
    /// Last known-good or candidate import statements
    pub import_fragment: String,
    /// Last known-good or candidate diagram-body statements
    pub body_fragment: String,
    /// Fully assembled source from the most recent execution attempt
    pub resolved_code: String,
    /// Rendered image path; set only while the most recent execution succeeded
    pub image_location: Option<PathBuf>,
    /// Errors from the most recent validation pass, replaced wholesale each pass
    pub validation_errors: Vec<String>,
}

impl Conversation {
    /// Whether a full candidate code pair is present. The fragments are
    /// either both empty or both non-empty; the controller never acts on a
    /// half-formed pair.
    pub fn has_candidate(&self) -> bool {
        !self.import_fragment.is_empty() && !self.body_fragment.is_empty()
    }

    /// Accept a candidate's code pair into state. Candidates missing either
    /// fragment are discarded (narrative-only replies), leaving the previous
    /// pair untouched. Returns whether the candidate was accepted.
    pub fn accept_candidate(&mut self, candidate: &Candidate) -> bool {
        if !candidate.has_code() {
            return false;
        }
        self.import_fragment = candidate.import_fragment.clone();
        self.body_fragment = candidate.body_fragment.clone();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_formed_candidate_is_discarded() {
        let mut conversation = Conversation::default();
        let accepted = conversation.accept_candidate(&Candidate {
            import_fragment: "from diagrams import Diagram".to_string(),
            body_fragment: String::new(),
            narrative: "What should the diagram show?".to_string(),
        });
        assert!(!accepted);
        assert!(!conversation.has_candidate());
        assert!(conversation.import_fragment.is_empty());
    }

    #[test]
    fn test_full_candidate_replaces_previous_pair() {
        let mut conversation = Conversation {
            import_fragment: "old imports".to_string(),
            body_fragment: "old body".to_string(),
            ..Default::default()
        };
        let accepted = conversation.accept_candidate(&Candidate {
            import_fragment: "new imports".to_string(),
            body_fragment: "new body".to_string(),
            narrative: "Updated.".to_string(),
        });
        assert!(accepted);
        assert!(conversation.has_candidate());
        assert_eq!(conversation.import_fragment, "new imports");
        assert_eq!(conversation.body_fragment, "new body");
    }
}
