//! The turn controller: a small state machine that coordinates generation,
//! validation, execution, and documentation-assisted repair for one user
//! turn at a time.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sketch_ai::{Context, Message, Step};
use tokio::sync::broadcast;

use crate::{
    conversation::Conversation,
    error::Result,
    events::TurnEvent,
    execute::Executor,
    generate::{self, Generator},
    retrieve::Retriever,
    validate::Validator,
};

/// States of one turn. Transitions:
/// `GENERATE -> {END | VALIDATE}`, `VALIDATE -> {EXECUTE | DOCUMENT}`,
/// `EXECUTE -> {END | GENERATE}`, `DOCUMENT -> GENERATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Generate,
    Validate,
    Execute,
    Document,
    End,
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Maximum generation calls per user turn before the turn is forced to
    /// terminate with a failure narrative
    pub max_attempts: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// What one call to [`TurnController::invoke`] hands back to the host
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The user-facing reply (last assistant message of the turn)
    pub narrative: String,
    /// Rendered image path, present iff the most recent execution succeeded
    pub image_location: Option<PathBuf>,
    /// The fully assembled source of the most recent execution attempt
    pub resolved_code: Option<String>,
    /// The full message log of the thread after this turn
    pub messages: Vec<Message>,
}

/// Orchestrates one user turn to completion, owning per-thread conversation
/// state. The four collaborators are stateless services shared across
/// threads; all branching lives here.
pub struct TurnController {
    config: ControllerConfig,
    generator: Arc<dyn Generator>,
    validator: Arc<dyn Validator>,
    executor: Arc<dyn Executor>,
    retriever: Arc<dyn Retriever>,
    event_tx: broadcast::Sender<TurnEvent>,
    threads: HashMap<String, Conversation>,
}

impl TurnController {
    pub fn new(
        config: ControllerConfig,
        generator: Arc<dyn Generator>,
        validator: Arc<dyn Validator>,
        executor: Arc<dyn Executor>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            generator,
            validator,
            executor,
            retriever,
            event_tx,
            threads: HashMap::new(),
        }
    }

    /// Subscribe to turn events
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.event_tx.subscribe()
    }

    /// Get the conversation for a thread, if it exists
    pub fn conversation(&self, thread_id: &str) -> Option<&Conversation> {
        self.threads.get(thread_id)
    }

    /// Restore a thread's conversation (e.g., from a session checkpoint)
    pub fn restore(&mut self, thread_id: impl Into<String>, conversation: Conversation) {
        self.threads.insert(thread_id.into(), conversation);
    }

    /// Process one user message for the given thread, running the full
    /// state-machine loop (including retries) to completion. The sole entry
    /// point hosts call per user turn.
    pub async fn invoke(&mut self, message: &str, thread_id: &str) -> Result<TurnOutcome> {
        // Threads are isolated: state is taken out of the map for the
        // duration of the turn and put back afterwards, so no two steps
        // ever see the same conversation concurrently.
        let mut conversation = self.threads.remove(thread_id).unwrap_or_default();
        let result = self.run_turn(&mut conversation, message, thread_id).await;
        self.threads.insert(thread_id.to_string(), conversation);
        result
    }

    async fn run_turn(
        &self,
        conversation: &mut Conversation,
        message: &str,
        thread_id: &str,
    ) -> Result<TurnOutcome> {
        conversation.messages.push(Message::user(message));
        let _ = self.event_tx.send(TurnEvent::TurnStart {
            thread_id: thread_id.to_string(),
        });

        let mut state = TurnState::Generate;
        let mut attempts = 0u32;

        while state != TurnState::End {
            state = match state {
                TurnState::Generate => self.step_generate(conversation, &mut attempts).await?,
                TurnState::Validate => self.step_validate(conversation).await?,
                TurnState::Execute => self.step_execute(conversation).await,
                TurnState::Document => self.step_document(conversation).await,
                TurnState::End => TurnState::End,
            };
        }

        let narrative = conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role() == "assistant")
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        let _ = self.event_tx.send(TurnEvent::TurnEnd {
            narrative: narrative.clone(),
            image_location: conversation.image_location.clone(),
        });

        Ok(TurnOutcome {
            narrative,
            image_location: conversation.image_location.clone(),
            resolved_code: if conversation.resolved_code.is_empty() {
                None
            } else {
                Some(conversation.resolved_code.clone())
            },
            messages: conversation.messages.clone(),
        })
    }

    /// GENERATE: one model call per visit. A candidate with both fragments
    /// moves to VALIDATE; a narrative-only reply ends the turn. The attempt
    /// bound forces termination of repair loops.
    async fn step_generate(
        &self,
        conversation: &mut Conversation,
        attempts: &mut u32,
    ) -> Result<TurnState> {
        if *attempts >= self.config.max_attempts {
            tracing::warn!(attempts, "attempt budget exhausted, terminating turn");
            conversation.messages.push(Message::assistant(format!(
                "I wasn't able to produce a working diagram after {} attempts. \
                 The last code I tried is available for inspection.",
                attempts
            )));
            return Ok(TurnState::End);
        }
        *attempts += 1;

        let context = Context {
            system_prompt: Some(generate::system_prompt(
                &conversation.import_fragment,
                &conversation.body_fragment,
            )),
            messages: conversation.messages.clone(),
        };
        let candidate = self.generator.generate(&context).await?;

        conversation
            .messages
            .push(Message::assistant(candidate.narrative.clone()));
        let accepted = conversation.accept_candidate(&candidate);
        let _ = self.event_tx.send(TurnEvent::CandidateGenerated {
            attempt: *attempts,
            has_code: accepted,
        });

        if accepted {
            Ok(TurnState::Validate)
        } else {
            Ok(TurnState::End)
        }
    }

    /// VALIDATE: recompute the error list from scratch; clean imports move
    /// on to execution, anything else routes through documentation.
    async fn step_validate(&self, conversation: &mut Conversation) -> Result<TurnState> {
        debug_assert!(conversation.has_candidate());
        let validation = self.validator.validate(&conversation.import_fragment).await?;
        conversation.validation_errors = validation.errors;
        let _ = self.event_tx.send(TurnEvent::ValidationFinished {
            errors: conversation.validation_errors.clone(),
        });

        if conversation.validation_errors.is_empty() {
            Ok(TurnState::Execute)
        } else {
            Ok(TurnState::Document)
        }
    }

    /// EXECUTE: success ends the turn; failure feeds the error and the
    /// failing code back into the conversation and retries generation.
    async fn step_execute(&self, conversation: &mut Conversation) -> TurnState {
        debug_assert!(conversation.has_candidate());
        let execution = self
            .executor
            .execute(&conversation.import_fragment, &conversation.body_fragment)
            .await;

        conversation.resolved_code = execution.resolved_code;
        conversation.image_location = execution.image_location;
        let _ = self.event_tx.send(TurnEvent::ExecutionFinished {
            error: execution.error.clone(),
            image_location: conversation.image_location.clone(),
        });

        match execution.error {
            None => TurnState::End,
            Some(error) => {
                conversation.messages.push(Message::assistant_with_step(
                    Step::Execute,
                    format!(
                        "Error generating diagram: **{}**\nThis code produced the error:\n{}\nPlease fix the code.",
                        error, conversation.resolved_code
                    ),
                    vec![error],
                ));
                TurnState::Generate
            }
        }
    }

    /// DOCUMENT: one lookup per distinct validation error, in order; a
    /// failed lookup degrades to an empty snippet instead of aborting the
    /// turn. Always routes back to generation.
    async fn step_document(&self, conversation: &mut Conversation) -> TurnState {
        let mut distinct: Vec<&String> = Vec::new();
        for error in &conversation.validation_errors {
            if !distinct.contains(&error) {
                distinct.push(error);
            }
        }

        let mut snippets = Vec::with_capacity(distinct.len());
        for error in distinct {
            match self.retriever.lookup(error).await {
                Ok(snippet) => snippets.push(snippet),
                Err(e) => {
                    tracing::warn!("documentation lookup failed: {}", e);
                    snippets.push(String::new());
                }
            }
        }
        let _ = self.event_tx.send(TurnEvent::DocumentationFetched {
            lookups: snippets.len(),
        });

        conversation.messages.push(Message::assistant_with_step(
            Step::Document,
            format!(
                "Import errors encountered:\n{}\nHere are some relevant documentation entries that might help:\n{}",
                conversation.validation_errors.join("\n"),
                snippets.join("\n"),
            ),
            conversation.validation_errors.clone(),
        ));
        TurnState::Generate
    }
}
