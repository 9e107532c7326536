//! Generation step: one structured-output model call per visit.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use sketch_ai::{Context, Model, providers::OpenAIProvider};

use crate::error::Result;

/// One generation call's proposed output. Produced fresh per model
/// invocation and immutable afterwards; the wire field names are part of the
/// structured-output contract with the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Candidate {
    /// Import statements for the diagram code
    #[serde(rename = "import_code", deserialize_with = "null_to_empty")]
    pub import_fragment: String,
    /// Diagram structure statements
    #[serde(rename = "body_code", deserialize_with = "null_to_empty")]
    pub body_fragment: String,
    /// User-facing natural-language reply
    #[serde(rename = "ai_response", deserialize_with = "null_to_empty")]
    pub narrative: String,
}

impl Candidate {
    /// Whether both code fragments are present
    pub fn has_code(&self) -> bool {
        !self.import_fragment.trim().is_empty() && !self.body_fragment.trim().is_empty()
    }
}

/// Missing and null fields both become empty strings; an omitted field is
/// never a hard failure.
fn null_to_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON schema for the candidate, handed to the model as the
/// structured-output contract.
pub static CANDIDATE_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    serde_json::json!({
        "type": "object",
        "properties": {
            "import_code": {
                "type": "string",
                "description": "The import statements required for the diagram."
            },
            "body_code": {
                "type": "string",
                "description": "The code that defines the diagram structure."
            },
            "ai_response": {
                "type": "string",
                "description": "The natural-language reply for the user."
            }
        },
        "required": ["import_code", "body_code", "ai_response"],
        "additionalProperties": false
    })
});

const SYSTEM_TEMPLATE: &str = r#"You are a helpful assistant that generates Cloud Architecture Diagrams (AWS, GCP, Azure) based on user input.

Your responsibilities:
1. Answer user questions in a clear, concise, and friendly way.
2. Ask clarifying questions when requirements or preferences are ambiguous.
3. Generate the correct `import_code` and `body_code` (Python code using the diagrams library) strictly according to the user's input.
4. Revise and improve diagrams when the user provides feedback.
5. After successful diagram generation, confirm completion and provide a description of the architecture shown in the diagram.

Output format:
Always return exactly three fields:
- `import_code` -> contains only the necessary Python imports. No comments.
- `body_code` -> contains only the diagram structure code. No comments.
- `ai_response` -> a natural-language response for the user. Never reveal or describe code, imports, or implementation details.

Important constraints:
- Only generate `import_code` and `body_code` when the user explicitly requests diagram/image generation or an update.
- The `ai_response` must sound natural, e.g. "Here's the updated diagram based on your input."
- Never explain how the code works or how to run it.
- All code must only appear inside `import_code` and `body_code`.
- `import_code` must always begin with:
  `from diagrams import Diagram`
- `body_code` must always begin with:
  `with Diagram("Diagram name", show=False, filename=filename_value, outformat="png", graph_attr=graph_attr_value):`
  - Use the existing variable `filename_value` (do not redefine it).
  - Use the existing variable `graph_attr_value` (do not redefine it).
- If the user requests an adjustment or update, you may reuse and build upon the last provided `import_code` and `body_code` instead of starting from scratch.

Context:
This is the last working `import_code` (may be empty):
{import_code}

This is the last working `body_code` (may be empty):
{body_code}

Example of a good response:

import_code:
from diagrams import Diagram
from diagrams.aws.compute import EC2
from diagrams.aws.database import RDS
from diagrams.aws.network import ELB

body_code:
with Diagram("Diagram", show=False, filename=filename_value, outformat="png", graph_attr=graph_attr_value):
    ELB("lb") >> [EC2("worker1"),
                  EC2("worker2"),
                  EC2("worker3")] >> RDS("events")

ai_response:
"The diagram has been generated successfully. This AWS architecture uses an ELB to distribute traffic across EC2 instances, which connect to a central RDS database."
"#;

/// Render the system prompt, embedding the last known-good code pair as
/// continuation context so the model can patch rather than regenerate.
pub fn system_prompt(import_fragment: &str, body_fragment: &str) -> String {
    SYSTEM_TEMPLATE
        .replace("{import_code}", import_fragment)
        .replace("{body_code}", body_fragment)
}

/// Retry configuration for transient provider failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Generation step contract: invoked exactly once per visit to the
/// GENERATE state with the full conversation context.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &Context) -> Result<Candidate>;
}

/// Production generator backed by the OpenAI structured-output endpoint
pub struct ProviderGenerator {
    provider: Arc<OpenAIProvider>,
    model: Model,
    retry_config: RetryConfig,
    schema_validator: Option<jsonschema::Validator>,
}

impl ProviderGenerator {
    /// Create a generator for the given (shared) provider and chat model
    pub fn new(provider: Arc<OpenAIProvider>, model: Model) -> Self {
        let schema_validator = match jsonschema::validator_for(&CANDIDATE_SCHEMA) {
            Ok(validator) => Some(validator),
            Err(e) => {
                tracing::warn!("Invalid candidate schema, skipping validation: {}", e);
                None
            }
        };
        Self {
            provider,
            model,
            retry_config: RetryConfig::default(),
            schema_validator,
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    async fn complete_with_retry(&self, context: &Context) -> Result<serde_json::Value> {
        let mut attempt = 0u32;
        loop {
            match self
                .provider
                .complete_structured(&self.model, context, "diagram_candidate", &CANDIDATE_SCHEMA)
                .await
            {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < self.retry_config.max_retries && e.is_retryable() {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        tracing::warn!(
                            "Generation failed (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt + 1,
                            self.retry_config.max_retries + 1,
                            e,
                            delay
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl Generator for ProviderGenerator {
    async fn generate(&self, context: &Context) -> Result<Candidate> {
        let value = self.complete_with_retry(context).await?;

        // Schema drift is logged but tolerated: missing fields decay to
        // empty strings rather than failing the turn.
        if let Some(ref validator) = self.schema_validator {
            for error in validator.iter_errors(&value) {
                tracing::debug!("candidate deviates from schema: {}", error);
            }
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_become_empty_strings() {
        let candidate: Candidate = serde_json::from_value(serde_json::json!({
            "ai_response": "What cloud provider do you want?"
        }))
        .unwrap();
        assert!(candidate.import_fragment.is_empty());
        assert!(candidate.body_fragment.is_empty());
        assert!(!candidate.has_code());
    }

    #[test]
    fn test_null_fields_become_empty_strings() {
        let candidate: Candidate = serde_json::from_value(serde_json::json!({
            "import_code": null,
            "body_code": null,
            "ai_response": "Sure."
        }))
        .unwrap();
        assert!(candidate.import_fragment.is_empty());
        assert!(candidate.body_fragment.is_empty());
    }

    #[test]
    fn test_full_candidate_has_code() {
        let candidate: Candidate = serde_json::from_value(serde_json::json!({
            "import_code": "from diagrams import Diagram",
            "body_code": "with Diagram(...): pass",
            "ai_response": "Done."
        }))
        .unwrap();
        assert!(candidate.has_code());
        assert_eq!(candidate.narrative, "Done.");
    }

    #[test]
    fn test_whitespace_fragments_do_not_count_as_code() {
        let candidate = Candidate {
            import_fragment: "  \n".to_string(),
            body_fragment: "with Diagram(...): pass".to_string(),
            narrative: String::new(),
        };
        assert!(!candidate.has_code());
    }

    #[test]
    fn test_system_prompt_embeds_last_fragments() {
        let prompt = system_prompt("from diagrams import Diagram", "ELB(\"lb\")");
        assert!(prompt.contains("from diagrams import Diagram"));
        assert!(prompt.contains("ELB(\"lb\")"));
        assert!(!prompt.contains("{import_code}"));
        assert!(!prompt.contains("{body_code}"));
    }

    #[test]
    fn test_candidate_schema_compiles() {
        assert!(jsonschema::validator_for(&CANDIDATE_SCHEMA).is_ok());
    }

    #[test]
    fn test_retry_delay_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        // Capped at max_delay
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
    }
}
