//! Turn-taking diagram agent: a state machine that drives an LLM through
//! generate, validate, execute, and documentation-retrieval steps until a
//! user request either renders as a diagram image or ends conversationally.

pub mod catalog;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod events;
pub mod execute;
pub mod generate;
pub mod retrieve;
pub mod validate;

pub use controller::{ControllerConfig, TurnController, TurnOutcome, TurnState};
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use events::TurnEvent;
pub use execute::{Execution, Executor, PythonExecutor};
pub use generate::{Candidate, Generator, ProviderGenerator, RetryConfig};
pub use retrieve::{QdrantRetriever, Retriever};
pub use validate::{PythonValidator, Validation, Validator};
