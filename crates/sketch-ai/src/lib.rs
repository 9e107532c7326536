//! sketch-ai: OpenAI-compatible model boundary
//!
//! This crate provides the chat-completion and embedding clients used by the
//! diagram agent, including structured (JSON-schema constrained) output.

pub mod error;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
