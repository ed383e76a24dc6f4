//! # ai-adapters
//!
//! Model providers behind the `PromptGenerator` and `ImageGenerator` ports.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiClient, OpenAiConfig};
