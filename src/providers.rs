//! Reasoning capability implementations.

pub mod openai;

pub use openai::OpenAIProvider;
