//! LLM integration for qa-forge.
//!
//! The worker only needs one operation from a model: a single non-streaming
//! chat completion. [`LlmProvider`] is the seam; [`LiteLlmClient`] talks to
//! any OpenAI-compatible endpoint (LiteLLM, OpenRouter, a vendor API).
//!
//! ```ignore
//! use qa_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("gpt-4", vec![Message::user("Hello")])
//!     .with_temperature(0.01);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
