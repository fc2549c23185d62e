pub mod client;
mod dto;
pub mod fallback;

pub use client::{AiError, GeminiClient, GenerateRequest, GenerativeClient, InlineImage};
pub use fallback::{generate_with_fallback, Generated};
