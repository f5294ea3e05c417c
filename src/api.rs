//! Wire-format adapters, one per vendor protocol.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
