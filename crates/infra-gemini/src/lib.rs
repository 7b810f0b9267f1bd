// Infographic Infrastructure - Gemini adapter
// Implements: ContentSynthesizer over the Gemini generateContent API

pub mod client;
pub mod prompts;
pub mod synthesizer;

pub use client::{GenerateClient, GenerateRequest, ReqwestGeminiClient};
pub use synthesizer::{GeminiConfig, GeminiSynthesizer};
