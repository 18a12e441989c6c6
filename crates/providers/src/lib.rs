//! LLM completion backends for mastomend.
//!
//! All backends implement the `mastomend_core::Provider` trait.
//! [`GeminiProvider`] talks to Google's generateContent REST API;
//! [`RetryProvider`] wraps any backend with bounded retry so the
//! orchestrator only ever sees final outcomes.

pub mod gemini;
pub mod retry;

pub use gemini::GeminiProvider;
pub use retry::RetryProvider;
