//! mastomend reply orchestration.
//!
//! Wires a [`mastomend_core::Timeline`], a [`mastomend_core::Provider`],
//! and a [`mastomend_core::Publisher`] into the reply loop: events come
//! in, the policy decides, the model answers, the reply goes out. All
//! three sides are trait objects, so the whole loop runs against
//! scripted fakes in tests.

pub mod compose;
pub mod dedup;
pub mod orchestrator;

pub use dedup::RepliedCache;
pub use orchestrator::{BotState, Orchestrator, SessionStats};
