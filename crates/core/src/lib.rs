//! # mastomend Core
//!
//! Domain types, traits, and error definitions for the mastomend reply bot.
//! This crate has **zero framework dependencies**. It defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the social
//! network's event stream ([`Timeline`]), its posting API ([`Publisher`]),
//! and the LLM completion API ([`Provider`]). Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod completion;
pub mod error;
pub mod event;
pub mod reply;
pub mod status;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use completion::{Completion, CompletionRequest, Provider};
pub use error::{CompletionError, Error, PublishError, Result, StreamError};
pub use event::{BotEvent, EventBus};
pub use reply::{OutboundReply, PostedId, Publisher, ReplyDecision};
pub use status::{Account, Status, Visibility};
pub use stream::{NotificationKind, StreamEvent, Timeline};
