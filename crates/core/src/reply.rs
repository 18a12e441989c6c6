//! Reply decisions and the Publisher trait, the posting side of the social
//! network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::status::{Account, Visibility};

/// The outcome of evaluating one stream event against the reply policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyDecision {
    /// Whether the bot should answer this event
    pub should_reply: bool,

    /// Cleaned plain text of the post, used to build the prompt.
    /// Empty when `should_reply` is false.
    pub extracted_context: String,

    /// Why the event was skipped, for logging. None when replying.
    pub skip_reason: Option<&'static str>,
}

impl ReplyDecision {
    /// Accept the event with the given prompt context.
    pub fn reply(context: impl Into<String>) -> Self {
        Self {
            should_reply: true,
            extracted_context: context.into(),
            skip_reason: None,
        }
    }

    /// Decline the event.
    pub fn skip(reason: &'static str) -> Self {
        Self {
            should_reply: false,
            extracted_context: String::new(),
            skip_reason: Some(reason),
        }
    }
}

/// A reply ready to be posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReply {
    /// The status this reply answers
    pub in_reply_to_id: String,

    /// Full body including any mention prefix, already truncated to the
    /// server's status length limit
    pub body: String,

    /// Access scope of the reply; must never be wider than the post it
    /// answers
    pub visibility: Visibility,
}

/// Server-assigned id of a successfully posted status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedId(pub String);

impl std::fmt::Display for PostedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The posting side of the social network.
///
/// Implementations handle authentication, rate-limit hints, and idempotent
/// submission. One logical reply maps to at most one published status.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Confirm the access token works and learn the bot's own account.
    /// Called once at startup; failure is fatal.
    async fn verify_credentials(&self) -> std::result::Result<Account, PublishError>;

    /// Post a reply and return the new status id.
    async fn post_reply(
        &self,
        reply: &OutboundReply,
    ) -> std::result::Result<PostedId, PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_constructors() {
        let accept = ReplyDecision::reply("feeling stressed");
        assert!(accept.should_reply);
        assert_eq!(accept.extracted_context, "feeling stressed");
        assert!(accept.skip_reason.is_none());

        let decline = ReplyDecision::skip("visibility");
        assert!(!decline.should_reply);
        assert!(decline.extracted_context.is_empty());
        assert_eq!(decline.skip_reason, Some("visibility"));
    }

    #[test]
    fn outbound_reply_serializes_visibility_lowercase() {
        let reply = OutboundReply {
            in_reply_to_id: "42".into(),
            body: "@alice hang in there".into(),
            visibility: Visibility::Unlisted,
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"unlisted\""));
    }
}
