//! # mastomend Policy
//!
//! Decides whether the bot answers a stream event. Pure functions of the
//! event plus static configuration: no network, no clock, no side effects,
//! so every rule is unit-testable without a live server.

pub mod content;

pub use content::{clean_content, flatten_html, strip_social_tokens};

use mastomend_config::PolicyConfig;
use mastomend_core::{Account, NotificationKind, ReplyDecision, Status, StreamEvent};

/// The configured reply policy.
///
/// Built once at startup from [`PolicyConfig`] plus the bot's own identity,
/// then consulted for every incoming event.
#[derive(Debug, Clone)]
pub struct ReplyPolicy {
    config: PolicyConfig,
    bot_username: String,
    bot_account_id: Option<String>,
}

impl ReplyPolicy {
    pub fn new(config: PolicyConfig, bot_username: impl Into<String>) -> Self {
        Self {
            config,
            bot_username: bot_username.into(),
            bot_account_id: None,
        }
    }

    /// Attach the server-assigned account id learned from credential
    /// verification. Id matching is exact where handle matching is fuzzy.
    pub fn with_account_id(mut self, id: impl Into<String>) -> Self {
        self.bot_account_id = Some(id.into());
        self
    }

    /// Evaluate one stream event.
    pub fn evaluate(&self, event: &StreamEvent) -> ReplyDecision {
        let (status, via_mention) = match event {
            StreamEvent::Update(status) => (status, false),
            StreamEvent::Notification {
                kind: NotificationKind::Mention,
                status: Some(status),
                ..
            } if self.config.reply_to_mentions => (status, true),
            StreamEvent::Notification { .. } => return ReplyDecision::skip("notification"),
            StreamEvent::Delete { .. } => return ReplyDecision::skip("delete"),
        };

        if self.is_self(&status.account) {
            return ReplyDecision::skip("own account");
        }
        if self.config.skip_bot_accounts && status.account.bot {
            return ReplyDecision::skip("bot account");
        }
        if status.is_reblog() {
            return ReplyDecision::skip("reblog");
        }
        // Mentions are answered wherever they sit in a thread; timeline
        // posts that are replies stay out unless configured in
        if !via_mention && !self.config.include_replies && status.is_reply() {
            return ReplyDecision::skip("reply thread");
        }
        if !self.config.visibilities.contains(&status.visibility) {
            return ReplyDecision::skip("visibility");
        }

        // Markers match the flattened body so hashtag triggers still work;
        // the prompt context gets the fully stripped form
        let flattened = flatten_html(&status.content);
        let lowered = flattened.to_lowercase();
        if !self.config.require_any.is_empty()
            && !self
                .config
                .require_any
                .iter()
                .any(|marker| lowered.contains(&marker.to_lowercase()))
        {
            return ReplyDecision::skip("no required marker");
        }
        if self
            .config
            .deny
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
        {
            return ReplyDecision::skip("denied marker");
        }

        let text = strip_social_tokens(&flattened);
        if text.is_empty() {
            return ReplyDecision::skip("empty body");
        }

        ReplyDecision::reply(text)
    }

    fn is_self(&self, account: &Account) -> bool {
        if let Some(id) = &self.bot_account_id {
            if account.id == *id {
                return true;
            }
        }
        account.acct == self.bot_username
            || account.username == self.bot_username
            || account
                .acct
                .strip_prefix(&self.bot_username)
                .is_some_and(|rest| rest.starts_with('@'))
    }
}
