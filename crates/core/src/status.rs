//! Status and account types, mirroring the social network's data model.
//!
//! These are the wire shapes delivered by a Mastodon-compatible server,
//! trimmed to the fields the bot actually reads. Unknown fields are ignored
//! on deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access scope of a post, widest first.
///
/// The ordering matters: a reply must never be *wider* than the post it
/// answers (a direct message must not get a public reply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    /// Width rank, higher is more visible.
    fn rank(self) -> u8 {
        match self {
            Visibility::Public => 3,
            Visibility::Unlisted => 2,
            Visibility::Private => 1,
            Visibility::Direct => 0,
        }
    }

    /// True if `self` exposes a post to a strictly larger audience than `other`.
    pub fn is_wider_than(self, other: Visibility) -> bool {
        self.rank() > other.rank()
    }

    /// Narrow `self` so it never exceeds the visibility of `original`.
    pub fn clamp_to(self, original: Visibility) -> Visibility {
        if self.is_wider_than(original) { original } else { self }
    }

    /// The wire string the server expects.
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The author of a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Server-assigned account id
    pub id: String,

    /// Handle as addressed in mentions; includes the domain for remote
    /// accounts (e.g. `alice@example.social`)
    pub acct: String,

    /// Local username without domain
    #[serde(default)]
    pub username: String,

    /// Whether the account self-identifies as automated
    #[serde(default)]
    pub bot: bool,

    /// Profile display name, if set
    #[serde(default)]
    pub display_name: String,
}

/// A single user-authored post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Server-assigned status id
    pub id: String,

    /// The authoring account
    pub account: Account,

    /// Body as HTML, exactly as the server renders it
    #[serde(default)]
    pub content: String,

    /// Access scope of this post
    pub visibility: Visibility,

    /// Creation time reported by the server
    pub created_at: DateTime<Utc>,

    /// Present when this status is a boost of another status
    #[serde(default)]
    pub reblog: Option<Box<Status>>,

    /// Present when this status is itself a reply
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
}

impl Status {
    /// True when this status boosts another rather than saying anything new.
    pub fn is_reblog(&self) -> bool {
        self.reblog.is_some()
    }

    /// True when this status replies to another status.
    pub fn is_reply(&self) -> bool {
        self.in_reply_to_id.is_some()
    }
}
