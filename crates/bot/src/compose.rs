//! Prompt and reply-body composition.

use mastomend_config::{LlmConfig, ReplyConfig};
use mastomend_core::{CompletionRequest, OutboundReply, Status, Visibility};

/// Builds the completion request for one post. The persona rides in
/// the system instruction; the prompt carries only the cleaned post.
pub fn build_request(llm: &LlmConfig, system_prompt: &str, context: &str) -> CompletionRequest {
    CompletionRequest {
        model: llm.model.clone(),
        prompt: format!("User post: \"{context}\""),
        system: Some(system_prompt.to_string()),
        temperature: llm.temperature,
        max_output_tokens: llm.max_output_tokens,
    }
}

/// Turns generated text into a postable reply to `status`.
pub fn compose_reply(status: &Status, generated: &str, config: &ReplyConfig) -> OutboundReply {
    let text = generated.trim();
    let body = if config.mention_author {
        format!("@{} {}", status.account.acct, text)
    } else {
        text.to_string()
    };

    OutboundReply {
        in_reply_to_id: status.id.clone(),
        body: truncate_chars(&body, config.max_chars),
        visibility: reply_visibility(status.visibility),
    }
}

/// A reply asks for the widest scope and lets the original clamp it,
/// which makes the reply mirror the visibility of the post it answers.
fn reply_visibility(original: Visibility) -> Visibility {
    Visibility::Public.clamp_to(original)
}

/// Cuts `text` to at most `max_chars` characters, ellipsis included.
/// Counts characters, not bytes, so multibyte content cannot split.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    while cut.ends_with(' ') {
        cut.pop();
    }
    cut.push_str("...");
    cut
}
