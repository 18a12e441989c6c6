//! Plain-text extraction from server-rendered status HTML.
//!
//! Statuses arrive as sanitized HTML. Cleaning happens in two stages:
//! [`flatten_html`] decodes entities, drops tags, and collapses whitespace
//! (marker matching sees this form, hashtags and mentions intact), then
//! [`strip_social_tokens`] removes mentions and hashtags to leave the prose
//! the prompt is built from. Mentions have to be removed after tag
//! stripping: servers render them split across spans, and only the
//! flattened text makes `@user@domain` contiguous again.

use regex::Regex;
use std::sync::LazyLock;

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\w+(?:@[-.\w]+)?").expect("mention pattern compiles"));
static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\w+").expect("hashtag pattern compiles"));
static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:p|br|div|li|ul|ol|blockquote|h[1-6])\b[^>]*>")
        .expect("block tag pattern compiles")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern compiles"));

/// Reduce status HTML to plain text: entities decoded, tags dropped,
/// whitespace collapsed. Mentions and hashtags survive.
pub fn flatten_html(html: &str) -> String {
    let text = decode_entities(html);
    // Block tags become spaces so paragraphs don't glue together; inline
    // tags vanish so span-wrapped mentions stay contiguous
    let text = BLOCK_TAG_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, "");
    collapse_whitespace(&text)
}

/// Remove mentions and hashtags from already-flattened text; they confuse
/// the model more than they help it.
pub fn strip_social_tokens(text: &str) -> String {
    let text = MENTION_RE.replace_all(text, "");
    let text = HASHTAG_RE.replace_all(&text, "");
    collapse_whitespace(&text)
}

/// One-call form: flatten then strip, yielding prompt-ready prose.
///
/// Returns an empty string when nothing but markup, mentions, and hashtags
/// remained.
pub fn clean_content(html: &str) -> String {
    strip_social_tokens(&flatten_html(html))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the HTML entities a Mastodon-compatible server actually emits:
/// the named basics plus numeric references.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        // Entities are short; a distant semicolon means a bare ampersand
        let Some(semi) = rest[1..].find(';').map(|i| i + 1).filter(|&i| i <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => decode_numeric(entity),
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_numeric(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}
