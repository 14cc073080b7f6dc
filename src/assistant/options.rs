//! Quick-action options embedded in assistant replies.
//!
//! Replies may end with `[OPTIONS: a | b | c]`. The tag is stripped from
//! the text shown in the transcript and the entries become buttons.

use regex::Regex;
use std::sync::LazyLock;

static OPTIONS_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`?\[OPTIONS:\s*([^\]]*)\]`?").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub text: String,
    pub options: Vec<String>,
}

/// Split a raw reply into display text and options. Only the last tag
/// counts; every tag is removed from the text.
pub fn split_options(reply: &str) -> ParsedReply {
    let options = OPTIONS_TAG
        .captures_iter(reply)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|list| {
            list.as_str()
                .split('|')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let text = OPTIONS_TAG.replace_all(reply, "").trim().to_string();
    ParsedReply { text, options }
}
