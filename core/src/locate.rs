//! Occurrence locator: finds the n-th place a token appears after a given
//! fragment of preceding context.
//!
//! Matching is literal. Context and token are escaped before they are
//! compiled, and any run of whitespace (including none) may separate them.
//! After each match the search resumes one character past the start of the
//! matched token rather than after the whole match, so overlapping
//! candidates stay visible to later occurrences. When the same context and
//! token pair appears with different separating whitespace, each step takes
//! the leftmost viable match. This is a heuristic: it assumes the checker
//! reports repeated issues in document order.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Compiled matcher for one `(context, token)` pair.
#[derive(Debug, Clone)]
pub struct OccurrencePattern {
    regex: Option<Regex>,
}

impl OccurrencePattern {
    /// Pattern size cap; issue text is untrusted.
    const SIZE_LIMIT: usize = 1 << 20;

    pub fn new(token: &str, context: &str) -> Result<Self, regex::Error> {
        if token.is_empty() {
            return Ok(Self { regex: None });
        }
        let context = context.trim();
        let pattern = if context.is_empty() {
            format!("({})", regex::escape(token))
        } else {
            format!(r"{}\s*({})", regex::escape(context), regex::escape(token))
        };
        let regex = RegexBuilder::new(&pattern)
            .size_limit(Self::SIZE_LIMIT)
            .build()?;
        Ok(Self { regex: Some(regex) })
    }

    /// Byte offset where the token of the `n`-th match (1-based) starts.
    pub fn nth(&self, text: &str, n: usize) -> Option<usize> {
        let regex = self.regex.as_ref()?;
        let mut cursor = 0usize;
        for seen in 1..=n {
            let token = regex.captures_at(text, cursor)?.get(1)?;
            let start = token.start();
            if seen == n {
                return Some(start);
            }
            cursor = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }
}

/// Start offset of the `n`-th occurrence of `token` preceded by `context`.
pub fn locate(text: &str, token: &str, context: &str, n: usize) -> Option<usize> {
    match OccurrencePattern::new(token, context) {
        Ok(pattern) => pattern.nth(text, n),
        Err(err) => {
            debug!(token, context, "occurrence pattern rejected: {err}");
            None
        }
    }
}
