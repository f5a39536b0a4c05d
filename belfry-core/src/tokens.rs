//! Token extraction from player utterances.

use std::sync::LazyLock;

use regex::Regex;

/// Words that never carry a topic: articles, common verbs and pronouns, and
/// politeness filler.
pub const STOPWORDS: &[&str] = &[
    "the", "a", "an", "to", "of", "in", "on", "for", "and", "or", "but", "is", "are", "was",
    "were", "be", "do", "does", "about", "please", "tell", "me", "you", "your", "my", "this",
    "that", "these", "those", "with", "from", "at", "as", "it", "i",
];

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[a-z0-9_]+").unwrap()
});

/// Whether `word` (any case) is a stopword.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.iter().any(|s| s.eq_ignore_ascii_case(word))
}

/// Split an utterance into lowercase alphanumeric/underscore tokens of at
/// least two characters, dropping stopwords. Order is preserved and
/// duplicates are kept.
#[must_use]
pub fn extract_tokens(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.len() >= 2 && !is_stopword(w))
        .map(str::to_string)
        .collect()
}
