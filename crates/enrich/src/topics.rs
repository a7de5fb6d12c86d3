use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;

/// Words dropped from topic extraction regardless of length.
pub const STOP_WORDS: &[&str] = &[
    "the", "be", "to", "of", "and", "a", "in", "that", "have", "i", "it", "for", "not", "on",
    "with", "he", "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "we", "say",
    "her", "she", "or", "an", "will", "my", "one", "all", "would", "there", "their", "reddit",
    "post", "comment", "thread", "just", "like", "want", "need", "got", "see", "know", "think",
    "way", "time", "people", "other", "same", "good", "bad", "great",
];

/// Tokens of this many bytes or fewer never become topics.
const MAX_SHORT_WORD: usize = 3;

static NON_LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z\s]").expect("valid topic regex"));

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Extract title-cased keyword topics from free text.
///
/// Duplicates collapse; the result keeps first-occurrence order.
pub fn extract_topics(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = NON_LETTERS.replace_all(&lowered, " ");

    let topics: IndexSet<String> = cleaned
        .split_whitespace()
        .filter(|word| word.len() > MAX_SHORT_WORD && !is_stop_word(word))
        .map(title_case)
        .collect();

    topics.into_iter().collect()
}
