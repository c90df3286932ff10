//! Tokenization and token-level normalization of free text

use unicode_segmentation::UnicodeSegmentation;

/// English stop words, sorted for binary search
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between",
    "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during",
    "each", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her",
    "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "itself", "just", "me", "more", "most", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
    "ourselves", "out", "over", "own", "same", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Whether `token` is an English stop word; comparison ignores case
pub fn is_stop_word(token: &str) -> bool {
    if token.chars().any(char::is_uppercase) {
        STOP_WORDS.binary_search(&token.to_lowercase().as_str()).is_ok()
    } else {
        STOP_WORDS.binary_search(&token).is_ok()
    }
}

/// Splits text into normalized word tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    /// Lowercase the text before splitting
    pub lowercase: bool,
    /// Keep punctuation tokens and characters
    pub keep_punctuations: bool,
    /// Drop English stop words
    pub remove_stop_words: bool,
}

impl Tokenizer {
    /// Tokens of `text` in order of appearance
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        text.split_word_bounds()
            .filter(|segment| !segment.trim().is_empty())
            .filter_map(|segment| {
                if self.keep_punctuations {
                    Some(segment.to_string())
                } else {
                    let word: String = segment.chars().filter(|c| c.is_alphanumeric()).collect();
                    (!word.is_empty()).then_some(word)
                }
            })
            .filter(|token| !(self.remove_stop_words && is_stop_word(token)))
            .collect()
    }
}
