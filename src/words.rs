//! Word list tokenization
//!
//! Turns raw pasted or scanned text into a clean, ordered word list:
//! split on whitespace and list punctuation, strip stray punctuation from
//! word edges, drop empties and duplicates.

/// Tokenize raw text into a deduplicated word list
///
/// Order of first appearance is preserved. Edge trimming is alphanumeric
/// based, so CJK characters survive while quotes, commas and OCR noise do
/// not. Interior punctuation (apostrophes, hyphens) is kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for token in text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '、' | '，' | '；')) {
        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        if word.is_empty() {
            continue;
        }
        if seen.insert(word.to_string()) {
            words.push(word.to_string());
        }
    }

    words
}
