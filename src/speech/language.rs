//! Script-based language detection for utterances
//!
//! Dictation sessions mix English and Chinese word lists, and the synthesis
//! voice has to match the script. Detection is deliberately script-based
//! only: romanized transliteration (pinyin) is indistinguishable from plain
//! English words and is not guessed at.

/// Language tag for English text
pub const ENGLISH: &str = "en-US";

/// Language tag for Chinese text
pub const CHINESE: &str = "zh-CN";

/// CJK ideograph ranges that classify text as Chinese
///
/// Unified Ideographs plus the extension and compatibility blocks.
const CJK_RANGES: &[(u32, u32)] = &[
    (0x4E00, 0x9FFF),   // CJK Unified Ideographs
    (0x3400, 0x4DBF),   // Extension A
    (0x20000, 0x2A6DF), // Extension B
    (0xF900, 0xFAFF),   // Compatibility Ideographs
    (0x2F800, 0x2FA1F), // Compatibility Ideographs Supplement
];

/// Classify text into a speech language tag
///
/// Any CJK ideograph anywhere in the text classifies it as Chinese;
/// everything else defaults to English.
pub fn detect(text: &str) -> &'static str {
    if text.chars().any(is_cjk) {
        CHINESE
    } else {
        ENGLISH
    }
}

fn is_cjk(ch: char) -> bool {
    let code = ch as u32;
    CJK_RANGES
        .iter()
        .any(|&(start, end)| code >= start && code <= end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_default() {
        assert_eq!(detect("apple"), ENGLISH);
        assert_eq!(detect("hello world"), ENGLISH);
        assert_eq!(detect(""), ENGLISH);
    }

    #[test]
    fn test_chinese_ideographs() {
        assert_eq!(detect("苹果"), CHINESE);
        assert_eq!(detect("学习"), CHINESE);
    }

    #[test]
    fn test_mixed_text_is_chinese() {
        // One ideograph is enough
        assert_eq!(detect("apple 苹果"), CHINESE);
    }

    #[test]
    fn test_pinyin_is_not_chinese() {
        // Romanized transliteration is spoken as English
        assert_eq!(detect("pingguo"), ENGLISH);
        assert_eq!(detect("xuexi"), ENGLISH);
    }

    #[test]
    fn test_accents_and_emoji_stay_english() {
        assert_eq!(detect("café naïve"), ENGLISH);
        assert_eq!(detect("spell 🐝"), ENGLISH);
    }
}
