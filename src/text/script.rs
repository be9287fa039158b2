//! Script detection for font-family substitution.
//!
//! Declared font stacks on text layers are Latin-first. When the actual
//! text content carries Korean or other CJK code points, a capable family
//! is prefixed so glyphs do not fall back to tofu, regardless of what the
//! layer declares.

/// Family prefixed for Korean text.
pub const KOREAN_FAMILY: &str = "Noto Sans KR";
/// Family prefixed for Japanese/Chinese text without Korean.
pub const JAPANESE_FAMILY: &str = "Noto Sans JP";

/// Whether `text` contains any Hangul code points.
pub fn contains_korean(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{AC00}'..='\u{D7AF}'   // Hangul syllables
            | '\u{1100}'..='\u{11FF}' // Hangul jamo
            | '\u{3130}'..='\u{318F}' // Hangul compatibility jamo
        )
    })
}

/// Whether `text` contains CJK punctuation, kana, fullwidth forms or
/// unified ideographs.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{3000}'..='\u{303F}'   // CJK symbols and punctuation
            | '\u{3040}'..='\u{309F}' // Hiragana
            | '\u{30A0}'..='\u{30FF}' // Katakana
            | '\u{FF00}'..='\u{FF9F}' // Fullwidth / halfwidth forms
            | '\u{4E00}'..='\u{9FAF}' // CJK unified ideographs
            | '\u{3400}'..='\u{4DBF}' // CJK extension A
        )
    })
}

/// Resolve the effective font stack for a piece of text.
///
/// Korean content selects the Korean-capable family, other CJK content the
/// Japanese-capable family; stacks that already name a Noto Sans family are
/// left alone, as is pure-Latin text.
pub fn resolve_font_stack(declared: &str, text: &str) -> String {
    let korean = contains_korean(text);
    let cjk = contains_cjk(text);
    if (korean || cjk) && !declared.contains("Noto Sans") {
        let family = if korean { KOREAN_FAMILY } else { JAPANESE_FAMILY };
        format!("{family}, {declared}")
    } else {
        declared.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_wins_over_cjk() {
        let stack = resolve_font_stack("Arial, sans-serif", "안녕하세요");
        assert!(stack.starts_with("Noto Sans KR"));
        // Mixed Korean + Japanese still selects Korean.
        let stack = resolve_font_stack("Arial, sans-serif", "こんにちは 안녕");
        assert!(stack.starts_with("Noto Sans KR"));
    }

    #[test]
    fn japanese_and_chinese_select_jp_family() {
        let stack = resolve_font_stack("Arial, sans-serif", "こんにちは");
        assert!(stack.starts_with("Noto Sans JP"));
        let stack = resolve_font_stack("Arial, sans-serif", "新鮮なコーヒー");
        assert!(stack.starts_with("Noto Sans JP"));
    }

    #[test]
    fn latin_text_keeps_declared_stack() {
        assert_eq!(
            resolve_font_stack("Arial, sans-serif", "Shop Now"),
            "Arial, sans-serif"
        );
    }

    #[test]
    fn existing_noto_stack_is_not_double_prefixed() {
        assert_eq!(
            resolve_font_stack("Noto Sans JP, Arial, sans-serif", "こんにちは"),
            "Noto Sans JP, Arial, sans-serif"
        );
    }

    #[test]
    fn detection_ranges() {
        assert!(contains_korean("한"));
        assert!(!contains_korean("漢"));
        assert!(contains_cjk("漢"));
        assert!(contains_cjk("ｶﾀｶﾅ"));
        assert!(!contains_cjk("latin only"));
    }
}
