use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold text for accent- and case-insensitive matching.
///
/// Decomposes to NFD and lowercases, then drops combining marks. Marks go
/// last because lowercasing can emit new ones (`İ` becomes `i` + U+0307).
/// `đ` has no decomposition, so it is mapped to `d` by hand.
pub fn fold(text: &str) -> String {
    text.nfd()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c == 'đ' { 'd' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_case() {
        assert_eq!(fold("Gia Đình"), "gia dinh");
        assert_eq!(fold("Tiếng Việt"), "tieng viet");
        assert_eq!(fold("CAFÉ"), "cafe");
    }

    #[test]
    fn plain_ascii_untouched_except_case() {
        assert_eq!(fold("Hello, World 42"), "hello, world 42");
    }

    #[test]
    fn dotted_capital_i_folds_to_plain_i() {
        assert_eq!(fold("İstanbul"), "istanbul");
    }

    #[test]
    fn precomposed_and_decomposed_fold_alike() {
        assert_eq!(fold("\u{1EC7}"), fold("e\u{0323}\u{0302}"));
    }
}
