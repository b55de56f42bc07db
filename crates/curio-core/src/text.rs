//! Text utilities: word counting, URL extraction, extracted-page cleanup.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(https?://[^\s]+|www\.[^\s]+)").expect("URL regex is valid")
});

static NON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("non-word regex is valid"));

static ALNUM_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("token regex is valid"));

static STRAY_SYMBOL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^\w\s一-鿿.,;:!?，。；：！？、（）()"'\-\[\]／/]"#)
        .expect("symbol regex is valid")
});

static DOT_LEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.{3,}").expect("dot leader regex is valid"));

static BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("blank line regex is valid"));

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("space regex is valid"));

static NUMERIC_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s.\-+%]+$").expect("numeric line regex is valid"));

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word regex is valid"));

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("number regex is valid"));

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Count words: one per CJK character plus one per ASCII alphanumeric token.
///
/// Punctuation splits tokens; a token mixing letters with CJK characters or
/// underscores is not an alphanumeric token.
pub fn count_words(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let spaced = NON_WORD_RE.replace_all(text, " ");
    let alnum = spaced
        .split_whitespace()
        .filter(|w| ALNUM_TOKEN_RE.is_match(w))
        .count();
    let cjk = text.chars().filter(|c| is_cjk(*c)).count();
    alnum + cjk
}

/// All URLs in `text`, in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `text` with every URL removed.
pub fn remove_urls(text: &str) -> String {
    URL_RE.replace_all(text, "").into_owned()
}

/// Whether `text` contains at least one URL and nothing else but whitespace.
pub fn is_pure_urls(text: &str) -> bool {
    if text.trim().is_empty() || !URL_RE.is_match(text) {
        return false;
    }
    remove_urls(text).trim().is_empty()
}

/// Truncate to at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Clean text extracted from one document page.
///
/// Strips stray symbols, collapses dot leaders and whitespace, then drops
/// lines that are numeric-only, have three words or fewer, or look like
/// table rows (more than two numbers).
pub fn clean_page_text(raw: &str) -> String {
    let text = STRAY_SYMBOL_RE.replace_all(raw, "");
    let text = DOT_LEADER_RE.replace_all(&text, " ... ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n");
    let text = SPACES_RE.replace_all(&text, " ");

    text.trim()
        .lines()
        .filter(|line| {
            let line = line.trim();
            !line.is_empty()
                && !NUMERIC_LINE_RE.is_match(line)
                && WORD_RE.find_iter(line).count() > 3
                && NUMBER_RE.find_iter(line).count() <= 2
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_words_english() {
        assert_eq!(count_words("quarterly revenue report"), 3);
        assert_eq!(count_words("hello, world! 2024"), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn test_count_words_cjk_counts_each_character() {
        assert_eq!(count_words("營收報告"), 4);
        assert_eq!(count_words("營收 report"), 3);
    }

    #[test]
    fn test_count_words_mixed_token() {
        // "abc營收" is one \w token that is not pure ASCII
        assert_eq!(count_words("abc營收"), 2);
        assert_eq!(count_words("snake_case word"), 1);
    }

    #[test]
    fn test_extract_urls() {
        let urls = extract_urls("see https://a.example/x and www.b.example, ok");
        assert_eq!(urls, vec!["https://a.example/x", "www.b.example,"]);
        assert!(extract_urls("no links here").is_empty());
    }

    #[test]
    fn test_extract_urls_case_insensitive() {
        assert_eq!(extract_urls("HTTPS://A.EXAMPLE"), vec!["HTTPS://A.EXAMPLE"]);
    }

    #[test]
    fn test_is_pure_urls() {
        assert!(is_pure_urls("https://a.example https://b.example"));
        assert!(is_pure_urls("  https://a.example\n\twww.b.example  "));
        assert!(!is_pure_urls("look https://a.example"));
        assert!(!is_pure_urls("   "));
        assert!(!is_pure_urls("plain text"));
    }

    #[test]
    fn test_remove_urls() {
        assert_eq!(remove_urls("a https://x.example b"), "a  b");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("營收報告", 2), "營收");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_clean_page_text_drops_noise_lines() {
        let raw = "Annual report for the company\n\n\n12 34 56\nIntro\nChapter one .......... 4\nRevenue grew strongly this year";
        let cleaned = clean_page_text(raw);
        assert_eq!(
            cleaned,
            "Annual report for the company\nRevenue grew strongly this year"
        );
    }
}
