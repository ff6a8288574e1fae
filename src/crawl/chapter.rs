//! Chapter ordering and content cleanup.
//!
//! Vendors list chapters with numeral-bearing titles ("第四百二十一章",
//! "肆佰貳拾壹上") in an order that is not reliable across pages. The index
//! derived here is a best-effort ordering hint for the archive writer, not a
//! unique key: duplicate and sentinel indices are expected and tolerated.

use std::sync::LazyLock;

use regex::Regex;

use super::ending::DEFAULT_END_KEYWORDS;

/// Sort-last index assigned to end matter and titles without numerals.
pub const TAIL_INDEX: u64 = 9_999_990;

/// One fetched chapter, alive only between fetch and archive write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Ordering key derived from the title.
    pub index: u64,
    /// Absolute URL the content was fetched from.
    pub url: String,
    /// Chapter title as listed.
    pub title: String,
    /// Cleaned body text, or the failure sentinel.
    pub content: String,
}

impl Chapter {
    /// Creates a chapter, deriving its ordering index from the title.
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            index: chapter_index(&title),
            url: url.into(),
            title,
            content: content.into(),
        }
    }
}

/// Derives the ordering index for a chapter title.
///
/// Chinese numerals (simplified and traditional) are mapped to digits and
/// positional fillers are stripped, so "四百二十一" normalizes to "421". The
/// first digit run is parsed and multiplied by 10; a trailing 上/中/下 part
/// marker adds +2/+5/+8 so split chapters sharing a numeral keep a stable
/// sub-order. End matter and titles with no extractable numeral get
/// [`TAIL_INDEX`] so they sort last.
#[must_use]
pub fn chapter_index(title: &str) -> u64 {
    if DEFAULT_END_KEYWORDS
        .iter()
        .any(|keyword| title.contains(keyword))
    {
        return TAIL_INDEX;
    }

    let normalized = normalize_numerals(title);
    let Some(digits) = first_digit_run(&normalized) else {
        return TAIL_INDEX;
    };
    let Ok(value) = digits.parse::<u64>() else {
        return TAIL_INDEX;
    };

    let base = value.saturating_mul(10);
    match normalized.chars().last() {
        Some('上') => base.saturating_add(2),
        Some('中') => base.saturating_add(5),
        Some('下') => base.saturating_add(8),
        _ => base,
    }
}

/// Maps numeral characters to ASCII digits and drops positional fillers.
fn normalize_numerals(title: &str) -> String {
    let mut normalized = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '零' | '〇' => normalized.push('0'),
            '一' | '壹' => normalized.push('1'),
            '二' | '贰' | '貳' => normalized.push('2'),
            '三' | '参' | '參' | '叁' => normalized.push('3'),
            '四' | '肆' => normalized.push('4'),
            '五' | '伍' => normalized.push('5'),
            '六' | '陆' | '陸' => normalized.push('6'),
            '七' | '柒' => normalized.push('7'),
            '八' | '捌' => normalized.push('8'),
            '九' | '玖' => normalized.push('9'),
            '十' | '拾' | '百' | '佰' | '千' | '仟' | '(' | ')' | '（' | '）' | ' ' | '　' => {}
            _ => normalized.push(c),
        }
    }
    normalized
}

/// First maximal run of ASCII digits, if any.
fn first_digit_run(normalized: &str) -> Option<&str> {
    let start = normalized.find(|c: char| c.is_ascii_digit())?;
    let rest = &normalized[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Line-break markup: `<br>` variants and paragraph tags.
#[allow(clippy::expect_used)]
static MARKUP_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?p>|<p\s[^>]*>").expect("markup break regex is valid") // Static pattern, safe to panic
});

/// Inline emphasis tags carried over from vendor markup.
#[allow(clippy::expect_used)]
static BOLD_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:b|strong)>").expect("bold tag regex is valid") // Static pattern, safe to panic
});

/// Runs of literal spaces used by vendors as paragraph indentation.
#[allow(clippy::expect_used)]
static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {4,}").expect("space run regex is valid")); // Static pattern, safe to panic

/// Strips vendor HTML leftovers from a chapter body.
///
/// This is lossy cleanup of a known tag list, not HTML parsing: break and
/// paragraph tags become newlines, emphasis tags disappear, `&nbsp;` becomes
/// a space, and long space runs become newlines. Malformed or truncated
/// markup passes through as text.
#[must_use]
pub fn clean_content(raw: &str) -> String {
    let text = MARKUP_BREAKS.replace_all(raw, "\n");
    let text = BOLD_TAGS.replace_all(&text, "");
    let text = text.replace("&nbsp;", " ");
    let text = SPACE_RUNS.replace_all(&text, "\n");
    text.trim().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Chapter Index Tests ====================

    #[test]
    fn test_index_simplified_numerals() {
        assert_eq!(chapter_index("四百二十一"), 4210);
    }

    #[test]
    fn test_index_traditional_numerals_with_part_marker() {
        assert_eq!(chapter_index("肆佰貳拾壹上"), 4212);
    }

    #[test]
    fn test_index_part_markers() {
        assert_eq!(chapter_index("第三章上"), 32);
        assert_eq!(chapter_index("第三章中"), 35);
        assert_eq!(chapter_index("第三章（下）"), 38);
    }

    #[test]
    fn test_index_ascii_digits() {
        assert_eq!(chapter_index("第12章 风起"), 120);
    }

    #[test]
    fn test_index_zero_numerals() {
        assert_eq!(chapter_index("第一零二章"), 1020);
        assert_eq!(chapter_index("第二〇三章"), 2030);
    }

    #[test]
    fn test_index_uses_first_digit_run() {
        assert_eq!(chapter_index("第一百二十章 第2节"), 120);
    }

    #[test]
    fn test_index_no_numeral_sorts_last() {
        assert_eq!(chapter_index("楔子"), TAIL_INDEX);
        assert_eq!(chapter_index(""), TAIL_INDEX);
    }

    #[test]
    fn test_index_end_matter_sorts_last_even_with_numerals() {
        assert_eq!(chapter_index("番外一"), TAIL_INDEX);
        assert_eq!(chapter_index("后记"), TAIL_INDEX);
    }

    #[test]
    fn test_index_overlong_digit_run_sorts_last() {
        assert_eq!(chapter_index("99999999999999999999章"), TAIL_INDEX);
    }

    #[test]
    fn test_chapter_new_derives_index() {
        let chapter = Chapter::new("http://vendor/1.html", "第四百二十一章", "正文");
        assert_eq!(chapter.index, 4210);
        assert_eq!(chapter.title, "第四百二十一章");
    }

    // ==================== Content Cleanup Tests ====================

    #[test]
    fn test_clean_content_replaces_breaks_with_newlines() {
        assert_eq!(clean_content("第一行<br />第二行<BR>第三行"), "第一行\n第二行\n第三行");
    }

    #[test]
    fn test_clean_content_replaces_paragraph_tags() {
        assert_eq!(
            clean_content(r#"<p class="txt">第一段</p><p>第二段</p>"#),
            "第一段\n\n第二段"
        );
    }

    #[test]
    fn test_clean_content_strips_emphasis_tags() {
        assert_eq!(clean_content("<b>重点</b>和<strong>强调</strong>"), "重点和强调");
    }

    #[test]
    fn test_clean_content_replaces_nbsp() {
        assert_eq!(clean_content("一&nbsp;二"), "一 二");
    }

    #[test]
    fn test_clean_content_turns_space_runs_into_newlines() {
        assert_eq!(clean_content("句号。        下一段"), "句号。\n下一段");
    }

    #[test]
    fn test_clean_content_tolerates_malformed_markup() {
        assert_eq!(clean_content("<p 未闭合 <br 也未闭合"), "<p 未闭合 <br 也未闭合");
    }
}
