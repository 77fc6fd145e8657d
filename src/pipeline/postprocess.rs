//! Post-processing: deterministic cleanup of model output before assembly.
//!
//! Vision models sometimes disobey the prompt in small, predictable ways:
//! they wrap the answer in code fences, leak a `<think>` trace, or emit
//! Windows line endings. These rules fix the quirks without touching content.
//!
//! One rule is specific to batch artifacts: a line that looks exactly like a
//! page-boundary marker or a failed-page placeholder would be misread when
//! the artifact is parsed again, so it is escaped.
//!
//! ## Rule Order
//!
//! Thinking traces go first (they may contain fences), line endings are
//! normalised before any line-based rule, and marker escaping runs last so
//! it sees the final lines.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw OCR output.
///
/// Rules (applied in order):
/// 1. Remove `<think>…</think>` blocks
/// 2. Strip outer code fences
/// 3. Normalise line endings (CRLF → LF)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. Escape lines that would read as page markers or failure placeholders
/// 8. Trim leading and trailing blank lines
pub fn clean_ocr_text(input: &str) -> String {
    let s = remove_thinking(input);
    let s = strip_outer_fences(&s);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    let s = escape_page_markers(&s);
    let s = escape_failure_placeholders(&s);
    s.trim_matches('\n').to_string()
}

// ── Rule 1: Remove thinking traces ───────────────────────────────────────────

static RE_THINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

fn remove_thinking(input: &str) -> String {
    RE_THINK.replace_all(input, "").to_string()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text|plaintext|txt)?\r?\n(.*)\r?\n```\s*$").unwrap()
});

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 7: Escape page-marker look-alikes ───────────────────────────────────

static RE_MARKER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^(--- page \d+ ---)$").unwrap());

fn escape_page_markers(input: &str) -> String {
    RE_MARKER_LINE.replace_all(input, r"\$1").to_string()
}

static RE_PLACEHOLDER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\[OCR FAILED after .*)$").unwrap());

fn escape_failure_placeholders(input: &str) -> String {
    RE_PLACEHOLDER_LINE.replace_all(input, r"\$1").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_thinking() {
        let input = "<think>\nthe page is rotated\n</think>\nINVOICE 42";
        assert_eq!(clean_ocr_text(input), "INVOICE 42");
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_outer_fences("```markdown\n# Hello\nWorld\n```"), "# Hello\nWorld");
        assert_eq!(strip_outer_fences("```text\nplain\n```"), "plain");
        assert_eq!(strip_outer_fences("```\nplain\n```"), "plain");
    }

    #[test]
    fn test_inner_fences_untouched() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_outer_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_escape_marker_lookalikes() {
        let input = "before\n--- page 7 ---\nafter\nnot --- page 7 --- inline";
        let out = escape_page_markers(input);
        assert_eq!(out, "before\n\\--- page 7 ---\nafter\nnot --- page 7 --- inline");
    }

    #[test]
    fn test_escape_placeholder_lookalikes() {
        let input = "[OCR FAILED after 3 attempts: as printed on the form]";
        assert_eq!(
            clean_ocr_text(input),
            "\\[OCR FAILED after 3 attempts: as printed on the form]"
        );
        assert_eq!(clean_ocr_text("see [OCR FAILED after 1]"), "see [OCR FAILED after 1]");
    }

    #[test]
    fn test_clean_full_pipeline() {
        let input = "```text\r\nLine one   \r\n\r\n\r\n\r\n\r\nLine two\u{200B}\r\n```";
        assert_eq!(clean_ocr_text(input), "Line one\n\n\nLine two");
    }

    #[test]
    fn test_empty_output_stays_empty() {
        assert_eq!(clean_ocr_text("  \n\n"), "");
    }
}
