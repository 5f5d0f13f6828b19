//! Pre-render cleanup pipeline for model-generated Markdown.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The pipeline unwraps fenced answers, normalizes line endings, headings
//! and blank lines before the text reaches the CommonMark renderer.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw model output.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = normalize_line_endings(md);

    result = strip_wrapping_fence(&result);
    result = normalize_headings(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

fn normalize_line_endings(md: &str) -> String {
    md.replace("\r\n", "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Unwrap an answer fenced as a whole
// ---------------------------------------------------------------------------

/// Remove a ```` ```markdown ```` fence wrapped around the entire answer.
///
/// Models frequently return the document inside a single code fence; rendered
/// as-is it would show up as one big code block.
fn strip_wrapping_fence(md: &str) -> String {
    static WRAPPED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)\A\s*```(?:markdown|md)?[ \t]*\n(.*?)\n```\s*\z").expect("valid regex")
    });

    match WRAPPED_RE.captures(md) {
        // An inner fence means the outer one was not a wrapper but a real block.
        Some(caps) if !caps[1].contains("```") => caps[1].to_string(),
        _ => md.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 3: Normalize heading levels
// ---------------------------------------------------------------------------

/// Ensure there's at most one H1; later H1s are demoted to H2.
///
/// Lines inside code blocks are left alone (`# comment` in Python is not a heading).
fn normalize_headings(md: &str) -> String {
    static H_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"));

    let mut h1_count = 0;
    let mut in_code_block = false;
    let mut lines: Vec<String> = Vec::new();

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(line.to_string());
            continue;
        }

        if !in_code_block {
            if let Some(caps) = H_RE.captures(line) {
                if &caps[1] == "#" {
                    h1_count += 1;
                    if h1_count > 1 {
                        lines.push(format!("## {}", &caps[2]));
                        continue;
                    }
                }
            }
        }

        lines.push(line.to_string());
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Clean up excessive blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Ensure trailing newline
// ---------------------------------------------------------------------------

/// Ensure the text ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_wrapping_fence_unwraps_markdown_answer() {
        let input = "```markdown\n# Binary Search\n\nHalve the range.\n```\n";
        assert_eq!(strip_wrapping_fence(input), "# Binary Search\n\nHalve the range.");
    }

    #[test]
    fn strip_wrapping_fence_handles_bare_fence() {
        let input = "```\n# Title\nBody\n```";
        assert_eq!(strip_wrapping_fence(input), "# Title\nBody");
    }

    #[test]
    fn strip_wrapping_fence_keeps_document_with_inner_blocks() {
        let input = "```python\nprint(1)\n```\n\nText\n\n```python\nprint(2)\n```";
        assert_eq!(strip_wrapping_fence(input), input);
    }

    #[test]
    fn strip_wrapping_fence_ignores_unfenced_text() {
        let input = "# Title\n\nBody";
        assert_eq!(strip_wrapping_fence(input), input);
    }

    #[test]
    fn normalize_headings_demotes_duplicate_h1() {
        let input = "# Title\n\nSome text\n\n# Another Title\n\nMore text";
        assert_eq!(
            normalize_headings(input),
            "# Title\n\nSome text\n\n## Another Title\n\nMore text"
        );
    }

    #[test]
    fn normalize_headings_skips_code_comments() {
        let input = "# Title\n\n```python\n# a comment\nx = 1\n```";
        assert_eq!(normalize_headings(input), input);
    }

    #[test]
    fn clean_blank_lines_collapses_excess() {
        assert_eq!(clean_blank_lines("Line 1\n\n\n\n\nLine 2"), "Line 1\n\n\nLine 2");
        assert_eq!(clean_blank_lines("Line 1\n\nLine 2"), "Line 1\n\nLine 2");
    }

    #[test]
    fn ensure_trailing_newline_normalizes() {
        assert_eq!(ensure_trailing_newline("Content"), "Content\n");
        assert_eq!(ensure_trailing_newline("Content\n\n\n"), "Content\n");
    }

    #[test]
    fn full_pipeline_cleans_model_output() {
        let input = "```md\r\n# Title\r\n\r\n\r\n\r\n\r\n# Again\r\nBody\r\n```";
        let result = run_pipeline(input);

        assert!(result.starts_with("# Title\n"));
        assert!(result.contains("## Again"));
        assert!(!result.contains('\r'));
        assert!(!result.contains("```"));
        assert!(result.ends_with("Body\n"));
    }
}
