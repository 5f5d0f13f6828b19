//! Markdown-to-HTML rendering for generated theory.
//!
//! Model output goes through a small cleanup pipeline, then CommonMark
//! rendering via `pulldown-cmark`. Raw HTML embedded in the Markdown is
//! escaped rather than passed through: generated text is untrusted.

mod cleanup;

use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser, html};
use regex::Regex;
use tracing::{debug, instrument};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of rendering a Markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Renderable HTML markup.
    pub html: String,
    /// Text of the first H1, if any.
    pub title: Option<String>,
    /// Approximate word count of the body (code blocks excluded).
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Render Markdown to HTML.
///
/// 1. Cleanup passes (unwrap fenced answers, fix headings and blank lines)
/// 2. CommonMark parse with tables, strikethrough and task lists
/// 3. Raw HTML events downgraded to escaped text
/// 4. HTML serialization
#[instrument(skip_all, fields(len = markdown.len()))]
pub fn render(markdown: &str) -> Rendered {
    let cleaned = cleanup::run_pipeline(markdown);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(&cleaned, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(cleaned.len() * 3 / 2);
    html::push_html(&mut out, parser);

    let title = extract_title_from_markdown(&cleaned);
    let word_count = count_words(&cleaned);

    debug!(html_len = out.len(), word_count, "render complete");

    Rendered {
        html: out,
        title,
        word_count,
    }
}

/// Render Markdown and keep only the HTML.
pub fn to_html(markdown: &str) -> String {
    render(markdown).html
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract title from the first H1 in the Markdown text.
fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

/// Count words in the Markdown body (excluding code blocks).
fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    let without_code = CODE_BLOCK_RE.replace_all(md, "");
    without_code
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| matches!(c, '#' | '-' | '*' | '|' | '>')))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_heading_and_paragraph() {
        let result = render("# Binary Search\n\nSplit the sorted range in half.");
        assert!(result.html.starts_with("<h1>Binary Search</h1>"));
        assert!(result.html.contains("<p>Split the sorted range in half.</p>"));
        assert_eq!(result.title.as_deref(), Some("Binary Search"));
    }

    #[test]
    fn render_unwraps_fenced_answer() {
        let result = render("```markdown\n# Recursion\n\nA function calling itself.\n```");
        assert!(result.html.starts_with("<h1>Recursion</h1>"));
        assert!(!result.html.contains("<pre>"));
    }

    #[test]
    fn render_keeps_real_code_blocks() {
        let md = "# Loops\n\n```python\nfor i in range(3):\n    print(i)\n```";
        let result = render(md);
        assert!(result.html.contains(r#"<code class="language-python">"#));
        assert!(result.html.contains("print(i)"));
    }

    #[test]
    fn render_tables() {
        let md = "| Case | Cost |\n| --- | --- |\n| best | O(1) |\n| worst | O(log n) |";
        let result = render(md);
        assert!(result.html.contains("<table>"));
        assert!(result.html.contains("<td>O(log n)</td>"));
    }

    #[test]
    fn render_escapes_raw_html() {
        let result = render("Hello <script>alert(1)</script> world");
        assert!(!result.html.contains("<script>"));
        assert!(result.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn render_empty_input() {
        let result = render("");
        assert_eq!(result.title, None);
        assert_eq!(result.word_count, 0);
        assert!(result.html.trim().is_empty());
    }

    #[test]
    fn word_count_excludes_code_blocks() {
        let md = "# Title\n\nOne two three.\n\n```\nlots of code words that should not be counted\n```";
        let result = render(md);
        assert_eq!(result.word_count, 4);
    }

    #[test]
    fn to_html_matches_render() {
        let md = "## Steps\n\n- compare\n- narrow";
        assert_eq!(to_html(md), render(md).html);
    }
}
