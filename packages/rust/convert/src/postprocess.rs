//! Post-conversion rewrite pipeline applied to pandoc's Markdown output.
//!
//! Mirrors the pre-processing pipeline: ordered `&str -> String` passes,
//! each a total function where no match is a no-op. The sentinel-consuming
//! passes here pair with the sentinel-introducing passes in pre-processing;
//! after this pipeline no sentinel token remains in the text.

use std::sync::LazyLock;

use regex::Regex;

use crate::sentinel::{FENCED_BLOCK_MARK, INLINE_CODE_MARK};

/// Run the full post-processing pipeline on candidate Markdown.
pub(crate) fn run_pipeline(markdown: &str) -> String {
    let mut result = markdown.to_string();

    result = unescape_line_start_markers(&result);
    result = insert_blank_line_before_list(&result);
    result = remove_fenced_block_mark(&result);
    result = restore_inline_code_delimiters(&result);
    result = unescape_wiki_links(&result);
    result = unescape_blockquote_marker(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Un-escape leading list/quote markers
// ---------------------------------------------------------------------------

/// Remove the `\` pandoc defensively puts before `*` and `>` at the
/// beginning of lines.
fn unescape_line_start_markers(markdown: &str) -> String {
    static ESCAPED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^((\\[*>])+)").expect("valid regex"));

    ESCAPED_RE
        .replace_all(markdown, |caps: &regex::Captures| {
            caps[1].replace('\\', "")
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Insert blank line before list start
// ---------------------------------------------------------------------------

/// Add a blank line before a list that directly follows a non-list line.
/// The target renderer only recognizes a list when preceded by a blank
/// line, which is stricter than pandoc assumes.
fn insert_blank_line_before_list(markdown: &str) -> String {
    static LIST_START_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^([^*\n].*)\n\*").expect("valid regex"));

    LIST_START_RE
        .replace_all(markdown, "${1}\n\n*")
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Remove the fenced-block sentinel
// ---------------------------------------------------------------------------

/// Drop the class injected during pre-processing; it has done its job of
/// forcing fenced output and survives only as a literal attribute fragment.
fn remove_fenced_block_mark(markdown: &str) -> String {
    markdown.replace(&format!(" {FENCED_BLOCK_MARK}"), "")
}

// ---------------------------------------------------------------------------
// Pass 4: Restore inline code delimiters
// ---------------------------------------------------------------------------

/// Replace each [`INLINE_CODE_MARK`] with a single backtick. The mark was
/// inserted once per delimiter (open and close), so a straight substitution
/// reconstitutes the span.
fn restore_inline_code_delimiters(markdown: &str) -> String {
    markdown.replace(INLINE_CODE_MARK, "`")
}

// ---------------------------------------------------------------------------
// Pass 5: Un-escape wiki-link brackets
// ---------------------------------------------------------------------------

/// Restore `[[wiki link]]` syntax, which pandoc does not recognize and
/// therefore escapes defensively.
fn unescape_wiki_links(markdown: &str) -> String {
    markdown.replace(r"\[\[", "[[").replace(r"\]\]", "]]")
}

// ---------------------------------------------------------------------------
// Pass 6: Un-escape blockquote marker
// ---------------------------------------------------------------------------

/// Turn an HTML-entity-escaped `&gt; ` at line start back into a literal
/// `> ` blockquote marker. pandoc emits the entity when it meets a `>` it
/// does not recognize as Markdown quote syntax.
fn unescape_blockquote_marker(markdown: &str) -> String {
    static QUOTE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^&gt; ").expect("valid regex"));

    QUOTE_RE.replace_all(markdown, "> ").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
