//! Pre-conversion rewrite pipeline applied to raw Textile.
//!
//! Each pass is a function `&str -> String` applied in sequence. The order
//! is load-bearing: later passes assume earlier ones have already run
//! (e.g. the blank-line pass sees the class injected by the fencing pass).
//! Every pass is a best-effort substitution; no match is a no-op.

use std::sync::LazyLock;

use regex::Regex;

use crate::sentinel::{FENCED_BLOCK_MARK, INLINE_CODE_MARK};

/// Run the full pre-processing pipeline on raw Textile text.
pub(crate) fn run_pipeline(textile: &str) -> String {
    let mut result = textile.to_string();

    result = protect_inline_at_code(&result);
    result = strip_table_span_modifiers(&result);
    result = strip_table_alignment_modifiers(&result);
    result = relocate_code_language_class(&result);
    result = collapse_nested_code_tag(&result);
    result = force_fenced_code_blocks(&result);
    result = isolate_inline_pre_blocks(&result);
    result = sanitize_pathological_list_item(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Protect at-delimited inline code containing `@`
// ---------------------------------------------------------------------------

/// Textile allows `@` inside inline code marked with `@` (such as
/// `@git@github.com@`), but pandoc does not. Swap the delimiters for
/// [`INLINE_CODE_MARK`] so pandoc treats the span as plain prose; the
/// post-processor turns the marks back into backticks.
fn protect_inline_at_code(textile: &str) -> String {
    static AT_CODE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"@(\S+@\S+)@").expect("valid regex"));

    let replacement = format!("{INLINE_CODE_MARK}${{1}}{INLINE_CODE_MARK}");
    AT_CODE_RE.replace_all(textile, replacement.as_str()).to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip table colspan/rowspan modifiers
// ---------------------------------------------------------------------------

/// Drop colspan/rowspan cell notation (`|\2.` or `|/2.`) because pandoc
/// has no concept of merged table cells.
/// See https://github.com/jgm/pandoc/issues/22
fn strip_table_span_modifiers(textile: &str) -> String {
    static SPAN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\|[\\/]\d\. ").expect("valid regex"));

    SPAN_RE.replace_all(textile, "| ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip table alignment modifiers
// ---------------------------------------------------------------------------

/// Drop cell alignment notation (`|>.`, `|<.`, `|=.`), unsupported by pandoc
/// for the same reason as the span modifiers.
fn strip_table_alignment_modifiers(textile: &str) -> String {
    static ALIGN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\|[<>=]\. ").expect("valid regex"));

    ALIGN_RE.replace_all(textile, "| ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Relocate code block language class
// ---------------------------------------------------------------------------

/// Move the class from `<code>` to `<pre>` so pandoc can generate a code
/// block with the correct language tag (it reads the class off `<pre>`).
fn relocate_code_language_class(textile: &str) -> String {
    static PRE_CODE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(<pre)(><code)( class="[^"]*")(>)"#).expect("valid regex")
    });

    PRE_CODE_CLASS_RE
        .replace_all(textile, "${1}${3}${2}${4}")
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Collapse redundant nested code tag
// ---------------------------------------------------------------------------

/// Remove a `<code>` directly inside `<pre>`, because pandoc would
/// incorrectly preserve it and double-wrap the block.
fn collapse_nested_code_tag(textile: &str) -> String {
    static OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(<pre[^>]*>)<code>").expect("valid regex"));
    static CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"</code>(</pre>)").expect("valid regex"));

    let result = OPEN_RE.replace_all(textile, "${1}");
    CLOSE_RE.replace_all(&result, "${1}").to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: Force fenced output for inline-adjacent blocks
// ---------------------------------------------------------------------------

/// Inject a class into every `<pre>` that does not have a newline before it.
/// This forces pandoc to use a fenced code block (```); otherwise it would
/// use an indented block and would very likely need to insert an empty HTML
/// comment `<!-- -->` to end a list (see
/// http://pandoc.org/README.html#ending-a-list), which the target renderer
/// does not support. The class is [`FENCED_BLOCK_MARK`], removed in
/// post-processing.
fn force_fenced_code_blocks(textile: &str) -> String {
    static INLINE_PRE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([^\n]<pre)(>)").expect("valid regex"));

    let replacement = format!("${{1}} class=\"{FENCED_BLOCK_MARK}\"${{2}}");
    INLINE_PRE_RE
        .replace_all(textile, replacement.as_str())
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 7: Force blank line before inline-adjacent blocks
// ---------------------------------------------------------------------------

/// Force a blank line before every mid-line `<pre>`. Without this, a list
/// item containing `<pre>` would not be recognized as a list at all by
/// pandoc's list-continuation logic.
fn isolate_inline_pre_blocks(textile: &str) -> String {
    static PRE_AFTER_TEXT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([^\n])(<pre)").expect("valid regex"));

    PRE_AFTER_TEXT_RE
        .replace_all(textile, "${1}\n\n${2}")
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 8: Sanitize a known pathological pattern
// ---------------------------------------------------------------------------

/// Some malformed Textile (a `-` followed by a run of spaces and `# N`)
/// makes pandoc's parser run extremely slowly, so rewrite it into a proper
/// list item before pandoc ever sees it.
/// See https://github.com/jgm/pandoc/issues/3020
///
/// This is a narrow fix for one observed slow-input shape, not a general
/// defense against malformed input.
fn sanitize_pathological_list_item(textile: &str) -> String {
    static SLOW_ITEM_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"- {4,}# (\d+)").expect("valid regex"));

    SLOW_ITEM_RE.replace_all(textile, "* ${1}").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protect_inline_at_code_marks_embedded_at() {
        let input = "Clone from @git@github.com@ to start.";
        let result = protect_inline_at_code(input);
        assert_eq!(
            result,
            format!("Clone from {INLINE_CODE_MARK}git@github.com{INLINE_CODE_MARK} to start.")
        );
    }

    #[test]
    fn protect_inline_at_code_ignores_plain_code() {
        // No internal `@` — pandoc handles this span correctly on its own.
        let input = "Run @bundle install@ first.";
        assert_eq!(protect_inline_at_code(input), input);
    }

    #[test]
    fn strip_table_span_modifiers_drops_notation() {
        assert_eq!(
            strip_table_span_modifiers(r"|\2. spanning |/3. rows |"),
            "| spanning | rows |"
        );
    }

    #[test]
    fn strip_table_span_modifiers_requires_single_digit_form() {
        let input = r"|\. not a span |";
        assert_eq!(strip_table_span_modifiers(input), input);
    }

    #[test]
    fn strip_table_alignment_modifiers_drops_notation() {
        assert_eq!(
            strip_table_alignment_modifiers("|>. right |<. left |=. center |"),
            "| right | left | center |"
        );
    }

    #[test]
    fn relocate_code_language_class_moves_to_pre() {
        assert_eq!(
            relocate_code_language_class(r#"<pre><code class="ruby">puts</code></pre>"#),
            r#"<pre class="ruby"><code>puts</code></pre>"#
        );
    }

    #[test]
    fn collapse_nested_code_tag_unwraps_block() {
        assert_eq!(
            collapse_nested_code_tag(r#"<pre class="ruby"><code>puts</code></pre>"#),
            r#"<pre class="ruby">puts</pre>"#
        );
    }

    #[test]
    fn collapse_nested_code_tag_keeps_inner_inline_code() {
        // Only a <code> hugging the <pre> boundary is redundant.
        let input = "<pre>x</pre> and <code>y</code>";
        assert_eq!(collapse_nested_code_tag(input), input);
    }

    #[test]
    fn force_fenced_code_blocks_tags_midline_pre() {
        let result = force_fenced_code_blocks("* item <pre>code</pre>");
        assert_eq!(
            result,
            format!("* item <pre class=\"{FENCED_BLOCK_MARK}\">code</pre>")
        );
    }

    #[test]
    fn force_fenced_code_blocks_skips_block_level_pre() {
        let input = "text\n<pre>code</pre>";
        assert_eq!(force_fenced_code_blocks(input), input);
    }

    #[test]
    fn isolate_inline_pre_blocks_inserts_blank_line() {
        assert_eq!(
            isolate_inline_pre_blocks("* item <pre>code</pre>"),
            "* item \n\n<pre>code</pre>"
        );
    }

    #[test]
    fn sanitize_pathological_list_item_rewrites_slow_shape() {
        assert_eq!(
            sanitize_pathological_list_item("-          # 3"),
            "* 3"
        );
    }

    #[test]
    fn sanitize_pathological_list_item_leaves_normal_lists() {
        let input = "- # 3";
        assert_eq!(sanitize_pathological_list_item(input), input);
    }

    #[test]
    fn full_pipeline_applies_passes_in_order() {
        let input = "* item <pre><code class=\"ruby\">puts 1</code></pre>";
        let result = run_pipeline(input);

        // Class relocated, nested <code> collapsed, blank line forced in.
        assert!(result.contains("<pre class=\"ruby\">puts 1</pre>"));
        assert!(result.contains("* item \n\n<pre"));
        assert!(!result.contains("<code>"));
    }

    #[test]
    fn full_pipeline_fences_midline_plain_pre() {
        let result = run_pipeline("* item <pre>code</pre>");
        assert!(result.contains(FENCED_BLOCK_MARK));
        assert!(result.contains("\n\n<pre"));
    }
}
