//! Sentinel tokens used to shield content across the conversion boundary.
//!
//! Both tokens are inserted by the pre-processor and consumed by the
//! post-processor; neither may survive into final output. They avoid
//! collision by construction: long, hyphenated, lowercase ASCII strings
//! that pandoc passes through prose untouched and that cannot plausibly
//! occur verbatim in real documents.

use textmark_shared::{Result, TextmarkError};

/// Placeholder for a backtick delimiting an inline code span whose content
/// itself contains `@` (e.g. `@git@github.com@` in Textile).
pub const INLINE_CODE_MARK: &str = "pandoc-unescaped-single-backtick";

/// Class name injected into `<pre>` tags to force pandoc to emit a fenced
/// code block instead of an indented one.
pub const FENCED_BLOCK_MARK: &str = "force-pandoc-to-output-fenced-code-block";

/// Minimum token length considered collision-implausible.
const MIN_LEN: usize = 16;

/// Assert the collision-safety contract for both registry tokens.
///
/// Called once at pipeline construction so a bad token is a startup
/// failure rather than silent output corruption.
pub fn validate() -> Result<()> {
    validate_token(INLINE_CODE_MARK)?;
    validate_token(FENCED_BLOCK_MARK)?;
    Ok(())
}

/// Check a single token: only lowercase ASCII letters, digits, and hyphens
/// (no character either dialect treats specially), and long enough that a
/// verbatim occurrence in legitimate input is implausible.
fn validate_token(token: &str) -> Result<()> {
    if token.len() < MIN_LEN {
        return Err(TextmarkError::validation(format!(
            "sentinel token '{token}' is too short ({} < {MIN_LEN} chars)",
            token.len()
        )));
    }

    if let Some(bad) = token
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(TextmarkError::validation(format!(
            "sentinel token '{token}' contains disallowed character '{bad}'"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_tokens_are_valid() {
        validate().expect("registry tokens must satisfy their own contract");
    }

    #[test]
    fn short_token_rejected() {
        let err = validate_token("short").unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn markdown_special_characters_rejected() {
        for token in [
            "backtick-`-sentinel-token",
            "asterisk-*-sentinel-token",
            "underscore_sentinel_token",
            "Uppercase-Sentinel-Token",
            "at-sign-@-sentinel-token",
        ] {
            let err = validate_token(token).unwrap_err();
            assert!(
                err.to_string().contains("disallowed character"),
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn tokens_are_distinct() {
        assert_ne!(INLINE_CODE_MARK, FENCED_BLOCK_MARK);
        assert!(!INLINE_CODE_MARK.contains(FENCED_BLOCK_MARK));
        assert!(!FENCED_BLOCK_MARK.contains(INLINE_CODE_MARK));
    }
}
