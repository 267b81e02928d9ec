//! Textile-to-Markdown conversion pipeline.
//!
//! Converts Textile markup to CommonMark+GFM by sequencing regex rewrites
//! around an external pandoc invocation:
//! pre-process → convert → post-process. The pre-processing passes
//! compensate for Textile constructs pandoc mishandles (shielding them
//! behind sentinel tokens where needed); the post-processing passes clean
//! up pandoc quirks and consume every sentinel again.

pub mod pandoc;
pub mod sentinel;

mod postprocess;
mod preprocess;

use tracing::{debug, instrument};

use textmark_shared::{Result, TextmarkError};

pub use pandoc::{Converter, ConverterOutcome, PandocConverter};

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The conversion pipeline around an injected [`Converter`].
///
/// Holds no mutable state; one instance may serve any number of documents,
/// concurrently. Each document either passes through the full pipeline or
/// fails with an error — a partially processed result is never returned.
pub struct Pipeline<C: Converter> {
    converter: C,
}

impl<C: Converter> Pipeline<C> {
    /// Build a pipeline around the given converter.
    ///
    /// Validates the sentinel registry so a collision-unsafe token is a
    /// startup error instead of corrupted output later.
    pub fn new(converter: C) -> Result<Self> {
        sentinel::validate()?;
        Ok(Self { converter })
    }

    /// Convert one Textile document to CommonMark+GFM Markdown.
    ///
    /// Blank input (empty or whitespace-only, the representation of an
    /// absent field) returns an empty string without spawning the
    /// converter. A converter failure aborts with
    /// [`TextmarkError::ConverterProcess`] carrying its stderr.
    #[instrument(skip_all, fields(input_len = text.len()))]
    pub fn convert(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let normalized = preprocess::run_pipeline(text);
        let outcome = self.converter.run(&normalized)?;

        if !outcome.success {
            return Err(TextmarkError::ConverterProcess {
                diagnostics: outcome.diagnostics,
            });
        }

        let markdown = postprocess::run_pipeline(&outcome.markdown);

        debug!(output_len = markdown.len(), "document converted");
        Ok(markdown)
    }
}

/// Convert one document with a default [`PandocConverter`].
///
/// Batch drivers that convert many documents should build one
/// [`Pipeline`] (from config) and reuse it instead.
pub fn convert_textile(text: &str) -> Result<String> {
    Pipeline::new(PandocConverter::new())?.convert(text)
}

// Let tests and callers pass a borrowed converter into the pipeline.
impl<T: Converter + ?Sized> Converter for &T {
    fn run(&self, input: &str) -> Result<ConverterOutcome> {
        (**self).run(input)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
