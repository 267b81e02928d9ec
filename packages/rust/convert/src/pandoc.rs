//! The external converter boundary.
//!
//! [`Converter`] is the injected capability the pipeline calls once per
//! non-empty document; [`PandocConverter`] is the production implementation
//! that shells out to pandoc. Tests replace it with a scripted stub.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use textmark_shared::{ConverterConfig, Result, TextmarkError};

/// Interval between exit-status polls while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Converter capability
// ---------------------------------------------------------------------------

/// What one converter invocation produced. Owned by the invoker for the
/// duration of a single call and not retained afterward.
#[derive(Debug, Clone)]
pub struct ConverterOutcome {
    /// Candidate Markdown captured from stdout.
    pub markdown: String,
    /// Diagnostic text captured from stderr, verbatim.
    pub diagnostics: String,
    /// Whether the converter reported success.
    pub success: bool,
}

/// One-shot dialect converter: Textile in, candidate Markdown out.
///
/// An `Err` from `run` means the converter could not be executed at all
/// (spawn failure, broken pipe, timeout); a completed run that *failed* is
/// reported through [`ConverterOutcome::success`] so the caller decides how
/// to surface the diagnostics.
pub trait Converter {
    fn run(&self, input: &str) -> Result<ConverterOutcome>;
}

// ---------------------------------------------------------------------------
// PandocConverter
// ---------------------------------------------------------------------------

/// Production converter: spawns pandoc with fixed dialect arguments and
/// feeds the document over stdin.
pub struct PandocConverter {
    command: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl PandocConverter {
    /// Fixed arguments: preserve line wrapping, Textile in, GFM-flavored
    /// Markdown out. pandoc recommends the `gfm` writer, but older LTS
    /// installs only ship the deprecated `markdown_github`, which emits the
    /// same dialect for everything this pipeline produces.
    const FIXED_ARGS: [&'static str; 5] =
        ["--wrap=preserve", "-f", "textile", "-t", "markdown_github"];

    /// Create a converter running plain `pandoc` from `$PATH`, no timeout.
    pub fn new() -> Self {
        Self {
            command: "pandoc".into(),
            args: Self::FIXED_ARGS.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }

    /// Build a converter from the `[converter]` config section.
    pub fn from_config(config: &ConverterConfig) -> Self {
        let mut converter = Self::new();
        converter.command = config.command.clone();
        converter.args.extend(config.extra_args.iter().cloned());
        if config.timeout_secs > 0 {
            converter.timeout = Some(Duration::from_secs(config.timeout_secs));
        }
        converter
    }

    /// Bound one invocation's wall-clock time. On expiry the subprocess is
    /// killed and [`TextmarkError::ConverterTimeout`] is returned.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Arbitrary command and argument list, bypassing the fixed pandoc
    /// arguments. Lets tests exercise the subprocess plumbing with plain
    /// shell tools instead of a pandoc install.
    #[cfg(test)]
    fn raw(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TextmarkError::Converter(format!(
                    "failed to spawn converter: {e}. Is `{}` installed?",
                    self.command
                ))
            })
    }

    /// Wait for the child, polling against the configured deadline.
    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child
                .wait()
                .map_err(|e| TextmarkError::Converter(format!("failed to wait for converter: {e}")));
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(TextmarkError::ConverterTimeout {
                            seconds: timeout.as_secs(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(TextmarkError::Converter(format!(
                        "failed to wait for converter: {e}"
                    )));
                }
            }
        }
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for PandocConverter {
    fn run(&self, input: &str) -> Result<ConverterOutcome> {
        debug!(
            command = %self.command,
            input_len = input.len(),
            "invoking converter subprocess"
        );

        let mut child = self.spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TextmarkError::Converter("failed to capture converter stdin".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TextmarkError::Converter("failed to capture converter stdout".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TextmarkError::Converter("failed to capture converter stderr".into()))?;

        // Feed stdin from its own thread so a converter that fills its
        // output pipe before draining input cannot deadlock us.
        let document = input.as_bytes().to_vec();
        let writer = thread::spawn(move || {
            let result = stdin.write_all(&document);
            drop(stdin);
            result
        });

        let out_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let err_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        });

        let wait_result = self.wait_with_timeout(&mut child);

        // A writer error here is usually just a broken pipe from a converter
        // that bailed out early; the exit status tells the real story.
        if let Err(e) = join_pipe_thread(writer, "stdin writer")? {
            debug!(error = %e, "converter stdin writer ended early");
        }

        let out_buf = join_pipe_thread(out_reader, "stdout reader")?
            .map_err(|e| TextmarkError::Converter(format!("failed to read converter stdout: {e}")))?;
        let err_buf = join_pipe_thread(err_reader, "stderr reader")?
            .map_err(|e| TextmarkError::Converter(format!("failed to read converter stderr: {e}")))?;

        let status = wait_result?;

        let markdown = String::from_utf8(out_buf)
            .map_err(|_| TextmarkError::Converter("converter produced non-UTF-8 output".into()))?;
        let diagnostics = String::from_utf8_lossy(&err_buf).into_owned();

        debug!(
            success = status.success(),
            output_len = markdown.len(),
            "converter subprocess finished"
        );

        Ok(ConverterOutcome {
            markdown,
            diagnostics,
            success: status.success(),
        })
    }
}

/// Join one of the pipe threads, turning a panic into a converter error
/// instead of dropping it on the floor.
fn join_pipe_thread<T>(handle: JoinHandle<T>, what: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| TextmarkError::Converter(format!("{what} thread panicked")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let converter = PandocConverter::raw("cat", &[]);
        let outcome = converter.run("hello textile").unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.markdown, "hello textile");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn run_captures_stderr_and_failure_status() {
        let converter = PandocConverter::raw("sh", &["-c", "echo boom >&2; exit 3"]);
        let outcome = converter.run("irrelevant").unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.diagnostics.trim(), "boom");
    }

    #[test]
    fn run_reports_missing_binary() {
        let converter = PandocConverter::raw("textmark-no-such-binary", &[]);
        let err = converter.run("x").unwrap_err();
        assert!(matches!(err, TextmarkError::Converter(_)));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn run_times_out_and_kills_child() {
        let converter =
            PandocConverter::raw("sleep", &["10"]).with_timeout(Duration::from_millis(100));
        let start = Instant::now();
        let err = converter.run("x").unwrap_err();
        assert!(matches!(err, TextmarkError::ConverterTimeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5), "child was not killed");
    }

    #[test]
    fn run_survives_large_input() {
        // Larger than a pipe buffer, to exercise the writer thread.
        let input = "textile line\n".repeat(20_000);
        let converter = PandocConverter::raw("cat", &[]);
        let outcome = converter.run(&input).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.markdown.len(), input.len());
    }

    #[test]
    fn panicked_pipe_thread_is_surfaced() {
        let handle = thread::spawn(|| -> std::io::Result<()> { panic!("pipe thread died") });
        let err = join_pipe_thread(handle, "stdin writer").unwrap_err();
        assert!(matches!(err, TextmarkError::Converter(_)));
        assert!(err.to_string().contains("stdin writer thread panicked"));
    }

    #[test]
    fn joined_pipe_thread_passes_value_through() {
        let handle = thread::spawn(|| -> std::io::Result<()> { Ok(()) });
        assert!(join_pipe_thread(handle, "stdout reader").unwrap().is_ok());
    }

    #[test]
    fn from_config_applies_settings() {
        let config = ConverterConfig {
            command: "/opt/pandoc".into(),
            extra_args: vec!["--columns=120".into()],
            timeout_secs: 30,
        };
        let converter = PandocConverter::from_config(&config);
        assert_eq!(converter.command, "/opt/pandoc");
        assert!(converter.args.contains(&"--columns=120".to_string()));
        assert_eq!(converter.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let config = ConverterConfig {
            command: "pandoc".into(),
            extra_args: Vec::new(),
            timeout_secs: 0,
        };
        let converter = PandocConverter::from_config(&config);
        assert_eq!(converter.timeout, None);
    }
}
