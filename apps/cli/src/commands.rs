//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use textmark_convert::{PandocConverter, Pipeline};
use textmark_shared::{AppConfig, ConverterConfig, TextmarkError, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// textmark — convert Textile markup to CommonMark+GFM Markdown.
#[derive(Parser)]
#[command(
    name = "textmark",
    version,
    about = "Convert Textile documents to CommonMark+GFM Markdown via pandoc.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert a single document (file or stdin) to Markdown.
    Convert {
        /// Input file. Reads stdin when omitted.
        file: Option<PathBuf>,

        /// Output file. Writes stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Converter executable (overrides config).
        #[arg(long)]
        pandoc: Option<String>,

        /// Per-document timeout in seconds, 0 to disable (overrides config).
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Convert every Textile file under a directory.
    Batch {
        /// Directory to scan recursively.
        dir: PathBuf,

        /// Mirror output under this directory instead of writing `.md`
        /// files next to their sources.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Maximum concurrent converter subprocesses (overrides config).
        #[arg(short, long)]
        concurrency: Option<u32>,

        /// Source file extension to pick up (overrides config).
        #[arg(long)]
        extension: Option<String>,

        /// Convert remaining documents after a failure instead of aborting.
        #[arg(long)]
        keep_going: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "textmark=info",
        1 => "textmark=debug",
        _ => "textmark=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert {
            file,
            out,
            pandoc,
            timeout,
        } => cmd_convert(file.as_deref(), out.as_deref(), pandoc.as_deref(), timeout).await,
        Command::Batch {
            dir,
            out_dir,
            concurrency,
            extension,
            keep_going,
        } => {
            cmd_batch(
                &dir,
                out_dir.as_deref(),
                concurrency,
                extension.as_deref(),
                keep_going,
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Merge CLI overrides into the `[converter]` config section.
fn converter_settings(
    config: &AppConfig,
    pandoc: Option<&str>,
    timeout: Option<u64>,
) -> ConverterConfig {
    let mut settings = config.converter.clone();
    if let Some(command) = pandoc {
        settings.command = command.to_string();
    }
    if let Some(secs) = timeout {
        settings.timeout_secs = secs;
    }
    settings
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

async fn cmd_convert(
    file: Option<&Path>,
    out: Option<&Path>,
    pandoc: Option<&str>,
    timeout: Option<u64>,
) -> Result<()> {
    let config = load_config()?;
    let settings = converter_settings(&config, pandoc, timeout);

    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| TextmarkError::io(path, e))?,
        None => std::io::read_to_string(std::io::stdin())
            .map_err(|e| eyre!("failed to read stdin: {e}"))?,
    };

    info!(
        source = %file.map(|p| p.display().to_string()).unwrap_or_else(|| "<stdin>".into()),
        converter = %settings.command,
        "converting document"
    );

    let pipeline = Pipeline::new(PandocConverter::from_config(&settings))?;
    let markdown = tokio::task::spawn_blocking(move || pipeline.convert(&text)).await??;

    match out {
        Some(path) => {
            std::fs::write(path, &markdown).map_err(|e| TextmarkError::io(path, e))?;
            info!(out = %path.display(), bytes = markdown.len(), "wrote output");
        }
        None => print!("{markdown}"),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

async fn cmd_batch(
    dir: &Path,
    out_dir: Option<&Path>,
    concurrency: Option<u32>,
    extension: Option<&str>,
    keep_going: bool,
) -> Result<()> {
    let config = load_config()?;
    let settings = converter_settings(&config, None, None);
    let concurrency = concurrency.unwrap_or(config.batch.concurrency).max(1);
    let extension = extension.unwrap_or(&config.batch.extension).to_string();

    if !dir.is_dir() {
        return Err(eyre!("'{}' is not a directory", dir.display()));
    }

    let sources = collect_sources(dir, &extension)?;
    if sources.is_empty() {
        println!("No .{extension} files found under {}", dir.display());
        return Ok(());
    }

    info!(
        count = sources.len(),
        concurrency,
        converter = %settings.command,
        "starting batch conversion"
    );

    let progress = batch_progress(sources.len() as u64);
    let started = Instant::now();

    let outcome = run_batch(
        &settings,
        dir,
        out_dir,
        sources,
        concurrency,
        keep_going,
        progress.clone(),
    )
    .await?;

    progress.finish_and_clear();

    println!();
    println!("  Converted: {}", outcome.converted);
    println!("  Failed:    {}", outcome.failures.len());
    println!("  Time:      {:.1}s", started.elapsed().as_secs_f64());
    println!();

    if !outcome.failures.is_empty() {
        for (source, message) in &outcome.failures {
            eprintln!("  {}: {message}", source.display());
        }
        return Err(eyre!(
            "{} document(s) failed to convert",
            outcome.failures.len()
        ));
    }

    Ok(())
}

/// What a batch run produced: counts plus every per-document failure.
struct BatchOutcome {
    converted: usize,
    failures: Vec<(PathBuf, String)>,
}

/// Convert the given source files with a bounded pool of converter
/// subprocesses. Without `keep_going`, the first failure aborts the
/// remaining conversions.
async fn run_batch(
    settings: &ConverterConfig,
    root: &Path,
    out_dir: Option<&Path>,
    sources: Vec<PathBuf>,
    concurrency: u32,
    keep_going: bool,
    progress: ProgressBar,
) -> Result<BatchOutcome> {
    let pipeline = Arc::new(Pipeline::new(PandocConverter::from_config(settings))?);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1) as usize));

    let mut tasks: JoinSet<(PathBuf, std::result::Result<(), String>)> = JoinSet::new();

    for source in sources {
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let progress = progress.clone();
        let target = output_path(&source, root, out_dir);

        tasks.spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (source, Err("converter pool closed".into())),
            };

            let result = convert_one(&pipeline, &source, &target).await;
            drop(permit);

            progress.inc(1);
            if let Some(name) = source.file_name() {
                progress.set_message(name.to_string_lossy().into_owned());
            }
            (source, result)
        });
    }

    let mut converted: usize = 0;
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        let (source, result) = match joined {
            Ok(output) => output,
            // Cancelled sibling tasks after abort_all; nothing to record.
            Err(e) if e.is_cancelled() => continue,
            Err(e) => return Err(eyre!("conversion task panicked: {e}")),
        };

        match result {
            Ok(()) => converted += 1,
            Err(message) => {
                warn!(source = %source.display(), error = %message, "conversion failed");
                failures.push((source, message));
                if !keep_going {
                    tasks.abort_all();
                }
            }
        }
    }

    Ok(BatchOutcome {
        converted,
        failures,
    })
}

/// Convert a single file and persist the result.
///
/// The output file is written only after the full pipeline has succeeded,
/// so a failed document never leaves a partially processed file behind.
async fn convert_one(
    pipeline: &Arc<Pipeline<PandocConverter>>,
    source: &Path,
    target: &Path,
) -> std::result::Result<(), String> {
    let text = std::fs::read_to_string(source).map_err(|e| format!("read failed: {e}"))?;

    let pipeline = Arc::clone(pipeline);
    let markdown = tokio::task::spawn_blocking(move || pipeline.convert(&text))
        .await
        .map_err(|e| format!("conversion task failed: {e}"))?
        .map_err(|e| e.to_string())?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| format!("mkdir failed: {e}"))?;
    }
    std::fs::write(target, &markdown).map_err(|e| format!("write failed: {e}"))?;

    Ok(())
}

/// Recursively collect source files with the given extension, sorted for
/// deterministic processing order.
fn collect_sources(root: &Path, extension: &str) -> std::result::Result<Vec<PathBuf>, TextmarkError> {
    let mut sources = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| TextmarkError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| TextmarkError::io(&dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == extension) {
                sources.push(path);
            }
        }
    }

    sources.sort();
    Ok(sources)
}

/// Where a converted document lands: a `.md` sibling by default, or the
/// mirrored path under `out_dir` when given.
fn output_path(source: &Path, root: &Path, out_dir: Option<&Path>) -> PathBuf {
    match out_dir {
        Some(out) => out
            .join(source.strip_prefix(root).unwrap_or(source))
            .with_extension("md"),
        None => source.with_extension("md"),
    }
}

/// Progress bar for batch conversion.
fn batch_progress(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_sources_finds_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::write(root.join("one.textile"), "h1. One").unwrap();
        std::fs::write(root.join("a/two.textile"), "h1. Two").unwrap();
        std::fs::write(root.join("a/b/three.textile"), "h1. Three").unwrap();
        std::fs::write(root.join("a/ignored.md"), "# Not textile").unwrap();

        let sources = collect_sources(root, "textile").unwrap();
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|p| p.extension().unwrap() == "textile"));
        // Sorted for deterministic order.
        let mut sorted = sources.clone();
        sorted.sort();
        assert_eq!(sources, sorted);
    }

    #[test]
    fn collect_sources_missing_dir_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = collect_sources(&missing, "textile").unwrap_err();
        assert!(matches!(err, TextmarkError::Io { .. }));
    }

    #[test]
    fn output_path_sibling_by_default() {
        let source = Path::new("/docs/wiki/page.textile");
        let root = Path::new("/docs");
        assert_eq!(
            output_path(source, root, None),
            Path::new("/docs/wiki/page.md")
        );
    }

    #[test]
    fn output_path_mirrors_under_out_dir() {
        let source = Path::new("/docs/wiki/page.textile");
        let root = Path::new("/docs");
        assert_eq!(
            output_path(source, root, Some(Path::new("/converted"))),
            Path::new("/converted/wiki/page.md")
        );
    }

    /// Converter settings pointing at a binary that cannot exist, so every
    /// non-blank document fails at the subprocess boundary.
    fn unrunnable_converter() -> ConverterConfig {
        ConverterConfig {
            command: "textmark-no-such-binary".into(),
            extra_args: Vec::new(),
            timeout_secs: 0,
        }
    }

    #[tokio::test]
    async fn convert_one_failure_leaves_no_output() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("doc.textile");
        let target = tmp.path().join("out/doc.md");
        std::fs::write(&source, "h1. Title").unwrap();

        let pipeline =
            Arc::new(Pipeline::new(PandocConverter::from_config(&unrunnable_converter())).unwrap());
        let result = convert_one(&pipeline, &source, &target).await;

        assert!(result.is_err());
        assert!(!target.exists(), "failed conversion must not persist output");
    }

    #[tokio::test]
    async fn convert_one_persists_after_success() {
        // A blank document short-circuits before the converter, so this
        // exercises the persist path without needing pandoc installed.
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("empty.textile");
        let target = tmp.path().join("nested/out/empty.md");
        std::fs::write(&source, "  \n").unwrap();

        let pipeline =
            Arc::new(Pipeline::new(PandocConverter::from_config(&unrunnable_converter())).unwrap());
        convert_one(&pipeline, &source, &target).await.unwrap();

        assert!(target.exists());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "");
    }

    #[tokio::test]
    async fn batch_keep_going_converts_remaining_and_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("a.textile"), "h1. A").unwrap();
        std::fs::write(root.join("b.textile"), "  \n").unwrap();
        std::fs::write(root.join("sub/c.textile"), "h1. C").unwrap();

        let sources = collect_sources(root, "textile").unwrap();
        let outcome = run_batch(
            &unrunnable_converter(),
            root,
            None,
            sources,
            2,
            true,
            ProgressBar::hidden(),
        )
        .await
        .unwrap();

        // Only the blank document converts; both failures are reported and
        // neither leaves a partially processed file behind.
        assert_eq!(outcome.converted, 1);
        assert_eq!(outcome.failures.len(), 2);
        assert!(root.join("b.md").exists());
        assert!(!root.join("a.md").exists());
        assert!(!root.join("sub/c.md").exists());
    }

    #[tokio::test]
    async fn batch_abort_records_failure_without_output() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("doc.textile"), "h1. Doc").unwrap();

        let sources = collect_sources(root, "textile").unwrap();
        let outcome = run_batch(
            &unrunnable_converter(),
            root,
            None,
            sources,
            1,
            false,
            ProgressBar::hidden(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.converted, 0);
        assert_eq!(outcome.failures.len(), 1);
        assert!(!root.join("doc.md").exists());
    }

    #[tokio::test]
    async fn batch_mirrors_output_under_out_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("src");
        let out = tmp.path().join("converted");
        std::fs::create_dir_all(root.join("wiki")).unwrap();
        std::fs::write(root.join("wiki/page.textile"), "\n").unwrap();

        let sources = collect_sources(&root, "textile").unwrap();
        let outcome = run_batch(
            &unrunnable_converter(),
            &root,
            Some(&out),
            sources,
            1,
            false,
            ProgressBar::hidden(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.converted, 1);
        assert!(out.join("wiki/page.md").exists());
    }

    #[test]
    fn converter_settings_applies_overrides() {
        let config = AppConfig::default();
        let settings = converter_settings(&config, Some("/usr/local/bin/pandoc"), Some(5));
        assert_eq!(settings.command, "/usr/local/bin/pandoc");
        assert_eq!(settings.timeout_secs, 5);

        let untouched = converter_settings(&config, None, None);
        assert_eq!(untouched.command, config.converter.command);
        assert_eq!(untouched.timeout_secs, config.converter.timeout_secs);
    }
}
