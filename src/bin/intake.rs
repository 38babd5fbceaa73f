//! CLI binary for intake-form.
//!
//! A thin shim over the library crate: validate saved forms, paginate
//! snapshot images into PDFs, push CVs through the upload tracker and
//! inspect the local draft.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use intake_form::adapters::{FileKeyValueStore, HttpBlobStorage};
use intake_form::draft::{DraftStore, UiPreferences};
use intake_form::{
    document_filename, export_image, format_bytes, validate_all, validate_email, write_atomic,
    Draft, FieldName, IntakeConfig, IntakeError, PageGeometry, ProgressCallback, SelectedFile,
    UploadProgressCallback, UploadSet, UploadTracker,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One live bar per file. Transfers run concurrently, so bars advance in
/// any order; a file rejected before transfer gets a log line instead.
struct CliProgressCallback {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, (ProgressBar, Instant)>>,
    style: ProgressStyle,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold:<24}  [{bar:32.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            style,
        })
    }

    fn take_bar(&self, id: &str) -> Option<(ProgressBar, Instant)> {
        self.bars.lock().ok()?.remove(id)
    }
}

impl UploadProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, id: &str, name: &str, size: u64) {
        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(self.style.clone());
        bar.set_prefix(truncate(name, 24));
        bar.set_message(dim(&format_bytes(size)));
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(id.to_string(), (bar, Instant::now()));
        }
    }

    fn on_upload_progress(&self, id: &str, percent: u8) {
        if let Ok(bars) = self.bars.lock() {
            if let Some((bar, _)) = bars.get(id) {
                bar.set_position(u64::from(percent));
            }
        }
    }

    fn on_upload_complete(&self, id: &str, _url: &str) {
        if let Some((bar, started)) = self.take_bar(id) {
            bar.set_position(100);
            bar.finish_with_message(format!(
                "{} {}",
                green("✓"),
                dim(&format!("{:.1}s", started.elapsed().as_secs_f64()))
            ));
        }
    }

    fn on_upload_error(&self, id: &str, error: &str) {
        match self.take_bar(id) {
            Some((bar, _)) => bar.abandon_with_message(format!("{} {}", red("✗"), red(error))),
            None => {
                let _ = self
                    .multi
                    .println(format!("  {} {}  {}", red("✗"), id, red(error)));
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Validate a saved form (exit code 1 when a field is invalid)
  intake check draft.json

  # Paginate a tall snapshot into an A4 PDF
  intake paginate snapshot.png --id 8f2c1a -o out/

  # US Letter pages, lower JPEG quality
  intake paginate snapshot.png --page letter --quality 80 -o cv.pdf

  # Upload CVs with live progress
  intake upload --endpoint https://files.example.com/bucket cv.pdf cover.pdf

  # Inspect or delete the saved draft
  intake draft show --store ~/.local/share/intake/store.json
  intake draft clear --store ~/.local/share/intake/store.json

ENVIRONMENT VARIABLES:
  INTAKE_PAGE             Default page size for `paginate` (a4, letter)
  INTAKE_JPEG_QUALITY     JPEG quality of exported pages (1-100)
  INTAKE_ENDPOINT         Upload endpoint for `upload`
  INTAKE_PUBLIC_BASE      Public base URL for uploaded files
  INTAKE_MAX_UPLOAD_MB    Per-file upload limit in MB (default 10)
  INTAKE_WAIT_TIMEOUT     Seconds to wait for uploads to settle (default 30)
  INTAKE_STORAGE_PREFIX   Remote folder for uploaded files (default cvs)
  INTAKE_STORE            Key/value store file for `draft`
  RUST_LOG                Overrides the log filter chosen by -v / -q
"#;

/// Personal-information intake tools.
#[derive(Parser, Debug)]
#[command(
    name = "intake",
    version,
    about = "Validate intake forms, upload CVs and export submission PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INTAKE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INTAKE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a form or draft JSON file and list field errors.
    Check {
        /// JSON file holding a form or a saved draft.
        form: PathBuf,
    },

    /// Slice a snapshot image into a paginated PDF.
    Paginate {
        /// PNG or JPEG snapshot.
        image: PathBuf,

        /// Output file, or a directory to write `submission_{id}.pdf` into.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page size: a4 or letter.
        #[arg(long, env = "INTAKE_PAGE", default_value = "a4")]
        page: PageGeometry,

        /// JPEG quality of each page (1–100).
        #[arg(long, env = "INTAKE_JPEG_QUALITY", default_value_t = 95,
              value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,

        /// Submission id used in the document name. Defaults to the image's file stem.
        #[arg(long)]
        id: Option<String>,
    },

    /// Upload files with live per-file progress.
    Upload {
        /// Base URL files are PUT under.
        #[arg(long, env = "INTAKE_ENDPOINT")]
        endpoint: String,

        /// Base URL files are publicly served from.
        #[arg(long, env = "INTAKE_PUBLIC_BASE")]
        public_base: Option<String>,

        /// Per-file size limit in MB.
        #[arg(long, env = "INTAKE_MAX_UPLOAD_MB", default_value_t = 10)]
        max_upload_mb: u64,

        /// Seconds to wait for all transfers to settle.
        #[arg(long, env = "INTAKE_WAIT_TIMEOUT", default_value_t = 30)]
        wait_timeout: u64,

        /// Remote folder files are stored under.
        #[arg(long, env = "INTAKE_STORAGE_PREFIX", default_value = "cvs")]
        storage_prefix: String,

        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Inspect or delete the locally saved draft.
    Draft {
        #[command(subcommand)]
        action: DraftAction,

        /// JSON key/value store file.
        #[arg(long, global = true, env = "INTAKE_STORE")]
        store: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum DraftAction {
    /// Print the saved draft as JSON.
    Show,
    /// Delete the saved draft.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Progress bars cover `upload`, so keep INFO off unless asked for.
    let show_progress = !cli.quiet && matches!(cli.command, Command::Upload { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Check { form } => check(&form, cli.quiet).await,
        Command::Paginate {
            image,
            output,
            page,
            quality,
            id,
        } => paginate(&image, output, page, quality, id, cli.quiet).await,
        Command::Upload {
            endpoint,
            public_base,
            max_upload_mb,
            wait_timeout,
            storage_prefix,
            files,
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn UploadProgressCallback>)
            } else {
                None
            };
            let mut builder = IntakeConfig::builder()
                .max_upload_bytes(max_upload_mb.saturating_mul(1024 * 1024))
                .upload_wait_timeout_ms(wait_timeout.saturating_mul(1000))
                .storage_prefix(storage_prefix);
            if let Some(cb) = progress {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;
            upload(&endpoint, public_base.as_deref(), &config, &files, cli.quiet).await
        }
        Command::Draft { action, store } => {
            let store = store.context("--store (or INTAKE_STORE) is required")?;
            draft(action, &store, cli.quiet)
        }
    }
}

// ── check ────────────────────────────────────────────────────────────────────

async fn check(path: &Path, quiet: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let draft: Draft = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a form or draft JSON", path.display()))?;

    let uploads = UploadSet::restore(draft.uploaded_files, draft.cv_urls);
    let mut errors: Vec<IntakeError> = validate_all(&draft.form, &uploads)
        .into_iter()
        .map(|(field, message)| IntakeError::Validation {
            field,
            message: message.to_string(),
        })
        .collect();
    if let Some(message) = validate_email(draft.form.value(FieldName::Email)) {
        errors.push(IntakeError::Validation {
            field: FieldName::Email,
            message: message.to_string(),
        });
    }

    if errors.is_empty() {
        if !quiet {
            eprintln!(
                "{} {} is valid  {}",
                green("✔"),
                bold(&path.display().to_string()),
                dim(&format!("{} file(s), {} CV URL(s)", uploads.len(), uploads.cv_urls().len()))
            );
        }
        return Ok(());
    }

    for e in &errors {
        println!("  {} {}", red("✗"), e);
    }
    anyhow::bail!("{} field(s) invalid", errors.len())
}

// ── paginate ─────────────────────────────────────────────────────────────────

async fn paginate(
    image_path: &Path,
    output: Option<PathBuf>,
    page: PageGeometry,
    quality: u8,
    id: Option<String>,
    quiet: bool,
) -> Result<()> {
    let id = match id {
        Some(id) => id,
        None => image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Cannot derive an id from the image path; pass --id")?,
    };

    let owned = image_path.to_path_buf();
    let image = tokio::task::spawn_blocking(move || image::open(&owned))
        .await
        .context("Image decode task panicked")?
        .with_context(|| format!("Failed to open image {}", image_path.display()))?;

    let filename = document_filename(&id);
    let doc = export_image(image, &filename, page, quality)
        .await
        .context("Pagination failed")?;

    let target = match output {
        Some(p) if p.is_dir() => p.join(&doc.filename),
        Some(p) => p,
        None => PathBuf::from(&doc.filename),
    };
    write_atomic(&target, &doc.bytes).await?;

    if !quiet {
        eprintln!(
            "{}  {} page(s)  {}  →  {}",
            green("✔"),
            doc.page_count,
            dim(&format_bytes(doc.bytes.len() as u64)),
            bold(&target.display().to_string()),
        );
    }
    Ok(())
}

// ── upload ───────────────────────────────────────────────────────────────────

async fn upload(
    endpoint: &str,
    public_base: Option<&str>,
    config: &IntakeConfig,
    paths: &[PathBuf],
    quiet: bool,
) -> Result<()> {
    let storage = HttpBlobStorage::new(endpoint, public_base, config.upload_wait_timeout())
        .context("Invalid upload endpoint")?;

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        files.push(SelectedFile::new(name, bytes));
    }

    if !quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Uploading {} file(s) to {}", files.len(), endpoint))
        );
    }

    let tracker = UploadTracker::new(Arc::new(storage), config);
    let ids = tracker.select(files);

    let secs = config.upload_wait_timeout().as_secs();
    tokio::time::timeout(config.upload_wait_timeout(), tracker.wait_idle())
        .await
        .map_err(|_| IntakeError::UploadTimeout { secs })?;

    let uploads = tracker.snapshot();
    let mut failed = 0usize;
    for record in ids.iter().filter_map(|id| uploads.get(id)) {
        match (&record.url, &record.error) {
            (Some(url), _) => println!("{}\t{}", record.name, url),
            (None, Some(err)) => {
                failed += 1;
                eprintln!("  {} {}  {}", red("✗"), record.name, red(&err.to_string()));
            }
            (None, None) => {
                failed += 1;
                eprintln!("  {} {}  {}", red("✗"), record.name, red("no URL"));
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} file(s) failed to upload", ids.len());
    }
    if !quiet {
        eprintln!("{} {} file(s) uploaded", green("✔"), bold(&ids.len().to_string()));
    }
    Ok(())
}

// ── draft ────────────────────────────────────────────────────────────────────

fn draft(action: DraftAction, store: &Path, quiet: bool) -> Result<()> {
    let kv = Arc::new(FileKeyValueStore::new(store));
    let drafts = DraftStore::new(kv.clone());

    match action {
        DraftAction::Show => {
            let draft = drafts
                .load()
                .with_context(|| format!("No draft saved in {}", store.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&draft).context("Failed to serialise draft")?
            );
            if !quiet {
                let panel = if UiPreferences::new(kv).panel_open() {
                    "open"
                } else {
                    "closed"
                };
                eprintln!(
                    "{}",
                    dim(&format!(
                        "{} file(s), {} CV URL(s), form-data panel {}",
                        draft.uploaded_files.len(),
                        draft.cv_urls.len(),
                        panel
                    ))
                );
            }
        }
        DraftAction::Clear => {
            let existed = drafts.exists();
            drafts.clear();
            if !quiet {
                if existed {
                    eprintln!("{} Draft deleted from {}", green("✔"), store.display());
                } else {
                    eprintln!("{} No draft in {}", dim("·"), store.display());
                }
            }
        }
    }
    Ok(())
}
