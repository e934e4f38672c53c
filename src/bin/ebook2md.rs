//! CLI binary for edgequake-ebook2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, converts each input in turn and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ebook2md::{
    convert, ConversionConfig, ConversionOutput, ConversionProgressCallback, OcrBackend,
    OutputFormat, PollPolicy, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

/// One spinner per input: the remote poll loop and local OCR both report
/// through its message line.
struct CliProgressCallback {
    bar: ProgressBar,
    failed_images: AtomicUsize,
}

impl CliProgressCallback {
    fn new(prefix: &str) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(prefix.to_string());
        bar.set_message("Preparing…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed_images: AtomicUsize::new(0),
        })
    }

    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, input: &str) {
        self.bar.set_message(format!("Converting {input}"));
    }

    fn on_task_submitted(&self, task_id: &str) {
        self.bar.println(format!("  {} task {}", cyan("◆"), dim(task_id)));
        self.bar.set_message("Waiting for remote parser…");
    }

    fn on_poll(&self, _task_id: &str, elapsed_secs: u64, status: &str) {
        self.bar
            .set_message(format!("Remote task {status} ({elapsed_secs}s of poll budget used)"));
    }

    fn on_page_recognized(&self, page_num: usize, total_pages: usize) {
        self.bar.set_message(format!("OCR page {page_num}/{total_pages}"));
    }

    fn on_image_resolved(&self, url: &str, ok: bool) {
        if !ok {
            self.failed_images.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!("  {} image {}", red("✗"), dim(url)));
        }
    }

    fn on_conversion_complete(&self, markdown_len: usize) {
        self.bar.finish_and_clear();
        let failed = self.failed_images.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} chars", green("✔"), bold(&markdown_len.to_string()));
        } else {
            eprintln!(
                "{} {} chars  ({} image(s) could not be fetched)",
                cyan("⚠"),
                bold(&markdown_len.to_string()),
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Remote parsing (default backend), Markdown on stdout
  ebook2md book.pdf

  # Write to a file, images downloaded next to it instead of inlined
  ebook2md book.epub -o out/book.md --no-inline-images

  # Local OCR with tesseract, HTML output
  ebook2md --backend local --lang chi_sim+eng --format html scan.pdf -o scan.html

  # Several inputs into one directory; failures do not stop the batch
  ebook2md a.pdf b.mobi c.png -o converted/

ENVIRONMENT VARIABLES:
  BAIDU_OCR_API_KEY       API key for the remote backend
  BAIDU_OCR_SECRET_KEY    Secret key for the remote backend
  EBOOK2MD_API_BASE       Override the remote API host
  PDFIUM_LIB_PATH         pdfium shared library (file or directory), local backend
  RUST_LOG                Override the log filter

EXTERNAL TOOLS:
  ebook-convert (Calibre)   EPUB / MOBI input
  tesseract                 --backend local
"#;

/// Convert PDF, image, EPUB and MOBI documents to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "ebook2md",
    version,
    about = "Convert PDF, image, EPUB and MOBI documents to Markdown",
    long_about = "Convert PDF, PNG/JPEG, EPUB and MOBI documents (or an inlined base64 image) to \
Markdown or HTML, using a remote document parser or local tesseract OCR. Tables are rebuilt with \
merged cells, figures are cropped and linked, and remote images are inlined or downloaded.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files (pdf, png, jpg, jpeg, epub, mobi) or base64 image payloads.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output file, or output directory when several inputs are given.
    #[arg(short, long, env = "EBOOK2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Recognition backend.
    #[arg(long, env = "EBOOK2MD_BACKEND", value_enum, default_value = "remote")]
    backend: BackendArg,

    /// Output format.
    #[arg(long, env = "EBOOK2MD_FORMAT", value_enum, default_value = "md")]
    format: FormatArg,

    /// Download remote images into `<stem>_images/` instead of inlining them.
    #[arg(long, env = "EBOOK2MD_NO_INLINE_IMAGES")]
    no_inline_images: bool,

    /// Remote backend API key.
    #[arg(long, env = "BAIDU_OCR_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Remote backend secret key.
    #[arg(long, env = "BAIDU_OCR_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Remote API host.
    #[arg(long, env = "EBOOK2MD_API_BASE")]
    api_base: Option<String>,

    /// Seconds to wait for the remote task before giving up.
    #[arg(long, env = "EBOOK2MD_MAX_WAIT", default_value_t = 120)]
    max_wait: u64,

    /// Seconds between remote status queries.
    #[arg(long, env = "EBOOK2MD_POLL_INTERVAL", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: u64,

    /// Tesseract language pack(s), e.g. chi_sim+eng.
    #[arg(long, env = "EBOOK2MD_LANG", default_value = "chi_sim")]
    lang: String,

    /// Page render zoom for local OCR.
    #[arg(long, env = "EBOOK2MD_RENDER_SCALE", default_value_t = 2.0)]
    render_scale: f32,

    /// tesseract binary.
    #[arg(long, env = "EBOOK2MD_TESSERACT", default_value = "tesseract")]
    tesseract: String,

    /// Calibre converter binary.
    #[arg(long, env = "EBOOK2MD_EBOOK_CONVERT", default_value = "ebook-convert")]
    ebook_convert: String,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "EBOOK2MD_HTTP_TIMEOUT", default_value_t = 120)]
    http_timeout: u64,

    /// Output structured JSON (ConversionOutput) instead of the document.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "EBOOK2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EBOOK2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EBOOK2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Remote,
    Local,
}

impl From<BackendArg> for OcrBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Remote => OcrBackend::Remote,
            BackendArg::Local => OcrBackend::Local,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Md,
    Html,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Md => OutputFormat::Markdown,
            FormatArg::Html => OutputFormat::Html,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries progress; library INFO logs would tear through it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let base = build_config(&cli)?;
    let batch = cli.inputs.len() > 1;
    let mut failures = 0usize;

    // ── Convert each input ───────────────────────────────────────────────
    for (i, input) in cli.inputs.iter().enumerate() {
        let mut config = base.clone();
        config.output_path = output_for(&cli, i, input, batch);

        let spinner = if show_progress {
            let cb = CliProgressCallback::new(&format!("[{}/{}]", i + 1, cli.inputs.len()));
            config.progress_callback = Some(cb.clone() as ProgressCallback);
            Some(cb)
        } else {
            None
        };

        let result = convert(input, &config)
            .await
            .with_context(|| format!("Conversion of '{}' failed", short(input)));

        match result {
            Ok(output) => report(&cli, &output, config.output_path.is_some())?,
            Err(e) => {
                if let Some(cb) = spinner {
                    cb.abandon();
                }
                if !batch {
                    return Err(e);
                }
                failures += 1;
                eprintln!("{} {:#}", red("✘"), e);
            }
        }
    }

    if batch && !cli.quiet {
        let ok = cli.inputs.len() - failures;
        eprintln!(
            "{} {}/{} inputs converted",
            if failures == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            cli.inputs.len()
        );
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} input(s) failed", cli.inputs.len());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .backend(cli.backend.into())
        .output_format(cli.format.into())
        .inline_images(!cli.no_inline_images)
        .poll(PollPolicy {
            interval: Duration::from_secs(cli.poll_interval),
            max_wait: Duration::from_secs(cli.max_wait),
        })
        .ocr_lang(&cli.lang)
        .render_scale(cli.render_scale)
        .tesseract_bin(&cli.tesseract)
        .ebook_convert_bin(&cli.ebook_convert)
        .http_timeout_secs(cli.http_timeout);

    if let (Some(key), Some(secret)) = (&cli.api_key, &cli.secret_key) {
        builder = builder.credentials(key, secret);
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base);
    }

    builder.build().context("Invalid configuration")
}

/// Where the artifact for `input` goes, if anywhere.
///
/// A single input without `-o` prints to stdout. In a batch, `-o` names a
/// directory; without it each artifact lands next to its input.
/// Inlined payloads are named `image_<n>` and written to the current
/// directory unless `-o` is given.
fn output_for(cli: &Cli, index: usize, input: &str, batch: bool) -> Option<PathBuf> {
    if !batch {
        return cli.output.clone();
    }
    let ext = OutputFormat::from(cli.format).extension();
    let path = Path::new(input);
    let is_file = path.is_file();
    let stem = path
        .file_stem()
        .filter(|_| is_file)
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("image_{}", index + 1));
    let file = format!("{stem}.{ext}");
    Some(match &cli.output {
        Some(dir) => dir.join(file),
        None if is_file => path.with_file_name(file),
        None => PathBuf::from(file),
    })
}

fn report(cli: &Cli, output: &ConversionOutput, written: bool) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if !written {
        let content = output.content();
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(content.as_bytes())
            .context("Failed to write to stdout")?;
        if !content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        let stats = &output.stats;
        let mut line = format!("   {} backend  {}ms", stats.backend, stats.total_duration_ms);
        if let Some(pages) = output.page_count {
            line.push_str(&format!("  {pages} page(s)"));
        }
        if let Some(figures) = output.figure_count {
            line.push_str(&format!("  {figures} figure(s)"));
        }
        if stats.tables_rebuilt > 0 {
            line.push_str(&format!("  {} table(s)", stats.tables_rebuilt));
        }
        if let Some(ref path) = output.output_path {
            line.push_str(&format!("  →  {}", bold(&path.display().to_string())));
        }
        eprintln!("{}", dim(&line));
        for failure in &output.image_failures {
            eprintln!("   {} {}", red("✗"), failure);
        }
    }
    Ok(())
}

/// Inline base64 payloads make unreadable error lines.
fn short(input: &str) -> String {
    match input.char_indices().nth(60) {
        Some((at, _)) => format!("{}…", &input[..at]),
        None => input.to_string(),
    }
}
