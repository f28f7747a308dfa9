//! CLI binary for slides2textbook.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TextbookConfig`, runs chapter or book mode, and writes the outputs.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use slides2textbook::book::{book_system_prompt, chapter_title};
use slides2textbook::export::DEFAULT_PDF_ENGINE;
use slides2textbook::{
    collect_chapter_sources, export_epub, export_pdf, generate_book, generate_chapter,
    preview_chapter, resolve_output_name, save_markdown, BookSink, ChapterSeparator,
    GenerationMode, GenerationProgressCallback, GenerationStats, MarkdownFileSink, ProgressCallback,
    PromptRules, TextbookConfig,
};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

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

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a progress bar over chapters (book mode) or
/// sections (agents mode), with one log line per finished unit.
struct CliProgressCallback {
    bar: ProgressBar,
    /// "chapters" or "sections".
    unit: &'static str,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_generation_start` tells us the total.
    fn new(unit: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading context…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            unit,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let template = format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}",
            self.unit
        );
        let progress_style = ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Writing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, number: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&number))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_generation_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Writing {total} {}…", self.unit))
        ));
    }

    fn on_chapter_start(&self, number: usize, _total: usize, title: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(number, Instant::now());
        }
        self.bar.set_message(title.to_string());
    }

    fn on_chapter_complete(&self, number: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(number);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<12}  {}",
            green("✓"),
            number,
            total,
            dim(&format!("{markdown_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chapter_error(&self, number: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(number);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            number,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_generation_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} {} written",
                green("✔"),
                bold(&success_count.to_string()),
                self.unit
            );
        } else {
            eprintln!(
                "{} {}/{} {} written  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                self.unit,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One chapter from everything in a lecture folder (slides, transcript, notes)
  slides2textbook -l lectures/week-03

  # Planner + writer agents, custom output name, Markdown only
  slides2textbook -l lectures/week-03 -a -n "Week 3 - Joins" --no-pdf --no-epub

  # A whole book: one chapter per slide deck, saved after every chapter
  slides2textbook -l decks/ --book --title "Database Systems"

  # Only some prompt rules, plus one of your own
  slides2textbook -l week-03 --rules 0,1,2,3,8 --extra-rule "Use British spelling."

  # Add a slide deck published online to the local material
  slides2textbook -l week-03 --slides-url https://uni.example/comp2400/06-Logic.pdf

  # Show the prompts without calling the model
  slides2textbook -l week-03 --dry-run

PROMPT RULES (--rules takes indices or names):
  0 role             1 follow-slides     2 markdown-only
  3 no-artifacts     4 no-extras         5 transcript-aware
  6 no-images        7 standalone        8 no-preamble

BOOK MODE INPUT:
  Every .pdf and .md file is a chapter, ordered by file name. A .txt file with
  the same name (01_Intro.pdf + 01_Intro.txt) is used as the lecture transcript.
  -a, --rules and --extra-rule are chapter-mode only; --system-prompt replaces
  the book prompt.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model used together with EDGEQUAKE_LLM_PROVIDER
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

  Variables are also read from a .env file in the working directory.

EXPORT:
  PDF and EPUB are rendered with pandoc, which must be on PATH. The default
  PDF engine (xelatex) needs a TeX distribution; --pdf-engine weasyprint
  avoids that.
"#;

/// Turn lecture slides and transcripts into textbook chapters with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "slides2textbook",
    version,
    about = "Turn lecture slides and transcripts into textbook chapters with an LLM",
    long_about = "Load a directory of lecture material (slide PDFs, transcripts, notes) and \
have a large language model write the textbook chapter it describes. Book mode turns every \
slide deck of a directory into one chapter of a book. Output is Markdown, PDF and EPUB.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory with the lecture material.
    #[arg(short = 'l', long, env = "S2T_LOAD_CONTEXT", value_parser = existing_dir)]
    load_context: PathBuf,

    /// Directory the outputs are written to.
    #[arg(short, long, env = "S2T_OUT_DIR", default_value = "output")]
    out_dir: PathBuf,

    /// Base name of the output files (default: the context directory's name).
    #[arg(short, long, env = "S2T_NAME")]
    name: Option<String>,

    /// Do not write the Markdown file.
    #[arg(long)]
    no_md: bool,

    /// Do not render a PDF.
    #[arg(long)]
    no_pdf: bool,

    /// Do not render an EPUB.
    #[arg(long)]
    no_epub: bool,

    /// LLM model ID.
    #[arg(short, long, env = "S2T_MODEL", default_value = slides2textbook::config::DEFAULT_MODEL)]
    model: String,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "S2T_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Plan the chapter first, then write it section by section (chapter mode only).
    #[arg(short, long, env = "S2T_AGENTS", conflicts_with = "book")]
    agents: bool,

    /// Slide deck PDF URL added to the chapter context (repeatable).
    #[arg(long = "slides-url", conflicts_with = "book")]
    slides_urls: Vec<String>,

    /// Seconds allowed for each --slides-url download.
    #[arg(long, env = "S2T_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Book mode: one chapter per slide deck.
    #[arg(long, env = "S2T_BOOK")]
    book: bool,

    /// Book title (default: derived from the output name).
    #[arg(long, env = "S2T_TITLE", requires = "book")]
    title: Option<String>,

    /// Prompt rules to use, by index or name: "0,1,2" or "role,no-preamble".
    /// Chapter mode only; book mode has its own system prompt.
    #[arg(long, env = "S2T_RULES", conflicts_with = "book")]
    rules: Option<String>,

    /// Extra instruction appended to the prompt rules (repeatable, chapter mode only).
    #[arg(long = "extra-rule", conflicts_with = "book")]
    extra_rules: Vec<String>,

    /// File whose contents replace the built-in system prompt.
    #[arg(long, env = "S2T_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per call.
    #[arg(long, env = "S2T_MAX_TOKENS", default_value_t = 16384)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0); provider default when unset.
    #[arg(long, env = "S2T_TEMPERATURE")]
    temperature: Option<f32>,

    /// Retries per LLM call.
    #[arg(long, env = "S2T_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "S2T_API_TIMEOUT", default_value_t = 600)]
    api_timeout: u64,

    /// pandoc PDF engine (xelatex, lualatex, pdflatex, weasyprint, ...).
    #[arg(long, env = "S2T_PDF_ENGINE", default_value = DEFAULT_PDF_ENGINE)]
    pdf_engine: String,

    /// Book chapter separator: none, hr, pagebreak, or a custom string.
    #[arg(long, env = "S2T_SEPARATOR", default_value = "none")]
    separator: String,

    /// Replace typographic punctuation with ASCII (for engines lacking glyphs).
    #[arg(long, env = "S2T_ASCII_SAFE")]
    ascii_safe: bool,

    /// Prepend a YAML title block read by pandoc.
    #[arg(long, env = "S2T_FRONT_MATTER")]
    front_matter: bool,

    /// Print the result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Print the prompts (or book chapters) without calling the model.
    #[arg(long)]
    dry_run: bool,

    /// Disable progress bar.
    #[arg(long, env = "S2T_NO_PROGRESS")]
    no_progress: bool,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less log output (-q warnings, -qq errors only).
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Also write logs to this file.
    #[arg(long, env = "S2T_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn existing_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("'{}' is not a directory", s))
    }
}

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Log level index for the given -v/-q counts, starting from info.
fn level_index(verbose: u8, quiet: u8) -> usize {
    (2 + verbose as i32 - quiet as i32).clamp(0, 4) as usize
}

fn init_logging(cli: &Cli, show_progress: bool) -> Result<()> {
    let level = LEVELS[level_index(cli.verbose, cli.quiet)];
    // The progress bar gives all the feedback that matters unless -v is asked for.
    let stderr_level = if show_progress && cli.verbose == 0 {
        "error"
    } else {
        level
    };

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(stderr_level)),
    );

    let file_layer = match cli.log_file {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(
                        EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| EnvFilter::new(level)),
                    ),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; keys may come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let quiet = cli.quiet > 0;
    let show_progress = !quiet && !cli.no_progress && !cli.json && !cli.dry_run;
    init_logging(&cli, show_progress)?;

    let save_md = !cli.no_md;
    let save_pdf = !cli.no_pdf;
    let save_epub = !cli.no_epub;
    if !save_md && !save_pdf && !save_epub && !cli.json && !cli.dry_run {
        warn!("--no-md, --no-pdf and --no-epub are all set; nothing will be saved");
    }

    let name = resolve_output_name(cli.name.as_deref(), &cli.load_context);
    let title = cli.title.clone().unwrap_or_else(|| chapter_title(&name));

    let progress_cb: Option<ProgressCallback> = if show_progress && (cli.book || cli.agents) {
        let unit = if cli.book { "chapters" } else { "sections" };
        Some(CliProgressCallback::new(unit) as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Dry run ──────────────────────────────────────────────────────────
    if cli.dry_run {
        return dry_run(&cli, &config, &title).await;
    }

    // ── Generate ─────────────────────────────────────────────────────────
    let start = Instant::now();
    let (markdown, stats) = if cli.book {
        let sink = MarkdownFileSink::new(&cli.out_dir, &name);
        let sink_ref: Option<&dyn BookSink> = if save_md { Some(&sink) } else { None };
        let book = generate_book(&cli.load_context, &title, &config, sink_ref)
            .await
            .context("Book generation failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&book).context("Failed to serialise output")?
            );
        }
        (book.markdown, book.stats)
    } else {
        let spinner = (show_progress && !cli.agents).then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&TICKS),
            );
            bar.set_prefix("Writing");
            bar.set_message(format!("chapter with {}", cli.model));
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        let result = generate_chapter(&cli.load_context, &config).await;
        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }
        let chapter = result.context("Chapter generation failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&chapter).context("Failed to serialise output")?
            );
        }
        (chapter.markdown, chapter.stats)
    };

    // ── Save & export ────────────────────────────────────────────────────
    let mut written: Vec<PathBuf> = Vec::new();
    let mut export_errors = 0usize;

    // pandoc reads from a file; without --no-md that file is the real output.
    let scratch = if save_md {
        None
    } else if save_pdf || save_epub {
        Some(tempfile::tempdir().context("Failed to create temp dir")?)
    } else {
        None
    };
    let md_dir = scratch.as_ref().map(|d| d.path()).unwrap_or(cli.out_dir.as_path());

    if save_md || save_pdf || save_epub {
        let md_path = save_markdown(&markdown, md_dir, &name)
            .await
            .context("Failed to save Markdown")?;
        if save_md {
            written.push(md_path.clone());
        }
        if save_pdf {
            let pdf_path = cli.out_dir.join(format!("{name}.pdf"));
            tokio::fs::create_dir_all(&cli.out_dir)
                .await
                .with_context(|| format!("Failed to create {}", cli.out_dir.display()))?;
            match export_pdf(&md_path, &pdf_path, &cli.pdf_engine).await {
                Ok(()) => written.push(pdf_path),
                Err(e) => {
                    export_errors += 1;
                    eprintln!("{} {}", red("✘"), e);
                }
            }
        }
        if save_epub {
            let epub_path = cli.out_dir.join(format!("{name}.epub"));
            tokio::fs::create_dir_all(&cli.out_dir)
                .await
                .with_context(|| format!("Failed to create {}", cli.out_dir.display()))?;
            match export_epub(&md_path, &epub_path).await {
                Ok(()) => written.push(epub_path),
                Err(e) => {
                    export_errors += 1;
                    eprintln!("{} {}", red("✘"), e);
                }
            }
        }
    }

    if !quiet && !cli.json {
        print_summary(&stats, &written, start.elapsed());
    }
    info!("Done in {:.1}s", start.elapsed().as_secs_f64());

    if export_errors > 0 {
        anyhow::bail!("{export_errors} export(s) failed; the Markdown output is still available");
    }
    Ok(())
}

fn print_summary(stats: &GenerationStats, written: &[PathBuf], elapsed: Duration) {
    eprintln!(
        "{}  {} LLM calls  {:.1}s",
        if stats.failed == 0 { green("✔") } else { cyan("⚠") },
        stats.llm_calls,
        elapsed.as_secs_f64(),
    );
    eprintln!(
        "   {} tokens in ({} cached)  /  {} tokens out ({} reasoning)",
        dim(&stats.usage.input_tokens.to_string()),
        dim(&stats.usage.cached_tokens.to_string()),
        dim(&stats.usage.output_tokens.to_string()),
        dim(&stats.usage.reasoning_tokens.to_string()),
    );
    for path in written {
        eprintln!("   →  {}", bold(&path.display().to_string()));
    }
}

async fn dry_run(cli: &Cli, config: &TextbookConfig, title: &str) -> Result<()> {
    if cli.book {
        let sources =
            collect_chapter_sources(&cli.load_context).context("Failed to list chapters")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&sources).context("Failed to serialise chapters")?
            );
            return Ok(());
        }
        println!("Book: {title}\n");
        for (i, source) in sources.iter().enumerate() {
            let transcript = source
                .transcript
                .as_deref()
                .map(|t| format!("  + {}", display_name(t)))
                .unwrap_or_default();
            println!(
                "{:>3}. {}  ({}){}",
                i + 1,
                source.title(),
                display_name(&source.slides),
                transcript
            );
        }
        println!("\n── system prompt ──\n{}", book_system_prompt(config));
        return Ok(());
    }

    let preview = preview_chapter(&cli.load_context, config)
        .await
        .context("Failed to load context")?;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&preview).context("Failed to serialise preview")?
        );
    } else {
        println!("── system prompt ({:?}) ──\n{}", preview.mode, preview.system);
        println!("── user prompt ({} files) ──\n{}", preview.sources.len(), preview.user);
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Map CLI args to `TextbookConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TextbookConfig> {
    let mut rules = match cli.rules {
        Some(ref list) => PromptRules::parse_list(list)
            .map_err(|e| anyhow::anyhow!("Invalid --rules '{}': {}", list, e))?,
        None => PromptRules::all(),
    };
    for extra in &cli.extra_rules {
        rules.push_custom(extra.clone());
    }

    let mut builder = TextbookConfig::builder()
        .model(cli.model.clone())
        .rules(rules)
        .mode(if cli.agents {
            GenerationMode::Agents
        } else {
            GenerationMode::Direct
        })
        .chapter_separator(parse_separator(&cli.separator))
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .ascii_safe(cli.ascii_safe)
        .include_front_matter(cli.front_matter);

    for url in &cli.slides_urls {
        builder = builder.remote_slide(url.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `ChapterSeparator`.
fn parse_separator(s: &str) -> ChapterSeparator {
    match s.to_lowercase().as_str() {
        "none" => ChapterSeparator::None,
        "hr" | "---" => ChapterSeparator::HorizontalRule,
        "pagebreak" | "newpage" => ChapterSeparator::PageBreak,
        _ => ChapterSeparator::Custom(s.to_string()),
    }
}
