//! # slides2textbook
//!
//! Turn lecture material (slide decks, transcripts, notes) into long-form
//! textbook chapters with a large language model.
//!
//! ## Why this crate?
//!
//! Slides are terse by design: bullet fragments, half-sentences, formulas
//! without derivations. The lecture itself fills the gaps. This crate hands
//! the model everything a student would have had (the deck, the transcript,
//! the notes) and asks for the chapter a textbook author would write from it.
//!
//! ## Two Modes
//!
//! * **Chapter mode** ([`generate_chapter`]): every file of a context
//!   directory is merged into one context block that becomes one chapter,
//!   either in a single call or with planner/writer agents
//!   ([`GenerationMode::Agents`]).
//! * **Book mode** ([`generate_book`]): every slide deck of a directory
//!   becomes a chapter, in file-name order, each prompted with the chapter
//!   before it. The book is handed to a [`BookSink`] after every chapter.
//!
//! ## Pipeline Overview
//!
//! ```text
//! context dir
//!  │
//!  ├─ 1. Input    validate PDFs (magic bytes) or download from a URL
//!  ├─ 2. Extract  slide text via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Context  "{name}:\n{text}\n\n" per file, in file-name order
//!  ├─ 4. LLM      rule-built prompt → model, retried with backoff
//!  ├─ 5. Polish   fences, whitespace, heading spacing, invisible chars
//!  └─ 6. Export   atomic .md write, then pandoc → PDF / EPUB
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slides2textbook::{generate_chapter, TextbookConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TextbookConfig::default();
//!     let chapter = generate_chapter("lectures/week-03", &config).await?;
//!     println!("{}", chapter.markdown);
//!     eprintln!("tokens: {}", chapter.stats.usage);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `slides2textbook` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! slides2textbook = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod agents;
pub mod book;
pub mod chapter;
pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use book::{collect_chapter_sources, generate_book, BookSink, ChapterSource};
pub use chapter::{generate_chapter, generate_chapter_sync, preview_chapter, PromptPreview};
pub use config::{ChapterSeparator, GenerationMode, TextbookConfig, TextbookConfigBuilder};
pub use error::{ChapterError, GenerationError, TextbookError};
pub use export::{
    export_epub, export_pdf, resolve_output_name, sanitize_filename, save_markdown,
    MarkdownFileSink,
};
pub use output::{BookOutput, ChapterOutput, ChapterResult, GenerationStats, TokenCount};
pub use pipeline::llm::{Generation, TextGenerator};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{PromptRule, PromptRules};
