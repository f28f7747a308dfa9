//! Book mode: every slide deck in a directory becomes one chapter.
//!
//! Chapters are generated strictly in file-name order because each one is
//! prompted with the previous successful chapter, so the narrative carries
//! across the book. After every chapter the accumulated document is handed
//! to a [`BookSink`], which lets the CLI keep the file on disk current during
//! runs that take hours.
//!
//! A failed chapter is recorded in [`ChapterResult::error`] and skipped; only
//! a book in which every chapter failed is an error.

use crate::config::TextbookConfig;
use crate::error::{ChapterError, TextbookError};
use crate::export::yaml_front_matter;
use crate::output::{BookOutput, ChapterResult, GenerationStats, TokenCount};
use crate::pipeline::context::{file_key, list_files, load_text_file};
use crate::pipeline::llm::{generate_with_retry, resolve_generator, TextGenerator};
use crate::pipeline::postprocess::{ascii_safe, clean_markdown, nest_headings};
use crate::pipeline::{extract, input};
use crate::prompts::{book_user_prompt, BOOK_SYSTEM_PROMPT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Receives the book after every chapter.
#[async_trait]
pub trait BookSink: Send + Sync {
    /// `markdown` is the whole book so far, not just the newest chapter.
    async fn save(&self, markdown: &str) -> Result<(), TextbookError>;
}

/// One chapter's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSource {
    /// Slide deck (`.pdf`) or pre-extracted slide text (`.md`).
    pub slides: PathBuf,
    /// Transcript sharing the deck's file stem, if any.
    pub transcript: Option<PathBuf>,
}

impl ChapterSource {
    pub fn title(&self) -> String {
        chapter_title(&file_key(&self.slides))
    }
}

/// Chapter title from a file stem: underscores become spaces.
pub fn chapter_title(stem: &str) -> String {
    stem.replace('_', " ").trim().to_string()
}

fn is_slide_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref(),
        Some("pdf") | Some("md")
    )
}

fn is_transcript(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
}

/// Find the chapters of a book directory.
///
/// `.pdf` and `.md` files are chapters, in file-name order. A `.txt` file
/// whose stem matches a chapter is that chapter's transcript; every other
/// file is ignored.
pub fn collect_chapter_sources(dir: &Path) -> Result<Vec<ChapterSource>, TextbookError> {
    let files = list_files(dir)?;
    let transcripts: Vec<&PathBuf> = files.iter().filter(|p| is_transcript(p)).collect();

    let sources: Vec<ChapterSource> = files
        .iter()
        .filter(|p| is_slide_file(p))
        .map(|slides| {
            let stem = file_key(slides);
            ChapterSource {
                slides: slides.clone(),
                transcript: transcripts
                    .iter()
                    .find(|t| file_key(t) == stem)
                    .map(|t| (*t).clone()),
            }
        })
        .collect();

    for path in files.iter().filter(|p| !is_slide_file(p) && !is_transcript(p)) {
        debug!("Ignoring {} (not a slide deck or transcript)", path.display());
    }

    if sources.is_empty() {
        return Err(TextbookError::NoChapterSources {
            path: dir.to_path_buf(),
        });
    }
    Ok(sources)
}

/// Load a chapter's slide text and optional transcript.
pub async fn load_chapter_source(
    source: &ChapterSource,
) -> Result<(String, Option<String>), TextbookError> {
    let is_pdf = source
        .slides
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    let slides = if is_pdf {
        let path = input::resolve_local(&source.slides)?;
        extract::pdf_to_text(&path).await?
    } else {
        load_text_file(&source.slides).await?
    };

    let transcript = match source.transcript {
        Some(ref path) => Some(load_text_file(path).await?),
        None => None,
    };
    Ok((slides, transcript))
}

/// Book-mode system prompt: the override if set, else the built-in one.
pub fn book_system_prompt(config: &TextbookConfig) -> &str {
    config.system_prompt.as_deref().unwrap_or(BOOK_SYSTEM_PROMPT)
}

/// Assemble a book from its title and successful chapters.
pub fn assemble_book(title: &str, chapters: &[ChapterResult], config: &TextbookConfig) -> String {
    let mut book = String::new();
    if config.include_front_matter {
        book.push_str(&yaml_front_matter(title));
    }
    book.push_str(&format!("# {}\n\n", title));

    for (i, chapter) in chapters.iter().filter(|c| c.is_ok()).enumerate() {
        if i > 0 {
            book.push_str(&config.chapter_separator.render(chapter.number));
        }
        book.push_str(chapter.markdown.trim_end());
    }
    book.push('\n');
    book
}

/// Generate a book from every slide deck in `dir`.
///
/// Each chapter is one direct call with [`book_system_prompt`]; `config.mode`
/// and `config.rules` only shape chapter mode.
///
/// # Errors
/// Fatal when `dir` has no chapter sources, the provider is not configured,
/// the sink fails, or every chapter fails.
pub async fn generate_book(
    dir: impl AsRef<Path>,
    title: &str,
    config: &TextbookConfig,
    sink: Option<&dyn BookSink>,
) -> Result<BookOutput, TextbookError> {
    let start = Instant::now();
    let dir = dir.as_ref();
    let sources = collect_chapter_sources(dir)?;
    let generator = resolve_generator(config)?;
    let total = sources.len();
    info!("Generating '{}' from {} chapters in {}", title, total, dir.display());

    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_generation_start(total);
    }

    let mut stats = GenerationStats {
        total_units: total,
        ..Default::default()
    };
    let mut chapters: Vec<ChapterResult> = Vec::with_capacity(total);
    let mut previous: Option<String> = None;

    for (i, source) in sources.iter().enumerate() {
        let number = i + 1;
        let chapter_title = source.title();
        if let Some(cb) = cb {
            cb.on_chapter_start(number, total, &chapter_title);
        }
        info!("Chapter {}/{}: {}", number, total, chapter_title);

        let result = write_chapter(
            generator.as_ref(),
            number,
            &chapter_title,
            source,
            previous.as_deref(),
            config,
            &mut stats,
        )
        .await;

        match result.error {
            None => {
                stats.succeeded += 1;
                if let Some(cb) = cb {
                    cb.on_chapter_complete(number, total, result.markdown.len());
                }
                previous = Some(result.markdown.clone());
            }
            Some(ref e) => {
                stats.failed += 1;
                warn!("Skipping chapter {}: {}", number, e);
                if let Some(cb) = cb {
                    cb.on_chapter_error(number, total, &e.to_string());
                }
            }
        }
        chapters.push(result);

        if let Some(sink) = sink {
            sink.save(&assemble_book(title, &chapters, config)).await?;
        }
    }

    if let Some(cb) = cb {
        cb.on_generation_complete(total, stats.succeeded);
    }

    if stats.succeeded == 0 {
        let first_error = chapters
            .iter()
            .find_map(|c| c.error.as_ref().map(|e| e.to_string()))
            .unwrap_or_default();
        return Err(TextbookError::AllChaptersFailed {
            total,
            retries: config.max_retries,
            first_error,
        });
    }

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Book complete: {}/{} chapters, tokens {}",
        stats.succeeded, total, stats.usage
    );

    Ok(BookOutput {
        title: title.to_string(),
        markdown: assemble_book(title, &chapters, config),
        chapters,
        stats,
    })
}

async fn write_chapter(
    generator: &dyn TextGenerator,
    number: usize,
    title: &str,
    source: &ChapterSource,
    previous: Option<&str>,
    config: &TextbookConfig,
    stats: &mut GenerationStats,
) -> ChapterResult {
    let start = Instant::now();
    let mut result = ChapterResult {
        number,
        title: title.to_string(),
        source: source.slides.clone(),
        markdown: String::new(),
        usage: TokenCount::default(),
        duration_ms: 0,
        retries: 0,
        error: None,
    };

    let (slides, transcript) = match load_chapter_source(source).await {
        Ok(loaded) => loaded,
        Err(e) => {
            result.error = Some(ChapterError::LoadFailed {
                chapter: number,
                detail: e.to_string(),
            });
            result.duration_ms = start.elapsed().as_millis() as u64;
            return result;
        }
    };

    let user = book_user_prompt(number, title, &slides, transcript.as_deref(), previous);
    let label = format!("chapter {}", number);
    let outcome =
        generate_with_retry(generator, &label, book_system_prompt(config), &user, config).await;

    let call = outcome.stats();
    stats.record(&call);
    result.usage = call.usage;
    result.retries = outcome.retries.min(u8::MAX as u32) as u8;

    match outcome.result {
        Ok(generation) => {
            let mut markdown = nest_headings(&clean_markdown(&generation.text), 2);
            if config.ascii_safe {
                markdown = ascii_safe(&markdown);
            }
            result.markdown = markdown;
        }
        Err(e) => {
            result.error = Some(ChapterError::LlmFailed {
                chapter: number,
                retries: result.retries,
                detail: e.to_string(),
            });
        }
    }
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}
