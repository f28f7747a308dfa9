//! Chapter mode: one context directory in, one textbook chapter out.
//!
//! Every file in the directory (slides, transcripts, notes) is merged into a
//! single context block. In [`GenerationMode::Direct`] one call turns that
//! block into a chapter; in [`GenerationMode::Agents`] a planner outlines the
//! chapter and a writer fills in each section in order.

use crate::agents::{generate_plan, generate_section};
use crate::config::{GenerationMode, TextbookConfig};
use crate::error::TextbookError;
use crate::export::yaml_front_matter;
use crate::output::{ChapterOutput, GenerationStats};
use crate::pipeline::context::{file_key, load_context_sources};
use crate::pipeline::llm::{generate_with_retry, resolve_generator, TextGenerator};
use crate::pipeline::postprocess::{ascii_safe, clean_markdown};
use crate::prompts::build_system_prompt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// The prompts a chapter-mode run would send, without sending them.
#[derive(Debug, Clone, Serialize)]
pub struct PromptPreview {
    pub mode: GenerationMode,
    /// System prompt (direct mode) or planner prompt (agents mode).
    pub system: String,
    /// Formatted context sent as the user prompt.
    pub user: String,
    pub sources: Vec<PathBuf>,
}

/// The chapter-mode system prompt: the override if set, else the rule list.
pub fn chapter_system_prompt(config: &TextbookConfig) -> String {
    match config.system_prompt {
        Some(ref prompt) => prompt.clone(),
        None => build_system_prompt(&config.rules),
    }
}

/// Generate a chapter from every file in `context_dir`, plus any
/// `config.remote_slides`.
///
/// # Errors
/// Fatal on a missing directory, unsupported or unreadable files, an empty
/// context, an unconfigured provider, or an LLM call that fails after all
/// retries.
pub async fn generate_chapter(
    context_dir: impl AsRef<Path>,
    config: &TextbookConfig,
) -> Result<ChapterOutput, TextbookError> {
    let dir = context_dir.as_ref();
    info!("Loading context from {}", dir.display());
    let (docs, context) =
        load_context_sources(dir, &config.remote_slides, config.download_timeout_secs).await?;
    let sources = docs.into_iter().map(|d| d.path).collect();
    generate_chapter_from_context(&context, sources, &file_key(dir), config).await
}

/// Generate a chapter from an already formatted context block.
///
/// `title` is only used for the optional front matter.
pub async fn generate_chapter_from_context(
    context: &str,
    sources: Vec<PathBuf>,
    title: &str,
    config: &TextbookConfig,
) -> Result<ChapterOutput, TextbookError> {
    let start = Instant::now();
    let generator = resolve_generator(config)?;

    let mut stats = GenerationStats::default();
    let (markdown, sections) = match config.mode {
        GenerationMode::Direct => {
            let markdown = write_direct(generator.as_ref(), context, config, &mut stats).await?;
            (markdown, Vec::new())
        }
        GenerationMode::Agents => {
            write_with_agents(generator.as_ref(), context, config, &mut stats).await?
        }
    };

    let mut markdown = clean_markdown(&markdown);
    if config.ascii_safe {
        markdown = ascii_safe(&markdown);
    }
    if config.include_front_matter {
        markdown = format!("{}{}", yaml_front_matter(title), markdown);
    }

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Chapter complete: {} chars, {} LLM calls, tokens {}",
        markdown.len(),
        stats.llm_calls,
        stats.usage
    );

    Ok(ChapterOutput {
        markdown,
        sections,
        sources,
        stats,
    })
}

/// Build the prompts for a context directory without calling the model.
pub async fn preview_chapter(
    context_dir: impl AsRef<Path>,
    config: &TextbookConfig,
) -> Result<PromptPreview, TextbookError> {
    let (docs, context) = load_context_sources(
        context_dir.as_ref(),
        &config.remote_slides,
        config.download_timeout_secs,
    )
    .await?;
    let system = match config.mode {
        GenerationMode::Direct => chapter_system_prompt(config),
        GenerationMode::Agents => crate::prompts::PLANNER_PROMPT.to_string(),
    };
    Ok(PromptPreview {
        mode: config.mode,
        system,
        user: context,
        sources: docs.into_iter().map(|d| d.path).collect(),
    })
}

/// Blocking wrapper around [`generate_chapter`] for non-async callers.
pub fn generate_chapter_sync(
    context_dir: impl AsRef<Path>,
    config: &TextbookConfig,
) -> Result<ChapterOutput, TextbookError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TextbookError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_chapter(context_dir, config))
}

async fn write_direct(
    generator: &dyn TextGenerator,
    context: &str,
    config: &TextbookConfig,
    stats: &mut GenerationStats,
) -> Result<String, TextbookError> {
    let system = chapter_system_prompt(config);
    let cb = config.progress_callback.as_ref();
    stats.total_units = 1;

    if let Some(cb) = cb {
        cb.on_generation_start(1);
        cb.on_chapter_start(1, 1, "chapter");
    }

    let outcome = generate_with_retry(generator, "chapter", &system, context, config).await;
    stats.record(&outcome.stats());

    match outcome.result {
        Ok(generation) => {
            stats.succeeded = 1;
            if let Some(cb) = cb {
                cb.on_chapter_complete(1, 1, generation.text.len());
                cb.on_generation_complete(1, 1);
            }
            Ok(generation.text)
        }
        Err(e) => {
            stats.failed = 1;
            if let Some(cb) = cb {
                cb.on_chapter_error(1, 1, &e.to_string());
                cb.on_generation_complete(1, 0);
            }
            Err(TextbookError::LlmApiError {
                message: format!("chapter failed after {} retries: {}", outcome.retries, e),
            })
        }
    }
}

async fn write_with_agents(
    generator: &dyn TextGenerator,
    context: &str,
    config: &TextbookConfig,
    stats: &mut GenerationStats,
) -> Result<(String, Vec<String>), TextbookError> {
    let (plan, plan_stats) = generate_plan(generator, context, config).await?;
    stats.record(&plan_stats);
    info!("Chapter plan:\n{}", plan);

    let total = plan.sections.len();
    stats.total_units = total;
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_generation_start(total);
    }

    let mut chapter = String::new();
    for (i, section) in plan.sections.iter().enumerate() {
        let number = i + 1;
        if let Some(cb) = cb {
            cb.on_chapter_start(number, total, &section.name);
        }
        info!("Writing section {}/{}: {}", number, total, section.name);

        match generate_section(generator, context, &chapter, section, config).await {
            Ok((text, call)) => {
                stats.record(&call);
                stats.succeeded += 1;
                if let Some(cb) = cb {
                    cb.on_chapter_complete(number, total, text.len());
                }
                if !chapter.is_empty() {
                    chapter.push('\n');
                }
                chapter.push_str(&text);
            }
            Err(e) => {
                stats.failed += 1;
                if let Some(cb) = cb {
                    cb.on_chapter_error(number, total, &e.to_string());
                    cb.on_generation_complete(total, stats.succeeded);
                }
                return Err(e);
            }
        }
    }

    if let Some(cb) = cb {
        cb.on_generation_complete(total, stats.succeeded);
    }
    let names = plan.sections.into_iter().map(|s| s.name).collect();
    Ok((chapter, names))
}
