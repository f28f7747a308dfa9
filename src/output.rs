//! Result types returned by chapter and book generation.
//!
//! Everything here is `Serialize` so the CLI's `--json` flag can dump a run
//! verbatim, including per-chapter token counts and failures.

use crate::error::ChapterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::path::PathBuf;

/// Token usage, accumulated across one or more LLM calls.
///
/// `cached_tokens` is the part of `input_tokens` served from the provider's
/// prompt cache; `reasoning_tokens` is the part of `output_tokens` spent on
/// hidden reasoning. Both stay zero for providers that do not report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
}

impl TokenCount {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    pub fn with_cached(mut self, cached_tokens: u64) -> Self {
        self.cached_tokens = cached_tokens;
        self
    }

    pub fn with_reasoning(mut self, reasoning_tokens: u64) -> Self {
        self.reasoning_tokens = reasoning_tokens;
        self
    }

    /// Add one call's usage.
    pub fn add(
        &mut self,
        input_tokens: usize,
        cached_tokens: usize,
        output_tokens: usize,
        reasoning_tokens: usize,
    ) {
        self.input_tokens += input_tokens as u64;
        self.cached_tokens += cached_tokens as u64;
        self.output_tokens += output_tokens as u64;
        self.reasoning_tokens += reasoning_tokens as u64;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.cached_tokens += rhs.cached_tokens;
        self.output_tokens += rhs.output_tokens;
        self.reasoning_tokens += rhs.reasoning_tokens;
    }
}

impl fmt::Display for TokenCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in", self.input_tokens)?;
        if self.cached_tokens > 0 {
            write!(f, " ({} cached)", self.cached_tokens)?;
        }
        write!(f, " / {} out", self.output_tokens)?;
        if self.reasoning_tokens > 0 {
            write!(f, " ({} reasoning)", self.reasoning_tokens)?;
        }
        write!(f, " ({} total)", self.total_tokens())
    }
}

/// Outcome of generating one chapter of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterResult {
    /// 1-indexed chapter number.
    pub number: usize,
    /// Title derived from the slide deck's file name.
    pub title: String,
    /// Slide deck the chapter was generated from.
    pub source: PathBuf,
    /// Cleaned chapter Markdown; empty when `error` is set.
    pub markdown: String,
    pub usage: TokenCount,
    pub duration_ms: u64,
    /// Retries spent before success (or before giving up).
    pub retries: u8,
    pub error: Option<ChapterError>,
}

impl ChapterResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Output of chapter mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterOutput {
    /// Final chapter Markdown.
    pub markdown: String,
    /// Section names when written by the planner/writer agents.
    pub sections: Vec<String>,
    /// Context files the chapter was built from, in prompt order.
    pub sources: Vec<PathBuf>,
    pub stats: GenerationStats,
}

/// Output of book mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookOutput {
    pub title: String,
    /// Assembled book Markdown (`# title` followed by successful chapters).
    pub markdown: String,
    pub chapters: Vec<ChapterResult>,
    pub stats: GenerationStats,
}

/// Cost of one logical LLM call, retries included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    pub usage: TokenCount,
    pub calls: usize,
    pub duration_ms: u64,
}

/// Run-level statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Chapters (book mode) or sections (agents mode) attempted; 1 for a direct chapter.
    pub total_units: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Number of LLM calls made, retries included.
    pub llm_calls: usize,
    pub usage: TokenCount,
    pub total_duration_ms: u64,
    pub llm_duration_ms: u64,
}

impl GenerationStats {
    /// Fold one call's cost into the run totals.
    pub fn record(&mut self, call: &CallStats) {
        self.usage += call.usage;
        self.llm_calls += call.calls;
        self.llm_duration_ms += call.duration_ms;
    }
}
