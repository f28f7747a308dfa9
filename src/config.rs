//! Configuration types for textbook generation.
//!
//! Every knob lives in [`TextbookConfig`], built through
//! [`TextbookConfigBuilder`]. One struct means configs can be cloned into
//! tasks, logged with `{:?}`, and diffed between runs.

use crate::error::TextbookError;
use crate::pipeline::llm::TextGenerator;
use crate::progress::ProgressCallback;
use crate::prompts::PromptRules;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-5";

/// Configuration for chapter and book generation.
///
/// # Example
/// ```rust
/// use slides2textbook::{GenerationMode, TextbookConfig};
///
/// let config = TextbookConfig::builder()
///     .model("gpt-5-mini")
///     .mode(GenerationMode::Agents)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TextbookConfig {
    /// LLM model identifier. Default: `gpt-5`.
    pub model: String,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed text generator. Takes precedence over `provider_name`.
    pub generator: Option<Arc<dyn TextGenerator>>,

    /// Sampling temperature. Default: None (provider default).
    ///
    /// Reasoning models such as the gpt-5 family reject any explicit value
    /// other than 1.0, so it is only sent when set.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate per call. Default: 16384.
    ///
    /// A textbook chapter from a 40-slide deck commonly runs to 6–10k tokens.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed LLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call LLM timeout in seconds. Default: 600.
    ///
    /// Long chapters with high reasoning effort routinely take minutes.
    pub api_timeout_secs: u64,

    /// Download timeout for slide decks given as URLs. Default: 120.
    pub download_timeout_secs: u64,

    /// Slide-deck PDF URLs added to a chapter's context after the local files.
    pub remote_slides: Vec<String>,

    /// Full system prompt override for chapter mode. If None, built from `rules`.
    pub system_prompt: Option<String>,

    /// Prompt rules assembled into the chapter-mode system prompt.
    pub rules: PromptRules,

    /// Single-call or planner/writer generation. Default: Direct.
    pub mode: GenerationMode,

    /// Text between chapters in book mode. Default: blank line.
    pub chapter_separator: ChapterSeparator,

    /// Replace typographic Unicode (dashes, curly quotes) with ASCII. Default: false.
    pub ascii_safe: bool,

    /// Prefix the Markdown with a YAML title block (pandoc metadata). Default: false.
    pub include_front_matter: bool,

    /// Per-chapter progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TextbookConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            generator: None,
            temperature: None,
            max_tokens: 16384,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 600,
            download_timeout_secs: 120,
            remote_slides: Vec::new(),
            system_prompt: None,
            rules: PromptRules::default(),
            mode: GenerationMode::default(),
            chapter_separator: ChapterSeparator::default(),
            ascii_safe: false,
            include_front_matter: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TextbookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextbookConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("generator", &self.generator.as_ref().map(|_| "<dyn TextGenerator>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("remote_slides", &self.remote_slides)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("rules", &self.rules.len())
            .field("mode", &self.mode)
            .field("chapter_separator", &self.chapter_separator)
            .field("ascii_safe", &self.ascii_safe)
            .finish()
    }
}

impl TextbookConfig {
    /// Create a new builder for `TextbookConfig`.
    pub fn builder() -> TextbookConfigBuilder {
        TextbookConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TextbookConfig`].
#[derive(Debug)]
pub struct TextbookConfigBuilder {
    config: TextbookConfig,
}

impl TextbookConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.config.generator = Some(generator);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Add a slide deck URL to chapter-mode context.
    pub fn remote_slide(mut self, url: impl Into<String>) -> Self {
        self.config.remote_slides.push(url.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn rules(mut self, rules: PromptRules) -> Self {
        self.config.rules = rules;
        self
    }

    pub fn mode(mut self, mode: GenerationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn chapter_separator(mut self, sep: ChapterSeparator) -> Self {
        self.config.chapter_separator = sep;
        self
    }

    pub fn ascii_safe(mut self, v: bool) -> Self {
        self.config.ascii_safe = v;
        self
    }

    pub fn include_front_matter(mut self, v: bool) -> Self {
        self.config.include_front_matter = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TextbookConfig, TextbookError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(TextbookError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens < 256 {
            return Err(TextbookError::InvalidConfig(format!(
                "max_tokens must be ≥ 256, got {}",
                c.max_tokens
            )));
        }
        if c.max_retries > 10 {
            return Err(TextbookError::InvalidConfig(format!(
                "max_retries must be ≤ 10, got {}",
                c.max_retries
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(TextbookError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.system_prompt.is_none() && c.rules.is_empty() {
            return Err(TextbookError::InvalidConfig(
                "at least one prompt rule or a system prompt is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a chapter is produced from its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GenerationMode {
    /// One LLM call with the rule-built system prompt. (default)
    #[default]
    Direct,
    /// A planner call followed by one writer call per planned section.
    /// Better structure on long decks, several times the cost.
    Agents,
}

/// How to separate chapters in an assembled book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum ChapterSeparator {
    /// Chapters joined by a blank line. (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// Raw LaTeX page break, honoured by pandoc's PDF output.
    PageBreak,
    /// Custom string inserted between chapters.
    Custom(String),
}

impl ChapterSeparator {
    /// Render the separator placed before the given chapter (1-indexed).
    pub fn render(&self, chapter: usize) -> String {
        match self {
            ChapterSeparator::None => "\n\n".to_string(),
            ChapterSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            ChapterSeparator::PageBreak => format!("\n\n\\newpage\n<!-- chapter {} -->\n\n", chapter),
            ChapterSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
