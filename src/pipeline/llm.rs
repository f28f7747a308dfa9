//! LLM interaction: the [`TextGenerator`] seam, its edgequake-llm adapter,
//! and retry with exponential backoff.
//!
//! Every model call in the crate is a pair of strings, a developer (system)
//! prompt and a user prompt, answered with text. Putting that behind a small
//! trait keeps the chapter and book pipelines independent of any provider
//! and lets tests script the model's answers.
//!
//! ## Retry Strategy
//!
//! Rate limits and 5xx errors are frequent on long generations. A failed call
//! is retried after `retry_backoff_ms * 2^(attempt-1)`: 500 ms → 1 s → 2 s
//! with the defaults.

use crate::config::TextbookConfig;
use crate::error::{GenerationError, TextbookError};
use crate::output::{CallStats, TokenCount};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// One successful model answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    /// Input tokens served from the provider's prompt cache.
    pub cached_tokens: usize,
    pub output_tokens: usize,
    /// Output tokens spent on hidden reasoning.
    pub reasoning_tokens: usize,
}

impl Generation {
    pub fn usage(&self) -> TokenCount {
        TokenCount::new(self.input_tokens as u64, self.output_tokens as u64)
            .with_cached(self.cached_tokens as u64)
            .with_reasoning(self.reasoning_tokens as u64)
    }
}

/// Anything that can answer a developer + user prompt pair with text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run a single completion. No retries; see [`generate_with_retry`].
    async fn generate(&self, developer: &str, user: &str) -> Result<Generation, GenerationError>;

    /// Human-readable `provider/model` label for logs.
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

/// [`TextGenerator`] backed by an edgequake-llm provider.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: Option<f32>,
    max_tokens: usize,
    timeout_secs: u64,
}

impl LlmGenerator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        config: &TextbookConfig,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    async fn generate(&self, developer: &str, user: &str) -> Result<Generation, GenerationError> {
        let messages = vec![ChatMessage::system(developer), ChatMessage::user(user)];
        let options = self.options();

        let response = timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| GenerationError::Timeout(self.timeout_secs))?
        .map_err(|e| GenerationError::Api(e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens,
            cached_tokens: response.cache_hit_tokens.unwrap_or(0),
            output_tokens: response.completion_tokens,
            reasoning_tokens: response.thinking_tokens.unwrap_or(0),
        })
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Result of a call made through [`generate_with_retry`].
#[derive(Debug)]
pub struct GenerationOutcome {
    pub result: Result<Generation, GenerationError>,
    /// Retries spent (0 when the first attempt succeeded).
    pub retries: u32,
    /// Attempts made, i.e. `retries + 1`.
    pub calls: usize,
    pub duration_ms: u64,
}

impl GenerationOutcome {
    /// Tokens and time spent; failed attempts count as calls but report no usage.
    pub fn stats(&self) -> CallStats {
        let usage = match &self.result {
            Ok(g) => g.usage(),
            Err(_) => TokenCount::default(),
        };
        CallStats {
            usage,
            calls: self.calls,
            duration_ms: self.duration_ms,
        }
    }
}

/// Call the generator, retrying failures with exponential backoff.
///
/// `label` names the unit of work ("chapter 3", "plan") in log lines.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    label: &str,
    developer: &str,
    user: &str,
    config: &TextbookConfig,
) -> GenerationOutcome {
    let start = Instant::now();
    let mut last_err = GenerationError::Empty;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match generator.generate(developer, user).await {
            Ok(generation) => {
                debug!("{}: tokens {}, {:?}", label, generation.usage(), start.elapsed());
                return GenerationOutcome {
                    result: Ok(generation),
                    retries: attempt,
                    calls: attempt as usize + 1,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", label, attempt + 1, e);
                last_err = e;
            }
        }
    }

    GenerationOutcome {
        result: Err(last_err),
        retries: config.max_retries,
        calls: config.max_retries as usize + 1,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Delay before retry number `attempt` (1-based), saturating at `u64::MAX`.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Resolve the text generator, from most to least specific:
///
/// 1. `config.generator`, used as-is
/// 2. `config.provider_name` + `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` from the environment
/// 4. OpenAI when `OPENAI_API_KEY` is set, with `config.model`
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_generator(config: &TextbookConfig) -> Result<Arc<dyn TextGenerator>, TextbookError> {
    if let Some(ref generator) = config.generator {
        return Ok(Arc::clone(generator));
    }

    let (provider, label) = if let Some(ref name) = config.provider_name {
        (
            create_provider(name, &config.model)?,
            format!("{}/{}", name, config.model),
        )
    } else {
        match (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            (Ok(prov), Ok(model)) if !prov.is_empty() && !model.is_empty() => {
                (create_provider(&prov, &model)?, format!("{}/{}", prov, model))
            }
            _ => detect_provider(config)?,
        }
    };

    let generator = LlmGenerator::new(provider, label, config);
    info!("Using LLM {}", generator.describe());
    Ok(Arc::new(generator))
}

fn detect_provider(
    config: &TextbookConfig,
) -> Result<(Arc<dyn LLMProvider>, String), TextbookError> {
    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let provider = create_provider("openai", &config.model)?;
        return Ok((provider, format!("openai/{}", config.model)));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TextbookError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY (or ANTHROPIC_API_KEY, GEMINI_API_KEY) in the environment or a .env file.\n\
                Error: {}",
                e
            ),
        })?;
    Ok((llm_provider, "auto-detected".to_string()))
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TextbookError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        TextbookError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails a fixed number of times, then answers.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        async fn generate(&self, _d: &str, user: &str) -> Result<Generation, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GenerationError::Api(format!("HTTP 503 (call {n})")))
            } else {
                Ok(Generation {
                    text: format!("echo: {user}"),
                    input_tokens: 10,
                    cached_tokens: 4,
                    output_tokens: 5,
                    reasoning_tokens: 2,
                })
            }
        }
    }

    fn fast_config(retries: u32) -> TextbookConfig {
        TextbookConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let gen = Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let outcome = generate_with_retry(&gen, "chapter 1", "dev", "hi", &fast_config(3)).await;
        let stats = outcome.stats();
        assert_eq!(outcome.retries, 2);
        assert_eq!(outcome.calls, 3);
        let generation = outcome.result.expect("third attempt succeeds");
        assert_eq!(generation.text, "echo: hi");
        assert_eq!(stats.usage, TokenCount::new(10, 5).with_cached(4).with_reasoning(2));
        assert_eq!(stats.calls, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let gen = Flaky {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let outcome = generate_with_retry(&gen, "plan", "dev", "hi", &fast_config(2)).await;
        let err = outcome.result.unwrap_err();
        assert!(err.to_string().contains("call 2"), "got: {err}");
        assert_eq!(outcome.calls, 3);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(u64::MAX / 2, 3), u64::MAX);
        assert_eq!(backoff_ms(1, 200), u64::MAX);
    }

    #[test]
    fn provider_precedence_from_environment() {
        const VARS: [&str; 3] = ["EDGEQUAKE_LLM_PROVIDER", "EDGEQUAKE_MODEL", "OPENAI_API_KEY"];
        let saved: Vec<_> = VARS.iter().map(|v| std::env::var_os(v)).collect();
        let label = |config: &TextbookConfig| {
            resolve_generator(config)
                .map(|g| g.describe())
                .unwrap_or_else(|e| format!("error: {e}"))
        };
        let defaults = TextbookConfig::default();

        std::env::remove_var("EDGEQUAKE_LLM_PROVIDER");
        std::env::remove_var("EDGEQUAKE_MODEL");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        assert_eq!(label(&defaults), "openai/gpt-5");

        // A provider without a model is not enough to override the key.
        std::env::set_var("EDGEQUAKE_LLM_PROVIDER", "mock");
        std::env::set_var("EDGEQUAKE_MODEL", "");
        assert_eq!(label(&defaults), "openai/gpt-5");

        std::env::set_var("EDGEQUAKE_MODEL", "mock-model");
        assert_eq!(label(&defaults), "mock/mock-model");

        let explicit = TextbookConfig::builder()
            .provider_name("openai")
            .model("gpt-4.1-mini")
            .build()
            .unwrap();
        assert_eq!(label(&explicit), "openai/gpt-4.1-mini");

        for (var, value) in VARS.iter().zip(saved) {
            match value {
                Some(v) => std::env::set_var(var, v),
                None => std::env::remove_var(var),
            }
        }
    }

    #[test]
    fn prebuilt_generator_wins() {
        let gen: Arc<dyn TextGenerator> = Arc::new(Flaky {
            failures: 0,
            calls: AtomicUsize::new(0),
        });
        let config = TextbookConfig::builder()
            .generator(Arc::clone(&gen))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let resolved = resolve_generator(&config).expect("uses the injected generator");
        assert_eq!(resolved.describe(), "custom");
    }
}
