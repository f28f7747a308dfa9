//! Section writer agent.

use crate::agents::planner::SectionPlan;
use crate::config::TextbookConfig;
use crate::error::TextbookError;
use crate::output::CallStats;
use crate::pipeline::llm::{generate_with_retry, TextGenerator};
use crate::pipeline::postprocess::clean_markdown;
use crate::prompts::{writer_system_prompt, writer_user_prompt};

/// Write one planned section.
///
/// The writer sees the full context and the chapter text written so far in
/// its system prompt; the user prompt is the section's plan.
pub async fn generate_section(
    generator: &dyn TextGenerator,
    context: &str,
    so_far: &str,
    section: &SectionPlan,
    config: &TextbookConfig,
) -> Result<(String, CallStats), TextbookError> {
    let system = writer_system_prompt(context, so_far);
    let user = writer_user_prompt(section);
    let label = format!("section '{}'", section.name);

    let outcome = generate_with_retry(generator, &label, &system, &user, config).await;
    let stats = outcome.stats();
    let generation = outcome.result.map_err(|e| TextbookError::LlmApiError {
        message: format!("{} failed after {} retries: {}", label, outcome.retries, e),
    })?;

    Ok((clean_markdown(&generation.text), stats))
}
