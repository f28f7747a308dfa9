//! Chapter planner agent.

use crate::config::TextbookConfig;
use crate::error::TextbookError;
use crate::output::CallStats;
use crate::pipeline::llm::{generate_with_retry, TextGenerator};
use crate::pipeline::postprocess::strip_markdown_fences;
use crate::prompts::PLANNER_PROMPT;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// What one section of the chapter must cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub name: String,
    pub plan_bulletpoints: Vec<String>,
}

impl fmt::Display for SectionPlan {
    /// Renders as `name { \n- point\n...}\n`, the format the writer is prompted with.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{ ", self.name)?;
        for point in &self.plan_bulletpoints {
            writeln!(f, "- {}", point)?;
        }
        writeln!(f, "}}")
    }
}

/// The planner's answer: ordered sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub sections: Vec<SectionPlan>,
}

impl fmt::Display for ChapterPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            write!(f, "{}", section)?;
        }
        Ok(())
    }
}

/// Parse the planner's JSON answer.
///
/// Tolerates code fences and prose around the JSON object. A plan with no
/// sections, or a section with a blank name, is rejected.
pub fn parse_plan(raw: &str) -> Result<ChapterPlan, TextbookError> {
    let unfenced = strip_markdown_fences(raw);
    let json = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => {
            return Err(TextbookError::InvalidPlan {
                detail: "no JSON object in planner answer".into(),
            })
        }
    };

    let mut plan: ChapterPlan =
        serde_json::from_str(json).map_err(|e| TextbookError::InvalidPlan {
            detail: e.to_string(),
        })?;

    if plan.sections.is_empty() {
        return Err(TextbookError::InvalidPlan {
            detail: "plan has no sections".into(),
        });
    }
    if plan.sections.iter().any(|s| s.name.trim().is_empty()) {
        return Err(TextbookError::InvalidPlan {
            detail: "a section has no name".into(),
        });
    }

    for section in &mut plan.sections {
        section.name = section.name.trim().to_string();
        section
            .plan_bulletpoints
            .retain(|p| !p.trim().is_empty());
        for point in &mut section.plan_bulletpoints {
            *point = point.trim().trim_start_matches(['-', '*', '•']).trim().to_string();
        }
    }
    Ok(plan)
}

/// Ask the planner to outline a chapter from the formatted context.
pub async fn generate_plan(
    generator: &dyn TextGenerator,
    context: &str,
    config: &TextbookConfig,
) -> Result<(ChapterPlan, CallStats), TextbookError> {
    let outcome = generate_with_retry(generator, "plan", PLANNER_PROMPT, context, config).await;
    let stats = outcome.stats();
    let generation = outcome.result.map_err(|e| TextbookError::LlmApiError {
        message: format!("planner failed after {} retries: {}", outcome.retries, e),
    })?;
    debug!("Planner answer: {} chars", generation.text.len());

    let plan = parse_plan(&generation.text)?;
    info!("Planned {} sections", plan.sections.len());
    Ok((plan, stats))
}
