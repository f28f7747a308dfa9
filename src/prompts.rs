//! Prompts for slide-to-textbook generation.
//!
//! Every instruction the model sees lives here so that prompt changes touch
//! one file and can be unit-tested without a model.
//!
//! The chapter-mode system prompt is not a single constant: it is assembled
//! from [`PromptRule`]s. Users pick which built-in rules apply (by index or
//! name) and may append their own, so the prompt can be tuned per course
//! without recompiling.

use crate::agents::planner::SectionPlan;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One instruction line of the chapter-mode system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptRule {
    /// 0: the model's role and overall goal.
    Role,
    /// 1: stay close to the slides.
    FollowSlides,
    /// 2: answer with chapter Markdown only.
    MarkdownOnly,
    /// 3: drop page numbers and repeated headers.
    NoArtifacts,
    /// 4: no exercises or extras the slides don't have.
    NoExtras,
    /// 5: a lecture transcript may be attached.
    TranscriptAware,
    /// 6: the model cannot see or create images.
    NoImages,
    /// 7: the chapter stands alone.
    Standalone,
    /// 8: no preamble.
    NoPreamble,
    /// A user-supplied instruction.
    Custom(String),
}

impl PromptRule {
    /// Built-in rules in their canonical order (index 0–8).
    pub const BUILTIN: [PromptRule; 9] = [
        PromptRule::Role,
        PromptRule::FollowSlides,
        PromptRule::MarkdownOnly,
        PromptRule::NoArtifacts,
        PromptRule::NoExtras,
        PromptRule::TranscriptAware,
        PromptRule::NoImages,
        PromptRule::Standalone,
        PromptRule::NoPreamble,
    ];

    /// Look up a built-in rule by its index.
    pub fn from_index(idx: usize) -> Option<PromptRule> {
        Self::BUILTIN.get(idx).cloned()
    }

    /// Kebab-case name used on the command line.
    pub fn name(&self) -> &str {
        match self {
            PromptRule::Role => "role",
            PromptRule::FollowSlides => "follow-slides",
            PromptRule::MarkdownOnly => "markdown-only",
            PromptRule::NoArtifacts => "no-artifacts",
            PromptRule::NoExtras => "no-extras",
            PromptRule::TranscriptAware => "transcript-aware",
            PromptRule::NoImages => "no-images",
            PromptRule::Standalone => "standalone",
            PromptRule::NoPreamble => "no-preamble",
            PromptRule::Custom(_) => "custom",
        }
    }

    /// The instruction text sent to the model.
    pub fn text(&self) -> &str {
        match self {
            PromptRule::Role => {
                "You are a textbook chapter creator. Given a possibly badly structured markdown file likely \
created from PDFs or slides and missing information such as images, you will, to the best of your \
ability, create a high quality textbook chapter of the slides and notes provided, aiming to best \
educate the reader."
            }
            PromptRule::FollowSlides => {
                "Base the textbook heavily on the slides. Do not miss any information or drift off topic \
unless necessary."
            }
            PromptRule::MarkdownOnly => {
                "Respond in markdown format and assume that your response will be included in the chapter \
verbatim, so respond with nothing but the textbook."
            }
            PromptRule::NoArtifacts => {
                "Do not include unnecessary artifacts from the previous format such as page numbers or \
repeated headers."
            }
            PromptRule::NoExtras => {
                "Do not include extra features such as exercises unless they are explicitly shown in the \
slides. Your task is to write a chapter from the slides, not to design a course."
            }
            PromptRule::TranscriptAware => {
                "A transcript of the lecture that used these slides may also be attached. Use it to augment \
the slides and to decide what other information to include."
            }
            PromptRule::NoImages => "You are not able to see any images or create any images.",
            PromptRule::Standalone => "The textbook chapter should be considered standalone.",
            PromptRule::NoPreamble => {
                "Do not start with a preamble; go into the textbook chapter immediately."
            }
            PromptRule::Custom(text) => text,
        }
    }
}

impl fmt::Display for PromptRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PromptRule {
    type Err = String;

    /// Accepts a built-in index (`"3"`) or name (`"no-artifacts"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(idx) = s.parse::<usize>() {
            return PromptRule::from_index(idx)
                .ok_or_else(|| format!("no built-in prompt rule with index {idx} (valid: 0–8)"));
        }
        let lower = s.to_lowercase();
        PromptRule::BUILTIN
            .iter()
            .find(|r| r.name() == lower)
            .cloned()
            .ok_or_else(|| format!("unknown prompt rule '{s}'"))
    }
}

/// An ordered, duplicate-free set of prompt rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRules {
    rules: Vec<PromptRule>,
}

impl Default for PromptRules {
    fn default() -> Self {
        Self::all()
    }
}

impl PromptRules {
    /// Every built-in rule, in canonical order.
    pub fn all() -> Self {
        Self {
            rules: PromptRule::BUILTIN.to_vec(),
        }
    }

    /// No rules at all.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule unless it is already present.
    pub fn with(mut self, rule: PromptRule) -> Self {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
        self
    }

    /// Remove a rule if present.
    pub fn without(mut self, rule: &PromptRule) -> Self {
        self.rules.retain(|r| r != rule);
        self
    }

    /// Append a user-supplied instruction.
    pub fn push_custom(&mut self, text: impl Into<String>) {
        let rule = PromptRule::Custom(text.into());
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    /// Parse a comma-separated list of indices and/or names, e.g. `"0,1,no-images"`.
    ///
    /// Order is kept as written; duplicates are dropped.
    pub fn parse_list(s: &str) -> Result<Self, String> {
        let mut rules = Self::empty();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            rules = rules.with(part.parse()?);
        }
        if rules.is_empty() {
            return Err("prompt rule list is empty".into());
        }
        Ok(rules)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PromptRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Render rules as a bullet list, one `" - {text}\n"` line each.
pub fn build_system_prompt(rules: &PromptRules) -> String {
    let mut prompt = String::new();
    for rule in rules.iter() {
        prompt.push_str(" - ");
        prompt.push_str(rule.text());
        prompt.push('\n');
    }
    prompt
}

// ── Book mode ────────────────────────────────────────────────────────────

/// System prompt for book mode, where each slide deck becomes one chapter.
pub const BOOK_SYSTEM_PROMPT: &str = r#"You are an expert academic writer. Convert raw text extracted from official lecture slides into a clear, coherent textbook chapter in Markdown.

Guidelines:
- Retain every relevant term, definition, formula, code snippet, and diagram description that conveys the subject matter.
- Expand terse bullet points into well-connected sentences and paragraphs so the chapter reads like flowing prose. Use lists only when strictly necessary.
- Emphasise conceptual understanding, real-world significance, and the rationale behind ideas so readers can justify, evaluate, and apply concepts.
- Where appropriate, illustrate concepts with concise examples drawn from the slide content.
- Omit administrative course details (assessment dates, lecture times, staff names) unless essential to the subject matter.
- Organise material with clear hierarchical headings, starting with a single level-two heading carrying the chapter number and title.
- Write concisely in professional, straightforward prose. No quotes, puzzles, jokes, anecdotes, or filler.
- Elaborate only to clarify existing slide content; do not invent new facts beyond the slides and transcript.
- Avoid meta commentary and do not mention these guidelines or your role."#;

/// Build the user prompt for one book chapter.
///
/// The previous chapter is attached only when one exists, so the first chapter
/// gets no continuity block.
pub fn book_user_prompt(
    number: usize,
    title: &str,
    slide_text: &str,
    transcript: Option<&str>,
    previous_chapter: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are given the extracted text from a lecture slide deck. Use this content as the \
primary source to write Chapter {number}: {title}.\n\n\
RAW SLIDE CONTENT:\n{slide_text}\n\n"
    );

    if let Some(transcript) = transcript.filter(|t| !t.trim().is_empty()) {
        prompt.push_str("LECTURE TRANSCRIPT (use to augment the slides):\n");
        prompt.push_str(transcript);
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Remember: include all original information faithfully, structure it like a textbook \
chapter, and follow the guidelines without referencing them explicitly.\n",
    );

    if let Some(previous) = previous_chapter.filter(|p| !p.trim().is_empty()) {
        prompt.push_str("\nPREVIOUS CHAPTER (for continuity, do NOT repeat content):\n");
        prompt.push_str(previous);
        prompt.push_str("\n\nEnsure smooth narrative flow from the previous chapter to this one.");
    }

    prompt
}

// ── Agents mode ──────────────────────────────────────────────────────────

/// System prompt for the planner agent.
///
/// The answer is parsed as JSON into [`crate::agents::planner::ChapterPlan`].
pub const PLANNER_PROMPT: &str = r#"You plan a single chapter of a textbook. Given likely badly formatted input parsed from slides, PDFs, or transcripts, think deeply to decide the format of the chapter and how many sections it needs, then return a name and a plan for each section.
A section plan is an overview of what the section will contain. An LLM-powered writer will turn your plan into long-form text whose goal is to educate, so stick as closely as possible to the provided context.
Write each plan as short bullet points without leading dashes or newlines; formatting is added automatically. Any point you leave out will be left out of the textbook.
Use as few sections as the material needs.

Respond with JSON only, no prose and no code fences, in exactly this shape:
{"sections": [{"name": "Section name", "plan_bulletpoints": ["point", "point"]}]}"#;

/// System prompt for the section writer agent.
pub const WRITER_PROMPT: &str = "You are a section writer and your task is to write a single section based on context, \
including previous sections, and a complete section plan. \
Base the section heavily on the context and plan; do not omit information or go off topic unless necessary. \
Respond only in Markdown. Do not output anything except the textbook. \
Do not include unnecessary artifacts such as page numbers or repeated headers. \
Do not include extra features such as exercises unless they are explicitly shown in the slides. \
You will not be able to see or create images. \
Do not start with a preamble; begin the textbook section immediately. Likewise do not end with a summary.";

/// Writer system prompt: instructions, then the full context, then the chapter so far.
pub fn writer_system_prompt(context: &str, so_far: &str) -> String {
    format!("{WRITER_PROMPT}\n\n{context}\n\n{so_far}")
}

/// Writer user prompt: the rendered plan of the section to write.
pub fn writer_user_prompt(section: &SectionPlan) -> String {
    section.to_string()
}
