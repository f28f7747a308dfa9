//! Planner/writer agents for [`crate::config::GenerationMode::Agents`].
//!
//! Instead of one call producing a whole chapter, a planner first decides the
//! chapter's sections and what each must cover, then a writer produces the
//! sections one at a time, each seeing everything written so far. Long decks
//! come out better structured, at several times the token cost.

pub mod planner;
pub mod writer;

pub use planner::{generate_plan, parse_plan, ChapterPlan, SectionPlan};
pub use writer::generate_section;
