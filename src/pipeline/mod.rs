//! Pipeline stages shared by chapter and book generation.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ context ──▶ llm ──▶ postprocess
//! (path/URL) (pdfium)   (key:text)  (retry)  (cleanup)
//! ```
//!
//! 1. [`input`]: validate a local PDF or download one from a URL
//! 2. [`extract`]: pull slide text out of a PDF on the blocking pool
//! 3. [`context`]: load a directory of decks/transcripts/notes into one block
//! 4. [`llm`]: the [`llm::TextGenerator`] seam plus retry/backoff; the
//!    only stage with LLM network I/O
//! 5. [`postprocess`]: deterministic Markdown cleanup of model output

pub mod context;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
