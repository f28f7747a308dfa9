//! Progress-callback trait for per-chapter generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::TextbookConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a book (or the sections of an
//! agent-written chapter). The CLI uses it to drive a progress bar; a server
//! could forward the same events to a channel.
//!
//! # Example
//!
//! ```rust
//! use slides2textbook::{GenerationProgressCallback, TextbookConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl GenerationProgressCallback for CountingCallback {
//!     fn on_chapter_complete(&self, number: usize, total: usize, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Chapter {}/{} done ({} bytes)", number, total, markdown_len);
//!     }
//! }
//!
//! let config = TextbookConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the generation pipeline as it works through chapters.
///
/// Every method has a no-op default, so implementors override only what they
/// need. In agents mode the "chapters" reported are the planned sections of
/// the single chapter being written.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called once the number of units (chapters or sections) is known.
    fn on_generation_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before the LLM request for a unit is sent.
    fn on_chapter_start(&self, number: usize, total: usize, title: &str) {
        let _ = (number, total, title);
    }

    /// Called when a unit was generated successfully.
    fn on_chapter_complete(&self, number: usize, total: usize, markdown_len: usize) {
        let _ = (number, total, markdown_len);
    }

    /// Called when a unit failed after all retries.
    fn on_chapter_error(&self, number: usize, total: usize, error: &str) {
        let _ = (number, total, error);
    }

    /// Called once after every unit has been attempted.
    fn on_generation_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TextbookConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
