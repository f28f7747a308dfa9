//! Error types for the slides2textbook library.
//!
//! Two error types cover two failure modes:
//!
//! * [`TextbookError`]: **Fatal**: generation cannot proceed at all (missing
//!   context directory, unsupported file, provider not configured, every
//!   chapter failed). Returned as `Err(TextbookError)` from the top-level
//!   `generate_*` functions.
//!
//! * [`ChapterError`]: **Non-fatal**: one chapter of a book failed (bad
//!   slide deck, API error after retries) while the others are fine. Stored
//!   inside [`crate::output::ChapterResult`] so the rest of the book is kept.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the slides2textbook library.
#[derive(Debug, Error)]
pub enum TextbookError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The context directory does not exist or is not a directory.
    #[error("Context directory not found: '{path}'\nPass an existing directory with -l/--load-context.")]
    ContextDirNotFound { path: PathBuf },

    /// An input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A text context file is not valid UTF-8 or could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The context directory contains a file type we cannot load.
    #[error("Unsupported context file '{path}'\nSupported: .pdf .txt .md .markdown .json .html .htm .csv .tex")]
    UnsupportedContextFile { path: PathBuf },

    /// Every loaded context document was empty.
    #[error("No usable context in '{path}': every file was empty")]
    EmptyContext { path: PathBuf },

    /// Book mode found no slide decks to turn into chapters.
    #[error("No chapter sources (.pdf or .md) found in '{path}'")]
    NoChapterSources { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt or encrypted.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium returned an error while reading the text of a page.
    #[error("Text extraction failed for '{path}' page {page}: {detail}")]
    ExtractionFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Slide decks in PDF form need the pdfium shared library.\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium, or\n\
  • place libpdfium next to the binary / in the working directory, or\n\
  • export your slides to Markdown (.md) and use those instead.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API failed after all retries.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The planner agent returned something that is not a usable chapter plan.
    #[error("Planner returned an invalid chapter plan: {detail}")]
    InvalidPlan { detail: String },

    /// Every chapter of a book failed; output would be empty.
    #[error("All {total} chapters failed after {retries} retries each.\nFirst error: {first_error}")]
    AllChaptersFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external renderer (pandoc) is not installed or not on PATH.
    #[error("'{tool}' was not found on PATH.\nInstall it (https://pandoc.org/installing.html) or skip with --no-pdf / --no-epub.")]
    ExportToolMissing { tool: String },

    /// The external renderer ran but failed.
    #[error("{format} export of '{path}' failed: {detail}")]
    ExportFailed {
        format: String,
        path: PathBuf,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed call to a [`crate::pipeline::llm::TextGenerator`].
///
/// Every variant is retried; the last one is reported once retries run out.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The provider returned an error.
    #[error("{0}")]
    Api(String),

    /// The call exceeded `api_timeout_secs`.
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// The provider answered with no text.
    #[error("LLM returned an empty response")]
    Empty,
}

/// A non-fatal error for a single chapter of a book.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ChapterError {
    /// The chapter's slide deck or transcript could not be loaded.
    #[error("Chapter {chapter}: loading sources failed: {detail}")]
    LoadFailed { chapter: usize, detail: String },

    /// LLM call failed after retries.
    #[error("Chapter {chapter}: LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        chapter: usize,
        retries: u8,
        detail: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_chapters_failed_display() {
        let e = TextbookError::AllChaptersFailed {
            total: 4,
            retries: 3,
            first_error: "HTTP 500".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 chapters"), "got: {msg}");
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn unsupported_file_lists_extensions() {
        let e = TextbookError::UnsupportedContextFile {
            path: PathBuf::from("lecture/diagram.png"),
        };
        let msg = e.to_string();
        assert!(msg.contains("diagram.png"));
        assert!(msg.contains(".pdf"));
    }

    #[test]
    fn export_tool_missing_mentions_flags() {
        let e = TextbookError::ExportToolMissing {
            tool: "pandoc".into(),
        };
        assert!(e.to_string().contains("--no-pdf"));
    }

    #[test]
    fn chapter_error_roundtrips_through_json() {
        let e = ChapterError::LlmFailed {
            chapter: 2,
            retries: 3,
            detail: "rate limited".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: ChapterError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), e.to_string());
    }
}
