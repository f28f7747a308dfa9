//! Slide text extraction via pdfium.
//!
//! pdfium is a C++ library with thread-local state, so every call runs on
//! tokio's blocking pool. Text comes back page by page; blank pages (title
//! slides that are pure images, section dividers) are dropped so the prompt
//! is not padded with empty blocks.

use crate::error::TextbookError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extract the text of every page of a PDF, pages separated by a blank line.
pub async fn pdf_to_text(pdf_path: &Path) -> Result<String, TextbookError> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf_to_text_blocking(&path))
        .await
        .map_err(|e| TextbookError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn pdf_to_text_blocking(pdf_path: &Path) -> Result<String, TextbookError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| TextbookError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| TextbookError::ExtractionFailed {
                path: pdf_path.to_path_buf(),
                page: idx + 1,
                detail: format!("{:?}", e),
            })?
            .all();
        pages.push(text);
    }

    let total = pages.len();
    let text = join_pages(pages);
    info!(
        "Extracted {} chars from {} pages of {}",
        text.len(),
        total,
        pdf_path.display()
    );
    Ok(text)
}

/// Join page texts, skipping pages with no visible text.
pub fn join_pages(pages: impl IntoIterator<Item = String>) -> String {
    pages
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system library.
fn bind_pdfium() -> Result<Pdfium, TextbookError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        if !dir.is_empty() {
            let p = PathBuf::from(dir);
            // Accept either the directory or the library file itself.
            if p.is_file() {
                candidates.push(p);
            } else {
                candidates.push(Pdfium::pdfium_platform_library_name_at_path(&p));
            }
        }
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    let mut last_err = String::from("no candidate library paths");
    for candidate in &candidates {
        match Pdfium::bind_to_library(candidate) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", candidate.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => last_err = format!("{}: {:?}", candidate.display(), e),
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| TextbookError::PdfiumBindingFailed(format!("{last_err}; system: {e:?}")))
}
