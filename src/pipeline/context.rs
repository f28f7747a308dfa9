//! Context loading: turn a directory of slides, transcripts, and notes into
//! one LLM-readable block of text.
//!
//! Each file becomes a [`ContextDocument`] keyed by its file stem. The
//! formatted context is simply every document as `"{key}:\n{text}\n\n"` in
//! file-name order, which lets the model tell a deck apart from its
//! transcript without any markup.

use crate::error::TextbookError;
use crate::pipeline::{extract, input};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How a context file is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextKind {
    /// Slide deck or handout; text extracted with pdfium.
    Pdf,
    /// Any UTF-8 text file (transcripts, notes, exported slides).
    Text,
}

const TEXT_EXTENSIONS: [&str; 8] = ["txt", "md", "markdown", "json", "html", "htm", "csv", "tex"];

impl ContextKind {
    /// Classify a path by extension; `None` for unsupported types.
    pub fn from_path(path: &Path) -> Option<ContextKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if ext == "pdf" {
            Some(ContextKind::Pdf)
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContextKind::Text)
        } else {
            None
        }
    }
}

/// One loaded context file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDocument {
    /// File stem, used as the heading of this document in the prompt.
    pub key: String,
    pub path: PathBuf,
    pub kind: ContextKind,
    pub text: String,
}

/// File stem as a lossy string, or the whole file name when there is none.
pub fn file_key(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load one file as a context document.
pub async fn load_document(path: &Path) -> Result<ContextDocument, TextbookError> {
    let kind = ContextKind::from_path(path).ok_or_else(|| TextbookError::UnsupportedContextFile {
        path: path.to_path_buf(),
    })?;

    let text = match kind {
        ContextKind::Pdf => {
            let resolved = input::resolve_local(path)?;
            extract::pdf_to_text(&resolved).await?
        }
        ContextKind::Text => load_text_file(path).await?,
    };

    debug!("Loaded {} ({:?}, {} chars)", path.display(), kind, text.len());
    Ok(ContextDocument {
        key: file_key(path),
        path: path.to_path_buf(),
        kind,
        text,
    })
}

/// Read a UTF-8 text file.
pub async fn load_text_file(path: &Path) -> Result<String, TextbookError> {
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TextbookError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => TextbookError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => TextbookError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// List the regular, non-hidden files of a directory, sorted by file name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, TextbookError> {
    if !dir.is_dir() {
        return Err(TextbookError::ContextDirNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| TextbookError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TextbookError::ReadFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// List every context file of a directory, rejecting unsupported types.
pub fn collect_context_files(dir: &Path) -> Result<Vec<PathBuf>, TextbookError> {
    let files = list_files(dir)?;
    if let Some(bad) = files.iter().find(|p| ContextKind::from_path(p).is_none()) {
        return Err(TextbookError::UnsupportedContextFile { path: bad.clone() });
    }
    Ok(files)
}

/// Load every file concurrently; the result keeps the input order.
pub async fn load_context(paths: &[PathBuf]) -> Result<Vec<ContextDocument>, TextbookError> {
    let docs = try_join_all(paths.iter().map(|p| load_document(p))).await?;
    info!(
        "Loaded {} context documents ({} chars)",
        docs.len(),
        docs.iter().map(|d| d.text.len()).sum::<usize>()
    );
    Ok(docs)
}

/// Render documents as `"{key}:\n{text}\n\n"` blocks, in order.
pub fn format_context(docs: &[ContextDocument]) -> String {
    let mut context = String::new();
    for doc in docs {
        context.push_str(&doc.key);
        context.push_str(":\n");
        context.push_str(&doc.text);
        context.push_str("\n\n");
    }
    context
}

/// Download a slide deck and extract its text.
///
/// The key is the file stem of the URL's last path segment (`slides` when
/// the URL does not name a PDF).
pub async fn load_remote_document(
    url: &str,
    timeout_secs: u64,
) -> Result<ContextDocument, TextbookError> {
    let resolved = input::resolve_input(url, timeout_secs).await?;
    let text = extract::pdf_to_text(resolved.path()).await?;
    Ok(ContextDocument {
        key: file_key(Path::new(&input::filename_from_url(url))),
        path: PathBuf::from(url),
        kind: ContextKind::Pdf,
        text,
    })
}

/// Load a context directory and format it, failing when nothing usable remains.
pub async fn load_context_dir(dir: &Path) -> Result<(Vec<ContextDocument>, String), TextbookError> {
    load_context_sources(dir, &[], 0).await
}

/// Like [`load_context_dir`], with downloaded slide decks appended after the
/// local files.
pub async fn load_context_sources(
    dir: &Path,
    urls: &[String],
    timeout_secs: u64,
) -> Result<(Vec<ContextDocument>, String), TextbookError> {
    let files = collect_context_files(dir)?;
    let mut docs = load_context(&files).await?;
    for url in urls {
        docs.push(load_remote_document(url, timeout_secs).await?);
    }
    if docs.iter().all(|d| d.text.trim().is_empty()) {
        return Err(TextbookError::EmptyContext {
            path: dir.to_path_buf(),
        });
    }
    let formatted = format_context(&docs);
    Ok((docs, formatted))
}
