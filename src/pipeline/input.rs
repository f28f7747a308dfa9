//! Input resolution for slide decks: a local PDF or an HTTP(S) URL.
//!
//! pdfium needs a file-system path, so URLs are downloaded into a `TempDir`
//! that lives as long as the returned [`ResolvedInput`]. The `%PDF` magic
//! bytes are checked up front so a mislabelled file fails with a clear error
//! instead of a pdfium parse failure.

use crate::error::TextbookError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A slide deck ready to be opened by pdfium.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the PDF was downloaded to a temporary directory,
    /// kept alive until this value is dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Whether the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a PDF path or URL to a local, validated PDF file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, TextbookError> {
    if input.trim().is_empty() {
        return Err(TextbookError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_pdf(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input)).map(ResolvedInput::Local)
    }
}

/// Validate that a local path exists, is readable, and starts with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<PathBuf, TextbookError> {
    let path = path.to_path_buf();
    if !path.is_file() {
        return Err(TextbookError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(TextbookError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TextbookError::PermissionDenied { path });
        }
        Err(_) => return Err(TextbookError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

async fn download_pdf(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TextbookError> {
    info!("Downloading slide deck from: {}", url);

    let failed = |reason: String| TextbookError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TextbookError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| TextbookError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename_from_url(url));

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(TextbookError::NotAPdf { path, magic });
    }

    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| TextbookError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL when it names a `.pdf`, else `slides.pdf`.
pub fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|last| last.to_lowercase().ends_with(".pdf"))
        .unwrap_or_else(|| "slides.pdf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_urls() {
        assert!(is_url("https://uni.edu/week1.pdf"));
        assert!(is_url("http://uni.edu/week1.pdf"));
        assert!(!is_url("slides/week1.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_variants() {
        assert_eq!(
            filename_from_url("https://uni.edu/comp/06-Logic.pdf?dl=1"),
            "06-Logic.pdf"
        );
        assert_eq!(filename_from_url("https://uni.edu/slides/"), "slides.pdf");
        assert_eq!(filename_from_url("https://uni.edu/view?id=3"), "slides.pdf");
    }

    #[test]
    fn local_non_pdf_rejected() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"hello world").unwrap();
        match resolve_local(f.path()) {
            Err(TextbookError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"hell"),
            other => panic!("expected NotAPdf, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn local_pdf_magic_accepted() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local(f.path()).unwrap(), f.path());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = resolve_local(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, TextbookError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        assert!(matches!(
            resolve_input("  ", 5).await,
            Err(TextbookError::InvalidInput { .. })
        ));
    }
}
