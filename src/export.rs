//! Persisting generated Markdown and rendering it with pandoc.
//!
//! PDF and EPUB are rendered from a Markdown file on disk, so the Markdown is
//! written first (atomically) and a failed render never loses the text.
//!
//! PDF margins are set per engine: LaTeX engines take pandoc's
//! `geometry` variable, CSS engines (weasyprint, wkhtmltopdf, prince) take a
//! temporary stylesheet with an `@page` rule.

use crate::book::BookSink;
use crate::error::TextbookError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// PDF engine used when none is given.
pub const DEFAULT_PDF_ENGINE: &str = "xelatex";

/// Page margin in millimetres.
pub const PAGE_MARGIN_MM: u32 = 20;

/// Name used when neither an explicit name nor a directory name is usable.
pub const FALLBACK_NAME: &str = "textbook";

const LATEX_ENGINES: [&str; 4] = ["xelatex", "lualatex", "pdflatex", "tectonic"];

static RE_FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// Make a string safe to use as a file name.
///
/// Removes `\ / * ? : " < > |` and joins whitespace runs with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = RE_FORBIDDEN.replace_all(name, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Output base name: `name` if given, else the context directory's name,
/// else [`FALLBACK_NAME`].
pub fn resolve_output_name(name: Option<&str>, context_dir: &Path) -> String {
    if let Some(name) = name.map(sanitize_filename).filter(|n| !n.is_empty()) {
        return name;
    }
    let dir_name = context_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            std::fs::canonicalize(context_dir)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        });
    match dir_name.map(|n| sanitize_filename(&n)) {
        Some(n) if !n.is_empty() => n,
        _ => FALLBACK_NAME.to_string(),
    }
}

/// YAML metadata block carrying the document title, read by pandoc.
pub fn yaml_front_matter(title: &str) -> String {
    format!(
        "---\ntitle: \"{}\"\n---\n\n",
        title.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// Write `markdown` to `out_dir/name.md`, creating `out_dir` if needed.
///
/// Uses atomic write (temp file + rename) so a crash mid-write never leaves
/// a truncated book behind.
pub async fn save_markdown(
    markdown: &str,
    out_dir: &Path,
    name: &str,
) -> Result<PathBuf, TextbookError> {
    let path = out_dir.join(format!("{}.md", name));
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| TextbookError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(|e| TextbookError::OutputWriteFailed {
            path: tmp_path.clone(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|e| TextbookError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    debug!("Saved {} ({} bytes)", path.display(), markdown.len());
    Ok(path)
}

/// [`BookSink`] that rewrites `out_dir/name.md` after every chapter.
#[derive(Debug, Clone)]
pub struct MarkdownFileSink {
    pub out_dir: PathBuf,
    pub name: String,
}

impl MarkdownFileSink {
    pub fn new(out_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            name: name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.out_dir.join(format!("{}.md", self.name))
    }
}

#[async_trait]
impl BookSink for MarkdownFileSink {
    async fn save(&self, markdown: &str) -> Result<(), TextbookError> {
        save_markdown(markdown, &self.out_dir, &self.name).await?;
        Ok(())
    }
}

pub fn is_latex_engine(engine: &str) -> bool {
    LATEX_ENGINES.contains(&engine.to_lowercase().as_str())
}

/// Pandoc arguments for a PDF render; `css` is only used by non-LaTeX engines.
pub fn pdf_args(input: &Path, output: &Path, engine: &str, css: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        input.to_string_lossy().into_owned(),
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
        format!("--pdf-engine={}", engine),
        "--toc".to_string(),
        "--toc-depth=2".to_string(),
    ];
    if is_latex_engine(engine) {
        args.push("-V".to_string());
        args.push(format!("geometry:margin={}cm", PAGE_MARGIN_MM as f32 / 10.0));
    } else if let Some(css) = css {
        args.push(format!("--css={}", css.display()));
    }
    args
}

/// Pandoc arguments for an EPUB 3 render with MathML for `$...$` and `\(...\)` math.
pub fn epub_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        input.to_string_lossy().into_owned(),
        "-f".to_string(),
        "markdown+tex_math_single_backslash+tex_math_dollars".to_string(),
        "-t".to_string(),
        "epub3".to_string(),
        "--mathml".to_string(),
        "-o".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Render a Markdown file to PDF at `output`.
pub async fn export_pdf(
    markdown_path: &Path,
    output: &Path,
    engine: &str,
) -> Result<(), TextbookError> {
    // Held until pandoc exits; deleted on drop.
    let css = if is_latex_engine(engine) {
        None
    } else {
        Some(margin_css()?)
    };
    let args = pdf_args(markdown_path, output, engine, css.as_ref().map(|f| f.path()));

    info!("Rendering PDF with {}: {}", engine, output.display());
    run_pandoc(&args, "PDF", output).await
}

/// Render a Markdown file to EPUB at `output`.
pub async fn export_epub(markdown_path: &Path, output: &Path) -> Result<(), TextbookError> {
    info!("Rendering EPUB: {}", output.display());
    run_pandoc(&epub_args(markdown_path, output), "EPUB", output).await
}

fn margin_css() -> Result<tempfile::NamedTempFile, TextbookError> {
    let mut file = tempfile::Builder::new()
        .prefix("s2t-margin-")
        .suffix(".css")
        .tempfile()
        .map_err(|e| TextbookError::Internal(format!("tempfile: {e}")))?;
    writeln!(file, "@page {{ margin: {}mm; }}", PAGE_MARGIN_MM)
        .map_err(|e| TextbookError::Internal(format!("tempfile write: {e}")))?;
    Ok(file)
}

async fn run_pandoc(args: &[String], format: &str, output: &Path) -> Result<(), TextbookError> {
    debug!("pandoc {}", args.join(" "));
    let result = Command::new("pandoc").args(args).output().await;

    let out = match result {
        Ok(out) => out,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TextbookError::ExportToolMissing {
                tool: "pandoc".to_string(),
            })
        }
        Err(e) => {
            return Err(TextbookError::ExportFailed {
                format: format.to_string(),
                path: output.to_path_buf(),
                detail: format!("could not start pandoc: {e}"),
            })
        }
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(TextbookError::ExportFailed {
            format: format.to_string(),
            path: output.to_path_buf(),
            detail: format!("pandoc exited with {}: {}", out.status, stderr.trim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_filename("CS 101: Intro/Basics?"), "CS_101_IntroBasics");
        assert_eq!(sanitize_filename("  a \t b  "), "a_b");
        assert_eq!(sanitize_filename("<|>"), "");
    }

    #[test]
    fn output_name_fallbacks() {
        assert_eq!(resolve_output_name(Some("My Book"), Path::new("x")), "My_Book");
        assert_eq!(resolve_output_name(Some(" ?? "), Path::new("in/Week 3")), "Week_3");
        assert_eq!(resolve_output_name(None, Path::new("lectures/db_systems")), "db_systems");
        assert_eq!(resolve_output_name(None, Path::new("/")), FALLBACK_NAME);
    }

    #[test]
    fn front_matter_escapes_quotes() {
        assert_eq!(
            yaml_front_matter(r#"The "Relational" Model"#),
            "---\ntitle: \"The \\\"Relational\\\" Model\"\n---\n\n"
        );
    }

    #[test]
    fn latex_engines_get_geometry() {
        let args = pdf_args(Path::new("b.md"), Path::new("b.pdf"), "xelatex", None);
        assert!(args.contains(&"--pdf-engine=xelatex".to_string()));
        assert!(args.contains(&"geometry:margin=2cm".to_string()));
        assert!(args.contains(&"--toc-depth=2".to_string()));
    }

    #[test]
    fn css_engines_get_stylesheet() {
        let args = pdf_args(
            Path::new("b.md"),
            Path::new("b.pdf"),
            "weasyprint",
            Some(Path::new("/tmp/m.css")),
        );
        assert!(args.contains(&"--css=/tmp/m.css".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("geometry")));
    }

    #[test]
    fn epub_uses_mathml() {
        let args = epub_args(Path::new("b.md"), Path::new("b.epub"));
        assert!(args.contains(&"--mathml".to_string()));
        assert!(args.contains(&"epub3".to_string()));
    }

    #[tokio::test]
    async fn save_creates_dir_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let path = save_markdown("# One\n", &out, "book").await.unwrap();
        save_markdown("# Two\n", &out, "book").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Two\n");
        assert!(!out.join("book.md.tmp").exists());
    }

    #[tokio::test]
    async fn sink_writes_current_book() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownFileSink::new(dir.path(), "notes");
        sink.save("# Notes\n\n## Ch 1\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(sink.path()).unwrap(),
            "# Notes\n\n## Ch 1\n"
        );
    }
}
