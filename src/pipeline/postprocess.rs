//! Post-processing: deterministic cleanup of LLM-written chapter Markdown.
//!
//! Even well-prompted models wrap their answer in ```` ```markdown ```` fences,
//! emit `\r\n`, reference figures that do not exist, or leave zero-width
//! characters behind. These rules fix such quirks without touching the prose.
//!
//! Rules run in a fixed order: fences are stripped before line endings are
//! normalised, and heading spacing runs on the de-fenced text so that `#`
//! lines inside code blocks are never mistaken for headings.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to raw model output.
///
/// 1. Strip outer Markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 4+ consecutive newlines down to 3
/// 5. Ensure a blank line before headings (outside code blocks)
/// 6. Replace hallucinated local image links with their alt text
/// 7. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 8. Ensure the text ends with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = remove_hallucinated_images(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(markdown|md)?[ \t]*\r?\n(.*)\r?\n```\s*$").unwrap()
});

/// Remove a single fence pair wrapping the whole answer.
///
/// A ```` ```markdown ```` wrapper is always removed. A bare ```` ``` ````
/// pair is removed only when no other fence sits between the two, so an
/// answer that merely starts and ends with code blocks is left intact.
pub fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) if caps.get(1).is_some() || !caps[2].lines().any(is_fence) => {
            caps[2].to_string()
        }
        _ => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Heading spacing ──────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+\S").unwrap());

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    let mut in_code = false;
    for (i, line) in input.lines().enumerate() {
        if is_fence(line) {
            in_code = !in_code;
        }
        if !in_code && i > 0 && RE_HEADING.is_match(line) {
            let trimmed = result.trim_end_matches('\n').len();
            result.truncate(trimmed);
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

/// Push every heading down so that the shallowest one sits at `min_level`.
///
/// Used when chapters that start with `# Title` are nested under a book's
/// own `# Title`. Lines inside fenced code are left alone.
pub fn nest_headings(input: &str, min_level: usize) -> String {
    let mut in_code = false;
    let mut shallowest = usize::MAX;
    for line in input.lines() {
        if is_fence(line) {
            in_code = !in_code;
            continue;
        }
        if !in_code {
            if let Some(caps) = RE_HEADING.captures(line) {
                shallowest = shallowest.min(caps[1].len());
            }
        }
    }
    if shallowest == usize::MAX || shallowest >= min_level {
        return input.to_string();
    }
    let shift = min_level - shallowest;

    let mut out = Vec::new();
    in_code = false;
    for line in input.lines() {
        if is_fence(line) {
            in_code = !in_code;
            out.push(line.to_string());
            continue;
        }
        match RE_HEADING.captures(line) {
            Some(caps) if !in_code => {
                let level = (caps[1].len() + shift).min(6);
                out.push(format!("{}{}", "#".repeat(level), &line[caps[1].len()..]));
            }
            _ => out.push(line.to_string()),
        }
    }
    let mut joined = out.join("\n");
    if input.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

// ── Rule 6: Remove hallucinated image links ──────────────────────────────────
//
// The model never sees the slide images, so any `![alt](url)` it writes is
// invented. Links to real absolute URLs are kept; local paths and known
// placeholder hosts collapse to the italic alt text.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if !u.starts_with("http://") && !u.starts_with("https://") {
        return true;
    }
    const FAKE_HOSTS: [&str; 5] = [
        "example.com",
        "placeholder.com",
        "dummyimage.com",
        "placehold.it",
        "picsum.photos",
    ];
    FAKE_HOSTS.iter().any(|d| u.contains(d))
}

fn remove_hallucinated_images(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut in_code = false;
    for line in input.split_inclusive('\n') {
        if is_fence(line) {
            in_code = !in_code;
        }
        if in_code {
            result.push_str(line);
            continue;
        }
        let replaced = RE_IMAGE.replace_all(line, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if !is_placeholder_url(&caps[2]) {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{}*", alt)
            }
        });
        result.push_str(&replaced);
    }
    result
}

// ── Rule 7: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 8: Single final newline ─────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Optional: ASCII-safe typography ──────────────────────────────────────────

const TYPOGRAPHY: [(char, &str); 9] = [
    ('\u{2013}', "-"),
    ('\u{2014}', "-"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{2212}', "-"),
];

/// Replace typographic punctuation that some PDF fonts cannot render.
pub fn ascii_safe(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match TYPOGRAPHY.iter().find(|(c, _)| *c == ch) {
            Some((_, repl)) => out.push_str(repl),
            None => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fences_with_language() {
        assert_eq!(strip_markdown_fences("```markdown\n# Hi\nthere\n```"), "# Hi\nthere");
        assert_eq!(strip_markdown_fences("```md\n# Hi\n```\n"), "# Hi");
    }

    #[test]
    fn strip_fences_leaves_inner_code_alone() {
        let input = "# Title\n\n```python\nprint(1)\n```";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn strip_fences_keeps_leading_and_trailing_code_blocks() {
        let input = "```\nSELECT * FROM r;\n```\n\nA selection keeps rows.\n\n```\nSELECT a FROM r;\n```";
        assert_eq!(strip_markdown_fences(input), input);
        let cleaned = clean_markdown(input);
        assert_eq!(cleaned.matches("```").count(), 4);
        assert!(cleaned.starts_with("```\nSELECT * FROM r;\n```\n"));
    }

    #[test]
    fn strip_fences_bare_wrapper_without_inner_code() {
        assert_eq!(strip_markdown_fences("```\n# Sets\ntext\n```"), "# Sets\ntext");
    }

    #[test]
    fn strip_markdown_wrapper_keeps_inner_code() {
        let input = "```markdown\n# Joins\n\n```sql\nSELECT 1;\n```\n```";
        assert_eq!(strip_markdown_fences(input), "# Joins\n\n```sql\nSELECT 1;\n```");
    }

    #[test]
    fn line_endings_and_trailing_space() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert_eq!(trim_trailing_whitespace("  a   \nb\t"), "  a\nb");
    }

    #[test]
    fn collapse_blank_lines_keeps_two() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn heading_spacing_skips_code_comments() {
        let input = "intro\n## Section\ntext\n```bash\n# a shell comment\n```";
        let result = normalise_heading_spacing(input);
        assert!(result.contains("intro\n\n## Section\n"));
        assert!(result.contains("```bash\n# a shell comment\n```"));
    }

    #[test]
    fn nest_headings_demotes_h1() {
        let input = "# Chapter\n\ntext\n\n## Part\n\n```\n# not a heading\n```\n";
        let nested = nest_headings(input, 2);
        assert!(nested.starts_with("## Chapter\n"));
        assert!(nested.contains("\n### Part\n"));
        assert!(nested.contains("\n# not a heading\n"));
        assert!(nested.ends_with('\n'));
    }

    #[test]
    fn nest_headings_noop_when_already_deep() {
        let input = "## Chapter 2\n\n### Sub";
        assert_eq!(nest_headings(input, 2), input);
        assert_eq!(nest_headings("plain text", 2), "plain text");
    }

    #[test]
    fn hallucinated_images_become_captions() {
        let input = "See ![Karnaugh map](kmap.png) and ![](x.png) and ![Fig](https://arxiv.org/f.png)";
        let result = remove_hallucinated_images(input);
        assert!(result.contains("*Karnaugh map*"));
        assert!(!result.contains("x.png"));
        assert!(result.contains("![Fig](https://arxiv.org/f.png)"));
        assert!(remove_hallucinated_images("![d](https://example.com/a.png)").contains("*d*"));
    }

    #[test]
    fn images_inside_code_blocks_untouched() {
        let input = "![Plan](plan.png)\n```markdown\n![Plan](plan.png)\n```\n";
        assert_eq!(
            remove_hallucinated_images(input),
            "*Plan*\n```markdown\n![Plan](plan.png)\n```\n"
        );
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("a\u{200B}b\u{FEFF}c\u{00AD}d"), "abcd");
    }

    #[test]
    fn final_newline() {
        assert_eq!(ensure_final_newline("x\n\n\n"), "x\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn ascii_safe_replaces_typography() {
        assert_eq!(
            ascii_safe("\u{201C}Sets\u{201D} \u{2014} it\u{2019}s fine\u{2026}"),
            "\"Sets\" - it's fine..."
        );
        assert_eq!(ascii_safe("λ-calculus"), "λ-calculus");
    }

    #[test]
    fn full_pipeline() {
        let input = "```markdown\n# Logical Design\r\n\r\nBody   \n\n\n\n\n\n## Normal Forms\nText\u{200B}\n```";
        let result = clean_markdown(input);
        assert!(result.starts_with("# Logical Design\n"));
        assert!(result.ends_with("Text\n"));
        assert!(!result.contains("\n\n\n\n"));
        assert!(!result.contains('\u{200B}'));
    }
}
