//! Integration tests for chapter and book generation.
//!
//! The model is replaced by a scripted [`TextGenerator`] that answers from a
//! queue and records every prompt it is sent, so these tests run offline and
//! can assert on exactly what the pipeline asked for.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use slides2textbook::error::ChapterError;
use slides2textbook::prompts::{build_system_prompt, WRITER_PROMPT};
use slides2textbook::{
    generate_book, generate_chapter, BookSink, Generation, GenerationError, GenerationMode,
    GenerationProgressCallback, PromptRules, TextGenerator, TextbookConfig, TextbookError,
    TokenCount,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers from a queue; records `(developer, user)` for every call.
#[derive(Default)]
struct ScriptedGenerator {
    answers: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    fn new<I>(answers: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<&'static str, GenerationError>>,
    {
        Arc::new(Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|a| a.map(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, developer: &str, user: &str) -> Result<Generation, GenerationError> {
        self.prompts
            .lock()
            .unwrap()
            .push((developer.to_string(), user.to_string()));
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GenerationError::Empty))?;
        Ok(Generation {
            text: answer,
            input_tokens: 100,
            cached_tokens: 60,
            output_tokens: 40,
            reasoning_tokens: 10,
        })
    }
}

/// Keeps every snapshot the book pipeline hands over.
#[derive(Default)]
struct RecordingSink {
    snapshots: Mutex<Vec<String>>,
}

#[async_trait]
impl BookSink for RecordingSink {
    async fn save(&self, markdown: &str) -> Result<(), TextbookError> {
        self.snapshots.lock().unwrap().push(markdown.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl GenerationProgressCallback for EventLog {
    fn on_generation_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_chapter_start(&self, number: usize, _total: usize, title: &str) {
        self.events.lock().unwrap().push(format!("begin {number} {title}"));
    }
    fn on_chapter_complete(&self, number: usize, _total: usize, _len: usize) {
        self.events.lock().unwrap().push(format!("ok {number}"));
    }
    fn on_chapter_error(&self, number: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {number}"));
    }
    fn on_generation_complete(&self, total: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {success_count}/{total}"));
    }
}

/// Route library logs through the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write(dir: &Path, name: &str, text: &str) {
    std::fs::write(dir.join(name), text).unwrap();
}

fn config_with(generator: Arc<ScriptedGenerator>) -> slides2textbook::TextbookConfigBuilder {
    init_tracing();
    TextbookConfig::builder()
        .generator(generator)
        .max_retries(0)
        .retry_backoff_ms(1)
}

// ── Chapter mode ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn chapter_direct_sends_rules_and_context() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slides.md", "Joins\n- inner\n- outer");
    write(dir.path(), "transcript.txt", "Today we look at joins.");

    let gen = ScriptedGenerator::new([Ok("```markdown\n# Joins\n\nAn inner join keeps matches.\n```")]);
    let config = config_with(Arc::clone(&gen)).build().unwrap();

    let chapter = generate_chapter(dir.path(), &config).await.unwrap();
    assert_eq!(chapter.markdown, "# Joins\n\nAn inner join keeps matches.\n");
    assert_eq!(chapter.sources.len(), 2);
    assert!(chapter.sections.is_empty());
    assert_eq!(chapter.stats.llm_calls, 1);
    assert_eq!(chapter.stats.usage.input_tokens, 100);

    let prompts = gen.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].0, build_system_prompt(&PromptRules::all()));
    assert_eq!(
        prompts[0].1,
        "slides:\nJoins\n- inner\n- outer\n\ntranscript:\nToday we look at joins.\n\n"
    );
}

#[tokio::test]
async fn chapter_agents_plan_then_write_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slides.md", "Normalisation: 1NF, 2NF, 3NF");

    let plan = r#"{"sections":[
        {"name":"First Normal Form","plan_bulletpoints":["atomic values"]},
        {"name":"Higher Normal Forms","plan_bulletpoints":["2NF","3NF"]}
    ]}"#;
    let gen = ScriptedGenerator::new([
        Ok(plan),
        Ok("## First Normal Form\n\nAtomic."),
        Ok("## Higher Normal Forms\n\nDependencies."),
    ]);
    let events = Arc::new(EventLog::default());
    let config = config_with(Arc::clone(&gen))
        .mode(GenerationMode::Agents)
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let chapter = generate_chapter(dir.path(), &config).await.unwrap();
    assert_eq!(
        chapter.markdown,
        "## First Normal Form\n\nAtomic.\n\n## Higher Normal Forms\n\nDependencies.\n"
    );
    assert_eq!(chapter.sections, vec!["First Normal Form", "Higher Normal Forms"]);
    assert_eq!(chapter.stats.llm_calls, 3);
    assert_eq!(chapter.stats.usage.output_tokens, 120);

    let prompts = gen.prompts();
    // Writer sees the context, and the second section sees the first.
    assert!(prompts[1].0.starts_with(WRITER_PROMPT));
    assert!(prompts[1].0.contains("Normalisation: 1NF, 2NF, 3NF"));
    assert!(!prompts[1].0.contains("Atomic."));
    assert!(prompts[2].0.contains("## First Normal Form\n\nAtomic."));
    assert_eq!(prompts[2].1, "Higher Normal Forms { \n- 2NF\n- 3NF\n}\n");

    assert_eq!(
        *events.events.lock().unwrap(),
        vec![
            "start 2",
            "begin 1 First Normal Form",
            "ok 1",
            "begin 2 Higher Normal Forms",
            "ok 2",
            "done 2/2"
        ]
    );
}

#[tokio::test]
async fn chapter_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slides.md", "x");

    let gen = ScriptedGenerator::new([
        Err(GenerationError::Api("HTTP 429".into())),
        Err(GenerationError::Api("HTTP 429".into())),
    ]);
    let config = config_with(Arc::clone(&gen)).max_retries(1).build().unwrap();

    let err = generate_chapter(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, TextbookError::LlmApiError { .. }), "got {err:?}");
    assert_eq!(gen.prompts().len(), 2);
}

#[tokio::test]
async fn chapter_ascii_safe_with_front_matter() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slides.md", "Joins");

    let gen = ScriptedGenerator::new([Ok(
        "# Joins \u{2014} \u{201C}inner\u{201D} and \u{2018}outer\u{2019}\u{2026}",
    )]);
    let config = config_with(gen)
        .ascii_safe(true)
        .include_front_matter(true)
        .build()
        .unwrap();

    let chapter = generate_chapter(dir.path(), &config).await.unwrap();
    assert!(chapter.markdown.starts_with("---\ntitle: \""), "{}", chapter.markdown);
    assert!(chapter
        .markdown
        .ends_with("\"\n---\n\n# Joins - \"inner\" and 'outer'...\n"));
    assert!(chapter.markdown.is_ascii());
}

#[tokio::test]
async fn bad_plan_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slides.md", "x");

    let gen = ScriptedGenerator::new([Ok("I would structure this chapter as follows...")]);
    let config = config_with(gen).mode(GenerationMode::Agents).build().unwrap();

    let err = generate_chapter(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, TextbookError::InvalidPlan { .. }));
}

// ── Book mode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn book_threads_previous_chapter_and_saves_each_step() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "01_Intro.md", "What is a database?");
    write(dir.path(), "01_Intro.txt", "Welcome to the course.");
    write(dir.path(), "02_Joins.md", "Inner and outer joins");

    let gen = ScriptedGenerator::new([
        Ok("# Chapter 1: Intro\n\nDatabases store data."),
        Ok("# Chapter 2: Joins\n\nJoins combine tables."),
    ]);
    let config = config_with(Arc::clone(&gen)).build().unwrap();
    let sink = RecordingSink::default();

    let book = generate_book(dir.path(), "Databases", &config, Some(&sink))
        .await
        .unwrap();

    assert_eq!(
        book.markdown,
        "# Databases\n\n## Chapter 1: Intro\n\nDatabases store data.\n\n\
         ## Chapter 2: Joins\n\nJoins combine tables.\n"
    );
    assert_eq!(book.chapters.len(), 2);
    assert_eq!(book.chapters[0].title, "01 Intro");
    assert_eq!(book.stats.succeeded, 2);
    assert_eq!(book.stats.usage.input_tokens, 200);
    assert_eq!(book.stats.usage.cached_tokens, 120);
    assert_eq!(book.stats.usage.output_tokens, 80);
    assert_eq!(book.stats.usage.reasoning_tokens, 20);
    assert_eq!(book.chapters[1].usage.cached_tokens, 60);

    let prompts = gen.prompts();
    assert!(prompts[0].1.contains("Chapter 1: 01 Intro"));
    assert!(prompts[0].1.contains("LECTURE TRANSCRIPT"));
    assert!(prompts[0].1.contains("Welcome to the course."));
    assert!(!prompts[0].1.contains("PREVIOUS CHAPTER"));
    assert!(prompts[1].1.contains("PREVIOUS CHAPTER"));
    assert!(prompts[1].1.contains("Databases store data."));
    assert!(!prompts[1].1.contains("LECTURE TRANSCRIPT"));

    let snapshots = sink.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(
        snapshots[0],
        "# Databases\n\n## Chapter 1: Intro\n\nDatabases store data.\n"
    );
    assert_eq!(snapshots[1], book.markdown);
}

#[tokio::test]
async fn failed_chapter_is_skipped_and_context_not_advanced() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", "alpha slides");
    write(dir.path(), "b.md", "beta slides");
    write(dir.path(), "c.md", "gamma slides");

    let gen = ScriptedGenerator::new([
        Ok("## Alpha\n\nfirst"),
        Err(GenerationError::Timeout(600)),
        Ok("## Gamma\n\nthird"),
    ]);
    let events = Arc::new(EventLog::default());
    let config = config_with(Arc::clone(&gen))
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let book = generate_book(dir.path(), "Greek", &config, None).await.unwrap();
    assert_eq!(book.stats.succeeded, 2);
    assert_eq!(book.stats.failed, 1);
    assert!(matches!(
        book.chapters[1].error,
        Some(ChapterError::LlmFailed { chapter: 2, .. })
    ));
    assert!(!book.markdown.contains("beta"));

    // Chapter 3 continues from chapter 1, the last one that succeeded.
    let prompts = gen.prompts();
    assert!(prompts[2].1.contains("## Alpha\n\nfirst"));

    assert_eq!(
        *events.events.lock().unwrap(),
        vec!["start 3", "begin 1 a", "ok 1", "begin 2 b", "err 2", "begin 3 c", "ok 3", "done 2/3"]
    );
}

#[tokio::test]
async fn unreadable_deck_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "01_Intro.md", "What is a database?");
    write(dir.path(), "02_Broken.pdf", "<html>not really a pdf</html>");
    write(dir.path(), "03_Joins.md", "Inner and outer joins");

    let gen = ScriptedGenerator::new([
        Ok("## Intro\n\nDatabases store data."),
        Ok("## Joins\n\nJoins combine tables."),
    ]);
    let config = config_with(Arc::clone(&gen)).build().unwrap();

    let book = generate_book(dir.path(), "Databases", &config, None).await.unwrap();
    assert_eq!(book.chapters.len(), 3);
    assert_eq!(book.stats.succeeded, 2);
    assert_eq!(book.stats.failed, 1);
    match book.chapters[1].error {
        Some(ChapterError::LoadFailed { chapter, ref detail }) => {
            assert_eq!(chapter, 2);
            assert!(detail.contains("02_Broken.pdf"), "got {detail}");
        }
        ref other => panic!("expected LoadFailed, got {other:?}"),
    }
    assert_eq!(book.chapters[1].usage, TokenCount::default());

    // No model call for the broken deck; chapter 3 continues from chapter 1.
    let prompts = gen.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].1.contains("Chapter 3: 03 Joins"));
    assert!(prompts[1].1.contains("Databases store data."));
    assert_eq!(
        book.markdown,
        "# Databases\n\n## Intro\n\nDatabases store data.\n\n## Joins\n\nJoins combine tables.\n"
    );
}

#[tokio::test]
async fn book_ascii_safe_with_front_matter() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "01_Sets.md", "sets");
    write(dir.path(), "02_Maps.md", "maps");

    let gen = ScriptedGenerator::new([
        Ok("# Sets\n\nA set \u{2014} unordered."),
        Ok("# Maps\n\nKey\u{2013}value \u{201C}pairs\u{201D}."),
    ]);
    let config = config_with(gen)
        .ascii_safe(true)
        .include_front_matter(true)
        .build()
        .unwrap();

    let book = generate_book(dir.path(), "Maths", &config, None).await.unwrap();
    assert_eq!(
        book.markdown,
        "---\ntitle: \"Maths\"\n---\n\n# Maths\n\n\
         ## Sets\n\nA set - unordered.\n\n\
         ## Maps\n\nKey-value \"pairs\".\n"
    );
    assert_eq!(book.markdown.matches("title:").count(), 1);
}

#[tokio::test]
async fn all_chapters_failing_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", "alpha");
    write(dir.path(), "b.md", "beta");

    let gen = ScriptedGenerator::new([
        Err(GenerationError::Api("HTTP 500".into())),
        Err(GenerationError::Api("HTTP 500".into())),
    ]);
    let config = config_with(gen).build().unwrap();

    let err = generate_book(dir.path(), "T", &config, None).await.unwrap_err();
    match err {
        TextbookError::AllChaptersFailed {
            total, first_error, ..
        } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("HTTP 500"), "got {first_error}");
        }
        other => panic!("expected AllChaptersFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn book_to_disk_with_markdown_sink() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(dir.path(), "Week_1.md", "sets");

    let gen = ScriptedGenerator::new([Ok("# Sets\n\nA set is a collection.")]);
    let config = config_with(gen).build().unwrap();
    let sink = slides2textbook::MarkdownFileSink::new(out.path(), "maths");

    generate_book(dir.path(), "Maths", &config, Some(&sink))
        .await
        .unwrap();
    let saved = std::fs::read_to_string(out.path().join("maths.md")).unwrap();
    assert_eq!(saved, "# Maths\n\n## Sets\n\nA set is a collection.\n");
}
