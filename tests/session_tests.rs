//! End-to-end session workflow tests over scripted collaborators
//!
//! The worker channel, content extractor, cache store, and persistence sink
//! are all scripted in-process, so these tests exercise the full
//! orchestration path: capability handshake, extraction, detection,
//! streaming summarization with reveal, translation, prompts, per-answer
//! operations, and save/cancel resets.

use async_trait::async_trait;
use parking_lot::Mutex;
use ruminate::{
    CacheStore, ContentExtractor, ExtractedContent, Orchestrator, ReflectionRecord,
    ReflectionSink, RenderFn, RequestKind, RewriteTone, SessionError, Settings, StreamEvent,
    StreamHandle, StreamReceiver, SummaryFormat, WorkerChannel, WorkerRequest, WorkerResponse,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const PAGE_URL: &str = "https://example.com/article";
const PAGE_TEXT: &str = "An article about learning in public and why writing \
                         down what surprised you makes the lesson stick.";

const SUMMARY_CHUNKS: &[&str] = &["- insight one\n", "- surprise two\n", "- apply three"];
const PROMPT_ONE: &str = "What was the core insight?";
const PROMPT_TWO: &str = "How will you apply it?";

/// Scripted worker covering every request kind the engine issues
struct ScriptedWorker {
    ai_available: bool,
    detection: Value,
    fail_prompts_once: AtomicBool,
    slow_stream: bool,
}

impl ScriptedWorker {
    fn new() -> Self {
        Self {
            ai_available: true,
            detection: json!({ "code": "en", "confidence": 0.95, "displayName": "English" }),
            fail_prompts_once: AtomicBool::new(false),
            slow_stream: false,
        }
    }

    fn with_ai_available(mut self, available: bool) -> Self {
        self.ai_available = available;
        self
    }

    fn with_detection(mut self, code: &str, confidence: f64) -> Self {
        self.detection = json!({ "code": code, "confidence": confidence });
        self
    }

    fn failing_prompts_once(self) -> Self {
        self.fail_prompts_once.store(true, Ordering::SeqCst);
        self
    }

    fn with_slow_stream(mut self) -> Self {
        self.slow_stream = true;
        self
    }
}

#[async_trait]
impl WorkerChannel for ScriptedWorker {
    async fn request(&self, request: WorkerRequest) -> ruminate::Result<WorkerResponse> {
        let text = request.payload["text"].as_str().unwrap_or_default();
        let response = match request.kind {
            RequestKind::CheckAi => WorkerResponse::ok(json!({ "available": self.ai_available })),
            RequestKind::GetCapabilities => WorkerResponse::ok(json!({
                "summarizer": true,
                "translator": true,
                "languageDetector": true,
                "rewriter": true,
            })),
            RequestKind::DetectLanguage => WorkerResponse::ok(self.detection.clone()),
            RequestKind::Summarize => {
                WorkerResponse::ok(json!({ "summary": "Headline\n- point a\n- point b" }))
            }
            RequestKind::GeneratePrompts => {
                if self.fail_prompts_once.swap(false, Ordering::SeqCst) {
                    WorkerResponse::fail("prompt model busy")
                } else {
                    WorkerResponse::ok(json!({ "prompts": [PROMPT_ONE, PROMPT_TWO] }))
                }
            }
            RequestKind::Translate => {
                let target = request.payload["target"].as_str().unwrap_or_default();
                WorkerResponse::ok(json!({ "translated": format!("{} [{}]", text, target) }))
            }
            RequestKind::Rewrite => {
                let tone = request.payload["tone"].as_str().unwrap_or_default();
                WorkerResponse::ok(json!({ "rewritten": format!("{} ({})", text, tone) }))
            }
            RequestKind::Proofread => {
                WorkerResponse::ok(json!({ "corrected": format!("{} [sic]", text) }))
            }
            RequestKind::SummarizeStream => WorkerResponse::fail("streaming uses open_stream"),
        };
        Ok(response)
    }

    fn open_stream(
        &self,
        _request: WorkerRequest,
    ) -> ruminate::Result<(StreamHandle, StreamReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = StreamHandle::new();

        if self.slow_stream {
            let task_handle = handle.clone();
            tokio::spawn(async move {
                for i in 0..20 {
                    if task_handle.is_cancelled() {
                        return;
                    }
                    if tx
                        .send(StreamEvent::Chunk(format!("- slow line {}\n", i)))
                        .is_err()
                    {
                        return;
                    }
                    sleep(Duration::from_millis(20)).await;
                }
                let _ = tx.send(StreamEvent::Complete(None));
            });
        } else {
            for chunk in SUMMARY_CHUNKS {
                let _ = tx.send(StreamEvent::Chunk((*chunk).to_string()));
            }
            let _ = tx.send(StreamEvent::Complete(None));
        }

        Ok((handle, rx))
    }
}

struct PageExtractor {
    content: Option<ExtractedContent>,
}

impl ContentExtractor for PageExtractor {
    fn extract(&self) -> Option<ExtractedContent> {
        self.content.clone()
    }
}

#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<ReflectionRecord>>,
}

#[async_trait]
impl ReflectionSink for RecordingSink {
    async fn save(&self, record: ReflectionRecord) -> ruminate::Result<()> {
        self.saved.lock().push(record);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> ruminate::Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> ruminate::Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

fn page() -> ExtractedContent {
    ExtractedContent {
        text: PAGE_TEXT.to_string(),
        url: PAGE_URL.to_string(),
        title: Some("Learning in public".to_string()),
    }
}

fn engine_with(
    worker: ScriptedWorker,
    settings: Settings,
    content: Option<ExtractedContent>,
) -> (Arc<Orchestrator>, Arc<RecordingSink>) {
    // RUST_LOG=debug makes failing workflow tests readable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let sink = Arc::new(RecordingSink::default());
    let render: RenderFn = Arc::new(|| {});
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(worker),
        Arc::new(PageExtractor { content }),
        Arc::new(MemoryStore::default()),
        sink.clone(),
        settings,
        render,
    ));
    (orchestrator, sink)
}

fn engine(worker: ScriptedWorker) -> (Arc<Orchestrator>, Arc<RecordingSink>) {
    engine_with(worker, Settings::default(), Some(page()))
}

#[tokio::test]
async fn test_happy_path_builds_summary_and_prompts() {
    let (orch, _sink) = engine(ScriptedWorker::new());

    orch.start_session().await.unwrap();

    let state = orch.state();
    assert!(state.is_overlay_visible());
    assert_eq!(
        state.summary_display(),
        ["insight one", "surprise two", "apply three"]
    );
    assert!(state.is_stream_done());
    assert!(!state.is_loading());
    assert_eq!(state.prompts(), [PROMPT_ONE, PROMPT_TWO]);
    assert_eq!(state.detected_language().as_deref(), Some("en"));
    assert_eq!(state.error(), None);
}

#[tokio::test]
async fn test_extraction_failure_is_fatal() {
    let (orch, _sink) = engine_with(ScriptedWorker::new(), Settings::default(), None);

    let err = orch.start_session().await.unwrap_err();

    assert!(matches!(err, SessionError::ExtractionFailed(_)));
    let state = orch.state();
    assert!(state.read().ui.error_modal_visible);
    assert!(!state.is_overlay_visible());
    assert!(state.error().is_some());
}

#[tokio::test]
async fn test_whitespace_only_extraction_is_fatal() {
    let blank = ExtractedContent {
        text: "  \n\t  ".to_string(),
        url: PAGE_URL.to_string(),
        title: None,
    };
    let (orch, _sink) = engine_with(ScriptedWorker::new(), Settings::default(), Some(blank));

    let err = orch.start_session().await.unwrap_err();

    assert!(matches!(err, SessionError::ExtractionFailed(_)));
    assert!(orch.state().read().ui.error_modal_visible);
    assert!(orch.state().read().reflection.extracted.is_none());
}

#[tokio::test]
async fn test_ai_unavailable_then_manual_continuation() {
    let (orch, _sink) = engine(ScriptedWorker::new().with_ai_available(false));

    let err = orch.start_session().await.unwrap_err();
    assert!(matches!(err, SessionError::CapabilityUnavailable(_)));
    assert!(orch.state().read().ui.error_modal_visible);

    orch.start_manual_session().unwrap();

    let state = orch.state();
    assert!(state.is_overlay_visible());
    assert!(!state.read().ui.error_modal_visible);
    assert!(state.summary_display().is_empty());
    assert!(state.prompts().is_empty());
    assert_eq!(state.error(), None);
}

#[tokio::test]
async fn test_recoverable_prompt_failure_then_retry() {
    let (orch, _sink) = engine(ScriptedWorker::new().failing_prompts_once());

    // Prompt generation fails, but the session stays open with the summary.
    orch.start_session().await.unwrap();

    let state = orch.state();
    assert!(state.is_overlay_visible());
    assert!(state.read().ui.notification_visible);
    assert!(state.error().is_some());
    assert!(!state.summary_display().is_empty());
    assert!(state.prompts().is_empty());

    orch.retry_summary().await.unwrap();

    assert_eq!(state.prompts(), [PROMPT_ONE, PROMPT_TWO]);
    assert!(!state.read().ui.notification_visible);
    assert_eq!(state.error(), None);
}

#[tokio::test]
async fn test_high_confidence_foreign_page_auto_translates() {
    let (orch, _sink) = engine(ScriptedWorker::new().with_detection("fi", 0.95));

    orch.start_session().await.unwrap();

    let state = orch.state();
    assert_eq!(
        state.summary_display(),
        [
            "insight one [en]",
            "surprise two [en]",
            "apply three [en]"
        ]
    );
    // The display language is now the target; the original code is kept.
    assert_eq!(state.detected_language().as_deref(), Some("en"));
    assert_eq!(
        state.read().language.original_detected_code.as_deref(),
        Some("fi")
    );
    assert_eq!(state.prompts(), [PROMPT_ONE, PROMPT_TWO]);
}

#[tokio::test]
async fn test_low_confidence_detection_keeps_original_language() {
    let (orch, _sink) = engine(ScriptedWorker::new().with_detection("fi", 0.75));

    orch.start_session().await.unwrap();

    let state = orch.state();
    assert_eq!(
        state.summary_display(),
        ["insight one", "surprise two", "apply three"]
    );
    assert_eq!(state.detected_language().as_deref(), Some("fi"));
}

#[tokio::test]
async fn test_manual_translation_after_start() {
    let (orch, _sink) = engine(ScriptedWorker::new().with_detection("fi", 0.85));

    orch.start_session().await.unwrap();
    assert_eq!(orch.state().detected_language().as_deref(), Some("fi"));

    orch.translate_summary_now().await.unwrap();

    let state = orch.state();
    assert_eq!(
        state.summary_display(),
        [
            "insight one [en]",
            "surprise two [en]",
            "apply three [en]"
        ]
    );
    assert_eq!(state.detected_language().as_deref(), Some("en"));
}

#[tokio::test]
async fn test_headline_format_uses_one_shot_path() {
    let settings = Settings::default().with_summary_format(SummaryFormat::HeadlineBullets);
    let (orch, _sink) = engine_with(ScriptedWorker::new(), settings, Some(page()));

    orch.start_session().await.unwrap();

    let state = orch.state();
    assert_eq!(state.summary_display(), ["Headline", "point a", "point b"]);
    assert!(state.is_stream_done());
    assert_eq!(state.prompts(), [PROMPT_ONE, PROMPT_TWO]);
}

#[tokio::test]
async fn test_save_persists_and_resets() {
    let (orch, sink) = engine(ScriptedWorker::new());

    orch.start_session().await.unwrap();
    orch.set_answer(0, "The insight was the writing itself.").unwrap();
    orch.set_answer(1, "Start a public notes file.").unwrap();

    orch.save().await.unwrap();

    let saved = sink.saved.lock();
    assert_eq!(saved.len(), 1);
    let record = &saved[0];
    assert_eq!(record.url, PAGE_URL);
    assert_eq!(record.summary.len(), 3);
    assert_eq!(record.prompts, [PROMPT_ONE, PROMPT_TWO]);
    assert_eq!(record.answers[0], "The insight was the writing itself.");
    assert_eq!(record.language.as_deref(), Some("en"));

    // Session is gone, but the capability handshake survives.
    let state = orch.state();
    assert!(!state.is_overlay_visible());
    assert!(state.summary_display().is_empty());
    assert!(state.prompts().is_empty());
    assert_eq!(state.read().capabilities.available, Some(true));
}

#[tokio::test]
async fn test_answer_operations() {
    let (orch, _sink) = engine(ScriptedWorker::new());
    orch.start_session().await.unwrap();

    orch.set_answer(0, "my draft answer").unwrap();
    let corrected = orch.proofread_answer(0).await.unwrap();
    assert_eq!(corrected, "my draft answer [sic]");
    assert_eq!(orch.state().read().reflection.answers[0], corrected);

    let rewritten = orch.rewrite_answer(0, RewriteTone::Formal).await.unwrap();
    assert_eq!(rewritten, "my draft answer [sic] (formal)");

    orch.set_answer(1, "toinen vastaus").unwrap();
    let translated = orch.translate_answer(1).await.unwrap();
    assert_eq!(translated, "toinen vastaus [en]");
}

#[tokio::test]
async fn test_busy_answer_slot_rejects_second_operation() {
    let (orch, _sink) = engine(ScriptedWorker::new());
    orch.start_session().await.unwrap();
    orch.set_answer(0, "my draft answer").unwrap();

    // Simulate an in-flight operation holding the slot.
    assert!(orch.state().write().begin_rewrite(0));

    let err = orch.proofread_answer(0).await.unwrap_err();
    assert!(matches!(err, SessionError::OperationFailed { .. }));
    assert!(err.to_string().contains("already running"));
    // The rejection must not release the original claim.
    assert!(orch.state().is_rewriting(0));

    orch.state().write().finish_rewrite(0);
    orch.proofread_answer(0).await.unwrap();
}

#[tokio::test]
async fn test_empty_answer_is_rejected() {
    let (orch, _sink) = engine(ScriptedWorker::new());
    orch.start_session().await.unwrap();

    let err = orch.proofread_answer(1).await.unwrap_err();
    assert!(matches!(err, SessionError::OperationFailed { .. }));
    assert!(!orch.state().is_rewriting(1));
}

#[tokio::test]
async fn test_answer_slot_out_of_range() {
    let (orch, _sink) = engine(ScriptedWorker::new());
    assert!(orch.set_answer(2, "nope").is_err());
}

#[tokio::test]
async fn test_cancel_supersedes_in_flight_stream() {
    let (orch, _sink) = engine(ScriptedWorker::new().with_slow_stream());

    let runner = orch.clone();
    let task = tokio::spawn(async move { runner.start_session().await });

    // Let a few chunks land, then discard the session mid-stream.
    sleep(Duration::from_millis(60)).await;
    orch.cancel();

    task.await.unwrap().unwrap();

    // The superseded run left nothing behind, not even an error.
    let state = orch.state();
    assert!(!state.is_overlay_visible());
    assert!(state.summary_raw().is_empty());
    assert!(state.summary_display().is_empty());
    assert!(state.prompts().is_empty());
    assert_eq!(state.error(), None);
    assert!(!state.read().ui.notification_visible);
}

#[tokio::test]
async fn test_override_target_language() {
    let (orch, _sink) = engine(ScriptedWorker::new().with_detection("fi", 0.85));
    orch.start_session().await.unwrap();

    orch.override_target_language("sv");
    orch.translate_summary_now().await.unwrap();

    let state = orch.state();
    assert!(state.read().language.is_overridden);
    assert_eq!(
        state.summary_display(),
        [
            "insight one [sv]",
            "surprise two [sv]",
            "apply three [sv]"
        ]
    );
}

#[tokio::test]
async fn test_muted_setting_survives_session_reset() {
    let (orch, _sink) = engine(ScriptedWorker::new());
    orch.set_muted(true);

    orch.start_session().await.unwrap();
    orch.cancel();

    assert!(orch.state().is_muted());
}
