//! Session orchestrator: the reflection workflow state machine
//!
//! Sequences capability checks, content extraction, language detection,
//! translation, summarization, and prompt generation over the shared session
//! state, and owns error branching and cancellation. Starting a new session
//! supersedes the previous one: the active stream is cancelled, the state
//! epoch advances, and reflection/language data is reset while the capability
//! cache and audio preference survive.

use crate::channel::{RequestKind, StreamHandle, WorkerChannel, WorkerRequest, WorkerResponse};
use crate::pipeline::{parse_display_units, SummaryPipeline};
use crate::session::{ContentExtractor, ReflectionRecord, ReflectionSink};
use crate::settings::Settings;
use crate::state::{
    LanguageDetection, RenderFn, SharedSessionState, SummaryFormat, ANSWER_SLOTS,
};
use crate::translate::{
    display_language_name, should_auto_translate, CacheStore, TranslationCache, TranslationEngine,
};
use crate::{Result, SessionError};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on one-shot worker requests; a timeout is treated exactly
/// like an explicit error response
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How much of the extracted text is sampled for language detection
const DETECTION_SAMPLE_CHARS: usize = 500;

/// Tone presets for answer rewriting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteTone {
    Formal,
    Friendly,
    Concise,
}

impl RewriteTone {
    /// Wire name used in worker payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteTone::Formal => "formal",
            RewriteTone::Friendly => "friendly",
            RewriteTone::Concise => "concise",
        }
    }
}

impl std::fmt::Display for RewriteTone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main orchestrator for the reflection workflow
///
/// All collaborators are injected so tests can substitute scripted
/// implementations. One orchestrator serves the whole engine lifetime; each
/// `start_session` call supersedes whatever came before it.
pub struct Orchestrator {
    state: SharedSessionState,
    channel: Arc<dyn WorkerChannel>,
    extractor: Arc<dyn ContentExtractor>,
    sink: Arc<dyn ReflectionSink>,
    settings: Settings,
    render: RenderFn,
    pipeline: SummaryPipeline,
    translator: TranslationEngine,
    /// The one live summarization stream; replaced (after cancel) by each run
    active_stream: Mutex<Option<StreamHandle>>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given collaborators
    pub fn new(
        channel: Arc<dyn WorkerChannel>,
        extractor: Arc<dyn ContentExtractor>,
        cache_store: Arc<dyn CacheStore>,
        sink: Arc<dyn ReflectionSink>,
        settings: Settings,
        render: RenderFn,
    ) -> Self {
        let state = SharedSessionState::new();
        state.write().audio.muted = settings.muted;

        let cache = TranslationCache::new(cache_store);
        let pipeline = SummaryPipeline::new(state.clone(), render.clone());
        let translator = TranslationEngine::new(
            channel.clone(),
            cache,
            state.clone(),
            render.clone(),
        );

        Self {
            state,
            channel,
            extractor,
            sink,
            settings,
            render,
            pipeline,
            translator,
            active_stream: Mutex::new(None),
        }
    }

    /// Get the shared session state, for direct queries by the host
    pub fn state(&self) -> &SharedSessionState {
        &self.state
    }

    /// Get the settings snapshot this orchestrator was started with
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run the reflection workflow from the top
    ///
    /// Fatal outcomes (`CapabilityUnavailable`, `ExtractionFailed`) raise the
    /// error modal and return `Err`; recoverable summary/prompt failures
    /// raise a dismissable notification, leave the session open for
    /// `retry_summary`, and return `Ok`.
    pub async fn start_session(&self) -> Result<()> {
        info!("starting reflection session");
        self.supersede();
        self.apply_language_preferences();
        (self.render)();

        self.ensure_capabilities().await;
        let available = self.state.read().capabilities.available.unwrap_or(false);
        if !available {
            let err =
                SessionError::CapabilityUnavailable("worker reported no usable AI".to_string());
            self.raise_fatal(&err);
            return Err(err);
        }

        // Whitespace-only extraction is as unusable as no extraction at all.
        let content = match self.extractor.extract() {
            Some(content) if !content.text.trim().is_empty() => content,
            _ => {
                let err = SessionError::ExtractionFailed("no readable content".to_string());
                self.raise_fatal(&err);
                return Err(err);
            }
        };
        debug!(url = %content.url, chars = content.text.chars().count(), "content extracted");

        {
            let mut s = self.state.write();
            s.reflection.extracted = Some(content.clone());
            s.ui.nudge_visible = false;
            s.ui.overlay_visible = true;
            s.reflection.is_loading = true;
        }
        (self.render)();

        self.detect_language(&content.text).await;

        let epoch = self.state.epoch();
        match self.run_summary_stage().await {
            Ok(()) => Ok(()),
            // Superseded runs stand down silently; the error belongs to a
            // session that no longer exists.
            Err(_) if self.state.epoch() != epoch => Ok(()),
            Err(e) if e.is_recoverable() => {
                self.raise_recoverable(&e);
                Ok(())
            }
            Err(e) => {
                self.raise_fatal(&e);
                Err(e)
            }
        }
    }

    /// Continue without AI after a capability failure: extraction and a
    /// visible overlay, nothing else.
    pub fn start_manual_session(&self) -> Result<()> {
        info!("starting manual session");
        self.supersede();

        let content = match self.extractor.extract() {
            Some(content) if !content.text.trim().is_empty() => content,
            _ => {
                let err = SessionError::ExtractionFailed("no readable content".to_string());
                self.raise_fatal(&err);
                return Err(err);
            }
        };

        {
            let mut s = self.state.write();
            s.reflection.extracted = Some(content);
            s.ui.overlay_visible = true;
            s.reflection.is_loading = false;
        }
        (self.render)();
        Ok(())
    }

    /// Re-run summarize → translate → prompts after a recoverable failure
    pub async fn retry_summary(&self) -> Result<()> {
        if self.state.read().reflection.extracted.is_none() {
            return Err(SessionError::operation("Summarize", "no active session"));
        }
        {
            let mut s = self.state.write();
            s.clear_error();
            s.ui.notification_visible = false;
        }
        (self.render)();

        match self.run_summary_stage().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                self.raise_recoverable(&e);
                Ok(())
            }
            Err(e) => {
                self.raise_fatal(&e);
                Err(e)
            }
        }
    }

    /// Record the user's answer for a prompt slot
    pub fn set_answer(&self, slot: usize, text: impl Into<String>) -> Result<()> {
        check_slot(slot)?;
        self.state.write().reflection.answers[slot] = text.into();
        (self.render)();
        Ok(())
    }

    /// Proofread the answer in `slot`, storing and returning the correction
    pub async fn proofread_answer(&self, slot: usize) -> Result<String> {
        let answer = self.claim_slot(slot, "Proofread")?;
        let outcome = self
            .slot_request(
                RequestKind::Proofread,
                json!({ "text": answer }),
                "Proofread",
                "corrected",
            )
            .await;
        self.release_slot(slot, &outcome);
        outcome
    }

    /// Rewrite the answer in `slot` with a tone preset
    pub async fn rewrite_answer(&self, slot: usize, tone: RewriteTone) -> Result<String> {
        let answer = self.claim_slot(slot, "Rewrite")?;
        let outcome = self
            .slot_request(
                RequestKind::Rewrite,
                json!({ "text": answer, "tone": tone.as_str() }),
                "Rewrite",
                "rewritten",
            )
            .await;
        self.release_slot(slot, &outcome);
        outcome
    }

    /// Translate the answer in `slot` to the session's target language
    pub async fn translate_answer(&self, slot: usize) -> Result<String> {
        let answer = self.claim_slot(slot, "Translate")?;
        let target = self.target_language();
        let outcome = self.translator.translate_text(&answer, &target).await;
        self.release_slot(slot, &outcome);
        outcome
    }

    /// Manually translate the summary to the session's target language
    pub async fn translate_summary_now(&self) -> Result<()> {
        let target = self.target_language();
        self.translator.translate_summary(&target).await
    }

    /// Override the target language for this session
    pub fn override_target_language(&self, code: impl Into<String>) {
        {
            let mut s = self.state.write();
            s.language.selected_target = Some(code.into());
            s.language.is_overridden = true;
        }
        (self.render)();
    }

    /// Hand the finished reflection to persistence and reset the session
    pub async fn save(&self) -> Result<()> {
        let record = {
            let s = self.state.read();
            ReflectionRecord {
                url: s
                    .reflection
                    .extracted
                    .as_ref()
                    .map(|e| e.url.clone())
                    .unwrap_or_default(),
                summary: s.reflection.summary_display.clone(),
                prompts: s.reflection.prompts.clone(),
                answers: s.reflection.answers.to_vec(),
                language: s.language.detection.as_ref().map(|d| d.code.clone()),
                saved_at: Utc::now(),
            }
        };

        if let Err(e) = self.sink.save(record).await {
            warn!(error = %e, "failed to persist reflection");
            let err = SessionError::operation("Save", e.to_string());
            self.raise_recoverable(&err);
            return Err(err);
        }

        info!("reflection saved, resetting session");
        self.supersede();
        (self.render)();
        Ok(())
    }

    /// Discard the session without saving
    pub fn cancel(&self) {
        info!("session cancelled");
        self.supersede();
        (self.render)();
    }

    /// Dismiss the current error surfaces
    pub fn dismiss_error(&self) {
        {
            let mut s = self.state.write();
            s.clear_error();
            s.ui.error_modal_visible = false;
            s.ui.notification_visible = false;
        }
        (self.render)();
    }

    /// Mute or unmute audio cues; survives session resets
    pub fn set_muted(&self, muted: bool) {
        self.state.write().audio.muted = muted;
        (self.render)();
    }

    // === Workflow stages ===

    /// Summarize, auto-translate when warranted, then generate prompts
    ///
    /// Each stage stands down when the session was superseded underneath it.
    async fn run_summary_stage(&self) -> Result<()> {
        let epoch = self.state.epoch();
        self.summarize().await?;
        if self.state.epoch() != epoch {
            return Ok(());
        }
        self.maybe_auto_translate().await;
        if self.state.epoch() != epoch {
            return Ok(());
        }
        self.generate_prompts().await
    }

    /// Cancel any live stream and fully reset the state (epoch advances)
    fn supersede(&self) {
        if let Some(handle) = self.active_stream.lock().take() {
            handle.cancel();
        }
        self.state.write().reset_all();
    }

    /// Derive session language preferences from settings (pure state write)
    fn apply_language_preferences(&self) {
        let mut s = self.state.write();
        s.language.preferred_baseline = self.settings.preferred_translation_language.clone();
        s.language.selected_target = Some(self.settings.target_language.clone());
    }

    /// Probe AI availability and the capability map, memoized for the engine
    /// lifetime. The map fetch is attempted regardless of the availability
    /// verdict.
    async fn ensure_capabilities(&self) {
        let (have_verdict, have_map) = {
            let s = self.state.read();
            (
                s.capabilities.available.is_some(),
                s.capabilities.capabilities.is_some(),
            )
        };

        if !have_verdict {
            let available = match self.send_request(RequestKind::CheckAi, json!({})).await {
                Ok(resp) if resp.success => resp
                    .data
                    .as_ref()
                    .and_then(|d| d.get("available"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                Ok(resp) => {
                    warn!(error = ?resp.error, "AI availability probe failed");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "AI availability probe failed");
                    false
                }
            };
            debug!(available, "AI availability cached");
            self.state.write().capabilities.available = Some(available);
        }

        if !have_map {
            let fetched = self
                .send_request(RequestKind::GetCapabilities, json!({}))
                .await
                .and_then(|r| r.into_data("getCapabilities"))
                .and_then(|data| {
                    serde_json::from_value::<HashMap<String, bool>>(data)
                        .map_err(|_| SessionError::InvalidResponse)
                });
            match fetched {
                Ok(map) => {
                    debug!(capabilities = map.len(), "capability map cached");
                    self.state.write().capabilities.capabilities = Some(map);
                }
                Err(e) => warn!(error = %e, "capability map fetch failed"),
            }
        }
    }

    /// Detect the language of a bounded prefix of the extracted text
    ///
    /// Detection failure is non-fatal: the session falls back to the ambient
    /// baseline language with zero confidence.
    async fn detect_language(&self, text: &str) {
        let sample: String = text.chars().take(DETECTION_SAMPLE_CHARS).collect();
        let detection = match self
            .send_request(RequestKind::DetectLanguage, json!({ "text": sample }))
            .await
            .and_then(|r| r.into_data("detectLanguage"))
        {
            Ok(data) => match data.get("code").and_then(Value::as_str) {
                Some(code) => LanguageDetection {
                    code: code.to_string(),
                    confidence: data
                        .get("confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0),
                    display_name: data
                        .get("displayName")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| display_language_name(code)),
                },
                None => self.baseline_detection(),
            },
            Err(e) => {
                warn!(error = %e, "language detection failed, using baseline");
                self.baseline_detection()
            }
        };

        debug!(code = %detection.code, confidence = detection.confidence, "language detected");
        {
            let mut s = self.state.write();
            s.language.original_detected_code = Some(detection.code.clone());
            s.language.detection = Some(detection);
        }
        (self.render)();
    }

    fn baseline_detection(&self) -> LanguageDetection {
        LanguageDetection {
            code: self.settings.ambient_language.clone(),
            confidence: 0.0,
            display_name: display_language_name(&self.settings.ambient_language),
        }
    }

    /// Generate the summary, streaming or one-shot depending on format
    async fn summarize(&self) -> Result<()> {
        let format = self.settings.default_summary_format;
        let text = {
            let s = self.state.read();
            s.reflection
                .extracted
                .as_ref()
                .map(|e| e.text.clone())
                .unwrap_or_default()
        };

        self.state.write().reflection.begin_summary(format);
        (self.render)();

        if format.is_streaming() {
            self.summarize_streaming(format, &text).await
        } else {
            self.summarize_oneshot(format, &text).await
        }
    }

    async fn summarize_streaming(&self, format: SummaryFormat, text: &str) -> Result<()> {
        let request = WorkerRequest::new(
            RequestKind::SummarizeStream,
            json!({ "text": text, "format": format.as_str() }),
        );
        let (handle, events) = self.channel.open_stream(request)?;

        // Only one summarization stream may be live: cancel and clear the
        // previous subscription before registering the new one.
        {
            let mut slot = self.active_stream.lock();
            if let Some(prev) = slot.take() {
                prev.cancel();
            }
            *slot = Some(handle.clone());
        }

        let result = self.pipeline.run(format, handle.clone(), events).await;

        {
            let mut slot = self.active_stream.lock();
            if slot.as_ref().map_or(false, |h| h.same_as(&handle)) {
                *slot = None;
            }
        }
        result
    }

    async fn summarize_oneshot(&self, format: SummaryFormat, text: &str) -> Result<()> {
        let epoch = self.state.epoch();
        let response = self
            .send_request(
                RequestKind::Summarize,
                json!({ "text": text, "format": format.as_str() }),
            )
            .await?;
        let data = response.into_data("Summarize")?;
        let summary = data
            .get("summary")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::operation("Summarize", "empty summary payload"))?;

        {
            let mut s = self.state.write();
            if s.epoch != epoch {
                debug!("one-shot summary superseded, discarding result");
                return Ok(());
            }
            s.reflection.summary_raw = summary.to_string();
            s.reflection.summary_display = parse_display_units(format, summary);
            s.reflection.is_loading = false;
            s.reflection.stream_done = true;
        }
        (self.render)();
        Ok(())
    }

    /// Auto-translate the summary when the decision engine approves.
    /// Translation is soft: failures are logged, never surfaced.
    async fn maybe_auto_translate(&self) {
        let Some(detection) = self.state.read().language.detection.clone() else {
            return;
        };
        if !should_auto_translate(&detection, &self.settings) {
            debug!(code = %detection.code, confidence = detection.confidence,
                   "auto-translate declined");
            return;
        }
        let target = self.target_language();
        info!(source = %detection.code, target = %target, "auto-translating summary");
        if let Err(e) = self.translator.translate_summary(&target).await {
            warn!(error = %e, "auto-translation failed, keeping original summary");
        }
    }

    /// Generate the two fixed reflection prompts from the finished summary
    async fn generate_prompts(&self) -> Result<()> {
        let epoch = self.state.epoch();
        let summary = self.state.summary_display();
        if summary.is_empty() {
            return Err(SessionError::operation("Prompts", "no summary available"));
        }

        let response = self
            .send_request(RequestKind::GeneratePrompts, json!({ "summary": summary }))
            .await?;
        let data = response.into_data("Prompts")?;
        let prompts: Vec<String> = data
            .get("prompts")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if prompts.len() < ANSWER_SLOTS {
            return Err(SessionError::operation(
                "Prompts",
                format!("expected {} prompts, got {}", ANSWER_SLOTS, prompts.len()),
            ));
        }

        {
            let mut s = self.state.write();
            if s.epoch != epoch {
                debug!("prompt generation superseded, discarding result");
                return Ok(());
            }
            s.reflection.prompts = prompts.into_iter().take(ANSWER_SLOTS).collect();
        }
        (self.render)();
        Ok(())
    }

    // === Helpers ===

    /// Send a one-shot request with the standard timeout. A timeout becomes
    /// a failure envelope, indistinguishable from an explicit worker error.
    async fn send_request(&self, kind: RequestKind, payload: Value) -> Result<WorkerResponse> {
        let request = WorkerRequest::new(kind, payload);
        debug!(kind = %kind, id = %request.id, "worker request");
        match tokio::time::timeout(REQUEST_TIMEOUT, self.channel.request(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(kind = %kind, "worker request timed out");
                Ok(WorkerResponse::fail("no response from worker"))
            }
        }
    }

    /// Claim `slot` for an exclusive operation, returning its current answer
    fn claim_slot(&self, slot: usize, operation: &str) -> Result<String> {
        check_slot(slot)?;
        let mut s = self.state.write();
        let answer = s.reflection.answers[slot].clone();
        if answer.trim().is_empty() {
            return Err(SessionError::operation(operation, "answer is empty"));
        }
        if !s.begin_rewrite(slot) {
            return Err(SessionError::operation(
                operation,
                "another operation is already running for this answer",
            ));
        }
        drop(s);
        (self.render)();
        Ok(answer)
    }

    /// Release `slot`, storing the new text on success
    fn release_slot(&self, slot: usize, outcome: &Result<String>) {
        {
            let mut s = self.state.write();
            s.finish_rewrite(slot);
            if let Ok(text) = outcome {
                s.reflection.answers[slot] = text.clone();
            }
        }
        (self.render)();
    }

    /// One-shot request for a per-slot operation, extracting a string field
    async fn slot_request(
        &self,
        kind: RequestKind,
        payload: Value,
        operation: &str,
        result_field: &str,
    ) -> Result<String> {
        let response = self.send_request(kind, payload).await?;
        let data = response.into_data(operation)?;
        data.get(result_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SessionError::operation(operation, "malformed response payload"))
    }

    /// The target language for translation operations
    fn target_language(&self) -> String {
        self.state
            .read()
            .language
            .selected_target
            .clone()
            .unwrap_or_else(|| self.settings.target_language.clone())
    }

    fn raise_fatal(&self, err: &SessionError) {
        warn!(error = %err, "fatal session error");
        {
            let mut s = self.state.write();
            s.set_error(err.user_message());
            s.ui.error_modal_visible = true;
            s.reflection.is_loading = false;
        }
        (self.render)();
    }

    fn raise_recoverable(&self, err: &SessionError) {
        warn!(error = %err, "recoverable session error");
        {
            let mut s = self.state.write();
            s.set_error(err.user_message());
            s.ui.notification_visible = true;
            s.reflection.is_loading = false;
        }
        (self.render)();
    }
}

fn check_slot(slot: usize) -> Result<()> {
    if slot >= ANSWER_SLOTS {
        return Err(SessionError::Config(format!(
            "answer slot {} out of range",
            slot
        )));
    }
    Ok(())
}
