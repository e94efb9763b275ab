//! Unified session state for the reflection workflow
//!
//! This module provides the single authoritative snapshot of one active
//! session, shared between:
//! - **Orchestrator**: writes state changes as workflow stages complete
//! - **Pipeline**: appends streamed text and advances the reveal projection
//! - **Host/UI**: reads state for rendering via the render callback
//!
//! All mutation goes through these accessors. Setters are synchronous and
//! side-effect-free; callers trigger renders. Starting a new session resets
//! reflection and language state but preserves the AI-capability cache and
//! the audio preference.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked after every state mutation that should be reflected
/// visually. The engine has no knowledge of what it draws.
pub type RenderFn = Arc<dyn Fn() + Send + Sync>;

/// Number of user-answer slots in a session
pub const ANSWER_SLOTS: usize = 2;

/// Summary output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryFormat {
    /// Flat bullet list, one display unit per line
    #[default]
    Bullets,
    /// Single paragraph, one display unit
    Paragraph,
    /// Headline plus bullets; generated in one shot, never streamed
    HeadlineBullets,
}

impl SummaryFormat {
    /// Whether this format goes through the streaming pipeline
    pub fn is_streaming(&self) -> bool {
        !matches!(self, SummaryFormat::HeadlineBullets)
    }

    /// Wire name used in worker payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryFormat::Bullets => "bullets",
            SummaryFormat::Paragraph => "paragraph",
            SummaryFormat::HeadlineBullets => "headline-bullets",
        }
    }
}

impl std::fmt::Display for SummaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content pulled from the current page by the extraction collaborator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Readable text of the page
    pub text: String,
    /// Page URL, also the translation cache key component
    pub url: String,
    /// Page title, if one was found
    pub title: Option<String>,
}

/// Result of a language detection probe
#[derive(Clone, Debug, PartialEq)]
pub struct LanguageDetection {
    /// BCP 47 language code
    pub code: String,
    /// Detection confidence in `0.0..=1.0`
    pub confidence: f64,
    /// Human-readable language name for display
    pub display_name: String,
}

/// Visibility flags for the overlay surfaces
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UiFlags {
    /// The nudge prompting the user to start a session
    pub nudge_visible: bool,
    /// The main reflection overlay
    pub overlay_visible: bool,
    /// Fatal-error modal
    pub error_modal_visible: bool,
    /// Dismissable recoverable-error notification
    pub notification_visible: bool,
}

/// Reflection data for the active session
#[derive(Clone, Debug, Default)]
pub struct ReflectionState {
    /// Extracted page content this session reflects on
    pub extracted: Option<ExtractedContent>,
    /// Full accumulated summary text as received from the worker
    pub summary_raw: String,
    /// Parsed, animation-gated projection of a prefix of `summary_raw`
    pub summary_display: Vec<String>,
    /// Generated reflection prompts, two fixed slots
    pub prompts: Vec<String>,
    /// Format the summary was requested in
    pub format: SummaryFormat,
    /// True between session start and the first streamed chunk (or one-shot
    /// summary arrival)
    pub is_loading: bool,
    /// True once the summary stream has fully completed
    pub stream_done: bool,
    /// Per-slot in-flight flag for proofread/rewrite/translate operations
    pub is_rewriting: [bool; ANSWER_SLOTS],
    /// User-authored answers, one per prompt slot
    pub answers: [String; ANSWER_SLOTS],
}

impl ReflectionState {
    /// Clear everything for a new session or after save/cancel
    pub fn reset(&mut self) {
        *self = ReflectionState::default();
    }

    /// Prepare for a new summarization run, keeping extraction and answers
    pub fn begin_summary(&mut self, format: SummaryFormat) {
        self.summary_raw.clear();
        self.summary_display.clear();
        self.format = format;
        self.is_loading = true;
        self.stream_done = false;
    }

    /// Append one streamed chunk to the raw buffer
    pub fn append_chunk(&mut self, chunk: &str) {
        self.summary_raw.push_str(chunk);
        self.is_loading = false;
    }
}

/// Language detection and translation data for the active session
#[derive(Clone, Debug, Default)]
pub struct LanguageState {
    /// Most recent detection result (replaced when a translation lands)
    pub detection: Option<LanguageDetection>,
    /// True while a translation run is in flight
    pub is_translating: bool,
    /// Target language selected for this session
    pub selected_target: Option<String>,
    /// Preferred translation language carried over from settings
    pub preferred_baseline: Option<String>,
    /// True once the user has manually overridden the target language
    pub is_overridden: bool,
    /// Language code detected before any translation replaced the display
    pub original_detected_code: Option<String>,
}

impl LanguageState {
    /// Clear everything for a new session
    pub fn reset(&mut self) {
        *self = LanguageState::default();
    }
}

/// Memoized AI availability and capability map
///
/// Probed at most once per engine lifetime; survives session resets so a new
/// session does not redo the capability handshake.
#[derive(Clone, Debug, Default)]
pub struct CapabilityCache {
    /// Named AI features and their availability, once fetched
    pub capabilities: Option<HashMap<String, bool>>,
    /// Overall availability verdict, once probed
    pub available: Option<bool>,
}

/// Audio cue preferences
#[derive(Clone, Copy, Debug, Default)]
pub struct AudioFlags {
    pub muted: bool,
}

/// Unified session state
///
/// This is the single source of truth for the active session. It is shared
/// through `SharedSessionState`.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Overlay visibility flags
    pub ui: UiFlags,
    /// Reflection data
    pub reflection: ReflectionState,
    /// Language detection and translation data
    pub language: LanguageState,
    /// Memoized AI capability probes
    pub capabilities: CapabilityCache,
    /// Audio cue preferences
    pub audio: AudioFlags,
    /// Current user-visible error, if any
    pub error: Option<String>,
    /// Run-generation counter; asynchronous writers compare this against the
    /// value they captured at start and abandon themselves when superseded
    pub epoch: u64,
}

impl SessionState {
    /// Create a new default state
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset reflection data only
    pub fn reset_reflection(&mut self) {
        self.reflection.reset();
    }

    /// Reset language data only
    pub fn reset_language(&mut self) {
        self.language.reset();
    }

    /// Full end-of-session reset
    ///
    /// Discards reflection, language, UI, and error state, bumps the epoch so
    /// in-flight writers from the old session stand down, and preserves the
    /// capability cache and audio preference.
    pub fn reset_all(&mut self) {
        self.reflection.reset();
        self.language.reset();
        self.ui = UiFlags::default();
        self.error = None;
        self.epoch += 1;
    }

    /// Set a user-visible error
    pub fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    /// Clear the current error
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Try to claim answer slot `slot` for an in-flight operation
    ///
    /// Returns false when the slot is already busy; the caller must reject
    /// (not queue) the second operation.
    pub fn begin_rewrite(&mut self, slot: usize) -> bool {
        if self.reflection.is_rewriting[slot] {
            return false;
        }
        self.reflection.is_rewriting[slot] = true;
        true
    }

    /// Release answer slot `slot`
    pub fn finish_rewrite(&mut self, slot: usize) {
        self.reflection.is_rewriting[slot] = false;
    }

    /// Create an immutable snapshot of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            ui: self.ui,
            reflection: self.reflection.clone(),
            language: self.language.clone(),
            capabilities: self.capabilities.clone(),
            audio: self.audio,
            error: self.error.clone(),
            epoch: self.epoch,
        }
    }
}

/// Immutable snapshot of session state
///
/// Used for reads that must not hold the lock across await points.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub ui: UiFlags,
    pub reflection: ReflectionState,
    pub language: LanguageState,
    pub capabilities: CapabilityCache,
    pub audio: AudioFlags,
    pub error: Option<String>,
    pub epoch: u64,
}

/// Thread-safe shared session state
///
/// Wraps `SessionState` in `Arc<RwLock<>>`. There is no preemption inside a
/// lock hold: every mutation happens synchronously within one callback turn.
#[derive(Clone)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionState>>,
}

impl Default for SharedSessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSessionState {
    /// Create a new shared state with all-default values
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState::new())),
        }
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionState> {
        self.inner.read()
    }

    /// Get a write lock on the state
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SessionState> {
        self.inner.write()
    }

    /// Get a snapshot of the current state (no lock held after return)
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().snapshot()
    }

    // === Convenience read methods ===

    /// Current run-generation counter
    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Whether the main overlay is visible
    pub fn is_overlay_visible(&self) -> bool {
        self.inner.read().ui.overlay_visible
    }

    /// Whether the summary is still loading (no data shown yet)
    pub fn is_loading(&self) -> bool {
        self.inner.read().reflection.is_loading
    }

    /// Whether the summary stream has completed
    pub fn is_stream_done(&self) -> bool {
        self.inner.read().reflection.stream_done
    }

    /// Whether a translation run is in flight
    pub fn is_translating(&self) -> bool {
        self.inner.read().language.is_translating
    }

    /// Whether answer slot `slot` has an operation in flight
    pub fn is_rewriting(&self, slot: usize) -> bool {
        self.inner.read().reflection.is_rewriting[slot]
    }

    /// Current parsed display units
    pub fn summary_display(&self) -> Vec<String> {
        self.inner.read().reflection.summary_display.clone()
    }

    /// Full accumulated summary text
    pub fn summary_raw(&self) -> String {
        self.inner.read().reflection.summary_raw.clone()
    }

    /// Generated reflection prompts
    pub fn prompts(&self) -> Vec<String> {
        self.inner.read().reflection.prompts.clone()
    }

    /// Current user-visible error
    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    /// Detected language code, if detection ran
    pub fn detected_language(&self) -> Option<String> {
        self.inner
            .read()
            .language
            .detection
            .as_ref()
            .map(|d| d.code.clone())
    }

    /// Whether audio cues are muted
    pub fn is_muted(&self) -> bool {
        self.inner.read().audio.muted
    }
}
