//! Ruminate - Session orchestration engine for in-page AI reflection
//!
//! This crate coordinates one reflection session at a time: a capability
//! handshake with a privileged AI worker, content extraction, language
//! detection with confidence-gated translation, streaming summarization with
//! a decoupled reveal animation, prompt generation, and per-answer rewrite
//! operations. All state lives in a single shared store; the host supplies
//! the worker channel, extraction, persistence, and a render callback.

pub mod channel;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod settings;
pub mod state;
pub mod translate;

// Re-export error types
pub use error::{Result, SessionError};

// Re-export channel types
pub use channel::{
    RequestKind, StreamEvent, StreamHandle, StreamReceiver, StreamSender, WorkerChannel,
    WorkerRequest, WorkerResponse,
};

// Re-export state types
pub use state::{
    ExtractedContent, LanguageDetection, RenderFn, SessionSnapshot, SessionState,
    SharedSessionState, SummaryFormat, ANSWER_SLOTS,
};

// Re-export the session workflow surface
pub use session::{
    ContentExtractor, Orchestrator, ReflectionRecord, ReflectionSink, RewriteTone, REQUEST_TIMEOUT,
};

pub use pipeline::{SummaryPipeline, REVEAL_STEP_CHARS, REVEAL_TICK};
pub use settings::Settings;
pub use translate::{
    should_auto_translate, should_offer_translation, CacheStore, TranslationCache,
    TranslationEngine, AUTO_TRANSLATE_MIN_CONFIDENCE, OFFER_MIN_CONFIDENCE,
    OFFER_MIN_CONFIDENCE_EXPERIMENTAL, TRANSLATION_TTL_HOURS,
};
