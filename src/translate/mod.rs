//! Auto-translate decision engine and translation runs
//!
//! Decides whether a detected page language warrants translating the summary
//! without user action, and performs the translation unit by unit through
//! the worker channel with a 24-hour cache in front.
//!
//! Translation is a soft operation throughout: a unit that fails to
//! translate falls back to its original text, and a run is cached only when
//! every unit succeeded. Cache hits and live runs go through the same
//! state-update path, so downstream rendering cannot tell them apart except
//! by latency.

mod cache;

pub use cache::{CacheStore, CachedTranslation, TranslationCache, TRANSLATION_TTL_HOURS};

use crate::channel::{RequestKind, WorkerChannel, WorkerRequest};
use crate::settings::Settings;
use crate::state::{LanguageDetection, RenderFn, SharedSessionState};
use crate::{Result, SessionError};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Confidence required before translating without user action
pub const AUTO_TRANSLATE_MIN_CONFIDENCE: f64 = 0.90;

/// Confidence required to offer manual translation in experimental mode
pub const OFFER_MIN_CONFIDENCE_EXPERIMENTAL: f64 = 0.60;

/// Confidence required to offer manual translation otherwise
pub const OFFER_MIN_CONFIDENCE: f64 = 0.80;

/// Decide whether the summary should be translated automatically
///
/// Auto-translation is gated by a stricter confidence bar than merely
/// offering it: a mistaken silent translation is worse than a missing offer.
pub fn should_auto_translate(detection: &LanguageDetection, settings: &Settings) -> bool {
    if !translation_applies(detection, settings) {
        return false;
    }
    detection.confidence >= AUTO_TRANSLATE_MIN_CONFIDENCE
}

/// Decide whether manual translation should be offered to the user
pub fn should_offer_translation(detection: &LanguageDetection, settings: &Settings) -> bool {
    if !translation_applies(detection, settings) {
        return false;
    }
    let bar = if settings.experimental_mode {
        OFFER_MIN_CONFIDENCE_EXPERIMENTAL
    } else {
        OFFER_MIN_CONFIDENCE
    };
    detection.confidence >= bar
}

/// Common exclusions: translation disabled, or content already in a language
/// the user reads
fn translation_applies(detection: &LanguageDetection, settings: &Settings) -> bool {
    if !settings.enable_translation {
        return false;
    }
    if detection.code == settings.ambient_language {
        return false;
    }
    if settings.preferred_translation_language.as_deref() == Some(detection.code.as_str()) {
        return false;
    }
    true
}

/// Human-readable name for a language code, for the detection display
pub fn display_language_name(code: &str) -> String {
    match code {
        "en" => "English",
        "fi" => "Finnish",
        "sv" => "Swedish",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "pt" => "Portuguese",
        "it" => "Italian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        other => return other.to_uppercase(),
    }
    .to_string()
}

/// Performs translation runs against the worker, cache first
pub struct TranslationEngine {
    channel: Arc<dyn WorkerChannel>,
    cache: TranslationCache,
    state: SharedSessionState,
    render: RenderFn,
}

impl TranslationEngine {
    /// Create an engine over the shared state and worker channel
    pub fn new(
        channel: Arc<dyn WorkerChannel>,
        cache: TranslationCache,
        state: SharedSessionState,
        render: RenderFn,
    ) -> Self {
        Self {
            channel,
            cache,
            state,
            render,
        }
    }

    /// Translate the current summary display units into `target`
    ///
    /// Serves from cache when a fresh entry exists; otherwise translates unit
    /// by unit, falling back to the original text for units that fail. Either
    /// way the result lands through the same state-update path.
    pub async fn translate_summary(&self, target: &str) -> Result<()> {
        let (units, url, source, epoch) = {
            let s = self.state.read();
            (
                s.reflection.summary_display.clone(),
                s.reflection
                    .extracted
                    .as_ref()
                    .map(|e| e.url.clone())
                    .unwrap_or_default(),
                s.language
                    .detection
                    .as_ref()
                    .map(|d| d.code.clone())
                    .unwrap_or_else(|| "und".to_string()),
                s.epoch,
            )
        };
        if units.is_empty() {
            debug!("nothing to translate yet");
            return Ok(());
        }

        {
            let mut s = self.state.write();
            s.language.is_translating = true;
        }
        (self.render)();

        let cached = match self.cache.lookup(&url, &source, target).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "cache lookup failed, translating live");
                None
            }
        };
        if let Some(translated) = cached {
            self.apply(epoch, translated, &source, target);
            return Ok(());
        }

        let mut translated = Vec::with_capacity(units.len());
        let mut all_succeeded = true;
        for unit in &units {
            match self.translate_text(unit, target).await {
                Ok(text) => translated.push(text),
                Err(e) => {
                    warn!(error = %e, "unit translation failed, keeping original text");
                    translated.push(unit.clone());
                    all_succeeded = false;
                }
            }
        }

        if all_succeeded && !url.is_empty() {
            if let Err(e) = self
                .cache
                .store(&url, &source, target, translated.clone())
                .await
            {
                warn!(error = %e, "failed to cache translation");
            }
        }

        self.apply(epoch, translated, &source, target);
        Ok(())
    }

    /// Translate a single unit of text into `target`
    pub async fn translate_text(&self, text: &str, target: &str) -> Result<String> {
        let request = WorkerRequest::new(
            RequestKind::Translate,
            json!({ "text": text, "target": target }),
        );
        let response = self.channel.request(request).await?;
        let data = response.into_data("Translate")?;
        data.get("translated")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SessionError::operation("Translate", "malformed translation payload"))
    }

    /// Shared landing path for cache hits and live runs: replace the summary,
    /// mark the stream complete, and update the language display.
    fn apply(&self, epoch: u64, units: Vec<String>, source: &str, target: &str) {
        {
            let mut s = self.state.write();
            if s.epoch != epoch {
                debug!("translation run superseded, discarding result");
                return;
            }
            s.reflection.summary_raw = units.join("\n");
            s.reflection.summary_display = units;
            s.reflection.stream_done = true;
            if s.language.original_detected_code.is_none() {
                s.language.original_detected_code = Some(source.to_string());
            }
            s.language.detection = Some(LanguageDetection {
                code: target.to_string(),
                confidence: 1.0,
                display_name: display_language_name(target),
            });
            s.language.selected_target = Some(target.to_string());
            s.language.is_translating = false;
        }
        (self.render)();
    }
}
