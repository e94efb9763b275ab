//! User settings consumed at session start
//!
//! The host hands the engine a read-only settings snapshot when a session
//! begins. Every field has an explicit default so the rest of the engine
//! never re-derives fallbacks at the use site.

use crate::state::SummaryFormat;
use crate::{Result, SessionError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Read-only settings snapshot for one session
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether translation (auto and manual) is enabled at all
    pub enable_translation: bool,
    /// Language the user prefers content translated into, if configured.
    /// Content already in this language is never auto-translated.
    pub preferred_translation_language: Option<String>,
    /// Target language for translation operations (BCP 47 code)
    pub target_language: String,
    /// Experimental mode lowers the manual-translation offer threshold
    pub experimental_mode: bool,
    /// Summary format used when a session starts
    pub default_summary_format: SummaryFormat,
    /// The ambient browser/UI language; content in this language is never
    /// auto-translated and it is the detection fallback baseline.
    pub ambient_language: String,
    /// Whether audio cues start muted
    pub muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_translation: true,
            preferred_translation_language: None,
            target_language: "en".to_string(),
            experimental_mode: false,
            default_summary_format: SummaryFormat::Bullets,
            ambient_language: "en".to_string(),
            muted: false,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// Missing fields fall back to their defaults, so a partial file is fine.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            SessionError::Config(format!("failed to parse '{}': {}", path.display(), e))
        })
    }

    /// Set the target language
    pub fn with_target_language(mut self, code: impl Into<String>) -> Self {
        self.target_language = code.into();
        self
    }

    /// Set the preferred translation language
    pub fn with_preferred_translation_language(mut self, code: impl Into<String>) -> Self {
        self.preferred_translation_language = Some(code.into());
        self
    }

    /// Enable or disable translation
    pub fn with_translation_enabled(mut self, enabled: bool) -> Self {
        self.enable_translation = enabled;
        self
    }

    /// Enable or disable experimental mode
    pub fn with_experimental_mode(mut self, enabled: bool) -> Self {
        self.experimental_mode = enabled;
        self
    }

    /// Set the default summary format
    pub fn with_summary_format(mut self, format: SummaryFormat) -> Self {
        self.default_summary_format = format;
        self
    }

    /// Set the ambient browser language
    pub fn with_ambient_language(mut self, code: impl Into<String>) -> Self {
        self.ambient_language = code.into();
        self
    }
}
