//! Session workflow coordination
//!
//! Defines the collaborator traits the orchestrator is constructed with and
//! re-exports the orchestrator itself.

mod orchestrator;

pub use orchestrator::{Orchestrator, RewriteTone, REQUEST_TIMEOUT};

use crate::state::ExtractedContent;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Page content extraction collaborator
///
/// Synchronous: the host has already rendered the page; `None` signals that
/// nothing usable was found.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self) -> Option<ExtractedContent>;
}

/// A completed reflection handed to persistence
#[derive(Clone, Debug)]
pub struct ReflectionRecord {
    /// Page the reflection was made on
    pub url: String,
    /// Final summary display units
    pub summary: Vec<String>,
    /// The two reflection prompts
    pub prompts: Vec<String>,
    /// User-authored answers, one per prompt slot
    pub answers: Vec<String>,
    /// Language the summary was shown in, if detected
    pub language: Option<String>,
    /// When the reflection was saved
    pub saved_at: DateTime<Utc>,
}

/// Persistence collaborator for finished reflections
#[async_trait]
pub trait ReflectionSink: Send + Sync {
    async fn save(&self, record: ReflectionRecord) -> Result<()>;
}
