//! Summary processing pipeline
//!
//! Contains the streaming summarization pipeline with its decoupled reveal
//! animation, plus the display-unit parser shared with the one-shot path.

mod summary;

pub use summary::{parse_display_units, SummaryPipeline, REVEAL_STEP_CHARS, REVEAL_TICK};
