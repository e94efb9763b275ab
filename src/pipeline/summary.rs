//! Streaming summarization pipeline with progressive reveal
//!
//! The pipeline accumulates streamed text into `summary_raw` and paces the
//! user-visible projection (`summary_display`) independently of chunk arrival:
//! a reveal cursor advances a few characters per tick, the prefix up to the
//! cursor is re-parsed into display units, and the render callback fires.
//! Both concerns run in a single cooperative `select!` loop, so at most one
//! reveal tick is ever armed per run.
//!
//! State machine per run:
//! `Idle -> Streaming -> (Animating)* -> Complete` or `Idle -> Streaming -> Errored`.

use crate::channel::{StreamEvent, StreamHandle, StreamReceiver};
use crate::state::{RenderFn, SharedSessionState, SummaryFormat};
use crate::{Result, SessionError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Characters the reveal cursor advances per tick
pub const REVEAL_STEP_CHARS: usize = 3;

/// Delay between reveal ticks
pub const REVEAL_TICK: Duration = Duration::from_millis(10);

/// Whether a run is still receiving events or only draining the reveal
/// animation after the terminal event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunPhase {
    Streaming,
    Draining,
}

/// Streaming summarization pipeline
///
/// One instance serves the whole engine; each `run` call drives a single
/// summarization run to completion.
pub struct SummaryPipeline {
    state: SharedSessionState,
    render: RenderFn,
}

impl SummaryPipeline {
    /// Create a pipeline over the shared session state
    pub fn new(state: SharedSessionState, render: RenderFn) -> Self {
        Self { state, render }
    }

    /// Drive one streaming summarization run to completion
    ///
    /// Resolves `Ok` when the stream completes, including the soft-success
    /// case where the stream errored after at least one chunk arrived —
    /// partial output is preferred over total failure. Fails with
    /// `SessionError::Stream` only when the stream errored before any data.
    ///
    /// A run that discovers the session epoch has moved on abandons itself
    /// without touching state.
    pub async fn run(
        &self,
        format: SummaryFormat,
        handle: StreamHandle,
        mut events: StreamReceiver,
    ) -> Result<()> {
        if !format.is_streaming() {
            return Err(SessionError::Config(format!(
                "{} summaries use the one-shot request path",
                format
            )));
        }

        let epoch = self.state.epoch();
        let mut phase = RunPhase::Streaming;
        let mut chunks_seen = 0usize;
        let mut cursor = 0usize;

        debug!(format = %format, "summary stream starting");

        loop {
            // Cancellation and epoch changes both mean this run no longer
            // owns the state: stand down without writing.
            if self.state.epoch() != epoch || handle.is_cancelled() {
                debug!("summary run superseded, standing down");
                handle.cancel();
                return Ok(());
            }

            let total_chars = {
                let s = self.state.read();
                s.reflection.summary_raw.chars().count()
            };
            let animating = cursor < total_chars;
            let streaming = phase == RunPhase::Streaming;

            if !streaming && !animating {
                // Cursor caught up on a finished stream: one final
                // full-buffer parse, then done.
                {
                    let mut s = self.state.write();
                    if s.epoch == epoch && !handle.is_cancelled() {
                        s.reflection.summary_display =
                            parse_display_units(format, &s.reflection.summary_raw);
                        s.reflection.stream_done = true;
                        s.reflection.is_loading = false;
                    }
                }
                (self.render)();
                debug!(chunks = chunks_seen, "summary stream complete");
                return Ok(());
            }

            tokio::select! {
                event = events.recv(), if streaming => {
                    match event {
                        Some(StreamEvent::Chunk(chunk)) => {
                            chunks_seen += 1;
                            let mut s = self.state.write();
                            if s.epoch == epoch && !handle.is_cancelled() {
                                s.reflection.append_chunk(&chunk);
                            }
                        }
                        Some(StreamEvent::Complete(final_text)) => {
                            phase = RunPhase::Draining;
                            if let Some(text) = final_text.filter(|t| !t.is_empty()) {
                                let mut s = self.state.write();
                                if s.epoch == epoch && !handle.is_cancelled() {
                                    s.reflection.summary_raw = text;
                                    s.reflection.is_loading = false;
                                }
                            }
                        }
                        Some(StreamEvent::Error(message)) => {
                            if chunks_seen == 0 {
                                return Err(SessionError::Stream(message));
                            }
                            // Keep what we have and let the reveal drain it.
                            warn!(%message, chunks = chunks_seen,
                                  "summary stream errored mid-run, keeping partial output");
                            phase = RunPhase::Draining;
                        }
                        None => {
                            // Sender dropped without a terminal event; treat
                            // as completion with the accumulated buffer.
                            phase = RunPhase::Draining;
                        }
                    }
                }
                _ = sleep(REVEAL_TICK), if animating => {
                    cursor = (cursor + REVEAL_STEP_CHARS).min(total_chars);
                    {
                        let mut s = self.state.write();
                        if s.epoch == epoch && !handle.is_cancelled() {
                            let prefix: String =
                                s.reflection.summary_raw.chars().take(cursor).collect();
                            s.reflection.summary_display = parse_display_units(format, &prefix);
                        }
                    }
                    (self.render)();
                }
            }
        }
    }
}

/// Parse summary text into display units for the given format
///
/// Paragraph yields the whole trimmed buffer as a single unit; bulleted
/// formats split on line breaks, drop empty lines, and strip one leading
/// bullet marker per line.
pub fn parse_display_units(format: SummaryFormat, text: &str) -> Vec<String> {
    match format {
        SummaryFormat::Paragraph => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        }
        SummaryFormat::Bullets | SummaryFormat::HeadlineBullets => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(strip_bullet_marker)
            .collect(),
    }
}

/// Strip a single leading bullet marker (`*`, `-`, or `•`) from a line
fn strip_bullet_marker(line: &str) -> String {
    let stripped = line
        .strip_prefix("* ")
        .or_else(|| line.strip_prefix("- "))
        .or_else(|| line.strip_prefix("• "))
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('-'))
        .or_else(|| line.strip_prefix('•'))
        .unwrap_or(line);
    stripped.trim_start().to_string()
}
