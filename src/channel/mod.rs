//! Request/response and streaming channel to the privileged AI worker
//!
//! Every AI operation crosses this boundary. One-shot operations use
//! `WorkerChannel::request` with a validated response envelope; incremental
//! operations (streaming summarize) use `WorkerChannel::open_stream`, which
//! yields zero or more `StreamEvent::Chunk`s followed by exactly one terminal
//! `Complete` or `Error`.
//!
//! Malformed responses are converted to failure envelopes at this boundary —
//! they never propagate as a crash.

use crate::{Result, SessionError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Request types understood by the worker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Probe overall AI availability
    CheckAi,
    /// Fetch the named-capability map
    GetCapabilities,
    /// Detect the language of a text sample
    DetectLanguage,
    /// One-shot summarization
    Summarize,
    /// Incremental summarization (chunked)
    SummarizeStream,
    /// Translate one unit of text
    Translate,
    /// Rewrite an answer with a tone preset
    Rewrite,
    /// Proofread an answer
    Proofread,
    /// Generate reflection prompts from a summary
    GeneratePrompts,
}

impl RequestKind {
    /// Wire name of this request type
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::CheckAi => "checkAI",
            RequestKind::GetCapabilities => "getCapabilities",
            RequestKind::DetectLanguage => "detectLanguage",
            RequestKind::Summarize => "summarize",
            RequestKind::SummarizeStream => "summarize-stream",
            RequestKind::Translate => "translate",
            RequestKind::Rewrite => "rewrite",
            RequestKind::Proofread => "proofread",
            RequestKind::GeneratePrompts => "generatePrompts",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to the worker
#[derive(Clone, Debug)]
pub struct WorkerRequest {
    /// Unique request id for correlation and logging
    pub id: String,
    /// Request type
    pub kind: RequestKind,
    /// Type-specific payload
    pub payload: Value,
}

impl WorkerRequest {
    /// Create a new request with a fresh id
    pub fn new(kind: RequestKind, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            payload,
        }
    }
}

/// Validated worker response envelope
#[derive(Clone, Debug)]
pub struct WorkerResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Result payload when `success` is true
    pub data: Option<Value>,
    /// Error message when `success` is false
    pub error: Option<String>,
    /// Time the worker spent on the operation
    pub duration_ms: u64,
}

impl WorkerResponse {
    /// Build a success envelope
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            duration_ms: 0,
        }
    }

    /// Build a failure envelope
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// Validate a raw worker reply against the envelope contract
    ///
    /// The envelope must be an object with a boolean `success` and either a
    /// `data` payload or an `error` string. Anything else becomes a local
    /// failure envelope, never a panic.
    pub fn from_value(raw: Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::fail(SessionError::InvalidResponse.to_string());
        };
        let Some(success) = obj.get("success").and_then(Value::as_bool) else {
            return Self::fail(SessionError::InvalidResponse.to_string());
        };
        let duration_ms = obj
            .get("duration")
            .and_then(Value::as_u64)
            .unwrap_or_default();

        if success {
            let Some(data) = obj.get("data") else {
                return Self::fail(SessionError::InvalidResponse.to_string());
            };
            Self {
                success: true,
                data: Some(data.clone()),
                error: None,
                duration_ms,
            }
        } else {
            let Some(error) = obj.get("error").and_then(Value::as_str) else {
                return Self::fail(SessionError::InvalidResponse.to_string());
            };
            Self {
                success: false,
                data: None,
                error: Some(error.to_string()),
                duration_ms,
            }
        }
    }

    /// Unwrap the data payload, converting a failure envelope into an
    /// `OperationFailed` error for the named operation.
    pub fn into_data(self, operation: &str) -> Result<Value> {
        if self.success {
            self.data
                .ok_or_else(|| SessionError::operation(operation, "empty response payload"))
        } else {
            Err(SessionError::operation(
                operation,
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// One event on a worker stream
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// Incremental text fragment
    Chunk(String),
    /// Stream finished; may carry an out-of-band final payload that replaces
    /// the accumulated buffer
    Complete(Option<String>),
    /// Stream failed with a message
    Error(String),
}

/// Cancellation handle for an open stream
///
/// `cancel()` is idempotent: calls after the first (or after completion or
/// error) have no effect. Cancellation is cooperative — it stops future chunk
/// delivery but does not undo state already applied.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    cancelled: Arc<AtomicBool>,
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHandle {
    /// Create a live (not yet cancelled) handle
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation of the stream
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("stream cancelled");
        }
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether two handles control the same stream
    pub fn same_as(&self, other: &StreamHandle) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Receiver half of a worker stream
pub type StreamReceiver = mpsc::UnboundedReceiver<StreamEvent>;

/// Sender half of a worker stream (held by channel implementations)
pub type StreamSender = mpsc::UnboundedSender<StreamEvent>;

/// Asynchronous boundary to the privileged worker
///
/// Injected into the orchestrator so tests can substitute a scripted
/// implementation. Implementations must deliver zero or more `Chunk` events
/// followed by exactly one `Complete` or `Error`, and must stop delivering
/// once the returned handle is cancelled.
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    /// Send a one-shot request and await its validated response
    async fn request(&self, request: WorkerRequest) -> Result<WorkerResponse>;

    /// Open a streaming operation
    fn open_stream(&self, request: WorkerRequest) -> Result<(StreamHandle, StreamReceiver)>;
}
