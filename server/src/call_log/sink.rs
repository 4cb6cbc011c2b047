use std::fmt;
use std::sync::{Arc, Mutex};

use hyper::Method;
use tracing::{error, info};

use super::snapshot::{RequestSnapshot, ResponseSnapshot};

/// One line of the per-call log.
///
/// A call produces `Incoming`, then optionally `Failed`, then `Response`.
#[derive(Debug, Clone)]
pub enum LogEntry {
    Incoming {
        request: Arc<RequestSnapshot>,
    },
    Failed {
        method: Method,
        path: String,
        error: String,
    },
    Response {
        method: Method,
        path: String,
        response: ResponseSnapshot,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Incoming,
    Failed,
    Response,
}

impl LogEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Incoming { .. } => EntryKind::Incoming,
            Self::Failed { .. } => EntryKind::Failed,
            Self::Response { .. } => EntryKind::Response,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming { request } => write!(
                f,
                ">>> INCOMING REQUEST:\nMethod: {}\nURI: {}\nHeaders: {}\nParameters: {}\nBody: {}\nClient IP: {}",
                request.method(),
                request.path(),
                request.headers_text(),
                request.query_text(),
                request.body_text(),
                request.client_address(),
            ),
            Self::Failed {
                method,
                path,
                error,
            } => write!(
                f,
                "!!! REQUEST FAILED:\nMethod: {}\nURI: {}\nError: {}",
                method, path, error
            ),
            Self::Response {
                method,
                path,
                response,
            } => write!(
                f,
                "<<< RESPONSE:\nMethod: {}\nURI: {}\nStatus: {}\nTime: {} ms\nBody: {}",
                method,
                path,
                response.status_text(),
                response.elapsed_millis,
                response.body_text(),
            ),
        }
    }
}

/// Destination for call log entries. Shared by every in-flight call.
pub trait CallLogSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

/// Default sink: one `tracing` event per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl CallLogSink for TracingSink {
    fn record(&self, entry: LogEntry) {
        match entry.kind() {
            EntryKind::Failed => error!(target: "catalog::calls", "{}", entry),
            _ => info!(target: "catalog::calls", "{}", entry),
        }
    }
}

/// Keeps entries in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EntryKind> {
        self.lock().iter().map(LogEntry::kind).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        // A panic while pushing cannot leave the Vec half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CallLogSink for MemorySink {
    fn record(&self, entry: LogEntry) {
        self.lock().push(entry);
    }
}
