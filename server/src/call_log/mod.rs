/// Per-call request/response logging
///
/// - `snapshot`: immutable captures of a call's inputs and outcome
/// - `serializer`: value to text rendering used for logged bodies
/// - `sink`: where log entries go
pub mod serializer;
pub mod sink;
pub mod snapshot;

pub use serializer::{body_to_log_text, redact_secret_fields, to_log_text};
pub use sink::{CallLogSink, EntryKind, LogEntry, MemorySink, TracingSink};
pub use snapshot::{ClientAddr, RequestSnapshot, ResponseSnapshot};
