/// Tower middleware module
///
/// Layers applied to every call, outermost first:
/// - `ErrorResponseLayer`: renders escaped errors as JSON
/// - `TimeoutLayer`: bounds each call, answers 408
/// - `RequestLogLayer`: logs request, failure and response
pub mod tower_error_response;
pub mod tower_request_log;
pub mod tower_timeout_handler;

pub use tower_error_response::{render_error, ErrorResponseLayer, ErrorResponseService};
pub use tower_request_log::{RequestLogLayer, RequestLogService};
pub use tower_timeout_handler::{TimeoutLayer, TimeoutService};
