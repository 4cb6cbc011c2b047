pub mod headers;
pub mod json_response;

pub use headers::*;
pub use json_response::*;
