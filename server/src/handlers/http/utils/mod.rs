pub mod body;
pub mod headers;
pub mod json_response;

// Re-export commonly used utilities
pub use body::*;
pub use headers::*;
pub use json_response::*;
