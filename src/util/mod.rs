//! Utility functions for common operations.
//!
//! - **URL validation**: ping endpoint validation and loopback detection
//! - **Text processing**: HTML escaping and URL joining
//! - **Filesystem**: atomic temp-then-rename writes

mod fs;
mod text;
mod url_validator;

pub use fs::write_atomic;
pub use text::{html_escape, is_truthy, join_url};
pub use url_validator::{is_loopback_url, validate_url, UrlValidationError};
