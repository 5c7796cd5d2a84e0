//! # sb-observability
//!
//! Logging setup and secret redaction for secbridge.

pub mod logging;
pub mod redact;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use redact::{Redactor, REDACTED};
