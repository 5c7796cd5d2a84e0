//! Logging setup for secbridge processes.
//!
//! Log lines go to stderr so that commands printing JSON on stdout stay
//! machine-readable.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Crates covered by the default filter.
const CRATES: &[&str] = &["sb_connectors", "sb_tools", "sb_api", "sb_cli", "secbridge"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level applied to the secbridge crates when `RUST_LOG` is unset.
    pub level: Level,
    /// One JSON object per line instead of human-readable text.
    pub json_format: bool,
    /// Log span open/close, which shows per-tool timings.
    pub include_spans: bool,
    /// Include source file and line.
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Debug level with span events and source locations.
    pub fn verbose(json_format: bool) -> Self {
        Self {
            level: Level::DEBUG,
            json_format,
            include_spans: true,
            include_location: true,
        }
    }

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        CRATES
            .iter()
            .map(|c| format!("{}={}", c, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Initializes logging with default configuration.
pub fn init_logging() -> Result<(), TryInitError> {
    init_logging_with_config(LoggingConfig::default())
}

/// Initializes logging. `RUST_LOG` overrides the configured level.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let json = config.json_format.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(config.span_events())
            .with_file(config.include_location)
            .with_line_number(config.include_location)
    });
    let text = (!config.json_format).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(config.span_events())
            .with_file(config.include_location)
            .with_line_number(config.include_location)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(text)
        .try_init()
}

/// Creates the span wrapping one tool invocation.
#[macro_export]
macro_rules! tool_span {
    ($tool_name:expr) => {
        tracing::info_span!("tool", tool = %$tool_name)
    };
    ($tool_name:expr, $($field:tt)*) => {
        tracing::info_span!("tool", tool = %$tool_name, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
        assert_eq!(config.span_events(), FmtSpan::NONE);
    }

    #[test]
    fn test_verbose_config() {
        let config = LoggingConfig::verbose(true);
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.json_format);
        assert!(config.include_location);
    }

    #[test]
    fn test_default_directive_covers_workspace_crates() {
        let directive = LoggingConfig::verbose(false).default_directive();
        assert!(directive.contains("sb_connectors=DEBUG"));
        assert!(directive.contains("sb_api=DEBUG"));
        assert!(directive.contains("secbridge=DEBUG"));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let _ = init_logging();
        assert!(init_logging().is_err());
    }
}
