//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with a JSON or pretty format and
//! `RUST_LOG` filtering. Output goes to stderr.
//!
//! Plaintext OTPs only ever appear at `debug` from the development
//! `LogNotifier`. With JSON output the default filter caps
//! `anchor_core::notify` at `info`, so codes stay out of aggregated logs
//! even at `--log-level debug`. Only an explicit `RUST_LOG` lifts the cap.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output. Suitable for local development.
    Pretty,
    /// Machine-parseable JSON lines. Suitable for production log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json" or "pretty" (case-insensitive). Anything else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: &str, format: LogFormat) -> String {
    let mut directives = format!("anchor_node={level},anchor_core={level},tower_http=info");
    if format == LogFormat::Json {
        directives.push_str(",anchor_core::notify=info");
    }
    directives
}

/// Initialize the global tracing subscriber. Call exactly once, early in `main()`.
///
/// `RUST_LOG` replaces the [`default_directives`] for `level` when set, e.g.
///
/// ```text
/// RUST_LOG=anchor_node=debug,anchor_core=info,tower_http=debug
/// ```
pub fn init_logging(level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level, format)));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .init();
        }
    }

    tracing::info!(?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(LogFormat::from_str_lossy("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("Json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("xml"), LogFormat::Pretty);
    }

    #[test]
    fn test_json_default_caps_notifier() {
        let pretty = default_directives("debug", LogFormat::Pretty);
        assert_eq!(pretty, "anchor_node=debug,anchor_core=debug,tower_http=info");
        assert!(!pretty.contains("notify"));

        let json = default_directives("debug", LogFormat::Json);
        assert!(json.ends_with(",anchor_core::notify=info"));
        assert!(EnvFilter::try_new(&json).is_ok());
    }
}
