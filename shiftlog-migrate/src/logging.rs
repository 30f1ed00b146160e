//! Logging setup for Shiftlog.
//!
//! Logging is controlled by environment variables:
//!
//! - `SHIFTLOG_DEBUG=true|1|yes` - Enable debug logging
//! - `SHIFTLOG_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific level
//! - `SHIFTLOG_LOG_FORMAT=json|pretty|compact` - Output format (default: json)
//!
//! Events emitted while a changeset is processed carry the `changeset` span
//! fields (`changeset.id`, `changeset.author`, `changeset.filepath`,
//! `changeset.checksum`, `changeset.exec_type`, `deployment.id`).
//!
//! ```rust,no_run
//! shiftlog_migrate::logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Whether `SHIFTLOG_DEBUG` enables debug logging.
pub fn is_debug_enabled() -> bool {
    env::var("SHIFTLOG_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Log level from `SHIFTLOG_LOG_LEVEL`.
///
/// Defaults to "debug" if `SHIFTLOG_DEBUG` is enabled, otherwise "info".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "info" };
    match env::var("SHIFTLOG_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Output format from `SHIFTLOG_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("SHIFTLOG_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install the global subscriber. Subsequent calls are no-ops.
///
/// Without the `tracing-subscriber` feature this does nothing and events go
/// to whatever subscriber the application installs.
pub fn init() {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "shiftlog={},shiftlog_migrate={}",
                level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("info"));

            let registry = tracing_subscriber::registry().with(filter);
            let result = match get_log_format() {
                "pretty" => registry.with(fmt::layer().pretty()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().json()).try_init(),
            };

            if result.is_ok() {
                tracing::debug!(level = level, format = get_log_format(), "Shiftlog logging initialized");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_is_known() {
        assert!(matches!(
            get_log_level(),
            "trace" | "debug" | "info" | "warn" | "error"
        ));
    }

    #[test]
    fn test_format_is_known() {
        assert!(matches!(get_log_format(), "json" | "pretty" | "compact"));
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
