//! Process logging setup and per-call log context.

use std::path::Path;

use log::{info, warn};

use crate::config::LoggingConfig;
use crate::error::Error;

/// Initialize the global logger.
///
/// Uses the log4rs file from the configuration when it exists, otherwise
/// falls back to `env_logger` driven by `RUST_LOG`. Calling this more than
/// once keeps the first logger.
pub fn init(config: &LoggingConfig) -> Result<(), Error> {
    if Path::new(&config.config_file).exists() {
        log4rs::init_file(&config.config_file, Default::default()).map_err(|e| {
            Error::Configuration(format!(
                "cannot initialize logging from {}: {}",
                config.config_file, e
            ))
        })?;
        info!("Logging initialized from {}", config.config_file);
    } else {
        let _ = env_logger::try_init();
        warn!(
            "Log configuration {} not found, using env_logger",
            config.config_file
        );
    }
    Ok(())
}

/// Puts the stream being handled into the MDC for the lifetime of the guard.
///
/// The MDC is thread-local and a task may move between threads at every
/// `.await`, so the guard must never live across one. Use `stream_log!`.
pub(crate) struct StreamLogContext;

impl StreamLogContext {
    pub(crate) fn enter(stream: &str, day: Option<&str>) -> Self {
        log_mdc::insert("stream", stream);
        if let Some(day) = day {
            log_mdc::insert("day", day);
        }
        StreamLogContext
    }
}

impl Drop for StreamLogContext {
    fn drop(&mut self) {
        log_mdc::remove("stream");
        log_mdc::remove("day");
    }
}

/// Emit one log record with `stream` and `day` set in the MDC.
///
/// The keys are inserted and removed around the single `log!` call.
macro_rules! stream_log {
    ($level:expr, $stream:expr, $day:expr, $($arg:tt)+) => {{
        let _ctx = $crate::logging::StreamLogContext::enter($stream, $day);
        ::log::log!($level, $($arg)+);
    }};
}

pub(crate) use stream_log;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_log_context_clears_on_drop() {
        {
            let _ctx = StreamLogContext::enter("hr_stream", Some("20240101"));
            assert_eq!(log_mdc::get("stream", |v| v.map(str::to_string)), Some("hr_stream".to_string()));
            assert_eq!(log_mdc::get("day", |v| v.map(str::to_string)), Some("20240101".to_string()));
        }
        assert_eq!(log_mdc::get("stream", |v| v.map(str::to_string)), None);
        assert_eq!(log_mdc::get("day", |v| v.map(str::to_string)), None);
    }

    #[test]
    fn test_stream_log_clears_keys() {
        stream_log!(log::Level::Info, "hr_stream", Some("20240101"), "saved {}", 3);
        assert_eq!(log_mdc::get("stream", |v| v.map(str::to_string)), None);
        assert_eq!(log_mdc::get("day", |v| v.map(str::to_string)), None);
    }

    #[test]
    fn test_init_without_log4rs_file() {
        let config = LoggingConfig {
            config_file: "/nonexistent/stream_log.yaml".to_string(),
        };
        assert!(init(&config).is_ok());
    }
}
