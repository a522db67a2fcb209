//! Process-wide `tracing` subscriber for the daemon.
//!
//! Records go to stderr, either as flattened JSON objects or as compact
//! human-readable lines, filtered by the configured directive.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::UtcTime;

use scaninout_config::{Config, LogFormat};

/// Format of the subscriber installed by the first successful call.
static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Evidence that logging is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// The record format in effect, which is the one requested by the first
    /// initialisation in this process.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("another tracing subscriber is already installed: {source}")]
    Install {
        #[source]
        source: SetGlobalDefaultError,
    },
}

/// Installs the subscriber described by `config`, once per process.
///
/// # Errors
///
/// Fails when the filter directive does not parse or a foreign subscriber
/// already owns the global default.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let subscriber = build_subscriber(config.log_filter(), config.log_format())?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(|source| TelemetryError::Install { source })?;
            Ok(config.log_format())
        })
        .map(|format| TelemetryHandle { format: *format })
}

fn build_subscriber(directive: &str, format: LogFormat) -> Result<BoxedSubscriber, TelemetryError> {
    let filter = EnvFilter::try_new(directive).map_err(|source| TelemetryError::Filter {
        directive: directive.to_owned(),
        source,
    })?;
    let base = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_thread_names(true);
    Ok(match format {
        LogFormat::Json => Box::new(
            base.json()
                .flatten_event(true)
                .with_current_span(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(
            base.compact()
                .with_ansi(io::stderr().is_terminal())
                .finish(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::json(LogFormat::Json)]
    #[case::compact(LogFormat::Compact)]
    fn both_formats_build(#[case] format: LogFormat) {
        assert!(build_subscriber("scaninoutd=debug,info", format).is_ok());
    }

    #[test]
    fn bad_directives_are_named() {
        let error = build_subscriber("scaninoutd=loudest", LogFormat::Json)
            .err()
            .expect("invalid filter");
        assert!(matches!(
            error,
            TelemetryError::Filter { ref directive, .. } if directive == "scaninoutd=loudest"
        ));
    }
}
