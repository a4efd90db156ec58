//! Tracing setup for the client.
//!
//! LOG_LEVEL is an EnvFilter directive string, e.g. "debug" or
//! "warn,bugyou=debug,challenge=debug,reqwest=info".
//! LOG_FORMAT picks the output: "pretty" (default), "compact" or "json".
//!
//! Everything goes to stderr because the play shell writes to stdout.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "warn,bugyou=info,challenge=info";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown or missing values fall back to pretty.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            Some("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    // Each format is a distinct subscriber type, so init per arm.
    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.with_file(true).with_line_number(true).try_init(),
    };
    if installed.is_err() {
        tracing::debug!(target: "bugyou", "Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::from_env_value(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some(" compact ")), LogFormat::Compact);
        assert_eq!(LogFormat::from_env_value(Some("fancy")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Pretty);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_tracing();
        init_tracing();
    }
}
