//! Telemetry initialization.
//!
//! Logs go to stderr so stdout stays reserved for the `build-number=<n>`
//! result line. Controlled by:
//! - `RUST_LOG` → standard `EnvFilter` directives (default `info`)
//! - `BUILD_NUMBERS_LOG_FORMAT=json` → JSON events plus span-close timings,
//!   for log shippers; anything else → human-readable lines

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Env var selecting the log format.
pub const LOG_FORMAT_ENV: &str = "BUILD_NUMBERS_LOG_FORMAT";

/// Output format of the stderr log stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// One human-readable line per event.
    Text,
    /// One JSON object per event, plus one per closed span.
    Json,
}

impl LogFormat {
    /// Format named by `value`; unknown or missing values mean text.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
    };
    // Already installed (tests, embedding): keep the existing subscriber.
    let _ = installed;
}
