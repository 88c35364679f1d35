//! Log subscriber setup for applications and tests embedding the runtime.

use tracing_subscriber::EnvFilter;

use crate::config::env_vars;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "neomind_spi=info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Compact,
    /// One JSON object per line, for containers.
    Json,
}

impl LogFormat {
    /// `Json` when `NEOMIND_LOG_JSON` is `true`.
    pub fn from_env() -> Self {
        let json = std::env::var(env_vars::LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);
        if json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// Install a global subscriber. Returns `false` if one was already set.
pub fn init(format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init(),
    };
    result.is_ok()
}

/// [`init`] with the format chosen by the environment.
pub fn init_from_env() -> bool {
    init(LogFormat::from_env())
}

/// Subscriber writing through the test harness so output is captured per test.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("neomind_spi=debug")),
        )
        .with_target(false)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_for_tests();
        assert!(!init(LogFormat::Compact));
        assert!(!init_from_env());
    }
}
