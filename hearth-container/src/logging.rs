//! Subscriber setup for embedding applications

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `config.filter`
///
/// `RUST_LOG` takes precedence when set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig {
            filter: "hearth_container=trace".to_string(),
        };
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
