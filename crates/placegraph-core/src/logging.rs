use crate::config_manager::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Install the global tracing subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// when a subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let installed = match config.format.as_str() {
        "json" => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer().json());
            tracing::subscriber::set_global_default(subscriber)
        }
        "compact" => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer().compact());
            tracing::subscriber::set_global_default(subscriber)
        }
        _ => {
            let subscriber = Registry::default()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer().pretty());
            tracing::subscriber::set_global_default(subscriber)
        }
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_reports_false() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: "compact".to_string(),
        };
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
