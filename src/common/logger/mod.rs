use std::{fs, path::Path};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::*;
pub use writer::*;

use crate::{common::types::AnyResult, configs::Config};

/// Builds the filter directive from the logging section.
fn filter_directive(config: &Config) -> String {
    let logging = config.logging.as_ref();
    let level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
    let filters = logging.and_then(|l| l.filters.as_deref()).unwrap_or("");

    if filters.is_empty() {
        format!("{level},symphonia=warn")
    } else {
        format!("{level},symphonia=warn,{filters}")
    }
}

/// Installs the global subscriber: coloured console output plus an optional
/// line-capped log file. `RUST_LOG` overrides the configured level.
///
/// Fails instead of panicking when a subscriber is already installed, which
/// happens when a host application owns logging.
pub fn init(config: &Config) -> AnyResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .event_format(BridgeFormatter::new(true))
        .with_ansi(true);

    let file_layer = match config.logging.as_ref().and_then(|l| l.file.as_ref()) {
        Some(file) => {
            if let Some(parent) = Path::new(&file.path).parent() {
                fs::create_dir_all(parent)?;
            }
            Some(
                fmt::layer()
                    .with_writer(CircularFileWriter::new(file.path.clone(), file.max_lines))
                    .event_format(BridgeFormatter::new(false))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::LoggingConfig;

    #[test]
    fn directive_defaults_to_info() {
        assert_eq!(filter_directive(&Config::default()), "info,symphonia=warn");
    }

    #[test]
    fn directive_appends_filters() {
        let config = Config {
            logging: Some(LoggingConfig {
                level: Some("debug".into()),
                filters: Some("avbridge::io=trace".into()),
                file: None,
            }),
            ..Config::default()
        };
        assert_eq!(
            filter_directive(&config),
            "debug,symphonia=warn,avbridge::io=trace"
        );
    }
}
