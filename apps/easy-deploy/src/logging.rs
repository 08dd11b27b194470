use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const FILTER_ENV: &str = "EASY_DEPLOY_LOG_FILTER";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = std::env::var(FILTER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_filter(config.level.to_filter()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_level(true)
        .with_target(config.level >= LogLevel::Debug)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;
    let _ = GUARD.set(guard);
    Ok(())
}

// Our crates get the requested level; network dependencies stay at info so
// socket chatter does not bury the session log.
const QUIET_DEPENDENCIES: &[&str] = &[
    "hyper",
    "reqwest",
    "tokio_tungstenite",
    "tungstenite",
    "rustls",
    "mio",
];

fn default_filter(level: LevelFilter) -> String {
    if level < LevelFilter::DEBUG {
        return level.to_string().to_lowercase();
    }
    let level = level.to_string().to_lowercase();
    let mut filter =
        format!("info,easy_deploy={level},deploy_transport={level},deploy_proto={level}");
    for target in QUIET_DEPENDENCIES {
        filter.push(',');
        filter.push_str(target);
        filter.push_str("=info");
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_levels_use_a_plain_filter() {
        assert_eq!(default_filter(LevelFilter::WARN), "warn");
        assert_eq!(default_filter(LevelFilter::INFO), "info");
    }

    #[test]
    fn verbose_levels_scope_to_our_crates() {
        let filter = default_filter(LevelFilter::DEBUG);
        assert!(filter.starts_with("info,easy_deploy=debug,deploy_transport=debug"));
        assert!(filter.contains("tungstenite=info"));
    }
}
