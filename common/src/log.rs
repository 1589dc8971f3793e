//! A `LogLevel` config enum mapped onto `tracing`, with noisy transport
//! crates pinned to `info` unless the operator asks for `Detail`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Detail,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace | LogLevel::Detail => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = eyre::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "detail" => Ok(LogLevel::Detail),
            _ => Err(eyre::eyre!("invalid log level: {s}")),
        }
    }
}

fn build_env_filter(log_level: LogLevel) -> eyre::Result<EnvFilter> {
    let level: LevelFilter = log_level.into();
    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if log_level != LogLevel::Detail {
        filter = filter
        .add_directive("hyper=info".parse()?)
        .add_directive("h2=info".parse()?)
        .add_directive("rustls=info".parse()?)
        .add_directive("mio=info".parse()?)
        .add_directive("want=info".parse()?)
        .add_directive("redis=info".parse()?)
        .add_directive("tower_http=info".parse()?);
    }
    Ok(filter)
}

/// Installs the global `tracing` subscriber and panic hook. Should be called
/// once near the top of each binary's `main`.
pub fn setup_logs(log_level: LogLevel) -> eyre::Result<()> {
    let filter = build_env_filter(log_level)?;
    tracing_subscriber::fmt()
    .with_thread_names(true)
    .with_line_number(true)
    .with_env_filter(filter)
    .with_writer(std::io::stdout)
    .init();
    log_panics::init();
    Ok(())
}
