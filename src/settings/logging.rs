//! log subscriber setup for the daemon.
//!
//! The `log` section of the configuration file gives the base settings, the
//! `--log-*` command line options override them.

use lazy_static::lazy_static;
use serde::{de::Error as _, Deserialize, Deserializer};
use std::{fs, io, path::PathBuf, str::FromStr};
use structopt::StructOpt;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::util::TryInitError;

const LEVELS: [LevelFilter; 6] = [
    LevelFilter::OFF,
    LevelFilter::ERROR,
    LevelFilter::WARN,
    LevelFilter::INFO,
    LevelFilter::DEBUG,
    LevelFilter::TRACE,
];

lazy_static! {
    static ref LEVEL_NAMES: Vec<&'static str> = LEVELS
        .iter()
        .map(|level| &*Box::leak(level.to_string().to_lowercase().into_boxed_str()))
        .collect();
}

/// Notices about settings the command line replaced. They are produced
/// before any subscriber exists, the caller logs them once it does.
pub type LogInfoMsg = Option<Vec<String>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &*s.trim().to_lowercase() {
            "plain" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &*s.trim().to_lowercase() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            other => Err(format!("unknown log output '{}'", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open the log file `{}`", .path.to_string_lossy())]
    LogFile {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },
    #[error("a global log subscriber is already installed")]
    AlreadyInstalled(#[source] TryInitError),
}

/// the `log` section of the configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    #[serde(default, deserialize_with = "deserialize_level")]
    pub level: Option<LevelFilter>,
    #[serde(default)]
    pub format: Option<LogFormat>,
    #[serde(default)]
    pub output: Option<LogOutput>,
}

fn deserialize_level<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<LevelFilter>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(name) => parse_level(&name)
            .map(Some)
            .map_err(|_| D::Error::unknown_variant(&name, &**LEVEL_NAMES)),
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    level
        .parse()
        .map_err(|_| format!("unknown log level '{}'", level))
}

#[derive(Debug, Default, StructOpt)]
pub struct CliSettings {
    /// Minimum severity of the emitted log messages. Defaults to "info".
    #[structopt(
        long = "log-level",
        parse(try_from_str = parse_level),
        possible_values = &LEVEL_NAMES
    )]
    pub log_level: Option<LevelFilter>,

    /// Format of the emitted log messages, "plain" or "json". Defaults to "plain".
    #[structopt(long = "log-format", parse(try_from_str))]
    pub log_format: Option<LogFormat>,

    /// Where log messages go, "stdout" or "stderr". Defaults to "stderr".
    #[structopt(long = "log-output", parse(try_from_str))]
    pub log_output: Option<LogOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: LevelFilter::INFO,
            format: LogFormat::Plain,
            output: LogOutput::Stderr,
        }
    }
}

pub struct LogSettings {
    pub config: LogConfig,
    pub msgs: LogInfoMsg,
}

/// replace `current` by `replacement` if there is one, noting the change
fn override_with<T: PartialEq + std::fmt::Debug + Clone>(
    name: &str,
    current: &mut T,
    replacement: Option<&T>,
    notices: &mut Vec<String>,
) {
    if let Some(replacement) = replacement {
        if current != replacement {
            notices.push(format!(
                "log {} overridden from command line: {:?} replaced with {:?}",
                name, current, replacement
            ));
        }
        *current = replacement.clone();
    }
}

impl LogSettings {
    pub fn new(command_line: &CliSettings, file: Option<&FileSettings>) -> LogSettings {
        let mut config = LogConfig::default();
        if let Some(file) = file {
            config.level = file.level.unwrap_or(config.level);
            config.format = file.format.unwrap_or(config.format);
            if let Some(output) = &file.output {
                config.output = output.clone();
            }
        }

        let mut notices = Vec::new();
        override_with(
            "level",
            &mut config.level,
            command_line.log_level.as_ref(),
            &mut notices,
        );
        override_with(
            "format",
            &mut config.format,
            command_line.log_format.as_ref(),
            &mut notices,
        );
        override_with(
            "output",
            &mut config.output,
            command_line.log_output.as_ref(),
            &mut notices,
        );

        LogSettings {
            config,
            msgs: Some(notices).filter(|notices| !notices.is_empty()),
        }
    }

    /// Install the global subscriber. The returned guards flush the
    /// non-blocking writer when dropped and must be held until exit.
    pub fn init_log(self) -> Result<(Vec<WorkerGuard>, LogInfoMsg), Error> {
        let (writer, guard) = match &self.config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|cause| Error::LogFile {
                        path: path.clone(),
                        cause,
                    })?;
                tracing_appender::non_blocking(file)
            }
        };
        install(&self.config, writer).map_err(Error::AlreadyInstalled)?;
        Ok((vec![guard], self.msgs))
    }
}

fn install(config: &LogConfig, writer: NonBlocking) -> Result<(), TryInitError> {
    use tracing_subscriber::prelude::*;

    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    let registry = tracing_subscriber::registry().with(config.level);
    match config.format {
        LogFormat::Plain => registry.with(layer).try_init(),
        LogFormat::Json => registry.with(layer.json()).try_init(),
    }
}
