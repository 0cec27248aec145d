mod command_arguments;
pub mod config;
pub mod logging;

pub use self::command_arguments::{CommandLine, RunArguments};

use self::{config::Config, logging::LogSettings};
use crate::{daemon::WindowRequest, node::HostAddr};
use reqwest::Url;
use std::{fs::File, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot read the daemon configuration file `{}`", .path.to_string_lossy())]
    ConfigIo {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },
    #[error("Error while parsing the daemon configuration file")]
    Config(#[from] serde_yaml::Error),
    #[error("In the daemon configuration file, `node.host` is not a valid base url: {reason}")]
    InvalidNodeHost { host: String, reason: String },
    #[error("In the daemon configuration file, `buffers.{buffer}` must be greater than zero")]
    ZeroCapacity { buffer: &'static str },
    #[error("In the daemon configuration file, `refresh_interval` must be greater than zero")]
    ZeroRefreshInterval,
    #[error("Delegation window for {address} ends before it starts ({first} > {last})")]
    InvalidWindow {
        address: String,
        first: u64,
        last: u64,
    },
}

/// Overall Settings for the daemon
#[derive(Debug)]
pub struct Settings {
    pub node: NodeSettings,
    pub pending_capacity: usize,
    pub generated_capacity: usize,
    pub refresh_interval: Duration,
    pub delegations: Vec<WindowRequest>,
}

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub host: HostAddr,
    pub api_token: Option<String>,
    pub timeout: Option<Duration>,
}

pub struct RawSettings {
    command_line: RunArguments,
    config: Config,
}

impl RawSettings {
    pub fn load(command_line: RunArguments) -> Result<Self, Error> {
        let file = File::open(&command_line.config).map_err(|cause| Error::ConfigIo {
            path: command_line.config.clone(),
            cause,
        })?;
        let config = serde_yaml::from_reader(file)?;
        Ok(Self {
            command_line,
            config,
        })
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings::new(&self.command_line.log, self.config.log.as_ref())
    }

    /// Validate the configuration and turn it into the daemon settings
    pub fn try_into_settings(self) -> Result<Settings, Error> {
        let Config {
            node,
            buffers,
            refresh_interval,
            delegations,
            log: _,
        } = self.config;

        let host = Url::parse(&node.host).map_err(|error| Error::InvalidNodeHost {
            host: node.host.clone(),
            reason: error.to_string(),
        })?;
        if host.cannot_be_a_base() {
            return Err(Error::InvalidNodeHost {
                host: node.host,
                reason: "url cannot be a base".to_owned(),
            });
        }

        if buffers.pending_capacity == 0 {
            return Err(Error::ZeroCapacity {
                buffer: "pending_capacity",
            });
        }
        if buffers.generated_capacity == 0 {
            return Err(Error::ZeroCapacity {
                buffer: "generated_capacity",
            });
        }
        if refresh_interval == 0 {
            return Err(Error::ZeroRefreshInterval);
        }
        if let Some(window) = delegations.iter().find(|window| window.first > window.last) {
            return Err(Error::InvalidWindow {
                address: window.address.to_string(),
                first: window.first.as_u64(),
                last: window.last.as_u64(),
            });
        }

        Ok(Settings {
            node: NodeSettings {
                host: HostAddr::new(host),
                api_token: node.api_token,
                timeout: node.timeout.map(Duration::from_secs),
            },
            pending_capacity: buffers.pending_capacity,
            generated_capacity: buffers.generated_capacity,
            refresh_interval: Duration::from_secs(refresh_interval),
            delegations,
        })
    }
}
