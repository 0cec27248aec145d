use crate::{daemon::WindowRequest, settings::logging::FileSettings};
use serde::Deserialize;

pub const DEFAULT_BUFFER_CAPACITY: usize = 50;
pub const DEFAULT_REFRESH_INTERVAL: u64 = 10;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub node: NodeConfig,

    #[serde(default)]
    pub buffers: Buffers,

    /// seconds between two maintenance ticks
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// validity windows the node must hold keys for
    #[serde(default)]
    pub delegations: Vec<WindowRequest>,

    pub log: Option<FileSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// base url of the node administrative API, e.g. `http://127.0.0.1:8080`
    pub host: String,

    /// token sent with every request to the node
    pub api_token: Option<String>,

    /// request timeout, in seconds
    pub timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Buffers {
    #[serde(default = "default_capacity")]
    pub pending_capacity: usize,
    #[serde(default = "default_capacity")]
    pub generated_capacity: usize,
}

impl Default for Buffers {
    fn default() -> Self {
        Buffers {
            pending_capacity: DEFAULT_BUFFER_CAPACITY,
            generated_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

fn default_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL
}
