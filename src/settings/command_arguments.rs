use crate::{cli, settings::logging::CliSettings};
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
pub struct RunArguments {
    /// Set the daemon config (in YAML format) to use as general configuration
    #[structopt(long = "config", parse(from_os_str))]
    pub config: PathBuf,

    #[structopt(flatten)]
    pub log: CliSettings,
}

#[derive(StructOpt, Debug)]
#[structopt(
    name = "partkeyd",
    rename_all = "kebab-case",
    setting = structopt::clap::AppSettings::ColoredHelp
)]
pub enum CommandLine {
    /// Run the participation key manager against a node
    Run(RunArguments),
    /// Participation key operations on the node
    Keys(cli::Keys),
    /// Node status
    Status(cli::Status),
}

impl CommandLine {
    /// load the command arguments from the command line args
    ///
    /// on error during reading the command line arguments, the
    /// function will print an error message and will terminate
    /// the process.
    ///
    pub fn load() -> Self {
        Self::from_args()
    }
}
