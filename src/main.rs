use partkeyd_lib::{
    daemon::{Daemon, StaticWindows},
    node::RestNodeClient,
    partkey::PartkeyManager,
    settings::{CommandLine, RawSettings, RunArguments},
};
use std::error::Error;

fn main() {
    let result: Result<(), Box<dyn Error>> = match CommandLine::load() {
        CommandLine::Run(arguments) => run(arguments),
        CommandLine::Keys(keys) => keys.exec().map_err(Into::into),
        CommandLine::Status(status) => status.exec().map_err(Into::into),
    };
    result.unwrap_or_else(report_error)
}

fn run(arguments: RunArguments) -> Result<(), Box<dyn Error>> {
    let raw_settings = RawSettings::load(arguments)?;
    let (_guards, log_info_msgs) = raw_settings.log_settings().init_log()?;
    if let Some(msgs) = log_info_msgs {
        for msg in msgs {
            tracing::info!("{}", msg);
        }
    }

    let settings = raw_settings.try_into_settings()?;
    tracing::info!(
        node = %settings.node.host.url(),
        pending_capacity = settings.pending_capacity,
        generated_capacity = settings.generated_capacity,
        delegations = settings.delegations.len(),
        "starting partkeyd"
    );

    let node = RestNodeClient::new(
        settings.node.host,
        settings.node.api_token,
        settings.node.timeout,
    )?;
    let manager = PartkeyManager::new(
        node,
        settings.pending_capacity,
        settings.generated_capacity,
    );
    let source = StaticWindows::new(settings.delegations);
    Daemon::new(manager, source, settings.refresh_interval).run();
    Ok(())
}

fn report_error(error: Box<dyn Error>) {
    eprintln!("{}", error);
    let mut source = error.source();
    while let Some(sub_error) = source {
        eprintln!("  |-> {}", sub_error);
        source = sub_error.source();
    }
    std::process::exit(1)
}
