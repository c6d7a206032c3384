use clap::{Arg, ArgMatches, Command};
use crate::config::config::Config;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("inspect")
        .about("Print a host container as JSON")
        .arg(
            Arg::new("container")
                .required(true)
                .help("Container id or name")
        )
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let container = args
        .get_one::<String>("container")
        .ok_or_else(|| RuntimeError::ContainerNotFound(String::new()))?;

    let manager = HostManager::connect(&configuration)?;
    let host = manager.inspect_host(container).await?;

    println!("{}", serde_json::to_string_pretty(&host)?);
    Ok(())
}
