use clap::{Arg, ArgAction, ArgMatches, Command};
use crate::commands::run::print_ports;
use crate::commands::args;
use crate::config::config::Config;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("start")
        .about("Start an existing host container")
        .arg(
            Arg::new("container")
                .required(true)
                .help("Container id or name")
        )
        .arg(
            Arg::new("wait")
                .short('w')
                .long("wait")
                .action(ArgAction::SetTrue)
                .help("Wait until the host reports healthy")
        )
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let container = args
        .get_one::<String>("container")
        .ok_or_else(|| RuntimeError::ContainerNotFound(String::new()))?;
    let manager = HostManager::connect(&configuration)?;

    let host = if args.get_flag("wait") {
        let mut follower = args::follower(args);
        manager
            .start_host_healthy(container, configuration.healthy_timeout(), follower.as_mut())
            .await?
    } else {
        manager.start_host(container).await?
    };

    println!("Host {} ({}) started", host.name, host.id);
    print_ports(&host)
}
