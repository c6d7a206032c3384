use clap::{Arg, ArgMatches, Command};
use crate::commands::args;
use crate::config::config::Config;
use crate::models::version::Version;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("remove")
        .about("Remove the images and containers of a version, or of every version")
        .arg(
            Arg::new("version")
                .required(false)
                .help("Version to remove, everything managed when omitted")
        )
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let version = args.get_one::<String>("version").map(|v| Version::parse(v)).transpose()?;

    let manager = HostManager::connect(&configuration)?;
    let mut follower = args::follower(args);
    let removed = match &version {
        Some(version) => manager.remove_version(version, follower.as_mut()).await?,
        None => manager.remove_all(follower.as_mut()).await?,
    };

    println!("{} images removed", removed);
    Ok(())
}
