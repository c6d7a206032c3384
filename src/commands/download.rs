use std::path::PathBuf;
use clap::{Arg, ArgMatches, Command};
use crate::commands::args;
use crate::config::config::Config;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("download")
        .about("Download the installer of a product version")
        .arg(args::version_arg())
        .arg(
            Arg::new("directory")
                .default_value(".")
                .help("Where to write the installer")
        )
        .args(args::credential_args())
        .arg(args::overwrite_arg())
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let version = args::version(args)?;
    let credentials = args::credentials(args)
        .ok_or_else(|| RuntimeError::Authentication("an email and a password are required".to_string()))?;
    let directory = args
        .get_one::<String>("directory")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let manager = HostManager::connect(&configuration)?;
    let mut follower = args::follower(args);
    let path = manager
        .download_version(&version, &directory, &credentials, args.get_flag("overwrite"), follower.as_mut())
        .await?;

    println!("{}", path.display());
    Ok(())
}
