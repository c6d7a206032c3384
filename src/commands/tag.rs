use clap::{Arg, ArgMatches, Command};
use crate::commands::args;
use crate::config::config::Config;
use crate::runtime::build::split_image_reference;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("tag")
        .about("Add a reference to the image of a version")
        .arg(args::version_arg())
        .arg(
            Arg::new("target")
                .required(true)
                .help("New reference, repository[:tag]")
        )
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let version = args::version(args)?;
    let target = args
        .get_one::<String>("target")
        .ok_or_else(|| RuntimeError::Other("a target reference is required".to_string()))?;
    let (repository, tag) = split_image_reference(target);

    let manager = HostManager::connect(&configuration)?;
    manager.tag_version(&version, &repository, &tag).await?;

    println!("Tagged {} as {}:{}", manager.tag_for_version(&version), repository, tag);
    Ok(())
}
