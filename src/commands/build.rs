use clap::{ArgMatches, Command};
use crate::commands::args;
use crate::config::config::Config;
use crate::runtime::build::BuildOptions;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("build")
        .about("Build the image of a product version")
        .arg(args::version_arg())
        .args(args::source_args())
        .arg(args::overwrite_arg())
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let version = args::version(args)?;
    let source = args::artifact_source(args).ok_or_else(|| RuntimeError::MissingSource(version.to_string()))?;
    let options = BuildOptions {
        overwrite: args.get_flag("overwrite"),
        base_image: args.get_one::<String>("base").cloned(),
    };

    let manager = HostManager::connect(&configuration)?;
    let mut follower = args::follower(args);
    let tag = manager.build_version(&version, &source, &options, follower.as_mut()).await?;

    println!("Version {} is available as {}", version, tag);
    Ok(())
}
