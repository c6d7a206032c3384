use std::path::PathBuf;
use clap::{Arg, ArgAction, ArgMatches};
use crate::fetcher::DevCredentials;
use crate::models::version::Version;
use crate::runtime::build::ArtifactSource;
use crate::runtime::error::RuntimeError;
use crate::runtime::progress::{CliFollower, LogFollower, ProgressFollower};

pub(crate) fn version_arg() -> Arg {
    Arg::new("version")
        .required(true)
        .help("Product version (9.0-4) or installer file name")
}

pub(crate) fn credential_args() -> Vec<Arg> {
    vec![
        Arg::new("email")
            .short('e')
            .long("email")
            .env("MLDOCK_EMAIL")
            .help("Developer site account email"),
        Arg::new("password")
            .short('p')
            .long("password")
            .env("MLDOCK_PASSWORD")
            .hide_env_values(true)
            .help("Developer site account password"),
    ]
}

pub(crate) fn source_args() -> Vec<Arg> {
    let mut args = vec![
        Arg::new("rpm-file")
            .short('f')
            .long("rpm-file")
            .conflicts_with("email")
            .help("Local installer to build from"),
        Arg::new("base")
            .short('b')
            .long("base")
            .help("OS image to build on instead of the version's default"),
    ];
    args.extend(credential_args());
    args
}

pub(crate) fn overwrite_arg() -> Arg {
    Arg::new("overwrite")
        .short('o')
        .long("overwrite")
        .action(ArgAction::SetTrue)
        .help("Replace what already exists")
}

/// The version given on the command line, or the one in the installer's name.
pub(crate) fn version(args: &ArgMatches) -> Result<Version, RuntimeError> {
    match args.get_one::<String>("version") {
        Some(version) => Version::parse(version),
        None => match args.get_one::<String>("rpm-file") {
            Some(file) => Version::parse(file),
            None => Err(RuntimeError::InvalidVersionFormat(String::new())),
        },
    }
}

pub(crate) fn credentials(args: &ArgMatches) -> Option<DevCredentials> {
    match (args.get_one::<String>("email"), args.get_one::<String>("password")) {
        (Some(email), Some(password)) => Some(DevCredentials::new(email, password)),
        _ => None,
    }
}

pub(crate) fn artifact_source(args: &ArgMatches) -> Option<ArtifactSource> {
    if let Some(file) = args.get_one::<String>("rpm-file") {
        return Some(ArtifactSource::LocalFile(PathBuf::from(file)));
    }

    credentials(args).map(ArtifactSource::Credentials)
}

/// Terminal progress, or log lines when `--quiet` is set.
pub(crate) fn follower(args: &ArgMatches) -> Box<dyn ProgressFollower> {
    if matches!(args.try_get_one::<bool>("quiet"), Ok(Some(true))) {
        Box::new(LogFollower::default())
    } else {
        Box::new(CliFollower::stdout())
    }
}
