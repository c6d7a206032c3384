use std::time::Duration;
use clap::{Arg, ArgMatches, Command};
use cli_table::{format::Justify, print_stdout, Table, WithTitle};
use crate::commands::args;
use crate::config::config::Config;
use crate::models::health_check::HealthCheckSpec;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::{HostManager, RunHostOptions};
use crate::runtime::lifecycle::{HostRef, ADMIN_PORT};

pub(crate) fn command_config() -> Command {
    Command::new("run")
        .about("Start a healthy host of a product version, building it first if needed")
        .arg(args::version_arg())
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .help("Container name, reused when it already runs this version")
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help("How long to wait for the host to become healthy (30s, 2m)")
        )
        .arg(
            Arg::new("health-interval")
                .long("health-interval")
                .help("Interval of the container health check")
        )
        .arg(
            Arg::new("volume")
                .long("volume")
                .help("Named volume mounted on the data directory")
        )
        .args(args::source_args())
}

#[derive(Table)]
struct PortItem {
    #[table(title = "Port", justify = "Justify::Right")]
    port: String,
    #[table(title = "Host port")]
    host_port: u16,
}

pub(crate) fn print_ports(host: &HostRef) -> Result<(), RuntimeError> {
    let ports: Vec<PortItem> = host
        .ports
        .iter()
        .map(|(port, host_port)| PortItem { port: port.clone(), host_port: *host_port })
        .collect();

    print_stdout(ports.with_title())?;

    if let Some(port) = host.port(ADMIN_PORT) {
        println!("Admin interface: http://localhost:{}", port);
    }
    Ok(())
}

fn duration_arg(args: &ArgMatches, name: &str) -> Result<Option<Duration>, RuntimeError> {
    match args.get_one::<String>(name) {
        Some(value) => HealthCheckSpec::parse_duration(value)
            .map(Some)
            .map_err(|e| RuntimeError::Other(format!("Invalid --{}: {}", name, e))),
        None => Ok(None),
    }
}

pub(crate) async fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let version = args::version(args)?;
    let timeout = duration_arg(args, "timeout")?.unwrap_or_else(|| configuration.healthy_timeout());

    let mut options = RunHostOptions::new(version, timeout);
    options.source = args::artifact_source(args);
    options.container_name = args.get_one::<String>("name").cloned();
    options.base_image = args.get_one::<String>("base").cloned();
    options.volume = args.get_one::<String>("volume").cloned();
    if let Some(interval) = duration_arg(args, "health-interval")? {
        options.health_check = HealthCheckSpec::admin_timestamp(interval);
    }

    let manager = HostManager::connect(&configuration)?;
    let mut follower = args::follower(args);
    let host = manager.run_host(&options, follower.as_mut()).await?;

    println!("Host {} ({}) is up", host.name, host.id);
    print_ports(&host)
}
