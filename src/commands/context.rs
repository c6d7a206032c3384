use std::fs;
use clap::{Arg, Command};
use clap::ArgMatches;
use cli_table::{format::Justify, print_stdout, Table, WithTitle};
use crate::config::config::{Config, get_config_dir, read_contexts};
use crate::runtime::error::RuntimeError;

pub(crate) fn command_config() -> Command {
    Command::new("context")
        .about("Print contexts configuration")
        .arg(
            Arg::new("parameter")
                .required(false)
                .help("show specific parameter (configs, current-context)")
        )
}

#[derive(Table)]
struct ConfigTableItem {
    #[table(title = "Name", justify = "Justify::Right")]
    name: String,
    #[table(title = "Current")]
    current: String,
    #[table(title = "Repo")]
    repo: String,
    #[table(title = "Domain")]
    domain: String,
}

pub(crate) fn execute(args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let binding = "configs".to_string();
    let parameter = args.get_one::<String>("parameter").unwrap_or(&binding);

    if parameter == "current-context" {
        println!("{:?}", configuration);
    }

    if parameter == "configs" {
        let file = format!("{}/config.toml", get_config_dir());
        let mut configs = vec![];

        if fs::metadata(&file).is_ok() {
            let contents = fs::read_to_string(&file)?;
            let contexts = read_contexts(&contents)
                .map_err(|e| RuntimeError::Other(format!("Invalid configuration {}: {}", file, e)))?;

            for (key, value) in contexts.contexts {
                configs.push(ConfigTableItem {
                    current: if key == configuration.name { "*".to_string() } else { String::new() },
                    name: key,
                    repo: value.repo,
                    domain: value.domain,
                })
            }
        }

        configs.sort_by(|a, b| a.name.cmp(&b.name));
        print_stdout(configs.with_title())?;
    }

    Ok(())
}
