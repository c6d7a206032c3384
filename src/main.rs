use std::process;
use clap::{Arg, ArgAction, Command};

#[macro_use]
extern crate log;
extern crate env_logger;
mod commands {
  pub(crate) mod args;
  pub(crate) mod build;
  pub(crate) mod context;
  pub(crate) mod download;
  pub(crate) mod images;
  pub(crate) mod inspect;
  pub(crate) mod remove;
  pub(crate) mod run;
  pub(crate) mod start;
  pub(crate) mod tag;
}

mod runtime {
  pub(crate) mod build;
  pub(crate) mod context;
  pub(crate) mod docker;
  pub(crate) mod engine;
  pub(crate) mod error;
  pub(crate) mod host;
  pub(crate) mod lifecycle;
  pub(crate) mod progress;
  pub(crate) mod reaper;
  pub(crate) mod resolver;
  pub(crate) mod templates;
}

mod models {
  pub(crate) mod health_check;
  pub(crate) mod version;
}

mod config {
    pub(crate) mod config;
}

mod utils {
    pub(crate) mod labels;
}

mod fetcher;

#[cfg(test)]
mod fixtures;

use crate::runtime::error::RuntimeError;

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut app = Command::new("mldock")
        .version("0.1.0")
        .author("Mlanawo Mbechezi <mlanawo.mbechezi@kemeter.io>")
        .about("Build and run MarkLogic hosts on Docker")
        .arg(
            Arg::new("context")
                .required(false)
                .help("Sets the context to use (e.g., local, ci)")
                .long("context")
                .short('c')
                .global(true)
        )
        .arg(
            Arg::new("repo")
                .required(false)
                .help("Overrides the image repo prefix of the context")
                .long("repo")
                .global(true)
        )
        .arg(
            Arg::new("quiet")
                .help("Log progress instead of printing it")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue)
                .global(true)
        )
        .subcommand(
            commands::context::command_config(),
        )
        .subcommand(
            commands::build::command_config(),
        )
        .subcommand(
            commands::download::command_config(),
        )
        .subcommand(
            commands::run::command_config(),
        )
        .subcommand(
            commands::start::command_config(),
        )
        .subcommand(
            commands::inspect::command_config(),
        )
        .subcommand(
            commands::images::command_config(),
        )
        .subcommand(
            commands::tag::command_config(),
        )
        .subcommand(
            commands::remove::command_config(),
        );

    let matches = app.get_matches_mut();
    let context = matches.get_one::<String>("context")
        .map(|s| s.as_str())
        .unwrap_or("");

    let mut config = config::config::load_config(context);
    if let Some(repo) = matches.get_one::<String>("repo") {
        config.repo = repo.clone();
    }

    let result: Result<(), RuntimeError> = match matches.subcommand() {
        Some(("context", sub_matches)) => {
            commands::context::execute(sub_matches, config)
        }
        Some(("build", sub_matches)) => {
            commands::build::execute(sub_matches, config).await
        }
        Some(("download", sub_matches)) => {
            commands::download::execute(sub_matches, config).await
        }
        Some(("run", sub_matches)) => {
            commands::run::execute(sub_matches, config).await
        }
        Some(("start", sub_matches)) => {
            commands::start::execute(sub_matches, config).await
        }
        Some(("inspect", sub_matches)) => {
            commands::inspect::execute(sub_matches, config).await
        }
        Some(("images", sub_matches)) => {
            commands::images::execute(sub_matches, config).await
        }
        Some(("tag", sub_matches)) => {
            commands::tag::execute(sub_matches, config).await
        }
        Some(("remove", sub_matches)) => {
            commands::remove::execute(sub_matches, config).await
        }
        _ => app.print_help().map_err(RuntimeError::from),
    };

    if let Err(e) = result {
        error!("{:?}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
