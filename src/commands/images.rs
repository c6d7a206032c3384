use clap::{ArgMatches, Command};
use cli_table::{format::Justify, print_stdout, Table, WithTitle};
use crate::config::config::Config;
use crate::runtime::error::RuntimeError;
use crate::runtime::host::HostManager;

pub(crate) fn command_config() -> Command {
    Command::new("images")
        .about("List the product images of the current context")
}

#[derive(Table)]
struct ImageItem {
    #[table(title = "Version", justify = "Justify::Right")]
    version: String,
    #[table(title = "Tags")]
    tags: String,
    #[table(title = "Id")]
    id: String,
}

pub(crate) async fn execute(_args: &ArgMatches, configuration: Config) -> Result<(), RuntimeError> {
    let manager = HostManager::connect(&configuration)?;
    let mut images = vec![];

    for (version, image) in manager.list_versions().await? {
        let id = image.id.strip_prefix("sha256:").unwrap_or(&image.id);

        images.push(ImageItem {
            version: version.to_string(),
            tags: image.repo_tags.join(", "),
            id: id.chars().take(12).collect(),
        });
    }

    print_stdout(images.with_title())?;
    Ok(())
}
