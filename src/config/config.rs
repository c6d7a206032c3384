use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;
use toml::de::Error as TomlError;
use crate::utils::labels::ResourceLabels;

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Contexts {
    pub(crate) contexts: HashMap<String, Config>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) current: bool,
    #[serde(skip_deserializing)]
    pub(crate) name: String,
    /// Label namespace of every managed image and container.
    pub(crate) domain: String,
    /// Image name prefix, also recorded as the `{domain}.repo` label.
    pub(crate) repo: String,
    pub(crate) temp_dir: String,
    /// Seconds to wait for a started host to become healthy.
    pub(crate) healthy_timeout: u64,
    /// Extra SHA-256 digests keyed by version (`9.0-4`).
    pub(crate) checksums: HashMap<String, String>,
}

impl Config {
    pub(crate) fn labels(&self) -> ResourceLabels {
        ResourceLabels::new(&self.domain, &self.repo)
    }

    pub(crate) fn temp_dir(&self) -> PathBuf {
        PathBuf::from(&self.temp_dir)
    }

    pub(crate) fn healthy_timeout(&self) -> Duration {
        Duration::from_secs(self.healthy_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            current: true,
            name: "default".to_string(),
            domain: "io.mldock".to_string(),
            repo: "mldock".to_string(),
            temp_dir: env::temp_dir().join("mldock").display().to_string(),
            healthy_timeout: 120,
            checksums: HashMap::new(),
        }
    }
}

pub(crate) fn get_config_dir() -> String {
    match env::var("MLDOCK_CONFIG_DIR") {
        Ok(variable) => variable,
        Err(_) => format!("{}/.config/mldock", env::var("HOME").unwrap_or_else(|_| ".".to_string())),
    }
}

pub(crate) fn read_contexts(contents: &str) -> Result<Contexts, TomlError> {
    toml::from_str(contents)
}

/// Context named `context_current`, or the one flagged `current` when no
/// name is given.
pub(crate) fn select_context(contexts: Contexts, context_current: &str) -> Option<Config> {
    let mut fallback = None;

    for (context_name, mut config) in contexts.contexts {
        config.name = context_name.clone();

        if context_name == context_current {
            debug!("Switch to context from {}", context_name);
            return Some(config);
        }

        if context_current.is_empty() && config.current {
            fallback = Some(config);
        }
    }

    if let Some(config) = &fallback {
        debug!("Switch to context {}", config.name);
    }

    fallback
}

pub(crate) fn load_config(context_current: &str) -> Config {
    let file = format!("{}/config.toml", get_config_dir());

    debug!("load config file {}", file);

    if let Ok(contents) = fs::read_to_string(&file) {
        match read_contexts(&contents) {
            Ok(contexts) => {
                if let Some(config) = select_context(contexts, context_current) {
                    return config;
                }
            }
            Err(err) => {
                error!("Error while deserializing the TOML file : {}", err);
            }
        }
    }

    debug!("Switch to default configuration");

    Config::default()
}
