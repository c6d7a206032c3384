mod developer;

use std::fmt;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::Deserialize;
use crate::models::version::Version;
use crate::runtime::error::RuntimeError;
use crate::runtime::progress::ProgressFollower;

pub(crate) use developer::DeveloperSiteFetcher;

/// Developer account used to download product installers.
#[derive(Clone, Deserialize, PartialEq)]
pub(crate) struct DevCredentials {
    pub(crate) email: String,
    pub(crate) password: String,
}

impl DevCredentials {
    pub(crate) fn new(email: &str, password: &str) -> Self {
        DevCredentials {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for DevCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevCredentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Downloads a version's artifact into a directory and returns the file path.
#[async_trait]
pub(crate) trait ArtifactFetcher: Send + Sync {
    async fn fetch(
        &self,
        version: &Version,
        credentials: &DevCredentials,
        target_dir: &Path,
        follower: &mut dyn ProgressFollower,
    ) -> Result<PathBuf, RuntimeError>;
}
