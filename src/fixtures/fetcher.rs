use std::path::{Path, PathBuf};
use std::sync::Mutex;
use async_trait::async_trait;
use crate::fetcher::{ArtifactFetcher, DevCredentials};
use crate::models::version::Version;
use crate::runtime::error::RuntimeError;
use crate::runtime::progress::ProgressFollower;

/// Writes a small placeholder artifact instead of downloading one.
#[derive(Default)]
pub struct FakeFetcher {
    pub fetched: Mutex<Vec<(String, PathBuf)>>,
    pub reject_login: bool,
}

impl FakeFetcher {
    pub fn rejecting() -> Self {
        FakeFetcher { reject_login: true, ..Default::default() }
    }

    pub fn fetched(&self) -> Vec<(String, PathBuf)> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(
        &self,
        version: &Version,
        credentials: &DevCredentials,
        target_dir: &Path,
        follower: &mut dyn ProgressFollower,
    ) -> Result<PathBuf, RuntimeError> {
        follower.step(&format!("downloading version {} to {}", version, target_dir.display()));

        if self.reject_login {
            return Err(RuntimeError::Authentication(format!("bad password for {}", credentials.email)));
        }

        std::fs::create_dir_all(target_dir)?;
        let target = target_dir.join(version.artifact_filename());
        std::fs::write(&target, b"rpm")?;
        self.fetched.lock().unwrap().push((version.to_string(), target.clone()));

        follower.message("100%");
        follower.done();
        Ok(target)
    }
}
