use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use url::Url;
use crate::fetcher::{ArtifactFetcher, DevCredentials};
use crate::models::version::Version;
use crate::runtime::error::RuntimeError;
use crate::runtime::progress::ProgressFollower;

const SITE_URL: &str = "https://developer.marklogic.com";
const HTTP_TIMEOUT_SECS: u64 = 3600;

#[derive(Deserialize, Debug)]
struct LoginResponse {
    status: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DownloadLocation {
    path: String,
}

/// Signs in to the developer site and streams the installer to disk,
/// hashing it on the way.
pub(crate) struct DeveloperSiteFetcher {
    client: reqwest::Client,
    site: Url,
    checksums: HashMap<String, String>,
}

impl DeveloperSiteFetcher {
    pub(crate) fn new(checksums: HashMap<String, String>) -> Result<Self, RuntimeError> {
        let site = Url::parse(SITE_URL).map_err(|e| RuntimeError::Other(format!("Invalid site url: {}", e)))?;
        DeveloperSiteFetcher::with_site(site, checksums)
    }

    pub(crate) fn with_site(site: Url, checksums: HashMap<String, String>) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(format!("mldock/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RuntimeError::Fetch(format!("failed to create HTTP client: {}", e)))?;

        Ok(DeveloperSiteFetcher { client, site, checksums })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RuntimeError> {
        resolve_location(&self.site, path)
    }

    async fn login(&self, version: &Version, credentials: &DevCredentials) -> Result<String, RuntimeError> {
        let asset = version.artifact_url();
        let form = [
            ("email", credentials.email.as_str()),
            ("password", credentials.password.as_str()),
            ("asset", asset.as_str()),
        ];

        let response = self.client.post(self.endpoint("/login")?).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(RuntimeError::Authentication(format!(
                "Got non-success trying to login: {}",
                response.status()
            )));
        }

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(session_cookie);

        let body: LoginResponse = response.json().await?;
        if let Some(status) = body.status.filter(|status| status != "ok") {
            return Err(RuntimeError::Authentication(status));
        }

        cookie.ok_or_else(|| RuntimeError::Authentication("no session cookie in login response".to_string()))
    }

    async fn download_location(&self, version: &Version, cookie: &str) -> Result<Url, RuntimeError> {
        let asset = version.artifact_url();
        let response = self
            .client
            .post(self.endpoint("/get-download-url")?)
            .header(COOKIE, cookie)
            .form(&[("download", asset.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RuntimeError::Fetch(format!(
                "Got non-success trying to get download url: {}",
                response.status()
            )));
        }

        let location: DownloadLocation = response.json().await?;
        resolve_location(&self.site, &location.path)
    }
}

/// `name=value` part of a `Set-Cookie` header.
fn session_cookie(header: &str) -> Option<String> {
    header
        .split(';')
        .next()
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .map(str::to_string)
}

fn resolve_location(site: &Url, path: &str) -> Result<Url, RuntimeError> {
    site.join(path)
        .map_err(|e| RuntimeError::Fetch(format!("Invalid download location {}: {}", path, e)))
}

fn percentage(downloaded: u64, total: Option<u64>) -> Option<u8> {
    total.map(|total| {
        if total == 0 {
            100
        } else {
            ((downloaded * 100) / total).min(100) as u8
        }
    })
}

fn verify_checksum(expected: Option<&str>, actual: &str) -> Result<(), RuntimeError> {
    match expected {
        Some(expected) if !expected.eq_ignore_ascii_case(actual) => Err(RuntimeError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl ArtifactFetcher for DeveloperSiteFetcher {
    async fn fetch(
        &self,
        version: &Version,
        credentials: &DevCredentials,
        target_dir: &Path,
        follower: &mut dyn ProgressFollower,
    ) -> Result<PathBuf, RuntimeError> {
        follower.step(&format!("downloading version {} to {}", version, target_dir.display()));

        follower.message("logging in");
        let cookie = self.login(version, credentials).await?;

        follower.message("getting download uri");
        let location = self.download_location(version, &cookie).await?;
        debug!("Downloading {} from {}", version, location);

        let asset = version.artifact_url();
        let response = self
            .client
            .post(location)
            .header(COOKIE, cookie.as_str())
            .form(&[("download", asset.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RuntimeError::Fetch(format!("download failed with status {}", response.status())));
        }

        tokio::fs::create_dir_all(target_dir).await?;
        let target = target_dir.join(version.artifact_filename());
        let partial = target.with_extension("part");

        let total = response.content_length();
        let mut downloaded: u64 = 0;
        let mut reported: Option<u8> = None;
        let mut hasher = Sha256::new();
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            let percent = percentage(downloaded, total);
            if percent.is_some() && percent != reported {
                reported = percent;
                if let Some(percent) = percent {
                    follower.message(&format!("{}%", percent));
                }
            }
        }

        file.flush().await?;
        drop(file);

        let actual = hex::encode(hasher.finalize());
        let expected = version.known_checksum(&self.checksums);
        if let Err(e) = verify_checksum(expected.as_deref(), &actual) {
            error!("Checksum mismatch for {}, discarding download", version);
            tokio::fs::remove_file(&partial).await?;
            return Err(e);
        }

        tokio::fs::rename(&partial, &target).await?;
        info!("Downloaded {} ({} bytes, sha256 {})", target.display(), downloaded, actual);
        follower.done();

        Ok(target)
    }
}
