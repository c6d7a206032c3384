use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use crate::config::config::Config;
use crate::fetcher::{ArtifactFetcher, DevCredentials, DeveloperSiteFetcher};
use crate::models::health_check::HealthCheckSpec;
use crate::models::version::Version;
use crate::runtime::build::{ArtifactSource, BuildOptions, BuildPipeline};
use crate::runtime::docker;
use crate::runtime::engine::{ImageFilter, ImageRecord, SharedEngine};
use crate::runtime::error::RuntimeError;
use crate::runtime::lifecycle::{ContainerLifecycle, HostRef};
use crate::runtime::progress::ProgressFollower;
use crate::runtime::reaper::ResourceReaper;
use crate::utils::labels::ResourceLabels;

/// What `run_host` needs to get a healthy host for a version.
#[derive(Debug, Clone)]
pub(crate) struct RunHostOptions {
    pub(crate) version: Version,
    /// Only used when the version still has to be built.
    pub(crate) source: Option<ArtifactSource>,
    pub(crate) container_name: Option<String>,
    pub(crate) base_image: Option<String>,
    pub(crate) health_check: HealthCheckSpec,
    pub(crate) healthy_timeout: Duration,
    pub(crate) volume: Option<String>,
}

impl RunHostOptions {
    pub(crate) fn new(version: Version, healthy_timeout: Duration) -> Self {
        RunHostOptions {
            version,
            source: None,
            container_name: None,
            base_image: None,
            health_check: HealthCheckSpec::default(),
            healthy_timeout,
            volume: None,
        }
    }
}

/// Entry point for every version and host operation of one repo.
pub(crate) struct HostManager {
    engine: SharedEngine,
    fetcher: Arc<dyn ArtifactFetcher>,
    labels: ResourceLabels,
    pipeline: BuildPipeline,
    lifecycle: ContainerLifecycle,
    reaper: ResourceReaper,
}

impl HostManager {
    pub(crate) fn new(
        engine: SharedEngine,
        fetcher: Arc<dyn ArtifactFetcher>,
        labels: ResourceLabels,
        temp_dir: PathBuf,
        checksums: HashMap<String, String>,
    ) -> Self {
        HostManager {
            pipeline: BuildPipeline::new(engine.clone(), fetcher.clone(), labels.clone(), temp_dir, checksums),
            lifecycle: ContainerLifecycle::new(engine.clone(), labels.clone()),
            reaper: ResourceReaper::new(engine.clone(), labels.clone()),
            engine,
            fetcher,
            labels,
        }
    }

    /// Connects to the local Docker daemon with the context's settings.
    pub(crate) fn connect(config: &Config) -> Result<Self, RuntimeError> {
        let engine: SharedEngine = Arc::new(docker::connect()?);
        let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(DeveloperSiteFetcher::new(config.checksums.clone())?);

        Ok(HostManager::new(engine, fetcher, config.labels(), config.temp_dir(), config.checksums.clone()))
    }

    pub(crate) fn tag_for_version(&self, version: &Version) -> String {
        self.labels.image_tag(version)
    }

    pub(crate) async fn inspect_version(&self, version: &Version) -> Result<ImageRecord, RuntimeError> {
        self.engine.inspect_image(&self.tag_for_version(version)).await
    }

    /// Managed product images, newest version first.
    pub(crate) async fn list_versions(&self) -> Result<Vec<(Version, ImageRecord)>, RuntimeError> {
        let filter = ImageFilter {
            reference: None,
            labels: vec![format!("{}={}", self.labels.repo_key(), self.labels.repo), self.labels.version_key()],
        };

        let mut versions: Vec<(Version, ImageRecord)> = self
            .engine
            .list_images(&filter)
            .await?
            .into_iter()
            .filter_map(|image| {
                let label = image.labels.get(&self.labels.version_key())?;
                match Version::parse(&dotted_to_identifier(label)) {
                    Ok(version) => Some((version, image)),
                    Err(e) => {
                        debug!("Skipping image {} with version label {}: {}", image.id, label, e);
                        None
                    }
                }
            })
            .collect();

        versions.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(versions)
    }

    pub(crate) async fn build_version(
        &self,
        version: &Version,
        source: &ArtifactSource,
        options: &BuildOptions,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        self.pipeline.build_version(version, source, options, follower).await
    }

    /// Downloads the version's artifact into `dir` without building anything.
    pub(crate) async fn download_version(
        &self,
        version: &Version,
        dir: &Path,
        credentials: &DevCredentials,
        overwrite: bool,
        follower: &mut dyn ProgressFollower,
    ) -> Result<PathBuf, RuntimeError> {
        let target = dir.join(version.artifact_filename());
        if target.exists() && !overwrite {
            return Err(RuntimeError::FileExists(target.display().to_string()));
        }

        let path = self.fetcher.fetch(version, credentials, dir, follower).await?;
        Ok(path.canonicalize()?)
    }

    pub(crate) async fn tag_version(&self, version: &Version, repository: &str, tag: &str) -> Result<(), RuntimeError> {
        let image = self.inspect_version(version).await?;
        self.engine.tag_image(&image.id, repository, tag).await
    }

    pub(crate) async fn remove_version(&self, version: &Version, follower: &mut dyn ProgressFollower) -> Result<usize, RuntimeError> {
        self.reaper.remove_all(Some(version), follower).await
    }

    pub(crate) async fn remove_all(&self, follower: &mut dyn ProgressFollower) -> Result<usize, RuntimeError> {
        self.reaper.remove_all(None, follower).await
    }

    pub(crate) async fn create_host_container(
        &self,
        version: &Version,
        name: Option<&str>,
        health_check: Option<&HealthCheckSpec>,
        volume: Option<&str>,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        let image = self.tag_for_version(version);
        self.lifecycle.recreate(name, &image, version, health_check, volume, follower).await
    }

    pub(crate) async fn start_host(&self, id: &str) -> Result<HostRef, RuntimeError> {
        self.lifecycle.start(id).await
    }

    pub(crate) async fn start_host_healthy(&self, id: &str, timeout: Duration, follower: &mut dyn ProgressFollower) -> Result<HostRef, RuntimeError> {
        self.lifecycle.start_and_wait(id, timeout, follower).await
    }

    pub(crate) async fn inspect_host(&self, id: &str) -> Result<HostRef, RuntimeError> {
        self.lifecycle.inspect(id).await
    }

    /// Builds the version if needed, reuses or creates the named container
    /// and waits until it is healthy.
    pub(crate) async fn run_host(&self, options: &RunHostOptions, follower: &mut dyn ProgressFollower) -> Result<HostRef, RuntimeError> {
        let version = &options.version;

        if !self.pipeline.is_present(version).await? {
            let source = options
                .source
                .as_ref()
                .ok_or_else(|| RuntimeError::MissingSource(version.to_string()))?;
            let build_options = BuildOptions {
                overwrite: false,
                base_image: options.base_image.clone(),
            };
            self.pipeline.build_version(version, source, &build_options, follower).await?;
        }

        let image = self.inspect_version(version).await?;

        let existing = match options.container_name.as_deref() {
            Some(name) => self.lifecycle.find(name).await?,
            None => None,
        };

        let container_id = match existing {
            Some(host) if host.image != image.id => {
                return Err(RuntimeError::VersionMismatch {
                    container: host.name,
                    expected: image.id,
                    actual: host.image,
                });
            }
            Some(host) if host.running => {
                info!("Container {} already runs version {}", host.name, version);
                return Ok(host);
            }
            Some(host) => host.id,
            None => {
                self.create_host_container(
                    version,
                    options.container_name.as_deref(),
                    Some(&options.health_check),
                    options.volume.as_deref(),
                    follower,
                )
                .await?
            }
        };

        self.start_host_healthy(&container_id, options.healthy_timeout, follower).await
    }
}

// `9.0.4` version labels back to `9.0-4`
fn dotted_to_identifier(label: &str) -> String {
    let mut parts = label.splitn(3, '.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), Some(rest)) => format!("{}.{}-{}", major, minor, rest),
        _ => label.to_string(),
    }
}
