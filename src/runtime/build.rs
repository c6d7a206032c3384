use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::fetcher::{ArtifactFetcher, DevCredentials};
use crate::models::version::Version;
use crate::runtime::context::BuildContext;
use crate::runtime::engine::{BuildImageRequest, ImageFilter, SharedEngine};
use crate::runtime::error::RuntimeError;
use crate::runtime::progress::{follow_build_stream, ProgressFollower};
use crate::runtime::templates;
use crate::utils::labels::ResourceLabels;

const SCRIPT_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Where the product installer comes from.
#[derive(Debug, Clone)]
pub(crate) enum ArtifactSource {
    LocalFile(PathBuf),
    Credentials(DevCredentials),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BuildOptions {
    pub(crate) overwrite: bool,
    /// Replaces the tier's default OS image.
    pub(crate) base_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum BuildState {
    CheckPresence,
    AlreadyPresent,
    EnsureBase,
    BuildProduct { os_image: String },
    Prune,
    Done,
}

/// One image build: target tag, the files taken from the context directory
/// and the build args. Args without a value are not sent.
struct BuildSpec {
    image_name: String,
    friendly_name: String,
    files: Vec<String>,
    build_args: HashMap<String, Option<String>>,
    version: Option<Version>,
}

/// `image:tag` split for pulls, `latest` when no tag is given.
pub(crate) fn split_image_reference(reference: &str) -> (String, String) {
    match reference.rsplit_once(':') {
        Some((image, tag)) if !tag.contains('/') => (image.to_string(), tag.to_string()),
        _ => (reference.to_string(), "latest".to_string()),
    }
}

fn file_name(path: &Path) -> Result<String, RuntimeError> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| RuntimeError::SourceNotFound(path.display().to_string()))
}

pub(crate) struct BuildPipeline {
    engine: SharedEngine,
    fetcher: Arc<dyn ArtifactFetcher>,
    labels: ResourceLabels,
    temp_dir: PathBuf,
    checksums: HashMap<String, String>,
}

impl BuildPipeline {
    pub(crate) fn new(
        engine: SharedEngine,
        fetcher: Arc<dyn ArtifactFetcher>,
        labels: ResourceLabels,
        temp_dir: PathBuf,
        checksums: HashMap<String, String>,
    ) -> Self {
        BuildPipeline { engine, fetcher, labels, temp_dir, checksums }
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, RuntimeError> {
        let filter = ImageFilter {
            reference: Some(reference.to_string()),
            labels: vec![],
        };
        Ok(!self.engine.list_images(&filter).await?.is_empty())
    }

    pub(crate) async fn is_present(&self, version: &Version) -> Result<bool, RuntimeError> {
        self.image_exists(&self.labels.image_tag(version)).await
    }

    /// Builds the product image for `version` and returns its tag.
    pub(crate) async fn build_version(
        &self,
        version: &Version,
        source: &ArtifactSource,
        options: &BuildOptions,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        if let ArtifactSource::LocalFile(path) = source {
            if !path.is_file() {
                return Err(RuntimeError::SourceNotFound(path.display().to_string()));
            }
        }

        let image_tag = self.labels.image_tag(version);
        let mut state = BuildState::CheckPresence;

        loop {
            debug!("Build {} in state {:?}", version, state);

            state = match state {
                BuildState::CheckPresence => {
                    if !self.is_present(version).await? {
                        BuildState::EnsureBase
                    } else if options.overwrite {
                        info!("Version {} is present, rebuilding", version);
                        BuildState::EnsureBase
                    } else {
                        BuildState::AlreadyPresent
                    }
                }
                BuildState::AlreadyPresent => return Err(RuntimeError::AlreadyPresent(version.to_string())),
                BuildState::EnsureBase => {
                    let os_image = self.ensure_base_image(version, options.base_image.as_deref(), follower).await?;
                    BuildState::BuildProduct { os_image }
                }
                BuildState::BuildProduct { os_image } => {
                    self.build_product(version, source, &os_image, follower).await?;
                    BuildState::Prune
                }
                BuildState::Prune => {
                    self.prune(follower).await;
                    BuildState::Done
                }
                BuildState::Done => return Ok(image_tag),
            };
        }
    }

    /// Makes sure the OS image for the version's tier exists and returns its tag.
    pub(crate) async fn ensure_base_image(
        &self,
        version: &Version,
        base_override: Option<&str>,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        let os_image = self.labels.os_image_tag(version);
        if self.image_exists(&os_image).await? {
            debug!("Using existing OS image {}", os_image);
            return Ok(os_image);
        }
        self.build_base_image(version, base_override, follower).await
    }

    async fn build_base_image(
        &self,
        version: &Version,
        base_override: Option<&str>,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        let tier = version.compatibility_tier();
        let base = base_override.unwrap_or_else(|| tier.default_base_image());
        let os_image = self.labels.os_image_tag(version);

        follower.step(&format!("pulling {}", base));
        let (image, tag) = split_image_reference(base);
        self.engine.pull_image(&image, &tag).await?;
        follower.done();

        let mut context = BuildContext::stage(&self.temp_dir, &os_image)?;
        context.add_file("Dockerfile", templates::os_dockerfile(tier).as_bytes(), FILE_MODE)?;
        context.add_file(templates::RUN_SCRIPT_NAME, templates::RUN_SCRIPT.as_bytes(), SCRIPT_MODE)?;
        context.add_file(templates::DOWNLOAD_SCRIPT_NAME, templates::DOWNLOAD_SCRIPT.as_bytes(), SCRIPT_MODE)?;

        let spec = BuildSpec {
            image_name: os_image.clone(),
            friendly_name: format!("{}-compat OS image", tier),
            files: vec![],
            build_args: HashMap::from([("osImage".to_string(), Some(base.to_string()))]),
            version: None,
        };

        self.build_from_context(&spec, &context, follower).await?;
        self.discard(context);

        Ok(os_image)
    }

    /// Builds the product image on top of `os_image` and returns the image id.
    pub(crate) async fn build_product(
        &self,
        version: &Version,
        source: &ArtifactSource,
        os_image: &str,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        let (mut context, artifact, credentials) = match source {
            ArtifactSource::LocalFile(path) => {
                let path = path.canonicalize()?;
                let dir = path
                    .parent()
                    .ok_or_else(|| RuntimeError::SourceNotFound(path.display().to_string()))?;
                (BuildContext::in_directory(dir), file_name(&path)?, None)
            }
            ArtifactSource::Credentials(credentials) => {
                let context = BuildContext::stage(&self.temp_dir, &self.labels.image_tag(version))?;
                let path = self.fetcher.fetch(version, credentials, context.dir(), follower).await?;
                (context, file_name(&path)?, Some(credentials))
            }
        };

        context.add_file("Dockerfile", templates::PRODUCT_DOCKERFILE.as_bytes(), FILE_MODE)?;
        context.add_file(templates::RUN_SCRIPT_NAME, templates::RUN_SCRIPT.as_bytes(), SCRIPT_MODE)?;
        context.add_file(templates::DOWNLOAD_SCRIPT_NAME, templates::DOWNLOAD_SCRIPT.as_bytes(), SCRIPT_MODE)?;

        let build_args = HashMap::from([
            ("version".to_string(), Some(version.to_dot_string())),
            ("sha".to_string(), version.known_checksum(&self.checksums)),
            ("osImage".to_string(), Some(os_image.to_string())),
            ("rpmFile".to_string(), Some(artifact.clone())),
            ("email".to_string(), credentials.map(|c| c.email.clone())),
            ("password".to_string(), credentials.map(|c| c.password.clone())),
            ("rawUrl".to_string(), Some(version.artifact_url())),
        ]);

        let spec = BuildSpec {
            image_name: self.labels.image_tag(version),
            friendly_name: format!("MarkLogic {}", version),
            files: vec![artifact],
            build_args,
            version: Some(*version),
        };

        let id = self.build_from_context(&spec, &context, follower).await?;
        self.discard(context);

        info!("Built {} as {}", spec.image_name, id);
        Ok(id)
    }

    async fn build_from_context(
        &self,
        spec: &BuildSpec,
        context: &BuildContext,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        follower.step(&format!("building {}", spec.friendly_name));

        let ignored = context.ignored_files(&spec.files)?;
        if !ignored.is_empty() {
            debug!("Leaving {} files out of the {} context: {:?}", ignored.len(), spec.image_name, ignored);
        }

        let request = BuildImageRequest {
            tag: spec.image_name.clone(),
            dockerfile: "Dockerfile".to_string(),
            build_args: spec
                .build_args
                .iter()
                .filter_map(|(key, value)| value.as_ref().map(|value| (key.clone(), value.clone())))
                .collect(),
            labels: self.labels.for_resource(spec.version.as_ref()),
            context: context.archive(&spec.files)?,
        };

        let stream = self.engine.build_image(request);
        let result = follow_build_stream(stream, follower).await;

        follower.done();
        result
    }

    async fn prune(&self, follower: &mut dyn ProgressFollower) {
        follower.step("pruning images");
        if let Err(e) = self.engine.prune_images().await {
            debug!("Image prune failed: {}", e);
        }
        follower.done();
    }

    fn discard(&self, context: BuildContext) {
        if let Err(e) = context.cleanup() {
            error!("Unable to remove build context: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;
    use crate::fixtures::engine::FakeEngine;
    use crate::fixtures::fetcher::FakeFetcher;
    use crate::fixtures::follower::RecordingFollower;

    struct Setup {
        engine: Arc<FakeEngine>,
        fetcher: Arc<FakeFetcher>,
        pipeline: BuildPipeline,
        temp_root: TempDir,
        artifacts: TempDir,
    }

    fn setup_with(fetcher: FakeFetcher) -> Setup {
        let engine = Arc::new(FakeEngine::new());
        let fetcher = Arc::new(fetcher);
        let temp_root = TempDir::new("mldock-build").unwrap();
        let artifacts = TempDir::new("mldock-artifacts").unwrap();
        let pipeline = BuildPipeline::new(
            engine.clone(),
            fetcher.clone(),
            ResourceLabels::new("io.mldock", "mldock"),
            temp_root.path().to_path_buf(),
            HashMap::new(),
        );
        Setup { engine, fetcher, pipeline, temp_root, artifacts }
    }

    fn setup() -> Setup {
        setup_with(FakeFetcher::default())
    }

    fn local_artifact(setup: &Setup, version: &Version) -> ArtifactSource {
        let path = setup.artifacts.path().join(version.artifact_filename());
        fs::write(&path, b"rpm").unwrap();
        ArtifactSource::LocalFile(path)
    }

    fn staged_dirs(setup: &Setup) -> usize {
        fs::read_dir(setup.temp_root.path()).unwrap().count()
    }

    fn archive_names(archive: &[u8]) -> Vec<String> {
        let mut names: Vec<String> = tar::Archive::new(archive)
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_split_image_reference() {
        assert_eq!(split_image_reference("centos:centos7"), ("centos".to_string(), "centos7".to_string()));
        assert_eq!(split_image_reference("rockylinux"), ("rockylinux".to_string(), "latest".to_string()));
        assert_eq!(
            split_image_reference("registry:5000/rockylinux"),
            ("registry:5000/rockylinux".to_string(), "latest".to_string())
        );
    }

    #[tokio::test]
    async fn test_build_from_local_file() {
        let setup = setup();
        let version = Version::parse("9.0-4").unwrap();
        let source = local_artifact(&setup, &version);
        let mut follower = RecordingFollower::default();

        let tag = setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut follower)
            .await
            .unwrap();

        assert_eq!(tag, "mldock-marklogic:9.0.4");
        assert_eq!(
            setup.engine.calls().into_iter().filter(|call| !call.starts_with("list_images")).collect::<Vec<_>>(),
            vec![
                "pull_image:centos:centos7",
                "build_image:mldock-os:centos7-compat",
                "build_image:mldock-marklogic:9.0.4",
                "prune_images:dangling",
            ]
        );

        let requests = setup.engine.build_requests();
        let os = &requests[0];
        assert_eq!(os.build_args.get("osImage"), Some(&"centos:centos7".to_string()));
        assert!(!os.labels.contains_key("io.mldock.version"));
        assert_eq!(archive_names(&os.context), vec!["Dockerfile", "mldownload.sh", "mlrun.sh"]);

        let product = &requests[1];
        assert_eq!(product.build_args.get("version"), Some(&"9.0.4".to_string()));
        assert_eq!(product.build_args.get("osImage"), Some(&"mldock-os:centos7-compat".to_string()));
        assert_eq!(product.build_args.get("rpmFile"), Some(&"MarkLogic-9.0-4.x86_64.rpm".to_string()));
        assert_eq!(
            product.build_args.get("rawUrl"),
            Some(&"https://developer.marklogic.com/download/binaries/9.0/MarkLogic-9.0-4.x86_64.rpm".to_string())
        );
        assert!(!product.build_args.contains_key("email"));
        assert!(!product.build_args.contains_key("sha"));
        assert_eq!(product.labels.get("io.mldock.version"), Some(&"9.0.4".to_string()));
        assert_eq!(
            archive_names(&product.context),
            vec!["Dockerfile", "MarkLogic-9.0-4.x86_64.rpm", "mldownload.sh", "mlrun.sh"]
        );

        // the artifact directory is left as it was
        assert_eq!(fs::read_dir(setup.artifacts.path()).unwrap().count(), 1);
        assert_eq!(staged_dirs(&setup), 0);
        assert!(follower.steps().contains(&"building MarkLogic 9.0-4".to_string()));
        assert_eq!(follower.calls.last(), Some(&(None, None)));
    }

    #[tokio::test]
    async fn test_existing_os_image_is_reused() {
        let setup = setup();
        setup.engine.add_image("sha256:os", None, &["mldock-os:centos7-compat"], HashMap::new());
        let version = Version::parse("9.0-4").unwrap();
        let source = local_artifact(&setup, &version);

        setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut RecordingFollower::default())
            .await
            .unwrap();

        assert!(setup.engine.calls_to("pull_image").is_empty());
        assert_eq!(setup.engine.calls_to("build_image"), vec!["build_image:mldock-marklogic:9.0.4"]);
    }

    #[tokio::test]
    async fn test_present_version_is_rejected() {
        let setup = setup();
        setup.engine.add_image("sha256:built", None, &["mldock-marklogic:9.0.4"], HashMap::new());
        let version = Version::parse("9.0-4").unwrap();
        let source = local_artifact(&setup, &version);

        let result = setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut RecordingFollower::default())
            .await;

        assert!(matches!(result, Err(RuntimeError::AlreadyPresent(v)) if v == "9.0-4"));
        assert!(setup.engine.calls().iter().all(|call| call.starts_with("list_images")));
    }

    #[tokio::test]
    async fn test_overwrite_rebuilds() {
        let setup = setup();
        setup.engine.add_image("sha256:old", None, &["mldock-marklogic:9.0.4"], HashMap::new());
        setup.engine.add_image("sha256:os", None, &["mldock-os:centos7-compat"], HashMap::new());
        let version = Version::parse("9.0-4").unwrap();
        let source = local_artifact(&setup, &version);
        let options = BuildOptions { overwrite: true, base_image: None };

        setup
            .pipeline
            .build_version(&version, &source, &options, &mut RecordingFollower::default())
            .await
            .unwrap();

        assert_eq!(setup.engine.calls_to("build_image"), vec!["build_image:mldock-marklogic:9.0.4"]);
        let tagged: Vec<_> = setup
            .engine
            .images()
            .into_iter()
            .filter(|image| image.repo_tags.contains(&"mldock-marklogic:9.0.4".to_string()))
            .collect();
        assert_eq!(tagged.len(), 1);
        assert_ne!(tagged[0].id, "sha256:old");
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_before_engine_calls() {
        let setup = setup();
        let version = Version::parse("9.0-4").unwrap();
        let source = ArtifactSource::LocalFile(setup.artifacts.path().join("missing.rpm"));

        let result = setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut RecordingFollower::default())
            .await;

        assert!(matches!(result, Err(RuntimeError::SourceNotFound(_))));
        assert!(setup.engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_build_with_credentials() {
        let setup = setup();
        let version = Version::parse("10.0-1").unwrap();
        let source = ArtifactSource::Credentials(DevCredentials::new("dev@example.com", "secret"));

        setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut RecordingFollower::default())
            .await
            .unwrap();

        let requests = setup.engine.build_requests();
        let product = &requests[1];
        assert_eq!(product.build_args.get("email"), Some(&"dev@example.com".to_string()));
        assert_eq!(product.build_args.get("password"), Some(&"secret".to_string()));
        assert_eq!(product.build_args.get("rpmFile"), Some(&"MarkLogic-10.0-1.x86_64.rpm".to_string()));
        assert!(archive_names(&product.context).contains(&"MarkLogic-10.0-1.x86_64.rpm".to_string()));
        assert_eq!(setup.fetcher.fetched().len(), 1);
        assert_eq!(staged_dirs(&setup), 0);
    }

    #[tokio::test]
    async fn test_failed_build_removes_staged_context() {
        let setup = setup();
        setup.engine.fail_builds("yum failed");
        let version = Version::parse("9.0-4").unwrap();
        let source = local_artifact(&setup, &version);

        let mut follower = RecordingFollower::default();

        let result = setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut follower)
            .await;

        assert!(matches!(result, Err(RuntimeError::BuildStreamError(detail)) if detail == "yum failed"));
        assert_eq!(staged_dirs(&setup), 0);
        assert!(setup.engine.calls_to("prune_images").is_empty());
        // the failed building step is closed
        assert_eq!(follower.calls.last(), Some(&(None, None)));
    }

    #[tokio::test]
    async fn test_failed_download_removes_staged_context() {
        let setup = setup_with(FakeFetcher::rejecting());
        setup.engine.add_image("sha256:os", None, &["mldock-os:centos7-compat"], HashMap::new());
        let version = Version::parse("9.0-4").unwrap();
        let source = ArtifactSource::Credentials(DevCredentials::new("dev@example.com", "wrong"));

        let result = setup
            .pipeline
            .build_version(&version, &source, &BuildOptions::default(), &mut RecordingFollower::default())
            .await;

        assert!(matches!(result, Err(RuntimeError::Authentication(_))));
        assert_eq!(staged_dirs(&setup), 0);
        assert!(setup.engine.calls_to("build_image").is_empty());
    }

    #[tokio::test]
    async fn test_base_image_override() {
        let setup = setup();
        let version = Version::parse("11.0-0").unwrap();
        let mut follower = RecordingFollower::default();

        let os_image = setup
            .pipeline
            .ensure_base_image(&version, Some("rockylinux:8.9"), &mut follower)
            .await
            .unwrap();

        assert_eq!(os_image, "mldock-os:rocky8-compat");
        assert_eq!(setup.engine.calls_to("pull_image"), vec!["pull_image:rockylinux:8.9"]);
        let requests = setup.engine.build_requests();
        assert_eq!(requests[0].build_args.get("osImage"), Some(&"rockylinux:8.9".to_string()));

        // second call finds the image
        setup.pipeline.ensure_base_image(&version, None, &mut follower).await.unwrap();
        assert_eq!(setup.engine.build_requests().len(), 1);
    }
}
