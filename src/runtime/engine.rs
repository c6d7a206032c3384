use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use crate::models::health_check::HealthCheckSpec;
use crate::runtime::error::RuntimeError;

pub(crate) type EngineStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T, RuntimeError>> + Send + 'a>>;
pub(crate) type SharedEngine = Arc<dyn ContainerEngine>;
pub(crate) type ContextStream = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

#[derive(Debug, Clone, Default)]
pub(crate) struct ImageFilter {
    pub(crate) reference: Option<String>,
    /// `key=value` or bare `key` label constraints, all of which must match.
    pub(crate) labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImageRecord {
    pub(crate) id: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) repo_tags: Vec<String>,
    pub(crate) labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ContainerFilter {
    pub(crate) ancestor: Option<String>,
    pub(crate) all: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct ContainerSummary {
    pub(crate) id: String,
}

pub(crate) struct BuildImageRequest {
    pub(crate) tag: String,
    pub(crate) dockerfile: String,
    pub(crate) build_args: HashMap<String, String>,
    pub(crate) labels: HashMap<String, String>,
    /// Tar archive of the build context, produced while the engine reads it.
    pub(crate) context: ContextStream,
}

/// One decoded entry of the engine's build progress stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BuildEvent {
    pub(crate) message: Option<String>,
    pub(crate) aux_id: Option<String>,
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct CreateContainerRequest {
    pub(crate) image: String,
    pub(crate) labels: HashMap<String, String>,
    pub(crate) health_check: Option<HealthCheckSpec>,
    /// Named volume mounted on the product data directory.
    pub(crate) volume: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ContainerInspection {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) running: bool,
    pub(crate) image: String,
    pub(crate) labels: HashMap<String, String>,
    /// Exposed port key (`8001/tcp`) to the host ports bound to it.
    pub(crate) port_bindings: HashMap<String, Vec<String>>,
    pub(crate) raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HealthEvent {
    pub(crate) container_id: String,
    pub(crate) status: String,
}

impl HealthEvent {
    pub(crate) fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[async_trait]
pub(crate) trait ContainerEngine: Send + Sync {
    async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, RuntimeError>;
    async fn inspect_image(&self, reference: &str) -> Result<ImageRecord, RuntimeError>;
    /// Removes by id, or drops a single tag when given a `repo:tag`.
    /// Fails with `ImageRemovalConflict` when the engine reports the image in use
    /// or still referenced by several repositories.
    async fn remove_image(&self, reference: &str) -> Result<(), RuntimeError>;
    fn build_image(&self, request: BuildImageRequest) -> EngineStream<'_, BuildEvent>;
    async fn prune_images(&self) -> Result<(), RuntimeError>;
    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), RuntimeError>;
    async fn tag_image(&self, source: &str, repository: &str, tag: &str) -> Result<(), RuntimeError>;

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError>;
    async fn create_container(&self, request: &CreateContainerRequest) -> Result<String, RuntimeError>;
    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;
    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;
    async fn rename_container(&self, id: &str, name: &str) -> Result<(), RuntimeError>;
    /// A missing container is reported as `ContainerNotFound`.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, RuntimeError>;

    /// Health status transitions of one container between `since` and `until`.
    fn health_events(&self, container_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> EngineStream<'static, HealthEvent>;
}
