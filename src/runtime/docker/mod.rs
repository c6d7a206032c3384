mod container;
mod events;
mod images;

use async_trait::async_trait;
use bollard::Docker;
use chrono::{DateTime, Utc};
use crate::runtime::engine::{
    BuildEvent, BuildImageRequest, ContainerEngine, ContainerFilter, ContainerInspection, ContainerSummary,
    CreateContainerRequest, EngineStream, HealthEvent, ImageFilter, ImageRecord,
};
use crate::runtime::error::RuntimeError;

/// `ContainerEngine` backed by the local Docker daemon.
pub(crate) struct DockerEngine {
    docker: Docker,
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError { status_code, message } => RuntimeError::Engine {
                status: Some(status_code),
                message,
            },
            other => RuntimeError::Engine {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// Turns an engine 404 into the domain error built by `missing`.
fn not_found_as(err: bollard::errors::Error, missing: impl FnOnce() -> RuntimeError) -> RuntimeError {
    let err = RuntimeError::from(err);
    if err.is_not_found() {
        missing()
    } else {
        err
    }
}

pub(crate) fn connect() -> Result<DockerEngine, RuntimeError> {
    Docker::connect_with_local_defaults()
        .map(|docker| DockerEngine { docker })
        .map_err(|e| RuntimeError::Other(format!("Failed to connect to Docker: {}", e)))
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, RuntimeError> {
        images::list_images(&self.docker, filter).await
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageRecord, RuntimeError> {
        images::inspect_image(&self.docker, reference).await
    }

    async fn remove_image(&self, reference: &str) -> Result<(), RuntimeError> {
        images::remove_image(&self.docker, reference).await
    }

    fn build_image(&self, request: BuildImageRequest) -> EngineStream<'_, BuildEvent> {
        images::build_image(&self.docker, request)
    }

    async fn prune_images(&self) -> Result<(), RuntimeError> {
        images::prune_images(&self.docker).await
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), RuntimeError> {
        images::pull_image(&self.docker, image, tag).await
    }

    async fn tag_image(&self, source: &str, repository: &str, tag: &str) -> Result<(), RuntimeError> {
        images::tag_image(&self.docker, source, repository, tag).await
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
        container::list_containers(&self.docker, filter).await
    }

    async fn create_container(&self, request: &CreateContainerRequest) -> Result<String, RuntimeError> {
        container::create_container(&self.docker, request).await
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        container::start_container(&self.docker, id).await
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        container::stop_container(&self.docker, id).await
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        container::remove_container(&self.docker, id).await
    }

    async fn rename_container(&self, id: &str, name: &str) -> Result<(), RuntimeError> {
        container::rename_container(&self.docker, id, name).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, RuntimeError> {
        container::inspect_container(&self.docker, id).await
    }

    fn health_events(&self, container_id: &str, since: DateTime<Utc>, until: DateTime<Utc>) -> EngineStream<'static, HealthEvent> {
        events::health_events(&self.docker, container_id, since, until)
    }
}
