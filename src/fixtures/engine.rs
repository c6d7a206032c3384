use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tokio::time::Instant;
use crate::runtime::engine::{
    BuildEvent, BuildImageRequest, ContainerEngine, ContainerFilter, ContainerInspection, ContainerSummary,
    ContextStream, CreateContainerRequest, EngineStream, HealthEvent, ImageFilter, ImageRecord,
};
use crate::runtime::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
}

/// A build request as the engine received it, context body included.
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    pub tag: String,
    pub dockerfile: String,
    pub build_args: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub context: Vec<u8>,
}

/// Drains a build context stream into one buffer.
pub async fn collect_body(mut body: ContextStream) -> Result<Vec<u8>, RuntimeError> {
    let mut collected = Vec::new();
    while let Some(chunk) = body.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(collected)
}

#[derive(Default)]
struct FakeState {
    images: Vec<ImageRecord>,
    containers: Vec<FakeContainer>,
    calls: Vec<String>,
    conflicts: HashMap<String, u32>,
    build_requests: Vec<RecordedBuild>,
    create_requests: Vec<CreateContainerRequest>,
    build_failure: Option<String>,
    start_failure: Option<String>,
    healthy_after: Option<Duration>,
    next_id: u32,
}

/// In-memory engine. Images and containers live in vectors, every call is
/// logged as `operation:argument`, and health turns `healthy` at a fixed
/// offset on the tokio clock.
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
    epoch: Instant,
}

fn matches_label(labels: &HashMap<String, String>, constraint: &str) -> bool {
    match constraint.split_once('=') {
        Some((key, value)) => labels.get(key).map(|v| v == value).unwrap_or(false),
        None => labels.contains_key(constraint),
    }
}

fn matches_reference(image: &ImageRecord, reference: &str) -> bool {
    image.id == reference
        || image.id.strip_prefix("sha256:") == Some(reference)
        || image.repo_tags.iter().any(|tag| tag == reference)
}

impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine {
            state: Arc::new(Mutex::new(FakeState::default())),
            epoch: Instant::now(),
        }
    }

    pub fn add_image(&self, id: &str, parent_id: Option<&str>, repo_tags: &[&str], labels: HashMap<String, String>) {
        self.state.lock().unwrap().images.push(ImageRecord {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            repo_tags: repo_tags.iter().map(|tag| tag.to_string()).collect(),
            labels,
        });
    }

    pub fn add_container(&self, id: &str, name: &str, image: &str, running: bool, labels: HashMap<String, String>) {
        self.state.lock().unwrap().containers.push(FakeContainer {
            id: id.to_string(),
            name: name.to_string(),
            image: image.to_string(),
            running,
            labels,
        });
    }

    /// The next `times` removals of `id` fail with a conflict.
    pub fn conflict_on(&self, id: &str, times: u32) {
        self.state.lock().unwrap().conflicts.insert(id.to_string(), times);
    }

    pub fn fail_builds(&self, detail: &str) {
        self.state.lock().unwrap().build_failure = Some(detail.to_string());
    }

    pub fn fail_starts(&self, detail: &str) {
        self.state.lock().unwrap().start_failure = Some(detail.to_string());
    }

    pub fn healthy_after(&self, delay: Duration) {
        self.state.lock().unwrap().healthy_after = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{}:", operation);
        self.calls().into_iter().filter(|call| call.starts_with(&prefix)).collect()
    }

    pub fn images(&self) -> Vec<ImageRecord> {
        self.state.lock().unwrap().images.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn build_requests(&self) -> Vec<RecordedBuild> {
        self.state.lock().unwrap().build_requests.clone()
    }

    pub fn create_requests(&self) -> Vec<CreateContainerRequest> {
        self.state.lock().unwrap().create_requests.clone()
    }

    fn record(&self, state: &mut FakeState, operation: &str, argument: &str) {
        state.calls.push(format!("{}:{}", operation, argument));
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{}{}", prefix, state.next_id)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "list_images", &filter.labels.join(","));

        Ok(state
            .images
            .iter()
            .filter(|image| filter.reference.as_deref().map(|r| matches_reference(image, r)).unwrap_or(true))
            .filter(|image| filter.labels.iter().all(|label| matches_label(&image.labels, label)))
            .cloned()
            .collect())
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageRecord, RuntimeError> {
        let state = self.state.lock().unwrap();
        state
            .images
            .iter()
            .find(|image| matches_reference(image, reference))
            .cloned()
            .ok_or_else(|| RuntimeError::ImageNotFound(reference.to_string()))
    }

    async fn remove_image(&self, reference: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "remove_image", reference);

        if let Some(remaining) = state.conflicts.get_mut(reference) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RuntimeError::ImageRemovalConflict(reference.to_string()));
            }
        }

        let index = state
            .images
            .iter()
            .position(|image| matches_reference(image, reference))
            .ok_or_else(|| RuntimeError::ImageNotFound(reference.to_string()))?;

        // removing by tag only drops the reference while others remain
        let by_tag = state.images[index].repo_tags.iter().any(|tag| tag == reference);
        if by_tag && state.images[index].repo_tags.len() > 1 {
            state.images[index].repo_tags.retain(|tag| tag != reference);
            return Ok(());
        }

        // by id, the engine refuses an image several repositories still point to
        if !by_tag && state.images[index].repo_tags.len() > 1 {
            return Err(RuntimeError::ImageRemovalConflict(reference.to_string()));
        }

        let id = state.images[index].id.clone();
        if state.containers.iter().any(|container| container.image == id) {
            return Err(RuntimeError::ImageRemovalConflict(reference.to_string()));
        }

        if state.images.iter().any(|image| image.parent_id.as_deref() == Some(id.as_str())) {
            return Err(RuntimeError::ImageRemovalConflict(reference.to_string()));
        }

        let removed = state.images.remove(index);

        // untagged parents left without children go with their child
        if let Some(parent) = removed.parent_id {
            let orphaned = state.images.iter().any(|image| image.id == parent && image.repo_tags.is_empty())
                && !state.images.iter().any(|image| image.parent_id.as_deref() == Some(parent.as_str()));
            if orphaned {
                state.images.retain(|image| image.id != parent);
            }
        }

        Ok(())
    }

    fn build_image(&self, request: BuildImageRequest) -> EngineStream<'_, BuildEvent> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "build_image", &request.tag);

        let BuildImageRequest { tag, dockerfile, build_args, labels, context } = request;
        let index = state.build_requests.len();
        state.build_requests.push(RecordedBuild {
            tag: tag.clone(),
            dockerfile: dockerfile.clone(),
            build_args,
            labels: labels.clone(),
            context: Vec::new(),
        });

        if let Some(detail) = state.build_failure.clone() {
            return Box::pin(stream::iter(vec![
                Ok(BuildEvent { message: Some("Step 1/2 : FROM base\n".to_string()), ..Default::default() }),
                Ok(BuildEvent { error: Some(detail), ..Default::default() }),
            ]));
        }

        let id = FakeEngine::next_id(&mut state, "sha256:built");
        for image in state.images.iter_mut() {
            image.repo_tags.retain(|existing| existing != &tag);
        }
        state.images.push(ImageRecord {
            id: id.clone(),
            parent_id: None,
            repo_tags: vec![tag.clone()],
            labels,
        });

        let events = vec![
            Ok(BuildEvent { message: Some(format!("Step 1/2 : FROM {}\n", dockerfile)), ..Default::default() }),
            Ok(BuildEvent { aux_id: Some(id), ..Default::default() }),
            Ok(BuildEvent { message: Some(format!("Successfully tagged {}\n", tag)), ..Default::default() }),
        ];

        // the engine reads the whole context before it reports anything
        let shared = Arc::clone(&self.state);
        Box::pin(
            stream::once(async move {
                match collect_body(context).await {
                    Ok(body) => {
                        shared.lock().unwrap().build_requests[index].context = body;
                        stream::iter(events)
                    }
                    Err(e) => stream::iter(vec![Err(e)]),
                }
            })
            .flatten(),
        )
    }

    async fn prune_images(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "prune_images", "dangling");
        state.images.retain(|image| !image.repo_tags.is_empty());
        Ok(())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        let reference = format!("{}:{}", image, tag);
        self.record(&mut state, "pull_image", &reference);

        if !state.images.iter().any(|record| record.repo_tags.contains(&reference)) {
            let id = FakeEngine::next_id(&mut state, "sha256:pulled");
            state.images.push(ImageRecord { id, parent_id: None, repo_tags: vec![reference], labels: HashMap::new() });
        }

        Ok(())
    }

    async fn tag_image(&self, source: &str, repository: &str, tag: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "tag_image", &format!("{}={}:{}", source, repository, tag));

        let image = state
            .images
            .iter_mut()
            .find(|image| matches_reference(image, source))
            .ok_or_else(|| RuntimeError::ImageNotFound(source.to_string()))?;
        image.repo_tags.push(format!("{}:{}", repository, tag));
        Ok(())
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "list_containers", filter.ancestor.as_deref().unwrap_or(""));

        let images = state.images.clone();
        Ok(state
            .containers
            .iter()
            .filter(|container| filter.all || container.running)
            .filter(|container| match &filter.ancestor {
                Some(ancestor) => {
                    container.image == *ancestor
                        || container.image.strip_prefix("sha256:") == Some(ancestor.as_str())
                        || images.iter().any(|image| image.id == container.image && matches_reference(image, ancestor))
                }
                None => true,
            })
            .map(|container| ContainerSummary { id: container.id.clone() })
            .collect())
    }

    async fn create_container(&self, request: &CreateContainerRequest) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "create_container", &request.image);

        let image = state
            .images
            .iter()
            .find(|image| matches_reference(image, &request.image))
            .map(|image| image.id.clone())
            .ok_or_else(|| RuntimeError::ImageNotFound(request.image.clone()))?;

        let id = FakeEngine::next_id(&mut state, "container");
        state.create_requests.push(request.clone());
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: id.clone(),
            image,
            running: false,
            labels: request.labels.clone(),
        });

        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "start_container", id);

        if let Some(detail) = state.start_failure.clone() {
            return Err(RuntimeError::Engine { status: Some(500), message: detail });
        }

        let container = state
            .containers
            .iter_mut()
            .find(|container| container.id == id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "stop_container", id);

        let container = state
            .containers
            .iter_mut()
            .find(|container| container.id == id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "remove_container", id);

        match state.containers.iter().position(|container| container.id == id) {
            Some(index) if state.containers[index].running => Err(RuntimeError::Engine {
                status: Some(409),
                message: format!("cannot remove running container {}", id),
            }),
            Some(index) => {
                state.containers.remove(index);
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(id.to_string())),
        }
    }

    async fn rename_container(&self, id: &str, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "rename_container", &format!("{}={}", id, name));

        let container = state
            .containers
            .iter_mut()
            .find(|container| container.id == id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;
        container.name = name.to_string();
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, RuntimeError> {
        let state = self.state.lock().unwrap();
        let container = state
            .containers
            .iter()
            .find(|container| container.id == id || container.name == id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))?;

        let port_bindings = HashMap::from([
            ("8001/tcp".to_string(), vec!["32769".to_string()]),
            ("8000/tcp".to_string(), vec!["32768".to_string()]),
            ("7997/tcp".to_string(), vec![]),
        ]);

        Ok(ContainerInspection {
            id: container.id.clone(),
            name: container.name.clone(),
            running: container.running,
            image: container.image.clone(),
            labels: container.labels.clone(),
            port_bindings,
            raw: serde_json::json!({ "Id": container.id, "Name": format!("/{}", container.name) }),
        })
    }

    fn health_events(&self, container_id: &str, _since: DateTime<Utc>, _until: DateTime<Utc>) -> EngineStream<'static, HealthEvent> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, "health_events", container_id);

        match state.healthy_after {
            Some(delay) => {
                let deadline = self.epoch + delay;
                let event = HealthEvent { container_id: container_id.to_string(), status: "healthy".to_string() };
                Box::pin(stream::once(async move {
                    tokio::time::sleep_until(deadline).await;
                    Ok(event)
                }))
            }
            None => Box::pin(stream::pending()),
        }
    }
}
