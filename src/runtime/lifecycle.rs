use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use tokio::time::Instant;
use crate::models::health_check::HealthCheckSpec;
use crate::models::version::Version;
use crate::runtime::engine::{ContainerInspection, CreateContainerRequest, SharedEngine};
use crate::runtime::error::RuntimeError;
use crate::runtime::progress::ProgressFollower;
use crate::utils::labels::ResourceLabels;

/// Product data directory, the mount point for named volumes.
pub(crate) const DATA_DIR: &str = "/var/opt/MarkLogic";
/// Port of the product's admin interface.
pub(crate) const ADMIN_PORT: &str = "8001";
pub(crate) const POLL_WINDOW: Duration = Duration::from_secs(1);

/// Normalized view of an inspected container.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct HostRef {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) running: bool,
    pub(crate) image: String,
    pub(crate) labels: HashMap<String, String>,
    /// Container port (without protocol) to the first host port bound to it.
    pub(crate) ports: BTreeMap<String, u16>,
    pub(crate) raw: serde_json::Value,
}

impl HostRef {
    fn from_inspection(inspection: ContainerInspection) -> Self {
        let ports = inspection
            .port_bindings
            .iter()
            .filter_map(|(key, host_ports)| {
                let port = key.split('/').next().unwrap_or(key).to_string();
                let host_port = host_ports.first()?.parse::<u16>().ok()?;
                Some((port, host_port))
            })
            .collect();

        HostRef {
            id: inspection.id,
            name: inspection.name,
            running: inspection.running,
            image: inspection.image,
            labels: inspection.labels,
            ports,
            raw: inspection.raw,
        }
    }

    pub(crate) fn port(&self, container_port: &str) -> Option<u16> {
        self.ports.get(container_port).copied()
    }
}

pub(crate) struct ContainerLifecycle {
    engine: SharedEngine,
    labels: ResourceLabels,
    poll_window: Duration,
}

impl ContainerLifecycle {
    pub(crate) fn new(engine: SharedEngine, labels: ResourceLabels) -> Self {
        ContainerLifecycle {
            engine,
            labels,
            poll_window: POLL_WINDOW,
        }
    }

    pub(crate) async fn inspect(&self, id: &str) -> Result<HostRef, RuntimeError> {
        let inspection = self.engine.inspect_container(id).await?;
        Ok(HostRef::from_inspection(inspection))
    }

    /// Like `inspect`, with a missing container as `None`.
    pub(crate) async fn find(&self, id: &str) -> Result<Option<HostRef>, RuntimeError> {
        match self.inspect(id).await {
            Ok(host) => Ok(Some(host)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stops the container if it runs, then removes it. A container that is
    /// already gone counts as removed.
    pub(crate) async fn remove(&self, id: &str, follower: &mut dyn ProgressFollower) -> Result<(), RuntimeError> {
        follower.step(&format!("removing container {}", id));

        let host = match self.find(id).await? {
            Some(host) => host,
            None => {
                debug!("Container {} already removed", id);
                follower.done();
                return Ok(());
            }
        };

        if host.running {
            follower.message("stopping");
            match self.engine.stop_container(&host.id).await {
                Err(e) if !e.is_not_found() => return Err(e),
                _ => {}
            }
        }

        match self.engine.remove_container(&host.id).await {
            Err(e) if !e.is_not_found() => return Err(e),
            _ => {}
        }

        follower.done();
        Ok(())
    }

    /// Replaces any container called `name` with a fresh one from `image`.
    pub(crate) async fn recreate(
        &self,
        name: Option<&str>,
        image: &str,
        version: &Version,
        health_check: Option<&HealthCheckSpec>,
        volume: Option<&str>,
        follower: &mut dyn ProgressFollower,
    ) -> Result<String, RuntimeError> {
        if let Some(name) = name {
            self.remove(name, follower).await?;
        }

        follower.step(&format!("creating container from {}", image));
        let request = CreateContainerRequest {
            image: image.to_string(),
            labels: self.labels.for_resource(Some(version)),
            health_check: health_check.cloned(),
            volume: volume.map(str::to_string),
        };
        let id = self.engine.create_container(&request).await?;
        info!("Created container {} for version {}", id, version);

        if let Some(name) = name {
            follower.message(&format!("naming {}", name));
            self.engine.rename_container(&id, name).await?;
        }

        follower.done();
        Ok(id)
    }

    pub(crate) async fn start(&self, id: &str) -> Result<HostRef, RuntimeError> {
        self.engine.start_container(id).await?;
        self.inspect(id).await
    }

    /// Starts the container and waits for it to report healthy.
    pub(crate) async fn start_and_wait(&self, id: &str, timeout: Duration, follower: &mut dyn ProgressFollower) -> Result<HostRef, RuntimeError> {
        let engine = self.engine.clone();
        let container = id.to_string();
        let start = async move { engine.start_container(&container).await };

        self.start_healthy(start, id, timeout, follower).await?;
        self.inspect(id).await
    }

    /// Runs `start` in the background and polls the container's health
    /// events in short windows until one says `healthy`. The deadline is
    /// checked after every window; `start` keeps running past it.
    pub(crate) async fn start_healthy<F>(
        &self,
        start: F,
        container_id: &str,
        timeout: Duration,
        follower: &mut dyn ProgressFollower,
    ) -> Result<(), RuntimeError>
    where
        F: Future<Output = Result<(), RuntimeError>> + Send + 'static,
    {
        follower.step(&format!("waiting for {} to become healthy", container_id));

        let since = Utc::now();
        let started = Instant::now();
        let mut start_task = Some(tokio::spawn(start));
        let window = chrono::Duration::from_std(self.poll_window).unwrap_or_else(|_| chrono::Duration::seconds(1));

        loop {
            let window_start = Instant::now();
            let mut events = self.engine.health_events(container_id, since, Utc::now() + window);

            let polled = tokio::time::timeout(self.poll_window, async {
                while let Some(event) = events.next().await {
                    if event?.is_healthy() {
                        return Ok(true);
                    }
                }
                Ok::<bool, RuntimeError>(false)
            })
            .await;

            match polled {
                Ok(Ok(true)) => {
                    debug!("Container {} healthy after {:?}", container_id, started.elapsed());
                    follower.message("healthy");
                    follower.done();
                    return Ok(());
                }
                Ok(Err(e)) => return Err(e),
                Ok(Ok(false)) => tokio::time::sleep_until(window_start + self.poll_window).await,
                Err(_) => {}
            }

            if start_task.as_ref().map(|task| task.is_finished()).unwrap_or(false) {
                if let Some(task) = start_task.take() {
                    match task.await {
                        Ok(Ok(())) => debug!("Container {} start returned", container_id),
                        Ok(Err(e)) => {
                            error!("Container {} failed to start: {}", container_id, e);
                            return Err(e);
                        }
                        Err(e) => return Err(RuntimeError::Other(format!("Start task failed: {}", e))),
                    }
                }
            }

            if started.elapsed() >= timeout {
                error!("Container {} not healthy after {:?}", container_id, timeout);
                return Err(RuntimeError::HealthCheckTimeout(timeout));
            }

            follower.message(&format!("{}s", started.elapsed().as_secs()));
        }
    }
}
