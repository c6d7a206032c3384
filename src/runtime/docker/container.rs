use std::collections::HashMap;
use bollard::{
    Docker,
    models::{ContainerCreateBody, ContainerInspectResponse, HealthConfig, HostConfig, Mount, MountTypeEnum},
    query_parameters::{
        CreateContainerOptionsBuilder,
        InspectContainerOptions,
        ListContainersOptionsBuilder,
        RemoveContainerOptionsBuilder,
        RenameContainerOptionsBuilder,
        StartContainerOptionsBuilder,
        StopContainerOptionsBuilder,
    },
};
use crate::models::health_check::HealthCheckSpec;
use crate::runtime::engine::{ContainerFilter, ContainerInspection, ContainerSummary, CreateContainerRequest};
use crate::runtime::error::RuntimeError;
use crate::runtime::lifecycle::DATA_DIR;
use super::not_found_as;

fn container_filters(filter: &ContainerFilter) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    if let Some(ancestor) = &filter.ancestor {
        filters.insert("ancestor".to_string(), vec![ancestor.clone()]);
    }
    filters
}

fn health_config(spec: &HealthCheckSpec) -> HealthConfig {
    HealthConfig {
        test: Some(spec.test.clone()),
        interval: Some(spec.interval.as_nanos() as i64),
        timeout: Some(spec.timeout.as_nanos() as i64),
        retries: Some(spec.retries as i64),
        start_period: Some(spec.start_period.as_nanos() as i64),
        ..Default::default()
    }
}

fn create_body(request: &CreateContainerRequest) -> ContainerCreateBody {
    let mounts = request.volume.as_ref().map(|volume| {
        vec![Mount {
            target: Some(DATA_DIR.to_string()),
            source: Some(volume.clone()),
            typ: Some(MountTypeEnum::VOLUME),
            ..Default::default()
        }]
    });

    let host_config = HostConfig {
        publish_all_ports: Some(true),
        mounts,
        ..Default::default()
    };

    ContainerCreateBody {
        image: Some(request.image.clone()),
        tty: Some(true),
        labels: Some(request.labels.clone()),
        healthcheck: request.health_check.as_ref().map(health_config),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn inspection_from_response(response: ContainerInspectResponse) -> Result<ContainerInspection, RuntimeError> {
    let raw = serde_json::to_value(&response)?;

    let port_bindings = response
        .network_settings
        .and_then(|settings| settings.ports)
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let host_ports = bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|binding| binding.host_port)
                .collect();
            (port, host_ports)
        })
        .collect();

    Ok(ContainerInspection {
        id: response.id.unwrap_or_default(),
        name: response.name.unwrap_or_default().trim_start_matches('/').to_string(),
        running: response.state.and_then(|state| state.running).unwrap_or(false),
        image: response.image.unwrap_or_default(),
        labels: response.config.and_then(|config| config.labels).unwrap_or_default(),
        port_bindings,
        raw,
    })
}

pub(super) async fn list_containers(docker: &Docker, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, RuntimeError> {
    let options = ListContainersOptionsBuilder::new()
        .all(filter.all)
        .filters(&container_filters(filter))
        .build();

    let containers = docker.list_containers(Some(options)).await?;

    Ok(containers
        .into_iter()
        .filter_map(|container| {
            Some(ContainerSummary { id: container.id? })
        })
        .collect())
}

pub(super) async fn create_container(docker: &Docker, request: &CreateContainerRequest) -> Result<String, RuntimeError> {
    debug!("Create container from image: {}", request.image);

    let options = CreateContainerOptionsBuilder::new().build();
    match docker.create_container(Some(options), create_body(request)).await {
        Ok(container) => {
            debug!("Docker create container {:?}", container.id);
            for warning in &container.warnings {
                info!("Docker create warning: {}", warning);
            }
            Ok(container.id)
        }
        Err(e) => {
            error!("Docker failed to create container: {}", e);
            Err(not_found_as(e, || RuntimeError::ImageNotFound(request.image.clone())))
        }
    }
}

pub(super) async fn start_container(docker: &Docker, id: &str) -> Result<(), RuntimeError> {
    let start_options = StartContainerOptionsBuilder::new().build();

    docker
        .start_container(id, Some(start_options))
        .await
        .map_err(|e| not_found_as(e, || RuntimeError::ContainerNotFound(id.to_string())))?;

    info!("Docker container {} started", id);
    Ok(())
}

pub(super) async fn stop_container(docker: &Docker, id: &str) -> Result<(), RuntimeError> {
    let stop_options = StopContainerOptionsBuilder::new().build();

    match docker.stop_container(id, Some(stop_options)).await {
        Ok(_) => {
            debug!("Container {} stopped successfully", id);
            Ok(())
        }
        // already stopped
        Err(bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }) => Ok(()),
        Err(e) => Err(not_found_as(e, || RuntimeError::ContainerNotFound(id.to_string()))),
    }
}

pub(super) async fn remove_container(docker: &Docker, id: &str) -> Result<(), RuntimeError> {
    let remove_options = RemoveContainerOptionsBuilder::new().build();

    docker
        .remove_container(id, Some(remove_options))
        .await
        .map_err(|e| not_found_as(e, || RuntimeError::ContainerNotFound(id.to_string())))?;

    info!("Container {} removed successfully", id);
    Ok(())
}

pub(super) async fn rename_container(docker: &Docker, id: &str, name: &str) -> Result<(), RuntimeError> {
    let options = RenameContainerOptionsBuilder::new().name(name).build();

    docker
        .rename_container(id, options)
        .await
        .map_err(|e| not_found_as(e, || RuntimeError::ContainerNotFound(id.to_string())))?;

    debug!("Container {} renamed to {}", id, name);
    Ok(())
}

pub(super) async fn inspect_container(docker: &Docker, id: &str) -> Result<ContainerInspection, RuntimeError> {
    let response = docker
        .inspect_container(id, None::<InspectContainerOptions>)
        .await
        .map_err(|e| not_found_as(e, || RuntimeError::ContainerNotFound(id.to_string())))?;

    inspection_from_response(response)
}
