use std::collections::HashMap;
use bollard::{
    Docker,
    models::{BuildInfo, ImageInspect, ImageSummary},
    query_parameters::{
        BuildImageOptionsBuilder,
        CreateImageOptionsBuilder,
        ListImagesOptionsBuilder,
        PruneImagesOptionsBuilder,
        RemoveImageOptionsBuilder,
        TagImageOptionsBuilder,
    },
};
use futures::{future, StreamExt, TryStreamExt};
use crate::runtime::engine::{BuildEvent, BuildImageRequest, EngineStream, ImageFilter, ImageRecord};
use crate::runtime::error::RuntimeError;
use super::not_found_as;

fn image_filters(filter: &ImageFilter) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    if let Some(reference) = &filter.reference {
        filters.insert("reference".to_string(), vec![reference.clone()]);
    }
    if !filter.labels.is_empty() {
        filters.insert("label".to_string(), filter.labels.clone());
    }
    filters
}

fn record_from_summary(summary: ImageSummary) -> ImageRecord {
    ImageRecord {
        id: summary.id,
        parent_id: Some(summary.parent_id).filter(|parent| !parent.is_empty()),
        repo_tags: summary.repo_tags,
        labels: summary.labels,
    }
}

fn record_from_inspect(inspect: ImageInspect) -> ImageRecord {
    ImageRecord {
        id: inspect.id.unwrap_or_default(),
        parent_id: inspect.parent.filter(|parent| !parent.is_empty()),
        repo_tags: inspect.repo_tags.unwrap_or_default(),
        labels: inspect.config.and_then(|config| config.labels).unwrap_or_default(),
    }
}

fn event_from_info(info: BuildInfo) -> BuildEvent {
    BuildEvent {
        message: info.stream,
        aux_id: info.aux.and_then(|aux| aux.id),
        error: info.error.or_else(|| info.error_detail.and_then(|detail| detail.message)),
    }
}

pub(super) async fn list_images(docker: &Docker, filter: &ImageFilter) -> Result<Vec<ImageRecord>, RuntimeError> {
    let options = ListImagesOptionsBuilder::new()
        .all(false)
        .filters(&image_filters(filter))
        .build();

    let images = docker.list_images(Some(options)).await?;
    debug!("Docker listed {} images for {:?}", images.len(), filter);

    Ok(images.into_iter().map(record_from_summary).collect())
}

pub(super) async fn inspect_image(docker: &Docker, reference: &str) -> Result<ImageRecord, RuntimeError> {
    docker
        .inspect_image(reference)
        .await
        .map(record_from_inspect)
        .map_err(|e| not_found_as(e, || RuntimeError::ImageNotFound(reference.to_string())))
}

pub(super) async fn remove_image(docker: &Docker, reference: &str) -> Result<(), RuntimeError> {
    let options = RemoveImageOptionsBuilder::new().build();

    match docker.remove_image(reference, Some(options), None).await {
        Ok(deleted) => {
            debug!("Docker removed image {}: {:?}", reference, deleted);
            Ok(())
        }
        Err(e) => match not_found_as(e, || RuntimeError::ImageNotFound(reference.to_string())) {
            RuntimeError::Engine { status: Some(409), message } => {
                debug!("Docker image {} in use: {}", reference, message);
                Err(RuntimeError::ImageRemovalConflict(reference.to_string()))
            }
            other => Err(other),
        },
    }
}

pub(super) fn build_image(docker: &Docker, request: BuildImageRequest) -> EngineStream<'_, BuildEvent> {
    info!("Docker build image: {}", request.tag);

    let options = BuildImageOptionsBuilder::new()
        .dockerfile(&request.dockerfile)
        .t(&request.tag)
        .rm(true)
        .buildargs(&request.build_args)
        .labels(&request.labels)
        .build();

    // a failing context ends the body early, the engine then reports the truncated archive
    let tag = request.tag.clone();
    let context = request
        .context
        .inspect_err(move |e| error!("Build context for {} failed: {}", tag, e))
        .take_while(|chunk| future::ready(chunk.is_ok()))
        .filter_map(|chunk| future::ready(chunk.ok()));

    let body = bollard::body_stream(context);
    let stream = docker
        .build_image(options, None, Some(body))
        .map(|item| item.map(event_from_info).map_err(RuntimeError::from));

    Box::pin(stream)
}

pub(super) async fn prune_images(docker: &Docker) -> Result<(), RuntimeError> {
    let filters = HashMap::from([("dangling".to_string(), vec!["true".to_string()])]);
    let options = PruneImagesOptionsBuilder::new().filters(&filters).build();

    let report = docker.prune_images(Some(options)).await?;
    debug!("Docker pruned images, reclaimed {:?} bytes", report.space_reclaimed);
    Ok(())
}

pub(super) async fn pull_image(docker: &Docker, image: &str, tag: &str) -> Result<(), RuntimeError> {
    let image_name = format!("{}:{}", image, tag);
    info!("Pull docker image: {}", image_name);

    if docker.inspect_image(&image_name).await.is_ok() {
        debug!("Docker image {} already exists locally", image_name);
        return Ok(());
    }

    let options = CreateImageOptionsBuilder::new()
        .from_image(image)
        .tag(tag)
        .build();

    let mut stream = docker.create_image(Some(options), None, None);

    while let Some(pull_result) = stream.next().await {
        if let Err(e) = pull_result {
            error!("Docker image pull error: {}", e);
            return Err(not_found_as(e, || RuntimeError::ImageNotFound(image_name.clone())));
        }
    }

    info!("Docker successfully pulled image {}", image_name);
    Ok(())
}

pub(super) async fn tag_image(docker: &Docker, source: &str, repository: &str, tag: &str) -> Result<(), RuntimeError> {
    let options = TagImageOptionsBuilder::new().repo(repository).tag(tag).build();

    docker
        .tag_image(source, Some(options))
        .await
        .map_err(|e| not_found_as(e, || RuntimeError::ImageNotFound(source.to_string())))?;

    info!("Docker tagged {} as {}:{}", source, repository, tag);
    Ok(())
}
