use std::collections::VecDeque;
use crate::models::version::Version;
use crate::runtime::engine::{ContainerFilter, ImageFilter, ImageRecord, SharedEngine};
use crate::runtime::error::RuntimeError;
use crate::runtime::lifecycle::ContainerLifecycle;
use crate::runtime::progress::ProgressFollower;
use crate::runtime::resolver::removal_order;
use crate::utils::labels::ResourceLabels;

pub(crate) const MAX_REMOVAL_ATTEMPTS: u32 = 5;

fn short_id(id: &str) -> &str {
    id.strip_prefix("sha256:").unwrap_or(id)
}

fn display_name(image: &ImageRecord) -> &str {
    image.repo_tags.first().map(String::as_str).unwrap_or_else(|| short_id(&image.id))
}

/// Removes every labelled image of a repo, and the containers built on
/// them, children before parents.
pub(crate) struct ResourceReaper {
    engine: SharedEngine,
    lifecycle: ContainerLifecycle,
    labels: ResourceLabels,
}

impl ResourceReaper {
    pub(crate) fn new(engine: SharedEngine, labels: ResourceLabels) -> Self {
        ResourceReaper {
            lifecycle: ContainerLifecycle::new(engine.clone(), labels.clone()),
            engine,
            labels,
        }
    }

    /// Returns the number of images that are gone afterwards.
    pub(crate) async fn remove_all(&self, version: Option<&Version>, follower: &mut dyn ProgressFollower) -> Result<usize, RuntimeError> {
        let filter = ImageFilter {
            reference: None,
            labels: self.labels.selector(version),
        };
        let images = self.engine.list_images(&filter).await?;
        info!("Removing {} images matching {:?}", images.len(), filter.labels);

        let mut queue: VecDeque<(ImageRecord, u32)> = removal_order(images).into_iter().map(|image| (image, 0)).collect();
        let mut removed = 0;

        while let Some((image, attempts)) = queue.pop_front() {
            self.remove_dependent_containers(&image, follower).await?;

            follower.step(&format!("removing image {}", display_name(&image)));
            self.remove_extra_tags(&image).await?;
            match self.engine.remove_image(&image.id).await {
                Ok(()) => {
                    removed += 1;
                    follower.done();
                }
                Err(e) if e.is_not_found() => {
                    debug!("Image {} already removed by the engine", image.id);
                    removed += 1;
                    follower.done();
                }
                Err(RuntimeError::ImageRemovalConflict(id)) => {
                    let attempts = attempts + 1;
                    if attempts >= MAX_REMOVAL_ATTEMPTS {
                        error!("Image {} still in use after {} attempts", id, attempts);
                        return Err(RuntimeError::ImageRemovalConflict(id));
                    }
                    follower.message("in use, retrying later");
                    queue.push_back((image, attempts));
                }
                Err(e) => return Err(e),
            }
        }

        follower.step("pruning dangling images");
        if let Err(e) = self.engine.prune_images().await {
            debug!("Image prune failed: {}", e);
        }
        follower.done();

        Ok(removed)
    }

    /// The engine refuses to remove an image by id while more than one
    /// repository references it, so all but the first tag go first.
    async fn remove_extra_tags(&self, image: &ImageRecord) -> Result<(), RuntimeError> {
        for tag in image.repo_tags.iter().skip(1) {
            match self.engine.remove_image(tag).await {
                Ok(()) => debug!("Untagged {} from {}", tag, short_id(&image.id)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn remove_dependent_containers(&self, image: &ImageRecord, follower: &mut dyn ProgressFollower) -> Result<(), RuntimeError> {
        let filter = ContainerFilter {
            ancestor: Some(short_id(&image.id).to_string()),
            all: true,
        };

        for container in self.engine.list_containers(&filter).await? {
            self.lifecycle.remove(&container.id, follower).await?;
        }

        Ok(())
    }
}
