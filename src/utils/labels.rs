use std::collections::HashMap;
use crate::models::version::Version;

/// Label namespace stamped on every image and container mldock creates.
/// Anything without these labels is invisible to removal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResourceLabels {
    pub(crate) domain: String,
    pub(crate) repo: String,
}

impl ResourceLabels {
    pub(crate) fn new(domain: &str, repo: &str) -> Self {
        ResourceLabels {
            domain: domain.to_string(),
            repo: repo.to_string(),
        }
    }

    pub(crate) fn repo_key(&self) -> String {
        format!("{}.repo", self.domain)
    }

    pub(crate) fn version_key(&self) -> String {
        format!("{}.version", self.domain)
    }

    pub(crate) fn for_resource(&self, version: Option<&Version>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(self.domain.clone(), String::new());
        labels.insert(self.repo_key(), self.repo.clone());

        if let Some(version) = version {
            labels.insert(self.version_key(), version.to_dot_string());
        }

        labels
    }

    /// Engine label filter matching this repo, optionally narrowed to one version.
    pub(crate) fn selector(&self, version: Option<&Version>) -> Vec<String> {
        let mut selector = vec![format!("{}={}", self.repo_key(), self.repo)];

        if let Some(version) = version {
            selector.push(format!("{}={}", self.version_key(), version.to_dot_string()));
        }

        selector
    }

    pub(crate) fn image_tag(&self, version: &Version) -> String {
        format!("{}-marklogic:{}", self.repo, version.to_dot_string())
    }

    pub(crate) fn os_image_tag(&self, version: &Version) -> String {
        format!("{}-os:{}-compat", self.repo, version.compatibility_tier())
    }
}
