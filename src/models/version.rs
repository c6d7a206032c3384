use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use regex::Regex;
use crate::runtime::error::RuntimeError;

const DOWNLOAD_BASE_URL: &str = "https://developer.marklogic.com/download/binaries";

// Newest naming scheme first: `MarkLogic-RHEL7-9.0-4.x86_64.rpm`, then
// `MarkLogic-8.0-4.x86_64.rpm`, then a bare `8.0-6.4`.
const VERSION_PATTERNS: [&str; 3] = [
    r"^[^\-]+\-(?:[^\d]*\d+)\-(\d+)\.(\d+)\-(\d+)(?:\.(\d+))?",
    r"^[^\-]+-(\d+)\.(\d+)\-(\d+)(?:\.(\d+))?",
    r"^(?:[^\-\d]+\-)?(\d+)\.(\d+)\-(\d+)(?:\.(\d+))?",
];

/// SHA-256 digests of published artifacts, keyed by display string.
/// Versions missing here are still buildable, they just skip verification.
static KNOWN_CHECKSUMS: &[(&str, &str)] = &[];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Version {
    pub(crate) major: u32,
    pub(crate) minor: u32,
    pub(crate) revision: u32,
    pub(crate) patch: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum CompatibilityTier {
    Centos6,
    Centos7,
    Rocky8,
}

impl CompatibilityTier {
    // Checked from the highest tier down.
    const THRESHOLDS: [(CompatibilityTier, (u32, u32, u32)); 3] = [
        (CompatibilityTier::Rocky8, (11, 0, 0)),
        (CompatibilityTier::Centos7, (8, 0, 4)),
        (CompatibilityTier::Centos6, (0, 0, 0)),
    ];

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            CompatibilityTier::Centos6 => "centos6",
            CompatibilityTier::Centos7 => "centos7",
            CompatibilityTier::Rocky8 => "rocky8",
        }
    }

    pub(crate) fn default_base_image(&self) -> &'static str {
        match self {
            CompatibilityTier::Centos6 => "centos:centos6",
            CompatibilityTier::Centos7 => "centos:centos7",
            CompatibilityTier::Rocky8 => "rockylinux:8",
        }
    }
}

impl fmt::Display for CompatibilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Version {
    pub(crate) fn parse(identifier: &str) -> Result<Version, RuntimeError> {
        let file_name = Path::new(identifier)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");

        if file_name.is_empty() {
            return Err(RuntimeError::InvalidVersionFormat(identifier.to_string()));
        }

        for pattern in VERSION_PATTERNS.iter() {
            let regex = Regex::new(pattern)
                .map_err(|e| RuntimeError::Other(format!("Invalid version pattern: {}", e)))?;

            if let Some(captures) = regex.captures(file_name) {
                let group = |index: usize| -> Option<u32> {
                    captures.get(index).and_then(|m| m.as_str().parse::<u32>().ok())
                };

                return match (group(1), group(2), group(3)) {
                    (Some(major), Some(minor), Some(revision)) => Ok(Version {
                        major,
                        minor,
                        revision,
                        patch: group(4),
                    }),
                    _ => Err(RuntimeError::InvalidVersionFormat(identifier.to_string())),
                };
            }
        }

        Err(RuntimeError::InvalidVersionFormat(identifier.to_string()))
    }

    /// `8.0-6.4` becomes `8.0.6.4`, usable as an image tag or label value.
    pub(crate) fn to_dot_string(&self) -> String {
        self.to_string().replace('-', ".")
    }

    pub(crate) fn compatibility_tier(&self) -> CompatibilityTier {
        let triple = (self.major, self.minor, self.revision);

        CompatibilityTier::THRESHOLDS
            .iter()
            .find(|(_, threshold)| triple >= *threshold)
            .map(|(tier, _)| *tier)
            .unwrap_or(CompatibilityTier::Centos6)
    }

    pub(crate) fn artifact_url(&self) -> String {
        let base_url = format!("{}/{}.{}/MarkLogic", DOWNLOAD_BASE_URL, self.major, self.minor);

        if self.major < 9 && !(self.minor < 1 && self.revision < 5) {
            format!("{}-RHEL7-{}.x86_64.rpm", base_url, self)
        } else {
            format!("{}-{}.x86_64.rpm", base_url, self)
        }
    }

    pub(crate) fn artifact_filename(&self) -> String {
        let raw_url = self.artifact_url();

        url::Url::parse(&raw_url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.next_back().map(|s| s.to_string()))
            })
            .unwrap_or_else(|| {
                raw_url.rsplit('/').next().unwrap_or_default().to_string()
            })
    }

    /// Looks up the built-in table first, then any extra entries from the configuration.
    pub(crate) fn known_checksum(&self, extra: &HashMap<String, String>) -> Option<String> {
        let key = self.to_string();

        KNOWN_CHECKSUMS
            .iter()
            .find(|(version, _)| *version == key)
            .map(|(_, sum)| sum.to_string())
            .or_else(|| extra.get(&key).cloned())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}-{}", self.major, self.minor, self.revision)?;
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.revision, self.patch)
            .cmp(&(other.major, other.minor, other.revision, other.patch))
    }
}
