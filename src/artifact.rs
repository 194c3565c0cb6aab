use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ReleaseError;
use crate::version::Version;

/// Files produced by the installer builds as `(base, extension)`, uploaded in
/// this order.
pub const DEFAULT_CATALOG: [(&str, &str); 5] = [
    ("RDMnetBroker_x86", "msi"),
    ("RDMnetBroker_x86", "msm"),
    ("RDMnetBroker_x64", "msi"),
    ("RDMnetBroker_x64", "msm"),
    ("RDMnetBroker", "pkg"),
];

/// A locally built file awaiting upload, identified by base name and extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StagedArtifact {
    base: String,
    extension: String,
}

impl StagedArtifact {
    pub fn parse(file_name: &str) -> Result<Self, ReleaseError> {
        let invalid = || ReleaseError::InvalidArtifactName {
            name: file_name.to_string(),
        };
        if file_name.contains(['/', '\\']) {
            return Err(invalid());
        }
        let (base, extension) = file_name.split_once('.').ok_or_else(invalid)?;
        if base.is_empty() || extension.is_empty() || extension.contains('.') {
            return Err(invalid());
        }
        Ok(Self {
            base: base.to_string(),
            extension: extension.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.base, self.extension)
    }

    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(self.file_name())
    }

    /// `<base>_v<version>.<ext>`
    pub fn remote_name(&self, version: &Version) -> String {
        format!("{}_v{}.{}", self.base, version, self.extension)
    }
}

impl TryFrom<String> for StagedArtifact {
    type Error = ReleaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StagedArtifact::parse(&value)
    }
}

impl From<StagedArtifact> for String {
    fn from(value: StagedArtifact) -> Self {
        value.file_name()
    }
}

impl fmt::Display for StagedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.extension)
    }
}

pub fn default_catalog() -> Vec<StagedArtifact> {
    DEFAULT_CATALOG
        .iter()
        .map(|(base, extension)| StagedArtifact {
            base: base.to_string(),
            extension: extension.to_string(),
        })
        .collect()
}

/// Repository root and project under which versioned buckets live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub base_url: String,
    pub project: String,
}

impl RepositoryTarget {
    pub fn new(base_url: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            project: project.into(),
        }
    }

    pub fn project_root(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.project)
    }
}

/// Where a staged artifact lands for a given version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteArtifact {
    pub local_name: String,
    pub remote_name: String,
    pub bucket: String,
    pub url: String,
}

impl RemoteArtifact {
    pub fn resolve(
        artifact: &StagedArtifact,
        version: &Version,
        target: &RepositoryTarget,
    ) -> Self {
        let bucket = version.bucket_path();
        let remote_name = artifact.remote_name(version);
        let url = format!(
            "{root}/{bucket}/{remote_name};project={project};version={version}",
            root = target.project_root(),
            project = target.project,
        );
        Self {
            local_name: artifact.file_name(),
            remote_name,
            bucket,
            url,
        }
    }
}

/// Maps every artifact of the catalog to its remote location, in catalog order.
pub fn plan(
    catalog: &[StagedArtifact],
    version: &Version,
    target: &RepositoryTarget,
) -> Vec<RemoteArtifact> {
    catalog
        .iter()
        .map(|artifact| RemoteArtifact::resolve(artifact, version, target))
        .collect()
}
