use std::fs;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::artifact::{RemoteArtifact, plan};
use crate::config::{ENV_API_KEY, PublishConfig};
use crate::digest::sha256_hex;
use crate::error::{ReleaseError, Result};
use crate::observability::MetricsCollector;
use crate::upload::{UploadRequest, Uploader};
use crate::version::Version;

/// The only status the repository returns for a stored artifact.
pub const HTTP_CREATED: u16 = 201;

#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    pub local_name: String,
    pub remote_name: String,
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub project: String,
    pub version: String,
    pub bucket: String,
    pub uploads: Vec<UploadRecord>,
}

/// Uploads the staged catalog one file at a time, stopping at the first
/// rejection.
pub struct Publisher<'a, U: Uploader> {
    config: &'a PublishConfig,
    uploader: U,
    metrics: MetricsCollector,
}

impl<'a, U: Uploader> Publisher<'a, U> {
    pub fn new(config: &'a PublishConfig, uploader: U) -> Self {
        Self {
            config,
            uploader,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Remote locations for `version` without touching files or the network.
    pub fn plan(&self, version: &Version) -> Vec<RemoteArtifact> {
        plan(&self.config.artifacts, version, &self.config.target)
    }

    /// Validates `raw` and publishes it. An invalid version fails before any
    /// file is read or request sent.
    pub fn publish(&self, raw: &str) -> Result<PublishReport> {
        let version = Version::parse(raw)?;
        self.publish_version(&version)
    }

    #[instrument(skip_all, fields(version = %version))]
    pub fn publish_version(&self, version: &Version) -> Result<PublishReport> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ReleaseError::MissingCredential {
                variable: ENV_API_KEY,
                purpose: "artifact repository API key",
            })?;

        self.metrics.reset();
        let started = Instant::now();
        let mut uploads = Vec::with_capacity(self.config.artifacts.len());

        for remote in self.plan(version) {
            let _timer = self.metrics.start_step(&format!("upload:{}", remote.local_name));
            let record = self.upload_one(&remote, api_key)?;
            info!(
                artifact = %record.local_name,
                remote = %record.remote_name,
                "Successfully uploaded {}.",
                record.local_name
            );
            uploads.push(record);
        }

        self.metrics.record_total_duration(started.elapsed());

        Ok(PublishReport {
            project: self.config.target.project.clone(),
            version: version.to_string(),
            bucket: version.bucket_path(),
            uploads,
        })
    }

    fn upload_one(&self, remote: &RemoteArtifact, api_key: &str) -> Result<UploadRecord> {
        let path = self.config.root.join(&remote.local_name);
        let body = fs::read(&path).map_err(|source| ReleaseError::Io {
            path: path.clone(),
            source,
        })?;
        let size = body.len() as u64;
        let sha256 = sha256_hex(&body);

        let request = UploadRequest {
            artifact: &remote.local_name,
            url: &remote.url,
            api_key,
            sha256: &sha256,
            body,
        };
        let status = match self.uploader.put(request) {
            Ok(status) => status,
            Err(err) => {
                self.metrics.record_upload_failure();
                error!(artifact = %remote.local_name, "{err}");
                return Err(err);
            }
        };

        if status != HTTP_CREATED {
            self.metrics.record_upload_failure();
            let err = ReleaseError::UploadRejected {
                artifact: remote.local_name.clone(),
                status,
            };
            error!(artifact = %remote.local_name, status, "{err}");
            return Err(err);
        }

        self.metrics.record_upload_success(size);
        Ok(UploadRecord {
            local_name: remote.local_name.clone(),
            remote_name: remote.remote_name.clone(),
            url: remote.url.clone(),
            size,
            sha256,
        })
    }
}
