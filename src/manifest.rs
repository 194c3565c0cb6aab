use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::publish::{PublishReport, UploadRecord};

/// Record of a completed publish run, written only after every upload succeeded.
#[derive(Debug, Serialize)]
pub struct PublishManifest<'a> {
    pub generated_at: DateTime<Utc>,
    pub project: &'a str,
    pub version: &'a str,
    pub bucket: &'a str,
    pub artifacts: &'a [UploadRecord],
}

pub fn write_manifest(report: &PublishReport, path: &Path) -> Result<()> {
    let manifest = PublishManifest {
        generated_at: Utc::now(),
        project: &report.project,
        version: &report.version,
        bucket: &report.bucket,
        artifacts: &report.uploads,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create manifest directory: {}", parent.display())
        })?;
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create manifest: {}", path.display()))?;
    serde_yaml::to_writer(file, &manifest)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;

    Ok(())
}
