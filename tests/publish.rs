use std::cell::RefCell;
use std::fs;
use std::path::Path;

use broker_release::config::{ENV_API_KEY, PublishConfig, ReleaseFile};
use broker_release::publish::Publisher;
use broker_release::upload::{UploadRequest, Uploader};
use broker_release::{ReleaseError, Version};
use tempfile::tempdir;

#[derive(Debug, Clone)]
struct Call {
    artifact: String,
    url: String,
    api_key: String,
    sha256: String,
    body: Vec<u8>,
}

/// Answers each PUT with the next scripted status, 201 once the script runs out.
/// The call numbered `transport_error_at` fails before any response.
#[derive(Default)]
struct FakeUploader {
    statuses: RefCell<Vec<u16>>,
    transport_error_at: Option<usize>,
    calls: RefCell<Vec<Call>>,
}

impl FakeUploader {
    fn with_statuses(statuses: &[u16]) -> Self {
        let mut script = statuses.to_vec();
        script.reverse();
        Self {
            statuses: RefCell::new(script),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl Uploader for FakeUploader {
    fn put(&self, request: UploadRequest<'_>) -> Result<u16, ReleaseError> {
        self.calls.borrow_mut().push(Call {
            artifact: request.artifact.to_string(),
            url: request.url.to_string(),
            api_key: request.api_key.to_string(),
            sha256: request.sha256.to_string(),
            body: request.body,
        });
        if self.transport_error_at == Some(self.calls.borrow().len() - 1) {
            return Err(ReleaseError::Transport {
                artifact: request.artifact.to_string(),
                message: "connection reset by peer".into(),
            });
        }
        Ok(self.statuses.borrow_mut().pop().unwrap_or(201))
    }
}

fn staged_config(root: &Path) -> PublishConfig {
    let env = |key: &str| match key {
        ENV_API_KEY => Some("test-key".to_string()),
        _ => None,
    };
    let config = PublishConfig::from_lookup(&env, root, &ReleaseFile::default());
    for artifact in &config.artifacts {
        fs::write(
            artifact.local_path(root),
            format!("contents of {}", artifact.file_name()),
        )
        .unwrap();
    }
    config
}

#[test]
fn uploads_every_artifact_in_catalog_order() {
    let temp = tempdir().unwrap();
    let config = staged_config(temp.path());
    let uploader = FakeUploader::default();

    let report = Publisher::new(&config, &uploader).publish("1.2.3.4").unwrap();

    let calls = uploader.calls();
    let artifacts: Vec<_> = calls.iter().map(|c| c.artifact.as_str()).collect();
    assert_eq!(
        artifacts,
        [
            "RDMnetBroker_x86.msi",
            "RDMnetBroker_x86.msm",
            "RDMnetBroker_x64.msi",
            "RDMnetBroker_x64.msm",
            "RDMnetBroker.pkg",
        ]
    );
    assert_eq!(
        calls[4].url,
        "https://artifactory.etcconnect.com:443/artifactory/NET/dev/RDMnetBroker/1.2.3/\
         RDMnetBroker_v1.2.3.4.pkg;project=RDMnetBroker;version=1.2.3.4"
    );
    assert!(calls.iter().all(|c| c.api_key == "test-key"));
    assert_eq!(calls[4].body, b"contents of RDMnetBroker.pkg");
    assert_eq!(calls[4].sha256.len(), 64);

    assert_eq!(report.bucket, "1.2.3");
    assert_eq!(report.uploads.len(), 5);
    assert_eq!(report.uploads[0].remote_name, "RDMnetBroker_x86_v1.2.3.4.msi");
}

#[test]
fn short_version_fails_before_any_upload() {
    let temp = tempdir().unwrap();
    let config = staged_config(temp.path());
    let uploader = FakeUploader::default();

    let err = Publisher::new(&config, &uploader)
        .publish("1.2.3")
        .unwrap_err();

    assert!(matches!(err, ReleaseError::InvalidVersion { .. }));
    assert!(uploader.calls().is_empty());
}

#[test]
fn rejection_stops_remaining_uploads() {
    for status in [403u16, 500, 200] {
        let temp = tempdir().unwrap();
        let config = staged_config(temp.path());
        let uploader = FakeUploader::with_statuses(&[201, status]);
        let publisher = Publisher::new(&config, &uploader);

        let err = publisher.publish("2.0.0.10").unwrap_err();

        match err {
            ReleaseError::UploadRejected {
                artifact,
                status: got,
            } => {
                assert_eq!(artifact, "RDMnetBroker_x86.msm");
                assert_eq!(got, status);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(uploader.calls().len(), 2, "status {status}");

        let metrics = publisher.metrics().snapshot();
        assert_eq!(metrics.uploads_succeeded, 1);
        assert_eq!(metrics.uploads_failed, 1);
    }
}

#[test]
fn transport_failure_stops_remaining_uploads() {
    let temp = tempdir().unwrap();
    let config = staged_config(temp.path());
    let uploader = FakeUploader {
        transport_error_at: Some(2),
        ..FakeUploader::default()
    };
    let publisher = Publisher::new(&config, &uploader);

    let err = publisher.publish("1.2.3.4").unwrap_err();

    match err {
        ReleaseError::Transport { artifact, .. } => assert_eq!(artifact, "RDMnetBroker_x64.msi"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(uploader.calls().len(), 3);

    let metrics = publisher.metrics().snapshot();
    assert_eq!(metrics.uploads_succeeded, 2);
    assert_eq!(metrics.uploads_failed, 1);
}

#[test]
fn unreadable_artifact_is_an_io_error() {
    let temp = tempdir().unwrap();
    let config = staged_config(temp.path());
    fs::remove_file(temp.path().join("RDMnetBroker_x64.msi")).unwrap();
    let uploader = FakeUploader::default();

    let err = Publisher::new(&config, &uploader)
        .publish("1.2.3.4")
        .unwrap_err();

    assert!(matches!(err, ReleaseError::Io { .. }));
    assert_eq!(uploader.calls().len(), 2);
}

#[test]
fn missing_api_key_fails_before_reading_files() {
    let temp = tempdir().unwrap();
    let config = PublishConfig::from_lookup(
        &|_: &str| -> Option<String> { None },
        temp.path(),
        &ReleaseFile::default(),
    );
    let uploader = FakeUploader::default();

    let err = Publisher::new(&config, &uploader)
        .publish("1.2.3.4")
        .unwrap_err();

    assert!(matches!(
        err,
        ReleaseError::MissingCredential {
            variable: ENV_API_KEY,
            ..
        }
    ));
    assert!(uploader.calls().is_empty());
}

#[test]
fn planning_twice_targets_identical_paths() {
    let temp = tempdir().unwrap();
    let config = staged_config(temp.path());
    let version = Version::parse("4.5.6.7").unwrap();

    let first = Publisher::new(&config, FakeUploader::default()).plan(&version);
    let second = Publisher::new(&config, FakeUploader::default()).plan(&version);

    assert_eq!(first, second);
    assert!(first.iter().all(|r| r.bucket == "4.5.6"));
}
