use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::ReleaseError;

pub const API_KEY_HEADER: &str = "X-JFrog-Art-Api";
pub const CHECKSUM_HEADER: &str = "X-Checksum-Sha256";

/// One authenticated PUT of a staged file.
pub struct UploadRequest<'a> {
    pub artifact: &'a str,
    pub url: &'a str,
    pub api_key: &'a str,
    pub sha256: &'a str,
    pub body: Vec<u8>,
}

/// Transport used by the publisher. Returns the HTTP status code of the
/// response; interpreting it is the caller's job.
pub trait Uploader {
    fn put(&self, request: UploadRequest<'_>) -> Result<u16, ReleaseError>;
}

impl<U: Uploader + ?Sized> Uploader for &U {
    fn put(&self, request: UploadRequest<'_>) -> Result<u16, ReleaseError> {
        (**self).put(request)
    }
}

/// Blocking HTTPS uploader. No request timeout is configured; the invoking CI
/// job bounds the run.
pub struct HttpUploader {
    client: Client,
}

impl HttpUploader {
    pub fn new() -> Result<Self, ReleaseError> {
        let client = Client::builder()
            .user_agent(format!("broker-release/{}", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| ReleaseError::Transport {
                artifact: "<client>".into(),
                message: format!("failed to create HTTP client: {err}"),
            })?;
        Ok(Self { client })
    }
}

impl Uploader for HttpUploader {
    fn put(&self, request: UploadRequest<'_>) -> Result<u16, ReleaseError> {
        debug!(
            artifact = request.artifact,
            url = request.url,
            bytes = request.body.len(),
            "PUT"
        );
        let response = self
            .client
            .put(request.url)
            .header(API_KEY_HEADER, request.api_key)
            .header(CHECKSUM_HEADER, request.sha256)
            .body(request.body)
            .send()
            .map_err(|err| ReleaseError::Transport {
                artifact: request.artifact.to_string(),
                message: err.to_string(),
            })?;
        Ok(response.status().as_u16())
    }
}
