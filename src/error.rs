use std::path::PathBuf;

use thiserror::Error;

use crate::packaging::PackagingStage;

pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Staged artifact name '{name}' must have the form <name>.<ext>")]
    InvalidArtifactName { name: String },

    #[error("Missing credential {variable}: {purpose}")]
    MissingCredential {
        variable: &'static str,
        purpose: &'static str,
    },

    #[error("Failed to upload {artifact}, received status code {status}")]
    UploadRejected { artifact: String, status: u16 },

    #[error("Failed to upload {artifact}: {message}")]
    Transport { artifact: String, message: String },

    #[error("Stage '{stage}' failed: `{command}` exited with {}", describe_exit(.code))]
    StageFailed {
        stage: PackagingStage,
        command: String,
        code: Option<i32>,
    },

    #[error("Stage '{stage}' could not start `{command}`: {source}")]
    Spawn {
        stage: PackagingStage,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}
