pub mod artifact;
pub mod command;
pub mod config;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod observability;
pub mod packaging;
pub mod publish;
pub mod upload;
pub mod validation;
pub mod version;

pub use artifact::{RemoteArtifact, RepositoryTarget, StagedArtifact};
pub use error::ReleaseError;
pub use packaging::{PackagingPipeline, PackagingStage, PackagingState};
pub use publish::{PublishReport, Publisher};
pub use version::Version;
