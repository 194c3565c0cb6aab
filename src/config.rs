use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::artifact::{RepositoryTarget, StagedArtifact, default_catalog};

pub const ENV_API_KEY: &str = "RDMNETBRKR_ARTIFACTORY_API_KEY";
pub const ENV_REPOSITORY_URL: &str = "RDMNETBRKR_ARTIFACTORY_URL";
pub const ENV_PROJECT: &str = "RDMNETBRKR_ARTIFACTORY_PROJECT";
pub const ENV_APPLICATION_IDENTITY: &str = "RDMNETBRKR_MACOS_APPLICATION_SIGNING_IDENTITY";
pub const ENV_INSTALLER_IDENTITY: &str = "RDMNETBRKR_MACOS_INSTALLER_SIGNING_IDENTITY";
pub const ENV_KEYCHAIN_PASSWORD: &str = "RDMNETBRKR_MACOS_KEYCHAIN_PASSWORD";
pub const ENV_KEYCHAIN_PATH: &str = "RDMNETBRKR_MACOS_KEYCHAIN_PATH";
pub const ENV_DEVELOPER_ID_USER: &str = "RDMNETBRKR_APPLE_DEVELOPER_ID_USER";
pub const ENV_DEVELOPER_ID_PASSWORD: &str = "RDMNETBRKR_APPLE_DEVELOPER_ID_PW";

pub const DEFAULT_REPOSITORY_URL: &str = "https://artifactory.etcconnect.com:443/artifactory/NET/dev";
pub const DEFAULT_PROJECT: &str = "RDMnetBroker";
pub const DEFAULT_APPLICATION_IDENTITY: &str =
    "Developer ID Application: Electronic Theatre Controls, Inc. (8AVSFD7ZED)";
pub const DEFAULT_INSTALLER_IDENTITY: &str =
    "Developer ID Installer: Electronic Theatre Controls, Inc. (8AVSFD7ZED)";
pub const DEFAULT_KEYCHAIN_PATH: &str = "/Users/gitlab-runner/Library/Keychains/login.keychain-db";
pub const DEFAULT_EXECUTABLE: &str = "build/install/libexec/RDMnetBrokerService";
pub const DEFAULT_PACKAGE_PROJECT: &str = "tools/install/macos/RDMnetBroker.pkgproj";
pub const DEFAULT_BUILT_PACKAGE: &str = "tools/install/macos/build/RDMnetBroker.pkg";
pub const DEFAULT_OUTPUT_PACKAGE: &str = "RDMnetBroker.pkg";

/// Source of configuration values, keyed by environment variable name.
///
/// Empty values are reported as absent.
pub trait VarLookup {
    fn var(&self, key: &str) -> Option<String>;
}

impl<F> VarLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn var(&self, key: &str) -> Option<String> {
        self(key).filter(|value| !value.trim().is_empty())
    }
}

/// Reads the process environment.
pub struct ProcessEnv;

impl VarLookup for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.trim().is_empty())
    }
}

/// Optional YAML file carrying non-secret release settings.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseFile {
    #[serde(default)]
    pub repository: RepositorySection,
    #[serde(default)]
    pub artifacts: Option<Vec<StagedArtifact>>,
    #[serde(default)]
    pub macos: MacosSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySection {
    pub url: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacosSection {
    pub application_identity: Option<String>,
    pub installer_identity: Option<String>,
    pub keychain_path: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub package_project: Option<PathBuf>,
    pub built_package: Option<PathBuf>,
    pub output_package: Option<PathBuf>,
}

impl ReleaseFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read release config: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse release config YAML: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ReleaseFile = serde_yaml::from_str(content)?;
        if let Some(artifacts) = &file.artifacts
            && artifacts.is_empty()
        {
            anyhow::bail!("'artifacts' must list at least one staged file");
        }
        Ok(file)
    }
}

/// Everything the artifact publisher needs, resolved up front.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub root: PathBuf,
    pub target: RepositoryTarget,
    pub api_key: Option<String>,
    pub artifacts: Vec<StagedArtifact>,
}

impl PublishConfig {
    pub fn from_env(root: &Path, file: &ReleaseFile) -> Self {
        Self::from_lookup(&ProcessEnv, root, file)
    }

    pub fn from_lookup(env: &impl VarLookup, root: &Path, file: &ReleaseFile) -> Self {
        let base_url = env
            .var(ENV_REPOSITORY_URL)
            .or_else(|| file.repository.url.clone())
            .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string());
        let project = env
            .var(ENV_PROJECT)
            .or_else(|| file.repository.project.clone())
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());

        Self {
            root: root.to_path_buf(),
            target: RepositoryTarget::new(base_url, project),
            api_key: env.var(ENV_API_KEY),
            artifacts: file.artifacts.clone().unwrap_or_else(default_catalog),
        }
    }
}

/// Notarization account used by the packaging pipeline.
#[derive(Clone, Default)]
pub struct NotarizationCredentials {
    pub account: Option<String>,
    pub secret: Option<String>,
}

impl std::fmt::Debug for NotarizationCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotarizationCredentials")
            .field("account", &self.account)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone)]
pub struct PackagingConfig {
    pub root: PathBuf,
    pub application_identity: String,
    pub installer_identity: String,
    pub keychain_path: PathBuf,
    pub keychain_password: Option<String>,
    pub notarization: NotarizationCredentials,
    pub executable: PathBuf,
    pub package_project: PathBuf,
    pub built_package: PathBuf,
    pub output_package: PathBuf,
}

impl std::fmt::Debug for PackagingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagingConfig")
            .field("root", &self.root)
            .field("application_identity", &self.application_identity)
            .field("installer_identity", &self.installer_identity)
            .field("keychain_path", &self.keychain_path)
            .field(
                "keychain_password",
                &self.keychain_password.as_ref().map(|_| "***"),
            )
            .field("notarization", &self.notarization)
            .field("executable", &self.executable)
            .field("package_project", &self.package_project)
            .field("built_package", &self.built_package)
            .field("output_package", &self.output_package)
            .finish()
    }
}

impl PackagingConfig {
    pub fn from_env(root: &Path, file: &ReleaseFile) -> Self {
        Self::from_lookup(&ProcessEnv, root, file)
    }

    pub fn from_lookup(env: &impl VarLookup, root: &Path, file: &ReleaseFile) -> Self {
        let macos = &file.macos;
        let path_or = |value: &Option<PathBuf>, default: &str| {
            value.clone().unwrap_or_else(|| PathBuf::from(default))
        };

        Self {
            root: root.to_path_buf(),
            application_identity: env
                .var(ENV_APPLICATION_IDENTITY)
                .or_else(|| macos.application_identity.clone())
                .unwrap_or_else(|| DEFAULT_APPLICATION_IDENTITY.to_string()),
            installer_identity: env
                .var(ENV_INSTALLER_IDENTITY)
                .or_else(|| macos.installer_identity.clone())
                .unwrap_or_else(|| DEFAULT_INSTALLER_IDENTITY.to_string()),
            keychain_path: env
                .var(ENV_KEYCHAIN_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| path_or(&macos.keychain_path, DEFAULT_KEYCHAIN_PATH)),
            keychain_password: env.var(ENV_KEYCHAIN_PASSWORD),
            notarization: NotarizationCredentials {
                account: env.var(ENV_DEVELOPER_ID_USER),
                secret: env.var(ENV_DEVELOPER_ID_PASSWORD),
            },
            executable: path_or(&macos.executable, DEFAULT_EXECUTABLE),
            package_project: path_or(&macos.package_project, DEFAULT_PACKAGE_PROJECT),
            built_package: path_or(&macos.built_package, DEFAULT_BUILT_PACKAGE),
            output_package: path_or(&macos.output_package, DEFAULT_OUTPUT_PACKAGE),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
