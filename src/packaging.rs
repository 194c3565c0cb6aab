//! Sign, build, sign again and verify the macOS installer package.
//!
//! The stages run strictly in order and the first failure ends the run. Work
//! from earlier stages is left in place: the keychain stays unlocked and the
//! binary stays signed.

use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::command::{CommandRunner, Invocation};
use crate::config::{
    ENV_DEVELOPER_ID_PASSWORD, ENV_DEVELOPER_ID_USER, ENV_KEYCHAIN_PASSWORD, PackagingConfig,
};
use crate::error::{ReleaseError, Result};
use crate::observability::MetricsCollector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackagingStage {
    CheckCredentials,
    UnlockKeychain,
    CodesignBinary,
    BuildPackage,
    SignPackage,
    VerifySignature,
}

impl PackagingStage {
    /// Every stage, in execution order.
    pub const ALL: [PackagingStage; 6] = [
        PackagingStage::CheckCredentials,
        PackagingStage::UnlockKeychain,
        PackagingStage::CodesignBinary,
        PackagingStage::BuildPackage,
        PackagingStage::SignPackage,
        PackagingStage::VerifySignature,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PackagingStage::CheckCredentials => "check-credentials",
            PackagingStage::UnlockKeychain => "unlock-keychain",
            PackagingStage::CodesignBinary => "codesign-binary",
            PackagingStage::BuildPackage => "build-package",
            PackagingStage::SignPackage => "sign-package",
            PackagingStage::VerifySignature => "verify-signature",
        }
    }

    /// State the pipeline reaches when this stage succeeds.
    pub fn completes(&self) -> PackagingState {
        match self {
            PackagingStage::CheckCredentials => PackagingState::CredentialsChecked,
            PackagingStage::UnlockKeychain => PackagingState::KeychainUnlocked,
            PackagingStage::CodesignBinary => PackagingState::BinarySigned,
            PackagingStage::BuildPackage => PackagingState::PackageBuilt,
            PackagingStage::SignPackage => PackagingState::PackageSigned,
            PackagingStage::VerifySignature => PackagingState::Verified,
        }
    }
}

impl fmt::Display for PackagingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackagingState {
    Init,
    CredentialsChecked,
    KeychainUnlocked,
    BinarySigned,
    PackageBuilt,
    PackageSigned,
    Verified,
    Failed(PackagingStage),
}

impl PackagingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackagingState::Verified | PackagingState::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagingReport {
    pub states: Vec<PackagingState>,
    pub output_package: PathBuf,
}

pub struct PackagingPipeline<'a, R: CommandRunner> {
    config: &'a PackagingConfig,
    runner: R,
    metrics: MetricsCollector,
    trace: Mutex<Vec<PackagingState>>,
}

impl<'a, R: CommandRunner> PackagingPipeline<'a, R> {
    pub fn new(config: &'a PackagingConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            metrics: MetricsCollector::new(),
            trace: Mutex::new(Vec::new()),
        }
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// States visited by the most recent `run`, ending in `Failed` when a
    /// stage failed.
    pub fn states(&self) -> Vec<PackagingState> {
        self.trace.lock().map(|g| g.clone()).unwrap_or_default()
    }

    #[instrument(skip_all, fields(root = %self.config.root.display()))]
    pub fn run(&self) -> Result<PackagingReport> {
        self.metrics.reset();
        let started = Instant::now();
        let mut states = vec![PackagingState::Init];

        let outcome = self.run_stages(&mut states);
        self.metrics.record_total_duration(started.elapsed());
        if let Err((stage, _)) = &outcome {
            states.push(PackagingState::Failed(*stage));
        }
        if let Ok(mut guard) = self.trace.lock() {
            *guard = states.clone();
        }

        match outcome {
            Ok(()) => {
                info!(
                    package = %self.config.output_package.display(),
                    "Installer package signed and verified"
                );
                Ok(PackagingReport {
                    states,
                    output_package: self.config.resolve(&self.config.output_package),
                })
            }
            Err((stage, err)) => {
                error!(stage = %stage, "{err}");
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        states: &mut Vec<PackagingState>,
    ) -> std::result::Result<(), (PackagingStage, ReleaseError)> {
        for stage in PackagingStage::ALL {
            self.run_stage(stage).map_err(|err| (stage, err))?;
            states.push(stage.completes());
        }
        Ok(())
    }

    fn check_credentials(&self) -> Result<()> {
        let credentials = &self.config.notarization;
        if credentials.account.is_none() {
            return Err(ReleaseError::MissingCredential {
                variable: ENV_DEVELOPER_ID_USER,
                purpose: "couldn't get credentials to notarize application",
            });
        }
        if credentials.secret.is_none() {
            return Err(ReleaseError::MissingCredential {
                variable: ENV_DEVELOPER_ID_PASSWORD,
                purpose: "couldn't get credentials to notarize application",
            });
        }
        Ok(())
    }

    fn run_stage(&self, stage: PackagingStage) -> Result<()> {
        let Some(invocation) = self.invocation(stage)? else {
            return self.check_credentials();
        };
        let command = invocation.redacted();
        info!(stage = %stage, "Running {command}");

        let _timer = self.metrics.start_step(stage.name());
        let outcome = self
            .runner
            .run(&invocation)
            .map_err(|source| ReleaseError::Spawn {
                stage,
                command: command.clone(),
                source,
            })?;

        if !outcome.is_success() {
            return Err(ReleaseError::StageFailed {
                stage,
                command,
                code: outcome.code,
            });
        }
        Ok(())
    }

    /// The tool call for `stage`, `None` for the credential check which runs
    /// in-process. Relative paths are passed as-is and resolved by the tool
    /// against the working root.
    pub fn invocation(&self, stage: PackagingStage) -> Result<Option<Invocation>> {
        let config = self.config;
        let root = config.root.as_path();
        let invocation = match stage {
            PackagingStage::CheckCredentials => return Ok(None),
            PackagingStage::UnlockKeychain => {
                let password = config.keychain_password.clone().ok_or(
                    ReleaseError::MissingCredential {
                        variable: ENV_KEYCHAIN_PASSWORD,
                        purpose: "keychain password needed to unlock signing keys",
                    },
                )?;
                Invocation::new("security", root)
                    .arg("unlock-keychain")
                    .arg("-p")
                    .secret(password)
                    .path(&config.keychain_path)
            }
            PackagingStage::CodesignBinary => Invocation::new("codesign", root)
                .arg("--force")
                .arg("--sign")
                .arg(config.application_identity.as_str())
                .arg("--timestamp")
                .arg("-o")
                .arg("runtime")
                .path(&config.executable),
            PackagingStage::BuildPackage => {
                Invocation::new("packagesbuild", root).path(&config.package_project)
            }
            PackagingStage::SignPackage => Invocation::new("productsign", root)
                .arg("--sign")
                .arg(config.installer_identity.as_str())
                .path(&config.built_package)
                .path(&config.output_package),
            PackagingStage::VerifySignature => Invocation::new("pkgutil", root)
                .arg("--check-signature")
                .path(&config.output_package),
        };
        Ok(Some(invocation))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::{NotarizationCredentials, ReleaseFile};

    fn config() -> PackagingConfig {
        let mut config = PackagingConfig::from_lookup(
            &|_: &str| -> Option<String> { None },
            Path::new("/repo"),
            &ReleaseFile::default(),
        );
        config.keychain_password = Some("pw".into());
        config.notarization = NotarizationCredentials {
            account: Some("dev@example.com".into()),
            secret: Some("secret".into()),
        };
        config
    }

    #[test]
    fn codesign_hardens_and_timestamps() {
        let config = config();
        let pipeline = PackagingPipeline::new(&config, crate::command::SystemRunner);
        let invocation = pipeline.invocation(PackagingStage::CodesignBinary).unwrap().unwrap();
        assert_eq!(invocation.program, "codesign");
        let args: Vec<_> = invocation.arg_values().collect();
        assert_eq!(
            args,
            [
                "--force",
                "--sign",
                crate::config::DEFAULT_APPLICATION_IDENTITY,
                "--timestamp",
                "-o",
                "runtime",
                "build/install/libexec/RDMnetBrokerService",
            ]
        );
        assert_eq!(invocation.current_dir, PathBuf::from("/repo"));
    }

    #[test]
    fn product_sign_writes_package_to_root() {
        let config = config();
        let pipeline = PackagingPipeline::new(&config, crate::command::SystemRunner);
        let invocation = pipeline.invocation(PackagingStage::SignPackage).unwrap().unwrap();
        let args: Vec<_> = invocation.arg_values().collect();
        assert_eq!(
            args[2..],
            ["tools/install/macos/build/RDMnetBroker.pkg", "RDMnetBroker.pkg"]
        );
    }

    #[test]
    fn credential_check_runs_in_process() {
        let config = config();
        let pipeline = PackagingPipeline::new(&config, crate::command::SystemRunner);
        assert!(
            pipeline
                .invocation(PackagingStage::CheckCredentials)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn unlock_without_password_is_missing_credential() {
        let mut config = config();
        config.keychain_password = None;
        let pipeline = PackagingPipeline::new(&config, crate::command::SystemRunner);
        let err = pipeline
            .invocation(PackagingStage::UnlockKeychain)
            .unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::MissingCredential {
                variable: ENV_KEYCHAIN_PASSWORD,
                ..
            }
        ));
    }

    #[test]
    fn stage_states_follow_the_declared_order() {
        let completed: Vec<_> = PackagingStage::ALL
            .iter()
            .map(PackagingStage::completes)
            .collect();
        assert_eq!(
            completed,
            [
                PackagingState::CredentialsChecked,
                PackagingState::KeychainUnlocked,
                PackagingState::BinarySigned,
                PackagingState::PackageBuilt,
                PackagingState::PackageSigned,
                PackagingState::Verified,
            ]
        );
        assert!(PackagingState::Verified.is_terminal());
        assert!(PackagingState::Failed(PackagingStage::BuildPackage).is_terminal());
        assert!(!PackagingState::PackageBuilt.is_terminal());
    }
}
