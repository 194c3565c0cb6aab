use serde::Serialize;

use crate::config::{
    ENV_API_KEY, ENV_DEVELOPER_ID_PASSWORD, ENV_DEVELOPER_ID_USER, ENV_KEYCHAIN_PASSWORD,
    PackagingConfig, PublishConfig,
};
use crate::version::Version;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Checks a publish run could start: version, API key and staged files.
/// Nothing is uploaded.
pub fn validate_publish(config: &PublishConfig, version: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Err(err) = Version::parse(version) {
        report.errors.push(err.to_string());
    }

    if config.api_key.is_none() {
        report
            .errors
            .push(format!("{ENV_API_KEY} is not set; uploads cannot authenticate"));
    }

    if !config.target.base_url.starts_with("https://") {
        report.warnings.push(format!(
            "Repository URL '{}' does not use HTTPS",
            config.target.base_url
        ));
    }

    report.merge(validate_staged_files(config));
    report
}

/// Checks every staged file in the catalog exists, is a regular file and is
/// readable. Empty files only warn.
pub fn validate_staged_files(config: &PublishConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    for artifact in &config.artifacts {
        let path = artifact.local_path(&config.root);
        match std::fs::metadata(&path) {
            Ok(meta) if !meta.is_file() => report
                .errors
                .push(format!("Staged artifact {} is not a file", path.display())),
            Ok(meta) if meta.len() == 0 => report
                .warnings
                .push(format!("Staged artifact {} is empty", path.display())),
            Ok(_) => {}
            Err(err) => report.errors.push(format!(
                "Staged artifact {} is not readable: {err}",
                path.display()
            )),
        }
    }

    report
}

/// Checks the packaging pipeline's credentials and inputs without running any
/// tool.
pub fn validate_packaging(config: &PackagingConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.notarization.account.is_none() {
        report
            .errors
            .push(format!("{ENV_DEVELOPER_ID_USER} is not set; cannot notarize"));
    }
    if config.notarization.secret.is_none() {
        report
            .errors
            .push(format!("{ENV_DEVELOPER_ID_PASSWORD} is not set; cannot notarize"));
    }
    if config.keychain_password.is_none() {
        report.errors.push(format!(
            "{ENV_KEYCHAIN_PASSWORD} is not set; keychain cannot be unlocked"
        ));
    }

    for (label, path) in [
        ("Service executable", &config.executable),
        ("Packaging project", &config.package_project),
    ] {
        let resolved = config.resolve(path);
        if !resolved.is_file() {
            report
                .errors
                .push(format!("{label} {} not found", resolved.display()));
        }
    }

    if !config.keychain_path.exists() {
        report.warnings.push(format!(
            "Keychain {} not found on this host",
            config.keychain_path.display()
        ));
    }

    if !cfg!(target_os = "macos") {
        report
            .warnings
            .push("Packaging tools are only available on macOS".into());
    }

    report
}
