use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use broker_release::ReleaseError;
use broker_release::artifact::plan;
use broker_release::command::SystemRunner;
use broker_release::config::{PackagingConfig, PublishConfig, ReleaseFile};
use broker_release::manifest::write_manifest;
use broker_release::observability::{MetricsCollector, log_snapshot};
use broker_release::packaging::PackagingPipeline;
use broker_release::publish::Publisher;
use broker_release::upload::HttpUploader;
use broker_release::validation::{ValidationReport, validate_packaging, validate_publish};
use broker_release::version::Version;
use clap::{Args, Parser, Subcommand};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

#[cfg(feature = "otel")]
use opentelemetry::KeyValue;
#[cfg(feature = "otel")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "otel")]
use opentelemetry_sdk::{resource::Resource, trace as sdktrace};

fn main() -> Result<()> {
    let cli = Cli::parse();

    configure_tracing(cli.otlp_endpoint.as_deref())?;

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let release_file = match &cli.config {
        Some(path) => ReleaseFile::load(path)?,
        None => ReleaseFile::default(),
    };

    let command_result = match cli.command {
        Commands::Publish {
            version,
            dry_run,
            manifest,
            metrics,
        } => {
            let config = PublishConfig::from_env(&root, &release_file);
            if dry_run {
                print_plan(&config, &version)
            } else {
                publish(&config, &version, manifest, &metrics)
            }
        }
        Commands::Plan { version } => {
            let config = PublishConfig::from_env(&root, &release_file);
            print_plan(&config, &version)
        }
        Commands::PackageMacos { metrics } => {
            let config = PackagingConfig::from_env(&root, &release_file);
            package_macos(&config, &metrics)
        }
        Commands::Validate { target } => match target {
            ValidateTarget::Publish { version } => {
                let config = PublishConfig::from_env(&root, &release_file);
                report_validation("publish", validate_publish(&config, &version))
            }
            ValidateTarget::PackageMacos => {
                let config = PackagingConfig::from_env(&root, &release_file);
                report_validation("package-macos", validate_packaging(&config))
            }
        },
    };

    #[cfg(feature = "otel")]
    if cli.otlp_endpoint.is_some() {
        opentelemetry::global::shutdown_tracer_provider();
    }

    command_result
}

fn configure_tracing(otlp_endpoint: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    #[cfg(feature = "otel")]
    {
        if let Some(endpoint) = otlp_endpoint {
            let tracer =
                opentelemetry_otlp::new_pipeline()
                    .tracing()
                    .with_trace_config(sdktrace::Config::default().with_resource(Resource::new(
                        vec![KeyValue::new("service.name", "broker-release")],
                    )))
                    .with_exporter(
                        opentelemetry_otlp::new_exporter()
                            .tonic()
                            .with_endpoint(endpoint),
                    )
                    .install_simple()?;

            return tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|err| anyhow!(err.to_string()));
        }
    }

    #[cfg(not(feature = "otel"))]
    if let Some(endpoint) = otlp_endpoint {
        eprintln!(
            "warning: --otlp-endpoint '{endpoint}' requested but OpenTelemetry support is not enabled. Rebuild with --features otel."
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))
}

fn print_plan(config: &PublishConfig, version: &str) -> Result<()> {
    let version = Version::parse(version)?;
    println!(
        "Publishing {} v{} to {}/{}",
        config.target.project,
        version,
        config.target.project_root(),
        version.bucket_path()
    );
    for remote in plan(&config.artifacts, &version, &config.target) {
        println!("- {} -> {}", remote.local_name, remote.url);
    }
    Ok(())
}

fn publish(
    config: &PublishConfig,
    version: &str,
    manifest: Option<PathBuf>,
    metrics: &MetricsArgs,
) -> Result<()> {
    // Rejected before any client or file is touched.
    let version = Version::parse(version)?;
    let publisher = Publisher::new(config, HttpUploader::new()?);
    let outcome = publisher.publish_version(&version);
    let report = metrics.emit_after(outcome, &publisher.metrics())?;

    info!(
        project = %report.project,
        version = %report.version,
        uploads = report.uploads.len(),
        "All artifacts published"
    );

    if let Some(path) = manifest {
        write_manifest(&report, &path)?;
        info!(manifest = %path.display(), "Publish manifest written");
    }
    Ok(())
}

fn package_macos(config: &PackagingConfig, metrics: &MetricsArgs) -> Result<()> {
    let pipeline = PackagingPipeline::new(config, SystemRunner);
    let outcome = pipeline.run();
    let report = metrics.emit_after(outcome, &pipeline.metrics())?;
    info!(package = %report.output_package.display(), "Packaging complete");
    Ok(())
}

fn report_validation(label: &str, report: ValidationReport) -> Result<()> {
    for warning in &report.warnings {
        warn!(target_pipeline = label, "{warning}");
    }

    if report.is_ok() {
        info!(target_pipeline = label, "Preflight validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(target_pipeline = label, "{error_msg}");
        }
        Err(anyhow!(
            "Preflight validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

#[derive(Parser)]
#[command(
    name = "broker-release",
    version,
    about = "Publish RDMnet Broker release artifacts and build the signed macOS installer"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Repository root that staged files and packaging paths are relative to.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// YAML file with non-secret release settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long = "otlp-endpoint", global = true)]
    otlp_endpoint: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload every staged artifact for VERSION.
    Publish {
        version: String,
        /// Print the remote locations instead of uploading.
        #[arg(long)]
        dry_run: bool,
        /// Write a YAML record of the uploads after a successful run.
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Show where each staged artifact would be uploaded.
    Plan { version: String },
    /// Sign, build, sign and verify the macOS installer package.
    PackageMacos {
        #[command(flatten)]
        metrics: MetricsArgs,
    },
    /// Check credentials and inputs without uploading or signing.
    Validate {
        #[command(subcommand)]
        target: ValidateTarget,
    },
}

#[derive(Subcommand)]
enum ValidateTarget {
    Publish { version: String },
    PackageMacos,
}

#[derive(Args)]
struct MetricsArgs {
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
}

impl MetricsArgs {
    /// Emits metrics once a run has finished. A failed run keeps its own error;
    /// a metrics write failure is then only logged.
    fn emit_after<T>(
        &self,
        outcome: std::result::Result<T, ReleaseError>,
        collector: &MetricsCollector,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.emit(collector)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(emit_err) = self.emit(collector) {
                    warn!("{emit_err:#}");
                }
                Err(err.into())
            }
        }
    }

    fn emit(&self, collector: &MetricsCollector) -> Result<()> {
        if !self.print_metrics && self.metrics_json.is_none() {
            return Ok(());
        }
        let snapshot = collector.snapshot();
        if self.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = &self.metrics_json {
            ensure_parent(path)?;
            let file = File::create(path)
                .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
            to_writer_pretty(file, &snapshot)
                .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
            info!(metrics = %path.display(), "Metrics JSON written");
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
