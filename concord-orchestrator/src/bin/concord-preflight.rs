//! Pre-flight validation of a unified configuration request.
//!
//! Runs the full validation pipeline against in-memory services seeded with
//! a model catalog and prints the result as JSON to stdout.
//!
//! Usage:
//!   concord-preflight --request <file> [--rules <file>] [--models <file>] [--config <file>]
//!
//! Exit status: 0 valid, 1 invalid, 2 usage or infrastructure error.

use concord_core::{ModelConfiguration, UnifiedConfigurationRequest};
use concord_orchestrator::{init_tracing, ConfigurationService, OrchestratorConfig};
use concord_services::InMemoryServices;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const USAGE: &str =
    "Usage: concord-preflight --request <file> [--rules <file>] [--models <file>] [--config <file>]";

#[derive(Debug, thiserror::Error)]
enum PreflightError {
    #[error("{0}")]
    Usage(String),
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error(transparent)]
    Config(#[from] concord_orchestrator::ConfigError),
    #[error(transparent)]
    Operation(#[from] concord_orchestrator::ConfigurationError),
    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct Args {
    request: Option<PathBuf>,
    rules: Option<PathBuf>,
    models: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<(PathBuf, Args), PreflightError> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();
    while let Some(flag) = raw.next() {
        let slot = match flag.as_str() {
            "--request" => &mut args.request,
            "--rules" => &mut args.rules,
            "--models" => &mut args.models,
            "--config" => &mut args.config,
            other => return Err(PreflightError::Usage(format!("unknown argument '{}'", other))),
        };
        let value = raw
            .next()
            .ok_or_else(|| PreflightError::Usage(format!("{} needs a value", flag)))?;
        *slot = Some(PathBuf::from(value));
    }
    let request = args
        .request
        .take()
        .ok_or_else(|| PreflightError::Usage("--request is required".to_string()))?;
    Ok((request, args))
}

/// JSON unless the extension says YAML.
fn load<T: DeserializeOwned>(path: &Path) -> Result<T, PreflightError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PreflightError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let parsed = if yaml {
        serde_yaml::from_str(&contents).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| PreflightError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

async fn run() -> Result<bool, PreflightError> {
    let (request_path, args) = parse_args(std::env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::from_path(path)?,
        None => OrchestratorConfig::from_env(),
    };
    if let Some(rules) = args.rules {
        config.rules_path = Some(rules);
    }
    if let Err(e) = init_tracing(config.log_format) {
        eprintln!("{}", e);
    }

    let catalog: Vec<ModelConfiguration> = match &args.models {
        Some(path) => load(path)?,
        None => {
            tracing::warn!("No model catalog given; every model reference will be unknown");
            Vec::new()
        }
    };
    let request: UnifiedConfigurationRequest = load(&request_path)?;

    let services = InMemoryServices::new(catalog);
    let orchestrator = ConfigurationService::builder(services.domain())
        .config(config)
        .build()?;

    let result = orchestrator.validate_unified_configuration(&request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_valid)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{}", e);
            if matches!(e, PreflightError::Usage(_)) {
                eprintln!("{}", USAGE);
            }
            ExitCode::from(2)
        }
    }
}
