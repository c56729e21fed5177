use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use runlane_core::{
    config::ConfigLoader, BackendKind, BackendOverride, BackendRegistry, ExecutionRequest,
    Orchestrator, RunlaneConfig,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(name = "runlane", author, version = "0.1.0", about = "Run a source file on the best available backend")]
struct Cli {
    /// Source file to execute
    file: PathBuf,

    #[clap(long, short, help = "Configuration file (YAML); defaults plus environment when omitted")]
    config: Option<PathBuf>,

    #[clap(long, short, help = "Language of the source; inferred from the file extension when omitted")]
    language: Option<String>,

    #[clap(long, short, help = "Input payload as a JSON document")]
    input: Option<String>,

    #[clap(long, help = "Wall-clock timeout in milliseconds")]
    timeout_ms: Option<u64>,

    #[clap(long, short, default_value = "auto", help = "Backend override, or 'auto' to let the policy decide")]
    backend: String,

    #[clap(long, help = "Isolation is required")]
    sandbox: bool,

    #[clap(long, help = "Route to the batch cluster")]
    long_running: bool,

    #[clap(long, help = "Expected duration hint in milliseconds")]
    expected_duration_ms: Option<u64>,

    #[clap(long, help = "Request a GPU")]
    gpu: bool,

    #[clap(long, help = "Log level; overrides logging.level from the configuration")]
    log_level: Option<String>,
}

fn language_from_extension(file: &Path) -> Option<&'static str> {
    match file.extension()?.to_str()? {
        "js" | "mjs" | "cjs" => Some("javascript"),
        "ts" | "mts" => Some("typescript"),
        "py" => Some("python"),
        "sh" | "bash" => Some("bash"),
        _ => None,
    }
}

async fn load_config(cli: &Cli) -> Result<RunlaneConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigLoader::from_environment()?,
    };
    Ok(config)
}

fn build_request(cli: &Cli, config: &RunlaneConfig, source: String) -> Result<ExecutionRequest> {
    let language = match &cli.language {
        Some(language) => language.clone(),
        None => language_from_extension(&cli.file)
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "Cannot infer the language of {}; pass --language",
                    cli.file.display()
                )
            })?,
    };

    let backend: BackendOverride = cli
        .backend
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid --backend '{}': {}", cli.backend, e))?;

    let mut request = ExecutionRequest::new(language, source)
        .with_timeout_ms(cli.timeout_ms.unwrap_or(config.defaults.timeout_ms))
        .with_backend(backend)
        .with_sandbox(cli.sandbox)
        .with_long_running(cli.long_running);

    if let Some(expected) = cli.expected_duration_ms {
        request = request.with_expected_duration_ms(expected);
    }
    if let Some(input) = &cli.input {
        let payload = serde_json::from_str(input).context("--input is not valid JSON")?;
        request = request.with_input(payload);
    }
    request.resource_hints.gpu = cli.gpu;

    Ok(request)
}

/// `--log-level` wins over `logging.level`; both must name a real level.
fn log_level(flag: Option<&str>, config: &RunlaneConfig) -> Result<LevelFilter> {
    match flag {
        Some(level) => level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow::anyhow!("Invalid --log-level '{}'", level)),
        None => Ok(config.logging.level_filter()?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    let level = log_level(cli.log_level.as_deref(), &config)?;
    env_logger::Builder::new().filter_level(level).init();

    let source = tokio::fs::read_to_string(&cli.file)
        .await
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let request = build_request(&cli, &config, source)?;

    let registry = BackendRegistry::from_config(&config);
    log::debug!(
        "Wired backends: {}",
        registry
            .kinds()
            .iter()
            .map(BackendKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let orchestrator = Orchestrator::new(registry, &config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling execution");
            on_interrupt.cancel();
        }
    });

    let result = orchestrator.execute_with_cancel(&request, &cancel).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_flag_overrides_config() {
        let config = RunlaneConfig::default();
        assert_eq!(log_level(Some("debug"), &config).unwrap(), LevelFilter::Debug);
        assert_eq!(log_level(None, &config).unwrap(), LevelFilter::Info);
    }

    #[test]
    fn test_invalid_log_level_flag_is_rejected() {
        let config = RunlaneConfig::default();
        let error = log_level(Some("chatty"), &config).unwrap_err();
        assert!(error.to_string().contains("chatty"));
    }

    #[test]
    fn test_language_inferred_from_extension() {
        assert_eq!(language_from_extension(Path::new("job.py")), Some("python"));
        assert_eq!(language_from_extension(Path::new("job.mts")), Some("typescript"));
        assert_eq!(language_from_extension(Path::new("job.rb")), None);
    }
}
