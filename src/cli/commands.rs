//! CLI command definitions for neuroadapt.
//!
//! The CLI drives the same pipeline a host editor embeds: it reads an
//! adaptation request from a JSON file, runs it, and prints JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::fingerprint::{canonical_form, fingerprint};
use crate::llm::{ProviderId, ProviderRegistry, ScriptedProvider};
use crate::pipeline::AdaptationPipeline;
use crate::prompts;
use crate::request::AdaptationRequest;

/// Provider id used for `--offline` runs.
const OFFLINE_PROVIDER: &str = "offline";

/// How long `adapt` waits for in-flight work when shutting down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Adaptive rewriting of programming assignments for neurodivergent learners.
#[derive(Parser)]
#[command(name = "neuroadapt")]
#[command(about = "Adapt programming assignments for neurodivergent learners")]
#[command(version)]
#[command(
    long_about = "neuroadapt rewrites an assignment snapshot for a learner profile through a cached, de-duplicated, retried and validated LLM pipeline.\n\nExample usage:\n  neuroadapt adapt --request request.json --config neuroadapt.yaml\n  neuroadapt adapt --request request.json --offline script.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Adapt an assignment and print the adapted content as JSON.
    Adapt(AdaptArgs),

    /// Print the fingerprint (cache key) of a request.
    #[command(alias = "fp")]
    Fingerprint(FingerprintArgs),

    /// Print the prompt a request renders to, without calling any provider.
    Render(RenderArgs),

    /// List configured providers in preference order.
    Providers(ProvidersArgs),
}

/// Arguments for `neuroadapt adapt`.
#[derive(Parser, Debug)]
pub struct AdaptArgs {
    /// Adaptation request JSON file.
    #[arg(short, long)]
    pub request: PathBuf,

    /// Pipeline configuration YAML file. `NEUROADAPT_*` variables override it.
    #[arg(short, long, env = "NEUROADAPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Replay provider replies from a script file instead of calling a
    /// network provider.
    #[arg(long)]
    pub offline: Option<PathBuf>,

    /// Print the attempt trail and usage report alongside the content.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Arguments for `neuroadapt fingerprint`.
#[derive(Parser, Debug)]
pub struct FingerprintArgs {
    /// Adaptation request JSON file.
    #[arg(short, long)]
    pub request: PathBuf,

    /// Also print the canonical form that is hashed.
    #[arg(long)]
    pub canonical: bool,
}

/// Arguments for `neuroadapt render`.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Adaptation request JSON file.
    #[arg(short, long)]
    pub request: PathBuf,

    /// Print the chat message list instead of the raw payload.
    #[arg(long)]
    pub messages: bool,
}

/// Arguments for `neuroadapt providers`.
#[derive(Parser, Debug)]
pub struct ProvidersArgs {
    /// Pipeline configuration YAML file.
    #[arg(short, long, env = "NEUROADAPT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Adapt(args) => run_adapt_command(args).await,
        Commands::Fingerprint(args) => run_fingerprint_command(args),
        Commands::Render(args) => run_render_command(args),
        Commands::Providers(args) => run_providers_command(args),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

#[derive(Debug, Serialize)]
struct AdaptOutput<'a> {
    fingerprint: String,
    content: &'a crate::content::AdaptedContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<crate::llm::UsageReport>,
}

async fn run_adapt_command(args: AdaptArgs) -> anyhow::Result<()> {
    let request = load_request(&args.request)?;
    let mut config = load_config(args.config.as_deref())?;

    let registry = match &args.offline {
        Some(script) => {
            info!(script = %script.display(), "Running offline with scripted provider");
            config.provider_preference_order = vec![ProviderId::from(OFFLINE_PROVIDER)];
            config.providers.clear();
            let provider = ScriptedProvider::from_file(OFFLINE_PROVIDER, script)?;
            ProviderRegistry::new().with(Arc::new(provider))
        }
        None => ProviderRegistry::from_configs(&config.providers)?,
    };

    if registry.is_empty() {
        return Err(anyhow::anyhow!(
            "No providers configured. Add providers to the config file or use --offline <script.json>."
        ));
    }

    let pipeline = AdaptationPipeline::new(config, registry)?;
    let fp = fingerprint(&request);

    let result = pipeline.adapt(&request).await;
    if let Err(e) = pipeline.shutdown(SHUTDOWN_GRACE).await {
        warn!(error = %e, "Pipeline did not drain cleanly");
    }

    let content = match result {
        Ok(content) => content,
        Err(e) => {
            if let crate::error::PipelineError::Exhausted(exhausted) = &e {
                warn!(trail = %exhausted.summary(), "Adaptation failed");
                if args.verbose {
                    for attempt in &exhausted.attempts {
                        eprintln!("  {}", attempt);
                    }
                }
            }
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    let output = AdaptOutput {
        fingerprint: fp.to_string(),
        content: &content,
        usage: args.verbose.then(|| pipeline.usage_report()),
    };
    let json_output = serde_json::to_string_pretty(&output)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json_output);
    Ok(())
}

fn run_fingerprint_command(args: FingerprintArgs) -> anyhow::Result<()> {
    let request = load_request(&args.request)?;
    println!("{}", fingerprint(&request));
    if args.canonical {
        println!("{}", canonical_form(&request));
    }
    Ok(())
}

fn run_render_command(args: RenderArgs) -> anyhow::Result<()> {
    let request = load_request(&args.request)?;
    let payload = prompts::render(request.profile(), request.assignment(), request.context())?;

    let json_output = if args.messages {
        serde_json::to_string_pretty(&payload.to_messages())?
    } else {
        serde_json::to_string_pretty(&payload)?
    };
    println!("{}", json_output);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ProviderListing {
    id: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    preferred: Option<usize>,
}

fn run_providers_command(args: ProvidersArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;

    let order: Vec<&ProviderId> = if config.provider_preference_order.is_empty() {
        config.providers.iter().map(|p| &p.id).collect()
    } else {
        config.provider_preference_order.iter().collect()
    };

    let listing: Vec<ProviderListing> = config
        .providers
        .iter()
        .map(|p| ProviderListing {
            id: p.id.to_string(),
            kind: p.kind.to_string(),
            model: p.model.clone(),
            preferred: order.iter().position(|id| **id == p.id).map(|i| i + 1),
        })
        .collect();

    if listing.is_empty() {
        warn!("No providers configured");
    }
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn load_request(path: &Path) -> anyhow::Result<AdaptationRequest> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read request {}: {}", path.display(), e))?;
    AdaptationRequest::from_json(&text)
        .map_err(|e| anyhow::anyhow!("Invalid request {}: {}", path.display(), e))
}

/// Load the YAML config if given, then layer `NEUROADAPT_*` variables on top.
fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_adapt_offline() {
        let cli = Cli::try_parse_from([
            "neuroadapt",
            "adapt",
            "--request",
            "req.json",
            "--offline",
            "script.json",
        ])
        .expect("parses");

        match cli.command {
            Commands::Adapt(args) => {
                assert_eq!(args.request, PathBuf::from("req.json"));
                assert_eq!(args.offline, Some(PathBuf::from("script.json")));
                assert!(!args.verbose);
            }
            _ => panic!("expected adapt"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_parse_global_log_level() {
        let cli = Cli::try_parse_from(["neuroadapt", "fp", "-r", "req.json", "--log-level", "debug"])
            .expect("parses");
        assert!(matches!(cli.command, Commands::Fingerprint(_)));
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_load_request_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").expect("write");

        let err = load_request(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("neuroadapt.yaml");
        fs::write(&path, "max_attempts_per_provider: 4\n").expect("write");

        let config = load_config(Some(&path)).expect("loads");
        assert_eq!(config.max_attempts_per_provider, 4);
    }
}
