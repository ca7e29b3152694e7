//! `quarry` - acquire images, keywords and corroborated snippets from a
//! tiered provider chain.
//!
//! Results go to stdout as pretty JSON; logs go to stderr. A result in
//! which no provider succeeded is still a result and exits 0.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quarry_core::{AcquisitionRequest, Category, EngineConfig};
use quarry_runtime::{Engine, RequestContext};

#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Resilient multi-source acquisition: tiered providers, retries, health checks",
    version
)]
struct Cli {
    /// Engine config (YAML or JSON). Defaults to the built-in provider chain.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Give up on the request after this long (e.g. "15s").
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search images across the configured image providers.
    Images {
        /// Search keywords.
        keywords: String,

        /// Ask only this provider.
        #[arg(long)]
        source: Option<String>,

        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,

        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },

    /// Trending keywords for a category.
    Keywords {
        #[arg(long)]
        category: Category,

        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },

    /// Gather snippets about a subject and check that the sources agree.
    Corroborate {
        subject: String,
    },

    /// Probe every configured provider.
    Health,

    /// Validate a config file and list its providers.
    CheckConfig {
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => EngineConfig::builtin().context("built-in config is invalid"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A context cancelled by Ctrl-C and, when given, bounded by `timeout`.
fn request_context(timeout: Option<Duration>) -> RequestContext {
    let ctx = match timeout {
        Some(timeout) => RequestContext::new().with_timeout(timeout),
        None => RequestContext::new(),
    };

    let token = ctx.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling request");
            token.cancel();
        }
    });
    ctx
}

#[derive(Serialize)]
struct ProviderSummary<'a> {
    name: &'a str,
    kind: &'a str,
    tier: String,
    capability: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    credentials_present: Option<bool>,
}

fn check_config(path: &Path) -> Result<()> {
    let config = EngineConfig::from_file(path).with_context(|| format!("invalid config: {}", path.display()))?;

    let providers: Vec<ProviderSummary> = config
        .providers
        .iter()
        .map(|p| ProviderSummary {
            name: &p.name,
            kind: &p.kind,
            tier: p.tier.to_string(),
            capability: p.capability.to_string(),
            category: p.category.map(|c| c.to_string()),
            credentials_present: p
                .credential_env
                .as_deref()
                .map(|var| std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false)),
        })
        .collect();

    // building the engine also checks every adapter kind
    Engine::from_config(config.clone()).context("config is valid but providers could not be built")?;

    print_json(&serde_json::json!({
        "valid": true,
        "mode": config.mode,
        "providers": providers,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::CheckConfig { file } = &cli.command {
        return check_config(file);
    }

    let engine = Engine::from_config(load_config(cli.config.as_deref())?)?;
    let ctx = request_context(cli.timeout);

    match cli.command {
        Commands::Images {
            keywords,
            source,
            page,
            limit,
        } => {
            let mut request = AcquisitionRequest::new(keywords).with_page(page).with_limit(limit);
            if let Some(source) = source {
                request = request.pinned_to(source);
            }
            print_json(&engine.images(&request, &ctx).await?)
        }
        Commands::Keywords { category, limit } => {
            let request = AcquisitionRequest::new(category.to_string())
                .with_category(category)
                .with_limit(limit);
            print_json(&engine.keywords(&request, &ctx).await?)
        }
        Commands::Corroborate { subject } => {
            let request = AcquisitionRequest::new(subject);
            print_json(&engine.corroborate(&request, &ctx).await?)
        }
        Commands::Health => print_json(&engine.health_report().await?),
        Commands::CheckConfig { .. } => Ok(()),
    }
}
