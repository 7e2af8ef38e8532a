//! # esalert, the Elasticsearch alerting daemon
//!
//! Runs every rule in the rules directory on its schedule and delivers
//! matching results through the rule's outputs.
//!
//! Usage:
//!   esalert                                  # ~/.esalert/config.toml, ~/.esalert/rules
//!   esalert --config ./esalert.toml          # Custom config
//!   esalert --rules-dir ./rules --check      # Validate everything and exit

use anyhow::{Context, Result};
use clap::Parser;
use esalert_core::{AlertConfig, config::load_rules};
use esalert_dispatch::{DispatchEngine, build_methods};
use esalert_scheduler::{EsClient, QueryHandler, QueryHandlerConfig, SearchBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "esalert",
    version,
    about = "🚨 esalert - scheduled Elasticsearch queries with alert delivery"
)]
struct Cli {
    /// Main config file (default: $ESALERT_CONFIG_FILE or ~/.esalert/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Rules directory (overrides the config file and $ESALERT_RULES_DIR)
    #[arg(short, long)]
    rules_dir: Option<String>,

    /// Validate config, rules and outputs, then exit
    #[arg(long)]
    check: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        "esalert=debug,esalert_core=debug,esalert_scheduler=debug,esalert_dispatch=debug"
    } else {
        "esalert=info,esalert_core=info,esalert_scheduler=info,esalert_dispatch=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => AlertConfig::load_from(&PathBuf::from(shellexpand::tilde(path).to_string())),
        None => AlertConfig::load(),
    }
    .context("error loading main configuration")?;

    let rules_dir = match &cli.rules_dir {
        Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
        None => config.rules_path(),
    };
    let rules = load_rules(&rules_dir).context("error loading rules")?;
    if rules.is_empty() {
        anyhow::bail!("no rules found in {}", rules_dir.display());
    }

    let client: Arc<dyn SearchBackend> =
        Arc::new(EsClient::new(&config.elasticsearch).context("error creating Elasticsearch client")?);

    let mut handlers = Vec::with_capacity(rules.len());
    for rule in &rules {
        let methods = build_methods(&rule.outputs)
            .with_context(|| format!("error building outputs for rule '{}'", rule.name))?;
        let handler = QueryHandler::new(QueryHandlerConfig::from_rule(rule, client.clone(), methods))
            .with_context(|| format!("error in rule '{}'", rule.name))?;
        handlers.push(handler);
    }

    if cli.check {
        println!("✅ Configuration OK: {} rule(s) in {}", handlers.len(), rules_dir.display());
        for handler in &handlers {
            println!("   • {}", handler.name());
        }
        return Ok(());
    }

    let root = CancellationToken::new();
    let (alerts_tx, alerts_rx) = mpsc::channel(config.dispatch.intake_capacity);
    let dispatch = DispatchEngine::new(&config.dispatch).spawn(alerts_rx, root.clone());

    let runners: Vec<_> = handlers
        .into_iter()
        .map(|handler| tokio::spawn(handler.run(alerts_tx.clone(), root.child_token())))
        .collect();
    drop(alerts_tx);

    tracing::info!(
        "🚀 esalert started: {} rule(s) against {}",
        runners.len(),
        config.elasticsearch.server.url
    );

    tokio::signal::ctrl_c().await.context("error waiting for Ctrl-C")?;
    tracing::info!("🛑 Shutting down...");
    root.cancel();

    for result in futures::future::join_all(runners).await {
        if let Err(e) = result {
            tracing::error!("Query runner panicked: {e}");
        }
    }
    dispatch.wait().await;
    tracing::info!("👋 esalert stopped");
    Ok(())
}
