use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tota_agent::{
    config::{Config, LogFormat},
    runlog::SqliteRunLog,
    search::RunStatus,
    storage::SqliteStorage,
    Agent, FanoutLog, LangbaseClient, LangbaseOracle, MarkdownRunLog,
};

/// Solve a task with a tree-of-thoughts search.
#[derive(Debug, Parser)]
#[command(name = "tota", version, about)]
struct Cli {
    /// The task to solve
    #[arg(short, long)]
    task: String,

    /// Override SEARCH_MAX_DEPTH
    #[arg(long)]
    max_depth: Option<usize>,

    /// Override SEARCH_MAX_NODES
    #[arg(long)]
    max_nodes: Option<usize>,

    /// Override SEARCH_MAX_ORACLE_CALLS
    #[arg(long)]
    max_oracle_calls: Option<u32>,

    /// Regenerate thoughts when a node is revisited after backtracking
    #[arg(long)]
    regenerate: bool,

    /// Skip creating the Langbase pipes at startup
    #[arg(long)]
    no_ensure_pipes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &cli);
    if let Err(e) = config.search.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "ToTA agent starting...");

    // Initialize Langbase client
    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    let oracle = LangbaseOracle::new(langbase, &config);
    if !cli.no_ensure_pipes {
        info!("Ensuring required Langbase pipes exist...");
        if let Err(e) = oracle.ensure_pipes().await {
            error!(error = %e, "Failed to ensure pipes exist");
            return Err(e.into());
        }
    }

    // Run log sinks
    let markdown = Arc::new(MarkdownRunLog::from_template(
        &config.output.log_path_template,
    ));
    let mut sinks = FanoutLog::new().with_sink(markdown.clone());

    if let Some(path) = &config.output.database_path {
        match SqliteStorage::new(path, config.output.database_max_connections).await {
            Ok(storage) => {
                info!(path = %path.display(), "Database initialized");
                sinks = sinks.with_sink(Arc::new(SqliteRunLog::new(Arc::new(storage))));
            }
            Err(e) => warn!(error = %e, "Database unavailable, continuing without it"),
        }
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let agent = Agent::new(config.search.clone(), Arc::new(oracle), Arc::new(sinks))
        .with_settings(config.summary())
        .with_cancellation(cancel);

    let outcome = agent.run(&cli.task).await;

    println!("Status: {}", outcome.status);
    println!("Reason: {}", outcome.reason);
    println!("Log file: {}", markdown.path().display());
    match &outcome.solution_path {
        Some(path) => {
            println!("Solution path:");
            for (i, step) in path.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
        None => println!("No solution found."),
    }

    if outcome.status == RunStatus::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(v) = cli.max_depth {
        config.search.max_depth = v;
    }
    if let Some(v) = cli.max_nodes {
        config.search.max_nodes = v;
    }
    if let Some(v) = cli.max_oracle_calls {
        config.search.max_oracle_calls = v;
    }
    if cli.regenerate {
        config.search.regenerate_thoughts_on_revisit = true;
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
