//! Graphfold CLI
//!
//! Replays recorded query results through the engine and prints the
//! resulting dataset:
//!
//! ```text
//! graphfold render --fixture session.json --config style.json --format summary
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use graphfold_core::{
    EngineConfig, EventKind, FixtureRunner, FixtureSet, GraphEngine, GraphError, GraphEvent,
    RenderSummary,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphfold")]
#[command(author, version, about = "Graphfold: fold graph query results into a visualization dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the primary query against recorded results and print the dataset.
    Render {
        /// Recorded query results (JSON fixture set)
        #[arg(short, long)]
        fixture: PathBuf,
        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Primary query; overrides the configured initial query
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Full dataset snapshot as JSON
    Json,
    /// Counts and per-entity lines
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            fixture,
            config,
            query,
            format,
        } => cmd_render(fixture, config, query, format).await,
    }
}

async fn cmd_render(
    fixture: PathBuf,
    config: Option<PathBuf>,
    query: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut config = match config {
        Some(path) => EngineConfig::from_path(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(query) = query {
        config.initial_query = query;
    }
    if config.initial_query.is_empty() {
        anyhow::bail!("no query: pass --query or set `initial_query` in the config");
    }

    let fixtures = FixtureSet::from_path(&fixture)
        .with_context(|| format!("loading fixtures {}", fixture.display()))?;
    let runner = FixtureRunner::new(fixtures).with_parameter(&config.enrichment_parameter);

    let mut engine = GraphEngine::new(config, Arc::new(runner))?;
    for kind in [EventKind::Warning, EventKind::Error] {
        engine.on(
            kind,
            Box::new(|event| match event {
                GraphEvent::Warning { message, .. } => {
                    eprintln!("{} {}", "warning:".yellow().bold(), message)
                }
                GraphEvent::Error { message, .. } => {
                    eprintln!("{} {}", "error:".red().bold(), message)
                }
                _ => {}
            }),
        );
    }

    tracing::info!(query = engine.current_query(), "rendering");
    let outcome = engine.render().await;
    let summary = match outcome {
        Ok(summary) => {
            tracing::info!(
                records = summary.record_count,
                nodes = summary.node_count,
                edges = summary.edge_count,
                "render complete"
            );
            Some(summary)
        }
        // partial data is still worth printing
        Err(GraphError::Ingestion(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let snapshot = engine.dataset().read().snapshot();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Summary => print_summary(&engine, summary.as_ref(), &snapshot),
    }

    if summary.is_none() {
        anyhow::bail!("primary query `{}` failed; dataset is partial", engine.current_query());
    }
    Ok(())
}

fn print_summary(
    engine: &GraphEngine,
    summary: Option<&RenderSummary>,
    snapshot: &graphfold_core::DatasetSnapshot,
) {
    println!("{} {}", "Query:".bold(), engine.current_query().cyan());
    if let Some(summary) = summary {
        println!(
            "  {} records, {} nodes, {} edges",
            summary.record_count, summary.node_count, summary.edge_count
        );
        if summary.enrichments_issued > 0 {
            println!(
                "  {} size queries ({} failed)",
                summary.enrichments_issued, summary.enrichments_failed
            );
        }
    }

    println!("{}", "Nodes:".bold());
    for node in &snapshot.nodes {
        let value = node
            .value
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} [{}] value={}",
            format!("#{}", node.local_id).green(),
            node.caption,
            node.labels.join(":"),
            value
        );
    }

    println!("{}", "Edges:".bold());
    for edge in &snapshot.edges {
        println!(
            "  {} {} -[{}]-> {} value={}",
            format!("#{}", edge.local_id).green(),
            edge.source,
            edge.caption,
            edge.target,
            edge.value
        );
    }
}
