//! archivist CLI entry point

use anyhow::Context;
use archivist::{
    config::Config,
    embed::{create_embedder, RetryPolicy, TokioSleeper},
    pipeline::RunContext,
    schedule::run_scheduled,
    store::{IndexStore, PgStore},
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "archivist")]
#[command(version, about = "Incremental markdown indexer for pgvector", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one indexing pass and exit
    Run {
        /// Suppress the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Run on the configured cron schedule until interrupted
    Serve {
        /// Run one indexing pass before waiting for the schedule
        #[arg(long)]
        run_immediately: bool,
    },

    /// Show index statistics and recent file actions
    Status {
        /// Number of recent actions to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Embed a query and search the indexed chunks
    Search {
        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum cosine similarity (0-1)
        #[arg(short, long)]
        min_score: Option<f32>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let store = PgStore::connect(&config)
        .await
        .context("connecting to the database")?;
    store
        .init_schema(config.embedding.dimension)
        .await
        .context("initializing database schema")?;

    match cli.command {
        Commands::Run { quiet } => {
            let ctx = build_context(config, store, quiet)?;
            let report = ctx.run().await?;
            print_report(&report);
        }

        Commands::Serve { run_immediately } => {
            let ctx = build_context(config, store, true)?;
            run_scheduled(&ctx, run_immediately).await?;
        }

        Commands::Status { limit } => {
            let stats = store.table_stats().await?;
            println!("Documents: {}", stats.total_documents);
            println!("Chunks:    {}", stats.total_chunks);
            println!("History:   {} files", stats.indexed_files);

            let actions = store.recent_actions(limit).await?;
            if !actions.is_empty() {
                println!("\nRecent actions:");
                for action in actions {
                    let state = if action.processed_at.is_some() {
                        "done"
                    } else {
                        "pending"
                    };
                    println!(
                        "  {} {:7} {} [{}]",
                        action.run_timestamp.format("%Y-%m-%d %H:%M:%S"),
                        action.action_type.to_string(),
                        action.file_path,
                        state
                    );
                }
            }
        }

        Commands::Search {
            query,
            limit,
            min_score,
        } => {
            let embedder = create_embedder(&config.embedding)?;
            let embedding = embedder
                .embed(vec![query])
                .await?
                .into_iter()
                .next()
                .unwrap_or_default();

            let matches = store
                .search(
                    &embedding,
                    limit.unwrap_or(config.query.match_count),
                    min_score.unwrap_or(config.query.similarity_threshold),
                )
                .await?;

            if matches.is_empty() {
                println!("No matches.");
            }
            for (i, m) in matches.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({})",
                    i + 1,
                    m.similarity,
                    m.chunk_id,
                    m.heading.as_deref().unwrap_or("-")
                );
                let preview: String = m.text.chars().take(200).collect();
                println!("   {preview}");
            }
        }
    }

    Ok(())
}

fn build_context(config: Config, store: PgStore, quiet: bool) -> archivist::Result<RunContext> {
    let embedder = create_embedder(&config.embedding)?;
    let policy = RetryPolicy::from_config(&config.embedding);
    Ok(RunContext {
        config,
        store: Arc::new(store),
        embedder,
        sleeper: Arc::new(TokioSleeper),
        policy,
        quiet,
    })
}

fn print_report(report: &archivist::pipeline::RunReport) {
    println!(
        "Processed {} files: {} added, {} modified, {} deleted, {} skipped, {} failed",
        report.processed() + report.failed,
        report.added,
        report.modified,
        report.deleted,
        report.skipped,
        report.failed
    );
    if report.stats.total_chunks > 0 {
        println!(
            "Created {} chunks ({} words, {:.1} avg, ~{} embedding calls)",
            report.stats.total_chunks,
            report.stats.total_words,
            report.stats.avg_words,
            report.stats.estimated_api_calls
        );
    }
    for (path, message) in &report.failures {
        println!("  FAILED {path}: {message}");
    }
}
