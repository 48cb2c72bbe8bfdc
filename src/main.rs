//! # Decision Twin CLI (`twin`)
//!
//! Builds a knowledge base from curated sources, answers decision questions
//! in the persona of a domain expert, and benchmarks answer quality with an
//! LLM judge.
//!
//! ## Usage
//!
//! ```bash
//! twin --config ./config/twin.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `twin init` | Create the SQLite database and schema |
//! | `twin sources` | List configured sources |
//! | `twin ingest` | Fetch, chunk, embed and store the source corpus |
//! | `twin ask "<query>"` | Ask the twin for a recommendation |
//! | `twin retrieve "<query>"` | Show the top-k chunks for a query |
//! | `twin evaluate` | Run the four-configuration benchmark and write the report |
//! | `twin export` / `twin import` | Move a knowledge base without re-embedding |
//! | `twin stats` | Knowledge base summary |
//! | `twin serve` | Start the HTTP API |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use decision_twin::{ask, config, evaluate, export, ingest, logging, migrate, server, sources, stats};
use decision_twin_core::prompt::PromptVersion;

/// Decision Twin: an expert persona grounded in a retrieved knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/twin.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "twin",
    about = "Decision Twin: expert-persona recommendations grounded in retrieved evidence",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/twin.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List the configured web, video and local sources.
    Sources,

    /// Fetch every source, chunk, embed and upsert into the collection.
    Ingest {
        /// Delete the collection's existing entries first.
        #[arg(long)]
        reset: bool,

        /// JSON file with `web_urls` and `video_ids`, replacing the configured lists.
        #[arg(long)]
        sources: Option<PathBuf>,
    },

    /// Ask the twin for a recommendation.
    Ask {
        query: String,

        /// Answer without retrieved context.
        #[arg(long)]
        no_rag: bool,

        /// Prompt template version: `v1` or `v2`.
        #[arg(long, default_value = "v2")]
        prompt: PromptVersion,

        /// Number of chunks to retrieve (defaults to `retrieval.top_k`).
        #[arg(short)]
        k: Option<usize>,

        /// Print the full answer record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the chunks nearest to a query.
    Retrieve {
        query: String,

        #[arg(short)]
        k: Option<usize>,
    },

    /// Run the evaluation benchmark and write results and report.
    Evaluate {
        /// Subset of configurations (norag_v1, norag_v2, rag_v1, rag_v2).
        #[arg(long, num_args = 1..)]
        configs: Vec<String>,

        /// Rebuild the report from the saved results without calling any model.
        #[arg(long)]
        report_only: bool,

        /// Only evaluate the first N queries.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Export the collection as JSON (`{ids, documents, metadatas, embeddings}`).
    Export {
        /// Output file path. If omitted, writes to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import a JSON export into the collection.
    Import { file: PathBuf },

    /// Show knowledge base statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg.sources);
        }
        Commands::Ingest { reset, sources } => {
            ingest::run_ingest(&cfg, reset, sources.as_deref()).await?;
        }
        Commands::Ask {
            query,
            no_rag,
            prompt,
            k,
            json,
        } => {
            ask::run_ask(&cfg, &query, no_rag, prompt, k, json).await?;
        }
        Commands::Retrieve { query, k } => {
            ask::run_retrieve(&cfg, &query, k).await?;
        }
        Commands::Evaluate {
            configs,
            report_only,
            limit,
        } => {
            evaluate::run_evaluate(&cfg, &configs, report_only, limit).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Import { file } => {
            export::run_import(&cfg, &file).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
