//! # Semimatch CLI (`semimatch`)
//!
//! The `semimatch` binary starts the HTTP service and offers one-shot
//! commands that run the same pipelines inline, against a transient
//! in-memory store.
//!
//! ## Usage
//!
//! ```bash
//! semimatch --config ./config/semimatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `semimatch serve` | Start the HTTP server and background worker |
//! | `semimatch ingest-csv <file>` | Parse a CSV and report what would be ingested |
//! | `semimatch ingest-pdf <file>` | Extract fragments from a PDF and report them |
//! | `semimatch compare <csv> "<query>"` | Ingest a CSV and rank a query against it |
//! | `semimatch projects` | List collections on a running server |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use semimatch::config::{load_config, Config};
use semimatch::embedding::create_embedder;
use semimatch::rescore::Rescorer;
use semimatch::store::MemoryVectorStore;
use semimatch::{compare, extract, ingest, server};

/// Semantic similarity matching service over CSV and PDF content.
#[derive(Parser)]
#[command(
    name = "semimatch",
    about = "Semantic similarity matching over CSV rows and PDF problem sets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/semimatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and background worker.
    ///
    /// Binds to the address in `[server].bind` and runs until terminated.
    Serve,

    /// Parse a CSV file and ingest it into a transient collection.
    ///
    /// Reports how many rows parsed and how many were unique. Useful for
    /// checking a file before uploading it to a running server.
    IngestCsv {
        /// Path to the CSV file.
        file: PathBuf,

        /// Collection name to use.
        #[arg(long, default_value = "cli")]
        project: String,
    },

    /// Extract problem fragments from a PDF and ingest them into a
    /// transient collection.
    IngestPdf {
        /// Path to the PDF file.
        file: PathBuf,

        /// Collection name to use.
        #[arg(long, default_value = "cli")]
        project: String,

        /// Print each extracted fragment instead of just counts.
        #[arg(long)]
        show: bool,
    },

    /// Ingest a CSV file and rank a query against it, printing the top
    /// matches as JSON.
    Compare {
        /// Path to the CSV file.
        file: PathBuf,

        /// The query text to rank.
        query: String,

        /// Skip the rescoring pass even if one is configured.
        #[arg(long)]
        no_rescore: bool,
    },

    /// List collections on a running server (uses `[server].bind`).
    Projects,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "semimatch=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve => server::run_server(&config).await,
        Commands::IngestCsv { file, project } => ingest_csv_cmd(&config, &file, &project).await,
        Commands::IngestPdf {
            file,
            project,
            show,
        } => ingest_pdf_cmd(&config, &file, &project, show).await,
        Commands::Compare {
            file,
            query,
            no_rescore,
        } => compare_cmd(&config, &file, &query, no_rescore).await,
        Commands::Projects => projects_cmd(&config).await,
    }
}

async fn ingest_csv_cmd(config: &Config, file: &PathBuf, project: &str) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let store = MemoryVectorStore::shared();
    let embedder = create_embedder(&config.embedding)?;

    let outcome = ingest::ingest_csv(&store, &embedder, project, &bytes).await?;
    println!(
        "Ingested {} rows into '{}' ({} unique).",
        outcome.total, project, outcome.added
    );
    Ok(())
}

async fn ingest_pdf_cmd(
    config: &Config,
    file: &PathBuf,
    project: &str,
    show: bool,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if show {
        let pages = extract::pdf_pages(&bytes)?;
        let fragments = extract::extract_fragments(&pages);
        for frag in &fragments {
            println!("--- page {} ---\n{}\n", frag.page, frag.text);
        }
        println!("{} fragments.", fragments.len());
        return Ok(());
    }

    let store = MemoryVectorStore::shared();
    let embedder = create_embedder(&config.embedding)?;
    let outcome = ingest::ingest_document(&store, &embedder, project, bytes).await?;
    println!(
        "Extracted {} problems into '{}' ({} unique).",
        outcome.total, project, outcome.added
    );
    Ok(())
}

async fn compare_cmd(
    config: &Config,
    file: &PathBuf,
    query: &str,
    no_rescore: bool,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let store = MemoryVectorStore::shared();
    let embedder = create_embedder(&config.embedding)?;

    let rescorer = if !no_rescore && config.rescoring.is_enabled() {
        Some(Rescorer::from_config(&config.rescoring)?)
    } else {
        None
    };

    let project = "cli";
    ingest::ingest_csv(&store, &embedder, project, &bytes).await?;
    let matches = compare::compare(&store, &embedder, rescorer.as_ref(), project, query)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(())
}

async fn projects_cmd(config: &Config) -> anyhow::Result<()> {
    let url = format!("http://{}/projects", config.server.bind);
    let resp = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", url))?;
    let body: serde_json::Value = resp.json().await.context("Invalid /projects response")?;

    match body["projects"].as_array() {
        Some(projects) if !projects.is_empty() => {
            for p in projects {
                if let Some(name) = p.as_str() {
                    println!("{}", name);
                }
            }
        }
        _ => println!("No projects."),
    }
    Ok(())
}
