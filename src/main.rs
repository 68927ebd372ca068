//! # Synapse CLI (`synapse`)
//!
//! The `synapse` binary is the operator interface for the knowledge engine:
//! database setup, dataset import, ingestion, retrieval, question
//! answering, digest and brief synthesis, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! synapse --config ./config/synapse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `synapse init` | Create the SQLite database and run schema migrations |
//! | `synapse import <file>` | Upsert companies, users, documents, and personal records from JSON |
//! | `synapse ingest` | Classify and index one document or a whole company |
//! | `synapse remove` | Drop a document's knowledge entry and vectors |
//! | `synapse exclude` | Mark a document excluded (or included again) |
//! | `synapse search` | Authority-ranked retrieval for a user |
//! | `synapse conflicts` | Check whether top financial sources disagree |
//! | `synapse context` | Assemble the six-source personal context |
//! | `synapse ask` | Answer a question, or ask for clarification on conflict |
//! | `synapse digest` | Generate the daily digest for one or all users |
//! | `synapse dismiss-digest` | Mark a day's digest dismissed |
//! | `synapse brief` | Generate a meeting brief for a calendar event |
//! | `synapse log-interaction` | Record a touchpoint with a contact |
//! | `synapse serve` | Start the HTTP API |
//!
//! Query commands print JSON to stdout. Logs go to stderr; set `RUST_LOG`
//! to change the level.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use synapse::config::{self, Config};
use synapse::dataset;
use synapse::db;
use synapse::engine::Engine;
use synapse::jobs::parse_date;
use synapse::logging;
use synapse::migrate;
use synapse::server;
use synapse::sqlite_store::SqliteStore;
use synapse_core::digest::DigestOutcome;
use synapse_core::ingest::IngestOutcome;
use synapse_core::models::InteractionKind;

/// Synapse: authority-weighted knowledge retrieval with conflict
/// detection, personal context assembly, and digest/brief synthesis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/synapse.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "synapse",
    about = "Synapse: knowledge retrieval and synthesis engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/synapse.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it against an existing database is safe.
    Init,

    /// Import a JSON dataset.
    ///
    /// Records are upserted by id. With `--ingest`, every imported document
    /// is indexed afterwards.
    Import {
        file: PathBuf,

        #[arg(long)]
        ingest: bool,
    },

    /// Classify, embed, and index documents.
    Ingest {
        /// A single document id.
        #[arg(long, conflicts_with = "company", required_unless_present = "company")]
        document: Option<String>,

        /// Every document of this company.
        #[arg(long)]
        company: Option<String>,
    },

    /// Remove a document from the knowledge base.
    Remove {
        #[arg(long)]
        document: String,

        #[arg(long)]
        company: String,
    },

    /// Exclude a document from retrieval, purging anything already indexed.
    Exclude {
        #[arg(long)]
        document: String,

        /// Clear the flag and re-index instead.
        #[arg(long)]
        include: bool,
    },

    /// Retrieve knowledge ranked by relevance × authority.
    Search {
        query: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Detect disagreeing figures among the top financial sources.
    Conflicts {
        query: String,

        #[arg(long)]
        user: String,
    },

    /// Assemble personal context for a query.
    Context {
        query: String,

        #[arg(long)]
        user: String,
    },

    /// Answer a question from company knowledge and personal context.
    Ask {
        question: String,

        #[arg(long)]
        user: String,
    },

    /// Generate a daily digest.
    Digest {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        user: Option<String>,

        /// Generate for every user.
        #[arg(long)]
        all: bool,

        /// UTC date (YYYY-MM-DD); defaults to today.
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Mark a daily digest dismissed.
    DismissDigest {
        #[arg(long)]
        user: String,

        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },

    /// Generate (or regenerate) the brief for a calendar event.
    Brief {
        #[arg(long)]
        user: String,

        #[arg(long)]
        event: String,
    },

    /// Record an interaction with a contact.
    LogInteraction {
        #[arg(long)]
        user: String,

        /// Contact email address.
        #[arg(long)]
        contact: String,

        /// email, meeting, call, or note.
        #[arg(long, default_value = "note")]
        kind: InteractionKind,

        #[arg(long)]
        summary: String,

        /// Unix seconds; defaults to now.
        #[arg(long)]
        at: Option<i64>,
    },

    /// Start the HTTP API server.
    Serve,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file, ingest } => run_import(&cfg, &file, ingest).await?,
        Commands::Ingest { document, company } => {
            let engine = Engine::open(&cfg).await?;
            match (document, company) {
                (Some(id), _) => print_json(&engine.ingest(&id).await?)?,
                (None, Some(company)) => print_json(&engine.ingest_all(&company).await?)?,
                (None, None) => anyhow::bail!("pass --document or --company"),
            }
        }
        Commands::Remove { document, company } => {
            let engine = Engine::open(&cfg).await?;
            let removed = engine.remove_document(&document, &company).await?;
            println!("Removed {} vector record(s) for {}.", removed, document);
        }
        Commands::Exclude { document, include } => {
            let store = SqliteStore::new(db::connect(&cfg).await?);
            if !store.set_document_excluded(&document, !include).await? {
                anyhow::bail!("document not found: {}", document);
            }
            // Re-ingesting indexes an included document and purges an excluded one
            let engine = Engine::open(&cfg).await?;
            print_json(&engine.ingest(&document).await?)?;
        }
        Commands::Search { query, user, limit } => {
            let engine = Engine::open(&cfg).await?;
            print_json(&engine.retrieve(&user, &query, limit).await?)?;
        }
        Commands::Conflicts { query, user } => {
            let engine = Engine::open(&cfg).await?;
            print_json(&engine.detect_conflicts(&user, &query).await?)?;
        }
        Commands::Context { query, user } => {
            let engine = Engine::open(&cfg).await?;
            print_json(&engine.build_context(&user, &query, None).await?)?;
        }
        Commands::Ask { question, user } => {
            let engine = Engine::open(&cfg).await?;
            print_json(&engine.ask(&user, &question).await?)?;
        }
        Commands::Digest { user, all, date } => {
            let engine = Engine::open(&cfg).await?;
            let now = Utc::now();
            let date = date.unwrap_or_else(|| now.date_naive());
            if all {
                print_json(&engine.run_daily_digests(date, now.timestamp()).await?)?;
            } else if let Some(user) = user {
                let outcome = engine.generate_digest(&user, date, now.timestamp()).await?;
                if let DigestOutcome::Skipped(_) = &outcome {
                    info!(user_id = %user, %date, "digest already exists");
                }
                print_json(&outcome.into_digest())?;
            }
        }
        Commands::DismissDigest { user, date } => {
            let engine = Engine::open(&cfg).await?;
            engine.dismiss_digest(&user, date).await?;
            println!("Digest for {} on {} dismissed.", user, date);
        }
        Commands::Brief { user, event } => {
            let engine = Engine::open(&cfg).await?;
            let brief = engine
                .generate_brief(&user, &event, Utc::now().timestamp())
                .await?;
            print_json(&brief)?;
        }
        Commands::LogInteraction {
            user,
            contact,
            kind,
            summary,
            at,
        } => {
            let engine = Engine::open(&cfg).await?;
            let occurred_at = at.unwrap_or_else(|| Utc::now().timestamp());
            let interaction = engine
                .log_interaction(&user, &contact, kind, &summary, occurred_at)
                .await?;
            print_json(&interaction)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_import(cfg: &Config, file: &std::path::Path, ingest: bool) -> Result<()> {
    let data = dataset::load_dataset(file)?;
    let store = SqliteStore::new(db::connect(cfg).await?);
    let summary = dataset::import(&store, data).await?;
    println!(
        "Imported {} companies, {} users, {} documents, {} emails, {} contacts, {} interactions, {} events, {} memories, {} conversations.",
        summary.companies,
        summary.users,
        summary.documents,
        summary.emails,
        summary.contacts,
        summary.interactions,
        summary.events,
        summary.memories,
        summary.conversations,
    );

    if ingest && !summary.document_ids.is_empty() {
        let engine = Engine::open(cfg).await?;
        let (mut indexed, mut skipped) = (0usize, 0usize);
        for id in &summary.document_ids {
            match engine.ingest(id).await? {
                IngestOutcome::Indexed { .. } => indexed += 1,
                IngestOutcome::Skipped { .. } => skipped += 1,
            }
        }
        println!("Indexed {} document(s), skipped {}.", indexed, skipped);
    }
    Ok(())
}
