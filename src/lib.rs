//! # Synapse
//!
//! A knowledge retrieval and synthesis engine for company documents and a
//! user's personal context.
//!
//! Documents are classified into authority categories at ingestion time,
//! embedded, and stored in a tenant-scoped vector index. Retrieval ranks
//! hits by relevance × authority. Before answering a financial question,
//! the engine checks whether the top sources disagree on the figures and
//! asks the user to pick one instead of guessing. Answers are grounded in
//! both the knowledge block and a six-source personal context (conversations,
//! emails, contacts, calendar, memories, knowledge). Daily digests and
//! meeting briefs are synthesized from the same data.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ import / CLI │──▶│    Engine    │──▶│ SQLite store +   │
//! │ HTTP / jobs  │   │ (synapse-core│   │ vector records   │
//! └──────────────┘   │  algorithms) │   └──────────────────┘
//!                    └──────┬───────┘
//!                           ▼
//!                 embedding / generation providers
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | Relational store for documents and personal records |
//! | [`sqlite_index`] | Tenant-scoped vector index |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, hashing) |
//! | [`generation`] | Chat-completion text generator |
//! | [`guard`] | Deadlines on external calls |
//! | [`engine`] | The facade every surface goes through |
//! | [`jobs`] | Background job queue with retries |
//! | [`dataset`] | JSON dataset import |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod generation;
pub mod guard;
pub mod jobs;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_index;
pub mod sqlite_store;
