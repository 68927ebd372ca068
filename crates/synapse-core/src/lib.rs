//! # Synapse Core
//!
//! Runtime-agnostic logic for the Synapse knowledge engine: data models,
//! heuristic classification, authority-weighted retrieval, numeric conflict
//! detection, multi-source context assembly, and digest/brief synthesis.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Every external
//! collaborator (embedding provider, vector index, relational store,
//! text-generation model) is reached through a trait, so the same
//! algorithms run against SQLite in the `synapse` app crate and against the
//! in-memory implementations in [`store::memory`] and [`index::memory`].
//!
//! ## Request flow
//!
//! ```text
//! query ──▶ conflict::detect_conflicts ──conflict──▶ clarification prompt
//!                │ no conflict
//!                ▼
//!        retrieval::retrieve ──▶ context::build_context ──▶ prompt ──▶ TextGenerator
//! ```
//!
//! Tenant (`company_id`) and identity (`user_id`) are explicit parameters
//! at every layer; nothing here reads ambient request state.

#[macro_use]
mod macros;

pub mod artifact;
pub mod brief;
pub mod classify;
pub mod conflict;
pub mod context;
pub mod digest;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod quantity;
pub mod relationship;
pub mod retrieval;
pub mod store;

#[cfg(test)]
mod test_support;

pub use error::EngineError;
pub use retrieval::Knowledge;
