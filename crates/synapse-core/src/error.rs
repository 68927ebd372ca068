//! Typed failures that callers need to tell apart.
//!
//! Everything in the engine propagates `anyhow::Error`; the variants here
//! are raised inside that envelope so frontends can `downcast_ref` and pick
//! a user-visible response (e.g. 404 vs. generic "couldn't retrieve
//! knowledge").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The user (or its company) does not exist. Fatal for the whole call.
    #[error("tenant not found for user: {0}")]
    TenantNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("calendar event not found: {0}")]
    EventNotFound(String),

    #[error("daily digest not found for user {user_id} on {date}")]
    DigestNotFound { user_id: String, date: String },

    /// A collaborator call exceeded its hard deadline.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// The configured provider is `disabled`.
    #[error("{0} provider is disabled")]
    ProviderDisabled(String),
}
