//! Tagged envelope for synthesized payloads.
//!
//! Digest and brief contents are persisted as JSON text. They are always
//! written through [`Artifact`], so each stored payload names its own kind
//! and is validated against the expected shape when read back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::brief::BriefContent;
use crate::digest::DigestContent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    DailyDigest(DigestContent),
    MeetingBrief(BriefContent),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::DailyDigest(_) => "daily_digest",
            Artifact::MeetingBrief(_) => "meeting_brief",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialize artifact")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("stored artifact is malformed")
    }

    pub fn into_digest(self) -> Result<DigestContent> {
        match self {
            Artifact::DailyDigest(content) => Ok(content),
            other => bail!("expected daily_digest artifact, found {}", other.kind()),
        }
    }

    pub fn into_brief(self) -> Result<BriefContent> {
        match self {
            Artifact::MeetingBrief(content) => Ok(content),
            other => bail!("expected meeting_brief artifact, found {}", other.kind()),
        }
    }
}
