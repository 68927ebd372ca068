//! Meeting brief synthesis.
//!
//! A brief prepares the user for one calendar event:
//!
//! 1. Every attendee (other than the user) is resolved to a contact,
//!    creating a lightweight one from the address when none exists, and
//!    their recent interactions and emails are summarized.
//! 2. Company documents are cross-referenced by running retrieval in
//!    parallel for each attendee company, the event title, and the event
//!    description, keeping the best relevance per document.
//! 3. The text generator drafts talking points, questions, and relevant
//!    data, returned as JSON. Malformed output yields empty sections rather
//!    than an error.
//!
//! Briefs are keyed by event; regenerating replaces the previous brief.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::generation::{extract_json_object, TextGenerator};
use crate::models::{
    CalendarEvent, ChatMessage, Contact, ContactTier, DataType, Email, Interaction, RetrievalResult,
};
use crate::prompt;
use crate::relationship::{days_since_contact, health_status, HealthStatus, RelationshipThresholds};
use crate::retrieval::{retrieve, Knowledge};
use crate::store::{ActivityStore, ContextStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingBrief {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub content: BriefContent,
    pub generated_at: i64,
}

/// Typed brief payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BriefContent {
    pub event_title: String,
    pub event_start: i64,
    pub event_end: i64,
    pub attendees: Vec<AttendeeContext>,
    pub documents: Vec<BriefDocument>,
    pub talking_points: Vec<String>,
    pub questions: Vec<String>,
    pub relevant_data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeContext {
    pub contact_id: String,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub tier: ContactTier,
    pub health: HealthStatus,
    pub days_since_contact: i64,
    pub interaction_summary: String,
    pub recent_interactions: Vec<Interaction>,
    pub recent_email_subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefDocument {
    pub document_id: String,
    pub title: String,
    pub data_type: DataType,
    pub relevance_score: f64,
    pub source_url: Option<String>,
}

impl From<&RetrievalResult> for BriefDocument {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            document_id: r.document_id.clone(),
            title: r.title.clone(),
            data_type: r.data_type,
            relevance_score: r.relevance_score,
            source_url: r.source_url.clone(),
        }
    }
}

/// The generated sections of a brief.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BriefSections {
    pub talking_points: Vec<String>,
    pub questions: Vec<String>,
    pub relevant_data: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BriefSettings {
    pub thresholds: RelationshipThresholds,
    /// Results requested from retrieval per cross-reference query.
    pub per_query_top_k: usize,
    pub max_documents: usize,
    pub recent_interactions: usize,
    pub recent_emails: usize,
    pub max_tokens: u32,
}

impl Default for BriefSettings {
    fn default() -> Self {
        Self {
            thresholds: RelationshipThresholds::default(),
            per_query_top_k: 5,
            max_documents: 12,
            recent_interactions: 5,
            recent_emails: 5,
            max_tokens: 1024,
        }
    }
}

/// Collaborators a brief is built from.
pub struct BriefSources<'a> {
    pub kb: &'a Knowledge,
    pub context: &'a dyn ContextStore,
    pub activity: &'a dyn ActivityStore,
    pub generator: &'a dyn TextGenerator,
}

/// Generate (or regenerate) the brief for `event_id`.
///
/// A failing generator call propagates; everything the model returns is
/// accepted, with unusable sections left empty.
pub async fn generate_meeting_brief(
    sources: &BriefSources<'_>,
    user_id: &str,
    event_id: &str,
    now: i64,
    settings: &BriefSettings,
) -> Result<MeetingBrief> {
    let user = sources
        .context
        .get_user(user_id)
        .await?
        .ok_or_else(|| EngineError::TenantNotFound(user_id.to_string()))?;
    let event = sources
        .activity
        .get_event(user_id, event_id)
        .await?
        .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))?;

    let addresses = attendee_addresses(&event, &user.email);
    let attendees = try_join_all(
        addresses
            .iter()
            .map(|addr| resolve_attendee(sources.activity, user_id, addr, now, settings)),
    )
    .await?;

    let queries = cross_reference_queries(&event, &attendees);
    let company_id = user.company_id.as_str();
    let responses = join_all(queries.iter().map(|q| async move {
        match retrieve(sources.kb, q, company_id, settings.per_query_top_k).await {
            Ok(response) => response.results,
            Err(e) => {
                warn!(event_id, query = %q, error = %e, "brief cross-reference failed");
                Vec::new()
            }
        }
    }))
    .await;
    let documents = merge_by_document(responses, settings.max_documents);
    debug!(
        event_id,
        queries = queries.len(),
        documents = documents.len(),
        "cross-referenced documents"
    );

    let completion = sources
        .generator
        .complete(
            &[ChatMessage::user(prompt::brief_prompt(&event, &attendees, &documents))],
            prompt::BRIEF_SYSTEM_PROMPT,
            settings.max_tokens,
        )
        .await?;
    let sections = parse_brief_response(&completion.text);

    let id = sources
        .activity
        .get_brief(event_id)
        .await?
        .map(|existing| existing.id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let brief = MeetingBrief {
        id,
        user_id: user_id.to_string(),
        event_id: event_id.to_string(),
        content: BriefContent {
            event_title: event.title.clone(),
            event_start: event.start_at,
            event_end: event.end_at,
            attendees,
            documents: documents.iter().map(BriefDocument::from).collect(),
            talking_points: sections.talking_points,
            questions: sections.questions,
            relevant_data: sections.relevant_data,
        },
        generated_at: now,
    };
    sources.activity.upsert_brief(&brief).await?;

    info!(
        user_id,
        event_id,
        attendees = brief.content.attendees.len(),
        documents = brief.content.documents.len(),
        "meeting brief generated"
    );
    Ok(brief)
}

/// Distinct attendee addresses, lowercased, without the user's own.
fn attendee_addresses(event: &CalendarEvent, own_email: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    event
        .attendees
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case(own_email))
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

async fn resolve_attendee(
    activity: &dyn ActivityStore,
    user_id: &str,
    address: &str,
    now: i64,
    settings: &BriefSettings,
) -> Result<AttendeeContext> {
    let contact = match activity.find_contact_by_email(user_id, address).await? {
        Some(c) => c,
        None => {
            let contact = Contact {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                name: name_from_address(address),
                email: address.to_string(),
                company: company_from_address(address),
                title: None,
                tier: ContactTier::default(),
                last_contacted_at: None,
                created_at: now,
            };
            activity.upsert_contact(&contact).await?;
            debug!(user_id, email = address, "created contact for attendee");
            contact
        }
    };

    let (interactions, emails) = futures::try_join!(
        activity.recent_interactions(&contact.id, settings.recent_interactions),
        activity.recent_emails_with(user_id, address, settings.recent_emails),
    )?;

    Ok(AttendeeContext {
        interaction_summary: interaction_summary(&interactions, &emails, now),
        health: health_status(&contact, &settings.thresholds, now),
        days_since_contact: days_since_contact(&contact, now),
        recent_email_subjects: emails.iter().map(|e| e.subject.clone()).collect(),
        recent_interactions: interactions,
        contact_id: contact.id,
        name: contact.name,
        email: contact.email,
        company: contact.company,
        tier: contact.tier,
    })
}

/// Attendee companies, then the event title and description.
fn cross_reference_queries(event: &CalendarEvent, attendees: &[AttendeeContext]) -> Vec<String> {
    let mut seen = HashSet::new();
    let companies = attendees.iter().filter_map(|a| a.company.clone());
    let event_text = std::iter::once(event.title.clone()).chain(event.description.clone());

    companies
        .chain(event_text)
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
        .collect()
}

/// Merge result lists, keeping the highest relevance per document.
pub fn merge_by_document(lists: Vec<Vec<RetrievalResult>>, cap: usize) -> Vec<RetrievalResult> {
    let mut best: HashMap<String, RetrievalResult> = HashMap::new();
    for result in lists.into_iter().flatten() {
        match best.get(&result.document_id) {
            Some(existing) if existing.relevance_score >= result.relevance_score => {}
            _ => {
                best.insert(result.document_id.clone(), result);
            }
        }
    }

    let mut merged: Vec<RetrievalResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    merged.truncate(cap);
    merged
}

/// One-line, human-readable history with a contact.
pub fn interaction_summary(interactions: &[Interaction], emails: &[Email], now: i64) -> String {
    let mut parts = Vec::new();
    if let Some(last) = interactions.first() {
        parts.push(format!(
            "{} recent interaction(s); last was a {} {}: {}",
            interactions.len(),
            last.kind,
            ago(now, last.occurred_at),
            last.summary
        ));
    }
    if let Some(latest) = emails.first() {
        parts.push(format!(
            "{} recent email(s); latest \"{}\" {}",
            emails.len(),
            latest.subject,
            ago(now, latest.received_at)
        ));
    }
    if parts.is_empty() {
        "No prior interactions on record.".to_string()
    } else {
        format!("{}.", parts.join(". "))
    }
}

fn ago(now: i64, ts: i64) -> String {
    match (now - ts).max(0) / 86_400 {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        days => format!("{} days ago", days),
    }
}

/// Parse generator output into brief sections. Never fails.
///
/// Accepts both `talkingPoints` and `talking_points` style keys. Any key
/// that is missing or not an array yields an empty section.
pub fn parse_brief_response(text: &str) -> BriefSections {
    let value = match extract_json_object(text).map(serde_json::from_str::<Value>) {
        Some(Ok(v)) => v,
        _ => {
            warn!("brief response contained no usable JSON object");
            return BriefSections::default();
        }
    };

    BriefSections {
        talking_points: string_array(&value, &["talkingPoints", "talking_points"]),
        questions: string_array(&value, &["questions"]),
        relevant_data: string_array(&value, &["relevantData", "relevant_data"]),
    }
}

fn string_array(value: &Value, keys: &[&str]) -> Vec<String> {
    let Some(items) = keys.iter().find_map(|k| value.get(*k)).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

const FREE_MAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "proton.me",
    "protonmail.com",
];

/// `"ana.lopez@acme.com"` → `"Ana Lopez"`.
pub fn name_from_address(address: &str) -> String {
    let local = address.split('@').next().unwrap_or(address);
    let words: Vec<String> = local
        .split(|c: char| c == '.' || c == '_' || c == '-' || c == '+')
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();
    if words.is_empty() {
        address.to_string()
    } else {
        words.join(" ")
    }
}

/// `"ana@eng.acme.com"` → `Some("Acme")`; free-mail domains give `None`.
pub fn company_from_address(address: &str) -> Option<String> {
    let domain = address.rsplit_once('@')?.1.to_lowercase();
    if FREE_MAIL_DOMAINS.contains(&domain.as_str()) {
        return None;
    }
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    let name = match labels.len() {
        0 => return None,
        1 => labels[0],
        n => labels[n - 2],
    };
    Some(capitalize(name))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
