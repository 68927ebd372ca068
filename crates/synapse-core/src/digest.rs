//! Daily digest synthesis.
//!
//! A digest summarizes one user's day: inbox volume by priority over the
//! previous 24 hours, pending drafts, the busiest senders, today's meeting
//! load, the next meeting, overdue relationships, and active goals.
//!
//! Lifecycle per `(user, date)`:
//!
//! ```text
//! absent ──generate──▶ generated ──dismiss──▶ dismissed
//! ```
//!
//! Generation is idempotent: once a digest exists for the date, further
//! calls return it unchanged, and the cron driver counts the user as
//! skipped.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::effective_priority;
use crate::error::EngineError;
use crate::models::{CalendarEvent, Contact, Email, EmailPriority, Memory, MemoryKind};
use crate::relationship::{overdue_reminders, RelationshipReminder, RelationshipThresholds};
use crate::store::{ActivityStore, TimeWindow};

const SECS_PER_DAY: i64 = 86_400;

string_enum! {
    DigestStatus {
        Generated => "generated",
        Dismissed => "dismissed",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDigest {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub status: DigestStatus,
    pub content: DigestContent,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub urgent: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl PriorityCounts {
    pub fn total(&self) -> usize {
        self.urgent + self.high + self.normal + self.low
    }

    fn bump(&mut self, priority: EmailPriority) {
        match priority {
            EmailPriority::Urgent => self.urgent += 1,
            EmailPriority::High => self.high += 1,
            EmailPriority::Normal => self.normal += 1,
            EmailPriority::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderCount {
    pub address: String,
    pub name: Option<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub event_id: String,
    pub title: String,
    pub start_at: i64,
    pub end_at: i64,
    pub location: Option<String>,
    pub attendee_count: usize,
}

impl From<&CalendarEvent> for MeetingSummary {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            title: event.title.clone(),
            start_at: event.start_at,
            end_at: event.end_at,
            location: event.location.clone(),
            attendee_count: event.attendees.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSummary {
    pub memory_id: String,
    pub title: String,
    pub content: String,
}

/// Typed digest payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestContent {
    /// Start of the email window (`now - 24h`).
    pub window_start: i64,
    pub window_end: i64,
    pub email_counts: PriorityCounts,
    pub drafts_ready: usize,
    pub top_senders: Vec<SenderCount>,
    pub meetings_today: usize,
    pub next_meeting: Option<MeetingSummary>,
    pub relationship_reminders: Vec<RelationshipReminder>,
    pub active_goals: Vec<GoalSummary>,
}

/// Tunables for digest content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigestSettings {
    pub thresholds: RelationshipThresholds,
    pub top_senders: usize,
    pub reminders: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            thresholds: RelationshipThresholds::default(),
            top_senders: 5,
            reminders: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DigestOutcome {
    Generated(DailyDigest),
    /// A digest already existed for the date; it is returned untouched.
    Skipped(DailyDigest),
}

impl DigestOutcome {
    pub fn digest(&self) -> &DailyDigest {
        match self {
            DigestOutcome::Generated(d) | DigestOutcome::Skipped(d) => d,
        }
    }

    pub fn into_digest(self) -> DailyDigest {
        match self {
            DigestOutcome::Generated(d) | DigestOutcome::Skipped(d) => d,
        }
    }
}

/// Counters returned by [`run_daily_digests`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestRunSummary {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The UTC calendar day `[00:00, 24:00)` of `date`.
pub fn day_window(date: NaiveDate) -> TimeWindow {
    let start = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp();
    TimeWindow::new(start, start + SECS_PER_DAY)
}

/// Generate the digest for `(user_id, date)` unless one already exists.
pub async fn generate_daily_digest(
    store: &dyn ActivityStore,
    user_id: &str,
    date: NaiveDate,
    now: i64,
    settings: &DigestSettings,
) -> Result<DigestOutcome> {
    if let Some(existing) = store.get_digest(user_id, date).await? {
        return Ok(DigestOutcome::Skipped(existing));
    }

    let email_window = TimeWindow::new(now - SECS_PER_DAY, now);
    let today = day_window(date);
    let (emails, events_today, next_event, contacts, goals) = futures::try_join!(
        store.emails_between(user_id, &email_window),
        store.events_between(user_id, &today),
        store.next_event_after(user_id, now),
        store.list_contacts(user_id),
        store.active_memories(user_id, MemoryKind::Goal),
    )?;

    let content = build_digest_content(
        &emails,
        &events_today,
        next_event.as_ref(),
        &contacts,
        &goals,
        now,
        settings,
    );
    let digest = DailyDigest {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        date,
        status: DigestStatus::Generated,
        content,
        created_at: now,
    };

    if store.insert_digest(&digest).await? {
        info!(user_id, %date, "daily digest generated");
        return Ok(DigestOutcome::Generated(digest));
    }

    // Lost a race with a concurrent generator; keep theirs
    let existing = store
        .get_digest(user_id, date)
        .await?
        .context("digest vanished after conflicting insert")?;
    Ok(DigestOutcome::Skipped(existing))
}

/// Assemble digest content from already-fetched records.
pub fn build_digest_content(
    emails: &[Email],
    events_today: &[CalendarEvent],
    next_event: Option<&CalendarEvent>,
    contacts: &[Contact],
    goals: &[Memory],
    now: i64,
    settings: &DigestSettings,
) -> DigestContent {
    let mut email_counts = PriorityCounts::default();
    for email in emails {
        email_counts.bump(effective_priority(email));
    }

    DigestContent {
        window_start: now - SECS_PER_DAY,
        window_end: now,
        email_counts,
        drafts_ready: emails.iter().filter(|e| e.draft_ready).count(),
        top_senders: top_senders(emails, settings.top_senders),
        meetings_today: events_today.len(),
        next_meeting: next_event.map(MeetingSummary::from),
        relationship_reminders: overdue_reminders(
            contacts,
            &settings.thresholds,
            now,
            settings.reminders,
        ),
        active_goals: goals
            .iter()
            .filter(|m| m.is_active && m.kind == MemoryKind::Goal)
            .map(|m| GoalSummary {
                memory_id: m.id.clone(),
                title: m.title.clone(),
                content: m.content.clone(),
            })
            .collect(),
    }
}

/// Senders by volume, addresses compared case-insensitively.
fn top_senders(emails: &[Email], limit: usize) -> Vec<SenderCount> {
    let mut by_address: HashMap<String, SenderCount> = HashMap::new();
    for email in emails {
        let address = email.from_address.to_lowercase();
        let entry = by_address
            .entry(address.clone())
            .or_insert_with(|| SenderCount {
                address,
                name: None,
                count: 0,
            });
        entry.count += 1;
        if entry.name.is_none() {
            entry.name = email.from_name.clone().filter(|n| !n.trim().is_empty());
        }
    }

    let mut senders: Vec<SenderCount> = by_address.into_values().collect();
    senders.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.address.cmp(&b.address)));
    senders.truncate(limit);
    senders
}

/// Mark a digest as dismissed.
pub async fn dismiss_digest(
    store: &dyn ActivityStore,
    user_id: &str,
    date: NaiveDate,
) -> Result<()> {
    if store
        .set_digest_status(user_id, date, DigestStatus::Dismissed)
        .await?
    {
        info!(user_id, %date, "daily digest dismissed");
        Ok(())
    } else {
        Err(EngineError::DigestNotFound {
            user_id: user_id.to_string(),
            date: date.to_string(),
        }
        .into())
    }
}

/// Cron driver: generate today's digest for every user.
///
/// A failure for one user is logged and counted; it never stops the run.
pub async fn run_daily_digests(
    store: &dyn ActivityStore,
    date: NaiveDate,
    now: i64,
    settings: &DigestSettings,
) -> Result<DigestRunSummary> {
    let mut summary = DigestRunSummary::default();
    for user_id in store.list_user_ids().await? {
        match generate_daily_digest(store, &user_id, date, now, settings).await {
            Ok(DigestOutcome::Generated(_)) => summary.generated += 1,
            Ok(DigestOutcome::Skipped(_)) => summary.skipped += 1,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "digest generation failed");
                summary.failed += 1;
            }
        }
    }
    info!(
        %date,
        generated = summary.generated,
        skipped = summary.skipped,
        failed = summary.failed,
        "daily digest run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactTier;

    const NOW: i64 = 1_700_000_000;

    fn email(from: &str, subject: &str, draft: bool) -> Email {
        Email {
            id: Uuid::new_v4().to_string(),
            user_id: "u1".into(),
            thread_id: None,
            from_address: from.into(),
            from_name: None,
            to_addresses: vec!["me@acme.com".into()],
            subject: subject.into(),
            body: String::new(),
            priority: None,
            draft_ready: draft,
            received_at: NOW - 3600,
        }
    }

    #[test]
    fn test_day_window_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        let w = day_window(date);
        assert_eq!(w.start, 1_699_920_000);
        assert_eq!(w.end - w.start, SECS_PER_DAY);
    }

    #[test]
    fn test_counts_and_senders() {
        let emails = vec![
            email("ceo@acme.com", "URGENT: sign today", false),
            email("CEO@acme.com", "Quick question", true),
            email("news@list.com", "Weekly newsletter", false),
            email("ana@globex.com", "Lunch?", true),
        ];
        let settings = DigestSettings::default();
        let content = build_digest_content(&emails, &[], None, &[], &[], NOW, &settings);

        assert_eq!(content.email_counts.urgent, 1);
        assert_eq!(content.email_counts.low, 1);
        assert_eq!(content.email_counts.total(), 4);
        assert_eq!(content.drafts_ready, 2);
        assert_eq!(content.top_senders[0].address, "ceo@acme.com");
        assert_eq!(content.top_senders[0].count, 2);
        assert_eq!(content.top_senders.len(), 3);
    }

    #[test]
    fn test_reminders_capped_at_three() {
        let contacts: Vec<Contact> = (0..5)
            .map(|i| Contact {
                id: format!("c{}", i),
                user_id: "u1".into(),
                name: format!("contact {}", i),
                email: format!("c{}@x.com", i),
                company: None,
                title: None,
                tier: ContactTier::Inner,
                last_contacted_at: Some(NOW - (20 + i) * SECS_PER_DAY),
                created_at: 0,
            })
            .collect();
        let settings = DigestSettings::default();
        let content = build_digest_content(&[], &[], None, &contacts, &[], NOW, &settings);
        assert_eq!(content.relationship_reminders.len(), 3);
        assert_eq!(content.relationship_reminders[0].contact_id, "c4");
    }

    #[tokio::test]
    async fn test_generation_is_idempotent_and_dismissable() {
        let f = crate::test_support::fixture();
        let store = f.store.as_ref();
        let date = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        let mut inbound = email("ceo@acme.com", "Board prep", false);
        inbound.user_id = "u-acme".into();
        f.store.insert_email(inbound).unwrap();

        let settings = DigestSettings::default();
        let first = generate_daily_digest(store, "u-acme", date, NOW, &settings).await.unwrap();
        assert!(matches!(first, DigestOutcome::Generated(_)));
        assert_eq!(first.digest().content.email_counts.total(), 1);

        let second = generate_daily_digest(store, "u-acme", date, NOW + 60, &settings)
            .await
            .unwrap();
        assert!(matches!(second, DigestOutcome::Skipped(_)));
        assert_eq!(second.digest().id, first.digest().id);

        dismiss_digest(store, "u-acme", date).await.unwrap();
        let stored = store.get_digest("u-acme", date).await.unwrap().unwrap();
        assert_eq!(stored.status, DigestStatus::Dismissed);

        let other_day = date.succ_opt().unwrap();
        let err = dismiss_digest(store, "u-acme", other_day).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::DigestNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cron_driver_skips_existing() {
        let f = crate::test_support::fixture();
        let store = f.store.as_ref();
        let date = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        let settings = DigestSettings::default();

        generate_daily_digest(store, "u-acme", date, NOW, &settings)
            .await
            .unwrap();
        let summary = run_daily_digests(store, date, NOW, &settings).await.unwrap();
        assert_eq!(
            summary,
            DigestRunSummary {
                generated: 1,
                skipped: 1,
                failed: 0
            }
        );
    }
}
