//! Relationship health: how overdue each contact is for a check-in.
//!
//! Every [`ContactTier`] maps to a check-in threshold in days. A contact
//! becomes *overdue* once the days since the last interaction exceed the
//! threshold; contacts that were never contacted are measured from the day
//! they were created.

use serde::{Deserialize, Serialize};

use crate::models::{Contact, ContactTier};

const SECS_PER_DAY: i64 = 86_400;

/// Check-in thresholds per tier, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipThresholds {
    pub inner_days: i64,
    pub active_days: i64,
    pub casual_days: i64,
}

impl Default for RelationshipThresholds {
    fn default() -> Self {
        Self {
            inner_days: 14,
            active_days: 30,
            casual_days: 90,
        }
    }
}

impl RelationshipThresholds {
    pub fn threshold_for(&self, tier: ContactTier) -> i64 {
        match tier {
            ContactTier::Inner => self.inner_days,
            ContactTier::Active => self.active_days,
            ContactTier::Casual => self.casual_days,
        }
    }
}

string_enum! {
    /// Coarse health signal shown next to a contact.
    HealthStatus {
        /// Well inside the threshold.
        Healthy => "healthy",
        /// Past three quarters of the threshold.
        Cooling => "cooling",
        Overdue => "overdue",
    }
}

/// An overdue contact surfaced in the daily digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipReminder {
    pub contact_id: String,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub tier: ContactTier,
    pub last_contacted_at: Option<i64>,
    pub days_since_contact: i64,
    pub overdue_days: i64,
}

/// Whole days since the contact was last touched (or created).
pub fn days_since_contact(contact: &Contact, now: i64) -> i64 {
    let since = contact.last_contacted_at.unwrap_or(contact.created_at);
    (now - since).max(0) / SECS_PER_DAY
}

/// Days past the tier threshold. Negative while the contact is healthy.
pub fn overdue_days(contact: &Contact, thresholds: &RelationshipThresholds, now: i64) -> i64 {
    days_since_contact(contact, now) - thresholds.threshold_for(contact.tier)
}

pub fn health_status(
    contact: &Contact,
    thresholds: &RelationshipThresholds,
    now: i64,
) -> HealthStatus {
    let days = days_since_contact(contact, now);
    let threshold = thresholds.threshold_for(contact.tier);
    if days > threshold {
        HealthStatus::Overdue
    } else if days * 4 > threshold * 3 {
        HealthStatus::Cooling
    } else {
        HealthStatus::Healthy
    }
}

/// The `limit` most overdue contacts, most overdue first.
///
/// Ties are broken by name so the digest is stable across runs.
pub fn overdue_reminders(
    contacts: &[Contact],
    thresholds: &RelationshipThresholds,
    now: i64,
    limit: usize,
) -> Vec<RelationshipReminder> {
    let mut reminders: Vec<RelationshipReminder> = contacts
        .iter()
        .filter_map(|c| {
            let overdue = overdue_days(c, thresholds, now);
            (overdue > 0).then(|| RelationshipReminder {
                contact_id: c.id.clone(),
                name: c.name.clone(),
                email: c.email.clone(),
                company: c.company.clone(),
                tier: c.tier,
                last_contacted_at: c.last_contacted_at,
                days_since_contact: days_since_contact(c, now),
                overdue_days: overdue,
            })
        })
        .collect();

    reminders.sort_by(|a, b| {
        b.overdue_days
            .cmp(&a.overdue_days)
            .then_with(|| a.name.cmp(&b.name))
    });
    reminders.truncate(limit);
    reminders
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn contact(name: &str, tier: ContactTier, last_days_ago: Option<i64>) -> Contact {
        Contact {
            id: format!("c-{}", name),
            user_id: "u1".into(),
            name: name.into(),
            email: format!("{}@example.com", name),
            company: None,
            title: None,
            tier,
            last_contacted_at: last_days_ago.map(|d| NOW - d * SECS_PER_DAY),
            created_at: NOW - 365 * SECS_PER_DAY,
        }
    }

    #[test]
    fn test_overdue_by_tier() {
        let t = RelationshipThresholds::default();
        assert_eq!(overdue_days(&contact("a", ContactTier::Inner, Some(20)), &t, NOW), 6);
        assert_eq!(overdue_days(&contact("b", ContactTier::Active, Some(20)), &t, NOW), -10);
        assert_eq!(overdue_days(&contact("c", ContactTier::Casual, Some(100)), &t, NOW), 10);
    }

    #[test]
    fn test_never_contacted_measured_from_creation() {
        let t = RelationshipThresholds::default();
        let c = contact("d", ContactTier::Active, None);
        assert_eq!(days_since_contact(&c, NOW), 365);
        assert_eq!(overdue_days(&c, &t, NOW), 335);
    }

    #[test]
    fn test_health_status_bands() {
        let t = RelationshipThresholds::default();
        assert_eq!(
            health_status(&contact("a", ContactTier::Active, Some(5)), &t, NOW),
            HealthStatus::Healthy
        );
        assert_eq!(
            health_status(&contact("b", ContactTier::Active, Some(25)), &t, NOW),
            HealthStatus::Cooling
        );
        assert_eq!(
            health_status(&contact("c", ContactTier::Active, Some(31)), &t, NOW),
            HealthStatus::Overdue
        );
    }

    #[test]
    fn test_reminders_sorted_and_capped() {
        let t = RelationshipThresholds::default();
        let contacts = vec![
            contact("fresh", ContactTier::Inner, Some(1)),
            contact("bob", ContactTier::Inner, Some(30)),
            contact("amy", ContactTier::Inner, Some(30)),
            contact("zed", ContactTier::Active, Some(100)),
            contact("kim", ContactTier::Casual, Some(95)),
        ];
        let reminders = overdue_reminders(&contacts, &t, NOW, 3);
        let names: Vec<&str> = reminders.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zed", "amy", "bob"]);
        assert_eq!(reminders[0].overdue_days, 70);
    }
}
