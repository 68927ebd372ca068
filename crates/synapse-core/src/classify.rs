//! Deterministic keyword classification.
//!
//! Both classifiers are ordered rule lists: the first rule with a matching
//! term wins, and the fallback applies when nothing matches. Order matters
//! because a document can trigger several categories: a strategy memo
//! that discusses revenue classifies as `FINANCIAL` because that rule is
//! checked first.
//!
//! Matching is case-insensitive and anchored at a word start, so `"okr"`
//! matches `"OKRs"` but `"ux"` does not match `"luxury"`.

use crate::models::{DataType, Email, EmailPriority};

/// One entry in an ordered rule list.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule<T: 'static> {
    pub label: T,
    pub terms: &'static [&'static str],
}

/// Data-type rules in priority order. `COMMUNICATION` is the fallback.
pub const DATA_TYPE_RULES: &[KeywordRule<DataType>] = &[
    KeywordRule {
        label: DataType::Financial,
        terms: &[
            "revenue",
            "profit",
            "budget",
            "invoice",
            "expense",
            "earnings",
            "financial",
            "cash flow",
            "ebitda",
            "p&l",
            "balance sheet",
            "income statement",
            "valuation",
            "burn rate",
            "gross margin",
            "fiscal",
            "sales",
            "quarter",
            "q1",
            "q2",
            "q3",
            "q4",
            "$",
            "€",
            "£",
        ],
    },
    KeywordRule {
        label: DataType::Strategic,
        terms: &[
            "strategy",
            "strategic",
            "vision",
            "mission",
            "okr",
            "competitor",
            "competitive",
            "market share",
            "acquisition",
            "partnership",
            "board meeting",
            "long-term",
            "initiative",
        ],
    },
    KeywordRule {
        label: DataType::Product,
        terms: &[
            "product",
            "feature",
            "roadmap",
            "release",
            "launch",
            "specification",
            "user stor",
            "requirement",
            "prd",
            "beta",
            "ux",
        ],
    },
    KeywordRule {
        label: DataType::Operational,
        terms: &[
            "process",
            "procedure",
            "operations",
            "operational",
            "workflow",
            "policy",
            "onboarding",
            "hiring",
            "incident",
            "checklist",
            "logistics",
            "vendor",
            "compliance",
            "runbook",
        ],
    },
];

/// Email priority rules in priority order. `normal` is the fallback.
pub const EMAIL_PRIORITY_RULES: &[KeywordRule<EmailPriority>] = &[
    KeywordRule {
        label: EmailPriority::Urgent,
        terms: &[
            "urgent",
            "asap",
            "immediately",
            "emergency",
            "critical",
            "action required",
            "time-sensitive",
        ],
    },
    KeywordRule {
        label: EmailPriority::High,
        terms: &[
            "important",
            "deadline",
            "by tomorrow",
            "by eod",
            "please review",
            "approval",
            "follow up",
            "follow-up",
        ],
    },
    KeywordRule {
        label: EmailPriority::Low,
        terms: &[
            "newsletter",
            "unsubscribe",
            "promotion",
            "noreply",
            "no-reply",
            "webinar",
            "weekly digest",
        ],
    },
];

/// Return the label of the first rule with a term present in `text`.
///
/// `text` must already be lowercase.
pub fn first_match<T: Copy>(rules: &[KeywordRule<T>], text: &str) -> Option<T> {
    rules
        .iter()
        .find(|rule| rule.terms.iter().any(|term| contains_term(text, term)))
        .map(|rule| rule.label)
}

/// Classify a document by scanning its title and content.
pub fn classify_document(title: &str, content: &str) -> DataType {
    let text = format!("{}\n{}", title, content).to_lowercase();
    first_match(DATA_TYPE_RULES, &text).unwrap_or(DataType::Communication)
}

/// Classify an email by sender, subject, and body.
pub fn classify_email_priority(email: &Email) -> EmailPriority {
    let text = format!("{}\n{}\n{}", email.from_address, email.subject, email.body).to_lowercase();
    first_match(EMAIL_PRIORITY_RULES, &text).unwrap_or(EmailPriority::Normal)
}

/// Stored priority if present, otherwise the classified one.
pub fn effective_priority(email: &Email) -> EmailPriority {
    email
        .priority
        .unwrap_or_else(|| classify_email_priority(email))
}

/// True if `term` occurs in `haystack` starting at a word boundary.
fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(term) {
        let begin = start + pos;
        let at_word_start = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        if at_word_start {
            return true;
        }
        start = begin + haystack[begin..].chars().next().map_or(1, |c| c.len_utf8());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(from: &str, subject: &str, body: &str) -> Email {
        Email {
            id: "e".into(),
            user_id: "u".into(),
            thread_id: None,
            from_address: from.into(),
            from_name: None,
            to_addresses: vec![],
            subject: subject.into(),
            body: body.into(),
            priority: None,
            draft_ready: false,
            received_at: 0,
        }
    }

    #[test]
    fn test_financial_rule() {
        assert_eq!(
            classify_document("Q4 Report", "Total revenue reached $1.2M"),
            DataType::Financial
        );
        assert_eq!(classify_document("FY24 Budget", "Line items"), DataType::Financial);
    }

    #[test]
    fn test_financial_currency_terms() {
        assert_eq!(classify_document("Numbers", "We closed at $1.2M"), DataType::Financial);
        assert_eq!(classify_document("Numbers", "Costs were €40k"), DataType::Financial);
        assert_eq!(classify_document("Numbers", "Costs were £40k"), DataType::Financial);
    }

    #[test]
    fn test_financial_sales_term() {
        assert_eq!(classify_document("Team update", "Sales grew again"), DataType::Financial);
    }

    #[test]
    fn test_financial_quarter_terms() {
        assert_eq!(
            classify_document("Q4 numbers", "We closed the quarter with $1.2M in sales."),
            DataType::Financial
        );
        assert_eq!(classify_document("Quarterly update", "All good"), DataType::Financial);
        assert_eq!(classify_document("Q2 plan", "Hiring goals"), DataType::Financial);
    }

    #[test]
    fn test_quarter_term_is_word_anchored() {
        // "eq1" is not a quarter reference
        assert_eq!(classify_document("Notes", "see eq1 above"), DataType::Communication);
    }

    #[test]
    fn test_strategic_rule() {
        assert_eq!(classify_document("2025 Strategy", "Where we want to be"), DataType::Strategic);
        assert_eq!(classify_document("Planning", "Our OKRs for next year"), DataType::Strategic);
    }

    #[test]
    fn test_product_rule() {
        assert_eq!(
            classify_document("Search v2", "New features ship in the next release"),
            DataType::Product
        );
    }

    #[test]
    fn test_operational_rule() {
        assert_eq!(
            classify_document("On-call", "Follow the incident runbook"),
            DataType::Operational
        );
    }

    #[test]
    fn test_communication_fallback() {
        assert_eq!(
            classify_document("Hello", "Thanks for lunch yesterday!"),
            DataType::Communication
        );
    }

    #[test]
    fn test_financial_wins_over_strategic() {
        assert_eq!(
            classify_document("Strategy memo", "Our competitive strategy depends on profit growth"),
            DataType::Financial
        );
    }

    #[test]
    fn test_strategic_wins_over_product() {
        assert_eq!(classify_document("Vision", "The product vision for 2026"), DataType::Strategic);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_document("REVENUE UPDATE", ""), DataType::Financial);
    }

    #[test]
    fn test_word_start_anchor() {
        // "ux" inside "luxury" must not classify as PRODUCT
        assert_eq!(
            classify_document("Offsite", "A luxury hotel downtown"),
            DataType::Communication
        );
        assert!(contains_term("our okrs", "okr"));
        assert!(!contains_term("proprocess", "process"));
    }

    #[test]
    fn test_contains_term_multibyte() {
        assert!(contains_term("café — budget", "budget"));
        assert!(!contains_term("", "budget"));
        assert!(!contains_term("budget", ""));
    }

    #[test]
    fn test_email_urgent_rule() {
        let e = email("ceo@corp.com", "URGENT: server down", "");
        assert_eq!(classify_email_priority(&e), EmailPriority::Urgent);
    }

    #[test]
    fn test_email_high_rule() {
        let e = email("legal@corp.com", "Contract", "Please review before the deadline");
        assert_eq!(classify_email_priority(&e), EmailPriority::High);
    }

    #[test]
    fn test_email_low_rule() {
        let e = email("noreply@news.io", "This week in tech", "");
        assert_eq!(classify_email_priority(&e), EmailPriority::Low);
    }

    #[test]
    fn test_email_normal_fallback() {
        let e = email("friend@mail.com", "Lunch?", "Free on Thursday?");
        assert_eq!(classify_email_priority(&e), EmailPriority::Normal);
    }

    #[test]
    fn test_stored_priority_wins() {
        let mut e = email("noreply@news.io", "Newsletter", "");
        e.priority = Some(EmailPriority::High);
        assert_eq!(effective_priority(&e), EmailPriority::High);
    }
}
