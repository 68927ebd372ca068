//! Prompt construction for the text-generation collaborator.
//!
//! Knowledge is sent as a numbered block prepended to the user's question,
//! so the model can cite sources as `[1]`, `[2]`, … and the caller can map
//! citations back to documents.

use std::fmt::Write as _;

use chrono::{TimeZone, Utc};

use crate::brief::AttendeeContext;
use crate::context::ContextBundle;
use crate::index::truncate_chars;
use crate::models::{CalendarEvent, ConflictReport, RetrievalResult};

/// Longest document excerpt placed in a prompt.
pub const PROMPT_EXCERPT_CHARS: usize = 2000;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a company knowledge assistant. \
Answer using the knowledge and context provided. Cite knowledge sources by their \
bracketed number, e.g. [1]. Prefer sources with higher authority when they disagree. \
If the provided material does not contain the answer, say so plainly instead of guessing.";

pub const BRIEF_SYSTEM_PROMPT: &str = "You prepare concise meeting briefs. \
Respond with a single JSON object and nothing else, using exactly these keys: \
\"talkingPoints\" (array of strings), \"questions\" (array of strings), \
\"relevantData\" (array of strings).";

/// Shown instead of a knowledge block when retrieval is unavailable.
pub const NO_KNOWLEDGE_NOTICE: &str =
    "Company knowledge could not be retrieved for this question. Answer from the context \
     below if possible, and say that company documents were unavailable.";

/// Numbered knowledge block, one entry per result.
pub fn knowledge_block(results: &[RetrievalResult]) -> String {
    let mut out = String::from("## Company knowledge\n");
    if results.is_empty() {
        out.push_str("No matching documents.\n");
        return out;
    }
    for (i, r) in results.iter().enumerate() {
        let _ = write!(
            out,
            "\n[{}] {} ({}, authority {:.1}",
            i + 1,
            r.title,
            r.data_type,
            r.authority_weight
        );
        if let Some(url) = &r.source_url {
            let _ = write!(out, ", source: {}", url);
        }
        let _ = writeln!(out, ")\n{}", truncate_chars(&r.content, PROMPT_EXCERPT_CHARS));
    }
    out
}

/// Personal context block. Empty sections are omitted.
pub fn context_block(bundle: &ContextBundle) -> String {
    let mut out = String::new();
    if bundle.is_empty() {
        return out;
    }
    out.push_str("## Personal context\n");

    if !bundle.emails.is_empty() {
        out.push_str("\n### Emails\n");
        for e in &bundle.emails {
            let _ = writeln!(
                out,
                "- {} from {} ({})",
                e.subject,
                e.from_name.as_deref().unwrap_or(&e.from_address),
                format_ts(e.received_at)
            );
        }
    }
    if !bundle.calendar_events.is_empty() {
        out.push_str("\n### Calendar\n");
        for ev in &bundle.calendar_events {
            let _ = writeln!(out, "- {} at {}", ev.title, format_ts(ev.start_at));
        }
    }
    if !bundle.contacts.is_empty() {
        out.push_str("\n### Contacts\n");
        for c in &bundle.contacts {
            let _ = write!(out, "- {} <{}>", c.name, c.email);
            if let Some(company) = &c.company {
                let _ = write!(out, ", {}", company);
            }
            out.push('\n');
        }
    }
    if !bundle.memories.is_empty() {
        out.push_str("\n### Things to remember\n");
        for m in &bundle.memories {
            let _ = writeln!(out, "- [{}] {}: {}", m.kind, m.title, m.content);
        }
    }
    if !bundle.conversations.is_empty() {
        out.push_str("\n### Related conversations\n");
        for c in &bundle.conversations {
            let _ = writeln!(out, "- {}", c.title);
        }
    }
    if !bundle.documents.is_empty() {
        out.push_str("\n### Related documents\n");
        for d in &bundle.documents {
            let _ = writeln!(out, "- {}", d.title);
        }
    }
    out
}

/// User message for the answer path: knowledge, context, then question.
pub fn question_with_context(question: &str, knowledge: &str, context: &str) -> String {
    let mut out = String::with_capacity(knowledge.len() + context.len() + question.len() + 32);
    out.push_str(knowledge);
    if !context.is_empty() {
        out.push('\n');
        out.push_str(context);
    }
    let _ = write!(out, "\n## Question\n{}", question);
    out
}

/// Disambiguation prompt returned to the user instead of an answer.
pub fn clarification_prompt(report: &ConflictReport) -> String {
    let mut out = String::from(
        "I found financial sources that disagree on this figure, so I'd rather not guess. \
         Which of these should I rely on?\n",
    );
    for (i, r) in report.conflicting_results.iter().flatten().enumerate() {
        let _ = writeln!(out, "\n{}. {}\n   {}", i + 1, r.title, truncate_chars(&r.content, 160));
    }
    if let Some(variance) = report.variance.filter(|v| v.is_finite()) {
        let _ = writeln!(out, "\nThe figures differ by {:.0}%.", variance * 100.0);
    }
    out
}

/// User message asking for a meeting brief.
pub fn brief_prompt(
    event: &CalendarEvent,
    attendees: &[AttendeeContext],
    documents: &[RetrievalResult],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Meeting\n{} at {}", event.title, format_ts(event.start_at));
    if let Some(description) = event.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "{}", description);
    }
    if let Some(location) = &event.location {
        let _ = writeln!(out, "Location: {}", location);
    }

    out.push_str("\n## Attendees\n");
    if attendees.is_empty() {
        out.push_str("No other attendees.\n");
    }
    for a in attendees {
        let _ = write!(out, "- {} <{}>", a.name, a.email);
        if let Some(company) = &a.company {
            let _ = write!(out, ", {}", company);
        }
        let _ = writeln!(
            out,
            " (relationship: {}, {} days since last contact)\n  {}",
            a.health, a.days_since_contact, a.interaction_summary
        );
    }

    out.push('\n');
    out.push_str(&knowledge_block(documents));
    out.push_str(
        "\nDraft talking points, open questions, and the most relevant data for this meeting.",
    );
    out
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictingResult, DataType};

    fn result(title: &str, url: Option<&str>) -> RetrievalResult {
        RetrievalResult {
            document_id: title.to_lowercase(),
            title: title.into(),
            content: format!("{} content", title),
            relevance_score: 0.8,
            data_type: DataType::Financial,
            source_url: url.map(String::from),
            authority_weight: 1.5,
        }
    }

    #[test]
    fn test_knowledge_block_numbers_sources() {
        let block = knowledge_block(&[
            result("Board deck", Some("https://drive/1")),
            result("Forecast", None),
        ]);
        assert!(
            block.contains("[1] Board deck (FINANCIAL, authority 1.5, source: https://drive/1)")
        );
        assert!(block.contains("[2] Forecast (FINANCIAL, authority 1.5)"));
        assert!(block.contains("Forecast content"));
    }

    #[test]
    fn test_knowledge_block_empty() {
        assert!(knowledge_block(&[]).contains("No matching documents."));
    }

    #[test]
    fn test_question_follows_knowledge() {
        let msg = question_with_context("What was revenue?", "## Company knowledge\n[1] x\n", "");
        let k = msg.find("Company knowledge").unwrap();
        let q = msg.find("What was revenue?").unwrap();
        assert!(k < q);
    }

    #[test]
    fn test_clarification_lists_sources() {
        let report = ConflictReport {
            has_conflict: true,
            conflicting_results: Some(vec![
                ConflictingResult {
                    document_id: "a".into(),
                    title: "Board deck".into(),
                    content: "Revenue $1.2M".into(),
                    data_type: DataType::Financial,
                },
                ConflictingResult {
                    document_id: "b".into(),
                    title: "CFO email".into(),
                    content: "Revenue $2.5M".into(),
                    data_type: DataType::Financial,
                },
            ]),
            variance: Some(1.0833),
        };
        let text = clarification_prompt(&report);
        assert!(text.contains("1. Board deck"));
        assert!(text.contains("2. CFO email"));
        assert!(text.contains("108%"));
    }

    #[test]
    fn test_context_block_skips_empty_sections() {
        assert_eq!(context_block(&ContextBundle::default()), "");
    }
}
