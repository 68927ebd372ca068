//! Text-generation collaborator.
//!
//! The engine never talks to a model directly; it hands a message list and
//! a system prompt to a [`TextGenerator`]. The OpenAI-compatible client
//! lives in the `synapse` app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub output_tokens: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion>;
}

/// Locate the first balanced `{ ... }` object in free-form model output.
///
/// Braces inside JSON string literals (including escaped quotes) are
/// ignored. Returns `None` if no object closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_prose() {
        let text = "Sure! Here is the brief:\n{\"a\": [1, 2]} Hope that helps {x}";
        assert_eq!(extract_json_object(text), Some("{\"a\": [1, 2]}"));
    }

    #[test]
    fn test_extract_nested() {
        let text = "```json\n{\"a\": {\"b\": {}}, \"c\": 1}\n```";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": {}}, \"c\": 1}"));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let text = r#"{"note": "use } and { freely", "q": "say \"}\""} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"note": "use } and { freely", "q": "say \"}\""}"#)
        );
    }

    #[test]
    fn test_unbalanced_or_missing() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{\"open\": [1, 2"), None);
    }
}
