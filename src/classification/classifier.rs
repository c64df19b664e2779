//! LLM labelling of a single application.

use crate::agent::prompts::{classify_prompt, CLASSIFY_SYSTEM_PROMPT};
use crate::classification::types::{Productivity, Suggestion, UsageProfile};
use crate::error::{AppError, Result};
use crate::llm::{parse_json_reply, CompletionProvider, CompletionRequest};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    classification: String,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    reasoning: String,
}

/// Accepts fractions, percentages ("60%") and bare numbers on a 0-100
/// scale, returning a value in [0, 1].
fn parse_confidence(value: &Value) -> f64 {
    let (raw, percent) = match value {
        Value::Number(n) => (n.as_f64().unwrap_or(0.0), false),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(number) => (number.trim().parse().unwrap_or(0.0), true),
                None => (s.parse().unwrap_or(0.0), false),
            }
        }
        _ => (0.0, false),
    };
    if raw.is_nan() {
        return 0.0;
    }
    let fraction = if percent || (raw > 1.0 && raw <= 100.0) {
        raw / 100.0
    } else {
        raw
    };
    fraction.clamp(0.0, 1.0)
}

pub struct AppClassifier {
    llm: Arc<dyn CompletionProvider>,
}

impl AppClassifier {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// `context` describes the team/role scope in words.
    pub async fn suggest(&self, app_name: &str, context: &str, profile: &UsageProfile) -> Result<Suggestion> {
        let profile_json = serde_json::to_string_pretty(profile)?;
        let request = CompletionRequest::new(CLASSIFY_SYSTEM_PROMPT, classify_prompt(app_name, context, &profile_json))
            .temperature(0.2)
            .max_tokens(300);
        let raw = self.llm.complete(&request).await?;
        let parsed: RawSuggestion = parse_json_reply(&raw)?;

        let classification: Productivity = parsed
            .classification
            .parse()
            .map_err(|_| AppError::Llm(format!("LLM returned unknown label '{}'", parsed.classification)))?;
        let suggestion = Suggestion {
            classification,
            confidence: parse_confidence(&parsed.confidence),
            reasoning: parsed.reasoning.trim().to_string(),
        };
        debug!(app = app_name, label = %suggestion.classification, confidence = suggestion.confidence, "LLM suggestion");
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(parse_confidence(&json!(0.42)), 0.42);
        assert_eq!(parse_confidence(&json!(1)), 1.0);
        assert_eq!(parse_confidence(&json!(250)), 1.0);
        assert_eq!(parse_confidence(&json!(-1)), 0.0);
        assert_eq!(parse_confidence(&json!("0.7")), 0.7);
        assert_eq!(parse_confidence(&json!(null)), 0.0);
    }

    #[test]
    fn test_percentages_are_scaled() {
        assert_eq!(parse_confidence(&json!("60%")), 0.6);
        assert_eq!(parse_confidence(&json!(" 85 % ")), 0.85);
        assert_eq!(parse_confidence(&json!(85)), 0.85);
        assert_eq!(parse_confidence(&json!("100")), 1.0);
        assert_eq!(parse_confidence(&json!("0.5%")), 0.005);
    }
}
