//! Turns a free-text question into a `QueryIntent`.
//!
//! Simple listing requests are recognised by a keyword matcher; everything
//! else goes through a low-temperature LLM call. Dates are always resolved
//! locally from the question text.

use crate::agent::intent::{EntityKind, Filter, FilterOp, IntentKind, QueryIntent, TeamRef};
use crate::agent::prompts::{intent_prompt, INTENT_SYSTEM_PROMPT};
use crate::agent::time::resolve_date_range;
use crate::error::Result;
use crate::fuzzy_matcher::FuzzyMatcher;
use crate::llm::{parse_json_reply, CompletionProvider, CompletionRequest};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

lazy_static! {
    static ref LIST_REQUEST: Regex = Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:list|show|get|display|give|fetch)\s+(?:me\s+)?(?:all\s+|every\s+)?(?:(?:of\s+)?the\s+)?(?P<active>active\s+)?(?P<entity>team members|users|employees|people|members|staff|teams|projects|apps|applications|time entries|timesheets|classification rules|classifications|rules)\b(?P<rest>.*)$"
    )
    .unwrap();
    static ref ANALYTIC_WORDS: Regex = Regex::new(
        r"(?i)\b(total|sum|average|avg|mean|count|how many|how much|most|least|top|bottom|trend|trends|over time|compare|compared|comparison|versus|vs|per|breakdown|hours|minutes|time spent|productive|productivity|unproductive|percent|percentage|ratio|rank|ranking|ranked|more than|less than)\b"
    )
    .unwrap();
}

#[derive(Debug, Deserialize)]
struct LlmIntent {
    #[serde(default)]
    intent: String,
    #[serde(default)]
    entity: String,
    #[serde(default)]
    metrics: Vec<String>,
    #[serde(default)]
    filters: Vec<LlmFilter>,
    #[serde(default)]
    date_phrase: Option<String>,
    #[serde(default)]
    limit: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LlmFilter {
    #[serde(default)]
    field: String,
    #[serde(default, alias = "op")]
    operator: String,
    #[serde(default)]
    value: Value,
}

/// Keyword matcher for "list/show <entity> [in team X]" requests.
pub fn fast_path(question: &str) -> Option<(QueryIntent, String)> {
    if ANALYTIC_WORDS.is_match(question) {
        return None;
    }
    let caps = LIST_REQUEST.captures(question)?;
    let entity = EntityKind::from_word(&caps["entity"])?;

    let mut intent = QueryIntent::list(entity);
    if caps.name("active").is_some() && entity == EntityKind::Users {
        intent.filters.push(Filter {
            field: "is_active".to_string(),
            op: FilterOp::Eq,
            value: Value::Bool(true),
        });
    }
    let rest = caps
        .name("rest")
        .map(|m| m.as_str().trim().trim_end_matches(['?', '.', '!']).to_string())
        .unwrap_or_default();
    Some((intent, rest))
}

fn parse_limit(value: Option<Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
    .map(|n| n.min(u32::MAX as u64) as u32)
}

pub struct QueryParser {
    llm: Arc<dyn CompletionProvider>,
    matcher: FuzzyMatcher,
}

impl QueryParser {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            llm,
            matcher: FuzzyMatcher::default(),
        }
    }

    pub async fn parse(&self, question: &str, teams: &[TeamRef], today: NaiveDate) -> Result<QueryIntent> {
        let (mut intent, date_phrase, team_search_text) = match fast_path(question) {
            Some((intent, rest)) => {
                debug!(entity = ?intent.entity, "fast path matched list request");
                (intent, None, Some(rest))
            }
            None => {
                // Only an explicit team filter from the LLM narrows analytics.
                let (intent, phrase) = self.parse_with_llm(question, teams).await?;
                (intent, phrase, None)
            }
        };

        intent.date_range = resolve_date_range(question, today)
            .or_else(|| date_phrase.and_then(|p| resolve_date_range(&p, today)));

        self.resolve_team(&mut intent, team_search_text.as_deref(), teams);

        info!(
            intent = ?intent.intent,
            entity = ?intent.entity,
            fast_path = intent.fast_path,
            team = intent.team.as_ref().map(|t| t.name.as_str()),
            "parsed question"
        );
        Ok(intent)
    }

    async fn parse_with_llm(&self, question: &str, teams: &[TeamRef]) -> Result<(QueryIntent, Option<String>)> {
        let team_names: Vec<String> = teams.iter().map(|t| t.name.clone()).collect();
        let request = CompletionRequest::new(INTENT_SYSTEM_PROMPT, intent_prompt(question, &team_names))
            .temperature(0.1)
            .max_tokens(400);
        let raw = self.llm.complete(&request).await?;
        let parsed: LlmIntent = parse_json_reply(&raw)?;

        let filters = parsed
            .filters
            .into_iter()
            .filter(|f| !f.field.trim().is_empty() && !f.value.is_null())
            .map(|f| Filter {
                field: f.field.trim().to_lowercase(),
                op: FilterOp::parse_lenient(&f.operator),
                value: f.value,
            })
            .collect();

        let intent = QueryIntent {
            intent: IntentKind::parse_lenient(&parsed.intent),
            entity: EntityKind::from_word(&parsed.entity).unwrap_or(EntityKind::Usage),
            metrics: parsed.metrics,
            filters,
            date_range: None,
            limit: parse_limit(parsed.limit),
            team: None,
            unmatched_team: None,
            fast_path: false,
        };
        let phrase = parsed.date_phrase.filter(|p| !p.trim().is_empty());
        Ok((intent, phrase))
    }

    /// Replaces a free-text team filter with a known team, or records the
    /// unmatched name so generation can return no rows instead of all rows.
    fn resolve_team(&self, intent: &mut QueryIntent, search_text: Option<&str>, teams: &[TeamRef]) {
        let position = intent
            .filters
            .iter()
            .position(|f| matches!(f.field.as_str(), "team" | "team_name" | "teams.name"));

        if let Some(idx) = position {
            let filter = intent.filters.remove(idx);
            let Some(name) = filter.value_text() else { return };
            match self.matcher.best_match(&name, teams, |t| t.name.as_str()) {
                Some((team, score)) => {
                    debug!(requested = %name, matched = %team.name, score, "team matched");
                    intent.team = Some(team.clone());
                }
                None => {
                    debug!(requested = %name, "no team matched");
                    intent.unmatched_team = Some(name);
                }
            }
            return;
        }

        if let Some(text) = search_text.filter(|t| !t.is_empty()) {
            if let Some((team, score)) = self.matcher.find_in_text(text, teams, |t| t.name.as_str()) {
                debug!(matched = %team.name, score, "team found in question text");
                intent.team = Some(team.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_path_simple_lists() {
        let (intent, rest) = fast_path("List all users").unwrap();
        assert_eq!(intent.entity, EntityKind::Users);
        assert_eq!(intent.intent, IntentKind::List);
        assert!(rest.is_empty());

        let (intent, rest) = fast_path("show me the projects in the Platform team?").unwrap();
        assert_eq!(intent.entity, EntityKind::Projects);
        assert_eq!(rest, "in the Platform team");

        let (intent, _) = fast_path("get active employees").unwrap();
        assert_eq!(intent.filters.len(), 1);
        assert_eq!(intent.filters[0].field, "is_active");
    }

    #[test]
    fn test_fast_path_rejects_analytics() {
        assert!(fast_path("show total hours per user last week").is_none());
        assert!(fast_path("list the top 5 apps").is_none());
        assert!(fast_path("how many users are there").is_none());
        assert!(fast_path("show productivity trend for engineering").is_none());
        assert!(fast_path("which team worked the most?").is_none());
    }

    #[test]
    fn test_parse_limit_variants() {
        assert_eq!(parse_limit(Some(serde_json::json!(10))), Some(10));
        assert_eq!(parse_limit(Some(serde_json::json!("5"))), Some(5));
        assert_eq!(parse_limit(Some(serde_json::json!(0))), None);
        assert_eq!(parse_limit(Some(Value::Null)), None);
        assert_eq!(parse_limit(None), None);
    }
}
