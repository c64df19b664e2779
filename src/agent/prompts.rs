//! Prompt templates for the chat agent and the classification workflow.

use crate::agent::intent::QueryIntent;
use crate::schema;

/// System prompt for structured question parsing
pub const INTENT_SYSTEM_PROMPT: &str = r#"You convert workforce-analytics questions into a JSON description.
Return ONLY a JSON object, no prose and no code fences."#;

/// System prompt for SQL generation
pub const SQL_SYSTEM_PROMPT: &str = r#"You are a PostgreSQL expert writing read-only analytics queries.

## Rules
- Output exactly ONE SELECT statement (a leading WITH is allowed). No comments, no semicolons, no prose.
- Use only the tables and columns listed in the schema.
- Use literal dates ('YYYY-MM-DD') for date filters. Never use $1-style placeholders.
- Durations are stored in seconds. Convert to hours with / 3600.0.
- Cast to numeric before dividing and wrap divisors in NULLIF(..., 0).
- Round with ROUND(value::numeric, 2).
- Give every computed column a short snake_case alias.
- Join users to show names instead of ids.
- Always include an ORDER BY for ranking and trend questions."#;

/// System prompt for explaining results
pub const EXPLAIN_SYSTEM_PROMPT: &str = r#"You are a workforce analytics assistant. Explain query results to a manager in plain English.
Be concise (at most 6 sentences or a short bullet list). Convert seconds to hours. Do not invent numbers that are not in the data. Do not mention SQL."#;

/// System prompt for application classification
pub const CLASSIFY_SYSTEM_PROMPT: &str = r#"You classify software applications by their effect on workplace productivity.
Return ONLY a JSON object, no prose and no code fences."#;

pub fn intent_prompt(question: &str, team_names: &[String]) -> String {
    let teams = if team_names.is_empty() {
        "(none)".to_string()
    } else {
        team_names.join(", ")
    };
    format!(
        r#"Question: "{question}"
Known teams: {teams}

Describe the question as JSON:
{{
  "intent": "list|aggregate|trend|comparison|ranking",
  "entity": "users|teams|projects|apps|usage|time_entries|classifications",
  "metrics": ["active_hours", "productive_hours", ...],
  "filters": [{{"field": "team", "operator": "=", "value": "Engineering"}}],
  "date_phrase": "last week" | null,
  "limit": 10 | null
}}

- "usage" covers daily activity totals (active/idle/productive/unproductive time).
- "apps" covers per-application usage.
- Use the "team" filter field for team names, "user" for a person's name.
- "date_phrase" repeats the time expression from the question verbatim."#
    )
}

pub fn sql_prompt(question: &str, intent: &QueryIntent, max_rows: usize) -> String {
    let intent_json = serde_json::to_string(intent).unwrap_or_else(|_| "{}".to_string());

    let mut constraints = Vec::new();
    if let Some(range) = &intent.date_range {
        constraints.push(format!(
            "Restrict dates to {} .. {} inclusive.",
            range.start, range.end
        ));
    }
    if let Some(team) = &intent.team {
        constraints.push(format!(
            "Restrict to team '{}' (teams.id = '{}').",
            team.name.replace('\'', "''"),
            team.id
        ));
    } else if let Some(name) = &intent.unmatched_team {
        constraints.push(format!(
            "Restrict to the team whose name is exactly '{}'.",
            name.replace('\'', "''")
        ));
    }
    if let Some(limit) = intent.limit {
        constraints.push(format!("Return at most {} rows.", limit.min(max_rows as u32)));
    } else {
        constraints.push(format!("Return at most {} rows.", max_rows));
    }

    format!(
        r#"## Schema
{schema}
## Question
{question}

## Parsed intent
{intent_json}

## Constraints
{constraints}

Write the SQL."#,
        schema = schema::describe_for_prompt(),
        constraints = constraints.join("\n"),
    )
}

pub fn explain_prompt(question: &str, sql: &str, row_count: usize, sample_json: &str) -> String {
    format!(
        r#"Question: {question}

The query returned {row_count} rows. Sample (JSON):
{sample_json}

SQL used (for your context only):
{sql}

Answer the question."#
    )
}

pub fn classify_prompt(app_name: &str, context: &str, profile_json: &str) -> String {
    format!(
        r#"Application: "{app_name}"
Scope: {context}

Usage over the last 30 days (JSON):
{profile_json}

Classify the application as one of:
- "productive": tools used to do the job (IDEs, office suites, design tools, internal systems)
- "neutral": communication or utilities that can go either way (email, chat, calendars, file managers)
- "unproductive": entertainment, games, social media, shopping

Return JSON:
{{"classification": "productive|neutral|unproductive", "confidence": 0.0-1.0, "reasoning": "one or two sentences"}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::intent::{EntityKind, IntentKind, TeamRef};
    use crate::agent::time::DateRange;
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[test]
    fn test_sql_prompt_carries_constraints() {
        let mut intent = QueryIntent::list(EntityKind::Usage);
        intent.intent = IntentKind::Ranking;
        intent.limit = Some(5);
        intent.team = Some(TeamRef { id: Uuid::nil(), name: "O'Brien Ops".into() });
        intent.date_range = Some(DateRange::new(
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 12).unwrap(),
            "last week",
        ));

        let prompt = sql_prompt("who worked most last week?", &intent, 1000);
        assert!(prompt.contains("2024-05-06 .. 2024-05-12"));
        assert!(prompt.contains("'O''Brien Ops'"));
        assert!(prompt.contains("at most 5 rows"));
        assert!(prompt.contains("TABLE daily_usage"));
    }
}
