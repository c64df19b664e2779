//! Post-processing of LLM-written SQL: cleanup, fragment repairs and
//! structural edits that need to know the top-level clause layout.

use crate::llm::strip_code_fences;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref STATEMENT_START: Regex = Regex::new(r"(?i)\b(SELECT|WITH)\b").unwrap();
    static ref DOUBLE_AND: Regex = Regex::new(r"(?i)\bAND\s+AND\b").unwrap();
    static ref WHERE_CONJUNCTION: Regex = Regex::new(r"(?i)\bWHERE\s+(?:AND|OR)\b").unwrap();
    static ref AND_BEFORE_CLAUSE: Regex =
        Regex::new(r"(?i)\b(?:AND|OR)\s+(GROUP\s+BY|ORDER\s+BY|HAVING|LIMIT|OFFSET)\b").unwrap();
    static ref AND_BEFORE_PAREN: Regex = Regex::new(r"(?i)\b(?:AND|OR)\s*\)").unwrap();
    static ref EMPTY_WHERE: Regex =
        Regex::new(r"(?i)\bWHERE\s+(GROUP\s+BY|ORDER\s+BY|HAVING|LIMIT|OFFSET)\b").unwrap();
    static ref TRAILING_CONJUNCTION: Regex = Regex::new(r"(?i)\s*\b(?:AND|OR|WHERE)\s*$").unwrap();

    static ref AGGREGATE_DIVISION: Regex = Regex::new(
        r"(?i)\b((?:SUM|COUNT|AVG|MIN|MAX)\s*\((?:[^()]|\([^()]*\))*\))\s*/\s*((?:SUM|COUNT|AVG|MIN|MAX)\s*\((?:[^()]|\([^()]*\))*\))"
    )
    .unwrap();
    static ref COLUMN_DIVISION: Regex = Regex::new(
        r"(?i)\b((?:\w+\.)?\w+_(?:seconds|count))\s*/\s*((?:\w+\.)?\w+_(?:seconds|count))\b"
    )
    .unwrap();
    static ref INTEGER_DIVISOR: Regex = Regex::new(r"/\s*(\d+)([^.\d]|$)").unwrap();
    static ref ROUND_CALL: Regex = Regex::new(r"(?i)\bROUND\s*\(").unwrap();
}

/// Keywords that end a WHERE clause at the top level of a statement.
const CLAUSE_AFTER_WHERE: &[&str] = &[
    "GROUP", "HAVING", "WINDOW", "ORDER", "LIMIT", "OFFSET", "FETCH", "UNION", "INTERSECT",
    "EXCEPT", "FOR",
];

/// Words that can follow a FROM target but are not an alias.
const NOT_AN_ALIAS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "ON", "USING",
    "GROUP", "HAVING", "WINDOW", "ORDER", "LIMIT", "OFFSET", "FETCH", "UNION", "INTERSECT",
    "EXCEPT", "FOR", "TABLESAMPLE", "LATERAL",
];

/// Strips fences, leading prose and anything from the first top-level
/// semicolon onwards.
pub fn clean_llm_sql(raw: &str) -> String {
    let unfenced = strip_code_fences(raw);
    let body = match STATEMENT_START.find(unfenced) {
        Some(m) => &unfenced[m.start()..],
        None => unfenced,
    };
    let body = match first_unquoted(body, b';') {
        Some(idx) => &body[..idx],
        None => body,
    };
    body.trim().to_string()
}

/// Fixes conjunction fragments left behind by the LLM.
pub fn repair_conjunctions(sql: &str) -> String {
    let mut out = sql.to_string();
    loop {
        let next = DOUBLE_AND.replace_all(&out, "AND").to_string();
        if next == out {
            break;
        }
        out = next;
    }
    out = WHERE_CONJUNCTION.replace_all(&out, "WHERE").to_string();
    out = AND_BEFORE_CLAUSE.replace_all(&out, "$1").to_string();
    out = AND_BEFORE_PAREN.replace_all(&out, ")").to_string();
    out = EMPTY_WHERE.replace_all(&out, "$1").to_string();
    TRAILING_CONJUNCTION.replace(&out, "").to_string()
}

/// Rewrites integer divisions that would truncate to zero.
pub fn repair_division(sql: &str) -> String {
    let out = AGGREGATE_DIVISION.replace_all(sql, "$1::numeric / NULLIF($2, 0)");
    let out = COLUMN_DIVISION.replace_all(&out, "$1::numeric / NULLIF($2, 0)");
    INTEGER_DIVISOR.replace_all(&out, "/ ${1}.0${2}").to_string()
}

/// `ROUND(x, n)` needs a numeric `x` in PostgreSQL; `ROUND(x,)` is a
/// syntax error.
pub fn repair_round(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut rest = sql;
    while let Some(m) = ROUND_CALL.find(rest) {
        out.push_str(&rest[..m.start()]);
        let open = m.end() - 1;
        let Some(close) = matching_paren(rest, open) else {
            out.push_str(&rest[m.start()..]);
            return out;
        };
        let inner = &rest[open + 1..close];
        let args = split_top_level(inner, b',');
        let rewritten = match args.as_slice() {
            [x, n] if n.trim().is_empty() => format!("ROUND({})", repair_round(x.trim())),
            [x, n] => {
                let x = repair_round(x.trim());
                if is_numeric_cast(&x) {
                    format!("ROUND({}, {})", x, n.trim())
                } else {
                    format!("ROUND(({})::numeric, {})", x, n.trim())
                }
            }
            _ => format!("ROUND({})", repair_round(inner)),
        };
        out.push_str(&rewritten);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn is_numeric_cast(expr: &str) -> bool {
    let lower = expr.trim().to_lowercase();
    lower.ends_with("::numeric") || lower.ends_with("::decimal") || lower.ends_with("as numeric)")
}

/// Appends `LIMIT max_rows`, or lowers an existing literal limit above it.
pub fn ensure_limit(sql: &str, max_rows: usize) -> String {
    let Some((pos, _)) = top_level_words(sql)
        .into_iter()
        .filter(|(_, w)| w == "LIMIT")
        .last()
    else {
        return format!("{} LIMIT {}", sql.trim_end(), max_rows);
    };

    let after = pos + "LIMIT".len();
    let tail = &sql[after..];
    let value_start = after + (tail.len() - tail.trim_start().len());
    let value_len = sql[value_start..]
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(sql.len() - value_start);
    let value = &sql[value_start..value_start + value_len];

    let too_big = if value.eq_ignore_ascii_case("ALL") {
        true
    } else {
        value.parse::<u64>().map(|n| n > max_rows as u64).unwrap_or(false)
    };
    if too_big {
        format!(
            "{}{}{}",
            &sql[..value_start],
            max_rows,
            &sql[value_start + value_len..]
        )
    } else {
        sql.to_string()
    }
}

/// Adds `predicate` to the WHERE clause of the outermost query, creating
/// the clause when absent.
pub fn splice_where(sql: &str, predicate: &str) -> String {
    let words = top_level_words(sql);
    let from = words.iter().find(|(_, w)| w == "FROM").map(|(p, _)| *p).unwrap_or(0);

    let where_pos = words
        .iter()
        .find(|(p, w)| *p > from && w == "WHERE")
        .map(|(p, _)| *p);
    let next_clause = |after: usize| {
        words
            .iter()
            .find(|(p, w)| *p > after && CLAUSE_AFTER_WHERE.contains(&w.as_str()))
            .map(|(p, _)| *p)
            .unwrap_or(sql.len())
    };

    match where_pos {
        Some(pos) => {
            let cond_start = pos + "WHERE".len();
            let cond_end = next_clause(cond_start);
            let existing = sql[cond_start..cond_end].trim();
            let tail = &sql[cond_end..];
            let sep = if tail.is_empty() { "" } else { " " };
            format!(
                "{}WHERE ({}) AND ({}){}{}",
                &sql[..pos],
                predicate,
                existing,
                sep,
                tail.trim_start()
            )
        }
        None => {
            let at = next_clause(from);
            let head = sql[..at].trim_end();
            let tail = sql[at..].trim_start();
            if tail.is_empty() {
                format!("{head} WHERE {predicate}")
            } else {
                format!("{head} WHERE {predicate} {tail}")
            }
        }
    }
}

/// Table name and alias of the outermost query's first FROM target.
/// `None` for subqueries and function calls.
pub fn primary_from(sql: &str) -> Option<(String, String)> {
    let from = top_level_words(sql)
        .into_iter()
        .find(|(_, w)| w == "FROM")
        .map(|(p, _)| p)?;
    let mut rest = sql[from + "FROM".len()..].trim_start();
    if rest.starts_with('(') {
        return None;
    }

    let name_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '"'))
        .unwrap_or(rest.len());
    if name_len == 0 {
        return None;
    }
    let table = rest[..name_len].replace('"', "").to_lowercase();
    rest = rest[name_len..].trim_start();
    if rest.starts_with('(') {
        return None;
    }

    let mut alias_word = next_word(rest);
    if alias_word.eq_ignore_ascii_case("AS") {
        rest = rest[alias_word.len()..].trim_start();
        alias_word = next_word(rest);
    }
    let alias = if alias_word.is_empty() || NOT_AN_ALIAS.contains(&alias_word.to_uppercase().as_str()) {
        table.clone()
    } else {
        alias_word.replace('"', "")
    };
    Some((table, alias))
}

fn next_word(s: &str) -> &str {
    let len = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '"'))
        .unwrap_or(s.len());
    &s[..len]
}

/// Upper-cased words at parenthesis depth 0 outside quotes, with byte offsets.
pub(crate) fn top_level_words(sql: &str) -> Vec<(usize, String)> {
    let bytes = sql.as_bytes();
    let mut words = Vec::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_single {
            in_single = b != b'\'';
        } else if in_double {
            in_double = b != b'"';
        } else {
            match b {
                b'\'' => in_single = true,
                b'"' => in_double = true,
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ if is_word_byte(b) && (i == 0 || !is_word_byte(bytes[i - 1]) && bytes[i - 1] != b'.') => {
                    let start = i;
                    while i < bytes.len() && is_word_byte(bytes[i]) {
                        i += 1;
                    }
                    if depth == 0 {
                        words.push((start, sql[start..i].to_ascii_uppercase()));
                    }
                    continue;
                }
                _ => {}
            }
        }
        i += 1;
    }
    words
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Byte offset of the first `target` outside quotes.
fn first_unquoted(sql: &str, target: u8) -> Option<usize> {
    let mut in_single = false;
    let mut in_double = false;
    for (i, b) in sql.bytes().enumerate() {
        match b {
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            _ if b == target && !in_single && !in_double => return Some(i),
            _ => {}
        }
    }
    None
}

/// Offset of the parenthesis closing the one at `open`.
pub(crate) fn matching_paren(sql: &str, open: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let mut depth = 0i32;
    let mut in_single = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'\'' => in_single = !in_single,
            b'(' if !in_single => depth += 1,
            b')' if !in_single => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on `sep` at depth 0 outside quotes.
fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut start = 0;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'\'' => in_single = !in_single,
            b'(' if !in_single => depth += 1,
            b')' if !in_single => depth -= 1,
            _ if b == sep && depth == 0 && !in_single => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_llm_sql() {
        let raw = "Here is the query:\n```sql\nSELECT name FROM users;\n```";
        assert_eq!(clean_llm_sql(raw), "SELECT name FROM users");

        let raw = "SELECT 'a;b' AS x FROM teams; -- done";
        assert_eq!(clean_llm_sql(raw), "SELECT 'a;b' AS x FROM teams");
    }

    #[test]
    fn test_conjunction_repairs() {
        assert_eq!(
            repair_conjunctions("SELECT * FROM users WHERE AND role = 'x' AND AND is_active"),
            "SELECT * FROM users WHERE role = 'x' AND is_active"
        );
        assert_eq!(
            repair_conjunctions("SELECT a FROM t WHERE a > 1 AND GROUP BY a"),
            "SELECT a FROM t WHERE a > 1 GROUP BY a"
        );
        assert_eq!(
            repair_conjunctions("SELECT a FROM t WHERE ORDER BY a"),
            "SELECT a FROM t ORDER BY a"
        );
        assert_eq!(repair_conjunctions("SELECT a FROM t WHERE a > 1 AND"), "SELECT a FROM t WHERE a > 1");
    }

    #[test]
    fn test_division_repairs() {
        assert_eq!(
            repair_division("SELECT SUM(productive_seconds) / SUM(active_seconds) FROM daily_usage"),
            "SELECT SUM(productive_seconds)::numeric / NULLIF(SUM(active_seconds), 0) FROM daily_usage"
        );
        assert_eq!(
            repair_division("SELECT du.idle_seconds / du.active_seconds FROM daily_usage du"),
            "SELECT du.idle_seconds::numeric / NULLIF(du.active_seconds, 0) FROM daily_usage du"
        );
        assert_eq!(
            repair_division("SELECT SUM(active_seconds) / 3600 AS h FROM daily_usage"),
            "SELECT SUM(active_seconds) / 3600.0 AS h FROM daily_usage"
        );
        let once = repair_division("SELECT COUNT(*) / COUNT(DISTINCT user_id) FROM app_usage");
        assert_eq!(repair_division(&once), once);
        assert_eq!(repair_division("SELECT x / 3600.0 FROM t"), "SELECT x / 3600.0 FROM t");
    }

    #[test]
    fn test_round_repairs() {
        assert_eq!(
            repair_round("SELECT ROUND(SUM(a) / 3600.0, 2) AS h FROM t"),
            "SELECT ROUND((SUM(a) / 3600.0)::numeric, 2) AS h FROM t"
        );
        assert_eq!(repair_round("SELECT ROUND(AVG(x),) FROM t"), "SELECT ROUND(AVG(x)) FROM t");
        assert_eq!(
            repair_round("SELECT ROUND(AVG(x)::numeric, 1) FROM t"),
            "SELECT ROUND(AVG(x)::numeric, 1) FROM t"
        );
        let once = repair_round("SELECT round(ROUND(a, 1) * 2, 2) FROM t");
        assert_eq!(once, "SELECT ROUND((ROUND((a)::numeric, 1) * 2)::numeric, 2) FROM t");
        assert_eq!(repair_round(&once), once);
    }

    #[test]
    fn test_ensure_limit() {
        assert_eq!(ensure_limit("SELECT a FROM t", 1000), "SELECT a FROM t LIMIT 1000");
        assert_eq!(ensure_limit("SELECT a FROM t LIMIT 5", 1000), "SELECT a FROM t LIMIT 5");
        assert_eq!(ensure_limit("SELECT a FROM t LIMIT 50000", 1000), "SELECT a FROM t LIMIT 1000");
        assert_eq!(
            ensure_limit("SELECT a FROM (SELECT a FROM t LIMIT 3) s", 10),
            "SELECT a FROM (SELECT a FROM t LIMIT 3) s LIMIT 10"
        );
    }

    #[test]
    fn test_splice_into_existing_where() {
        let sql = "SELECT u.name, SUM(du.active_seconds) FROM daily_usage du JOIN users u ON u.id = du.user_id WHERE du.date >= '2024-05-01' OR du.date IS NULL GROUP BY u.name";
        let out = splice_where(sql, "du.user_id = $1");
        assert_eq!(
            out,
            "SELECT u.name, SUM(du.active_seconds) FROM daily_usage du JOIN users u ON u.id = du.user_id WHERE (du.user_id = $1) AND (du.date >= '2024-05-01' OR du.date IS NULL) GROUP BY u.name"
        );
    }

    #[test]
    fn test_splice_creates_where() {
        assert_eq!(
            splice_where("SELECT name FROM users ORDER BY name LIMIT 5", "users.id = $1"),
            "SELECT name FROM users WHERE users.id = $1 ORDER BY name LIMIT 5"
        );
        assert_eq!(
            splice_where("SELECT name FROM users", "users.id = $1"),
            "SELECT name FROM users WHERE users.id = $1"
        );
        // Nested WHERE clauses are left alone.
        assert_eq!(
            splice_where("SELECT x FROM (SELECT id AS x FROM users WHERE is_active) s", "s.x = $1"),
            "SELECT x FROM (SELECT id AS x FROM users WHERE is_active) s WHERE s.x = $1"
        );
    }

    #[test]
    fn test_primary_from() {
        assert_eq!(
            primary_from("SELECT * FROM daily_usage du JOIN users u ON true"),
            Some(("daily_usage".into(), "du".into()))
        );
        assert_eq!(
            primary_from("SELECT * FROM app_usage AS a WHERE a.x = 1"),
            Some(("app_usage".into(), "a".into()))
        );
        assert_eq!(
            primary_from("SELECT * FROM users WHERE id = 1"),
            Some(("users".into(), "users".into()))
        );
        assert_eq!(
            primary_from("WITH x AS (SELECT 1 FROM teams) SELECT * FROM x"),
            Some(("x".into(), "x".into()))
        );
        assert_eq!(primary_from("SELECT * FROM (SELECT 1) s"), None);
        assert_eq!(
            primary_from("SELECT EXTRACT(DOW FROM date) FROM daily_usage"),
            Some(("daily_usage".into(), "daily_usage".into()))
        );
    }
}
