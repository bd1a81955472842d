//! Read-only safety gate for model-authored SQL.
//!
//! Classification is purely lexical. A statement is allowed only if it starts
//! with `SELECT` or `SHOW` and contains none of the write/DDL keywords as a
//! whole word anywhere in its text (string literals and identifiers included).

use std::sync::OnceLock;

use regex::Regex;

/// Keywords that deny a statement wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: &[&str] = &["DROP", "DELETE", "TRUNCATE", "UPDATE", "INSERT", "ALTER"];

/// Outcome of classifying one SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Allowed,
    Denied(String),
}

impl SafetyVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyVerdict::Allowed)
    }
}

fn leading_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(SELECT|SHOW)\b").expect("static regex"))
}

fn forbidden_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
        Regex::new(&pattern).expect("static regex")
    })
}

/// Classify `sql` as allowed or denied.
pub fn classify(sql: &str) -> SafetyVerdict {
    let text = sql.trim();
    if text.is_empty() {
        return SafetyVerdict::Denied("empty statement".to_string());
    }

    if !leading_keyword().is_match(text) {
        return SafetyVerdict::Denied("only SELECT or SHOW statements are allowed".to_string());
    }

    if let Some(found) = forbidden_keyword().find(text) {
        return SafetyVerdict::Denied(format!(
            "forbidden keyword '{}' found",
            found.as_str().to_ascii_uppercase()
        ));
    }

    SafetyVerdict::Allowed
}

/// Whether the (trimmed) statement is a `SELECT`.
pub fn is_select(sql: &str) -> bool {
    leading_keyword()
        .captures(sql.trim())
        .and_then(|c| c.get(1))
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("SELECT"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_allowed() {
        assert_eq!(classify("SELECT 1"), SafetyVerdict::Allowed);
        assert_eq!(classify("  select name from users  "), SafetyVerdict::Allowed);
    }

    #[test]
    fn test_show_allowed() {
        assert_eq!(classify("SHOW TABLES"), SafetyVerdict::Allowed);
        assert!(classify("show columns from orders").is_allowed());
    }

    #[test]
    fn test_stacked_drop_denied() {
        let verdict = classify("select * from users; DROP TABLE users");
        assert_eq!(
            verdict,
            SafetyVerdict::Denied("forbidden keyword 'DROP' found".to_string())
        );
    }

    #[test]
    fn test_write_statements_denied() {
        assert!(!classify("UPDATE t SET x=1").is_allowed());
        assert!(!classify("INSERT INTO t VALUES (1)").is_allowed());
        assert!(!classify("delete from t").is_allowed());
        assert!(!classify("WITH x AS (SELECT 1) SELECT * FROM x").is_allowed());
    }

    #[test]
    fn test_word_boundary_columns_allowed() {
        assert!(classify("SELECT update_time FROM logs").is_allowed());
        assert!(classify("SELECT created_by, deleted_flag FROM audit").is_allowed());
        assert!(classify("SELECT * FROM inserts_log").is_allowed());
    }

    #[test]
    fn test_forbidden_word_in_literal_denied() {
        assert!(!classify("SELECT * FROM notes WHERE body = 'please delete me'").is_allowed());
    }

    #[test]
    fn test_empty_and_whitespace_denied() {
        assert_eq!(classify(""), SafetyVerdict::Denied("empty statement".to_string()));
        assert!(!classify("   \n").is_allowed());
    }

    #[test]
    fn test_selection_prefix_not_a_keyword() {
        assert!(!classify("SELECTION FROM t").is_allowed());
    }

    #[test]
    fn test_is_select() {
        assert!(is_select(" select 1"));
        assert!(!is_select("SHOW TABLES"));
        assert!(!is_select("EXPLAIN SELECT 1"));
    }
}
