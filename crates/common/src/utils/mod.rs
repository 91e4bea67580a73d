use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// A statement terminator: `;` followed by optional blanks and a line break.
static STATEMENT_TERMINATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r";[ \t\r]*\n").expect("statement terminator regex is valid"));

/// Split a script into single statements.
///
/// Only a `;` at the end of a line terminates a statement, so semicolons
/// inside a line (string literals, inline comments) are left alone. The
/// trailing `;` of the last statement is dropped and blank fragments are
/// skipped.
pub fn split_sql_statements(script: &str) -> Vec<String> {
    STATEMENT_TERMINATOR
        .split(script.trim())
        .map(|statement| statement.trim().trim_end_matches(';').trim_end())
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_sql_file(path: &Path) -> Result<String, std::io::Error> {
    std::fs::read_to_string(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_line_terminators() {
        assert_eq!(
            split_sql_statements("SELECT 1;\nSELECT 2;"),
            vec!["SELECT 1", "SELECT 2"]
        );
    }

    #[test]
    fn test_inline_semicolons_are_kept() {
        let script = "INSERT INTO t VALUES ('a;b');  \r\n\n  UPDATE t SET x = 1";
        assert_eq!(
            split_sql_statements(script),
            vec!["INSERT INTO t VALUES ('a;b')", "UPDATE t SET x = 1"]
        );
    }

    #[test]
    fn test_blank_script_yields_nothing() {
        assert!(split_sql_statements("  \n ;\n").is_empty());
    }
}
