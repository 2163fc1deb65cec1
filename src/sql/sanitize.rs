//! Identifier quoting and validation
//!
//! Identifiers cannot be bound as parameters, so every table, column and alias
//! that reaches generated SQL goes through `quote_identifier`. Values never do:
//! they are bound positionally (see `sql::params`).

use std::sync::LazyLock;

use regex::Regex;

static ALIAS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid alias pattern"));

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ANALYSE",
    "ANALYZE",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASYMMETRIC",
    "BOTH",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CURRENT_CATALOG",
    "CURRENT_DATE",
    "CURRENT_ROLE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "DEFAULT",
    "DEFERRABLE",
    "DESC",
    "DISTINCT",
    "DO",
    "ELSE",
    "END",
    "EXCEPT",
    "FALSE",
    "FETCH",
    "FOR",
    "FOREIGN",
    "FROM",
    "GRANT",
    "GROUP",
    "HAVING",
    "IN",
    "INITIALLY",
    "INTERSECT",
    "INTO",
    "LATERAL",
    "LEADING",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "ONLY",
    "OR",
    "ORDER",
    "PLACING",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SESSION_USER",
    "SOME",
    "SYMMETRIC",
    "TABLE",
    "THEN",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNIQUE",
    "USER",
    "USING",
    "VARIADIC",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

/// Quote a SQL identifier
///
/// Wraps the identifier in double quotes and doubles any embedded quote, so
/// the result is always a single identifier token whatever the input.
///
/// # Example
/// ```
/// use adaptive_repository::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("clientes"), "\"clientes\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Quote an alias-qualified column: `"c"."nome"`
pub fn quote_qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(alias), quote_identifier(column))
}

/// Quote a string literal for positions that cannot take a parameter
/// (JSON object keys in `json_build_object`, for instance)
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Validate a table alias or output key
///
/// Rules:
/// - Must start with a lowercase letter
/// - Can only contain lowercase letters, numbers, and underscores
/// - Cannot be a PostgreSQL reserved word
///
/// # Example
/// ```
/// use adaptive_repository::sql::validate_identifier;
///
/// assert!(validate_identifier("c").is_ok());
/// assert!(validate_identifier("from").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if !ALIAS_PATTERN.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    Ok(())
}

/// Split `alias.column` into its parts; unqualified names have no alias
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((alias, column)) => (Some(alias), column),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_simple() {
        assert_eq!(quote_identifier("clientes"), "\"clientes\"");
        assert_eq!(quote_identifier("a"), "\"a\"");
    }

    #[test]
    fn test_quote_identifier_neutralizes_injection() {
        assert_eq!(
            quote_identifier("id; DROP TABLE x"),
            "\"id; DROP TABLE x\""
        );
        assert_eq!(
            quote_identifier("nome\" OR 1=1 --"),
            "\"nome\"\" OR 1=1 --\""
        );
    }

    #[test]
    fn test_quote_identifier_unicode() {
        assert_eq!(quote_identifier("endereço"), "\"endereço\"");
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(quote_qualified("c", "deleted_at"), "\"c\".\"deleted_at\"");
    }

    #[test]
    fn test_quote_literal_escapes_quotes() {
        assert_eq!(quote_literal("street"), "'street'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("c").is_ok());
        assert!(validate_identifier("enderecos").is_ok());
        assert!(validate_identifier("e2").is_ok());
    }

    #[test]
    fn test_validate_identifier_invalid() {
        assert!(validate_identifier("").unwrap_err().contains("cannot be empty"));
        assert!(validate_identifier("1c").is_err());
        assert!(validate_identifier("_c").is_err());
        assert!(validate_identifier("C").is_err());
        assert!(validate_identifier("c.d").is_err());
        assert!(validate_identifier("c d").is_err());
    }

    #[test]
    fn test_validate_identifier_reserved() {
        let result = validate_identifier("select");
        assert!(result.unwrap_err().contains("reserved keyword"));
        assert!(validate_identifier("order").is_err());
        assert!(validate_identifier("user").is_err());
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("c.nome"), (Some("c"), "nome"));
        assert_eq!(split_qualified("nome"), (None, "nome"));
        assert_eq!(split_qualified("a.b.c"), (Some("a"), "b.c"));
    }
}
