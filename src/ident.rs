//! Validated SQL identifiers, key expressions and literals
//!
//! Everything interpolated into rendered SQL passes through one of these
//! types. Identifiers come from the CLI, the environment and
//! `information_schema`; key expressions come from catalog tables that
//! anyone with write access to the catalog can edit.

use crate::error::{DataSpyError, Result};
use serde::{Serialize, Serializer};
use std::fmt;

const MAX_IDENT_LEN: usize = 255;

/// A bare SQL identifier: `[A-Za-z_][A-Za-z0-9_$]*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate_ident(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded copy, used for catalog lookups and literal comparisons
    pub fn lower(&self) -> Self {
        Self(self.0.to_lowercase())
    }

    /// Join two identifiers with an underscore (`dev` + `orders` -> `dev_orders`)
    pub fn prefixed(&self, prefix: &str) -> Result<Self> {
        Self::new(format!("{}_{}", prefix, self.0))
    }

    /// Append a suffix (`orders` + `row_level_diff` -> `orders_row_level_diff`)
    pub fn suffixed(&self, suffix: &str) -> Result<Self> {
        Self::new(format!("{}_{}", self.0, suffix))
    }

    /// Double-quoted form, used where the output column name must keep its case
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Single-quoted string literal holding the identifier's text
    pub fn literal(&self) -> String {
        quote_literal(&self.0)
    }

    pub fn eq_ignore_case(&self, other: &Ident) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

fn validate_ident(value: &str) -> Result<()> {
    let mut chars = value.chars();
    let first = chars
        .next()
        .ok_or_else(|| DataSpyError::invalid_identifier(value, "identifier is empty"))?;

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(DataSpyError::invalid_identifier(
            value,
            "must start with a letter or underscore",
        ));
    }

    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(DataSpyError::invalid_identifier(
            value,
            format!("character '{}' is not allowed", bad),
        ));
    }

    if value.len() > MAX_IDENT_LEN {
        return Err(DataSpyError::invalid_identifier(
            value,
            format!("longer than {} characters", MAX_IDENT_LEN),
        ));
    }

    Ok(())
}

/// A catalog-declared key expression (primary key or freshness key)
///
/// Keys are usually plain column names but may be expressions such as
/// `DATE(created_at)` or `order_id || line_id`. String literals, statement
/// separators and comments are rejected outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpr(String);

impl KeyExpr {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        validate_key_expr(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_key_expr(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(DataSpyError::invalid_identifier(value, "key expression is empty"));
    }

    if value.contains("--") || value.contains("/*") || value.contains("*/") {
        return Err(DataSpyError::invalid_identifier(
            value,
            "comments are not allowed in key expressions",
        ));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || " _$.,()|:+-*/".contains(c);
    if let Some(bad) = value.chars().find(|c| !allowed(*c)) {
        return Err(DataSpyError::invalid_identifier(
            value,
            format!("character '{}' is not allowed in key expressions", bad),
        ));
    }

    let mut depth: i32 = 0;
    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DataSpyError::invalid_identifier(value, "unbalanced parentheses"));
    }

    Ok(())
}

/// Render a string as a single-quoted SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render an optional string as a literal or `NULL`
pub fn literal_or_null(value: Option<&str>) -> String {
    match value {
        Some(v) => quote_literal(v),
        None => "NULL".to_string(),
    }
}
