//! Write-boundary coercion of text fields into typed bind values

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use uuid::Uuid;

use super::schema::SqlType;

/// A field value after coercion to its destination column type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// Typed NULL so the parameter carries the column's type
    Null(SqlType),
    Bool(bool),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Text(&'a str),
}

/// Coerce a raw text field to `col_type`.
///
/// Empty fields become a typed NULL for every non-text column. Text columns
/// keep the value verbatim, including the empty string.
pub fn coerce<'a>(value: &'a str, col_type: &SqlType) -> Result<FieldValue<'a>> {
    if *col_type == SqlType::Text {
        return Ok(FieldValue::Text(value));
    }

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(FieldValue::Null(col_type.clone()));
    }

    Ok(match col_type {
        SqlType::Boolean => FieldValue::Bool(parse_bool(trimmed)?),
        SqlType::SmallInt => FieldValue::SmallInt(parse(trimmed, "SMALLINT")?),
        SqlType::Integer => FieldValue::Integer(parse(trimmed, "INTEGER")?),
        SqlType::BigInt => FieldValue::BigInt(parse(trimmed, "BIGINT")?),
        SqlType::Real => FieldValue::Real(parse(trimmed, "REAL")?),
        SqlType::DoublePrecision | SqlType::Numeric => {
            FieldValue::Double(parse(trimmed, col_type.to_postgres())?)
        }
        SqlType::Uuid => FieldValue::Uuid(Uuid::parse_str(trimmed).with_context(|| {
            format!(
                "Type mismatch: Cannot convert value to UUID.\n\
                 - Expected: UUID format (e.g., '550e8400-e29b-41d4-a716-446655440000')\n\
                 - Got: '{}'",
                trimmed
            )
        })?),
        SqlType::Timestamp => FieldValue::Timestamp(
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
                .with_context(|| {
                    format!(
                        "Type mismatch: Cannot convert value to TIMESTAMP.\n\
                         - Expected: '2024-01-15 14:30:00' or '2024-01-15T14:30:00'\n\
                         - Got: '{}'",
                        trimmed
                    )
                })?,
        ),
        // Bound as text; the statement carries an explicit CAST on PostgreSQL
        SqlType::TimestampTz
        | SqlType::Date
        | SqlType::Time
        | SqlType::Interval
        | SqlType::Bytea
        | SqlType::Text => FieldValue::Text(trimmed),
    })
}

fn parse<T: std::str::FromStr>(value: &str, type_name: &str) -> Result<T>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        anyhow!(
            "Type mismatch: Cannot convert value to {}.\n\
             - Expected: Valid {} value\n\
             - Got: '{}'\n\
             - Error: {}",
            type_name,
            type_name,
            value,
            e
        )
    })
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err(anyhow!(
            "Type mismatch: Cannot convert value to BOOLEAN.\n\
             - Got: '{}'",
            value
        )),
    }
}
