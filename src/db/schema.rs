use std::collections::HashMap;

use super::statement::{Dialect, qualified_name};

/// Destination column types keyed by lowercased column name
pub type ColumnTypes = HashMap<String, SqlType>;

/// SQL data type of a destination column, as reported by `information_schema`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Interval,
    Uuid,
    Bytea,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Interval => "INTERVAL",
            SqlType::Uuid => "UUID",
            SqlType::Bytea => "BYTEA",
        }
    }

    /// Map an `information_schema.columns.data_type` value from either
    /// PostgreSQL or MySQL. Unknown types fall back to TEXT.
    pub fn from_information_schema(data_type: &str) -> Self {
        match data_type.trim().to_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "SMALLINT" | "INT2" | "TINYINT" => SqlType::SmallInt,
            "INTEGER" | "INT" | "INT4" | "MEDIUMINT" => SqlType::Integer,
            "BIGINT" | "INT8" => SqlType::BigInt,
            "REAL" | "FLOAT4" | "FLOAT" => SqlType::Real,
            "DOUBLE PRECISION" | "FLOAT8" | "DOUBLE" => SqlType::DoublePrecision,
            "NUMERIC" | "DECIMAL" => SqlType::Numeric,
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "DATETIME" => SqlType::Timestamp,
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => SqlType::TimestampTz,
            "DATE" => SqlType::Date,
            "TIME" | "TIME WITHOUT TIME ZONE" => SqlType::Time,
            "INTERVAL" => SqlType::Interval,
            "UUID" => SqlType::Uuid,
            "BYTEA" => SqlType::Bytea,
            _ => SqlType::Text,
        }
    }

    /// Types PostgreSQL will not assign from a text parameter; these are bound
    /// as strings and wrapped in an explicit CAST in the statement.
    pub fn needs_postgres_cast(&self) -> bool {
        matches!(
            self,
            SqlType::TimestampTz | SqlType::Date | SqlType::Time | SqlType::Interval | SqlType::Bytea
        )
    }
}

/// Build the column type map from `(column_name, data_type)` rows
pub fn column_types_from_rows(rows: Vec<(String, String)>) -> ColumnTypes {
    rows.into_iter()
        .map(|(name, data_type)| {
            (
                name.to_lowercase(),
                SqlType::from_information_schema(&data_type),
            )
        })
        .collect()
}

/// Column set of the Majestic Million dataset
pub const DOMAIN_COLUMNS: &[(&str, &str)] = &[
    ("GlobalRank", "int"),
    ("TldRank", "int"),
    ("Domain", "varchar(255)"),
    ("TLD", "varchar(255)"),
    ("RefSubNets", "int"),
    ("RefIPs", "int"),
    ("IDN_Domain", "varchar(255)"),
    ("IDN_TLD", "varchar(255)"),
    ("PrevGlobalRank", "int"),
    ("PrevTldRank", "int"),
    ("PrevRefSubNets", "int"),
    ("PrevRefIPs", "int"),
];

/// Idempotent DDL for the destination table
pub fn bootstrap_ddl(dialect: Dialect, table: &str) -> String {
    let column_defs: Vec<String> = DOMAIN_COLUMNS
        .iter()
        .map(|(name, col_type)| format!("  {} {}", name, col_type))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        qualified_name(dialect, table),
        column_defs.join(",\n")
    )
}
