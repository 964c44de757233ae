//! Parameterized INSERT statement built once from the header set

use super::schema::{ColumnTypes, SqlType};

/// SQL dialect of the write target, which decides placeholder and quoting style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    #[cfg(test)]
    Sqlite,
}

impl Dialect {
    /// Positional placeholder for the 1-based parameter `index`
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql => "?".to_string(),
            #[cfg(test)]
            Dialect::Sqlite => "?".to_string(),
        }
    }

    fn quote(self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            #[cfg(test)]
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

fn is_plain_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render an identifier for `dialect`.
///
/// Plain identifiers are emitted bare so PostgreSQL folds them to lower case
/// exactly like the unquoted names in the bootstrap DDL. Anything else is
/// quoted.
pub fn identifier(dialect: Dialect, ident: &str) -> String {
    if is_plain_identifier(ident) {
        ident.to_string()
    } else {
        dialect.quote(ident)
    }
}

/// Render a possibly schema-qualified name such as `loader.domain`
pub fn qualified_name(dialect: Dialect, name: &str) -> String {
    name.split('.')
        .map(|part| identifier(dialect, part))
        .collect::<Vec<_>>()
        .join(".")
}

/// Name used to look a table up in `information_schema`
pub(crate) fn catalog_name(dialect: Dialect, ident: &str) -> String {
    if dialect == Dialect::Postgres && is_plain_identifier(ident) {
        ident.to_lowercase()
    } else {
        ident.to_string()
    }
}

/// A single-row INSERT with one positional placeholder per column
#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub columns: Vec<String>,
    /// Destination type of each column, in column order
    pub column_types: Vec<SqlType>,
    pub sql: String,
}

impl InsertStatement {
    /// Build the statement from the header set.
    ///
    /// Columns missing from `types` are treated as TEXT.
    pub fn build(dialect: Dialect, table: &str, headers: &[String], types: &ColumnTypes) -> Self {
        let column_types: Vec<SqlType> = headers
            .iter()
            .map(|h| {
                types
                    .get(&h.to_lowercase())
                    .cloned()
                    .unwrap_or(SqlType::Text)
            })
            .collect();

        let column_list: Vec<String> = headers.iter().map(|h| identifier(dialect, h)).collect();

        let placeholders: Vec<String> = column_types
            .iter()
            .enumerate()
            .map(|(idx, col_type)| {
                let placeholder = dialect.placeholder(idx + 1);
                if dialect == Dialect::Postgres && col_type.needs_postgres_cast() {
                    format!("CAST({} AS {})", placeholder, col_type.to_postgres())
                } else {
                    placeholder
                }
            })
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified_name(dialect, table),
            column_list.join(", "),
            placeholders.join(", ")
        );

        Self {
            columns: headers.to_vec(),
            column_types,
            sql,
        }
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }
}
