//! Schema description types for db-ask.
//!
//! A `SchemaDescription` is built once per session by introspecting the store
//! and is immutable afterwards. It grounds both prompt construction and the
//! identifier checks done before execution.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::types::{Row, Value};
use crate::error::{AskError, Result};

/// Semantic column type inferred from declared or observed storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    DateTime,
    Boolean,
    #[default]
    Unknown,
}

impl ColumnType {
    /// Maps a declared column type to a semantic type.
    ///
    /// Follows SQLite's affinity rules, except that boolean and date/time
    /// declarations are recognized before the generic `INT` substring match.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_uppercase();
        if upper.is_empty() {
            return Self::Unknown;
        }
        if upper.contains("BOOL") {
            return Self::Boolean;
        }
        if upper.contains("DATE") || upper.contains("TIME") {
            return Self::DateTime;
        }
        if upper.contains("INT") {
            return Self::Integer;
        }
        if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            return Self::Text;
        }
        if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("NUMERIC")
            || upper.contains("DECIMAL")
        {
            return Self::Real;
        }
        Self::Unknown
    }

    /// Infers a type from sample values when nothing was declared.
    ///
    /// Returns `Unknown` when the non-null values disagree or there are none.
    pub fn observed<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut observed = None;
        for value in values {
            let ty = match value {
                Value::Null => continue,
                Value::Bool(_) => Self::Boolean,
                Value::Int(_) => Self::Integer,
                Value::Float(_) => Self::Real,
                Value::String(_) => Self::Text,
                Value::Bytes(_) => Self::Unknown,
            };
            match observed {
                None => observed = Some(ty),
                Some(prev) if prev == ty => {}
                Some(_) => return Self::Unknown,
            }
        }
        observed.unwrap_or(Self::Unknown)
    }

    /// Returns the type as a lowercase string for prompts and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for integer and real columns.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name, exactly as stored.
    pub name: String,

    /// Declared type as written in the table definition (may be empty).
    pub declared_type: String,

    /// Semantic type used for prompting.
    pub column_type: ColumnType,

    /// Whether the column allows NULL values.
    pub is_nullable: bool,
}

impl ColumnInfo {
    /// Creates a nullable column, inferring its semantic type from the declaration.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::from_declared(&declared_type),
            declared_type,
            is_nullable: true,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(self, nullable: bool) -> Self {
        Self {
            is_nullable: nullable,
            ..self
        }
    }

    /// Overrides the semantic type.
    pub fn with_type(self, column_type: ColumnType) -> Self {
        Self {
            column_type,
            ..self
        }
    }
}

/// Represents a table with its columns and a few grounding rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name, exactly as stored.
    pub name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,

    /// Sample rows, values in column order.
    pub sample_rows: Vec<Row>,
}

impl TableInfo {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            sample_rows: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the sample rows.
    pub fn with_sample_rows(mut self, rows: Vec<Row>) -> Self {
        self.sample_rows = rows;
        self
    }

    /// Looks up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// The structured schema of one store, in table registration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDescription {
    tables: Vec<TableInfo>,
    table_names: HashSet<String>,
    column_names: HashSet<String>,
}

impl SchemaDescription {
    /// Builds a schema description.
    ///
    /// Fails when there are no tables or when two tables share a name
    /// (compared case-insensitively, as SQLite does).
    pub fn new(tables: Vec<TableInfo>) -> Result<Self> {
        if tables.is_empty() {
            return Err(AskError::introspection(
                "The database has no tables. Load a data file before asking questions.",
            ));
        }

        let mut table_names = HashSet::with_capacity(tables.len());
        let mut column_names = HashSet::new();
        for table in &tables {
            if !table_names.insert(table.name.to_lowercase()) {
                return Err(AskError::introspection(format!(
                    "Duplicate table name '{}'",
                    table.name
                )));
            }
            column_names.extend(table.columns.iter().map(|c| c.name.to_lowercase()));
        }

        Ok(Self {
            tables,
            table_names,
            column_names,
        })
    }

    /// All tables, in registration order.
    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    /// Looks up a table by name, case-insensitively.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Returns true if a table with this name exists (case-insensitive).
    pub fn has_table(&self, name: &str) -> bool {
        self.table_names.contains(&name.to_lowercase())
    }

    /// Returns true if any table has a column with this name (case-insensitive).
    pub fn has_column(&self, name: &str) -> bool {
        self.column_names.contains(&name.to_lowercase())
    }

    /// Formats the schema for inclusion in a prompt.
    ///
    /// Every table and column name is rendered verbatim. At most
    /// `max_sample_rows` rows are shown per table.
    pub fn format_for_llm(&self, max_sample_rows: usize) -> String {
        let tables_text = self
            .tables
            .iter()
            .map(|table| Self::format_table_for_llm(table, max_sample_rows))
            .collect::<Vec<_>>()
            .join("\n");

        format!("Database Schema:\n\n{}", tables_text)
    }

    fn format_table_for_llm(table: &TableInfo, max_sample_rows: usize) -> String {
        let column_lines = table
            .columns
            .iter()
            .map(Self::format_column_line)
            .collect::<Vec<_>>()
            .join("");

        let sample_lines = table
            .sample_rows
            .iter()
            .take(max_sample_rows)
            .enumerate()
            .map(|(i, row)| {
                let cells = table
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| format!("{}={}", column.name, value.to_sql_literal()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("  Row {}: {}\n", i + 1, cells)
            })
            .collect::<Vec<_>>()
            .join("");

        if sample_lines.is_empty() {
            format!("Table: {}\nColumns:\n{}", table.name, column_lines)
        } else {
            format!(
                "Table: {}\nColumns:\n{}Sample data:\n{}",
                table.name, column_lines, sample_lines
            )
        }
    }

    fn format_column_line(column: &ColumnInfo) -> String {
        let declared = if column.declared_type.is_empty() {
            column.column_type.as_str().to_uppercase()
        } else {
            column.declared_type.clone()
        };
        if column.is_nullable {
            format!("  - {}: {} ({})\n", column.name, declared, column.column_type)
        } else {
            format!(
                "  - {}: {} ({}, NOT NULL)\n",
                column.name, declared, column.column_type
            )
        }
    }
}
