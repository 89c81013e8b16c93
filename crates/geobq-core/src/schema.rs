//! Output schema types for BigQuery table creation.
//!
//! This module defines the data structures describing the columns of a
//! converted file, and persists them as the JSON and plaintext schema files
//! that accompany every conversion.

use std::fmt;
use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::columns::FixedColumn;
use crate::error::{IoErrorExt, Result};

/// BigQuery datatype inferred for an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// 64-bit integer values
    Integer,
    /// Floating-point values, or a mix of integers and floats
    Float,
    /// Boolean values
    Boolean,
    /// String values, nested structures, or mixed primitive kinds
    String,
    /// GeoJSON geometry loadable as a GEOGRAPHY column
    Geography,
    /// No non-null value was ever observed for the column
    Unknown,
}

impl ColumnType {
    /// The BigQuery name of the datatype.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::String => "STRING",
            Self::Geography => "GEOGRAPHY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BigQuery column mode.
///
/// A column is `Required` only when every feature carried a non-null value
/// for it; geometry-derived columns are always `Nullable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    /// The column may hold nulls
    Nullable,
    /// The column held a non-null value in every feature
    Required,
}

impl ColumnMode {
    /// The BigQuery name of the mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nullable => "NULLABLE",
            Self::Required => "REQUIRED",
        }
    }
}

impl fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    /// Output column name
    pub name: String,
    /// Inferred datatype
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Column mode
    pub mode: ColumnMode,
}

/// Ordered output schema for one converted file.
///
/// Serializes as a JSON array of `{name, type, mode}` objects, the format
/// accepted when creating a BigQuery table programmatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    /// Schema entries in output-column order
    pub fields: Vec<SchemaField>,
}

impl Schema {
    /// Number of columns in the schema.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no columns at all.
    ///
    /// An empty schema is valid; it is what an empty feature stream combined
    /// with an empty column plan produces.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the schema as a JSON array string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(anyhow::Error::from)?)
    }

    /// Render the schema as plaintext for manual console entry.
    ///
    /// One `name:TYPE,` line per column, with the trailing comma and newline
    /// removed.
    #[must_use]
    pub fn to_plaintext(&self) -> String {
        let mut text = String::new();
        for field in &self.fields {
            text.push_str(&field.name);
            text.push(':');
            text.push_str(field.column_type.as_str());
            text.push_str(",\n");
        }
        text.truncate(text.trim_end_matches(",\n").len());
        text
    }

    /// Names of columns whose datatype could not be determined.
    #[must_use]
    pub fn unknown_columns(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.column_type == ColumnType::Unknown)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// Where a column's values come from during transcoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// A geometry-derived column
    Fixed(FixedColumn),
    /// A feature property, identified by its original key
    Property(String),
}

/// One output column bound to its value source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// The schema entry for the column
    pub field: SchemaField,
    /// Where the column's values come from
    pub source: ColumnSource,
}

/// The finalized schema with value sources attached.
///
/// Produced once per source file after a full inference pass, immutable
/// thereafter; the transcoder reads it to emit records consistent with the
/// persisted schema.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSchema {
    /// Output columns in emission order
    pub columns: Vec<ResolvedColumn>,
}

impl ResolvedSchema {
    /// The plain schema, suitable for persistence and display.
    #[must_use]
    pub fn schema(&self) -> Schema {
        Schema {
            fields: self.columns.iter().map(|c| c.field.clone()).collect(),
        }
    }
}

/// Save the schema into JSON and plaintext files.
///
/// The JSON version can be used to create a BigQuery table programmatically.
/// The plaintext version can be used to copy/paste the schema when creating a
/// table through the BigQuery console.
///
/// # Errors
///
/// Returns an error if either file cannot be written.
pub fn save_schema_files(schema: &Schema, json_path: &Path, text_path: &Path) -> Result<()> {
    info!("Saving schema json file to {}", json_path.display());
    fs::write(json_path, schema.to_json()?).with_write_context(json_path)?;

    info!("Saving plaintext schema file to {}", text_path.display());
    fs::write(text_path, schema.to_plaintext()).with_write_context(text_path)?;

    let unknown = schema.unknown_columns();
    if !unknown.is_empty() {
        warn!(
            "Schema has one or more columns whose values could not be determined: {}. \
             Edit the schema files and enter the proper datatype(s) before using them.",
            unknown.join(", ")
        );
    }

    Ok(())
}
