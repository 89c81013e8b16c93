//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting inferred schemas in a human-readable format.

use tabled::{Table, Tabled};

use geobq_core::Schema;

/// Table row representation for displaying one schema column.
#[derive(Tabled)]
pub struct SchemaRow {
    /// Output column name.
    #[tabled(rename = "Column")]
    pub name: String,
    /// Inferred BigQuery datatype.
    #[tabled(rename = "Type")]
    pub column_type: String,
    /// Column mode (NULLABLE or REQUIRED).
    #[tabled(rename = "Mode")]
    pub mode: String,
}

/// Display an inferred schema in a formatted table.
///
/// Presents the output columns, their BigQuery datatypes, and modes in a
/// human-readable table written to standard output.
pub fn display_schema(schema: &Schema) {
    if schema.is_empty() {
        println!("Schema: (no columns)");
        return;
    }

    let rows: Vec<SchemaRow> = schema
        .fields
        .iter()
        .map(|f| SchemaRow {
            name: f.name.clone(),
            column_type: f.column_type.to_string(),
            mode: f.mode.to_string(),
        })
        .collect();

    let table = Table::new(rows).to_string();
    println!("{table}");
}
