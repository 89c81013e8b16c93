//! Streaming schema inference.
//!
//! A single pass over the normalized feature sequence accumulates one
//! [`PropertyTypeState`] per property key, widening monotonically when
//! conflicting kinds appear across features. The accumulated table is bounded
//! by the number of distinct keys, never by feature count.

use std::collections::HashMap;

use log::warn;
use serde_json::Value;

use crate::columns::{ColumnPlan, PropertySelection};
use crate::features::FeatureRecord;
use crate::schema::{ColumnMode, ColumnSource, ColumnType, ResolvedColumn, ResolvedSchema, SchemaField};

/// Accumulating type classification for one property key.
///
/// Widening is monotonic: once conflicting primitive kinds are observed the
/// state moves to `String` and never narrows back. Mixing integers and
/// floats widens to `Float`, since no data is lost when loading an integer
/// into a float column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyTypeState {
    /// Only nulls (or nothing) observed so far
    #[default]
    Unseen,
    /// Only integers observed
    Integer,
    /// Floats, or a mix of floats and integers
    Float,
    /// Only booleans observed
    Boolean,
    /// Strings, nested structures, or conflicting primitive kinds
    String,
}

impl PropertyTypeState {
    /// Join two states. Pure, commutative, associative, and idempotent, so
    /// the result is independent of observation order.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unseen, state) | (state, Self::Unseen) => state,
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::String,
        }
    }

    /// Fold one observed value into the state.
    ///
    /// Nulls carry no type information and leave the state untouched.
    #[must_use]
    pub fn observe(self, value: &Value) -> Self {
        match value_kind(value) {
            Some(kind) => self.merge(kind),
            None => self,
        }
    }

    /// The BigQuery datatype this state maps to.
    #[must_use]
    pub fn column_type(self) -> ColumnType {
        match self {
            Self::Unseen => ColumnType::Unknown,
            Self::Integer => ColumnType::Integer,
            Self::Float => ColumnType::Float,
            Self::Boolean => ColumnType::Boolean,
            Self::String => ColumnType::String,
        }
    }
}

/// Classify one JSON value. Nested structures classify as strings (their
/// serialized form); nulls classify as nothing.
fn value_kind(value: &Value) -> Option<PropertyTypeState> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(PropertyTypeState::Boolean),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                Some(PropertyTypeState::Integer)
            } else {
                Some(PropertyTypeState::Float)
            }
        },
        Value::String(_) | Value::Array(_) | Value::Object(_) => Some(PropertyTypeState::String),
    }
}

#[derive(Debug, Default)]
struct KeyState {
    ty: PropertyTypeState,
    non_null_count: u64,
}

/// Streaming schema builder for one source file.
///
/// Feed every record to [`SchemaBuilder::observe`], then call
/// [`SchemaBuilder::finish`] to materialize the final schema. The schema is
/// derived once per source file and is immutable thereafter.
#[derive(Debug)]
pub struct SchemaBuilder<'a> {
    plan: &'a ColumnPlan,
    feature_count: u64,
    keys: Vec<String>,
    states: HashMap<String, KeyState>,
}

impl<'a> SchemaBuilder<'a> {
    /// Create a builder for the given column plan.
    #[must_use]
    pub fn new(plan: &'a ColumnPlan) -> Self {
        Self {
            plan,
            feature_count: 0,
            keys: Vec::new(),
            states: HashMap::new(),
        }
    }

    /// Fold one feature into the accumulated state.
    pub fn observe(&mut self, record: &FeatureRecord) {
        self.feature_count += 1;

        let Some(properties) = record.properties() else {
            return;
        };
        for (key, value) in properties {
            if !self.states.contains_key(key) {
                self.keys.push(key.clone());
            }
            let state = self.states.entry(key.clone()).or_default();
            state.ty = state.ty.observe(value);
            if !value.is_null() {
                state.non_null_count += 1;
            }
        }
    }

    /// Number of features observed so far.
    #[must_use]
    pub fn feature_count(&self) -> u64 {
        self.feature_count
    }

    /// Materialize the final schema.
    ///
    /// Fixed columns come first, in plan order, then property columns in
    /// first-seen order, filtered and renamed per the plan. Keys the plan
    /// requested but the stream never produced are dropped with a warning.
    /// An empty stream yields just the plan's fixed columns.
    #[must_use]
    pub fn finish(self) -> ResolvedSchema {
        let mut columns: Vec<ResolvedColumn> = Vec::new();

        for directive in &self.plan.fixed {
            columns.push(ResolvedColumn {
                field: SchemaField {
                    name: directive.output.clone(),
                    column_type: directive.column.column_type(),
                    mode: ColumnMode::Nullable,
                },
                source: ColumnSource::Fixed(directive.column),
            });
        }

        for key in &self.keys {
            let Some(output) = self.plan.property_output(key) else {
                continue;
            };
            if columns.iter().any(|c| c.field.name == output) {
                warn!(
                    "Property '{key}' would collide with the '{output}' column; \
                     dropping the property column."
                );
                continue;
            }

            let state = &self.states[key];
            let mode = if state.non_null_count == self.feature_count && self.feature_count > 0 {
                ColumnMode::Required
            } else {
                ColumnMode::Nullable
            };
            columns.push(ResolvedColumn {
                field: SchemaField {
                    name: output.to_string(),
                    column_type: state.ty.column_type(),
                    mode,
                },
                source: ColumnSource::Property(key.clone()),
            });
        }

        if let PropertySelection::Explicit(directives) = &self.plan.properties {
            for directive in directives {
                if !self.states.contains_key(&directive.key) {
                    warn!(
                        "Column '{}' was requested but never appeared in any feature; \
                         it will not be part of the schema.",
                        directive.key
                    );
                }
            }
        }

        ResolvedSchema { columns }
    }
}
