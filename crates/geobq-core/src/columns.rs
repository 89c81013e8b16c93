//! Column specification resolution.
//!
//! Turns the raw user directive (a JSON array of column names, or a JSON
//! object mapping column names to output names) into a typed, ordered
//! [`ColumnPlan`] consumed by schema inference and transcoding.

use std::collections::HashMap;

use log::warn;
use serde_json::Value;

use crate::error::ColumnError;
use crate::schema::ColumnType;

/// The geometry-derived columns every conversion can emit.
///
/// Only [`FixedColumn::Geometry`] is included by default; the other two can
/// be requested through the column spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedColumn {
    /// The feature's geometry, loadable as a GEOGRAPHY column
    Geometry,
    /// The whole feature (geometry and properties) as GeoJSON text
    FullFeature,
    /// Just the geometry as GeoJSON text
    GeometryOnly,
}

impl FixedColumn {
    /// The canonical name used to request the column in a spec.
    #[must_use]
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Geometry => "geometry",
            Self::FullFeature => "geojson",
            Self::GeometryOnly => "geojson_geometry",
        }
    }

    /// The datatype the column always carries.
    #[must_use]
    pub fn column_type(self) -> ColumnType {
        match self {
            Self::Geometry => ColumnType::Geography,
            Self::FullFeature | Self::GeometryOnly => ColumnType::String,
        }
    }

    fn from_canonical(name: &str) -> Option<Self> {
        match name {
            "geometry" => Some(Self::Geometry),
            "geojson" => Some(Self::FullFeature),
            "geojson_geometry" => Some(Self::GeometryOnly),
            _ => None,
        }
    }
}

/// A selected geometry-derived column and the name it is emitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDirective {
    /// Which fixed column is selected
    pub column: FixedColumn,
    /// The output name for the column
    pub output: String,
}

/// A selected property column and the name it is emitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDirective {
    /// The property key as it appears in the features
    pub key: String,
    /// The output name for the column
    pub output: String,
}

/// Which property columns the plan includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySelection {
    /// Every property key observed in the stream, in first-seen order
    All,
    /// Only the listed keys, renamed per directive
    Explicit(Vec<PropertyDirective>),
}

/// The resolved, ordered column plan for one run.
///
/// Output names are unique across all directives; a column with no directive
/// is absent from the output entirely rather than emitted as null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    /// Geometry-derived columns in spec order
    pub fixed: Vec<FixedDirective>,
    /// Property column membership
    pub properties: PropertySelection,
}

impl Default for ColumnPlan {
    /// The plan used when no spec is supplied: the geometry column under its
    /// canonical name, followed by every property key in first-seen order.
    fn default() -> Self {
        Self {
            fixed: vec![FixedDirective {
                column: FixedColumn::Geometry,
                output: "geometry".to_string(),
            }],
            properties: PropertySelection::All,
        }
    }
}

impl ColumnPlan {
    /// Resolve a raw column directive into a plan.
    ///
    /// An array restricts membership and keeps canonical names; an object
    /// restricts membership and renames. Naming a fixed column governs the
    /// three geometry-derived columns only; naming at least one property key
    /// additionally restricts property membership to exactly those keys.
    /// Names that are neither fixed columns nor observable property keys are
    /// detected lazily during inference and dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ColumnError`] when the directive is not valid JSON, has the
    /// wrong shape, or maps two columns to the same output name.
    pub fn from_directive(raw: &str) -> Result<Self, ColumnError> {
        if raw.trim().is_empty() {
            warn!(
                "The column spec was an empty string. No geographic columns will be \
                 included in the schema."
            );
            return Ok(Self {
                fixed: Vec::new(),
                properties: PropertySelection::All,
            });
        }

        let value: Value =
            serde_json::from_str(raw).map_err(|err| ColumnError::InvalidJson {
                message: err.to_string(),
            })?;

        let pairs = directive_pairs(&value)?;
        if pairs.is_empty() {
            warn!(
                "The column spec contained an empty JSON object or array. No geographic \
                 columns will be included in the schema."
            );
        }

        let mut fixed: Vec<FixedDirective> = Vec::new();
        let mut explicit: Vec<PropertyDirective> = Vec::new();
        let mut outputs: HashMap<String, String> = HashMap::new();

        for (canonical, output) in pairs {
            let column = FixedColumn::from_canonical(&canonical);
            let already_named = match column {
                Some(column) => fixed.iter().any(|d| d.column == column),
                None => explicit.iter().any(|d| d.key == canonical),
            };
            if already_named {
                warn!("Column '{canonical}' was named more than once; keeping the first.");
                continue;
            }

            if let Some(first) = outputs.get(&output) {
                return Err(ColumnError::DuplicateOutputName {
                    output,
                    first: first.clone(),
                    second: canonical,
                });
            }

            match column {
                Some(column) => fixed.push(FixedDirective {
                    column,
                    output: output.clone(),
                }),
                None => explicit.push(PropertyDirective {
                    key: canonical.clone(),
                    output: output.clone(),
                }),
            }
            outputs.insert(output, canonical);
        }

        let properties = if explicit.is_empty() {
            PropertySelection::All
        } else {
            PropertySelection::Explicit(explicit)
        };

        Ok(Self { fixed, properties })
    }

    /// The output name a property key is emitted under, if it is included.
    #[must_use]
    pub fn property_output<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        match &self.properties {
            PropertySelection::All => Some(key),
            PropertySelection::Explicit(directives) => directives
                .iter()
                .find(|d| d.key == key)
                .map(|d| d.output.as_str()),
        }
    }

    /// Whether a fixed column is part of the plan.
    #[must_use]
    pub fn includes_fixed(&self, column: FixedColumn) -> bool {
        self.fixed.iter().any(|d| d.column == column)
    }
}

/// Flatten the spec JSON into ordered `(canonical, output)` pairs.
fn directive_pairs(value: &Value) -> Result<Vec<(String, String)>, ColumnError> {
    match value {
        Value::Array(entries) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(name) => Ok((name.clone(), name.clone())),
                other => Err(ColumnError::UnsupportedShape {
                    found: format!("an array containing {}", json_kind(other)),
                }),
            })
            .collect(),
        Value::Object(mapping) => mapping
            .iter()
            .map(|(name, output)| match output {
                Value::String(output) => Ok((name.clone(), output.clone())),
                other => Err(ColumnError::UnsupportedShape {
                    found: format!("a mapping to {}", json_kind(other)),
                }),
            })
            .collect(),
        other => Err(ColumnError::UnsupportedShape {
            found: json_kind(other).to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
