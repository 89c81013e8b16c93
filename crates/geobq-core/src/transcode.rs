//! Feature transcoding into newline-delimited JSON.
//!
//! Re-consumes the normalized feature sequence and projects each feature
//! into one output record consistent with the finalized schema: same column
//! set, same relative key order on every line, values coerced to the
//! inferred column types.

use std::io::Write;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::columns::FixedColumn;
use crate::error::{IoErrorExt, Result};
use crate::features::FeatureRecord;
use crate::schema::{ColumnSource, ColumnType, ResolvedSchema};

/// Transcode a feature sequence into newline-delimited JSON records.
///
/// Writes exactly one `\n`-terminated JSON object per input feature, in
/// input order, and returns the number of records written.
///
/// # Errors
///
/// Returns an error if a feature fails to parse or a record cannot be
/// written.
pub fn transcode<I, W>(
    features: I,
    resolved: &ResolvedSchema,
    out: &mut W,
    destination: &Path,
) -> Result<u64>
where
    I: Iterator<Item = Result<FeatureRecord>>,
    W: Write,
{
    let mut written = 0;
    for record in features {
        let record = record?;
        let row = project(&record, resolved)?;
        let line = serde_json::to_string(&Value::Object(row)).map_err(anyhow::Error::from)?;
        writeln!(out, "{line}").with_write_context(destination)?;
        written += 1;
    }
    Ok(written)
}

/// Project one feature into an output record.
///
/// Property keys absent from the feature are omitted from the record
/// entirely, not emitted as null.
fn project(record: &FeatureRecord, resolved: &ResolvedSchema) -> Result<Map<String, Value>> {
    let mut row = Map::new();

    for column in &resolved.columns {
        match &column.source {
            ColumnSource::Fixed(fixed) => {
                row.insert(column.field.name.clone(), fixed_value(record, *fixed)?);
            },
            ColumnSource::Property(key) => {
                let Some(value) = record.properties().and_then(|p| p.get(key)) else {
                    continue;
                };
                row.insert(
                    column.field.name.clone(),
                    coerce(value, column.field.column_type),
                );
            },
        }
    }

    Ok(row)
}

fn fixed_value(record: &FeatureRecord, column: FixedColumn) -> Result<Value> {
    let text = match column {
        FixedColumn::Geometry | FixedColumn::GeometryOnly => record.geometry_text()?,
        FixedColumn::FullFeature => Some(record.feature_text()?),
    };
    Ok(text.map_or(Value::Null, Value::String))
}

/// Coerce a property value to the column's inferred type.
///
/// Numeric widening is applied uniformly: an integer in a FLOAT column is
/// emitted as a floating-point literal. Any value in a STRING column is
/// emitted as its string form, with nested structures serialized as JSON
/// text. Nulls pass through unchanged.
fn coerce(value: &Value, column_type: ColumnType) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match column_type {
        ColumnType::Float => match value.as_f64().and_then(Number::from_f64) {
            Some(number) => Value::Number(number),
            None => value.clone(),
        },
        ColumnType::String => match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        },
        ColumnType::Integer
        | ColumnType::Boolean
        | ColumnType::Geography
        | ColumnType::Unknown => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnPlan;
    use crate::infer::SchemaBuilder;
    use geojson::{Feature, GeoJson};
    use serde_json::json;

    fn record(line: &str) -> FeatureRecord {
        match line.parse::<GeoJson>().unwrap() {
            GeoJson::Feature(feature) => FeatureRecord { feature },
            other => panic!("expected a feature, got {other:?}"),
        }
    }

    fn property_record(properties: Value) -> FeatureRecord {
        let Value::Object(map) = properties else {
            panic!("properties must be an object");
        };
        FeatureRecord {
            feature: Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties: Some(map),
                foreign_members: None,
            },
        }
    }

    fn run(plan: &ColumnPlan, records: Vec<FeatureRecord>) -> (Vec<String>, u64) {
        let mut builder = SchemaBuilder::new(plan);
        for r in &records {
            builder.observe(r);
        }
        let resolved = builder.finish();

        let mut out = Vec::new();
        let written = transcode(
            records.into_iter().map(Ok),
            &resolved,
            &mut out,
            Path::new("test-output.json"),
        )
        .unwrap();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        (lines, written)
    }

    const POINT: &str = r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[-74.006,40.7128]},"properties":{"name":"New York","population":8336817}}"#;

    #[test]
    fn test_one_line_per_feature_in_order() {
        let plan = ColumnPlan::default();
        let records = vec![
            property_record(json!({"id": 1})),
            property_record(json!({"id": 2})),
            property_record(json!({"id": 3})),
        ];
        let (lines, written) = run(&plan, records);

        assert_eq!(written, 3);
        assert_eq!(lines.len(), 3);
        for (i, line) in lines.iter().enumerate() {
            let value: Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["id"], i as u64 + 1);
        }
    }

    #[test]
    fn test_geometry_column_round_trips() {
        let plan = ColumnPlan::default();
        let source = record(POINT);
        let expected = source.feature.geometry.clone().unwrap();
        let (lines, _) = run(&plan, vec![source]);

        let value: Value = serde_json::from_str(&lines[0]).unwrap();
        let text = value["geometry"].as_str().unwrap();
        match text.parse::<GeoJson>().unwrap() {
            GeoJson::Geometry(parsed) => assert_eq!(parsed, expected),
            other => panic!("geometry column parsed as {other:?}"),
        }
    }

    #[test]
    fn test_full_feature_and_geometry_only_columns() {
        let plan =
            ColumnPlan::from_directive(r#"["geometry","geojson","geojson_geometry"]"#).unwrap();
        let (lines, _) = run(&plan, vec![record(POINT)]);

        let value: Value = serde_json::from_str(&lines[0]).unwrap();
        let full: Value = serde_json::from_str(value["geojson"].as_str().unwrap()).unwrap();
        assert_eq!(full["type"], "Feature");
        assert_eq!(full["properties"]["name"], "New York");
        assert_eq!(
            value["geojson_geometry"].as_str().unwrap(),
            value["geometry"].as_str().unwrap()
        );
    }

    #[test]
    fn test_missing_geometry_emits_null() {
        let plan = ColumnPlan::default();
        let (lines, _) = run(&plan, vec![property_record(json!({"a": 1}))]);
        let value: Value = serde_json::from_str(&lines[0]).unwrap();
        assert!(value["geometry"].is_null());
    }

    #[test]
    fn test_integer_widened_to_float_column() {
        let plan = ColumnPlan::default();
        let records = vec![
            property_record(json!({"v": 1})),
            property_record(json!({"v": 2.5})),
        ];
        let (lines, _) = run(&plan, records);

        // The column inferred FLOAT, so the integer row carries a float literal.
        assert!(lines[0].contains("\"v\":1.0"), "line was: {}", lines[0]);
        assert!(lines[1].contains("\"v\":2.5"));
    }

    #[test]
    fn test_values_coerced_to_string_column() {
        let plan = ColumnPlan::default();
        let records = vec![
            property_record(json!({"v": 1})),
            property_record(json!({"v": "x"})),
            property_record(json!({"v": true})),
            property_record(json!({"v": {"nested": [1, 2]}})),
        ];
        let (lines, _) = run(&plan, records);

        let values: Vec<Value> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(values[0]["v"], "1");
        assert_eq!(values[1]["v"], "x");
        assert_eq!(values[2]["v"], "true");
        assert_eq!(values[3]["v"], r#"{"nested":[1,2]}"#);
    }

    #[test]
    fn test_absent_property_is_omitted_not_nulled() {
        let plan = ColumnPlan::default();
        let records = vec![
            property_record(json!({"a": 1, "b": "x"})),
            property_record(json!({"a": 2})),
        ];
        let (lines, _) = run(&plan, records);

        assert!(lines[0].contains("\"b\""));
        assert!(!lines[1].contains("\"b\""));
    }

    #[test]
    fn test_present_null_is_emitted_as_null() {
        let plan = ColumnPlan::default();
        let records = vec![
            property_record(json!({"a": null})),
            property_record(json!({"a": "x"})),
        ];
        let (lines, _) = run(&plan, records);
        let value: Value = serde_json::from_str(&lines[0]).unwrap();
        assert!(value.get("a").is_some());
        assert!(value["a"].is_null());
    }

    #[test]
    fn test_key_order_is_uniform_across_lines() {
        let plan = ColumnPlan::default();
        let records = vec![
            property_record(json!({"b": 1, "a": 2})),
            property_record(json!({"a": 3, "b": 4})),
        ];
        let (lines, _) = run(&plan, records);

        // Both lines follow first-seen column order, not per-feature order.
        for line in &lines {
            let b = line.find("\"b\"").unwrap();
            let a = line.find("\"a\"").unwrap();
            assert!(b < a, "line was: {line}");
        }
    }

    #[test]
    fn test_renamed_geometry_column() {
        let plan = ColumnPlan::from_directive(r#"{"geometry":"coordinates"}"#).unwrap();
        let (lines, _) = run(&plan, vec![record(POINT)]);
        let value: Value = serde_json::from_str(&lines[0]).unwrap();
        assert!(value.get("coordinates").is_some());
        assert!(value.get("geometry").is_none());
        assert!(value.get("geojson").is_none());
    }
}
