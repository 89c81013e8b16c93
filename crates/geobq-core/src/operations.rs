//! Conversion orchestration.
//!
//! Drives one run end to end: plan the jobs, then for each source file
//! normalize, infer the schema, transcode, and persist the schema files.
//! Per-source failures are isolated; one bad file in a directory batch is
//! reported and skipped, never fatal to its siblings.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::error::{GeoBqError, IoErrorExt, PlanError, Result};
use crate::features::{FeatureReader, FeatureRecord};
use crate::infer::SchemaBuilder;
use crate::normalize::{self, NormalizedArtifact, Normalizer};
use crate::plan::{ConversionJob, ConvertOptions, OutputNamingState, PassStrategy, plan_jobs};
use crate::schema::{Schema, save_schema_files};
use crate::transcode::transcode;

/// The result of one successfully converted source file.
#[derive(Debug)]
pub struct JobOutcome {
    /// The source file that was converted
    pub source: PathBuf,
    /// Where the newline-delimited JSON was written
    pub output: PathBuf,
    /// The inferred schema
    pub schema: Schema,
    /// Number of features written
    pub features: u64,
}

/// One job that failed, with the error that stopped it.
#[derive(Debug)]
pub struct FailedJob {
    /// The source file whose conversion failed
    pub source: PathBuf,
    /// What went wrong
    pub error: GeoBqError,
}

/// Everything that happened during one run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Jobs that completed, in execution order
    pub completed: Vec<JobOutcome>,
    /// Jobs that failed, in execution order
    pub failed: Vec<FailedJob>,
}

impl BatchReport {
    /// Whether the run did some work and none of it succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.completed.is_empty() && !self.failed.is_empty()
    }
}

/// Convert a source file, or every matching file in a source directory.
///
/// Argument-combination problems abort the run before any I/O. After that,
/// each job runs to completion or fails on its own; the report lists both.
///
/// # Errors
///
/// Returns an error only for run-fatal problems: a missing source or an
/// invalid argument combination.
pub fn run(
    source: &Path,
    extension: Option<&str>,
    output_filepath: Option<&Path>,
    options: &ConvertOptions,
    normalizer: &dyn Normalizer,
) -> Result<BatchReport> {
    let mut naming = OutputNamingState::new();
    let jobs = plan_jobs(source, extension, output_filepath, options, &mut naming)?;

    if let Some(extension) = extension {
        info!(
            "Converting all {extension} files in {} ({} job(s))",
            source.display(),
            jobs.len()
        );
    }

    let mut report = BatchReport::default();
    for job in jobs {
        info!(
            "Converting {} to {}",
            job.source.display(),
            job.output.display()
        );
        match run_job(&job, options, normalizer) {
            Ok((schema, features)) => {
                info!(
                    "Wrote {features} feature(s) from {} to {}",
                    job.source.display(),
                    job.output.display()
                );
                report.completed.push(JobOutcome {
                    source: job.source,
                    output: job.output,
                    schema,
                    features,
                });
            },
            Err(err) => {
                error!(
                    "Conversion of {} failed: {}",
                    job.source.display(),
                    err.user_message()
                );
                report.failed.push(FailedJob {
                    source: job.source,
                    error: err,
                });
            },
        }
    }

    Ok(report)
}

/// Run one planned job: normalize, infer, transcode, persist the schema.
///
/// # Errors
///
/// Returns the first error the job hits; the intermediate artifact is still
/// cleaned up unless the caller opted to keep it.
pub fn run_job(
    job: &ConversionJob,
    options: &ConvertOptions,
    normalizer: &dyn Normalizer,
) -> Result<(Schema, u64)> {
    ensure_output_directory(&job.output, options.create_parents)?;

    let artifact = normalizer.normalize(&job.source, &options.passthrough, &job.intermediate)?;
    let result = convert_artifact(job, options, &artifact);

    if options.keep_intermediate {
        if artifact.temporary {
            info!(
                "Keeping feature sequence file {}",
                artifact.path.display()
            );
        }
    } else {
        normalize::remove_artifact(&artifact);
    }

    result
}

fn convert_artifact(
    job: &ConversionJob,
    options: &ConvertOptions,
    artifact: &NormalizedArtifact,
) -> Result<(Schema, u64)> {
    let mut builder = SchemaBuilder::new(&options.columns);

    let (resolved, written) = match options.pass_strategy {
        PassStrategy::Reread => {
            for record in FeatureReader::open(&artifact.path)? {
                builder.observe(&record?);
            }
            let resolved = builder.finish();
            let written =
                write_records(FeatureReader::open(&artifact.path)?, &resolved, &job.output)?;
            (resolved, written)
        },
        PassStrategy::Buffer => {
            let records: Vec<FeatureRecord> =
                FeatureReader::open(&artifact.path)?.collect::<Result<_>>()?;
            for record in &records {
                builder.observe(record);
            }
            let resolved = builder.finish();
            let written = write_records(records.into_iter().map(Ok), &resolved, &job.output)?;
            (resolved, written)
        },
    };

    let schema = resolved.schema();
    if let (Some(json_path), Some(text_path)) = (&job.schema_json, &job.schema_text) {
        save_schema_files(&schema, json_path, text_path)?;
    }

    Ok((schema, written))
}

fn write_records<I>(
    features: I,
    resolved: &crate::schema::ResolvedSchema,
    output: &Path,
) -> Result<u64>
where
    I: Iterator<Item = Result<FeatureRecord>>,
{
    let file = File::create(output).with_write_context(output)?;
    let mut writer = BufWriter::new(file);
    let written = transcode(features, resolved, &mut writer, output)?;
    writer.flush().with_write_context(output)?;
    Ok(written)
}

fn ensure_output_directory(output: &Path, create_parents: bool) -> Result<()> {
    let Some(directory) = output.parent() else {
        return Ok(());
    };
    if directory.as_os_str().is_empty() || directory.exists() {
        return Ok(());
    }

    if create_parents {
        fs::create_dir_all(directory).with_write_context(directory)?;
        return Ok(());
    }

    Err(PlanError::MissingOutputDirectory {
        path: directory.to_path_buf(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnPlan;
    use crate::normalize::OgrNormalizer;
    use tempfile::TempDir;

    /// Write a feature sequence file the normalizer will use as-is.
    fn write_sequence(path: &Path, lines: &[&str]) {
        let mut file = File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    const CITY_A: &str = r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[-74.006,40.7128]},"properties":{"name":"New York","population":8336817}}"#;
    const CITY_B: &str = r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[-118.2437,34.0522]},"properties":{"name":"Los Angeles","population":3979576}}"#;

    fn convert(
        source: &Path,
        options: &ConvertOptions,
    ) -> Result<BatchReport> {
        run(source, None, None, options, &OgrNormalizer::default())
    }

    #[test]
    fn test_single_file_conversion_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A, CITY_B]);

        let report = convert(&source, &ConvertOptions::default()).unwrap();
        assert_eq!(report.completed.len(), 1);
        assert!(report.failed.is_empty());

        let outcome = &report.completed[0];
        assert_eq!(outcome.features, 2);
        assert_eq!(outcome.output, dir.path().join("cities.json"));

        let body = fs::read_to_string(&outcome.output).unwrap();
        assert_eq!(body.lines().count(), 2);
        assert!(body.lines().next().unwrap().contains("New York"));

        // Schema files accompany the output.
        let schema_json =
            fs::read_to_string(dir.path().join("cities_SCHEMA.json")).unwrap();
        assert!(schema_json.contains("GEOGRAPHY"));
        let schema_text = fs::read_to_string(dir.path().join("cities_SCHEMA.txt")).unwrap();
        assert_eq!(
            schema_text,
            "geometry:GEOGRAPHY,\nname:STRING,\npopulation:INTEGER"
        );
    }

    #[test]
    fn test_buffer_and_reread_strategies_agree() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A, CITY_B]);

        let reread = ConvertOptions::default();
        let buffered = ConvertOptions {
            pass_strategy: PassStrategy::Buffer,
            skip_schemas: true,
            ..ConvertOptions::default()
        };

        let first = convert(&source, &reread).unwrap();
        let second = convert(&source, &buffered).unwrap();

        let body_a = fs::read_to_string(&first.completed[0].output).unwrap();
        let body_b = fs::read_to_string(&second.completed[0].output).unwrap();
        assert_eq!(body_a, body_b);
        assert_eq!(
            first.completed[0].schema,
            second.completed[0].schema
        );
    }

    #[test]
    fn test_skip_schemas_writes_no_schema_files() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A]);

        let options = ConvertOptions {
            skip_schemas: true,
            ..ConvertOptions::default()
        };
        convert(&source, &options).unwrap();
        assert!(!dir.path().join("cities_SCHEMA.json").exists());
        assert!(!dir.path().join("cities_SCHEMA.txt").exists());
    }

    #[test]
    fn test_existing_output_gets_suffixed_without_force() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A]);
        fs::write(dir.path().join("cities.json"), b"keep me").unwrap();

        let report = convert(&source, &ConvertOptions::default()).unwrap();
        assert_eq!(
            report.completed[0].output,
            dir.path().join("cities_01.json")
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("cities.json")).unwrap(),
            "keep me"
        );
    }

    #[test]
    fn test_force_overwrite_replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A]);
        fs::write(dir.path().join("cities.json"), b"replace me").unwrap();

        let options = ConvertOptions {
            force_overwrite: true,
            ..ConvertOptions::default()
        };
        let report = convert(&source, &options).unwrap();
        assert_eq!(report.completed[0].output, dir.path().join("cities.json"));
        let body = fs::read_to_string(dir.path().join("cities.json")).unwrap();
        assert!(body.contains("New York"));
    }

    #[test]
    fn test_missing_output_directory_fails_without_create_parents() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A]);

        let options = ConvertOptions {
            output_directory: Some(dir.path().join("missing/nested")),
            ..ConvertOptions::default()
        };
        let report = convert(&source, &options).unwrap();
        assert!(report.all_failed());
        assert!(matches!(
            report.failed[0].error,
            GeoBqError::Plan(PlanError::MissingOutputDirectory { .. })
        ));

        let created = ConvertOptions {
            create_parents: true,
            ..options
        };
        let report = convert(&source, &created).unwrap();
        assert_eq!(report.completed.len(), 1);
        assert!(dir.path().join("missing/nested/cities.json").exists());
    }

    #[test]
    fn test_directory_batch_isolates_failures() {
        let dir = TempDir::new().unwrap();
        write_sequence(&dir.path().join("good.geojsonl"), &[CITY_A]);
        // Not a feature sequence, and no engine to fall back to.
        fs::write(dir.path().join("bad.geojsonl"), b"definitely not geojson").unwrap();

        let report = run(
            dir.path(),
            Some("geojsonl"),
            None,
            &ConvertOptions::default(),
            &OgrNormalizer::new("geobq-test-no-such-binary"),
        )
        .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].source.ends_with("bad.geojsonl"));
        assert!(dir.path().join("good.json").exists());
    }

    /// Normalizer that hands the source back untouched, standing in for the
    /// engine when a test wants full control over the sequence content.
    struct SequenceNormalizer;

    impl Normalizer for SequenceNormalizer {
        fn normalize(
            &self,
            source: &Path,
            _passthrough: &str,
            _artifact_path: &Path,
        ) -> Result<NormalizedArtifact> {
            Ok(NormalizedArtifact {
                path: source.to_path_buf(),
                temporary: false,
            })
        }
    }

    #[test]
    fn test_empty_stream_yields_fixed_columns_only() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("empty.geojson");
        fs::write(&source, b"").unwrap();

        let report = run(
            &source,
            None,
            None,
            &ConvertOptions::default(),
            &SequenceNormalizer,
        )
        .unwrap();

        let outcome = &report.completed[0];
        assert_eq!(outcome.features, 0);
        assert_eq!(fs::read_to_string(&outcome.output).unwrap(), "");

        let schema_names: Vec<&str> = outcome
            .schema
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(schema_names, vec!["geometry"]);
    }

    #[test]
    fn test_column_plan_flows_through_conversion() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A, CITY_B]);

        let options = ConvertOptions {
            columns: ColumnPlan::from_directive(r#"{"geometry":"coordinates"}"#).unwrap(),
            skip_schemas: true,
            ..ConvertOptions::default()
        };
        let report = convert(&source, &options).unwrap();
        let schema = &report.completed[0].schema;
        let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["coordinates", "name", "population"]);

        let body = fs::read_to_string(&report.completed[0].output).unwrap();
        assert!(body.contains("\"coordinates\""));
        assert!(!body.contains("\"geojson\""));
    }

    #[test]
    fn test_reserved_passthrough_option_fails_the_job() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cities.geojson");
        write_sequence(&source, &[CITY_A]);

        let options = ConvertOptions {
            passthrough: "-t_srs EPSG:3857".to_string(),
            ..ConvertOptions::default()
        };
        let report = convert(&source, &options).unwrap();
        assert!(report.all_failed());
        assert!(
            report.failed[0]
                .error
                .to_string()
                .contains("reserved")
        );
    }
}
