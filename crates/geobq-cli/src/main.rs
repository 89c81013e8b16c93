//! Command-line interface for `geobq`, a BigQuery-oriented geospatial conversion tool.
//!
//! This binary provides a user-friendly CLI to interact with the [`geobq_core`] library,
//! converting files with simple-features data (shp, geojson, etc) to newline-delimited
//! JSON files that can be imported into BigQuery, along with schema files that can be
//! used to create BigQuery tables programmatically or through the BigQuery console.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! It acts as a thin façade that parses arguments, configures logging, resolves the column
//! plan, and delegates the batch run to [`geobq_core::operations`].

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::Level;
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geobq_core::operations;
use geobq_core::plan::{ConvertOptions, PassStrategy};
use geobq_core::{ColumnPlan, OgrNormalizer};

mod display;

#[derive(Parser)]
#[command(
    name = "geobq",
    version,
    about = "Convert simple-features files to BigQuery-ready newline-delimited JSON",
    long_about = "Convert files with simple features data (shp, geojson, etc) to newline \
                  delimited JSON files that can be imported into BigQuery. Schema files \
                  are also generated that can be used to create BigQuery tables \
                  programmatically or through the BigQuery console."
)]
/// Command-line arguments and options for the `geobq` CLI.
struct Cli {
    /// Path to the source file or directory to convert. The --extension / -e
    /// option is required if the path is to a directory.
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Overwrite files if they already exist, otherwise an underscore and number
    /// ("_n") will be appended to the output file's name: duplicate_01.json,
    /// duplicate_02.json, etc.
    #[arg(short = 'f', long)]
    force_overwrite: bool,

    /// Do not delete the feature sequence files created when a source file is not
    /// already newline-delimited GeoJSON in WGS84. They are saved with the same
    /// name and location as the json file, but end with _GeoJSONSeq.geojson, and
    /// never overwrite an existing file regardless of --force-overwrite.
    #[arg(short = 'k', long)]
    keep_geojsonseq: bool,

    /// JSON string to limit or rename the columns for geographic data in the
    /// output's schema. Use a JSON array literal to set which columns to include
    /// without changing their default names, or a JSON object to set and/or
    /// rename them. "geometry" refers to the column holding the geometry as a
    /// GEOGRAPHY datatype; "geojson" the column with a complete copy of a geo
    /// object as a GeoJSON formatted STRING; and "geojson_geometry" the column
    /// containing just the geometry object as a GeoJSON formatted STRING. Only
    /// the "geometry" column is included by default. Property keys may also be
    /// named to restrict the property columns to exactly those keys.
    #[arg(short = 'c', long, value_name = "JSON")]
    columns: Option<String>,

    /// The path to the directory to save converted files to. The files will be
    /// given the same basename as the source, but with .json as the extension.
    /// Ignored if the --output-filepath option is present.
    #[arg(short = 'd', long, value_name = "DIR")]
    output_directory: Option<PathBuf>,

    /// Extension of the files to convert when the source path is a directory.
    /// Cannot be used when the source path is a file. Example: --extension shp
    #[arg(short = 'e', long, value_name = "EXT")]
    extension: Option<String>,

    /// The full filepath to save the converted file to. If omitted the file will
    /// be saved with the same basename and location as the source, but with the
    /// .json extension. Cannot be used when the source path is a directory.
    #[arg(short = 'o', long, value_name = "FILE")]
    output_filepath: Option<PathBuf>,

    /// Make directories and parent directories for output files, if they don't
    /// already exist.
    #[arg(short = 'p', long)]
    create_parents: bool,

    /// Skip generating schema files.
    #[arg(short = 's', long)]
    skip_schemas: bool,

    /// String containing options to pass to the conversion engine (the same
    /// options you would use with ogr2ogr on the cli). Cannot include the
    /// following options: -f, -of, -t_srs.
    #[arg(long, value_name = "OPTIONS", allow_hyphen_values = true)]
    convert_options: Option<String>,

    /// Buffer the feature stream in memory instead of re-reading the normalized
    /// file for the transcoding pass. Suits small datasets; trades memory for I/O.
    #[arg(long)]
    buffer_features: bool,

    /// Enable verbose (INFO level) logging output.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(long)]
    debug: bool,
}

/// Entry point for the `geobq` command-line interface.
///
/// This function parses command-line arguments, configures the logging system based on
/// verbosity flags, resolves the column plan, and runs the conversion batch.
///
/// # Errors
///
/// Returns an error if the run is misconfigured, if the logging system cannot be
/// initialized, or if every job in the run failed.
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity flags
    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true) // Show module paths for better context
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let columns = match &cli.columns {
        Some(raw) => ColumnPlan::from_directive(raw)?,
        None => ColumnPlan::default(),
    };

    let options = ConvertOptions {
        force_overwrite: cli.force_overwrite,
        keep_intermediate: cli.keep_geojsonseq,
        create_parents: cli.create_parents,
        skip_schemas: cli.skip_schemas,
        columns,
        passthrough: cli.convert_options.clone().unwrap_or_default(),
        output_directory: cli.output_directory.clone(),
        pass_strategy: if cli.buffer_features {
            PassStrategy::Buffer
        } else {
            PassStrategy::Reread
        },
    };

    let report = operations::run(
        &cli.source,
        cli.extension.as_deref(),
        cli.output_filepath.as_deref(),
        &options,
        &OgrNormalizer::default(),
    )?;

    for outcome in &report.completed {
        println!(
            "\nConverted {} to {} ({} feature(s))",
            outcome.source.display(),
            outcome.output.display(),
            outcome.features
        );
        display::display_schema(&outcome.schema);
    }

    for failed in &report.failed {
        eprintln!(
            "\nFailed to convert {}: {}",
            failed.source.display(),
            failed.error.user_message()
        );
        if let Some(suggestion) = failed.error.recovery_suggestion() {
            eprintln!("  {suggestion}");
        }
    }

    if report.all_failed() {
        return Err(anyhow!(
            "all {} conversion job(s) failed",
            report.failed.len()
        ));
    }

    Ok(())
}
