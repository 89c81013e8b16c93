//! Batch planning and collision-safe output naming.
//!
//! Enumerates the source files of a run, resolves each one's output and
//! schema paths through the run-scoped naming state, and packages the result
//! as one [`ConversionJob`] per source. All paths are claimed here, before
//! any conversion work begins, so two jobs in the same run can never race on
//! the same path.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::columns::ColumnPlan;
use crate::error::{IoErrorExt, PlanError, Result};

/// How the two passes over the feature sequence are obtained.
///
/// The tradeoff is memory versus I/O: re-reading the materialized artifact
/// keeps memory bounded, while buffering suits datasets known to be small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassStrategy {
    /// Read the materialized artifact twice (inference, then transcoding)
    #[default]
    Reread,
    /// Read once, buffering every feature in memory for the transcode pass
    Buffer,
}

/// Effective options for a conversion run.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Overwrite existing output files instead of suffixing
    pub force_overwrite: bool,
    /// Keep the intermediate feature sequence file after conversion
    pub keep_intermediate: bool,
    /// Create missing output directories and their parents
    pub create_parents: bool,
    /// Do not generate schema files
    pub skip_schemas: bool,
    /// The resolved column plan
    pub columns: ColumnPlan,
    /// Options passed through to the conversion engine
    pub passthrough: String,
    /// Directory to save converted files to, if different from the source's
    pub output_directory: Option<PathBuf>,
    /// How the inference and transcode passes read the feature sequence
    pub pass_strategy: PassStrategy,
}

/// One source file's conversion, with every output path resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// The source file to convert
    pub source: PathBuf,
    /// The newline-delimited JSON destination
    pub output: PathBuf,
    /// The schema JSON file, unless schemas are skipped
    pub schema_json: Option<PathBuf>,
    /// The plaintext schema file, unless schemas are skipped
    pub schema_text: Option<PathBuf>,
    /// Where the normalized feature sequence is materialized if the engine
    /// runs; always a fresh, non-clobbering path
    pub intermediate: PathBuf,
}

/// Run-scoped record of claimed output paths.
///
/// Guarantees collision-safe sequential suffixing even when multiple sources
/// in the same run map to the same output basename. Owned by the batch
/// planner for the duration of one run and threaded explicitly.
#[derive(Debug, Default)]
pub struct OutputNamingState {
    claimed: HashSet<PathBuf>,
}

impl OutputNamingState {
    /// Fresh state for one batch run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a writable path starting from `initial`.
    ///
    /// With `can_overwrite` the initial path is claimed as-is. Otherwise, if
    /// a file exists at the initial location or the path was already claimed
    /// in this run, `_01` is appended to the filename and the new candidate
    /// is checked; the number increments until an unclaimed, non-existing
    /// path is found: `foo/bar_01.json`, `foo/bar_02.json`, and so on.
    pub fn claim(&mut self, initial: &Path, can_overwrite: bool) -> PathBuf {
        let mut candidate = initial.to_path_buf();
        if !can_overwrite {
            let mut index = 0u32;
            while !self.is_free(&candidate) {
                index += 1;
                candidate = numbered_candidate(initial, index);
            }
        }
        self.claimed.insert(candidate.clone());
        candidate
    }

    fn is_free(&self, path: &Path) -> bool {
        !self.claimed.contains(path) && !path.exists()
    }
}

fn numbered_candidate(initial: &Path, index: u32) -> PathBuf {
    let stem = initial
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    let mut name = stem;
    name.push(format!("_{index:02}"));
    if let Some(extension) = initial.extension() {
        name.push(".");
        name.push(extension);
    }
    initial.with_file_name(name)
}

/// Append a suffix to a path root (a path already stripped of its extension).
fn sibling_with_suffix(root: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = root.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Plan the jobs of one run.
///
/// Validates the argument combination once, up front, then enumerates the
/// candidate sources (the single file, or every directory entry whose
/// extension matches the filter case-insensitively, non-recursive, sorted by
/// name) and resolves each job's paths through the naming state.
///
/// # Errors
///
/// Returns [`PlanError`] variants for a missing source or an invalid
/// argument combination; these abort the whole run before any I/O occurs.
pub fn plan_jobs(
    source: &Path,
    extension: Option<&str>,
    output_filepath: Option<&Path>,
    options: &ConvertOptions,
    naming: &mut OutputNamingState,
) -> Result<Vec<ConversionJob>> {
    if !source.exists() {
        return Err(PlanError::MissingSource {
            path: source.to_path_buf(),
        }
        .into());
    }

    if source.is_dir() {
        let Some(extension) = extension else {
            return Err(PlanError::ExtensionRequired.into());
        };
        if output_filepath.is_some() {
            return Err(PlanError::OutputFileForDirectory.into());
        }

        let candidates = matching_files(source, extension)?;
        return Ok(candidates
            .iter()
            .map(|candidate| plan_job(candidate, None, options, naming))
            .collect());
    }

    if extension.is_some() {
        return Err(PlanError::ExtensionForFile.into());
    }

    Ok(vec![plan_job(source, output_filepath, options, naming)])
}

fn plan_job(
    source: &Path,
    output_filepath: Option<&Path>,
    options: &ConvertOptions,
    naming: &mut OutputNamingState,
) -> ConversionJob {
    let initial_output = output_filepath.map_or_else(
        || {
            let directory = options.output_directory.clone().unwrap_or_else(|| {
                source
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            });
            let mut name = source
                .file_stem()
                .map(|s| s.to_os_string())
                .unwrap_or_default();
            name.push(".json");
            directory.join(name)
        },
        Path::to_path_buf,
    );

    let output = naming.claim(&initial_output, options.force_overwrite);
    let root = output.with_extension("");

    let (schema_json, schema_text) = if options.skip_schemas {
        (None, None)
    } else {
        let json = naming.claim(
            &sibling_with_suffix(&root, "_SCHEMA.json"),
            options.force_overwrite,
        );
        let text = naming.claim(
            &sibling_with_suffix(&root, "_SCHEMA.txt"),
            options.force_overwrite,
        );
        (Some(json), Some(text))
    };

    // The intermediate never overwrites an existing file, force or not.
    let intermediate = naming.claim(&sibling_with_suffix(&root, "_GeoJSONSeq.geojson"), false);

    ConversionJob {
        source: source.to_path_buf(),
        output,
        schema_json,
        schema_text,
        intermediate,
    }
}

fn matching_files(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let wanted = extension.trim_start_matches('.');
    let mut matches = Vec::new();

    for entry in fs::read_dir(directory).with_read_context(directory)? {
        let entry = entry.with_read_context(directory)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_match = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
        if is_match {
            matches.push(path);
        }
    }

    matches.sort();
    Ok(matches)
}
