//! Geometry normalization adapter.
//!
//! Boundary with the external conversion engine: turns an arbitrary
//! simple-features source file into a normalized feature sequence (one
//! GeoJSON feature per line, WGS84) and manages the lifecycle of that
//! intermediate artifact.

use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::error::{NormalizeError, Result};
use crate::features::is_feature_sequence;

/// Options the adapter owns and callers may not override.
pub const RESERVED_OPTIONS: [&str; 3] = ["-f", "-of", "-t_srs"];

/// The normalized per-line feature sequence produced for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedArtifact {
    /// Path to the feature sequence file
    pub path: PathBuf,
    /// Whether the file was created by the adapter (and may be deleted)
    /// rather than being the source itself
    pub temporary: bool,
}

/// Adapter over the external geometry conversion engine.
///
/// Implementations produce a feature sequence file in a single fixed
/// reference system. The artifact must remain stable and unmodified until
/// transcoding completes, since inference and transcoding may read it as two
/// separate passes.
pub trait Normalizer {
    /// Normalize a source file into a feature sequence at `artifact_path`.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::ReservedOption`] when the pass-through
    /// options try to override an adapter-owned option, and
    /// [`NormalizeError::Engine`] or [`NormalizeError::EngineUnavailable`]
    /// when the underlying engine fails.
    fn normalize(
        &self,
        source: &Path,
        passthrough: &str,
        artifact_path: &Path,
    ) -> Result<NormalizedArtifact>;
}

/// Reject pass-through options that collide with adapter-owned options.
///
/// # Errors
///
/// Returns [`NormalizeError::ReservedOption`] naming the first offending
/// token.
pub fn validate_passthrough(passthrough: &str) -> std::result::Result<(), NormalizeError> {
    for token in passthrough.split_whitespace() {
        if RESERVED_OPTIONS.contains(&token) {
            return Err(NormalizeError::ReservedOption {
                option: token.to_string(),
            });
        }
    }
    Ok(())
}

/// Best-effort removal of an adapter-created artifact.
///
/// Files the adapter did not create are left alone. A deletion failure is
/// logged, not fatal.
pub fn remove_artifact(artifact: &NormalizedArtifact) {
    if !artifact.temporary {
        return;
    }
    match std::fs::remove_file(&artifact.path) {
        Ok(()) => debug!("Removed feature sequence file {}", artifact.path.display()),
        Err(err) => warn!(
            "Could not remove feature sequence file {}: {err}",
            artifact.path.display()
        ),
    }
}

/// Production normalizer shelling out to `ogr2ogr`.
///
/// The engine is invoked with the output format pinned to `GeoJSONSeq` and
/// the target reference system pinned to `crs:84`; user pass-through options
/// are appended after them.
#[derive(Debug, Clone)]
pub struct OgrNormalizer {
    binary: String,
}

impl OgrNormalizer {
    /// Create a normalizer driving the given engine binary.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for OgrNormalizer {
    fn default() -> Self {
        Self::new("ogr2ogr")
    }
}

impl Normalizer for OgrNormalizer {
    fn normalize(
        &self,
        source: &Path,
        passthrough: &str,
        artifact_path: &Path,
    ) -> Result<NormalizedArtifact> {
        validate_passthrough(passthrough)?;

        // A source that is already a feature sequence is WGS84 by the GeoJSON
        // spec, so with no pass-through options it can be read as-is.
        if passthrough.trim().is_empty() && is_feature_sequence(source) {
            debug!(
                "{} is already a feature sequence; skipping engine conversion",
                source.display()
            );
            return Ok(NormalizedArtifact {
                path: source.to_path_buf(),
                temporary: false,
            });
        }

        info!(
            "Converting {} to a feature sequence at {}",
            source.display(),
            artifact_path.display()
        );

        let output = Command::new(&self.binary)
            .args(["-f", "GeoJSONSeq", "-t_srs", "crs:84"])
            .args(passthrough.split_whitespace())
            .arg(artifact_path)
            .arg(source)
            .output()
            .map_err(|err| NormalizeError::EngineUnavailable {
                binary: self.binary.clone(),
                source: err,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NormalizeError::Engine {
                path: source.to_path_buf(),
                message: stderr.trim().to_string(),
            }
            .into());
        }

        Ok(NormalizedArtifact {
            path: artifact_path.to_path_buf(),
            temporary: true,
        })
    }
}
