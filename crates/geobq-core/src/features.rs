//! Normalized feature sequence reading.
//!
//! The normalization adapter produces a feature sequence file with one
//! GeoJSON feature per line in WGS84. This module reads such files lazily,
//! one record at a time, so a stream is never held fully in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use geojson::{Feature, GeoJson, JsonObject};

use crate::error::{GeoBqError, IoError, IoErrorExt, Result};

/// ASCII record separator; some feature sequence writers prefix lines with it.
const RECORD_SEPARATOR: char = '\u{1e}';

/// One geographic record read from a normalized feature sequence.
///
/// Immutable once read; owned transiently by inference and transcoding for
/// the duration of processing one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    /// The parsed GeoJSON feature
    pub feature: Feature,
}

impl FeatureRecord {
    /// The feature's properties, if any were present.
    #[must_use]
    pub fn properties(&self) -> Option<&JsonObject> {
        self.feature.properties.as_ref()
    }

    /// The feature's geometry serialized as GeoJSON text, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn geometry_text(&self) -> Result<Option<String>> {
        match &self.feature.geometry {
            Some(geometry) => Ok(Some(
                serde_json::to_string(geometry).map_err(anyhow::Error::from)?,
            )),
            None => Ok(None),
        }
    }

    /// The whole feature serialized as GeoJSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn feature_text(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.feature).map_err(anyhow::Error::from)?)
    }
}

/// Lazy reader over a feature sequence file.
///
/// Yields one [`FeatureRecord`] per non-blank line, in file order. The
/// sequence is finite and restartable only by opening the file again, which
/// is why the file must stay unmodified between the inference and transcode
/// passes.
pub struct FeatureReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: u64,
}

impl FeatureReader {
    /// Open a feature sequence file for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_read_context(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }

    fn parse_line(&self, line: &str) -> Result<FeatureRecord> {
        let geojson = line
            .parse::<GeoJson>()
            .map_err(|err| self.parse_error(format!("{err}")))?;

        match geojson {
            GeoJson::Feature(feature) => Ok(FeatureRecord { feature }),
            GeoJson::Geometry(geometry) => Ok(FeatureRecord {
                feature: Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: None,
                    foreign_members: None,
                },
            }),
            GeoJson::FeatureCollection(_) => {
                Err(self.parse_error("expected one feature per line, found a FeatureCollection"))
            },
        }
    }

    fn parse_error(&self, message: impl Into<String>) -> GeoBqError {
        GeoBqError::Io(IoError::Parse {
            path: self.path.clone(),
            line: self.line_number,
            message: message.into(),
        })
    }
}

impl Iterator for FeatureReader {
    type Item = Result<FeatureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(GeoBqError::Io(IoError::Read {
                        path: self.path.clone(),
                        source: err,
                    })));
                },
            };
            self.line_number += 1;

            let line = line.trim_start_matches(RECORD_SEPARATOR).trim();
            if line.is_empty() {
                continue;
            }
            return Some(self.parse_line(line));
        }
    }
}

/// Whether a file already reads as a newline-delimited GeoJSON feature
/// sequence.
///
/// GeoJSON fixes the reference system to WGS84, so a file whose first
/// non-blank line parses as a feature needs no engine conversion. Unreadable
/// files report `false`; the conversion engine surfaces the real error.
#[must_use]
pub fn is_feature_sequence(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };

    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            return false;
        };
        let line = line.trim_start_matches(RECORD_SEPARATOR).trim();
        if line.is_empty() {
            continue;
        }
        return matches!(
            line.parse::<GeoJson>(),
            Ok(GeoJson::Feature(_) | GeoJson::Geometry(_))
        );
    }

    false
}
