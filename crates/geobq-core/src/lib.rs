//! `geobq-core` is the core library for the `geobq` project, converting
//! simple-features data into BigQuery-loadable newline-delimited JSON.
//!
//! This crate includes:
//! - **Column Resolution**: Turning a raw column directive into a typed, ordered column plan.
//! - **Normalization**: The boundary with the external conversion engine that produces per-line feature sequences.
//! - **Schema Inference**: Streaming per-property type widening across heterogeneous features.
//! - **Transcoding**: Projecting each feature into one schema-consistent JSON record per line.
//! - **Batch Planning**: Collision-safe output naming and per-source job isolation.
//!
//! The `operations` module exposes the run orchestration consumed by the CLI.

pub mod columns;
pub mod error;
pub mod features;
pub mod infer;
pub mod normalize;
pub mod operations;
pub mod plan;
pub mod schema;
pub mod transcode;

// Re-export commonly used types
pub use columns::{ColumnPlan, FixedColumn};
pub use error::{GeoBqError, Result};
pub use normalize::{NormalizedArtifact, Normalizer, OgrNormalizer};
pub use plan::{ConvertOptions, ConversionJob, OutputNamingState, PassStrategy};
pub use schema::{ColumnMode, ColumnType, Schema, SchemaField};
