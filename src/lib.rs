//! # tabmerge
//!
//! Reconciles complete raw snapshots of an external source into a durable,
//! partitioned canonical dataset. Records are classified by natural key as
//! new, updated, soft-deleted or reinstated, merged with lifecycle
//! timestamps, and the dataset is republished.

pub mod archive;
pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod diff;
pub mod error;
pub mod export;
pub mod hash;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod relation;
pub mod report;
pub mod schema;
pub mod snapshot;
pub mod value;
pub mod workspace;

pub use diff::{ChangeKind, DiffEngine, DiffOutcome, DiffSet};
pub use error::{Result, TabmergeError};
pub use export::PartitionedExporter;
pub use merge::MergeApplier;
pub use pipeline::Reconciler;
pub use schema::{SchemaDescriptor, SchemaValidator};
pub use snapshot::SnapshotLoader;
pub use workspace::TabmergeWorkspace;

/// Current format version for tabmerge configuration files
pub const FORMAT_VERSION: &str = "1.0.0";
