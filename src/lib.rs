//! archive-indexer - recursive archive indexer
//!
//! Unpacks nested containers (7z, zip, rar, tar in all its compressions, WARC
//! and ARC captures) down to a bounded depth and reports every file found with
//! its SHA-256/MD5 fingerprint and a type description.

pub mod archive;
pub mod classify;
pub mod config;
pub mod fingerprint;
pub mod indexer;
pub mod paths;

pub use config::{ConfigError, IndexerConfig};
pub use indexer::{Entry, IndexOutcome, Indexer, Manifest, RecursionContext};
