//! Export in-memory images into chunked N5 or Zarr v2 containers.
//!
//! The [exporter::Exporter] is the entry point. It resolves [options::ExportOptions]
//! into a configuration, writes pixel blocks in parallel through a [storage::Container],
//! and annotates the result in one of several [dialect::MetadataDialect]s.
pub mod channels;
pub mod chunk;
pub mod chunk_key_encoding;
pub mod codec;
pub mod dataset;
pub mod dialect;
mod error;
pub mod exporter;
pub mod image;
pub mod metadata;
pub mod multiscale;
pub mod options;
pub mod storage;
pub mod writer;

pub use zarrs;

pub use error::{Error, Result};
