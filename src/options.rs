//! Export options as a caller supplies them, and their validated form.
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialect::{MetadataDialect, TemplateMapper};
use crate::image::Image;
use crate::metadata::N5Compression;
use crate::{Error, Result};

pub const NO_OVERWRITE: &str = "No overwrite";
pub const OVERWRITE: &str = "Overwrite";
pub const WRITE_SUBSET: &str = "Overwrite subset";

/// Largest accepted thread budget.
pub const MAX_THREADS: usize = 256;

/// Resolve a comma-delimited, possibly partial, block size against the image extents.
///
/// Supplied values are used positionally. Remaining axes repeat the last supplied
/// value, clamped to the axis extent.
pub fn resolve_block_size(arg: &str, extents: &[u64]) -> Result<Vec<u32>> {
    let supplied = parse_list::<u32>(arg, "block size")?;
    let Some(&last) = supplied.last() else {
        return Err(Error::config("block size is empty"));
    };
    if let Some(zero) = supplied.iter().position(|&b| b == 0) {
        return Err(Error::config(format!(
            "block size entry {zero} of {arg:?} is zero"
        )));
    }
    let out = extents
        .iter()
        .enumerate()
        .map(|(i, &extent)| match supplied.get(i) {
            Some(&b) => b,
            None => u32::try_from(extent)
                .map_or(last, |extent| last.min(extent))
                .max(1),
        })
        .collect();
    Ok(out)
}

/// Compression with default parameters for a name; anything unrecognised is raw.
pub fn select_compression(name: &str) -> N5Compression {
    match name.trim().to_ascii_lowercase().as_str() {
        "gzip" => N5Compression::gzip(),
        "bzip2" => N5Compression::bzip2(),
        "lz4" => N5Compression::lz4(),
        "xz" => N5Compression::xz(),
        "blosc" => N5Compression::blosc(),
        _ => N5Compression::Raw,
    }
}

/// Parse a comma-delimited subset offset; it must have one entry per image axis.
pub fn parse_offset(arg: &str, num_dimensions: usize) -> Result<Vec<u64>> {
    let offset = parse_list::<u64>(arg, "subset offset")?;
    if offset.len() != num_dimensions {
        return Err(Error::config(format!(
            "subset offset {arg:?} has {} entries, image has {num_dimensions} dimensions",
            offset.len()
        )));
    }
    Ok(offset)
}

fn parse_list<T: std::str::FromStr>(arg: &str, what: &str) -> Result<Vec<T>>
where
    T::Err: std::fmt::Display,
{
    if arg.trim().is_empty() {
        return Ok(Vec::new());
    }
    arg.split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse()
                .map_err(|e| Error::config(format!("invalid {what} entry {token:?}: {e}")))
        })
        .collect()
}

/// What to do when a target dataset already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leave an existing dataset untouched and skip it.
    Refuse,
    Overwrite,
    /// Write the image at `offset` into the dataset, growing it as needed.
    MergeSubset { offset: Vec<u64> },
}

impl OverwritePolicy {
    /// Policy for a dialog choice. The offset is only parsed for subset writes.
    pub fn from_choice(choice: &str, subset_offset: &str, num_dimensions: usize) -> Result<Self> {
        match choice {
            NO_OVERWRITE => Ok(OverwritePolicy::Refuse),
            OVERWRITE => Ok(OverwritePolicy::Overwrite),
            WRITE_SUBSET => Ok(OverwritePolicy::MergeSubset {
                offset: parse_offset(subset_offset, num_dimensions)?,
            }),
            other => Err(Error::config(format!("unknown overwrite option {other:?}"))),
        }
    }
}

/// Export options, as collected from a user. Loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    /// Container root; a `.zarr` suffix selects the Zarr layout.
    pub root: PathBuf,
    pub dataset: String,
    pub block_size: String,
    pub compression: String,
    pub metadata: String,
    pub threads: usize,
    pub overwrite: String,
    pub subset_offset: String,
    pub num_scales: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            dataset: String::new(),
            block_size: "64".into(),
            compression: "gzip".into(),
            metadata: MetadataDialect::OME_NGFF.into(),
            threads: 1,
            overwrite: NO_OVERWRITE.into(),
            subset_offset: String::new(),
            num_scales: 1,
        }
    }
}

impl ExportOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate against `image`. Nothing is read or written.
    ///
    /// `mapper` is required by the custom dialect and ignored otherwise.
    pub fn resolve(
        &self,
        image: &Image,
        mapper: Option<Arc<dyn TemplateMapper>>,
    ) -> Result<ExportConfig> {
        if !(1..=MAX_THREADS).contains(&self.threads) {
            return Err(Error::config(format!(
                "thread count {} outside 1..={MAX_THREADS}",
                self.threads
            )));
        }
        if self.num_scales == 0 {
            return Err(Error::config("at least one scale level is required"));
        }
        Ok(ExportConfig {
            root: self.root.clone(),
            dataset: self.dataset.clone(),
            block_size: resolve_block_size(&self.block_size, &image.shape())?,
            compression: select_compression(&self.compression),
            dialect: MetadataDialect::from_name(&self.metadata, mapper)?,
            threads: self.threads,
            overwrite: OverwritePolicy::from_choice(
                &self.overwrite,
                &self.subset_offset,
                image.num_dimensions(),
            )?,
            num_scales: self.num_scales,
        })
    }
}

/// Fully resolved export configuration.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub root: PathBuf,
    pub dataset: String,
    /// One entry per image axis.
    pub block_size: Vec<u32>,
    pub compression: N5Compression,
    pub dialect: MetadataDialect,
    pub threads: usize,
    pub overwrite: OverwritePolicy,
    pub num_scales: usize,
}
