//! Dataset-level writes: the overwrite policy and chunk-decomposed region writes.
use std::ops::Range;

use zarrs::array::{ArrayBytes, ArraySubset, ElementOwned};

use crate::image::PixelView;
use crate::metadata::{DataType, DatasetAttributes, N5Compression};
use crate::options::OverwritePolicy;
use crate::storage::{Container, DatasetArray};
use crate::writer::ChunkWriter;
use crate::{Error, Result};

/// What happened to one target dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetStatus {
    Written { blocks: usize },
    /// Existing dataset left alone.
    Skipped,
    Failed(String),
}

/// Writes pixel views into datasets of one container.
pub struct DatasetWriter<'a> {
    container: &'a Container,
    writer: ChunkWriter<'a>,
    data_type: DataType,
    compression: N5Compression,
}

impl<'a> DatasetWriter<'a> {
    pub fn new(
        container: &'a Container,
        writer: ChunkWriter<'a>,
        data_type: DataType,
        compression: N5Compression,
    ) -> Self {
        Self {
            container,
            writer,
            data_type,
            compression,
        }
    }

    pub fn container(&self) -> &Container {
        self.container
    }

    /// Write `view` to `path` according to `policy`.
    ///
    /// `annotate` is called once the dataset exists with its metadata-bearing shape:
    /// after the pixels for a full write, before them for a subset merge into a new dataset.
    pub fn write(
        &self,
        path: &str,
        view: PixelView<'_>,
        block_size: &[u32],
        policy: &OverwritePolicy,
        annotate: impl FnOnce(&str),
    ) -> Result<DatasetStatus> {
        if block_size.len() != view.ndim() {
            return Err(Error::config(format!(
                "block size {block_size:?} does not match {} dimensions",
                view.ndim()
            )));
        }
        let exists = self.container.dataset_exists(path)?;
        match policy {
            OverwritePolicy::Refuse if exists => {
                log::info!("Dataset ({path}) already exists, not writing.");
                Ok(DatasetStatus::Skipped)
            }
            OverwritePolicy::Refuse | OverwritePolicy::Overwrite => {
                let attributes = self.attributes(view.shape(), block_size);
                self.container.create_dataset(path, &attributes)?;
                let blocks = self.write_region(path, &view)?;
                annotate(path);
                log::info!("wrote {blocks} blocks to {path}");
                Ok(DatasetStatus::Written { blocks })
            }
            OverwritePolicy::MergeSubset { offset } => {
                if !exists {
                    // the region write grows the dimensions
                    let placeholder = self.attributes(vec![1; view.ndim()], block_size);
                    self.container.create_dataset(path, &placeholder)?;
                    annotate(path);
                }
                let view = view.translated(offset)?;
                let blocks = self.write_region(path, &view)?;
                log::info!("merged {blocks} blocks into {path} at {offset:?}");
                Ok(DatasetStatus::Written { blocks })
            }
        }
    }

    fn attributes(&self, dimensions: Vec<u64>, block_size: &[u32]) -> DatasetAttributes {
        DatasetAttributes::new(
            dimensions,
            block_size.to_vec(),
            self.data_type,
            self.compression.clone(),
        )
    }

    /// Write `view` at its offset into an existing dataset and return the number of blocks written.
    ///
    /// Dimensions grow to hold the view. Each covered block is one task on the chunk writer;
    /// pixels of the block outside the view keep their values.
    pub fn write_region(&self, path: &str, view: &PixelView<'_>) -> Result<usize> {
        let mut attributes = self.container.dataset_attributes(path)?;
        if view.ndim() != attributes.num_dimensions() {
            return Err(Error::general(format!(
                "cannot write a {}-dimensional view into {}-dimensional dataset {path}",
                view.ndim(),
                attributes.num_dimensions()
            )));
        }
        if view.data_type() != attributes.data_type {
            return Err(Error::general(format!(
                "cannot write {} pixels into {} dataset {path}",
                view.data_type(),
                attributes.data_type
            )));
        }

        let end = view.end();
        let dimensions: Vec<u64> = attributes
            .dimensions
            .iter()
            .zip(&end)
            .map(|(&d, &e)| d.max(e))
            .collect();
        if dimensions != attributes.dimensions {
            log::debug!(
                "growing {path} from {:?} to {dimensions:?}",
                attributes.dimensions
            );
            attributes = self.container.set_dimensions(path, &dimensions)?;
        }

        let array = self.container.array(path)?;
        let region = array_subset(view.offset(), &end);
        let chunks: Vec<Vec<u64>> = match array
            .chunks_in_array_subset(&region)
            .map_err(Error::wrap)?
        {
            Some(chunks) => chunks.indices().iter().map(|c| c.to_vec()).collect(),
            None => {
                return Err(Error::general(format!(
                    "region {:?}..{end:?} is off the chunk grid of {path}",
                    view.offset()
                )));
            }
        };
        log::debug!(
            "writing {} of {} blocks of {path}",
            chunks.len(),
            attributes.num_blocks()
        );
        self.writer.run(chunks, |chunk_indices| {
            write_chunk(&array, &region, view, &chunk_indices).map_err(|e| Error::ChunkWrite {
                path: path.to_string(),
                grid_position: chunk_indices.iter().rev().copied().collect(),
                source: Box::new(e),
            })
        })
    }
}

/// Store the part of `view` inside one chunk. `region` is the view in array order.
fn write_chunk(
    array: &DatasetArray,
    region: &ArraySubset,
    view: &PixelView<'_>,
    chunk_indices: &[u64],
) -> Result<()> {
    let chunk = array.chunk_subset_bounded(chunk_indices)?;
    let region_end = region.end_exc();
    let chunk_end = chunk.end_exc();
    let lo: Vec<u64> = chunk
        .start()
        .iter()
        .zip(region.start())
        .map(|(&c, &r)| c.max(r))
        .collect();
    let hi: Vec<u64> = chunk_end
        .iter()
        .zip(&region_end)
        .map(|(&c, &r)| c.min(r))
        .collect();

    let within_chunk: Vec<Range<u64>> = lo
        .iter()
        .zip(&hi)
        .zip(chunk.start())
        .map(|((&l, &h), &c)| l - c..h - c)
        .collect();
    // back to image order, relative to the view
    let origin: Vec<u64> = lo
        .iter()
        .rev()
        .zip(view.offset())
        .map(|(&l, &o)| l - o)
        .collect();
    let extent: Vec<u64> = hi.iter().zip(&lo).rev().map(|(&h, &l)| h - l).collect();

    log::trace!("chunk {chunk_indices:?} of {}", array.path().as_str());
    array.store_chunk_subset(
        chunk_indices,
        &ArraySubset::new_with_ranges(&within_chunk),
        ArrayBytes::new_flen(view.read_box(&origin, &extent)),
    )?;
    Ok(())
}

/// `[start, end)` in image order as a subset in array order.
fn array_subset(start: &[u64], end: &[u64]) -> ArraySubset {
    let ranges: Vec<Range<u64>> = start.iter().zip(end).rev().map(|(&s, &e)| s..e).collect();
    ArraySubset::new_with_ranges(&ranges)
}

/// Read the box `[origin, origin + extent)` of a dataset, first axis fastest.
///
/// Blocks which were never written read as zeros.
pub fn read_region<T: ElementOwned>(
    container: &Container,
    path: &str,
    origin: &[u64],
    extent: &[u64],
) -> Result<Vec<T>> {
    let array = container.array(path)?;
    let end: Vec<u64> = origin.iter().zip(extent).map(|(o, e)| o + e).collect();
    let dimensions: Vec<u64> = array.shape().iter().rev().copied().collect();
    if end.len() != dimensions.len() || end.iter().zip(&dimensions).any(|(e, d)| e > d) {
        return Err(Error::general(format!(
            "region {origin:?}..{end:?} exceeds dimensions {dimensions:?} of {path}"
        )));
    }
    let data: Vec<T> = array.retrieve_array_subset(&array_subset(origin, &end))?;
    Ok(data)
}
