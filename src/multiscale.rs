//! Multiscale pyramids with OME-NGFF metadata.
use crate::chunk_key_encoding::join_path;
use crate::dataset::{DatasetStatus, DatasetWriter};
use crate::dialect::Dialect;
use crate::dialect::ngff::{
    Multiscale, NGFF_VERSION, NgffAxis, NgffDataset, NgffSingleScale, OmeNgff, write_multiscales,
};
use crate::exporter::ExportReport;
use crate::image::{AxisType, Image};
use crate::metadata::{AxisOrder, DatasetAttributes};
use crate::options::OverwritePolicy;
use crate::{Error, Result};

/// Downsampling method recorded in the manifest.
pub const DOWNSAMPLING_METHOD: &str = "subsample";

/// One written level of a pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLevel {
    /// Path relative to the pyramid group, e.g. `s1`.
    pub path: String,
    pub attributes: DatasetAttributes,
    /// Cumulative downsampling factors, image axis order.
    pub factors: Vec<u64>,
    /// Axes and transform in the backend's axis order.
    pub metadata: NgffSingleScale,
}

/// Every level of a pyramid, as recorded in its group's `multiscales` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiscaleManifest {
    pub path: String,
    pub name: String,
    pub axes: Vec<NgffAxis>,
    pub levels: Vec<PyramidLevel>,
    pub axis_order: AxisOrder,
}

impl MultiscaleManifest {
    pub fn to_ngff(&self) -> Multiscale {
        Multiscale {
            version: NGFF_VERSION.into(),
            name: self.name.clone(),
            axes: self.axes.clone(),
            datasets: self
                .levels
                .iter()
                .map(|level| NgffDataset {
                    path: level.path.clone(),
                    coordinate_transformations: level.metadata.coordinate_transformations(),
                })
                .collect(),
            kind: Some(DOWNSAMPLING_METHOD.into()),
        }
    }
}

/// Double each spatial factor whose doubled value still fits in the axis extent.
pub fn update_factors(factors: &[u64], extents: &[u64], axes: &[AxisType]) -> Vec<u64> {
    factors
        .iter()
        .zip(extents)
        .zip(axes)
        .map(|((&f, &extent), axis)| {
            if axis.is_spatial() && f * 2 <= extent {
                f * 2
            } else {
                f
            }
        })
        .collect()
}

/// Write `num_scales` levels of `image` under `base` and then the manifest.
///
/// A failure at level 0 is returned. Later level failures and every metadata failure
/// are recorded in `report`; failed levels are left out of the manifest.
pub fn build_pyramid(
    writer: &DatasetWriter<'_>,
    image: &Image,
    base: &str,
    block_size: &[u32],
    policy: &OverwritePolicy,
    num_scales: usize,
    report: &mut ExportReport,
) -> Result<()> {
    let container = writer.container();
    let policy = match policy {
        OverwritePolicy::MergeSubset { .. } => {
            log::warn!("subset writes do not apply to multiscale exports, overwriting {base}");
            OverwritePolicy::Overwrite
        }
        other => other.clone(),
    };
    let base_metadata = OmeNgff.read(image)?;
    let extents = image.shape();
    let axes = image.axes();

    let s0 = join_path(base, "s0");
    let status = writer.write(&s0, image.view(), block_size, &policy, |_| {})?;
    report.record(&s0, status);

    // committed attributes decide the axis order of every level
    let attributes = container.dataset_attributes(&s0)?;
    let axis_order = attributes.axis_order;
    let mut factors = vec![1u64; extents.len()];
    let metadata = base_metadata.in_axis_order(axis_order);
    report.record_metadata(&s0, write_level_metadata(&metadata, writer, &s0));
    let manifest_axes = metadata.axes.clone();
    let mut levels = vec![PyramidLevel {
        path: "s0".into(),
        attributes,
        factors: factors.clone(),
        metadata,
    }];

    for i in 1..num_scales {
        factors = update_factors(&factors, &extents, &axes);
        let relative = format!("s{i}");
        let path = join_path(base, &relative);
        let view = image.view().subsampled(&factors);
        log::debug!("level {i} of {base}: factors {factors:?}");

        let level = writer
            .write(&path, view, block_size, &policy, |_| {})
            .and_then(|status| Ok((status, container.dataset_attributes(&path)?)));
        let (status, attributes) = match level {
            Ok(level) => level,
            Err(e) => {
                log::error!("failed writing pyramid level {path}: {e}");
                report.record(&path, DatasetStatus::Failed(e.to_string()));
                continue;
            }
        };
        report.record(&path, status);

        let metadata = base_metadata.downsampled(&factors).in_axis_order(axis_order);
        report.record_metadata(&path, write_level_metadata(&metadata, writer, &path));
        levels.push(PyramidLevel {
            path: relative,
            attributes,
            factors: factors.clone(),
            metadata,
        });
    }

    let manifest = MultiscaleManifest {
        path: base.to_string(),
        name: image.title().to_string(),
        axes: manifest_axes,
        levels,
        axis_order,
    };
    match write_multiscales(container, base, vec![manifest.to_ngff()]) {
        Ok(()) => {
            log::info!(
                "wrote multiscale manifest of {} levels at {base}",
                manifest.levels.len()
            );
            report.manifest = Some(manifest);
        }
        Err(e) => {
            log::error!("could not write multiscale manifest at {base}: {e}");
            report.record_metadata(base, Err(Error::metadata(base, e)));
        }
    }
    Ok(())
}

fn write_level_metadata(
    metadata: &NgffSingleScale,
    writer: &DatasetWriter<'_>,
    path: &str,
) -> Result<()> {
    OmeNgff
        .write(metadata, writer.container(), path)
        .map_err(|e| {
            log::error!("could not write OME-NGFF metadata for {path}: {e}");
            Error::metadata(path, e)
        })
}
