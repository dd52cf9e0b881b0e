use serde::{Deserialize, Serialize};

use super::{Dialect, to_attributes};
use crate::Result;
use crate::image::Image;
use crate::storage::Container;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelResolution {
    pub unit: String,
    /// X, Y and Z pixel spacing.
    pub dimensions: [f64; 3],
}

/// Single-scale N5 Viewer attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N5ViewerMetadata {
    pub pixel_resolution: PixelResolution,
    pub downsampling_factors: [u64; 3],
    pub scales: Vec<[u64; 3]>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct N5Viewer;

impl Dialect for N5Viewer {
    type Metadata = N5ViewerMetadata;

    fn read(&self, image: &Image) -> Result<N5ViewerMetadata> {
        let calibration = image.calibration();
        Ok(N5ViewerMetadata {
            pixel_resolution: PixelResolution {
                unit: calibration.unit.clone(),
                dimensions: [
                    calibration.pixel_width,
                    calibration.pixel_height,
                    calibration.pixel_depth,
                ],
            },
            downsampling_factors: [1; 3],
            scales: vec![[1; 3]],
        })
    }

    fn write(&self, metadata: &N5ViewerMetadata, container: &Container, path: &str) -> Result<()> {
        container.write_attributes(path, to_attributes(metadata)?)
    }
}
