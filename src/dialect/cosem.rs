use serde::{Deserialize, Serialize};

use super::{Dialect, to_attributes};
use crate::Result;
use crate::image::{AxisType, Image};
use crate::storage::Container;

/// COSEM spatial transform. Every vector lists the slowest axis first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CosemTransform {
    pub axes: Vec<String>,
    pub units: Vec<String>,
    pub scale: Vec<f64>,
    pub translate: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CosemMetadata {
    pub transform: CosemTransform,
}

/// COSEM metadata covers the image axes other than channel, since channels are split.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosem;

impl Dialect for Cosem {
    type Metadata = CosemMetadata;

    fn read(&self, image: &Image) -> Result<CosemMetadata> {
        let calibration = image.calibration();
        let axes: Vec<AxisType> = image
            .axes()
            .into_iter()
            .rev()
            .filter(|a| *a != AxisType::Channel)
            .collect();
        Ok(CosemMetadata {
            transform: CosemTransform {
                axes: axes.iter().map(|a| a.name().to_string()).collect(),
                units: axes
                    .iter()
                    .map(|&a| calibration.unit(a).unwrap_or_default().to_string())
                    .collect(),
                scale: axes.iter().map(|&a| calibration.scale(a)).collect(),
                translate: axes.iter().map(|&a| calibration.translation(a)).collect(),
            },
        })
    }

    fn write(&self, metadata: &CosemMetadata, container: &Container, path: &str) -> Result<()> {
        container.write_attributes(path, to_attributes(metadata)?)
    }
}
