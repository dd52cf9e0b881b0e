//! OME-NGFF v0.4 axes, coordinate transformations and multiscales.
use serde::{Deserialize, Serialize};

use super::{Dialect, to_attributes};
use crate::image::{AxisType, Image};
use crate::metadata::AxisOrder;
use crate::storage::Container;
use crate::Result;

pub const NGFF_VERSION: &str = "0.4";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NgffAxis {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl NgffAxis {
    pub fn new(axis: AxisType, unit: Option<&str>) -> Self {
        Self {
            name: axis.name().into(),
            kind: axis.kind().into(),
            unit: unit.and_then(ngff_unit),
        }
    }
}

/// NGFF name of an ImageJ unit. Pixels have none; unknown units are lowercased.
fn ngff_unit(unit: &str) -> Option<String> {
    let unit = match unit.trim() {
        "" | "pixel" | "pixels" => return None,
        "µm" | "um" | "micron" | "microns" => "micrometer",
        "nm" => "nanometer",
        "mm" => "millimeter",
        "cm" => "centimeter",
        "m" => "meter",
        "s" | "sec" => "second",
        "ms" => "millisecond",
        "min" => "minute",
        "h" | "hr" => "hour",
        other => return Some(other.to_lowercase()),
    };
    Some(unit.into())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum CoordinateTransformation {
    Scale { scale: Vec<f64> },
    Translation { translation: Vec<f64> },
}

/// Axes and transform of one dataset, in the order the backend lists its dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct NgffSingleScale {
    pub axes: Vec<NgffAxis>,
    pub scale: Vec<f64>,
    pub translation: Vec<f64>,
}

impl NgffSingleScale {
    /// Scale, then translation if it is not zero.
    pub fn coordinate_transformations(&self) -> Vec<CoordinateTransformation> {
        let mut out = vec![CoordinateTransformation::Scale {
            scale: self.scale.clone(),
        }];
        if self.translation.iter().any(|&t| t != 0.0) {
            out.push(CoordinateTransformation::Translation {
                translation: self.translation.clone(),
            });
        }
        out
    }

    /// Express image-ordered vectors in the backend's order.
    pub fn in_axis_order(&self, axis_order: AxisOrder) -> Self {
        Self {
            axes: axis_order.reverse_if_row_major(&self.axes),
            scale: axis_order.reverse_if_row_major(&self.scale),
            translation: axis_order.reverse_if_row_major(&self.translation),
        }
    }

    /// Multiply the scale elementwise by `factors`.
    pub fn downsampled(&self, factors: &[u64]) -> Self {
        Self {
            axes: self.axes.clone(),
            scale: self
                .scale
                .iter()
                .zip(factors)
                .map(|(s, &f)| s * f as f64)
                .collect(),
            translation: self.translation.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SingleScaleAttributes<'a> {
    axes: &'a [NgffAxis],
    coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgffDataset {
    pub path: String,
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    pub version: String,
    pub name: String,
    pub axes: Vec<NgffAxis>,
    pub datasets: Vec<NgffDataset>,
    /// Downscaling method.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MultiscalesAttributes {
    multiscales: Vec<Multiscale>,
}

/// Write the `multiscales` group attribute at `path`.
pub fn write_multiscales(container: &Container, path: &str, multiscales: Vec<Multiscale>) -> Result<()> {
    container.write_attributes(path, to_attributes(&MultiscalesAttributes { multiscales })?)
}

/// Read the `multiscales` group attribute at `path`, if present.
pub fn read_multiscales(container: &Container, path: &str) -> Result<Option<Vec<Multiscale>>> {
    let mut attributes = container.attributes(path)?;
    match attributes.remove("multiscales") {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Per-dataset NGFF axes and coordinate transformations.
#[derive(Debug, Clone, Copy, Default)]
pub struct OmeNgff;

impl Dialect for OmeNgff {
    type Metadata = NgffSingleScale;

    /// Base-level metadata in image axis order.
    fn read(&self, image: &Image) -> Result<NgffSingleScale> {
        let calibration = image.calibration();
        let axes = image.axes();
        Ok(NgffSingleScale {
            axes: axes
                .iter()
                .map(|&a| NgffAxis::new(a, calibration.unit(a)))
                .collect(),
            scale: axes.iter().map(|&a| calibration.scale(a)).collect(),
            translation: axes.iter().map(|&a| calibration.translation(a)).collect(),
        })
    }

    fn write(&self, metadata: &NgffSingleScale, container: &Container, path: &str) -> Result<()> {
        let attributes = SingleScaleAttributes {
            axes: &metadata.axes,
            coordinate_transformations: metadata.coordinate_transformations(),
        };
        container.write_attributes(path, to_attributes(&attributes)?)
    }
}
