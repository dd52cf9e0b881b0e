use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Dialect, TemplateMapper, to_attributes};
use crate::image::{Image, PixelType};
use crate::storage::Container;
use crate::{Error, Result};

/// Flat ImageJ calibration attributes, as the ImageJ N5 reader expects them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageJMetadata {
    pub name: String,
    pub fps: f64,
    pub frame_interval: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub pixel_depth: f64,
    pub pixel_unit: String,
    pub x_origin: f64,
    pub y_origin: f64,
    pub z_origin: f64,
    pub num_channels: u64,
    pub num_slices: u64,
    pub num_frames: u64,
    /// ImageJ type code.
    #[serde(rename = "type")]
    pub image_type: u8,
    pub properties: BTreeMap<String, String>,
}

fn type_code(pixel_type: PixelType) -> u8 {
    match pixel_type {
        PixelType::Gray8 => 0,
        PixelType::Gray16 => 1,
        PixelType::Gray32 => 2,
        PixelType::Color256 => 3,
        PixelType::ColorRgb => 4,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageJ;

impl Dialect for ImageJ {
    type Metadata = ImageJMetadata;

    fn read(&self, image: &Image) -> Result<ImageJMetadata> {
        let calibration = image.calibration();
        Ok(ImageJMetadata {
            name: image.title().to_string(),
            fps: calibration.fps,
            frame_interval: calibration.frame_interval,
            pixel_width: calibration.pixel_width,
            pixel_height: calibration.pixel_height,
            pixel_depth: calibration.pixel_depth,
            pixel_unit: calibration.unit.clone(),
            x_origin: calibration.x_origin,
            y_origin: calibration.y_origin,
            z_origin: calibration.z_origin,
            num_channels: image.num_channels(),
            num_slices: image.num_slices(),
            num_frames: image.num_frames(),
            image_type: type_code(image.pixel_type()),
            properties: image.properties().clone(),
        })
    }

    fn write(&self, metadata: &ImageJMetadata, container: &Container, path: &str) -> Result<()> {
        container.write_attributes(path, to_attributes(metadata)?)
    }
}

/// ImageJ metadata passed through a user-supplied template mapper.
#[derive(Debug, Clone)]
pub struct Custom {
    mapper: Arc<dyn TemplateMapper>,
}

impl Custom {
    pub fn new(mapper: Arc<dyn TemplateMapper>) -> Self {
        Self { mapper }
    }
}

impl Dialect for Custom {
    type Metadata = serde_json::Value;

    fn read(&self, image: &Image) -> Result<serde_json::Value> {
        let imagej = serde_json::to_value(ImageJ.read(image)?)?;
        self.mapper.map(&imagej)
    }

    fn write(&self, metadata: &serde_json::Value, container: &Container, path: &str) -> Result<()> {
        if !metadata.is_object() {
            return Err(Error::metadata(
                path,
                "template mapper did not produce a JSON object",
            ));
        }
        container.write_attributes(path, to_attributes(metadata)?)
    }
}
