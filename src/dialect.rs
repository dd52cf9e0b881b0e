//! Metadata dialects: how an image's calibration is recorded next to its pixels.
use std::sync::Arc;

use serde::Serialize;

use crate::image::Image;
use crate::storage::Container;
use crate::{Error, Result};

mod cosem;
mod imagej;
mod n5viewer;
pub mod ngff;

pub use cosem::{Cosem, CosemMetadata, CosemTransform};
pub use imagej::{Custom, ImageJ, ImageJMetadata};
pub use n5viewer::{N5Viewer, N5ViewerMetadata, PixelResolution};
pub use ngff::OmeNgff;

pub(crate) type Attributes = serde_json::Map<String, serde_json::Value>;

/// A metadata schema: how to read it from an image and how to store it.
pub trait Dialect {
    type Metadata;

    fn read(&self, image: &Image) -> Result<Self::Metadata>;

    fn write(&self, metadata: &Self::Metadata, container: &Container, path: &str) -> Result<()>;
}

/// Maps ImageJ metadata (as JSON) to a user-defined attribute document.
pub trait TemplateMapper: Send + Sync + std::fmt::Debug {
    fn map(&self, imagej: &serde_json::Value) -> Result<serde_json::Value>;
}

/// The metadata dialect of an export.
#[derive(Debug, Clone)]
pub enum MetadataDialect {
    OmeNgff,
    N5Viewer,
    Cosem,
    ImageJ,
    Custom(Arc<dyn TemplateMapper>),
    None,
}

impl MetadataDialect {
    pub const OME_NGFF: &'static str = "OME-NGFF";
    pub const N5_VIEWER: &'static str = "N5Viewer";
    pub const COSEM: &'static str = "COSEM";
    pub const IMAGEJ: &'static str = "ImageJ";
    pub const CUSTOM: &'static str = "Custom";
    pub const NONE: &'static str = "None";

    /// Dialect for an option name. `Custom` needs a mapper.
    pub fn from_name(name: &str, mapper: Option<Arc<dyn TemplateMapper>>) -> Result<Self> {
        match name {
            Self::OME_NGFF => Ok(MetadataDialect::OmeNgff),
            Self::N5_VIEWER => Ok(MetadataDialect::N5Viewer),
            Self::COSEM => Ok(MetadataDialect::Cosem),
            Self::IMAGEJ => Ok(MetadataDialect::ImageJ),
            Self::CUSTOM => mapper
                .map(MetadataDialect::Custom)
                .ok_or_else(|| Error::config("custom metadata requires a template mapper")),
            Self::NONE => Ok(MetadataDialect::None),
            other => Err(Error::config(format!("unknown metadata dialect {other:?}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetadataDialect::OmeNgff => Self::OME_NGFF,
            MetadataDialect::N5Viewer => Self::N5_VIEWER,
            MetadataDialect::Cosem => Self::COSEM,
            MetadataDialect::ImageJ => Self::IMAGEJ,
            MetadataDialect::Custom(_) => Self::CUSTOM,
            MetadataDialect::None => Self::NONE,
        }
    }

    /// Read this dialect's metadata from `image` and store it at `path`.
    ///
    /// Failures are logged here; callers record them and carry on.
    pub fn write_metadata(&self, image: &Image, container: &Container, path: &str) -> Result<()> {
        let result = match self {
            MetadataDialect::None => return Ok(()),
            MetadataDialect::OmeNgff => annotate(&OmeNgff, image, container, path),
            MetadataDialect::N5Viewer => annotate(&N5Viewer, image, container, path),
            MetadataDialect::Cosem => annotate(&Cosem, image, container, path),
            MetadataDialect::ImageJ => annotate(&ImageJ, image, container, path),
            MetadataDialect::Custom(mapper) => {
                annotate(&Custom::new(mapper.clone()), image, container, path)
            }
        };
        result.map_err(|e| {
            log::error!("could not write {} metadata for {path}: {e}", self.name());
            Error::metadata(path, e)
        })
    }
}

fn annotate<D: Dialect>(dialect: &D, image: &Image, container: &Container, path: &str) -> Result<()> {
    let metadata = dialect.read(image)?;
    dialect.write(&metadata, container, path)
}

/// Serialize `value` as a JSON object of attributes.
pub(crate) fn to_attributes<T: Serialize>(value: &T) -> Result<Attributes> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::general(format!(
            "expected a JSON object of attributes, got {other}"
        ))),
    }
}
