use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use zarrs::array::{Array, ArrayMetadata, ArrayMetadataOptions};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::{
    ReadableStorageTraits, ReadableWritableListableStorage, ReadableWritableListableStorageTraits,
    StoreKey, WritableStorageTraits,
};

use crate::chunk_key_encoding::{node_key, node_path, normalize_path};
use crate::metadata::{
    AxisOrder, DataType, DatasetAttributes, N5_VERSION, N5ArrayMetadata, N5Compression, N5Metadata,
};
use crate::{Error, Result};

type Attributes = serde_json::Map<String, serde_json::Value>;

/// A dataset as a `zarrs` array. Its axes are listed slowest first in both layouts.
pub type DatasetArray = Array<dyn ReadableWritableListableStorageTraits>;

const N5_ATTRIBUTES: &str = "attributes.json";
const ZARR_ARRAY: &str = ".zarray";
const ZARR_GROUP: &str = ".zgroup";
const ZARR_ATTRIBUTES: &str = ".zattrs";

/// Keys of N5 `attributes.json` which describe the array rather than the user.
const N5_RESERVED: [&str; 4] = ["dimensions", "blockSize", "dataType", "compression"];

/// On-disk layout of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    N5,
    /// Zarr v2. New arrays use `/`-separated chunk keys; existing arrays keep theirs.
    Zarr,
}

impl ContainerFormat {
    /// `.zarr` roots are Zarr, everything else is N5.
    pub fn from_root(root: &Path) -> Self {
        match root.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zarr") => ContainerFormat::Zarr,
            _ => ContainerFormat::N5,
        }
    }

    pub fn axis_order(&self) -> AxisOrder {
        match self {
            ContainerFormat::N5 => AxisOrder::ColumnMajor,
            ContainerFormat::Zarr => AxisOrder::RowMajor,
        }
    }
}

/// A hierarchy of chunked datasets on top of a `zarrs` store.
///
/// Shapes going in and out of the container are in image axis order (first axis fastest).
/// Pixels go through [DatasetArray]s.
pub struct Container {
    store: ReadableWritableListableStorage,
    format: ContainerFormat,
}

impl Container {
    /// Open (creating if needed) a container on the local filesystem.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(Error::wrap)?;
        let store = FilesystemStore::new(root).map_err(Error::wrap)?;
        log::debug!("opened container at {}", root.display());
        Self::open_with_store(Arc::new(store), ContainerFormat::from_root(root))
    }

    /// Open a container on an arbitrary store, e.g. a `MemoryStore`.
    pub fn open_with_store(
        store: ReadableWritableListableStorage,
        format: ContainerFormat,
    ) -> Result<Self> {
        let container = Self { store, format };
        container.init_root()?;
        Ok(container)
    }

    /// Release the container. Every write has already reached the store.
    pub fn close(self) {
        log::debug!("closed {:?} container", self.format);
    }

    fn init_root(&self) -> Result<()> {
        match self.format {
            ContainerFormat::N5 => {
                let key = node_key("", N5_ATTRIBUTES)?;
                let mut attrs: Attributes = self.read_json(&key)?.unwrap_or_default();
                if !attrs.contains_key("n5") {
                    attrs.insert("n5".into(), N5_VERSION.into());
                    self.write_json(&key, &attrs)?;
                }
                Ok(())
            }
            ContainerFormat::Zarr => self.create_group(""),
        }
    }

    /// Create a group and its ancestors. Existing groups are left alone.
    pub fn create_group(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        match self.format {
            // N5 groups are implicit in the key hierarchy
            ContainerFormat::N5 => Ok(()),
            ContainerFormat::Zarr => {
                let mut prefix = String::new();
                for part in std::iter::once("").chain(path.split('/').filter(|p| !p.is_empty())) {
                    if !part.is_empty() {
                        if !prefix.is_empty() {
                            prefix.push('/');
                        }
                        prefix.push_str(part);
                    }
                    let key = node_key(&prefix, ZARR_GROUP)?;
                    if self.store.get(&key)?.is_none()
                        && self.store.get(&node_key(&prefix, ZARR_ARRAY)?)?.is_none()
                    {
                        self.write_json(&key, &serde_json::json!({"zarr_format": 2}))?;
                    }
                }
                Ok(())
            }
        }
    }

    pub fn dataset_exists(&self, path: &str) -> Result<bool> {
        match self.format {
            ContainerFormat::N5 => {
                let attrs: Option<Attributes> = self.read_json(&node_key(path, N5_ATTRIBUTES)?)?;
                Ok(attrs.is_some_and(|a| a.contains_key("dimensions") && a.contains_key("dataType")))
            }
            ContainerFormat::Zarr => Ok(self.store.get(&node_key(path, ZARR_ARRAY)?)?.is_some()),
        }
    }

    /// Create or redefine a dataset. User attributes already at `path` are kept; blocks are not touched.
    pub fn create_dataset(&self, path: &str, attributes: &DatasetAttributes) -> Result<()> {
        // building the array checks the codec before anything is written
        let array = self.new_array(path, attributes)?;
        if let Some((parent, _)) = normalize_path(path).rsplit_once('/') {
            self.create_group(parent)?;
        } else {
            self.create_group("")?;
        }
        match self.format {
            ContainerFormat::N5 => self.write_n5_metadata(path, attributes)?,
            ContainerFormat::Zarr => array.store_metadata_opt(&metadata_options())?,
        }
        log::debug!(
            "created dataset {path}: dimensions {:?}, block size {:?}, {}",
            attributes.dimensions,
            attributes.block_size,
            attributes.data_type
        );
        Ok(())
    }

    fn new_array(&self, path: &str, attributes: &DatasetAttributes) -> Result<DatasetArray> {
        let metadata = match self.format {
            ContainerFormat::N5 => ArrayMetadata::V3(attributes.to_n5().try_into()?),
            ContainerFormat::Zarr => ArrayMetadata::V2(attributes.to_zarr_v2()?),
        };
        Ok(Array::new_with_metadata(
            self.store.clone(),
            &node_path(path),
            metadata,
        )?)
    }

    /// Open an existing dataset for reading and writing pixels.
    pub fn array(&self, path: &str) -> Result<DatasetArray> {
        match self.format {
            ContainerFormat::N5 => {
                let metadata = self.n5_array_metadata(path)?;
                Ok(Array::new_with_metadata(
                    self.store.clone(),
                    &node_path(path),
                    ArrayMetadata::V3(metadata.try_into()?),
                )?)
            }
            ContainerFormat::Zarr => {
                if !self.dataset_exists(path)? {
                    return Err(Error::DatasetMissing(normalize_path(path)));
                }
                Ok(Array::open(self.store.clone(), &node_path(path))?)
            }
        }
    }

    fn n5_array_metadata(&self, path: &str) -> Result<N5ArrayMetadata> {
        let missing = || Error::DatasetMissing(normalize_path(path));
        let meta: N5Metadata = self
            .read_json(&node_key(path, N5_ATTRIBUTES)?)?
            .ok_or_else(missing)?;
        match meta {
            N5Metadata::Array(array) => Ok(array),
            N5Metadata::Group(_) => Err(missing()),
        }
    }

    fn write_n5_metadata(&self, path: &str, attributes: &DatasetAttributes) -> Result<()> {
        let key = node_key(path, N5_ATTRIBUTES)?;
        let mut attrs: Attributes = self.read_json(&key)?.unwrap_or_default();
        let serde_json::Value::Object(array) = serde_json::to_value(attributes.to_n5())? else {
            return Err(Error::general("N5 array metadata is not a JSON object"));
        };
        attrs.extend(array);
        self.write_json(&key, &attrs)
    }

    /// Committed attributes of a dataset, as stored.
    pub fn dataset_attributes(&self, path: &str) -> Result<DatasetAttributes> {
        match self.format {
            ContainerFormat::N5 => self.n5_array_metadata(path)?.try_into(),
            ContainerFormat::Zarr => zarr_attributes(&self.array(path)?),
        }
    }

    /// Replace a dataset's dimensions, keeping everything else.
    pub fn set_dimensions(&self, path: &str, dimensions: &[u64]) -> Result<DatasetAttributes> {
        match self.format {
            ContainerFormat::N5 => {
                let mut attributes = self.dataset_attributes(path)?;
                attributes.dimensions = dimensions.to_vec();
                self.write_n5_metadata(path, &attributes)?;
                Ok(attributes)
            }
            ContainerFormat::Zarr => {
                let mut array = self.array(path)?;
                array.set_shape(dimensions.iter().rev().copied().collect())?;
                array.store_metadata_opt(&metadata_options())?;
                zarr_attributes(&array)
            }
        }
    }

    /// User attributes of a node.
    pub fn attributes(&self, path: &str) -> Result<Attributes> {
        match self.format {
            ContainerFormat::N5 => {
                let mut attrs: Attributes = self
                    .read_json(&node_key(path, N5_ATTRIBUTES)?)?
                    .unwrap_or_default();
                for key in N5_RESERVED {
                    attrs.remove(key);
                }
                Ok(attrs)
            }
            ContainerFormat::Zarr => Ok(self
                .read_json(&node_key(path, ZARR_ATTRIBUTES)?)?
                .unwrap_or_default()),
        }
    }

    /// Merge `attributes` into a node's user attributes, creating the node as a group if needed.
    pub fn write_attributes(&self, path: &str, attributes: Attributes) -> Result<()> {
        if let Some(key) = attributes.keys().find(|k| N5_RESERVED.contains(&k.as_str()))
            && self.format == ContainerFormat::N5
        {
            return Err(Error::metadata(path, format!("attribute {key} is reserved")));
        }
        let key = match self.format {
            ContainerFormat::N5 => node_key(path, N5_ATTRIBUTES)?,
            ContainerFormat::Zarr => {
                if !self.dataset_exists(path)? {
                    self.create_group(path)?;
                }
                node_key(path, ZARR_ATTRIBUTES)?
            }
        };
        let mut existing: Attributes = self.read_json(&key)?.unwrap_or_default();
        existing.extend(attributes);
        self.write_json(&key, &existing)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &StoreKey) -> Result<Option<T>> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &StoreKey, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.store.set(key, Bytes::from(bytes))?;
        Ok(())
    }
}

/// Array metadata goes out without the `_zarrs` attribute.
fn metadata_options() -> ArrayMetadataOptions {
    ArrayMetadataOptions::default().with_include_zarrs_metadata(false)
}

fn zarr_attributes(array: &DatasetArray) -> Result<DatasetAttributes> {
    let dimensions = array.shape().iter().rev().copied().collect();
    let block_size = array
        .chunk_shape(&vec![0; array.dimensionality()])?
        .iter()
        .rev()
        .map(|n| u32::try_from(n.get()).map_err(Error::wrap))
        .collect::<Result<Vec<_>>>()?;
    let data_type = array.data_type().name_v3().ok_or_else(|| {
        Error::general(format!("unnamed data type in {}", array.path().as_str()))
    })?;
    let metadata = serde_json::to_value(array.metadata())?;
    Ok(DatasetAttributes {
        dimensions,
        block_size,
        data_type: DataType::from_n5_name(&data_type)?,
        compression: N5Compression::from_zarr_compressor(metadata.get("compressor"))?,
        axis_order: AxisOrder::RowMajor,
    })
}
