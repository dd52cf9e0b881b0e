use std::borrow::Cow;
use std::num::NonZeroU64;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zarrs::array::{
    ArrayMetadataV2, ArrayMetadataV3, FillValueMetadata,
    chunk_grid::{RegularBoundedChunkGrid, RegularBoundedChunkGridConfiguration},
    codec::{BloscCodec, BloscCodecConfiguration, Bz2Codec, Bz2CompressionLevel, GzipCodec},
    data_type,
};
use zarrs::metadata::v3::MetadataV3;
use zarrs::plugin::{ExtensionAliasesV3, ExtensionName, ZarrVersion};
use zarrs_codec::{BytesToBytesCodecTraits, CodecTraits};

use crate::chunk_key_encoding::N5ChunkKeyEncoding;
use crate::codec::N5Codec;
use crate::{Error, Result};

/// Version string written to the root of an N5 hierarchy.
pub const N5_VERSION: &str = "4.0.0";

/// Element type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Uint64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// N5 name of the type, e.g. `uint16`.
    pub fn n5_name(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Big-endian numpy type string, as used by Zarr v2.
    ///
    /// Chunks are stored big-endian in both layouts so that block payloads are identical.
    pub fn zarr_dtype(&self) -> &'static str {
        match self {
            DataType::Uint8 => "|u1",
            DataType::Uint16 => ">u2",
            DataType::Uint32 => ">u4",
            DataType::Uint64 => ">u8",
            DataType::Int8 => "|i1",
            DataType::Int16 => ">i2",
            DataType::Int32 => ">i4",
            DataType::Int64 => ">i8",
            DataType::Float32 => ">f4",
            DataType::Float64 => ">f8",
        }
    }

    pub(crate) fn from_n5_name(name: &str) -> Result<Self> {
        let out = match name {
            "uint8" => DataType::Uint8,
            "uint16" => DataType::Uint16,
            "uint32" => DataType::Uint32,
            "uint64" => DataType::Uint64,
            "int8" => DataType::Int8,
            "int16" => DataType::Int16,
            "int32" => DataType::Int32,
            "int64" => DataType::Int64,
            "float32" => DataType::Float32,
            "float64" => DataType::Float64,
            s => return Err(Error::general(format!("unsupported data type: {s}"))),
        };
        Ok(out)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.n5_name())
    }
}

/// Memory order of a backend, relative to the image's own axis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisOrder {
    /// First axis varies fastest; dimensions are stored in image order (N5).
    #[default]
    ColumnMajor,
    /// Last axis varies fastest; dimensions are stored reversed (Zarr "C" order).
    RowMajor,
}

impl AxisOrder {
    /// Whether vectors expressed in image order must be reversed for this backend.
    pub fn is_reversed(&self) -> bool {
        matches!(self, AxisOrder::RowMajor)
    }

    /// Reverse `values` if this backend lists axes slowest first.
    pub fn reverse_if_row_major<T: Clone>(&self, values: &[T]) -> Vec<T> {
        if self.is_reversed() {
            values.iter().rev().cloned().collect()
        } else {
            values.to_vec()
        }
    }
}

/// N5 chunk compression configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum N5Compression {
    /// Uncompressed.
    #[default]
    Raw,
    Bzip2 {
        /// Default 9. Must be in the range 1..=9.
        #[serde(rename = "blockSize", default = "default_bzip2_block_size")]
        block_size: u8,
    },
    Gzip {
        /// Default -1, meaning "implementation default" (usually 6).
        #[serde(default = "default_gzip_level")]
        level: i8,
        #[serde(rename = "useZlib", default)]
        use_zlib: bool,
    },
    Lz4 {
        /// Default 65536. Must be a positive integer.
        #[serde(rename = "blockSize", default = "default_lz4_block_size")]
        block_size: u32,
    },
    Xz {
        /// Default 6.
        #[serde(default = "default_xz_preset")]
        preset: u32,
    },
    Blosc {
        cname: String,
        clevel: u8,
        shuffle: u8,
        blocksize: u32,
        nthreads: u32,
    },
}

fn default_bzip2_block_size() -> u8 {
    9
}

fn default_gzip_level() -> i8 {
    -1
}

fn default_lz4_block_size() -> u32 {
    65536
}

fn default_xz_preset() -> u32 {
    6
}

impl N5Compression {
    pub fn gzip() -> Self {
        N5Compression::Gzip {
            level: default_gzip_level(),
            use_zlib: false,
        }
    }

    pub fn bzip2() -> Self {
        N5Compression::Bzip2 {
            block_size: default_bzip2_block_size(),
        }
    }

    pub fn lz4() -> Self {
        N5Compression::Lz4 {
            block_size: default_lz4_block_size(),
        }
    }

    pub fn xz() -> Self {
        N5Compression::Xz {
            preset: default_xz_preset(),
        }
    }

    /// Blosc with the N5 defaults: blosclz, level 6, no shuffle.
    pub fn blosc() -> Self {
        N5Compression::Blosc {
            cname: "blosclz".into(),
            clevel: 6,
            shuffle: 0,
            blocksize: 0,
            nthreads: 1,
        }
    }

    /// Short name, as accepted by [crate::options::select_compression].
    pub fn name(&self) -> &'static str {
        match self {
            N5Compression::Raw => "raw",
            N5Compression::Bzip2 { .. } => "bzip2",
            N5Compression::Gzip { .. } => "gzip",
            N5Compression::Lz4 { .. } => "lz4",
            N5Compression::Xz { .. } => "xz",
            N5Compression::Blosc { .. } => "blosc",
        }
    }

    /// Convert to a bytes-to-bytes codec if possible.
    ///
    /// `Ok(None)` means the payload is stored as-is.
    pub fn to_bytes_to_bytes_codec(&self) -> Result<Option<Arc<dyn BytesToBytesCodecTraits>>> {
        match self {
            N5Compression::Raw => Ok(None),
            N5Compression::Bzip2 { block_size } => Ok(Some(Arc::new(Bz2Codec::new(
                Bz2CompressionLevel::new(*block_size as u32)
                    .map_err(|n| Error::general(format!("invalid bz2 block size {n}")))?,
            )))),
            N5Compression::Gzip {
                level,
                use_zlib: false,
            } => Ok(Some(Arc::new(
                GzipCodec::new(gzip_level(*level)?).map_err(Error::wrap)?,
            ))),
            N5Compression::Blosc {
                cname,
                clevel,
                shuffle,
                blocksize,
                ..
            } => {
                // elements are shuffled as bytes; blosc records the type size in each frame
                let configuration: BloscCodecConfiguration =
                    serde_json::from_value(serde_json::json!({
                        "cname": cname,
                        "clevel": clevel,
                        "shuffle": blosc_shuffle_name(*shuffle)?,
                        "typesize": 1,
                        "blocksize": blocksize,
                    }))
                    .map_err(|e| Error::UnsupportedCompression(format!("blosc {cname}: {e}")))?;
                Ok(Some(Arc::new(
                    BloscCodec::new_with_configuration(&configuration).map_err(Error::wrap)?,
                )))
            }
            c => Err(Error::UnsupportedCompression(format!("{c:?}"))),
        }
    }

    /// Zarr v2 `compressor` entry; `None` for raw.
    pub fn to_zarr_compressor(&self) -> Result<Option<serde_json::Value>> {
        match self {
            N5Compression::Raw => Ok(None),
            N5Compression::Bzip2 { block_size } => {
                Ok(Some(serde_json::json!({"id": "bz2", "level": block_size})))
            }
            N5Compression::Gzip {
                level,
                use_zlib: false,
            } => Ok(Some(
                serde_json::json!({"id": "gzip", "level": gzip_level(*level)?}),
            )),
            N5Compression::Blosc {
                cname,
                clevel,
                shuffle,
                blocksize,
                ..
            } => {
                blosc_shuffle_name(*shuffle)?;
                Ok(Some(serde_json::json!({
                    "id": "blosc",
                    "cname": cname,
                    "clevel": clevel,
                    "shuffle": shuffle,
                    "blocksize": blocksize,
                })))
            }
            c => Err(Error::UnsupportedCompression(format!("{c:?}"))),
        }
    }

    pub(crate) fn from_zarr_compressor(compressor: Option<&serde_json::Value>) -> Result<Self> {
        let Some(value) = compressor.filter(|v| !v.is_null()) else {
            return Ok(N5Compression::Raw);
        };
        let int = |key: &str| value.get(key).and_then(|v| v.as_i64());
        match value.get("id").and_then(|id| id.as_str()) {
            Some("gzip") => Ok(N5Compression::Gzip {
                level: int("level").unwrap_or(-1) as i8,
                use_zlib: false,
            }),
            Some("bz2") => Ok(N5Compression::Bzip2 {
                block_size: int("level").unwrap_or(9) as u8,
            }),
            Some("blosc") => Ok(N5Compression::Blosc {
                cname: value
                    .get("cname")
                    .and_then(|c| c.as_str())
                    .unwrap_or("blosclz")
                    .to_string(),
                clevel: int("clevel").unwrap_or(5) as u8,
                // numcodecs' automatic shuffle is byte shuffle for multi-byte types
                shuffle: int("shuffle").map_or(1, |s| if s < 0 { 1 } else { s as u8 }),
                blocksize: int("blocksize").unwrap_or(0) as u32,
                nthreads: 1,
            }),
            _ => Err(Error::UnsupportedCompression(value.to_string())),
        }
    }
}

fn blosc_shuffle_name(shuffle: u8) -> Result<&'static str> {
    match shuffle {
        0 => Ok("noshuffle"),
        1 => Ok("shuffle"),
        2 => Ok("bitshuffle"),
        n => Err(Error::UnsupportedCompression(format!("blosc shuffle {n}"))),
    }
}

fn gzip_level(level: i8) -> Result<u32> {
    match level {
        -1 => Ok(6),
        n if n >= 0 => Ok(n as u32),
        n => Err(Error::general(format!("invalid gzip compression level {n}"))),
    }
}

/// Shape, chunking and encoding of a dataset.
///
/// All vectors are in image axis order (first axis fastest),
/// whatever order the backend persists them in.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetAttributes {
    pub dimensions: Vec<u64>,
    pub block_size: Vec<u32>,
    pub data_type: DataType,
    pub compression: N5Compression,
    pub axis_order: AxisOrder,
}

impl DatasetAttributes {
    pub fn new(
        dimensions: Vec<u64>,
        block_size: Vec<u32>,
        data_type: DataType,
        compression: N5Compression,
    ) -> Self {
        Self {
            dimensions,
            block_size,
            data_type,
            compression,
            axis_order: AxisOrder::ColumnMajor,
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.dimensions.len()
    }

    /// Number of blocks along each axis.
    pub fn grid_shape(&self) -> Vec<u64> {
        self.dimensions
            .iter()
            .zip(&self.block_size)
            .map(|(&d, &b)| d.div_ceil(b as u64))
            .collect()
    }

    pub fn num_blocks(&self) -> u64 {
        self.grid_shape().iter().product()
    }

    pub fn to_n5(&self) -> N5ArrayMetadata {
        N5ArrayMetadata {
            n5_version: None,
            dimensions: self.dimensions.clone(),
            block_size: self.block_size.iter().map(|&b| b as u64).collect(),
            data_type: self.data_type.n5_name().to_string(),
            compression: self.compression.clone(),
            attributes: Default::default(),
        }
    }

    /// Zarr v2 array metadata: axes reversed, big-endian, `/`-separated chunk keys.
    pub fn to_zarr_v2(&self) -> Result<ArrayMetadataV2> {
        let document = serde_json::json!({
            "zarr_format": 2,
            "shape": self.dimensions.iter().rev().collect::<Vec<_>>(),
            "chunks": self.block_size.iter().rev().collect::<Vec<_>>(),
            "dtype": self.data_type.zarr_dtype(),
            "compressor": self.compression.to_zarr_compressor()?,
            "fill_value": 0,
            "order": "C",
            "filters": null,
            "dimension_separator": "/",
        });
        Ok(serde_json::from_value(document)?)
    }
}

/// Representation of N5 metadata, either an array or a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum N5Metadata {
    Array(N5ArrayMetadata),
    Group(N5GroupMetadata),
}

/// Representation of N5 group metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct N5GroupMetadata {
    /// N5 version; present if this is a hierarchy root.
    #[serde(rename = "n5", skip_serializing_if = "Option::is_none")]
    pub n5_version: Option<String>,
    /// Unstructured attributes.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Representation of N5 array metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N5ArrayMetadata {
    /// N5 version; present if this is a hierarchy root.
    #[serde(rename = "n5", skip_serializing_if = "Option::is_none")]
    pub n5_version: Option<String>,
    /// Array shape, first axis fastest.
    pub dimensions: Vec<u64>,
    /// Chunk shape, first axis fastest.
    pub block_size: Vec<u64>,
    /// Data type as a string.
    pub data_type: String,
    /// Chunk compression configuration.
    pub compression: N5Compression,
    /// Unstructured attributes.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<N5ArrayMetadata> for DatasetAttributes {
    type Error = Error;

    fn try_from(value: N5ArrayMetadata) -> Result<Self, Self::Error> {
        let block_size = value
            .block_size
            .iter()
            .map(|&b| match u32::try_from(b) {
                Ok(b) if b > 0 => Ok(b),
                _ => Err(Error::general(format!("invalid block size {b}"))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dimensions: value.dimensions,
            block_size,
            data_type: DataType::from_n5_name(&value.data_type)?,
            compression: value.compression,
            axis_order: AxisOrder::ColumnMajor,
        })
    }
}

/// Reverses block_size and creates regular chunk grid
fn convert_chunk_grid(block_size: &[u64]) -> Result<MetadataV3> {
    let chunk_shape: Vec<_> = block_size
        .iter()
        .map(|&n| NonZeroU64::new(n).ok_or_else(|| Error::general("zero block size")))
        .rev()
        .collect::<Result<Vec<_>>>()?;
    let out = MetadataV3::new_with_serializable_configuration(
        RegularBoundedChunkGrid::aliases_v3()
            .default_name
            .clone()
            .to_string(),
        &RegularBoundedChunkGridConfiguration { chunk_shape },
    )?;

    Ok(out)
}

fn convert_data_type(data_type: &str) -> Result<MetadataV3> {
    let data_type = match DataType::from_n5_name(data_type)? {
        DataType::Uint8 => data_type::uint8(),
        DataType::Int8 => data_type::int8(),
        DataType::Int16 => data_type::int16(),
        DataType::Uint16 => data_type::uint16(),
        DataType::Int32 => data_type::int32(),
        DataType::Uint32 => data_type::uint32(),
        DataType::Int64 => data_type::int64(),
        DataType::Uint64 => data_type::uint64(),
        DataType::Float32 => data_type::float32(),
        DataType::Float64 => data_type::float64(),
    };
    let data_type_name = data_type
        .name_v3()
        .map_or_else(String::new, Cow::into_owned);
    let data_type_configuration = data_type.configuration_v3();
    let out = if data_type_configuration.is_empty() {
        MetadataV3::new(data_type_name)
    } else {
        MetadataV3::new_with_configuration(data_type_name, data_type_configuration)
    };
    Ok(out)
}

fn convert_chunk_key_encoding() -> MetadataV3 {
    MetadataV3::new(
        N5ChunkKeyEncoding::aliases_v3()
            .default_name
            .clone()
            .to_string(),
    )
}

/// The `zarrs` view of an N5 dataset; the chunk key encoding and codec are the N5 plugins.
impl TryFrom<N5ArrayMetadata> for ArrayMetadataV3 {
    type Error = Error;

    fn try_from(value: N5ArrayMetadata) -> Result<Self, Self::Error> {
        let shape: Vec<_> = value.dimensions.iter().rev().copied().collect();
        let chunk_grid = convert_chunk_grid(&value.block_size)?;
        let data_type = convert_data_type(&value.data_type)?;
        let fill_value = FillValueMetadata::Number(serde_json::Number::from(0));

        let zarr_version = ZarrVersion::V3;
        let n5_codec = N5Codec::new(value.compression)?;
        let name = n5_codec
            .name(zarr_version)
            .unwrap_or_else(|| "zarrs.n5".into());
        let codec_meta = if let Some(config) =
            n5_codec.configuration(zarr_version, &zarrs_codec::CodecMetadataOptions::default())
        {
            MetadataV3::new_with_configuration(name, config)
        } else {
            MetadataV3::new(name)
        };
        let out = Self::new(shape, chunk_grid, data_type, fill_value, vec![codec_meta])
            .with_chunk_key_encoding(convert_chunk_key_encoding())
            .with_attributes(value.attributes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n5_compression_json() {
        let gzip: N5Compression = serde_json::from_str(r#"{"type": "gzip"}"#).unwrap();
        assert_eq!(gzip, N5Compression::gzip());

        let bz: N5Compression =
            serde_json::from_str(r#"{"type": "bzip2", "blockSize": 5}"#).unwrap();
        assert_eq!(bz, N5Compression::Bzip2 { block_size: 5 });

        let raw = serde_json::to_value(N5Compression::Raw).unwrap();
        assert_eq!(raw, serde_json::json!({"type": "raw"}));

        let blosc = serde_json::to_value(N5Compression::blosc()).unwrap();
        assert_eq!(blosc["type"], "blosc");
        assert_eq!(blosc["cname"], "blosclz");
    }

    #[test]
    fn block_grid() {
        let attrs = DatasetAttributes::new(
            vec![10, 7],
            vec![4, 4],
            DataType::Uint8,
            N5Compression::Raw,
        );
        assert_eq!(attrs.grid_shape(), vec![3, 2]);
        assert_eq!(attrs.num_blocks(), 6);
    }

    #[test]
    fn n5_attributes_round_trip() {
        let attrs = DatasetAttributes::new(
            vec![64, 32, 3],
            vec![16, 16, 1],
            DataType::Uint16,
            N5Compression::gzip(),
        );
        let json = serde_json::to_value(attrs.to_n5()).unwrap();
        assert_eq!(json["blockSize"], serde_json::json!([16, 16, 1]));
        assert_eq!(json["dataType"], "uint16");

        let parsed: N5Metadata = serde_json::from_value(json).unwrap();
        let N5Metadata::Array(array) = parsed else {
            panic!("expected array metadata");
        };
        assert_eq!(DatasetAttributes::try_from(array).unwrap(), attrs);
    }

    #[test]
    fn n5_as_zarrs_array_metadata() {
        let attrs = DatasetAttributes::new(
            vec![64, 32, 3],
            vec![16, 8, 1],
            DataType::Float32,
            N5Compression::bzip2(),
        );
        let metadata = ArrayMetadataV3::try_from(attrs.to_n5()).unwrap();
        let json = serde_json::to_value(metadata).unwrap();
        assert_eq!(json["shape"], serde_json::json!([3, 32, 64]));
        assert_eq!(
            json["chunk_grid"]["configuration"]["chunk_shape"],
            serde_json::json!([1, 8, 16])
        );
        assert_eq!(json["chunk_key_encoding"]["name"], "zarrs.n5");
        assert_eq!(json["codecs"][0]["name"], "zarrs.n5");
        assert_eq!(
            json["codecs"][0]["configuration"]["compression"]["type"],
            "bzip2"
        );
    }

    #[test]
    fn zarr_metadata_is_reversed() {
        let attrs = DatasetAttributes::new(
            vec![64, 32, 3],
            vec![16, 8, 1],
            DataType::Uint16,
            N5Compression::blosc(),
        );
        let zarr = serde_json::to_value(attrs.to_zarr_v2().unwrap()).unwrap();
        assert_eq!(zarr["shape"], serde_json::json!([3, 32, 64]));
        assert_eq!(zarr["chunks"], serde_json::json!([1, 8, 16]));
        assert_eq!(zarr["dtype"], ">u2");
        assert_eq!(zarr["dimension_separator"], "/");
        assert_eq!(zarr["compressor"]["id"], "blosc");

        let compressor = N5Compression::from_zarr_compressor(Some(&zarr["compressor"])).unwrap();
        assert_eq!(compressor, N5Compression::blosc());
    }

    #[test]
    fn unsupported_codecs_are_reported() {
        assert!(matches!(
            N5Compression::lz4().to_bytes_to_bytes_codec(),
            Err(Error::UnsupportedCompression(_))
        ));
        assert!(matches!(
            N5Compression::xz().to_zarr_compressor(),
            Err(Error::UnsupportedCompression(_))
        ));
        assert!(N5Compression::Raw.to_bytes_to_bytes_codec().unwrap().is_none());
        assert!(N5Compression::gzip().to_bytes_to_bytes_codec().unwrap().is_some());
        assert!(N5Compression::blosc().to_bytes_to_bytes_codec().unwrap().is_some());
    }
}
