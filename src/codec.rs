use std::borrow::Cow;
use std::num::NonZeroU64;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zarrs::array::CodecChain;
use zarrs::array::codec::BytesCodec;
use zarrs::metadata::v3::MetadataV3;
use zarrs::plugin::PluginCreateError;
use zarrs_codec::{
    ArrayCodecTraits, ArrayToBytesCodecTraits, BytesRepresentation, Codec, CodecError,
    CodecPluginV3, CodecTraits, CodecTraitsV3,
};

use crate::chunk::N5ChunkHeader;
use crate::metadata::N5Compression;

zarrs::plugin::impl_extension_aliases!(N5Codec, v3: "zarrs.n5", ["zarrs.n5", "n5"]);
inventory::submit! {
    CodecPluginV3::new::<N5Codec>()
}

/// Array-to-bytes codec for N5 blocks: a header holding the block extent,
/// then the big-endian elements, compressed.
#[derive(Debug, Clone)]
pub struct N5Codec {
    /// The original representation of the compression.
    n5_compression: N5Compression,
    /// Always contains a big-endian bytes codec.
    /// May contain a single bytes-to-bytes codec representing the N5 compression.
    codecs: CodecChain,
}

impl N5Codec {
    pub fn new(compression: N5Compression) -> crate::Result<Self> {
        let compressor = compression.to_bytes_to_bytes_codec()?;
        let codecs = CodecChain::new(
            vec![],
            Arc::new(BytesCodec::big()),
            compressor.into_iter().collect(),
        );
        Ok(Self {
            codecs,
            n5_compression: compression,
        })
    }

    pub fn new_with_configuration(
        configuration: &N5CodecConfiguration,
    ) -> Result<Self, PluginCreateError> {
        Self::new(configuration.compression.clone())
            .map_err(|e| PluginCreateError::Other(e.to_string()))
    }

    pub fn compression(&self) -> &N5Compression {
        &self.n5_compression
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct N5CodecConfiguration {
    compression: N5Compression,
}

impl CodecTraitsV3 for N5Codec {
    fn create(metadata: &MetadataV3) -> Result<Codec, PluginCreateError>
    where
        Self: Sized,
    {
        let configuration = metadata.to_typed_configuration()?;
        let codec = Arc::new(N5Codec::new_with_configuration(&configuration)?);
        Ok(Codec::ArrayToBytes(codec))
    }
}

impl CodecTraits for N5Codec {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn configuration(
        &self,
        _version: zarrs::plugin::ZarrVersion,
        _options: &zarrs_codec::CodecMetadataOptions,
    ) -> Option<zarrs::metadata::Configuration> {
        let config = N5CodecConfiguration {
            compression: self.n5_compression.clone(),
        };
        match serde_json::to_value(config) {
            Ok(serde_json::Value::Object(map)) => Some(map.into()),
            _ => None,
        }
    }

    fn partial_decoder_capability(&self) -> zarrs_codec::PartialDecoderCapability {
        zarrs_codec::PartialDecoderCapability {
            partial_read: false,
            partial_decode: false,
        }
    }

    fn partial_encoder_capability(&self) -> zarrs_codec::PartialEncoderCapability {
        zarrs_codec::PartialEncoderCapability {
            partial_encode: false,
        }
    }
}

impl ArrayCodecTraits for N5Codec {
    fn recommended_concurrency(
        &self,
        _shape: &[NonZeroU64],
        _data_type: &zarrs::array::DataType,
    ) -> Result<zarrs_codec::RecommendedConcurrency, CodecError> {
        Ok(zarrs_codec::RecommendedConcurrency::new_maximum(1))
    }
}

impl ArrayToBytesCodecTraits for N5Codec {
    fn into_dyn(self: Arc<Self>) -> Arc<dyn ArrayToBytesCodecTraits> {
        self
    }

    fn encoded_representation(
        &self,
        shape: &[NonZeroU64],
        data_type: &zarrs::array::DataType,
        fill_value: &zarrs::array::FillValue,
    ) -> Result<BytesRepresentation, CodecError> {
        let header = (2 * size_of::<u16>() + shape.len() * size_of::<u32>()) as u64;
        let payload = self
            .codecs
            .encoded_representation(shape, data_type, fill_value)?;
        Ok(match payload {
            BytesRepresentation::FixedSize(n) => BytesRepresentation::FixedSize(header + n),
            BytesRepresentation::BoundedSize(n) => BytesRepresentation::BoundedSize(header + n),
            BytesRepresentation::UnboundedSize => BytesRepresentation::UnboundedSize,
        })
    }

    fn encode<'a>(
        &self,
        bytes: zarrs_codec::ArrayBytes<'a>,
        shape: &[NonZeroU64],
        data_type: &zarrs::array::DataType,
        fill_value: &zarrs::array::FillValue,
        options: &zarrs_codec::CodecOptions,
    ) -> Result<zarrs_codec::ArrayBytesRaw<'a>, CodecError> {
        // the header lists the fastest axis first
        let extent: Vec<u64> = shape.iter().rev().map(|n| n.get()).collect();
        let header = N5ChunkHeader::new(&extent)
            .map_err(|e| CodecError::Other(format!("N5 chunk header could not be built: {e}")))?;

        let payload = self
            .codecs
            .encode(bytes, shape, data_type, fill_value, options)?;

        let mut out = header.to_bytes();
        out.extend_from_slice(&payload);
        Ok(Cow::Owned(out))
    }

    fn decode<'a>(
        &self,
        bytes: zarrs_codec::ArrayBytesRaw<'a>,
        shape: &[NonZeroU64],
        data_type: &zarrs::array::DataType,
        fill_value: &zarrs::array::FillValue,
        options: &zarrs_codec::CodecOptions,
    ) -> Result<zarrs_codec::ArrayBytes<'a>, CodecError> {
        let header = N5ChunkHeader::from_bytes(&bytes)
            .map_err(|e| CodecError::Other(format!("N5 chunk header could not be parsed: {e}")))?;

        // shape should be identical because the regular bounded chunk grid
        // should take care of edge chunks
        let shape_u32: Vec<u32> = shape.iter().map(|n| n.get() as u32).rev().collect();
        if header.shape != shape_u32 {
            return Err(CodecError::Other(format!(
                "N5 chunk header has shape {:?}, expected {:?}",
                header.shape, shape_u32,
            )));
        }

        let payload = &bytes[header.data_offset()..];

        self.codecs.decode(
            Cow::Owned(payload.to_vec()),
            shape,
            data_type,
            fill_value,
            options,
        )
    }
}
