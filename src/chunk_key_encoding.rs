use zarrs::{
    array::{
        ChunkKeyEncoding, ChunkKeyEncodingTraits,
        chunk_key_encoding::{self as cke, api::ChunkKeyEncodingPlugin},
    },
    plugin::PluginConfigurationInvalidError,
    storage::StoreKey,
};

use crate::{Error, Result};

/// N5 block keys: grid indices joined by `/`, fastest axis first.
///
/// `zarrs` hands over indices slowest axis first, so they are reversed.
#[derive(Debug, Clone, Copy)]
pub struct N5ChunkKeyEncoding;

zarrs::plugin::impl_extension_aliases!(N5ChunkKeyEncoding, v3: "zarrs.n5", ["zarrs.n5", "n5"]);
inventory::submit! {
    ChunkKeyEncodingPlugin::new::<N5ChunkKeyEncoding>()
}

impl ChunkKeyEncodingTraits for N5ChunkKeyEncoding {
    fn create(
        metadata: &zarrs::metadata::v3::MetadataV3,
    ) -> Result<cke::api::ChunkKeyEncoding, zarrs::plugin::PluginCreateError>
    where
        Self: Sized,
    {
        let cke = match metadata.name() {
            "zarrs.n5" | "n5" => ChunkKeyEncoding::new(Self),
            _ => {
                return Err(zarrs::plugin::PluginCreateError::NameInvalid {
                    name: metadata.name().into(),
                });
            }
        };
        if !metadata.configuration_is_none_or_empty() {
            return Err(zarrs::plugin::PluginCreateError::ConfigurationInvalid(
                PluginConfigurationInvalidError::new(
                    "N5 chunk key encoding does not support configuration".into(),
                ),
            ));
        }
        Ok(cke)
    }

    fn configuration(&self) -> zarrs::metadata::Configuration {
        Default::default()
    }

    fn encode(&self, chunk_grid_indices: &[u64]) -> StoreKey {
        let key = chunk_grid_indices
            .iter()
            .rev()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join("/");
        // SAFETY: decimal indices joined by '/' are a valid key
        unsafe { StoreKey::new_unchecked(key) }
    }
}

/// Normalise a dataset or group path: no leading, trailing or repeated slashes.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of `child` under `base`.
pub fn join_path(base: &str, child: &str) -> String {
    normalize_path(&format!("{base}/{child}"))
}

/// Absolute `zarrs` node path, e.g. `/raw/s0`.
pub(crate) fn node_path(path: &str) -> String {
    format!("/{}", normalize_path(path))
}

/// Key of `name` inside the node at `path`.
pub(crate) fn node_key(path: &str, name: &str) -> Result<StoreKey> {
    let path = normalize_path(path);
    let key = if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}/{name}")
    };
    StoreKey::new(key).map_err(Error::wrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n5_keys_are_fastest_first() {
        let key = N5ChunkKeyEncoding.encode(&[3, 2, 1]);
        assert_eq!(key.as_str(), "1/2/3");
        assert_eq!(N5ChunkKeyEncoding.encode(&[12]).as_str(), "12");
    }

    #[test]
    fn created_from_metadata() {
        let metadata = zarrs::metadata::v3::MetadataV3::new("zarrs.n5".to_string());
        assert!(N5ChunkKeyEncoding::create(&metadata).is_ok());
        let other = zarrs::metadata::v3::MetadataV3::new("default".to_string());
        assert!(N5ChunkKeyEncoding::create(&other).is_err());
    }

    #[test]
    fn paths() {
        assert_eq!(normalize_path("//a//b/"), "a/b");
        assert_eq!(join_path("", "s0"), "s0");
        assert_eq!(join_path("/raw/", "c1/s0"), "raw/c1/s0");
        assert_eq!(node_path("raw/s0/"), "/raw/s0");
        assert_eq!(node_path(""), "/");
        assert_eq!(node_key("", "attributes.json").unwrap().as_str(), "attributes.json");
    }
}
