use zarrs::array::{ArrayCreateError, ArrayError};
use zarrs::storage::StorageError;
use zarrs_codec::CodecError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed user input (block size, offset, option names).
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("pixel type {0} has no container data type")]
    UnsupportedType(String),
    #[error("compression {0} is not supported by this container")]
    UnsupportedCompression(String),
    #[error("dataset {0} does not exist")]
    DatasetMissing(String),
    #[error("failed writing block {grid_position:?} of {path}: {source}")]
    ChunkWrite {
        path: String,
        grid_position: Vec<u64>,
        #[source]
        source: Box<Error>,
    },
    #[error("metadata for {path}: {message}")]
    Metadata { path: String, message: String },
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Array(#[from] ArrayError),
    #[error(transparent)]
    ArrayCreate(#[from] ArrayCreateError),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn metadata(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }
}
