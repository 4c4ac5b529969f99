use crate::record::{FieldType, RecordKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parsing error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{kind} has no field named `{field}`")]
    NoSuchField { kind: RecordKind, field: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: i64 },

    #[error("{0} has not been added to the catalog yet")]
    NotInserted(RecordKind),

    #[error("cannot assign {value} to {expected} field `{field}`")]
    InvalidValue {
        field: String,
        expected: FieldType,
        value: String,
    },

    #[error("cannot create an album without items")]
    EmptyAlbum,

    #[error("album `{album}` by `{albumartist}` already exists: {existing}")]
    DuplicateAlbum {
        albumartist: String,
        album: String,
        existing: i64,
    },

    #[error("an album needs a non-empty album artist")]
    EmptyAlbumArtist,
}

pub type Result<T> = std::result::Result<T, Error>;
