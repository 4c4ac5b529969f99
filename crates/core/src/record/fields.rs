use std::sync::{Arc, LazyLock};

use super::value::{FieldDef, FieldType};

/// Authoritative item fields of the current schema version.
pub const ITEM_FIELDS: &[FieldDef] = &[
    FieldDef::new("title", FieldType::Text),
    FieldDef::new("artist", FieldType::Text),
    FieldDef::new("albumartist", FieldType::Text),
    FieldDef::new("album", FieldType::Text),
    FieldDef::new("genre", FieldType::Text),
    FieldDef::new("composer", FieldType::Text),
    FieldDef::new("grouping", FieldType::Text),
    FieldDef::new("year", FieldType::Integer),
    FieldDef::new("month", FieldType::Integer),
    FieldDef::new("day", FieldType::Integer),
    FieldDef::new("track", FieldType::Integer),
    FieldDef::new("tracktotal", FieldType::Integer),
    FieldDef::new("disc", FieldType::Integer),
    FieldDef::new("disctotal", FieldType::Integer),
    FieldDef::new("lyrics", FieldType::Text),
    FieldDef::new("comments", FieldType::Text),
    FieldDef::new("bpm", FieldType::Integer),
    FieldDef::new("comp", FieldType::Bool),
    FieldDef::new("path", FieldType::Path),
    FieldDef::new("length", FieldType::Real),
    FieldDef::new("bitrate", FieldType::Integer),
    FieldDef::new("format", FieldType::Text),
    FieldDef::new("mb_trackid", FieldType::Text),
    FieldDef::new("mb_albumid", FieldType::Text),
    FieldDef::new("mb_artistid", FieldType::Text),
    FieldDef::new("mb_albumartistid", FieldType::Text),
    ALBUM_ID_FIELD,
];

/// Authoritative album fields of the current schema version.
pub const ALBUM_FIELDS: &[FieldDef] = &[
    FieldDef::new("artpath", FieldType::Path),
    FieldDef::new("added", FieldType::Real),
    FieldDef::new("albumartist", FieldType::Text),
    FieldDef::new("album", FieldType::Text),
    FieldDef::new("genre", FieldType::Text),
    FieldDef::new("year", FieldType::Integer),
    FieldDef::new("month", FieldType::Integer),
    FieldDef::new("day", FieldType::Integer),
    FieldDef::new("tracktotal", FieldType::Integer),
    FieldDef::new("disctotal", FieldType::Integer),
    FieldDef::new("comp", FieldType::Bool),
    FieldDef::new("mb_albumid", FieldType::Text),
    FieldDef::new("mb_albumartistid", FieldType::Text),
];

/// Item-to-album link. Always present in the items table.
pub const ALBUM_ID_FIELD: FieldDef = FieldDef::nullable("album_id", FieldType::Integer);

/// Album fields that only exist on the album row.
pub const ALBUM_ONLY_FIELDS: &[&str] = &["artpath", "added"];

/// Index-like fields zero-padded to two digits in destinations.
pub const PADDED_FIELDS: &[&str] = &["track", "tracktotal", "disc", "disctotal"];

/// Whether an album field is shared with (and propagated to) member items.
pub fn is_shared_album_field(name: &str) -> bool {
    name != "id" && !ALBUM_ONLY_FIELDS.contains(&name)
}

pub(crate) static DEFAULT_ITEM_FIELDS: LazyLock<Arc<[FieldDef]>> =
    LazyLock::new(|| ITEM_FIELDS.into());

pub(crate) static DEFAULT_ALBUM_FIELDS: LazyLock<Arc<[FieldDef]>> =
    LazyLock::new(|| ALBUM_FIELDS.into());
