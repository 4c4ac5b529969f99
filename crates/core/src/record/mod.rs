pub mod fields;
mod value;

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

pub use value::{FieldDef, FieldType, Value};
pub(crate) use value::quote_ident;

/// The two kinds of persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Item,
    Album,
}

impl RecordKind {
    /// Table holding rows of this kind.
    pub fn table(self) -> &'static str {
        match self {
            RecordKind::Item => "items",
            RecordKind::Album => "albums",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Item => "item",
            RecordKind::Album => "album",
        })
    }
}

/// A typed attribute bag mirroring one database row, with one dirty flag per
/// field.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    kind: RecordKind,
    id: Option<i64>,
    fields: Arc<[FieldDef]>,
    values: Vec<Value>,
    dirty: Vec<bool>,
}

impl Record {
    /// A record holding the default value of every field, all clean.
    pub fn new(kind: RecordKind, fields: Arc<[FieldDef]>) -> Self {
        let values = fields.iter().map(FieldDef::default_value).collect();
        let dirty = vec![false; fields.len()];
        Self {
            kind,
            id: None,
            fields,
            values,
            dirty,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Primary key, `None` until the record has been added to a catalog.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn fields(&self) -> &Arc<[FieldDef]> {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.position(name).ok_or_else(|| Error::NoSuchField {
            kind: self.kind,
            field: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        let index = self.index(name)?;
        Ok(&self.values[index])
    }

    /// Assign a field, coercing the value to the field's type. The field only
    /// becomes dirty when the coerced value differs from the current one.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.index(name)?;
        let field = &self.fields[index];
        let value = value.into();
        let described = value.describe();
        let coerced = field.coerce(value).ok_or_else(|| Error::InvalidValue {
            field: name.to_string(),
            expected: field.ty,
            value: described,
        })?;
        if self.values[index] != coerced {
            self.values[index] = coerced;
            self.dirty[index] = true;
        }
        Ok(())
    }

    /// Overwrite the fields named in `row` and clear every dirty flag.
    /// Unknown names are ignored so rows from wider tables load fine; an `id`
    /// entry sets the record's identity.
    pub fn load<N, I>(&mut self, row: I)
    where
        N: AsRef<str>,
        I: IntoIterator<Item = (N, Value)>,
    {
        for (name, value) in row {
            let name = name.as_ref();
            if name == "id" {
                if let Some(id) = value.as_i64() {
                    self.id = Some(id);
                }
                continue;
            }
            let Some(index) = self.position(name) else {
                continue;
            };
            let field = &self.fields[index];
            self.values[index] = match field.coerce(value) {
                Some(value) => value,
                None => {
                    tracing::warn!(
                        kind = %self.kind,
                        field = name,
                        "stored value does not match the field type, using default"
                    );
                    field.default_value()
                }
            };
        }
        self.mark_clean();
    }

    pub fn is_dirty(&self, name: &str) -> Result<bool> {
        let index = self.index(name)?;
        Ok(self.dirty[index])
    }

    pub fn is_clean(&self) -> bool {
        !self.dirty.iter().any(|d| *d)
    }

    /// Dirty fields with their current values, in field order.
    pub fn dirty_fields(&self) -> impl Iterator<Item = (&FieldDef, &Value)> {
        self.iter_defs().zip(&self.dirty).filter(|(_, dirty)| **dirty).map(|(pair, _)| pair)
    }

    /// All fields with their current values, in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter_defs().map(|(f, v)| (f.name(), v))
    }

    pub(crate) fn iter_defs(&self) -> impl Iterator<Item = (&FieldDef, &Value)> {
        self.fields.iter().zip(&self.values)
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = false);
    }

    fn typed<'a, T>(&'a self, name: &str, expected: FieldType, f: impl FnOnce(&'a Value) -> Option<T>) -> Result<T> {
        let value = self.get(name)?;
        f(value).ok_or_else(|| Error::InvalidValue {
            field: name.to_string(),
            expected,
            value: value.describe(),
        })
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        self.typed(name, FieldType::Text, Value::as_str)
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        self.typed(name, FieldType::Integer, Value::as_i64)
    }

    pub fn real(&self, name: &str) -> Result<f64> {
        self.typed(name, FieldType::Real, Value::as_f64)
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        self.typed(name, FieldType::Bool, Value::as_bool)
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        self.typed(name, FieldType::Path, Value::as_bytes)
    }
}

/// A record type stored in its own table.
pub trait Entity: Deref<Target = Record> + DerefMut {
    const KIND: RecordKind;

    /// Wrap a record of kind [`Self::KIND`].
    fn from_record(record: Record) -> Self;
}

/// Typed getters and setters over the generic field access.
macro_rules! field_accessors {
    ($($getter:ident, $setter:ident: $ty:ident;)*) => {
        $(field_accessors!(@one $getter, $setter, $ty);)*
    };
    (@one $getter:ident, $setter:ident, text) => {
        pub fn $getter(&self) -> Result<&str> {
            self.0.text(stringify!($getter))
        }
        pub fn $setter(&mut self, value: impl Into<String>) -> Result<()> {
            self.0.set(stringify!($getter), Value::Text(value.into()))
        }
    };
    (@one $getter:ident, $setter:ident, int) => {
        pub fn $getter(&self) -> Result<i64> {
            self.0.integer(stringify!($getter))
        }
        pub fn $setter(&mut self, value: i64) -> Result<()> {
            self.0.set(stringify!($getter), Value::Integer(value))
        }
    };
    (@one $getter:ident, $setter:ident, real) => {
        pub fn $getter(&self) -> Result<f64> {
            self.0.real(stringify!($getter))
        }
        pub fn $setter(&mut self, value: f64) -> Result<()> {
            self.0.set(stringify!($getter), Value::Real(value))
        }
    };
    (@one $getter:ident, $setter:ident, bool) => {
        pub fn $getter(&self) -> Result<bool> {
            self.0.flag(stringify!($getter))
        }
        pub fn $setter(&mut self, value: bool) -> Result<()> {
            self.0.set(stringify!($getter), Value::Bool(value))
        }
    };
    (@one $getter:ident, $setter:ident, path) => {
        pub fn $getter(&self) -> Result<&[u8]> {
            self.0.bytes(stringify!($getter))
        }
        pub fn $setter(&mut self, value: impl Into<Vec<u8>>) -> Result<()> {
            self.0.set(stringify!($getter), Value::Bytes(value.into()))
        }
    };
}

/// Album identity: album artist (falling back to the track artist) and
/// album title.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumKey {
    pub albumartist: String,
    pub album: String,
}

/// A single track.
#[derive(Debug, Clone, PartialEq)]
pub struct Item(Record);

impl Item {
    /// An item with the current authoritative field set.
    pub fn new() -> Self {
        Self::with_fields(fields::DEFAULT_ITEM_FIELDS.clone())
    }

    pub fn with_fields(fields: Arc<[FieldDef]>) -> Self {
        Self(Record::new(RecordKind::Item, fields))
    }

    field_accessors! {
        title, set_title: text;
        artist, set_artist: text;
        albumartist, set_albumartist: text;
        album, set_album: text;
        genre, set_genre: text;
        composer, set_composer: text;
        year, set_year: int;
        track, set_track: int;
        tracktotal, set_tracktotal: int;
        disc, set_disc: int;
        disctotal, set_disctotal: int;
        bpm, set_bpm: int;
        comp, set_comp: bool;
        path, set_path: path;
        length, set_length: real;
        format, set_format: text;
    }

    /// Linked album row, if any.
    pub fn album_id(&self) -> Option<i64> {
        self.0.get("album_id").ok().and_then(Value::as_i64)
    }

    pub fn album_key(&self) -> Result<AlbumKey> {
        item_album_key(&self.0)
    }
}

/// Album key of an item record. An empty album artist falls back to the
/// track artist.
pub(crate) fn item_album_key(record: &Record) -> Result<AlbumKey> {
    let albumartist = match record.text("albumartist")? {
        "" => record.text("artist")?,
        albumartist => albumartist,
    };
    Ok(AlbumKey {
        albumartist: albumartist.to_string(),
        album: record.text("album")?.to_string(),
    })
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

/// A deduplicated album grouping of items.
#[derive(Debug, Clone, PartialEq)]
pub struct Album(Record);

impl Album {
    pub fn new() -> Self {
        Self::with_fields(fields::DEFAULT_ALBUM_FIELDS.clone())
    }

    pub fn with_fields(fields: Arc<[FieldDef]>) -> Self {
        Self(Record::new(RecordKind::Album, fields))
    }

    field_accessors! {
        album, set_album: text;
        albumartist, set_albumartist: text;
        genre, set_genre: text;
        year, set_year: int;
        comp, set_comp: bool;
        artpath, set_artpath: path;
        mb_albumid, set_mb_albumid: text;
        mb_albumartistid, set_mb_albumartistid: text;
    }

    pub fn key(&self) -> Result<AlbumKey> {
        Ok(AlbumKey {
            albumartist: self.albumartist()?.to_string(),
            album: self.album()?.to_string(),
        })
    }

    /// When the album row was created.
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        let added = self.0.real("added").ok()?;
        DateTime::from_timestamp_micros((added * 1_000_000.0) as i64)
    }
}

impl Default for Album {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! entity {
    ($ty:ident, $kind:expr) => {
        impl Entity for $ty {
            const KIND: RecordKind = $kind;

            fn from_record(record: Record) -> Self {
                debug_assert_eq!(record.kind(), $kind);
                Self(record)
            }
        }

        impl Deref for $ty {
            type Target = Record;

            fn deref(&self) -> &Record {
                &self.0
            }
        }

        impl DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut Record {
                &mut self.0
            }
        }
    };
}

entity!(Item, RecordKind::Item);
entity!(Album, RecordKind::Album);

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> Item {
        let mut item = Item::new();
        item.load([
            ("title", Value::from("the title")),
            ("artist", Value::from("the artist")),
            ("album", Value::from("the album")),
            ("comp", Value::from(true)),
            ("bpm", Value::from(8)),
        ]);
        item
    }

    #[test]
    fn test_set_changes_value() {
        let mut item = item();
        item.set("bpm", 4915).unwrap();
        assert_eq!(item.bpm().unwrap(), 4915);
    }

    #[test]
    fn test_set_sets_dirty_flag() {
        let mut item = item();
        let comp = item.comp().unwrap();
        item.set_comp(!comp).unwrap();
        assert!(item.is_dirty("comp").unwrap());
    }

    #[test]
    fn test_set_does_not_dirty_if_value_unchanged() {
        let mut item = item();
        let title = item.title().unwrap().to_string();
        item.set_title(title).unwrap();
        assert!(!item.is_dirty("title").unwrap());
    }

    #[test]
    fn test_set_same_value_keeps_existing_dirty_flag() {
        let mut item = item();
        item.set("genre", "rock").unwrap();
        item.set("genre", "rock").unwrap();
        assert!(item.is_dirty("genre").unwrap());
    }

    #[test]
    fn test_coerced_equal_value_is_not_dirty() {
        let mut item = item();
        item.set("bpm", 8.7).unwrap();
        assert!(!item.is_dirty("bpm").unwrap());
        item.set("comp", 1).unwrap();
        assert!(!item.is_dirty("comp").unwrap());
    }

    #[test]
    fn test_invalid_field_is_rejected() {
        let mut item = item();
        assert!(matches!(
            item.get("xyzzy"),
            Err(Error::NoSuchField { kind: RecordKind::Item, .. })
        ));
        assert!(matches!(item.set("xyzzy", 1), Err(Error::NoSuchField { .. })));
        assert!(matches!(item.is_dirty("xyzzy"), Err(Error::NoSuchField { .. })));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let mut item = item();
        let err = item.set("track", "first").unwrap_err();
        assert!(matches!(err, Error::InvalidValue { expected: FieldType::Integer, .. }));
        assert!(!item.is_dirty("track").unwrap());
    }

    #[test]
    fn test_load_clears_every_dirty_flag() {
        let mut item = item();
        item.set_artist("something").unwrap();
        item.set_year(1999).unwrap();
        item.load([("title", Value::from("other"))]);
        assert!(item.is_clean());
        assert_eq!(item.title().unwrap(), "other");
        // Fields absent from the row keep their values.
        assert_eq!(item.artist().unwrap(), "something");
        assert_eq!(item.year().unwrap(), 1999);
    }

    #[test]
    fn test_load_ignores_unknown_columns_and_reads_id() {
        let mut item = item();
        item.load([("id", Value::Integer(7)), ("legacy_column", Value::from("x"))]);
        assert_eq!(item.id(), Some(7));
    }

    #[test]
    fn test_load_with_mismatched_value_uses_default() {
        let mut item = item();
        item.load([("track", Value::Bytes(vec![1, 2]))]);
        assert_eq!(item.track().unwrap(), 0);
    }

    #[test]
    fn test_path_is_always_bytes() {
        let mut item = item();
        item.set("path", "unicodepath").unwrap();
        assert_eq!(item.get("path").unwrap(), &Value::Bytes(b"unicodepath".to_vec()));
        item.set_path(&b"b\xe1r"[..]).unwrap();
        assert_eq!(item.path().unwrap(), b"b\xe1r");
    }

    #[test]
    fn test_dirty_fields_in_field_order() {
        let mut item = item();
        item.set_year(2001).unwrap();
        item.set_title("new").unwrap();
        let names: Vec<&str> = item.dirty_fields().map(|(f, _)| f.name()).collect();
        assert_eq!(names, vec!["title", "year"]);
    }

    #[test]
    fn test_album_key_falls_back_to_artist() {
        let mut item = item();
        let key = item.album_key().unwrap();
        assert_eq!(key.albumartist, "the artist");
        assert_eq!(key.album, "the album");

        item.set_albumartist("the album artist").unwrap();
        assert_eq!(item.album_key().unwrap().albumartist, "the album artist");
    }

    #[test]
    fn test_new_item_has_null_album_id() {
        let item = Item::new();
        assert_eq!(item.album_id(), None);
        assert_eq!(item.get("album_id").unwrap(), &Value::Null);
        assert!(item.is_clean());
    }

    #[test]
    fn test_album_added_at() {
        let mut album = Album::new();
        album.set("added", 1_700_000_000.5).unwrap();
        let added = album.added_at().unwrap();
        assert_eq!(added.timestamp(), 1_700_000_000);
    }
}
