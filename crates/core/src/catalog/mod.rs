pub mod schema;

use std::marker::PhantomData;
use std::path::Path;

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::{Error, Result};
use crate::record::fields::is_shared_album_field;
use crate::record::{
    item_album_key, quote_ident, Album, AlbumKey, Entity, FieldDef, Item, Record, RecordKind, Value,
};

use self::schema::{Schema, TableSchema};

/// Rows fetched per round trip by [`Records`].
const PAGE_SIZE: i64 = 256;

/// Item rows belonging to album `?1`, matched by album key.
const ALBUM_MEMBERS: &str = "SELECT items.id FROM items JOIN albums ON albums.id = ?1 \
     WHERE items.album = albums.album \
     AND COALESCE(NULLIF(items.albumartist, ''), items.artist) = albums.albumartist";

/// SQLite-backed store for items and albums.
pub struct Catalog {
    conn: Connection,
    schema: Schema,
}

/// How [`Catalog::get_album`] finds an album.
#[derive(Debug, Clone, Copy)]
pub enum AlbumLookup<'a> {
    /// The album whose key matches the item's current values.
    Item(&'a Item),
    Id(i64),
}

impl<'a> From<&'a Item> for AlbumLookup<'a> {
    fn from(item: &'a Item) -> Self {
        AlbumLookup::Item(item)
    }
}

impl From<i64> for AlbumLookup<'_> {
    fn from(id: i64) -> Self {
        AlbumLookup::Id(id)
    }
}

type Row = Vec<(String, Value)>;

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_schema(path, Schema::default())
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_schema(Schema::default())
    }

    pub fn open_with_schema(path: &Path, schema: Schema) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::info!(path = %path.display(), "opening catalog");
        Self::with_connection(conn, schema)
    }

    pub fn open_in_memory_with_schema(schema: Schema) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, schema)
    }

    fn with_connection(mut conn: Connection, schema: Schema) -> Result<Self> {
        let altered = schema::migrate(&mut conn, &schema)?;
        if altered > 0 {
            tracing::info!(alterations = altered, "schema migrated");
        }
        Ok(Self { conn, schema })
    }

    /// Close the connection, reporting any failure to do so.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| Error::Database(err))?;
        tracing::info!("catalog closed");
        Ok(())
    }

    /// The schema the catalog was opened with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// A fresh item carrying this catalog's item fields.
    pub fn new_item(&self) -> Item {
        Item::with_fields(self.schema.items.fields().clone())
    }

    /// A fresh album carrying this catalog's album fields.
    pub fn new_album(&self) -> Album {
        Album::with_fields(self.schema.albums.fields().clone())
    }

    fn table(&self, kind: RecordKind) -> &TableSchema {
        match kind {
            RecordKind::Item => &self.schema.items,
            RecordKind::Album => &self.schema.albums,
        }
    }

    // ── Records ──────────────────────────────────────────────────────

    /// Re-read every field of `record` from its row.
    pub fn load(&self, record: &mut Record) -> Result<()> {
        let kind = record.kind();
        let id = record.id().ok_or(Error::NotInserted(kind))?;
        let row = fetch_row(&self.conn, kind, id)?.ok_or(Error::NotFound { kind, id })?;
        record.load(row);
        Ok(())
    }

    /// Write the dirty fields of `record` back to its row.
    ///
    /// Items get their album link refreshed first. Dirty fields an album
    /// shares with its items are written to every member item as well. An
    /// album cannot take over the key of another album. On error `record` is
    /// left as it was.
    pub fn store(&mut self, record: &mut Record) -> Result<()> {
        if record.is_clean() {
            return Ok(());
        }
        let kind = record.kind();
        let id = record.id().ok_or(Error::NotInserted(kind))?;

        let mut staged = record.clone();
        let tx = self.conn.transaction()?;
        match kind {
            RecordKind::Item => {
                repair_album_link(&tx, &mut staged)?;
                update_row(&tx, &staged, id)?;
            }
            RecordKind::Album => {
                if key_is_dirty(&staged)? {
                    check_album_key(&tx, &staged, Some(id))?;
                }
                let old_key = stored_album_key(&tx, id)?;
                update_row(&tx, &staged, id)?;
                if let Some(old_key) = old_key {
                    let updated = propagate_to_items(&tx, &self.schema.items, &staged, &old_key, id)?;
                    tracing::debug!(album = id, items = updated, "propagated album fields");
                }
            }
        }
        tx.commit()?;
        staged.mark_clean();
        *record = staged;
        Ok(())
    }

    /// Insert `record` as a new row and return its id.
    pub fn add(&mut self, record: &mut Record) -> Result<i64> {
        let mut staged = record.clone();
        let tx = self.conn.transaction()?;
        match staged.kind() {
            RecordKind::Item => repair_album_link(&tx, &mut staged)?,
            RecordKind::Album => check_album_key(&tx, &staged, None)?,
        }
        let id = insert_row(&tx, &staged)?;
        tx.commit()?;
        staged.set_id(id);
        staged.mark_clean();
        *record = staged;
        Ok(id)
    }

    /// Delete the row of `record`. Removing an album also removes its items.
    /// Records without an id and rows already gone are ignored.
    pub fn remove(&mut self, record: &Record) -> Result<()> {
        let Some(id) = record.id() else {
            return Ok(());
        };
        let tx = self.conn.transaction()?;
        if record.kind() == RecordKind::Album {
            let removed = tx.execute(&format!("DELETE FROM items WHERE id IN ({ALBUM_MEMBERS})"), [id])?;
            tracing::debug!(album = id, items = removed, "removed album items");
        }
        tx.execute(&format!("DELETE FROM {} WHERE id = ?1", record.kind().table()), [id])?;
        tx.commit()?;
        tracing::debug!(kind = %record.kind(), id, "removed");
        Ok(())
    }

    // ── Albums ───────────────────────────────────────────────────────

    /// Group `items` into the album matching the first item's key, creating
    /// the album if needed. Every item is linked to the album, takes over the
    /// album's key, and is inserted or stored. On error `items` are left as
    /// they were.
    pub fn add_album(&mut self, items: &mut [Item]) -> Result<Album> {
        let first = items.first().ok_or(Error::EmptyAlbum)?;
        let key = first.album_key()?;

        let tx = self.conn.transaction()?;
        let album = match find_album_id(&tx, &key)? {
            Some(id) => {
                let row = fetch_row(&tx, RecordKind::Album, id)?.ok_or(Error::NotFound {
                    kind: RecordKind::Album,
                    id,
                })?;
                let mut album = Album::with_fields(self.schema.albums.fields().clone());
                album.load(row);
                album
            }
            None => {
                let mut album = Album::with_fields(self.schema.albums.fields().clone());
                for (name, value) in first.iter() {
                    if is_shared_album_field(name) && album.has_field(name) {
                        album.set(name, value.clone())?;
                    }
                }
                album.set_albumartist(key.albumartist.as_str())?;
                album.set_album(key.album.as_str())?;
                if album.has_field("added") {
                    album.set("added", now())?;
                }
                let id = insert_row(&tx, &album)?;
                album.set_id(id);
                album.mark_clean();
                tracing::debug!(album = id, name = %key.album, "created album");
                album
            }
        };
        let album_id = album.id().ok_or(Error::NotInserted(RecordKind::Album))?;

        let mut staged = items.to_vec();
        for item in staged.iter_mut() {
            item.set("album_id", album_id)?;
            item.set_albumartist(key.albumartist.as_str())?;
            item.set_album(key.album.as_str())?;
            match item.id() {
                Some(id) => update_row(&tx, item, id)?,
                None => {
                    let id = insert_row(&tx, item)?;
                    item.set_id(id);
                }
            }
        }
        tx.commit()?;

        for (slot, mut item) in items.iter_mut().zip(staged) {
            item.mark_clean();
            *slot = item;
        }
        Ok(album)
    }

    /// The album an item belongs to, or the album with a given id.
    pub fn get_album<'a>(&self, lookup: impl Into<AlbumLookup<'a>>) -> Result<Option<Album>> {
        let id = match lookup.into() {
            AlbumLookup::Item(item) => match find_album_id(&self.conn, &item.album_key()?)? {
                Some(id) => id,
                None => return Ok(None),
            },
            AlbumLookup::Id(id) => id,
        };
        let Some(row) = fetch_row(&self.conn, RecordKind::Album, id)? else {
            return Ok(None);
        };
        let mut album = Album::with_fields(self.schema.albums.fields().clone());
        album.load(row);
        Ok(Some(album))
    }

    /// Member items of `album` in id order.
    pub fn album_items(&self, album: &Album) -> Result<Vec<Item>> {
        let id = album.id().ok_or(Error::NotInserted(RecordKind::Album))?;
        let sql = format!("SELECT * FROM items WHERE id IN ({ALBUM_MEMBERS}) ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([id], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(|row| self.build(row)).collect())
    }

    // ── Listing ──────────────────────────────────────────────────────

    /// Every item in insertion order, fetched lazily.
    pub fn items(&self) -> Records<'_, Item> {
        Records::new(self)
    }

    /// Every album in insertion order, fetched lazily.
    pub fn albums(&self) -> Records<'_, Album> {
        Records::new(self)
    }

    fn fetch_page(&self, kind: RecordKind, after: i64) -> Result<Vec<Record>> {
        let sql = format!("SELECT * FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2", kind.table());
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![after, PAGE_SIZE], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut record = Record::new(kind, self.table(kind).fields().clone());
                record.load(row);
                record
            })
            .collect())
    }

    fn build<E: Entity>(&self, row: Row) -> E {
        let mut record = Record::new(E::KIND, self.table(E::KIND).fields().clone());
        record.load(row);
        E::from_record(record)
    }
}

/// Lazy iterator over all records of one kind, reading one page at a time.
pub struct Records<'c, E> {
    catalog: &'c Catalog,
    after: i64,
    page: std::vec::IntoIter<Record>,
    done: bool,
    _entity: PhantomData<E>,
}

impl<'c, E: Entity> Records<'c, E> {
    fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            after: 0,
            page: Vec::new().into_iter(),
            done: false,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Iterator for Records<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.page.next() {
                return Some(Ok(E::from_record(record)));
            }
            if self.done {
                return None;
            }
            match self.catalog.fetch_page(E::KIND, self.after) {
                Ok(page) => {
                    self.done = (page.len() as i64) < PAGE_SIZE;
                    if let Some(last) = page.last().and_then(Record::id) {
                        self.after = last;
                    }
                    self.page = page.into_iter();
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

// ── Row helpers ──────────────────────────────────────────────────────

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let stmt = row.as_ref();
    (0..stmt.column_count())
        .map(|i| Ok((stmt.column_name(i)?.to_string(), Value::from(row.get_ref(i)?))))
        .collect()
}

fn fetch_row(conn: &Connection, kind: RecordKind, id: i64) -> Result<Option<Row>> {
    let sql = format!("SELECT * FROM {} WHERE id = ?1", kind.table());
    Ok(conn.query_row(&sql, [id], read_row).optional()?)
}

fn insert_row(tx: &Transaction<'_>, record: &Record) -> Result<i64> {
    let table = record.kind().table();
    let (columns, values): (Vec<_>, Vec<_>) = record.iter_defs().unzip();
    if columns.is_empty() {
        tx.execute(&format!("INSERT INTO {table} DEFAULT VALUES"), [])?;
    } else {
        let names: Vec<String> = columns.iter().map(|f| quote_ident(f.name())).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );
        tracing::debug!(%sql, "insert");
        let params: Vec<&dyn ToSql> = values.iter().map(|v| *v as &dyn ToSql).collect();
        tx.execute(&sql, params.as_slice())?;
    }
    Ok(tx.last_insert_rowid())
}

/// `UPDATE` only the dirty columns of `record`.
fn update_row(tx: &Transaction<'_>, record: &Record, id: i64) -> Result<()> {
    let kind = record.kind();
    let dirty: Vec<(&FieldDef, &Value)> = record.dirty_fields().collect();
    if dirty.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        kind.table(),
        assignments(dirty.iter().map(|(f, _)| *f)),
        dirty.len() + 1
    );
    tracing::debug!(%sql, id, "update");
    let mut params: Vec<&dyn ToSql> = dirty.iter().map(|(_, v)| *v as &dyn ToSql).collect();
    params.push(&id);
    if tx.execute(&sql, params.as_slice())? == 0 {
        return Err(Error::NotFound { kind, id });
    }
    Ok(())
}

fn assignments<'a>(fields: impl Iterator<Item = &'a FieldDef>) -> String {
    fields
        .enumerate()
        .map(|(i, f)| format!("{} = ?{}", quote_ident(f.name()), i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

fn find_album_id(conn: &Connection, key: &AlbumKey) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM albums WHERE albumartist = ?1 AND album = ?2 ORDER BY id LIMIT 1",
            params![key.albumartist, key.album],
            |row| row.get(0),
        )
        .optional()?)
}

/// Whether a field of the album key is about to change.
fn key_is_dirty(album: &Record) -> Result<bool> {
    if !(album.has_field("albumartist") && album.has_field("album")) {
        return Ok(false);
    }
    Ok(album.is_dirty("albumartist")? || album.is_dirty("album")?)
}

/// Reject an album key that is empty or already held by another album row.
/// Album layouts without key fields are not checked.
fn check_album_key(conn: &Connection, album: &Record, id: Option<i64>) -> Result<()> {
    if !(album.has_field("albumartist") && album.has_field("album")) {
        return Ok(());
    }
    let key = AlbumKey {
        albumartist: album.text("albumartist")?.to_string(),
        album: album.text("album")?.to_string(),
    };
    if key.albumartist.is_empty() {
        return Err(Error::EmptyAlbumArtist);
    }
    match find_album_id(conn, &key)? {
        Some(existing) if Some(existing) != id => Err(Error::DuplicateAlbum {
            albumartist: key.albumartist,
            album: key.album,
            existing,
        }),
        _ => Ok(()),
    }
}

fn stored_album_key(conn: &Connection, id: i64) -> Result<Option<AlbumKey>> {
    Ok(conn
        .query_row(
            "SELECT albumartist, album FROM albums WHERE id = ?1",
            [id],
            |row| {
                Ok(AlbumKey {
                    albumartist: row.get(0)?,
                    album: row.get(1)?,
                })
            },
        )
        .optional()?)
}

/// Point the item's `album_id` at the album matching its current key, or
/// clear it when no album matches.
fn repair_album_link(conn: &Connection, record: &mut Record) -> Result<()> {
    if !record.has_field("album_id") {
        return Ok(());
    }
    // Item layouts without key fields have no album to link to.
    let Ok(key) = item_album_key(record) else {
        return Ok(());
    };
    let album_id = find_album_id(conn, &key)?;
    record.set("album_id", album_id)
}

/// Copy the album's dirty shared fields onto the items that matched the
/// album's key before this update.
fn propagate_to_items(
    tx: &Transaction<'_>,
    items: &TableSchema,
    album: &Record,
    old_key: &AlbumKey,
    album_id: i64,
) -> Result<usize> {
    let shared: Vec<(&FieldDef, &Value)> = album
        .dirty_fields()
        .filter(|(f, _)| is_shared_album_field(f.name()) && items.has_field(f.name()))
        .collect();
    if shared.is_empty() {
        return Ok(0);
    }
    let n = shared.len();
    let sql = format!(
        "UPDATE items SET {}, album_id = ?{} \
         WHERE COALESCE(NULLIF(albumartist, ''), artist) = ?{} AND album = ?{}",
        assignments(shared.iter().map(|(f, _)| *f)),
        n + 1,
        n + 2,
        n + 3
    );
    tracing::debug!(%sql, "propagate");
    let mut params: Vec<&dyn ToSql> = shared.iter().map(|(_, v)| *v as &dyn ToSql).collect();
    params.push(&album_id);
    params.push(&old_key.albumartist);
    params.push(&old_key.album);
    Ok(tx.execute(&sql, params.as_slice())?)
}

fn now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
