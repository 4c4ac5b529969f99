use std::fmt;
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::record::fields::{ALBUM_ID_FIELD, DEFAULT_ALBUM_FIELDS, DEFAULT_ITEM_FIELDS};
use crate::record::FieldDef;

/// Declared layout of one table: its name and ordered fields. The implicit
/// `id` primary key is never part of `fields`.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: Arc<[FieldDef]>,
    indices: &'static [(&'static str, &'static str)],
}

const ITEM_INDICES: &[(&str, &str)] = &[("idx_items_album_id", "album_id")];
const ALBUM_INDICES: &[(&str, &str)] = &[("idx_albums_album", "album")];

impl TableSchema {
    fn new(
        name: &'static str,
        fields: Arc<[FieldDef]>,
        indices: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            name,
            fields,
            indices,
        }
    }

    pub fn fields(&self) -> &Arc<[FieldDef]> {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn create_sql(&self) -> String {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        columns.extend(self.fields.iter().map(FieldDef::column_sql));
        format!("CREATE TABLE {} ({})", self.name, columns.join(", "))
    }
}

/// The authoritative layout of both tables.
#[derive(Debug, Clone)]
pub struct Schema {
    pub items: TableSchema,
    pub albums: TableSchema,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            items: TableSchema::new("items", DEFAULT_ITEM_FIELDS.clone(), ITEM_INDICES),
            albums: TableSchema::new("albums", DEFAULT_ALBUM_FIELDS.clone(), ALBUM_INDICES),
        }
    }
}

impl Schema {
    /// Replace the item fields. `album_id` is always kept so items can be
    /// linked to albums.
    pub fn with_item_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        let mut fields = user_fields(fields);
        if !fields.iter().any(|f| f.name == ALBUM_ID_FIELD.name) {
            fields.push(ALBUM_ID_FIELD);
        }
        self.items.fields = fields.into();
        self
    }

    pub fn with_album_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.albums.fields = user_fields(fields).into();
        self
    }

    fn tables(&self) -> [&TableSchema; 2] {
        [&self.items, &self.albums]
    }
}

fn user_fields(fields: impl IntoIterator<Item = FieldDef>) -> Vec<FieldDef> {
    fields
        .into_iter()
        .filter(|f| !f.name.eq_ignore_ascii_case("id"))
        .collect()
}

/// One additive change to the database.
#[derive(Debug, Clone, Copy)]
pub enum Alteration<'a> {
    CreateTable(&'a TableSchema),
    AddColumn {
        table: &'a TableSchema,
        field: &'a FieldDef,
    },
}

impl Alteration<'_> {
    pub fn sql(&self) -> String {
        match self {
            Alteration::CreateTable(table) => table.create_sql(),
            Alteration::AddColumn { table, field } => {
                format!("ALTER TABLE {} ADD COLUMN {}", table.name, field.column_sql())
            }
        }
    }
}

impl fmt::Display for Alteration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alteration::CreateTable(table) => write!(f, "create table {}", table.name),
            Alteration::AddColumn { table, field } => {
                write!(f, "add column {}.{} ({})", table.name, field.name, field.ty)
            }
        }
    }
}

/// Column names of `table` in declaration order, or `None` if the table
/// does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(columns))
}

/// Declared fields of `table` missing from `actual` columns. Columns present
/// on disk but not declared are left alone.
pub fn diff<'a>(table: &'a TableSchema, actual: &[String]) -> Vec<&'a FieldDef> {
    table
        .fields
        .iter()
        .filter(|f| !actual.iter().any(|c| c.eq_ignore_ascii_case(&f.name)))
        .collect()
}

/// Alterations that bring the database up to `schema`.
pub fn plan<'a>(conn: &Connection, schema: &'a Schema) -> Result<Vec<Alteration<'a>>> {
    let mut alterations = Vec::new();
    for table in schema.tables() {
        match table_columns(conn, table.name)? {
            None => alterations.push(Alteration::CreateTable(table)),
            Some(actual) => alterations.extend(
                diff(table, &actual)
                    .into_iter()
                    .map(|field| Alteration::AddColumn { table, field }),
            ),
        }
    }
    Ok(alterations)
}

/// Apply the migration plan and ensure indexes, all in one transaction.
/// Returns the number of alterations applied; zero once converged.
pub fn migrate(conn: &mut Connection, schema: &Schema) -> Result<usize> {
    let tx = conn.transaction()?;
    let alterations = plan(&tx, schema)?;
    for alteration in &alterations {
        tracing::info!(%alteration, "migrating schema");
        tx.execute_batch(&alteration.sql())?;
    }
    ensure_indices(&tx, schema)?;
    tx.commit()?;
    Ok(alterations.len())
}

fn ensure_indices(conn: &Connection, schema: &Schema) -> Result<()> {
    for table in schema.tables() {
        let columns = table_columns(conn, table.name)?.unwrap_or_default();
        for (index, column) in table.indices {
            if columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                conn.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {index} ON {}({column})",
                    table.name
                ))?;
            }
        }
    }
    Ok(())
}
