pub mod catalog;
pub mod config;
pub mod destination;
pub mod error;
pub mod record;
pub mod sanitize;

use destination::path_to_bytes;

pub use catalog::{AlbumLookup, Catalog, Records};
pub use config::LibraryConfig;
pub use error::{Error, Result};
pub use record::{Album, Entity, FieldDef, FieldType, Item, Record, RecordKind, Value};
pub use sanitize::PathStyle;

/// The main entry point: a catalog plus the settings that decide where its
/// files belong.
pub struct Library {
    catalog: Catalog,
    config: LibraryConfig,
}

impl Library {
    /// Open or create the library database named by `config`.
    pub fn open(config: LibraryConfig) -> Result<Self> {
        let catalog = Catalog::open(&config.database)?;
        Ok(Self { catalog, config })
    }

    /// Open a library backed by an in-memory database (for testing).
    pub fn open_in_memory(config: LibraryConfig) -> Result<Self> {
        let catalog = Catalog::open_in_memory()?;
        Ok(Self { catalog, config })
    }

    pub fn from_catalog(catalog: Catalog, config: LibraryConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Destination of `item` under the library directory, using the
    /// configured path style.
    pub fn destination(&self, item: &Item) -> Result<Vec<u8>> {
        self.destination_with_style(item, self.config.path_style())
    }

    /// Destination of `item` for an explicit path style. Album-level values
    /// come from the item's album when it has one.
    pub fn destination_with_style(&self, item: &Item, style: PathStyle) -> Result<Vec<u8>> {
        let album = self.catalog.get_album(item)?;
        destination::resolve(
            item,
            album.as_ref(),
            &path_to_bytes(&self.config.directory),
            &self.config.path_formats,
            style,
        )
    }

    /// Where art copied from `image_path` belongs for `album`: the directory
    /// of its first item. `None` when the album has no items.
    pub fn art_destination(&self, album: &Album, image_path: &[u8]) -> Result<Option<Vec<u8>>> {
        let items = self.catalog.album_items(album)?;
        let Some(first) = items.first() else {
            return Ok(None);
        };
        Ok(Some(destination::art_destination(
            first.path()?,
            &self.config.art_filename,
            image_path,
            self.config.path_style(),
        )))
    }

    pub fn close(self) -> Result<()> {
        self.catalog.close()
    }
}
