use std::path::Path;

use tunevault_core::catalog::schema::Schema;
use tunevault_core::destination::bytes_to_path;
use tunevault_core::{Catalog, FieldDef, FieldType, Item, Library, LibraryConfig, PathStyle, Value};

fn config(root: &Path) -> LibraryConfig {
    LibraryConfig {
        database: root.join("library.db"),
        directory: root.join("music"),
        path_style: Some(PathStyle::Posix),
        ..LibraryConfig::default()
    }
}

fn track(title: &str, artist: &str, album: &str, track: i64) -> Item {
    let mut item = Item::new();
    item.set_title(title).unwrap();
    item.set_artist(artist).unwrap();
    item.set_album(album).unwrap();
    item.set_track(track).unwrap();
    item.set_path(format!("/incoming/{title}.mp3").into_bytes()).unwrap();
    item
}

// ── Library::open ────────────────────────────────────────────────

#[test]
fn test_library_open_creates_database() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config(tmp.path());
    config.database = tmp.path().join("sub/dir/library.db");

    let library = Library::open(config.clone()).unwrap();
    assert!(config.database.exists());
    library.close().unwrap();
}

#[test]
fn test_library_open_reopen_persists() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut library = Library::open(config(tmp.path())).unwrap();
        let mut items = vec![track("one", "artist", "record", 1), track("two", "artist", "record", 2)];
        library.catalog_mut().add_album(&mut items).unwrap();
        library.close().unwrap();
    }

    let library = Library::open(config(tmp.path())).unwrap();
    let items: Vec<Item> = library.catalog().items().collect::<Result<_, _>>().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(library.catalog().albums().count(), 1);
    assert_eq!(items[1].title().unwrap(), "two");
}

#[test]
fn test_library_from_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "database = \"{}\"\ndirectory = \"/srv/music\"\npath_style = \"posix\"\n\n[path_formats]\ndefault = \"$artist/$title\"\n",
            tmp.path().join("library.db").display()
        ),
    )
    .unwrap();

    let library = Library::open(LibraryConfig::load(&path).unwrap()).unwrap();
    let item = track("song", "someone", "record", 1);
    assert_eq!(library.destination(&item).unwrap(), b"/srv/music/someone/song.mp3");
}

// ── Migration ────────────────────────────────────────────────────

#[test]
fn test_reopen_with_wider_schema_adds_columns() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("library.db");
    let narrow = || {
        Schema::default().with_item_fields([
            FieldDef::new("field_one", FieldType::Integer),
            FieldDef::new("field_two", FieldType::Integer),
        ])
    };

    let id = {
        let mut catalog = Catalog::open_with_schema(&db, narrow()).unwrap();
        let mut record = catalog.new_item();
        record.set("field_one", 1).unwrap();
        record.set("field_two", 2).unwrap();
        let id = catalog.add(&mut record).unwrap();
        catalog.close().unwrap();
        id
    };

    let wide = narrow().with_item_fields([
        FieldDef::new("field_one", FieldType::Integer),
        FieldDef::new("field_two", FieldType::Integer),
        FieldDef::new("field_three", FieldType::Integer),
    ]);
    let mut catalog = Catalog::open_with_schema(&db, wide).unwrap();
    let mut record = catalog.items().next().unwrap().unwrap();
    assert_eq!(record.id(), Some(id));
    assert_eq!(record.integer("field_one").unwrap(), 1);
    assert_eq!(record.integer("field_three").unwrap(), 0);

    record.set("field_three", 3).unwrap();
    catalog.store(&mut record).unwrap();
    catalog.load(&mut record).unwrap();
    assert_eq!(record.integer("field_three").unwrap(), 3);
}

#[test]
fn test_reopen_with_narrower_schema_keeps_data() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("library.db");
    {
        let mut catalog = Catalog::open(&db).unwrap();
        catalog.add(&mut track("kept", "artist", "record", 1)).unwrap();
        catalog.close().unwrap();
    }

    let narrow = Schema::default().with_item_fields([FieldDef::new("title", FieldType::Text)]);
    {
        let catalog = Catalog::open_with_schema(&db, narrow).unwrap();
        let item = catalog.items().next().unwrap().unwrap();
        assert_eq!(item.title().unwrap(), "kept");
        assert!(!item.has_field("artist"));
        catalog.close().unwrap();
    }

    let catalog = Catalog::open(&db).unwrap();
    let item = catalog.items().next().unwrap().unwrap();
    assert_eq!(item.artist().unwrap(), "artist");
}

// ── Albums ───────────────────────────────────────────────────────

#[test]
fn test_albums_deduplicated_by_key() {
    let mut library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let catalog = library.catalog_mut();
    let first = catalog.add_album(&mut [track("one", "artist", "record", 1)]).unwrap();
    let again = catalog.add_album(&mut [track("two", "artist", "record", 2)]).unwrap();
    let other = catalog.add_album(&mut [track("three", "artist", "other", 1)]).unwrap();

    assert_eq!(first.id(), again.id());
    assert_ne!(first.id(), other.id());
    assert_eq!(catalog.albums().count(), 2);
    assert_eq!(catalog.album_items(&first).unwrap().len(), 2);
}

#[test]
fn test_album_rename_moves_items() {
    let mut library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let mut items = vec![track("one", "artist", "record", 1), track("two", "artist", "record", 2)];
    let mut album = library.catalog_mut().add_album(&mut items).unwrap();

    album.set_album("renamed record").unwrap();
    library.catalog_mut().store(&mut album).unwrap();

    let catalog = library.catalog();
    let mut item = items.remove(0);
    catalog.load(&mut item).unwrap();
    assert_eq!(item.album().unwrap(), "renamed record");
    assert_eq!(catalog.get_album(&item).unwrap().unwrap().id(), album.id());
    assert_eq!(
        library.destination(&item).unwrap(),
        b"/lib/music/artist/renamed record/01 one.mp3"
    );
}

#[test]
fn test_remove_album_removes_items() {
    let mut library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let catalog = library.catalog_mut();
    let album = catalog
        .add_album(&mut [track("one", "artist", "record", 1), track("two", "artist", "record", 2)])
        .unwrap();
    catalog.remove(&album).unwrap();

    assert_eq!(catalog.items().count(), 0);
    assert!(catalog.get_album(album.id().unwrap()).unwrap().is_none());
}

// ── Destinations ─────────────────────────────────────────────────

#[test]
fn test_album_members_share_directory() {
    let mut catalog = Catalog::open_in_memory().unwrap();
    let mut first = track("one", "artist", "record", 1);
    first.set_year(2001).unwrap();
    catalog.add_album(&mut [first]).unwrap();

    let mut config = config(Path::new("/lib"));
    config
        .path_formats
        .insert("default".to_string(), "$album ($year)/$track $title".to_string());
    let library = Library::from_catalog(catalog, config);

    // Tracks disagreeing on an album-level field still share the album's value.
    let mut one = track("one", "artist", "record", 1);
    one.set_year(2009).unwrap();
    let mut two = track("two", "artist", "record", 2);
    two.set_year(2010).unwrap();

    let dir = |item: &Item| {
        let dest = library.destination(item).unwrap();
        bytes_to_path(&dest).parent().unwrap().to_path_buf()
    };
    assert_eq!(dir(&one), dir(&two));
    assert_eq!(dir(&one), Path::new("/lib/music/record (2001)"));
}

#[test]
fn test_destination_without_album_uses_item_values() {
    let library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let mut item = track("solo", "artist", "single", 7);
    item.set_path(b"/incoming/solo.FLAC".to_vec()).unwrap();
    assert_eq!(library.destination(&item).unwrap(), b"/lib/music/artist/single/07 solo.FLAC");
}

#[test]
fn test_compilation_destination() {
    let library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let mut item = track("hit", "various", "Best Of", 3);
    item.set_comp(true).unwrap();
    assert_eq!(library.destination(&item).unwrap(), b"/lib/music/Compilations/Best Of/03 hit.mp3");
}

#[test]
fn test_destination_windows_style() {
    let library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let item = track("what?", "AC/DC", "record.", 1);
    let dest = library.destination_with_style(&item, PathStyle::Windows).unwrap();
    assert!(dest.ends_with(br"\AC-DC\record\01 what-.mp3"), "{}", String::from_utf8_lossy(&dest));
}

#[test]
fn test_art_destination_in_item_directory() {
    let mut library = Library::open_in_memory(LibraryConfig {
        art_filename: "artimage".to_string(),
        ..config(Path::new("/lib"))
    })
    .unwrap();

    let mut item = track("one", "artist", "record", 1);
    let dest = library.destination(&item).unwrap();
    item.set_path(dest.clone()).unwrap();
    let album = library.catalog_mut().add_album(&mut [item]).unwrap();

    let art = library.art_destination(&album, b"/tmp/something.jpg").unwrap().unwrap();
    assert_eq!(art, b"/lib/music/artist/record/artimage.jpg");
    assert_eq!(bytes_to_path(&art).parent(), bytes_to_path(&dest).parent());
}

#[test]
fn test_art_destination_none_without_items() {
    let mut library = Library::open_in_memory(config(Path::new("/lib"))).unwrap();
    let catalog = library.catalog_mut();
    let album = catalog.add_album(&mut [track("one", "artist", "record", 1)]).unwrap();
    let item = catalog.album_items(&album).unwrap().remove(0);
    catalog.remove(&item).unwrap();

    assert!(library.art_destination(&album, b"cover.png").unwrap().is_none());
}

// ── Byte-exact paths ─────────────────────────────────────────────

#[test]
fn test_non_utf8_path_survives_store_and_load() {
    let tmp = tempfile::tempdir().unwrap();
    let raw = b"/music/caf\xe9/\xff\xfe.mp3".to_vec();
    let id = {
        let mut library = Library::open(config(tmp.path())).unwrap();
        let mut item = track("bytes", "artist", "record", 1);
        item.set_path(raw.clone()).unwrap();
        let id = library.catalog_mut().add(&mut item).unwrap();
        library.close().unwrap();
        id
    };

    let library = Library::open(config(tmp.path())).unwrap();
    let mut item = Item::new();
    item.load([("id", Value::from(id))]);
    library.catalog().load(&mut item).unwrap();
    assert_eq!(item.path().unwrap(), raw.as_slice());
}

#[test]
fn test_store_writes_only_dirty_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let mut library = Library::open(config(tmp.path())).unwrap();
    let mut item = track("one", "artist", "record", 1);
    library.catalog_mut().add(&mut item).unwrap();

    // A second handle on the same row changes another field.
    let mut other = item.clone();
    other.set_genre("Jazz").unwrap();
    library.catalog_mut().store(&mut other).unwrap();

    item.set_title("retitled").unwrap();
    library.catalog_mut().store(&mut item).unwrap();

    let mut fresh = item.clone();
    library.catalog().load(&mut fresh).unwrap();
    assert_eq!(fresh.title().unwrap(), "retitled");
    assert_eq!(fresh.genre().unwrap(), "Jazz");
}
