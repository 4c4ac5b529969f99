pub mod template;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::fields::{is_shared_album_field, PADDED_FIELDS};
use crate::record::{Album, Item, Value};
use crate::sanitize::{sanitize_segment, syspath, PathStyle};

use template::{Template, Token};

/// Longest segment most filesystems accept, in bytes.
pub const MAX_SEGMENT_LEN: usize = 255;

pub const DEFAULT_FORMAT: &str = "$albumartist/$album/$track $title";
pub const COMP_FORMAT: &str = "Compilations/$album/$track $title";

/// Template name → template string.
pub type PathFormats = BTreeMap<String, String>;

pub fn default_path_formats() -> PathFormats {
    PathFormats::from([
        ("default".to_string(), DEFAULT_FORMAT.to_string()),
        ("comp".to_string(), COMP_FORMAT.to_string()),
    ])
}

/// Pick the template for `item`: `comp` for compilation tracks when
/// configured, otherwise `default`, otherwise the built-in default.
pub fn select_format<'a>(item: &Item, formats: &'a PathFormats) -> &'a str {
    if item.flag("comp").unwrap_or(false) {
        if let Some(format) = formats.get("comp") {
            return format;
        }
    }
    formats
        .get("default")
        .map(String::as_str)
        .unwrap_or(DEFAULT_FORMAT)
}

/// Compute where `item`'s file belongs below `root`.
///
/// Album-level fields come from `album` when given so that every track of
/// an album lands in the same directory. Separators inside field values are
/// replaced, never treated as structure.
pub fn resolve(
    item: &Item,
    album: Option<&Album>,
    root: &[u8],
    formats: &PathFormats,
    style: PathStyle,
) -> Result<Vec<u8>> {
    let template = Template::parse(select_format(item, formats));

    let mut segments = vec![Segment::default()];
    for token in template.tokens() {
        match token {
            Token::Literal(text) => {
                for (i, part) in text.as_bytes().split(|b| style.is_separator(*b)).enumerate() {
                    if i > 0 {
                        segments.push(Segment::default());
                    }
                    current(&mut segments).bytes.extend_from_slice(part);
                }
            }
            Token::Field(name) => {
                let value = field_value(item, album, name)?;
                let segment = current(&mut segments);
                segment.bytes.extend(render(name, value));
                segment.has_field = true;
            }
        }
    }
    segments.retain(|s| s.has_field || !s.bytes.is_empty());
    if segments.is_empty() {
        // The file name itself becomes the placeholder.
        segments.push(Segment::default());
    }

    let extension = match item.bytes("path") {
        Ok(path) => extension(path, style).map(|ext| replace_illegal(ext, style)),
        Err(_) => None,
    };

    let last = segments.len().saturating_sub(1);
    let mut relative = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            relative.push(style.separator());
        }
        let clean = sanitize_segment(&segment.bytes, style);
        if i == last {
            relative.extend(file_name(&clean, extension.as_deref(), style));
        } else {
            relative.extend(sanitize_segment(truncate(&clean, MAX_SEGMENT_LEN), style));
        }
    }

    let joined = join_root(root, &relative, style);
    if style == PathStyle::Windows && style.is_absolute(root) {
        Ok(syspath(&joined, style))
    } else {
        Ok(joined)
    }
}

/// Where album art belongs: next to the item, named `art_filename` plus the
/// extension of the source image.
pub fn art_destination(
    item_path: &[u8],
    art_filename: &str,
    image_path: &[u8],
    style: PathStyle,
) -> Vec<u8> {
    let extension = extension(image_path, style).map(|ext| replace_illegal(ext, style));
    let name = file_name(
        &sanitize_segment(art_filename.as_bytes(), style),
        extension.as_deref(),
        style,
    );
    match item_path.iter().rposition(|b| style.is_separator(*b)) {
        Some(0) => [&[style.separator()][..], &name[..]].concat(),
        Some(end) => {
            let mut out = item_path[..end].to_vec();
            out.push(style.separator());
            out.extend(name);
            out
        }
        None => name,
    }
}

#[derive(Default)]
struct Segment {
    bytes: Vec<u8>,
    has_field: bool,
}

fn current(segments: &mut [Segment]) -> &mut Segment {
    let last = segments.len() - 1;
    &mut segments[last]
}

fn field_value<'a>(item: &'a Item, album: Option<&'a Album>, name: &str) -> Result<&'a Value> {
    if let Some(album) = album {
        if is_shared_album_field(name) && album.has_field(name) {
            return album.get(name);
        }
    }
    let value = item.get(name)?;
    // Same fallback as the album key.
    if name == "albumartist" && value.as_str() == Some("") {
        return item.get("artist");
    }
    Ok(value)
}

fn render(name: &str, value: &Value) -> Vec<u8> {
    match value {
        Value::Integer(i) if PADDED_FIELDS.contains(&name) => format!("{i:02}").into_bytes(),
        value => value.to_path_bytes(),
    }
}

/// Extension of the last component of `path`, including the dot. Names that
/// only start with a dot have none.
fn extension(path: &[u8], style: PathStyle) -> Option<&[u8]> {
    let start = path
        .iter()
        .rposition(|b| style.is_separator(*b))
        .map_or(0, |i| i + 1);
    let name = &path[start..];
    match name.iter().rposition(|b| *b == b'.') {
        None | Some(0) => None,
        Some(dot) => Some(&name[dot..]),
    }
}

fn replace_illegal(extension: &[u8], style: PathStyle) -> Vec<u8> {
    // The dot is kept; only the remainder goes through the segment rules.
    let mut out = vec![b'.'];
    if extension.len() > 1 {
        out.extend(sanitize_segment(&extension[1..], style));
    }
    out
}

/// Final segment: stem truncated so that stem plus extension fit.
fn file_name(stem: &[u8], extension: Option<&[u8]>, style: PathStyle) -> Vec<u8> {
    match extension {
        Some(ext) if ext.len() < MAX_SEGMENT_LEN => {
            let stem = sanitize_segment(truncate(stem, MAX_SEGMENT_LEN - ext.len()), style);
            [&stem[..], ext].concat()
        }
        Some(ext) => truncate(&[stem, ext].concat(), MAX_SEGMENT_LEN).to_vec(),
        None => sanitize_segment(truncate(stem, MAX_SEGMENT_LEN), style),
    }
}

/// Cut `bytes` to at most `max` bytes, backing off to a character boundary
/// when the input is UTF-8.
fn truncate(bytes: &[u8], max: usize) -> &[u8] {
    if bytes.len() <= max {
        return bytes;
    }
    let mut end = max;
    if std::str::from_utf8(bytes).is_ok() {
        while end > 0 && (bytes[end] & 0xC0) == 0x80 {
            end -= 1;
        }
    }
    &bytes[..end]
}

/// `root` without trailing separators, followed by `relative`.
fn join_root(root: &[u8], relative: &[u8], style: PathStyle) -> Vec<u8> {
    let sep = style.separator();
    let root: Vec<u8> = root
        .iter()
        .map(|&b| if style.is_separator(b) { sep } else { b })
        .collect();
    let kept = root.iter().rposition(|b| *b != sep).map_or(0, |i| i + 1);

    let mut out = root[..kept].to_vec();
    if kept > 0 || !root.is_empty() {
        out.push(sep);
    }
    out.extend_from_slice(relative);
    out
}

/// Raw bytes of a filesystem path.
#[cfg(unix)]
pub fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
pub fn path_to_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
pub fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}
