use serde::Deserialize;

/// Filesystem naming convention targeted by sanitization and destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    Posix,
    Windows,
}

impl PathStyle {
    /// The convention of the running platform.
    pub fn host() -> Self {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Posix
        }
    }

    pub fn separator(self) -> u8 {
        match self {
            PathStyle::Posix => b'/',
            PathStyle::Windows => b'\\',
        }
    }

    pub fn is_separator(self, byte: u8) -> bool {
        match self {
            PathStyle::Posix => byte == b'/',
            PathStyle::Windows => byte == b'/' || byte == b'\\',
        }
    }

    fn is_illegal(self, byte: u8) -> bool {
        match self {
            PathStyle::Posix => byte == b'/' || byte == 0,
            PathStyle::Windows => {
                byte < 0x20 || matches!(byte, b'\\' | b'/' | b':' | b'*' | b'?' | b'"' | b'<' | b'>' | b'|')
            }
        }
    }

    /// Whether `path` is absolute under this convention.
    pub fn is_absolute(self, path: &[u8]) -> bool {
        match self {
            PathStyle::Posix => path.first() == Some(&b'/'),
            PathStyle::Windows => match path {
                [drive, b':', sep, ..] => drive.is_ascii_alphabetic() && self.is_separator(*sep),
                [a, b, ..] => self.is_separator(*a) && self.is_separator(*b),
                _ => false,
            },
        }
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::host()
    }
}

const REPLACEMENT: u8 = b'-';
const LEADING_DOT_REPLACEMENT: u8 = b'_';

/// Make a single path segment legal under `style`.
///
/// Illegal bytes become `-`, a leading `.` becomes `_`, and under Windows
/// trailing dots and whitespace are stripped. An empty result becomes `-`.
/// Bytes not matched by a rule, including non-UTF-8 ones, pass through.
pub fn sanitize_segment(segment: &[u8], style: PathStyle) -> Vec<u8> {
    let mut out: Vec<u8> = segment
        .iter()
        .map(|&b| if style.is_illegal(b) { REPLACEMENT } else { b })
        .collect();

    if out.first() == Some(&b'.') {
        out[0] = LEADING_DOT_REPLACEMENT;
    }

    if style == PathStyle::Windows {
        while matches!(out.last(), Some(b) if *b == b'.' || b.is_ascii_whitespace()) {
            out.pop();
        }
    }

    if out.is_empty() {
        out.push(REPLACEMENT);
    }
    out
}

/// Sanitize every segment of a relative or absolute path and rejoin the
/// segments with the style's separator. Empty segments are dropped.
pub fn sanitize_path(path: &[u8], style: PathStyle) -> Vec<u8> {
    let sep = style.separator();
    let mut out = Vec::with_capacity(path.len());
    if path.first().is_some_and(|b| style.is_separator(*b)) {
        out.push(sep);
    }
    let mut first = true;
    for segment in path.split(|b| style.is_separator(*b)).filter(|s| !s.is_empty()) {
        if !first {
            out.push(sep);
        }
        out.extend(sanitize_segment(segment, style));
        first = false;
    }
    out
}

const EXTENDED_PREFIX: &[u8] = br"\\?\";
const EXTENDED_UNC_PREFIX: &[u8] = br"\\?\UNC\";

/// The form of `path` handed to the operating system. Under Windows this is
/// the extended-length form, which lifts the 260 character limit; POSIX
/// paths are returned unchanged.
pub fn syspath(path: &[u8], style: PathStyle) -> Vec<u8> {
    if style == PathStyle::Posix || path.starts_with(EXTENDED_PREFIX) {
        return path.to_vec();
    }
    let normalized: Vec<u8> = path
        .iter()
        .map(|&b| if b == b'/' { b'\\' } else { b })
        .collect();
    let mut out;
    if let Some(unc) = normalized.strip_prefix(br"\\") {
        out = EXTENDED_UNC_PREFIX.to_vec();
        out.extend_from_slice(unc);
    } else {
        out = EXTENDED_PREFIX.to_vec();
        out.extend_from_slice(&normalized);
    }
    out
}
