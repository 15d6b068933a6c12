use std::{
    fs::File,
    io::Read,
    path::Path,
    rc::Rc,
};

/// FNV-1a 32-bit offset basis.
pub const FNV1A_OFFSET_BASIS_32: u32 = 0x811c_9dc5;
/// FNV-1a 32-bit prime.
pub const FNV1A_PRIME_32: u32 = 0x0100_0193;

/// Hashes a byte slice with 32-bit FNV-1a.
/// This is the content hash stored in every container,
/// it is a cache key and is not cryptographically secure.
pub const fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV1A_OFFSET_BASIS_32;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV1A_PRIME_32);
        i += 1;
    }
    hash
}

/// `Source` represents some literal script text,
/// whether a file on disk, a string embedded by the host,
/// or a snippet in a test. It's essentially a string with an identifier,
/// the identifier serving as the script's name in the script cache
/// and in tracebacks.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub identifier: String,
}

impl Source {
    /// Creates a new `Source` from its contents and identifier.
    pub fn new(contents: &str, identifier: &str) -> Rc<Source> {
        Rc::new(Source {
            contents: contents.to_string(),
            identifier: identifier.to_string(),
        })
    }

    /// Build a `Source` from a path.
    /// The file stem becomes the identifier.
    pub fn path(path: &Path) -> std::io::Result<Rc<Source>> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;

        let identifier = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Ok(Source::new(&contents, &identifier))
    }

    /// Build a `Source` containing just a string.
    /// Note that this source will be named `source`.
    pub fn source(contents: &str) -> Rc<Source> {
        Source::new(contents, "source")
    }

    /// The content hash of this source, see [`fnv1a32`].
    pub fn hash(&self) -> u32 {
        fnv1a32(self.contents.as_bytes())
    }

    /// Returns a single line of the source, without the newline.
    pub fn line(&self, line: usize) -> &str {
        self.contents.split('\n').nth(line).unwrap_or("").trim_end_matches('\r')
    }
}
