//! Archive decoder interface and the host-side in-memory archive
//!
//! Names in an archive are relative paths without a leading separator
//! (`scripts/init.lua`). Decompressed buffers carry a trailing NUL so a
//! whole-file load can hand them out as text without copying.
//!
//! ## Image Format
//! ```text
//! +----------------+---------------------------------------------+
//! | Image          | version: u32, entries: Vec<ImageEntry>      |
//! | ImageEntry     | name: String, crc: u32, data: Vec<u8>       |
//! +----------------+---------------------------------------------+
//! ```
//! Serialized with bincode; each entry's CRC-32 covers `data` and is checked
//! on load.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FsError, Result};

/// Current image format version
pub const IMAGE_VERSION: u32 = 1;

/// Read-only archive decoder
pub trait Archive: Send + Sync {
    /// Decompressed contents of `name` followed by a NUL byte
    fn find_decompress(&self, name: &str) -> Option<Bytes>;

    /// Size of `name` without decompressing it
    fn find_size(&self, name: &str) -> Option<u64>;

    /// Next full name below `dir`, advancing `cursor`
    ///
    /// Each sub-directory is reported once, through the first name found
    /// inside it. `dir` is `""` for the archive root.
    fn dir_list(&self, dir: &str, cursor: &mut usize) -> Option<&str>;
}

// =============================================================================
// Memory Archive
// =============================================================================

#[derive(Debug, Clone)]
struct ArchiveEntry {
    name: String,
    /// Contents plus the trailing NUL
    data: Bytes,
}

/// Archive held entirely in memory, sorted by name
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Vec<ArchiveEntry>,
}

impl MemoryArchive {
    pub fn builder() -> MemoryArchiveBuilder {
        MemoryArchiveBuilder::default()
    }

    /// Number of files in the archive
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All file names in listing order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    fn find(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()
            .map(|index| &self.entries[index])
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Decode an image, verifying every entry's checksum
    pub fn from_image(bytes: &[u8]) -> Result<Self> {
        let image: Image =
            bincode::deserialize(bytes).map_err(|e| FsError::Image(e.to_string()))?;
        if image.version != IMAGE_VERSION {
            return Err(FsError::Image(format!(
                "unsupported image version {}",
                image.version
            )));
        }

        let mut builder = Self::builder();
        for entry in image.entries {
            let crc = crc32fast::hash(&entry.data);
            if crc != entry.crc {
                return Err(FsError::Image(format!(
                    "checksum mismatch in {}: expected {:08x}, got {:08x}",
                    entry.name, entry.crc, crc
                )));
            }
            builder = builder.file(&entry.name, entry.data);
        }
        Ok(builder.build())
    }

    /// Encode the archive as an image
    pub fn to_image(&self) -> Result<Vec<u8>> {
        let image = Image {
            version: IMAGE_VERSION,
            entries: self
                .entries
                .iter()
                .map(|entry| {
                    let data = entry.data[..entry.data.len() - 1].to_vec();
                    ImageEntry {
                        name: entry.name.clone(),
                        crc: crc32fast::hash(&data),
                        data,
                    }
                })
                .collect(),
        };
        bincode::serialize(&image).map_err(|e| FsError::Image(e.to_string()))
    }

    /// Load an image file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let archive = Self::from_image(&fs::read(path)?)?;
        debug!(path = %path.display(), files = archive.len(), "archive image loaded");
        Ok(archive)
    }

    /// Write an image file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_image()?)?;
        debug!(path = %path.display(), files = self.len(), "archive image saved");
        Ok(())
    }
}

impl Archive for MemoryArchive {
    fn find_decompress(&self, name: &str) -> Option<Bytes> {
        self.find(name).map(|entry| entry.data.clone())
    }

    fn find_size(&self, name: &str) -> Option<u64> {
        self.find(name).map(|entry| entry.data.len() as u64 - 1)
    }

    fn dir_list(&self, dir: &str, cursor: &mut usize) -> Option<&str> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        while let Some(entry) = self.entries.get(*cursor) {
            *cursor += 1;
            let Some(rest) = entry.name.strip_prefix(prefix.as_str()) else {
                continue;
            };
            // Names are sorted, so an earlier name in the same sub-directory
            // is always the one immediately before
            if let Some((child, _)) = rest.split_once('/') {
                let seen = *cursor >= 2
                    && self.entries[*cursor - 2]
                        .name
                        .strip_prefix(prefix.as_str())
                        .and_then(|prev| prev.split_once('/'))
                        .is_some_and(|(prev_child, _)| prev_child == child);
                if seen {
                    continue;
                }
            }
            return Some(entry.name.as_str());
        }
        None
    }
}

/// Collects files for a [`MemoryArchive`]
#[derive(Debug, Default)]
pub struct MemoryArchiveBuilder {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryArchiveBuilder {
    /// Add or replace a file; leading separators are dropped from the name
    pub fn file(mut self, name: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(name.trim_start_matches('/').to_string(), contents.into());
        self
    }

    pub fn build(self) -> MemoryArchive {
        let entries = self
            .files
            .into_iter()
            .map(|(name, mut data)| {
                data.push(0);
                ArchiveEntry {
                    name,
                    data: Bytes::from(data),
                }
            })
            .collect();
        MemoryArchive { entries }
    }
}

#[derive(Serialize, Deserialize)]
struct Image {
    version: u32,
    entries: Vec<ImageEntry>,
}

#[derive(Serialize, Deserialize)]
struct ImageEntry {
    name: String,
    crc: u32,
    data: Vec<u8>,
}
