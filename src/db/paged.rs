//! Growable memory-mapped file with a typed header.
//!
//! A [`PagedFile`] owns one file mapped read/write and shared. The first 12
//! bytes are common to every format in the store: an 8-byte magic and a
//! little-endian `u32` version, both validated on open. The rest of the
//! header and the body are owned by the layer above (events log or index).
//!
//! Growth goes through [`PagedFile::ensure_capacity`]: the file is extended
//! with `set_len` and remapped, so the mapping's base address may change.
//! Nothing here hands out a long-lived pointer; all access is offset-based
//! through bounds-checked slices, re-derived after every growth.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;

use crate::db::constants::{FORMAT_VERSION, GROW_ALIGN};
use crate::{Result, StoreError};

/// One open, memory-mapped store file.
pub struct PagedFile {
    file: File,
    map: MmapMut,
    size: u64,
    path: PathBuf,
}

impl PagedFile {
    /// Open `path` if it exists, otherwise create it with `initial_size`
    /// bytes (mode 0600) and stamp the magic and version.
    ///
    /// Returns the handle and whether the file was created. On open the
    /// magic and version are validated; the caller validates the rest of
    /// its header.
    pub fn open_or_create(
        path: &Path,
        magic: &'static [u8; 8],
        initial_size: u64,
    ) -> Result<(Self, bool)> {
        debug_assert!(initial_size >= 12);

        if path.exists() {
            let paged = Self::open_existing(path, magic)?;
            Ok((paged, false))
        } else {
            let paged = Self::create(path, magic, initial_size)?;
            Ok((paged, true))
        }
    }

    fn open_existing(path: &Path, magic: &'static [u8; 8]) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::FileOpen(format!("{}: {}", path.display(), e)))?;

        let size = file
            .metadata()
            .map_err(|e| StoreError::FstatFailed(format!("{}: {}", path.display(), e)))?
            .len();
        if size < 12 {
            return Err(StoreError::InvalidMagic(format!(
                "{}: file is {} bytes, too small for a header",
                path.display(),
                size
            )));
        }

        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| StoreError::MmapFailed(format!("{}: {}", path.display(), e)))?;

        if &map[0..8] != magic {
            return Err(StoreError::InvalidMagic(format!(
                "{}: expected {:?}, found {:?}",
                path.display(),
                String::from_utf8_lossy(magic),
                String::from_utf8_lossy(&map[0..8])
            )));
        }
        let version = LittleEndian::read_u32(&map[8..12]);
        if version != FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        Ok(PagedFile {
            file,
            map,
            size,
            path: path.to_path_buf(),
        })
    }

    fn create(path: &Path, magic: &'static [u8; 8], initial_size: u64) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(path)
            .map_err(|e| StoreError::FileCreate(format!("{}: {}", path.display(), e)))?;

        file.set_len(initial_size)
            .map_err(|e| StoreError::FtruncateFailed(format!("{}: {}", path.display(), e)))?;

        let mut map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| StoreError::MmapFailed(format!("{}: {}", path.display(), e)))?;

        map[0..8].copy_from_slice(magic);
        LittleEndian::write_u32(&mut map[8..12], FORMAT_VERSION);

        Ok(PagedFile {
            file,
            map,
            size: initial_size,
            path: path.to_path_buf(),
        })
    }

    /// Current file (and mapping) size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// True if the mapping has no usable body. Never the case in practice.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The underlying file handle (advisory locking).
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Make sure the file can hold bytes up to `end`.
    ///
    /// Grows to `max(end, 2 * current)` rounded up to the 4 KiB growth
    /// granularity and remaps. A growth failure means the store cannot
    /// accept the write and is reported as [`StoreError::Full`].
    pub fn ensure_capacity(&mut self, end: u64) -> Result<()> {
        if end <= self.size {
            return Ok(());
        }

        let doubled = self.size.saturating_mul(2);
        let target = end.max(doubled);
        let new_size = target
            .checked_add(GROW_ALIGN - 1)
            .ok_or_else(|| StoreError::Full(format!("{}: size overflow", self.path.display())))?
            / GROW_ALIGN
            * GROW_ALIGN;

        self.file
            .set_len(new_size)
            .map_err(|e| StoreError::Full(format!("{}: {}", self.path.display(), e)))?;
        self.map = unsafe { MmapMut::map_mut(&self.file) }
            .map_err(|e| StoreError::MmapFailed(format!("{}: {}", self.path.display(), e)))?;
        self.size = new_size;
        Ok(())
    }

    /// Borrow `len` bytes starting at `offset`.
    ///
    /// An out-of-range request is an integrity violation in whatever
    /// structure produced the offset.
    pub fn slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                StoreError::IndexCorrupt(format!(
                    "{}: range {}+{} outside file of {} bytes",
                    self.path.display(),
                    offset,
                    len,
                    self.size
                ))
            })?;
        Ok(&self.map[offset as usize..end as usize])
    }

    /// Borrow `len` bytes starting at `offset`, mutably.
    pub fn slice_mut(&mut self, offset: u64, len: usize) -> Result<&mut [u8]> {
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= self.size)
            .ok_or_else(|| {
                StoreError::IndexCorrupt(format!(
                    "{}: range {}+{} outside file of {} bytes",
                    self.path.display(),
                    offset,
                    len,
                    self.size
                ))
            })?;
        Ok(&mut self.map[offset as usize..end as usize])
    }

    /// Flush the mapping to disk. `asynchronous` issues MS_ASYNC,
    /// otherwise MS_SYNC.
    pub fn sync(&self, asynchronous: bool) -> Result<()> {
        let result = if asynchronous {
            self.map.flush_async()
        } else {
            self.map.flush()
        };
        result.map_err(|e| StoreError::MmapFailed(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_MAGIC: &[u8; 8] = b"TESTMAG1";

    #[test]
    fn test_create_stamps_magic_and_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        let (paged, created) = PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
        assert!(created);
        assert_eq!(paged.len(), 4096);
        assert_eq!(paged.slice(0, 8).unwrap(), TEST_MAGIC);
        assert_eq!(
            LittleEndian::read_u32(paged.slice(8, 4).unwrap()),
            FORMAT_VERSION
        );
    }

    #[test]
    fn test_reopen_preserves_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        {
            let (mut paged, _) = PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
            paged.slice_mut(100, 5).unwrap().copy_from_slice(b"hello");
            paged.sync(false).unwrap();
        }

        let (paged, created) = PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
        assert!(!created);
        assert_eq!(paged.slice(100, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_open_rejects_wrong_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        {
            PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
        }
        let result = PagedFile::open_or_create(&path, b"OTHERMAG", 4096);
        assert!(matches!(result, Err(StoreError::InvalidMagic(_))));
    }

    #[test]
    fn test_open_rejects_wrong_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        {
            let (mut paged, _) = PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
            LittleEndian::write_u32(paged.slice_mut(8, 4).unwrap(), 99);
            paged.sync(false).unwrap();
        }
        let result = PagedFile::open_or_create(&path, TEST_MAGIC, 4096);
        assert!(matches!(
            result,
            Err(StoreError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: 99
            })
        ));
    }

    #[test]
    fn test_grow_preserves_old_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        let (mut paged, _) = PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
        paged.slice_mut(4000, 4).unwrap().copy_from_slice(b"keep");

        paged.ensure_capacity(100_000).unwrap();
        assert!(paged.len() >= 100_000);
        assert_eq!(paged.len() % GROW_ALIGN, 0);
        assert_eq!(paged.slice(4000, 4).unwrap(), b"keep");

        // New bytes are zeroed.
        assert!(paged.slice(50_000, 64).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_grow_at_least_doubles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        let (mut paged, _) = PagedFile::open_or_create(&path, TEST_MAGIC, 8192).unwrap();
        paged.ensure_capacity(8193).unwrap();
        assert!(paged.len() >= 16384);
    }

    #[test]
    fn test_slice_out_of_range_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        let (paged, _) = PagedFile::open_or_create(&path, TEST_MAGIC, 4096).unwrap();
        assert!(matches!(
            paged.slice(4090, 16),
            Err(StoreError::IndexCorrupt(_))
        ));
        assert!(matches!(
            paged.slice(u64::MAX, 8),
            Err(StoreError::IndexCorrupt(_))
        ));
    }
}
