//! # Index — memory-mapped offset table
//!
//! The index is the lookup half of a log segment: a fixed-width table mapping
//! each record's offset (relative to the segment's base) to the byte position
//! of its frame in the store file.
//!
//! ## Entry Format
//!
//! ```text
//! ┌──────────────────┬───────────────────────────┐
//! │ relative offset  │         position          │
//! │     u32 LE       │          u64 LE           │
//! └──────────────────┴───────────────────────────┘
//! |<------ 4B ------>|<----------- 8B ---------->|
//! |<------------- 12B per entry --------------->|
//! ```
//!
//! Entries are dense: entry `k` always holds relative offset `k`, and
//! positions strictly increase along the table.
//!
//! ## Mapping & File Length
//!
//! The file is pre-extended to `max_index_bytes` before mapping, because the
//! mapping cannot grow the file afterwards. A clean [`close`](Index::close)
//! syncs the map and truncates the file back to `size`, so on a clean reopen
//! the file length equals the number of valid bytes. A file still at its
//! pre-allocated length (or misaligned) therefore signals an unclean
//! shutdown; such an index reports [`needs_rebuild`](Index::needs_rebuild)
//! and must be reconstructed from the store before use.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Width of the relative-offset column.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the position column.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A read past the last entry (or from an empty index).
    #[error("end of index table")]
    EndOfTable,

    /// No room in the mapping for another entry.
    #[error("index full")]
    Full,

    /// An underlying I/O, mapping, or sync error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Memory-mapped table of `(relative_offset, position)` entries.
///
/// The index is exclusively owned by its segment; reads take `&self`, writes
/// `&mut self`. The containing log's reader/writer lock provides the
/// cross-thread discipline.
pub struct Index {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
    /// Bytes of valid entries; the next entry is written here.
    size: u64,
    needs_rebuild: bool,
    finalized: bool,
}

impl Index {
    /// Opens (or creates) an index file, pre-extends it to `max_index_bytes`,
    /// and maps it read/write.
    ///
    /// The previous `size` is recovered from the on-disk length. If that
    /// length is misaligned or still equals the pre-allocated length — the
    /// signature of a crash before the close-time truncation — the index is
    /// flagged [`needs_rebuild`](Index::needs_rebuild) and `size` starts at
    /// zero so a rebuild can rewrite it from scratch.
    pub fn open<P: AsRef<Path>>(path: P, max_index_bytes: u64) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let on_disk = file.metadata()?.len();
        let needs_rebuild =
            on_disk > 0 && (on_disk >= max_index_bytes || on_disk % ENTRY_WIDTH != 0);

        file.set_len(max_index_bytes)?;

        // SAFETY: the file is held open for the lifetime of the mapping and
        // the data directory is exclusive to this process; all accesses are
        // bounds-checked against the mapping length.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            file,
            mmap,
            path,
            size: if needs_rebuild { 0 } else { on_disk },
            needs_rebuild,
            finalized: false,
        })
    }

    /// True if the on-disk file showed the signature of an unclean shutdown.
    /// The owning segment must rebuild the entries from the store before
    /// trusting any read.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Reads entry `i`, returning `(relative_offset, position)`.
    ///
    /// `i == -1` denotes the last entry. Fails [`IndexError::EndOfTable`] on
    /// an empty index or a read past the last entry.
    pub fn read(&self, i: i64) -> Result<(u32, u64), IndexError> {
        if self.size == 0 {
            return Err(IndexError::EndOfTable);
        }

        let i = if i == -1 {
            (self.size / ENTRY_WIDTH) as i64 - 1
        } else {
            i
        };
        if i < 0 {
            return Err(IndexError::EndOfTable);
        }

        let start = i as u64 * ENTRY_WIDTH;
        if start + ENTRY_WIDTH > self.size {
            return Err(IndexError::EndOfTable);
        }

        let entry = &self.mmap[start as usize..(start + ENTRY_WIDTH) as usize];
        let rel = LittleEndian::read_u32(&entry[..OFFSET_WIDTH as usize]);
        let pos = LittleEndian::read_u64(&entry[OFFSET_WIDTH as usize..]);
        Ok((rel, pos))
    }

    /// Appends an entry, failing [`IndexError::Full`] when the mapping has no
    /// room for another one.
    pub fn write(&mut self, rel: u32, pos: u64) -> Result<(), IndexError> {
        if self.size + ENTRY_WIDTH > self.mmap.len() as u64 {
            return Err(IndexError::Full);
        }

        let start = self.size as usize;
        LittleEndian::write_u32(&mut self.mmap[start..start + OFFSET_WIDTH as usize], rel);
        LittleEndian::write_u64(
            &mut self.mmap[start + OFFSET_WIDTH as usize..start + ENTRY_WIDTH as usize],
            pos,
        );

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Bytes of valid entries (`size / 12` is the entry count).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True once the mapping cannot hold another entry.
    pub fn is_full(&self) -> bool {
        self.size + ENTRY_WIDTH > self.mmap.len() as u64
    }

    /// Syncs the mapping and file, truncates the file back to `size`, and
    /// closes it. The truncation is what lets a later open distinguish a
    /// clean shutdown from a crash.
    pub fn close(mut self) -> Result<(), IndexError> {
        self.finalize()
    }

    /// Closes the index and deletes the file from disk.
    pub fn remove(mut self) -> Result<(), IndexError> {
        self.finalize()?;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), IndexError> {
        if self.finalized {
            return Ok(());
        }
        self.mmap.flush()?;
        self.file.sync_all()?;
        self.file.set_len(self.size)?;
        self.finalized = true;
        Ok(())
    }
}

impl Drop for Index {
    /// Best-effort finalisation for indexes dropped without an explicit
    /// [`close`](Index::close). If this fails, the next open simply sees the
    /// pre-allocated length and rebuilds.
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}
