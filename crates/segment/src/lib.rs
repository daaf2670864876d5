//! # Segment — one store + one index under a base offset
//!
//! A segment binds the two halves of the on-disk format together. For a
//! segment with base offset `B` the log directory holds `B.store` (framed
//! record bytes) and `B.index` (the memory-mapped offset table). The segment
//! stamps offsets on append, translates absolute offsets to relative ones on
//! read, and reports fullness so the log can roll to a successor.
//!
//! ## Offsets
//!
//! The set of offsets stored in a segment is exactly
//! `[base_offset, next_offset)`. `next_offset` is derived from the index on
//! open: one past the last entry's relative offset, or `base_offset` for an
//! empty segment.
//!
//! ## Recovery
//!
//! The store is the source of truth; the index is a rebuildable cache. On
//! open:
//!
//! 1. If the index file shows an unclean shutdown (see
//!    [`Index::needs_rebuild`]), the store is walked frame by frame and the
//!    index rewritten from scratch. The walk stops at the first torn or
//!    corrupt frame.
//! 2. The store is then truncated to the end of the last indexed frame,
//!    dropping torn tails and any orphan left by an append whose index write
//!    failed.

mod record;

pub use record::{CodecError, Record};

use index::{Index, IndexError};
use std::io;
use std::path::{Path, PathBuf};
use store::{Store, StoreError, LEN_WIDTH};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Per-segment configuration, shared by every segment of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Store size at which the segment reports full.
    pub max_store_bytes: u64,
    /// Index size at which the segment reports full; also the pre-allocated
    /// index file length.
    pub max_index_bytes: u64,
    /// Base offset of a log's first segment when its directory is empty.
    /// Ignored by the segment itself.
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: MIB,
            max_index_bytes: MIB,
            initial_offset: 0,
        }
    }
}

/// Errors that can occur during segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("index: {0}")]
    Index(#[from] IndexError),

    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

impl SegmentError {
    /// True for the index's "no such entry" failure, which the log maps to
    /// its offset-out-of-range error.
    pub fn is_end_of_table(&self) -> bool {
        matches!(self, SegmentError::Index(IndexError::EndOfTable))
    }
}

/// One store + one index under a common base offset.
pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Opens (or creates) the segment files for `base_offset` in `dir`, runs
    /// recovery, and derives `next_offset`.
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> Result<Self, SegmentError> {
        let store = Store::open(store_path(dir, base_offset))?;
        let mut index = Index::open(index_path(dir, base_offset), config.max_index_bytes)?;

        // An empty index over a non-empty store means the index file went
        // missing (or was never written before a crash); treat it like any
        // other untrusted index rather than trimming the store to nothing.
        if index.needs_rebuild() || (index.size() == 0 && store.size()? > 0) {
            rebuild_index(&store, &mut index, base_offset)?;
        }

        // Derive next_offset from the last entry, and trim any store bytes
        // past the last indexed frame (torn tails, orphans of failed index
        // writes).
        let (next_offset, valid_end) = match index.read(-1) {
            Ok((last_rel, last_pos)) => {
                let frame = store.read(last_pos)?;
                (
                    base_offset + last_rel as u64 + 1,
                    last_pos + LEN_WIDTH + frame.len() as u64,
                )
            }
            Err(IndexError::EndOfTable) => (base_offset, 0),
            Err(e) => return Err(e.into()),
        };
        if store.size()? > valid_end {
            store.truncate(valid_end)?;
        }

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends `value` as the next record and returns its stamped offset.
    ///
    /// On failure nothing is acknowledged: `next_offset` does not advance,
    /// and recovery on the next open discards whatever half of the write
    /// landed.
    pub fn append(&mut self, value: Vec<u8>) -> Result<u64, SegmentError> {
        let offset = self.next_offset;
        let record = Record::new(offset, value);

        let (_, pos) = self.store.append(&record.to_bytes()?)?;
        self.index.write((offset - self.base_offset) as u32, pos)?;

        self.next_offset += 1;
        Ok(offset)
    }

    /// Reads the record stored at the **absolute** offset `offset`.
    pub fn read(&self, offset: u64) -> Result<Record, SegmentError> {
        let rel = offset
            .checked_sub(self.base_offset)
            .ok_or(SegmentError::Index(IndexError::EndOfTable))?;

        let (_, pos) = self.index.read(rel as i64)?;
        let frame = self.store.read(pos)?;
        Ok(Record::from_bytes(&frame)?)
    }

    /// True once the store or the index has reached its configured limit.
    /// The log checks this after each append to decide rollover.
    pub fn is_full(&self) -> Result<bool, SegmentError> {
        Ok(self.store.size()? >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes)
    }

    /// Absolute offset of this segment's first record.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// One past the highest offset stored; the offset the next append gets.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// True if `offset` lies in `[base_offset, next_offset)`.
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// Closes the index, then the store; the first error wins.
    pub fn close(self) -> Result<(), SegmentError> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Closes the segment and deletes both files from disk.
    pub fn remove(self) -> Result<(), SegmentError> {
        self.index.remove()?;
        self.store.remove()?;
        Ok(())
    }
}

fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.store"))
}

fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.index"))
}

/// Walks the store from position zero and rewrites the index from what it
/// finds. Stops at the first torn frame, corrupt record, mis-stamped offset,
/// or a full index; everything past the stop point is trimmed by the caller.
fn rebuild_index(store: &Store, index: &mut Index, base_offset: u64) -> Result<(), SegmentError> {
    let size = store.size()?;
    let mut pos = 0u64;
    let mut rel = 0u32;

    while pos < size {
        let frame = match store.read(pos) {
            Ok(frame) => frame,
            // Torn tail: a partial frame at the end of the store.
            Err(StoreError::Io(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        match Record::from_bytes(&frame) {
            Ok(record) if record.offset == base_offset + rel as u64 => {}
            // Corrupt frame or a record that does not belong here.
            _ => break,
        }

        if index.write(rel, pos).is_err() {
            // The index capacity shrank between runs; the un-indexed tail is
            // trimmed by the caller.
            break;
        }

        pos += LEN_WIDTH + frame.len() as u64;
        rel += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests;
