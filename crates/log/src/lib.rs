//! # Log — the commit log's public contract
//!
//! A [`Log`] composes an ordered list of segments into one logical address
//! space. Appends go to the active (last) segment and roll a new one when it
//! fills; reads locate the owning segment by offset; truncation removes whole
//! segments from the front. Opening a directory reconstructs the segment list
//! from the files found there.
//!
//! ## Directory Layout
//!
//! ```text
//! data/log/
//!   0.store      0.index       # segment with base offset 0
//!   37.store     37.index      # segment with base offset 37
//!   ...
//! ```
//!
//! A segment's filename stem is its base offset in decimal.
//!
//! ## Concurrency
//!
//! The segment list sits behind a reader/writer lock: [`append`](Log::append),
//! [`truncate`](Log::truncate), and [`close`](Log::close) take it exclusively,
//! everything else shared. Within one process a read issued after an append
//! returns is guaranteed to see that record. The write lock is held across
//! the append's disk I/O (including rollover), which caps write throughput at
//! single-threaded disk speed.

mod config;

pub use config::Config;
pub use segment::{CodecError, Record, SegmentConfig};

use segment::{Segment, SegmentError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// The requested offset lies outside the log's current range.
    #[error("offset out of range")]
    OffsetOutOfRange,

    /// A truncation would have to remove the active segment.
    #[error("cannot truncate active segment")]
    SegmentActive,

    /// A storage-level failure in a segment, surfaced verbatim.
    #[error(transparent)]
    Segment(#[from] SegmentError),

    /// An I/O failure in the log's own directory handling.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Another thread panicked while holding the log lock.
    #[error("log lock poisoned")]
    LockPoisoned,
}

/// The capability set front-ends depend on, so tests and alternate transports
/// can substitute their own implementation for [`Log`].
pub trait CommitLog: Send + Sync {
    /// Appends an opaque value and returns the offset stamped on it.
    fn append(&self, value: Vec<u8>) -> Result<u64, LogError>;

    /// Retrieves the record stored at `offset`.
    fn read(&self, offset: u64) -> Result<Record, LogError>;
}

/// An append-only commit log over a directory of segments.
///
/// The segment list is never empty after a successful open: a fresh directory
/// gets one empty segment at the configured initial offset.
pub struct Log {
    dir: PathBuf,
    config: Config,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Opens the log in `dir`, creating the directory if needed.
    ///
    /// Existing segments are discovered by collecting every file whose stem
    /// parses as a `u64`, deduplicating (each base offset names a `.store`
    /// and a `.index` file) and sorting ascending, then opening each in
    /// order. The last one opened becomes the active segment.
    pub fn open<P: AsRef<Path>>(dir: P, config: Config) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut base_offsets = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(base) = stem.parse::<u64>() {
                    base_offsets.insert(base);
                }
            }
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base in base_offsets {
            segments.push(Segment::open(&dir, base, config.segment)?);
        }
        if segments.is_empty() {
            let initial = config.segment.initial_offset;
            segments.push(Segment::open(&dir, initial, config.segment)?);
        }

        Ok(Self {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    /// Appends `value` to the active segment and returns the stamped offset.
    ///
    /// If the segment reports full afterwards, a successor is opened at the
    /// old active's `next_offset` and becomes the new active — so the append
    /// that exactly fills a segment is the last one it accepts.
    pub fn append(&self, value: Vec<u8>) -> Result<u64, LogError> {
        let mut segments = self.write_lock()?;
        let active = segments
            .last_mut()
            .expect("segment list is never empty after open");

        let offset = active.append(value)?;

        if active.is_full()? {
            let base = active.next_offset();
            segments.push(Segment::open(&self.dir, base, self.config.segment)?);
        }

        Ok(offset)
    }

    /// Retrieves the record stored at `offset`.
    ///
    /// Fails [`LogError::OffsetOutOfRange`] when no segment's
    /// `[base_offset, next_offset)` range contains `offset`.
    pub fn read(&self, offset: u64) -> Result<Record, LogError> {
        let segments = self.read_lock()?;
        let segment = segments
            .iter()
            .find(|s| s.contains(offset))
            .ok_or(LogError::OffsetOutOfRange)?;

        segment.read(offset).map_err(|e| {
            // A missing index entry inside the advertised range is still an
            // out-of-range offset as far as callers are concerned.
            if e.is_end_of_table() {
                LogError::OffsetOutOfRange
            } else {
                e.into()
            }
        })
    }

    /// Removes every segment whose highest stored offset is below `lowest`.
    ///
    /// Fails [`LogError::SegmentActive`] when `lowest` reaches into the
    /// active segment. Aborts on the first per-segment removal failure; the
    /// survivors are untouched and still ordered.
    pub fn truncate(&self, lowest: u64) -> Result<(), LogError> {
        let mut segments = self.write_lock()?;

        let active_next = segments
            .last()
            .expect("segment list is never empty after open")
            .next_offset();
        if lowest >= active_next {
            return Err(LogError::SegmentActive);
        }

        // Removable segments (next_offset <= lowest, i.e. highest stored
        // offset < lowest) always form a prefix of the ordered list.
        while let Some(first) = segments.first() {
            if first.next_offset() > lowest {
                break;
            }
            let segment = segments.remove(0);
            segment.remove()?;
        }

        Ok(())
    }

    /// The lowest offset addressable in the log (the first segment's base
    /// offset, even while the log is empty).
    pub fn lowest_offset(&self) -> Result<u64, LogError> {
        let segments = self.read_lock()?;
        Ok(first_base(&segments))
    }

    /// The highest offset stored in the log.
    ///
    /// Fails [`LogError::OffsetOutOfRange`] when the log holds no records.
    pub fn highest_offset(&self) -> Result<u64, LogError> {
        let segments = self.read_lock()?;
        let next = segments
            .last()
            .expect("segment list is never empty after open")
            .next_offset();

        if next == first_base(&segments) {
            return Err(LogError::OffsetOutOfRange);
        }
        Ok(next - 1)
    }

    /// Number of records currently stored.
    pub fn len(&self) -> Result<u64, LogError> {
        let segments = self.read_lock()?;
        let lowest = first_base(&segments);
        let next = segments
            .last()
            .expect("segment list is never empty after open")
            .next_offset();

        Ok(next - lowest)
    }

    /// True when the log holds no records.
    pub fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.len()? == 0)
    }

    /// Closes every segment; the first error wins. Consuming the log is what
    /// guarantees no operation can follow a close.
    pub fn close(self) -> Result<(), LogError> {
        let mut segments = self
            .segments
            .into_inner()
            .map_err(|_| LogError::LockPoisoned)?;

        for segment in segments.drain(..) {
            segment.close()?;
        }
        Ok(())
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Vec<Segment>>, LogError> {
        self.segments.read().map_err(|_| LogError::LockPoisoned)
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Vec<Segment>>, LogError> {
        self.segments.write().map_err(|_| LogError::LockPoisoned)
    }
}

fn first_base(segments: &[Segment]) -> u64 {
    segments
        .first()
        .expect("segment list is never empty after open")
        .base_offset()
}

impl CommitLog for Log {
    fn append(&self, value: Vec<u8>) -> Result<u64, LogError> {
        Log::append(self, value)
    }

    fn read(&self, offset: u64) -> Result<Record, LogError> {
        Log::read(self, offset)
    }
}

#[cfg(test)]
mod tests;
