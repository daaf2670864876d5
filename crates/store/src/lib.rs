//! # Store — append-only record file
//!
//! The store is the byte-level half of a log segment: an append-only file of
//! length-prefixed record frames. It knows nothing about record contents —
//! callers hand it opaque byte slices and get back the position at which the
//! frame begins.
//!
//! ## Frame Format
//!
//! ```text
//! [len: u64 LE][record bytes ...]
//! ```
//!
//! Frames are concatenated with no padding. `len` counts only the record
//! bytes, so a frame occupies `8 + len` bytes on disk.
//!
//! ## Buffering & Visibility
//!
//! Appends go through an internal [`BufWriter`] to amortise syscalls. Every
//! read path flushes that buffer first, so a record is always visible to a
//! positional read in the same process immediately after its `append`
//! returns.
//!
//! ## Example
//!
//! ```rust,no_run
//! use store::Store;
//!
//! let store = Store::open("0.store").unwrap();
//! let (n, pos) = store.append(b"hello").unwrap();
//! assert_eq!(n, 8 + 5);
//! assert_eq!(store.read(pos).unwrap(), b"hello");
//! ```

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Width of the length prefix preceding every record frame.
pub const LEN_WIDTH: u64 = 8;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Another thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Append-only file of length-prefixed record frames.
///
/// All public operations go through a single internal mutex, so the store can
/// be shared behind `&self`: appends are serialised against each other and
/// against reads, and reads flush the write buffer before touching the file.
pub struct Store {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Buffered writer over the append-mode file handle. Positional reads
    /// reuse the same handle via `get_ref` — they never move the cursor.
    writer: BufWriter<File>,
    /// Bytes written so far; equal to the file's logical end once the buffer
    /// is flushed. The next frame begins here.
    size: u64,
}

impl Store {
    /// Opens (or creates) a store file and recovers `size` from its length.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                writer: BufWriter::new(file),
                size,
            }),
        })
    }

    /// Appends `p` as a new frame and returns `(frame_len, position)`.
    ///
    /// `position` is the byte offset at which the frame begins (the store's
    /// size before the call); `frame_len` is `8 + p.len()`.
    pub fn append(&self, p: &[u8]) -> Result<(u64, u64), StoreError> {
        let mut inner = self.lock()?;

        let pos = inner.size;
        inner.writer.write_u64::<LittleEndian>(p.len() as u64)?;
        inner.writer.write_all(p)?;

        let frame_len = LEN_WIDTH + p.len() as u64;
        inner.size += frame_len;

        Ok((frame_len, pos))
    }

    /// Reads the record bytes of the frame beginning at `pos`.
    ///
    /// Flushes the write buffer first so records appended moments ago are
    /// visible. `pos` must be a frame boundary previously returned by
    /// [`append`](Store::append); the length prefix is validated against the
    /// store's size before any allocation, so a bogus position yields an
    /// `UnexpectedEof` I/O error rather than a huge read.
    pub fn read(&self, pos: u64) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;

        if pos + LEN_WIDTH > inner.size {
            return Err(frame_past_eof(pos));
        }

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        inner.writer.get_ref().read_exact_at(&mut len_buf, pos)?;
        let len = LittleEndian::read_u64(&len_buf);

        // Guard the subtraction-free form against overflow: `pos + 8` is
        // already known to be <= size.
        if len > inner.size - pos - LEN_WIDTH {
            return Err(frame_past_eof(pos));
        }

        let mut buf = vec![0u8; len as usize];
        inner
            .writer
            .get_ref()
            .read_exact_at(&mut buf, pos + LEN_WIDTH)?;

        Ok(buf)
    }

    /// Flushes the write buffer, then reads exactly `buf.len()` bytes
    /// starting at byte offset `off`.
    pub fn read_at(&self, buf: &mut [u8], off: u64) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;
        inner.writer.get_ref().read_exact_at(buf, off)?;
        Ok(())
    }

    /// Current size in bytes (including any still-buffered frames).
    pub fn size(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.size)
    }

    /// Shrinks the store to `len` bytes.
    ///
    /// Used by segment recovery to drop torn tails and orphan frames; `len`
    /// must be a frame boundary.
    pub fn truncate(&self, len: u64) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;
        inner.writer.get_ref().set_len(len)?;
        inner.size = len;
        Ok(())
    }

    /// Flushes and syncs the file, then closes it.
    pub fn close(self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Closes the store and deletes the file from disk.
    pub fn remove(self) -> Result<(), StoreError> {
        let path = self.path.clone();
        self.close()?;
        std::fs::remove_file(&path)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn frame_past_eof(pos: u64) -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("frame at position {pos} extends past end of store"),
    ))
}
