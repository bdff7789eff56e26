use crate::config::ThrottleOptions;
use crate::errors::{RegionError, Result};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Largest number of bytes moved by a single transfer attempt.
const MAX_CHUNK_SIZE: u64 = 64 * 1024;

/// Rate reported while no measurable time has elapsed yet. Large enough
/// that the throttle holds the first burst back until the clock ticks.
const ZERO_ELAPSED_RATE: u64 = u64::MAX;

/// State of the underlying file descriptor.
///
/// `Closed` is terminal; a released region is never reopened.
enum HandleState {
    Unopened(PathBuf),
    Open(File),
    Closed,
}

/// A byte range `[position, position+count)` of a file, streamed to a
/// destination channel under a soft bandwidth cap.
///
/// The file is opened lazily, on the first transfer attempt that needs
/// bytes, or explicitly via [`open`](Self::open). The region owns the
/// descriptor once opened and closes it exactly once, when the last
/// reference is [`release`](Self::release)d.
///
/// A single logical caller is expected to drive the transfer loop,
/// calling [`transfer_to`](Self::transfer_to) repeatedly and advancing
/// the range position by each call's returned byte count until
/// `transferred() == count()`. Only `retain`/`release` are meant to be
/// called concurrently from other holders.
pub struct ThrottledFileRegion {
    handle: Mutex<HandleState>,
    position: u64,
    count: u64,
    start: Instant,
    options: ThrottleOptions,
    transferred: AtomicU64,
    refcount: AtomicUsize,
}

impl ThrottledFileRegion {
    /// Create a region over an already-open file.
    ///
    /// The region takes ownership of the descriptor; the caller must
    /// not close it directly.
    pub fn from_file(file: File, position: u64, count: u64) -> Self {
        Self::new(HandleState::Open(file), position, count, ThrottleOptions::default())
    }

    /// Create a region over a file path. The file is opened lazily or
    /// explicitly via [`open`](Self::open).
    pub fn from_path<P: Into<PathBuf>>(path: P, position: u64, count: u64) -> Self {
        Self::new(
            HandleState::Unopened(path.into()),
            position,
            count,
            ThrottleOptions::default(),
        )
    }

    /// Same as [`from_file`](Self::from_file), with explicit throttling
    /// options.
    pub fn from_file_with_options(
        file: File,
        position: u64,
        count: u64,
        options: ThrottleOptions,
    ) -> Self {
        Self::new(HandleState::Open(file), position, count, options)
    }

    /// Same as [`from_path`](Self::from_path), with explicit throttling
    /// options.
    pub fn from_path_with_options<P: Into<PathBuf>>(
        path: P,
        position: u64,
        count: u64,
        options: ThrottleOptions,
    ) -> Self {
        Self::new(HandleState::Unopened(path.into()), position, count, options)
    }

    fn new(handle: HandleState, position: u64, count: u64, options: ThrottleOptions) -> Self {
        Self {
            handle: Mutex::new(handle),
            position,
            count,
            // Anchors the rate computation for the life of the region.
            start: Instant::now(),
            options,
            transferred: AtomicU64::new(0),
            refcount: AtomicUsize::new(1),
        }
    }

    /// Starting byte offset of the region within the file.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total number of bytes this region may transfer.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Bytes handed to the destination channel so far.
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Whether the region currently holds an open file descriptor.
    pub async fn is_open(&self) -> bool {
        matches!(&*self.handle.lock().await, HandleState::Open(_))
    }

    /// Number of active references.
    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    /// Explicitly open the underlying file descriptor if not done yet.
    ///
    /// A no-op if the region is already open, or if it was already
    /// released: a released region is never reopened.
    pub async fn open(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        Self::open_locked(&mut guard).await
    }

    async fn open_locked(guard: &mut HandleState) -> Result<()> {
        let path = match &*guard {
            HandleState::Unopened(path) => path.clone(),
            _ => return Ok(()),
        };
        let file = File::open(&path).await?;
        log::debug!("opened {path:?} for transfer");
        *guard = HandleState::Open(file);

        Ok(())
    }

    /// Move some bytes from the region into `dest`, starting
    /// `range_position` bytes past the region's own position, and
    /// return the number of bytes actually written.
    ///
    /// A return of less than the remaining byte count is partial
    /// progress, not failure; the caller advances `range_position` by
    /// the returned count and calls again. Zero means "try again
    /// later", unless the backing file can no longer satisfy the range,
    /// which fails with [`RegionError::TruncatedSource`].
    ///
    /// After a positive transfer this call waits, inside the call,
    /// while the cumulative average rate since construction exceeds the
    /// configured ceiling, re-checking every
    /// [`recheck_interval`](crate::config::ThrottleOptions::recheck_interval).
    pub async fn transfer_to<W>(&self, dest: &mut W, range_position: u64) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let remaining = self.count.checked_sub(range_position).ok_or_else(|| {
            RegionError::InvalidArgument(format!(
                "position out of range: {} (expected: 0 - {})",
                range_position,
                self.count.saturating_sub(1)
            ))
        })?;
        if remaining == 0 {
            return Ok(0);
        }
        if self.refcount.load(Ordering::Acquire) == 0 {
            return Err(RegionError::ReleasedResource);
        }

        let written = {
            let mut guard = self.handle.lock().await;
            Self::open_locked(&mut guard).await?;
            let file = match &mut *guard {
                HandleState::Open(file) => file,
                // Raced with the final release; the descriptor is gone.
                _ => return Err(RegionError::ReleasedResource),
            };

            let len = remaining.min(MAX_CHUNK_SIZE) as usize;
            let mut buf = vec![0u8; len];
            file.seek(SeekFrom::Start(self.position + range_position))
                .await?;
            let n = file.read(&mut buf).await?;
            let written = if n > 0 {
                dest.write(&buf[..n]).await? as u64
            } else {
                0
            };

            if written == 0 {
                // No progress; the file may have been truncated on disk
                // since the region was created.
                let size = file.metadata().await?.len();
                if self.position.saturating_add(self.count) > size {
                    return Err(RegionError::TruncatedSource {
                        size,
                        requested: self.count,
                    });
                }
            }

            written
        };

        if written > 0 {
            self.transferred.fetch_add(written, Ordering::Relaxed);
            self.throttle().await;
        }

        Ok(written)
    }

    /// Cumulative average rate since construction, in bytes per
    /// elapsed millisecond.
    fn current_rate(&self) -> u64 {
        let elapsed = self.start.elapsed().as_millis() as u64;
        if elapsed == 0 {
            return ZERO_ELAPSED_RATE;
        }

        self.transferred.load(Ordering::Relaxed) / elapsed
    }

    /// Wait until the cumulative average rate falls back under the
    /// ceiling. Gives up early if the last reference is released while
    /// waiting; the bytes of this attempt were already delivered.
    async fn throttle(&self) {
        while self.current_rate() > self.options.rate_ceiling {
            if self.refcount.load(Ordering::Acquire) == 0 {
                return;
            }
            tokio::time::sleep(self.options.recheck_interval).await;
        }
    }

    /// Add a reference to the region.
    ///
    /// Fails with [`RegionError::ReleasedResource`] once the count has
    /// reached zero; a torn-down region cannot be resurrected.
    pub fn retain(&self) -> Result<()> {
        let mut current = self.refcount.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(RegionError::ReleasedResource);
            }
            match self.refcount.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop a reference to the region. Returns `true` if this was the
    /// last reference, in which case the underlying descriptor has been
    /// closed. Further calls fail with
    /// [`RegionError::ReleasedResource`].
    pub async fn release(&self) -> Result<bool> {
        let mut current = self.refcount.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Err(RegionError::ReleasedResource);
            }
            match self.refcount.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current > 1 {
            return Ok(false);
        }

        self.deallocate().await;

        Ok(true)
    }

    /// Close the descriptor and mark the handle state terminal. Runs at
    /// most once, on the 1 -> 0 refcount transition.
    async fn deallocate(&self) {
        let mut guard = self.handle.lock().await;
        if let HandleState::Open(file) = std::mem::replace(&mut *guard, HandleState::Closed) {
            // Closing is best-effort; a close failure must never
            // surface from release.
            drop(file);
            log::debug!(
                "closed file region [{}..{})",
                self.position,
                self.position + self.count
            );
        }
    }
}
