use bytes::{Bytes, BytesMut};
use promsnap_core::CollectError;
use std::fmt;
use tracing::debug;

/// The write overran the buffer's logical capacity. The caller grows the
/// buffer and restarts the whole encoding pass from offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

/// The single shared output buffer for encoded scrapes.
///
/// Appends are checked against a logical capacity that is independent of
/// whatever the allocator actually handed out, so growth doubling behaves
/// deterministically. The capacity only ever goes up — it is the high-water
/// mark for the process lifetime.
pub struct ScrapeBuffer {
    buf: BytesMut,
    cap: usize,
}

impl ScrapeBuffer {
    /// Wrap a reclaimed allocation, clearing any previous contents and
    /// ensuring at least `cap` bytes of real capacity.
    pub fn new(mut buf: BytesMut, cap: usize) -> Self {
        buf.clear();
        if buf.capacity() < cap {
            buf.reserve(cap);
        }
        Self { buf, cap }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self::new(BytesMut::with_capacity(cap), cap)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.buf.truncate(len);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Double the logical capacity, discarding current contents.
    /// Fails once the doubled size would exceed `ceiling`.
    pub fn grow(&mut self, ceiling: usize) -> Result<(), CollectError> {
        let next = self.cap.saturating_mul(2);
        if next > ceiling {
            return Err(CollectError::BufferCeiling { max: ceiling });
        }
        self.buf.clear();
        self.buf.reserve(next);
        self.cap = next;
        debug!(capacity = next, "Scrape buffer grown");
        Ok(())
    }

    pub fn push(&mut self, byte: u8) -> Result<(), BufferFull> {
        if self.buf.len() >= self.cap {
            return Err(BufferFull);
        }
        self.buf.extend_from_slice(&[byte]);
        Ok(())
    }

    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        if self.cap - self.buf.len() < bytes.len() {
            return Err(BufferFull);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Freeze the written range into an immutable view. Clones of the view
    /// share the allocation; it can be reclaimed for the next pass once all
    /// of them are dropped.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

/// Formatting writes (float rendering) land directly in the buffer;
/// the only error source is running out of capacity.
impl fmt::Write for ScrapeBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.extend(s.as_bytes()).map_err(|_| fmt::Error)
    }
}
