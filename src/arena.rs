//! Bump Arena
//!
//! Region allocator backing every transient allocation of a resolution:
//! received datagrams, decoded names and record text. Allocations are never
//! freed one by one; they are reclaimed in bulk with [`Arena::restore`] or
//! [`Arena::clear`].
//!
//! Allocations are handed out as [`Span`] handles (offset + length) rather
//! than references, so the arena can keep growing while earlier results are
//! still held by the caller.

use std::ops::Range;

/// Default backing buffer size (1 MiB)
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Handle to a run of bytes inside an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    start: usize,
    len: usize,
}

impl Span {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Sub-span of `len` bytes starting `offset` bytes into this span.
    /// Returns `None` if it would reach past the end.
    pub fn sub(&self, offset: usize, len: usize) -> Option<Span> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        Some(Span {
            start: self.start + offset,
            len,
        })
    }
}

/// Saved allocation cursor, see [`Arena::checkpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    prev: usize,
    curr: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    Exhausted { requested: usize, remaining: usize },

    #[error("only the most recent allocation can be resized")]
    NotLastAllocation,

    #[error("arena used after release")]
    Released,
}

/// Bump allocator over a single fixed-size buffer
pub struct Arena {
    buf: Vec<u8>,

    /// Start of the most recent allocation
    prev: usize,

    /// First free byte
    curr: usize,

    released: bool,
}

impl Arena {
    /// Create an arena with `capacity` bytes of backing storage
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            prev: 0,
            curr: 0,
            released: false,
        }
    }

    /// Re-initialize after [`Arena::release`] (or resize an idle arena)
    pub fn init(&mut self, capacity: usize) {
        *self = Self::new(capacity);
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes handed out since the last clear
    pub fn used(&self) -> usize {
        self.curr
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.curr
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Reserve `size` bytes. Contents are whatever was there before: memory
    /// handed back by a restore is not zeroed.
    pub fn alloc(&mut self, size: usize) -> Result<Span, ArenaError> {
        if self.released {
            return Err(ArenaError::Released);
        }
        if size > self.remaining() {
            return Err(ArenaError::Exhausted {
                requested: size,
                remaining: self.remaining(),
            });
        }

        let span = Span {
            start: self.curr,
            len: size,
        };
        self.prev = self.curr;
        self.curr += size;
        Ok(span)
    }

    /// Grow or shrink `span` in place. Only valid for the most recent
    /// allocation; anything else is rejected.
    pub fn realloc(&mut self, span: Span, new_size: usize) -> Result<Span, ArenaError> {
        if self.released {
            return Err(ArenaError::Released);
        }
        if span.start != self.prev || span.end() != self.curr {
            return Err(ArenaError::NotLastAllocation);
        }

        let available = self.buf.len() - self.prev;
        if new_size > available {
            return Err(ArenaError::Exhausted {
                requested: new_size,
                remaining: available,
            });
        }

        self.curr = self.prev + new_size;
        Ok(Span {
            start: self.prev,
            len: new_size,
        })
    }

    /// Allocate and fill with a copy of `bytes`
    pub fn alloc_copy(&mut self, bytes: &[u8]) -> Result<Span, ArenaError> {
        let span = self.alloc(bytes.len())?;
        self.buf[span.range()].copy_from_slice(bytes);
        Ok(span)
    }

    /// Grow the most recent allocation and append `bytes` to it
    pub fn extend(&mut self, span: Span, bytes: &[u8]) -> Result<Span, ArenaError> {
        let grown = self.realloc(span, span.len + bytes.len())?;
        self.buf[span.end()..grown.end()].copy_from_slice(bytes);
        Ok(grown)
    }

    /// Grow the most recent allocation and append the bytes of `src`, which
    /// must lie before it.
    pub fn extend_from(&mut self, span: Span, src: Span) -> Result<Span, ArenaError> {
        if src.end() > span.start {
            return Err(ArenaError::NotLastAllocation);
        }
        let grown = self.realloc(span, span.len + src.len)?;
        self.buf.copy_within(src.range(), span.end());
        Ok(grown)
    }

    /// Bytes behind `span`. Spans invalidated by a release read as empty.
    pub fn bytes(&self, span: Span) -> &[u8] {
        self.buf.get(span.range()).unwrap_or(&[])
    }

    pub fn bytes_mut(&mut self, span: Span) -> &mut [u8] {
        self.buf.get_mut(span.range()).unwrap_or(&mut [])
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            prev: self.prev,
            curr: self.curr,
        }
    }

    /// Rewind to `checkpoint`, reclaiming everything allocated after it.
    /// Spans from that region must not be used afterwards.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        debug_assert!(checkpoint.curr <= self.curr, "restore past the cursor");
        self.prev = checkpoint.prev;
        self.curr = checkpoint.curr;
    }

    /// Rewind to empty
    pub fn clear(&mut self) {
        self.prev = 0;
        self.curr = 0;
    }

    /// Drop the backing buffer. The arena refuses allocations until
    /// [`Arena::init`] is called again.
    pub fn release(&mut self) {
        self.buf = Vec::new();
        self.prev = 0;
        self.curr = 0;
        self.released = true;
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
