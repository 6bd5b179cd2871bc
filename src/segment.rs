//! A [`Segment`] is a contiguous view into a [`DataObject`]: `(data object,
//! start, size)`. Segments are the elements stored in a [`crate::segcol`].

use crate::data_object::DataObject;
use crate::error::{Error, Result};

/// A contiguous byte range within a [`DataObject`].
#[derive(Clone)]
pub struct Segment {
    data: DataObject,
    start: u64,
    size: u64,
}

impl Segment {
    /// Creates a new segment `[start, start + size)` of `data`.
    ///
    /// Fails if the range would overflow or exceed the data object's size.
    pub fn new(data: DataObject, start: u64, size: u64) -> Result<Self> {
        let end = start
            .checked_add(size)
            .ok_or(Error::Overflow("segment start + size"))?;
        if end > data.size() {
            return Err(Error::InvalidArgument(format!(
                "segment [{start}, {end}) exceeds data object size {}",
                data.size()
            )));
        }
        Ok(Self { data, start, size })
    }

    /// The data object this segment is a view into. Cloning it increments
    /// the object's reference count, per the usage-hook discipline in §4.1.
    pub fn data(&self) -> &DataObject {
        &self.data
    }

    /// Offset within the data object where this segment begins.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Number of bytes this segment covers.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Splits this segment at `at` bytes from its start, returning the
    /// right-hand part and shrinking `self` to the left-hand part in place.
    ///
    /// # Panics
    ///
    /// Panics if `at == 0 || at >= self.size()`: splitting at either
    /// boundary would produce a zero-size segment, which callers must avoid
    /// at the call site (the segment collection never stores one).
    pub fn split_at(&mut self, at: u64) -> Segment {
        assert!(at > 0 && at < self.size, "split point must be interior");
        let right = Segment {
            data: self.data.clone(),
            start: self.start + at,
            size: self.size - at,
        };
        self.size = at;
        right
    }

    /// Reads `dst.len()` bytes starting `offset` bytes into this segment.
    pub fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if offset + dst.len() as u64 > self.size {
            return Err(Error::InvalidArgument(
                "read range exceeds segment bounds".into(),
            ));
        }
        self.data.read_into(self.start + offset, dst)
    }
}
