//! Reference-counted, byte-addressable data sources backing segments.
//!
//! A [`DataObject`] is either an in-memory block or a file accessed through
//! a single demand-paged mapping window. Both variants are wrapped in `Rc`
//! so that the cooperative reference-counting discipline described by the
//! reference implementation (acquire on reference, release on drop, run the
//! close/free hook exactly once the count hits zero) falls directly out of
//! `Rc`'s own count and `Drop`, rather than a hand-rolled counter.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::rc::Rc;

use memmap2::{Mmap, MmapOptions};

use crate::error::{Error, Result};

/// A closure run exactly once when the last reference to a [`DataObject`]
/// is dropped.
pub type DropHook = Box<dyn FnMut()>;

struct PagedWindow {
    mmap: Mmap,
    /// Logical file offset of the start of `mmap` (page-aligned).
    page_offset: u64,
}

enum Kind {
    Memory { bytes: RefCell<Vec<u8>> },
    File {
        file: RefCell<File>,
        dev: u64,
        ino: u64,
        page: RefCell<Option<PagedWindow>>,
        page_size: u64,
    },
}

struct Inner {
    size: u64,
    kind: Kind,
    drop_hook: RefCell<Option<DropHook>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(mut hook) = self.drop_hook.borrow_mut().take() {
            hook();
        }
    }
}

/// A shared handle to a byte-addressable source: an in-memory block or a
/// paged view of a file.
#[derive(Clone)]
pub struct DataObject(Rc<Inner>);

impl DataObject {
    /// Wraps an owned byte buffer as a memory data object.
    ///
    /// `drop_hook`, if given, runs exactly once when the last clone of the
    /// returned handle is dropped (e.g. to free externally-owned memory this
    /// data object was handed without taking a copy).
    pub fn memory(bytes: Vec<u8>, drop_hook: Option<DropHook>) -> Self {
        let size = bytes.len() as u64;
        Self(Rc::new(Inner {
            size,
            kind: Kind::Memory {
                bytes: RefCell::new(bytes),
            },
            drop_hook: RefCell::new(drop_hook),
        }))
    }

    /// Wraps a file as a file data object, identified for comparison
    /// purposes by its (device, inode) pair.
    ///
    /// `close_hook`, if given, runs exactly once when the last clone of the
    /// returned handle is dropped (e.g. to close the underlying file
    /// descriptor, if this data object was handed ownership of it).
    pub fn file(mut file: File, close_hook: Option<DropHook>) -> Result<Self> {
        let meta = file.metadata()?;
        let size = file.seek(SeekFrom::End(0))?;
        let page_size = page_size()?;

        Ok(Self(Rc::new(Inner {
            size,
            kind: Kind::File {
                file: RefCell::new(file),
                dev: meta.dev(),
                ino: meta.ino(),
                page: RefCell::new(None),
                page_size,
            },
            drop_hook: RefCell::new(close_hook),
        })))
    }

    /// Total size of this data object, in bytes. Immutable for the lifetime
    /// of the object.
    pub fn size(&self) -> u64 {
        self.0.size
    }

    /// Reads `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// For the memory variant this is a single copy. For the file variant
    /// this pages in (and may re-map) a page-aligned window as needed,
    /// looping internally until `dst` is fully populated, mirroring the
    /// reference `get_data` contract of returning however many bytes are
    /// available per call.
    pub fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        let len = dst.len() as u64;
        let end = offset
            .checked_add(len)
            .ok_or(Error::Overflow("data object read range"))?;
        if end > self.0.size {
            return Err(Error::InvalidArgument(format!(
                "read [{offset}, {end}) exceeds data object size {}",
                self.0.size
            )));
        }

        match &self.0.kind {
            Kind::Memory { bytes } => {
                let bytes = bytes.borrow();
                dst.copy_from_slice(&bytes[offset as usize..end as usize]);
                Ok(())
            }
            Kind::File {
                file,
                page,
                page_size,
                ..
            } => {
                let mut remaining = dst;
                let mut cursor = offset;
                while !remaining.is_empty() {
                    let page_offset = (cursor / page_size) * page_size;
                    let mut window = page.borrow_mut();
                    let needs_remap = match window.as_ref() {
                        Some(w) => w.page_offset != page_offset,
                        None => true,
                    };
                    if needs_remap {
                        let mmap = map_page(&file.borrow(), page_offset, *page_size, self.0.size)?;
                        *window = Some(PagedWindow { mmap, page_offset });
                    }
                    let w = window.as_ref().expect("just mapped");
                    let in_page = (cursor - w.page_offset) as usize;
                    let available = w.mmap.len() - in_page;
                    let take = available.min(remaining.len());
                    remaining[..take].copy_from_slice(&w.mmap[in_page..in_page + take]);
                    remaining = &mut remaining[take..];
                    cursor += take as u64;
                }
                Ok(())
            }
        }
    }

    /// Writes `bytes` into this data object at `offset`.
    ///
    /// Only supported for memory data objects, and intended for populating a
    /// freshly constructed object before it is shared by any segment — not
    /// as a way to mutate bytes a live segment is already reading, which
    /// would violate the immutability other segments rely on. File data
    /// objects are read-only sources; writing to the file they back is the
    /// save engine's job, done directly against the file handle.
    pub fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        match &self.0.kind {
            Kind::Memory { bytes: buf } => {
                let end = offset
                    .checked_add(bytes.len() as u64)
                    .ok_or(Error::Overflow("data object write range"))?;
                if end > self.0.size {
                    return Err(Error::InvalidArgument(format!(
                        "write [{offset}, {end}) exceeds data object size {}",
                        self.0.size
                    )));
                }
                buf.borrow_mut()[offset as usize..end as usize].copy_from_slice(bytes);
                Ok(())
            }
            Kind::File { .. } => Err(Error::NotImplemented),
        }
    }

    /// Structural equality: two file data objects compare equal iff their
    /// (device, inode) pair matches; two memory data objects compare equal
    /// iff they are the same handle.
    pub fn same_source(&self, other: &DataObject) -> bool {
        match (&self.0.kind, &other.0.kind) {
            (Kind::Memory { .. }, Kind::Memory { .. }) => Rc::ptr_eq(&self.0, &other.0),
            (
                Kind::File { dev: d1, ino: i1, .. },
                Kind::File { dev: d2, ino: i2, .. },
            ) => d1 == d2 && i1 == i2,
            _ => false,
        }
    }

    /// True if this data object is file-backed and writes to `file` would
    /// be observed by reads from this data object (same open file as `F`).
    pub fn is_file(&self) -> bool {
        matches!(self.0.kind, Kind::File { .. })
    }

    /// Copies `len` bytes starting at `offset` into a new, independent
    /// memory data object — used by the save engine's `store_in_memory` and
    /// by action `private_copy` to materialise a snapshot that survives the
    /// source data object being overwritten or dropped.
    pub fn snapshot(&self, offset: u64, len: u64) -> Result<DataObject> {
        let mut buf = vec![0u8; len as usize];
        self.read_into(offset, &mut buf)?;
        Ok(DataObject::memory(buf, None))
    }

    /// Writes `bytes` at `offset` directly into the backing file, bypassing
    /// the single-page read cache (invalidating it if it now overlaps the
    /// written range). Used only by the save engine, which is the sole
    /// writer of file-backed data objects.
    pub(crate) fn write_file_at(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        match &self.0.kind {
            Kind::File { file, page, .. } => {
                let mut f = file.borrow_mut();
                f.seek(SeekFrom::Start(offset))?;
                f.write_all(bytes)?;
                *page.borrow_mut() = None;
                Ok(())
            }
            Kind::Memory { .. } => Err(Error::InvalidArgument(
                "write_file_at called on a memory data object".into(),
            )),
        }
    }

    pub(crate) fn truncate_file(&self, len: u64) -> Result<()> {
        match &self.0.kind {
            Kind::File { file, .. } => {
                file.borrow().set_len(len)?;
                Ok(())
            }
            Kind::Memory { .. } => Err(Error::InvalidArgument(
                "truncate_file called on a memory data object".into(),
            )),
        }
    }
}

fn page_size() -> Result<u64> {
    Ok(page_size::get() as u64)
}

fn map_page(file: &File, page_offset: u64, page_size: u64, object_size: u64) -> Result<Mmap> {
    let remaining = object_size - page_offset;
    let map_len = remaining.min(page_size) as usize;
    let mmap = unsafe {
        MmapOptions::new()
            .offset(page_offset)
            .len(map_len.max(1))
            .map(file)
            .map_err(io::Error::from)?
    };
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn memory_round_trip() {
        let obj = DataObject::memory(vec![1, 2, 3, 4, 5], None);
        assert_eq!(obj.size(), 5);
        let mut dst = [0u8; 3];
        obj.read_into(1, &mut dst).unwrap();
        assert_eq!(dst, [2, 3, 4]);
    }

    #[test]
    fn memory_read_out_of_range_errors() {
        let obj = DataObject::memory(vec![1, 2, 3], None);
        let mut dst = [0u8; 2];
        assert!(obj.read_into(2, &mut dst).is_err());
    }

    #[test]
    fn memory_same_source_is_handle_identity() {
        let a = DataObject::memory(vec![1], None);
        let b = a.clone();
        let c = DataObject::memory(vec![1], None);
        assert!(a.same_source(&b));
        assert!(!a.same_source(&c));
    }

    #[test]
    fn file_round_trip_across_pages() {
        let mut tmp = tempfile::tempfile().unwrap();
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 256) as u8).collect();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let obj = DataObject::file(tmp, None).unwrap();
        assert_eq!(obj.size(), data.len() as u64);

        let mut dst = vec![0u8; data.len()];
        obj.read_into(0, &mut dst).unwrap();
        assert_eq!(dst, data);

        // A read spanning an internal page boundary.
        let mut mid = vec![0u8; 100];
        obj.read_into(4050, &mut mid).unwrap();
        assert_eq!(mid, data[4050..4150]);
    }

    #[test]
    fn file_same_source_is_dev_inode_identity() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let f1 = File::open(tmp.path()).unwrap();
        let f2 = File::open(tmp.path()).unwrap();
        let obj1 = DataObject::file(f1, None).unwrap();
        let obj2 = DataObject::file(f2, None).unwrap();
        assert!(obj1.same_source(&obj2));
    }

    #[test]
    fn drop_hook_runs_once_when_last_reference_drops() {
        let ran = Rc::new(RefCell::new(0));
        let ran_clone = ran.clone();
        let obj = DataObject::memory(
            vec![1, 2, 3],
            Some(Box::new(move || {
                *ran_clone.borrow_mut() += 1;
            })),
        );
        let obj2 = obj.clone();
        drop(obj);
        assert_eq!(*ran.borrow(), 0, "hook must not run while a clone is alive");
        drop(obj2);
        assert_eq!(*ran.borrow(), 1);
    }
}
