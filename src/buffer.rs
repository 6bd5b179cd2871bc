//! The buffer facade: a segment collection plus an undo/redo action log and
//! the entry point for saving to disk.
//!
//! Not `Send`/`Sync` — every data object and list node in the tree this
//! owns is `Rc`-backed, so a `Buffer` is confined to the thread that created
//! it, matching the reference implementation's single-threaded contract
//! (§5).

use std::fs::File;
use std::ops::ControlFlow;

use crate::action::{Action, AppendAction, DeleteAction, InsertAction, MultiAction};
use crate::data_object::DataObject;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::save::{self, SaveProgress};
use crate::segcol::SegmentCollection;

/// An editable byte buffer: an ordered segment collection with an
/// undo/redo log and a safe in-place save.
pub struct Buffer {
    segcol: SegmentCollection,
    undo_stack: Vec<Action>,
    redo_stack: Vec<Action>,
    open_multi: Vec<MultiAction>,
    options: Options,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    /// Creates a new, empty buffer with the default options (see
    /// [`Options::new`]).
    pub fn new() -> Self {
        Self::with_options(Options::new())
    }

    /// Creates a new, empty buffer with the given options.
    pub fn with_options(options: Options) -> Self {
        Self {
            segcol: SegmentCollection::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            open_multi: Vec::new(),
            options,
        }
    }

    /// Total number of logical bytes in the buffer.
    pub fn get_size(&self) -> u64 {
        self.segcol.total_size()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// Appends `length` bytes of `source` starting at `src_offset` to the
    /// end of the buffer.
    pub fn append(&mut self, source: &DataObject, src_offset: u64, length: u64) -> Result<()> {
        let action = Action::Append(AppendAction::new(source, src_offset, length)?);
        self.apply(action)
    }

    /// Inserts `length` bytes of `source` starting at `src_offset` so they
    /// begin at logical `offset`.
    pub fn insert(&mut self, offset: u64, source: &DataObject, src_offset: u64, length: u64) -> Result<()> {
        let action = Action::Insert(InsertAction::new(offset, source, src_offset, length)?);
        self.apply(action)
    }

    /// Removes `[offset, offset + length)` from the buffer.
    pub fn delete(&mut self, offset: u64, length: u64) -> Result<()> {
        let action = Action::Delete(DeleteAction::new(offset, length));
        self.apply(action)
    }

    fn apply(&mut self, mut action: Action) -> Result<()> {
        action.do_apply(&mut self.segcol)?;
        self.record(action);
        Ok(())
    }

    /// Files a just-applied action: as a child of the innermost open multi
    /// if one is open, otherwise onto the undo stack (evicting the oldest
    /// entry past the configured limit). Either way the redo stack is
    /// invalidated, since it no longer describes a reachable future state.
    fn record(&mut self, action: Action) {
        self.redo_stack.clear();

        if let Some(open) = self.open_multi.last_mut() {
            open.push(action);
            return;
        }

        let limit = self.options.undo_limit();
        if limit == 0 {
            return;
        }
        self.undo_stack.push(action);
        while self.undo_stack.len() as u64 > limit {
            self.undo_stack.remove(0);
            log::debug!("undo stack past limit {limit}, discarding oldest entry");
        }
    }

    /// Opens a new multi-action: subsequent `append`/`insert`/`delete`
    /// calls (and nested multis) are recorded as its children instead of
    /// going straight onto the undo stack. Nesting is permitted.
    pub fn begin_multi(&mut self) {
        log::trace!("begin_multi: nesting depth now {}", self.open_multi.len() + 1);
        self.open_multi.push(MultiAction::new());
    }

    /// Closes the innermost open multi-action. If it is itself nested
    /// inside another open multi, it is filed as that multi's child;
    /// otherwise it is filed onto the undo stack like any other action.
    /// A multi with no children is discarded rather than recorded.
    pub fn end_multi(&mut self) -> Result<()> {
        let multi = self
            .open_multi
            .pop()
            .ok_or(Error::InvalidState("end_multi called without a matching begin_multi"))?;
        if !multi.is_empty() {
            self.record(Action::Multi(multi));
        }
        Ok(())
    }

    /// Reverts the most recently applied (and not yet undone) action.
    pub fn undo(&mut self) -> Result<()> {
        let mut action = self
            .undo_stack
            .pop()
            .ok_or(Error::InvalidState("nothing to undo"))?;
        action.undo(&mut self.segcol)?;
        self.redo_stack.push(action);
        Ok(())
    }

    /// Reapplies the most recently undone action.
    pub fn redo(&mut self) -> Result<()> {
        let mut action = self
            .redo_stack
            .pop()
            .ok_or(Error::InvalidState("nothing to redo"))?;
        action.do_apply(&mut self.segcol)?;
        self.undo_stack.push(action);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Saves the buffer's logical content to `file` in place, reordering
    /// writes so the file never loses bytes a segment still needs to read
    /// from it (see [`crate::save`]).
    ///
    /// Before writing, every segment the undo/redo log (including any
    /// still-open multi) holds against `file` is replaced with a private
    /// in-memory copy, so undoing past this point after the save still
    /// works even though the file's old bytes are gone.
    pub fn save(
        &mut self,
        file: File,
        progress: Option<&mut dyn FnMut(SaveProgress) -> ControlFlow<()>>,
    ) -> Result<()> {
        let probe = DataObject::file(file.try_clone()?, None)?;
        for action in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            action.private_copy(&probe)?;
        }
        for open in &mut self.open_multi {
            open.private_copy(&probe)?;
        }
        drop(probe);

        save::save(&mut self.segcol, file, progress)?;

        if !self.options.undo_after_save() {
            self.undo_stack.clear();
            self.redo_stack.clear();
        }
        Ok(())
    }

    /// Copies `len` logical bytes starting at `src_offset` into
    /// `dst[dst_offset..dst_offset + len]`.
    pub fn read(&self, src_offset: u64, dst: &mut [u8], dst_offset: usize, len: usize) -> Result<()> {
        let len = len as u64;
        self.segcol.for_each_in_range(src_offset, len, |seg, mapping| {
            let seg_start = src_offset.max(mapping) - mapping;
            let seg_end = (mapping + seg.size()).min(src_offset + len) - mapping;
            let chunk_len = (seg_end - seg_start) as usize;
            let dst_pos = dst_offset + (mapping + seg_start - src_offset) as usize;
            seg.read_into(seg_start, &mut dst[dst_pos..dst_pos + chunk_len])
        })
    }

    /// A non-allocating-per-call view over `[offset, offset + length)`: each
    /// underlying segment is copied out once (never the whole range in a
    /// single arbitrary-length copy) and yielded as an owned chunk.
    pub fn iter_chunks(&self, offset: u64, length: u64) -> Result<std::vec::IntoIter<Vec<u8>>> {
        let mut chunks = Vec::new();
        self.segcol.for_each_in_range(offset, length, |seg, mapping| {
            let seg_start = offset.max(mapping) - mapping;
            let seg_end = (mapping + seg.size()).min(offset + length) - mapping;
            let mut buf = vec![0u8; (seg_end - seg_start) as usize];
            seg.read_into(seg_start, &mut buf)?;
            chunks.push(buf);
            Ok(())
        })?;
        Ok(chunks.into_iter())
    }

    /// Locating a byte pattern is a documented non-goal of the core.
    pub fn find(&self, _pattern: &[u8], _start: u64) -> Result<u64> {
        Err(Error::NotImplemented)
    }

    /// Copying a range from one buffer into another is a documented
    /// non-goal of the core.
    pub fn copy(&mut self, _dst_offset: u64, _src: &Buffer, _src_offset: u64, _len: u64) -> Result<()> {
        Err(Error::NotImplemented)
    }
}
