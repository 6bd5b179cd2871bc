//! Buffer actions: the undoable units the undo/redo log is built from.
//!
//! Each variant knows how to apply itself to a [`SegmentCollection`], how to
//! exactly reverse that effect, and how to take a private copy of any data it
//! holds that lives in a data object about to be overwritten by a save.

use crate::data_object::DataObject;
use crate::error::{Error, Result};
use crate::segcol::SegmentCollection;
use crate::segment::Segment;

/// A single undoable change to a segment collection.
pub enum Action {
    Append(AppendAction),
    Insert(InsertAction),
    Delete(DeleteAction),
    Multi(MultiAction),
}

impl Action {
    /// Applies this action to `segcol`.
    pub fn do_apply(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        match self {
            Action::Append(a) => a.do_apply(segcol),
            Action::Insert(a) => a.do_apply(segcol),
            Action::Delete(a) => a.do_apply(segcol),
            Action::Multi(a) => a.do_apply(segcol),
        }
    }

    /// Reverts the effect of a previously applied action.
    pub fn undo(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        match self {
            Action::Append(a) => a.undo(segcol),
            Action::Insert(a) => a.undo(segcol),
            Action::Delete(a) => a.undo(segcol),
            Action::Multi(a) => a.undo(segcol),
        }
    }

    /// Replaces any segment this action owns whose data object is
    /// `cmp_dobj` with a private, in-memory snapshot of the same bytes.
    pub fn private_copy(&mut self, cmp_dobj: &DataObject) -> Result<()> {
        match self {
            Action::Append(a) => a.private_copy(cmp_dobj),
            Action::Insert(a) => a.private_copy(cmp_dobj),
            Action::Delete(a) => a.private_copy(cmp_dobj),
            Action::Multi(a) => a.private_copy(cmp_dobj),
        }
    }

    /// Number of bytes this action adds or removes from the buffer's size
    /// (used by event reporting; negative for deletions is represented by
    /// the caller, this returns the magnitude).
    pub fn range_len(&self) -> u64 {
        match self {
            Action::Append(a) => a.seg.size(),
            Action::Insert(a) => a.seg.size(),
            Action::Delete(a) => a.length,
            Action::Multi(a) => a.children.iter().map(Action::range_len).sum(),
        }
    }
}

/// Replaces a segment's data object with a private in-memory copy if it
/// currently belongs to `cmp_dobj`. Mirrors the reference implementation's
/// `segment_inplace_private_copy`: a no-op when the segment's data comes
/// from anywhere else.
fn private_copy_segment(seg: &mut Segment, cmp_dobj: &DataObject) -> Result<()> {
    if !seg.data().same_source(cmp_dobj) {
        return Ok(());
    }
    let copy = seg.data().snapshot(seg.start(), seg.size())?;
    *seg = Segment::new(copy, 0, seg.size())?;
    Ok(())
}

/// Appends a segment built from `(source, src_offset, length)` to the end of
/// the buffer.
pub struct AppendAction {
    seg: Segment,
}

impl AppendAction {
    pub fn new(source: &DataObject, src_offset: u64, length: u64) -> Result<Self> {
        Ok(Self {
            seg: Segment::new(source.clone(), src_offset, length)?,
        })
    }

    fn do_apply(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        segcol.append(self.seg.clone());
        Ok(())
    }

    fn undo(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        let size = segcol.total_size();
        let seg_size = self.seg.size();
        segcol.delete(size - seg_size, seg_size)?;
        Ok(())
    }

    fn private_copy(&mut self, cmp_dobj: &DataObject) -> Result<()> {
        private_copy_segment(&mut self.seg, cmp_dobj)
    }
}

/// Inserts a segment built from `(source, src_offset, length)` at `offset`.
pub struct InsertAction {
    offset: u64,
    seg: Segment,
}

impl InsertAction {
    pub fn new(offset: u64, source: &DataObject, src_offset: u64, length: u64) -> Result<Self> {
        Ok(Self {
            offset,
            seg: Segment::new(source.clone(), src_offset, length)?,
        })
    }

    fn do_apply(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        segcol.insert(self.offset, self.seg.clone())
    }

    fn undo(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        segcol.delete(self.offset, self.seg.size())?;
        Ok(())
    }

    fn private_copy(&mut self, cmp_dobj: &DataObject) -> Result<()> {
        private_copy_segment(&mut self.seg, cmp_dobj)
    }
}

/// Removes `[offset, offset + length)`. The removed bytes are captured on
/// first `do_apply` and retained so `undo` can splice them back exactly.
pub struct DeleteAction {
    offset: u64,
    length: u64,
    deleted: Option<SegmentCollection>,
}

impl DeleteAction {
    pub fn new(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length,
            deleted: None,
        }
    }

    fn do_apply(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        let deleted = segcol.delete(self.offset, self.length)?;
        self.deleted = Some(deleted);
        Ok(())
    }

    fn undo(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        let deleted = self
            .deleted
            .take()
            .ok_or(Error::InvalidState("delete action has nothing to undo"))?;
        let mut at = self.offset;
        for (seg, _) in deleted.iter() {
            let size = seg.size();
            segcol.insert(at, seg)?;
            at += size;
        }
        Ok(())
    }

    fn private_copy(&mut self, cmp_dobj: &DataObject) -> Result<()> {
        let Some(deleted) = self.deleted.as_mut() else {
            return Ok(());
        };
        let mut replaced = SegmentCollection::new();
        for (mut seg, _) in deleted.iter() {
            private_copy_segment(&mut seg, cmp_dobj)?;
            replaced.append(seg);
        }
        *deleted = replaced;
        Ok(())
    }
}

/// A compound action grouping an ordered sequence of child actions that
/// undo/redo together as one step.
#[derive(Default)]
pub struct MultiAction {
    children: Vec<Action>,
}

impl MultiAction {
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, action: Action) {
        self.children.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Applies every child in order. Also used directly by [`crate::buffer`]
    /// to replay a still-open multi's children.
    pub(crate) fn do_apply(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        for child in &mut self.children {
            child.do_apply(segcol)?;
        }
        Ok(())
    }

    pub(crate) fn undo(&mut self, segcol: &mut SegmentCollection) -> Result<()> {
        for child in self.children.iter_mut().rev() {
            child.undo(segcol)?;
        }
        Ok(())
    }

    pub(crate) fn private_copy(&mut self, cmp_dobj: &DataObject) -> Result<()> {
        for child in &mut self.children {
            child.private_copy(cmp_dobj)?;
        }
        Ok(())
    }
}
