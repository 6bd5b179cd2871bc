//! Safe in-place save: writes a buffer's logical contents to a file,
//! reordering writes so a segment that still reads from the very file being
//! overwritten never loses data it hasn't copied out yet.
//!
//! See [`overlap_graph`] for the dependency graph this is built on.

mod overlap_graph;

use std::fs::File;
use std::ops::ControlFlow;

use crate::data_object::DataObject;
use crate::error::{Error, Result};
use crate::segcol::SegmentCollection;
use crate::segment::Segment;
use overlap_graph::OverlapGraph;

/// Which step of [`save`] a [`SaveProgress`] report was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    /// Reserving (or extending) disk space for the final file size.
    Preallocate,
    /// Breaking cyclic overlaps by copying bytes out of the target file.
    BreakCycles,
    /// Writing segments to the target file.
    Write,
}

/// A progress report passed to the callback given to [`save`].
#[derive(Debug, Clone, Copy)]
pub struct SaveProgress {
    pub phase: SavePhase,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

fn report(
    progress: &mut Option<&mut dyn FnMut(SaveProgress) -> ControlFlow<()>>,
    p: SaveProgress,
) -> ControlFlow<()> {
    match progress {
        Some(cb) => cb(p),
        None => ControlFlow::Continue(()),
    }
}

fn file_backed_segments(segcol: &SegmentCollection, fd_obj: &DataObject) -> Vec<(Segment, u64)> {
    segcol
        .iter()
        .filter(|(seg, _)| seg.data().same_source(fd_obj))
        .collect()
}

/// Copies `len` bytes starting at `src_offset` in `fd_obj` to `dst_offset` in
/// the same object. Used to relocate bytes within the file being saved.
fn copy_range(fd_obj: &DataObject, src_offset: u64, len: u64, dst_offset: u64) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let mut buf = vec![0u8; len as usize];
    fd_obj.read_into(src_offset, &mut buf)?;
    fd_obj.write_file_at(dst_offset, &buf)
}

/// Writes `seg` to `mapping` in `fd_obj`. `overlap` is the segment's
/// self-loop weight: the number of bytes at the start of its destination
/// that coincide with its own source range.
///
/// When a segment has moved to a higher file address and overlaps its own
/// source, a naive write would clobber bytes it still needs to read later in
/// the same call. Instead the non-overlapping tail is written first, then
/// (if it's narrower than the overlap) the middle slice, and finally the
/// head — each step copying bytes out before a later step could stomp them.
fn write_segment(fd_obj: &DataObject, seg: &Segment, mapping: u64, overlap: u64) -> Result<()> {
    let seg_start = seg.start();
    let seg_size = seg.size();
    let mut nwrite = seg_size;

    if overlap > 0 && mapping >= seg_start {
        if mapping == seg_start {
            return Ok(());
        }

        copy_range(fd_obj, seg_start + overlap, seg_size - overlap, mapping + overlap)?;
        nwrite = overlap;

        if seg_size - overlap < overlap {
            let middle_len = 2 * overlap - seg_size;
            copy_range(
                fd_obj,
                seg_start + seg_size - overlap,
                middle_len,
                mapping + (seg_size - overlap),
            )?;
            nwrite -= middle_len;
        }
    }

    copy_range(fd_obj, seg_start, nwrite, mapping)
}

/// Saves `segcol`'s logical contents to `file`, reordering writes so that no
/// segment still reading from `file` loses its source bytes before they're
/// copied out.
///
/// On success, `segcol` is replaced with a single segment spanning the
/// entire (now-saved) file. `progress`, if given, is called at the end of
/// preallocation, after cycle-breaking, and after every subsequent segment
/// write; returning `ControlFlow::Break(())` cancels the operation.
/// Cancellation is best-effort: writes already issued are not undone, and
/// `segcol` is only swapped in at the very end, so a cancelled or failed
/// save never changes the buffer's logical content even though the file may
/// be left partially written.
pub fn save(
    segcol: &mut SegmentCollection,
    file: File,
    mut progress: Option<&mut dyn FnMut(SaveProgress) -> ControlFlow<()>>,
) -> Result<()> {
    let total_size = segcol.total_size();

    let current_len = file.metadata()?.len();
    if current_len < total_size {
        file.set_len(total_size)?;
    }

    if report(
        &mut progress,
        SaveProgress {
            phase: SavePhase::Preallocate,
            bytes_done: 0,
            bytes_total: total_size,
        },
    )
    .is_break()
    {
        return Err(Error::InvalidState("save cancelled during preallocation"));
    }

    let fd_obj = DataObject::file(file, None)?;

    let graph = OverlapGraph::build(&file_backed_segments(segcol, &fd_obj));
    let broken = graph.break_cycles();
    if !broken.is_empty() {
        log::debug!(
            "save: breaking {} cyclic overlap(s) totalling {} bytes",
            broken.len(),
            broken.iter().map(|b| b.length).sum::<u64>()
        );
        for overlap in &broken {
            segcol.store_in_memory(overlap.offset, overlap.length)?;
        }
    }

    if report(
        &mut progress,
        SaveProgress {
            phase: SavePhase::BreakCycles,
            bytes_done: 0,
            bytes_total: total_size,
        },
    )
    .is_break()
    {
        return Err(Error::InvalidState("save cancelled after breaking cycles"));
    }

    let vertices = file_backed_segments(segcol, &fd_obj);
    let graph = OverlapGraph::build(&vertices);
    let order = graph.topological_order();

    let mut written = 0u64;
    for idx in order {
        let (seg, mapping) = &vertices[idx];
        let overlap = graph.self_loop_weight(idx);
        write_segment(&fd_obj, seg, *mapping, overlap)?;
        written += seg.size();

        if report(
            &mut progress,
            SaveProgress {
                phase: SavePhase::Write,
                bytes_done: written,
                bytes_total: total_size,
            },
        )
        .is_break()
        {
            return Err(Error::InvalidState("save cancelled while writing"));
        }
    }

    for (seg, mapping) in segcol.iter() {
        if seg.data().same_source(&fd_obj) {
            continue;
        }
        write_segment(&fd_obj, &seg, mapping, 0)?;
    }

    fd_obj.truncate_file(total_size)?;

    let final_segment = Segment::new(fd_obj, 0, total_size)?;
    *segcol = SegmentCollection::new();
    segcol.append(final_segment);

    Ok(())
}
