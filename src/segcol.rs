//! An ordered collection of [`Segment`]s giving the logical byte layout of a
//! buffer. Offsets are resolved to segments with a single cached `(node,
//! mapping)` slot: most lookups are near the previous one (sequential reads,
//! action replay during undo/redo, the save engine's linear write order), so
//! remembering the last hit and walking forward or backward from there beats
//! re-searching from the front every time.

use std::cell::RefCell;

use crate::error::{Error, Result};
use crate::list::{List, NodeRef};
use crate::segment::Segment;

/// An ordered collection of segments with an offset-addressable view.
pub struct SegmentCollection {
    list: List<Segment>,
    total_size: u64,
    cache: RefCell<Option<(NodeRef<Segment>, u64)>>,
}

impl Default for SegmentCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentCollection {
    /// Creates a new, empty segment collection.
    pub fn new() -> Self {
        Self {
            list: List::new(),
            total_size: 0,
            cache: RefCell::new(None),
        }
    }

    /// Total number of bytes mapped by this collection.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// True if the collection maps no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Invalidates the cached lookup. Any structural change to the list
    /// (insert, delete) must call this before touching node contents, since
    /// the cache holds onto a node that may be split or removed.
    fn clear_cache(&self) {
        *self.cache.borrow_mut() = None;
    }

    /// Finds the node containing logical `offset`, along with the offset its
    /// first byte is mapped to.
    ///
    /// Starts from the cached node if one is set, otherwise from the front of
    /// the list, and walks forward or backward as needed.
    fn locate(&self, offset: u64) -> Result<(NodeRef<Segment>, u64)> {
        if offset >= self.total_size {
            return Err(Error::InvalidArgument(format!(
                "offset {offset} is out of range for a collection of size {}",
                self.total_size
            )));
        }

        let (mut node, mut mapping) = match self.cache.borrow().clone() {
            Some(cached) => cached,
            None => (
                self.list
                    .front()
                    .expect("total_size > 0 implies a non-empty list"),
                0,
            ),
        };

        loop {
            let size = node.with_value(|s| s.size());
            if offset >= mapping && offset < mapping + size {
                *self.cache.borrow_mut() = Some((node.clone(), mapping));
                return Ok((node, mapping));
            }
            if offset < mapping {
                let prev = node
                    .prev()
                    .expect("offset within range implies a predecessor exists");
                mapping -= prev.with_value(|s| s.size());
                node = prev;
            } else {
                mapping += size;
                node = node
                    .next()
                    .expect("offset within range implies a successor exists");
            }
        }
    }

    /// Appends `seg` to the end of the collection.
    pub fn append(&mut self, seg: Segment) {
        self.total_size += seg.size();
        self.list.push_back(seg);
    }

    /// Inserts `seg` so that it begins at logical `offset`, splitting the
    /// segment currently covering `offset` if `offset` falls in its
    /// interior.
    pub fn insert(&mut self, offset: u64, seg: Segment) -> Result<()> {
        if offset > self.total_size {
            return Err(Error::InvalidArgument(format!(
                "insert offset {offset} exceeds collection size {}",
                self.total_size
            )));
        }

        self.clear_cache();
        let seg_size = seg.size();

        if offset == self.total_size {
            self.list.push_back(seg);
            self.total_size += seg_size;
            return Ok(());
        }

        let (node, mapping) = self.locate(offset)?;
        let split_index = offset - mapping;

        if split_index == 0 {
            self.list.insert_before(&node, seg);
        } else {
            let right = node.with_value_mut(|s| s.split_at(split_index));
            let inserted = self.list.insert_after(&node, seg);
            self.list.insert_after(&inserted, right);
        }

        self.total_size += seg_size;
        Ok(())
    }

    /// Removes `[offset, offset + length)` from the collection, returning the
    /// removed bytes as a standalone collection (remapped to start at 0).
    ///
    /// Segments that only partially overlap the range are split so that only
    /// the overlapping part is removed; the kept prefix and suffix are
    /// spliced back into `self` in place.
    pub fn delete(&mut self, offset: u64, length: u64) -> Result<SegmentCollection> {
        if length == 0 {
            if offset > self.total_size {
                return Err(Error::InvalidArgument(format!(
                    "delete offset {offset} exceeds collection size {}",
                    self.total_size
                )));
            }
            return Ok(SegmentCollection::new());
        }

        let end = offset
            .checked_add(length)
            .ok_or(Error::Overflow("delete offset + length"))?;
        if end > self.total_size {
            return Err(Error::InvalidArgument(format!(
                "delete range [{offset}, {end}) exceeds collection size {}",
                self.total_size
            )));
        }

        self.clear_cache();

        let (first_node, first_mapping) = self.locate(offset)?;
        let (last_node, last_mapping) = self.locate(end - 1)?;
        let same_node = first_node.same_node(&last_node);
        let last_size = last_node.with_value(|s| s.size());

        let prev_of_first = first_node.prev();
        let next_of_last = last_node.next();

        let removed = self.list.detach_chain(first_node.clone(), last_node.clone());

        // The chain we just detached covers both segments in full; carve the
        // kept prefix of the first segment and the kept suffix of the last
        // one back out and splice them into the main list.
        if first_mapping < offset {
            let split_index = offset - first_mapping;
            let remainder = first_node.with_value_mut(|s| s.split_at(split_index));
            let prefix = first_node.replace_value(remainder);
            match &prev_of_first {
                Some(prev) => {
                    self.list.insert_after(prev, prefix);
                }
                None => {
                    self.list.push_front(prefix);
                }
            }
        }

        if last_mapping + last_size > end {
            // If both ends fall in the same segment, the prefix split above
            // already shrank it; the suffix split index must be taken
            // relative to what's left, not the original segment.
            let already_trimmed = if same_node { offset - first_mapping } else { 0 };
            let split_index = end - last_mapping - already_trimmed;
            let suffix = last_node.with_value_mut(|s| s.split_at(split_index));
            match &next_of_last {
                Some(next) => {
                    self.list.insert_before(next, suffix);
                }
                None => {
                    self.list.push_back(suffix);
                }
            }
        }

        self.total_size -= length;

        Ok(SegmentCollection {
            list: removed,
            total_size: length,
            cache: RefCell::new(None),
        })
    }

    /// Visits each segment overlapping `[offset, offset + length)` in order,
    /// passing its data and the logical offset it starts at.
    pub fn for_each_in_range<F>(&self, offset: u64, length: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(&Segment, u64) -> Result<()>,
    {
        if length == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(length)
            .ok_or(Error::Overflow("range offset + length"))?;
        if end > self.total_size {
            return Err(Error::InvalidArgument(format!(
                "range [{offset}, {end}) exceeds collection size {}",
                self.total_size
            )));
        }

        let (mut node, mut mapping) = self.locate(offset)?;
        loop {
            let size = node.with_value(|s| s.size());
            node.with_value(|s| visit(s, mapping))?;
            if mapping + size >= end {
                break;
            }
            mapping += size;
            node = node
                .next()
                .expect("range within bounds implies a successor exists");
        }
        Ok(())
    }

    /// Replaces every segment overlapping `[offset, offset + length)` whose
    /// data object is file-backed with a fresh in-memory copy.
    ///
    /// Used by the save engine to break a cyclic dependency in the overlap
    /// graph: once the bytes a segment depends on are copied out of the file,
    /// overwriting that region in place can no longer corrupt it.
    ///
    /// Snapshots each *whole* segment touched by `[offset, offset + length)`,
    /// not just the overlapping slice — a superset of the required range, so
    /// it still breaks the cycle, but a caller passing a narrow range against
    /// a much larger segment pays for a full-segment copy. Simpler than
    /// splitting the segment at `offset`/`end` first and copying only the
    /// middle piece, and the save engine only ever calls this for the
    /// handful of segments an overlap graph found cyclic, not hot-path code.
    pub fn store_in_memory(&mut self, offset: u64, length: u64) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(length)
            .ok_or(Error::Overflow("store_in_memory offset + length"))?;
        if end > self.total_size {
            return Err(Error::InvalidArgument(format!(
                "range [{offset}, {end}) exceeds collection size {}",
                self.total_size
            )));
        }

        self.clear_cache();

        let (mut node, mut mapping) = self.locate(offset)?;
        loop {
            let size = node.with_value(|s| s.size());
            let needs_copy = node.with_value(|s| s.data().is_file());
            if needs_copy {
                let copied = node.with_value(|s| s.data().snapshot(s.start(), s.size()))?;
                let new_seg = Segment::new(copied, 0, size)?;
                node.replace_value(new_seg);
            }
            if mapping + size >= end {
                break;
            }
            mapping += size;
            node = node
                .next()
                .expect("range within bounds implies a successor exists");
        }
        Ok(())
    }

    /// Iterates over every `(segment, mapping)` pair in order.
    pub fn iter(&self) -> impl Iterator<Item = (Segment, u64)> + '_ {
        let mut mapping = 0u64;
        self.list.iter_nodes().map(move |node| {
            let seg = node.with_value(|s| s.clone());
            let at = mapping;
            mapping += seg.size();
            (seg, at)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_object::DataObject;

    fn seg(bytes: &[u8]) -> Segment {
        let data = DataObject::memory(bytes.to_vec(), None);
        let len = data.size();
        Segment::new(data, 0, len).unwrap()
    }

    fn collect_bytes(segcol: &SegmentCollection) -> Vec<u8> {
        let mut out = Vec::new();
        for (s, _) in segcol.iter() {
            let mut buf = vec![0u8; s.size() as usize];
            s.read_into(0, &mut buf).unwrap();
            out.extend(buf);
        }
        out
    }

    #[test]
    fn append_accumulates_size_and_order() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abc"));
        sc.append(seg(b"de"));
        assert_eq!(sc.total_size(), 5);
        assert_eq!(collect_bytes(&sc), b"abcde");
    }

    #[test]
    fn insert_splits_segment_at_interior_offset() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abcdef"));
        sc.insert(3, seg(b"XYZ")).unwrap();
        assert_eq!(collect_bytes(&sc), b"abcXYZdef");
        assert_eq!(sc.total_size(), 9);
    }

    #[test]
    fn insert_at_boundary_needs_no_split() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abc"));
        sc.append(seg(b"def"));
        sc.insert(3, seg(b"XY")).unwrap();
        assert_eq!(collect_bytes(&sc), b"abcXYdef");
    }

    #[test]
    fn insert_at_end_appends() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abc"));
        sc.insert(3, seg(b"def")).unwrap();
        assert_eq!(collect_bytes(&sc), b"abcdef");
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abc"));
        assert!(sc.insert(4, seg(b"x")).is_err());
    }

    #[test]
    fn delete_within_single_segment_keeps_prefix_and_suffix() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abcdefgh"));
        let removed = sc.delete(2, 3).unwrap();
        assert_eq!(collect_bytes(&sc), b"abfgh");
        assert_eq!(collect_bytes(&removed), b"cde");
        assert_eq!(removed.total_size(), 3);
    }

    #[test]
    fn delete_spanning_whole_segments_and_partial_ends() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"aaa"));
        sc.append(seg(b"bbb"));
        sc.append(seg(b"ccc"));
        // Removes the back half of "aaa", all of "bbb", the front half of
        // "ccc".
        let removed = sc.delete(1, 7).unwrap();
        assert_eq!(collect_bytes(&sc), b"ac");
        assert_eq!(collect_bytes(&removed), b"aabbbcc");
        assert_eq!(sc.total_size(), 2);
    }

    #[test]
    fn delete_exact_segment_boundaries_leaves_neighbors_untouched() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"aaa"));
        sc.append(seg(b"bbb"));
        sc.append(seg(b"ccc"));
        let removed = sc.delete(3, 3).unwrap();
        assert_eq!(collect_bytes(&sc), b"aaaccc");
        assert_eq!(collect_bytes(&removed), b"bbb");
    }

    #[test]
    fn delete_everything_leaves_empty_collection() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abcdef"));
        let removed = sc.delete(0, 6).unwrap();
        assert_eq!(sc.total_size(), 0);
        assert!(sc.is_empty());
        assert_eq!(collect_bytes(&removed), b"abcdef");
    }

    #[test]
    fn delete_out_of_range_is_rejected() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"abc"));
        assert!(sc.delete(1, 10).is_err());
    }

    #[test]
    fn for_each_in_range_visits_overlapping_segments_only() {
        let mut sc = SegmentCollection::new();
        sc.append(seg(b"aaa"));
        sc.append(seg(b"bbb"));
        sc.append(seg(b"ccc"));
        let mut seen = Vec::new();
        sc.for_each_in_range(2, 4, |s, mapping| {
            let mut buf = vec![0u8; s.size() as usize];
            s.read_into(0, &mut buf).unwrap();
            seen.push((mapping, buf));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(0, b"aaa".to_vec()), (3, b"bbb".to_vec())]);
    }

    #[test]
    fn repeated_nearby_lookups_reuse_the_cache() {
        let mut sc = SegmentCollection::new();
        for _ in 0..50 {
            sc.append(seg(b"x"));
        }
        // Walking forward one byte at a time should hit the "move forward
        // from cache" path repeatedly rather than re-searching from front.
        for offset in 0..50u64 {
            let (_, mapping) = sc.locate(offset).unwrap();
            assert_eq!(mapping, offset);
        }
    }
}
