//! The overlap graph used by the save engine to find a write order that
//! never clobbers bytes a later write still needs to read from the same
//! file.
//!
//! A vertex is a segment whose data object is the file being saved to. An
//! edge `u -> v` means writing `u` at its destination mapping would
//! overwrite bytes `v` still needs to read from its own source range; `v`
//! must therefore be written before `u`. A segment that overlaps its own
//! source (`u -> u`) can't be resolved by reordering and is tracked
//! separately as a self-loop weight, consumed by the segment writer to split
//! the write into non-clobbering pieces.

use crate::disjoint_set::DisjointSet;
use crate::heap::PriorityQueue;
use crate::segment::Segment;

/// Byte length of the overlap between `[a_start, a_start+a_len)` and
/// `[b_start, b_start+b_len)`, or `None` if they don't intersect.
fn overlap_range(a_start: u64, a_len: u64, b_start: u64, b_len: u64) -> Option<(u64, u64)> {
    if a_len == 0 || b_len == 0 {
        return None;
    }
    let a_end = a_start + a_len;
    let b_end = b_start + b_len;
    let start = a_start.max(b_start);
    let end = a_end.min(b_end);
    (end > start).then_some((start, end - start))
}

/// A directed dependency edge: `to` must be written before `from`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub weight: u64,
}

/// A broken edge's overlap range, in file-offset coordinates: the bytes
/// `store_in_memory` must copy out before the write order is safe again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokenOverlap {
    pub offset: u64,
    pub length: u64,
}

/// Graph over the file-backed segments of a save operation.
pub struct OverlapGraph {
    /// `(mapping, seg_start, seg_size)` for each vertex, in vertex-id order.
    vertices: Vec<(u64, u64, u64)>,
}

impl OverlapGraph {
    /// Builds a graph from `(segment, mapping)` pairs, all of which must
    /// belong to the same (file) data object.
    pub fn build(segments: &[(Segment, u64)]) -> Self {
        let vertices = segments
            .iter()
            .map(|(seg, mapping)| (*mapping, seg.start(), seg.size()))
            .collect();
        Self { vertices }
    }

    /// Number of vertices (segments) in the graph.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The overlap, if any, between vertex `i`'s own destination and source
    /// ranges — the amount of itself it would clobber if written naively.
    pub fn self_loop_weight(&self, i: usize) -> u64 {
        let (mapping, start, size) = self.vertices[i];
        overlap_range(mapping, size, start, size)
            .map(|(_, len)| len)
            .unwrap_or(0)
    }

    fn edges(&self) -> Vec<Edge> {
        let n = self.vertices.len();
        let mut edges = Vec::new();
        for from in 0..n {
            let (from_mapping, _, from_size) = self.vertices[from];
            for to in 0..n {
                if from == to {
                    continue;
                }
                let (_, to_start, to_size) = self.vertices[to];
                if let Some((_, weight)) = overlap_range(from_mapping, from_size, to_start, to_size)
                {
                    edges.push(Edge { from, to, weight });
                }
            }
        }
        edges
    }

    /// Computes a maximum-weight spanning forest (treating edges as
    /// undirected for connectivity purposes) via a max-heap plus
    /// union-find, and returns the overlap ranges of the edges that close a
    /// cycle and were therefore rejected.
    ///
    /// After the caller applies `store_in_memory` to each returned range and
    /// rebuilds the graph, it is guaranteed acyclic.
    pub fn break_cycles(&self) -> Vec<BrokenOverlap> {
        let mut heap = PriorityQueue::new();
        for edge in self.edges() {
            heap.push(edge.weight as i64, edge);
        }

        let mut forest = DisjointSet::new(self.vertices.len());
        let mut broken = Vec::new();

        while let Some((_, edge)) = heap.pop_max() {
            if forest.union(edge.from, edge.to) {
                continue;
            }
            let (from_mapping, _, _) = self.vertices[edge.from];
            let (_, to_start, _) = self.vertices[edge.to];
            broken.push(BrokenOverlap {
                offset: from_mapping.max(to_start),
                length: edge.weight,
            });
        }

        broken
    }

    /// A write order in which every `from -> to` edge has `to` earlier in
    /// the returned order than `from`.
    ///
    /// # Panics
    ///
    /// Panics if the graph still contains a cycle; callers must call this
    /// only after `break_cycles` and the corresponding `store_in_memory`
    /// calls have made the graph acyclic.
    pub fn topological_order(&self) -> Vec<usize> {
        let n = self.vertices.len();
        let mut adjacency = vec![Vec::new(); n];
        for edge in self.edges() {
            adjacency[edge.from].push(edge.to);
        }

        const UNVISITED: u8 = 0;
        const ON_STACK: u8 = 1;
        const DONE: u8 = 2;

        let mut state = vec![UNVISITED; n];
        let mut order = Vec::with_capacity(n);

        for start in 0..n {
            if state[start] != UNVISITED {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            state[start] = ON_STACK;
            while let Some(&mut (node, ref mut next_edge)) = stack.last_mut() {
                if *next_edge < adjacency[node].len() {
                    let child = adjacency[node][*next_edge];
                    *next_edge += 1;
                    match state[child] {
                        UNVISITED => {
                            state[child] = ON_STACK;
                            stack.push((child, 0));
                        }
                        ON_STACK => panic!("overlap graph still has a cycle"),
                        DONE => {}
                    }
                } else {
                    state[node] = DONE;
                    order.push(node);
                    stack.pop();
                }
            }
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_object::DataObject;

    fn seg_at(file: &DataObject, start: u64, size: u64) -> Segment {
        Segment::new(file.clone(), start, size).unwrap()
    }

    #[test]
    fn overlap_range_detects_intersection() {
        assert_eq!(overlap_range(0, 5, 3, 5), Some((3, 2)));
        assert_eq!(overlap_range(0, 5, 5, 5), None);
        assert_eq!(overlap_range(0, 0, 0, 5), None);
    }

    #[test]
    fn overlap_range_is_commutative_and_zero_iff_disjoint() {
        bolero::check!()
            .with_type::<(u32, u32, u32, u32)>()
            .for_each(|(a, la, b, lb)| {
                let (a, la, b, lb) = (*a as u64, *la as u64, *b as u64, *lb as u64);
                let forward = overlap_range(a, la, b, lb);
                let backward = overlap_range(b, lb, a, la);
                assert_eq!(forward.map(|(_, len)| len), backward.map(|(_, len)| len));

                let disjoint = a + la <= b || b + lb <= a || la == 0 || lb == 0;
                assert_eq!(forward.is_none(), disjoint);
            });
    }

    #[test]
    fn self_loop_detects_segment_overlapping_its_own_source() {
        let file = DataObject::memory(vec![0u8; 100], None);
        // Segment read from [10, 20), written to [15, 25): overlaps itself.
        let graph = OverlapGraph::build(&[(seg_at(&file, 10, 10), 15)]);
        assert_eq!(graph.self_loop_weight(0), 5);
    }

    #[test]
    fn acyclic_graph_keeps_every_edge() {
        let file = DataObject::memory(vec![0u8; 100], None);
        // v0 reads [0,10) writes to [20,30); v1 reads [20,30) writes to [40,50).
        // v1's write doesn't clobber v0's source, no cycle.
        let graph = OverlapGraph::build(&[(seg_at(&file, 0, 10), 20), (seg_at(&file, 20, 10), 40)]);
        assert!(graph.break_cycles().is_empty());
        let order = graph.topological_order();
        assert_eq!(order.len(), 2);
        let pos0 = order.iter().position(|&v| v == 0).unwrap();
        let pos1 = order.iter().position(|&v| v == 1).unwrap();
        assert!(pos1 < pos0, "v1 (the dependency) must be written first");
    }

    #[test]
    fn two_cycle_breaks_the_lighter_edge() {
        let file = DataObject::memory(vec![0u8; 100], None);
        // v0 reads [0,10), writes to [5,15): fully clobbers v1's [5,15) source (weight 10).
        // v1 reads [5,15), writes to [3,13): clobbers [3,10) of v0's [0,10) source (weight 7).
        let graph = OverlapGraph::build(&[(seg_at(&file, 0, 10), 5), (seg_at(&file, 5, 10), 3)]);
        let broken = graph.break_cycles();
        assert_eq!(broken.len(), 1);
        // The lighter edge (weight 7, v1->v0) should be the one broken,
        // keeping the heavier v0->v1 edge in the spanning forest.
        assert_eq!(broken[0].length, 7);
    }
}
