//! Union-find over `usize` vertex ids, used by the save engine to compute a
//! maximum-weight spanning forest of the overlap graph.

/// A disjoint-set (union-find) over the ids `0..size`, each initially in its
/// own set. Uses union-by-rank with path compression.
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl DisjointSet {
    /// Creates a new disjoint-set with `size` singleton sets.
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    /// Finds the representative (root) of the set containing `id`,
    /// compressing the path along the way.
    pub fn find(&mut self, id: usize) -> usize {
        if self.parent[id] != id {
            self.parent[id] = self.find(self.parent[id]);
        }
        self.parent[id]
    }

    /// Unions the sets containing `a` and `b`.
    ///
    /// Returns `true` if they were in different sets (and are now merged),
    /// `false` if they were already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }

        let rank_a = self.rank[root_a];
        let rank_b = self.rank[root_b];
        if rank_a > rank_b {
            self.parent[root_b] = root_a;
        } else {
            self.parent[root_a] = root_b;
            if rank_a == rank_b {
                self.rank[root_b] += 1;
            }
        }
        true
    }
}
