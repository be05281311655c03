//! Path-compressing union-find scoped to a single merge pass.
//!
//! Elements are positions in the merge pass's cluster ordering, not cluster
//! ids. The structure is discarded once the pass completes.

#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    /// `n` singleton sets.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    /// Representative of `i`'s set, compressing the path on the way.
    pub fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Point `child`'s set at `root`'s set. The absorbing side keeps its
    /// representative.
    pub fn link(&mut self, child: usize, root: usize) {
        let child_root = self.find(child);
        let root = self.find(root);
        if child_root != root {
            self.parent[child_root] = root;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut uf = UnionFind::new(3);
        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(2), 2);
    }

    #[test]
    fn test_chained_links_resolve_to_final_root() {
        let mut uf = UnionFind::new(4);
        uf.link(0, 1);
        uf.link(1, 2);

        assert_eq!(uf.find(0), 2);
        assert_eq!(uf.find(1), 2);
        assert_eq!(uf.find(2), 2);
        assert_eq!(uf.find(3), 3);
        println!("[PASS] test_chained_links_resolve_to_final_root - 0 -> 1 -> 2");
    }

    #[test]
    fn test_link_keeps_absorbing_representative() {
        let mut uf = UnionFind::new(3);
        uf.link(2, 0);
        uf.link(1, 2);
        assert_eq!(uf.find(1), 0);
        assert_eq!(uf.find(2), 0);
    }
}
