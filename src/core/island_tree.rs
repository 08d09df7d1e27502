use crate::core::divide_tree::{DivideTree, PeakId, SaddleId};
use crate::types::Elevation;

/// Prominence record of one peak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IslandNode {
    /// Elevation drop to the key saddle, or the elevation itself for island roots
    pub prominence: Elevation,
    /// Saddle defining the prominence; `None` for the highest peak of an island
    pub key_saddle: Option<SaddleId>,
    /// Higher peak reached across the key saddle
    pub parent: Option<PeakId>,
}

impl IslandNode {
    pub fn is_root(&self) -> bool {
        self.key_saddle.is_none()
    }
}

/// Per-peak prominence and key saddle derived from a divide tree.
///
/// Never patched in place: rebuild it whenever the divide tree changes.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandTree {
    nodes: Vec<Option<IslandNode>>,
}

impl IslandTree {
    /// Merge peaks in order of descending saddle elevation. At each saddle the
    /// lower of the two merging islands' summits gets that saddle as its key saddle.
    pub fn build(tree: &DivideTree) -> Self {
        let capacity = tree.peak_capacity();
        let mut nodes: Vec<Option<IslandNode>> = vec![None; capacity];
        for (id, peak) in tree.peaks() {
            nodes[id.0] = Some(IslandNode {
                prominence: peak.elevation,
                key_saddle: None,
                parent: None,
            });
        }

        let mut edges: Vec<(PeakId, PeakId, SaddleId, Elevation)> = tree
            .edges()
            .filter_map(|(child, edge)| {
                tree.saddle(edge.saddle)
                    .map(|s| (child, edge.parent, edge.saddle, s.elevation))
            })
            .collect();
        edges.sort_by(|a, b| b.3.cmp(&a.3).then(a.2.cmp(&b.2)));

        let elevation = |id: PeakId| tree.peak(id).map_or(Elevation::MIN, |p| p.elevation);
        let mut islands = UnionFind::new(capacity);

        for (a, b, saddle, saddle_elevation) in edges {
            let root_a = islands.find(a.0);
            let root_b = islands.find(b.0);
            if root_a == root_b {
                log::warn!("Saddle {} closes a cycle in the divide tree, ignoring it", saddle);
                continue;
            }

            let top_a = islands.top[root_a];
            let top_b = islands.top[root_b];
            let a_is_higher = elevation(top_a) > elevation(top_b)
                || (elevation(top_a) == elevation(top_b) && top_a < top_b);
            let (lower, higher) = if a_is_higher { (top_b, top_a) } else { (top_a, top_b) };

            nodes[lower.0] = Some(IslandNode {
                prominence: (elevation(lower) - saddle_elevation).max(0),
                key_saddle: Some(saddle),
                parent: Some(higher),
            });
            islands.union(root_a, root_b, higher);
        }

        let roots = nodes.iter().flatten().filter(|n| n.is_root()).count();
        log::debug!("Island tree built: {} peaks in {} islands", tree.peak_count(), roots);
        Self { nodes }
    }

    pub fn node(&self, id: PeakId) -> Option<&IslandNode> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    pub fn prominence(&self, id: PeakId) -> Option<Elevation> {
        self.node(id).map(|n| n.prominence)
    }

    /// Nodes of live peaks in id order
    pub fn nodes(&self) -> impl Iterator<Item = (PeakId, &IslandNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (PeakId(i), n)))
    }
}

/// Union-find over peak slots, tracking the highest peak of each set
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
    top: Vec<PeakId>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
            top: (0..size).map(PeakId).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, root_x: usize, root_y: usize, top: PeakId) {
        let (parent_root, child_root) = if self.rank[root_x] >= self.rank[root_y] {
            (root_x, root_y)
        } else {
            (root_y, root_x)
        };
        if self.rank[root_x] == self.rank[root_y] {
            self.rank[parent_root] += 1;
        }
        self.parent[child_root] = parent_root;
        self.top[parent_root] = top;
    }
}
