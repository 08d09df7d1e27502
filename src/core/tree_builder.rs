use crate::core::divide_tree::{DivideTree, Peak, PeakId, Runoff, Saddle, SaddleId};
use crate::io::Tile;
use crate::types::{Elevation, Offsets, PeakError, PeakResult};
use std::collections::VecDeque;

const UNFLOODED: u32 = u32::MAX;

const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Builds the divide tree of a tile by flooding it from the top down.
///
/// Cells are visited in descending elevation (ties in row-major order). A cell
/// with no flooded neighbour starts a new peak; a cell whose flooded
/// neighbours belong to different basins is a saddle between the peaks owning
/// those neighbours. Local maxima along the tile perimeter become runoffs.
pub struct DivideTreeBuilder<'a> {
    tile: &'a Tile,
}

impl<'a> DivideTreeBuilder<'a> {
    pub fn new(tile: &'a Tile) -> Self {
        Self { tile }
    }

    pub fn build(&self) -> PeakResult<DivideTree> {
        log::info!("Building divide tree for {}x{} tile", self.tile.width(), self.tile.height());
        let start = std::time::Instant::now();

        let width = self.tile.width();
        let height = self.tile.height();
        let cell_count = width * height;
        if cell_count >= UNFLOODED as usize {
            return Err(PeakError::Processing(format!(
                "Tile of {} cells is too large to flood",
                cell_count
            )));
        }

        let elevations = self.tile.elevations();
        let mut cells: Vec<(Elevation, u32)> = Vec::with_capacity(cell_count);
        for row in 0..height {
            for col in 0..width {
                if let Some(e) = self.tile.get(Offsets::new(col as i32, row as i32)) {
                    cells.push((e, (row * width + col) as u32));
                }
            }
        }
        if cells.is_empty() {
            return Err(PeakError::Processing("Tile contains no valid samples".to_string()));
        }
        cells.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut tree = DivideTree::new(*self.tile.coordinate_system());
        let mut basins = CellUnionFind::new(cell_count);
        let mut owner: Vec<u32> = vec![UNFLOODED; cell_count];
        let mut links: Vec<(PeakId, PeakId, SaddleId)> = Vec::new();
        let mut flooded: Vec<(Elevation, u32)> = Vec::with_capacity(8);

        for &(elevation, index) in &cells {
            let row = index as usize / width;
            let col = index as usize % width;

            flooded.clear();
            for (dx, dy) in NEIGHBORS {
                let neighbor = Offsets::new(col as i32 + dx, row as i32 + dy);
                if !self.tile.is_in_bounds(neighbor) {
                    continue;
                }
                let n_index = neighbor.y as usize * width + neighbor.x as usize;
                if owner[n_index] != UNFLOODED {
                    flooded.push((elevations[[neighbor.y as usize, neighbor.x as usize]], n_index as u32));
                }
            }

            if flooded.is_empty() {
                let id = tree.add_peak(Peak {
                    location: Offsets::new(col as i32, row as i32),
                    elevation,
                });
                owner[index as usize] = id.0 as u32;
                continue;
            }

            // Highest neighbour first: its basin absorbs this cell
            flooded.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            let (_, highest) = flooded[0];
            owner[index as usize] = owner[highest as usize];
            basins.union(index, highest);

            for &(_, n_index) in &flooded[1..] {
                if basins.find(n_index) == basins.find(index) {
                    continue;
                }
                let saddle = tree.add_saddle(Saddle {
                    location: Offsets::new(col as i32, row as i32),
                    elevation,
                });
                links.push((
                    PeakId(owner[index as usize] as usize),
                    PeakId(owner[n_index as usize] as usize),
                    saddle,
                ));
                basins.union(index, n_index);
            }
        }

        Self::root_at_summits(&mut tree, &links)?;
        self.add_runoffs(&mut tree, &owner)?;

        log::info!(
            "Divide tree: {} peaks, {} saddles, {} runoffs",
            tree.peak_count(),
            tree.saddle_count(),
            tree.runoffs().len()
        );
        log::debug!("Divide tree built in {:?}", start.elapsed());
        Ok(tree)
    }

    /// Orient the undirected links so every tree hangs from its highest peak
    fn root_at_summits(tree: &mut DivideTree, links: &[(PeakId, PeakId, SaddleId)]) -> PeakResult<()> {
        let capacity = tree.peak_capacity();
        let mut adjacency: Vec<Vec<(PeakId, SaddleId)>> = vec![Vec::new(); capacity];
        for &(a, b, saddle) in links {
            adjacency[a.0].push((b, saddle));
            adjacency[b.0].push((a, saddle));
        }

        let mut order: Vec<(Elevation, PeakId)> = tree.peaks().map(|(id, p)| (p.elevation, id)).collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut visited = vec![false; capacity];
        let mut queue = VecDeque::new();
        for (_, summit) in order {
            if visited[summit.0] {
                continue;
            }
            visited[summit.0] = true;
            queue.push_back(summit);
            while let Some(current) = queue.pop_front() {
                for &(next, saddle) in &adjacency[current.0] {
                    if !visited[next.0] {
                        visited[next.0] = true;
                        tree.connect(next, current, saddle)?;
                        queue.push_back(next);
                    }
                }
            }
        }
        Ok(())
    }

    /// Perimeter cells higher than the previous cell and at least as high as
    /// the next one, walking the boundary clockwise from the north-west corner
    fn add_runoffs(&self, tree: &mut DivideTree, owner: &[u32]) -> PeakResult<()> {
        let width = self.tile.width() as i32;
        let height = self.tile.height() as i32;
        if width < 2 || height < 2 {
            return Ok(());
        }

        let mut ring: Vec<Offsets> = Vec::with_capacity(2 * (width + height) as usize);
        ring.extend((0..width).map(|x| Offsets::new(x, 0)));
        ring.extend((1..height).map(|y| Offsets::new(width - 1, y)));
        ring.extend((0..width - 1).rev().map(|x| Offsets::new(x, height - 1)));
        ring.extend((1..height - 1).rev().map(|y| Offsets::new(0, y)));

        let peak_cells: std::collections::HashSet<Offsets> = tree.peaks().map(|(_, p)| p.location).collect();
        let len = ring.len();
        let mut runoffs = Vec::new();
        for i in 0..len {
            let here = ring[i];
            let Some(elevation) = self.tile.get(here) else {
                continue;
            };
            let previous = self.tile.get(ring[(i + len - 1) % len]).unwrap_or(Elevation::MIN);
            let next = self.tile.get(ring[(i + 1) % len]).unwrap_or(Elevation::MIN);
            if elevation > previous && elevation >= next && !peak_cells.contains(&here) {
                let index = here.y as usize * self.tile.width() + here.x as usize;
                runoffs.push(Runoff {
                    location: here,
                    elevation,
                    peak: PeakId(owner[index] as usize),
                });
            }
        }

        for runoff in runoffs {
            tree.add_runoff(runoff)?;
        }
        Ok(())
    }
}

/// Union-find over tile cells
struct CellUnionFind {
    parent: Vec<u32>,
}

impl CellUnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size as u32).collect(),
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grandparent = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grandparent;
            x = grandparent;
        }
        x
    }

    fn union(&mut self, x: u32, y: u32) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x != root_y {
            self.parent[root_x as usize] = root_y;
        }
    }
}
