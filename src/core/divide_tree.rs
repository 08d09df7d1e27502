use crate::core::island_tree::IslandTree;
use crate::io::{KmlPeakStyle, KmlWriter, TextWriter};
use crate::types::{CoordinateSystem, Elevation, Offsets, PeakError, PeakResult};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Leading bytes of a structural divide tree dump
const DVT_MAGIC: &[u8; 4] = b"DVT1";

/// Popup map peak styles: minimum prominence, style name, colour, scale.
/// Highest band first; peaks below the last band use the default style.
const PROMINENCE_BANDS: [(Elevation, &str, &str, f32); 3] = [
    (2000, "prom2000", "ff0000ff", 1.6),
    (1000, "prom1000", "ff0080ff", 1.4),
    (300, "prom300", "ff00ffff", 1.3),
];

fn prominence_band(prominence: Elevation) -> Option<&'static str> {
    PROMINENCE_BANDS
        .iter()
        .find(|(min, _, _, _)| prominence >= *min)
        .map(|(_, name, _, _)| *name)
}

/// Stable index of a peak within one divide tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeakId(pub usize);

/// Stable index of a saddle within one divide tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaddleId(pub usize);

impl std::fmt::Display for PeakId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl std::fmt::Display for SaddleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// A local elevation maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peak {
    pub location: Offsets,
    pub elevation: Elevation,
}

/// Lowest point on the divide between two peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Saddle {
    pub location: Offsets,
    pub elevation: Elevation,
}

/// Point where a divide leaves the tile; an artifact of the data extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runoff {
    pub location: Offsets,
    pub elevation: Elevation,
    /// Peak whose basin drains through this runoff
    pub peak: PeakId,
}

/// Edge from a peak to its parent in the divide tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentEdge {
    pub parent: PeakId,
    pub saddle: SaddleId,
}

/// Graph of peaks, saddles and runoffs describing the ridge topology of a tile.
///
/// Peaks and saddles live in arenas addressed by [`PeakId`] / [`SaddleId`].
/// Removal tombstones a slot instead of shifting later entries, so ids held
/// elsewhere (island trees, metrics rows) stay valid across pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivideTree {
    coords: CoordinateSystem,
    peaks: Vec<Option<Peak>>,
    nodes: Vec<Option<ParentEdge>>,
    saddles: Vec<Option<Saddle>>,
    runoffs: Vec<Runoff>,
}

impl DivideTree {
    pub fn new(coords: CoordinateSystem) -> Self {
        Self {
            coords,
            peaks: Vec::new(),
            nodes: Vec::new(),
            saddles: Vec::new(),
            runoffs: Vec::new(),
        }
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coords
    }

    pub fn add_peak(&mut self, peak: Peak) -> PeakId {
        self.peaks.push(Some(peak));
        self.nodes.push(None);
        PeakId(self.peaks.len() - 1)
    }

    pub fn add_saddle(&mut self, saddle: Saddle) -> SaddleId {
        self.saddles.push(Some(saddle));
        SaddleId(self.saddles.len() - 1)
    }

    pub fn add_runoff(&mut self, runoff: Runoff) -> PeakResult<()> {
        if self.peak(runoff.peak).is_none() {
            return Err(PeakError::Processing(format!(
                "Runoff at {} references missing peak {}",
                runoff.location, runoff.peak
            )));
        }
        self.runoffs.push(runoff);
        Ok(())
    }

    /// Make `parent` the parent of `child` across `saddle`
    pub fn connect(&mut self, child: PeakId, parent: PeakId, saddle: SaddleId) -> PeakResult<()> {
        if child == parent {
            return Err(PeakError::Processing(format!("Peak {} cannot be its own parent", child)));
        }
        if self.peak(child).is_none() || self.peak(parent).is_none() || self.saddle(saddle).is_none() {
            return Err(PeakError::Processing(format!(
                "Cannot connect {} to {} across {}: unknown id",
                child, parent, saddle
            )));
        }
        if self.nodes[child.0].is_some() {
            return Err(PeakError::Processing(format!("Peak {} already has a parent", child)));
        }
        self.nodes[child.0] = Some(ParentEdge { parent, saddle });
        Ok(())
    }

    pub fn peak(&self, id: PeakId) -> Option<&Peak> {
        self.peaks.get(id.0).and_then(|p| p.as_ref())
    }

    pub fn saddle(&self, id: SaddleId) -> Option<&Saddle> {
        self.saddles.get(id.0).and_then(|s| s.as_ref())
    }

    pub fn parent_edge(&self, id: PeakId) -> Option<ParentEdge> {
        self.nodes.get(id.0).copied().flatten()
    }

    /// Live peaks in id order
    pub fn peaks(&self) -> impl Iterator<Item = (PeakId, &Peak)> {
        self.peaks
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (PeakId(i), p)))
    }

    /// Live saddles in id order
    pub fn saddles(&self) -> impl Iterator<Item = (SaddleId, &Saddle)> {
        self.saddles
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SaddleId(i), s)))
    }

    /// Every (child, edge) pair of the tree
    pub fn edges(&self) -> impl Iterator<Item = (PeakId, ParentEdge)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|edge| (PeakId(i), *edge)))
    }

    pub fn runoffs(&self) -> &[Runoff] {
        &self.runoffs
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.iter().filter(|p| p.is_some()).count()
    }

    pub fn saddle_count(&self) -> usize {
        self.saddles.iter().filter(|s| s.is_some()).count()
    }

    /// Number of peak slots, tombstones included
    pub fn peak_capacity(&self) -> usize {
        self.peaks.len()
    }

    /// Remove every runoff. Returns how many were removed.
    ///
    /// Island trees never use runoffs, so this leaves any prominence already
    /// derived from the tree valid.
    pub fn delete_runoffs(&mut self) -> usize {
        let removed = self.runoffs.len();
        self.runoffs.clear();
        log::debug!("Deleted {} runoffs", removed);
        removed
    }

    /// Remove every peak whose prominence in `island_tree` is below `min_prominence`.
    ///
    /// A removed peak is joined to the neighbour (parent or child) across its
    /// highest adjacent saddle, and that saddle is deleted. The lower saddles
    /// stay, so every surviving path keeps its lowest col. On equal saddles the
    /// parent wins, then the child with the lower id. A winning child takes over
    /// the removed peak's parent edge. Remaining children and runoffs move to the
    /// successor. Returns the number of peaks removed.
    pub fn prune(&mut self, min_prominence: Elevation, island_tree: &IslandTree) -> usize {
        let mut children: Vec<Vec<PeakId>> = vec![Vec::new(); self.peaks.len()];
        for (child, edge) in self.edges() {
            children[edge.parent.0].push(child);
        }
        let mut runoffs_of: Vec<Vec<usize>> = vec![Vec::new(); self.peaks.len()];
        for (i, runoff) in self.runoffs.iter().enumerate() {
            runoffs_of[runoff.peak.0].push(i);
        }
        let mut dead_runoffs = vec![false; self.runoffs.len()];

        let doomed: Vec<PeakId> = self
            .peaks()
            .filter(|(id, _)| {
                island_tree
                    .node(*id)
                    .map_or(false, |node| node.prominence < min_prominence)
            })
            .map(|(id, _)| id)
            .collect();

        for &id in &doomed {
            self.remove_peak(id, &mut children, &mut runoffs_of, &mut dead_runoffs);
        }

        let mut index = 0;
        self.runoffs.retain(|_| {
            let keep = !dead_runoffs[index];
            index += 1;
            keep
        });

        log::debug!(
            "Pruned {} peaks below prominence {}; {} peaks and {} saddles remain",
            doomed.len(),
            min_prominence,
            self.peak_count(),
            self.saddle_count()
        );
        doomed.len()
    }

    fn remove_peak(
        &mut self,
        id: PeakId,
        children: &mut [Vec<PeakId>],
        runoffs_of: &mut [Vec<usize>],
        dead_runoffs: &mut [bool],
    ) {
        let parent_edge = self.nodes[id.0].take();

        // (neighbour, saddle elevation, neighbour is a child)
        let mut best = parent_edge.map(|edge| (edge.parent, self.saddle_elevation(edge.saddle), false));
        for &child in &children[id.0] {
            let elevation = self.parent_saddle_elevation(child);
            let wins = match best {
                None => true,
                Some((current, top, is_child)) => {
                    elevation > top || (elevation == top && is_child && child < current)
                }
            };
            if wins {
                best = Some((child, elevation, true));
            }
        }

        if let Some(edge) = parent_edge {
            children[edge.parent.0].retain(|c| *c != id);
        }
        let successor = match best {
            Some((parent, _, false)) => {
                if let Some(edge) = parent_edge {
                    self.saddles[edge.saddle.0] = None;
                }
                Some(parent)
            }
            Some((child, _, true)) => {
                if let Some(edge) = self.nodes[child.0].take() {
                    self.saddles[edge.saddle.0] = None;
                }
                children[id.0].retain(|c| *c != child);
                self.nodes[child.0] = parent_edge;
                if let Some(edge) = parent_edge {
                    children[edge.parent.0].push(child);
                }
                Some(child)
            }
            None => None,
        };

        let orphans = std::mem::take(&mut children[id.0]);
        let orphan_runoffs = std::mem::take(&mut runoffs_of[id.0]);
        match successor {
            Some(successor) => {
                for child in &orphans {
                    if let Some(edge) = self.nodes[child.0].as_mut() {
                        edge.parent = successor;
                    }
                }
                children[successor.0].extend(orphans);
                for &r in &orphan_runoffs {
                    self.runoffs[r].peak = successor;
                }
                runoffs_of[successor.0].extend(orphan_runoffs);
            }
            None => {
                for r in orphan_runoffs {
                    dead_runoffs[r] = true;
                }
            }
        }

        self.peaks[id.0] = None;
    }

    fn saddle_elevation(&self, id: SaddleId) -> Elevation {
        self.saddle(id).map_or(Elevation::MIN, |s| s.elevation)
    }

    fn parent_saddle_elevation(&self, id: PeakId) -> Elevation {
        self.parent_edge(id)
            .map_or(Elevation::MIN, |edge| self.saddle_elevation(edge.saddle))
    }

    /// Check the structural invariants: every edge and runoff references live
    /// records, each live saddle sits on exactly one edge, and parent links are acyclic.
    pub fn validate(&self) -> PeakResult<()> {
        let mut saddle_uses = vec![0usize; self.saddles.len()];
        for (child, edge) in self.edges() {
            if self.peak(child).is_none() {
                return Err(PeakError::Processing(format!("Removed peak {} still has an edge", child)));
            }
            if self.peak(edge.parent).is_none() {
                return Err(PeakError::Processing(format!(
                    "Peak {} has removed parent {}",
                    child, edge.parent
                )));
            }
            if self.saddle(edge.saddle).is_none() {
                return Err(PeakError::Processing(format!(
                    "Peak {} has removed saddle {}",
                    child, edge.saddle
                )));
            }
            saddle_uses[edge.saddle.0] += 1;
        }
        for (id, _) in self.saddles() {
            if saddle_uses[id.0] != 1 {
                return Err(PeakError::Processing(format!(
                    "Saddle {} is used by {} edges",
                    id, saddle_uses[id.0]
                )));
            }
        }
        for runoff in &self.runoffs {
            if self.peak(runoff.peak).is_none() {
                return Err(PeakError::Processing(format!(
                    "Runoff at {} references removed peak {}",
                    runoff.location, runoff.peak
                )));
            }
        }
        for (id, _) in self.peaks() {
            let mut current = id;
            let mut steps = 0;
            while let Some(edge) = self.parent_edge(current) {
                current = edge.parent;
                steps += 1;
                if steps > self.peaks.len() {
                    return Err(PeakError::Processing(format!("Cycle through peak {}", id)));
                }
            }
        }
        Ok(())
    }

    /// Write the lossless structural form
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> PeakResult<()> {
        let path = path.as_ref();
        log::info!("Writing divide tree to: {}", path.display());
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(DVT_MAGIC)?;
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a tree written by [`DivideTree::write_to_file`]
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> PeakResult<Self> {
        let path = path.as_ref();
        log::info!("Reading divide tree from: {}", path.display());
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != DVT_MAGIC {
            return Err(PeakError::InvalidFormat(format!(
                "{} is not a divide tree file",
                path.display()
            )));
        }
        let tree: DivideTree = bincode::deserialize_from(reader)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn to_kml(&self) -> String {
        self.render_kml(false)
    }

    /// KML with placemark ids and a description popup on each peak
    pub fn to_kml_with_popups(&self) -> String {
        self.render_kml(true)
    }

    fn render_kml(&self, popups: bool) -> String {
        let island_tree = popups.then(|| IslandTree::build(self));
        let mut writer = if popups {
            let styles: Vec<KmlPeakStyle> = PROMINENCE_BANDS
                .iter()
                .map(|(_, name, color, scale)| KmlPeakStyle::new(*name, *color, *scale))
                .collect();
            KmlWriter::with_peak_styles(&self.coords, &styles)
        } else {
            KmlWriter::new(&self.coords)
        };

        writer.start_folder("Peaks");
        for (id, peak) in self.peaks() {
            let prominence = island_tree.as_ref().and_then(|t| t.prominence(id));
            let description = if popups {
                let pos = self.coords.latlng(peak.location);
                let mut text = format!(
                    "elevation {}, lat {:.4}, lng {:.4}",
                    peak.elevation, pos.latitude, pos.longitude
                );
                if let Some(prominence) = prominence {
                    text.push_str(&format!(", prominence {}", prominence));
                }
                text
            } else {
                String::new()
            };
            let style = prominence.and_then(prominence_band);
            writer.add_peak(peak, style, &id.to_string(), &description, popups.then_some(id.0));
        }
        writer.end_folder();

        writer.start_folder("Prominence saddles");
        for (id, saddle) in self.saddles() {
            writer.add_prom_saddle(saddle, &id.to_string(), popups.then_some(id.0));
        }
        writer.end_folder();

        writer.start_folder("Runoffs");
        for (i, runoff) in self.runoffs.iter().enumerate() {
            writer.add_runoff(runoff, &format!("R{}", i));
        }
        writer.end_folder();

        writer.start_folder("Edges");
        for (child, edge) in self.edges() {
            if let (Some(peak), Some(parent), Some(saddle)) =
                (self.peak(child), self.peak(edge.parent), self.saddle(edge.saddle))
            {
                writer.add_graph_edge(peak, parent, saddle);
            }
        }
        for runoff in &self.runoffs {
            if let Some(peak) = self.peak(runoff.peak) {
                writer.add_runoff_edge(peak, runoff);
            }
        }
        writer.end_folder();

        writer.finish()
    }

    pub fn to_text(&self) -> String {
        let mut writer = TextWriter::new(&self.coords);

        writer.start_section("Peaks", self.peak_count());
        for (id, peak) in self.peaks() {
            writer.add_peak(peak, &id.to_string());
        }

        writer.start_section("Saddles", self.saddle_count());
        for (id, saddle) in self.saddles() {
            writer.add_saddle(saddle, &id.to_string());
        }

        writer.start_section("Runoffs", self.runoffs.len());
        for (i, runoff) in self.runoffs.iter().enumerate() {
            writer.add_runoff(runoff, &format!("R{}", i));
        }

        writer.start_section("Edges", self.edges().count());
        for (child, edge) in self.edges() {
            writer.add_graph_edge(&child.to_string(), &edge.parent.to_string(), &edge.saddle.to_string());
        }

        writer.start_section("RunoffEdges", self.runoffs.len());
        for (i, runoff) in self.runoffs.iter().enumerate() {
            writer.add_runoff_edge(&runoff.peak.to_string(), &format!("R{}", i));
        }

        writer.finish()
    }
}
