//! Prominence and isolation extraction for a single DEM tile

use crate::core::divide_tree::{DivideTree, PeakId};
use crate::core::island_tree::IslandTree;
use crate::core::isolation::{IsolationFinder, IsolationRecord};
use crate::core::region_filter::RegionFilter;
use crate::core::tree_builder::DivideTreeBuilder;
use crate::io::{DemFormat, DemReader, Tile};
use crate::types::{BoundingBox, Elevation, ElevationUnit, LatLng, Offsets, PeakError, PeakResult};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Polygon restricting which peaks are reported
#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
    /// KML file holding a single polygon ring
    pub polygon_path: PathBuf,
    /// Ring longitudes below this get +360 (antimeridian crossing)
    pub wrap_longitude: Option<f32>,
}

/// Pipeline parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Peaks below this prominence are pruned and not reported
    pub min_prominence: f32,
    /// Delete runoffs before pruning
    pub finalize: bool,
    pub output_directory: PathBuf,
    pub format: DemFormat,
    pub region: Option<RegionConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_prominence: 300.0,
            finalize: false,
            output_directory: PathBuf::from("."),
            format: DemFormat::Asc,
            region: None,
        }
    }
}

/// Files written for a tile named `<name>`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub full_tree: PathBuf,
    pub full_kml: PathBuf,
    pub pruned_tree: PathBuf,
    pub pruned_kml: PathBuf,
    pub pruned_text: PathBuf,
    pub metrics: PathBuf,
}

impl OutputPaths {
    pub fn new(directory: &Path, name: &str, min_prominence: f32) -> Self {
        let threshold = min_prominence as i32;
        let pruned = format!("{}-divide_tree_pruned_{}", name, threshold);
        Self {
            full_tree: directory.join(format!("{}-divide_tree.dvt", name)),
            full_kml: directory.join(format!("{}-divide_tree.kml", name)),
            pruned_tree: directory.join(format!("{}.dvt", pruned)),
            pruned_kml: directory.join(format!("{}.kml", pruned)),
            pruned_text: directory.join(format!("{}.txt", pruned)),
            metrics: directory.join(format!("{}.txt", name)),
        }
    }
}

/// One reported peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakMetrics {
    pub peak: PeakId,
    pub location: LatLng,
    pub elevation: Elevation,
    /// `None` for the highest peak of an island
    pub key_saddle: Option<LatLng>,
    pub prominence: Elevation,
    pub isolation: IsolationRecord,
}

/// Final per-peak table, in divide tree peak order
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsTable {
    unit: ElevationUnit,
    rows: Vec<PeakMetrics>,
}

impl MetricsTable {
    pub fn new(unit: ElevationUnit) -> Self {
        Self { unit, rows: Vec::new() }
    }

    pub fn push(&mut self, row: PeakMetrics) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[PeakMetrics] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn unit(&self) -> ElevationUnit {
        self.unit
    }

    /// Comma-separated table with a header line. A missing key saddle is
    /// written as `0,0`, a missing isolation as distance `-1`.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "latitude,longitude,elevation in {unit},key saddle latitude,key saddle longitude,\
             prominence in {unit},isolation latitude,isolation longitude,isolation in km",
            unit = self.unit
        );
        for row in &self.rows {
            let saddle = row.key_saddle.unwrap_or_default();
            let _ = writeln!(
                out,
                "{:.4},{:.4},{},{:.4},{:.4},{},{:.4},{:.4},{:.4}",
                row.location.latitude,
                row.location.longitude,
                row.elevation,
                saddle.latitude,
                saddle.longitude,
                row.prominence,
                row.isolation.closest_higher_ground.latitude,
                row.isolation.closest_higher_ground.longitude,
                row.isolation.distance_km
            );
        }
        out
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> PeakResult<()> {
        write_output(path.as_ref(), &self.to_csv())
    }
}

/// Runs the extraction steps in order for one tile at a time
pub struct ProminencePipeline {
    config: PipelineConfig,
    region: Option<RegionFilter>,
}

impl ProminencePipeline {
    /// Create the pipeline, loading the region polygon if one is configured
    pub fn new(config: PipelineConfig) -> PeakResult<Self> {
        let region = match &config.region {
            Some(region_config) => {
                let mut filter = RegionFilter::new();
                if let Some(threshold) = region_config.wrap_longitude {
                    filter.set_wrap_longitude(threshold as f64);
                }
                filter.load_polygon(&region_config.polygon_path)?;
                Some(filter)
            }
            None => None,
        };
        Ok(Self { config, region })
    }

    /// Use an already loaded region instead of the configured polygon file
    pub fn with_region(mut self, region: RegionFilter) -> Self {
        self.region = Some(region);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the DEM at `path` and process it; outputs are named after its file stem
    pub fn run<P: AsRef<Path>>(&self, path: P) -> PeakResult<MetricsTable> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PeakError::InvalidFormat(format!("No file name in {}", path.display())))?
            .to_string();
        let tile = DemReader::load(path, self.config.format)?;
        self.run_tile(&tile, &name)
    }

    pub fn run_tile(&self, tile: &Tile, name: &str) -> PeakResult<MetricsTable> {
        let config = &self.config;
        let paths = OutputPaths::new(&config.output_directory, name, config.min_prominence);
        log::info!("Processing {}: prominence >= {} {}", name, config.min_prominence, tile.unit());
        if config.finalize {
            log::info!("Finalizing tree: runoffs are deleted before pruning");
        }
        let start = std::time::Instant::now();

        if !self.tile_overlaps_region(tile) {
            log::info!("Tile {} lies outside the region, skipping", name);
            let table = MetricsTable::new(tile.unit());
            table.write_to_file(&paths.metrics)?;
            return Ok(table);
        }

        log::info!("Step 1: building divide tree");
        let mut divide_tree = DivideTreeBuilder::new(tile).build()?;

        log::info!("Step 2: writing full divide tree");
        write_tree(&divide_tree, &paths.full_tree);
        write_output(&paths.full_kml, &divide_tree.to_kml())?;

        log::info!("Step 3: provisional prominence");
        let provisional = IslandTree::build(&divide_tree);

        if config.finalize {
            let removed = divide_tree.delete_runoffs();
            log::info!("Step 4: deleted {} runoffs", removed);
        }

        let threshold = config.min_prominence as Elevation;
        let removed = divide_tree.prune(threshold, &provisional);
        log::info!(
            "Step 5: pruned {} peaks below {}, {} remain",
            removed,
            threshold,
            divide_tree.peak_count()
        );
        divide_tree
            .validate()
            .map_err(|e| PeakError::Processing(format!("Pruned divide tree is inconsistent: {}", e)))?;

        log::info!("Step 6: writing pruned divide tree");
        write_tree(&divide_tree, &paths.pruned_tree);
        write_output(&paths.pruned_kml, &divide_tree.to_kml_with_popups())?;
        write_output(&paths.pruned_text, &divide_tree.to_text())?;

        log::info!("Step 7: final prominence");
        let island_tree = IslandTree::build(&divide_tree);

        log::info!("Step 8: isolation search");
        let (ids, offsets): (Vec<PeakId>, Vec<Offsets>) =
            divide_tree.peaks().map(|(id, peak)| (id, peak.location)).unzip();
        let isolation = IsolationFinder::new(tile).find_all(&offsets);

        log::info!("Step 9: assembling metrics");
        let coords = divide_tree.coordinate_system();
        let mut table = MetricsTable::new(tile.unit());
        for (id, record) in ids.into_iter().zip(isolation) {
            let (Some(peak), Some(node)) = (divide_tree.peak(id), island_tree.node(id)) else {
                continue;
            };
            if (node.prominence as f32) < config.min_prominence {
                continue;
            }
            let location = coords.latlng(peak.location);
            if !self.is_in_region(&location) {
                continue;
            }
            let key_saddle = node
                .key_saddle
                .and_then(|s| divide_tree.saddle(s))
                .map(|s| coords.latlng(s.location));
            table.push(PeakMetrics {
                peak: id,
                location,
                elevation: peak.elevation,
                key_saddle,
                prominence: node.prominence,
                isolation: record,
            });
        }

        table.write_to_file(&paths.metrics)?;
        log::info!("{}: {} peaks reported in {:?}", name, table.len(), start.elapsed());
        Ok(table)
    }

    fn is_in_region(&self, location: &LatLng) -> bool {
        match &self.region {
            Some(region) => region.is_point_inside(&region.wrap_point(location)),
            None => true,
        }
    }

    fn tile_overlaps_region(&self, tile: &Tile) -> bool {
        let Some(region) = &self.region else {
            return true;
        };
        let Some(polygon_box) = region.bounding_box() else {
            return false;
        };
        let tile_box = wrap_box(tile.bounding_box(), region.wrap_longitude());
        region.intersects(tile_box.min_lat, tile_box.max_lat, tile_box.min_lon, tile_box.max_lon)
            || tile_box.contains(&polygon_box)
    }
}

/// Shift a box wholly west of the wrap threshold into the polygon's longitude range
fn wrap_box(bbox: BoundingBox, wrap_longitude: Option<f64>) -> BoundingBox {
    match wrap_longitude {
        Some(threshold) if bbox.max_lon < threshold => BoundingBox {
            min_lon: bbox.min_lon + 360.0,
            max_lon: bbox.max_lon + 360.0,
            ..bbox
        },
        _ => bbox,
    }
}

/// Write failures of the binary dump are logged, not returned
fn write_tree(tree: &DivideTree, path: &Path) {
    if let Err(e) = tree.write_to_file(path) {
        log::error!("Failed to save divide tree file {}: {}", path.display(), e);
    }
}

fn write_output(path: &Path, contents: &str) -> PeakResult<()> {
    std::fs::write(path, contents)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CoordinateSystem;
    use ndarray::Array2;

    fn two_peak_tile() -> Tile {
        let data = vec![
            10, 10, 10, 10, 10, 10, 10, //
            10, 100, 60, 50, 60, 80, 10, //
            10, 10, 10, 10, 10, 10, 10,
        ];
        Tile::new(
            Array2::from_shape_vec((3, 7), data).unwrap(),
            CoordinateSystem::new(46.0, 7.0, -1.0 / 3600.0, 1.0 / 3600.0),
            ElevationUnit::Feet,
        )
        .unwrap()
    }

    fn config(dir: &Path, min_prominence: f32) -> PipelineConfig {
        PipelineConfig {
            min_prominence,
            output_directory: dir.to_path_buf(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_prominence, 300.0);
        assert!(!config.finalize);
        assert_eq!(config.output_directory, PathBuf::from("."));
        assert_eq!(config.format, DemFormat::Asc);
        assert!(config.region.is_none());
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::new(Path::new("out"), "N46E007", 300.7);
        assert_eq!(paths.full_tree, PathBuf::from("out/N46E007-divide_tree.dvt"));
        assert_eq!(paths.pruned_text, PathBuf::from("out/N46E007-divide_tree_pruned_300.txt"));
        assert_eq!(paths.metrics, PathBuf::from("out/N46E007.txt"));
    }

    #[test]
    fn test_threshold_filters_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ProminencePipeline::new(config(dir.path(), 50.0)).unwrap();
        let table = pipeline.run_tile(&two_peak_tile(), "tile").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].elevation, 100);
        assert!(table.rows()[0].key_saddle.is_none());
    }

    #[test]
    fn test_csv_sentinels() {
        let mut table = MetricsTable::new(ElevationUnit::Feet);
        table.push(PeakMetrics {
            peak: PeakId(0),
            location: LatLng::new(46.0, 7.0),
            elevation: 100,
            key_saddle: None,
            prominence: 100,
            isolation: IsolationRecord::not_found(),
        });
        let csv = table.to_csv();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("latitude,longitude,elevation in feet,"));
        assert_eq!(
            lines.next().unwrap(),
            "46.0000,7.0000,100,0.0000,0.0000,100,0.0000,0.0000,-1.0000"
        );
    }

    #[test]
    fn test_tile_outside_region_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let region = RegionFilter::from_vertices(vec![
            LatLng::new(10.0, 10.0),
            LatLng::new(10.0, 11.0),
            LatLng::new(11.0, 11.0),
        ])
        .unwrap();
        let pipeline = ProminencePipeline::new(config(dir.path(), 10.0))
            .unwrap()
            .with_region(region);
        let table = pipeline.run_tile(&two_peak_tile(), "tile").unwrap();
        assert!(table.is_empty());
        assert!(dir.path().join("tile.txt").exists());
        assert!(!dir.path().join("tile-divide_tree.kml").exists());
    }

    #[test]
    fn test_wrap_box_shifts_only_west_of_threshold() {
        let west = BoundingBox {
            min_lat: -17.0,
            max_lat: -16.0,
            min_lon: -180.0,
            max_lon: -179.0,
        };
        let shifted = wrap_box(west, Some(0.0));
        assert_eq!(shifted.min_lon, 180.0);
        assert_eq!(shifted.max_lon, 181.0);
        assert_eq!(shifted.min_lat, -17.0);

        assert_eq!(wrap_box(west, None), west);
        let east = BoundingBox { min_lon: 179.0, max_lon: 180.0, ..west };
        assert_eq!(wrap_box(east, Some(0.0)), east);
    }
}
