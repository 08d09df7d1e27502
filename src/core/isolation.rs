use crate::io::Tile;
use crate::types::{Elevation, LatLng, Offsets};

/// Meters per degree of latitude at the equator, the smallest on the ellipsoid
const MIN_METERS_PER_DEGREE_LAT: f64 = 110_574.0;
/// Meters per degree of longitude at the equator
const METERS_PER_DEGREE_LNG: f64 = 111_320.0;
/// Slack applied to the ring lower bound so ellipsoid effects never cut a search short
const LOWER_BOUND_SLACK: f64 = 0.99;

/// Result of an isolation search for one peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsolationRecord {
    /// Whether any strictly higher sample exists in the tile
    pub found: bool,
    /// Nearest strictly higher sample; `(0, 0)` when not found
    pub closest_higher_ground: LatLng,
    /// Ellipsoidal distance in kilometers; `-1` when not found
    pub distance_km: f64,
}

impl IsolationRecord {
    pub fn not_found() -> Self {
        Self {
            found: false,
            closest_higher_ground: LatLng::default(),
            distance_km: -1.0,
        }
    }
}

/// Nearest-higher-ground search over a single tile.
///
/// Samples are scanned in square rings of growing radius around the peak.
/// Every ring is at least `radius * cell spacing` away on the ground, so the
/// search stops as soon as that bound passes the best candidate.
pub struct IsolationFinder<'a> {
    tile: &'a Tile,
    min_cell_meters: f64,
}

impl<'a> IsolationFinder<'a> {
    pub fn new(tile: &'a Tile) -> Self {
        let coords = tile.coordinate_system();
        let bbox = tile.bounding_box();
        let max_abs_lat = bbox.min_lat.abs().max(bbox.max_lat.abs()).min(90.0);
        let lat_meters = coords.lat_step.abs() * MIN_METERS_PER_DEGREE_LAT;
        let lng_meters = coords.lng_step.abs() * METERS_PER_DEGREE_LNG * max_abs_lat.to_radians().cos();
        Self {
            tile,
            min_cell_meters: lat_meters.min(lng_meters).max(0.0),
        }
    }

    /// Find the nearest sample strictly higher than the one at `peak`
    pub fn find_isolation(&self, peak: Offsets) -> IsolationRecord {
        let Some(elevation) = self.tile.get(peak) else {
            log::warn!("Isolation requested for void sample at {}", peak);
            return IsolationRecord::not_found();
        };
        let origin = self.tile.latlng(peak);
        let max_radius = self.tile.width().max(self.tile.height()) as i32;

        let mut best: Option<(f64, LatLng)> = None;
        for radius in 1..=max_radius {
            self.scan_ring(peak, radius, elevation, &origin, &mut best);

            if let Some((distance, _)) = best {
                let next_ring_bound = (radius + 1) as f64 * self.min_cell_meters * LOWER_BOUND_SLACK;
                if distance <= next_ring_bound {
                    break;
                }
            }
        }

        match best {
            Some((meters, location)) => IsolationRecord {
                found: true,
                closest_higher_ground: location,
                distance_km: meters / 1000.0,
            },
            None => IsolationRecord::not_found(),
        }
    }

    /// Search every peak, returning records in the order of `peaks`
    pub fn find_all(&self, peaks: &[Offsets]) -> Vec<IsolationRecord> {
        log::debug!("Searching isolation for {} peaks", peaks.len());

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            peaks.par_iter().map(|&p| self.find_isolation(p)).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            peaks.iter().map(|&p| self.find_isolation(p)).collect()
        }
    }

    fn scan_ring(
        &self,
        center: Offsets,
        radius: i32,
        elevation: Elevation,
        origin: &LatLng,
        best: &mut Option<(f64, LatLng)>,
    ) {
        let mut consider = |offsets: Offsets| {
            if let Some(e) = self.tile.get(offsets) {
                if e > elevation {
                    let location = self.tile.latlng(offsets);
                    let distance = origin.distance_ellipsoid(&location);
                    if best.map_or(true, |(d, _)| distance < d) {
                        *best = Some((distance, location));
                    }
                }
            }
        };

        for dx in -radius..=radius {
            consider(Offsets::new(center.x + dx, center.y - radius));
            consider(Offsets::new(center.x + dx, center.y + radius));
        }
        for dy in (-radius + 1)..radius {
            consider(Offsets::new(center.x - radius, center.y + dy));
            consider(Offsets::new(center.x + radius, center.y + dy));
        }
    }
}
