use crate::types::{BoundingBox, LatLng, PeakError, PeakResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

/// A single polygonal region used to restrict results.
///
/// Only one simple ring is supported: no holes and no multi-polygons. A ring
/// that crosses the antimeridian can be handled with
/// [`set_wrap_longitude`](Self::set_wrap_longitude), after which query points
/// must be shifted the same way (see [`wrap_point`](Self::wrap_point)).
#[derive(Debug, Clone, Default)]
pub struct RegionFilter {
    vertices: Vec<LatLng>,
    ring: Vec<LatLng>,
    wrap_longitude: Option<f64>,
}

impl RegionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vertices(vertices: Vec<LatLng>) -> PeakResult<Self> {
        let mut filter = Self::new();
        filter.set_vertices(vertices)?;
        Ok(filter)
    }

    /// Load the polygon from a KML file
    pub fn load_polygon<P: AsRef<Path>>(&mut self, path: P) -> PeakResult<()> {
        let path = path.as_ref();
        log::info!("Loading region polygon from: {}", path.display());
        let text = std::fs::read_to_string(path)?;
        self.load_polygon_kml(&text)
    }

    /// Load the polygon from the first `<coordinates>` element of a KML document
    pub fn load_polygon_kml(&mut self, kml: &str) -> PeakResult<()> {
        let mut reader = Reader::from_str(kml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut in_coordinates = false;
        let mut rings: Vec<String> = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    if e.local_name().as_ref() == b"coordinates" {
                        in_coordinates = true;
                        rings.push(String::new());
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.local_name().as_ref() == b"coordinates" {
                        in_coordinates = false;
                    }
                }
                Ok(Event::Text(ref e)) if in_coordinates => {
                    let text = e
                        .unescape()
                        .map_err(|e| PeakError::Xml(format!("Bad text in <coordinates>: {}", e)))?;
                    if let Some(ring) = rings.last_mut() {
                        ring.push_str(&text);
                        ring.push(' ');
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(PeakError::Xml(format!(
                        "Error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        let Some(first) = rings.first() else {
            return Err(PeakError::InvalidFormat("No <coordinates> element in polygon source".to_string()));
        };
        if rings.len() > 1 {
            log::warn!("Polygon source has {} rings, using only the first", rings.len());
        }

        let vertices = Self::parse_coordinates(first)?;
        self.set_vertices(vertices)
    }

    /// Shift ring vertices west of `threshold` by +360 degrees
    pub fn set_wrap_longitude(&mut self, threshold: f64) {
        self.wrap_longitude = Some(threshold);
        self.rebuild_ring();
    }

    pub fn wrap_longitude(&self) -> Option<f64> {
        self.wrap_longitude
    }

    /// Apply the ring's longitude shift to a query point
    pub fn wrap_point(&self, point: &LatLng) -> LatLng {
        match self.wrap_longitude {
            Some(threshold) if point.longitude < threshold => {
                LatLng::new(point.latitude, point.longitude + 360.0)
            }
            _ => *point,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Ring vertices after any longitude shift
    pub fn vertices(&self) -> &[LatLng] {
        &self.ring
    }

    /// Crossing-number containment test. The point is used as given.
    pub fn is_point_inside(&self, point: &LatLng) -> bool {
        let n = self.ring.len();
        if n < 3 {
            return false;
        }
        let (x, y) = (point.longitude, point.latitude);
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (self.ring[i].longitude, self.ring[i].latitude);
            let (xj, yj) = (self.ring[j].longitude, self.ring[j].latitude);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Whether the rectangle overlaps the polygon.
    ///
    /// True when a polygon edge crosses or touches a rectangle edge, a polygon
    /// vertex lies on the rectangle boundary, or a rectangle corner lies inside
    /// the polygon. A rectangle that strictly contains the whole polygon is
    /// not reported; check [`bounding_box`](Self::bounding_box) for that case.
    pub fn intersects(&self, min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> bool {
        if self.ring.len() < 3 {
            return false;
        }

        let corners = [
            LatLng::new(min_lat, min_lng),
            LatLng::new(min_lat, max_lng),
            LatLng::new(max_lat, max_lng),
            LatLng::new(max_lat, min_lng),
        ];
        if corners.iter().any(|c| self.is_point_inside(c)) {
            return true;
        }

        let on_boundary = |v: &LatLng| {
            let within_lat = v.latitude >= min_lat && v.latitude <= max_lat;
            let within_lng = v.longitude >= min_lng && v.longitude <= max_lng;
            (within_lat && (v.longitude == min_lng || v.longitude == max_lng))
                || (within_lng && (v.latitude == min_lat || v.latitude == max_lat))
        };
        if self.ring.iter().any(on_boundary) {
            return true;
        }

        let n = self.ring.len();
        for i in 0..n {
            let a = &self.ring[i];
            let b = &self.ring[(i + 1) % n];
            for k in 0..4 {
                if Self::segments_intersect(a, b, &corners[k], &corners[(k + 1) % 4]) {
                    return true;
                }
            }
        }
        false
    }

    /// Extent of the (shifted) ring
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let first = self.ring.first()?;
        let init = BoundingBox {
            min_lon: first.longitude,
            max_lon: first.longitude,
            min_lat: first.latitude,
            max_lat: first.latitude,
        };
        Some(self.ring.iter().fold(init, |b, v| BoundingBox {
            min_lon: b.min_lon.min(v.longitude),
            max_lon: b.max_lon.max(v.longitude),
            min_lat: b.min_lat.min(v.latitude),
            max_lat: b.max_lat.max(v.latitude),
        }))
    }

    /// Orientation test on segments p0-p1 and p2-p3 (longitude as x, latitude
    /// as y). An endpoint lying exactly on the other segment counts as an
    /// intersection.
    pub fn segments_intersect(p0: &LatLng, p1: &LatLng, p2: &LatLng, p3: &LatLng) -> bool {
        let o1 = orientation(p0, p1, p2);
        let o2 = orientation(p0, p1, p3);
        let o3 = orientation(p2, p3, p0);
        let o4 = orientation(p2, p3, p1);

        if o1 != o2 && o3 != o4 {
            return true;
        }

        (o1 == 0 && on_segment(p0, p2, p1))
            || (o2 == 0 && on_segment(p0, p3, p1))
            || (o3 == 0 && on_segment(p2, p0, p3))
            || (o4 == 0 && on_segment(p2, p1, p3))
    }

    fn set_vertices(&mut self, mut vertices: Vec<LatLng>) -> PeakResult<()> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(PeakError::InvalidFormat(format!(
                "Polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        self.vertices = vertices;
        self.rebuild_ring();
        log::debug!("Region polygon with {} vertices", self.ring.len());
        Ok(())
    }

    fn rebuild_ring(&mut self) {
        self.ring = self.vertices.iter().map(|v| self.wrap_point(v)).collect();
    }

    /// Parse whitespace-separated `lng,lat[,alt]` tuples
    fn parse_coordinates(text: &str) -> PeakResult<Vec<LatLng>> {
        text.split_whitespace()
            .map(|tuple| {
                let mut parts = tuple.split(',');
                let lng = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
                let lat = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
                match (lng, lat) {
                    (Some(lng), Some(lat)) => Ok(LatLng::new(lat, lng)),
                    _ => Err(PeakError::InvalidFormat(format!("Bad coordinate tuple '{}'", tuple))),
                }
            })
            .collect()
    }
}

/// Sign of the cross product (q - p) x (r - p)
fn orientation(p: &LatLng, q: &LatLng, r: &LatLng) -> i8 {
    let value = (q.longitude - p.longitude) * (r.latitude - p.latitude)
        - (q.latitude - p.latitude) * (r.longitude - p.longitude);
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Whether collinear point `q` lies within the extent of segment p-r
fn on_segment(p: &LatLng, q: &LatLng, r: &LatLng) -> bool {
    q.longitude <= p.longitude.max(r.longitude)
        && q.longitude >= p.longitude.min(r.longitude)
        && q.latitude <= p.latitude.max(r.latitude)
        && q.latitude >= p.latitude.min(r.latitude)
}
