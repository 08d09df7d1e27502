use serde::{Deserialize, Serialize};

/// Elevation sample, in the tile's native unit
pub type Elevation = i32;

/// Sentinel stored in a tile for samples with no data
pub const NODATA_ELEVATION: Elevation = -32768;

/// WGS84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Mean earth radius used when Vincenty fails to converge (near-antipodal points)
const MEAN_EARTH_RADIUS: f64 = 6_371_008.8;

/// Integer position inside a tile: `x` is the column, `y` the row (row 0 is north)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offsets {
    pub x: i32,
    pub y: i32,
}

impl Offsets {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Offsets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Geodesic distance in meters on the WGS84 ellipsoid (Vincenty inverse formula)
    pub fn distance_ellipsoid(&self, other: &LatLng) -> f64 {
        let b = WGS84_A * (1.0 - WGS84_F);
        let l = (other.longitude - self.longitude).to_radians();
        let u1 = ((1.0 - WGS84_F) * self.latitude.to_radians().tan()).atan();
        let u2 = ((1.0 - WGS84_F) * other.latitude.to_radians().tan()).atan();
        let (sin_u1, cos_u1) = u1.sin_cos();
        let (sin_u2, cos_u2) = u2.sin_cos();

        let mut lambda = l;
        let mut converged = false;
        let (mut sin_sigma, mut cos_sigma, mut sigma) = (0.0, 0.0, 0.0);
        let (mut cos_sq_alpha, mut cos_2sigma_m) = (0.0, 0.0);

        for _ in 0..200 {
            let (sin_lambda, cos_lambda) = lambda.sin_cos();
            sin_sigma = ((cos_u2 * sin_lambda).powi(2)
                + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
            .sqrt();
            if sin_sigma == 0.0 {
                // Coincident points
                return 0.0;
            }
            cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
            sigma = sin_sigma.atan2(cos_sigma);
            let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
            cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
            cos_2sigma_m = if cos_sq_alpha != 0.0 {
                cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
            } else {
                // Equatorial line
                0.0
            };
            let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));
            let previous = lambda;
            lambda = l
                + (1.0 - c)
                    * WGS84_F
                    * sin_alpha
                    * (sigma
                        + c * sin_sigma
                            * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));
            if (lambda - previous).abs() < 1e-12 {
                converged = true;
                break;
            }
        }

        if !converged {
            log::debug!("Vincenty did not converge for {:?} -> {:?}, using great circle", self, other);
            return self.distance_sphere(other);
        }

        let u_sq = cos_sq_alpha * (WGS84_A * WGS84_A - b * b) / (b * b);
        let a_coef = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
        let b_coef = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
        let delta_sigma = b_coef
            * sin_sigma
            * (cos_2sigma_m
                + b_coef / 4.0
                    * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                        - b_coef / 6.0
                            * cos_2sigma_m
                            * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                            * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));

        b * a_coef * (sigma - delta_sigma)
    }

    /// Great-circle distance in meters on a sphere of mean earth radius
    pub fn distance_sphere(&self, other: &LatLng) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlng = (other.longitude - self.longitude).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * MEAN_EARTH_RADIUS * h.sqrt().min(1.0).asin()
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// True if `other` lies entirely within this box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }
}

/// Tile-specific affine mapping from offsets to latitude/longitude.
///
/// Offsets (0, 0) map to (`origin_lat`, `origin_lng`); the row axis runs
/// along `lat_step` (negative for north-up grids) and the column axis along
/// `lng_step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub lat_step: f64,
    pub lng_step: f64,
}

impl CoordinateSystem {
    pub fn new(origin_lat: f64, origin_lng: f64, lat_step: f64, lng_step: f64) -> Self {
        Self {
            origin_lat,
            origin_lng,
            lat_step,
            lng_step,
        }
    }

    pub fn latlng(&self, offsets: Offsets) -> LatLng {
        LatLng::new(
            self.origin_lat + offsets.y as f64 * self.lat_step,
            self.origin_lng + offsets.x as f64 * self.lng_step,
        )
    }

    /// Nearest offsets to a geographic position (may lie outside the tile)
    pub fn offsets(&self, position: &LatLng) -> Offsets {
        Offsets::new(
            ((position.longitude - self.origin_lng) / self.lng_step).round() as i32,
            ((position.latitude - self.origin_lat) / self.lat_step).round() as i32,
        )
    }

    /// Extent covered by a grid of the given size
    pub fn bounding_box(&self, width: usize, height: usize) -> BoundingBox {
        let corner = self.latlng(Offsets::new(width as i32 - 1, height as i32 - 1));
        BoundingBox {
            min_lon: self.origin_lng.min(corner.longitude),
            max_lon: self.origin_lng.max(corner.longitude),
            min_lat: self.origin_lat.min(corner.latitude),
            max_lat: self.origin_lat.max(corner.latitude),
        }
    }
}

/// Unit of the elevation samples of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElevationUnit {
    Feet,
    Meters,
}

impl std::fmt::Display for ElevationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElevationUnit::Feet => write!(f, "feet"),
            ElevationUnit::Meters => write!(f, "meters"),
        }
    }
}

/// Error types for prominence and isolation extraction
#[derive(Debug, thiserror::Error)]
pub enum PeakError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("XML parsing error: {0}")]
    Xml(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for peak metric operations
pub type PeakResult<T> = Result<T, PeakError>;
