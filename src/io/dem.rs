use crate::types::{
    BoundingBox, CoordinateSystem, Elevation, ElevationUnit, LatLng, Offsets, PeakError,
    PeakResult, NODATA_ELEVATION,
};
use ndarray::Array2;
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Supported DEM tile formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemFormat {
    /// Esri ASCII grid
    Asc,
    /// SRTM `.hgt` (optionally gzipped)
    Srtm,
    /// USGS NED 1 arc-second GridFloat zip
    Ned1Zip,
    /// USGS NED 1/3 arc-second GridFloat zip
    Ned13Zip,
    /// Any raster GDAL can open (requires the `gdal` feature)
    GeoTiff,
}

impl FromStr for DemFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASC" => Ok(DemFormat::Asc),
            "SRTM" | "HGT" => Ok(DemFormat::Srtm),
            "NED1-ZIP" => Ok(DemFormat::Ned1Zip),
            "NED13-ZIP" => Ok(DemFormat::Ned13Zip),
            "GEOTIFF" | "TIFF" => Ok(DemFormat::GeoTiff),
            _ => Err(format!("Unknown file format {}", s)),
        }
    }
}

impl std::fmt::Display for DemFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemFormat::Asc => write!(f, "ASC"),
            DemFormat::Srtm => write!(f, "SRTM"),
            DemFormat::Ned1Zip => write!(f, "NED1-ZIP"),
            DemFormat::Ned13Zip => write!(f, "NED13-ZIP"),
            DemFormat::GeoTiff => write!(f, "GEOTIFF"),
        }
    }
}

/// A loaded elevation tile. Read-only once constructed.
#[derive(Debug, Clone)]
pub struct Tile {
    elevations: Array2<Elevation>,
    coords: CoordinateSystem,
    unit: ElevationUnit,
}

impl Tile {
    /// Create a tile from a (rows, cols) elevation grid
    pub fn new(
        elevations: Array2<Elevation>,
        coords: CoordinateSystem,
        unit: ElevationUnit,
    ) -> PeakResult<Self> {
        let (height, width) = elevations.dim();
        if height == 0 || width == 0 {
            return Err(PeakError::InvalidFormat("Tile has no samples".to_string()));
        }
        Ok(Self {
            elevations,
            coords,
            unit,
        })
    }

    pub fn width(&self) -> usize {
        self.elevations.ncols()
    }

    pub fn height(&self) -> usize {
        self.elevations.nrows()
    }

    pub fn unit(&self) -> ElevationUnit {
        self.unit
    }

    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coords
    }

    pub fn elevations(&self) -> &Array2<Elevation> {
        &self.elevations
    }

    pub fn is_in_bounds(&self, offsets: Offsets) -> bool {
        offsets.x >= 0
            && offsets.y >= 0
            && (offsets.x as usize) < self.width()
            && (offsets.y as usize) < self.height()
    }

    /// Elevation at `offsets`, or `None` outside the tile or on a void sample
    pub fn get(&self, offsets: Offsets) -> Option<Elevation> {
        if !self.is_in_bounds(offsets) {
            return None;
        }
        let value = self.elevations[[offsets.y as usize, offsets.x as usize]];
        if value == NODATA_ELEVATION {
            None
        } else {
            Some(value)
        }
    }

    pub fn latlng(&self, offsets: Offsets) -> LatLng {
        self.coords.latlng(offsets)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.coords.bounding_box(self.width(), self.height())
    }
}

/// Digital Elevation Model tile reader
pub struct DemReader;

impl DemReader {
    /// Load a tile in the given format
    pub fn load<P: AsRef<Path>>(path: P, format: DemFormat) -> PeakResult<Tile> {
        let path = path.as_ref();
        log::info!("Reading {} DEM from: {}", format, path.display());
        let start = std::time::Instant::now();

        let tile = match format {
            DemFormat::Asc => Self::read_asc(path)?,
            DemFormat::Srtm => Self::read_hgt(path)?,
            DemFormat::Ned1Zip | DemFormat::Ned13Zip => Self::read_ned_zip(path)?,
            DemFormat::GeoTiff => Self::read_geotiff(path)?,
        };

        log::debug!(
            "DEM size: {}x{} ({} units), loaded in {:?}",
            tile.width(),
            tile.height(),
            tile.unit(),
            start.elapsed()
        );
        Ok(tile)
    }

    /// Read an Esri ASCII grid. Samples are taken as feet.
    pub fn read_asc(path: &Path) -> PeakResult<Tile> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_asc(&text)
    }

    /// Parse Esri ASCII grid text
    pub fn parse_asc(text: &str) -> PeakResult<Tile> {
        let mut header: HashMap<String, f64> = HashMap::new();
        let mut tokens = text.split_whitespace().peekable();

        // Header keys are words; the grid starts at the first numeric token in key position
        while let Some(&token) = tokens.peek() {
            if token.parse::<f64>().is_ok() {
                break;
            }
            let key = token.to_lowercase();
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| PeakError::InvalidFormat(format!("Missing value for header {}", key)))?
                .parse::<f64>()
                .map_err(|e| PeakError::InvalidFormat(format!("Bad value for header {}: {}", key, e)))?;
            header.insert(key, value);
        }

        let ncols = Self::header_value(&header, "ncols")? as usize;
        let nrows = Self::header_value(&header, "nrows")? as usize;
        let cellsize = Self::header_value(&header, "cellsize")?;
        let nodata = header.get("nodata_value").copied();

        // Position of the north-west sample centre
        let (origin_lat, origin_lng) = if let (Some(x), Some(y)) =
            (header.get("xllcenter"), header.get("yllcenter"))
        {
            (y + (nrows as f64 - 1.0) * cellsize, *x)
        } else {
            let x = Self::header_value(&header, "xllcorner")?;
            let y = Self::header_value(&header, "yllcorner")?;
            (y + (nrows as f64 - 0.5) * cellsize, x + 0.5 * cellsize)
        };

        let mut samples = Vec::with_capacity(ncols * nrows);
        for token in tokens {
            let value = token
                .parse::<f64>()
                .map_err(|e| PeakError::InvalidFormat(format!("Bad sample '{}': {}", token, e)))?;
            samples.push(Self::to_elevation(value, nodata));
        }

        if samples.len() != ncols * nrows {
            return Err(PeakError::InvalidFormat(format!(
                "Expected {} samples ({}x{}), found {}",
                ncols * nrows,
                ncols,
                nrows,
                samples.len()
            )));
        }

        let elevations = Array2::from_shape_vec((nrows, ncols), samples)
            .map_err(|e| PeakError::Processing(format!("Failed to reshape DEM data: {}", e)))?;
        let coords = CoordinateSystem::new(origin_lat, origin_lng, -cellsize, cellsize);
        Tile::new(elevations, coords, ElevationUnit::Feet)
    }

    /// Read an SRTM `.hgt` or `.hgt.gz` tile; the origin comes from the file name
    pub fn read_hgt(path: &Path) -> PeakResult<Tile> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (south, west) = Self::parse_srtm_name(&file_name)?;

        let raw = std::fs::read(path)?;
        let bytes = if Self::is_gzip_content(&raw) {
            log::debug!("Decompressing gzipped HGT file");
            let mut decoder = flate2::read::GzDecoder::new(raw.as_slice());
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| PeakError::InvalidFormat(format!("Failed to decompress gzip data: {}", e)))?;
            decompressed
        } else {
            raw
        };

        let count = bytes.len() / 2;
        let side = (count as f64).sqrt().round() as usize;
        if side < 2 || side * side * 2 != bytes.len() {
            return Err(PeakError::InvalidFormat(format!(
                "HGT file has {} bytes, not a square grid of 16-bit samples",
                bytes.len()
            )));
        }

        let samples: Vec<Elevation> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_be_bytes([chunk[0], chunk[1]]) as Elevation)
            .collect();
        let elevations = Array2::from_shape_vec((side, side), samples)
            .map_err(|e| PeakError::Processing(format!("Failed to reshape DEM data: {}", e)))?;

        let step = 1.0 / (side as f64 - 1.0);
        let coords = CoordinateSystem::new(south + 1.0, west, -step, step);
        Tile::new(elevations, coords, ElevationUnit::Meters)
    }

    /// Parse `N46E007`-style names into (south latitude, west longitude)
    pub fn parse_srtm_name(name: &str) -> PeakResult<(f64, f64)> {
        let pattern = Regex::new(r"(?i)([NS])(\d{2})([EW])(\d{3})")
            .map_err(|e| PeakError::Processing(format!("Invalid tile name pattern: {}", e)))?;
        let caps = pattern.captures(name).ok_or_else(|| {
            PeakError::InvalidFormat(format!("Cannot derive SRTM tile origin from '{}'", name))
        })?;

        let lat: f64 = caps[2]
            .parse()
            .map_err(|_| PeakError::InvalidFormat(format!("Bad latitude in '{}'", name)))?;
        let lng: f64 = caps[4]
            .parse()
            .map_err(|_| PeakError::InvalidFormat(format!("Bad longitude in '{}'", name)))?;
        let lat = if caps[1].eq_ignore_ascii_case("S") { -lat } else { lat };
        let lng = if caps[3].eq_ignore_ascii_case("W") { -lng } else { lng };
        Ok((lat, lng))
    }

    /// Read a USGS NED GridFloat zip (`.hdr` + `.flt` pair)
    pub fn read_ned_zip(path: &Path) -> PeakResult<Tile> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| PeakError::InvalidFormat(format!("Failed to open ZIP archive: {}", e)))?;

        let mut header_text = None;
        let mut float_data = None;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| PeakError::InvalidFormat(format!("Failed to read ZIP entry {}: {}", i, e)))?;
            let name = entry.name().to_lowercase();
            if name.ends_with(".hdr") && header_text.is_none() {
                let mut text = String::new();
                entry.read_to_string(&mut text)?;
                header_text = Some(text);
            } else if name.ends_with(".flt") && float_data.is_none() {
                log::debug!("Extracting GridFloat file: {}", entry.name());
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                float_data = Some(buffer);
            }
        }

        let header_text = header_text
            .ok_or_else(|| PeakError::InvalidFormat("No .hdr file found in ZIP archive".to_string()))?;
        let float_data = float_data
            .ok_or_else(|| PeakError::InvalidFormat("No .flt file found in ZIP archive".to_string()))?;
        Self::parse_gridfloat(&header_text, &float_data)
    }

    /// Decode a GridFloat header and sample buffer
    pub fn parse_gridfloat(header_text: &str, data: &[u8]) -> PeakResult<Tile> {
        let mut header: HashMap<String, f64> = HashMap::new();
        let mut big_endian = false;
        for line in header_text.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            let key = key.to_lowercase();
            if key == "byteorder" {
                big_endian = value.eq_ignore_ascii_case("MSBFIRST");
            } else if let Ok(v) = value.parse::<f64>() {
                header.insert(key, v);
            }
        }

        let ncols = Self::header_value(&header, "ncols")? as usize;
        let nrows = Self::header_value(&header, "nrows")? as usize;
        let cellsize = Self::header_value(&header, "cellsize")?;
        let xll = Self::header_value(&header, "xllcorner")?;
        let yll = Self::header_value(&header, "yllcorner")?;
        let nodata = header.get("nodata_value").copied();

        if data.len() != ncols * nrows * 4 {
            return Err(PeakError::InvalidFormat(format!(
                "GridFloat data has {} bytes, expected {}",
                data.len(),
                ncols * nrows * 4
            )));
        }

        let samples: Vec<Elevation> = data
            .chunks_exact(4)
            .map(|chunk| {
                let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
                let value = if big_endian {
                    f32::from_be_bytes(bytes)
                } else {
                    f32::from_le_bytes(bytes)
                };
                Self::to_elevation(value as f64, nodata)
            })
            .collect();

        let elevations = Array2::from_shape_vec((nrows, ncols), samples)
            .map_err(|e| PeakError::Processing(format!("Failed to reshape DEM data: {}", e)))?;
        let coords = CoordinateSystem::new(
            yll + (nrows as f64 - 0.5) * cellsize,
            xll + 0.5 * cellsize,
            -cellsize,
            cellsize,
        );
        Tile::new(elevations, coords, ElevationUnit::Meters)
    }

    #[cfg(feature = "gdal")]
    fn read_geotiff(path: &Path) -> PeakResult<Tile> {
        use gdal::Dataset;

        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        log::debug!("DEM geotransform: {:?}", geo_transform);

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value();
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        let samples: Vec<Elevation> = band_data
            .data
            .iter()
            .map(|&v| Self::to_elevation(v as f64, nodata))
            .collect();

        let elevations = Array2::from_shape_vec((height, width), samples)
            .map_err(|e| PeakError::Processing(format!("Failed to reshape DEM data: {}", e)))?;
        let coords = CoordinateSystem::new(
            geo_transform[3] + 0.5 * geo_transform[5],
            geo_transform[0] + 0.5 * geo_transform[1],
            geo_transform[5],
            geo_transform[1],
        );
        Tile::new(elevations, coords, ElevationUnit::Meters)
    }

    #[cfg(not(feature = "gdal"))]
    fn read_geotiff(path: &Path) -> PeakResult<Tile> {
        Err(PeakError::InvalidFormat(format!(
            "Cannot read {}: GeoTIFF support requires the `gdal` feature",
            path.display()
        )))
    }

    fn header_value(header: &HashMap<String, f64>, key: &str) -> PeakResult<f64> {
        header
            .get(key)
            .copied()
            .ok_or_else(|| PeakError::InvalidFormat(format!("Missing header field {}", key)))
    }

    fn to_elevation(value: f64, nodata: Option<f64>) -> Elevation {
        match nodata {
            Some(nd) if (value - nd).abs() < 1e-6 => NODATA_ELEVATION,
            _ if !value.is_finite() => NODATA_ELEVATION,
            _ => value.round() as Elevation,
        }
    }

    /// Check if content is gzip format by examining magic bytes
    fn is_gzip_content(content: &[u8]) -> bool {
        content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SMALL_ASC: &str = "ncols 4\nnrows 3\nxllcorner 7.0\nyllcorner 46.0\ncellsize 0.5\nNODATA_value -9999\n\
                             1 2 3 4\n5 6 -9999 8\n9 10 11 12\n";

    #[test]
    fn test_parse_asc() {
        let tile = DemReader::parse_asc(SMALL_ASC).unwrap();
        assert_eq!(tile.width(), 4);
        assert_eq!(tile.height(), 3);
        assert_eq!(tile.unit(), ElevationUnit::Feet);
        assert_eq!(tile.get(Offsets::new(0, 0)), Some(1));
        assert_eq!(tile.get(Offsets::new(3, 2)), Some(12));
        assert_eq!(tile.get(Offsets::new(2, 1)), None);
        assert_eq!(tile.get(Offsets::new(4, 0)), None);

        // North-west cell centre
        let nw = tile.latlng(Offsets::new(0, 0));
        assert_relative_eq!(nw.latitude, 47.25);
        assert_relative_eq!(nw.longitude, 7.25);
    }

    #[test]
    fn test_parse_asc_rejects_short_grid() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        assert!(DemReader::parse_asc(text).is_err());
    }

    #[test]
    fn test_parse_srtm_name() {
        assert_eq!(DemReader::parse_srtm_name("N46E007.hgt").unwrap(), (46.0, 7.0));
        assert_eq!(DemReader::parse_srtm_name("s12w077.hgt.gz").unwrap(), (-12.0, -77.0));
        assert!(DemReader::parse_srtm_name("tile.hgt").is_err());
    }

    #[test]
    fn test_parse_gridfloat() {
        let header = "ncols 2\nnrows 2\nxllcorner -122\nyllcorner 47\ncellsize 0.25\nNODATA_value -9999\nbyteorder LSBFIRST\n";
        let mut data = Vec::new();
        for v in [100.4f32, -9999.0, 50.6, 75.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        let tile = DemReader::parse_gridfloat(header, &data).unwrap();
        assert_eq!(tile.unit(), ElevationUnit::Meters);
        assert_eq!(tile.get(Offsets::new(0, 0)), Some(100));
        assert_eq!(tile.get(Offsets::new(1, 0)), None);
        assert_eq!(tile.get(Offsets::new(0, 1)), Some(51));
    }

    #[test]
    fn test_dem_format_from_str() {
        assert_eq!("SRTM".parse::<DemFormat>().unwrap(), DemFormat::Srtm);
        assert_eq!("ned13-zip".parse::<DemFormat>().unwrap(), DemFormat::Ned13Zip);
        assert!("XYZ".parse::<DemFormat>().is_err());
    }
}
