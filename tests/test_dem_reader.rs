use approx::assert_relative_eq;
use flate2::write::GzEncoder;
use flate2::Compression;
use peakmetrics::{DemFormat, DemReader, ElevationUnit, Offsets};
use std::io::Write;

fn hgt_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

#[test]
fn test_read_asc_tile() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("small.asc");
    std::fs::write(
        &path,
        "ncols 3\nnrows 2\nxllcorner 7.0\nyllcorner 46.0\ncellsize 0.5\nNODATA_value -9999\n\
         1 2 3\n4 -9999 6\n",
    )
    .expect("Failed to write ASC");

    let tile = DemReader::load(&path, DemFormat::Asc).expect("Failed to load ASC");
    assert_eq!(tile.width(), 3);
    assert_eq!(tile.height(), 2);
    assert_eq!(tile.unit(), ElevationUnit::Feet);
    assert_eq!(tile.get(Offsets::new(2, 0)), Some(3));
    assert_eq!(tile.get(Offsets::new(1, 1)), None);
    assert_eq!(tile.get(Offsets::new(3, 0)), None);

    // North-west cell centre
    let nw = tile.latlng(Offsets::new(0, 0));
    assert_relative_eq!(nw.latitude, 46.75, epsilon = 1e-9);
    assert_relative_eq!(nw.longitude, 7.25, epsilon = 1e-9);
}

#[test]
fn test_read_gzipped_hgt() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("N46E007.hgt.gz");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&hgt_bytes(&[100, 200, 300, -32768]))
        .expect("Failed to compress");
    std::fs::write(&path, encoder.finish().expect("Failed to finish gzip")).expect("Failed to write HGT");

    let tile = DemReader::load(&path, DemFormat::Srtm).expect("Failed to load HGT");
    assert_eq!(tile.unit(), ElevationUnit::Meters);
    assert_eq!(tile.get(Offsets::new(1, 0)), Some(200));
    assert_eq!(tile.get(Offsets::new(1, 1)), None);

    let sw = tile.latlng(Offsets::new(0, 1));
    assert_relative_eq!(sw.latitude, 46.0, epsilon = 1e-9);
    assert_relative_eq!(sw.longitude, 7.0, epsilon = 1e-9);
}

#[test]
fn test_srtm_name_hemispheres() {
    assert_eq!(DemReader::parse_srtm_name("S12W077.hgt").expect("Bad name"), (-12.0, -77.0));
    assert!(DemReader::parse_srtm_name("tile.hgt").is_err());
}

#[test]
fn test_read_ned_zip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("n47w122.zip");

    let header = "ncols 2\nnrows 2\nxllcorner -122.0\nyllcorner 46.0\ncellsize 1.0\n\
                  NODATA_value -9999\nbyteorder LSBFIRST\n";
    let data: Vec<u8> = [10.4f32, 20.6, -9999.0, 40.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();

    let file = std::fs::File::create(&path).expect("Failed to create zip");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    zip.start_file("floatn47w122_1.hdr", options).expect("Failed to add header");
    zip.write_all(header.as_bytes()).expect("Failed to write header");
    zip.start_file("floatn47w122_1.flt", options).expect("Failed to add data");
    zip.write_all(&data).expect("Failed to write data");
    zip.finish().expect("Failed to finish zip");

    let tile = DemReader::load(&path, DemFormat::Ned1Zip).expect("Failed to load NED zip");
    assert_eq!(tile.unit(), ElevationUnit::Meters);
    assert_eq!(tile.get(Offsets::new(0, 0)), Some(10));
    assert_eq!(tile.get(Offsets::new(1, 0)), Some(21));
    assert_eq!(tile.get(Offsets::new(0, 1)), None);
    assert_eq!(tile.get(Offsets::new(1, 1)), Some(40));
}

#[test]
fn test_format_names() {
    assert_eq!("SRTM".parse::<DemFormat>(), Ok(DemFormat::Srtm));
    assert_eq!("ned13-zip".parse::<DemFormat>(), Ok(DemFormat::Ned13Zip));
    assert!("PNG".parse::<DemFormat>().is_err());
}

#[test]
fn test_truncated_hgt_is_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("N46E007.hgt");
    std::fs::write(&path, hgt_bytes(&[1, 2, 3])).expect("Failed to write HGT");
    assert!(DemReader::load(&path, DemFormat::Srtm).is_err());
}
