//! Plain-text rendering of divide trees

use crate::core::divide_tree::{Peak, Runoff, Saddle};
use crate::types::{CoordinateSystem, Elevation, Offsets};
use std::fmt::Write;

/// Builds the whitespace-separated text dump of a divide tree.
///
/// Each section starts with `<name> <count>`; vertices are written as
/// `name lng lat elevation x y`, edges as the names of their endpoints.
pub struct TextWriter<'a> {
    coords: &'a CoordinateSystem,
    txt: String,
}

impl<'a> TextWriter<'a> {
    pub fn new(coords: &'a CoordinateSystem) -> Self {
        Self {
            coords,
            txt: String::new(),
        }
    }

    pub fn start_section(&mut self, name: &str, count: usize) {
        let _ = writeln!(self.txt, "{} {}", name, count);
    }

    pub fn add_peak(&mut self, peak: &Peak, name: &str) {
        self.add_vertex(name, peak.location, peak.elevation);
    }

    pub fn add_saddle(&mut self, saddle: &Saddle, name: &str) {
        self.add_vertex(name, saddle.location, saddle.elevation);
    }

    pub fn add_runoff(&mut self, runoff: &Runoff, name: &str) {
        self.add_vertex(name, runoff.location, runoff.elevation);
    }

    pub fn add_graph_edge(&mut self, peak_name: &str, parent_name: &str, saddle_name: &str) {
        let _ = writeln!(self.txt, "{} {} {}", peak_name, parent_name, saddle_name);
    }

    pub fn add_runoff_edge(&mut self, peak_name: &str, runoff_name: &str) {
        let _ = writeln!(self.txt, "{} {}", peak_name, runoff_name);
    }

    pub fn finish(self) -> String {
        self.txt
    }

    fn add_vertex(&mut self, name: &str, location: Offsets, elevation: Elevation) {
        let pos = self.coords.latlng(location);
        let _ = writeln!(
            self.txt,
            "{} {:.6} {:.6} {} {} {}",
            name, pos.longitude, pos.latitude, elevation, location.x, location.y
        );
    }
}
