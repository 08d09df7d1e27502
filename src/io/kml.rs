//! KML rendering of divide trees

use crate::core::divide_tree::{Peak, Runoff, Saddle};
use crate::types::{CoordinateSystem, Elevation, Offsets};
use std::fmt::Write;

const TRIANGLE_ICON: &str = "http://maps.google.com/mapfiles/kml/shapes/triangle.png";
const DONUT_ICON: &str = "http://maps.google.com/mapfiles/kml/shapes/donut.png";
const RUNOFF_ICON: &str = "http://maps.google.com/mapfiles/kml/shapes/info_circle.png";

/// Extra icon style for peaks, declared as `peak_<name>`
#[derive(Debug, Clone, PartialEq)]
pub struct KmlPeakStyle {
    pub name: String,
    /// `aabbggrr` hex colour
    pub color: String,
    pub scale: f32,
}

impl KmlPeakStyle {
    pub fn new(name: impl Into<String>, color: impl Into<String>, scale: f32) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            scale,
        }
    }
}

/// Builds up a KML document. Offsets are converted with the tree's coordinate system.
pub struct KmlWriter<'a> {
    coords: &'a CoordinateSystem,
    kml: String,
}

impl<'a> KmlWriter<'a> {
    pub fn new(coords: &'a CoordinateSystem) -> Self {
        Self::with_peak_styles(coords, &[])
    }

    /// Writer that also declares `peak_styles`, selectable in [`KmlWriter::add_peak`]
    pub fn with_peak_styles(coords: &'a CoordinateSystem, peak_styles: &[KmlPeakStyle]) -> Self {
        let mut kml = String::from("<kml xmlns=\"http://www.opengis.net/kml/2.2\"><Document>\n");
        let _ = writeln!(
            kml,
            "<Style id=\"peak\"><IconStyle><color>ff00ccff</color><scale>1.2</scale><Icon><href>{}</href></Icon></IconStyle></Style>",
            TRIANGLE_ICON
        );
        for style in peak_styles {
            let _ = writeln!(
                kml,
                "<Style id=\"peak_{}\"><IconStyle><color>{}</color><scale>{}</scale><Icon><href>{}</href></Icon></IconStyle></Style>",
                escape(&style.name),
                escape(&style.color),
                style.scale,
                TRIANGLE_ICON
            );
        }
        let _ = writeln!(
            kml,
            "<Style id=\"saddle\"><IconStyle><color>ff00aa55</color><scale>0.6</scale><Icon><href>{}</href></Icon></IconStyle></Style>",
            DONUT_ICON
        );
        kml.push_str("<Style id=\"edge\"><LineStyle><color>ff0000ff</color><width>2</width></LineStyle></Style>\n");
        let _ = writeln!(
            kml,
            "<Style id=\"runoff\"><IconStyle><Icon><href>{}</href></Icon></IconStyle>",
            RUNOFF_ICON
        );
        kml.push_str("<LineStyle><color>ff800000</color></LineStyle></Style>\n");
        Self { coords, kml }
    }

    pub fn start_folder(&mut self, name: &str) {
        let _ = write!(self.kml, "<Folder><name>{}</name>", escape(name));
    }

    pub fn end_folder(&mut self) {
        self.kml.push_str("</Folder>");
    }

    /// `style` names one of the declared peak styles; `None` uses the default
    pub fn add_peak(
        &mut self,
        peak: &Peak,
        style: Option<&str>,
        name: &str,
        description: &str,
        id: Option<usize>,
    ) {
        self.open_placemark("peak", id);
        match style {
            Some(style) => {
                let _ = write!(self.kml, "<styleUrl>#peak_{}</styleUrl>", escape(style));
            }
            None => self.kml.push_str("<styleUrl>#peak</styleUrl>"),
        }
        self.kml.push_str("<Point><coordinates>\n");
        self.push_coordinate(peak.location, peak.elevation);
        let _ = writeln!(
            self.kml,
            "</coordinates></Point><name>{}</name><description>{}</description></Placemark>",
            escape(name),
            escape(description)
        );
    }

    pub fn add_prom_saddle(&mut self, saddle: &Saddle, name: &str, id: Option<usize>) {
        self.open_placemark("saddle", id);
        self.kml.push_str("<styleUrl>#saddle</styleUrl><Point><coordinates>\n");
        self.push_coordinate(saddle.location, saddle.elevation);
        let _ = writeln!(
            self.kml,
            "</coordinates></Point><name>{}</name></Placemark>",
            escape(name)
        );
    }

    pub fn add_runoff(&mut self, runoff: &Runoff, name: &str) {
        self.kml
            .push_str("<Placemark><styleUrl>#runoff</styleUrl><Point><coordinates>\n");
        self.push_coordinate(runoff.location, runoff.elevation);
        let _ = writeln!(
            self.kml,
            "</coordinates></Point><name>{}</name></Placemark>",
            escape(name)
        );
    }

    /// Line from a peak through its saddle to its parent
    pub fn add_graph_edge(&mut self, peak: &Peak, parent: &Peak, saddle: &Saddle) {
        self.kml
            .push_str("<Placemark><styleUrl>#edge</styleUrl><LineString><coordinates>\n");
        self.push_coordinate(peak.location, peak.elevation);
        self.push_coordinate(saddle.location, saddle.elevation);
        self.push_coordinate(parent.location, parent.elevation);
        self.kml.push_str("</coordinates></LineString></Placemark>\n");
    }

    pub fn add_runoff_edge(&mut self, peak: &Peak, runoff: &Runoff) {
        self.kml
            .push_str("<Placemark><styleUrl>#runoff</styleUrl><LineString><coordinates>\n");
        self.push_coordinate(peak.location, peak.elevation);
        self.push_coordinate(runoff.location, runoff.elevation);
        self.kml.push_str("</coordinates></LineString></Placemark>\n");
    }

    /// End the document and return the KML text
    pub fn finish(mut self) -> String {
        self.kml.push_str("</Document></kml>\n");
        self.kml
    }

    fn open_placemark(&mut self, kind: &str, id: Option<usize>) {
        match id {
            Some(id) => {
                let _ = write!(self.kml, "<Placemark id=\"{}_{}\">", kind, id);
            }
            None => self.kml.push_str("<Placemark>"),
        }
    }

    fn push_coordinate(&mut self, location: Offsets, elevation: Elevation) {
        let pos = self.coords.latlng(location);
        let _ = writeln!(self.kml, "{:.6},{:.6},{}", pos.longitude, pos.latitude, elevation);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kml_document_structure() {
        let coords = CoordinateSystem::new(46.0, 7.0, -0.01, 0.01);
        let peak = Peak {
            location: Offsets::new(1, 2),
            elevation: 1200,
        };
        let parent = Peak {
            location: Offsets::new(5, 5),
            elevation: 1500,
        };
        let saddle = Saddle {
            location: Offsets::new(3, 3),
            elevation: 900,
        };

        let mut writer = KmlWriter::new(&coords);
        writer.start_folder("Peaks");
        writer.add_peak(&peak, None, "Peak 1", "Elevation 1200 & more", Some(1));
        writer.end_folder();
        writer.add_graph_edge(&peak, &parent, &saddle);
        let kml = writer.finish();

        assert!(kml.starts_with("<kml"));
        assert!(kml.ends_with("</Document></kml>\n"));
        assert!(kml.contains("<Placemark id=\"peak_1\">"));
        assert!(kml.contains("7.010000,45.980000,1200"));
        assert!(kml.contains("&amp; more"));
        assert_eq!(kml.matches("<LineString>").count(), 1);
        assert!(kml.contains("<styleUrl>#peak</styleUrl>"));
    }

    #[test]
    fn test_peak_styles_are_declared_and_selectable() {
        let coords = CoordinateSystem::new(46.0, 7.0, -0.01, 0.01);
        let peak = Peak {
            location: Offsets::new(0, 0),
            elevation: 3000,
        };
        let styles = [
            KmlPeakStyle::new("major", "ff0000ff", 1.5),
            KmlPeakStyle::new("minor", "ff00ffff", 0.8),
        ];

        let mut writer = KmlWriter::with_peak_styles(&coords, &styles);
        writer.add_peak(&peak, Some("major"), "Big", "", None);
        let kml = writer.finish();

        assert!(kml.contains(
            "<Style id=\"peak_major\"><IconStyle><color>ff0000ff</color><scale>1.5</scale>"
        ));
        assert!(kml.contains("<Style id=\"peak_minor\"><IconStyle><color>ff00ffff</color><scale>0.8</scale>"));
        // The default style is always declared
        assert!(kml.contains("<Style id=\"peak\">"));
        assert!(kml.contains("<Placemark><styleUrl>#peak_major</styleUrl><Point>"));
    }
}
