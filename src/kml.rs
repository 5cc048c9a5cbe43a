//! Very simple functions for producing KML files specifically suited to outage maps.
//!
//! This is not a general solution at all. Only the parts needed for outage maps are implemented,
//! with a focus on a streaming type API so large event sets never have to be held as a document
//! in memory. That means the user is responsible for closing all tags.

use crate::OutageMapResult;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

pub struct KmlFile {
    out: BufWriter<File>,
    finished: bool,
}

impl KmlFile {
    pub fn new<P: AsRef<Path>>(pth: P) -> OutageMapResult<Self> {
        let p = pth.as_ref();

        let f = std::fs::File::create(p)?;
        let mut new = KmlFile {
            out: BufWriter::new(f),
            finished: false,
        };
        new.start_document()?;
        Ok(new)
    }

    /// Close the document and flush everything to disk.
    pub fn finish(mut self) -> OutageMapResult<()> {
        self.finished = true;
        self.finish_document();
        self.out.flush()?;
        Ok(())
    }
}

impl KmlWriter for KmlFile {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.out
    }
}

impl Drop for KmlFile {
    fn drop(&mut self) {
        if !self.finished {
            self.finish_document();
        }
    }
}

pub trait KmlWriter {
    fn output(&mut self) -> &mut dyn Write;

    /// Start by putting the header out.
    fn start_document(&mut self) -> OutageMapResult<()> {
        const HEADER: &str = concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "\n",
            r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#,
            "\n",
            "<Document>\n"
        );

        self.output().write_all(HEADER.as_bytes())?;

        Ok(())
    }

    /// Close a document.
    fn finish_document(&mut self) {
        const FOOTER: &str = concat!(r#"</Document>"#, "\n", r#"</kml>"#, "\n");
        let _ = self.output().write_all(FOOTER.as_bytes());
    }

    /// Write an XML comment.
    fn write_comment(&mut self, comment: &str) -> OutageMapResult<()> {
        writeln!(self.output(), "<!-- {} -->", comment)?;
        Ok(())
    }

    /// Write a name element.
    fn write_name(&mut self, name: &str) -> OutageMapResult<()> {
        writeln!(self.output(), "<name>{}</name>", name)?;
        Ok(())
    }

    /// Start a placemark element.
    fn start_placemark(&mut self, id: Option<&str>, style_url: Option<&str>) -> OutageMapResult<()> {
        if let Some(id) = id {
            writeln!(self.output(), "<Placemark id=\"{}\">", id)?;
        } else {
            writeln!(self.output(), "<Placemark>")?;
        }

        if let Some(style_url) = style_url {
            writeln!(self.output(), "<styleUrl>{}</styleUrl>", style_url)?;
        }

        Ok(())
    }

    /// Close out a placemark element.
    fn finish_placemark(&mut self) -> OutageMapResult<()> {
        writeln!(self.output(), "</Placemark>")?;
        Ok(())
    }

    /// Write an ExtendedData element with a single named value.
    ///
    /// The value is wrapped in CDATA so it may contain markup.
    fn write_extended_data(&mut self, name: &str, value: &str) -> OutageMapResult<()> {
        writeln!(self.output(), "<ExtendedData>")?;
        writeln!(self.output(), "<Data name=\"{}\">", name)?;
        writeln!(self.output(), "<value><![CDATA[{}]]></value>", value)?;
        writeln!(self.output(), "</Data>")?;
        writeln!(self.output(), "</ExtendedData>")?;
        Ok(())
    }

    /// Start a style definition.
    fn start_style(&mut self, style_id: Option<&str>) -> OutageMapResult<()> {
        if let Some(style_id) = style_id {
            writeln!(self.output(), "<Style id=\"{}\">", style_id)?;
        } else {
            writeln!(self.output(), "<Style>")?;
        }
        Ok(())
    }

    /// Close out a style definition.
    fn finish_style(&mut self) -> OutageMapResult<()> {
        writeln!(self.output(), "</Style>")?;
        Ok(())
    }

    /// Create a PolyStyle element.
    ///
    /// These should ONLY go inside a style element.
    fn create_poly_style(
        &mut self,
        color: Option<&str>,
        filled: bool,
        outlined: bool,
    ) -> OutageMapResult<()> {
        writeln!(self.output(), "<PolyStyle>")?;

        if let Some(color) = color {
            writeln!(self.output(), "<color>{}</color>", color)?;
            writeln!(self.output(), "<colorMode>normal</colorMode>")?;
        } else {
            writeln!(self.output(), "<colorMode>random</colorMode>")?;
        }

        let filled = if filled { 1 } else { 0 };
        let outlined = if outlined { 1 } else { 0 };

        writeln!(self.output(), "<fill>{}</fill>", filled)?;
        writeln!(self.output(), "<outline>{}</outline>", outlined)?;

        writeln!(self.output(), "</PolyStyle>")?;
        Ok(())
    }

    /// Create an IconStyle element.
    fn create_icon_style(&mut self, icon_url: Option<&str>, scale: f64) -> OutageMapResult<()> {
        writeln!(self.output(), "<IconStyle>")?;

        if scale > 0.0 {
            writeln!(self.output(), "<scale>{}</scale>", scale)?;
        } else {
            writeln!(self.output(), "<scale>1</scale>")?;
        }

        if let Some(icon_url) = icon_url {
            writeln!(self.output(), "<Icon><href>{}</href></Icon>", icon_url)?;
        }

        writeln!(self.output(), "</IconStyle>")?;
        Ok(())
    }

    /// Create a BalloonStyle element.
    ///
    /// `$[name]` in the text is replaced by the matching ExtendedData value of the placemark.
    fn create_balloon_style(&mut self, text: &str) -> OutageMapResult<()> {
        writeln!(self.output(), "<BalloonStyle>")?;
        writeln!(self.output(), "<text>{}</text>", text)?;
        writeln!(self.output(), "</BalloonStyle>")?;
        Ok(())
    }

    /// Start a Polygon element.
    fn start_polygon(
        &mut self,
        extrude: bool,
        tessellate: bool,
        altitude_mode: Option<&str>,
    ) -> OutageMapResult<()> {
        self.output().write_all("<Polygon>\n".as_bytes())?;

        if let Some(altitude_mode) = altitude_mode {
            debug_assert!(
                altitude_mode == "clampToGround"
                    || altitude_mode == "relativeToGround"
                    || altitude_mode == "absolute"
            );

            writeln!(
                self.output(),
                "<altitudeMode>{}</altitudeMode>",
                altitude_mode
            )?;
        }

        if extrude {
            self.output()
                .write_all("<extrude>1</extrude>\n".as_bytes())?;
        }

        if tessellate {
            self.output()
                .write_all("<tessellate>1</tessellate>\n".as_bytes())?;
        }

        Ok(())
    }

    /// Close out a Polygon element.
    fn finish_polygon(&mut self) -> OutageMapResult<()> {
        self.output().write_all("</Polygon>\n".as_bytes())?;
        Ok(())
    }

    /// Start the polygon outer ring.
    ///
    /// This should only be used inside a Polygon element.
    ///
    fn polygon_start_outer_ring(&mut self) -> OutageMapResult<()> {
        self.output().write_all("<outerBoundaryIs>\n".as_bytes())?;
        Ok(())
    }

    /// End the polygon outer ring.
    ///
    ///  This should only be used inside a Polygon element.
    ///
    fn polygon_finish_outer_ring(&mut self) -> OutageMapResult<()> {
        self.output().write_all("</outerBoundaryIs>\n".as_bytes())?;
        Ok(())
    }

    /// Start a LinearRing.
    fn start_linear_ring(&mut self) -> OutageMapResult<()> {
        self.output()
            .write_all("<LinearRing>\n<coordinates>\n".as_bytes())?;
        Ok(())
    }

    /// End a LinearRing.
    fn finish_linear_ring(&mut self) -> OutageMapResult<()> {
        self.output()
            .write_all("</coordinates>\n</LinearRing>\n".as_bytes())?;
        Ok(())
    }

    /// Add a vertex to the LinearRing
    ///
    /// Must be used inside a linear ring element.
    fn linear_ring_add_vertex(&mut self, lon: f64, lat: f64, z: f64) -> OutageMapResult<()> {
        writeln!(self.output(), "{:.7},{:.7},{}", lon, lat, z)?;
        Ok(())
    }

    /// Write out a KML Point element
    fn create_point(&mut self, lon: f64, lat: f64, z: f64) -> OutageMapResult<()> {
        writeln!(
            self.output(),
            "<Point>\n<coordinates>{:.7},{:.7},{}</coordinates>\n</Point>",
            lon,
            lat,
            z
        )?;
        Ok(())
    }
}
