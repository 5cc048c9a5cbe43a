/*!
 * The collection of all outage events in a batch run.
 *
 * The [EventCatalog] owns one [EventRecord] per event id, and each of those owns the
 * [NodeGroup] for its supply nodes. There are no references between events, so the polygons for
 * different events can be computed on different threads.
 */
use crate::{
    cluster::NodeGroup,
    config::ClusterConfig,
    error::{OutageMapResult, OutlierRejected, UnsupportedHullGeometry},
    geometry,
    kml::{KmlFile, KmlWriter},
    outage_record::OutageRecord,
};
use crossbeam_channel::{bounded, unbounded};
use geo::{Point, Polygon};
use geojson::{feature::Id, Feature, FeatureCollection, JsonObject, JsonValue};
use rustc_hash::FxHashMap as HashMap;
use std::{
    fmt::{self, Display},
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    thread,
};

const CHANNEL_SIZE: usize = 100;

static_assertions::assert_impl_all!(EventRecord: Send);
static_assertions::assert_impl_all!(NodeGroup: Send);

/// The descriptive information about an event that is shown with it on a map.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    pub cause: String,
    /// Estimated time of restoral.
    pub etor: String,
    pub customer_count: i64,
    /// When the event started, formatted for display.
    pub begin_text: String,
    /// `Some("Dispatched")` if a crew is on the way.
    pub crew_status: Option<String>,
}

impl From<&OutageRecord> for EventMetadata {
    fn from(record: &OutageRecord) -> Self {
        EventMetadata {
            cause: record.cause.clone(),
            etor: record.etor.clone(),
            customer_count: record.customer_count,
            begin_text: record.begin_text(),
            crew_status: record.crew_dispatched_text().map(ToOwned::to_owned),
        }
    }
}

/**
 * A single outage event.
 *
 * The metadata is taken from the first record seen for the event and never updated. If later
 * records disagree with it they are ignored.
 */
#[derive(Debug, Clone)]
pub struct EventRecord {
    event_id: i64,
    metadata: EventMetadata,
    nodes: NodeGroup,
}

impl EventRecord {
    pub fn event_id(&self) -> i64 {
        self.event_id
    }

    pub fn cause(&self) -> &str {
        &self.metadata.cause
    }

    pub fn etor(&self) -> &str {
        &self.metadata.etor
    }

    pub fn customer_count(&self) -> i64 {
        self.metadata.customer_count
    }

    pub fn begin_text(&self) -> &str {
        &self.metadata.begin_text
    }

    pub fn crew_status(&self) -> Option<&str> {
        self.metadata.crew_status.as_deref()
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn node_group(&self) -> &NodeGroup {
        &self.nodes
    }

    pub fn supply_node_count(&self) -> usize {
        self.nodes.supply_node_count()
    }

    pub fn point_count(&self) -> usize {
        self.nodes.point_count()
    }

    /// The merged polygons for this event.
    pub fn polygons(&self) -> Result<&[Polygon<f64>], UnsupportedHullGeometry> {
        self.nodes.polygons()
    }

    pub fn label_point(&self) -> Result<Option<Point<f64>>, UnsupportedHullGeometry> {
        self.nodes.label_point()
    }

    /// A single convex polygon around all the polygons of this event.
    pub fn hull_polygon(&self) -> Result<Option<Polygon<f64>>, UnsupportedHullGeometry> {
        let polygons = self.polygons()?;
        if polygons.is_empty() {
            return Ok(None);
        }

        Ok(Some(geometry::hull_of(polygons)))
    }

    /// The polygons to draw for this event, either all of them or just their hull.
    pub fn export_polygons(&self, generalize: bool) -> Result<Vec<Polygon<f64>>, UnsupportedHullGeometry> {
        if generalize {
            Ok(self.hull_polygon()?.into_iter().collect())
        } else {
            Ok(self.polygons()?.to_vec())
        }
    }

    /// The HTML snippet shown in a map popup for this event.
    pub fn outage_info(&self) -> String {
        let mut info = format!(
            "Outage start: {}<br/>Est. customers affected: {}<br/>{}<br/>Cause: {}",
            self.metadata.begin_text, self.metadata.customer_count, self.metadata.etor, self.metadata.cause
        );

        if let Some(crew_status) = &self.metadata.crew_status {
            info.push_str("<br/>Crew status: ");
            info.push_str(crew_status);
        }

        info
    }

    fn feature(&self, geometry: geojson::Geometry, kind: &str, id: String) -> Feature {
        let mut properties = JsonObject::new();
        properties.insert("eventId".to_owned(), JsonValue::from(self.event_id));
        properties.insert("cause".to_owned(), JsonValue::from(self.cause()));
        properties.insert("etor".to_owned(), JsonValue::from(self.etor()));
        properties.insert("customerCount".to_owned(), JsonValue::from(self.customer_count()));
        properties.insert("eventBegin".to_owned(), JsonValue::from(self.begin_text()));
        properties.insert(
            "crewStatus".to_owned(),
            self.crew_status().map(JsonValue::from).unwrap_or(JsonValue::Null),
        );
        properties.insert("kind".to_owned(), JsonValue::from(kind));

        Feature {
            bbox: None,
            geometry: Some(geometry),
            id: Some(Id::String(id)),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Counts of what was written by an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportMetrics {
    pub events: usize,
    pub polygons: usize,
    /// Total polygon vertices written.
    pub vertices: usize,
}

impl Display for ExportMetrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            "{} event(s) mapped into {} polygons with {} polygon points",
            self.events, self.polygons, self.vertices
        )
    }
}

/// All the events in a batch run, keyed by event id.
#[derive(Debug, Clone)]
pub struct EventCatalog {
    events: HashMap<i64, EventRecord>,
    config: ClusterConfig,
}

impl EventCatalog {
    pub fn new(config: ClusterConfig, event_capacity: usize) -> Self {
        let mut events = HashMap::default();
        events.reserve(event_capacity);

        EventCatalog { events, config }
    }

    /**
     * Add a point to an event.
     *
     * The first time an event id is seen the metadata is stored with it. After that only the point
     * is used.
     */
    pub fn add_point(
        &mut self,
        event_id: i64,
        supply_node: i64,
        point: Point<f64>,
        metadata: &EventMetadata,
    ) -> Result<(), OutlierRejected> {
        let config = self.config;
        self.events
            .entry(event_id)
            .or_insert_with(|| EventRecord {
                event_id,
                metadata: metadata.clone(),
                nodes: NodeGroup::new(config),
            })
            .nodes
            .add_point(supply_node, point)
    }

    /// Add an outage record, using `point` in place of its location.
    pub fn add_record(&mut self, record: &OutageRecord, point: Point<f64>) -> Result<(), OutlierRejected> {
        if let Some(event) = self.events.get_mut(&record.event_id) {
            return event.nodes.add_point(record.supply_node, point);
        }

        self.add_point(record.event_id, record.supply_node, point, &EventMetadata::from(record))
    }

    pub fn event(&self, event_id: i64) -> Option<&EventRecord> {
        self.events.get(&event_id)
    }

    /// The polygons for an event, `None` if there is no such event.
    pub fn event_polygons(&self, event_id: i64) -> Result<Option<&[Polygon<f64>]>, UnsupportedHullGeometry> {
        self.events.get(&event_id).map(|e| e.polygons()).transpose()
    }

    /// The label point for an event, `None` if there is no such event or it has no polygons.
    pub fn label_point(&self, event_id: i64) -> Result<Option<Point<f64>>, UnsupportedHullGeometry> {
        match self.events.get(&event_id) {
            Some(event) => event.label_point(),
            None => Ok(None),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Total number of supply nodes over all events.
    pub fn supply_node_count(&self) -> usize {
        self.events.values().map(|e| e.supply_node_count()).sum()
    }

    /// Total number of points over all events.
    pub fn point_count(&self) -> usize {
        self.events.values().map(|e| e.point_count()).sum()
    }

    pub fn metrics(&self) -> String {
        format!(
            "Outage metric: {} events impacting {} supply nodes.",
            self.event_count(),
            self.supply_node_count()
        )
    }

    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.values()
    }

    /// All the events in order of event id.
    pub fn events_sorted(&self) -> Vec<&EventRecord> {
        let mut events: Vec<&EventRecord> = self.events.values().collect();
        events.sort_by_key(|e| e.event_id);
        events
    }

    /**
     * Compute the polygons for every event using a pool of worker threads.
     *
     * Each event is moved to a worker, computed there, and moved back. After this returns the
     * polygons are cached and the exporters only read them. If any event fails, the first error is
     * returned after every event is back in the catalog.
     */
    pub fn compute_polygons(&mut self, workers: usize) -> OutageMapResult<()> {
        let workers = workers.max(1);

        if workers == 1 || self.events.len() < 2 {
            for event in self.events.values() {
                event.nodes.prepare()?;
            }
            return Ok(());
        }

        let mut first_error: Option<UnsupportedHullGeometry> = None;
        let mut unsent: Vec<EventRecord> = vec![];

        thread::scope(|scope| -> OutageMapResult<()> {
            // Every sender lives in this closure, so an early return closes the channels before
            // the scope joins the workers.
            let (to_workers, from_catalog) = bounded::<EventRecord>(CHANNEL_SIZE);
            let (to_catalog, from_workers) =
                unbounded::<(EventRecord, Result<(), UnsupportedHullGeometry>)>();

            let mut spawned = 0;
            for i in 0..workers {
                let from_catalog = from_catalog.clone();
                let to_catalog = to_catalog.clone();

                let res = thread::Builder::new()
                    .name(format!("outagemap-polygons-{}", i))
                    .spawn_scoped(scope, move || {
                        for event in from_catalog {
                            let res = event.nodes.prepare();
                            if to_catalog.send((event, res)).is_err() {
                                break;
                            }
                        }
                    });

                match res {
                    Ok(_) => spawned += 1,
                    Err(err) if spawned > 0 => {
                        log::warn!("Computing polygons with {} workers: {}", spawned, err);
                        break;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            drop(from_catalog);
            drop(to_catalog);

            let pending: Vec<EventRecord> = self.events.drain().map(|(_, event)| event).collect();
            for event in pending {
                if let Err(err) = to_workers.send(event) {
                    unsent.push(err.into_inner());
                }
            }
            drop(to_workers);

            for (event, res) in from_workers {
                if let Err(err) = res {
                    first_error.get_or_insert(err);
                }
                self.events.insert(event.event_id, event);
            }

            Ok(())
        })?;

        for event in unsent {
            if let Err(err) = event.nodes.prepare() {
                first_error.get_or_insert(err);
            }
            self.events.insert(event.event_id, event);
        }

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /**
     * Write every event as KML.
     *
     * Each event gets a marker at its label point and a placemark for each polygon. If `generalize`
     * is set, each event is drawn as the convex hull of its polygons.
     */
    pub fn write_kml<K: KmlWriter>(&self, kml: &mut K, generalize: bool) -> OutageMapResult<ExportMetrics> {
        const AREA_STYLE: &str = "displayName-value";
        const MARKER_STYLE: &str = "displayName-event-marker";
        const BALLOON_TEXT: &str = "$[outageInfo]";

        kml.write_comment(&chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string())?;
        kml.write_name("Outage Area")?;

        kml.start_style(Some(AREA_STYLE))?;
        kml.create_poly_style(Some("990000FF"), true, false)?;
        kml.create_balloon_style(BALLOON_TEXT)?;
        kml.finish_style()?;

        kml.start_style(Some(MARKER_STYLE))?;
        kml.create_balloon_style(BALLOON_TEXT)?;
        kml.create_icon_style(Some("outage_highlight_marker.png"), 1.0)?;
        kml.finish_style()?;

        let mut metrics = ExportMetrics::default();
        for event in self.events_sorted() {
            let info = format!("<iframe>{}</iframe>", event.outage_info());
            let marker_style = format!("#{}", MARKER_STYLE);
            let area_style = format!("#{}", AREA_STYLE);

            if let Some(label) = event.label_point()? {
                let id = format!("{} - Marker", event.event_id);
                kml.start_placemark(Some(&id), Some(&marker_style))?;
                kml.write_extended_data("outageInfo", &info)?;
                kml.create_point(label.x(), label.y(), 0.0)?;
                kml.finish_placemark()?;
            }

            for (i, polygon) in event.export_polygons(generalize)?.iter().enumerate() {
                let id = format!("{}-{}", event.event_id, i);
                kml.start_placemark(Some(&id), Some(&area_style))?;
                kml.write_extended_data("outageInfo", &info)?;
                kml.start_polygon(false, false, None)?;
                kml.polygon_start_outer_ring()?;
                kml.start_linear_ring()?;
                for coord in polygon.exterior().coords() {
                    kml.linear_ring_add_vertex(coord.x, coord.y, 0.0)?;
                    metrics.vertices += 1;
                }
                kml.finish_linear_ring()?;
                kml.polygon_finish_outer_ring()?;
                kml.finish_polygon()?;
                kml.finish_placemark()?;

                metrics.polygons += 1;
            }

            metrics.events += 1;
        }

        Ok(metrics)
    }

    /**
     * Save the catalog as a KML file.
     *
     * If the file comes out bigger than `max_size_bytes` and it wasn't already generalized, it is
     * written again with every event generalized to a single convex polygon.
     */
    pub fn save_kml<P: AsRef<Path>>(
        &self,
        path: P,
        generalize: bool,
        max_size_bytes: u64,
        environment: &str,
    ) -> OutageMapResult<ExportMetrics> {
        let path = path.as_ref();
        log::info!(
            "Attempting to write KML file to {}. (environment={})",
            path.display(),
            environment
        );

        let mut metrics = self.save_kml_once(path, generalize)?;

        let size = std::fs::metadata(path)?.len();
        if !generalize && size > max_size_bytes {
            log::info!(
                "KML output exceeds maximum file size, creating convex hull from each event. (environment={})",
                environment
            );
            metrics = self.save_kml_once(path, true)?;
        }

        log::info!("KML metric: {}. (environment={})", metrics, environment);
        Ok(metrics)
    }

    fn save_kml_once(&self, path: &Path, generalize: bool) -> OutageMapResult<ExportMetrics> {
        let mut kml = KmlFile::new(path)?;
        let metrics = self.write_kml(&mut kml, generalize)?;
        kml.finish()?;
        Ok(metrics)
    }

    /**
     * Build a GeoJSON feature collection of every event.
     *
     * Each polygon is a feature of kind "area" and each label point a feature of kind "label". All
     * features carry the event metadata as properties.
     */
    pub fn to_geojson(&self, generalize: bool) -> Result<FeatureCollection, UnsupportedHullGeometry> {
        let mut features: Vec<Feature> = vec![];

        for event in self.events_sorted() {
            for (i, polygon) in event.export_polygons(generalize)?.iter().enumerate() {
                let geometry = geojson::Geometry::new(geojson::Value::from(polygon));
                let id = format!("{}-{}", event.event_id, i);
                features.push(event.feature(geometry, "area", id));
            }

            if let Some(label) = event.label_point()? {
                let geometry = geojson::Geometry::new(geojson::Value::from(&label));
                let id = format!("{}-label", event.event_id);
                features.push(event.feature(geometry, "label", id));
            }
        }

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    /// Save the catalog as a GeoJSON file.
    pub fn save_geojson<P: AsRef<Path>>(
        &self,
        path: P,
        generalize: bool,
        environment: &str,
    ) -> OutageMapResult<ExportMetrics> {
        let path = path.as_ref();
        log::info!(
            "Attempting to write GeoJSON file to {}. (environment={})",
            path.display(),
            environment
        );

        let collection = self.to_geojson(generalize)?;

        let mut metrics = ExportMetrics {
            events: self.event_count(),
            ..ExportMetrics::default()
        };
        for feature in &collection.features {
            if let Some(geojson::Value::Polygon(rings)) = feature.geometry.as_ref().map(|g| &g.value) {
                metrics.polygons += 1;
                metrics.vertices += rings.iter().map(|r| r.len()).sum::<usize>();
            }
        }

        let mut f = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut f, &collection)?;
        f.flush()?;

        log::info!("GeoJSON metric: {}. (environment={})", metrics, environment);
        Ok(metrics)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::Intersects;

    fn planar() -> ClusterConfig {
        ClusterConfig {
            max_point_distance: 1_000.0,
            buffer_on: false,
            expand_x: 0.5,
            expand_y: 0.5,
            ..ClusterConfig::default()
        }
    }

    fn metadata(cause: &str) -> EventMetadata {
        EventMetadata {
            cause: cause.to_owned(),
            etor: "Est. restoration: 6:00 PM".to_owned(),
            customer_count: 12,
            begin_text: "3:07 PM, 01/19".to_owned(),
            crew_status: None,
        }
    }

    fn build(events: i64) -> EventCatalog {
        let mut catalog = EventCatalog::new(planar(), 8);
        for event_id in 0..events {
            let x0 = event_id as f64 * 100.0;
            for (node, (x, y)) in [(0.0, 0.0), (2.0, 0.0), (1.0, 2.0), (1.5, 1.0), (6.0, 6.0)]
                .into_iter()
                .enumerate()
            {
                catalog
                    .add_point(event_id, node as i64 / 2, Point::new(x0 + x, y), &metadata("Tree"))
                    .unwrap();
            }
        }
        catalog
    }

    #[test]
    fn test_first_record_metadata_wins() {
        let mut catalog = EventCatalog::new(planar(), 8);
        catalog.add_point(1, 10, Point::new(0.0, 0.0), &metadata("Tree")).unwrap();
        catalog.add_point(1, 11, Point::new(1.0, 0.0), &metadata("Wind")).unwrap();

        assert_eq!(catalog.event_count(), 1);
        assert_eq!(catalog.event(1).unwrap().cause(), "Tree");
        assert_eq!(catalog.supply_node_count(), 2);
        assert_eq!(catalog.point_count(), 2);
    }

    #[test]
    fn test_supply_node_count_is_total_over_events() {
        let catalog = build(3);
        assert_eq!(catalog.event_count(), 3);
        assert_eq!(catalog.supply_node_count(), 9);
        assert_eq!(
            catalog.metrics(),
            "Outage metric: 3 events impacting 9 supply nodes."
        );
    }

    #[test]
    fn test_unknown_event() {
        let catalog = build(1);
        assert!(catalog.event_polygons(99).unwrap().is_none());
        assert!(catalog.label_point(99).unwrap().is_none());
        assert!(catalog.event_polygons(0).unwrap().is_some());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = build(12);
        let mut parallel = sequential.clone();
        parallel.compute_polygons(4).unwrap();

        assert_eq!(parallel.event_count(), 12);
        for event in sequential.events() {
            let other = parallel.event(event.event_id()).unwrap();
            assert!(other.node_group().polygons().is_ok());
            assert_eq!(event.polygons().unwrap(), other.polygons().unwrap());
            assert_eq!(event.label_point().unwrap(), other.label_point().unwrap());
        }
    }

    #[test]
    fn test_parallel_run_returns_every_event() {
        // More events than the channel holds, and more workers than events.
        for (events, workers) in [(CHANNEL_SIZE as i64 + 5, 3), (3, 16)] {
            let mut catalog = build(events);
            catalog.compute_polygons(workers).unwrap();

            assert_eq!(catalog.event_count(), events as usize);
            for event_id in 0..events {
                assert!(catalog.event_polygons(event_id).unwrap().is_some());
            }
        }
    }

    #[test]
    fn test_hull_polygon_covers_event() {
        let catalog = build(1);
        let event = catalog.event(0).unwrap();
        let hull = event.hull_polygon().unwrap().unwrap();

        for polygon in event.polygons().unwrap() {
            for c in polygon.exterior().coords() {
                assert!(hull.intersects(c));
            }
        }
        assert_eq!(event.export_polygons(true).unwrap().len(), 1);
    }

    #[test]
    fn test_outage_info() {
        let mut catalog = EventCatalog::new(planar(), 8);
        let meta = EventMetadata {
            crew_status: Some("Dispatched".to_owned()),
            ..metadata("Tree")
        };
        catalog.add_point(4, 1, Point::new(0.0, 0.0), &meta).unwrap();

        assert_eq!(
            catalog.event(4).unwrap().outage_info(),
            "Outage start: 3:07 PM, 01/19<br/>Est. customers affected: 12<br/>\
             Est. restoration: 6:00 PM<br/>Cause: Tree<br/>Crew status: Dispatched"
        );
    }

    #[test]
    fn test_geojson_features() {
        let catalog = build(2);
        let collection = catalog.to_geojson(false).unwrap();

        let areas = collection
            .features
            .iter()
            .filter(|f| f.property("kind") == Some(&JsonValue::from("area")))
            .count();
        let labels = collection
            .features
            .iter()
            .filter(|f| f.property("kind") == Some(&JsonValue::from("label")))
            .count();

        let expected: usize = catalog.events().map(|e| e.polygons().unwrap().len()).sum();
        assert_eq!(areas, expected);
        assert_eq!(labels, 2);

        let first = &collection.features[0];
        assert_eq!(first.property("eventId"), Some(&JsonValue::from(0)));
        assert_eq!(first.property("crewStatus"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_kml_size_guard_generalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outage_map.kml");
        let catalog = build(3);

        let full = catalog.save_kml(&path, false, u64::MAX, "test").unwrap();
        assert_eq!(full.events, 3);
        assert_eq!(full.polygons, 9);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<Placemark id=\"0-1\">"));
        assert!(text.contains("<Placemark id=\"2 - Marker\">"));
        assert!(text.contains("<styleUrl>#displayName-value</styleUrl>"));
        assert!(text.contains("<value><![CDATA[<iframe>Outage start: 3:07 PM, 01/19<br/>"));
        assert!(text.contains("Cause: Tree</iframe>]]></value>"));

        let small = catalog.save_kml(&path, false, 10, "test").unwrap();
        assert_eq!(small.events, 3);
        assert_eq!(small.polygons, 3);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("<Placemark id=\"0-1\">"));
    }
}
