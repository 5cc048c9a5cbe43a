/*!
 * Run configuration.
 *
 * [Config] is the whole JSON configuration file for a batch run. The clustering code never sees
 * it, instead it gets a [ClusterConfig] derived from it when the run starts.
 */
use crate::{
    error::{OutageMapResult, UnsupportedProjection},
    geometry,
    projection::{self, Crs},
};
use geo::{coord, Rect};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/**
 * The parameters that control how points are clustered into polygons.
 *
 * Distances are in the units of the output coordinate system. This is fixed for the life of a
 * batch run, every [PointCluster](crate::PointCluster) and [NodeGroup](crate::NodeGroup) holds a
 * copy.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterConfig {
    /// Points farther than this from the label point of their supply node are rejected.
    pub max_point_distance: f64,
    /// Buffer the hull of each supply node outward.
    pub buffer_on: bool,
    /// How far to buffer.
    pub buffer_distance: f64,
    /// Longest segment allowed when approximating the rounded corners of a buffer.
    pub densify_distance: f64,
    /// Most vertices used to approximate a full circle at a buffered corner.
    pub densify_max_vertices: usize,
    /// East-west half width of the diamond synthesized around a lone point.
    pub expand_x: f64,
    /// North-south half height of the diamond synthesized around a lone point.
    ///
    /// In a geographic system this is corrected by the cosine of the service territory latitude
    /// so the diamond is close to square on the ground.
    pub expand_y: f64,
    /// Merge overlapping supply node polygons within an event.
    pub merge_on: bool,
    /// Initial capacity of the supply node map in each event.
    pub supply_node_capacity: usize,
}

impl ClusterConfig {
    /// The number of vertices to use for each buffered corner.
    pub fn arc_vertices(&self) -> usize {
        geometry::arc_vertex_count(
            self.buffer_distance,
            self.densify_distance,
            self.densify_max_vertices,
        )
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let config = Config::default();
        config.cluster_config_for(config.envelope.rect(), Crs::Wgs84)
    }
}

/// A rectangle with the coordinate system it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub spatial_reference: SpatialReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialReference {
    pub wkid: u32,
}

impl Envelope {
    /// The envelope as a rectangle, in its own coordinate system.
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        )
    }

    /// The coordinate system of this envelope.
    pub fn crs(&self) -> Crs {
        Crs::from_wkid(self.spatial_reference.wkid)
    }
}

impl Default for Envelope {
    /// Roughly the Seattle City Light service territory.
    fn default() -> Self {
        Envelope {
            xmin: -122.50,
            ymin: 47.40,
            xmax: -122.20,
            ymax: 47.80,
            spatial_reference: SpatialReference {
                wkid: Crs::WGS84_WKID,
            },
        }
    }
}

/**
 * Everything needed to run a batch, loaded from a JSON file.
 *
 * Keys in the file are camelCase. Any key that is missing keeps its default value.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub debug_mode: bool,
    /// Included in every metrics log line so runs in different environments can be told apart.
    pub environment_label: String,
    pub buffer_on: bool,
    pub merge_on: bool,
    /// Export each event as the convex hull of its polygons instead of the polygons themselves.
    pub convex_hull_events: bool,
    pub max_supply_node_point_dist: f64,
    #[serde(rename = "densifyDistDegrees", alias = "densifyDist")]
    pub densify_dist: f64,
    pub densify_max_vertices: usize,
    #[serde(rename = "bufferDistDegrees", alias = "bufferDist")]
    pub buffer_dist: f64,
    #[serde(rename = "pointExpandDegrees", alias = "pointExpand")]
    pub point_expand: f64,
    /// Points outside this envelope are dropped.
    pub envelope: Envelope,
    pub supply_node_map_capacity: usize,
    pub event_map_capacity: usize,
    /// Path to the SQLite database holding the outage rows.
    pub source_db: PathBuf,
    /// Query that selects the outage rows, see [OutageDatabase](crate::OutageDatabase).
    #[serde(rename = "sourceDbSQL", alias = "sourceDbSql")]
    pub source_db_sql: String,
    #[serde(rename = "inputProjWKID", alias = "inputProjWkid")]
    pub input_proj_wkid: u32,
    #[serde(rename = "outputProjWKID", alias = "outputProjWkid")]
    pub output_proj_wkid: u32,
    /// Base name of output files, the extension is added for each format.
    pub file_output_name: String,
    /// A KML file bigger than this is rewritten with generalized events.
    pub file_max_size_bytes: u64,
    pub output_to_kml: bool,
    pub output_to_geo_json: bool,
    #[serde(alias = "kmlDirectory")]
    pub output_directory: PathBuf,
    pub output_to_geo_db: bool,
    /// Path to the SQLite database the polygons are written to.
    pub geo_db: PathBuf,
    #[serde(alias = "geoDbFeatureClassTable")]
    pub geo_db_table: String,
    pub geo_db_batch_size: usize,
    /// Threads used to compute event polygons, 0 means one per CPU.
    pub worker_threads: usize,
    /// Keys in the file that this program doesn't use. They are logged when the file is loaded.
    #[serde(flatten)]
    pub unused_keys: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug_mode: false,
            environment_label: "unknown".to_owned(),
            buffer_on: true,
            merge_on: true,
            convex_hull_events: false,
            max_supply_node_point_dist: 0.001799646,
            densify_dist: 0.00005,
            densify_max_vertices: 16,
            buffer_dist: 0.0002964440,
            point_expand: 0.000035,
            envelope: Envelope::default(),
            supply_node_map_capacity: 22,
            event_map_capacity: 237,
            source_db: PathBuf::from("outages.sqlite"),
            source_db_sql: crate::OutageDatabase::DEFAULT_QUERY.to_owned(),
            input_proj_wkid: Crs::WSP83_WKID,
            output_proj_wkid: Crs::WGS84_WKID,
            file_output_name: "outage_map".to_owned(),
            file_max_size_bytes: 5_242_880,
            output_to_kml: true,
            output_to_geo_json: false,
            output_directory: PathBuf::from("."),
            output_to_geo_db: false,
            geo_db: PathBuf::from("outage_map.sqlite"),
            geo_db_table: "outage_polygons".to_owned(),
            geo_db_batch_size: 25,
            worker_threads: 0,
            unused_keys: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> OutageMapResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;

        log::info!("Loaded configuration from {}", path.display());
        for key in config.unused_keys.keys() {
            log::warn!("Configuration key {} is not used and was ignored", key);
        }
        Ok(config)
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> OutageMapResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn input_crs(&self) -> Crs {
        Crs::from_wkid(self.input_proj_wkid)
    }

    pub fn output_crs(&self) -> Crs {
        Crs::from_wkid(self.output_proj_wkid)
    }

    /// The service envelope in the output coordinate system.
    pub fn service_envelope(&self) -> Result<Rect<f64>, UnsupportedProjection> {
        projection::project_envelope(self.envelope.rect(), self.envelope.crs(), self.output_crs())
    }

    /// The number of worker threads to use for computing polygons.
    pub fn workers(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    /// Path for an output file with the given extension.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.output_directory
            .join(&self.file_output_name)
            .with_extension(extension)
    }

    /// Build the clustering parameters for the output coordinate system.
    pub fn cluster_config(&self) -> Result<ClusterConfig, UnsupportedProjection> {
        let output = self.output_crs();
        let envelope = self.service_envelope()?;
        Ok(self.cluster_config_for(envelope, output))
    }

    fn cluster_config_for(&self, envelope: Rect<f64>, output: Crs) -> ClusterConfig {
        let expand_y = if output.is_geographic() {
            let center_lat = envelope.center().y;
            self.point_expand * center_lat.to_radians().cos()
        } else {
            self.point_expand
        };

        ClusterConfig {
            max_point_distance: self.max_supply_node_point_dist,
            buffer_on: self.buffer_on,
            buffer_distance: self.buffer_dist,
            densify_distance: self.densify_dist,
            densify_max_vertices: self.densify_max_vertices,
            expand_x: self.point_expand,
            expand_y,
            merge_on: self.merge_on,
            supply_node_capacity: self.supply_node_map_capacity,
        }
    }
}
