pub use batch::{BatchMetrics, BatchRun, IngestOutcome};
pub use catalog::{EventCatalog, EventMetadata, EventRecord, ExportMetrics};
pub use cluster::{NodeGroup, PointCluster};
pub use config::{ClusterConfig, Config, Envelope, SpatialReference};
pub use error::{OutageMapResult, OutlierRejected, UnsupportedHullGeometry, UnsupportedProjection};
pub use kml::{KmlFile, KmlWriter};
pub use map_database::{AddPolygonTransaction, MapDatabase, MapPolygonRow};
pub use outage_database::{AddOutageTransaction, OutageDatabase, OutageQuery};
pub use outage_record::OutageRecord;
pub use projection::{project, project_envelope, Crs};

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod batch;
mod catalog;
mod cluster;
mod config;
mod error;
mod geometry;
mod kml;
mod map_database;
mod memo;
mod outage_database;
mod outage_record;
mod projection;
