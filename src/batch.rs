/*!
 * A single batch run, from outage records to a catalog of event polygons.
 */
use crate::{
    catalog::EventCatalog,
    config::Config,
    error::{OutageMapResult, UnsupportedProjection},
    outage_record::OutageRecord,
    projection::{self, Crs},
};
use geo::{Intersects, Rect};
use std::fmt::{self, Display};

/// What happened to a record handed to [BatchRun::ingest].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The point was added to its event.
    Mapped,
    /// The point was outside the service territory and was dropped.
    OutsideTerritory,
    /// The point was too far from the rest of its supply node and was dropped.
    Rejected,
}

/// Counts for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchMetrics {
    pub records_read: usize,
    pub mapped: usize,
    pub outside_territory: usize,
    pub rejected: usize,
    pub events: usize,
    pub supply_nodes: usize,
}

impl Display for BatchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            "Database metric: {} records read, {} mapped, {} outside the service territory, \
             {} rejected. {} events impacting {} supply nodes.",
            self.records_read,
            self.mapped,
            self.outside_territory,
            self.rejected,
            self.events,
            self.supply_nodes
        )
    }
}

/**
 * Route outage records into an [EventCatalog].
 *
 * Every record is projected from the input to the output coordinate system and checked against
 * the service envelope before it is added to its event.
 */
pub struct BatchRun {
    catalog: EventCatalog,
    envelope: Rect<f64>,
    input: Crs,
    output: Crs,
    metrics: BatchMetrics,
}

impl BatchRun {
    pub fn new(config: &Config) -> Result<Self, UnsupportedProjection> {
        let envelope = config.service_envelope()?;
        let cluster_config = config.cluster_config()?;

        log::debug!(
            "Service envelope in {}: ({}, {}) to ({}, {})",
            config.output_crs(),
            envelope.min().x,
            envelope.min().y,
            envelope.max().x,
            envelope.max().y
        );

        Ok(BatchRun {
            catalog: EventCatalog::new(cluster_config, config.event_map_capacity),
            envelope,
            input: config.input_crs(),
            output: config.output_crs(),
            metrics: BatchMetrics::default(),
        })
    }

    /// Add one record to the run.
    ///
    /// Only a projection failure is an error, dropped points are reported in the outcome.
    pub fn ingest(&mut self, record: &OutageRecord) -> Result<IngestOutcome, UnsupportedProjection> {
        self.metrics.records_read += 1;

        let point = projection::project(record.location, self.input, self.output)?;

        if !self.envelope.intersects(&point) {
            log::debug!(
                "Point for event {} supply node {} is outside the service territory: ({}, {})",
                record.event_id,
                record.supply_node,
                point.x(),
                point.y()
            );
            self.metrics.outside_territory += 1;
            return Ok(IngestOutcome::OutsideTerritory);
        }

        match self.catalog.add_record(record, point) {
            Ok(()) => {
                self.metrics.mapped += 1;
                Ok(IngestOutcome::Mapped)
            }
            Err(err) => {
                log::info!("{}. Point dropped from event {}.", err, record.event_id);
                self.metrics.rejected += 1;
                Ok(IngestOutcome::Rejected)
            }
        }
    }

    /// Add every record from an iterator, stopping at the first error.
    pub fn ingest_all<I>(&mut self, records: I) -> OutageMapResult<()>
    where
        I: IntoIterator<Item = OutageMapResult<OutageRecord>>,
    {
        for record in records {
            self.ingest(&record?)?;
        }
        Ok(())
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    pub fn metrics(&self) -> BatchMetrics {
        BatchMetrics {
            events: self.catalog.event_count(),
            supply_nodes: self.catalog.supply_node_count(),
            ..self.metrics
        }
    }

    /// Compute the polygons for every event and hand back the catalog.
    pub fn finish(mut self, workers: usize) -> OutageMapResult<(EventCatalog, BatchMetrics)> {
        self.catalog.compute_polygons(workers)?;
        let metrics = self.metrics();
        Ok((self.catalog, metrics))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Envelope, SpatialReference};
    use geo::Point;

    fn record(event_id: i64, supply_node: i64, x: f64, y: f64) -> OutageRecord {
        OutageRecord {
            event_id,
            supply_node,
            location: Point::new(x, y),
            cause: "Tree".to_owned(),
            etor: "unknown".to_owned(),
            customer_count: 3,
            event_begin: None,
            first_crew_time: None,
        }
    }

    fn config() -> Config {
        Config {
            worker_threads: 2,
            ..Config::default()
        }
    }

    #[test]
    fn test_outcomes_are_counted() {
        let mut run = BatchRun::new(&config()).unwrap();

        // Downtown Seattle in state plane feet.
        let base = (1_270_000.0, 224_000.0);

        assert_eq!(
            run.ingest(&record(1, 10, base.0, base.1)).unwrap(),
            IngestOutcome::Mapped
        );
        assert_eq!(
            run.ingest(&record(1, 10, base.0 + 30.0, base.1 + 20.0)).unwrap(),
            IngestOutcome::Mapped
        );
        // A few miles away from the rest of supply node 10.
        assert_eq!(
            run.ingest(&record(1, 10, base.0 + 20_000.0, base.1)).unwrap(),
            IngestOutcome::Rejected
        );
        // Spokane.
        assert_eq!(
            run.ingest(&record(2, 11, 2_470_000.0, 245_000.0)).unwrap(),
            IngestOutcome::OutsideTerritory
        );

        let (catalog, metrics) = run.finish(2).unwrap();
        assert_eq!(
            metrics,
            BatchMetrics {
                records_read: 4,
                mapped: 2,
                outside_territory: 1,
                rejected: 1,
                events: 1,
                supply_nodes: 1,
            }
        );
        assert_eq!(catalog.event_polygons(1).unwrap().unwrap().len(), 1);
        assert!(catalog.event(2).is_none());
    }

    #[test]
    fn test_unsupported_projection_is_fatal() {
        let bad = Config {
            output_proj_wkid: 3857,
            ..config()
        };
        assert!(BatchRun::new(&bad).is_err());

        let bad_envelope = Config {
            envelope: Envelope {
                spatial_reference: SpatialReference { wkid: 32610 },
                ..Envelope::default()
            },
            ..config()
        };
        assert!(BatchRun::new(&bad_envelope).is_err());
    }

    #[test]
    fn test_metrics_line() {
        let metrics = BatchMetrics {
            records_read: 5,
            mapped: 3,
            outside_territory: 1,
            rejected: 1,
            events: 2,
            supply_nodes: 3,
        };
        assert_eq!(
            metrics.to_string(),
            "Database metric: 5 records read, 3 mapped, 1 outside the service territory, \
             1 rejected. 2 events impacting 3 supply nodes."
        );
    }
}
