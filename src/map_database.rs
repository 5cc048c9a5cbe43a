/*! Store the outage polygons for display in a map. */

use crate::{
    catalog::{EventCatalog, ExportMetrics},
    error::OutageMapResult,
};
use geo::{Point, Polygon};
use rusqlite::{types::Type, ToSql};
use std::path::Path;

/**
 * A database table with one row per outage polygon.
 *
 * Each row carries the polygon as GeoJSON geometry text, the label point of its event, and the
 * event metadata needed to build a popup without going back to the outage system.
 *
 * A second table with the suffix `_staging` holds a catalog while it is being written, so readers
 * of the main table only ever see a complete catalog.
 */
pub struct MapDatabase {
    db: rusqlite::Connection,
    table: String,
    staging: String,
}

/// One row of the map table.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPolygonRow {
    pub event_id: i64,
    /// Position of this polygon in its event.
    pub polygon_index: usize,
    pub shape: Polygon<f64>,
    pub label_point: Option<Point<f64>>,
    pub cause: String,
    pub etor: String,
    pub customer_count: i64,
    pub event_begin: String,
    pub crew_status: Option<String>,
    pub vertex_count: usize,
}

impl MapDatabase {
    /// Open a database and create the table if needed.
    pub fn connect<P: AsRef<Path>>(path_to_db: P, table: &str) -> OutageMapResult<Self> {
        let valid_name = table
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_name {
            return Err(format!("invalid table name: {:?}", table).into());
        }

        let conn = rusqlite::Connection::open_with_flags(
            path_to_db,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        let new = MapDatabase {
            db: conn,
            table: table.to_owned(),
            staging: format!("{}_staging", table),
        };

        const CREATE: &str = include_str!("map_database/create_table.sql");
        new.db.execute_batch(&sql_for(CREATE, &new.table))?;
        new.db.execute_batch(&sql_for(CREATE, &new.staging))?;

        Ok(new)
    }

    fn sql(&self, template: &str) -> String {
        sql_for(template, &self.table)
    }

    /// Remove every row, returning how many there were.
    pub fn clear(&self) -> OutageMapResult<usize> {
        let removed = self.db.execute(&self.sql("DELETE FROM {table}"), [])?;
        Ok(removed)
    }

    /**
     * Start a transaction for adding polygons.
     *
     * Rows are committed every `batch_size` polygons and when the handle is dropped.
     */
    pub fn add_polygon_handle(&self, batch_size: usize) -> OutageMapResult<AddPolygonTransaction> {
        AddPolygonTransaction::new(&self.db, &self.table, batch_size)
    }

    /**
     * Replace the contents of the table with the polygons of every event in the catalog.
     *
     * The rows are written to the staging table in batches of `batch_size`, then moved into the
     * main table in a single transaction. If anything fails the main table is left as it was.
     *
     * If `generalize` is set, each event is stored as the convex hull of its polygons.
     */
    pub fn write_catalog(
        &self,
        catalog: &EventCatalog,
        generalize: bool,
        batch_size: usize,
    ) -> OutageMapResult<ExportMetrics> {
        self.db
            .execute(&sql_for("DELETE FROM {table}", &self.staging), [])?;

        let mut metrics = ExportMetrics::default();
        {
            let mut add_transaction = AddPolygonTransaction::new(&self.db, &self.staging, batch_size)?;

            for event in catalog.events_sorted() {
                let label_point = event.label_point()?;
                let polygons = event.export_polygons(generalize)?;

                for (polygon_index, shape) in polygons.into_iter().enumerate() {
                    let vertex_count = shape.exterior().0.len();
                    metrics.polygons += 1;
                    metrics.vertices += vertex_count;

                    add_transaction.add_polygon(&MapPolygonRow {
                        event_id: event.event_id(),
                        polygon_index,
                        shape,
                        label_point,
                        cause: event.cause().to_owned(),
                        etor: event.etor().to_owned(),
                        customer_count: event.customer_count(),
                        event_begin: event.begin_text().to_owned(),
                        crew_status: event.crew_status().map(ToOwned::to_owned),
                        vertex_count,
                    })?;
                }

                metrics.events += 1;
            }
        }

        let tx = self.db.unchecked_transaction()?;
        let removed = tx.execute(&self.sql("DELETE FROM {table}"), [])?;
        tx.execute(
            &format!("INSERT INTO {} SELECT * FROM {}", self.table, self.staging),
            [],
        )?;
        tx.execute(&sql_for("DELETE FROM {table}", &self.staging), [])?;
        tx.commit()?;

        log::debug!("Replaced {} old polygons in {}", removed, self.table);
        Ok(metrics)
    }

    /// The number of polygons in the table.
    pub fn polygon_count(&self) -> OutageMapResult<usize> {
        let count: i64 = self
            .db
            .query_row(&self.sql("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Read back the polygons for an event in order.
    pub fn event_polygons(&self, event_id: i64) -> OutageMapResult<Vec<MapPolygonRow>> {
        let mut stmt = self
            .db
            .prepare(&self.sql(include_str!("map_database/event_polygons.sql")))?;

        let rows = stmt
            .query_and_then([event_id], |row| {
                let shape_text: String = row.get(2)?;
                let shape = parse_shape(&shape_text).map_err(|msg| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, msg.into())
                })?;

                let label_x: Option<f64> = row.get(3)?;
                let label_y: Option<f64> = row.get(4)?;
                let label_point = match (label_x, label_y) {
                    (Some(x), Some(y)) => Some(Point::new(x, y)),
                    _ => None,
                };

                Ok(MapPolygonRow {
                    event_id: row.get(0)?,
                    polygon_index: row.get::<_, i64>(1)? as usize,
                    shape,
                    label_point,
                    cause: row.get(5)?,
                    etor: row.get(6)?,
                    customer_count: row.get(7)?,
                    event_begin: row.get(8)?,
                    crew_status: row.get(9)?,
                    vertex_count: row.get::<_, i64>(10)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(rows)
    }
}

fn sql_for(template: &str, table: &str) -> String {
    template.replace("{table}", table)
}

fn parse_shape(text: &str) -> Result<Polygon<f64>, String> {
    let geometry: geojson::Geometry = serde_json::from_str(text).map_err(|err| err.to_string())?;
    Polygon::<f64>::try_from(geometry.value).map_err(|err| err.to_string())
}

pub struct AddPolygonTransaction<'a> {
    stmt: rusqlite::Statement<'a>,
    conn: &'a rusqlite::Connection,
    batch_size: usize,
    pending: usize,
}

impl<'a> AddPolygonTransaction<'a> {
    fn new(
        conn: &'a rusqlite::Connection,
        table: &str,
        batch_size: usize,
    ) -> OutageMapResult<Self> {
        let stmt = conn.prepare(&sql_for(include_str!("map_database/add_polygon.sql"), table))?;

        conn.execute("BEGIN", [])?;
        Ok(AddPolygonTransaction {
            stmt,
            conn,
            batch_size: batch_size.max(1),
            pending: 0,
        })
    }

    pub fn add_polygon(&mut self, row: &MapPolygonRow) -> OutageMapResult<()> {
        let shape = serde_json::to_string(&geojson::Geometry::new(geojson::Value::from(&row.shape)))?;
        let label_x = row.label_point.map(|p| p.x());
        let label_y = row.label_point.map(|p| p.y());
        let polygon_index = row.polygon_index as i64;
        let vertex_count = row.vertex_count as i64;

        let _ = self.stmt.execute([
            &row.event_id as &dyn ToSql,
            &polygon_index,
            &shape,
            &label_x,
            &label_y,
            &row.cause,
            &row.etor,
            &row.customer_count,
            &row.event_begin,
            &row.crew_status,
            &vertex_count,
        ])?;

        self.pending += 1;
        if self.pending >= self.batch_size {
            self.conn.execute_batch("COMMIT; BEGIN")?;
            self.pending = 0;
        }

        Ok(())
    }
}

impl<'a> Drop for AddPolygonTransaction<'a> {
    fn drop(&mut self) {
        if let Err(err) = self.conn.execute("COMMIT", []) {
            log::error!("Error committing map polygons: {}", err);
        }
    }
}
