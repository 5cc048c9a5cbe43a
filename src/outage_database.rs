/*! The source of outage records. */

use crate::{error::OutageMapResult, outage_record::OutageRecord};
use chrono::{DateTime, NaiveDateTime};
use geo::Point;
use rusqlite::{
    types::{Type, ValueRef},
    Row, ToSql,
};
use std::path::Path;

/**
 * A database of customers currently without power.
 *
 * The `customers_out` table has one row per affected customer. Any query used with
 * [OutageDatabase::outage_query] must return the columns `POINT_Y`, `POINT_X`, `EVENT_CAUSE`,
 * `EVENT_ETOR_TEXT`, `EVENT_IDX`, `CUSTSBYEVENT`, `EVENT_BEGIN`, `FIRST_CREW_TIME`, and
 * `SUPPLY_IDX`.
 */
pub struct OutageDatabase {
    db: rusqlite::Connection,
}

impl OutageDatabase {
    /// Selects every row of the `customers_out` table.
    pub const DEFAULT_QUERY: &'static str = include_str!("outage_database/customers_out.sql");

    /// Open a database, creating it and the `customers_out` table if needed.
    pub fn connect<P: AsRef<Path>>(path_to_db: P) -> OutageMapResult<Self> {
        let conn = rusqlite::Connection::open_with_flags(
            path_to_db,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        conn.execute_batch(include_str!("outage_database/create_db.sql"))?;

        Ok(OutageDatabase { db: conn })
    }

    /// Prepare a query for outage records.
    pub fn outage_query(&self, sql: &str) -> OutageMapResult<OutageQuery> {
        let stmt = self.db.prepare(sql)?;
        Ok(OutageQuery(stmt))
    }

    /// Start a transaction for adding outage records.
    ///
    /// The transaction is committed when the handle is dropped.
    pub fn add_outage_handle(&self) -> OutageMapResult<AddOutageTransaction> {
        let stmt = self.db.prepare(include_str!("outage_database/add_outage.sql"))?;

        self.db.execute("BEGIN", [])?;
        Ok(AddOutageTransaction(stmt, &self.db))
    }
}

pub struct OutageQuery<'a>(rusqlite::Statement<'a>);

impl<'a> OutageQuery<'a> {
    /// Run the query, the rows are parsed as they are iterated.
    pub fn records(
        &mut self,
    ) -> OutageMapResult<impl Iterator<Item = OutageMapResult<OutageRecord>> + '_> {
        let rows = self
            .0
            .query_and_then([], parse_row)?
            .map(|res: Result<OutageRecord, rusqlite::Error>| res.map_err(Into::into));

        Ok(rows)
    }
}

fn parse_row(row: &Row) -> Result<OutageRecord, rusqlite::Error> {
    let y = decimal(row, "POINT_Y")?;
    let x = decimal(row, "POINT_X")?;

    Ok(OutageRecord {
        event_id: row.get("EVENT_IDX")?,
        supply_node: row.get("SUPPLY_IDX")?,
        location: Point::new(x, y),
        cause: row.get::<_, Option<String>>("EVENT_CAUSE")?.unwrap_or_default(),
        etor: row.get::<_, Option<String>>("EVENT_ETOR_TEXT")?.unwrap_or_default(),
        customer_count: row.get("CUSTSBYEVENT")?,
        event_begin: timestamp(row, "EVENT_BEGIN")?,
        first_crew_time: timestamp(row, "FIRST_CREW_TIME")?,
    })
}

/// Coordinates may come through as numbers or as numeric text.
fn decimal(row: &Row, column: &str) -> Result<f64, rusqlite::Error> {
    let idx = row.as_ref().column_index(column)?;

    match row.get_ref(idx)? {
        ValueRef::Real(val) => Ok(val),
        ValueRef::Integer(val) => Ok(val as f64),
        ValueRef::Text(txt) => std::str::from_utf8(txt)
            .ok()
            .and_then(|txt| txt.trim().parse().ok())
            .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, column.to_owned(), Type::Text)),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            column.to_owned(),
            other.data_type(),
        )),
    }
}

fn timestamp(row: &Row, column: &str) -> Result<Option<NaiveDateTime>, rusqlite::Error> {
    let secs: Option<i64> = row.get(column)?;
    Ok(secs
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.naive_utc()))
}

pub struct AddOutageTransaction<'a>(rusqlite::Statement<'a>, &'a rusqlite::Connection);

impl<'a> AddOutageTransaction<'a> {
    pub fn add_outage(&mut self, record: &OutageRecord) -> OutageMapResult<()> {
        let event_begin = record.event_begin.map(|t| t.and_utc().timestamp());
        let first_crew_time = record.first_crew_time.map(|t| t.and_utc().timestamp());

        let _ = self.0.execute([
            &record.location.y() as &dyn ToSql,
            &record.location.x(),
            &record.cause,
            &record.etor,
            &record.event_id,
            &record.customer_count,
            &event_begin,
            &first_crew_time,
            &record.supply_node,
        ])?;

        Ok(())
    }
}

impl<'a> Drop for AddOutageTransaction<'a> {
    fn drop(&mut self) {
        if let Err(err) = self.1.execute("COMMIT", []) {
            log::error!("Error committing outage records: {}", err);
        }
    }
}
