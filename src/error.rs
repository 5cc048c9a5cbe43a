use crate::projection::Crs;
use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// The result type used across the I/O boundaries of this crate.
pub type OutageMapResult<T> = Result<T, Box<dyn Error>>;

/// A point was too far from the label point of the supply node it was added to.
///
/// This is a per-point condition, the point is dropped and the batch keeps going.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierRejected {
    /// The supply node the point was destined for, if known.
    pub supply_node: Option<i64>,
    /// Distance from the current label point, in working coordinate units.
    pub distance: f64,
    /// The configured maximum distance.
    pub limit: f64,
}

impl OutlierRejected {
    /// Attach the supply node id once it is known by the caller.
    pub fn for_supply_node(self, supply_node: i64) -> Self {
        OutlierRejected {
            supply_node: Some(supply_node),
            ..self
        }
    }
}

impl Display for OutlierRejected {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        match self.supply_node {
            Some(id) => write!(
                f,
                "Point for supply node {} exceeded max supply node distance. Distance = {} (limit {})",
                id, self.distance, self.limit
            ),
            None => write!(
                f,
                "Point exceeded max supply node distance. Distance = {} (limit {})",
                self.distance, self.limit
            ),
        }
    }
}

impl Error for OutlierRejected {}

/// There is no transform available between these two coordinate systems.
///
/// This is a configuration error and should abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedProjection {
    pub from: Crs,
    pub to: Crs,
}

impl Display for UnsupportedProjection {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "no projection available from wkid {} to wkid {}",
            self.from.wkid(),
            self.to.wkid()
        )
    }
}

impl Error for UnsupportedProjection {}

/// The convex hull of a cluster came back in a shape that can't be turned into a polygon.
///
/// Hulls over finite points are always a point, a segment, or an area, so this signals a broken
/// assumption rather than bad data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedHullGeometry {
    /// Number of distinct vertices in the hull that was rejected.
    pub vertices: usize,
}

impl Display for UnsupportedHullGeometry {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "convex hull with {} distinct vertices is not understood",
            self.vertices
        )
    }
}

impl Error for UnsupportedHullGeometry {}
