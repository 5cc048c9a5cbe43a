/*!
 * Polygon operations the clustering needs on top of what the geo crate provides.
 *
 * All of these work in whatever planar or geographic system the points are already in, nothing
 * here knows about projections.
 */
use crate::error::UnsupportedHullGeometry;
use geo::{
    coord, Area, BooleanOps, BoundingRect, ConvexHull, Coord, Intersects, LineString, MultiPoint,
    MultiPolygon, Point, Polygon, Relate,
};

/// Fewest vertices used to approximate a full circle when buffering.
const MIN_ARC_VERTICES: usize = 4;

/// The shape of a convex hull over a set of points.
#[derive(Debug, Clone, PartialEq)]
pub enum HullShape {
    /// All the points were the same point.
    Point(Coord<f64>),
    /// The points were all on a line, these are its end points.
    Segment(Coord<f64>, Coord<f64>),
    /// A proper polygon with positive area.
    Area(Polygon<f64>),
}

/// Compute the convex hull of some points and sort out what kind of shape it is.
///
/// A hull that comes back as a polygon with no area is reported as the [HullShape::Point] of its
/// first vertex.
pub fn classify_hull(points: &[Point<f64>]) -> Result<HullShape, UnsupportedHullGeometry> {
    let hull = MultiPoint::from(points.to_vec()).convex_hull();

    let mut distinct: Vec<Coord<f64>> = hull.exterior().0.clone();
    distinct.dedup();
    if distinct.len() > 1 && distinct.first() == distinct.last() {
        distinct.pop();
    }

    if distinct.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(UnsupportedHullGeometry {
            vertices: distinct.len(),
        });
    }

    match distinct.len() {
        0 => Err(UnsupportedHullGeometry { vertices: 0 }),
        1 => Ok(HullShape::Point(distinct[0])),
        2 => Ok(HullShape::Segment(distinct[0], distinct[1])),
        _ => {
            let polygon = Polygon::new(LineString::from(distinct), vec![]);
            if polygon.unsigned_area() == 0.0 {
                log::debug!("zero area hull at {:?} treated as a single point", polygon.exterior().0[0]);
                Ok(HullShape::Point(polygon.exterior().0[0]))
            } else {
                Ok(HullShape::Area(polygon))
            }
        }
    }
}

/// A small diamond centered on a point.
///
/// The vertices are `expand_x` to the east and west and `expand_y` to the north and south.
pub fn diamond(center: Coord<f64>, expand_x: f64, expand_y: f64) -> Polygon<f64> {
    let Coord { x, y } = center;

    Polygon::new(
        LineString::from(vec![
            coord! { x: x + expand_x, y: y },
            coord! { x: x, y: y + expand_y },
            coord! { x: x - expand_x, y: y },
            coord! { x: x, y: y - expand_y },
        ]),
        vec![],
    )
}

/// A polygon through both end points of a segment that is fattened by a diamond at its middle.
pub fn diamond_through(a: Coord<f64>, b: Coord<f64>, expand_x: f64, expand_y: f64) -> Polygon<f64> {
    let mid = coord! { x: (a.x + b.x) / 2.0, y: (a.y + b.y) / 2.0 };

    let mut pnts: Vec<Point<f64>> = Vec::with_capacity(6);
    pnts.push(a.into());
    pnts.extend(diamond(mid, expand_x, expand_y).exterior().points().take(4));
    pnts.push(b.into());

    MultiPoint::from(pnts).convex_hull()
}

/// How many vertices to use for a full circle of radius `distance`.
///
/// Enough that no chord is longer than `max_segment`, but never more than `max_vertices`.
pub fn arc_vertex_count(distance: f64, max_segment: f64, max_vertices: usize) -> usize {
    let upper = max_vertices.max(MIN_ARC_VERTICES);

    if max_segment <= 0.0 || !max_segment.is_finite() {
        return upper;
    }

    let by_length = (2.0 * std::f64::consts::PI * distance / max_segment).ceil();
    if by_length.is_finite() && by_length >= 0.0 {
        (by_length as usize).clamp(MIN_ARC_VERTICES, upper)
    } else {
        upper
    }
}

/// Buffer a convex polygon outward by `distance`.
///
/// Every vertex is swept around a circle approximated by `arc_vertices` points and the hull is
/// taken of the lot, which is the offset curve for a convex input. Interior rings are ignored.
pub fn buffer_convex(polygon: &Polygon<f64>, distance: f64, arc_vertices: usize) -> Polygon<f64> {
    if distance <= 0.0 {
        return polygon.clone();
    }

    let arc_vertices = arc_vertices.max(MIN_ARC_VERTICES);
    let step = 2.0 * std::f64::consts::PI / arc_vertices as f64;
    let offsets: Vec<(f64, f64)> = (0..arc_vertices)
        .map(|k| {
            let theta = step * k as f64;
            (distance * theta.cos(), distance * theta.sin())
        })
        .collect();

    let ring = &polygon.exterior().0;
    let vertices = ring.len().saturating_sub(1).max(1);

    let mut pnts: Vec<Point<f64>> = Vec::with_capacity(vertices * arc_vertices);
    for c in ring.iter().take(vertices) {
        for (dx, dy) in &offsets {
            pnts.push(Point::new(c.x + dx, c.y + dy));
        }
    }

    MultiPoint::from(pnts).convex_hull()
}

/// Number of vertices in the exterior ring, counting the closing vertex.
pub fn vertex_count(polygon: &Polygon<f64>) -> usize {
    polygon.exterior().0.len()
}

/// The polygon with the most exterior vertices, the first one wins a tie.
///
/// Vertex count stands in for size here. It is a cheap heuristic, not an area comparison.
pub fn most_vertices<'a, I>(polygons: I) -> Option<&'a Polygon<f64>>
where
    I: IntoIterator<Item = &'a Polygon<f64>>,
{
    let mut largest: Option<&Polygon<f64>> = None;
    for polygon in polygons {
        match largest {
            Some(big) if vertex_count(polygon) <= vertex_count(big) => {}
            _ => largest = Some(polygon),
        }
    }
    largest
}

/// Reduce a polygon to its exterior ring.
pub fn strip_interiors(polygon: Polygon<f64>) -> Polygon<f64> {
    if polygon.interiors().is_empty() {
        return polygon;
    }
    let (exterior, _) = polygon.into_inner();
    Polygon::new(exterior, vec![])
}

/// Reduce the output of a union to one simple polygon.
///
/// Holes are dropped and, if there is more than one piece, the piece with the most vertices is
/// kept as the outer boundary.
pub fn clean_polygon(pieces: MultiPolygon<f64>) -> Option<Polygon<f64>> {
    let keep = most_vertices(pieces.0.iter())?.clone();
    Some(strip_interiors(keep))
}

/// Do the interiors of these polygons intersect?
///
/// One polygon inside another counts. Sharing only an edge or a vertex does not.
pub fn overlaps(left: &Polygon<f64>, right: &Polygon<f64>) -> bool {
    match (left.bounding_rect(), right.bounding_rect()) {
        (Some(lrect), Some(rrect)) if lrect.intersects(&rrect) => {}
        _ => return false,
    }

    left.relate(right).matches("T********").unwrap_or(false)
}

/// Union two polygons and clean the result down to a single simple polygon.
pub fn merge(left: &Polygon<f64>, right: &Polygon<f64>) -> Option<Polygon<f64>> {
    clean_polygon(left.union(right))
}

/// The convex hull around a group of polygons.
pub fn hull_of<'a, I>(polygons: I) -> Polygon<f64>
where
    I: IntoIterator<Item = &'a Polygon<f64>>,
{
    let pnts: Vec<Point<f64>> = polygons
        .into_iter()
        .flat_map(|p| p.exterior().points())
        .collect();

    MultiPoint::from(pnts).convex_hull()
}
