use crate::{
    config::ClusterConfig,
    error::{OutlierRejected, UnsupportedHullGeometry},
    geometry::{self, HullShape},
    memo::Memo,
};
use geo::{Distance, Euclidean, Point, Polygon};

/**
 * The points for a single supply node and the polygon that covers them.
 *
 * The label point is the mean location of the points. Each point is a customer, so the label is
 * weighted toward where the customers are rather than the geographic center of the polygon.
 */
#[derive(Debug, Clone)]
pub struct PointCluster {
    /// Accepted points, in the order they were added.
    points: Vec<Point<f64>>,
    /// Running mean of the accepted points.
    label_point: Option<Point<f64>>,
    config: ClusterConfig,
    polygon: Memo<Polygon<f64>>,
}

impl PointCluster {
    pub fn new(config: ClusterConfig) -> Self {
        PointCluster {
            points: vec![],
            label_point: None,
            config,
            polygon: Memo::default(),
        }
    }

    /**
     * Add a point to the cluster.
     *
     * If the point is farther than the configured maximum distance from the current label point it
     * is rejected and the cluster is left unchanged.
     */
    pub fn add_point(&mut self, point: Point<f64>) -> Result<(), OutlierRejected> {
        let label = match self.label_point {
            Some(label) => {
                let distance = Euclidean.distance(label, point);
                if distance > self.config.max_point_distance {
                    return Err(OutlierRejected {
                        supply_node: None,
                        distance,
                        limit: self.config.max_point_distance,
                    });
                }

                let n = self.points.len() as f64;
                label + (point - label) / (n + 1.0)
            }
            None => point,
        };

        self.label_point = Some(label);
        self.points.push(point);
        self.polygon.invalidate();

        Ok(())
    }

    /// The mean of all the accepted points, `None` if the cluster is empty.
    pub fn label_point(&self) -> Option<Point<f64>> {
        self.label_point
    }

    /// The number of accepted points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    /**
     * Get the polygon covering all the points in this cluster.
     *
     * This is the convex hull of the points, with a small diamond standing in when all the points
     * are in the same place or on a line. The hull is buffered if configured to do so.
     *
     * Returns `Ok(None)` for an empty cluster.
     */
    pub fn polygon(&self) -> Result<Option<&Polygon<f64>>, UnsupportedHullGeometry> {
        if self.points.is_empty() {
            return Ok(None);
        }

        self.polygon
            .get_or_try_compute(|| self.compute_polygon())
            .map(Some)
    }

    fn compute_polygon(&self) -> Result<Polygon<f64>, UnsupportedHullGeometry> {
        let ClusterConfig {
            expand_x, expand_y, ..
        } = self.config;

        let unbuffered = match geometry::classify_hull(&self.points)? {
            HullShape::Point(center) => geometry::diamond(center, expand_x, expand_y),
            HullShape::Segment(start, end) => geometry::diamond_through(start, end, expand_x, expand_y),
            HullShape::Area(hull) => hull,
        };

        if self.config.buffer_on {
            Ok(geometry::buffer_convex(
                &unbuffered,
                self.config.buffer_distance,
                self.config.arc_vertices(),
            ))
        } else {
            Ok(unbuffered)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::{Area, Contains, Intersects};
    use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

    fn unbuffered() -> ClusterConfig {
        ClusterConfig {
            buffer_on: false,
            ..ClusterConfig::default()
        }
    }

    #[test]
    fn test_label_point_is_mean_in_any_order() {
        let mut rng = StdRng::seed_from_u64(20_220_119);

        let mut pnts: Vec<Point<f64>> = (0..50)
            .map(|_| {
                Point::new(
                    -122.33 + rng.random_range(-0.0005..0.0005),
                    47.61 + rng.random_range(-0.0005..0.0005),
                )
            })
            .collect();

        let n = pnts.len() as f64;
        let mean_x = pnts.iter().map(|p| p.x()).sum::<f64>() / n;
        let mean_y = pnts.iter().map(|p| p.y()).sum::<f64>() / n;

        for _ in 0..10 {
            pnts.shuffle(&mut rng);

            let mut cluster = PointCluster::new(unbuffered());
            for p in &pnts {
                cluster.add_point(*p).unwrap();
            }

            let label = cluster.label_point().unwrap();
            assert_eq!(cluster.len(), pnts.len());
            assert!((label.x() - mean_x).abs() < 1.0e-9);
            assert!((label.y() - mean_y).abs() < 1.0e-9);
        }
    }

    #[test]
    fn test_outlier_leaves_cluster_unchanged() {
        let config = unbuffered();
        let mut cluster = PointCluster::new(config);
        cluster.add_point(Point::new(-122.33, 47.61)).unwrap();
        cluster.add_point(Point::new(-122.3302, 47.6101)).unwrap();

        let before_label = cluster.label_point();
        let before_polygon = cluster.polygon().unwrap().cloned();

        let far = Point::new(-122.33 + 10.0 * config.max_point_distance, 47.61);
        let err = cluster.add_point(far).unwrap_err();

        assert_eq!(err.limit, config.max_point_distance);
        assert!(err.distance > config.max_point_distance);
        assert_eq!(err.supply_node, None);
        assert_eq!(cluster.len(), 2);
        assert_eq!(cluster.label_point(), before_label);
        assert_eq!(cluster.polygon().unwrap().cloned(), before_polygon);
    }

    #[test]
    fn test_outlier_distance_is_straight_line() {
        let config = ClusterConfig {
            max_point_distance: 5.0,
            ..unbuffered()
        };

        let mut cluster = PointCluster::new(config);
        cluster.add_point(Point::new(10.0, 10.0)).unwrap();

        // Exactly on the limit is kept.
        cluster.add_point(Point::new(13.0, 14.0)).unwrap();

        // The label moved to (11.5, 12.0), this is about 5.4 away from it.
        let err = cluster.add_point(Point::new(6.5, 10.0)).unwrap_err();
        assert!((err.distance - 29.0_f64.sqrt()).abs() < 1.0e-12);
        assert_eq!(cluster.len(), 2);
    }

    #[test]
    fn test_empty_cluster_has_no_polygon() {
        let cluster = PointCluster::new(ClusterConfig::default());
        assert!(cluster.polygon().unwrap().is_none());
        assert!(cluster.label_point().is_none());
        assert!(cluster.is_empty());
    }

    #[test]
    fn test_single_point_makes_a_diamond() {
        let pnt = Point::new(-122.33, 47.61);
        let mut cluster = PointCluster::new(unbuffered());
        cluster.add_point(pnt).unwrap();
        cluster.add_point(pnt).unwrap();

        let poly = cluster.polygon().unwrap().unwrap();
        assert_eq!(poly.exterior().0.len(), 5);
        assert!(poly.unsigned_area() > 0.0);
        assert!(poly.contains(&pnt));
    }

    #[test]
    fn test_two_points_make_a_fattened_segment() {
        let a = Point::new(-122.33, 47.61);
        let b = Point::new(-122.3295, 47.6103);
        let mut cluster = PointCluster::new(unbuffered());
        cluster.add_point(a).unwrap();
        cluster.add_point(b).unwrap();

        let poly = cluster.polygon().unwrap().unwrap();
        assert!(poly.exterior().0.len() >= 5);
        assert!(poly.unsigned_area() > 0.0);
        assert!(poly.intersects(&a));
        assert!(poly.intersects(&b));
    }

    #[test]
    fn test_buffer_grows_the_hull() {
        let pnts = [
            Point::new(-122.3300, 47.6100),
            Point::new(-122.3290, 47.6100),
            Point::new(-122.3295, 47.6106),
        ];

        let mut plain = PointCluster::new(unbuffered());
        let mut buffered = PointCluster::new(ClusterConfig::default());
        for p in pnts {
            plain.add_point(p).unwrap();
            buffered.add_point(p).unwrap();
        }

        let plain = plain.polygon().unwrap().unwrap();
        let buffered = buffered.polygon().unwrap().unwrap();
        assert_eq!(plain.exterior().0.len(), 4);
        assert!(buffered.unsigned_area() > plain.unsigned_area());
        assert!(buffered.exterior().0.len() > plain.exterior().0.len());
        for p in pnts {
            assert!(buffered.contains(&p));
        }
    }

    #[test]
    fn test_adding_a_point_refreshes_the_polygon() {
        let mut cluster = PointCluster::new(unbuffered());
        cluster.add_point(Point::new(-122.33, 47.61)).unwrap();
        let first = cluster.polygon().unwrap().unwrap().clone();

        cluster.add_point(Point::new(-122.3295, 47.6103)).unwrap();
        let second = cluster.polygon().unwrap().unwrap().clone();
        assert_ne!(first, second);
    }
}
