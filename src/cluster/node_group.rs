use crate::{
    cluster::PointCluster,
    config::ClusterConfig,
    error::{OutlierRejected, UnsupportedHullGeometry},
    geometry,
    memo::Memo,
};
use geo::{BoundingRect, Centroid, MultiPoint, Point, Polygon};
use rustc_hash::FxHashMap as HashMap;

/**
 * All the supply nodes affected by a single outage event.
 *
 * The polygons of the supply nodes are ordered around the center of the event and then any that
 * overlap are merged, leaving the smallest set of polygons that covers the event.
 */
#[derive(Debug, Clone)]
pub struct NodeGroup {
    clusters: HashMap<i64, PointCluster>,
    config: ClusterConfig,
    merged: Memo<Merged>,
}

#[derive(Debug, Clone)]
struct Merged {
    polygons: Vec<Polygon<f64>>,
    label_point: Option<Point<f64>>,
}

impl NodeGroup {
    pub fn new(config: ClusterConfig) -> Self {
        let mut clusters = HashMap::default();
        clusters.reserve(config.supply_node_capacity);

        NodeGroup {
            clusters,
            config,
            merged: Memo::default(),
        }
    }

    /// Add a point to a supply node, creating the supply node if this is the first point for it.
    pub fn add_point(&mut self, supply_node: i64, point: Point<f64>) -> Result<(), OutlierRejected> {
        let config = self.config;
        self.clusters
            .entry(supply_node)
            .or_insert_with(|| PointCluster::new(config))
            .add_point(point)
            .map_err(|err| err.for_supply_node(supply_node))?;

        self.merged.invalidate();
        Ok(())
    }

    /// The final polygons for this event.
    pub fn polygons(&self) -> Result<&[Polygon<f64>], UnsupportedHullGeometry> {
        let merged = self.merged.get_or_try_compute(|| self.compute())?;
        Ok(&merged.polygons)
    }

    /**
     * The label point for the event.
     *
     * This is the center of mass of the final polygon with the most vertices. Vertex count is used
     * as a stand in for size, so this may not be the polygon with the largest area.
     */
    pub fn label_point(&self) -> Result<Option<Point<f64>>, UnsupportedHullGeometry> {
        let merged = self.merged.get_or_try_compute(|| self.compute())?;
        Ok(merged.label_point)
    }

    /// Make sure the polygons are computed and cached.
    pub(crate) fn prepare(&self) -> Result<(), UnsupportedHullGeometry> {
        self.merged.get_or_try_compute(|| self.compute()).map(|_| ())
    }

    pub fn supply_node_count(&self) -> usize {
        self.clusters.len()
    }

    /// Total number of points in all the supply nodes.
    pub fn point_count(&self) -> usize {
        self.clusters.values().map(|c| c.len()).sum()
    }

    /// Look up the cluster for a supply node.
    pub fn supply_node(&self, supply_node: i64) -> Option<&PointCluster> {
        self.clusters.get(&supply_node)
    }

    fn compute(&self) -> Result<Merged, UnsupportedHullGeometry> {
        let pivot = match self.pivot() {
            Some(pivot) => pivot,
            None => {
                return Ok(Merged {
                    polygons: vec![],
                    label_point: None,
                })
            }
        };

        // Order the supply nodes around the center of the event. Identical angles fall back to
        // the supply node id so the order never depends on hash map iteration.
        let mut ordered: Vec<(f64, i64, &Polygon<f64>)> = Vec::with_capacity(self.clusters.len());
        for (&id, cluster) in &self.clusters {
            let (label, polygon) = match (cluster.label_point(), cluster.polygon()?) {
                (Some(label), Some(polygon)) => (label, polygon),
                _ => continue,
            };

            let angle = (label.y() - pivot.y()).atan2(label.x() - pivot.x());
            ordered.push((angle, id, polygon));
        }
        ordered.sort_by(|(l_angle, l_id, _), (r_angle, r_id, _)| {
            l_angle.total_cmp(r_angle).then(l_id.cmp(r_id))
        });

        let mut polygons: Vec<Polygon<f64>> = ordered.into_iter().map(|(_, _, p)| p.clone()).collect();

        if self.config.merge_on {
            merge_overlapping(&mut polygons);
        }

        let polygons: Vec<Polygon<f64>> = polygons.into_iter().map(geometry::strip_interiors).collect();
        let label_point = geometry::most_vertices(&polygons).and_then(|p| p.centroid());

        Ok(Merged {
            polygons,
            label_point,
        })
    }

    /// The center of the rectangle around all the supply node label points.
    fn pivot(&self) -> Option<Point<f64>> {
        let labels: MultiPoint<f64> = self.clusters.values().filter_map(|c| c.label_point()).collect();
        labels.bounding_rect().map(|r| r.center().into())
    }
}

/**
 * Merge overlapping polygons until no two polygons in the list overlap.
 *
 * Each pass scans for the first overlapping pair, replaces them with their cleaned union at the
 * end of the list, and starts over. Every merge removes one polygon, so this stops after at most
 * `polygons.len() - 1` merges.
 */
pub(crate) fn merge_overlapping(polygons: &mut Vec<Polygon<f64>>) {
    while let Some((i, j)) = first_overlap(polygons) {
        // i < j, so remove j first to keep i valid.
        let right = polygons.remove(j);
        let left = polygons.remove(i);

        let merged = geometry::merge(&left, &right).unwrap_or(left);
        polygons.push(merged);
    }
}

fn first_overlap(polygons: &[Polygon<f64>]) -> Option<(usize, usize)> {
    for j in 0..polygons.len() {
        for i in 0..j {
            if geometry::overlaps(&polygons[i], &polygons[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::{polygon, Area, Contains};

    fn planar(expand: f64) -> ClusterConfig {
        ClusterConfig {
            max_point_distance: 1_000.0,
            buffer_on: false,
            expand_x: expand,
            expand_y: expand,
            merge_on: true,
            ..ClusterConfig::default()
        }
    }

    fn square(x: f64, y: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
        ]
    }

    fn add_square(group: &mut NodeGroup, id: i64, x: f64, y: f64, side: f64) {
        for (dx, dy) in [(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)] {
            group.add_point(id, Point::new(x + dx, y + dy)).unwrap();
        }
    }

    #[test]
    fn test_empty_group() {
        let group = NodeGroup::new(planar(0.5));
        assert!(group.polygons().unwrap().is_empty());
        assert!(group.label_point().unwrap().is_none());
        assert_eq!(group.supply_node_count(), 0);
        assert_eq!(group.point_count(), 0);
    }

    #[test]
    fn test_overlapping_supply_nodes_merge() {
        let mut group = NodeGroup::new(planar(0.5));
        add_square(&mut group, 1, 0.0, 0.0, 2.0);
        add_square(&mut group, 2, 1.0, 1.0, 2.0);
        add_square(&mut group, 3, 10.0, 10.0, 2.0);

        assert_eq!(group.supply_node_count(), 3);
        assert_eq!(group.point_count(), 12);

        let polygons = group.polygons().unwrap();
        assert_eq!(polygons.len(), 2);
        assert!(polygons.iter().all(|p| p.interiors().is_empty()));

        let total: f64 = polygons.iter().map(|p| p.unsigned_area()).sum();
        assert!((total - 11.0).abs() < 1.0e-9);
    }

    #[test]
    fn test_merge_off_keeps_every_supply_node() {
        let mut group = NodeGroup::new(ClusterConfig {
            merge_on: false,
            ..planar(0.5)
        });
        add_square(&mut group, 1, 0.0, 0.0, 2.0);
        add_square(&mut group, 2, 1.0, 1.0, 2.0);

        assert_eq!(group.polygons().unwrap().len(), 2);
    }

    #[test]
    fn test_merge_count_is_connected_components() {
        // Overlap graph: 0-1, 1-2 (a chain, 0 and 2 don't touch), 3 alone, 4-5, 6 inside 7.
        let mut polygons = vec![
            square(0.0, 0.0, 2.0),
            square(1.5, 0.0, 2.0),
            square(3.0, 0.0, 2.0),
            square(20.0, 0.0, 1.0),
            square(0.0, 20.0, 2.0),
            square(1.0, 21.0, 2.0),
            square(40.5, 40.5, 0.5),
            square(40.0, 40.0, 2.0),
        ];
        assert!(!geometry::overlaps(&polygons[0], &polygons[2]));

        merge_overlapping(&mut polygons);
        assert_eq!(polygons.len(), 4);

        // Nothing left to merge.
        let mut again = polygons.clone();
        merge_overlapping(&mut again);
        assert_eq!(again.len(), polygons.len());
    }

    #[test]
    fn test_touching_polygons_do_not_merge() {
        let mut polygons = vec![square(0.0, 0.0, 1.0), square(1.0, 0.0, 1.0)];
        merge_overlapping(&mut polygons);
        assert_eq!(polygons.len(), 2);
    }

    #[test]
    fn test_duplicate_angles_keep_every_polygon() {
        let mut group = NodeGroup::new(ClusterConfig {
            merge_on: false,
            ..planar(0.25)
        });

        // Supply nodes 7 and 3 are both due east of the event center.
        let labels = [(1, -4.0, 0.0), (7, 4.0, 0.0), (3, 2.0, 0.0), (4, 0.0, 2.0), (5, 0.0, -2.0)];
        for (id, x, y) in labels {
            group.add_point(id, Point::new(x, y)).unwrap();
        }

        let polygons = group.polygons().unwrap();
        assert_eq!(polygons.len(), 5);

        let centers: Vec<(f64, f64)> = polygons
            .iter()
            .map(|p| p.centroid().unwrap().x_y())
            .collect();
        let expected = [(0.0, -2.0), (2.0, 0.0), (4.0, 0.0), (0.0, 2.0), (-4.0, 0.0)];
        for ((cx, cy), (ex, ey)) in centers.iter().zip(expected) {
            assert!((cx - ex).abs() < 1.0e-9 && (cy - ey).abs() < 1.0e-9);
        }
    }

    #[test]
    fn test_label_point_uses_vertex_count_not_area() {
        // A lone point makes a big diamond (4 vertices), the hexagon is much smaller but has more
        // vertices, so it carries the label.
        let mut group = NodeGroup::new(ClusterConfig {
            merge_on: false,
            ..planar(10.0)
        });
        group.add_point(1, Point::new(0.0, 0.0)).unwrap();

        let center = (100.0, 100.0);
        for k in 0..6 {
            let theta = std::f64::consts::PI / 3.0 * k as f64;
            group
                .add_point(2, Point::new(center.0 + theta.cos(), center.1 + theta.sin()))
                .unwrap();
        }

        let polygons = group.polygons().unwrap();
        let diamond = polygons.iter().find(|p| p.exterior().0.len() == 5).unwrap();
        let hexagon = polygons.iter().find(|p| p.exterior().0.len() == 7).unwrap();
        assert!(diamond.unsigned_area() > hexagon.unsigned_area());

        let label = group.label_point().unwrap().unwrap();
        assert!((label.x() - center.0).abs() < 1.0e-9);
        assert!((label.y() - center.1).abs() < 1.0e-9);
        assert_eq!(Some(label), hexagon.centroid());
    }

    #[test]
    fn test_outlier_names_supply_node() {
        let mut group = NodeGroup::new(ClusterConfig {
            max_point_distance: 1.0,
            ..planar(0.5)
        });
        group.add_point(42, Point::new(0.0, 0.0)).unwrap();
        let err = group.add_point(42, Point::new(5.0, 0.0)).unwrap_err();

        assert_eq!(err.supply_node, Some(42));
        assert_eq!(group.point_count(), 1);
    }

    #[test]
    fn test_new_points_refresh_the_merge() {
        let mut group = NodeGroup::new(planar(0.5));
        add_square(&mut group, 1, 0.0, 0.0, 2.0);
        add_square(&mut group, 2, 5.0, 0.0, 2.0);
        assert_eq!(group.polygons().unwrap().len(), 2);

        // A third supply node bridging the gap.
        add_square(&mut group, 3, 1.5, 0.5, 4.0);
        let polygons = group.polygons().unwrap();
        assert_eq!(polygons.len(), 1);

        let label = group.label_point().unwrap().unwrap();
        assert!(polygons[0].contains(&label));
    }
}
