/*!
 * Types for grouping outage points into polygons.
 *
 * A [PointCluster] holds the points for a single supply node (e.g. a transformer) and a
 * [NodeGroup] holds all the supply nodes for a single outage event.
 */

pub use node_group::NodeGroup;
pub use point_cluster::PointCluster;

mod node_group;
mod point_cluster;
