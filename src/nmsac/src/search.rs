//! KD-tree nearest-neighbor search over a target cloud.
//!
//! ICP re-matches every transformed source point against the target on each
//! iteration, and the consensus loop scores every hypothesis by counting
//! source points that land near the target. Both go through this index,
//! which is built once per target cloud.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use rayon::prelude::*;

use crate::point_cloud::PointCloud;

/// Bucket size for the KD-tree.
///
/// The immutable tree places any number of points sharing a coordinate on
/// the split axis, so repeated points and collinear clouds need no larger
/// bucket than kiddo's default.
const BUCKET_SIZE: usize = 32;

/// A nearest-neighbor match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Column index in the indexed cloud.
    pub index: usize,
    /// Euclidean distance to the query point.
    pub distance: f64,
}

/// Nearest-neighbor index over the points of a cloud.
#[derive(Debug)]
pub struct NearestNeighborSearch {
    /// Generic args: coordinate type, item type (column index), dimensions, bucket size.
    kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE>,
    len: usize,
}

impl NearestNeighborSearch {
    /// Index the points of `cloud`.
    ///
    /// # Returns
    /// `None` if the cloud is empty.
    pub fn from_cloud(cloud: &PointCloud) -> Option<Self> {
        if cloud.is_empty() {
            return None;
        }
        let points = cloud.to_points();
        // Item values are the slice positions, i.e. column indices.
        let kdtree: ImmutableKdTree<f64, u64, 3, BUCKET_SIZE> =
            ImmutableKdTree::new_from_slice(&points);
        Some(Self {
            kdtree,
            len: points.len(),
        })
    }

    /// Closest indexed point to `point`.
    pub fn nearest(&self, point: &[f64; 3]) -> Neighbor {
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(point);
        Neighbor {
            index: nn.item as usize,
            distance: nn.distance.sqrt(),
        }
    }

    /// Nearest neighbor for every point of `cloud`, in column order.
    pub fn nearest_all(&self, cloud: &PointCloud) -> Vec<Neighbor> {
        cloud
            .to_points()
            .par_iter()
            .map(|p| self.nearest(p))
            .collect()
    }

    /// Count points of `cloud` whose nearest indexed point is within `epsilon`.
    pub fn count_within(&self, cloud: &PointCloud, epsilon: f64) -> usize {
        let eps_sq = epsilon * epsilon;
        cloud
            .to_points()
            .par_iter()
            .filter(|p| self.kdtree.nearest_one::<SquaredEuclidean>(p).distance <= eps_sq)
            .count()
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
