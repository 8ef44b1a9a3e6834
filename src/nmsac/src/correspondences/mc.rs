//! Correspondences from the maximum clique of the consistency graph.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::clique::{find_max_clique, MaxCliqueAlgorithm};
use super::graph::UndirectedGraph;
use super::Correspondences;
use crate::error::SolverFailure;
use crate::point_cloud::PointCloud;

/// Parameters for the max-clique correspondence solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McConfig {
    /// Maximum consistency error for two pairs to be joined by an edge.
    pub epsilon: f64,

    /// Minimum distance between the two points of a pair on either side.
    pub pairwise_dist_threshold: f64,

    /// Branch-and-bound strategy, `algo` in configuration documents.
    #[serde(
        rename(deserialize = "algo"),
        deserialize_with = "crate::config::max_clique_algorithm"
    )]
    pub algorithm: MaxCliqueAlgorithm,
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            pairwise_dist_threshold: 0.1,
            algorithm: MaxCliqueAlgorithm::BnbColor,
        }
    }
}

/// Max-clique correspondence solver.
#[derive(Debug, Clone, Default)]
pub struct MaxCliqueSolver {
    config: McConfig,
}

impl MaxCliqueSolver {
    pub fn new(config: McConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &McConfig {
        &self.config
    }

    /// Match `source` against `target`.
    ///
    /// Every clique vertex `v` decodes to the pair `(v / n, v % n)` with
    /// strength 1, `n` being the target size.
    ///
    /// # Errors
    /// [`SolverFailure::NoConsistentPairs`] when the graph has no edges.
    pub fn solve(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<Correspondences, SolverFailure> {
        let graph = UndirectedGraph::from_point_clouds(
            source,
            target,
            self.config.epsilon,
            self.config.pairwise_dist_threshold,
        );
        if graph.num_edges() == 0 {
            return Err(SolverFailure::NoConsistentPairs);
        }

        let clique = find_max_clique(&graph, self.config.algorithm);
        trace!(
            vertices = graph.num_vertices(),
            edges = graph.num_edges(),
            clique = clique.len(),
            "max clique"
        );

        let n = target.len();
        Ok(clique.into_iter().map(|v| ((v / n, v % n), 1.0)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_euler, make_irregular_cube, shuffle_columns};
    use crate::transforms::RigidTransform;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cube_config(algorithm: MaxCliqueAlgorithm) -> McConfig {
        McConfig {
            epsilon: 0.015,
            pairwise_dist_threshold: 1e-2,
            algorithm,
        }
    }

    #[test]
    fn test_recovers_shuffled_cube_pairing() {
        let cube = make_irregular_cube();
        let truth = RigidTransform::new(make_euler(0.4, -0.3, 1.2), Vector3::new(1.0, 2.0, -0.5));
        let mut rng = StdRng::seed_from_u64(3);
        let (target, origin) = shuffle_columns(&truth.apply(&cube), &mut rng);

        for algorithm in [MaxCliqueAlgorithm::BnbBasic, MaxCliqueAlgorithm::BnbColor] {
            let corrs = MaxCliqueSolver::new(cube_config(algorithm))
                .solve(&cube, &target)
                .unwrap();
            assert_eq!(corrs.len(), 8);
            for (&(s, t), &strength) in &corrs {
                assert_eq!(origin[t], s);
                assert_eq!(strength, 1.0);
            }
        }
    }

    #[test]
    fn test_partial_overlap() {
        // Target holds 5 of the cube corners plus 3 unrelated points.
        let cube = make_irregular_cube();
        let kept = [6, 1, 3, 0, 7];
        let mut points: Vec<[f64; 3]> = kept.iter().map(|&i| cube.point(i).into()).collect();
        points.extend([[10.0, -3.0, 2.0], [-6.0, 4.0, 9.0], [0.5, 12.0, -8.0]]);
        let target = PointCloud::from_points(&points);

        let corrs = MaxCliqueSolver::new(cube_config(MaxCliqueAlgorithm::BnbColor))
            .solve(&cube, &target)
            .unwrap();
        assert_eq!(corrs.len(), 5);
        for (&(s, t), _) in &corrs {
            assert_eq!(kept[t], s);
        }
    }

    #[test]
    fn test_no_consistent_pairs() {
        let source = PointCloud::from_points(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        let target = PointCloud::from_points(&[[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]]);
        let result = MaxCliqueSolver::new(McConfig::default()).solve(&source, &target);
        assert_eq!(result, Err(SolverFailure::NoConsistentPairs));
    }
}
