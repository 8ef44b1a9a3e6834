//! Undirected consistency graph over candidate correspondences.
//!
//! Vertex `v = i * n + j` stands for "source point `i` matches target point
//! `j`" where `n` is the target size. An edge joins two candidates that are
//! pairwise consistent (see [`consistent_tuples`]), so a clique is a set of
//! mutually compatible matches.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphError;
use crate::point_cloud::PointCloud;

use super::consistency::consistent_tuples;

pub type Vertex = usize;

/// Edge stored with the smaller endpoint first.
pub type Edge = (Vertex, Vertex);

static NO_NEIGHBORS: BTreeSet<Vertex> = BTreeSet::new();

/// Simple undirected graph with ordered vertex and edge sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndirectedGraph {
    vertices: BTreeSet<Vertex>,
    edges: BTreeSet<Edge>,
    adjacency: BTreeMap<Vertex, BTreeSet<Vertex>>,
}

impl UndirectedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from explicit vertex and edge sets.
    ///
    /// # Panics
    /// Panics if an edge is a self loop or touches a vertex missing from
    /// `vertices`. Use [`UndirectedGraph::try_from_parts`] to get an error
    /// instead.
    pub fn from_parts(vertices: BTreeSet<Vertex>, edges: &[Edge]) -> Self {
        match Self::try_from_parts(vertices, edges) {
            Ok(graph) => graph,
            Err(e) => panic!("invalid graph: {e}"),
        }
    }

    /// Fallible form of [`UndirectedGraph::from_parts`].
    pub fn try_from_parts(vertices: BTreeSet<Vertex>, edges: &[Edge]) -> Result<Self, GraphError> {
        for &(a, b) in edges {
            if a == b {
                return Err(GraphError::SelfLoop(a));
            }
            if !vertices.contains(&a) || !vertices.contains(&b) {
                return Err(GraphError::MissingVertex(a, b));
            }
        }
        let mut graph = Self {
            vertices,
            ..Self::default()
        };
        for &(a, b) in edges {
            graph.add_edge(a, b);
        }
        Ok(graph)
    }

    /// Consistency graph between two clouds.
    ///
    /// Adds edge `(i * n + j, k * n + l)` for every consistent tuple
    /// `(i, j, k, l)`; `n` is the target size.
    pub fn from_point_clouds(
        source: &PointCloud,
        target: &PointCloud,
        epsilon: f64,
        pairwise_dist_threshold: f64,
    ) -> Self {
        let n = target.len();
        let mut graph = Self::new();
        for ((i, j, k, l), _) in consistent_tuples(source, target, epsilon, pairwise_dist_threshold)
        {
            graph.add_edge(i * n + j, k * n + l);
        }
        graph
    }

    pub fn add_vertex(&mut self, v: Vertex) {
        self.vertices.insert(v);
    }

    /// Insert an edge, creating missing endpoints. Self loops are ignored.
    pub fn add_edge(&mut self, a: Vertex, b: Vertex) {
        if a == b {
            return;
        }
        self.vertices.insert(a);
        self.vertices.insert(b);
        self.edges.insert((a.min(b), a.max(b)));
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn vertices(&self) -> &BTreeSet<Vertex> {
        &self.vertices
    }

    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    /// Neighbors of `v` (empty for isolated or unknown vertices).
    pub fn adjacency(&self, v: Vertex) -> &BTreeSet<Vertex> {
        self.adjacency.get(&v).unwrap_or(&NO_NEIGHBORS)
    }

    pub fn vertex_degree(&self, v: Vertex) -> usize {
        self.adjacency(v).len()
    }

    pub fn has_edge(&self, a: Vertex, b: Vertex) -> bool {
        self.adjacency(a).contains(&b)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// True if every pair of `vertices` is joined by an edge.
    pub fn is_clique<'a>(&self, vertices: impl IntoIterator<Item = &'a Vertex> + Clone) -> bool {
        vertices.clone().into_iter().all(|&a| {
            vertices
                .clone()
                .into_iter()
                .all(|&b| a == b || self.has_edge(a, b))
        })
    }
}
