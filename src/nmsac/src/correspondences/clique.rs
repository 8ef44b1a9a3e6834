//! Maximum clique search by branch and bound.
//!
//! Two strategies share the same contract and return cliques of the same
//! (maximum) size:
//!
//! - [`MaxCliqueAlgorithm::BnbBasic`] grows a clique `R` from a candidate
//!   set `S` in vertex order and prunes when `|R| + |S| <= |R_best|`.
//! - [`MaxCliqueAlgorithm::BnbColor`] greedily colors the candidates and
//!   expands them highest color first. Candidates with color `<= c` hold no
//!   clique larger than `c + 1`, so a branch is cut when
//!   `|R| + color(v) < |R_best|`. Every sub-problem is recolored.
//!
//! The first maximum clique found is kept; later cliques of equal size do
//! not replace it. Both searches run on an explicit stack.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::graph::{UndirectedGraph, Vertex};

/// Vertex coloring, `vertex -> color`.
pub type Coloring = BTreeMap<Vertex, usize>;

/// Branch-and-bound flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxCliqueAlgorithm {
    BnbBasic,
    #[default]
    BnbColor,
}

impl MaxCliqueAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaxCliqueAlgorithm::BnbBasic => "bnb_basic",
            MaxCliqueAlgorithm::BnbColor => "bnb_color",
        }
    }
}

/// Smallest color that does not occur in `colors`.
pub fn next_available_color(colors: &[usize]) -> usize {
    let mut seen = vec![false; colors.len() + 1];
    for &c in colors {
        if c < seen.len() {
            seen[c] = true;
        }
    }
    // `colors.len() + 1` slots cannot all be taken by `colors.len()` values.
    seen.iter().position(|&s| !s).unwrap_or(colors.len())
}

/// Greedy coloring of `vertices` in ascending order.
///
/// Each vertex takes the smallest color not already used by one of its
/// colored neighbors. Neighbors outside `vertices` are ignored.
pub fn greedy_coloring(graph: &UndirectedGraph, vertices: &BTreeSet<Vertex>) -> Coloring {
    let mut coloring = Coloring::new();
    for &v in vertices {
        let used: Vec<usize> = graph
            .adjacency(v)
            .iter()
            .filter_map(|u| coloring.get(u).copied())
            .collect();
        coloring.insert(v, next_available_color(&used));
    }
    coloring
}

/// Largest clique of `graph`.
pub fn find_max_clique(graph: &UndirectedGraph, algorithm: MaxCliqueAlgorithm) -> BTreeSet<Vertex> {
    match algorithm {
        MaxCliqueAlgorithm::BnbBasic => bnb_basic(graph),
        MaxCliqueAlgorithm::BnbColor => {
            let coloring = greedy_coloring(graph, graph.vertices());
            bnb_color(graph, graph.vertices(), &coloring)
        }
    }
}

struct BasicFrame {
    candidates: BTreeSet<Vertex>,
    /// Vertex pushed onto the clique by this frame and not yet retired.
    expanded: Option<Vertex>,
}

fn bnb_basic(graph: &UndirectedGraph) -> BTreeSet<Vertex> {
    let mut best: Vec<Vertex> = Vec::new();
    let mut clique: Vec<Vertex> = Vec::new();
    let mut stack = vec![BasicFrame {
        candidates: graph.vertices().clone(),
        expanded: None,
    }];

    while let Some(frame) = stack.last_mut() {
        if let Some(v) = frame.expanded.take() {
            clique.pop();
            frame.candidates.remove(&v);
        }

        let Some(&v) = frame.candidates.first() else {
            stack.pop();
            continue;
        };
        if clique.len() + frame.candidates.len() <= best.len() {
            stack.pop();
            continue;
        }

        clique.push(v);
        frame.expanded = Some(v);
        let adjacent = graph.adjacency(v);
        let next: BTreeSet<Vertex> = frame
            .candidates
            .iter()
            .filter(|u| adjacent.contains(u))
            .copied()
            .collect();

        if !next.is_empty() {
            stack.push(BasicFrame {
                candidates: next,
                expanded: None,
            });
        } else if clique.len() > best.len() {
            best = clique.clone();
        }
    }

    best.into_iter().collect()
}

struct ColorFrame {
    /// Candidates sorted by ascending color; the last one is expanded next.
    order: Vec<Vertex>,
    coloring: Coloring,
    expanded: bool,
}

impl ColorFrame {
    fn new(candidates: &BTreeSet<Vertex>, coloring: Coloring) -> Self {
        let mut order: Vec<Vertex> = candidates.iter().copied().collect();
        // Stable: equal colors keep ascending vertex order.
        order.sort_by_key(|v| coloring.get(v).copied().unwrap_or(0));
        Self {
            order,
            coloring,
            expanded: false,
        }
    }
}

fn bnb_color(
    graph: &UndirectedGraph,
    vertices: &BTreeSet<Vertex>,
    coloring: &Coloring,
) -> BTreeSet<Vertex> {
    let mut best: Vec<Vertex> = Vec::new();
    let mut clique: Vec<Vertex> = Vec::new();
    let mut stack = vec![ColorFrame::new(vertices, coloring.clone())];

    while let Some(frame) = stack.last_mut() {
        if frame.expanded {
            frame.expanded = false;
            clique.pop();
            frame.order.pop();
        }

        let Some(&v) = frame.order.last() else {
            stack.pop();
            continue;
        };
        let color = frame.coloring.get(&v).copied().unwrap_or(0);
        if clique.len() + color < best.len() {
            stack.pop();
            continue;
        }

        clique.push(v);
        frame.expanded = true;
        let adjacent = graph.adjacency(v);
        let next: BTreeSet<Vertex> = frame.order[..frame.order.len() - 1]
            .iter()
            .filter(|u| adjacent.contains(u))
            .copied()
            .collect();

        if !next.is_empty() {
            let sub_coloring = greedy_coloring(graph, &next);
            stack.push(ColorFrame::new(&next, sub_coloring));
        } else if clique.len() > best.len() {
            best = clique.clone();
        }
    }

    best.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondences::graph::tests::sample_graph;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_graph(rng: &mut StdRng, n: usize, density: f64) -> UndirectedGraph {
        let mut g = UndirectedGraph::new();
        for v in 0..n {
            g.add_vertex(v);
        }
        for a in 0..n {
            for b in (a + 1)..n {
                if rng.gen_bool(density) {
                    g.add_edge(a, b);
                }
            }
        }
        g
    }

    /// Exhaustive maximum clique size for small graphs.
    fn brute_force_clique_size(g: &UndirectedGraph) -> usize {
        let vertices: Vec<Vertex> = g.vertices().iter().copied().collect();
        let n = vertices.len();
        (0u32..(1 << n))
            .filter(|mask| {
                let members: Vec<Vertex> = (0..n)
                    .filter(|i| mask & (1 << i) != 0)
                    .map(|i| vertices[i])
                    .collect();
                g.is_clique(&members)
            })
            .map(|mask| mask.count_ones() as usize)
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_next_available_color() {
        assert_eq!(next_available_color(&[]), 0);
        assert_eq!(next_available_color(&[0, 0]), 1);
        assert_eq!(next_available_color(&[0, 0, 1, 1]), 2);
        assert_eq!(next_available_color(&[0, 2, 1, 1, 1, 2, 1, 1, 1]), 3);
        assert_eq!(next_available_color(&[0, 0, 2, 2]), 1);
        assert_eq!(next_available_color(&[0, 1, 3, 1, 1, 0, 1, 3, 1, 1]), 2);
        assert_eq!(next_available_color(&[1, 1, 2, 1, 1, 2]), 0);
    }

    #[test]
    fn test_greedy_coloring_sample_graph() {
        let g = sample_graph();
        let coloring = greedy_coloring(&g, g.vertices());
        let expected: Coloring = [(1, 0), (2, 1), (3, 0), (4, 2), (5, 3), (6, 1)]
            .into_iter()
            .collect();
        assert_eq!(coloring, expected);
        for &(a, b) in g.edges() {
            assert_ne!(coloring[&a], coloring[&b]);
        }
    }

    #[test]
    fn test_greedy_coloring_subset_ignores_outside_neighbors() {
        let g = sample_graph();
        let subset: BTreeSet<Vertex> = [3, 4, 6].into_iter().collect();
        let coloring = greedy_coloring(&g, &subset);
        assert_eq!(coloring.len(), 3);
        assert_eq!(coloring[&3], 0);
        assert_eq!(coloring[&4], 1);
        assert_eq!(coloring[&6], 0);
    }

    #[test]
    fn test_sample_graph_max_clique() {
        let g = sample_graph();
        let expected: BTreeSet<Vertex> = [2, 3, 4, 5].into_iter().collect();
        assert_eq!(find_max_clique(&g, MaxCliqueAlgorithm::BnbBasic), expected);
        assert_eq!(find_max_clique(&g, MaxCliqueAlgorithm::BnbColor), expected);
    }

    #[test]
    fn test_empty_graph() {
        let g = UndirectedGraph::new();
        assert!(find_max_clique(&g, MaxCliqueAlgorithm::BnbBasic).is_empty());
        assert!(find_max_clique(&g, MaxCliqueAlgorithm::BnbColor).is_empty());
    }

    #[test]
    fn test_strategies_agree_on_random_graphs() {
        let mut rng = StdRng::seed_from_u64(42);
        for trial in 0..40 {
            let density = [0.2, 0.5, 0.8][trial % 3];
            let g = random_graph(&mut rng, 12, density);
            let basic = find_max_clique(&g, MaxCliqueAlgorithm::BnbBasic);
            let color = find_max_clique(&g, MaxCliqueAlgorithm::BnbColor);
            let expected = brute_force_clique_size(&g);

            assert!(g.is_clique(&basic));
            assert!(g.is_clique(&color));
            assert_eq!(basic.len(), expected, "trial {trial}");
            assert_eq!(color.len(), expected, "trial {trial}");
        }
    }
}
