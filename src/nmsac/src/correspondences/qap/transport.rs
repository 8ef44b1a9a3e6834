//! Linear projection of a relaxed assignment onto an integral one.
//!
//! The projection LP
//!
//! ```text
//! minimize <c, x>  subject to the row/column sums of the relaxation,
//!                  0 <= x <= ub
//! ```
//!
//! is a transportation problem: rows supply their sums, columns demand
//! theirs, every cell carries at most one unit. It is solved exactly as a
//! min-cost flow with successive shortest paths (Dijkstra on reduced
//! costs), which yields an integral vertex whose sums match exactly.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::{DMatrix, DVector};

use super::objective::RelaxedAssignment;

#[derive(Clone, Copy, Debug)]
struct DijkstraState {
    cost: f64,
    node: usize,
}

impl PartialEq for DijkstraState {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl Eq for DijkstraState {}

impl Ord for DijkstraState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DijkstraState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug)]
struct Arc {
    to: usize,
    capacity: usize,
    cost: f64,
    /// Index of the reverse arc in `arcs[to]`.
    rev: usize,
}

/// Min-cost flow network with integral capacities.
#[derive(Debug, Default)]
struct FlowNetwork {
    arcs: Vec<Vec<Arc>>,
}

impl FlowNetwork {
    fn with_nodes(n: usize) -> Self {
        Self {
            arcs: vec![Vec::new(); n],
        }
    }

    /// Add `from -> to`; returns its position in `arcs[from]`.
    fn add_arc(&mut self, from: usize, to: usize, capacity: usize, cost: f64) -> usize {
        let fwd = self.arcs[from].len();
        let bwd = self.arcs[to].len();
        self.arcs[from].push(Arc {
            to,
            capacity,
            cost,
            rev: bwd,
        });
        self.arcs[to].push(Arc {
            to: from,
            capacity: 0,
            cost: -cost,
            rev: fwd,
        });
        fwd
    }

    /// Push `required` units from `source` to `sink` at minimum cost.
    ///
    /// Arc costs must be non-negative. Returns the total cost, or `None` if
    /// the network cannot carry `required` units.
    fn min_cost_flow(&mut self, source: usize, sink: usize, required: usize) -> Option<f64> {
        let n = self.arcs.len();
        let mut potential = vec![0.0; n];
        let mut flow = 0;
        let mut total_cost = 0.0;

        while flow < required {
            let mut dist = vec![f64::INFINITY; n];
            let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
            dist[source] = 0.0;

            let mut heap = BinaryHeap::new();
            heap.push(DijkstraState {
                cost: 0.0,
                node: source,
            });
            while let Some(DijkstraState { cost, node }) = heap.pop() {
                if cost > dist[node] {
                    continue;
                }
                for (idx, arc) in self.arcs[node].iter().enumerate() {
                    if arc.capacity == 0 {
                        continue;
                    }
                    let reduced = (arc.cost + potential[node] - potential[arc.to]).max(0.0);
                    let next = dist[node] + reduced;
                    if next < dist[arc.to] {
                        dist[arc.to] = next;
                        prev[arc.to] = Some((node, idx));
                        heap.push(DijkstraState {
                            cost: next,
                            node: arc.to,
                        });
                    }
                }
            }

            if !dist[sink].is_finite() {
                return None;
            }
            // Unreached nodes move by the largest distance so reduced costs
            // of arcs leaving them stay non-negative.
            let reach = dist
                .iter()
                .copied()
                .filter(|d| d.is_finite())
                .fold(0.0, f64::max);
            for (p, d) in potential.iter_mut().zip(&dist) {
                *p += if d.is_finite() { *d } else { reach };
            }

            // Bottleneck along the path.
            let mut push = required - flow;
            let mut v = sink;
            while let Some((u, idx)) = prev[v] {
                push = push.min(self.arcs[u][idx].capacity);
                v = u;
            }

            let mut v = sink;
            while let Some((u, idx)) = prev[v] {
                let rev = self.arcs[u][idx].rev;
                self.arcs[u][idx].capacity -= push;
                self.arcs[v][rev].capacity += push;
                total_cost += push as f64 * self.arcs[u][idx].cost;
                v = u;
            }
            flow += push;
        }

        Some(total_cost)
    }
}

/// Balanced transportation problem with unit cell capacities.
#[derive(Debug, Clone)]
pub struct TransportationProblem {
    /// Units each row must ship.
    pub supplies: Vec<usize>,
    /// Units each column must receive.
    pub demands: Vec<usize>,
    /// Per-unit cost of cell `(row, col)`.
    pub costs: DMatrix<f64>,
    /// Cells that may not carry flow.
    pub blocked: Vec<(usize, usize)>,
}

impl TransportationProblem {
    /// Minimum-cost 0/1 plan, or `None` if the sums cannot be met.
    pub fn solve(&self) -> Option<DMatrix<f64>> {
        let rows = self.supplies.len();
        let cols = self.demands.len();
        let total: usize = self.supplies.iter().sum();
        if total != self.demands.iter().sum::<usize>() {
            return None;
        }
        if self.costs.nrows() != rows || self.costs.ncols() != cols {
            return None;
        }

        // Every unit crosses exactly one cell, so shifting all cell costs by
        // a constant keeps the optimum and makes them non-negative.
        let shift = self.costs.min().min(0.0);

        let source = rows + cols;
        let sink = source + 1;
        let mut network = FlowNetwork::with_nodes(rows + cols + 2);
        for (r, &s) in self.supplies.iter().enumerate() {
            network.add_arc(source, r, s, 0.0);
        }
        for (c, &d) in self.demands.iter().enumerate() {
            network.add_arc(rows + c, sink, d, 0.0);
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                if self.blocked.contains(&(r, c)) {
                    continue;
                }
                let arc = network.add_arc(r, rows + c, 1, self.costs[(r, c)] - shift);
                cells.push((r, c, arc));
            }
        }

        network.min_cost_flow(source, sink, total)?;

        let mut plan = DMatrix::zeros(rows, cols);
        for (r, c, arc) in cells {
            if network.arcs[r][arc].capacity == 0 {
                plan[(r, c)] = 1.0;
            }
        }
        Some(plan)
    }
}

/// Project a relaxed assignment onto the closest integral assignment.
///
/// Solves `min <-max(z, 0), x>` under the constraints of `problem`.
///
/// # Returns
/// The flattened 0/1 assignment, or `None` if the LP has no solution.
pub fn project_assignment(problem: &RelaxedAssignment, z: &DVector<f64>) -> Option<DVector<f64>> {
    let (m, n, k) = (problem.source_len(), problem.target_len(), problem.min_corr());
    if !problem.is_feasible() {
        return None;
    }

    let mut supplies = vec![1; m];
    supplies.push(n - k);
    let mut demands = vec![1; n];
    demands.push(m - k);

    let costs = DMatrix::from_fn(m + 1, n + 1, |i, j| -z[problem.index(i, j)].max(0.0));
    let plan = TransportationProblem {
        supplies,
        demands,
        costs,
        blocked: vec![(m, n)],
    }
    .solve()?;

    Some(DVector::from_fn(problem.num_variables(), |idx, _| {
        plan[(idx / (n + 1), idx % (n + 1))]
    }))
}
