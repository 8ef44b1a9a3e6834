//! The relaxed assignment problem solved by the QAP correspondence solver.
//!
//! The variable `z` is an `(m + 1) x (n + 1)` assignment matrix flattened
//! row-major, `z[i * (n + 1) + j]`. Row `m` and column `n` are slack: a
//! source point assigned to the slack column (or a target point assigned to
//! the slack row) is unmatched.
//!
//! ```text
//! minimize    Σ w(i,j,k,l) z[i,j] z[k,l]
//! subject to  Σ_j z[i,j] = 1        for i < m      (j over 0..=n)
//!             Σ_{j<n} z[m,j] = n - k                (slack row)
//!             Σ_i z[i,j] = 1        for j < n      (i over 0..=m)
//!             Σ_{i<m} z[i,n] = m - k                (slack column)
//!             0 <= z <= 1,  z[m,n] = 0
//! ```
//!
//! Exactly `k` units of mass therefore sit in the non-slack block.

use nalgebra::DVector;

use super::super::consistency::WeightTensor;

/// Quadratic objective plus linear equality constraints of the relaxation.
#[derive(Debug, Clone)]
pub struct RelaxedAssignment {
    m: usize,
    n: usize,
    min_corr: usize,
    /// Flattened quadratic terms `(a, b, w)` contributing `w z[a] z[b]`.
    terms: Vec<(usize, usize, f64)>,
}

impl RelaxedAssignment {
    /// # Arguments
    /// * `m` - Source point count
    /// * `n` - Target point count
    /// * `min_corr` - Number of correspondences `k` to select
    /// * `weights` - Sparse pairwise weights over `(i, j, k, l)`
    pub fn new(m: usize, n: usize, min_corr: usize, weights: &WeightTensor) -> Self {
        let cols = n + 1;
        let mut terms: Vec<(usize, usize, f64)> = weights
            .iter()
            .map(|(&(i, j, k, l), &w)| (i * cols + j, k * cols + l, w))
            .collect();
        // Fixed summation order regardless of hash iteration order.
        terms.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Self {
            m,
            n,
            min_corr,
            terms,
        }
    }

    pub fn source_len(&self) -> usize {
        self.m
    }

    pub fn target_len(&self) -> usize {
        self.n
    }

    pub fn min_corr(&self) -> usize {
        self.min_corr
    }

    pub fn num_variables(&self) -> usize {
        (self.m + 1) * (self.n + 1)
    }

    /// Source rows, slack row, target columns, slack column.
    pub fn num_constraints(&self) -> usize {
        self.m + self.n + 2
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        i * (self.n + 1) + j
    }

    /// Index of the slack corner, fixed at zero.
    pub fn corner(&self) -> usize {
        self.index(self.m, self.n)
    }

    /// Whether `k` correspondences fit into an `m x n` assignment.
    pub fn is_feasible(&self) -> bool {
        self.min_corr <= self.m.min(self.n)
    }

    /// Upper bound per variable: 1, except 0 at the slack corner.
    pub fn upper_bounds(&self) -> DVector<f64> {
        let mut ub = DVector::from_element(self.num_variables(), 1.0);
        ub[self.corner()] = 0.0;
        ub
    }

    /// Right-hand side of the equality constraints.
    pub fn constraint_rhs(&self) -> DVector<f64> {
        let (m, n, k) = (self.m, self.n, self.min_corr);
        let mut b = DVector::from_element(self.num_constraints(), 1.0);
        b[m] = n as f64 - k as f64;
        b[m + 1 + n] = m as f64 - k as f64;
        b
    }

    /// Constraint rows touched by variable `(i, j)`: its row sum and its
    /// column sum. The slack row is constraint `m`, the slack column is
    /// constraint `m + 1 + n`.
    fn constraint_rows(&self, i: usize, j: usize) -> (usize, usize) {
        (i, self.m + 1 + j)
    }

    /// Strictly feasible starting point with uniform mass `k / (m n)`.
    ///
    /// # Returns
    /// `None` when the problem is infeasible.
    pub fn initial_point(&self) -> Option<DVector<f64>> {
        if !self.is_feasible() || self.m == 0 || self.n == 0 {
            return None;
        }
        let (m, n) = (self.m, self.n);
        let a = self.min_corr as f64 / (m * n) as f64;
        let mut z = DVector::zeros(self.num_variables());
        for i in 0..m {
            for j in 0..n {
                z[self.index(i, j)] = a;
            }
            z[self.index(i, n)] = 1.0 - n as f64 * a;
        }
        for j in 0..n {
            z[self.index(m, j)] = 1.0 - m as f64 * a;
        }
        Some(z)
    }

    pub fn objective(&self, z: &DVector<f64>) -> f64 {
        self.terms.iter().map(|&(a, b, w)| w * z[a] * z[b]).sum()
    }

    /// Gradient of the objective.
    pub fn gradient(&self, z: &DVector<f64>) -> DVector<f64> {
        let mut g = DVector::zeros(z.len());
        for &(a, b, w) in &self.terms {
            g[a] += w * z[b];
            g[b] += w * z[a];
        }
        g
    }

    /// Constraint residual `A z - b`.
    pub fn constraint_residual(&self, z: &DVector<f64>) -> DVector<f64> {
        let mut r = -self.constraint_rhs();
        let corner = self.corner();
        for i in 0..=self.m {
            for j in 0..=self.n {
                let idx = self.index(i, j);
                if idx == corner {
                    continue;
                }
                let (row, col) = self.constraint_rows(i, j);
                r[row] += z[idx];
                r[col] += z[idx];
            }
        }
        r
    }

    /// `Aᵀ y`.
    pub fn constraint_transpose(&self, y: &DVector<f64>) -> DVector<f64> {
        let mut g = DVector::zeros(self.num_variables());
        let corner = self.corner();
        for i in 0..=self.m {
            for j in 0..=self.n {
                let idx = self.index(i, j);
                if idx == corner {
                    continue;
                }
                let (row, col) = self.constraint_rows(i, j);
                g[idx] = y[row] + y[col];
            }
        }
        g
    }
}
