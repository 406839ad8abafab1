//! Sparse admittance (Ybus) matrix assembly.
//!
//! The Ybus matrix relates bus current injections to bus voltages:
//! ```text
//! I = Y × V,   Y[i,j] = G[i,j] + jB[i,j]
//! ```
//!
//! Assembly stamps every active branch and bus shunt into COO triplets and
//! converts once to CSR. G (conductance) and B (susceptance) are stored as
//! separate real matrices sharing one sparsity pattern, so real-arithmetic
//! solvers read each part directly and complex consumers zip the two.
//!
//! The matrix is sized to the *active* buses only, with matrix indices
//! assigned by ascending bus number. It is a pure function of the network:
//! any change to an `active` flag or an electrical parameter requires a
//! rebuild, never an in-place patch.

use loadflow_core::{BranchKey, BranchKind, BusId, Diagnostics, Network};
use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from Ybus matrix assembly
#[derive(Debug, Error)]
pub enum YbusError {
    #[error("no active buses in network")]
    EmptyNetwork,

    #[error("branch {0} has zero series impedance")]
    DegenerateBranch(BranchKey),
}

/// Sparse Ybus matrix in CSR format over the active buses.
#[derive(Debug, Clone)]
pub struct Ybus {
    /// Number of active buses
    n_bus: usize,
    /// Real part (conductance G) in CSR format
    g_matrix: CsMat<f64>,
    /// Imaginary part (susceptance B) in CSR format
    b_matrix: CsMat<f64>,
    /// Bus number to matrix index mapping
    bus_map: HashMap<BusId, usize>,
    /// Matrix index to bus number mapping
    idx_to_bus: Vec<BusId>,
}

impl Ybus {
    /// Assemble the Ybus from the network's active buses and branches.
    ///
    /// Branches referencing an unknown or inactive endpoint are skipped with
    /// a warning recorded in `diag`; a branch with r = x = 0 is a hard error.
    pub fn from_network(network: &Network, diag: &mut Diagnostics) -> Result<Self, YbusError> {
        // Ascending bus number order comes from the model's BTreeMap, which
        // makes index assignment and triplet order reproducible across runs.
        let mut bus_map: HashMap<BusId, usize> = HashMap::new();
        let mut idx_to_bus: Vec<BusId> = Vec::new();
        for bus in network.active_buses() {
            bus_map.insert(bus.number, idx_to_bus.len());
            idx_to_bus.push(bus.number);
        }

        let n_bus = idx_to_bus.len();
        if n_bus == 0 {
            return Err(YbusError::EmptyNetwork);
        }

        let mut g_triplet = TriMat::new((n_bus, n_bus));
        let mut b_triplet = TriMat::new((n_bus, n_bus));

        let mut stamp = |i: usize, j: usize, y: Complex64| {
            g_triplet.add_triplet(i, j, y.re);
            b_triplet.add_triplet(i, j, y.im);
        };

        for branch in network.active_branches() {
            let key = branch.key();
            let endpoints = (bus_map.get(&branch.from), bus_map.get(&branch.to));
            let (from_idx, to_idx) = match endpoints {
                (Some(&i), Some(&j)) => (i, j),
                _ => {
                    let missing = if bus_map.contains_key(&branch.from) {
                        branch.to
                    } else {
                        branch.from
                    };
                    tracing::warn!(branch = %key, bus = %missing, "branch endpoint not in solved system, branch skipped");
                    diag.add_warning_with_entity(
                        "assembly",
                        "branch endpoint inactive or unknown, branch skipped",
                        &format!("branch {}", key),
                    );
                    continue;
                }
            };

            // Series admittance y = 1/(r + jx)
            let z = Complex64::new(branch.r, branch.x);
            if z.norm() < 1e-12 {
                return Err(YbusError::DegenerateBranch(key));
            }
            let y_series = z.inv();

            let y_shunt_half = Complex64::new(0.0, branch.shunt_b / 2.0);

            // Off-nominal tap at the from side; a line always stamps at tap 1.
            let tap = match branch.kind {
                BranchKind::Transformer if branch.tap_ratio > 0.0 => branch.tap_ratio,
                _ => 1.0,
            };
            let tap2 = tap * tap;

            stamp(from_idx, from_idx, y_series / tap2 + y_shunt_half);
            stamp(to_idx, to_idx, y_series + y_shunt_half);
            stamp(from_idx, to_idx, -y_series / tap);
            stamp(to_idx, from_idx, -y_series / tap);
        }

        // Bus shunts land on the diagonal. The zero G entry keeps the two
        // matrices on one sparsity pattern.
        for bus in network.active_buses() {
            if bus.shunt_b.value() != 0.0 {
                let idx = bus_map[&bus.number];
                stamp(idx, idx, Complex64::new(0.0, bus.shunt_b.value()));
            }
        }

        Ok(Self {
            n_bus,
            g_matrix: g_triplet.to_csr(),
            b_matrix: b_triplet.to_csr(),
            bus_map,
            idx_to_bus,
        })
    }

    /// Number of active buses
    pub fn n_bus(&self) -> usize {
        self.n_bus
    }

    /// Get G[i,j] (conductance)
    pub fn g(&self, i: usize, j: usize) -> f64 {
        self.g_matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Get B[i,j] (susceptance)
    pub fn b(&self, i: usize, j: usize) -> f64 {
        self.b_matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Get complex Y[i,j] = G[i,j] + jB[i,j]
    pub fn y(&self, i: usize, j: usize) -> Complex64 {
        Complex64::new(self.g(i, j), self.b(i, j))
    }

    /// Get matrix index from bus number
    pub fn bus_index(&self, id: BusId) -> Option<usize> {
        self.bus_map.get(&id).copied()
    }

    /// Get bus number from matrix index
    pub fn bus_id(&self, idx: usize) -> Option<BusId> {
        self.idx_to_bus.get(idx).copied()
    }

    /// Bus numbers in matrix index order
    pub fn bus_ids(&self) -> &[BusId] {
        &self.idx_to_bus
    }

    /// Number of stored entries (shared pattern, counted once)
    pub fn nnz(&self) -> usize {
        self.g_matrix.nnz()
    }

    /// Iterate over non-zero entries in row i of the G matrix (zero-allocation).
    pub fn g_row_iter(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let indptr = self.g_matrix.indptr();
        let start = indptr.index(i);
        let end = indptr.index(i + 1);
        let indices = &self.g_matrix.indices()[start..end];
        let data = &self.g_matrix.data()[start..end];
        indices.iter().zip(data.iter()).map(|(&j, &v)| (j, v))
    }

    /// Iterate over non-zero entries in row i of the B matrix (zero-allocation).
    pub fn b_row_iter(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let indptr = self.b_matrix.indptr();
        let start = indptr.index(i);
        let end = indptr.index(i + 1);
        let indices = &self.b_matrix.indices()[start..end];
        let data = &self.b_matrix.data()[start..end];
        indices.iter().zip(data.iter()).map(|(&j, &v)| (j, v))
    }

    /// Iterate over complex Y entries in row i by zipping the G and B rows.
    ///
    /// Both matrices are assembled from the same triplet sequence, so their
    /// patterns are identical.
    pub fn y_row_iter(&self, i: usize) -> impl Iterator<Item = (usize, Complex64)> + '_ {
        self.g_row_iter(i)
            .zip(self.b_row_iter(i))
            .map(|((jg, g), (jb, b))| {
                debug_assert_eq!(jg, jb);
                (jg, Complex64::new(g, b))
            })
    }
}
