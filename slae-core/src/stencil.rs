//! Reference assembler: bilinear elements on a uniform rectangular grid for
//! `-div(lambda grad u) + gamma u = f` with natural boundary conditions.
//!
//! Nodes are numbered row by row (`i = iy * nx + ix`), so every coupling has
//! a distance of 1, `nx - 1`, `nx` or `nx + 1`, which is exactly the Diag9
//! layout with `gap = nx - 2`.

use crate::diag9::{Diag9Matrix, SIDE_BANDS};
use crate::error::{Result, SlaeError};
use crate::msr::MsrMatrix;
use crate::traits::Real;
use serde::{Deserialize, Serialize};

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectGrid {
    /// Nodes per grid row.
    pub nx: usize,
    /// Number of grid rows.
    pub ny: usize,
    pub hx: f64,
    pub hy: f64,
    #[serde(default = "one")]
    pub lambda: f64,
    #[serde(default = "one")]
    pub gamma: f64,
}

type Local = [[f64; 4]; 4];

impl RectGrid {
    pub fn new(nx: usize, ny: usize, hx: f64, hy: f64) -> Result<Self> {
        let grid = Self {
            nx,
            ny,
            hx,
            hy,
            lambda: 1.0,
            gamma: 1.0,
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn with_coefficients(self, lambda: f64, gamma: f64) -> Result<Self> {
        let grid = Self {
            lambda,
            gamma,
            ..self
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nx < 3 || self.ny < 2 {
            return Err(SlaeError::InvalidDimensions(format!(
                "Grid needs at least 3x2 nodes, got {}x{}",
                self.nx, self.ny
            )));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.hx) || !positive(self.hy) {
            return Err(SlaeError::InvalidDimensions(format!(
                "Grid steps must be positive, got hx = {}, hy = {}",
                self.hx, self.hy
            )));
        }
        // gamma > 0 keeps the Neumann problem non-singular
        if !positive(self.lambda) || !positive(self.gamma) {
            return Err(SlaeError::InvalidDimensions(format!(
                "Coefficients must be positive, got lambda = {}, gamma = {}",
                self.lambda, self.gamma
            )));
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Diag9 gap matching the grid numbering.
    pub fn gap(&self) -> usize {
        self.nx - 2
    }

    pub fn node_position(&self, node: usize) -> (f64, f64) {
        ((node % self.nx) as f64 * self.hx, (node / self.nx) as f64 * self.hy)
    }

    /// Global node numbers of every element, local order
    /// (x0, y0), (x1, y0), (x0, y1), (x1, y1).
    fn elements(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        let nx = self.nx;
        (0..self.ny - 1).flat_map(move |ey| {
            (0..nx - 1).map(move |ex| {
                let base = ey * nx + ex;
                [base, base + 1, base + nx, base + nx + 1]
            })
        })
    }

    fn local_mass(&self) -> Local {
        let mx = [[self.hx / 3.0, self.hx / 6.0], [self.hx / 6.0, self.hx / 3.0]];
        let my = [[self.hy / 3.0, self.hy / 6.0], [self.hy / 6.0, self.hy / 3.0]];
        let mut local = [[0.0; 4]; 4];
        for (i, row) in local.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = mx[i % 2][j % 2] * my[i / 2][j / 2];
            }
        }
        local
    }

    fn local_matrix(&self) -> Local {
        let stiffness = |h: f64| [[1.0 / h, -1.0 / h], [-1.0 / h, 1.0 / h]];
        let mass = |h: f64| [[h / 3.0, h / 6.0], [h / 6.0, h / 3.0]];
        let (gx, gy) = (stiffness(self.hx), stiffness(self.hy));
        let (mx, my) = (mass(self.hx), mass(self.hy));
        let m = self.local_mass();
        let mut local = [[0.0; 4]; 4];
        for (i, row) in local.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                let (xi, yi, xj, yj) = (i % 2, i / 2, j % 2, j / 2);
                let g = gx[xi][xj] * my[yi][yj] + mx[xi][xj] * gy[yi][yj];
                *value = self.lambda * g + self.gamma * m[i][j];
            }
        }
        local
    }

    /// Assembles the MSR matrix: portrait first, then element contributions.
    pub fn assemble_msr<T: Real>(&self) -> Result<MsrMatrix<T>> {
        let mut portrait = vec![Vec::new(); self.node_count()];
        for nodes in self.elements() {
            for &a in &nodes {
                portrait[a].extend(nodes.iter().copied().filter(|&b| b != a));
            }
        }
        let mut matrix = MsrMatrix::from_portrait(portrait)?;
        let local = self.local_matrix();
        for nodes in self.elements() {
            for (i, &row) in nodes.iter().enumerate() {
                for (j, &col) in nodes.iter().enumerate() {
                    matrix.add(row, col, T::from_f64(local[i][j]))?;
                }
            }
        }
        log::debug!(
            "Assembled MSR grid matrix: {} nodes, {} off-diagonal entries",
            matrix.diagonal.len(),
            matrix.nnz()
        );
        Ok(matrix)
    }

    /// Assembles the same operator in Diag9 layout.
    pub fn assemble_diag9<T: Real>(&self) -> Result<Diag9Matrix<T>> {
        let gap = self.gap();
        let mut matrix = Diag9Matrix::zeros(self.node_count(), gap);
        let offsets: [usize; SIDE_BANDS] = std::array::from_fn(|k| matrix.offset(k));
        let band_of = |distance: usize| -> Result<usize> {
            offsets
                .iter()
                .position(|&offset| offset == distance)
                .ok_or_else(|| {
                    SlaeError::Internal(format!("No Diag9 band at distance {}", distance))
                })
        };
        let local = self.local_matrix();
        for nodes in self.elements() {
            for (i, &row) in nodes.iter().enumerate() {
                for (j, &col) in nodes.iter().enumerate() {
                    let value = T::from_f64(local[i][j]);
                    if row == col {
                        matrix.diagonal[row] += value;
                    } else if col < row {
                        matrix.ld[band_of(row - col)?][col] += value;
                    } else {
                        matrix.rd[band_of(col - row)?][row] += value;
                    }
                }
            }
        }
        log::debug!(
            "Assembled Diag9 grid matrix: {} nodes, gap {}",
            self.node_count(),
            gap
        );
        Ok(matrix)
    }

    /// Consistent-mass load vector for a source sampled at the nodes.
    pub fn load_vector(&self, f: impl Fn(f64, f64) -> f64) -> Vec<f64> {
        let values: Vec<f64> = (0..self.node_count())
            .map(|node| {
                let (x, y) = self.node_position(node);
                f(x, y)
            })
            .collect();
        let mass = self.local_mass();
        let mut load = vec![0.0; self.node_count()];
        for nodes in self.elements() {
            for (i, &row) in nodes.iter().enumerate() {
                for (j, &col) in nodes.iter().enumerate() {
                    load[row] += mass[i][j] * values[col];
                }
            }
        }
        load
    }
}
