//! `slae-solver`: Krylov solvers for the sparse systems of `slae-core`.
//!
//! Every solver is written once against the [`Device`] vector-space trait and
//! the [`Operator`] / [`HalfOperator`] matrix capabilities, so the same code
//! runs on host slices ([`CpuDevice`]) and on GPU buffers ([`GpuDevice`]).
//!
//! ```no_run
//! use slae_solver::{
//!     CpuDevice, Device, RectGrid, SolveAlgorithm, Solver, SolverKind, SolverParams,
//! };
//!
//! # fn main() -> slae_solver::Result<()> {
//! let grid = RectGrid::new(32, 32, 1.0 / 31.0, 1.0 / 31.0)?;
//! let a = grid.assemble_diag9::<f64>()?;
//! let device = CpuDevice::<f64>::new();
//! let b = device.create_vector("b", &grid.load_vector(|x, y| x + y))?;
//! let mut x = device.create_empty_vector("x", grid.node_count())?;
//!
//! let mut solver = Solver::<CpuDevice>::new(SolverKind::SplitCg, SolverParams::default());
//! let report = solver.solve(&device, &a, &b, &mut x)?;
//! println!("{:?} after {} iterations", report.status, report.iterations);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod algorithms;

pub use algorithms::{
    BiCgStab, JacobiCg, SolveAlgorithm, SolveReport, Solver, SolverKind, SolverParams,
    SolverState, SplitCg,
};

// Re-export from slae_core
pub use slae_core::{
    CpuDevice, Device, Diag9Matrix, GpuDevice, GpuMatrix, GpuVector, HalfOperator, Halves,
    HostMatrix, Matrix, MsrMatrix, Operator, RectGrid, Result, SlaeError, TransferStats, Vector,
};
