//! # SLAE Core Library
//!
//! Sparse matrix formats (MSR and Diag9) for systems of linear algebraic
//! equations arising from finite-element discretizations, with two execution
//! backends sharing one vector-space abstraction:
//!
//! - [`CpuDevice`]: rayon data-parallel kernels over host slices.
//! - [`GpuDevice`]: WGSL compute kernels dispatched through wgpu.
//!
//! Host matrices are built, validated and mutated on the CPU, then mirrored to
//! the GPU with [`Matrix::to_device`]. Both mirrors expose the same
//! [`Operator`] and [`HalfOperator`] capabilities so a solver can be written
//! once.

// Declare modules
mod context;
pub mod device;
pub mod diag9;
pub mod error;
pub mod gpu_matrix;
pub mod host;
mod kernels;
pub mod matrix;
pub mod msr;
mod ops; // GPU dispatch helpers, reached through GpuDevice and the GPU matrices
pub mod stencil;
pub mod traits;
pub mod vector;

// Re-export public types
pub use device::{Device, GpuDevice, TransferStats};
pub use diag9::Diag9Matrix;
pub use error::{Result, SlaeError};
pub use gpu_matrix::{GpuDiag9Matrix, GpuMsrMatrix};
pub use host::CpuDevice;
pub use matrix::{GpuMatrix, HostMatrix};
pub use msr::MsrMatrix;
pub use stencil::RectGrid;
pub use vector::GpuVector;

pub use traits::{HalfOperator, Halves, Matrix, Operator, Real, Vector};
