use crate::device::{Device, GpuDevice};
use crate::error::Result;
use bytemuck::{Pod, Zeroable};
use num_traits::{Float, Zero};
use std::fmt::Debug;
use std::ops::{AddAssign, SubAssign};

/// Scalar type a host matrix or vector can be stored in.
pub trait Real:
    Float + Pod + Zeroable + Default + Debug + Send + Sync + AddAssign + SubAssign + 'static
{
    fn from_f64(value: f64) -> Self;
    fn as_f64(self) -> f64;
}

impl Real for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
    fn as_f64(self) -> f64 {
        self
    }
}

/// Host-resident square sparse matrix.
pub trait Matrix: Debug + Sync {
    /// The underlying numeric type of the matrix elements (f32 or f64).
    type Value: Real;
    /// Device-resident mirror produced by [`Matrix::to_device`].
    type Mirror: HalfOperator<GpuDevice>;

    /// Number of rows (and columns).
    fn size(&self) -> usize;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize) {
        (self.size(), self.size())
    }

    fn diagonal(&self) -> &[Self::Value];

    /// Mutable diagonal, the only part of an assembled matrix that may change.
    fn diagonal_mut(&mut self) -> &mut [Self::Value];

    /// `res = self * vec`.
    ///
    /// # Errors
    /// `SizeMismatch` if either slice length differs from [`Matrix::size`].
    fn multiply(&self, vec: &[Self::Value], res: &mut [Self::Value]) -> Result<()>;

    /// Lazily enumerates the stored values row by row: non-zero lower entries,
    /// the diagonal entry (always), then non-zero upper entries, each in
    /// ascending column order.
    fn non_zero_values(&self) -> impl Iterator<Item = Self::Value> + '_;

    /// Uploads the matrix into storage buffers of `device`.
    fn to_device(&self, device: &GpuDevice) -> Result<Self::Mirror>;

    /// Replaces exact zeros on the diagonal with `value`, returns how many were patched.
    fn patch_zero_diagonal(&mut self, value: Self::Value) -> usize {
        let mut patched = 0;
        for d in self.diagonal_mut().iter_mut().filter(|d| d.is_zero()) {
            *d = value;
            patched += 1;
        }
        if patched > 0 {
            log::warn!("Patched {} zero diagonal entries", patched);
        }
        patched
    }
}

/// Triangular halves of a matrix: `L = D + strict lower`, `U = D + strict upper`.
pub trait Halves: Matrix {
    /// `res = L * vec`.
    fn l_mul(&self, vec: &[Self::Value], res: &mut [Self::Value]) -> Result<()>;
    /// `vec = L⁻¹ * vec` (forward substitution, in place).
    fn inv_l_mul(&self, vec: &mut [Self::Value]) -> Result<()>;
    /// `res = U * vec`.
    fn u_mul(&self, vec: &[Self::Value], res: &mut [Self::Value]) -> Result<()>;
    /// `vec = U⁻¹ * vec` (backward substitution, in place).
    fn inv_u_mul(&self, vec: &mut [Self::Value]) -> Result<()>;
}

/// Generic trait representing a vector living on some device.
pub trait Vector: Debug {
    /// The underlying numeric type of the vector elements.
    type Value: Copy + Debug + Default + Pod + Zeroable;

    /// Returns the number of elements in the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Real> Vector for Vec<T> {
    type Value = T;

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// A square linear operator whose data lives where `D` computes.
pub trait Operator<D: Device>: Debug {
    fn dim(&self) -> usize;

    /// `y = A * x`.
    fn apply(&self, device: &D, x: &D::Vector, y: &mut D::Vector) -> Result<()>;

    /// Copies the diagonal of the operator into `out`.
    fn load_diagonal(&self, device: &D, out: &mut D::Vector) -> Result<()>;
}

/// Half-multiply capability of an [`Operator`].
pub trait HalfOperator<D: Device>: Operator<D> {
    fn apply_l(&self, device: &D, x: &D::Vector, y: &mut D::Vector) -> Result<()>;
    fn solve_l(&self, device: &D, y: &mut D::Vector) -> Result<()>;
    fn apply_u(&self, device: &D, x: &D::Vector, y: &mut D::Vector) -> Result<()>;
    fn solve_u(&self, device: &D, y: &mut D::Vector) -> Result<()>;
}
