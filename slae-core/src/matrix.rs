//! Closed sets of matrix formats, on the host and on the device.

use crate::device::GpuDevice;
use crate::diag9::Diag9Matrix;
use crate::error::Result;
use crate::gpu_matrix::{GpuDiag9Matrix, GpuMsrMatrix};
use crate::msr::MsrMatrix;
use crate::traits::{HalfOperator, Halves, Matrix, Operator, Real};
use crate::vector::GpuVector;

/// A host matrix in either supported format.
#[derive(Debug, Clone, PartialEq)]
pub enum HostMatrix<T: Real> {
    Msr(MsrMatrix<T>),
    Diag9(Diag9Matrix<T>),
}

/// A device-resident matrix in either supported format.
#[derive(Debug)]
pub enum GpuMatrix {
    Msr(GpuMsrMatrix),
    Diag9(GpuDiag9Matrix),
}

impl<T: Real> From<MsrMatrix<T>> for HostMatrix<T> {
    fn from(matrix: MsrMatrix<T>) -> Self {
        HostMatrix::Msr(matrix)
    }
}

impl<T: Real> From<Diag9Matrix<T>> for HostMatrix<T> {
    fn from(matrix: Diag9Matrix<T>) -> Self {
        HostMatrix::Diag9(matrix)
    }
}

impl From<GpuMsrMatrix> for GpuMatrix {
    fn from(matrix: GpuMsrMatrix) -> Self {
        GpuMatrix::Msr(matrix)
    }
}

impl From<GpuDiag9Matrix> for GpuMatrix {
    fn from(matrix: GpuDiag9Matrix) -> Self {
        GpuMatrix::Diag9(matrix)
    }
}

impl<T: Real> Matrix for HostMatrix<T> {
    type Value = T;
    type Mirror = GpuMatrix;

    fn size(&self) -> usize {
        match self {
            HostMatrix::Msr(m) => m.size(),
            HostMatrix::Diag9(m) => m.size(),
        }
    }

    fn diagonal(&self) -> &[T] {
        match self {
            HostMatrix::Msr(m) => m.diagonal(),
            HostMatrix::Diag9(m) => m.diagonal(),
        }
    }

    fn diagonal_mut(&mut self) -> &mut [T] {
        match self {
            HostMatrix::Msr(m) => m.diagonal_mut(),
            HostMatrix::Diag9(m) => m.diagonal_mut(),
        }
    }

    fn multiply(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        match self {
            HostMatrix::Msr(m) => m.multiply(vec, res),
            HostMatrix::Diag9(m) => m.multiply(vec, res),
        }
    }

    fn non_zero_values(&self) -> impl Iterator<Item = T> + '_ {
        let values: Box<dyn Iterator<Item = T> + '_> = match self {
            HostMatrix::Msr(m) => Box::new(m.non_zero_values()),
            HostMatrix::Diag9(m) => Box::new(m.non_zero_values()),
        };
        values
    }

    fn to_device(&self, device: &GpuDevice) -> Result<GpuMatrix> {
        Ok(match self {
            HostMatrix::Msr(m) => GpuMatrix::Msr(m.to_device(device)?),
            HostMatrix::Diag9(m) => GpuMatrix::Diag9(m.to_device(device)?),
        })
    }
}

impl<T: Real> Halves for HostMatrix<T> {
    fn l_mul(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        match self {
            HostMatrix::Msr(m) => m.l_mul(vec, res),
            HostMatrix::Diag9(m) => m.l_mul(vec, res),
        }
    }

    fn inv_l_mul(&self, vec: &mut [T]) -> Result<()> {
        match self {
            HostMatrix::Msr(m) => m.inv_l_mul(vec),
            HostMatrix::Diag9(m) => m.inv_l_mul(vec),
        }
    }

    fn u_mul(&self, vec: &[T], res: &mut [T]) -> Result<()> {
        match self {
            HostMatrix::Msr(m) => m.u_mul(vec, res),
            HostMatrix::Diag9(m) => m.u_mul(vec, res),
        }
    }

    fn inv_u_mul(&self, vec: &mut [T]) -> Result<()> {
        match self {
            HostMatrix::Msr(m) => m.inv_u_mul(vec),
            HostMatrix::Diag9(m) => m.inv_u_mul(vec),
        }
    }
}

impl GpuMatrix {
    pub fn size(&self) -> usize {
        match self {
            GpuMatrix::Msr(m) => m.size(),
            GpuMatrix::Diag9(m) => m.size(),
        }
    }
}

impl Operator<GpuDevice> for GpuMatrix {
    fn dim(&self) -> usize {
        self.size()
    }

    fn apply(&self, _device: &GpuDevice, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        match self {
            GpuMatrix::Msr(m) => m.multiply(x, y),
            GpuMatrix::Diag9(m) => m.multiply(x, y),
        }
    }

    fn load_diagonal(&self, _device: &GpuDevice, out: &mut GpuVector) -> Result<()> {
        match self {
            GpuMatrix::Msr(m) => m.copy_diagonal(out),
            GpuMatrix::Diag9(m) => m.copy_diagonal(out),
        }
    }
}

impl HalfOperator<GpuDevice> for GpuMatrix {
    fn apply_l(&self, _device: &GpuDevice, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        match self {
            GpuMatrix::Msr(m) => m.l_mul(x, y),
            GpuMatrix::Diag9(m) => m.l_mul(x, y),
        }
    }

    fn solve_l(&self, _device: &GpuDevice, y: &mut GpuVector) -> Result<()> {
        match self {
            GpuMatrix::Msr(m) => m.inv_l_mul(y),
            GpuMatrix::Diag9(m) => m.inv_l_mul(y),
        }
    }

    fn apply_u(&self, _device: &GpuDevice, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        match self {
            GpuMatrix::Msr(m) => m.u_mul(x, y),
            GpuMatrix::Diag9(m) => m.u_mul(x, y),
        }
    }

    fn solve_u(&self, _device: &GpuDevice, y: &mut GpuVector) -> Result<()> {
        match self {
            GpuMatrix::Msr(m) => m.inv_u_mul(y),
            GpuMatrix::Diag9(m) => m.inv_u_mul(y),
        }
    }
}
