//! Device-resident mirrors of the host matrix formats.

use crate::context::GpuContext;
use crate::device::GpuDevice;
use crate::error::{check_len, Result};
use crate::kernels::{MatrixKernels, MatrixOp};
use crate::ops;
use crate::traits::{HalfOperator, Operator};
use crate::vector::GpuVector;
use std::sync::Arc;

/// MSR matrix stored in GPU buffers: `di`, `elems`, `ia`, `ja`, plus the
/// uniform parameter block bound to every kernel of this matrix.
#[derive(Debug)]
pub struct GpuMsrMatrix {
    size: usize,
    nnz: usize,
    params_buffer: wgpu::Buffer,
    diagonal_buffer: wgpu::Buffer,
    values_buffer: wgpu::Buffer,
    row_offsets_buffer: wgpu::Buffer,
    columns_buffer: wgpu::Buffer,
    context: Arc<GpuContext>,
}

/// Diag9 matrix stored in GPU buffers. The nine bands share one buffer of
/// `9 * size` values: ld3, ld2, ld1, ld0, di, rd0, rd1, rd2, rd3.
#[derive(Debug)]
pub struct GpuDiag9Matrix {
    size: usize,
    gap: usize,
    params_buffer: wgpu::Buffer,
    bands_buffer: wgpu::Buffer,
    context: Arc<GpuContext>,
}

/// Packed band index of the diagonal inside [`GpuDiag9Matrix`].
pub(crate) const DIAG9_DIAGONAL_BAND: usize = 4;

impl GpuMsrMatrix {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        size: usize,
        nnz: usize,
        params_buffer: wgpu::Buffer,
        diagonal_buffer: wgpu::Buffer,
        values_buffer: wgpu::Buffer,
        row_offsets_buffer: wgpu::Buffer,
        columns_buffer: wgpu::Buffer,
        context: Arc<GpuContext>,
    ) -> Self {
        Self {
            size,
            nnz,
            params_buffer,
            diagonal_buffer,
            values_buffer,
            row_offsets_buffer,
            columns_buffer,
            context,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    fn run(&self, op: MatrixOp, x: Option<&GpuVector>, y: &mut GpuVector) -> Result<()> {
        if let Some(x) = x {
            check_len(op.label(), self.size, x.size())?;
        }
        check_len(op.label(), self.size, y.size())?;
        let kernels: &MatrixKernels = &self.context.kernels.msr;
        ops::internal_matrix_op(
            &self.context,
            kernels,
            op,
            &[
                (0, &self.params_buffer),
                (1, &self.diagonal_buffer),
                (2, &self.values_buffer),
                (3, &self.row_offsets_buffer),
                (4, &self.columns_buffer),
            ],
            x.map(|x| (5, x)),
            (6, y),
            self.size,
        )
    }

    /// `y = A * x` on the GPU.
    pub fn multiply(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::Mul, Some(x), y)
    }

    pub fn l_mul(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::LMul, Some(x), y)
    }

    pub fn u_mul(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::UMul, Some(x), y)
    }

    pub fn inv_l_mul(&self, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::InvL, None, y)
    }

    pub fn inv_u_mul(&self, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::InvU, None, y)
    }

    /// Copies the diagonal into `out` without leaving the device.
    pub fn copy_diagonal(&self, out: &mut GpuVector) -> Result<()> {
        check_len("copy_diagonal", self.size, out.size())?;
        copy_range(&self.context, &self.diagonal_buffer, 0, out);
        Ok(())
    }
}

impl GpuDiag9Matrix {
    pub(crate) fn new_internal(
        size: usize,
        gap: usize,
        params_buffer: wgpu::Buffer,
        bands_buffer: wgpu::Buffer,
        context: Arc<GpuContext>,
    ) -> Self {
        Self {
            size,
            gap,
            params_buffer,
            bands_buffer,
            context,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn gap(&self) -> usize {
        self.gap
    }

    fn run(&self, op: MatrixOp, x: Option<&GpuVector>, y: &mut GpuVector) -> Result<()> {
        if let Some(x) = x {
            check_len(op.label(), self.size, x.size())?;
        }
        check_len(op.label(), self.size, y.size())?;
        ops::internal_matrix_op(
            &self.context,
            &self.context.kernels.diag9,
            op,
            &[(0, &self.params_buffer), (1, &self.bands_buffer)],
            x.map(|x| (2, x)),
            (3, y),
            self.size,
        )
    }

    /// `y = A * x` on the GPU.
    pub fn multiply(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::Mul, Some(x), y)
    }

    pub fn l_mul(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::LMul, Some(x), y)
    }

    pub fn u_mul(&self, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::UMul, Some(x), y)
    }

    pub fn inv_l_mul(&self, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::InvL, None, y)
    }

    pub fn inv_u_mul(&self, y: &mut GpuVector) -> Result<()> {
        self.run(MatrixOp::InvU, None, y)
    }

    /// Copies the diagonal band into `out` without leaving the device.
    pub fn copy_diagonal(&self, out: &mut GpuVector) -> Result<()> {
        check_len("copy_diagonal", self.size, out.size())?;
        let offset = (DIAG9_DIAGONAL_BAND * self.size * std::mem::size_of::<f32>()) as u64;
        copy_range(&self.context, &self.bands_buffer, offset, out);
        Ok(())
    }
}

fn copy_range(context: &GpuContext, source: &wgpu::Buffer, offset: u64, out: &mut GpuVector) {
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("copy_diagonal"),
        });
    encoder.copy_buffer_to_buffer(source, offset, out.inner(), 0, out.size_bytes());
    context.queue.submit(Some(encoder.finish()));
}

macro_rules! impl_gpu_operator {
    ($matrix:ty) => {
        impl Operator<GpuDevice> for $matrix {
            fn dim(&self) -> usize {
                self.size
            }

            fn apply(&self, _device: &GpuDevice, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
                self.multiply(x, y)
            }

            fn load_diagonal(&self, _device: &GpuDevice, out: &mut GpuVector) -> Result<()> {
                self.copy_diagonal(out)
            }
        }

        impl HalfOperator<GpuDevice> for $matrix {
            fn apply_l(&self, _device: &GpuDevice, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
                self.l_mul(x, y)
            }

            fn solve_l(&self, _device: &GpuDevice, y: &mut GpuVector) -> Result<()> {
                self.inv_l_mul(y)
            }

            fn apply_u(&self, _device: &GpuDevice, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
                self.u_mul(x, y)
            }

            fn solve_u(&self, _device: &GpuDevice, y: &mut GpuVector) -> Result<()> {
                self.inv_u_mul(y)
            }
        }
    };
}

impl_gpu_operator!(GpuMsrMatrix);
impl_gpu_operator!(GpuDiag9Matrix);
