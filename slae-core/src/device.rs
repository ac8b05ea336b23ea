use crate::context::GpuContext;
use crate::diag9::{Diag9Matrix, SIDE_BANDS};
use crate::error::{check_len, Result, SlaeError};
use crate::gpu_matrix::{GpuDiag9Matrix, GpuMsrMatrix};
use crate::kernels::MatrixParams;
use crate::msr::MsrMatrix;
use crate::ops;
use crate::traits::{Real, Vector};
use crate::vector::GpuVector;
use std::fmt::Debug;
use std::sync::Arc;

/// Vector-space capability of an execution device (CPU or GPU).
///
/// Every solver is written once against this trait. Scalars cross the trait in
/// f64; a device computes in its own precision. Operations fail with
/// `SizeMismatch` before touching memory when operand lengths differ.
pub trait Device: Debug {
    type Vector: Vector;

    /// Creates a vector holding `data` (host -> device).
    fn create_vector(&self, label: &str, data: &[f64]) -> Result<Self::Vector>;
    /// Creates a zero-filled vector.
    fn create_empty_vector(&self, label: &str, size: usize) -> Result<Self::Vector>;
    /// Reads a vector back (device -> host).
    fn read_vector(&self, v: &Self::Vector) -> Result<Vec<f64>>;
    /// Overwrites a vector with `data` (host -> device).
    fn write_vector(&self, v: &mut Self::Vector, data: &[f64]) -> Result<()>;

    /// `dst = src`
    fn copy(&self, src: &Self::Vector, dst: &mut Self::Vector) -> Result<()>;
    /// `x = 0`
    fn zero(&self, x: &mut Self::Vector) -> Result<()>;
    /// `y = alpha * x + y`
    fn axpy(&self, alpha: f64, x: &Self::Vector, y: &mut Self::Vector) -> Result<()>;
    /// `x = alpha * x`
    fn scale(&self, alpha: f64, x: &mut Self::Vector) -> Result<()>;
    /// `x = x * y`, element-wise.
    fn vmul(&self, x: &mut Self::Vector, y: &Self::Vector) -> Result<()>;
    /// `x = 1 / sqrt(x)`, element-wise.
    fn rsqrt(&self, x: &mut Self::Vector) -> Result<()>;
    /// `x = 1 / x`, element-wise.
    fn recip(&self, x: &mut Self::Vector) -> Result<()>;
    /// `x^T * y`
    fn dot(&self, x: &Self::Vector, y: &Self::Vector) -> Result<f64>;
}

/// Represents a GPU execution device, holding the WGPU context.
#[derive(Debug, Clone)]
pub struct GpuDevice {
    pub(crate) context: Arc<GpuContext>,
}

/// Cumulative bytes moved between host and device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_to_gpu: u64,
    pub bytes_from_gpu: u64,
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        SlaeError::UnsupportedOperation(format!("{} ({}) does not fit in u32", what, value))
    })
}

impl GpuDevice {
    /// Creates a GpuDevice, initializing the WGPU context and compiling the kernels.
    pub async fn new() -> Result<Self> {
        let context = GpuContext::new().await?;
        log::info!("GpuDevice created successfully");
        Ok(Self {
            context: Arc::new(context),
        })
    }

    /// Blocking variant of [`GpuDevice::new`].
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    // --- Resource Creation ---

    /// Creates a GpuVector initialized with `data`.
    pub fn upload_vector(&self, label: &str, data: &[f32]) -> Result<GpuVector> {
        if data.is_empty() {
            return Err(SlaeError::InvalidDimensions(
                "Cannot create GPU vector from empty slice".to_string(),
            ));
        }
        let buffer = self.context.upload_buffer(
            label,
            bytemuck::cast_slice(data),
            GpuVector::USAGE,
        );
        Ok(GpuVector::from_buffer(
            buffer,
            data.len(),
            label.to_string(),
            Arc::clone(&self.context),
        ))
    }

    /// Creates a zero-filled GpuVector of `size` elements.
    pub fn allocate_vector(&self, label: &str, size: usize) -> Result<GpuVector> {
        if size == 0 {
            return Err(SlaeError::InvalidDimensions(
                "Cannot create empty GPU vector with size 0".to_string(),
            ));
        }
        let buffer = self.context.scratch_buffer(
            label,
            (size * std::mem::size_of::<f32>()) as u64,
            GpuVector::USAGE,
        );
        Ok(GpuVector::from_buffer(
            buffer,
            size,
            label.to_string(),
            Arc::clone(&self.context),
        ))
    }

    fn matrix_params(&self, label: &str, size: usize, gap: usize) -> Result<wgpu::Buffer> {
        let params = MatrixParams {
            n: to_u32(size, "matrix size")?,
            gap: to_u32(gap, "gap")?,
            _padding: [0; 2],
        };
        Ok(self.context.upload_buffer(
            label,
            bytemuck::bytes_of(&params),
            wgpu::BufferUsages::UNIFORM,
        ))
    }

    fn storage_buffer<P: bytemuck::Pod>(&self, label: &str, data: &[P]) -> wgpu::Buffer {
        self.context.upload_buffer(
            label,
            bytemuck::cast_slice(data),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )
    }

    /// Uploads an MSR matrix. Values are converted to f32, indices to u32.
    pub fn create_msr_matrix<T: Real>(&self, matrix: &MsrMatrix<T>) -> Result<GpuMsrMatrix> {
        let n = matrix.diagonal.len();
        if n == 0 {
            return Err(SlaeError::InvalidDimensions(
                "Cannot upload an empty matrix".to_string(),
            ));
        }
        let nnz = matrix.nnz();
        log::debug!("Uploading MSR matrix: size {}, nnz {}", n, nnz);

        let to_f32 = |v: &T| v.as_f64() as f32;
        let diagonal: Vec<f32> = matrix.diagonal.iter().map(to_f32).collect();
        // Storage bindings may not be empty.
        let mut values: Vec<f32> = matrix.values.iter().map(to_f32).collect();
        let mut columns = matrix
            .columns
            .iter()
            .map(|&c| to_u32(c, "column index"))
            .collect::<Result<Vec<u32>>>()?;
        if nnz == 0 {
            values.push(0.0);
            columns.push(0);
        }
        let row_offsets = matrix
            .row_offsets
            .iter()
            .map(|&o| to_u32(o, "row offset"))
            .collect::<Result<Vec<u32>>>()?;

        Ok(GpuMsrMatrix::new_internal(
            n,
            nnz,
            self.matrix_params("msr params", n, 0)?,
            self.storage_buffer("msr diagonal", &diagonal),
            self.storage_buffer("msr values", &values),
            self.storage_buffer("msr row offsets", &row_offsets),
            self.storage_buffer("msr columns", &columns),
            Arc::clone(&self.context),
        ))
    }

    /// Uploads a Diag9 matrix, packing all bands (zero-padded to full length)
    /// into one buffer.
    pub fn create_diag9_matrix<T: Real>(&self, matrix: &Diag9Matrix<T>) -> Result<GpuDiag9Matrix> {
        let n = matrix.diagonal.len();
        if n == 0 {
            return Err(SlaeError::InvalidDimensions(
                "Cannot upload an empty matrix".to_string(),
            ));
        }
        log::debug!("Uploading Diag9 matrix: size {}, gap {}", n, matrix.gap);

        let mut bands = vec![0.0f32; (2 * SIDE_BANDS + 1) * n];
        let ordered = matrix
            .ld
            .iter()
            .rev()
            .chain(std::iter::once(&matrix.diagonal))
            .chain(matrix.rd.iter());
        for (chunk, band) in bands.chunks_mut(n).zip(ordered) {
            for (dst, src) in chunk.iter_mut().zip(band) {
                *dst = src.as_f64() as f32;
            }
        }

        Ok(GpuDiag9Matrix::new_internal(
            n,
            matrix.gap,
            self.matrix_params("diag9 params", n, matrix.gap)?,
            self.storage_buffer("diag9 bands", &bands),
            Arc::clone(&self.context),
        ))
    }

    // --- Transfer statistics ---

    pub fn get_transfer_stats(&self) -> TransferStats {
        let (bytes_to_gpu, bytes_from_gpu) = self.context.transfers.snapshot();
        TransferStats {
            bytes_to_gpu,
            bytes_from_gpu,
        }
    }

    pub fn reset_transfer_stats(&self) {
        self.context.transfers.reset();
    }
}

impl Device for GpuDevice {
    type Vector = GpuVector;

    fn create_vector(&self, label: &str, data: &[f64]) -> Result<GpuVector> {
        let data: Vec<f32> = data.iter().map(|&v| v as f32).collect();
        self.upload_vector(label, &data)
    }

    fn create_empty_vector(&self, label: &str, size: usize) -> Result<GpuVector> {
        self.allocate_vector(label, size)
    }

    fn read_vector(&self, v: &GpuVector) -> Result<Vec<f64>> {
        pollster::block_on(v.with_mapped(|data| data.iter().map(|&x| x as f64).collect()))
    }

    fn write_vector(&self, v: &mut GpuVector, data: &[f64]) -> Result<()> {
        let data: Vec<f32> = data.iter().map(|&x| x as f32).collect();
        pollster::block_on(v.write_contents(&data))
    }

    fn copy(&self, src: &GpuVector, dst: &mut GpuVector) -> Result<()> {
        dst.clone_from(src)
    }

    fn zero(&self, x: &mut GpuVector) -> Result<()> {
        x.clear();
        Ok(())
    }

    fn axpy(&self, alpha: f64, x: &GpuVector, y: &mut GpuVector) -> Result<()> {
        check_len("axpy", y.size(), x.size())?;
        ops::internal_axpy(&self.context, alpha as f32, x, y)
    }

    fn scale(&self, alpha: f64, x: &mut GpuVector) -> Result<()> {
        ops::internal_scale(&self.context, alpha as f32, x)
    }

    fn vmul(&self, x: &mut GpuVector, y: &GpuVector) -> Result<()> {
        check_len("vmul", x.size(), y.size())?;
        ops::internal_vmul(&self.context, x, y)
    }

    fn rsqrt(&self, x: &mut GpuVector) -> Result<()> {
        ops::internal_rsqrt(&self.context, x)
    }

    fn recip(&self, x: &mut GpuVector) -> Result<()> {
        ops::internal_recip(&self.context, x)
    }

    fn dot(&self, x: &GpuVector, y: &GpuVector) -> Result<f64> {
        check_len("dot", x.size(), y.size())?;
        pollster::block_on(ops::internal_dot(&self.context, x, y))
    }
}
