// Internal implementation of the GPU compute operations. Called by the
// methods of GpuDevice and of the device-resident matrices.

use crate::context::GpuContext;
use crate::error::Result;
use crate::kernels::{workgroup_count, DotParams, MatrixKernels, MatrixOp, VecParams};
use crate::vector::GpuVector;

/// Encodes and submits a single compute pass.
fn dispatch(
    context: &GpuContext,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    layout: &wgpu::BindGroupLayout,
    buffers: &[(u32, &wgpu::Buffer)],
    workgroups: u32,
) {
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .map(|&(binding, buffer)| wgpu::BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        })
        .collect();
    let bind_group = context
        .device
        .create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        });

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
    {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);
    }
    context.queue.submit(std::iter::once(encoder.finish()));
}

fn vec_params(context: &GpuContext, alpha: f32, n: usize) -> wgpu::Buffer {
    let params = VecParams {
        alpha,
        n: n as u32,
        _padding: [0; 2],
    };
    context.upload_buffer(
        "vector op params",
        bytemuck::bytes_of(&params),
        wgpu::BufferUsages::UNIFORM,
    )
}

/// y = alpha * x + y
pub(crate) fn internal_axpy(
    context: &GpuContext,
    alpha: f32,
    x: &GpuVector,
    y: &mut GpuVector,
) -> Result<()> {
    let workgroups = workgroup_count(y.size())?;
    let params = vec_params(context, alpha, y.size());
    let kernels = &context.kernels;
    dispatch(
        context,
        "axpy",
        &kernels.axpy,
        &kernels.binary_layout,
        &[(0, &params), (1, x.inner()), (2, y.inner())],
        workgroups,
    );
    Ok(())
}

/// x = x * y (element-wise)
pub(crate) fn internal_vmul(context: &GpuContext, x: &mut GpuVector, y: &GpuVector) -> Result<()> {
    let workgroups = workgroup_count(x.size())?;
    let params = vec_params(context, 1.0, x.size());
    let kernels = &context.kernels;
    dispatch(
        context,
        "vmul",
        &kernels.vmul,
        &kernels.binary_layout,
        &[(0, &params), (1, y.inner()), (2, x.inner())],
        workgroups,
    );
    Ok(())
}

/// Runs an in-place element-wise kernel on `x`.
fn unary(
    context: &GpuContext,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    alpha: f32,
    x: &mut GpuVector,
) -> Result<()> {
    let workgroups = workgroup_count(x.size())?;
    let params = vec_params(context, alpha, x.size());
    dispatch(
        context,
        label,
        pipeline,
        &context.kernels.unary_layout,
        &[(0, &params), (2, x.inner())],
        workgroups,
    );
    Ok(())
}

/// x = alpha * x
pub(crate) fn internal_scale(context: &GpuContext, alpha: f32, x: &mut GpuVector) -> Result<()> {
    unary(context, "scale", &context.kernels.scale, alpha, x)
}

/// x = 1 / sqrt(x)
pub(crate) fn internal_rsqrt(context: &GpuContext, x: &mut GpuVector) -> Result<()> {
    unary(context, "rsqrt", &context.kernels.rsqrt, 1.0, x)
}

/// x = 1 / x
pub(crate) fn internal_recip(context: &GpuContext, x: &mut GpuVector) -> Result<()> {
    unary(context, "recip", &context.kernels.recip, 1.0, x)
}

/// x^T * y. Per-workgroup partial sums are read back and reduced in f64.
pub(crate) async fn internal_dot(
    context: &GpuContext,
    x: &GpuVector,
    y: &GpuVector,
) -> Result<f64> {
    let n = x.size();
    let workgroups = workgroup_count(n)?;
    let params = DotParams {
        n: n as u32,
        _padding: [0; 3],
    };
    let params_buffer = context.upload_buffer(
        "dot params",
        bytemuck::bytes_of(&params),
        wgpu::BufferUsages::UNIFORM,
    );
    let partial = context.scratch_buffer(
        "dot partial sums",
        workgroups as u64 * std::mem::size_of::<f32>() as u64,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    );
    let kernels = &context.kernels;
    dispatch(
        context,
        "dot",
        &kernels.dot_partial,
        &kernels.dot_layout,
        &[
            (0, &params_buffer),
            (1, x.inner()),
            (2, y.inner()),
            (3, &partial),
        ],
        workgroups,
    );
    context
        .map_read(&partial, workgroups as usize, |sums: &[f32]| {
            sums.iter().map(|&s| s as f64).sum::<f64>()
        })
        .await
}

/// Runs one matrix kernel. `matrix_buffers` are the format-specific bindings,
/// parameters included. `x` and `y` carry their binding slots; `x` is absent
/// for the in-place triangular solves.
pub(crate) fn internal_matrix_op(
    context: &GpuContext,
    kernels: &MatrixKernels,
    op: MatrixOp,
    matrix_buffers: &[(u32, &wgpu::Buffer)],
    x: Option<(u32, &GpuVector)>,
    y: (u32, &mut GpuVector),
    rows: usize,
) -> Result<()> {
    let workgroups = if op.is_solve() {
        1
    } else {
        workgroup_count(rows)?
    };
    let (y_binding, y) = y;
    let mut buffers: Vec<(u32, &wgpu::Buffer)> = matrix_buffers.to_vec();
    if let Some((binding, x)) = x {
        buffers.push((binding, x.inner()));
    }
    buffers.push((y_binding, y.inner()));
    log::trace!("Dispatching matrix {} over {} rows", op.label(), rows);
    dispatch(
        context,
        op.label(),
        kernels.pipeline(op),
        kernels.layout(op),
        &buffers,
        workgroups,
    );
    Ok(())
}
