//! Compute pipelines and bind group layouts, compiled once per device.

use std::mem;

/// Threads per workgroup of every row/element parallel kernel.
pub(crate) const WORKGROUP_SIZE: u32 = 64;
/// Maximum workgroups per dispatch dimension guaranteed by the default limits.
const MAX_WORKGROUPS: u32 = 65_535;

/// Uniform block shared by the element-wise vector kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct VecParams {
    pub(crate) alpha: f32,
    pub(crate) n: u32,
    pub(crate) _padding: [u32; 2],
}

/// Uniform block of the dot product kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct DotParams {
    pub(crate) n: u32,
    pub(crate) _padding: [u32; 3],
}

/// Uniform block of the matrix kernels, uploaded once per matrix mirror.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct MatrixParams {
    pub(crate) n: u32,
    pub(crate) gap: u32,
    pub(crate) _padding: [u32; 2],
}

/// Matrix operator selected for a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatrixOp {
    Mul,
    LMul,
    UMul,
    InvL,
    InvU,
}

impl MatrixOp {
    /// Triangular solves work in place and run as a single invocation.
    pub(crate) fn is_solve(self) -> bool {
        matches!(self, MatrixOp::InvL | MatrixOp::InvU)
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            MatrixOp::Mul => "mul",
            MatrixOp::LMul => "l_mul",
            MatrixOp::UMul => "u_mul",
            MatrixOp::InvL => "inv_l",
            MatrixOp::InvU => "inv_u",
        }
    }
}

/// Pipelines of one matrix format.
#[derive(Debug)]
pub(crate) struct MatrixKernels {
    pub(crate) apply_layout: wgpu::BindGroupLayout,
    pub(crate) solve_layout: wgpu::BindGroupLayout,
    mul: wgpu::ComputePipeline,
    l_mul: wgpu::ComputePipeline,
    u_mul: wgpu::ComputePipeline,
    inv_l: wgpu::ComputePipeline,
    inv_u: wgpu::ComputePipeline,
}

impl MatrixKernels {
    pub(crate) fn pipeline(&self, op: MatrixOp) -> &wgpu::ComputePipeline {
        match op {
            MatrixOp::Mul => &self.mul,
            MatrixOp::LMul => &self.l_mul,
            MatrixOp::UMul => &self.u_mul,
            MatrixOp::InvL => &self.inv_l,
            MatrixOp::InvU => &self.inv_u,
        }
    }

    pub(crate) fn layout(&self, op: MatrixOp) -> &wgpu::BindGroupLayout {
        if op.is_solve() {
            &self.solve_layout
        } else {
            &self.apply_layout
        }
    }
}

/// Every compute pipeline used by the device backend.
#[derive(Debug)]
pub(crate) struct Kernels {
    pub(crate) binary_layout: wgpu::BindGroupLayout,
    pub(crate) unary_layout: wgpu::BindGroupLayout,
    pub(crate) dot_layout: wgpu::BindGroupLayout,
    pub(crate) axpy: wgpu::ComputePipeline,
    pub(crate) vmul: wgpu::ComputePipeline,
    pub(crate) scale: wgpu::ComputePipeline,
    pub(crate) rsqrt: wgpu::ComputePipeline,
    pub(crate) recip: wgpu::ComputePipeline,
    pub(crate) dot_partial: wgpu::ComputePipeline,
    pub(crate) msr: MatrixKernels,
    pub(crate) diag9: MatrixKernels,
}

fn uniform_entry(binding: u32, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn layout(
    device: &wgpu::Device,
    label: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    })
}

fn pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    bind_group_layout: &wgpu::BindGroupLayout,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(entry_point),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

fn shader(device: &wgpu::Device, label: &str, source: &'static str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

impl Kernels {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        log::debug!("Compiling compute kernels");
        let vec_params = mem::size_of::<VecParams>();
        let matrix_params = mem::size_of::<MatrixParams>();

        let vector_ops = shader(device, "vector_ops", include_str!("./shaders/vector_ops.wgsl"));
        let dot = shader(device, "dot", include_str!("./shaders/dot.wgsl"));
        let msr = shader(device, "msr", include_str!("./shaders/msr.wgsl"));
        let diag9 = shader(device, "diag9", include_str!("./shaders/diag9.wgsl"));

        let binary_layout = layout(
            device,
            "binary vector layout",
            &[
                uniform_entry(0, vec_params),
                storage_entry(1, true),
                storage_entry(2, false),
            ],
        );
        let unary_layout = layout(
            device,
            "unary vector layout",
            &[uniform_entry(0, vec_params), storage_entry(2, false)],
        );
        let dot_layout = layout(
            device,
            "dot layout",
            &[
                uniform_entry(0, mem::size_of::<DotParams>()),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        );

        // params, di, elems, ia, ja, x, y
        let msr_apply_layout = layout(
            device,
            "msr apply layout",
            &[
                uniform_entry(0, matrix_params),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, false),
            ],
        );
        let msr_solve_layout = layout(
            device,
            "msr solve layout",
            &[
                uniform_entry(0, matrix_params),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(6, false),
            ],
        );
        // params, bands, x, y
        let diag9_apply_layout = layout(
            device,
            "diag9 apply layout",
            &[
                uniform_entry(0, matrix_params),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        );
        let diag9_solve_layout = layout(
            device,
            "diag9 solve layout",
            &[
                uniform_entry(0, matrix_params),
                storage_entry(1, true),
                storage_entry(3, false),
            ],
        );

        let msr = MatrixKernels {
            mul: pipeline(device, &msr, &msr_apply_layout, "msr_mul"),
            l_mul: pipeline(device, &msr, &msr_apply_layout, "msr_l_mul"),
            u_mul: pipeline(device, &msr, &msr_apply_layout, "msr_u_mul"),
            inv_l: pipeline(device, &msr, &msr_solve_layout, "msr_inv_l"),
            inv_u: pipeline(device, &msr, &msr_solve_layout, "msr_inv_u"),
            apply_layout: msr_apply_layout,
            solve_layout: msr_solve_layout,
        };
        let diag9 = MatrixKernels {
            mul: pipeline(device, &diag9, &diag9_apply_layout, "diag9_mul"),
            l_mul: pipeline(device, &diag9, &diag9_apply_layout, "diag9_l_mul"),
            u_mul: pipeline(device, &diag9, &diag9_apply_layout, "diag9_u_mul"),
            inv_l: pipeline(device, &diag9, &diag9_solve_layout, "diag9_inv_l"),
            inv_u: pipeline(device, &diag9, &diag9_solve_layout, "diag9_inv_u"),
            apply_layout: diag9_apply_layout,
            solve_layout: diag9_solve_layout,
        };

        Self {
            axpy: pipeline(device, &vector_ops, &binary_layout, "axpy"),
            vmul: pipeline(device, &vector_ops, &binary_layout, "vmul"),
            scale: pipeline(device, &vector_ops, &unary_layout, "scale"),
            rsqrt: pipeline(device, &vector_ops, &unary_layout, "rsqrt"),
            recip: pipeline(device, &vector_ops, &unary_layout, "recip"),
            dot_partial: pipeline(device, &dot, &dot_layout, "dot_partial"),
            binary_layout,
            unary_layout,
            dot_layout,
            msr,
            diag9,
        }
    }
}

/// Number of workgroups covering `n` invocations.
pub(crate) fn workgroup_count(n: usize) -> crate::error::Result<u32> {
    let count = n.div_ceil(WORKGROUP_SIZE as usize);
    u32::try_from(count)
        .ok()
        .filter(|&c| c <= MAX_WORKGROUPS)
        .ok_or_else(|| {
            crate::error::SlaeError::UnsupportedOperation(format!(
                "{} elements exceed the dispatch limit of {} workgroups",
                n, MAX_WORKGROUPS
            ))
        })
}
