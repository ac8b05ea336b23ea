use crate::context::GpuContext;
use crate::error::{Result, SlaeError};
use crate::traits::Vector;
use std::{mem, sync::Arc};

/// A `wgpu::Buffer` holding `size` f32 values on the GPU.
#[derive(Debug)]
pub struct GpuVector {
    buffer: wgpu::Buffer,
    size: usize,
    size_bytes: u64,
    label: String,
    pub(crate) context: Arc<GpuContext>,
}

impl GpuVector {
    /// Buffer usages every vector is created with.
    pub(crate) const USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
        .union(wgpu::BufferUsages::COPY_SRC)
        .union(wgpu::BufferUsages::COPY_DST);

    pub(crate) fn from_buffer(
        buffer: wgpu::Buffer,
        size: usize,
        label: String,
        context: Arc<GpuContext>,
    ) -> Self {
        let size_bytes = (size * mem::size_of::<f32>()) as u64;
        Self {
            buffer,
            size,
            size_bytes,
            label,
            context,
        }
    }

    pub(crate) fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    pub fn as_entire_binding(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    /// Reads the vector back to the CPU (device -> host synchronization).
    pub async fn read_contents(&self) -> Result<Vec<f32>> {
        self.context.read_buffer(self.inner(), self.size).await
    }

    /// Maps the vector for host reading and passes the values to `f`. The
    /// mapping is released when `f` returns.
    pub async fn with_mapped<R>(&self, f: impl FnOnce(&[f32]) -> R) -> Result<R> {
        self.context.map_read(self.inner(), self.size, f).await
    }

    /// Uploads `data` into this vector (host -> device synchronization).
    pub async fn write_contents(&self, data: &[f32]) -> Result<()> {
        if data.len() != self.size {
            return Err(SlaeError::SizeMismatch {
                operation: "write_contents",
                expected: self.size,
                found: data.len(),
            });
        }
        self.context.write_buffer(self.inner(), data)
    }

    /// Copies the content of `source` into this vector. The copy is ordered
    /// before every later submission on the queue.
    pub fn clone_from(&mut self, source: &GpuVector) -> Result<()> {
        if self.size != source.size {
            return Err(SlaeError::SizeMismatch {
                operation: "clone_from",
                expected: self.size,
                found: source.size,
            });
        }
        self.submit("vector copy", |encoder| {
            encoder.copy_buffer_to_buffer(&source.buffer, 0, &self.buffer, 0, self.size_bytes)
        });
        Ok(())
    }

    /// Fills the vector with zeros.
    pub fn clear(&mut self) {
        self.submit("vector clear", |encoder| {
            encoder.clear_buffer(&self.buffer, 0, None)
        });
    }

    fn submit(&self, label: &str, record: impl FnOnce(&mut wgpu::CommandEncoder)) {
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        record(&mut encoder);
        self.context.queue.submit(Some(encoder.finish()));
    }
}

impl Vector for GpuVector {
    type Value = f32;

    fn len(&self) -> usize {
        self.size()
    }
}
