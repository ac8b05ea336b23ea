use crate::error::{Result, SlaeError};
use crate::kernels::Kernels;
use bytemuck::Pod;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wgpu::{util::DeviceExt, PollType};

/// Storage buffers bound by the widest kernel (MSR half-products).
const REQUIRED_STORAGE_BUFFERS: u32 = 6;

/// Host/device traffic through the instrumented helpers, in bytes.
#[derive(Debug, Default)]
pub(crate) struct TransferCounters {
    uploaded: AtomicU64,
    downloaded: AtomicU64,
}

impl TransferCounters {
    fn record_upload(&self, bytes: u64) {
        let total = self.uploaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
        log::trace!("upload of {} bytes, {} total", bytes, total);
    }

    fn record_download(&self, bytes: u64) {
        let total = self.downloaded.fetch_add(bytes, Ordering::Relaxed) + bytes;
        log::trace!("readback of {} bytes, {} total", bytes, total);
    }

    /// (uploaded, downloaded)
    pub(crate) fn snapshot(&self) -> (u64, u64) {
        (
            self.uploaded.load(Ordering::Relaxed),
            self.downloaded.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn reset(&self) {
        self.uploaded.store(0, Ordering::Relaxed);
        self.downloaded.store(0, Ordering::Relaxed);
        log::info!("GPU transfer counters reset.");
    }
}

/// Device, queue, compiled kernels and transfer counters shared by every
/// buffer created on one `GpuDevice`.
#[derive(Debug, Clone)]
pub(crate) struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    pub(crate) kernels: Arc<Kernels>,
    pub(crate) transfers: Arc<TransferCounters>,
}

impl GpuContext {
    /// Requests an adapter and device and compiles every kernel.
    pub(crate) async fn new() -> Result<Self> {
        log::info!("Initializing WGPU context");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SlaeError::WgpuInitError(format!("No suitable adapter found: {}", e)))?;
        log::info!("Selected adapter: {:?}", adapter.get_info());

        let limits = wgpu::Limits::default().using_resolution(adapter.limits());
        if limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
            return Err(SlaeError::WgpuInitError(format!(
                "Adapter supports only {} storage buffers per stage, {} are required",
                limits.max_storage_buffers_per_shader_stage, REQUIRED_STORAGE_BUFFERS
            )));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("slae_core device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| SlaeError::WgpuInitError(format!("Failed to request device: {}", e)))?;

        let kernels = Kernels::new(&device);
        log::info!("GPU device ready, kernels compiled");

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            kernels: Arc::new(kernels),
            transfers: Arc::default(),
        })
    }

    /// Creates a buffer initialized with `contents`; counted as an upload.
    pub(crate) fn upload_buffer(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        log::debug!("Uploading buffer '{}' ({} bytes)", label, contents.len());
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        self.transfers.record_upload(contents.len() as u64);
        buffer
    }

    /// Overwrites the start of `buffer` with `data` through the queue.
    pub(crate) fn write_buffer<T: Pod>(&self, buffer: &wgpu::Buffer, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        if buffer.size() < bytes.len() as u64 {
            return Err(SlaeError::Internal(format!(
                "Cannot write {} bytes into a buffer of {}",
                bytes.len(),
                buffer.size()
            )));
        }
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_DST) {
            return Err(SlaeError::Internal(
                "Write target lacks COPY_DST usage".to_string(),
            ));
        }
        self.queue.write_buffer(buffer, 0, bytes);
        self.transfers.record_upload(bytes.len() as u64);
        Ok(())
    }

    /// Zero-filled device buffer; not a transfer.
    pub(crate) fn scratch_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Stages the first `len` values of `buffer`, waits for the map and hands
    /// the mapped slice to `f`. The staging buffer is always unmapped.
    pub(crate) async fn map_read<T: Pod, R>(
        &self,
        buffer: &wgpu::Buffer,
        len: usize,
        f: impl FnOnce(&[T]) -> R,
    ) -> Result<R> {
        let bytes = (len * std::mem::size_of::<T>()) as u64;
        if bytes == 0 {
            return Ok(f(&[]));
        }
        if buffer.size() < bytes {
            return Err(SlaeError::Internal(format!(
                "Cannot read {} bytes from a buffer of {}",
                bytes,
                buffer.size()
            )));
        }

        let staging = self.scratch_buffer(
            "readback staging",
            bytes,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |mapped| {
            // the receiver only goes away if the readback future was dropped
            let _ = tx.send(mapped);
        });
        self.transfers.record_download(bytes);

        self.device
            .poll(PollType::Wait)
            .map_err(|e| SlaeError::WgpuError(format!("Device poll failed: {}", e)))?;

        let mapped = rx.await.map_err(|_| {
            SlaeError::Internal("Map callback dropped before completing".to_string())
        })?;
        mapped.map_err(|e| SlaeError::WgpuError(format!("Buffer mapping failed: {}", e)))?;
        let result = f(bytemuck::cast_slice(&slice.get_mapped_range()));
        staging.unmap();
        Ok(result)
    }

    /// Reads the first `len` values of `buffer` back to the host.
    pub(crate) async fn read_buffer<T: Pod>(
        &self,
        buffer: &wgpu::Buffer,
        len: usize,
    ) -> Result<Vec<T>> {
        self.map_read(buffer, len, <[T]>::to_vec).await
    }
}
