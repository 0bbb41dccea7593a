//! One element of the frame ring and the buffers it owns.

use crate::backend::{
    BackendResult, BindGroupEntry, BindGroupHandle, BindGroupLayoutKind, BufferDescriptor,
    BufferHandle, BufferUsage, GraphicsBackend,
};

/// Lifecycle of a slot: `Idle → Recording → Submitted → (fence signaled) → Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

/// Host-visible buffer that is reallocated when a write does not fit
#[derive(Debug)]
pub struct GrowableBuffer {
    label: String,
    usage: BufferUsage,
    buffer: Option<BufferHandle>,
    capacity: u64,
}

impl GrowableBuffer {
    const MIN_CAPACITY: u64 = 4096;

    pub fn new(label: &str, usage: BufferUsage) -> Self {
        Self {
            label: label.to_string(),
            usage,
            buffer: None,
            capacity: 0,
        }
    }

    pub fn handle(&self) -> Option<BufferHandle> {
        self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Write `data` at offset 0, growing first if needed.
    ///
    /// Only call this while the owning slot is recording: the old allocation is destroyed
    /// immediately.
    pub fn write<B: GraphicsBackend>(&mut self, backend: &mut B, data: &[u8]) -> BackendResult<BufferHandle> {
        let needed = (data.len() as u64).max(1);
        let buffer = match self.buffer {
            Some(buffer) if self.capacity >= needed => buffer,
            old => {
                if let Some(old) = old {
                    backend.destroy_buffer(old);
                }
                let capacity = needed.next_power_of_two().max(Self::MIN_CAPACITY);
                log::debug!("Growing '{}' to {} bytes", self.label, capacity);
                let buffer =
                    backend.create_buffer(&BufferDescriptor::new(&self.label, capacity, self.usage))?;
                self.buffer = Some(buffer);
                self.capacity = capacity;
                buffer
            }
        };
        if !data.is_empty() {
            backend.write_buffer(buffer, 0, data)?;
        }
        Ok(buffer)
    }

    pub fn destroy<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(buffer) = self.buffer.take() {
            backend.destroy_buffer(buffer);
        }
        self.capacity = 0;
    }
}

/// Buffers exclusively owned by one slot between two `begin_frame` calls on it
#[derive(Debug)]
pub struct SlotResources {
    pub uniforms: BufferHandle,
    pub uniform_size: u64,
    /// Set 0 for every pipeline: binds `uniforms`
    pub globals: BindGroupHandle,
    pub ui_vertices: GrowableBuffer,
    pub ui_indices: GrowableBuffer,
    /// Source of texture uploads recorded into this slot's command buffer
    pub staging: GrowableBuffer,
}

impl SlotResources {
    fn create<B: GraphicsBackend>(backend: &mut B, index: usize, uniform_size: u64) -> BackendResult<Self> {
        let uniforms = backend.create_buffer(&BufferDescriptor::new(
            &format!("frame {index} uniforms"),
            uniform_size,
            BufferUsage::UNIFORM,
        ))?;
        let globals = backend.create_bind_group(
            BindGroupLayoutKind::FrameGlobals,
            &[(
                0,
                BindGroupEntry::Buffer {
                    buffer: uniforms,
                    offset: 0,
                    size: uniform_size,
                },
            )],
        )?;

        Ok(Self {
            uniforms,
            uniform_size,
            globals,
            ui_vertices: GrowableBuffer::new(&format!("frame {index} ui vertices"), BufferUsage::VERTEX),
            ui_indices: GrowableBuffer::new(&format!("frame {index} ui indices"), BufferUsage::INDEX),
            staging: GrowableBuffer::new(&format!("frame {index} staging"), BufferUsage::COPY_SRC),
        })
    }

    fn destroy<B: GraphicsBackend>(mut self, backend: &mut B) {
        backend.destroy_bind_group(self.globals);
        backend.destroy_buffer(self.uniforms);
        self.ui_vertices.destroy(backend);
        self.ui_indices.destroy(backend);
        self.staging.destroy(backend);
    }
}

/// Command buffer, fence and buffers for one frame in flight
#[derive(Debug)]
pub struct FrameSlot<B: GraphicsBackend> {
    index: usize,
    pub(crate) state: SlotState,
    pub(crate) command_buffer: B::CommandBuffer,
    pub(crate) fence: B::Fence,
    resources: SlotResources,
}

impl<B: GraphicsBackend> FrameSlot<B> {
    pub(crate) fn create(backend: &mut B, index: usize, uniform_size: u64) -> BackendResult<Self> {
        let command_buffer = backend.allocate_command_buffer()?;
        // Signaled so the first wait on a fresh slot returns at once
        let fence = backend.create_fence(true)?;
        let resources = SlotResources::create(backend, index, uniform_size)?;
        Ok(Self {
            index,
            state: SlotState::Idle,
            command_buffer,
            fence,
            resources,
        })
    }

    pub(crate) fn destroy(self, backend: &mut B) {
        backend.free_command_buffer(self.command_buffer);
        backend.destroy_fence(self.fence);
        self.resources.destroy(backend);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn command_buffer(&self) -> &B::CommandBuffer {
        &self.command_buffer
    }

    pub fn resources(&self) -> &SlotResources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut SlotResources {
        &mut self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, Extent2d};

    #[test]
    fn test_growable_buffer_reuses_capacity() {
        let mut backend = DummyBackend::new(Extent2d::new(4, 4));
        let mut buffer = GrowableBuffer::new("ui", BufferUsage::VERTEX);

        let first = buffer.write(&mut backend, &[1u8; 100]).unwrap();
        assert_eq!(buffer.capacity(), 4096);
        let second = buffer.write(&mut backend, &[2u8; 4000]).unwrap();
        assert_eq!(first, second);

        let grown = buffer.write(&mut backend, &[3u8; 5000]).unwrap();
        assert_ne!(first, grown);
        assert_eq!(buffer.capacity(), 8192);
        assert_eq!(backend.live_buffer_count(), 1);

        buffer.destroy(&mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
