use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::camera::device::Size;
use crate::error::CameraError;

/// NV21 carries 12 bits per pixel.
const NV21_BITS_PER_PIXEL: u64 = 12;

/// Byte size of one NV21 preview buffer, with one spare byte like the camera driver expects.
pub fn nv21_buffer_size(size: Size) -> usize {
    let bits = size.width as u64 * size.height as u64 * NV21_BITS_PER_PIXEL;
    (bits.div_ceil(8) + 1) as usize
}

/// Fixed arena of preview buffers. Each slot is either parked in the pool or on loan as a
/// [`PooledBuffer`], which parks it again when dropped.
#[derive(Clone)]
pub struct FrameBufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    buffer_size: usize,
    slots: Mutex<Vec<Option<Vec<u8>>>>,
}

impl FrameBufferPool {
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let slots = (0..count).map(|_| Some(vec![0u8; buffer_size])).collect();
        Self {
            inner: Arc::new(PoolInner {
                buffer_size,
                slots: Mutex::new(slots),
            }),
        }
    }

    pub fn for_preview(size: Size, count: usize) -> Result<Self, CameraError> {
        let buffer_size = nv21_buffer_size(size);
        if size.width == 0 || size.height == 0 {
            return Err(CameraError::BufferSize(buffer_size));
        }
        Ok(Self::new(count, buffer_size))
    }

    /// Lends out the lowest free slot, or `None` when every buffer is in use.
    pub fn acquire(&self) -> Option<PooledBuffer> {
        let mut slots = self.inner.slots.lock();
        let (index, data) = slots
            .iter_mut()
            .enumerate()
            .find_map(|(index, slot)| slot.take().map(|data| (index, data)))?;
        Some(PooledBuffer {
            index,
            data,
            pool: Arc::downgrade(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn available(&self) -> usize {
        self.inner.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Whether `buffer` was lent out by this pool rather than a previous session's.
    pub fn owns(&self, buffer: &PooledBuffer) -> bool {
        std::ptr::eq(buffer.pool.as_ptr(), Arc::as_ptr(&self.inner))
    }
}

/// A pool slot on loan.
pub struct PooledBuffer {
    index: usize,
    data: Vec<u8>,
    pool: Weak<PoolInner>,
}

impl PooledBuffer {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            let data = std::mem::take(&mut self.data);
            if let Some(slot) = pool.slots.lock().get_mut(self.index) {
                *slot = Some(data);
            }
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish()
    }
}
