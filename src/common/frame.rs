use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::camera::buffer_pool::PooledBuffer;
use crate::common::input::ImageSource;

/// Clockwise rotation that turns a sensor image upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalises any multiple of 90 degrees; other angles snap down to the previous quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) / 90 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Rotation needed for a back-facing sensor mounted at `sensor_orientation` while the
    /// display is turned by `device_rotation`.
    pub fn for_camera(sensor_orientation: u32, device_rotation: u32) -> Self {
        Self::from_degrees(sensor_orientation as i32 - device_rotation as i32 + 360)
    }

    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

impl FrameMetadata {
    pub fn new(width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            rotation,
        }
    }

    /// Dimensions of the image once rotated upright.
    pub fn upright_size(&self) -> (u32, u32) {
        if self.rotation.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// A captured NV21 preview frame. Cloning shares the underlying pool buffer, which goes back to
/// the pool once the last clone is dropped.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

struct FrameInner {
    id: u64,
    buffer: PooledBuffer,
    metadata: FrameMetadata,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(id: u64, buffer: PooledBuffer, metadata: FrameMetadata) -> Self {
        Self {
            inner: Arc::new(FrameInner {
                id,
                buffer,
                metadata,
                captured_at: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn metadata(&self) -> FrameMetadata {
        self.inner.metadata
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.inner.captured_at
    }

    pub fn buffer_index(&self) -> usize {
        self.inner.buffer.index()
    }

    pub fn data(&self) -> &[u8] {
        self.inner.buffer.as_slice()
    }

    /// The Y plane, one byte per pixel in sensor orientation.
    pub fn luma(&self) -> &[u8] {
        let len = (self.inner.metadata.width * self.inner.metadata.height) as usize;
        let data = self.data();
        &data[..len.min(data.len())]
    }

    /// Copies the pixels out of the pool buffer so they can outlive the frame.
    pub fn snapshot(&self) -> ImageSource {
        ImageSource::Nv21 {
            pixels: Bytes::copy_from_slice(self.data()),
            metadata: self.inner.metadata,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.inner.id)
            .field("buffer", &self.inner.buffer.index())
            .field("metadata", &self.inner.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::buffer_pool::FrameBufferPool;

    #[test]
    fn cloning_frame_shares_pool_buffer() {
        let pool = FrameBufferPool::new(1, 16);
        let frame = Frame::new(
            1,
            pool.acquire().unwrap(),
            FrameMetadata::new(4, 2, Rotation::Deg0),
        );
        let copy = frame.clone();
        assert!(Arc::ptr_eq(&frame.inner, &copy.inner));
        assert_eq!(pool.available(), 0);

        drop(frame);
        assert_eq!(pool.available(), 0);
        drop(copy);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn snapshot_releases_dependence_on_pool() {
        let pool = FrameBufferPool::new(1, 16);
        let frame = Frame::new(
            7,
            pool.acquire().unwrap(),
            FrameMetadata::new(4, 2, Rotation::Deg90),
        );
        let snapshot = frame.snapshot();
        drop(frame);
        assert_eq!(pool.available(), 1);
        assert_eq!(snapshot.upright_size(), (2, 4));
    }

    #[test]
    fn camera_rotation_follows_sensor_and_display() {
        assert_eq!(Rotation::for_camera(90, 0), Rotation::Deg90);
        assert_eq!(Rotation::for_camera(90, 90), Rotation::Deg0);
        assert_eq!(Rotation::for_camera(270, 180), Rotation::Deg90);
        assert_eq!(Rotation::for_camera(0, 270), Rotation::Deg90);
    }
}
