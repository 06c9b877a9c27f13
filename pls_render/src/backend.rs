// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The contract between the render context and a GPU API.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use pls_encoding::PlatformFeatures;

use crate::buffers::BufferKind;
use crate::flush::FlushDescriptor;

/// Unique identifier for a backend resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(pub NonZeroU64);

impl ResourceId {
    pub fn next() -> Self {
        // Starts at 1 so every value is nonzero.
        static ID_COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }
}

/// Handle to an image texture that lives on the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageTexture {
    pub id: ResourceId,
    pub width: u32,
    pub height: u32,
}

impl ImageTexture {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: ResourceId::next(),
            width,
            height,
        }
    }
}

/// Implemented by each GPU API.
///
/// The render context decides how big every buffer and texture should be and what goes in them.
/// A backend only has to allocate what it is told to, accept the bytes written into each buffer
/// between map and unmap, and execute one [`FlushDescriptor`] per logical flush.
///
/// Every method is called from the thread that owns the context.
pub trait RenderContextImpl {
    /// Backend specific handles passed through to [`RenderContextImpl::flush`], such as the render
    /// target, an external command buffer, or a completion fence.
    type FlushResources;

    fn platform_features(&self) -> PlatformFeatures;

    /// Reallocates the buffer of the given kind. A size of zero releases it.
    fn resize_buffer(&mut self, kind: BufferKind, size_in_bytes: usize);

    fn resize_gradient_texture(&mut self, width: u32, height: u32);

    fn resize_tessellation_texture(&mut self, width: u32, height: u32);

    /// Called once per frame before any buffer is mapped, for backends that have to wait on the
    /// GPU before reusing their buffers.
    fn prepare_to_map_buffers(&mut self) {}

    /// Receives everything written to one buffer for the whole frame.
    fn unmap_buffer(&mut self, kind: BufferKind, contents: &[u8]);

    /// Executes one logical flush. Called in the order the flushes were created.
    fn flush(&mut self, desc: &FlushDescriptor, resources: &Self::FlushResources);

    /// Monotonic time in seconds, used to decide when to trim resource allocations.
    fn seconds_now(&self) -> f64;

    /// Uploads RGBA8 pixels, `width * height * 4` bytes, into a new image texture.
    fn make_image_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> ImageTexture;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert_ne!(ImageTexture::new(1, 1).id, ImageTexture::new(1, 1).id);
    }
}
