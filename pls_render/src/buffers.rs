// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU-side staging for the GPU buffers a frame writes.

use bytemuck::{Pod, Zeroable};
use pls_encoding::{
    ContourData, FlushUniforms, GradientSpan, ImageDrawUniforms, PaintAuxData, PaintData,
    PathData, ResourceAllocationCounts, TessVertexSpan, TriangleVertex, TwoTexelRamp,
};

/// Identifies one of the GPU buffers owned by the render context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    FlushUniforms,
    ImageDrawUniforms,
    Paths,
    Paints,
    PaintAuxes,
    Contours,
    SimpleColorRamps,
    GradientSpans,
    TessVertexSpans,
    TriangleVertices,
}

impl BufferKind {
    pub const ALL: [Self; 10] = [
        Self::FlushUniforms,
        Self::ImageDrawUniforms,
        Self::Paths,
        Self::Paints,
        Self::PaintAuxes,
        Self::Contours,
        Self::SimpleColorRamps,
        Self::GradientSpans,
        Self::TessVertexSpans,
        Self::TriangleVertices,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FlushUniforms => "flush_uniforms",
            Self::ImageDrawUniforms => "image_draw_uniforms",
            Self::Paths => "paths",
            Self::Paints => "paints",
            Self::PaintAuxes => "paint_auxes",
            Self::Contours => "contours",
            Self::SimpleColorRamps => "simple_color_ramps",
            Self::GradientSpans => "gradient_spans",
            Self::TessVertexSpans => "tess_vertex_spans",
            Self::TriangleVertices => "triangle_vertices",
        }
    }

    pub fn element_size(self) -> usize {
        match self {
            Self::FlushUniforms => size_of::<FlushUniforms>(),
            Self::ImageDrawUniforms => size_of::<ImageDrawUniforms>(),
            Self::Paths => size_of::<PathData>(),
            Self::Paints => size_of::<PaintData>(),
            Self::PaintAuxes => size_of::<PaintAuxData>(),
            Self::Contours => size_of::<ContourData>(),
            Self::SimpleColorRamps => size_of::<TwoTexelRamp>(),
            Self::GradientSpans => size_of::<GradientSpan>(),
            Self::TessVertexSpans => size_of::<TessVertexSpan>(),
            Self::TriangleVertices => size_of::<TriangleVertex>(),
        }
    }

    /// Element count of this buffer in `allocs`.
    pub fn count_in(self, allocs: &ResourceAllocationCounts) -> usize {
        match self {
            Self::FlushUniforms => allocs.flush_uniform_buffer_count,
            Self::ImageDrawUniforms => allocs.image_draw_uniform_buffer_count,
            Self::Paths => allocs.path_buffer_count,
            Self::Paints => allocs.paint_buffer_count,
            Self::PaintAuxes => allocs.paint_aux_buffer_count,
            Self::Contours => allocs.contour_buffer_count,
            Self::SimpleColorRamps => allocs.simple_gradient_buffer_count,
            Self::GradientSpans => allocs.complex_grad_span_buffer_count,
            Self::TessVertexSpans => allocs.tess_span_buffer_count,
            Self::TriangleVertices => allocs.triangle_vertex_buffer_count,
        }
    }
}

/// Write-only view of one mapped GPU buffer.
///
/// Records are staged on the CPU between map and unmap, and handed to the backend as bytes when
/// the buffer is unmapped. Nothing in the context ever reads them back.
#[derive(Debug)]
pub struct MappedBuffer<T: Pod> {
    data: Vec<T>,
    capacity: usize,
    mapped: bool,
}

impl<T: Pod> Default for MappedBuffer<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            capacity: 0,
            mapped: false,
        }
    }
}

impl<T: Pod> MappedBuffer<T> {
    /// Maps room for `capacity` elements, discarding whatever was written before.
    pub fn map(&mut self, capacity: usize) {
        debug_assert!(!self.mapped, "buffer is already mapped");
        self.data.clear();
        self.data.reserve(capacity);
        self.capacity = capacity;
        self.mapped = true;
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn has_room_for(&self, count: usize) -> bool {
        self.data.len() + count <= self.capacity
    }

    pub fn push(&mut self, item: T) {
        debug_assert!(self.mapped, "write to an unmapped buffer");
        debug_assert!(self.has_room_for(1), "mapped buffer overflow");
        self.data.push(item);
    }

    pub fn extend_from_slice(&mut self, items: &[T]) {
        debug_assert!(self.mapped, "write to an unmapped buffer");
        debug_assert!(self.has_room_for(items.len()), "mapped buffer overflow");
        self.data.extend_from_slice(items);
    }

    /// Appends `count` zeroed elements.
    pub fn push_zeroed(&mut self, count: usize) {
        debug_assert!(self.has_room_for(count), "mapped buffer overflow");
        self.data
            .resize(self.data.len() + count, Zeroable::zeroed());
    }

    /// Leaves one element untouched by the CPU.
    pub fn skip_back(&mut self) {
        self.push_zeroed(1);
    }

    pub fn elements_written(&self) -> usize {
        self.data.len()
    }

    pub fn bytes_written(&self) -> usize {
        self.data.len() * size_of::<T>()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Ends the mapping. The written contents stay readable until the next map.
    pub fn unmap(&mut self) -> &[u8] {
        self.mapped = false;
        self.as_bytes()
    }

    /// Drops the staging memory.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.capacity = 0;
        self.mapped = false;
    }
}

/// Staging for every GPU buffer written during a flush.
#[derive(Debug, Default)]
pub struct ResourceBuffers {
    pub flush_uniforms: MappedBuffer<FlushUniforms>,
    pub image_draw_uniforms: MappedBuffer<ImageDrawUniforms>,
    pub paths: MappedBuffer<PathData>,
    pub paints: MappedBuffer<PaintData>,
    pub paint_auxes: MappedBuffer<PaintAuxData>,
    pub contours: MappedBuffer<ContourData>,
    pub simple_color_ramps: MappedBuffer<TwoTexelRamp>,
    pub gradient_spans: MappedBuffer<GradientSpan>,
    pub tess_spans: MappedBuffer<TessVertexSpan>,
    pub triangle_vertices: MappedBuffer<TriangleVertex>,
}

impl ResourceBuffers {
    /// Maps every buffer with room for the counts in `allocs`.
    pub fn map_all(&mut self, allocs: &ResourceAllocationCounts) {
        self.flush_uniforms.map(allocs.flush_uniform_buffer_count);
        self.image_draw_uniforms
            .map(allocs.image_draw_uniform_buffer_count);
        self.paths.map(allocs.path_buffer_count);
        self.paints.map(allocs.paint_buffer_count);
        self.paint_auxes.map(allocs.paint_aux_buffer_count);
        self.contours.map(allocs.contour_buffer_count);
        self.simple_color_ramps
            .map(allocs.simple_gradient_buffer_count);
        self.gradient_spans
            .map(allocs.complex_grad_span_buffer_count);
        self.tess_spans.map(allocs.tess_span_buffer_count);
        self.triangle_vertices
            .map(allocs.triangle_vertex_buffer_count);
    }

    /// Unmaps every buffer and hands its written bytes to `f`.
    pub fn unmap_all(&mut self, mut f: impl FnMut(BufferKind, &[u8])) {
        f(BufferKind::FlushUniforms, self.flush_uniforms.unmap());
        f(BufferKind::ImageDrawUniforms, self.image_draw_uniforms.unmap());
        f(BufferKind::Paths, self.paths.unmap());
        f(BufferKind::Paints, self.paints.unmap());
        f(BufferKind::PaintAuxes, self.paint_auxes.unmap());
        f(BufferKind::Contours, self.contours.unmap());
        f(BufferKind::SimpleColorRamps, self.simple_color_ramps.unmap());
        f(BufferKind::GradientSpans, self.gradient_spans.unmap());
        f(BufferKind::TessVertexSpans, self.tess_spans.unmap());
        f(BufferKind::TriangleVertices, self.triangle_vertices.unmap());
    }

    pub fn elements_written(&self, kind: BufferKind) -> usize {
        match kind {
            BufferKind::FlushUniforms => self.flush_uniforms.elements_written(),
            BufferKind::ImageDrawUniforms => self.image_draw_uniforms.elements_written(),
            BufferKind::Paths => self.paths.elements_written(),
            BufferKind::Paints => self.paints.elements_written(),
            BufferKind::PaintAuxes => self.paint_auxes.elements_written(),
            BufferKind::Contours => self.contours.elements_written(),
            BufferKind::SimpleColorRamps => self.simple_color_ramps.elements_written(),
            BufferKind::GradientSpans => self.gradient_spans.elements_written(),
            BufferKind::TessVertexSpans => self.tess_spans.elements_written(),
            BufferKind::TriangleVertices => self.triangle_vertices.elements_written(),
        }
    }

    pub fn release(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_lifecycle() {
        let mut buffer = MappedBuffer::<u32>::default();
        buffer.map(4);
        buffer.push(7);
        buffer.skip_back();
        buffer.push_zeroed(2);
        assert!(!buffer.has_room_for(1));
        assert_eq!(buffer.elements_written(), 4);
        assert_eq!(buffer.bytes_written(), 16);
        let bytes = buffer.unmap().to_vec();
        assert_eq!(&bytes[..4], &7_u32.to_ne_bytes());
        assert!(!buffer.is_mapped());
        // Mapping again starts from scratch.
        buffer.map(1);
        assert_eq!(buffer.elements_written(), 0);
    }

    #[test]
    fn buffer_kinds_cover_allocations() {
        let allocs = ResourceAllocationCounts {
            contour_buffer_count: 3,
            tess_span_buffer_count: 9,
            ..Default::default()
        };
        assert_eq!(BufferKind::Contours.count_in(&allocs), 3);
        assert_eq!(BufferKind::TessVertexSpans.count_in(&allocs), 9);
        assert_eq!(BufferKind::TessVertexSpans.element_size(), 64);
        let mut names: Vec<_> = BufferKind::ALL.iter().map(|k| k.name()).collect();
        names.dedup();
        assert_eq!(names.len(), BufferKind::ALL.len());
    }
}
