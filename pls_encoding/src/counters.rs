// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource counters accumulated while recording, and the allocation sizes derived from them.

use std::ops::{Add, AddAssign};

use crate::config::BufferSize;
use crate::gradient::{GradientSpan, TwoTexelRamp};
use crate::path::{ContourData, PaintAuxData, PaintData, PathData, TriangleVertex};
use crate::tess::TessVertexSpan;
use crate::uniforms::{FlushUniforms, ImageDrawUniforms};
use crate::{GRAD_TEXTURE_WIDTH, MAX_TEXTURE_HEIGHT, TESS_TEXTURE_WIDTH};

/// Running totals of the GPU resources a set of draws needs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounters {
    pub midpoint_fan_tess_vertex_count: usize,
    pub outer_cubic_tess_vertex_count: usize,
    pub path_count: usize,
    pub contour_count: usize,
    /// Upper bound on tessellation spans; lines in the texture are accounted for at layout.
    pub max_tessellated_segment_count: usize,
    pub max_triangle_vertex_count: usize,
    pub image_draw_count: usize,
    pub complex_gradient_span_count: usize,
}

impl ResourceCounters {
    pub fn tess_vertex_count(&self) -> usize {
        self.midpoint_fan_tess_vertex_count + self.outer_cubic_tess_vertex_count
    }
}

impl Add for ResourceCounters {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for ResourceCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.midpoint_fan_tess_vertex_count += rhs.midpoint_fan_tess_vertex_count;
        self.outer_cubic_tess_vertex_count += rhs.outer_cubic_tess_vertex_count;
        self.path_count += rhs.path_count;
        self.contour_count += rhs.contour_count;
        self.max_tessellated_segment_count += rhs.max_tessellated_segment_count;
        self.max_triangle_vertex_count += rhs.max_triangle_vertex_count;
        self.image_draw_count += rhs.image_draw_count;
        self.complex_gradient_span_count += rhs.complex_gradient_span_count;
    }
}

impl std::iter::Sum for ResourceCounters {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Padding and texture heights accumulated across the flushes of a frame during layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutCounters {
    pub path_padding_count: usize,
    pub paint_padding_count: usize,
    pub paint_aux_padding_count: usize,
    pub contour_padding_count: usize,
    pub simple_grad_count: usize,
    pub max_grad_texture_height: usize,
    pub max_tess_texture_height: usize,
}

/// Element counts of every GPU buffer, plus the heights of the two resource textures.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceAllocationCounts {
    pub flush_uniform_buffer_count: usize,
    pub image_draw_uniform_buffer_count: usize,
    pub path_buffer_count: usize,
    pub paint_buffer_count: usize,
    pub paint_aux_buffer_count: usize,
    pub contour_buffer_count: usize,
    pub simple_gradient_buffer_count: usize,
    pub complex_grad_span_buffer_count: usize,
    pub tess_span_buffer_count: usize,
    pub triangle_vertex_buffer_count: usize,
    pub grad_texture_height: usize,
    pub tess_texture_height: usize,
}

impl ResourceAllocationCounts {
    const FIELD_COUNT: usize = 12;

    fn to_array(self) -> [usize; Self::FIELD_COUNT] {
        [
            self.flush_uniform_buffer_count,
            self.image_draw_uniform_buffer_count,
            self.path_buffer_count,
            self.paint_buffer_count,
            self.paint_aux_buffer_count,
            self.contour_buffer_count,
            self.simple_gradient_buffer_count,
            self.complex_grad_span_buffer_count,
            self.tess_span_buffer_count,
            self.triangle_vertex_buffer_count,
            self.grad_texture_height,
            self.tess_texture_height,
        ]
    }

    fn from_array(a: [usize; Self::FIELD_COUNT]) -> Self {
        Self {
            flush_uniform_buffer_count: a[0],
            image_draw_uniform_buffer_count: a[1],
            path_buffer_count: a[2],
            paint_buffer_count: a[3],
            paint_aux_buffer_count: a[4],
            contour_buffer_count: a[5],
            simple_gradient_buffer_count: a[6],
            complex_grad_span_buffer_count: a[7],
            tess_span_buffer_count: a[8],
            triangle_vertex_buffer_count: a[9],
            grad_texture_height: a[10],
            tess_texture_height: a[11],
        }
    }

    fn zip_with(self, other: Self, f: impl Fn(usize, usize) -> usize) -> Self {
        let (a, b) = (self.to_array(), other.to_array());
        Self::from_array(std::array::from_fn(|i| f(a[i], b[i])))
    }

    fn map(self, f: impl Fn(usize) -> usize) -> Self {
        Self::from_array(self.to_array().map(f))
    }

    /// Componentwise maximum.
    pub fn max(self, other: Self) -> Self {
        self.zip_with(other, usize::max)
    }

    /// True if every count is no larger than the matching count in `other`.
    pub fn fits_within(&self, other: &Self) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array())
            .all(|(a, b)| *a <= b)
    }

    /// Componentwise `count * num / den`.
    pub fn scale(self, num: usize, den: usize) -> Self {
        self.map(|count| count * num / den)
    }

    /// Keeps the counts from `self` where they already cover `required`, and grows the rest to
    /// `required * num / den`.
    pub fn grow_to_fit(self, required: Self, num: usize, den: usize) -> Self {
        self.zip_with(required, |current, required| {
            if required <= current {
                current
            } else {
                required * num / den
            }
        })
    }

    /// Shrinks each count whose `recent` high-water mark has fallen to two thirds of it or
    /// less, leaving 25% headroom over the mark.
    pub fn shrink_toward(self, recent: Self) -> Self {
        self.zip_with(recent, |current, recent| {
            if recent <= current * 2 / 3 {
                recent * 5 / 4
            } else {
                current
            }
        })
    }

    /// Resource textures never exceed [`MAX_TEXTURE_HEIGHT`].
    pub fn clamp_texture_heights(mut self) -> Self {
        let max = MAX_TEXTURE_HEIGHT as usize;
        self.grad_texture_height = self.grad_texture_height.min(max);
        self.tess_texture_height = self.tess_texture_height.min(max);
        self
    }

    pub fn memory(&self) -> AllocationMemory {
        let flush_uniforms = BufferSize::new(self.flush_uniform_buffer_count);
        let image_draw_uniforms = BufferSize::new(self.image_draw_uniform_buffer_count);
        let paths = BufferSize::new(self.path_buffer_count);
        let paints = BufferSize::new(self.paint_buffer_count);
        let paint_auxes = BufferSize::new(self.paint_aux_buffer_count);
        let contours = BufferSize::new(self.contour_buffer_count);
        let simple_ramps = BufferSize::new(self.simple_gradient_buffer_count);
        let grad_spans = BufferSize::new(self.complex_grad_span_buffer_count);
        let tess_spans = BufferSize::new(self.tess_span_buffer_count);
        let triangle_vertices = BufferSize::new(self.triangle_vertex_buffer_count);
        // RGBA8 gradient texels and RGBA32UI tessellation texels.
        let grad_texture = GRAD_TEXTURE_WIDTH as usize * self.grad_texture_height * 4;
        let tess_texture = TESS_TEXTURE_WIDTH as usize * self.tess_texture_height * 16;
        AllocationMemory {
            total: flush_uniforms.size_in_bytes()
                + image_draw_uniforms.size_in_bytes()
                + paths.size_in_bytes()
                + paints.size_in_bytes()
                + paint_auxes.size_in_bytes()
                + contours.size_in_bytes()
                + simple_ramps.size_in_bytes()
                + grad_spans.size_in_bytes()
                + tess_spans.size_in_bytes()
                + triangle_vertices.size_in_bytes()
                + grad_texture
                + tess_texture,
            flush_uniforms,
            image_draw_uniforms,
            paths,
            paints,
            paint_auxes,
            contours,
            simple_ramps,
            grad_spans,
            tess_spans,
            triangle_vertices,
            grad_texture,
            tess_texture,
        }
    }
}

/// Byte sizes of a [`ResourceAllocationCounts`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationMemory {
    pub total: usize,
    pub flush_uniforms: BufferSize<FlushUniforms>,
    pub image_draw_uniforms: BufferSize<ImageDrawUniforms>,
    pub paths: BufferSize<PathData>,
    pub paints: BufferSize<PaintData>,
    pub paint_auxes: BufferSize<PaintAuxData>,
    pub contours: BufferSize<ContourData>,
    pub simple_ramps: BufferSize<TwoTexelRamp>,
    pub grad_spans: BufferSize<GradientSpan>,
    pub tess_spans: BufferSize<TessVertexSpan>,
    pub triangle_vertices: BufferSize<TriangleVertex>,
    pub grad_texture: usize,
    pub tess_texture: usize,
}

impl std::fmt::Display for AllocationMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "\n \
                 \tTotal:\t\t\t{} bytes ({:.2} KB | {:.2} MB)\n\
                 \tFlush uniforms:\t\t{} elements ({} bytes)\n\
                 \tImage draws:\t\t{} elements ({} bytes)\n\
                 \tPaths:\t\t\t{} elements ({} bytes)\n\
                 \tPaints:\t\t\t{} elements ({} bytes)\n\
                 \tPaint aux:\t\t{} elements ({} bytes)\n\
                 \tContours:\t\t{} elements ({} bytes)\n\
                 \tSimple ramps:\t\t{} elements ({} bytes)\n\
                 \tGradient spans:\t\t{} elements ({} bytes)\n\
                 \tTess spans:\t\t{} elements ({} bytes)\n\
                 \tTriangle vertices:\t{} elements ({} bytes)\n\
                 \tGradient texture:\t{} bytes\n\
                 \tTess texture:\t\t{} bytes",
            self.total,
            self.total as f32 / (1 << 10) as f32,
            self.total as f32 / (1 << 20) as f32,
            self.flush_uniforms.len(),
            self.flush_uniforms.size_in_bytes(),
            self.image_draw_uniforms.len(),
            self.image_draw_uniforms.size_in_bytes(),
            self.paths.len(),
            self.paths.size_in_bytes(),
            self.paints.len(),
            self.paints.size_in_bytes(),
            self.paint_auxes.len(),
            self.paint_auxes.size_in_bytes(),
            self.contours.len(),
            self.contours.size_in_bytes(),
            self.simple_ramps.len(),
            self.simple_ramps.size_in_bytes(),
            self.grad_spans.len(),
            self.grad_spans.size_in_bytes(),
            self.tess_spans.len(),
            self.tess_spans.size_in_bytes(),
            self.triangle_vertices.len(),
            self.triangle_vertices.size_in_bytes(),
            self.grad_texture,
            self.tess_texture,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocs(path: usize, tess_height: usize) -> ResourceAllocationCounts {
        ResourceAllocationCounts {
            path_buffer_count: path,
            tess_texture_height: tess_height,
            ..Default::default()
        }
    }

    #[test]
    fn counters_add_componentwise() {
        let a = ResourceCounters {
            path_count: 1,
            contour_count: 2,
            ..Default::default()
        };
        let b = ResourceCounters {
            path_count: 3,
            complex_gradient_span_count: 4,
            ..Default::default()
        };
        let sum = a + b;
        assert_eq!(sum.path_count, 4);
        assert_eq!(sum.contour_count, 2);
        assert_eq!(sum.complex_gradient_span_count, 4);
        assert_eq!([a, b].into_iter().sum::<ResourceCounters>(), sum);
    }

    #[test]
    fn allocation_arithmetic() {
        let a = allocs(10, 4);
        let b = allocs(20, 1);
        assert_eq!(a.max(b), allocs(20, 4));
        assert!(allocs(10, 1).fits_within(&a));
        assert!(!b.fits_within(&a));
        assert_eq!(b.scale(5, 4), allocs(25, 1));
        assert_eq!(a.grow_to_fit(b, 5, 4), allocs(25, 4));
        assert_eq!(allocs(0, 5000).clamp_texture_heights(), allocs(0, 2048));
    }

    #[test]
    fn shrink_keeps_headroom() {
        let current = allocs(300, 9);
        // 100 <= 200 shrinks; 8 > 6 stays.
        assert_eq!(current.shrink_toward(allocs(100, 8)), allocs(125, 9));
        assert_eq!(current.shrink_toward(current), current);
    }

    #[test]
    fn memory_report() {
        let memory = allocs(8, 1).memory();
        assert_eq!(memory.paths.size_in_bytes(), 8 * 32);
        assert_eq!(memory.tess_texture, 2048 * 16);
        assert_eq!(memory.total, 8 * 32 + 2048 * 16);
        assert!(memory.to_string().contains("Paths"));
    }
}
