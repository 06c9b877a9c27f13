// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use peniko::kurbo::{Point, Vec2};

use crate::draw::DrawType;
use crate::math::{point_to_f32, vec_to_f32};

/// Patch flavor a path is tessellated into.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PatchType {
    /// Standard paths: a fan of triangles from the contour midpoint.
    MidpointFan,
    /// Paths with an interior triangulation: only the outer curves are tessellated.
    OuterCurves,
}

impl PatchType {
    pub fn draw_type(self) -> DrawType {
        match self {
            Self::MidpointFan => DrawType::MidpointFanPatches,
            Self::OuterCurves => DrawType::OuterCurvePatches,
        }
    }

    pub fn segment_span(self) -> u32 {
        match self {
            Self::MidpointFan => crate::MIDPOINT_FAN_PATCH_SEGMENT_SPAN,
            Self::OuterCurves => crate::OUTER_CURVE_PATCH_SEGMENT_SPAN,
        }
    }
}

bitflags! {
    /// Flags stored in the upper bits of a span's contour ID.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContourFlags: u32 {
        /// The curve is a triangle of an interior triangulation squeezed into a patch.
        const RETROFITTED_TRIANGLE = 1 << 31;
        /// The shader may drop tessellation segments beyond the curve's own count.
        const CULL_EXCESS_TESSELLATION_SEGMENTS = 1 << 30;
        const MIRRORED_CONTOUR = 1 << 29;
        const ROUND_JOIN = 1 << 28;
        const MITER_JOIN = 1 << 27;
        /// The join is a stroke cap: a 180-degree turn onto a reversed copy of the curve.
        const EMULATED_STROKE_CAP = 1 << 26;
        /// A miter join clipped flat at the stroke radius, which is how square caps are drawn.
        const MITER_CLIP_JOIN = 1 << 25;
    }
}

/// One instance of a horizontal span of tessellated vertices, with an optional mirrored
/// reflection rendered right to left.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct TessVertexSpan {
    /// Cubic Bézier curve.
    pub pts: [[f32; 2]; 4],
    /// Ending tangent of the join that follows the cubic.
    pub join_tangent: [f32; 2],
    pub y: f32,
    pub reflection_y: f32,
    pub x0x1: i32,
    pub reflection_x0x1: i32,
    /// `[join:12 | polar:10 | parametric:10]`
    pub segment_counts: u32,
    pub contour_id_with_flags: u32,
}

/// Segment counts of one tessellated curve plus its trailing join.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SegmentCounts {
    pub parametric: u32,
    pub polar: u32,
    pub join: u32,
}

impl SegmentCounts {
    pub const fn new(parametric: u32, polar: u32, join: u32) -> Self {
        Self {
            parametric,
            polar,
            join,
        }
    }

    /// Tessellation vertices contributed by the curve and its join.
    ///
    /// Parametric and polar segments share their end vertices, and the join's first vertex is the
    /// curve's last one.
    pub const fn vertex_count(&self) -> u32 {
        self.parametric + self.polar + self.join - 1
    }

    fn pack(&self) -> u32 {
        debug_assert!(self.parametric <= crate::MAX_PARAMETRIC_SEGMENTS);
        debug_assert!(self.polar <= crate::MAX_POLAR_SEGMENTS);
        (self.join << 20) | (self.polar << 10) | self.parametric
    }
}

impl TessVertexSpan {
    /// A span without a reflection.
    pub fn new(
        pts: &[Point; 4],
        join_tangent: Vec2,
        y: f32,
        x0: i32,
        x1: i32,
        segments: SegmentCounts,
        contour_id_with_flags: u32,
    ) -> Self {
        // NaN discards the reflection.
        Self::with_reflection(
            pts,
            join_tangent,
            (y, x0, x1),
            (f32::NAN, -1, -1),
            segments,
            contour_id_with_flags,
        )
    }

    /// A span together with its mirrored reflection; each location is `(y, x0, x1)`.
    pub fn with_reflection(
        pts: &[Point; 4],
        join_tangent: Vec2,
        (y, x0, x1): (f32, i32, i32),
        (reflection_y, reflection_x0, reflection_x1): (f32, i32, i32),
        segments: SegmentCounts,
        contour_id_with_flags: u32,
    ) -> Self {
        let span = Self {
            pts: pts.map(point_to_f32),
            join_tangent: vec_to_f32(join_tangent),
            y,
            reflection_y,
            x0x1: pack_x0x1(x0, x1),
            reflection_x0x1: pack_x0x1(reflection_x0, reflection_x1),
            segment_counts: segments.pack(),
            contour_id_with_flags,
        };
        debug_assert_eq!(span.x0(), x0);
        debug_assert_eq!(span.x1(), x1);
        span
    }

    pub fn x0(&self) -> i32 {
        (self.x0x1 << 16) >> 16
    }

    pub fn x1(&self) -> i32 {
        self.x0x1 >> 16
    }

    pub fn reflection_x0(&self) -> i32 {
        (self.reflection_x0x1 << 16) >> 16
    }

    pub fn reflection_x1(&self) -> i32 {
        self.reflection_x0x1 >> 16
    }

    pub fn has_reflection(&self) -> bool {
        !self.reflection_y.is_nan()
    }

    pub fn segments(&self) -> SegmentCounts {
        SegmentCounts {
            parametric: self.segment_counts & 0x3ff,
            polar: (self.segment_counts >> 10) & 0x3ff,
            join: self.segment_counts >> 20,
        }
    }

    pub fn contour_id(&self) -> u32 {
        self.contour_id_with_flags & crate::CONTOUR_ID_MASK
    }
}

fn pack_x0x1(x0: i32, x1: i32) -> i32 {
    (x1 << 16) | (x0 & 0xffff)
}
