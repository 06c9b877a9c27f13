// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Placement of tessellation vertices in the tessellation texture.
//!
//! The texture is addressed as one long run of vertices, [`TESS_TEXTURE_WIDTH`] per row. Midpoint
//! fan patches start after one patch of padding, outer curve patches follow on a patch boundary,
//! and a single padding vertex closes the texture so the final contour has something to wrap
//! into. Spans that run off the right edge of a row are written again one row down, shifted left
//! by a full row.

use peniko::kurbo::{Point, Vec2};
use pls_encoding::{
    padding_to_align_up, resource_texture_height, ContourData, PatchType, SegmentCounts,
    TessVertexSpan, MAX_CONTOUR_ID, MAX_TESSELLATION_VERTEX_COUNT,
    MIDPOINT_FAN_PATCH_SEGMENT_SPAN, OUTER_CURVE_PATCH_SEGMENT_SPAN, TESS_TEXTURE_WIDTH,
};

use crate::buffers::MappedBuffer;

const WIDTH: i32 = TESS_TEXTURE_WIDTH as i32;

/// Contour ID used by padding spans. Real contour IDs start at 1.
const INVALID_CONTOUR_ID: u32 = 0;

/// Where each section of a flush's tessellation vertices lives.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TessLayout {
    pub midpoint_fan_start: u32,
    pub midpoint_fan_end: u32,
    pub outer_cubic_start: u32,
    pub outer_cubic_end: u32,
    /// Rows of the tessellation texture the flush touches.
    pub height: u32,
}

impl TessLayout {
    pub fn new(midpoint_fan_vertex_count: usize, outer_cubic_vertex_count: usize) -> Self {
        if midpoint_fan_vertex_count == 0 && outer_cubic_vertex_count == 0 {
            return Self::default();
        }
        let midpoint_fan_start = MIDPOINT_FAN_PATCH_SEGMENT_SPAN;
        let midpoint_fan_end = midpoint_fan_start + midpoint_fan_vertex_count as u32;
        let outer_cubic_start = midpoint_fan_end
            + padding_to_align_up(
                midpoint_fan_end as usize,
                OUTER_CURVE_PATCH_SEGMENT_SPAN as usize,
            ) as u32;
        let outer_cubic_end = outer_cubic_start + outer_cubic_vertex_count as u32;
        let layout = Self {
            midpoint_fan_start,
            midpoint_fan_end,
            outer_cubic_start,
            outer_cubic_end,
            height: 0,
        };
        let total = layout.total_vertex_count();
        debug_assert!(total <= MAX_TESSELLATION_VERTEX_COUNT);
        Self {
            height: resource_texture_height(total as usize, TESS_TEXTURE_WIDTH as usize) as u32,
            ..layout
        }
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    /// Every vertex the flush writes, including the trailing padding vertex.
    pub fn total_vertex_count(&self) -> u32 {
        if self.outer_cubic_end == 0 {
            0
        } else {
            self.outer_cubic_end + 1
        }
    }

    /// Upper bound on the number of extra spans created by wrapping at row ends.
    pub fn max_span_break_count(&self) -> usize {
        self.height.saturating_sub(1) as usize
    }
}

/// Where a path's patches were placed, as seen by its draw batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PathPlacement {
    pub path_id: u32,
    pub base_instance: u32,
    pub instance_count: u32,
}

/// Write cursor state for the tessellation spans of one logical flush.
#[derive(Debug, Default)]
pub struct TessellationWriter {
    layout: TessLayout,
    midpoint_fan_cursor: u32,
    outer_cubic_cursor: u32,
    /// Forward write location of the current path.
    path_location: u32,
    /// Reflected write location of the current path, moving backward.
    mirrored_location: u32,
    expected_path_end: u32,
    expected_mirrored_end: u32,
    contour_padding: u32,
    path_id: u32,
    contour_id: u32,
    stroked: bool,
    mirrored: bool,
}

impl TessellationWriter {
    pub fn new(layout: TessLayout) -> Self {
        Self {
            layout,
            midpoint_fan_cursor: layout.midpoint_fan_start,
            outer_cubic_cursor: layout.outer_cubic_start,
            ..Default::default()
        }
    }

    pub fn layout(&self) -> &TessLayout {
        &self.layout
    }

    pub fn path_id(&self) -> u32 {
        self.path_id
    }

    pub fn contour_id(&self) -> u32 {
        self.contour_id
    }

    /// Writes the three runs of padding vertices that frame the patch sections.
    pub fn write_padding(&mut self, out: &mut MappedBuffer<TessVertexSpan>) {
        if self.layout.is_empty() {
            return;
        }
        let layout = self.layout;
        self.push_padding_vertices(out, 0, MIDPOINT_FAN_PATCH_SEGMENT_SPAN);
        self.push_padding_vertices(
            out,
            layout.midpoint_fan_end,
            layout.outer_cubic_start - layout.midpoint_fan_end,
        );
        // The last vertex of each contour crosses into the next one, so the final contour needs
        // a vertex to cross into as well.
        self.push_padding_vertices(out, layout.outer_cubic_end, 1);
    }

    /// Writes `count` degenerate vertices at `location`.
    pub fn push_padding_vertices(
        &mut self,
        out: &mut MappedBuffer<TessVertexSpan>,
        location: u32,
        count: u32,
    ) {
        debug_assert_eq!(self.path_location, self.expected_path_end);
        debug_assert_eq!(self.mirrored_location, self.expected_mirrored_end);
        if count == 0 {
            return;
        }
        self.path_location = location;
        self.expected_path_end = location + count;
        debug_assert!(self.expected_path_end <= MAX_TESSELLATION_VERTEX_COUNT);
        let empty_cubic = [Point::ZERO; 4];
        self.push_forward_spans(
            out,
            &empty_cubic,
            Vec2::ZERO,
            count,
            SegmentCounts::new(count, 0, 1),
            INVALID_CONTOUR_ID,
        );
        debug_assert_eq!(self.path_location, self.expected_path_end);
    }

    /// Reserves `tess_vertex_count` vertices for a new path in the section of `patch_type`.
    ///
    /// Paths that are not stroked get mirrored contours: the first half of their vertices is
    /// written backward from the middle of the reservation, the second half forward from it.
    pub fn begin_path(
        &mut self,
        patch_type: PatchType,
        tess_vertex_count: u32,
        stroked: bool,
        mirrored: bool,
    ) -> PathPlacement {
        debug_assert_eq!(self.path_location, self.expected_path_end);
        debug_assert_eq!(self.mirrored_location, self.expected_mirrored_end);
        debug_assert!(!(stroked && mirrored), "strokes are never mirrored");
        self.stroked = stroked;
        self.mirrored = mirrored;
        self.path_id += 1;

        let cursor = match patch_type {
            PatchType::MidpointFan => &mut self.midpoint_fan_cursor,
            PatchType::OuterCurves => &mut self.outer_cubic_cursor,
        };
        self.path_location = *cursor;
        *cursor += tess_vertex_count;
        self.expected_path_end = *cursor;
        debug_assert!(self.expected_path_end <= MAX_TESSELLATION_VERTEX_COUNT);

        let patch_size = patch_type.segment_span();
        let base_instance = self.path_location / patch_size;
        debug_assert_eq!(base_instance * patch_size, self.path_location);
        debug_assert_eq!(tess_vertex_count % patch_size, 0);

        if mirrored {
            debug_assert_eq!(tess_vertex_count % 2, 0);
            let half = tess_vertex_count / 2;
            self.path_location += half;
            self.mirrored_location = self.path_location;
            self.expected_mirrored_end = self.mirrored_location - half;
        } else {
            self.mirrored_location = 0;
            self.expected_mirrored_end = 0;
        }

        PathPlacement {
            path_id: self.path_id,
            base_instance,
            instance_count: tess_vertex_count / patch_size,
        }
    }

    /// Starts a contour of the current path.
    ///
    /// The first curve of the contour gets `padding_vertex_count` extra vertices at T=0, which
    /// the caller picks so the contour ends on a patch boundary.
    pub fn push_contour(
        &mut self,
        midpoint: Point,
        closed: bool,
        padding_vertex_count: u32,
    ) -> ContourData {
        debug_assert!(self.path_id != 0, "push_contour before begin_path");
        debug_assert!(self.stroked || closed, "fills are always closed");
        // Strokes store whether they are closed in place of the midpoint.
        let midpoint = if self.stroked {
            Point::new(if closed { 1.0 } else { 0.0 }, midpoint.y)
        } else {
            midpoint
        };
        self.contour_id += 1;
        debug_assert!(self.contour_id <= MAX_CONTOUR_ID);
        self.contour_padding = padding_vertex_count;
        ContourData::new(midpoint, self.path_id, self.path_location)
    }

    /// Appends a cubic and the join that follows it to the current contour.
    pub fn push_cubic(
        &mut self,
        out: &mut MappedBuffer<TessVertexSpan>,
        pts: &[Point; 4],
        join_tangent: Vec2,
        contour_flags: u32,
        segments: SegmentCounts,
    ) {
        debug_assert!(self.contour_id != 0, "push_cubic before push_contour");
        debug_assert!(segments.join > 0);
        let total_vertex_count = self.contour_padding + segments.vertex_count();
        // Only the first curve of a contour is padded.
        self.contour_padding = 0;
        let contour_id_with_flags = self.contour_id | contour_flags;
        if self.mirrored {
            self.push_mirrored_spans(
                out,
                pts,
                join_tangent,
                total_vertex_count,
                segments,
                contour_id_with_flags,
            );
        } else {
            self.push_forward_spans(
                out,
                pts,
                join_tangent,
                total_vertex_count,
                segments,
                contour_id_with_flags,
            );
        }
    }

    /// Debug check that every path was written out exactly as reserved.
    pub fn finish(&self) {
        debug_assert_eq!(self.path_location, self.expected_path_end);
        debug_assert_eq!(self.mirrored_location, self.expected_mirrored_end);
        debug_assert_eq!(self.midpoint_fan_cursor, self.layout.midpoint_fan_end);
        debug_assert_eq!(self.outer_cubic_cursor, self.layout.outer_cubic_end);
    }

    fn push_forward_spans(
        &mut self,
        out: &mut MappedBuffer<TessVertexSpan>,
        pts: &[Point; 4],
        join_tangent: Vec2,
        total_vertex_count: u32,
        segments: SegmentCounts,
        contour_id_with_flags: u32,
    ) {
        let mut y = (self.path_location / TESS_TEXTURE_WIDTH) as i32;
        let mut x0 = (self.path_location % TESS_TEXTURE_WIDTH) as i32;
        let mut x1 = x0 + total_vertex_count as i32;
        loop {
            out.push(TessVertexSpan::new(
                pts,
                join_tangent,
                y as f32,
                x0,
                x1,
                segments,
                contour_id_with_flags,
            ));
            if x1 <= WIDTH {
                break;
            }
            // Draw again behind the left edge of the next row to pick up what got clipped.
            y += 1;
            x0 -= WIDTH;
            x1 -= WIDTH;
        }
        self.path_location += total_vertex_count;
        debug_assert!(self.path_location <= self.expected_path_end);
    }

    fn push_mirrored_spans(
        &mut self,
        out: &mut MappedBuffer<TessVertexSpan>,
        pts: &[Point; 4],
        join_tangent: Vec2,
        total_vertex_count: u32,
        segments: SegmentCounts,
        contour_id_with_flags: u32,
    ) {
        debug_assert!(self.mirrored_location >= total_vertex_count);
        let mut y = (self.path_location / TESS_TEXTURE_WIDTH) as i32;
        let mut x0 = (self.path_location % TESS_TEXTURE_WIDTH) as i32;
        let mut x1 = x0 + total_vertex_count as i32;

        let last = self.mirrored_location - 1;
        let mut reflection_y = (last / TESS_TEXTURE_WIDTH) as i32;
        let mut reflection_x0 = (last % TESS_TEXTURE_WIDTH) as i32 + 1;
        let mut reflection_x1 = reflection_x0 - total_vertex_count as i32;
        loop {
            out.push(TessVertexSpan::with_reflection(
                pts,
                join_tangent,
                (y as f32, x0, x1),
                (reflection_y as f32, reflection_x0, reflection_x1),
                segments,
                contour_id_with_flags,
            ));
            if x1 <= WIDTH && reflection_x1 >= 0 {
                break;
            }
            // Either side ran off its row. Draw both again past the opposite edge.
            y += 1;
            x0 -= WIDTH;
            x1 -= WIDTH;
            reflection_y -= 1;
            reflection_x0 += WIDTH;
            reflection_x1 += WIDTH;
        }
        self.path_location += total_vertex_count;
        debug_assert!(self.path_location <= self.expected_path_end);
        self.mirrored_location -= total_vertex_count;
        debug_assert!(self.mirrored_location >= self.expected_mirrored_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBIC: [Point; 4] = [
        Point::new(0.0, 0.0),
        Point::new(10.0, 0.0),
        Point::new(10.0, 10.0),
        Point::new(0.0, 10.0),
    ];

    fn mapped(capacity: usize) -> MappedBuffer<TessVertexSpan> {
        let mut out = MappedBuffer::default();
        out.map(capacity);
        out
    }

    #[test]
    fn layout_sections() {
        let layout = TessLayout::new(16, 34);
        assert_eq!(layout.midpoint_fan_start, 8);
        assert_eq!(layout.midpoint_fan_end, 24);
        assert_eq!(layout.outer_cubic_start, 34);
        assert_eq!(layout.outer_cubic_end, 68);
        assert_eq!(layout.total_vertex_count(), 69);
        assert_eq!(layout.height, 1);
        assert!(TessLayout::new(0, 0).is_empty());
        assert_eq!(TessLayout::new(2048 * 2, 0).height, 3);
    }

    #[test]
    fn full_budget_fits_the_texture() {
        use pls_encoding::{MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING, MAX_TEXTURE_HEIGHT};

        // 8 + 112 ends one vertex past an outer curve patch boundary, the widest gap there is.
        let midpoint_fan = 112;
        let outer_cubic = MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING as usize - midpoint_fan;
        let layout = TessLayout::new(midpoint_fan, outer_cubic);
        assert_eq!(layout.outer_cubic_start - layout.midpoint_fan_end, 16);
        assert_eq!(layout.total_vertex_count(), MAX_TESSELLATION_VERTEX_COUNT);
        assert_eq!(layout.height, MAX_TEXTURE_HEIGHT);
    }

    #[test]
    fn single_cubic_contributes_its_vertex_count() {
        let mut out = mapped(8);
        let mut writer = TessellationWriter::new(TessLayout::new(8, 0));
        let placement = writer.begin_path(PatchType::MidpointFan, 8, true, false);
        assert_eq!(placement.path_id, 1);
        assert_eq!(placement.base_instance, 1);
        assert_eq!(placement.instance_count, 1);
        let contour = writer.push_contour(Point::ZERO, false, 0);
        assert_eq!(contour.vertex_index0, 8);
        assert_eq!(contour.midpoint, [0.0, 0.0]);
        writer.push_cubic(&mut out, &CUBIC, Vec2::ZERO, 0, SegmentCounts::new(4, 2, 1));
        writer.push_cubic(&mut out, &CUBIC, Vec2::ZERO, 0, SegmentCounts::new(1, 1, 1));
        let spans = out.as_slice();
        assert_eq!(spans[0].x1() - spans[0].x0(), 6);
        assert_eq!(spans[1].x0(), spans[0].x1());
        assert_eq!(spans[1].x1(), 16);
        assert_eq!(spans[0].contour_id(), 1);
        writer.finish();
    }

    #[test]
    fn padding_goes_on_the_first_cubic() {
        let mut out = mapped(8);
        let mut writer = TessellationWriter::new(TessLayout::new(8, 0));
        writer.begin_path(PatchType::MidpointFan, 8, true, false);
        writer.push_contour(Point::ZERO, true, 2);
        writer.push_cubic(&mut out, &CUBIC, Vec2::ZERO, 0, SegmentCounts::new(2, 1, 1));
        writer.push_cubic(&mut out, &CUBIC, Vec2::ZERO, 0, SegmentCounts::new(2, 1, 1));
        let spans = out.as_slice();
        assert_eq!(spans[0].x1() - spans[0].x0(), 5);
        assert_eq!(spans[1].x1() - spans[1].x0(), 3);
        writer.finish();
    }

    #[test]
    fn spans_wrap_at_the_row_end() {
        let mut out = mapped(4);
        let mut writer = TessellationWriter::default();
        writer.push_padding_vertices(&mut out, 2040, 16);
        let spans = out.as_slice();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].y, spans[0].x0(), spans[0].x1()), (0.0, 2040, 2056));
        assert_eq!((spans[1].y, spans[1].x0(), spans[1].x1()), (1.0, -8, 8));
        assert_eq!(spans[0].contour_id(), INVALID_CONTOUR_ID);
    }

    #[test]
    fn mirrored_contours_grow_outward_from_the_middle() {
        let mut out = mapped(4);
        let mut writer = TessellationWriter::new(TessLayout::new(16, 0));
        let placement = writer.begin_path(PatchType::MidpointFan, 16, false, true);
        assert_eq!(placement.instance_count, 2);
        let contour = writer.push_contour(Point::new(5.0, 5.0), true, 0);
        assert_eq!(contour.vertex_index0, 16);
        assert_eq!(contour.midpoint, [5.0, 5.0]);
        writer.push_cubic(&mut out, &CUBIC, Vec2::ZERO, 0, SegmentCounts::new(7, 1, 1));
        let span = out.as_slice()[0];
        assert_eq!((span.x0(), span.x1()), (16, 24));
        assert!(span.has_reflection());
        assert_eq!(span.reflection_y, 0.0);
        assert_eq!((span.reflection_x0(), span.reflection_x1()), (16, 8));
        writer.finish();
    }

    #[test]
    fn mirrored_spans_wrap_backward() {
        let mut out = mapped(4);
        // Reserve enough that the middle of the path lands right after a row boundary.
        let count = 2 * (2048 - 8) + 16;
        let mut writer = TessellationWriter::new(TessLayout::new(count as usize, 0));
        writer.begin_path(PatchType::MidpointFan, count, false, true);
        writer.push_contour(Point::ZERO, true, 0);
        // The middle sits at 2056; the reflection runs from 2056 down across 2048.
        writer.push_cubic(&mut out, &CUBIC, Vec2::ZERO, 0, SegmentCounts::new(16, 1, 1));
        let spans = out.as_slice();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].reflection_y, spans[0].reflection_x0()), (1.0, 8));
        assert_eq!(spans[0].reflection_x1(), -9);
        assert_eq!((spans[1].reflection_y, spans[1].reflection_x0()), (0.0, 2056));
        assert_eq!(spans[1].reflection_x1(), 2039);
        assert_eq!((spans[1].y, spans[1].x0()), (2.0, 8 - 2048));
    }

    #[test]
    fn padding_frames_both_sections() {
        let layout = TessLayout::new(8, 17);
        let mut out = mapped(8);
        let mut writer = TessellationWriter::new(layout);
        writer.write_padding(&mut out);
        let spans = out.as_slice();
        assert_eq!(spans.len(), 3);
        assert_eq!((spans[0].x0(), spans[0].x1()), (0, 8));
        assert_eq!((spans[1].x0(), spans[1].x1()), (16, 17));
        assert_eq!((spans[2].x0(), spans[2].x1()), (34, 35));
    }
}
