// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draws: self-contained units of rendering work, counted before they are written.
//!
//! Constructing a draw does all the curve math up front. The resulting [`ResourceCounters`] are
//! exact, so a logical flush can decide whether a batch fits before anything is written, and the
//! records stashed in the frame arenas are replayed verbatim when the flush is written out.

use std::f64::consts::PI;
use std::sync::Arc;

use peniko::kurbo::{Affine, BezPath, Cap, Join, Point, Vec2};
use peniko::{BlendMode, Color, Compose, Fill, Mix};
use pls_encoding::{
    color_int_alpha, color_to_int, padding_to_align_up, ColorInt, ColorRampLocation, ContourFlags,
    DrawContents, DrawType, IAabb, InterlockMode, PaintType, ResourceCounters, SegmentCounts,
    SimplePaintValue, Transform, MAX_POLAR_SEGMENTS, MIDPOINT_FAN_PATCH_SEGMENT_SPAN,
    OUTER_CURVE_PATCH_SEGMENT_SPAN,
};

use crate::arena::{ArenaSlice, FrameAllocators};
use crate::backend::ImageTexture;
use crate::factory::{RenderBuffer, StrokeStyle};
use crate::geometry::{self, CubicContour};
use crate::gradient::{Gradient, GradientPacker};

/// Segments in a miter or bevel join. Round joins use their polar segment count.
const MITER_OR_BEVEL_JOIN_SEGMENTS: u32 = 5;

/// Fills below this many path verbs and above this many square pixels are drawn with an
/// interior triangulation.
const INTERIOR_TRIANGULATION_MAX_VERBS: usize = 1000;
const INTERIOR_TRIANGULATION_MIN_AREA: i64 = 512 * 512;

/// Each outer curve patch tessellates one curve into this many parametric segments.
const OUTER_CURVE_SEGMENTS: u32 = OUTER_CURVE_PATCH_SEGMENT_SPAN - 1;
const MAX_OUTER_CURVE_SUBDIVISIONS: u32 = 64;

/// A cubic and the join that follows it, ready to be written as a tessellation span.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicRecord {
    pub pts: [Point; 4],
    pub join_tangent: Vec2,
    pub segments: SegmentCounts,
    pub flags: ContourFlags,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContourRecord {
    pub midpoint: Point,
    pub closed: bool,
    /// Extra vertices on the first cubic so the contour ends on a patch boundary.
    pub padding_vertex_count: u32,
    pub cubics: ArenaSlice<CubicRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleRecord {
    pub points: [Point; 3],
    /// +1 for a clockwise triangle in y-down space, -1 for counterclockwise.
    pub weight: i16,
}

/// How a draw is colored.
#[derive(Clone, Debug, PartialEq)]
pub struct PaintInfo {
    pub paint_type: PaintType,
    pub color: ColorInt,
    pub gradient: Option<Arc<Gradient>>,
    /// Where the gradient landed in the gradient texture, once allocated.
    pub ramp: Option<ColorRampLocation>,
    pub image: Option<Arc<ImageTexture>>,
    pub image_opacity: f32,
    /// For clip updates: the clip the new clip is nested in, or 0.
    pub outer_clip_id: u32,
}

impl PaintInfo {
    pub fn solid(color: Color) -> Self {
        Self {
            paint_type: PaintType::SolidColor,
            color: color_to_int(color),
            gradient: None,
            ramp: None,
            image: None,
            image_opacity: 1.0,
            outer_clip_id: 0,
        }
    }

    pub fn gradient(gradient: Arc<Gradient>) -> Self {
        Self {
            paint_type: gradient.paint_type(),
            gradient: Some(gradient),
            ..Self::solid(Color::BLACK)
        }
    }

    pub fn image(image: Arc<ImageTexture>, opacity: f32) -> Self {
        Self {
            paint_type: PaintType::Image,
            image: Some(image),
            image_opacity: opacity,
            ..Self::solid(Color::BLACK)
        }
    }

    pub fn clip_update(outer_clip_id: u32) -> Self {
        Self {
            paint_type: PaintType::ClipUpdate,
            outer_clip_id,
            ..Self::solid(Color::BLACK)
        }
    }

    pub fn is_opaque(&self) -> bool {
        match self.paint_type {
            PaintType::SolidColor => color_int_alpha(self.color) == 255,
            PaintType::LinearGradient | PaintType::RadialGradient => {
                self.gradient.as_ref().is_some_and(|g| g.is_opaque())
            }
            PaintType::Image | PaintType::ClipUpdate => false,
        }
    }

    /// The word stored in the paint record.
    pub fn simple_value(&self) -> SimplePaintValue {
        match self.paint_type {
            PaintType::SolidColor => SimplePaintValue::Color(self.color),
            PaintType::LinearGradient | PaintType::RadialGradient => {
                debug_assert!(self.ramp.is_some(), "gradient was never allocated");
                SimplePaintValue::ColorRamp(self.ramp.unwrap_or_default())
            }
            PaintType::Image => SimplePaintValue::ImageOpacity(self.image_opacity),
            PaintType::ClipUpdate => SimplePaintValue::OuterClipId(self.outer_clip_id),
        }
    }
}

/// State shared by every kind of draw.
#[derive(Clone, Debug)]
pub struct DrawCommon {
    pub matrix: Affine,
    pub pixel_bounds: IAabb,
    pub blend_mode: BlendMode,
    pub clip_id: u32,
    pub clip_rect_inverse: Option<Transform>,
    pub paint: PaintInfo,
    pub contents: DrawContents,
    pub counts: ResourceCounters,
}

impl DrawCommon {
    pub fn new(matrix: Affine, pixel_bounds: IAabb, paint: PaintInfo, blend_mode: BlendMode) -> Self {
        let mut common = Self {
            matrix,
            pixel_bounds,
            blend_mode,
            clip_id: 0,
            clip_rect_inverse: None,
            paint,
            contents: DrawContents::empty(),
            counts: ResourceCounters::default(),
        };
        common.update_contents();
        common
    }

    fn is_src_over(&self) -> bool {
        matches!(self.blend_mode.mix, Mix::Normal | Mix::Clip)
            && self.blend_mode.compose == Compose::SrcOver
    }

    fn update_contents(&mut self) {
        let keep = DrawContents::STROKE | DrawContents::EVEN_ODD_FILL;
        let mut contents = self.contents & keep;
        if self.paint.paint_type == PaintType::ClipUpdate {
            contents |= DrawContents::CLIP_UPDATE;
            if self.paint.outer_clip_id != 0 {
                contents |= DrawContents::ACTIVE_CLIP;
            }
        } else {
            if self.clip_id != 0 {
                contents |= DrawContents::ACTIVE_CLIP;
            }
            if !self.is_src_over() {
                contents |= DrawContents::ADVANCED_BLEND;
            } else if self.paint.is_opaque() {
                contents |= DrawContents::OPAQUE_PAINT;
            }
        }
        self.contents = contents;
    }

    pub fn has_clip_rect(&self) -> bool {
        self.clip_rect_inverse.is_some()
    }
}

/// A path tessellated into midpoint fan patches.
#[derive(Clone, Debug)]
pub struct PathDraw {
    pub common: DrawCommon,
    pub contours: ArenaSlice<ContourRecord>,
    pub stroke_radius: f32,
    pub even_odd: bool,
    pub mirrored: bool,
    pub tess_vertex_count: u32,
}

/// A large, simple fill: outer curve patches plus a triangulation of the polygon inside them.
#[derive(Clone, Debug)]
pub struct InteriorTriangulationDraw {
    pub common: DrawCommon,
    pub contours: ArenaSlice<ContourRecord>,
    pub triangles: ArenaSlice<TriangleRecord>,
    pub even_odd: bool,
    pub mirrored: bool,
    pub tess_vertex_count: u32,
}

/// An image drawn as a unit rect transformed by the draw's matrix.
#[derive(Clone, Debug)]
pub struct ImageRectDraw {
    pub common: DrawCommon,
}

/// An image mapped onto an indexed triangle mesh.
#[derive(Clone, Debug)]
pub struct ImageMeshDraw {
    pub common: DrawCommon,
    pub vertex_buffer: Arc<RenderBuffer>,
    pub uv_buffer: Arc<RenderBuffer>,
    pub index_buffer: Arc<RenderBuffer>,
    pub index_count: u32,
}

/// Erases stencil clip content before a new clip is drawn, in `DepthStencil` mode.
#[derive(Clone, Debug)]
pub struct StencilClipResetDraw {
    pub common: DrawCommon,
    /// Keep content inside the clip being intersected instead of erasing everything.
    pub intersect: bool,
}

/// Makes every later draw wait for the ones before it. Touches no pixels and uses no resources.
#[derive(Clone, Debug)]
pub struct BarrierDraw {
    pub common: DrawCommon,
}

/// One unit of rendering work.
#[derive(Clone, Debug)]
pub enum Draw {
    Path(PathDraw),
    InteriorTriangulation(InteriorTriangulationDraw),
    ImageRect(ImageRectDraw),
    ImageMesh(ImageMeshDraw),
    StencilClipReset(StencilClipResetDraw),
    Barrier(BarrierDraw),
}

impl Draw {
    /// Builds the draw for a fill or stroke of `path`.
    ///
    /// Picks an interior triangulation for large, simple fills, and a midpoint fan otherwise.
    /// Returns `None` if the path has no visible segments.
    pub fn from_path(
        allocators: &mut FrameAllocators,
        mut common: DrawCommon,
        path: &BezPath,
        fill: Fill,
        stroke: Option<&StrokeStyle>,
        interlock_mode: InterlockMode,
    ) -> Option<Self> {
        let contours = geometry::cubic_contours(path, stroke.is_none());
        if contours.is_empty() {
            return None;
        }
        let even_odd = stroke.is_none() && fill == Fill::EvenOdd;
        common.contents.set(DrawContents::STROKE, stroke.is_some());
        common.contents.set(DrawContents::EVEN_ODD_FILL, even_odd);
        common.update_contents();
        // Mirrored contours are a property of the fill algorithm, not of the interlock mode, but
        // depth-stencil fills need every triangle in forward order.
        let mirrored = stroke.is_none() && interlock_mode != InterlockMode::DepthStencil;

        let bounds = common.pixel_bounds;
        let area = i64::from(bounds.width().max(0)) * i64::from(bounds.height().max(0));
        if mirrored
            && path.elements().len() < INTERIOR_TRIANGULATION_MAX_VERBS
            && area > INTERIOR_TRIANGULATION_MIN_AREA
        {
            return Some(Self::InteriorTriangulation(
                InteriorTriangulationDraw::new(allocators, common, &contours, even_odd),
            ));
        }

        let contour_flags = if mirrored {
            ContourFlags::MIRRORED_CONTOUR
        } else {
            ContourFlags::empty()
        };
        let mut tess_vertex_count = 0;
        let mut segment_count = 0;
        let mut records = Vec::with_capacity(contours.len());
        for contour in &contours {
            let cubics = match stroke {
                Some(stroke) => stroke_cubics(contour, &common.matrix, stroke),
                None => fill_cubics(contour, &common.matrix, contour_flags),
            };
            if cubics.is_empty() {
                // A point without caps.
                continue;
            }
            let vertex_count: u32 = cubics.iter().map(|c| c.segments.vertex_count()).sum();
            let padding =
                padding_to_align_up(vertex_count as usize, MIDPOINT_FAN_PATCH_SEGMENT_SPAN as usize)
                    as u32;
            tess_vertex_count += vertex_count + padding;
            segment_count += cubics.len();
            records.push(ContourRecord {
                midpoint: contour.midpoint(),
                closed: contour.closed,
                padding_vertex_count: padding,
                cubics: allocators.cubics.alloc_slice(cubics),
            });
        }
        if records.is_empty() {
            return None;
        }
        if mirrored {
            tess_vertex_count *= 2;
        }
        common.counts = ResourceCounters {
            midpoint_fan_tess_vertex_count: tess_vertex_count as usize,
            path_count: 1,
            contour_count: records.len(),
            max_tessellated_segment_count: segment_count,
            ..Default::default()
        };
        Some(Self::Path(PathDraw {
            common,
            contours: allocators.contours.alloc_slice(records),
            stroke_radius: stroke.map_or(0.0, |s| s.thickness * 0.5),
            even_odd,
            mirrored,
            tess_vertex_count,
        }))
    }

    pub fn image_rect(common: DrawCommon) -> Self {
        let mut common = common;
        common.counts = ResourceCounters {
            image_draw_count: 1,
            ..Default::default()
        };
        Self::ImageRect(ImageRectDraw { common })
    }

    pub fn image_mesh(
        common: DrawCommon,
        vertex_buffer: Arc<RenderBuffer>,
        uv_buffer: Arc<RenderBuffer>,
        index_buffer: Arc<RenderBuffer>,
        index_count: u32,
    ) -> Self {
        let mut common = common;
        common.counts = ResourceCounters {
            image_draw_count: 1,
            ..Default::default()
        };
        Self::ImageMesh(ImageMeshDraw {
            common,
            vertex_buffer,
            uv_buffer,
            index_buffer,
            index_count,
        })
    }

    /// Erases the stencil clip inside `bounds`, keeping the clip at `intersect`.
    pub fn stencil_clip_reset(bounds: IAabb, intersect: bool) -> Self {
        let mut common = DrawCommon::new(
            Affine::IDENTITY,
            bounds,
            PaintInfo::clip_update(0),
            BlendMode::default(),
        );
        common.contents = DrawContents::CLIP_UPDATE;
        if intersect {
            common.contents |= DrawContents::ACTIVE_CLIP;
        }
        common.counts = ResourceCounters {
            max_triangle_vertex_count: 6,
            ..Default::default()
        };
        Self::StencilClipReset(StencilClipResetDraw { common, intersect })
    }

    pub fn barrier() -> Self {
        Self::Barrier(BarrierDraw {
            common: DrawCommon::new(
                Affine::IDENTITY,
                IAabb::EMPTY_FOR_JOIN,
                PaintInfo::solid(Color::TRANSPARENT),
                BlendMode::default(),
            ),
        })
    }

    pub fn common(&self) -> &DrawCommon {
        match self {
            Self::Path(d) => &d.common,
            Self::InteriorTriangulation(d) => &d.common,
            Self::ImageRect(d) => &d.common,
            Self::ImageMesh(d) => &d.common,
            Self::StencilClipReset(d) => &d.common,
            Self::Barrier(d) => &d.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut DrawCommon {
        match self {
            Self::Path(d) => &mut d.common,
            Self::InteriorTriangulation(d) => &mut d.common,
            Self::ImageRect(d) => &mut d.common,
            Self::ImageMesh(d) => &mut d.common,
            Self::StencilClipReset(d) => &mut d.common,
            Self::Barrier(d) => &mut d.common,
        }
    }

    /// The draw type of the first batch this draw lands in. Barriers don't make batches.
    pub fn draw_type(&self) -> Option<DrawType> {
        Some(match self {
            Self::Path(_) => DrawType::MidpointFanPatches,
            Self::InteriorTriangulation(_) => DrawType::OuterCurvePatches,
            Self::ImageRect(_) => DrawType::ImageRect,
            Self::ImageMesh(_) => DrawType::ImageMesh,
            Self::StencilClipReset(_) => DrawType::StencilClipReset,
            Self::Barrier(_) => return None,
        })
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.common().blend_mode
    }

    pub fn draw_contents(&self) -> DrawContents {
        self.common().contents
    }

    pub fn image_texture(&self) -> Option<&Arc<ImageTexture>> {
        self.common().paint.image.as_ref()
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Barrier(_))
    }

    pub fn resource_counts(&self) -> ResourceCounters {
        self.common().counts
    }

    pub fn pixel_bounds(&self) -> IAabb {
        self.common().pixel_bounds
    }

    pub fn clip_id(&self) -> u32 {
        self.common().clip_id
    }

    /// Sets the clip the draw is tested against.
    pub fn set_clip_id(&mut self, clip_id: u32) {
        let common = self.common_mut();
        common.clip_id = clip_id;
        if !matches!(common.paint.paint_type, PaintType::ClipUpdate) {
            common.update_contents();
        }
    }

    /// Finds room for the draw's gradient, if it has one.
    ///
    /// Returns `false` if the gradient texture is full. Newly reserved complex ramps are added to
    /// `counters`.
    pub fn allocate_gradient_if_needed(
        &mut self,
        packer: &mut GradientPacker,
        counters: &mut ResourceCounters,
    ) -> bool {
        let paint = &mut self.common_mut().paint;
        let Some(gradient) = &paint.gradient else {
            return true;
        };
        match packer.allocate(gradient, counters) {
            Some(location) => {
                paint.ramp = Some(location);
                true
            }
            None => false,
        }
    }
}

fn fill_cubics(contour: &CubicContour, matrix: &Affine, flags: ContourFlags) -> Vec<CubicRecord> {
    debug_assert!(contour.closed);
    contour
        .cubics
        .iter()
        .map(|pts| CubicRecord {
            pts: *pts,
            join_tangent: Vec2::ZERO,
            segments: SegmentCounts::new(geometry::parametric_segment_count(pts, matrix), 1, 1),
            flags,
        })
        .collect()
}

/// Flags and join segment count of a cap emulated as a 180-degree join, or `None` for butt caps.
fn emulated_cap(cap: Cap, segments_per_radian: f64) -> Option<(ContourFlags, u32)> {
    match cap {
        Cap::Butt => None,
        // Unlike round joins, caps emit a vertex at both ends of their rotation.
        Cap::Round => Some((
            ContourFlags::EMULATED_STROKE_CAP | ContourFlags::ROUND_JOIN,
            (geometry::polar_segment_count(PI, segments_per_radian) + 2).min(MAX_POLAR_SEGMENTS),
        )),
        Cap::Square => Some((
            ContourFlags::EMULATED_STROKE_CAP | ContourFlags::MITER_CLIP_JOIN,
            MITER_OR_BEVEL_JOIN_SEGMENTS,
        )),
    }
}

/// The cap drawn on a contour that collapsed to a point.
///
/// Closed contours take the shape their joins converge to as they shrink: round joins to a dot,
/// miters to a square, and bevels to nothing.
fn empty_stroke_cap(stroke: &StrokeStyle, closed: bool) -> Cap {
    if !closed {
        return stroke.cap;
    }
    match stroke.join {
        Join::Round => Cap::Round,
        Join::Miter => Cap::Square,
        Join::Bevel => Cap::Butt,
    }
}

/// A cap in front of `pts`: the curve reversed with no segments of its own, then the cap as a
/// join turning back onto it.
fn cap_before(pts: &[Point; 4], (flags, join): (ContourFlags, u32)) -> CubicRecord {
    CubicRecord {
        pts: [pts[3], pts[2], pts[1], pts[0]],
        join_tangent: geometry::start_tangent(pts),
        segments: SegmentCounts::new(0, 0, join),
        flags,
    }
}

fn stroke_cubics(contour: &CubicContour, matrix: &Affine, stroke: &StrokeStyle) -> Vec<CubicRecord> {
    let radius = f64::from(stroke.thickness) * 0.5 * geometry::max_scale(matrix);
    let segments_per_radian = geometry::polar_segments_per_radian(radius);
    if contour.is_empty() {
        let Some(cap) = emulated_cap(empty_stroke_cap(stroke, contour.closed), segments_per_radian)
        else {
            return Vec::new();
        };
        let p0 = contour.start;
        let right = p0 + Vec2::new(1.0, 0.0);
        let left = p0 - Vec2::new(1.0, 0.0);
        return vec![
            cap_before(&[p0, right, right, right], cap),
            cap_before(&[p0, left, left, left], cap),
        ];
    }
    let cap = if contour.closed {
        None
    } else {
        emulated_cap(stroke.cap, segments_per_radian)
    };
    let flags = match stroke.join {
        Join::Round => ContourFlags::ROUND_JOIN,
        Join::Miter => ContourFlags::MITER_JOIN,
        Join::Bevel => ContourFlags::empty(),
    };
    let n = contour.cubics.len();
    let mut records = Vec::with_capacity(n + 1);
    if let Some(cap) = cap {
        records.push(cap_before(&contour.cubics[0], cap));
    }
    records.extend((0..n).map(|i| {
        let pts = &contour.cubics[i];
        let next = if i + 1 < n {
            Some(&contour.cubics[i + 1])
        } else if contour.closed {
            Some(&contour.cubics[0])
        } else {
            None
        };
        let (join_tangent, join, flags) = match (next, cap) {
            (Some(next), _) => {
                let tangent = geometry::start_tangent(next);
                let join = match stroke.join {
                    Join::Round => geometry::polar_segment_count(
                        geometry::angle_between(geometry::end_tangent(pts), tangent),
                        segments_per_radian,
                    ),
                    Join::Miter | Join::Bevel => MITER_OR_BEVEL_JOIN_SEGMENTS,
                };
                (tangent, join, flags)
            }
            // The end cap turns back along the final curve.
            (None, Some((cap_flags, cap_join))) => (-geometry::end_tangent(pts), cap_join, cap_flags),
            // Butt ends finish flat.
            (None, None) => (geometry::end_tangent(pts), 1, flags),
        };
        let polar =
            geometry::polar_segment_count(geometry::cubic_rotation(pts), segments_per_radian);
        CubicRecord {
            pts: *pts,
            join_tangent,
            segments: SegmentCounts::new(
                geometry::parametric_segment_count(pts, matrix),
                polar,
                join,
            ),
            flags,
        }
    }));
    records
}

impl InteriorTriangulationDraw {
    fn new(
        allocators: &mut FrameAllocators,
        mut common: DrawCommon,
        contours: &[CubicContour],
        even_odd: bool,
    ) -> Self {
        let flags = ContourFlags::CULL_EXCESS_TESSELLATION_SEGMENTS | ContourFlags::MIRRORED_CONTOUR;
        let mut patch_count = 0;
        let mut records = Vec::with_capacity(contours.len());
        let mut triangles = Vec::new();
        for contour in contours {
            let mut cubics = Vec::new();
            for pts in &contour.cubics {
                let subdivisions = if pts == &geometry::line_as_cubic(pts[0], pts[3]) {
                    1
                } else {
                    let n = (geometry::wangs_formula(pts, &common.matrix)
                        / f64::from(OUTER_CURVE_SEGMENTS))
                    .ceil();
                    if n.is_finite() {
                        (n as u32).clamp(1, MAX_OUTER_CURVE_SUBDIVISIONS)
                    } else {
                        MAX_OUTER_CURVE_SUBDIVISIONS
                    }
                };
                cubics.extend(geometry::subdivide_cubic(pts, subdivisions).map(|pts| {
                    CubicRecord {
                        pts,
                        join_tangent: Vec2::ZERO,
                        segments: SegmentCounts::new(OUTER_CURVE_SEGMENTS, 1, 1),
                        flags,
                    }
                }));
            }
            let polygon: Vec<Point> = cubics.iter().map(|c| c.pts[0]).collect();
            triangles.extend(
                geometry::fan_triangles(&polygon)
                    .into_iter()
                    .map(|(points, weight)| TriangleRecord { points, weight }),
            );
            patch_count += cubics.len();
            records.push(ContourRecord {
                midpoint: contour.midpoint(),
                closed: true,
                padding_vertex_count: 0,
                cubics: allocators.cubics.alloc_slice(cubics),
            });
        }
        // Every outer curve is written forward and mirrored.
        let tess_vertex_count = patch_count as u32 * OUTER_CURVE_PATCH_SEGMENT_SPAN * 2;
        common.counts = ResourceCounters {
            outer_cubic_tess_vertex_count: tess_vertex_count as usize,
            path_count: 1,
            contour_count: records.len(),
            max_tessellated_segment_count: patch_count,
            max_triangle_vertex_count: triangles.len() * 3,
            ..Default::default()
        };
        Self {
            common,
            contours: allocators.contours.alloc_slice(records),
            triangles: allocators.triangles.alloc_slice(triangles),
            even_odd,
            mirrored: true,
            tess_vertex_count,
        }
    }
}
