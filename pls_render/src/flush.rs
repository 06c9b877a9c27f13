// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical flushes: the part of a frame that fits in one set of GPU resources.
//!
//! A logical flush accumulates draws until one of its hard limits would be exceeded. At the end
//! of the frame every logical flush is laid out against the running totals of the flushes before
//! it, the shared buffers are sized for the whole frame, and each flush writes its records at the
//! offsets it was given.

use peniko::kurbo::Point;
use pls_encoding::{
    alignment_in_elements, color_int_alpha, color_to_int, padding_to_align_up, pls_blend_mode,
    ColorInt, ContourData, DrawContents, DrawType, FlushUniforms, FlushUniformsDesc,
    GradTextureLayout, IAabb, ImageDrawUniforms, InterlockMode, LayoutCounters, LoadAction,
    PaintAuxData, PaintData, PaintType, PatchType, PathData, PlatformFeatures, ResourceCounters,
    ShaderFeatures, SimplePaintValue, TriangleVertex, TwoTexelRamp, MAX_CONTOUR_ID,
    MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING, TESS_PADDING_SPAN_COUNT,
};

use crate::arena::{ArenaSlice, FrameAllocators};
use crate::batch::{BatchParams, DrawBatch, DrawList};
use crate::buffers::ResourceBuffers;
use crate::clip::ClipTracker;
use crate::context::FrameDescriptor;
use crate::draw::{
    ContourRecord, Draw, DrawCommon, ImageMeshDraw, ImageRectDraw, InteriorTriangulationDraw,
    PathDraw, StencilClipResetDraw,
};
use crate::gradient::GradientPacker;
use crate::tessellation::{PathPlacement, TessLayout, TessellationWriter};

/// Everything a backend needs to execute one logical flush.
///
/// [`LogicalFlush::layout`] fills in everything up to `wireframe`. The fields after it depend on
/// the records themselves and are only valid once the flush has been written, which is always
/// the case by the time a backend sees the descriptor.
///
/// The `first_*` fields are element offsets into the frame-wide buffers.
#[derive(Clone, Debug, Default)]
pub struct FlushDescriptor {
    /// Position of the flush within its frame.
    pub flush_index: usize,
    pub is_final_flush: bool,
    pub interlock_mode: InterlockMode,
    pub render_target_width: u32,
    pub render_target_height: u32,
    /// Only the first flush of a frame uses the frame's load action. Later ones preserve what
    /// came before.
    pub load_action: LoadAction,
    pub clear_color: ColorInt,
    /// The region of the render target the flush may change.
    pub update_bounds: IAabb,
    /// The clear is folded into the atomic resolve instead of being done up front.
    pub skip_explicit_color_clear: bool,
    pub flush_uniform_data_offset_in_bytes: usize,

    /// Path, paint and paint aux records, including the clear color path.
    pub path_count: usize,
    pub first_path: usize,
    pub first_paint: usize,
    pub first_paint_aux: usize,
    pub contour_count: usize,
    pub first_contour: usize,

    /// Gradient spans and the gradient texture rows they render into.
    pub complex_grad_span_count: usize,
    pub first_complex_grad_span: usize,
    pub simple_grad_texels_width: u32,
    pub simple_grad_texels_height: u32,
    pub simple_grad_data_offset_in_bytes: usize,
    pub complex_grad_rows_top: u32,
    pub complex_grad_rows_height: u32,

    /// Rows of the tessellation texture the flush renders.
    pub tess_data_height: u32,
    pub wireframe: bool,

    // Set while writing.
    pub first_tess_vertex_span: usize,
    pub tess_vertex_span_count: usize,
    pub has_triangle_vertices: bool,
    pub combined_shader_features: ShaderFeatures,
    /// Atomic flushes without advanced blending can resolve straight into the render target.
    pub render_direct_to_raster_pipeline: bool,
    pub draw_list: DrawList,
}

/// Draws recorded since the last logical flush, plus the limits they have to fit in.
#[derive(Debug)]
pub struct LogicalFlush {
    draws: Vec<Draw>,
    counters: ResourceCounters,
    gradients: GradientPacker,
    clips: ClipTracker,
    combined_draw_bounds: IAabb,
    interlock_mode: InterlockMode,
    max_path_id: u32,
    budget: Option<ResourceCounters>,

    has_done_layout: bool,
    path_padding_count: usize,
    paint_padding_count: usize,
    paint_aux_padding_count: usize,
    contour_padding_count: usize,
    tess_layout: TessLayout,
    desc: FlushDescriptor,
}

impl LogicalFlush {
    /// `max_path_id` excludes the path ID reserved for the clear color.
    pub fn new(max_path_id: u32, max_clip_id: u32, interlock_mode: InterlockMode) -> Self {
        Self {
            draws: Vec::new(),
            counters: ResourceCounters::default(),
            gradients: GradientPacker::new(),
            clips: ClipTracker::new(max_clip_id),
            combined_draw_bounds: IAabb::EMPTY_FOR_JOIN,
            interlock_mode,
            max_path_id,
            budget: None,
            has_done_layout: false,
            path_padding_count: 0,
            paint_padding_count: 0,
            paint_aux_padding_count: 0,
            contour_padding_count: 0,
            tess_layout: TessLayout::default(),
            desc: FlushDescriptor {
                draw_list: DrawList::new(interlock_mode),
                ..Default::default()
            },
        }
    }

    pub fn interlock_mode(&self) -> InterlockMode {
        self.interlock_mode
    }

    /// Changes the interlock mode of an empty flush at the start of a frame.
    pub fn set_interlock_mode(&mut self, interlock_mode: InterlockMode) {
        debug_assert!(self.draws.is_empty());
        self.interlock_mode = interlock_mode;
        self.desc.draw_list.set_interlock_mode(interlock_mode);
    }

    pub fn set_max_clip_id(&mut self, max_clip_id: u32) {
        self.clips.set_max_clip_id(max_clip_id);
    }

    /// Caps the counters of this flush below the hard limits, to force earlier flushes.
    pub fn set_resource_budget(&mut self, budget: Option<ResourceCounters>) {
        self.budget = budget;
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn counters(&self) -> &ResourceCounters {
        &self.counters
    }

    pub fn clips(&self) -> &ClipTracker {
        &self.clips
    }

    pub fn gradients(&self) -> &GradientPacker {
        &self.gradients
    }

    pub fn combined_draw_bounds(&self) -> IAabb {
        self.combined_draw_bounds
    }

    /// Returns a nonzero clip ID, or 0 if this flush has run out.
    pub fn generate_clip_id(&mut self, content_bounds: IAabb) -> u32 {
        self.clips.generate_clip_id(content_bounds)
    }

    /// Appends `draws` if all of them fit, leaving `draws` empty.
    ///
    /// If any limit would be exceeded, nothing changes, `draws` is left as it was and `false` is
    /// returned. The caller then starts a new logical flush and pushes the same batch again.
    pub fn push_draw_batch(&mut self, draws: &mut Vec<Draw>) -> bool {
        debug_assert!(!self.has_done_layout);
        if self.interlock_mode == InterlockMode::Atomics
            && self.draws.len() + draws.len() > i16::MAX as usize
        {
            // Atomic mode reorders draws by index and stores the index in 16 bits.
            return false;
        }

        let mut counts = self.counters;
        for draw in draws.iter() {
            counts += draw.resource_counts();
        }
        if counts.path_count > self.max_path_id as usize
            || counts.contour_count > MAX_CONTOUR_ID as usize
            || counts.tess_vertex_count() > MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING as usize
            || self.budget.is_some_and(|budget| exceeds_budget(&counts, &budget))
        {
            return false;
        }

        let snapshot = self.gradients.snapshot();
        for draw in draws.iter_mut() {
            if !draw.allocate_gradient_if_needed(&mut self.gradients, &mut counts) {
                self.gradients.rollback(snapshot);
                return false;
            }
        }
        if self
            .budget
            .is_some_and(|budget| exceeds_budget(&counts, &budget))
        {
            self.gradients.rollback(snapshot);
            return false;
        }

        for draw in draws.iter() {
            let common = draw.common();
            let read_clip = if common.paint.paint_type == PaintType::ClipUpdate {
                common.paint.outer_clip_id
            } else {
                common.clip_id
            };
            if read_clip != 0 && self.clips.get(read_clip).is_some() {
                self.clips
                    .add_clip_read_bounds(read_clip, common.pixel_bounds);
            }
            self.combined_draw_bounds = self.combined_draw_bounds.join(&common.pixel_bounds);
        }
        self.draws.append(draws);
        self.counters = counts;
        true
    }

    /// Assigns this flush its place in the frame-wide buffers.
    ///
    /// `running` and `running_layout` hold the totals of every flush before this one and are
    /// advanced past this one.
    pub fn layout(
        &mut self,
        frame: &FrameDescriptor,
        flush_index: usize,
        is_final_flush: bool,
        running: &mut ResourceCounters,
        running_layout: &mut LayoutCounters,
    ) -> LaidOut<'_> {
        debug_assert!(!self.has_done_layout);

        // Path 0 is the clear color.
        self.counters.path_count += 1;

        // Storage buffer bindings start on 256-byte boundaries, so each flush ends on one.
        let path_count = self.counters.path_count;
        self.path_padding_count = padding_to_align_up(path_count, alignment_in_elements::<PathData>());
        self.paint_padding_count =
            padding_to_align_up(path_count, alignment_in_elements::<PaintData>());
        self.paint_aux_padding_count =
            padding_to_align_up(path_count, alignment_in_elements::<PaintAuxData>());
        self.contour_padding_count = padding_to_align_up(
            self.counters.contour_count,
            alignment_in_elements::<ContourData>(),
        );

        self.tess_layout = TessLayout::new(
            self.counters.midpoint_fan_tess_vertex_count,
            self.counters.outer_cubic_tess_vertex_count,
        );
        let tess_data_height = self.tess_layout.height;
        if self.counters.max_tessellated_segment_count != 0 {
            // Every row break can split a span in two, and the padding takes three more.
            self.counters.max_tessellated_segment_count +=
                self.tess_layout.max_span_break_count() + TESS_PADDING_SPAN_COUNT as usize;
        }

        let clear_color = color_to_int(frame.clear_color);
        let load_action = if flush_index == 0 {
            frame.load_action
        } else {
            LoadAction::PreserveRenderTarget
        };
        let target = IAabb::from_size(frame.render_target_width, frame.render_target_height);
        let mut update_bounds = if load_action == LoadAction::Clear {
            target
        } else {
            target.intersect(&self.combined_draw_bounds)
        };
        if update_bounds.is_empty() {
            update_bounds = IAabb::ZERO;
        }

        let simple_ramp_count = self.gradients.simple_ramp_count();
        let desc = &mut self.desc;
        desc.flush_index = flush_index;
        desc.is_final_flush = is_final_flush;
        desc.interlock_mode = self.interlock_mode;
        desc.render_target_width = frame.render_target_width;
        desc.render_target_height = frame.render_target_height;
        desc.load_action = load_action;
        desc.clear_color = clear_color;
        desc.update_bounds = update_bounds;
        desc.skip_explicit_color_clear = self.interlock_mode == InterlockMode::Atomics
            && load_action == LoadAction::Clear
            && color_int_alpha(clear_color) == 255;
        desc.flush_uniform_data_offset_in_bytes = flush_index * size_of::<FlushUniforms>();
        desc.path_count = path_count;
        desc.first_path = running.path_count + running_layout.path_padding_count;
        desc.first_paint = running.path_count + running_layout.paint_padding_count;
        desc.first_paint_aux = running.path_count + running_layout.paint_aux_padding_count;
        desc.contour_count = self.counters.contour_count;
        desc.first_contour = running.contour_count + running_layout.contour_padding_count;
        desc.complex_grad_span_count = self.counters.complex_gradient_span_count;
        desc.first_complex_grad_span = running.complex_gradient_span_count;
        desc.simple_grad_texels_width = self.gradients.simple_texels_width();
        desc.simple_grad_texels_height = self.gradients.simple_texels_height();
        desc.simple_grad_data_offset_in_bytes =
            running_layout.simple_grad_count * size_of::<TwoTexelRamp>();
        desc.complex_grad_rows_top = desc.simple_grad_texels_height;
        desc.complex_grad_rows_height = self.gradients.complex_ramp_count() as u32;
        desc.tess_data_height = tess_data_height;
        desc.wireframe = frame.wireframe;

        *running += self.counters;
        running_layout.path_padding_count += self.path_padding_count;
        running_layout.paint_padding_count += self.paint_padding_count;
        running_layout.paint_aux_padding_count += self.paint_aux_padding_count;
        running_layout.contour_padding_count += self.contour_padding_count;
        running_layout.simple_grad_count += simple_ramp_count;
        running_layout.max_grad_texture_height = running_layout.max_grad_texture_height.max(
            (desc.simple_grad_texels_height + desc.complex_grad_rows_height) as usize,
        );
        running_layout.max_tess_texture_height = running_layout
            .max_tess_texture_height
            .max(tess_data_height as usize);

        self.has_done_layout = true;
        LaidOut { flush: self }
    }

    /// Clears the flush for reuse, keeping its allocations.
    pub fn rewind(&mut self) {
        self.draws.clear();
        self.counters = ResourceCounters::default();
        self.gradients.rewind();
        self.clips.reset();
        self.combined_draw_bounds = IAabb::EMPTY_FOR_JOIN;
        self.has_done_layout = false;
        self.path_padding_count = 0;
        self.paint_padding_count = 0;
        self.paint_aux_padding_count = 0;
        self.contour_padding_count = 0;
        self.tess_layout = TessLayout::default();
        let mut draw_list = std::mem::take(&mut self.desc.draw_list);
        draw_list.clear();
        self.desc = FlushDescriptor {
            draw_list,
            ..Default::default()
        };
    }

    /// Like [`LogicalFlush::rewind`], but also frees every container.
    pub fn reset_containers(&mut self) {
        self.rewind();
        self.draws = Vec::new();
        self.gradients.reset_containers();
        self.clips.reset_containers();
        self.desc.draw_list.reset_containers();
    }
}

fn exceeds_budget(counts: &ResourceCounters, budget: &ResourceCounters) -> bool {
    counts.path_count > budget.path_count
        || counts.contour_count > budget.contour_count
        || counts.tess_vertex_count() > budget.tess_vertex_count()
        || counts.max_triangle_vertex_count > budget.max_triangle_vertex_count
        || counts.image_draw_count > budget.image_draw_count
        || counts.complex_gradient_span_count > budget.complex_gradient_span_count
}

/// Shared state while the logical flushes of a frame write their records.
pub(crate) struct WriteContext<'a> {
    pub buffers: &'a mut ResourceBuffers,
    pub allocators: &'a FrameAllocators,
    pub platform: PlatformFeatures,
    /// Height of the gradient texture as allocated, which every flush of the frame shares.
    pub grad_texture_height: usize,
}

/// A logical flush that has been laid out and can now write its records.
///
/// Only [`LogicalFlush::layout`] creates one, so records can't be written before the flush knows
/// where they go.
pub struct LaidOut<'a> {
    flush: &'a mut LogicalFlush,
}

impl LaidOut<'_> {
    pub fn descriptor(&self) -> &FlushDescriptor {
        &self.flush.desc
    }

    pub fn flush(&self) -> &LogicalFlush {
        self.flush
    }

    /// Writes every record of the flush into the mapped buffers of `cx`.
    pub(crate) fn write(&mut self, cx: &mut WriteContext<'_>) {
        let flush = &mut *self.flush;
        let grad_layout = GradTextureLayout {
            complex_offset_y: flush.desc.complex_grad_rows_top,
            inverse_height: if cx.grad_texture_height == 0 {
                0.0
            } else {
                1.0 / cx.grad_texture_height as f32
            },
        };
        flush.desc.first_tess_vertex_span = cx.buffers.tess_spans.elements_written();
        let initial_triangle_vertices = cx.buffers.triangle_vertices.elements_written();
        debug_assert_eq!(flush.desc.first_path, cx.buffers.paths.elements_written());
        debug_assert_eq!(flush.desc.first_contour, cx.buffers.contours.elements_written());

        cx.buffers.flush_uniforms.push(FlushUniforms::new(
            &FlushUniformsDesc {
                complex_gradients_height: flush.desc.complex_grad_rows_height,
                tess_data_height: flush.desc.tess_data_height,
                render_target_width: flush.desc.render_target_width,
                render_target_height: flush.desc.render_target_height,
                update_bounds: flush.desc.update_bounds,
                clear_color: flush.desc.clear_color,
            },
            &cx.platform,
        ));

        flush
            .gradients
            .write_simple_ramps(&mut cx.buffers.simple_color_ramps);
        flush
            .gradients
            .write_complex_spans(&mut cx.buffers.gradient_spans);

        // The clear color path lets atomic mode resolve the clear, and lets every other buffer be
        // indexed directly by path ID.
        cx.buffers.paths.skip_back();
        cx.buffers.paints.push(PaintData::new(
            PaintType::SolidColor,
            SimplePaintValue::Color(flush.desc.clear_color),
            &GradTextureLayout::default(),
            0,
            false,
            false,
            0,
        ));
        cx.buffers.paint_auxes.skip_back();

        let mut tess = TessellationWriter::new(flush.tess_layout);
        tess.write_padding(&mut cx.buffers.tess_spans);

        let mut writer = DrawWriter {
            list: &mut flush.desc.draw_list,
            tess: &mut tess,
            cx: &mut *cx,
            grad_layout,
            interlock_mode: flush.interlock_mode,
            render_target_height: flush.desc.render_target_height,
            first_contour: flush.desc.first_contour,
        };
        if flush.interlock_mode == InterlockMode::Atomics {
            // Overlapping draws need a barrier between them. Bounds are padded by a pixel for
            // antialiasing.
            let mut since_barrier = IAabb::EMPTY_FOR_JOIN;
            for draw in &flush.draws {
                if draw.is_barrier() {
                    writer.list.push_barrier();
                    since_barrier = IAabb::EMPTY_FOR_JOIN;
                    continue;
                }
                let b = draw.pixel_bounds();
                let padded = IAabb::new(b.left - 1, b.top - 1, b.right + 1, b.bottom + 1);
                if since_barrier.intersects(&padded) {
                    writer.list.push_barrier();
                    since_barrier = IAabb::EMPTY_FOR_JOIN;
                }
                writer.push_draw(draw);
                since_barrier = since_barrier.join(&padded);
            }
            writer.list.push_barrier();
            let mut resolve = DrawBatch::new(DrawType::AtomicResolve, 0);
            resolve.element_count = 1;
            resolve.shader_features = writer.list.combined_shader_features();
            writer.list.push_batch(resolve);
        } else {
            for draw in &flush.draws {
                writer.push_draw(draw);
            }
        }

        let buffers = &mut *writer.cx.buffers;
        buffers.paths.push_zeroed(flush.path_padding_count);
        buffers.paints.push_zeroed(flush.paint_padding_count);
        buffers.paint_auxes.push_zeroed(flush.paint_aux_padding_count);
        buffers.contours.push_zeroed(flush.contour_padding_count);
        tess.finish();

        let buffers = &*cx.buffers;
        let desc = &mut flush.desc;
        desc.tess_vertex_span_count =
            buffers.tess_spans.elements_written() - desc.first_tess_vertex_span;
        debug_assert!(
            desc.tess_vertex_span_count <= flush.counters.max_tessellated_segment_count,
            "tessellation span estimate was too low"
        );
        desc.has_triangle_vertices =
            buffers.triangle_vertices.elements_written() != initial_triangle_vertices;
        desc.combined_shader_features = desc.draw_list.combined_shader_features();
        desc.render_direct_to_raster_pipeline = flush.interlock_mode == InterlockMode::Atomics
            && !desc
                .combined_shader_features
                .contains(ShaderFeatures::ENABLE_ADVANCED_BLEND);
    }
}

/// Turns draws into records and batches.
struct DrawWriter<'a, 'b> {
    list: &'a mut DrawList,
    tess: &'a mut TessellationWriter,
    cx: &'a mut WriteContext<'b>,
    grad_layout: GradTextureLayout,
    interlock_mode: InterlockMode,
    render_target_height: u32,
    first_contour: usize,
}

impl DrawWriter<'_, '_> {
    fn push_draw(&mut self, draw: &Draw) {
        match draw {
            Draw::Path(d) => self.push_path_draw(d),
            Draw::InteriorTriangulation(d) => self.push_interior_triangulation(d),
            Draw::ImageRect(d) => self.push_image_rect(d),
            Draw::ImageMesh(d) => self.push_image_mesh(d),
            Draw::StencilClipReset(d) => self.push_stencil_clip_reset(d),
            Draw::Barrier(_) => self.list.push_barrier(),
        }
    }

    fn batch_params<'c>(common: &'c DrawCommon) -> BatchParams<'c> {
        BatchParams {
            paint_type: common.paint.paint_type,
            image: common.paint.image.as_ref(),
            clip_id: common.clip_id,
            has_clip_rect: common.has_clip_rect(),
            blend_mode: common.blend_mode,
            draw_contents: common.contents,
        }
    }

    /// Adds `element_count` elements of a path draw, with the path-only shader features.
    fn push_path_batch(
        &mut self,
        draw_type: DrawType,
        base_element: u32,
        element_count: u32,
        common: &DrawCommon,
        even_odd: bool,
    ) {
        let params = Self::batch_params(common);
        self.list
            .push_draw(draw_type, base_element, &params)
            .element_count += element_count;
        let mut features = ShaderFeatures::empty();
        if even_odd {
            features |= ShaderFeatures::ENABLE_EVEN_ODD;
        }
        if common.paint.paint_type == PaintType::ClipUpdate && common.paint.outer_clip_id != 0 {
            features |= ShaderFeatures::ENABLE_NESTED_CLIPPING;
        }
        self.list.add_tail_shader_features(features);
    }

    /// Writes the path, paint and paint aux records of the path at `placement`.
    fn push_path_records(
        &mut self,
        placement: &PathPlacement,
        common: &DrawCommon,
        stroke_radius: f32,
        even_odd: bool,
    ) {
        let buffers = &mut *self.cx.buffers;
        buffers
            .paths
            .push(PathData::new(&common.matrix, stroke_radius, placement.path_id));
        buffers.paints.push(PaintData::new(
            common.paint.paint_type,
            common.paint.simple_value(),
            &self.grad_layout,
            common.clip_id,
            common.has_clip_rect(),
            even_odd,
            pls_blend_mode(common.blend_mode),
        ));
        let gradient = common
            .paint
            .gradient
            .as_ref()
            .map(|g| (common.paint.ramp.unwrap_or_default(), g.coeffs()));
        buffers.paint_auxes.push(PaintAuxData::new(
            &common.matrix,
            common.paint.paint_type,
            gradient,
            common.clip_rect_inverse.as_ref(),
            self.render_target_height,
            self.cx.platform.frag_coord_bottom_up,
        ));
    }

    fn push_contours(&mut self, contours: &ArenaSlice<ContourRecord>) {
        let allocators = self.cx.allocators;
        let Some(contours) = allocators.contours.get(contours) else {
            debug_assert!(false, "contour records outlived their frame");
            return;
        };
        for contour in contours {
            let data = self.tess.push_contour(
                contour.midpoint,
                contour.closed,
                contour.padding_vertex_count,
            );
            self.cx.buffers.contours.push(data);
            debug_assert_eq!(
                self.first_contour + self.tess.contour_id() as usize,
                self.cx.buffers.contours.elements_written()
            );
            let cubics = allocators.cubics.get(&contour.cubics).unwrap_or_default();
            for cubic in cubics {
                self.tess.push_cubic(
                    &mut self.cx.buffers.tess_spans,
                    &cubic.pts,
                    cubic.join_tangent,
                    cubic.flags.bits(),
                    cubic.segments,
                );
            }
        }
    }

    fn push_path_draw(&mut self, draw: &PathDraw) {
        let stroked = draw.common.contents.contains(DrawContents::STROKE);
        let placement = self.tess.begin_path(
            PatchType::MidpointFan,
            draw.tess_vertex_count,
            stroked,
            draw.mirrored,
        );
        self.push_path_records(&placement, &draw.common, draw.stroke_radius, draw.even_odd);
        self.push_path_batch(
            DrawType::MidpointFanPatches,
            placement.base_instance,
            placement.instance_count,
            &draw.common,
            draw.even_odd,
        );
        self.push_contours(&draw.contours);
    }

    fn push_interior_triangulation(&mut self, draw: &InteriorTriangulationDraw) {
        let placement = self.tess.begin_path(
            PatchType::OuterCurves,
            draw.tess_vertex_count,
            false,
            draw.mirrored,
        );
        self.push_path_records(&placement, &draw.common, 0.0, draw.even_odd);
        self.push_path_batch(
            DrawType::OuterCurvePatches,
            placement.base_instance,
            placement.instance_count,
            &draw.common,
            draw.even_odd,
        );
        self.push_contours(&draw.contours);

        if self.interlock_mode == InterlockMode::Atomics {
            // The triangles accumulate coverage on top of the outer curves.
            self.list.push_barrier();
        }
        let allocators = self.cx.allocators;
        let triangles = allocators.triangles.get(&draw.triangles).unwrap_or_default();
        let vertices = &mut self.cx.buffers.triangle_vertices;
        let base_vertex = vertices.elements_written() as u32;
        for triangle in triangles {
            for point in triangle.points {
                vertices.push(TriangleVertex::new(
                    point,
                    triangle.weight,
                    placement.path_id as u16,
                ));
            }
        }
        self.push_path_batch(
            DrawType::InteriorTriangulation,
            base_vertex,
            triangles.len() as u32 * 3,
            &draw.common,
            draw.even_odd,
        );
        self.list.push_barrier();
    }

    fn push_image_uniforms(&mut self, common: &DrawCommon) -> usize {
        let uniforms = &mut self.cx.buffers.image_draw_uniforms;
        let offset = uniforms.bytes_written();
        uniforms.push(ImageDrawUniforms::new(
            &common.matrix,
            common.paint.image_opacity,
            common.clip_rect_inverse.as_ref(),
            common.clip_id,
            pls_blend_mode(common.blend_mode),
        ));
        offset
    }

    fn push_image_rect(&mut self, draw: &ImageRectDraw) {
        // The uniforms are counted when the draw is pushed, so they are written either way.
        let offset = self.push_image_uniforms(&draw.common);
        if self.interlock_mode != InterlockMode::Atomics || self.cx.platform.supports_bindless_textures
        {
            log::warn!("image rects are only drawn in atomic mode without bindless textures");
            return;
        }
        let params = Self::batch_params(&draw.common);
        let batch = self.list.push_draw(DrawType::ImageRect, 0, &params);
        batch.element_count = 1;
        batch.image_draw_data_offset = offset;
    }

    fn push_image_mesh(&mut self, draw: &ImageMeshDraw) {
        let offset = self.push_image_uniforms(&draw.common);
        let params = Self::batch_params(&draw.common);
        let batch = self.list.push_draw(DrawType::ImageMesh, 0, &params);
        batch.element_count = draw.index_count;
        batch.image_draw_data_offset = offset;
        batch.vertex_buffer = Some(draw.vertex_buffer.clone());
        batch.uv_buffer = Some(draw.uv_buffer.clone());
        batch.index_buffer = Some(draw.index_buffer.clone());
    }

    fn push_stencil_clip_reset(&mut self, draw: &StencilClipResetDraw) {
        let b = draw.common.pixel_bounds;
        let [l, t, r, btm] = [b.left, b.top, b.right, b.bottom].map(f64::from);
        let corners = [
            Point::new(l, t),
            Point::new(r, t),
            Point::new(r, btm),
            Point::new(l, t),
            Point::new(r, btm),
            Point::new(l, btm),
        ];
        let vertices = &mut self.cx.buffers.triangle_vertices;
        let base_vertex = vertices.elements_written() as u32;
        for corner in corners {
            vertices.push(TriangleVertex::new(corner, 1, 0));
        }
        let params = Self::batch_params(&draw.common);
        self.list
            .push_draw(DrawType::StencilClipReset, base_vertex, &params)
            .element_count = corners.len() as u32;
    }
}
