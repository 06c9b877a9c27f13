// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use peniko::Color;
use pls_encoding::{
    max_path_id, IAabb, InterlockMode, LayoutCounters, LoadAction, PlatformFeatures,
    ResourceAllocationCounts, ResourceCounters, GRAD_TEXTURE_WIDTH,
    GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS, TESS_TEXTURE_WIDTH,
};

use crate::arena::FrameAllocators;
use crate::backend::RenderContextImpl;
use crate::buffers::{BufferKind, ResourceBuffers};
use crate::clip::ClipInfo;
use crate::draw::Draw;
use crate::flush::{LogicalFlush, WriteContext};
use crate::Error;

/// Seconds between checks for allocations that can be trimmed.
const RESOURCE_TRIM_INTERVAL: f64 = 5.0;

/// Parameters of one frame.
#[derive(Clone, Debug)]
pub struct FrameDescriptor {
    pub render_target_width: u32,
    pub render_target_height: u32,
    pub load_action: LoadAction,
    pub clear_color: Color,
    /// Nonzero selects `DepthStencil` mode with this many MSAA samples.
    pub msaa_sample_count: u32,
    /// Selects `Atomics` mode instead of raster ordering.
    pub disable_raster_ordering: bool,
    pub wireframe: bool,
    pub fills_disabled: bool,
    pub strokes_disabled: bool,
}

impl Default for FrameDescriptor {
    fn default() -> Self {
        Self {
            render_target_width: 0,
            render_target_height: 0,
            load_action: LoadAction::Clear,
            clear_color: Color::rgba8(0, 0, 0, 0),
            msaa_sample_count: 0,
            disable_raster_ordering: false,
            wireframe: false,
            fills_disabled: false,
            strokes_disabled: false,
        }
    }
}

impl FrameDescriptor {
    pub fn interlock_mode(&self) -> InterlockMode {
        if self.msaa_sample_count > 0 {
            InterlockMode::DepthStencil
        } else if self.disable_raster_ordering {
            InterlockMode::Atomics
        } else {
            InterlockMode::RasterOrdering
        }
    }

    pub fn bounds(&self) -> IAabb {
        IAabb::from_size(self.render_target_width, self.render_target_height)
    }
}

/// Names one logical flush of one frame.
///
/// Every logical flush gets a serial number that is never reused, so a handle goes stale as soon
/// as its flush is replaced or its frame is flushed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlushHandle {
    index: usize,
    serial: u64,
}

/// The backend plus everything sized for it.
struct GpuResources<B> {
    backend: B,
    current: ResourceAllocationCounts,
    /// High-water mark since the last trim.
    max_recent: ResourceAllocationCounts,
    buffers: ResourceBuffers,
}

impl<B: RenderContextImpl> GpuResources<B> {
    fn set_resource_sizes(&mut self, allocs: ResourceAllocationCounts, force_realloc: bool) {
        let allocs = allocs.clamp_texture_heights();
        for kind in BufferKind::ALL {
            let count = kind.count_in(&allocs);
            if force_realloc || count != kind.count_in(&self.current) {
                self.backend
                    .resize_buffer(kind, count * kind.element_size());
            }
        }
        if force_realloc || allocs.grad_texture_height != self.current.grad_texture_height {
            self.backend
                .resize_gradient_texture(GRAD_TEXTURE_WIDTH, allocs.grad_texture_height as u32);
        }
        if force_realloc || allocs.tess_texture_height != self.current.tess_texture_height {
            self.backend
                .resize_tessellation_texture(TESS_TEXTURE_WIDTH, allocs.tess_texture_height as u32);
        }
        if allocs != self.current {
            log::debug!("GPU resource allocation: {}", allocs.memory());
        }
        self.current = allocs;
    }
}

/// Owns the GPU resources of a renderer and schedules everything drawn into them.
///
/// Draws are recorded between [`RenderContext::begin_frame`] and [`RenderContext::flush`]. When
/// the draws of a frame don't fit in one set of resources, the frame is split into several
/// logical flushes, which all share the same buffers and are executed in order.
pub struct RenderContext<B: RenderContextImpl> {
    resources: GpuResources<B>,
    platform_features: PlatformFeatures,
    max_path_id: u32,
    max_clip_id: u32,
    resource_budget: Option<ResourceCounters>,
    frame: Option<FrameDescriptor>,
    flushes: Vec<LogicalFlush>,
    /// Serial number of each entry in `flushes`.
    flush_serials: Vec<u64>,
    next_flush_serial: u64,
    pub(crate) allocators: FrameAllocators,
    clip_content_id: u32,
    frame_count: u64,
    last_trim_time: f64,
}

impl<B: RenderContextImpl> RenderContext<B> {
    pub fn new(backend: B) -> Self {
        let platform_features = backend.platform_features();
        // One path ID goes to the clear color.
        let max_path_id = max_path_id(platform_features.path_id_granularity) - 1;
        let last_trim_time = backend.seconds_now();
        let mut context = Self {
            resources: GpuResources {
                backend,
                current: ResourceAllocationCounts::default(),
                max_recent: ResourceAllocationCounts::default(),
                buffers: ResourceBuffers::default(),
            },
            platform_features,
            max_path_id,
            max_clip_id: max_path_id,
            resource_budget: None,
            frame: None,
            flushes: Vec::new(),
            flush_serials: Vec::new(),
            next_flush_serial: 0,
            allocators: FrameAllocators::new(),
            clip_content_id: 0,
            frame_count: 0,
            last_trim_time,
        };
        context.set_resource_sizes(ResourceAllocationCounts::default(), true);
        context
    }

    pub fn backend(&self) -> &B {
        &self.resources.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.resources.backend
    }

    pub fn platform_features(&self) -> &PlatformFeatures {
        &self.platform_features
    }

    /// Largest path ID available to draws.
    pub fn max_path_id(&self) -> u32 {
        self.max_path_id
    }

    pub fn current_resource_allocations(&self) -> &ResourceAllocationCounts {
        &self.resources.current
    }

    pub fn max_recent_resource_requirements(&self) -> &ResourceAllocationCounts {
        &self.resources.max_recent
    }

    /// The frame being recorded, if any.
    pub fn frame_descriptor(&self) -> Option<&FrameDescriptor> {
        self.frame.as_ref()
    }

    pub fn interlock_mode(&self) -> InterlockMode {
        self.frame
            .as_ref()
            .map_or(InterlockMode::RasterOrdering, FrameDescriptor::interlock_mode)
    }

    /// Reallocates every GPU resource whose size differs from `allocs`, or all of them when
    /// `force_realloc` is set.
    pub fn set_resource_sizes(&mut self, allocs: ResourceAllocationCounts, force_realloc: bool) {
        self.resources.set_resource_sizes(allocs, force_realloc);
    }

    /// Caps the number of clip IDs a logical flush hands out. Mostly useful for testing the
    /// retry path.
    pub fn set_max_clip_id(&mut self, max_clip_id: u32) {
        self.max_clip_id = max_clip_id.min(self.max_path_id);
        let max_clip_id = self.max_clip_id;
        for flush in &mut self.flushes {
            flush.set_max_clip_id(max_clip_id);
        }
    }

    /// Caps what a logical flush accepts below the hard limits, or lifts the cap with `None`.
    pub fn set_resource_budget(&mut self, budget: Option<ResourceCounters>) {
        self.resource_budget = budget;
        for flush in &mut self.flushes {
            flush.set_resource_budget(budget);
        }
    }

    fn new_logical_flush(&self, interlock_mode: InterlockMode) -> LogicalFlush {
        let mut flush = LogicalFlush::new(self.max_path_id, self.max_clip_id, interlock_mode);
        flush.set_resource_budget(self.resource_budget);
        flush
    }

    fn next_serial(&mut self) -> u64 {
        self.next_flush_serial += 1;
        self.next_flush_serial
    }

    fn push_logical_flush(&mut self, interlock_mode: InterlockMode) {
        let flush = self.new_logical_flush(interlock_mode);
        let serial = self.next_serial();
        self.flushes.push(flush);
        self.flush_serials.push(serial);
    }

    pub fn begin_frame(&mut self, frame: FrameDescriptor) {
        debug_assert!(self.frame.is_none(), "begin_frame called twice");
        let interlock_mode = frame.interlock_mode();
        self.resources.backend.prepare_to_map_buffers();
        if self.flushes.is_empty() {
            self.push_logical_flush(interlock_mode);
        }
        debug_assert_eq!(self.flushes.len(), 1);
        for flush in &mut self.flushes {
            flush.set_interlock_mode(interlock_mode);
            flush.set_max_clip_id(self.max_clip_id);
            flush.set_resource_budget(self.resource_budget);
        }
        log::trace!(
            "begin frame {} ({}x{}, {:?})",
            self.frame_count,
            frame.render_target_width,
            frame.render_target_height,
            interlock_mode
        );
        self.frame = Some(frame);
        self.clip_content_id = 0;
    }

    fn current_flush(&mut self) -> &mut LogicalFlush {
        if self.flushes.is_empty() {
            self.push_logical_flush(self.interlock_mode());
        }
        let last = self.flushes.len() - 1;
        &mut self.flushes[last]
    }

    /// Returns a clip ID that is unique within the current logical flush, or 0 if the flush has
    /// run out. After a 0 the caller calls [`RenderContext::logical_flush`] and tries again.
    pub fn generate_clip_id(&mut self, content_bounds: IAabb) -> u32 {
        debug_assert!(self.frame.is_some(), "generate_clip_id outside of a frame");
        self.current_flush().generate_clip_id(content_bounds)
    }

    /// Records `draws` into the current logical flush if they all fit.
    ///
    /// On success `draws` is drained. On failure nothing is recorded and `draws` is untouched;
    /// the caller calls [`RenderContext::logical_flush`] and pushes them again.
    pub fn push_draw_batch(&mut self, draws: &mut Vec<Draw>) -> bool {
        debug_assert!(self.frame.is_some(), "push_draw_batch outside of a frame");
        self.current_flush().push_draw_batch(draws)
    }

    /// Closes the current logical flush and starts a new one with fresh limits.
    ///
    /// The clip buffer is rebuilt by every flush, so the clip content ID is reset.
    pub fn logical_flush(&mut self) {
        debug_assert!(self.frame.is_some(), "logical_flush outside of a frame");
        if self.flushes.last().is_some_and(|f| f.draws().is_empty()) {
            // Clip IDs may have been handed out without any draws landing. Start over in place.
            let interlock_mode = self.interlock_mode();
            let flush = self.new_logical_flush(interlock_mode);
            let serial = self.next_serial();
            let last = self.flushes.len() - 1;
            self.flushes[last] = flush;
            self.flush_serials[last] = serial;
        } else {
            self.push_logical_flush(self.interlock_mode());
        }
        log::debug!("logical flush ({} so far this frame)", self.flushes.len());
        self.clip_content_id = 0;
    }

    pub fn logical_flush_count(&self) -> usize {
        self.flushes.len()
    }

    pub fn logical_flushes(&self) -> &[LogicalFlush] {
        &self.flushes
    }

    /// The clip most recently rendered into the clip buffer of the current flush, or 0.
    pub fn clip_content_id(&self) -> u32 {
        self.clip_content_id
    }

    pub fn set_clip_content_id(&mut self, clip_id: u32) {
        self.clip_content_id = clip_id;
    }

    /// Handle to the logical flush draws are currently recorded into.
    pub fn current_flush_handle(&mut self) -> FlushHandle {
        if self.flushes.is_empty() {
            self.push_logical_flush(self.interlock_mode());
        }
        let index = self.flushes.len() - 1;
        FlushHandle {
            index,
            serial: self.flush_serials[index],
        }
    }

    fn flush_for(&self, handle: FlushHandle) -> Option<&LogicalFlush> {
        if self.flush_serials.get(handle.index) != Some(&handle.serial) {
            return None;
        }
        self.flushes.get(handle.index)
    }

    /// Bounds of a clip's content, or `None` for a stale handle or an unknown clip.
    pub fn clip_content_bounds(&self, handle: FlushHandle, clip_id: u32) -> Option<IAabb> {
        self.flush_for(handle)?
            .clips()
            .get(clip_id)
            .map(|c| c.content_bounds)
    }

    /// Everything recorded about a clip. Fails if `handle` is from a finished frame.
    pub fn clip_info(
        &self,
        handle: FlushHandle,
        clip_id: u32,
    ) -> Result<Option<ClipInfo>, Error> {
        let flush = self
            .flush_for(handle)
            .ok_or(Error::StaleHandle("clip info"))?;
        Ok(flush.clips().get(clip_id).copied())
    }

    /// Lays out, writes and submits every logical flush of the frame, then starts over.
    pub fn flush(&mut self, flush_resources: &B::FlushResources) {
        let Some(frame) = self.frame.take() else {
            debug_assert!(false, "flush without begin_frame");
            return;
        };
        self.clip_content_id = 0;

        let flush_count = self.flushes.len();
        let mut running = ResourceCounters::default();
        let mut running_layout = LayoutCounters::default();
        let mut laid_out = Vec::with_capacity(flush_count);
        for (i, flush) in self.flushes.iter_mut().enumerate() {
            laid_out.push(flush.layout(
                &frame,
                i,
                i + 1 == flush_count,
                &mut running,
                &mut running_layout,
            ));
        }

        let allocs = ResourceAllocationCounts {
            flush_uniform_buffer_count: flush_count,
            image_draw_uniform_buffer_count: running.image_draw_count,
            path_buffer_count: running.path_count + running_layout.path_padding_count,
            paint_buffer_count: running.path_count + running_layout.paint_padding_count,
            paint_aux_buffer_count: running.path_count + running_layout.paint_aux_padding_count,
            contour_buffer_count: running.contour_count + running_layout.contour_padding_count,
            // Simple ramps are uploaded a whole texture row at a time.
            simple_gradient_buffer_count: running_layout.simple_grad_count
                + GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS as usize
                - 1,
            complex_grad_span_buffer_count: running.complex_gradient_span_count,
            tess_span_buffer_count: running.max_tessellated_segment_count,
            triangle_vertex_buffer_count: running.max_triangle_vertex_count,
            grad_texture_height: running_layout.max_grad_texture_height,
            tess_texture_height: running_layout.max_tess_texture_height,
        };

        let resources = &mut self.resources;
        resources.max_recent = resources.max_recent.max(allocs);
        let grown = resources.current.grow_to_fit(allocs, 5, 4);
        resources.set_resource_sizes(grown, false);
        debug_assert!(allocs.fits_within(&resources.current));

        resources.buffers.map_all(&allocs);
        let mut cx = WriteContext {
            buffers: &mut resources.buffers,
            allocators: &self.allocators,
            platform: self.platform_features,
            grad_texture_height: resources.current.grad_texture_height,
        };
        for flush in &mut laid_out {
            flush.write(&mut cx);
        }

        let buffers = &resources.buffers;
        debug_assert_eq!(buffers.flush_uniforms.elements_written(), flush_count);
        debug_assert_eq!(
            buffers.image_draw_uniforms.elements_written(),
            allocs.image_draw_uniform_buffer_count
        );
        debug_assert_eq!(buffers.paths.elements_written(), allocs.path_buffer_count);
        debug_assert_eq!(buffers.paints.elements_written(), allocs.paint_buffer_count);
        debug_assert_eq!(
            buffers.paint_auxes.elements_written(),
            allocs.paint_aux_buffer_count
        );
        debug_assert_eq!(buffers.contours.elements_written(), allocs.contour_buffer_count);
        debug_assert_eq!(
            buffers.gradient_spans.elements_written(),
            allocs.complex_grad_span_buffer_count
        );
        debug_assert!(buffers.tess_spans.elements_written() <= allocs.tess_span_buffer_count);
        debug_assert_eq!(
            buffers.triangle_vertices.elements_written(),
            allocs.triangle_vertex_buffer_count
        );

        let GpuResources {
            backend, buffers, ..
        } = resources;
        buffers.unmap_all(|kind, bytes| backend.unmap_buffer(kind, bytes));
        for flush in &laid_out {
            backend.flush(flush.descriptor(), flush_resources);
        }
        drop(laid_out);

        log::trace!(
            "flushed frame {} in {} logical flushes",
            self.frame_count,
            flush_count
        );
        self.flushes.truncate(1);
        self.flush_serials.truncate(1);
        if let Some(first) = self.flushes.first_mut() {
            first.rewind();
            let serial = self.next_serial();
            self.flush_serials[0] = serial;
        }
        self.allocators.reset();
        self.frame_count += 1;

        let now = self.resources.backend.seconds_now();
        if now - self.last_trim_time >= RESOURCE_TRIM_INTERVAL {
            self.shrink_gpu_resources_to_fit();
            self.last_trim_time = now;
        }
    }

    /// Shrinks allocations that have been well above what recent frames needed, then starts a new
    /// high-water mark.
    pub fn shrink_gpu_resources_to_fit(&mut self) {
        debug_assert!(self.frame.is_none(), "resources are in use by the current frame");
        let shrunk = self
            .resources
            .current
            .shrink_toward(self.resources.max_recent);
        self.set_resource_sizes(shrunk, false);
        self.resources.max_recent = ResourceAllocationCounts::default();
    }

    /// Frees every GPU resource and every container. The context stays usable.
    pub fn release_resources(&mut self) {
        debug_assert!(self.frame.is_none(), "resources are in use by the current frame");
        self.set_resource_sizes(ResourceAllocationCounts::default(), false);
        self.resources.max_recent = ResourceAllocationCounts::default();
        self.resources.buffers.release();
        self.flushes.truncate(1);
        self.flush_serials.truncate(1);
        if let Some(first) = self.flushes.first_mut() {
            first.reset_containers();
        }
        self.allocators = FrameAllocators::new();
        self.last_trim_time = self.resources.backend.seconds_now();
    }
}
