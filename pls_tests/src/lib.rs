// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test support for the pls render context: a backend that records everything it is asked to
//! do, and a few scene helpers.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(
    missing_debug_implementations,
    unreachable_pub,
    missing_docs,
    clippy::missing_assert_message,
    clippy::allow_attributes_without_reason
)]

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::Result;
use bytemuck::Pod;
use pls_render::encoding::PlatformFeatures;
use pls_render::kurbo::{BezPath, Circle, Rect, Shape};
use pls_render::peniko::Color;
use pls_render::{
    BufferKind, DrawType, FlushDescriptor, FrameDescriptor, ImageTexture, RenderContext,
    RenderContextImpl, ResourceCounters,
};

/// Everything except flushes and unmapped contents, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    ResizeBuffer {
        kind: BufferKind,
        size_in_bytes: usize,
    },
    ResizeGradientTexture {
        width: u32,
        height: u32,
    },
    ResizeTessellationTexture {
        width: u32,
        height: u32,
    },
    PrepareToMapBuffers,
    MakeImageTexture {
        width: u32,
        height: u32,
    },
}

impl Command {
    pub fn is_resize(&self) -> bool {
        matches!(
            self,
            Self::ResizeBuffer { .. }
                | Self::ResizeGradientTexture { .. }
                | Self::ResizeTessellationTexture { .. }
        )
    }
}

/// A backend that executes nothing and remembers everything.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub features: PlatformFeatures,
    pub commands: Vec<Command>,
    /// Contents of each buffer as of the last unmap.
    pub buffers: HashMap<BufferKind, Vec<u8>>,
    pub flushes: Vec<FlushDescriptor>,
    /// What `seconds_now` reports.
    pub now: f64,
}

impl RecordingBackend {
    pub fn new(features: PlatformFeatures) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    pub fn resize_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_resize()).count()
    }

    /// Forgets all commands and flushes recorded so far.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.flushes.clear();
    }

    /// The last unmapped contents of a buffer as records.
    pub fn records<T: Pod>(&self, kind: BufferKind) -> Vec<T> {
        let Some(bytes) = self.buffers.get(&kind) else {
            return Vec::new();
        };
        bytes
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

impl RenderContextImpl for RecordingBackend {
    type FlushResources = ();

    fn platform_features(&self) -> PlatformFeatures {
        self.features
    }

    fn resize_buffer(&mut self, kind: BufferKind, size_in_bytes: usize) {
        self.commands.push(Command::ResizeBuffer {
            kind,
            size_in_bytes,
        });
    }

    fn resize_gradient_texture(&mut self, width: u32, height: u32) {
        self.commands
            .push(Command::ResizeGradientTexture { width, height });
    }

    fn resize_tessellation_texture(&mut self, width: u32, height: u32) {
        self.commands
            .push(Command::ResizeTessellationTexture { width, height });
    }

    fn prepare_to_map_buffers(&mut self) {
        self.commands.push(Command::PrepareToMapBuffers);
    }

    fn unmap_buffer(&mut self, kind: BufferKind, contents: &[u8]) {
        self.buffers.insert(kind, contents.to_vec());
    }

    fn flush(&mut self, desc: &FlushDescriptor, _resources: &()) {
        self.flushes.push(desc.clone());
    }

    fn seconds_now(&self) -> f64 {
        self.now
    }

    fn make_image_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> ImageTexture {
        assert_eq!(rgba.len(), width as usize * height as usize * 4);
        self.commands
            .push(Command::MakeImageTexture { width, height });
        ImageTexture::new(width, height)
    }
}

pub type TestContext = RenderContext<RecordingBackend>;

pub fn context() -> TestContext {
    RenderContext::new(RecordingBackend::default())
}

pub fn frame(width: u32, height: u32) -> FrameDescriptor {
    FrameDescriptor {
        render_target_width: width,
        render_target_height: height,
        clear_color: Color::WHITE,
        ..Default::default()
    }
}

/// A budget that only limits the number of paths per logical flush.
pub fn path_budget(paths: usize) -> ResourceCounters {
    let unlimited = usize::MAX / 4;
    ResourceCounters {
        midpoint_fan_tess_vertex_count: unlimited,
        outer_cubic_tess_vertex_count: unlimited,
        path_count: paths,
        contour_count: unlimited,
        max_tessellated_segment_count: unlimited,
        max_triangle_vertex_count: unlimited,
        image_draw_count: unlimited,
        complex_gradient_span_count: unlimited,
    }
}

/// `count` small circles laid out in rows across a `width` wide target.
pub fn circle_grid(count: usize, width: u32) -> Vec<BezPath> {
    let per_row = (width / 20).max(1) as usize;
    (0..count)
        .map(|i| {
            let center = (
                10.0 + 20.0 * (i % per_row) as f64,
                10.0 + 20.0 * (i / per_row) as f64,
            );
            Circle::new(center, 8.0).to_path(0.1)
        })
        .collect()
}

pub fn rect_path(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
    Rect::new(x0, y0, x1, y1).to_path(0.1)
}

/// A path that is not a rectangle, so clipping with it uses the clip buffer.
pub fn diamond(center: (f64, f64), radius: f64) -> BezPath {
    let mut path = BezPath::new();
    path.move_to((center.0, center.1 - radius));
    path.line_to((center.0 + radius, center.1));
    path.line_to((center.0, center.1 + radius));
    path.line_to((center.0 - radius, center.1));
    path.close_path();
    path
}

/// Totals of a frame's flushes that must not depend on how the frame was split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTotals {
    /// Paths drawn, not counting each flush's clear color path.
    pub paths: usize,
    pub contours: usize,
    pub midpoint_fan_instances: u32,
    pub outer_curve_instances: u32,
    pub triangle_vertices: u32,
}

pub fn frame_totals(flushes: &[FlushDescriptor]) -> FrameTotals {
    let mut totals = FrameTotals::default();
    for flush in flushes {
        totals.paths += flush.path_count - 1;
        totals.contours += flush.contour_count;
        for batch in &flush.draw_list {
            match batch.draw_type {
                DrawType::MidpointFanPatches => totals.midpoint_fan_instances += batch.element_count,
                DrawType::OuterCurvePatches => totals.outer_curve_instances += batch.element_count,
                DrawType::InteriorTriangulation | DrawType::StencilClipReset => {
                    totals.triangle_vertices += batch.element_count;
                }
                _ => {}
            }
        }
    }
    totals
}

/// Encodes RGBA8 pixels as a PNG.
pub fn encode_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>> {
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow::anyhow!("pixel data doesn't match {width}x{height}"))?;
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}
