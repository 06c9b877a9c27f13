// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless

// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(
    clippy::cast_possible_truncation,
    clippy::allow_attributes_without_reason
)]

use anyhow::{bail, Result};
use clap::Parser;
use pls_render::encoding::PlatformFeatures;
use pls_render::kurbo::{Affine, BezPath, Circle, Point, Rect, Shape};
use pls_render::peniko::{BlendMode, Color, ColorStop, Compose, Fill, Mix};
use pls_render::{
    BufferKind, Factory, FlushDescriptor, FrameDescriptor, ImageTexture, PaintStyle,
    RenderContext, RenderContextImpl, RenderPaint, RenderPath, Renderer, StrokeStyle,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.width == 0 || args.height == 0 {
        bail!("render target must not be empty ({}x{})", args.width, args.height);
    }

    let mut context = RenderContext::new(StatsBackend::default());
    if let Some(max_clip_id) = args.max_clip_id {
        context.set_max_clip_id(max_clip_id);
    }
    let scene = Scene::new(&mut context, &args);
    for frame in 0..args.frames {
        context.backend_mut().begin_frame(f64::from(frame) * args.seconds_per_frame);
        context.begin_frame(FrameDescriptor {
            render_target_width: args.width,
            render_target_height: args.height,
            clear_color: Color::WHITE,
            msaa_sample_count: args.msaa,
            disable_raster_ordering: args.atomics,
            ..Default::default()
        });
        // Draw fewer paths in later frames so the periodic trim has something to do.
        let count = scene.paths.len() * (args.frames - frame) as usize / args.frames as usize;
        scene.draw(&mut Renderer::new(&mut context), count);
        context.flush(&());

        let stats = &context.backend().frame;
        println!(
            "frame {frame}: {count} paths in {} logical flushes, {} batches, {} bytes uploaded, {} resizes",
            stats.flushes, stats.batches, stats.bytes_uploaded, stats.resizes
        );
        log::info!(
            "frame {frame} allocation: {}",
            context.current_resource_allocations().memory()
        );
    }
    context.release_resources();
    Ok(())
}

#[derive(Parser, Debug)]
#[command(about, long_about = None, bin_name="cargo run -p headless --")]
struct Args {
    #[arg(long, default_value_t = 1024)]
    width: u32,
    #[arg(long, default_value_t = 1024)]
    height: u32,
    /// Number of shapes in the scene
    #[arg(long, default_value_t = 2000)]
    paths: usize,
    /// Number of frames to record
    #[arg(long, default_value_t = 8)]
    frames: u32,
    /// Simulated time between frames, which drives resource trimming
    #[arg(long, default_value_t = 2.0)]
    seconds_per_frame: f64,
    /// Lower the clip ID limit of each logical flush to force splits
    #[arg(long)]
    max_clip_id: Option<u32>,
    /// MSAA sample count; nonzero renders with depth/stencil interlock
    #[arg(long, default_value_t = 0)]
    msaa: u32,
    /// Use atomic interlock instead of raster ordering
    #[arg(long)]
    atomics: bool,
}

/// What the backend saw during one frame.
#[derive(Default, Debug)]
struct FrameStats {
    flushes: usize,
    batches: usize,
    bytes_uploaded: usize,
    resizes: usize,
}

/// A backend that only keeps statistics.
#[derive(Default)]
struct StatsBackend {
    now: f64,
    frame: FrameStats,
}

impl StatsBackend {
    fn begin_frame(&mut self, now: f64) {
        self.now = now;
        self.frame = FrameStats::default();
    }
}

impl RenderContextImpl for StatsBackend {
    type FlushResources = ();

    fn platform_features(&self) -> PlatformFeatures {
        PlatformFeatures::default()
    }

    fn resize_buffer(&mut self, kind: BufferKind, size_in_bytes: usize) {
        log::debug!("resize {kind:?} to {size_in_bytes} bytes");
        self.frame.resizes += 1;
    }

    fn resize_gradient_texture(&mut self, width: u32, height: u32) {
        log::debug!("resize gradient texture to {width}x{height}");
        self.frame.resizes += 1;
    }

    fn resize_tessellation_texture(&mut self, width: u32, height: u32) {
        log::debug!("resize tessellation texture to {width}x{height}");
        self.frame.resizes += 1;
    }

    fn unmap_buffer(&mut self, _kind: BufferKind, contents: &[u8]) {
        self.frame.bytes_uploaded += contents.len();
    }

    fn flush(&mut self, desc: &FlushDescriptor, _resources: &()) {
        log::debug!(
            "flush {}: {} paths, {} contours, {} tessellation spans, features {:?}",
            desc.flush_index,
            desc.path_count,
            desc.contour_count,
            desc.tess_vertex_span_count,
            desc.combined_shader_features
        );
        self.frame.flushes += 1;
        self.frame.batches += desc.draw_list.len();
    }

    fn seconds_now(&self) -> f64 {
        self.now
    }

    fn make_image_texture(&mut self, width: u32, height: u32, _rgba: &[u8]) -> ImageTexture {
        ImageTexture::new(width, height)
    }
}

/// A grid of shapes under a few clips, mixing fills, strokes and gradients.
struct Scene {
    paths: Vec<(RenderPath, RenderPaint)>,
    clips: Vec<RenderPath>,
}

impl Scene {
    fn new<B: RenderContextImpl>(context: &mut RenderContext<B>, args: &Args) -> Self {
        let (width, height) = (f64::from(args.width), f64::from(args.height));
        let per_row = (args.paths as f64).sqrt().ceil().max(1.0) as usize;
        let cell = (width.min(height) / per_row as f64).max(1.0);
        let paths = (0..args.paths)
            .map(|i| {
                let center = Point::new(
                    (i % per_row) as f64 * cell + cell * 0.5,
                    (i / per_row) as f64 * cell + cell * 0.5,
                );
                let shape: BezPath = if i % 3 == 0 {
                    Rect::from_center_size(center, (cell * 0.8, cell * 0.6)).to_path(0.1)
                } else {
                    Circle::new(center, cell * 0.4).to_path(0.1)
                };
                let path = context.make_render_path(shape, Fill::NonZero);
                let hue = (i * 37 % 256) as u8;
                let color = Color::rgba8(hue, 255 - hue, 128, 255);
                let paint = match i % 4 {
                    0 => context.make_render_paint(PaintStyle::Fill, color),
                    1 => context.make_render_paint(
                        PaintStyle::Stroke(StrokeStyle::new((cell * 0.05).max(1.0) as f32)),
                        color,
                    ),
                    2 => {
                        let stops = [
                            ColorStop::from((0.0, color)),
                            ColorStop::from((1.0, Color::BLACK)),
                        ];
                        let paint = context.make_render_paint(PaintStyle::Fill, color);
                        match context.make_radial_gradient(center, (cell * 0.4) as f32, &stops) {
                            Some(gradient) => paint.with_gradient(gradient),
                            None => paint,
                        }
                    }
                    _ => context
                        .make_render_paint(PaintStyle::Fill, color.with_alpha_factor(0.5))
                        .with_blend_mode(BlendMode::new(Mix::Multiply, Compose::SrcOver)),
                };
                (path, paint)
            })
            .collect();

        // Quadrants clipped by diamonds, each a distinct clip.
        let clips = [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)]
            .into_iter()
            .map(|(x, y)| {
                let (cx, cy, r) = (width * x, height * y, width.min(height) * 0.3);
                let mut diamond = BezPath::new();
                diamond.move_to((cx, cy - r));
                diamond.line_to((cx + r, cy));
                diamond.line_to((cx, cy + r));
                diamond.line_to((cx - r, cy));
                diamond.close_path();
                context.make_render_path(diamond, Fill::NonZero)
            })
            .collect();
        Self { paths, clips }
    }

    fn draw<B: RenderContextImpl>(&self, renderer: &mut Renderer<'_, B>, count: usize) {
        let per_clip = count.div_ceil(self.clips.len()).max(1);
        for (clip, chunk) in self.clips.iter().zip(self.paths[..count].chunks(per_clip)) {
            renderer.save();
            renderer.clip_path(clip);
            for (path, paint) in chunk {
                renderer.draw_path(path, paint);
            }
            renderer.restore();
        }
        // A slightly rotated pass over the first few shapes, outside any clip.
        renderer.save();
        renderer.transform(Affine::rotate_about(0.05, Point::new(0.0, 0.0)));
        for (path, paint) in self.paths.iter().take(count.min(64)) {
            renderer.draw_path(path, paint);
        }
        renderer.restore();
    }
}
