// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The immediate mode drawing interface on top of a [`RenderContext`].

use std::sync::Arc;

use peniko::kurbo::{Affine, BezPath, Cap, Join, Rect, Shape};
use peniko::{BlendMode, Fill};
use pls_encoding::{IAabb, InterlockMode, Transform};

use crate::backend::RenderContextImpl;
use crate::context::{FlushHandle, RenderContext};
use crate::draw::{Draw, DrawCommon, PaintInfo};
use crate::factory::{RenderBuffer, RenderImage, RenderPaint, RenderPath};
use crate::geometry;
use crate::Result;

/// Miter joins can reach this many stroke radii past the path.
const MITER_BOUNDS_FACTOR: f64 = 4.0;

/// The matrix that takes pixels to a space where `rect`, drawn with `matrix`, covers `[-1, 1]`
/// on both axes.
fn clip_rect_inverse(rect: Rect, matrix: &Affine) -> Option<Transform> {
    if matrix.determinant() == 0.0 || rect.area() == 0.0 {
        return None;
    }
    let to_unit = Affine::new([
        2.0 / rect.width(),
        0.0,
        0.0,
        2.0 / rect.height(),
        -(rect.x0 + rect.x1) / rect.width(),
        -(rect.y0 + rect.y1) / rect.height(),
    ]);
    Some(Transform::from_kurbo(&(to_unit * matrix.inverse())))
}

#[derive(Clone, Debug)]
struct RenderState {
    matrix: Affine,
    clip_stack_height: usize,
    clip_rect_inverse: Option<Transform>,
    /// A clip with no pixels is in effect; every draw is dropped.
    clip_is_empty: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            matrix: Affine::IDENTITY,
            clip_stack_height: 0,
            clip_rect_inverse: None,
            clip_is_empty: false,
        }
    }
}

#[derive(Clone, Debug)]
struct ClipElement {
    matrix: Affine,
    path: Arc<BezPath>,
    fill: Fill,
    pixel_bounds: IAabb,
    /// Only meaningful within `flush`.
    clip_id: u32,
    flush: Option<FlushHandle>,
}

/// Records draws into a [`RenderContext`] for the frame in progress.
///
/// Keeps a stack of transforms and clips, turns each call into [`Draw`]s, and runs the retry
/// protocol: when a batch doesn't fit, the context is given a new logical flush and the batch,
/// clip updates included, is tried once more.
pub struct Renderer<'a, B: RenderContextImpl> {
    context: &'a mut RenderContext<B>,
    stack: Vec<RenderState>,
    clip_stack: Vec<ClipElement>,
}

impl<'a, B: RenderContextImpl> Renderer<'a, B> {
    pub fn new(context: &'a mut RenderContext<B>) -> Self {
        debug_assert!(
            context.frame_descriptor().is_some(),
            "renderer created outside of a frame"
        );
        Self {
            context,
            stack: vec![RenderState::default()],
            clip_stack: Vec::new(),
        }
    }

    pub fn context(&mut self) -> &mut RenderContext<B> {
        self.context
    }

    fn state(&self) -> &RenderState {
        let Some(state) = self.stack.last() else {
            unreachable!("the state stack is never empty")
        };
        state
    }

    fn state_mut(&mut self) -> &mut RenderState {
        let Some(state) = self.stack.last_mut() else {
            unreachable!("the state stack is never empty")
        };
        state
    }

    pub fn save(&mut self) {
        let state = self.state().clone();
        self.stack.push(state);
    }

    pub fn restore(&mut self) {
        debug_assert!(self.stack.len() > 1, "restore without save");
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        let height = self.state().clip_stack_height;
        self.clip_stack.truncate(height);
    }

    pub fn transform(&mut self, matrix: Affine) {
        let state = self.state_mut();
        state.matrix *= matrix;
    }

    pub fn matrix(&self) -> Affine {
        self.state().matrix
    }

    fn target_bounds(&self) -> IAabb {
        self.context
            .frame_descriptor()
            .map_or(IAabb::ZERO, |frame| frame.bounds())
    }

    fn pixel_bounds(&self, rect: Rect, matrix: &Affine, outset: f64) -> IAabb {
        geometry::pixel_bounds(rect, matrix, outset).intersect(&self.target_bounds())
    }

    pub fn draw_path(&mut self, path: &RenderPath, paint: &RenderPaint) {
        let Some(frame) = self.context.frame_descriptor() else {
            return;
        };
        let stroke = paint.stroke().copied();
        if (stroke.is_some() && frame.strokes_disabled)
            || (stroke.is_none() && frame.fills_disabled)
        {
            return;
        }
        let state = self.state();
        if state.clip_is_empty {
            return;
        }
        let matrix = state.matrix;
        // One pixel of slack for antialiasing.
        let outset = stroke.map_or(0.0, |s| {
            let factor = if s.join == Join::Miter {
                MITER_BOUNDS_FACTOR
            } else if s.cap == Cap::Square {
                // Square cap corners stick out diagonally.
                std::f64::consts::SQRT_2
            } else {
                1.0
            };
            f64::from(s.thickness) * 0.5 * factor * geometry::max_scale(&matrix)
        }) + 1.0;
        let bounds = self.pixel_bounds(path.bounds, &matrix, outset);
        if bounds.is_empty() {
            return;
        }
        let common = DrawCommon::new(matrix, bounds, paint.paint_info(), paint.blend_mode);
        let interlock_mode = self.context.interlock_mode();
        let Some(draw) = Draw::from_path(
            &mut self.context.allocators,
            common,
            &path.path,
            path.fill,
            stroke.as_ref(),
            interlock_mode,
        ) else {
            return;
        };
        self.push_clipped(draw);
    }

    /// Intersects the current clip with `path`.
    ///
    /// The first axis-aligned rectangle clipped within a state becomes a clip rect, which costs
    /// nothing to render. Everything else goes on the clip stack and is rendered into the clip
    /// buffer when a draw needs it.
    pub fn clip_path(&mut self, path: &RenderPath) {
        let state = self.state();
        if state.clip_is_empty {
            return;
        }
        let matrix = state.matrix;
        let has_clip_rect = state.clip_rect_inverse.is_some();
        let height = state.clip_stack_height;
        let bounds = self.pixel_bounds(path.bounds, &matrix, 1.0);
        if bounds.is_empty() {
            self.state_mut().clip_is_empty = true;
            return;
        }
        let clip_rect = path
            .rect
            .filter(|_| !has_clip_rect)
            .and_then(|rect| clip_rect_inverse(rect, &matrix));
        if let Some(inverse) = clip_rect {
            self.state_mut().clip_rect_inverse = Some(inverse);
            return;
        }
        self.clip_stack.truncate(height);
        self.clip_stack.push(ClipElement {
            matrix,
            path: path.path.clone(),
            fill: path.fill,
            pixel_bounds: bounds,
            clip_id: 0,
            flush: None,
        });
        self.state_mut().clip_stack_height = height + 1;
    }

    /// Draws `image` over the unit rectangle scaled to its size.
    pub fn draw_image(&mut self, image: &RenderImage, blend_mode: BlendMode, opacity: f32) {
        let state = self.state();
        if state.clip_is_empty {
            return;
        }
        let (width, height) = (f64::from(image.width()), f64::from(image.height()));
        let matrix = state.matrix * Affine::scale_non_uniform(width, height);
        let unit = Rect::new(0.0, 0.0, 1.0, 1.0);
        let bounds = self.pixel_bounds(unit, &matrix, 1.0);
        if bounds.is_empty() {
            return;
        }
        let paint = PaintInfo::image(image.texture.clone(), opacity);
        let common = DrawCommon::new(matrix, bounds, paint, blend_mode);
        let interlock_mode = self.context.interlock_mode();
        let draw = if interlock_mode == InterlockMode::Atomics
            && !self.context.platform_features().supports_bindless_textures
        {
            Draw::image_rect(common)
        } else {
            let Some(draw) = Draw::from_path(
                &mut self.context.allocators,
                common,
                &unit.to_path(0.1),
                Fill::NonZero,
                None,
                interlock_mode,
            ) else {
                return;
            };
            draw
        };
        self.push_clipped(draw);
    }

    /// Draws a triangle mesh textured with `image`.
    ///
    /// `vertices` and `uvs` hold `f32` pairs, `indices` holds `u16` triangle indices.
    pub fn draw_image_mesh(
        &mut self,
        image: &RenderImage,
        vertices: &Arc<RenderBuffer>,
        uvs: &Arc<RenderBuffer>,
        indices: &Arc<RenderBuffer>,
        blend_mode: BlendMode,
        opacity: f32,
    ) -> Result<()> {
        let positions = vertices.as_f32s()?;
        uvs.as_f32s()?;
        let index_count = indices.as_u16s()?.len();
        let state = self.state();
        if state.clip_is_empty || index_count == 0 {
            return Ok(());
        }
        let matrix = state.matrix;
        let mesh_bounds = positions
            .chunks_exact(2)
            .map(|p| Rect::new(f64::from(p[0]), f64::from(p[1]), f64::from(p[0]), f64::from(p[1])))
            .reduce(|a, b| a.union(b));
        let Some(mesh_bounds) = mesh_bounds else {
            return Ok(());
        };
        let bounds = self.pixel_bounds(mesh_bounds, &matrix, 1.0);
        if bounds.is_empty() {
            return Ok(());
        }
        let paint = PaintInfo::image(image.texture.clone(), opacity);
        let common = DrawCommon::new(matrix, bounds, paint, blend_mode);
        let draw = Draw::image_mesh(
            common,
            vertices.clone(),
            uvs.clone(),
            indices.clone(),
            index_count as u32,
        );
        self.push_clipped(draw);
        Ok(())
    }

    /// Pushes `draw` along with whatever clip updates it needs, retrying once in a new logical
    /// flush.
    fn push_clipped(&mut self, draw: Draw) {
        for attempt in 0..2 {
            if attempt > 0 {
                self.context.logical_flush();
            }
            let content_id = self.context.clip_content_id();
            let mut draws = Vec::new();
            let Some(clip_id) = self.apply_clip(&mut draws) else {
                continue;
            };
            let mut draw = draw.clone();
            draw.set_clip_id(clip_id);
            draw.common_mut().clip_rect_inverse = self.state().clip_rect_inverse;
            draws.push(draw);
            if self.context.push_draw_batch(&mut draws) {
                return;
            }
            // The clip updates were never pushed.
            self.context.set_clip_content_id(content_id);
        }
        log::warn!(
            "dropping a draw that doesn't fit in an empty logical flush ({:?})",
            draw.pixel_bounds()
        );
    }

    /// Makes the clip buffer hold the current clip stack and returns the ID to test against.
    ///
    /// Elements already in the clip buffer of the current flush are reused; the rest get new
    /// clip IDs and clip update draws, which are added to `draws`. Returns `None` if the flush is
    /// out of clip IDs.
    fn apply_clip(&mut self, draws: &mut Vec<Draw>) -> Option<u32> {
        let height = self.state().clip_stack_height;
        if height == 0 {
            return Some(0);
        }
        let handle = self.context.current_flush_handle();
        let content_id = self.context.clip_content_id();
        // The deepest element whose clip is what the buffer currently holds. Elements below it
        // are still valid because each one was rendered inside the one before.
        let retained = (content_id != 0)
            .then(|| {
                self.clip_stack[..height]
                    .iter()
                    .position(|c| c.flush == Some(handle) && c.clip_id == content_id)
            })
            .flatten();
        if retained == Some(height - 1) {
            return Some(content_id);
        }

        let first_dirty = retained.map_or(0, |i| i + 1);
        let interlock_mode = self.context.interlock_mode();
        if interlock_mode == InterlockMode::DepthStencil && content_id != 0 {
            // The stencil buffer still holds the previous clip. Erase it, or intersect it down to
            // the retained element.
            if let Some(previous) = self.context.clip_content_bounds(handle, content_id) {
                let mut reset = Draw::stencil_clip_reset(previous, retained.is_some());
                reset.set_clip_id(retained.map_or(0, |_| content_id));
                draws.push(reset);
            }
        }

        let mut outer_clip_id = retained.map_or(0, |i| self.clip_stack[i].clip_id);
        for i in first_dirty..height {
            let element = &self.clip_stack[i];
            let clip_id = self.context.generate_clip_id(element.pixel_bounds);
            if clip_id == 0 {
                return None;
            }
            let common = DrawCommon::new(
                element.matrix,
                element.pixel_bounds,
                PaintInfo::clip_update(outer_clip_id),
                BlendMode::default(),
            );
            let update = Draw::from_path(
                &mut self.context.allocators,
                common,
                &element.path,
                element.fill,
                None,
                interlock_mode,
            );
            if let Some(mut update) = update {
                update.set_clip_id(clip_id);
                draws.push(update);
            }
            let element = &mut self.clip_stack[i];
            element.clip_id = clip_id;
            element.flush = Some(handle);
            outer_clip_id = clip_id;
        }
        self.context.set_clip_content_id(outer_clip_id);
        Some(outer_clip_id)
    }
}
