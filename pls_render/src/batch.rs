// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw batches: runs of GPU work the backend executes with a single draw call.

use std::sync::Arc;

use peniko::BlendMode;
use pls_encoding::{DrawContents, DrawType, InterlockMode, PaintType, ShaderFeatures};

use crate::backend::ImageTexture;
use crate::factory::RenderBuffer;

/// A contiguous run of instances, triangles or indices sharing one draw type.
#[derive(Clone, Debug)]
pub struct DrawBatch {
    pub draw_type: DrawType,
    /// First instance, vertex or index read by the batch.
    pub base_element: u32,
    pub element_count: u32,
    /// The backend must make earlier pixel local storage writes visible before this batch.
    pub needs_barrier: bool,
    pub shader_features: ShaderFeatures,
    pub draw_contents: DrawContents,
    pub image_texture: Option<Arc<ImageTexture>>,
    /// Byte offset of the batch's [`ImageDrawUniforms`](pls_encoding::ImageDrawUniforms).
    pub image_draw_data_offset: usize,
    pub vertex_buffer: Option<Arc<RenderBuffer>>,
    pub uv_buffer: Option<Arc<RenderBuffer>>,
    pub index_buffer: Option<Arc<RenderBuffer>>,
}

impl DrawBatch {
    pub fn new(draw_type: DrawType, base_element: u32) -> Self {
        Self {
            draw_type,
            base_element,
            element_count: 0,
            needs_barrier: false,
            shader_features: ShaderFeatures::empty(),
            draw_contents: DrawContents::empty(),
            image_texture: None,
            image_draw_data_offset: 0,
            vertex_buffer: None,
            uv_buffer: None,
            index_buffer: None,
        }
    }

    fn images_compatible(&self, image: Option<&Arc<ImageTexture>>) -> bool {
        match (&self.image_texture, image) {
            (Some(a), Some(b)) => a.id == b.id,
            _ => true,
        }
    }
}

/// What a single draw contributes to the batch it lands in.
#[derive(Clone, Copy, Debug)]
pub struct BatchParams<'a> {
    pub paint_type: PaintType,
    pub image: Option<&'a Arc<ImageTexture>>,
    pub clip_id: u32,
    pub has_clip_rect: bool,
    pub blend_mode: BlendMode,
    pub draw_contents: DrawContents,
}

impl BatchParams<'_> {
    fn shader_features(&self) -> ShaderFeatures {
        let mut features = ShaderFeatures::empty();
        if self.clip_id != 0 {
            features |= ShaderFeatures::ENABLE_CLIPPING;
        }
        if self.paint_type != PaintType::ClipUpdate {
            if self.has_clip_rect {
                features |= ShaderFeatures::ENABLE_CLIP_RECT;
            }
            features |= ShaderFeatures::for_blend_mode(self.blend_mode);
        }
        features
    }
}

/// The ordered draw batches of one logical flush.
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    batches: Vec<DrawBatch>,
    combined_shader_features: ShaderFeatures,
    interlock_mode: InterlockMode,
}

impl DrawList {
    pub fn new(interlock_mode: InterlockMode) -> Self {
        Self {
            interlock_mode,
            ..Default::default()
        }
    }

    pub fn interlock_mode(&self) -> InterlockMode {
        self.interlock_mode
    }

    pub fn set_interlock_mode(&mut self, interlock_mode: InterlockMode) {
        debug_assert!(self.batches.is_empty());
        self.interlock_mode = interlock_mode;
    }

    /// Adds a draw to the list, extending the last batch when it can.
    ///
    /// Only patch draws merge, and only into a batch of the same type that has no pending barrier
    /// and no conflicting image. In `DepthStencil` mode the draw contents must match as well.
    /// The caller adds its element count to the returned batch.
    pub fn push_draw(
        &mut self,
        draw_type: DrawType,
        base_element: u32,
        params: &BatchParams<'_>,
    ) -> &mut DrawBatch {
        let mergeable = matches!(
            draw_type,
            DrawType::MidpointFanPatches | DrawType::OuterCurvePatches
        ) && self.batches.last().is_some_and(|tail| {
            tail.draw_type == draw_type
                && !tail.needs_barrier
                && tail.images_compatible(params.image)
                && (self.interlock_mode != InterlockMode::DepthStencil
                    || tail.draw_contents == params.draw_contents)
        });
        if !mergeable {
            self.batches.push(DrawBatch::new(draw_type, base_element));
        }
        let mode = self.interlock_mode;
        let features = params.shader_features() & ShaderFeatures::mask_for_draw_type(draw_type, mode);
        self.combined_shader_features |= features;
        let Some(batch) = self.batches.last_mut() else {
            unreachable!("a batch was just pushed")
        };
        debug_assert_eq!(
            batch.base_element + batch.element_count,
            base_element,
            "merged draws must be contiguous"
        );
        batch.shader_features |= features;
        if mode == InterlockMode::DepthStencil {
            batch.draw_contents = params.draw_contents;
        } else {
            batch.draw_contents |= params.draw_contents;
        }
        if params.paint_type == PaintType::Image {
            if let Some(image) = params.image {
                batch.image_texture = Some(image.clone());
            }
        }
        batch
    }

    /// Turns on extra shader features for the last batch, as far as its draw type allows.
    pub fn add_tail_shader_features(&mut self, features: ShaderFeatures) {
        let mode = self.interlock_mode;
        if let Some(tail) = self.batches.last_mut() {
            let features = features & ShaderFeatures::mask_for_draw_type(tail.draw_type, mode);
            tail.shader_features |= features;
            self.combined_shader_features |= features;
        }
    }

    /// Adds a batch that is not produced by a draw, like the atomic resolve.
    pub fn push_batch(&mut self, batch: DrawBatch) -> &mut DrawBatch {
        self.combined_shader_features |= batch.shader_features;
        self.batches.push(batch);
        let Some(batch) = self.batches.last_mut() else {
            unreachable!("a batch was just pushed")
        };
        batch
    }

    /// Makes the next batch wait for every batch before it.
    pub fn push_barrier(&mut self) {
        if let Some(tail) = self.batches.last_mut() {
            tail.needs_barrier = true;
        }
    }

    pub fn tail_mut(&mut self) -> Option<&mut DrawBatch> {
        self.batches.last_mut()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawBatch> {
        self.batches.iter()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn combined_shader_features(&self) -> ShaderFeatures {
        self.combined_shader_features
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.combined_shader_features = ShaderFeatures::empty();
    }

    pub fn reset_containers(&mut self) {
        self.batches = Vec::new();
        self.combined_shader_features = ShaderFeatures::empty();
    }
}

impl<'a> IntoIterator for &'a DrawList {
    type Item = &'a DrawBatch;
    type IntoIter = std::slice::Iter<'a, DrawBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::{Compose, Mix};

    fn params(clip_id: u32) -> BatchParams<'static> {
        BatchParams {
            paint_type: PaintType::SolidColor,
            image: None,
            clip_id,
            has_clip_rect: false,
            blend_mode: BlendMode::default(),
            draw_contents: DrawContents::empty(),
        }
    }

    #[test]
    fn patches_merge() {
        let mut list = DrawList::new(InterlockMode::RasterOrdering);
        list.push_draw(DrawType::MidpointFanPatches, 0, &params(0))
            .element_count += 3;
        list.push_draw(DrawType::MidpointFanPatches, 3, &params(1))
            .element_count += 2;
        assert_eq!(list.len(), 1);
        let batch = list.iter().next().expect("one batch");
        assert_eq!(batch.element_count, 5);
        assert_eq!(batch.shader_features, ShaderFeatures::ENABLE_CLIPPING);
    }

    #[test]
    fn barriers_and_type_changes_split() {
        let mut list = DrawList::new(InterlockMode::Atomics);
        list.push_draw(DrawType::MidpointFanPatches, 0, &params(0))
            .element_count += 1;
        list.push_barrier();
        list.push_draw(DrawType::MidpointFanPatches, 1, &params(0))
            .element_count += 1;
        list.push_draw(DrawType::OuterCurvePatches, 0, &params(0))
            .element_count += 1;
        list.push_draw(DrawType::InteriorTriangulation, 0, &params(0))
            .element_count = 3;
        list.push_draw(DrawType::InteriorTriangulation, 3, &params(0))
            .element_count = 3;
        let types: Vec<_> = list.iter().map(|b| b.draw_type).collect();
        assert_eq!(
            types,
            [
                DrawType::MidpointFanPatches,
                DrawType::MidpointFanPatches,
                DrawType::OuterCurvePatches,
                DrawType::InteriorTriangulation,
                DrawType::InteriorTriangulation,
            ]
        );
    }

    #[test]
    fn images_split_batches() {
        let a = Arc::new(ImageTexture::new(4, 4));
        let b = Arc::new(ImageTexture::new(4, 4));
        let mut list = DrawList::new(InterlockMode::RasterOrdering);
        let image_params = |image| BatchParams {
            paint_type: PaintType::Image,
            image: Some(image),
            ..params(0)
        };
        list.push_draw(DrawType::MidpointFanPatches, 0, &image_params(&a))
            .element_count += 1;
        // Solid paints don't care which image the batch has bound.
        list.push_draw(DrawType::MidpointFanPatches, 1, &params(0))
            .element_count += 1;
        list.push_draw(DrawType::MidpointFanPatches, 2, &image_params(&a))
            .element_count += 1;
        assert_eq!(list.len(), 1);
        list.push_draw(DrawType::MidpointFanPatches, 3, &image_params(&b))
            .element_count += 1;
        assert_eq!(list.len(), 2);
        let tail = list.tail_mut().expect("tail");
        assert_eq!(tail.image_texture.as_ref().map(|t| t.id), Some(b.id));
    }

    #[test]
    fn clip_updates_ignore_blend_features() {
        let mut list = DrawList::new(InterlockMode::RasterOrdering);
        let screen = BlendMode::new(Mix::Screen, Compose::SrcOver);
        let update = BatchParams {
            paint_type: PaintType::ClipUpdate,
            has_clip_rect: true,
            blend_mode: screen,
            ..params(2)
        };
        list.push_draw(DrawType::MidpointFanPatches, 0, &update);
        assert_eq!(
            list.combined_shader_features(),
            ShaderFeatures::ENABLE_CLIPPING
        );
        let draw = BatchParams {
            has_clip_rect: true,
            blend_mode: screen,
            ..params(0)
        };
        list.push_draw(DrawType::MidpointFanPatches, 0, &draw);
        assert_eq!(
            list.combined_shader_features(),
            ShaderFeatures::ENABLE_CLIPPING
                | ShaderFeatures::ENABLE_CLIP_RECT
                | ShaderFeatures::ENABLE_ADVANCED_BLEND
        );
    }

    #[test]
    fn depth_stencil_splits_on_contents() {
        let mut list = DrawList::new(InterlockMode::DepthStencil);
        let opaque = BatchParams {
            draw_contents: DrawContents::OPAQUE_PAINT,
            ..params(0)
        };
        list.push_draw(DrawType::MidpointFanPatches, 0, &opaque)
            .element_count += 1;
        list.push_draw(DrawType::MidpointFanPatches, 1, &opaque)
            .element_count += 1;
        list.push_draw(DrawType::MidpointFanPatches, 2, &params(0))
            .element_count += 1;
        assert_eq!(list.len(), 2);
    }
}
