// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use peniko::kurbo::Affine;

use crate::draw::{swizzle_color_to_rgba, ColorInt};
use crate::math::{IAabb, Transform};

/// Backend capabilities and workarounds that change what gets written.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlatformFeatures {
    /// How far apart unique path IDs are spaced, to work around precision issues.
    pub path_id_granularity: u32,
    pub supports_bindless_textures: bool,
    /// Invert Y when drawing to offscreen render targets (the gradient and tessellation textures).
    pub invert_offscreen_y: bool,
    /// The fragment shader's pixel coordinate goes bottom-up.
    pub frag_coord_bottom_up: bool,
}

impl Default for PlatformFeatures {
    fn default() -> Self {
        Self {
            path_id_granularity: 1,
            supports_bindless_textures: false,
            invert_offscreen_y: false,
            frag_coord_bottom_up: false,
        }
    }
}

/// Per-flush uniforms shared by every shader.
///
/// Uniform blocks must be multiples of 256 bytes, hence the trailing padding.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct FlushUniforms {
    /// `[complex_gradients_y, tess_data_y, render_target_x, render_target_y]`
    pub inverse_viewports: [f32; 4],
    pub render_target_width: u32,
    pub render_target_height: u32,
    /// Only used if clears are implemented as draws.
    pub color_clear_value: u32,
    pub coverage_clear_value: u32,
    pub render_target_update_bounds: IAabb,
    pub path_id_granularity: u32,
    pub vertex_discard_value: f32,
    pub pad: [u8; 200],
}

/// Sizes that feed [`FlushUniforms::new`].
#[derive(Copy, Clone, Debug, Default)]
pub struct FlushUniformsDesc {
    pub complex_gradients_height: u32,
    pub tess_data_height: u32,
    pub render_target_width: u32,
    pub render_target_height: u32,
    pub update_bounds: IAabb,
    pub clear_color: ColorInt,
}

impl FlushUniforms {
    pub fn new(desc: &FlushUniformsDesc, features: &PlatformFeatures) -> Self {
        let mut numerators = [2.0_f32; 4];
        if features.invert_offscreen_y {
            numerators[0] = -2.0;
            numerators[1] = -2.0;
        }
        let denominators = [
            desc.complex_gradients_height,
            desc.tess_data_height,
            desc.render_target_width,
            desc.render_target_height,
        ];
        let mut inverse_viewports = [0.0; 4];
        for ((out, n), d) in inverse_viewports.iter_mut().zip(numerators).zip(denominators) {
            // Empty textures get a zero scale rather than an infinite one.
            *out = if d == 0 { 0.0 } else { n / d as f32 };
        }
        Self {
            inverse_viewports,
            render_target_width: desc.render_target_width,
            render_target_height: desc.render_target_height,
            color_clear_value: swizzle_color_to_rgba(desc.clear_color),
            coverage_clear_value: 0x0000_ffff,
            render_target_update_bounds: desc.update_bounds,
            path_id_granularity: features.path_id_granularity,
            vertex_discard_value: f32::NAN,
            pad: [0; 200],
        }
    }
}

/// Per-draw uniforms for image rects and image meshes.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct ImageDrawUniforms {
    pub matrix: Transform,
    pub opacity: f32,
    pub padding: f32,
    pub clip_rect_inverse_matrix: Transform,
    pub clip_id: u32,
    pub blend_mode: u32,
    pub pad: [u8; 192],
}

impl ImageDrawUniforms {
    pub fn new(
        matrix: &Affine,
        opacity: f32,
        clip_rect_inverse_matrix: Option<&Transform>,
        clip_id: u32,
        blend_mode: u32,
    ) -> Self {
        Self {
            matrix: Transform::from_kurbo(matrix),
            opacity,
            padding: 0.0,
            clip_rect_inverse_matrix: clip_rect_inverse_matrix
                .copied()
                .unwrap_or(Transform::WIDE_OPEN),
            clip_id,
            blend_mode,
            pad: [0; 192],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_viewports() {
        let desc = FlushUniformsDesc {
            complex_gradients_height: 0,
            tess_data_height: 4,
            render_target_width: 100,
            render_target_height: 50,
            ..Default::default()
        };
        let uniforms = FlushUniforms::new(&desc, &PlatformFeatures::default());
        assert_eq!(uniforms.inverse_viewports, [0.0, 0.5, 0.02, 0.04]);
        let inverted = FlushUniforms::new(
            &desc,
            &PlatformFeatures {
                invert_offscreen_y: true,
                ..Default::default()
            },
        );
        assert_eq!(inverted.inverse_viewports[1], -0.5);
        assert!(inverted.vertex_discard_value.is_nan());
    }

    #[test]
    fn image_uniforms_default_clip_rect() {
        let uniforms = ImageDrawUniforms::new(&Affine::IDENTITY, 0.5, None, 3, 0);
        assert_eq!(uniforms.clip_rect_inverse_matrix, Transform::WIDE_OPEN);
        assert_eq!(uniforms.clip_id, 3);
    }
}
