// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use peniko::{BlendMode, Color, Mix};

/// A color packed as `0xAARRGGBB`.
pub type ColorInt = u32;

/// Packs a peniko color as `0xAARRGGBB`.
pub fn color_to_int(color: Color) -> ColorInt {
    u32::from_be_bytes([color.a, color.r, color.g, color.b])
}

pub fn color_int_alpha(color: ColorInt) -> u8 {
    (color >> 24) as u8
}

/// Swizzles a `0xAARRGGBB` color to little-endian RGBA, the order the shaders expect.
pub fn swizzle_color_to_rgba(color: ColorInt) -> u32 {
    (color & 0xff00_ff00) | (color.rotate_left(16) & 0x00ff_00ff)
}

/// Specifies what to do with the render target at the beginning of a flush.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoadAction {
    #[default]
    Clear,
    PreserveRenderTarget,
    DontCare,
}

/// Synchronization method for pixel local storage with overlapping fragments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InterlockMode {
    #[default]
    RasterOrdering,
    Atomics,
    DepthStencil,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PaintType {
    #[default]
    SolidColor = 0,
    LinearGradient = 1,
    RadialGradient = 2,
    Image = 3,
    /// Update the clip buffer instead of drawing to the framebuffer.
    ClipUpdate = 4,
}

impl PaintType {
    pub fn is_gradient(self) -> bool {
        matches!(self, Self::LinearGradient | Self::RadialGradient)
    }
}

/// Low-level draw primitive executed by one draw batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DrawType {
    MidpointFanPatches,
    OuterCurvePatches,
    InteriorTriangulation,
    ImageRect,
    ImageMesh,
    StencilClipReset,
    AtomicResolve,
}

impl DrawType {
    pub fn is_image_draw(self) -> bool {
        matches!(self, Self::ImageRect | Self::ImageMesh)
    }

    /// Tessellation vertices per instance, for patch draw types.
    pub fn patch_segment_span(self) -> Option<u32> {
        match self {
            Self::MidpointFanPatches => Some(crate::MIDPOINT_FAN_PATCH_SEGMENT_SPAN),
            Self::OuterCurvePatches => Some(crate::OUTER_CURVE_PATCH_SEGMENT_SPAN),
            _ => None,
        }
    }
}

bitflags! {
    /// "Uber shader" switches that can be turned off for a batch that doesn't need them.
    ///
    /// Turning every feature on must still draw simple content identically.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFeatures: u32 {
        // Whole program features.
        const ENABLE_CLIPPING = 1 << 0;
        const ENABLE_CLIP_RECT = 1 << 1;
        const ENABLE_ADVANCED_BLEND = 1 << 2;

        // Fragment-only features.
        const ENABLE_EVEN_ODD = 1 << 3;
        const ENABLE_NESTED_CLIPPING = 1 << 4;
        const ENABLE_HSL_BLEND_MODES = 1 << 5;
    }
}

impl ShaderFeatures {
    pub const VERTEX_MASK: Self = Self::ENABLE_CLIPPING
        .union(Self::ENABLE_CLIP_RECT)
        .union(Self::ENABLE_ADVANCED_BLEND);

    /// Features an interlock mode is able to honor.
    pub fn mask_for_interlock_mode(mode: InterlockMode) -> Self {
        match mode {
            InterlockMode::RasterOrdering => Self::all(),
            InterlockMode::Atomics => Self::all().difference(Self::ENABLE_NESTED_CLIPPING),
            InterlockMode::DepthStencil => Self::ENABLE_CLIP_RECT
                .union(Self::ENABLE_ADVANCED_BLEND)
                .union(Self::ENABLE_HSL_BLEND_MODES),
        }
    }

    /// Features a draw type is able to honor under the given interlock mode.
    pub fn mask_for_draw_type(draw_type: DrawType, mode: InterlockMode) -> Self {
        let mask = match draw_type {
            DrawType::ImageRect | DrawType::ImageMesh if mode != InterlockMode::Atomics => {
                Self::ENABLE_CLIPPING
                    | Self::ENABLE_CLIP_RECT
                    | Self::ENABLE_ADVANCED_BLEND
                    | Self::ENABLE_HSL_BLEND_MODES
            }
            // Atomic mode resolves earlier draws when drawing images, so images carry the same
            // features as paths there.
            DrawType::ImageRect
            | DrawType::ImageMesh
            | DrawType::MidpointFanPatches
            | DrawType::OuterCurvePatches
            | DrawType::InteriorTriangulation
            | DrawType::AtomicResolve => Self::all(),
            DrawType::StencilClipReset => Self::empty(),
        };
        mask & Self::mask_for_interlock_mode(mode)
    }

    /// Blend-related features required to draw with `blend_mode`.
    pub fn for_blend_mode(blend_mode: BlendMode) -> Self {
        match blend_mode.mix {
            Mix::Hue | Mix::Saturation | Mix::Color | Mix::Luminosity => {
                Self::ENABLE_ADVANCED_BLEND | Self::ENABLE_HSL_BLEND_MODES
            }
            Mix::Normal | Mix::Clip => Self::empty(),
            _ => Self::ENABLE_ADVANCED_BLEND,
        }
    }
}

bitflags! {
    /// What a draw contains. These don't change shaders, but they break batching in
    /// `DepthStencil` mode and participate in sorting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DrawContents: u32 {
        const OPAQUE_PAINT = 1 << 0;
        const STROKE = 1 << 1;
        const EVEN_ODD_FILL = 1 << 2;
        const ACTIVE_CLIP = 1 << 3;
        const CLIP_UPDATE = 1 << 4;
        const ADVANCED_BLEND = 1 << 5;
    }
}

impl DrawContents {
    /// A nested clip updates the clip buffer while clipping against the clip already in it.
    pub const NESTED_CLIP_UPDATE: Self = Self::ACTIVE_CLIP.union(Self::CLIP_UPDATE);
}

/// Converts a blend mode to the tightly packed range the shaders use.
pub fn pls_blend_mode(blend_mode: BlendMode) -> u32 {
    match blend_mode.mix {
        Mix::Screen => 1,
        Mix::Overlay => 2,
        Mix::Darken => 3,
        Mix::Lighten => 4,
        Mix::ColorDodge => 5,
        Mix::ColorBurn => 6,
        Mix::HardLight => 7,
        Mix::SoftLight => 8,
        Mix::Difference => 9,
        Mix::Exclusion => 10,
        Mix::Multiply => 11,
        Mix::Hue => 12,
        Mix::Saturation => 13,
        Mix::Color => 14,
        Mix::Luminosity => 15,
        _ => 0,
    }
}
