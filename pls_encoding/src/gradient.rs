// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

use crate::draw::ColorInt;

/// Where a color ramp lives in the gradient texture.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorRampLocation {
    pub row: u16,
    pub col: u16,
}

impl ColorRampLocation {
    /// Column value marking a ramp that spans a full row.
    pub const COMPLEX_GRADIENT_MARKER: u16 = 0xffff;

    pub const fn complex(row: u16) -> Self {
        Self {
            row,
            col: Self::COMPLEX_GRADIENT_MARKER,
        }
    }

    pub const fn is_complex(&self) -> bool {
        self.col == Self::COMPLEX_GRADIENT_MARKER
    }
}

/// Vertical layout of the gradient texture, only known at write time.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GradTextureLayout {
    /// First row of the complex ramps, right below the simple ramps.
    pub complex_offset_y: u32,
    pub inverse_height: f32,
}

/// One instance of a horizontal span of a complex color ramp, rendered by the GPU.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct GradientSpan {
    /// `x1_fixed << 16 | x0_fixed`, normalized texel coordinates in `0..=65535`.
    pub horizontal_span: u32,
    pub y: u32,
    pub color0: u32,
    pub color1: u32,
}

impl GradientSpan {
    pub fn new(x0_fixed: u32, x1_fixed: u32, y: u32, color0: ColorInt, color1: ColorInt) -> Self {
        debug_assert!(x0_fixed < 65536);
        debug_assert!(x1_fixed < 65536);
        Self {
            horizontal_span: (x1_fixed << 16) | x0_fixed,
            y,
            color0,
            color1,
        }
    }

    pub fn x0_fixed(&self) -> u32 {
        self.horizontal_span & 0xffff
    }

    pub fn x1_fixed(&self) -> u32 {
        self.horizontal_span >> 16
    }
}

/// Two RGBA8 texels written straight into the gradient texture for two-stop ramps.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct TwoTexelRamp {
    pub color_data: [u8; 8],
}

impl TwoTexelRamp {
    pub fn new(colors: [ColorInt; 2]) -> Self {
        let mut color_data = [0; 8];
        for (texel, color) in color_data.chunks_exact_mut(4).zip(colors) {
            let [a, r, g, b] = color.to_be_bytes();
            texel.copy_from_slice(&[r, g, b, a]);
        }
        Self { color_data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_packing() {
        let span = GradientSpan::new(128, 65535, 3, 0xff00_00ff, 0xffff_0000);
        assert_eq!(span.x0_fixed(), 128);
        assert_eq!(span.x1_fixed(), 65535);
        assert_eq!(span.y, 3);
    }

    #[test]
    fn two_texel_ramp_is_rgba8() {
        let ramp = TwoTexelRamp::new([0x8011_2233, 0xff44_5566]);
        assert_eq!(
            ramp.color_data,
            [0x11, 0x22, 0x33, 0x80, 0x44, 0x55, 0x66, 0xff]
        );
    }

    #[test]
    fn complex_marker() {
        assert!(ColorRampLocation::complex(9).is_complex());
        assert!(!ColorRampLocation { row: 0, col: 510 }.is_complex());
    }
}
