// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use peniko::kurbo::{Affine, Point};

use crate::draw::{swizzle_color_to_rgba, ColorInt, PaintType};
use crate::gradient::{ColorRampLocation, GradTextureLayout};
use crate::math::{point_to_f32, Transform};

/// Per-path record read by the vertex shaders.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct PathData {
    pub matrix: Transform,
    /// Zero indicates that the path is filled, not stroked.
    pub stroke_radius: f32,
    /// Only read in depth-stencil interlock mode.
    pub z_index: u32,
}

impl PathData {
    pub fn new(matrix: &Affine, stroke_radius: f32, z_index: u32) -> Self {
        Self {
            matrix: Transform::from_kurbo(matrix),
            stroke_radius,
            z_index,
        }
    }
}

/// The paint value that fits in a single word of [`PaintData`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SimplePaintValue {
    Color(ColorInt),
    ColorRamp(ColorRampLocation),
    ImageOpacity(f32),
    /// The clip a new clip is nested inside, or 0.
    OuterClipId(u32),
}

impl Default for SimplePaintValue {
    fn default() -> Self {
        Self::Color(0xff00_0000)
    }
}

/// Small per-path paint record. Complex paints also write a [`PaintAuxData`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PaintData {
    /// `[clip_id:16 | flags:4 | blend_mode:4 | paint_type:4]`.
    pub params: u32,
    /// Color, gradient texture y, image opacity or shifted clip replacement ID, depending on the
    /// paint type.
    pub value: u32,
}

impl PaintData {
    pub const EVEN_ODD_FLAG: u32 = 1 << 8;
    pub const HAS_CLIP_RECT_FLAG: u32 = 1 << 9;

    pub fn new(
        paint_type: PaintType,
        value: SimplePaintValue,
        grad_layout: &GradTextureLayout,
        clip_id: u32,
        has_clip_rect: bool,
        even_odd: bool,
        blend_mode: u32,
    ) -> Self {
        debug_assert!(clip_id <= 0xffff);
        let shifted_clip_id = clip_id << 16;
        let mut params = paint_type as u32;
        let value = match (paint_type, value) {
            (PaintType::ClipUpdate, SimplePaintValue::OuterClipId(outer_clip_id)) => {
                params |= outer_clip_id << 16;
                shifted_clip_id
            }
            (_, SimplePaintValue::Color(color)) => {
                params |= shifted_clip_id | (blend_mode << 4);
                swizzle_color_to_rgba(color)
            }
            (_, SimplePaintValue::ColorRamp(location)) => {
                params |= shifted_clip_id | (blend_mode << 4);
                let mut row = location.row as f32;
                if location.is_complex() {
                    // Complex ramps live below the simple ones.
                    row += grad_layout.complex_offset_y as f32;
                }
                ((row + 0.5) * grad_layout.inverse_height).to_bits()
            }
            (_, SimplePaintValue::ImageOpacity(opacity)) => {
                params |= shifted_clip_id | (blend_mode << 4);
                opacity.to_bits()
            }
            (_, SimplePaintValue::OuterClipId(_)) => {
                debug_assert!(false, "only clip updates carry an outer clip ID");
                0
            }
        };
        if even_odd {
            params |= Self::EVEN_ODD_FLAG;
        }
        if has_clip_rect {
            params |= Self::HAS_CLIP_RECT_FLAG;
        }
        Self { params, value }
    }

    pub fn paint_type_bits(&self) -> u32 {
        self.params & 0xf
    }

    pub fn clip_id(&self) -> u32 {
        self.params >> 16
    }
}

/// Extra paint details for gradients, images and clip rects, indexed by path ID.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct PaintAuxData {
    /// Maps fragment coordinates to paint coordinates.
    pub matrix: Transform,
    /// Gradient texture horizontal span `[scale, bias]`, or `[lod, 0]` for images.
    pub paint_span: [f32; 2],
    /// Maps fragment coordinates to normalized clip rect coordinates.
    pub clip_rect_inverse_matrix: Transform,
    pub inverse_fwidth: [f32; 2],
}

impl PaintAuxData {
    /// Builds the auxiliary record for a path.
    ///
    /// `gradient` carries the ramp location and the gradient coefficients for gradient paints.
    /// When `frag_coord_bottom_up` is set, both matrices first flip fragment y within a render
    /// target of height `render_target_height`.
    pub fn new(
        view_matrix: &Affine,
        paint_type: PaintType,
        gradient: Option<(ColorRampLocation, [f32; 3])>,
        clip_rect_inverse_matrix: Option<&Transform>,
        render_target_height: u32,
        frag_coord_bottom_up: bool,
    ) -> Self {
        let flip_y = Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, render_target_height as f64]);
        let mut aux = Self::zeroed();
        match paint_type {
            PaintType::LinearGradient | PaintType::RadialGradient | PaintType::Image => {
                let mut paint_matrix = view_matrix.inverse();
                if frag_coord_bottom_up {
                    paint_matrix *= flip_y;
                }
                if let Some((location, [c0, c1, c2])) = gradient {
                    let (c0, c1, c2) = (c0 as f64, c1 as f64, c2 as f64);
                    let to_ramp = if paint_type == PaintType::LinearGradient {
                        Affine::new([c0, 0.0, c1, 0.0, c2, 0.0])
                    } else {
                        let w = 1.0 / c2;
                        Affine::new([w, 0.0, 0.0, w, -c0 * w, -c1 * w])
                    };
                    paint_matrix = to_ramp * paint_matrix;
                    aux.paint_span = Self::gradient_span(location);
                }
                aux.matrix = Transform::from_kurbo(&paint_matrix);
            }
            PaintType::SolidColor | PaintType::ClipUpdate => {}
        }
        match clip_rect_inverse_matrix {
            Some(m) => {
                let mut m = m.to_kurbo();
                if frag_coord_bottom_up {
                    m *= flip_y;
                }
                let [xx, xy, yx, yy, _, _] = m.as_coeffs();
                aux.clip_rect_inverse_matrix = Transform::from_kurbo(&m);
                aux.inverse_fwidth = [
                    (-1.0 / (xx.abs() + xy.abs())) as f32,
                    (-1.0 / (yx.abs() + yy.abs())) as f32,
                ];
            }
            None => {
                aux.clip_rect_inverse_matrix = Transform::WIDE_OPEN;
                aux.inverse_fwidth = [0.0; 2];
            }
        }
        aux
    }

    /// Horizontal span of a color ramp in the gradient texture, in normalized texture units.
    pub fn gradient_span(location: ColorRampLocation) -> [f32; 2] {
        let (left, right) = if location.is_complex() {
            (0.0, crate::GRAD_TEXTURE_WIDTH as f32)
        } else {
            let left = location.col as f32;
            (left, left + 2.0)
        };
        [
            (right - left - 1.0) * crate::GRAD_TEXTURE_INVERSE_WIDTH,
            (left + 0.5) * crate::GRAD_TEXTURE_INVERSE_WIDTH,
        ]
    }
}

/// Per-contour record read by the vertex shaders.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ContourData {
    /// Midpoint of the curve endpoints in this contour. Strokes store `[closed, 0]` instead.
    pub midpoint: [f32; 2],
    pub path_id: u32,
    /// Index of the first tessellation vertex of the contour.
    pub vertex_index0: u32,
}

impl ContourData {
    pub fn new(midpoint: Point, path_id: u32, vertex_index0: u32) -> Self {
        Self {
            midpoint: point_to_f32(midpoint),
            path_id,
            vertex_index0,
        }
    }
}

/// Per-vertex data for shaders that draw triangles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TriangleVertex {
    pub point: [f32; 2],
    /// `weight << 16 | path_id`
    pub weight_path_id: i32,
}

impl TriangleVertex {
    pub fn new(point: Point, weight: i16, path_id: u16) -> Self {
        Self {
            point: point_to_f32(point),
            weight_path_id: (i32::from(weight) << 16) | i32::from(path_id),
        }
    }

    pub fn weight(&self) -> i16 {
        (self.weight_path_id >> 16) as i16
    }

    pub fn path_id(&self) -> u16 {
        self.weight_path_id as u16
    }
}
