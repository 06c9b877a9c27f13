// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU-side resources handed to the [`Renderer`](crate::Renderer).

use std::sync::Arc;

use peniko::kurbo::{BezPath, Cap, Join, PathEl, Point, Rect, Shape};
use peniko::{BlendMode, Color, ColorStop, Fill};

use crate::backend::{ImageTexture, RenderContextImpl, ResourceId};
use crate::context::RenderContext;
use crate::draw::PaintInfo;
use crate::gradient::Gradient;
use crate::{Error, Result};

/// Images wider or taller than this are rejected by [`Factory::decode_image`].
pub const MAX_IMAGE_DIMENSION: u32 = 16384;

/// Creates the resources draws are made from.
pub trait Factory {
    fn make_render_path(&mut self, path: BezPath, fill: Fill) -> RenderPath {
        RenderPath::new(path, fill)
    }

    fn make_render_paint(&mut self, style: PaintStyle, color: Color) -> RenderPaint {
        RenderPaint::new(style, color)
    }

    /// Returns `None` for a gradient without usable stops.
    fn make_linear_gradient(
        &mut self,
        start: Point,
        end: Point,
        stops: &[ColorStop],
    ) -> Option<Arc<Gradient>> {
        Gradient::linear(start, end, stops).map(Arc::new)
    }

    /// Returns `None` for a gradient without usable stops.
    fn make_radial_gradient(
        &mut self,
        center: Point,
        radius: f32,
        stops: &[ColorStop],
    ) -> Option<Arc<Gradient>> {
        Gradient::radial(center, radius, stops).map(Arc::new)
    }

    fn make_render_buffer(&mut self, kind: RenderBufferType, data: Vec<u8>) -> Arc<RenderBuffer> {
        Arc::new(RenderBuffer {
            kind,
            data,
            id: ResourceId::next(),
        })
    }

    /// Decodes an encoded image, PNG at least, and uploads it as RGBA8.
    fn decode_image(&mut self, encoded: &[u8]) -> Result<RenderImage>;
}

impl<B: RenderContextImpl> Factory for RenderContext<B> {
    fn decode_image(&mut self, encoded: &[u8]) -> Result<RenderImage> {
        let image = image::load_from_memory(encoded)?.into_rgba8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 || width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION
        {
            return Err(Error::UnsupportedImageDimensions(width, height));
        }
        let texture = self
            .backend_mut()
            .make_image_texture(width, height, image.as_raw());
        log::debug!("decoded {width}x{height} image as texture {:?}", texture.id);
        Ok(RenderImage {
            texture: Arc::new(texture),
        })
    }
}

/// An immutable path and its fill rule.
#[derive(Clone, Debug)]
pub struct RenderPath {
    pub path: Arc<BezPath>,
    pub fill: Fill,
    /// Bounds of the path's points, in path space.
    pub bounds: Rect,
    pub id: ResourceId,
    /// Set when the path is exactly an axis-aligned rectangle.
    pub rect: Option<Rect>,
}

impl RenderPath {
    pub fn new(path: BezPath, fill: Fill) -> Self {
        let bounds = path.bounding_box();
        let rect = axis_aligned_rect(&path);
        Self {
            path: Arc::new(path),
            fill,
            bounds,
            id: ResourceId::next(),
            rect,
        }
    }
}

/// Recognizes a single closed contour of four axis-aligned lines.
fn axis_aligned_rect(path: &BezPath) -> Option<Rect> {
    let mut points: smallvec::SmallVec<[Point; 5]> = smallvec::SmallVec::new();
    let mut closed = false;
    for (i, el) in path.elements().iter().enumerate() {
        match (*el, i) {
            (PathEl::MoveTo(p), 0) => points.push(p),
            (PathEl::LineTo(p), 1..=4) if !closed => points.push(p),
            (PathEl::ClosePath, _) if !closed => closed = true,
            _ => return None,
        }
    }
    if points.len() == 5 && points[4] == points[0] {
        points.pop();
    }
    if points.len() != 4 {
        return None;
    }
    let horizontal_first = points[0].y == points[1].y;
    for i in 0..4 {
        let (a, b) = (points[i], points[(i + 1) % 4]);
        let horizontal = (i % 2 == 0) == horizontal_first;
        let aligned = if horizontal { a.y == b.y } else { a.x == b.x };
        if !aligned {
            return None;
        }
    }
    let rect = Rect::from_points(points[0], points[2]);
    (rect.area() > 0.0).then_some(rect)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub thickness: f32,
    pub join: Join,
    pub cap: Cap,
}

impl StrokeStyle {
    pub fn new(thickness: f32) -> Self {
        Self {
            thickness,
            join: Join::Miter,
            cap: Cap::Butt,
        }
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.join = join;
        self
    }

    pub fn with_cap(mut self, cap: Cap) -> Self {
        self.cap = cap;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaintStyle {
    Fill,
    Stroke(StrokeStyle),
}

/// How a path is painted: its style, color or gradient, and blend mode.
#[derive(Clone, Debug)]
pub struct RenderPaint {
    pub style: PaintStyle,
    pub color: Color,
    /// Overrides `color` when set.
    pub gradient: Option<Arc<Gradient>>,
    pub blend_mode: BlendMode,
}

impl RenderPaint {
    pub fn new(style: PaintStyle, color: Color) -> Self {
        Self {
            style,
            color,
            gradient: None,
            blend_mode: BlendMode::default(),
        }
    }

    pub fn with_gradient(mut self, gradient: Arc<Gradient>) -> Self {
        self.gradient = Some(gradient);
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn stroke(&self) -> Option<&StrokeStyle> {
        match &self.style {
            PaintStyle::Fill => None,
            PaintStyle::Stroke(stroke) => Some(stroke),
        }
    }

    pub(crate) fn paint_info(&self) -> PaintInfo {
        match &self.gradient {
            Some(gradient) => PaintInfo::gradient(gradient.clone()),
            None => PaintInfo::solid(self.color),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderBufferType {
    /// `u16` triangle indices.
    Index,
    /// Pairs of `f32`, for vertex positions or texture coordinates.
    Vertex,
}

/// Mesh data shared with the backend.
#[derive(Debug)]
pub struct RenderBuffer {
    pub kind: RenderBufferType,
    pub data: Vec<u8>,
    pub id: ResourceId,
}

impl RenderBuffer {
    pub fn as_f32s(&self) -> Result<&[f32]> {
        if self.kind != RenderBufferType::Vertex {
            return Err(Error::RenderBufferType("vertex"));
        }
        bytemuck::try_cast_slice(&self.data).map_err(|_| Error::RenderBufferType("vertex"))
    }

    pub fn as_u16s(&self) -> Result<&[u16]> {
        if self.kind != RenderBufferType::Index {
            return Err(Error::RenderBufferType("index"));
        }
        bytemuck::try_cast_slice(&self.data).map_err(|_| Error::RenderBufferType("index"))
    }
}

/// A decoded image that lives on the backend.
#[derive(Clone, Debug)]
pub struct RenderImage {
    pub texture: Arc<ImageTexture>,
}

impl RenderImage {
    pub fn width(&self) -> u32 {
        self.texture.width
    }

    pub fn height(&self) -> u32 {
        self.texture.height
    }
}
