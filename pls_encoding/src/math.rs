// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};
use peniko::kurbo;

/// Affine transformation matrix in the `[xx, xy, yx, yy, tx, ty]` order the shaders read.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Transform {
    pub coeffs: [f32; 6],
}

impl Transform {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        coeffs: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    /// A clip rect matrix that maps every fragment inside the clip rect.
    pub const WIDE_OPEN: Self = Self {
        coeffs: [0.0, 0.0, 0.0, 0.0, 1.0, 1.0],
    };

    /// Creates a transform from a kurbo affine matrix.
    pub fn from_kurbo(transform: &kurbo::Affine) -> Self {
        Self {
            coeffs: transform.as_coeffs().map(|x| x as f32),
        }
    }

    /// Converts the transform to a kurbo affine matrix.
    pub fn to_kurbo(&self) -> kurbo::Affine {
        kurbo::Affine::new(self.coeffs.map(|x| x as f64))
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

pub fn point_to_f32(point: kurbo::Point) -> [f32; 2] {
    [point.x as f32, point.y as f32]
}

pub fn vec_to_f32(vec: kurbo::Vec2) -> [f32; 2] {
    [vec.x as f32, vec.y as f32]
}

/// Integer axis-aligned bounding box in pixels, `right` and `bottom` exclusive.
///
/// The default is [`IAabb::ZERO`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct IAabb {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IAabb {
    pub const ZERO: Self = Self::new(0, 0, 0, 0);

    /// The identity for [`IAabb::join`]: joining anything into it yields that thing.
    pub const EMPTY_FOR_JOIN: Self = Self::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN);

    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Rounds a floating point rect outward to whole pixels.
    pub fn round_out(rect: kurbo::Rect) -> Self {
        let rect = rect.expand();
        Self::new(
            rect.x0 as i32,
            rect.y0 as i32,
            rect.x1 as i32,
            rect.y1 as i32,
        )
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn join(&self, other: &Self) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        )
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn to_kurbo(&self) -> kurbo::Rect {
        kurbo::Rect::new(
            self.left as f64,
            self.top as f64,
            self.right as f64,
            self.bottom as f64,
        )
    }
}
