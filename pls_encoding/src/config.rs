// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed texture dimensions, patch sizes and buffer sizing helpers.

/// Maximum height of the gradient and tessellation textures.
pub const MAX_TEXTURE_HEIGHT: u32 = 2048;

/// Width of the tessellation texture, in vertices.
///
/// This is the minimum `GL_MAX_TEXTURE_SIZE` guaranteed on ES3 and WebGL2.
pub const TESS_TEXTURE_WIDTH: u32 = 2048;

/// Width of the gradient texture, in texels.
pub const GRAD_TEXTURE_WIDTH: u32 = 512;

/// Number of two-texel ramps that fit on one row of the gradient texture.
pub const GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS: u32 = GRAD_TEXTURE_WIDTH / 2;

/// `1 / GRAD_TEXTURE_WIDTH`, as used by the paint shaders.
pub const GRAD_TEXTURE_INVERSE_WIDTH: f32 = 1.0 / GRAD_TEXTURE_WIDTH as f32;

/// Number of tessellation segments in one midpoint fan patch.
pub const MIDPOINT_FAN_PATCH_SEGMENT_SPAN: u32 = 8;

/// Number of tessellation segments in one outer curve patch.
pub const OUTER_CURVE_PATCH_SEGMENT_SPAN: u32 = 17;

pub const MAX_PARAMETRIC_SEGMENTS: u32 = 1023;
pub const MAX_POLAR_SEGMENTS: u32 = 1023;

pub const MAX_CONTOUR_ID: u32 = 65535;
pub const CONTOUR_ID_MASK: u32 = 0xffff;

/// Total number of vertices the tessellation texture can hold.
pub const MAX_TESSELLATION_VERTEX_COUNT: u32 = MAX_TEXTURE_HEIGHT * TESS_TEXTURE_WIDTH;

/// Largest tessellation vertex count a flush may request before layout adds its padding.
///
/// Layout reserves one midpoint fan patch of padding at the front of the texture, up to
/// `OUTER_CURVE_PATCH_SEGMENT_SPAN - 1` vertices to align the outer curve patches that follow
/// the midpoint fans, and one vertex at the very end.
pub const MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING: u32 = MAX_TESSELLATION_VERTEX_COUNT
    - MIDPOINT_FAN_PATCH_SEGMENT_SPAN
    - (OUTER_CURVE_PATCH_SEGMENT_SPAN - 1)
    - 1;

/// Number of tessellation spans emitted purely for padding in a flush.
pub const TESS_PADDING_SPAN_COUNT: u32 = 3;

// Path IDs are written to fp16 attachments, so they stop at the largest fp16 value whose exponent
// isn't all 1s, and start above the denormalized range.
const LARGEST_FP16_BEFORE_EXPONENT_ALL_1S: u32 = (0x1f << 10) - 1;
const LARGEST_DENORMALIZED_FP16: u32 = 1023;

/// Largest path ID a backend with the given ID granularity can represent.
pub const fn max_path_id(granularity: u32) -> u32 {
    let granularity = if granularity == 0 { 1 } else { granularity };
    LARGEST_FP16_BEFORE_EXPONENT_ALL_1S / granularity - LARGEST_DENORMALIZED_FP16
}

/// Returns the smallest number that can be added to `value` so it becomes a multiple of
/// `alignment`.
pub const fn padding_to_align_up(value: usize, alignment: usize) -> usize {
    (alignment - value % alignment) % alignment
}

pub const fn align_up(len: usize, alignment: usize) -> usize {
    len + padding_to_align_up(len, alignment)
}

/// How tall a resource texture needs to be to hold `item_count` items, `width_in_items` per row.
pub const fn resource_texture_height(item_count: usize, width_in_items: usize) -> usize {
    item_count.div_ceil(width_in_items)
}

/// Rows of the gradient texture consumed by the given numbers of simple and complex ramps.
pub const fn gradient_data_height(simple_ramp_count: usize, complex_ramp_count: usize) -> usize {
    resource_texture_height(
        simple_ramp_count,
        GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS as usize,
    ) + complex_ramp_count
}

/// Typed buffer size primitive.
pub struct BufferSize<T: Sized> {
    len: usize,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Sized> BufferSize<T> {
    /// Creates a new buffer size from number of elements.
    ///
    /// Unlike a binding size, a resource may be unallocated, so `len` is allowed to be zero.
    pub const fn new(len: usize) -> Self {
        Self {
            len,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Creates a new buffer size from size in bytes.
    pub const fn from_size_in_bytes(size: usize) -> Self {
        Self::new(size / size_of::<T>())
    }

    /// Returns the number of elements.
    pub const fn len(self) -> usize {
        self.len
    }

    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns the size in bytes.
    pub const fn size_in_bytes(self) -> usize {
        size_of::<T>() * self.len
    }

    /// Returns the size in bytes aligned up to the given value.
    pub const fn aligned_in_bytes(self, alignment: usize) -> usize {
        align_up(self.size_in_bytes(), alignment)
    }
}

// Implemented by hand so the element type needs none of these traits.
impl<T: Sized> Clone for BufferSize<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Sized> Copy for BufferSize<T> {}

impl<T: Sized> Default for BufferSize<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Sized> std::fmt::Debug for BufferSize<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSize").field("len", &self.len).finish()
    }
}

impl<T: Sized> Eq for BufferSize<T> {}

impl<T: Sized> PartialEq for BufferSize<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
    }
}

impl<T: Sized> PartialOrd for BufferSize<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.len.partial_cmp(&other.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding() {
        assert_eq!(padding_to_align_up(0, 8), 0);
        assert_eq!(padding_to_align_up(6, 8), 2);
        assert_eq!(padding_to_align_up(8, 8), 0);
        assert_eq!(padding_to_align_up(18, 17), 16);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn texture_heights() {
        assert_eq!(resource_texture_height(0, 2048), 0);
        assert_eq!(resource_texture_height(1, 2048), 1);
        assert_eq!(resource_texture_height(2049, 2048), 2);
        assert_eq!(gradient_data_height(256, 0), 1);
        assert_eq!(gradient_data_height(257, 3), 5);
    }

    #[test]
    fn tessellation_budget_leaves_room_for_padding() {
        assert_eq!(MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING, 4_194_304 - 8 - 16 - 1);
        // The widest gap before the outer curves follows a midpoint fan section that ends one
        // vertex past an outer curve patch boundary.
        let fan_end = OUTER_CURVE_PATCH_SEGMENT_SPAN + 1;
        let gap = padding_to_align_up(fan_end as usize, OUTER_CURVE_PATCH_SEGMENT_SPAN as usize);
        assert_eq!(gap, (OUTER_CURVE_PATCH_SEGMENT_SPAN - 1) as usize);
    }

    #[test]
    fn path_id_space() {
        assert_eq!(max_path_id(1), 30_720);
        assert_eq!(max_path_id(2), 14_848);
        // A zero granularity is treated as 1.
        assert_eq!(max_path_id(0), max_path_id(1));
    }

    #[test]
    fn buffer_size_bytes() {
        let size = BufferSize::<[u32; 4]>::new(3);
        assert_eq!(size.size_in_bytes(), 48);
        assert_eq!(size.aligned_in_bytes(256), 256);
        assert!(BufferSize::<u32>::new(0).is_empty());
        assert_eq!(BufferSize::<u32>::from_size_in_bytes(10).len(), 2);
    }
}
