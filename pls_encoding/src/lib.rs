// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU-visible record layouts, fixed limits and resource counters for the pixel local storage
//! render context.
//!
//! Nothing in this crate holds policy: it describes what the backend reads, and how big things
//! are allowed to get.

// LINEBENDER LINT SET - lib.rs - v2
// See https://linebender.org/wiki/canonical-lints/
// These lints aren't included in Cargo.toml because they
// shouldn't apply to examples and tests
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
// The following lints are part of the Linebender standard set,
// but resolving them has been deferred for now.
// Feel free to send a PR that solves one or more of these.
#![allow(missing_docs, reason = "We have many as-yet undocumented items.")]
#![allow(
    missing_debug_implementations,
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    clippy::too_many_arguments,
    reason = "Deferred"
)]

mod config;
mod counters;
mod draw;
mod gradient;
pub mod math;
mod path;
mod tess;
mod uniforms;

pub use config::{
    align_up, gradient_data_height, max_path_id, padding_to_align_up, resource_texture_height,
    BufferSize, CONTOUR_ID_MASK, GRAD_TEXTURE_INVERSE_WIDTH, GRAD_TEXTURE_WIDTH,
    GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS, MAX_CONTOUR_ID, MAX_PARAMETRIC_SEGMENTS,
    MAX_POLAR_SEGMENTS, MAX_TESSELLATION_VERTEX_COUNT,
    MAX_TESSELLATION_VERTEX_COUNT_BEFORE_PADDING, MAX_TEXTURE_HEIGHT,
    MIDPOINT_FAN_PATCH_SEGMENT_SPAN, OUTER_CURVE_PATCH_SEGMENT_SPAN, TESS_PADDING_SPAN_COUNT,
    TESS_TEXTURE_WIDTH,
};
pub use counters::{AllocationMemory, LayoutCounters, ResourceAllocationCounts, ResourceCounters};
pub use draw::{
    color_int_alpha, color_to_int, pls_blend_mode, swizzle_color_to_rgba, ColorInt, DrawContents,
    DrawType, InterlockMode, LoadAction, PaintType, ShaderFeatures,
};
pub use gradient::{ColorRampLocation, GradTextureLayout, GradientSpan, TwoTexelRamp};
pub use math::{IAabb, Transform};
pub use path::{ContourData, PaintAuxData, PaintData, PathData, SimplePaintValue, TriangleVertex};
pub use tess::{ContourFlags, PatchType, SegmentCounts, TessVertexSpan};
pub use uniforms::{FlushUniforms, FlushUniformsDesc, ImageDrawUniforms, PlatformFeatures};

/// Storage buffer bindings must start on 256-byte boundaries.
pub const STORAGE_BUFFER_ALIGNMENT: usize = 256;

static_assertions::const_assert_eq!(size_of::<PathData>(), 32);
static_assertions::const_assert_eq!(size_of::<PaintData>(), 8);
static_assertions::const_assert_eq!(size_of::<PaintAuxData>(), 64);
static_assertions::const_assert_eq!(size_of::<ContourData>(), 16);
static_assertions::const_assert_eq!(size_of::<TessVertexSpan>(), 64);
static_assertions::const_assert_eq!(size_of::<GradientSpan>(), 16);
static_assertions::const_assert_eq!(size_of::<TwoTexelRamp>(), 8);
static_assertions::const_assert_eq!(size_of::<TriangleVertex>(), 12);
static_assertions::const_assert_eq!(size_of::<FlushUniforms>(), 256);
static_assertions::const_assert_eq!(size_of::<ImageDrawUniforms>(), 256);

// Padding whole elements must be able to reach a 256-byte boundary.
static_assertions::const_assert_eq!(STORAGE_BUFFER_ALIGNMENT % size_of::<PathData>(), 0);
static_assertions::const_assert_eq!(STORAGE_BUFFER_ALIGNMENT % size_of::<PaintData>(), 0);
static_assertions::const_assert_eq!(STORAGE_BUFFER_ALIGNMENT % size_of::<PaintAuxData>(), 0);
static_assertions::const_assert_eq!(STORAGE_BUFFER_ALIGNMENT % size_of::<ContourData>(), 0);

/// Number of `T` elements per 256-byte storage buffer alignment unit.
pub const fn alignment_in_elements<T>() -> usize {
    STORAGE_BUFFER_ALIGNMENT / size_of::<T>()
}
