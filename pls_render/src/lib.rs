// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A pixel local storage render context: it turns high level path and image draws into
//! tessellation patches, packs every record into a small set of fixed-capacity GPU buffers and
//! textures, and splits a frame into several logical flushes when those run out.
//!
//! The context never talks to a GPU API directly. A backend implements [`RenderContextImpl`] and
//! receives resize requests, the contents of each mapped buffer, and one [`FlushDescriptor`] per
//! logical flush.
//!
//! ## Getting started
//!
//! ```ignore
//! let mut context = RenderContext::new(backend);
//! context.begin_frame(FrameDescriptor {
//!     render_target_width: 1920,
//!     render_target_height: 1080,
//!     clear_color: Color::WHITE,
//!     ..Default::default()
//! });
//!
//! let path = context.make_render_path(circle.to_path(0.1), Fill::NonZero);
//! let paint = context.make_render_paint(PaintStyle::Fill, Color::RED);
//! let mut renderer = Renderer::new(&mut context);
//! renderer.draw_path(&path, &paint);
//! drop(renderer);
//!
//! context.flush(&flush_resources);
//! ```
//!
//! Running out of space is never an error. [`RenderContext::push_draw_batch`] returns `false`
//! and [`RenderContext::generate_clip_id`] returns `0`; the caller then calls
//! [`RenderContext::logical_flush`] and retries. [`Renderer`] does this for you.

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
    unreachable_pub,
    clippy::cast_possible_truncation,
    clippy::missing_assert_message,
    clippy::too_many_arguments,
    reason = "Deferred"
)]

mod arena;
mod backend;
mod batch;
mod buffers;
mod clip;
mod context;
mod draw;
mod factory;
mod flush;
mod geometry;
mod gradient;
mod renderer;
mod tessellation;

/// Styling and composition primitives.
pub use peniko;
/// 2D geometry, with a focus on curves.
pub use peniko::kurbo;

pub use pls_encoding as encoding;

pub use arena::{ArenaSlice, FrameAllocators, FrameArena};
pub use backend::{ImageTexture, RenderContextImpl, ResourceId};
pub use batch::{DrawBatch, DrawList};
pub use buffers::{BufferKind, MappedBuffer, ResourceBuffers};
pub use clip::{ClipInfo, ClipTracker};
pub use context::{FlushHandle, FrameDescriptor, RenderContext};
pub use draw::{
    BarrierDraw, CubicRecord, ContourRecord, Draw, DrawCommon, ImageMeshDraw, ImageRectDraw,
    InteriorTriangulationDraw, PaintInfo, PathDraw, StencilClipResetDraw, TriangleRecord,
};
pub use factory::{
    Factory, PaintStyle, RenderBuffer, RenderBufferType, RenderImage, RenderPaint, RenderPath,
    StrokeStyle,
};
pub use flush::{FlushDescriptor, LaidOut, LogicalFlush};
pub use gradient::{Gradient, GradientContentKey, GradientPacker, GradientSnapshot};
pub use renderer::Renderer;
pub use tessellation::{TessLayout, TessellationWriter};

pub use pls_encoding::{
    ColorInt, ColorRampLocation, DrawContents, DrawType, IAabb, InterlockMode, LoadAction,
    PaintType, PatchType, PlatformFeatures, ResourceAllocationCounts, ResourceCounters,
    SegmentCounts, ShaderFeatures,
};

use thiserror::Error;

/// Errors that can occur in the render context.
///
/// Running out of GPU resources is not one of them: that is reported through `bool` and `0`
/// returns so the caller can flush and retry.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to decode an encoded image.
    /// See [`image::ImageError`] for more information.
    #[error("Couldn't decode image")]
    ImageDecode(#[from] image::ImageError),
    /// The image is empty or larger than the backend can hold.
    #[error("Unsupported image dimensions {0}x{1}")]
    UnsupportedImageDimensions(u32, u32),
    /// A frame-scoped handle was used after the frame it came from was flushed.
    #[error("Handle from an earlier frame used for {0}")]
    StaleHandle(&'static str),
    /// A render buffer holds data of the wrong kind for this call.
    #[error("Render buffer '{0}' has the wrong type")]
    RenderBufferType(&'static str),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
