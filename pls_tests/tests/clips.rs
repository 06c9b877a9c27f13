// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clip IDs and the clip stack across logical flushes.

use std::collections::HashSet;

use pls_render::kurbo::Circle;
use pls_render::kurbo::Shape;
use pls_render::peniko::{Color, Fill};
use pls_render::{
    Error, Factory, IAabb, InterlockMode, PaintStyle, Renderer, ShaderFeatures,
};
use pls_tests::{context, diamond, frame, frame_totals, rect_path};

#[test]
fn clip_ids_are_unique_within_a_flush() {
    let mut context = context();
    context.begin_frame(frame(256, 256));
    let ids: Vec<u32> = (0..500)
        .map(|i| context.generate_clip_id(IAabb::new(0, 0, i + 1, 1)))
        .collect();
    assert!(ids.iter().all(|id| *id != 0));
    let unique: HashSet<u32> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    context.flush(&());
}

#[test]
fn clip_ids_run_out_per_flush() {
    let mut context = context();
    context.set_max_clip_id(1);
    context.begin_frame(frame(64, 64));
    let bounds = IAabb::new(0, 0, 8, 8);
    assert_ne!(context.generate_clip_id(bounds), 0);
    assert_eq!(context.generate_clip_id(bounds), 0);
    // A new logical flush has a fresh ID space.
    context.logical_flush();
    assert_ne!(context.generate_clip_id(bounds), 0);
    context.flush(&());
}

#[test]
fn clip_info_tracks_readers() {
    let mut context = context();
    context.begin_frame(frame(100, 100));
    let clip = context.make_render_path(diamond((50.0, 50.0), 20.0), Fill::NonZero);
    let inside = context.make_render_path(rect_path(40.0, 40.0, 60.0, 60.0), Fill::NonZero);
    let paint = context.make_render_paint(PaintStyle::Fill, Color::RED);
    let mut renderer = Renderer::new(&mut context);
    renderer.clip_path(&clip);
    renderer.draw_path(&inside, &paint);
    drop(renderer);

    let handle = context.current_flush_handle();
    let clip_id = context.clip_content_id();
    assert_ne!(clip_id, 0);
    let info = context
        .clip_info(handle, clip_id)
        .expect("current handle")
        .expect("known clip");
    assert_eq!(info.content_bounds, IAabb::new(29, 29, 71, 71));
    // The draw's bounds, with a pixel of slack, were read from the clip.
    assert_eq!(info.read_bounds, IAabb::new(39, 39, 61, 61));

    context.flush(&());
    assert!(matches!(
        context.clip_info(handle, clip_id),
        Err(Error::StaleHandle(_))
    ));
}

#[test]
fn rect_clips_use_no_clip_ids() {
    let mut context = context();
    context.begin_frame(frame(100, 100));
    let clip = context.make_render_path(rect_path(10.0, 10.0, 50.0, 50.0), Fill::NonZero);
    let circle = context.make_render_path(
        Circle::new((30.0, 30.0), 30.0).to_path(0.1),
        Fill::NonZero,
    );
    let paint = context.make_render_paint(PaintStyle::Fill, Color::BLUE);
    let mut renderer = Renderer::new(&mut context);
    renderer.clip_path(&clip);
    renderer.draw_path(&circle, &paint);
    drop(renderer);
    assert_eq!(context.clip_content_id(), 0);
    context.flush(&());

    let flushes = &context.backend().flushes;
    assert_eq!(flushes.len(), 1);
    let features = flushes[0].combined_shader_features;
    assert!(features.contains(ShaderFeatures::ENABLE_CLIP_RECT));
    assert!(!features.contains(ShaderFeatures::ENABLE_CLIPPING));
}

#[test]
fn clip_stack_is_rerendered_after_running_out_of_ids() {
    let mut context = context();
    context.set_max_clip_id(2);
    context.begin_frame(frame(100, 100));
    let outer = context.make_render_path(diamond((50.0, 50.0), 40.0), Fill::NonZero);
    let inner = context.make_render_path(diamond((50.0, 50.0), 20.0), Fill::NonZero);
    let shape = context.make_render_path(
        Circle::new((50.0, 50.0), 25.0).to_path(0.1),
        Fill::NonZero,
    );
    let paint = context.make_render_paint(PaintStyle::Fill, Color::RED);

    let mut renderer = Renderer::new(&mut context);
    renderer.clip_path(&outer);
    // Clip update for `outer` (ID 1), then the draw.
    renderer.draw_path(&shape, &paint);
    renderer.save();
    renderer.clip_path(&inner);
    // `outer` is still in the clip buffer; only `inner` (ID 2) is rendered.
    renderer.draw_path(&shape, &paint);
    renderer.restore();
    // The buffer holds `inner` now, so `outer` needs a third ID and a new logical flush.
    renderer.draw_path(&shape, &paint);
    drop(renderer);
    assert_eq!(context.logical_flush_count(), 2);
    context.flush(&());

    let flushes = &context.backend().flushes;
    assert_eq!(flushes.len(), 2);
    // Three draws and three clip updates, none dropped.
    assert_eq!(frame_totals(flushes).paths, 6);
    assert_eq!(flushes[0].path_count - 1, 4);
    assert_eq!(flushes[1].path_count - 1, 2);
    assert!(flushes
        .iter()
        .all(|f| f.combined_shader_features.contains(ShaderFeatures::ENABLE_CLIPPING)));
    assert!(flushes[0]
        .combined_shader_features
        .contains(ShaderFeatures::ENABLE_NESTED_CLIPPING));
}

#[test]
fn depth_stencil_resets_the_previous_clip() {
    let mut context = context();
    context.begin_frame(pls_render::FrameDescriptor {
        msaa_sample_count: 4,
        ..frame(100, 100)
    });
    assert_eq!(context.interlock_mode(), InterlockMode::DepthStencil);
    let first = context.make_render_path(diamond((30.0, 30.0), 20.0), Fill::NonZero);
    let second = context.make_render_path(diamond((70.0, 70.0), 20.0), Fill::NonZero);
    let shape = context.make_render_path(rect_path(0.0, 0.0, 100.0, 100.0), Fill::NonZero);
    let paint = context.make_render_paint(PaintStyle::Fill, Color::RED);

    let mut renderer = Renderer::new(&mut context);
    renderer.save();
    renderer.clip_path(&first);
    renderer.draw_path(&shape, &paint);
    renderer.restore();
    renderer.clip_path(&second);
    renderer.draw_path(&shape, &paint);
    drop(renderer);
    context.flush(&());

    let flush = &context.backend().flushes[0];
    let resets: Vec<_> = flush
        .draw_list
        .iter()
        .filter(|b| b.draw_type == pls_render::DrawType::StencilClipReset)
        .collect();
    assert_eq!(resets.len(), 1);
    assert_eq!(resets[0].element_count, 6);
}
