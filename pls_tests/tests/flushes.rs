// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Splitting frames into logical flushes, and what each flush hands the backend.

use pls_render::encoding::{alignment_in_elements, ContourData, PathData};
use pls_render::kurbo::BezPath;
use pls_render::peniko::{Color, Fill};
use pls_render::{
    BufferKind, Draw, DrawType, Factory, FrameDescriptor, IAabb, LoadAction, PaintStyle,
    Renderer, StrokeStyle,
};
use pls_tests::{
    circle_grid, context, frame, frame_totals, path_budget, rect_path, FrameTotals, TestContext,
};

fn draw_fills(context: &mut TestContext, paths: Vec<BezPath>) {
    let paths: Vec<_> = paths
        .into_iter()
        .map(|path| context.make_render_path(path, Fill::NonZero))
        .collect();
    let paint = context.make_render_paint(PaintStyle::Fill, Color::BLACK);
    let mut renderer = Renderer::new(context);
    for path in &paths {
        renderer.draw_path(path, &paint);
    }
}

fn circle_frame_totals(budget: Option<usize>) -> (usize, FrameTotals) {
    let mut context = context();
    context.set_resource_budget(budget.map(path_budget));
    context.begin_frame(frame(200, 200));
    draw_fills(&mut context, circle_grid(60, 200));
    context.flush(&());
    let flushes = &context.backend().flushes;
    (flushes.len(), frame_totals(flushes))
}

#[test]
fn splitting_a_frame_draws_the_same_things() {
    let (count, whole) = circle_frame_totals(None);
    assert_eq!(count, 1);
    assert_eq!(whole.paths, 60);
    assert_eq!(whole.contours, 60);
    assert!(whole.midpoint_fan_instances > 0);

    let (count, split) = circle_frame_totals(Some(7));
    assert_eq!(count, 9);
    assert_eq!(split, whole);
}

#[test]
fn later_flushes_start_on_aligned_offsets() {
    let mut context = context();
    context.set_resource_budget(Some(path_budget(3)));
    context.begin_frame(frame(200, 200));
    draw_fills(&mut context, circle_grid(7, 200));
    context.flush(&());

    let backend = context.backend();
    let flushes = &backend.flushes;
    assert_eq!(flushes.len(), 3);
    let path_alignment = alignment_in_elements::<PathData>();
    let contour_alignment = alignment_in_elements::<ContourData>();
    for pair in flushes.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert_eq!(next.first_path % path_alignment, 0);
        assert_eq!(next.first_contour % contour_alignment, 0);
        assert!(next.first_path >= prev.first_path + prev.path_count);
        assert!(next.first_contour >= prev.first_contour + prev.contour_count);
        assert_eq!(
            next.first_tess_vertex_span,
            prev.first_tess_vertex_span + prev.tess_vertex_span_count
        );
    }

    // Every flush is padded out, so the buffers end aligned too.
    let paths: Vec<PathData> = backend.records(BufferKind::Paths);
    let last = &flushes[2];
    assert_eq!(paths.len() % path_alignment, 0);
    assert!(paths.len() >= last.first_path + last.path_count);
    let contours: Vec<ContourData> = backend.records(BufferKind::Contours);
    assert_eq!(contours.len() % contour_alignment, 0);
    assert!(contours.len() >= last.first_contour + last.contour_count);
    let allocated = context.current_resource_allocations();
    assert!(paths.len() <= allocated.path_buffer_count);
    assert!(contours.len() <= allocated.contour_buffer_count);
}

#[test]
fn only_the_first_flush_clears() {
    let mut context = context();
    context.set_resource_budget(Some(path_budget(1)));
    context.begin_frame(frame(100, 100));
    draw_fills(
        &mut context,
        vec![
            rect_path(0.0, 0.0, 20.0, 20.0),
            rect_path(60.0, 70.0, 80.0, 90.0),
        ],
    );
    context.flush(&());

    let flushes = &context.backend().flushes;
    assert_eq!(flushes.len(), 2);
    assert_eq!(flushes[0].flush_index, 0);
    assert_eq!(flushes[0].load_action, LoadAction::Clear);
    assert_eq!(flushes[0].update_bounds, IAabb::new(0, 0, 100, 100));
    assert!(!flushes[0].is_final_flush);
    assert_eq!(flushes[1].flush_index, 1);
    assert_eq!(flushes[1].load_action, LoadAction::PreserveRenderTarget);
    // Only what the second flush draws, with a pixel of slack.
    assert_eq!(flushes[1].update_bounds, IAabb::new(59, 69, 81, 91));
    assert!(flushes[1].is_final_flush);
}

#[test]
fn preserved_frames_update_only_what_they_draw() {
    let mut context = context();
    context.begin_frame(FrameDescriptor {
        load_action: LoadAction::PreserveRenderTarget,
        ..frame(100, 100)
    });
    context.flush(&());
    let flush = &context.backend().flushes[0];
    assert_eq!(flush.path_count, 1);
    assert!(flush.draw_list.is_empty());
    assert_eq!(flush.update_bounds, IAabb::ZERO);
}

#[test]
fn atomic_flushes_end_with_a_resolve() {
    let mut context = context();
    context.begin_frame(FrameDescriptor {
        disable_raster_ordering: true,
        ..frame(100, 100)
    });
    draw_fills(
        &mut context,
        vec![
            rect_path(0.0, 0.0, 50.0, 50.0),
            // Overlaps the first rect.
            rect_path(25.0, 25.0, 75.0, 75.0),
            // Overlaps neither.
            rect_path(0.0, 80.0, 20.0, 100.0),
        ],
    );
    context.flush(&());

    let flush = &context.backend().flushes[0];
    assert!(flush.skip_explicit_color_clear);
    assert!(flush.render_direct_to_raster_pipeline);
    let batches: Vec<_> = flush.draw_list.iter().collect();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].draw_type, DrawType::MidpointFanPatches);
    assert!(batches[0].needs_barrier);
    assert_eq!(batches[1].draw_type, DrawType::MidpointFanPatches);
    assert!(batches[1].needs_barrier);
    assert_eq!(batches[2].draw_type, DrawType::AtomicResolve);
    assert_eq!(batches[2].element_count, 1);
}

#[test]
fn explicit_barriers_split_batches() {
    let mut context = context();
    context.begin_frame(frame(100, 100));
    draw_fills(&mut context, vec![rect_path(0.0, 0.0, 10.0, 10.0)]);
    assert!(context.push_draw_batch(&mut vec![Draw::barrier()]));
    draw_fills(
        &mut context,
        vec![
            rect_path(50.0, 50.0, 60.0, 60.0),
            rect_path(70.0, 70.0, 80.0, 80.0),
        ],
    );
    context.flush(&());

    let flush = &context.backend().flushes[0];
    // The barrier is neither a path nor a batch of its own.
    assert_eq!(flush.path_count, 4);
    let batches: Vec<_> = flush.draw_list.iter().collect();
    assert_eq!(batches.len(), 2);
    assert!(batches[0].needs_barrier);
    assert!(!batches[1].needs_barrier);
    assert_eq!(batches[0].base_element + batches[0].element_count, batches[1].base_element);
}

#[test]
fn disabled_fills_and_strokes_are_skipped() {
    let mut context = context();
    context.begin_frame(FrameDescriptor {
        fills_disabled: true,
        ..frame(100, 100)
    });
    let path = context.make_render_path(rect_path(10.0, 10.0, 90.0, 90.0), Fill::NonZero);
    let fill = context.make_render_paint(PaintStyle::Fill, Color::BLACK);
    let stroke = context.make_render_paint(
        PaintStyle::Stroke(StrokeStyle::new(2.0)),
        Color::BLACK,
    );
    let mut renderer = Renderer::new(&mut context);
    renderer.draw_path(&path, &fill);
    renderer.draw_path(&path, &stroke);
    drop(renderer);
    context.flush(&());

    let flush = &context.backend().flushes[0];
    assert_eq!(flush.path_count, 2);
    assert!(flush
        .draw_list
        .iter()
        .all(|batch| batch.draw_contents.contains(pls_render::DrawContents::STROKE)));
}

#[test]
fn flushing_resets_for_the_next_frame() {
    let mut context = context();
    context.set_resource_budget(Some(path_budget(2)));
    context.begin_frame(frame(100, 100));
    draw_fills(&mut context, circle_grid(5, 100));
    assert_eq!(context.logical_flush_count(), 3);
    context.flush(&());
    assert_eq!(context.logical_flush_count(), 1);

    context.backend_mut().clear();
    context.begin_frame(frame(100, 100));
    draw_fills(&mut context, circle_grid(1, 100));
    context.flush(&());
    let flushes = &context.backend().flushes;
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].path_count, 2);
    assert_eq!(flushes[0].first_path, 0);
    assert_eq!(flushes[0].first_tess_vertex_span, 0);
}
