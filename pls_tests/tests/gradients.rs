// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Gradient deduplication and the gradient texture budget.

use std::sync::Arc;

use pls_render::encoding::{GradientSpan, TwoTexelRamp, MAX_TEXTURE_HEIGHT};
use pls_render::kurbo::{Point, Rect, Shape};
use pls_render::peniko::{Color, ColorStop, Fill};
use pls_render::{
    BufferKind, Factory, Gradient, GradientPacker, PaintStyle, Renderer, ResourceCounters,
};
use pls_tests::{context, frame, path_budget, rect_path};

fn stops(colors: &[Color]) -> Vec<ColorStop> {
    let last = (colors.len() - 1) as f32;
    colors
        .iter()
        .enumerate()
        .map(|(i, color)| ColorStop::from((i as f32 / last, *color)))
        .collect()
}

fn linear(colors: &[Color]) -> Arc<Gradient> {
    Arc::new(
        Gradient::linear(Point::ZERO, Point::new(100.0, 0.0), &stops(colors)).expect("valid stops"),
    )
}

#[test]
fn simple_gradient_cache_hit() {
    // 0xFF0000FF and 0x0000FFFF as RGBA.
    let red_to_blue = [Color::rgba8(0xff, 0, 0, 0xff), Color::rgba8(0, 0, 0xff, 0xff)];
    let gradient = linear(&red_to_blue);
    let mut packer = GradientPacker::new();
    let mut counters = ResourceCounters::default();
    let first = packer.allocate(&gradient, &mut counters).expect("room");
    let after_first = counters;
    let second = packer.allocate(&gradient, &mut counters).expect("room");
    assert_eq!(first, second);
    assert_eq!(counters, after_first);
    assert_eq!(counters.complex_gradient_span_count, 0);
    assert_eq!(packer.simple_ramp_count(), 1);

    // Same colors in a different gradient share the ramp too.
    let radial = Arc::new(
        Gradient::radial(Point::new(5.0, 5.0), 10.0, &stops(&red_to_blue)).expect("valid stops"),
    );
    assert_eq!(packer.allocate(&radial, &mut counters), Some(first));
    assert_eq!(packer.simple_ramp_count(), 1);
}

#[test]
fn complex_gradients_dedup_by_content() {
    let colors = [Color::RED, Color::GREEN, Color::BLUE];
    let mut packer = GradientPacker::new();
    let mut counters = ResourceCounters::default();
    let first = packer
        .allocate(&linear(&colors), &mut counters)
        .expect("room");
    assert!(first.is_complex());
    let spans = counters.complex_gradient_span_count;
    assert!(spans > 0);
    // A separate but identical gradient lands on the same row.
    let second = packer
        .allocate(&linear(&colors), &mut counters)
        .expect("room");
    assert_eq!(first, second);
    assert_eq!(counters.complex_gradient_span_count, spans);
    assert_eq!(packer.complex_ramp_count(), 1);

    let other = packer
        .allocate(&linear(&[Color::RED, Color::WHITE, Color::BLUE]), &mut counters)
        .expect("room");
    assert_ne!(other.row, first.row);
    assert_eq!(packer.complex_ramp_count(), 2);
}

#[test]
fn gradient_texture_fills_up() {
    let mut packer = GradientPacker::new();
    let mut counters = ResourceCounters::default();
    let mut allocated = 0;
    for i in 0..MAX_TEXTURE_HEIGHT + 10 {
        let middle = Color::rgba8(i as u8, (i >> 8) as u8, 0x80, 0xff);
        let gradient = linear(&[Color::BLACK, middle, Color::WHITE]);
        if packer.allocate(&gradient, &mut counters).is_none() {
            break;
        }
        allocated += 1;
    }
    assert_eq!(allocated, MAX_TEXTURE_HEIGHT);
    assert_eq!(packer.data_height(), MAX_TEXTURE_HEIGHT as usize);
}

#[test]
fn rejected_batches_roll_back_their_gradients() {
    let mut context = context();
    // Room for exactly one three-stop ramp: three spans plus the closing cap.
    context.set_resource_budget(Some(ResourceCounters {
        complex_gradient_span_count: 4,
        ..path_budget(100)
    }));
    context.begin_frame(frame(100, 100));
    let rect = context.make_render_path(rect_path(0.0, 0.0, 50.0, 50.0), Fill::NonZero);
    let mut paint = |colors: &[Color]| {
        context
            .make_render_paint(PaintStyle::Fill, Color::BLACK)
            .with_gradient(linear(colors))
    };
    let simple = paint(&[Color::RED, Color::BLUE]);
    let first = paint(&[Color::RED, Color::GREEN, Color::BLUE]);
    let second = paint(&[Color::GREEN, Color::BLUE, Color::WHITE]);

    let mut renderer = Renderer::new(&mut context);
    renderer.draw_path(&rect, &simple);
    renderer.draw_path(&rect, &first);
    // Only fails once its ramp is reserved, which must then be given back.
    renderer.draw_path(&rect, &second);
    drop(renderer);

    let flushes = context.logical_flushes();
    assert_eq!(flushes.len(), 2);
    assert_eq!(flushes[0].draws().len(), 2);
    assert_eq!(flushes[0].gradients().simple_ramp_count(), 1);
    assert_eq!(flushes[0].gradients().complex_ramp_count(), 1);
    assert_eq!(flushes[0].counters().complex_gradient_span_count, 4);
    assert_eq!(flushes[1].gradients().complex_ramp_count(), 1);
    context.flush(&());

    let backend = context.backend();
    assert_eq!(backend.flushes.len(), 2);
    for flush in &backend.flushes {
        assert_eq!(flush.complex_grad_span_count, 4);
        assert_eq!(flush.complex_grad_rows_height, 1);
    }
    assert_eq!(backend.flushes[1].first_complex_grad_span, 4);
    let ramps: Vec<TwoTexelRamp> = backend.records(BufferKind::SimpleColorRamps);
    assert_eq!(ramps.len(), 1);
    let spans: Vec<GradientSpan> = backend.records(BufferKind::GradientSpans);
    assert_eq!(spans.len(), 8);
}

#[test]
fn gradient_paints_are_drawn() {
    let mut context = context();
    context.begin_frame(frame(64, 64));
    let gradient = context
        .make_radial_gradient(
            Point::new(32.0, 32.0),
            20.0,
            &stops(&[Color::WHITE, Color::BLACK]),
        )
        .expect("valid stops");
    let circle = context.make_render_path(
        Rect::new(10.0, 10.0, 54.0, 54.0).to_rounded_rect(8.0).to_path(0.1),
        Fill::NonZero,
    );
    let paint = context
        .make_render_paint(PaintStyle::Fill, Color::BLACK)
        .with_gradient(gradient);
    let mut renderer = Renderer::new(&mut context);
    renderer.draw_path(&circle, &paint);
    drop(renderer);
    context.flush(&());
    let flush = &context.backend().flushes[0];
    assert_eq!(flush.simple_grad_texels_width, 2);
    assert_eq!(flush.simple_grad_texels_height, 1);
}
