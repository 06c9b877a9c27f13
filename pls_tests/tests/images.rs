// Copyright 2024 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Image decoding and image draws.

use std::sync::Arc;

use pls_render::encoding::ImageDrawUniforms;
use pls_render::peniko::BlendMode;
use pls_render::{
    BufferKind, DrawType, Error, Factory, FrameDescriptor, RenderBuffer, RenderBufferType,
    RenderImage, Renderer,
};
use pls_tests::{context, encode_png, frame, Command, TestContext};

fn checkerboard(context: &mut TestContext) -> RenderImage {
    let rgba: Vec<u8> = (0..4 * 2)
        .flat_map(|i| {
            if i % 2 == 0 {
                [0xff, 0xff, 0xff, 0xff]
            } else {
                [0, 0, 0, 0xff]
            }
        })
        .collect();
    let png = encode_png(4, 2, rgba).expect("valid pixels");
    context.decode_image(&png).expect("valid png")
}

fn mesh_buffers(context: &mut TestContext) -> [Arc<RenderBuffer>; 3] {
    let positions: [f32; 8] = [10.0, 10.0, 50.0, 10.0, 50.0, 40.0, 10.0, 40.0];
    let uvs: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    [
        context.make_render_buffer(
            RenderBufferType::Vertex,
            bytemuck::cast_slice(&positions).to_vec(),
        ),
        context.make_render_buffer(RenderBufferType::Vertex, bytemuck::cast_slice(&uvs).to_vec()),
        context.make_render_buffer(
            RenderBufferType::Index,
            bytemuck::cast_slice(&indices).to_vec(),
        ),
    ]
}

#[test]
fn decoded_images_are_uploaded() {
    let mut context = context();
    context.backend_mut().clear();
    let image = checkerboard(&mut context);
    assert_eq!((image.width(), image.height()), (4, 2));
    assert_eq!(
        context.backend().commands,
        vec![Command::MakeImageTexture {
            width: 4,
            height: 2
        }]
    );
}

#[test]
fn undecodable_images_are_errors() {
    let mut context = context();
    let result = context.decode_image(b"definitely not a png");
    assert!(matches!(result, Err(Error::ImageDecode(_))));
}

#[test]
fn images_are_drawn_as_rects_in_atomic_mode() {
    let mut context = context();
    let image = checkerboard(&mut context);
    context.begin_frame(FrameDescriptor {
        disable_raster_ordering: true,
        ..frame(64, 64)
    });
    let mut renderer = Renderer::new(&mut context);
    renderer.transform(pls_render::kurbo::Affine::translate((8.0, 8.0)));
    renderer.draw_image(&image, BlendMode::default(), 0.5);
    drop(renderer);
    context.flush(&());

    let backend = context.backend();
    let flush = &backend.flushes[0];
    // Only the clear color is a path.
    assert_eq!(flush.path_count, 1);
    let batch = flush
        .draw_list
        .iter()
        .find(|b| b.draw_type == DrawType::ImageRect)
        .expect("image rect batch");
    assert_eq!(batch.element_count, 1);
    assert_eq!(batch.image_draw_data_offset, 0);
    assert_eq!(
        batch.image_texture.as_ref().map(|t| t.id),
        Some(image.texture.id)
    );
    let uniforms: Vec<ImageDrawUniforms> = backend.records(BufferKind::ImageDrawUniforms);
    assert_eq!(uniforms.len(), 1);
}

#[test]
fn images_are_drawn_as_paths_with_raster_ordering() {
    let mut context = context();
    let image = checkerboard(&mut context);
    context.begin_frame(frame(64, 64));
    let mut renderer = Renderer::new(&mut context);
    renderer.draw_image(&image, BlendMode::default(), 1.0);
    drop(renderer);
    context.flush(&());

    let flush = &context.backend().flushes[0];
    assert_eq!(flush.path_count, 2);
    let batches: Vec<_> = flush.draw_list.iter().collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].draw_type, DrawType::MidpointFanPatches);
    assert!(batches[0].image_texture.is_some());
}

#[test]
fn image_meshes_are_batched_with_their_buffers() {
    let mut context = context();
    let image = checkerboard(&mut context);
    let [positions, uvs, indices] = mesh_buffers(&mut context);
    context.begin_frame(frame(64, 64));
    let mut renderer = Renderer::new(&mut context);
    renderer
        .draw_image_mesh(&image, &positions, &uvs, &indices, BlendMode::default(), 1.0)
        .expect("well-typed buffers");
    renderer
        .draw_image_mesh(&image, &positions, &uvs, &indices, BlendMode::default(), 0.25)
        .expect("well-typed buffers");
    drop(renderer);
    context.flush(&());

    let backend = context.backend();
    let flush = &backend.flushes[0];
    let meshes: Vec<_> = flush
        .draw_list
        .iter()
        .filter(|b| b.draw_type == DrawType::ImageMesh)
        .collect();
    // Mesh draws never merge: each has its own uniforms.
    assert_eq!(meshes.len(), 2);
    assert_eq!(meshes[0].element_count, 6);
    assert_eq!(meshes[0].image_draw_data_offset, 0);
    assert_eq!(
        meshes[1].image_draw_data_offset,
        size_of::<ImageDrawUniforms>()
    );
    assert!(meshes[0]
        .index_buffer
        .as_ref()
        .is_some_and(|b| b.id == indices.id));
    let uniforms: Vec<ImageDrawUniforms> = backend.records(BufferKind::ImageDrawUniforms);
    assert_eq!(uniforms.len(), 2);
}

#[test]
fn mesh_buffers_must_have_the_right_type() {
    let mut context = context();
    let image = checkerboard(&mut context);
    let [positions, uvs, indices] = mesh_buffers(&mut context);
    context.begin_frame(frame(64, 64));
    let mut renderer = Renderer::new(&mut context);
    let swapped =
        renderer.draw_image_mesh(&image, &indices, &uvs, &positions, BlendMode::default(), 1.0);
    assert!(matches!(swapped, Err(Error::RenderBufferType("vertex"))));
    drop(renderer);
    assert!(context.logical_flushes()[0].draws().is_empty());
    context.flush(&());
}
