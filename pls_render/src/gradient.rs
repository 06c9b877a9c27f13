// Copyright 2022 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Gradients and their packing into the gradient texture.
//!
//! The gradient texture holds two kinds of color ramps. Simple ramps, with exactly two stops at
//! 0 and 1, take two texels and are written directly by the CPU, 256 to a row. Complex ramps
//! each take an entire row and are drawn by the GPU from a list of [`GradientSpan`]s. Simple rows
//! come first; complex rows follow them.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use peniko::kurbo::Point;
use peniko::ColorStop;
use smallvec::SmallVec;

use pls_encoding::{
    color_int_alpha, color_to_int, gradient_data_height, resource_texture_height, ColorInt,
    ColorRampLocation, GradientSpan, PaintType, ResourceCounters, TwoTexelRamp,
    GRAD_TEXTURE_WIDTH, GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS, MAX_TEXTURE_HEIGHT,
};

use crate::buffers::MappedBuffer;

/// An immutable linear or radial gradient, normalized so its stops run from 0 to 1.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    paint_type: PaintType,
    colors: SmallVec<[ColorInt; 4]>,
    stops: SmallVec<[f32; 4]>,
    coeffs: [f32; 3],
}

impl Gradient {
    /// Creates a linear gradient from `start` to `end`.
    ///
    /// Returns `None` if there are no stops, or if they are not ordered within `[0, 1]`.
    pub fn linear(start: Point, end: Point, stops: &[ColorStop]) -> Option<Self> {
        let (colors, mut offsets) = split_stops(stops)?;
        let (mut start, mut end) = (start, end);
        let first = offsets[0];
        let last = offsets[offsets.len() - 1];
        if first != 0.0 || last != 1.0 {
            // Tighten the endpoints to the outermost stops so the ramp uses the whole texture.
            let (s, e) = (start, end);
            start = s.lerp(e, first as f64);
            end = s.lerp(e, last as f64);
            let count = offsets.len();
            offsets[0] = 0.0;
            if count > 2 {
                let m = 1.0 / (last - first);
                let a = -first * m;
                for i in 1..count - 1 {
                    offsets[i] = (offsets[i] * m + a).clamp(offsets[i - 1], 1.0);
                }
            }
            offsets[count - 1] = 1.0;
        }
        let v = end - start;
        let len_sq = v.hypot2();
        let coeffs = if len_sq > 0.0 {
            // Scaled so that dot(v, end - start) == 1.
            let v = v / len_sq;
            [v.x as f32, v.y as f32, -(v.dot(start.to_vec2())) as f32]
        } else {
            [0.0; 3]
        };
        Some(Self {
            paint_type: PaintType::LinearGradient,
            colors,
            stops: offsets,
            coeffs,
        })
    }

    /// Creates a radial gradient around `center`.
    pub fn radial(center: Point, radius: f32, stops: &[ColorStop]) -> Option<Self> {
        let (colors, mut offsets) = split_stops(stops)?;
        let mut radius = radius;
        let count = offsets.len();
        let last = offsets[count - 1];
        if last != 1.0 && last > 0.0 {
            // Scale the radius to end on the final stop.
            radius *= last;
            let inverse_last = 1.0 / last;
            for stop in &mut offsets[..count - 1] {
                *stop *= inverse_last;
            }
            offsets[count - 1] = 1.0;
        }
        Some(Self {
            paint_type: PaintType::RadialGradient,
            colors,
            stops: offsets,
            coeffs: [center.x as f32, center.y as f32, radius],
        })
    }

    pub fn paint_type(&self) -> PaintType {
        self.paint_type
    }

    pub fn colors(&self) -> &[ColorInt] {
        &self.colors
    }

    pub fn stops(&self) -> &[f32] {
        &self.stops
    }

    /// Linear: `[vx, vy, -dot(v, start)]`. Radial: `[cx, cy, radius]`.
    pub fn coeffs(&self) -> [f32; 3] {
        self.coeffs
    }

    pub fn count(&self) -> usize {
        self.stops.len()
    }

    /// Two stops at exactly 0 and 1 fit in a two-texel ramp.
    pub fn is_simple(&self) -> bool {
        self.stops.len() == 2 && self.stops[0] == 0.0
    }

    pub fn is_opaque(&self) -> bool {
        let all = self.colors.iter().fold(!0, |acc, c| acc & c);
        color_int_alpha(all) == 0xff
    }
}

fn split_stops(stops: &[ColorStop]) -> Option<(SmallVec<[ColorInt; 4]>, SmallVec<[f32; 4]>)> {
    if stops.is_empty() {
        return None;
    }
    // Rejects NaN as well as out of range offsets.
    if !stops.iter().all(|s| (0.0..=1.0).contains(&s.offset)) {
        return None;
    }
    if stops.windows(2).any(|w| w[0].offset > w[1].offset) {
        return None;
    }
    let colors = stops.iter().map(|s| color_to_int(s.color)).collect();
    let offsets = stops.iter().map(|s| s.offset).collect();
    Some((colors, offsets))
}

/// Hashes and compares a gradient by its full list of colors and stops, so two gradients built
/// separately with identical ramps share one row of the gradient texture.
#[derive(Clone, Debug)]
pub struct GradientContentKey(pub Arc<Gradient>);

impl PartialEq for GradientContentKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.colors == other.0.colors
                && self.0.stops.len() == other.0.stops.len()
                && self
                    .0
                    .stops
                    .iter()
                    .zip(&other.0.stops)
                    .all(|(a, b)| a.to_bits() == b.to_bits()))
    }
}

impl Eq for GradientContentKey {}

impl Hash for GradientContentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.colors.hash(state);
        for stop in &self.0.stops {
            stop.to_bits().hash(state);
        }
    }
}

/// Lengths of a [`GradientPacker`] that can be restored with [`GradientPacker::rollback`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GradientSnapshot {
    simple_count: usize,
    complex_count: usize,
}

/// Deduplicates the color ramps used by one logical flush and assigns them texture locations.
#[derive(Debug, Default)]
pub struct GradientPacker {
    /// Keyed on the literal color pair; the value is the ramp's first texel.
    simple_lookup: HashMap<u64, u32>,
    simple_ramps: Vec<TwoTexelRamp>,
    complex_lookup: HashMap<GradientContentKey, u16>,
    complex_ramps: Vec<Arc<Gradient>>,
}

impl GradientPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds or reserves room for `gradient`.
    ///
    /// Returns `None` when the gradient texture would grow past its maximum height; the caller has
    /// to flush and try again. A newly reserved complex ramp adds its spans to `counters`.
    pub fn allocate(
        &mut self,
        gradient: &Arc<Gradient>,
        counters: &mut ResourceCounters,
    ) -> Option<ColorRampLocation> {
        let max_height = MAX_TEXTURE_HEIGHT as usize;
        if gradient.is_simple() {
            let [c0, c1] = [gradient.colors[0], gradient.colors[1]];
            let key = (u64::from(c1) << 32) | u64::from(c0);
            let texel = match self.simple_lookup.get(&key) {
                Some(texel) => *texel,
                None => {
                    let height =
                        gradient_data_height(self.simple_ramps.len() + 1, self.complex_ramps.len());
                    if height > max_height {
                        return None;
                    }
                    let texel = (self.simple_ramps.len() * 2) as u32;
                    self.simple_lookup.insert(key, texel);
                    self.simple_ramps.push(TwoTexelRamp::new([c0, c1]));
                    texel
                }
            };
            Some(ColorRampLocation {
                row: (texel / GRAD_TEXTURE_WIDTH) as u16,
                col: (texel % GRAD_TEXTURE_WIDTH) as u16,
            })
        } else {
            let key = GradientContentKey(gradient.clone());
            let row = match self.complex_lookup.get(&key) {
                Some(row) => *row,
                None => {
                    let height =
                        gradient_data_height(self.simple_ramps.len(), self.complex_ramps.len() + 1);
                    if height > max_height {
                        return None;
                    }
                    // One span per stop plus the closing cap.
                    counters.complex_gradient_span_count += gradient.count() + 1;
                    let row = self.complex_ramps.len() as u16;
                    self.complex_lookup.insert(key, row);
                    self.complex_ramps.push(gradient.clone());
                    row
                }
            };
            Some(ColorRampLocation::complex(row))
        }
    }

    pub fn snapshot(&self) -> GradientSnapshot {
        GradientSnapshot {
            simple_count: self.simple_ramps.len(),
            complex_count: self.complex_ramps.len(),
        }
    }

    /// Forgets every ramp allocated after `snapshot` was taken.
    pub fn rollback(&mut self, snapshot: GradientSnapshot) {
        if self.simple_ramps.len() > snapshot.simple_count {
            let end = (snapshot.simple_count * 2) as u32;
            self.simple_lookup.retain(|_, texel| *texel < end);
            self.simple_ramps.truncate(snapshot.simple_count);
        }
        if self.complex_ramps.len() > snapshot.complex_count {
            let end = snapshot.complex_count;
            self.complex_lookup.retain(|_, row| (*row as usize) < end);
            self.complex_ramps.truncate(snapshot.complex_count);
        }
    }

    pub fn simple_ramp_count(&self) -> usize {
        self.simple_ramps.len()
    }

    pub fn complex_ramp_count(&self) -> usize {
        self.complex_ramps.len()
    }

    /// Width in texels of the simple ramp region.
    pub fn simple_texels_width(&self) -> u32 {
        (self.simple_ramps.len() as u32).min(GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS) * 2
    }

    /// Rows occupied by simple ramps. Complex rows start here.
    pub fn simple_texels_height(&self) -> u32 {
        resource_texture_height(
            self.simple_ramps.len(),
            GRAD_TEXTURE_WIDTH_IN_SIMPLE_RAMPS as usize,
        ) as u32
    }

    /// Rows of the gradient texture this flush needs.
    pub fn data_height(&self) -> usize {
        gradient_data_height(self.simple_ramps.len(), self.complex_ramps.len())
    }

    pub fn complex_span_count(&self) -> usize {
        self.complex_ramps.iter().map(|g| g.count() + 1).sum()
    }

    pub fn write_simple_ramps(&self, out: &mut MappedBuffer<TwoTexelRamp>) {
        out.extend_from_slice(&self.simple_ramps);
    }

    /// Writes the spans that draw each complex ramp into its row. Row `y` is relative to the
    /// first complex row.
    pub fn write_complex_spans(&self, out: &mut MappedBuffer<GradientSpan>) {
        // "stop * w + .5" puts each stop on a texel center. Half-texel caps at both ends make sure
        // the boundary texels get filled.
        let w = GRAD_TEXTURE_WIDTH as f32 - 1.0;
        let to_fixed = 65536.0 / GRAD_TEXTURE_WIDTH as f32;
        for (y, gradient) in self.complex_ramps.iter().enumerate() {
            let y = y as u32;
            let mut last_color = gradient.colors[0];
            let mut last_x_fixed = 0;
            for (&stop, &color) in gradient.stops.iter().zip(&gradient.colors) {
                let x = stop * w + 0.5;
                let x_fixed = (x * to_fixed) as u32;
                debug_assert!(last_x_fixed <= x_fixed && x_fixed < 65536);
                out.push(GradientSpan::new(last_x_fixed, x_fixed, y, last_color, color));
                last_color = color;
                last_x_fixed = x_fixed;
            }
            out.push(GradientSpan::new(
                last_x_fixed,
                65535,
                y,
                last_color,
                last_color,
            ));
        }
    }

    /// Clears everything, keeping capacity.
    pub fn rewind(&mut self) {
        self.simple_lookup.clear();
        self.simple_ramps.clear();
        self.complex_lookup.clear();
        self.complex_ramps.clear();
    }

    /// Clears everything and releases excess capacity.
    pub fn reset_containers(&mut self) {
        self.rewind();
        self.simple_lookup.shrink_to_fit();
        self.simple_ramps.shrink_to_fit();
        self.complex_lookup.shrink_to_fit();
        self.complex_ramps.shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::Color;

    fn stops(offsets: &[f32]) -> Vec<ColorStop> {
        offsets
            .iter()
            .enumerate()
            .map(|(i, &offset)| ColorStop {
                offset,
                color: Color::rgba8(i as u8 * 40, 0, 255, 255),
            })
            .collect()
    }

    fn linear(offsets: &[f32]) -> Arc<Gradient> {
        Arc::new(
            Gradient::linear(Point::ZERO, Point::new(100.0, 0.0), &stops(offsets))
                .expect("valid stops"),
        )
    }

    #[test]
    fn invalid_stops_are_rejected() {
        let a = Point::ZERO;
        let b = Point::new(1.0, 0.0);
        assert!(Gradient::linear(a, b, &[]).is_none());
        assert!(Gradient::linear(a, b, &stops(&[0.5, 0.2])).is_none());
        assert!(Gradient::linear(a, b, &stops(&[0.0, 1.5])).is_none());
        assert!(Gradient::radial(a, 1.0, &stops(&[f32::NAN])).is_none());
    }

    #[test]
    fn linear_stops_are_normalized() {
        let g = Gradient::linear(Point::ZERO, Point::new(100.0, 0.0), &stops(&[0.25, 0.5, 0.75]))
            .expect("valid stops");
        assert_eq!(g.stops(), &[0.0, 0.5, 1.0]);
        // The endpoints moved to 25 and 75, so t = (x - 25) / 50.
        let [vx, vy, c] = g.coeffs();
        assert!((vx * 75.0 + c - 1.0).abs() < 1e-6);
        assert!((vx * 25.0 + c).abs() < 1e-6);
        assert_eq!(vy, 0.0);
        assert!(!g.is_simple());
    }

    #[test]
    fn radial_radius_follows_last_stop() {
        let g = Gradient::radial(Point::new(1.0, 2.0), 10.0, &stops(&[0.0, 0.5]))
            .expect("valid stops");
        assert_eq!(g.coeffs(), [1.0, 2.0, 5.0]);
        assert_eq!(g.stops(), &[0.0, 1.0]);
        assert!(g.is_simple());
    }

    #[test]
    fn simple_ramps_are_deduplicated() {
        let mut packer = GradientPacker::new();
        let mut counters = ResourceCounters::default();
        let a = packer.allocate(&linear(&[0.0, 1.0]), &mut counters);
        let b = packer.allocate(&linear(&[0.0, 1.0]), &mut counters);
        assert_eq!(a, Some(ColorRampLocation { row: 0, col: 0 }));
        assert_eq!(a, b);
        assert_eq!(packer.simple_ramp_count(), 1);
        assert_eq!(counters, ResourceCounters::default());
    }

    #[test]
    fn simple_ramps_wrap_rows() {
        let mut packer = GradientPacker::new();
        let mut counters = ResourceCounters::default();
        let mut last = None;
        for i in 0..257_u32 {
            let color = Color::rgba8((i % 256) as u8, (i / 256) as u8, 0, 255);
            let g = Gradient::linear(
                Point::ZERO,
                Point::new(1.0, 0.0),
                &[
                    ColorStop { offset: 0.0, color },
                    ColorStop {
                        offset: 1.0,
                        color: Color::BLACK,
                    },
                ],
            )
            .expect("valid stops");
            last = packer.allocate(&Arc::new(g), &mut counters);
        }
        assert_eq!(last, Some(ColorRampLocation { row: 1, col: 0 }));
        assert_eq!(packer.simple_texels_width(), 512);
        assert_eq!(packer.simple_texels_height(), 2);
    }

    #[test]
    fn complex_ramps_take_rows() {
        let mut packer = GradientPacker::new();
        let mut counters = ResourceCounters::default();
        let a = packer.allocate(&linear(&[0.0, 0.5, 1.0]), &mut counters);
        let b = packer.allocate(&linear(&[0.0, 0.5, 1.0]), &mut counters);
        let c = packer.allocate(&linear(&[0.0, 0.25, 1.0]), &mut counters);
        assert_eq!(a, Some(ColorRampLocation::complex(0)));
        assert_eq!(b, a);
        assert_eq!(c, Some(ColorRampLocation::complex(1)));
        assert_eq!(counters.complex_gradient_span_count, 8);
        assert_eq!(packer.complex_span_count(), 8);
    }

    #[test]
    fn texture_height_is_bounded() {
        let mut packer = GradientPacker::new();
        let mut counters = ResourceCounters::default();
        for i in 0..MAX_TEXTURE_HEIGHT {
            let mid = i as f32 / MAX_TEXTURE_HEIGHT as f32;
            assert!(packer
                .allocate(&linear(&[0.0, mid, 1.0]), &mut counters)
                .is_some());
        }
        assert!(packer
            .allocate(&linear(&[0.0, 0.99999, 1.0]), &mut counters)
            .is_none());
        assert!(packer.allocate(&linear(&[0.0, 1.0]), &mut counters).is_none());
    }

    #[test]
    fn rollback_forgets_new_ramps() {
        let mut packer = GradientPacker::new();
        let mut counters = ResourceCounters::default();
        packer.allocate(&linear(&[0.0, 1.0]), &mut counters);
        let snapshot = packer.snapshot();
        packer.allocate(&linear(&[0.0, 0.5, 1.0]), &mut counters);
        packer.rollback(snapshot);
        assert_eq!(packer.snapshot(), snapshot);
        // The rolled back ramp gets the same row again.
        assert_eq!(
            packer.allocate(&linear(&[0.0, 0.5, 1.0]), &mut counters),
            Some(ColorRampLocation::complex(0))
        );
    }

    #[test]
    fn complex_spans_cover_the_row() {
        let mut packer = GradientPacker::new();
        let mut counters = ResourceCounters::default();
        packer.allocate(&linear(&[0.0, 0.5, 1.0]), &mut counters);
        let mut out = MappedBuffer::default();
        out.map(counters.complex_gradient_span_count);
        packer.write_complex_spans(&mut out);
        let spans = out.as_slice();
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[0].x0_fixed(), 0);
        // 0.5 * 511 + 0.5 = 256 texels.
        assert_eq!(spans[1].x1_fixed(), 256 * 128);
        assert_eq!(spans[3].x1_fixed(), 65535);
        assert_eq!(spans[3].color0, spans[3].color1);
        assert!(spans.windows(2).all(|w| w[0].x1_fixed() == w[1].x0_fixed()));
    }
}
