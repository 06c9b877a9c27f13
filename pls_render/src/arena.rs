// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-scoped bump arenas.
//!
//! Draws reference their contours, curves and triangles through [`ArenaSlice`] handles instead
//! of owning them. Everything is dropped at once when the frame is flushed; there is no way to
//! free a single allocation.

use std::marker::PhantomData;

use crate::draw::{ContourRecord, CubicRecord, TriangleRecord};

/// Handle to a run of items in a [`FrameArena`].
///
/// Handles remember the generation they were allocated in, so a handle that outlives its frame
/// resolves to `None` instead of to somebody else's data.
pub struct ArenaSlice<T> {
    start: u32,
    len: u32,
    generation: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> ArenaSlice<T> {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for ArenaSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaSlice<T> {}

impl<T> std::fmt::Debug for ArenaSlice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaSlice")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<T> PartialEq for ArenaSlice<T> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.len == other.len && self.generation == other.generation
    }
}

/// A typed bump arena reset once per frame.
#[derive(Debug)]
pub struct FrameArena<T> {
    items: Vec<T>,
    generation: u32,
}

impl<T> Default for FrameArena<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            generation: 0,
        }
    }
}

impl<T> FrameArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every item of `iter` and returns a handle to them.
    pub fn alloc_slice(&mut self, iter: impl IntoIterator<Item = T>) -> ArenaSlice<T> {
        let start = self.items.len();
        self.items.extend(iter);
        ArenaSlice {
            start: start as u32,
            len: (self.items.len() - start) as u32,
            generation: self.generation,
            _phantom: PhantomData,
        }
    }

    /// Resolves a handle, or returns `None` if it was allocated before the last reset.
    pub fn get(&self, slice: &ArenaSlice<T>) -> Option<&[T]> {
        if slice.generation != self.generation {
            return None;
        }
        let start = slice.start as usize;
        self.items.get(start..start + slice.len as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Drops everything, keeps the capacity and invalidates outstanding handles.
    pub fn reset(&mut self) {
        self.items.clear();
        self.generation = self.generation.wrapping_add(1);
    }
}

/// The arenas used while recording one frame.
#[derive(Debug, Default)]
pub struct FrameAllocators {
    pub contours: FrameArena<ContourRecord>,
    pub cubics: FrameArena<CubicRecord>,
    pub triangles: FrameArena<TriangleRecord>,
}

impl FrameAllocators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.contours.reset();
        self.cubics.reset();
        self.triangles.reset();
    }
}
