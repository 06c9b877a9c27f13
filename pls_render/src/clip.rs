// Copyright 2023 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use pls_encoding::IAabb;

/// Bounds recorded for one clip ID.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClipInfo {
    /// The region the clip defines.
    pub content_bounds: IAabb,
    /// The union of the regions of every draw that reads the clip.
    pub read_bounds: IAabb,
}

impl ClipInfo {
    pub fn new(content_bounds: IAabb) -> Self {
        Self {
            content_bounds,
            read_bounds: IAabb::EMPTY_FOR_JOIN,
        }
    }
}

/// Hands out clip IDs for a single logical flush.
///
/// The clip buffer is re-rendered every flush, so IDs only have to be unique within one.
#[derive(Debug)]
pub struct ClipTracker {
    clips: Vec<ClipInfo>,
    max_clip_id: u32,
}

impl ClipTracker {
    pub fn new(max_clip_id: u32) -> Self {
        Self {
            clips: Vec::new(),
            max_clip_id,
        }
    }

    /// Returns a fresh nonzero ID, or 0 once the ID space of this flush is used up.
    pub fn generate_clip_id(&mut self, content_bounds: IAabb) -> u32 {
        if self.clips.len() >= self.max_clip_id as usize {
            return 0;
        }
        self.clips.push(ClipInfo::new(content_bounds));
        self.clips.len() as u32
    }

    /// Joins `bounds` into the read bounds of `clip_id`.
    pub fn add_clip_read_bounds(&mut self, clip_id: u32, bounds: IAabb) {
        debug_assert!(clip_id != 0, "clip ID 0 means no clip");
        if let Some(info) = self.get_mut(clip_id) {
            info.read_bounds = info.read_bounds.join(&bounds);
        } else {
            debug_assert!(false, "unknown clip ID {clip_id}");
        }
    }

    pub fn get(&self, clip_id: u32) -> Option<&ClipInfo> {
        self.clips.get((clip_id as usize).checked_sub(1)?)
    }

    fn get_mut(&mut self, clip_id: u32) -> Option<&mut ClipInfo> {
        self.clips.get_mut((clip_id as usize).checked_sub(1)?)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn max_clip_id(&self) -> u32 {
        self.max_clip_id
    }

    /// Lowers or raises the ID limit. IDs already handed out stay valid.
    pub fn set_max_clip_id(&mut self, max_clip_id: u32) {
        self.max_clip_id = max_clip_id;
    }

    pub fn reset(&mut self) {
        self.clips.clear();
    }

    pub fn reset_containers(&mut self) {
        self.clips = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_nonzero() {
        let mut tracker = ClipTracker::new(100);
        let ids: Vec<_> = (0..100)
            .map(|i| tracker.generate_clip_id(IAabb::new(i, i, i + 1, i + 1)))
            .collect();
        assert!(ids.iter().all(|&id| id != 0));
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert_eq!(tracker.generate_clip_id(IAabb::ZERO), 0);
    }

    #[test]
    fn read_bounds_accumulate() {
        let mut tracker = ClipTracker::new(4);
        let id = tracker.generate_clip_id(IAabb::new(0, 0, 10, 10));
        assert_eq!(
            tracker.get(id).map(|c| c.read_bounds),
            Some(IAabb::EMPTY_FOR_JOIN)
        );
        tracker.add_clip_read_bounds(id, IAabb::new(2, 2, 4, 4));
        tracker.add_clip_read_bounds(id, IAabb::new(1, 3, 3, 8));
        let info = tracker.get(id).copied().expect("clip exists");
        assert_eq!(info.read_bounds, IAabb::new(1, 2, 4, 8));
        assert_eq!(info.content_bounds, IAabb::new(0, 0, 10, 10));
        assert!(tracker.get(0).is_none());
    }

    #[test]
    fn reset_restores_the_id_space() {
        let mut tracker = ClipTracker::new(1);
        assert_eq!(tracker.generate_clip_id(IAabb::ZERO), 1);
        assert_eq!(tracker.generate_clip_id(IAabb::ZERO), 0);
        tracker.reset();
        assert_eq!(tracker.generate_clip_id(IAabb::ZERO), 1);
    }
}
