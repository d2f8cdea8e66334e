//! Trip-line segment detector
//!
//! A trip-line is a vertical or horizontal line across the world, placed at a
//! fraction of the world extent and divided into equal segments. Every tick
//! each moving agent is tested against the line; a crossing (or dwelling on
//! the line) marks the segment at the interpolated crossing point as
//! occupied. Segments switch on when occupancy rises from zero and off when
//! it falls back to zero, so each edge is reported exactly once.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::settings::{LineSettings, MAX_SEGMENTS, clamp_or};

/// Interpolation denominators below this fall back to the midpoint
const CROSSING_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LineOrientation {
    /// Line of constant x, segmented along y
    Vertical,
    /// Line of constant y, segmented along x
    Horizontal,
}

impl LineOrientation {
    pub const ALL: [LineOrientation; 2] = [LineOrientation::Vertical, LineOrientation::Horizontal];

    /// (axis the line sits on, axis the segments run along)
    #[inline]
    fn axes(self, v: Vec2) -> (f32, f32) {
        match self {
            LineOrientation::Vertical => (v.x, v.y),
            LineOrientation::Horizontal => (v.y, v.x),
        }
    }
}

/// A segment switching on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentChange {
    pub segment: usize,
    pub active: bool,
}

/// Equal-ratio pitch of segment `k`, centered on the middle segment
pub fn segment_frequency(segment: usize, segments: usize, reference: f32, ratio: f32) -> f32 {
    let center = (segments / 2) as i32;
    reference * ratio.powi(segment as i32 - center)
}

/// One movable trip-line and its per-segment state
#[derive(Debug, Clone)]
pub struct TripLine {
    pub orientation: LineOrientation,
    pub enabled: bool,
    ratio: f32,
    active: Vec<bool>,
    occupancy: Vec<u32>,
}

impl TripLine {
    pub fn new(orientation: LineOrientation, settings: &LineSettings) -> Self {
        let segments = settings.segments.clamp(1, MAX_SEGMENTS);
        Self {
            orientation,
            enabled: settings.enabled,
            ratio: clamp_or(settings.ratio, 0.0, 1.0, 0.5),
            active: vec![false; segments],
            occupancy: vec![0; segments],
        }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = clamp_or(ratio, 0.0, 1.0, self.ratio);
    }

    pub fn segments(&self) -> usize {
        self.active.len()
    }

    /// Resize the segment array. Returns the segments that were active so the
    /// caller can release them; every flag starts off afterwards.
    pub fn set_segments(&mut self, segments: usize) -> Vec<usize> {
        let released = self.release_all();
        let segments = segments.clamp(1, MAX_SEGMENTS);
        self.active = vec![false; segments];
        self.occupancy = vec![0; segments];
        released
    }

    pub fn is_active(&self, segment: usize) -> bool {
        self.active.get(segment).copied().unwrap_or(false)
    }

    pub fn active_segments(&self) -> Vec<usize> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect()
    }

    /// Line coordinate in world units
    pub fn position(&self, world: Vec2) -> f32 {
        let (extent, _) = self.orientation.axes(world);
        self.ratio * extent
    }

    /// Segment hit by a move from `prev` to `curr`, if any
    pub fn crossing(&self, prev: Vec2, curr: Vec2, world: Vec2, dwell_band: f32) -> Option<usize> {
        let delta = (curr - prev).abs();
        // A jump over half the world is a toroidal wrap, not motion
        if delta.x > world.x / 2.0 || delta.y > world.y / 2.0 {
            return None;
        }

        let line = self.position(world);
        let (prev_on, prev_along) = self.orientation.axes(prev);
        let (curr_on, curr_along) = self.orientation.axes(curr);
        let (_, extent_along) = self.orientation.axes(world);

        let a = prev_on - line;
        let b = curr_on - line;
        let crossed = (a < 0.0) != (b < 0.0);
        let dwelling = a.abs() < dwell_band && b.abs() < dwell_band;
        if !crossed && !dwelling {
            return None;
        }

        let denom = a - b;
        let t = if denom.abs() > CROSSING_EPSILON {
            (a / denom).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let along = prev_along + (curr_along - prev_along) * t;
        let width = extent_along / self.segments() as f32;
        let segment = ((along / width).floor().max(0.0) as usize).min(self.segments() - 1);
        Some(segment)
    }

    /// Fold this tick's moves into occupancy and report segment edges
    pub fn update<I>(&mut self, moves: I, world: Vec2, dwell_band: f32) -> Vec<SegmentChange>
    where
        I: IntoIterator<Item = (Vec2, Vec2)>,
    {
        self.occupancy.iter_mut().for_each(|o| *o = 0);
        if self.enabled {
            for (prev, curr) in moves {
                if let Some(segment) = self.crossing(prev, curr, world, dwell_band) {
                    self.occupancy[segment] += 1;
                }
            }
        }

        let mut changes = Vec::new();
        for (segment, (&count, on)) in self.occupancy.iter().zip(self.active.iter_mut()).enumerate() {
            let occupied = count > 0;
            if occupied != *on {
                *on = occupied;
                changes.push(SegmentChange {
                    segment,
                    active: occupied,
                });
            }
        }
        changes
    }

    /// Switch every segment off, returning those that were on
    pub fn release_all(&mut self) -> Vec<usize> {
        let released = self.active_segments();
        self.active.iter_mut().for_each(|on| *on = false);
        self.occupancy.iter_mut().for_each(|o| *o = 0);
        released
    }
}
