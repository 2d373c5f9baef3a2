//! Toss geometry
//!
//! Pure functions only: no state, no I/O. Anything random takes the RNG as a
//! parameter so a seeded `Pcg32` reproduces the same toss.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consts::{MIN_RULE_SIZE, OVERLAP_MARGIN};

/// Axis-aligned playable rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Canvas of the given size anchored at the origin
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(Vec2::ZERO, Vec2::new(width, height))
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

/// Rectangular rule region, stored in a rule's `data` as JSON
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Shape {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Square of half-size `radius` centered on `point`
    pub fn square_around(point: Vec2, radius: f32) -> Self {
        Self::new(point.x - radius, point.y - radius, radius * 2.0, radius * 2.0)
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }

    /// Edge-inclusive containment
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }

    /// Edge-inclusive overlap, with each side grown by `margin`
    pub fn overlaps(&self, other: &Shape, margin: f32) -> bool {
        self.left - margin <= other.right()
            && other.left - margin <= self.right()
            && self.top - margin <= other.bottom()
            && other.top - margin <= self.bottom()
    }

    /// Scale around the center; sides never shrink below `MIN_RULE_SIZE`
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        let c = self.center();
        let w = (self.width * sx).max(MIN_RULE_SIZE);
        let h = (self.height * sy).max(MIN_RULE_SIZE);
        Self::new(c.x - w / 2.0, c.y - h / 2.0, w, h)
    }

    pub fn to_json(&self) -> String {
        // A struct of four floats always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

/// Where the toss indicator first appears: anywhere on the board
pub fn randomize_approach<R: Rng + ?Sized>(bounds: &Bounds, rng: &mut R) -> Vec2 {
    Vec2::new(
        rng.random_range(bounds.min.x..=bounds.max.x),
        rng.random_range(bounds.min.y..=bounds.max.y),
    )
}

/// Jitter the approach point by up to `max_offset` in a random direction
///
/// The result is not clamped, so tosses near the edge can leave the board.
pub fn apply_uncertainty<R: Rng + ?Sized>(point: Vec2, max_offset: f32, rng: &mut R) -> Vec2 {
    let magnitude = rng.random_range(0.0..=max_offset.max(0.0));
    let angle = rng.random_range(0.0..=std::f32::consts::TAU);
    point + Vec2::from_angle(angle) * magnitude
}

/// Edge-inclusive board check; anything outside is a miss
pub fn is_within_bounds(point: Vec2, bounds: &Bounds) -> bool {
    point.x >= bounds.min.x
        && point.x <= bounds.max.x
        && point.y >= bounds.min.y
        && point.y <= bounds.max.y
}

/// True if `candidate` touches any of `existing` (with the safety margin)
pub fn intersects<'a, I>(candidate: &Shape, existing: I) -> bool
where
    I: IntoIterator<Item = &'a Shape>,
{
    existing
        .into_iter()
        .any(|shape| candidate.overlaps(shape, OVERLAP_MARGIN))
}
