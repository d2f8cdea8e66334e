//! 2D vector helpers for steering forces
//!
//! `glam::Vec2` already covers add/scale/lerp; these fill in the steering
//! vocabulary (set magnitude, limit, heading, toroidal wrap) with guards
//! against degenerate zero-length input.

use glam::Vec2;
use rand::Rng;

/// Vectors shorter than this have no usable direction
pub const DIRECTION_EPSILON: f32 = 1e-6;

/// Rescale `v` to length `mag`; a zero vector stays zero
#[inline]
pub fn with_magnitude(v: Vec2, mag: f32) -> Vec2 {
    if v.length_squared() < DIRECTION_EPSILON * DIRECTION_EPSILON {
        Vec2::ZERO
    } else {
        v.normalize() * mag
    }
}

/// Cap the length of `v` at `max`
#[inline]
pub fn limit(v: Vec2, max: f32) -> Vec2 {
    v.clamp_length_max(max.max(0.0))
}

/// Angle of `v` in radians, measured from +x
#[inline]
pub fn heading(v: Vec2) -> f32 {
    v.y.atan2(v.x)
}

/// Unit vector pointing at `angle`
#[inline]
pub fn from_angle(angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}

/// Uniformly distributed unit vector
pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    from_angle(rng.random_range(0.0..std::f32::consts::TAU))
}

/// Wrap one coordinate into `[0, extent)`
#[inline]
pub fn wrap_coordinate(value: f32, extent: f32) -> f32 {
    let wrapped = value.rem_euclid(extent);
    // rem_euclid can round up to `extent` for tiny negative inputs
    if wrapped >= extent { 0.0 } else { wrapped }
}

/// Wrap a position into the toroidal world `[0, w) × [0, h)`
#[inline]
pub fn wrap_position(pos: Vec2, extent: Vec2) -> Vec2 {
    Vec2::new(
        wrap_coordinate(pos.x, extent.x),
        wrap_coordinate(pos.y, extent.y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_with_magnitude_zero_vector() {
        assert_eq!(with_magnitude(Vec2::ZERO, 3.0), Vec2::ZERO);
        let v = with_magnitude(Vec2::new(3.0, 4.0), 10.0);
        assert!((v - Vec2::new(6.0, 8.0)).length() < 1e-5);
    }

    #[test]
    fn test_limit() {
        let v = limit(Vec2::new(30.0, 40.0), 5.0);
        assert!((v.length() - 5.0).abs() < 1e-5);
        let short = Vec2::new(0.1, 0.2);
        assert_eq!(limit(short, 5.0), short);
    }

    #[test]
    fn test_wrap_coordinate() {
        assert_eq!(wrap_coordinate(805.0, 800.0), 5.0);
        assert_eq!(wrap_coordinate(-5.0, 800.0), 795.0);
        assert_eq!(wrap_coordinate(800.0, 800.0), 0.0);
        let tiny = wrap_coordinate(-1e-9, 800.0);
        assert!((0.0..800.0).contains(&tiny));
    }

    #[test]
    fn test_random_unit_is_unit_length() {
        let mut rng = Pcg32::seed_from_u64(3);
        for _ in 0..32 {
            assert!((random_unit(&mut rng).length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_heading_matches_from_angle() {
        let angle = 1.2;
        assert!((heading(from_angle(angle)) - angle).abs() < 1e-5);
    }
}
