//! Shape motion model
//!
//! TigerStyle: Pure state transitions, bounds as named constants.
//!
//! A shape is a point with a unit velocity on each axis, kept inside the
//! rectangle `[SHAPE_X_MIN, SHAPE_X_MAX] x [SHAPE_Y_MIN, SHAPE_Y_MAX]`.
//! Each advance first corrects the velocity from the pre-move position, then
//! moves one unit per axis. A shape can therefore overshoot a bound by at most
//! one unit before the next advance turns it around.

use crate::actor::ActorId;
use crate::constants::{
    SHAPE_ACTOR_NAMESPACE, SHAPE_X_MAX, SHAPE_X_MIN, SHAPE_Y_MAX, SHAPE_Y_MIN,
};
use crate::error::{Error, Result};
use crate::io::RngProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Shape
// =============================================================================

/// Position, velocity and orientation of one shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub x: f64,
    pub y: f64,
    pub diff_x: f64,
    pub diff_y: f64,
    /// Orientation in degrees; carried but not changed by motion
    pub angle: f64,
}

impl Shape {
    /// Create a shape at an explicit position and velocity
    pub fn new(x: f64, y: f64, diff_x: f64, diff_y: f64) -> Self {
        debug_assert!(diff_x.abs() == 1.0, "diff_x must be +1 or -1");
        debug_assert!(diff_y.abs() == 1.0, "diff_y must be +1 or -1");
        Self {
            x,
            y,
            diff_x,
            diff_y,
            angle: 0.0,
        }
    }

    /// Create a shape with a random whole-unit position inside the bounds and
    /// a random direction on each axis
    pub fn random(rng: &dyn RngProvider) -> Self {
        let x = rng.gen_range(SHAPE_X_MIN as u64, SHAPE_X_MAX as u64) as f64;
        let y = rng.gen_range(SHAPE_Y_MIN as u64, SHAPE_Y_MAX as u64) as f64;
        let diff_x = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let diff_y = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };

        let shape = Self::new(x, y, diff_x, diff_y);
        debug_assert!(shape.is_within_bounds());
        shape
    }

    /// Advance one step
    ///
    /// Velocity is corrected per axis from the pre-move position, then the
    /// position moves by the velocity.
    pub fn advance(&mut self) {
        if self.x > SHAPE_X_MAX {
            self.diff_x = -1.0;
        }
        if self.x < SHAPE_X_MIN {
            self.diff_x = 1.0;
        }
        if self.y > SHAPE_Y_MAX {
            self.diff_y = -1.0;
        }
        if self.y < SHAPE_Y_MIN {
            self.diff_y = 1.0;
        }

        self.x += self.diff_x;
        self.y += self.diff_y;
    }

    /// Check the position lies inside the bounds
    pub fn is_within_bounds(&self) -> bool {
        (SHAPE_X_MIN..=SHAPE_X_MAX).contains(&self.x)
            && (SHAPE_Y_MIN..=SHAPE_Y_MAX).contains(&self.y)
    }

    /// Check the position lies at most one step outside the bounds
    pub fn is_within_overshoot(&self) -> bool {
        (SHAPE_X_MIN - 1.0..=SHAPE_X_MAX + 1.0).contains(&self.x)
            && (SHAPE_Y_MIN - 1.0..=SHAPE_Y_MAX + 1.0).contains(&self.y)
    }
}

// =============================================================================
// ShapeKey
// =============================================================================

/// Composite identity of a shape: the owning client and the shape itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeKey {
    pub owner_id: Uuid,
    pub shape_id: Uuid,
}

impl ShapeKey {
    pub fn new(owner_id: Uuid, shape_id: Uuid) -> Self {
        Self { owner_id, shape_id }
    }

    /// Actor id in the shape namespace: `{owner}_{shape}` with undashed UUIDs
    pub fn actor_id(&self) -> Result<ActorId> {
        ActorId::new(SHAPE_ACTOR_NAMESPACE, self.to_string())
    }

    /// Recover the key from a shape actor id
    pub fn from_actor_id(actor_id: &ActorId) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidActorId {
            id: actor_id.qualified_name(),
            reason: reason.to_string(),
        };

        if actor_id.namespace() != SHAPE_ACTOR_NAMESPACE {
            return Err(invalid("not a shape actor"));
        }

        let (owner, shape) = actor_id
            .id()
            .split_once('_')
            .ok_or_else(|| invalid("expected {owner}_{shape}"))?;
        let owner_id = Uuid::parse_str(owner).map_err(|_| invalid("owner is not a uuid"))?;
        let shape_id = Uuid::parse_str(shape).map_err(|_| invalid("shape is not a uuid"))?;

        Ok(Self { owner_id, shape_id })
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.owner_id.simple(),
            self.shape_id.simple()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::StdRngProvider;

    fn tick(x: f64, y: f64, diff_x: f64, diff_y: f64) -> Shape {
        let mut shape = Shape::new(x, y, diff_x, diff_y);
        shape.advance();
        shape
    }

    #[test]
    fn test_advance_corrects_from_pre_tick_values() {
        // y below the lower bound: dy is forced to +1 before moving
        assert_eq!(tick(895.0, 5.0, 1.0, 1.0), Shape::new(896.0, 6.0, 1.0, 1.0));
        assert_eq!(tick(895.0, 5.0, 1.0, -1.0), Shape::new(896.0, 6.0, 1.0, 1.0));
    }

    #[test]
    fn test_advance_pinned_ticks() {
        // interior: plain move
        assert_eq!(tick(100.0, 100.0, 1.0, -1.0), Shape::new(101.0, 99.0, 1.0, -1.0));
        // exactly on the upper bound: no correction yet, overshoots by one
        assert_eq!(tick(900.0, 600.0, 1.0, 1.0), Shape::new(901.0, 601.0, 1.0, 1.0));
        // one past the upper bound: turned around on both axes
        assert_eq!(tick(901.0, 601.0, 1.0, 1.0), Shape::new(900.0, 600.0, -1.0, -1.0));
        // one past the lower bound: turned around on both axes
        assert_eq!(tick(9.0, 9.0, -1.0, -1.0), Shape::new(10.0, 10.0, 1.0, 1.0));
        // already heading back: correction is a no-op
        assert_eq!(tick(905.0, 300.0, -1.0, 1.0), Shape::new(904.0, 301.0, -1.0, 1.0));
    }

    #[test]
    fn test_advance_keeps_angle() {
        let mut shape = Shape::new(50.0, 50.0, 1.0, 1.0);
        shape.angle = 45.0;
        shape.advance();
        assert_eq!(shape.angle, 45.0);
    }

    #[test]
    fn test_random_shapes_start_in_bounds() {
        let rng = StdRngProvider::with_seed(7);
        for _ in 0..1000 {
            let shape = Shape::random(&rng);
            assert!(shape.is_within_bounds(), "{:?}", shape);
            assert_eq!(shape.diff_x.abs(), 1.0);
            assert_eq!(shape.diff_y.abs(), 1.0);
            assert_eq!(shape.angle, 0.0);
        }
    }

    #[test]
    fn test_random_shape_is_seed_deterministic() {
        let a = Shape::random(&StdRngProvider::with_seed(99));
        let b = Shape::random(&StdRngProvider::with_seed(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_long_run_never_overshoots_more_than_one_step() {
        let rng = StdRngProvider::with_seed(1234);
        for _ in 0..20 {
            let mut shape = Shape::random(&rng);
            for _ in 0..5000 {
                shape.advance();
                assert!(shape.is_within_overshoot(), "{:?}", shape);
            }
        }
    }

    #[test]
    fn test_shape_json_is_camel_case() {
        let json = serde_json::to_value(Shape::new(1.0, 2.0, 1.0, -1.0)).unwrap();
        assert_eq!(json["diffX"], 1.0);
        assert_eq!(json["diffY"], -1.0);
        assert_eq!(json["angle"], 0.0);
    }

    #[test]
    fn test_shape_key_actor_id_round_trip() {
        let key = ShapeKey::new(Uuid::new_v4(), Uuid::new_v4());
        let actor_id = key.actor_id().unwrap();

        assert_eq!(actor_id.namespace(), SHAPE_ACTOR_NAMESPACE);
        assert!(!actor_id.id().contains('-'));
        assert_eq!(ShapeKey::from_actor_id(&actor_id).unwrap(), key);
    }

    #[test]
    fn test_shape_key_rejects_malformed_ids() {
        let wrong_ns = ActorId::new("other", "a_b").unwrap();
        assert!(ShapeKey::from_actor_id(&wrong_ns).is_err());

        let no_sep = ActorId::new(SHAPE_ACTOR_NAMESPACE, "abc").unwrap();
        assert!(ShapeKey::from_actor_id(&no_sep).is_err());

        let not_uuid = ActorId::new(SHAPE_ACTOR_NAMESPACE, "abc_def").unwrap();
        assert!(ShapeKey::from_actor_id(&not_uuid).is_err());
    }
}
