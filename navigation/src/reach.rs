//! Cylinder reach tests.
//!
//! An agent reached a target when the planar distance fits inside the combined radii and the
//! vertical distance fits inside the combined half-heights.

use crate::{
    goal::MoveGoal,
    types::{Cylinder, Vec3, dist_sq_2d, safe_normal, size_2d},
};

/// Target cylinder of a reach test.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReachTarget {
    pub location: Vec3,
    pub radius: f32,
    pub half_height: f32,
}

impl ReachTarget {
    pub fn point(location: Vec3) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    /// Reach cylinder of `goal` for a mover that was given `move_offset`.
    ///
    /// Navigating agents expose their own reach geometry; other goals are tested at their
    /// location with no extent.
    pub fn from_goal(goal: &dyn MoveGoal, move_offset: &Vec3) -> Self {
        if !goal.is_nav_agent() {
            return Self::point(goal.location());
        }

        let reach = goal.move_goal_reach_test(move_offset);
        Self {
            location: goal.nav_agent_location() + goal.rotation() * reach.offset,
            radius: reach.radius,
            half_height: reach.half_height,
        }
    }
}

/// Parameters of one reach test against a moving agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReachTest {
    pub agent: Cylinder,
    /// Lower bound of the planar radius (acceptance radius).
    pub radius_threshold: f32,
    /// How much of the agent radius counts toward the planar radius.
    pub agent_radius_multiplier: f32,
    /// How much of the agent half-height counts toward the vertical tolerance.
    pub half_height_pct: f32,
}

impl ReachTest {
    pub fn planar_radius(&self, target: &ReachTarget) -> f32 {
        self.radius_threshold
            .max(target.radius + self.agent.radius * self.agent_radius_multiplier)
    }

    pub fn vertical_tolerance(&self, target: &ReachTarget) -> f32 {
        target.half_height + self.agent.half_height * self.half_height_pct
    }

    pub fn passes(&self, target: &ReachTarget, agent_location: &Vec3) -> bool {
        let radius = self.planar_radius(target);
        if dist_sq_2d(&target.location, agent_location) > radius * radius {
            return false;
        }

        (target.location.y - agent_location.y).abs() <= self.vertical_tolerance(target)
    }

    /// Breakdown of the test for debug output. `direction` is the current move direction.
    pub fn report(&self, target: &ReachTarget, agent_location: &Vec3, direction: &Vec3) -> ReachReport {
        let to_goal = target.location - agent_location;
        let dot = safe_normal(&to_goal).dot(direction);
        let distance = size_2d(&to_goal);
        let height = to_goal.y.abs();

        ReachReport {
            dot,
            distance,
            height,
            dot_failed: dot < 0.0,
            distance_failed: distance > self.planar_radius(target),
            height_failed: height > self.vertical_tolerance(target),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReachReport {
    pub dot: f32,
    pub distance: f32,
    pub height: f32,
    pub dot_failed: bool,
    pub distance_failed: bool,
    pub height_failed: bool,
}

impl std::fmt::Display for ReachReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |failed: bool| if failed { "!" } else { "" };
        write!(
            f,
            "dot[{:.2}{}] dist2D[{:.2}{}] distZ[{:.2}{}]",
            self.dot,
            mark(self.dot_failed),
            self.distance,
            mark(self.distance_failed),
            self.height,
            mark(self.height_failed),
        )
    }
}
