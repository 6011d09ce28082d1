//! Move goals: actors (or anything else with a location) a follower can be sent after.

use std::sync::{Arc, Weak};

use crate::types::{Cylinder, Quat, Vec3};

/// Geometry used when testing whether an agent reached a goal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GoalReachTest {
    /// Offset from the goal location to the point the agent should reach, in goal space.
    pub offset: Vec3,
    pub radius: f32,
    pub half_height: f32,
}

/// Something a follower can move to.
///
/// Followers hold goals weakly; a goal that was dropped simply stops being tested.
pub trait MoveGoal: Send + Sync {
    fn location(&self) -> Vec3;

    fn rotation(&self) -> Quat {
        Quat::identity()
    }

    /// True when the goal is itself a navigating agent.
    fn is_nav_agent(&self) -> bool {
        false
    }

    /// Location on the navigation graph, for agents that track one.
    fn nav_agent_location(&self) -> Vec3 {
        self.location()
    }

    /// Preferred offset from the goal location for an agent arriving from `mover_location`.
    fn move_goal_offset(&self, _mover_location: &Vec3) -> Vec3 {
        Vec3::zeros()
    }

    /// Collision cylinder of the goal. Zero by default.
    fn collision_cylinder(&self) -> Cylinder {
        Cylinder::default()
    }

    /// Reach test geometry for a mover that asked for `move_offset`.
    fn move_goal_reach_test(&self, move_offset: &Vec3) -> GoalReachTest {
        let cylinder = self.collision_cylinder();
        GoalReachTest {
            offset: *move_offset,
            radius: cylinder.radius,
            half_height: cylinder.half_height,
        }
    }
}

pub type SharedGoal = Arc<dyn MoveGoal>;
pub type WeakGoal = Weak<dyn MoveGoal>;

/// True when both handles point at the same goal.
pub fn same_goal(a: &WeakGoal, b: &WeakGoal) -> bool {
    Weak::ptr_eq(a, b)
}

/// Goal fixed at a location with an optional cylinder.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticGoal {
    pub location: Vec3,
    pub cylinder: Cylinder,
}

impl MoveGoal for StaticGoal {
    fn location(&self) -> Vec3 {
        self.location
    }

    fn collision_cylinder(&self) -> Cylinder {
        self.cylinder
    }
}
