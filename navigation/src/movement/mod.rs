//! Movement back-ends driven by a path follower.

mod kinematic;

pub use kinematic::KinematicMover;

use crate::types::{Cylinder, Vec3};

/// What a follower needs from the thing that actually moves the agent.
pub trait NavMovement: Send + Sync {
    /// Bottom center of the agent's collision shape.
    fn feet_location(&self) -> Vec3;

    /// Feet location relative to whatever the agent stands on. Back-ends without moving
    /// bases return the world location.
    fn feet_location_based(&self) -> Vec3 {
        self.feet_location()
    }

    fn collision_cylinder(&self) -> Cylinder;

    fn agent_radius(&self) -> f32 {
        self.collision_cylinder().radius
    }

    fn velocity(&self) -> Vec3;

    fn max_speed(&self) -> f32;

    /// False while the back-end can't take path following input (e.g. disabled or falling).
    fn can_start_path_following(&self) -> bool {
        true
    }

    /// False while the back-end owns the move and the follower must not finish it.
    fn can_stop_path_following(&self) -> bool {
        true
    }

    fn is_falling(&self) -> bool {
        false
    }

    /// Requests a velocity for the next movement update.
    fn request_direct_move(&mut self, velocity: &Vec3, force_max_speed: bool);

    /// Stops the current motion without forgetting anything pathing related.
    fn stop_movement_keep_pathing(&mut self);
}
