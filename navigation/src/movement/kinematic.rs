//! Capsule mover on top of rapier's kinematic character controller.
//!
//! The follower requests a velocity, [`KinematicMover::step`] turns it into a corrected
//! translation against the static world. Only planar motion comes from the request; vertical
//! motion is a small down-bias while grounded and a constant fall speed while airborne.

use rapier3d::{
    control::{CharacterAutostep, CharacterLength, KinematicCharacterController},
    prelude::*,
};

use crate::{
    movement::NavMovement,
    settings::MoverSettings,
    types::{Cylinder, Vec3},
    world::ObstacleWorld,
};

/// Planar factor applied to requested motion while airborne.
const AIR_CONTROL: f32 = 0.35;

#[derive(Clone, Debug)]
pub struct KinematicMover {
    /// Capsule center.
    center: Vec3,
    radius: f32,
    /// Half length of the capsule's inner segment.
    segment_half_height: f32,
    settings: MoverSettings,
    requested_velocity: Vec3,
    velocity: Vec3,
    grounded: bool,
    enabled: bool,
}

impl KinematicMover {
    /// Capsule with total height `2 * half_height` standing on `feet`.
    pub fn new(feet: Vec3, radius: f32, half_height: f32, settings: MoverSettings) -> Self {
        let segment_half_height = (half_height - radius).max(0.0);
        Self {
            center: feet + Vec3::new(0.0, segment_half_height + radius, 0.0),
            radius,
            segment_half_height,
            settings,
            requested_velocity: Vec3::zeros(),
            velocity: Vec3::zeros(),
            grounded: true,
            enabled: true,
        }
    }

    pub fn settings(&self) -> &MoverSettings {
        &self.settings
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.requested_velocity = Vec3::zeros();
        }
    }

    /// Places the capsule with its feet at `feet`.
    pub fn teleport(&mut self, feet: Vec3) {
        self.center = feet + Vec3::new(0.0, self.segment_half_height + self.radius, 0.0);
        self.velocity = Vec3::zeros();
    }

    /// Planar yaw of the last motion, if the agent moved.
    pub fn facing(&self) -> Option<f32> {
        let planar = Vec3::new(self.velocity.x, 0.0, self.velocity.z);
        if planar.norm_squared() <= 1.0e-6 {
            return None;
        }
        Some((-planar.x).atan2(-planar.z))
    }

    pub fn controller(&self) -> KinematicCharacterController {
        let s = &self.settings;
        KinematicCharacterController {
            offset: CharacterLength::Absolute(s.offset),
            max_slope_climb_angle: s.max_slope_climb_deg.to_radians(),
            min_slope_slide_angle: s.min_slope_slide_deg.to_radians(),
            snap_to_ground: Some(CharacterLength::Absolute(s.snap_to_ground)),
            autostep: Some(CharacterAutostep {
                max_height: CharacterLength::Absolute(s.autostep_max_height),
                min_width: CharacterLength::Absolute(s.autostep_min_width),
                include_dynamic_bodies: false,
            }),
            slide: s.slide,
            normal_nudge_factor: s.normal_nudge_factor,
            ..KinematicCharacterController::default()
        }
    }

    /// Advances the capsule by `dt` against `world`.
    pub fn step(&mut self, world: &ObstacleWorld, controller: &KinematicCharacterController, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        let mut planar = Vec3::new(self.requested_velocity.x, 0.0, self.requested_velocity.z) * dt;
        let down_bias = -self.settings.grounded_down_bias_mps * dt;
        let fall = if self.grounded {
            0.0
        } else {
            planar *= AIR_CONTROL;
            -self.settings.fall_speed_mps * dt
        };
        let desired = Vec3::new(planar.x, down_bias + fall, planar.z);

        let pipeline = world.query_pipeline(QueryFilter::default());
        let corrected = controller.move_shape(
            dt,
            &pipeline,
            &Capsule::new_y(self.segment_half_height, self.radius),
            &Isometry::translation(self.center.x, self.center.y, self.center.z),
            desired,
            |_| {},
        );

        self.center += corrected.translation;
        self.velocity = corrected.translation / dt;
        if self.grounded != corrected.grounded {
            log::trace!("mover grounded: {}", corrected.grounded);
            self.grounded = corrected.grounded;
        }
    }
}

impl NavMovement for KinematicMover {
    fn feet_location(&self) -> Vec3 {
        self.center - Vec3::new(0.0, self.segment_half_height + self.radius, 0.0)
    }

    fn collision_cylinder(&self) -> Cylinder {
        Cylinder::new(self.radius, self.segment_half_height + self.radius)
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn max_speed(&self) -> f32 {
        self.settings.max_speed_mps
    }

    fn can_start_path_following(&self) -> bool {
        self.enabled
    }

    fn is_falling(&self) -> bool {
        !self.grounded
    }

    fn request_direct_move(&mut self, velocity: &Vec3, force_max_speed: bool) {
        if !self.enabled {
            return;
        }

        let planar = Vec3::new(velocity.x, 0.0, velocity.z);
        let speed = planar.norm();
        let max = self.settings.max_speed_mps;
        self.requested_velocity = if speed <= 1.0e-6 {
            Vec3::zeros()
        } else if force_max_speed || speed > max {
            planar * (max / speed)
        } else {
            planar
        };
    }

    fn stop_movement_keep_pathing(&mut self) {
        self.requested_velocity = Vec3::zeros();
        self.velocity = Vec3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WorldStaticDef;

    fn flat_world() -> ObstacleWorld {
        ObstacleWorld::build(vec![
            WorldStaticDef::ground_plane(1, 0.0, 0),
            WorldStaticDef::obstacle_box(2, Vec3::new(3.0, 1.0, 0.0), Vec3::new(0.5, 1.0, 3.0)),
        ])
    }

    fn mover() -> KinematicMover {
        KinematicMover::new(Vec3::new(0.0, 0.0, 0.0), 0.4, 0.9, MoverSettings::default())
    }

    #[test]
    fn requested_speed_is_clamped() {
        let mut m = mover();
        m.request_direct_move(&Vec3::new(100.0, 5.0, 0.0), false);
        assert!((m.requested_velocity.norm() - m.max_speed()).abs() < 1.0e-4);
        assert_eq!(m.requested_velocity.y, 0.0);

        m.request_direct_move(&Vec3::new(0.5, 0.0, 0.0), true);
        assert!((m.requested_velocity.norm() - m.max_speed()).abs() < 1.0e-4);

        m.request_direct_move(&Vec3::new(0.5, 0.0, 0.0), false);
        assert!((m.requested_velocity.x - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn cylinder_matches_capsule() {
        let m = mover();
        assert_eq!(m.collision_cylinder(), Cylinder::new(0.4, 0.9));
        assert!(m.feet_location().norm() < 1.0e-6);
    }

    #[test]
    fn steps_forward_on_flat_ground() {
        let world = flat_world();
        let controller = mover().controller();
        let mut m = mover();
        m.teleport(Vec3::new(0.0, 0.02, 0.0));
        m.request_direct_move(&Vec3::new(0.0, 0.0, 2.0), false);
        for _ in 0..10 {
            m.step(&world, &controller, 0.05);
        }
        let feet = m.feet_location();
        assert!(feet.z > 0.8, "moved to {feet:?}");
        assert!(feet.y.abs() < 0.1);
    }

    #[test]
    fn wall_stops_the_capsule() {
        let world = flat_world();
        let controller = mover().controller();
        let mut m = mover();
        m.teleport(Vec3::new(0.0, 0.02, 0.0));
        m.request_direct_move(&Vec3::new(4.0, 0.0, 0.0), false);
        for _ in 0..60 {
            m.step(&world, &controller, 0.05);
        }
        assert!(m.feet_location().x < 2.5 - 0.35);
    }

    #[test]
    fn disabled_mover_ignores_requests() {
        let mut m = mover();
        m.set_enabled(false);
        assert!(!m.can_start_path_following());
        m.request_direct_move(&Vec3::new(1.0, 0.0, 0.0), false);
        assert_eq!(m.requested_velocity, Vec3::zeros());
    }
}
