//! Rapier query world over static level geometry.
//!
//! The same world backs three things: kinematic movement ([`crate::KinematicMover`]), capsule
//! sweeps for visibility checks ([`CollisionQuery`]) and the ground/obstacle probes used to
//! build a [`crate::NavGrid`].
//!
//! Statics never move after [`ObstacleWorld::build`]. Insertion is sorted by id so the same
//! definitions always produce the same collider handles.

use rapier3d::{
    na::{Translation3, UnitQuaternion},
    parry::query::ShapeCastOptions,
    prelude::*,
};

use crate::{navigation_data::CollisionQuery, types::Vec3};

/// How a static participates in navigation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticKind {
    /// Walkable surface tagged with a navigation area.
    Ground { area: u8 },
    /// Blocks movement and navigation.
    Obstacle,
}

/// Definition of one immutable collider.
///
/// Planes use a pose-derived normal `rotation * +Y` and sit at
/// `dot(normal, translation) + offset_along_normal`.
#[derive(Clone, Debug)]
pub struct WorldStaticDef {
    /// Stable unique id, used for deterministic insertion order.
    pub id: u32,
    pub translation: Vector<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub shape: ColliderShapeDef,
    pub kind: StaticKind,
}

impl WorldStaticDef {
    pub fn ground_plane(id: u32, height: f32, area: u8) -> Self {
        Self {
            id,
            translation: vector![0.0, height, 0.0],
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Plane {
                offset_along_normal: 0.0,
            },
            kind: StaticKind::Ground { area },
        }
    }

    pub fn obstacle_box(id: u32, center: Vec3, half_extents: Vec3) -> Self {
        Self {
            id,
            translation: center,
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Cuboid { half_extents },
            kind: StaticKind::Obstacle,
        }
    }

    /// Thin walkable slab whose top face is at `top`.
    pub fn ground_patch(id: u32, center_xz: (f32, f32), top: f32, half_size: (f32, f32), area: u8) -> Self {
        const THICKNESS: f32 = 0.05;
        Self {
            id,
            translation: vector![center_xz.0, top - THICKNESS, center_xz.1],
            rotation: UnitQuaternion::identity(),
            shape: ColliderShapeDef::Cuboid {
                half_extents: vector![half_size.0, THICKNESS, half_size.1],
            },
            kind: StaticKind::Ground { area },
        }
    }
}

/// Supported static collider shapes (meters).
#[derive(Clone, Debug)]
pub enum ColliderShapeDef {
    /// Infinite half-space. Any visual size is a rendering concern only.
    Plane { offset_along_normal: f32 },
    Cuboid { half_extents: Vector<f32> },
    Sphere { radius: f32 },
    CapsuleY { radius: f32, half_height: f32 },
    CylinderY { radius: f32, half_height: f32 },
    RoundCuboid {
        half_extents: Vector<f32>,
        border_radius: f32,
    },
}

const GROUND_TAG: u128 = 1 << 8;
const AREA_MASK: u128 = 0xff;

fn user_data_for(kind: StaticKind) -> u128 {
    match kind {
        StaticKind::Ground { area } => GROUND_TAG | area as u128,
        StaticKind::Obstacle => 0,
    }
}

fn is_ground(collider: &Collider) -> bool {
    collider.user_data & GROUND_TAG != 0
}

fn is_obstacle(_handle: ColliderHandle, collider: &Collider) -> bool {
    !is_ground(collider)
}

fn is_ground_collider(_handle: ColliderHandle, collider: &Collider) -> bool {
    is_ground(collider)
}

/// Ground hit below a probe point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundHit {
    pub height: f32,
    pub area: u8,
    pub normal_y: f32,
}

pub struct ObstacleWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
}

impl ObstacleWorld {
    pub fn build(mut defs: Vec<WorldStaticDef>) -> Self {
        defs.sort_by_key(|d| d.id);

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        for def in defs.iter() {
            let iso = Isometry::from_parts(Translation3::from(def.translation), def.rotation);
            let body = bodies.insert(RigidBodyBuilder::fixed().pose(iso).build());
            colliders.insert_with_parent(collider_from_def(def), body, &mut bodies);
        }

        // Collision-detection only step so the broad phase BVH is populated for queries.
        let mut broad_phase = BroadPhaseBvh::new();
        let mut narrow_phase = NarrowPhase::new();
        let mut collision_pipeline = CollisionPipeline::new();
        collision_pipeline.step(
            0.0,
            &mut broad_phase,
            &mut narrow_phase,
            &mut bodies,
            &mut colliders,
            &(),
            &(),
        );

        log::debug!(
            "obstacle world built: {} statics, {} colliders",
            defs.len(),
            colliders.len()
        );

        Self {
            bodies,
            colliders,
            broad_phase,
            narrow_phase,
        }
    }

    /// Borrowed query pipeline over every static.
    pub fn query_pipeline<'a>(&'a self, filter: QueryFilter<'a>) -> QueryPipeline<'a> {
        self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        )
    }

    /// First walkable surface below `(x, from_y, z)` within `max_dist`.
    pub fn ground_below(&self, x: f32, from_y: f32, z: f32, max_dist: f32) -> Option<GroundHit> {
        let predicate = is_ground_collider;
        let pipeline = self.query_pipeline(QueryFilter::default().predicate(&predicate));
        let ray = Ray::new(point![x, from_y, z], vector![0.0, -1.0, 0.0]);

        let (handle, hit) = pipeline.cast_ray_and_get_normal(&ray, max_dist.max(0.0), true)?;
        let area = self
            .colliders
            .get(handle)
            .map(|c| (c.user_data & AREA_MASK) as u8)
            .unwrap_or_default();

        Some(GroundHit {
            height: from_y - hit.time_of_impact,
            area,
            normal_y: hit.normal.y,
        })
    }

    /// True when an axis-aligned box at `center` overlaps any obstacle.
    pub fn obstacle_overlaps_box(&self, center: &Vec3, half_extents: &Vec3) -> bool {
        let predicate = is_obstacle;
        let pipeline = self.query_pipeline(QueryFilter::default().predicate(&predicate));
        let shape = Cuboid::new(*half_extents);
        let pose = Isometry::translation(center.x, center.y, center.z);
        pipeline.intersect_shape(pose, &shape).next().is_some()
    }
}

impl CollisionQuery for ObstacleWorld {
    fn sweep_capsule(&self, from: &Vec3, to: &Vec3, radius: f32, half_height: f32) -> bool {
        let delta = to - from;
        let length = delta.norm();
        if length <= f32::EPSILON {
            return false;
        }

        let predicate = is_obstacle;
        let pipeline = self.query_pipeline(QueryFilter::default().predicate(&predicate));
        let segment_half = (half_height - radius).max(0.0);
        let shape = Capsule::new_y(segment_half, radius);
        let pose = Isometry::translation(from.x, from.y, from.z);
        let options = ShapeCastOptions {
            max_time_of_impact: 1.0,
            stop_at_penetration: true,
            ..ShapeCastOptions::default()
        };

        pipeline.cast_shape(&pose, &delta, &shape, options).is_some()
    }
}

fn collider_from_def(def: &WorldStaticDef) -> Collider {
    let builder = match &def.shape {
        ColliderShapeDef::Plane {
            offset_along_normal,
        } => {
            // Plane `n . x = dist` with n = R * +Y, placed at `n * dist`.
            let n = def.rotation * Vector::y();
            let dist = n.dot(&def.translation) + *offset_along_normal;
            let unit_n = UnitVector::new_normalize(n);

            // The parent body already carries the pose; undo its translation so the half-space
            // lands at `n * dist` in world space.
            let local = def.rotation.inverse() * (unit_n.into_inner() * dist - def.translation);
            ColliderBuilder::new(SharedShape::new(HalfSpace::new(Vector::y_axis())))
                .translation(local)
        }
        ColliderShapeDef::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        ColliderShapeDef::Sphere { radius } => ColliderBuilder::ball(*radius),
        ColliderShapeDef::CapsuleY {
            radius,
            half_height,
        } => ColliderBuilder::capsule_y(*half_height, *radius),
        ColliderShapeDef::CylinderY {
            radius,
            half_height,
        } => ColliderBuilder::cylinder(*half_height, *radius),
        ColliderShapeDef::RoundCuboid {
            half_extents,
            border_radius,
        } => ColliderBuilder::round_cuboid(
            half_extents.x,
            half_extents.y,
            half_extents.z,
            *border_radius,
        ),
    };

    builder.user_data(user_data_for(def.kind)).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_world() -> ObstacleWorld {
        ObstacleWorld::build(vec![
            WorldStaticDef::obstacle_box(2, vector![3.0, 1.0, 0.0], vector![0.5, 1.0, 2.0]),
            WorldStaticDef::ground_plane(1, 0.0, 0),
            WorldStaticDef::ground_patch(3, (-4.0, 0.0), 0.5, (1.0, 1.0), 2),
        ])
    }

    #[test]
    fn ground_probe_reports_height_and_area() {
        let world = test_world();

        let hit = world.ground_below(0.0, 5.0, 0.0, 10.0).unwrap();
        assert!(hit.height.abs() < 1.0e-4);
        assert_eq!(hit.area, 0);
        assert!(hit.normal_y > 0.99);

        let patch = world.ground_below(-4.0, 5.0, 0.0, 10.0).unwrap();
        assert!((patch.height - 0.5).abs() < 1.0e-4);
        assert_eq!(patch.area, 2);
    }

    #[test]
    fn obstacles_do_not_count_as_ground() {
        let world = test_world();
        let hit = world.ground_below(3.0, 5.0, 0.0, 10.0).unwrap();
        assert!(hit.height.abs() < 1.0e-4);
    }

    #[test]
    fn box_overlap_ignores_ground() {
        let world = test_world();
        assert!(world.obstacle_overlaps_box(&vector![3.0, 1.0, 0.0], &vector![0.2, 0.2, 0.2]));
        assert!(!world.obstacle_overlaps_box(&vector![0.0, 0.05, 0.0], &vector![0.5, 0.5, 0.5]));
    }

    #[test]
    fn capsule_sweep_hits_wall() {
        let world = test_world();
        let from = vector![0.0, 0.95, 0.0];
        assert!(world.sweep_capsule(&from, &vector![6.0, 0.95, 0.0], 0.4, 0.9));
        assert!(!world.sweep_capsule(&from, &vector![0.0, 0.95, 5.0], 0.4, 0.9));
    }
}
