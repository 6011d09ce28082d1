//! Fakes shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    goal::MoveGoal,
    movement::NavMovement,
    nav_link::{FollowerId, NavLinkCustom},
    navigation_data::{NavLocation, NavQueryFilter, NavigationData},
    path::{CustomLinkId, NavigationPath, PathId, PathPoint},
    types::{Cylinder, NavNodeRef, Vec3},
};

/// Mover that integrates requested velocities directly.
#[derive(Clone, Debug)]
pub struct TestMover {
    pub feet: Vec3,
    pub cylinder: Cylinder,
    pub max_speed: f32,
    pub requested: Option<(Vec3, bool)>,
    pub velocity: Vec3,
    pub stop_count: usize,
    pub can_start: bool,
    pub can_stop: bool,
    pub falling: bool,
}

impl TestMover {
    pub fn at(feet: Vec3) -> Self {
        Self {
            feet,
            cylinder: Cylinder::new(0.4, 0.9),
            max_speed: 2.0,
            requested: None,
            velocity: Vec3::zeros(),
            stop_count: 0,
            can_start: true,
            can_stop: true,
            falling: false,
        }
    }

    /// Moves by the last requested velocity, clamped like a real back-end.
    pub fn step(&mut self, dt: f32) {
        let Some((requested, force)) = self.requested else {
            self.velocity = Vec3::zeros();
            return;
        };
        let speed = requested.norm();
        self.velocity = if speed <= f32::EPSILON {
            Vec3::zeros()
        } else if force || speed > self.max_speed {
            requested * (self.max_speed / speed)
        } else {
            requested
        };
        self.feet += self.velocity * dt;
    }
}

impl NavMovement for TestMover {
    fn feet_location(&self) -> Vec3 {
        self.feet
    }

    fn collision_cylinder(&self) -> Cylinder {
        self.cylinder
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn max_speed(&self) -> f32 {
        self.max_speed
    }

    fn can_start_path_following(&self) -> bool {
        self.can_start
    }

    fn can_stop_path_following(&self) -> bool {
        self.can_stop
    }

    fn is_falling(&self) -> bool {
        self.falling
    }

    fn request_direct_move(&mut self, velocity: &Vec3, force_max_speed: bool) {
        self.requested = Some((*velocity, force_max_speed));
    }

    fn stop_movement_keep_pathing(&mut self) {
        self.requested = None;
        self.velocity = Vec3::zeros();
        self.stop_count += 1;
    }
}

/// Flat navigation data made of unit tiles, with rectangular blockers.
///
/// The tile containing `(x, z)` has node ref `tile_ref(x, z)`.
#[derive(Default)]
pub struct FakeNavData {
    /// (min x, min z, max x, max z)
    pub blockers: Vec<(f32, f32, f32, f32)>,
    pub links: HashMap<CustomLinkId, Arc<dyn NavLinkCustom>>,
}

impl FakeNavData {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_blocker(mut self, min: (f32, f32), max: (f32, f32)) -> Self {
        self.blockers.push((min.0, min.1, max.0, max.1));
        self
    }

    pub fn with_link(mut self, id: CustomLinkId, link: Arc<dyn NavLinkCustom>) -> Self {
        self.links.insert(id, link);
        self
    }

    pub fn tile_ref(x: f32, z: f32) -> NavNodeRef {
        let tx = (x.floor() as i64 + 1000) as u64;
        let tz = (z.floor() as i64 + 1000) as u64;
        tx * 10_000 + tz + 1
    }

    fn blocked(&self, p: &Vec3) -> bool {
        self.blockers
            .iter()
            .any(|&(x0, z0, x1, z1)| p.x >= x0 && p.x <= x1 && p.z >= z0 && p.z <= z1)
    }
}

impl NavigationData for FakeNavData {
    fn raycast(&self, from: &Vec3, to: &Vec3, _filter: &NavQueryFilter) -> Option<Vec3> {
        (0..=64)
            .map(|i| from + (to - from) * (i as f32 / 64.0))
            .find(|p| self.blocked(p))
    }

    fn project_point(&self, location: &Vec3) -> Option<NavLocation> {
        if self.blocked(location) {
            return None;
        }
        Some(NavLocation::new(*location, Self::tile_ref(location.x, location.z)))
    }

    fn node_center(&self, node_ref: NavNodeRef) -> Option<Vec3> {
        let raw = node_ref.checked_sub(1)?;
        let tx = (raw / 10_000) as i64 - 1000;
        let tz = (raw % 10_000) as i64 - 1000;
        Some(Vec3::new(tx as f32 + 0.5, 0.0, tz as f32 + 0.5))
    }

    fn custom_link(&self, id: CustomLinkId) -> Option<Arc<dyn NavLinkCustom>> {
        self.links.get(&id).cloned()
    }
}

/// Navmesh path through `locations` whose corridor is the tiles of the points.
pub fn tile_path(id: u64, locations: &[Vec3]) -> NavigationPath {
    let points: Vec<PathPoint> = locations
        .iter()
        .map(|l| PathPoint::on_node(*l, FakeNavData::tile_ref(l.x, l.z)))
        .collect();
    let mut corridor: Vec<NavNodeRef> = Vec::new();
    for pair in locations.windows(2) {
        let steps = ((pair[1] - pair[0]).norm().ceil() as usize).max(1) * 2;
        for i in 0..=steps {
            let p = pair[0] + (pair[1] - pair[0]) * (i as f32 / steps as f32);
            let node = FakeNavData::tile_ref(p.x, p.z);
            if corridor.last() != Some(&node) {
                corridor.push(node);
            }
        }
    }
    NavigationPath::navmesh(PathId(id), points, corridor)
}

#[derive(Clone, Debug, PartialEq)]
pub enum LinkCall {
    Started(FollowerId, Vec3),
    Finished(FollowerId),
}

/// Link that records every notification.
pub struct RecordingLink {
    pub take_over: bool,
    pub calls: Mutex<Vec<LinkCall>>,
}

impl RecordingLink {
    pub fn new(take_over: bool) -> Arc<Self> {
        Arc::new(Self {
            take_over,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl NavLinkCustom for RecordingLink {
    fn on_link_move_started(&self, follower: FollowerId, destination: &Vec3) -> bool {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(LinkCall::Started(follower, *destination));
        }
        self.take_over
    }

    fn on_link_move_finished(&self, follower: FollowerId) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(LinkCall::Finished(follower));
        }
    }
}

/// Goal that can be moved while a follower chases it.
pub struct MovingGoal {
    pub location: Mutex<Vec3>,
}

impl MovingGoal {
    pub fn new(location: Vec3) -> Arc<Self> {
        Arc::new(Self {
            location: Mutex::new(location),
        })
    }

    pub fn set(&self, location: Vec3) {
        if let Ok(mut l) = self.location.lock() {
            *l = location;
        }
    }
}

impl MoveGoal for MovingGoal {
    fn location(&self) -> Vec3 {
        self.location.lock().map(|l| *l).unwrap_or_else(|_| Vec3::zeros())
    }
}
