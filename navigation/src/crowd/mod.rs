//! Crowd-driven path following.
//!
//! With crowd simulation enabled the follower stops producing velocities itself. Navmesh paths
//! are handed to the crowd in parts of at most `path_part_size` corridor polygons, direct and
//! scripted paths as a desired direction. The crowd solver answers through
//! [`PathFollower::apply_crowd_agent_velocity`]. Reach tests, block detection and completion
//! stay with the follower.

mod solver;

pub use solver::{CrowdAgentState, CrowdSolver, CrowdSteering};

use crate::{
    error::{FollowResult, PathFollowingError},
    follower::{PathFollower, PathFollowingResult, PathFollowingStatus},
    movement::NavMovement,
    path::{NavigationPath, PathId},
    reach::{ReachTarget, ReachTest},
    settings::CrowdSettings,
    types::{INVALID_NAV_NODE_REF, NavNodeRef, Vec3, safe_normal},
};

/// Agent radius multiplier used to switch to the next path part early.
const NEXT_PART_RADIUS_MULTIPLIER: f32 = 10.0;

/// Corners closer than this don't update the cached segment direction.
const MIN_CORNER_DISTANCE: f32 = 0.1;

/// How a follower turns its path into motion.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Steering {
    #[default]
    Standard,
    Crowd(CrowdFollowing),
}

/// What the crowd solver should do with an agent this frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CrowdMoveRequest {
    #[default]
    Inactive,
    /// Follow a slice of the path corridor towards `target`.
    FollowCorridor {
        corridor: Vec<NavNodeRef>,
        target: Vec3,
        final_part: bool,
    },
    /// Move along a fixed direction; used for paths without a corridor.
    Direct { direction: Vec3 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CrowdFollowing {
    settings: CrowdSettings,
    suspended: bool,
    /// Corridor indices `[start, end]` of the active part.
    part: Option<(usize, usize)>,
    last_path_poly_index: usize,
    final_path_part: bool,
    agent_move_direction: Vec3,
    update_direct_move_velocity: bool,
    check_movement_angle: bool,
    request: CrowdMoveRequest,
    /// Path point whose custom link was last started, so it is entered once.
    used_link_point: Option<(PathId, usize)>,
}

impl CrowdFollowing {
    pub fn new(settings: CrowdSettings) -> Self {
        Self {
            check_movement_angle: settings.check_movement_angle,
            settings,
            suspended: false,
            part: None,
            last_path_poly_index: 0,
            final_path_part: false,
            agent_move_direction: Vec3::zeros(),
            update_direct_move_velocity: false,
            request: CrowdMoveRequest::Inactive,
            used_link_point: None,
        }
    }

    fn reset(&mut self) {
        self.part = None;
        self.last_path_poly_index = 0;
        self.final_path_part = false;
        self.agent_move_direction = Vec3::zeros();
        self.update_direct_move_velocity = false;
        self.check_movement_angle = self.settings.check_movement_angle;
        self.request = CrowdMoveRequest::Inactive;
        self.used_link_point = None;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn part(&self) -> Option<(usize, usize)> {
        self.part
    }

    pub fn is_final_path_part(&self) -> bool {
        self.final_path_part
    }

    pub fn agent_move_direction(&self) -> Vec3 {
        self.agent_move_direction
    }

    pub fn request(&self) -> &CrowdMoveRequest {
        &self.request
    }
}

impl<M: NavMovement> PathFollower<M> {
    /// Switches between standard and crowd steering. Only allowed while idle.
    pub fn set_crowd_simulation_enabled(&mut self, enabled: bool) -> FollowResult<()> {
        if self.is_crowd_simulation_enabled() == enabled {
            return Ok(());
        }
        if self.status() != PathFollowingStatus::Idle {
            log::warn!(
                "[{}] can't {} crowd simulation while {}",
                self.id(),
                if enabled { "enable" } else { "disable" },
                self.status()
            );
            return Err(PathFollowingError::CrowdToggleWhileActive(self.status()));
        }

        log::info!(
            "[{}] crowd simulation {}",
            self.id(),
            if enabled { "enabled" } else { "disabled" }
        );
        self.steering = if enabled {
            Steering::Crowd(CrowdFollowing::new(self.settings().crowd.clone()))
        } else {
            Steering::Standard
        };
        Ok(())
    }

    pub fn is_crowd_simulation_enabled(&self) -> bool {
        matches!(self.steering, Steering::Crowd(_))
    }

    pub fn crowd_following(&self) -> Option<&CrowdFollowing> {
        match &self.steering {
            Steering::Crowd(crowd) => Some(crowd),
            Steering::Standard => None,
        }
    }

    fn crowd_mut(&mut self) -> Option<&mut CrowdFollowing> {
        match &mut self.steering {
            Steering::Crowd(crowd) => Some(crowd),
            Steering::Standard => None,
        }
    }

    /// Keeps the agent registered with the crowd but stops taking velocities from it.
    pub fn suspend_crowd_steering(&mut self, suspend: bool) {
        let id = self.id();
        if let Some(crowd) = self.crowd_mut()
            && crowd.suspended != suspend
        {
            log::debug!("[{id}] crowd steering {}", if suspend { "suspended" } else { "resumed" });
            crowd.suspended = suspend;
        }
    }

    pub fn is_crowd_steering_suspended(&self) -> bool {
        self.crowd_following().is_some_and(|c| c.suspended)
    }

    /// Request for the crowd solver, `Inactive` unless crowd steering is live and moving.
    pub fn crowd_request(&self) -> CrowdMoveRequest {
        match self.crowd_following() {
            Some(crowd) if !crowd.suspended && self.status() == PathFollowingStatus::Moving => {
                crowd.request.clone()
            }
            _ => CrowdMoveRequest::Inactive,
        }
    }

    /// Solver input for this agent, `None` when there is nothing to steer.
    pub fn crowd_agent_state(&self) -> Option<CrowdAgentState> {
        let request = self.crowd_request();
        if request == CrowdMoveRequest::Inactive {
            return None;
        }
        Some(CrowdAgentState {
            follower: self.id(),
            position: self.movement().feet_location(),
            velocity: self.movement().velocity(),
            radius: self.movement().agent_radius(),
            max_speed: self.movement().max_speed(),
            request,
        })
    }

    /// Applies a velocity computed by the crowd solver.
    ///
    /// Returns false when the velocity was not applied: crowd steering is off or suspended, the
    /// follower is not moving, the agent is falling, or the velocity turns further away from
    /// the next corner than the allowed movement angle.
    pub fn apply_crowd_agent_velocity(
        &mut self,
        velocity: &Vec3,
        next_corner: &Vec3,
        traversing_link: bool,
    ) -> bool {
        if self.status() != PathFollowingStatus::Moving || self.movement().is_falling() {
            return false;
        }
        let feet = self.movement().feet_location();
        let to_corner = next_corner - feet;
        let id = self.id();

        let Steering::Crowd(crowd) = &mut self.steering else {
            return false;
        };
        if crowd.suspended {
            return false;
        }

        if to_corner.norm_squared() > MIN_CORNER_DISTANCE * MIN_CORNER_DISTANCE {
            self.segment.direction = safe_normal(&to_corner);
        }
        let velocity_dir = safe_normal(velocity);
        if !traversing_link {
            crowd.agent_move_direction = if velocity.norm_squared() > f32::EPSILON {
                velocity_dir
            } else {
                self.segment.direction
            };
        }

        if crowd.check_movement_angle && !traversing_link {
            let max_cos = crowd.settings.max_movement_angle_deg.to_radians().cos();
            if velocity_dir.dot(&self.segment.direction) < max_cos {
                log::trace!("[{id}] crowd velocity rejected: turns away from the next corner");
                return false;
            }
        }

        self.request_direct_move(*velocity, false);
        true
    }

    /// Applies one solver result addressed to this follower.
    pub fn apply_crowd_steering(&mut self, steering: &CrowdSteering) -> bool {
        if steering.follower != self.id() {
            return false;
        }
        self.apply_crowd_agent_velocity(&steering.velocity, &steering.next_corner, steering.traversing_link)
    }

    pub(crate) fn reset_steering(&mut self) {
        if let Some(crowd) = self.crowd_mut() {
            crowd.reset();
        }
    }

    /// Corridor index of the polygon under the agent, else where the last part started.
    /// Paths without a corridor pick a point index the same way standard steering does.
    pub(crate) fn crowd_starting_path_point(&mut self, path: &NavigationPath) -> usize {
        let last = self.crowd_following().map(|c| c.last_path_poly_index).unwrap_or(0);
        let Some(corridor) = path.corridor() else {
            return self.standard_starting_path_point(path);
        };
        let nav = self.current_nav_location();
        corridor
            .iter()
            .position(|&node| node == nav.node_ref)
            .unwrap_or(last)
    }

    pub(crate) fn crowd_set_move_segment(&mut self, start_index: usize) {
        let Some(path) = self.path().cloned() else {
            return;
        };
        if !path.is_valid() {
            return;
        }

        match path.corridor() {
            Some(corridor) if !corridor.is_empty() => {
                self.set_corridor_part(&path, corridor, start_index)
            }
            _ => self.set_direct_part(&path, start_index),
        }
        self.update_move_focus();
    }

    fn set_corridor_part(&mut self, path: &NavigationPath, corridor: &[NavNodeRef], start_index: usize) {
        let is_link_start = |node: NavNodeRef| {
            path.points()
                .iter()
                .any(|p| p.custom_link.is_some() && p.node_ref == node)
        };

        let last_poly = corridor.len() - 1;
        let part_size = self.settings().crowd.path_part_size.max(1);
        let mut part_start = if start_index <= last_poly { start_index } else { 0 };
        let mut part_end = (part_start + part_size).min(last_poly);

        if is_link_start(corridor[part_start]) {
            part_start = part_start.saturating_sub(1);
        }
        if part_end < last_poly && is_link_start(corridor[part_end]) {
            part_end = part_end.saturating_sub(1).max(part_start);
        }

        let final_part = part_end == last_poly;
        let target = if final_part {
            path.destination()
        } else {
            self.navigation_data()
                .and_then(|nav| nav.node_center(corridor[part_end]))
        };
        let Some(target) = target else {
            log::warn!("[{}] no target for corridor part {part_start}..{part_end}", self.id());
            return;
        };

        log::debug!(
            "[{}] crowd path part {part_start}..{part_end} of {} polys{}",
            self.id(),
            corridor.len(),
            if final_part { " (final)" } else { "" }
        );

        let len = path.points().len();
        let acceptance = self.acceptance_radius();
        self.segment.start_index = 0;
        self.segment.end_index = len - 1;
        self.segment.destination = Some(target);
        // Unknown until the solver reports the next corner.
        self.segment.direction = Vec3::zeros();
        self.current_acceptance_radius = if final_part { acceptance } else { 0.0 };

        if let Some(crowd) = self.crowd_mut() {
            crowd.part = Some((part_start, part_end));
            crowd.last_path_poly_index = part_start;
            crowd.final_path_part = final_part;
            crowd.agent_move_direction = Vec3::zeros();
            crowd.update_direct_move_velocity = false;
            crowd.request = CrowdMoveRequest::FollowCorridor {
                corridor: corridor[part_start..=part_end].to_vec(),
                target,
                final_part,
            };
        }
        self.enter_custom_link_under_agent(path);
    }

    fn set_direct_part(&mut self, path: &NavigationPath, start_index: usize) {
        let len = path.points().len();
        let start_index = start_index.min(len - 2);
        let end_index = start_index + 1;
        let Some(target) = path.location(end_index) else {
            return;
        };

        let feet = self.movement().feet_location();
        let direction = safe_normal(&(target - feet));
        let final_part = end_index + 1 == len;
        let acceptance = self.acceptance_radius();

        self.segment.start_index = start_index;
        self.segment.end_index = end_index;
        self.segment.destination = Some(target);
        self.segment.direction = direction;
        self.current_acceptance_radius = if final_part { acceptance } else { 0.0 };

        if let Some(crowd) = self.crowd_mut() {
            crowd.part = None;
            crowd.final_path_part = final_part;
            crowd.check_movement_angle = true;
            crowd.update_direct_move_velocity = true;
            crowd.agent_move_direction = direction;
            crowd.request = CrowdMoveRequest::Direct { direction };
        }

        if path.points()[start_index].custom_link.is_some() {
            self.start_crowd_custom_link(path, start_index);
        }
    }

    /// Starts the link whose start point lies on the polygon under the agent.
    fn enter_custom_link_under_agent(&mut self, path: &NavigationPath) {
        let nav = self.current_nav_location();
        if nav.node_ref == INVALID_NAV_NODE_REF {
            return;
        }
        if let Some(index) = path
            .points()
            .iter()
            .position(|p| p.custom_link.is_some() && p.node_ref == nav.node_ref)
        {
            self.start_crowd_custom_link(path, index);
        }
    }

    fn start_crowd_custom_link(&mut self, path: &NavigationPath, index: usize) {
        let Some(link_id) = path.points().get(index).and_then(|p| p.custom_link) else {
            return;
        };
        let Some(crowd) = self.crowd_mut() else {
            return;
        };
        let point = (path.id(), index);
        if crowd.used_link_point == Some(point) {
            return;
        }
        crowd.used_link_point = Some(point);

        let Some(destination) = path.location(index + 1).or_else(|| path.location(index)) else {
            return;
        };
        match self.navigation_data().and_then(|nav| nav.custom_link(link_id)) {
            Some(link) => self.start_using_custom_link(link_id, link, &destination),
            None => log::warn!("[{}] custom link {link_id} not found", self.id()),
        }
    }

    fn switch_to_next_path_part(&mut self) {
        let Some(path) = self.path().cloned() else {
            return;
        };
        let current_start = self.crowd_following().and_then(|c| c.part).map(|(s, _)| s);
        let start = self.crowd_starting_path_point(&path);
        // Never fall back to an earlier part.
        let start = current_start.map_or(start, |s| start.max(s + 1));
        self.set_move_segment(start);
    }

    pub(crate) fn crowd_update_path_segment(&mut self) {
        if !self.check_path_for_tick() {
            return;
        }
        let Some(path) = self.path().cloned() else {
            return;
        };

        let can_reach_target = self.movement().can_stop_path_following();
        if can_reach_target && self.status() == PathFollowingStatus::Moving {
            let feet = self.movement().feet_location();
            let final_part = self.crowd_following().is_some_and(|c| c.final_path_part);
            let corridor_part = self.crowd_following().and_then(|c| c.part).is_some();

            if self.collided_with_goal() {
                self.on_path_finished(PathFollowingResult::Success);
            } else if final_part {
                if self.has_reached_destination(&feet) {
                    self.on_path_finished(PathFollowingResult::Success);
                }
            } else if corridor_part {
                let test = ReachTest {
                    agent: self.movement().collision_cylinder(),
                    radius_threshold: 0.0,
                    agent_radius_multiplier: NEXT_PART_RADIUS_MULTIPLIER,
                    half_height_pct: self.settings().min_agent_half_height_pct,
                };
                if test.passes(&ReachTarget::point(self.current_target_location()), &feet) {
                    self.switch_to_next_path_part();
                }
            } else if self.has_reached_current_target(&feet) {
                self.set_next_move_segment();
            }

            if path.is_navmesh() && self.status() == PathFollowingStatus::Moving {
                self.track_corridor_progress(&path);
                self.enter_custom_link_under_agent(&path);
            }
        }

        self.update_block_detection(can_reach_target);
    }

    fn track_corridor_progress(&mut self, path: &NavigationPath) {
        let Some(corridor) = path.corridor() else {
            return;
        };
        let nav = self.current_nav_location();
        let Some(crowd) = self.crowd_mut() else {
            return;
        };
        let Some((start, end)) = crowd.part else {
            return;
        };
        if let Some(offset) = corridor[start..=end].iter().position(|&n| n == nav.node_ref) {
            crowd.last_path_poly_index = start + offset;
        }
    }

    /// Direct parts keep the desired direction pointed at the target; the solver does the rest.
    pub(crate) fn crowd_follow_path_segment(&mut self) {
        let target = self.current_target_location();
        let feet = self.movement().feet_location();
        let Some(crowd) = self.crowd_mut() else {
            return;
        };
        if !crowd.update_direct_move_velocity {
            return;
        }

        let direction = safe_normal(&(target - feet));
        if direction != crowd.agent_move_direction {
            crowd.agent_move_direction = direction;
            crowd.request = CrowdMoveRequest::Direct { direction };
            self.segment.direction = direction;
        }
    }
}

#[cfg(test)]
mod tests;
