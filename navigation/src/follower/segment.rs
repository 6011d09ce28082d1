//! Segment selection, per-tick progress and reach tests.

use crate::{
    RequestMatch,
    constants::{POINT_EQUALS_TOLERANCE, SMALL_DISTANCE_SQ},
    error::PathFollowingError,
    goal::MoveGoal,
    movement::NavMovement,
    navigation_data::NavQueryFilter,
    path::NavigationPath,
    reach::{ReachReport, ReachTarget, ReachTest},
    types::{INVALID_NAV_NODE_REF, Vec3, dist_sq_2d, nearly_equal, safe_normal},
};

use super::{MoveMessageFlag, MoveMessageFlags, PathFollower, PathFollowingResult, PathFollowingStatus};

/// Lift applied to capsule sweeps so they don't start touching the floor.
const SWEEP_LIFT: f32 = 0.05;

impl<M: NavMovement> PathFollower<M> {
    pub(crate) fn determine_starting_path_point(&mut self, path: &NavigationPath) -> usize {
        if self.is_crowd_simulation_enabled() {
            return self.crowd_starting_path_point(path);
        }
        self.standard_starting_path_point(path)
    }

    pub(crate) fn set_move_segment(&mut self, start_index: usize) {
        if self.is_crowd_simulation_enabled() {
            self.crowd_set_move_segment(start_index);
        } else {
            self.standard_set_move_segment(start_index);
        }
    }

    /// Advances to the segment starting at the current end point.
    pub(crate) fn set_next_move_segment(&mut self) {
        let next = self.next_path_index();
        self.set_move_segment(next);
    }

    pub(crate) fn update_path_segment(&mut self) {
        if self.is_crowd_simulation_enabled() {
            self.crowd_update_path_segment();
        } else {
            self.standard_update_path_segment();
        }
    }

    pub(crate) fn follow_path_segment(&mut self, delta: f32) {
        if self.is_crowd_simulation_enabled() {
            self.crowd_follow_path_segment();
        } else {
            self.standard_follow_path_segment(delta);
        }
    }

    /// Prefer continuing the previous segment (matched by node refs), else the closer of the
    /// first two points.
    pub(crate) fn standard_starting_path_point(&self, path: &NavigationPath) -> usize {
        if !path.is_valid() {
            return 0;
        }

        let seg = &self.segment;
        if seg.start_ref != INVALID_NAV_NODE_REF
            && seg.end_ref != INVALID_NAV_NODE_REF
            && path.uses_navigation_data()
            && let Some(idx) = path
                .points()
                .windows(2)
                .position(|pair| pair[0].node_ref == seg.start_ref && pair[1].node_ref == seg.end_ref)
        {
            return idx;
        }

        let points = path.points();
        if points.len() > 2 {
            let feet = self.movement().feet_location();
            let to_first = dist_sq_2d(&points[0].location, &feet);
            let to_second = dist_sq_2d(&points[1].location, &feet);
            return if to_first < to_second { 0 } else { 1 };
        }
        0
    }

    fn standard_set_move_segment(&mut self, start_index: usize) {
        let Some(path) = self.path().cloned() else {
            return;
        };
        let len = path.points().len();
        if start_index + 1 >= len {
            return;
        }

        let mut end_index = self.determine_current_target_path_point(&path, start_index);
        let points = path.points();
        let segment_start = points[start_index].location;
        let mut segment_end = points[end_index].location;

        // Zero-length segments would stall the agent on a corner it already stands on.
        if nearly_equal(&segment_start, &segment_end, POINT_EQUALS_TOLERANCE) && end_index + 1 < len {
            end_index += 1;
            segment_end = points[end_index].location;
        }

        self.segment.start_index = start_index;
        self.segment.end_index = end_index;
        self.segment.start_ref = points[start_index].node_ref;
        self.segment.end_ref = points[end_index].node_ref;
        self.segment.destination = Some(segment_end);
        self.segment.direction = safe_normal(&(segment_end - segment_start));
        self.current_acceptance_radius = if end_index + 1 == len {
            self.acceptance_radius()
        } else {
            0.0
        };

        log::trace!(
            "[{}] move segment {start_index}..{end_index} of {len}",
            self.id()
        );

        if let Some(link_id) = points[start_index].custom_link {
            match self.navigation_data().and_then(|nav| nav.custom_link(link_id)) {
                Some(link) => self.start_using_custom_link(link_id, link, &segment_end),
                None => log::warn!("[{}] custom link {link_id} not found", self.id()),
            }
        }

        self.update_move_focus();
    }

    /// End point for a segment starting at `start_index`.
    fn determine_current_target_path_point(&self, path: &NavigationPath, start_index: usize) -> usize {
        let next = start_index + 1;
        if !self.settings().use_visibility_optimization {
            return next;
        }

        let points = path.points();
        let (start, end) = (&points[start_index], &points[next]);
        if start.custom_link.is_some() || end.custom_link.is_some() {
            return next;
        }
        if start.area != end.area || (start.is_off_mesh_connection() && end.is_off_mesh_connection()) {
            return next;
        }

        self.optimize_segment_visibility(path, start_index)
    }

    /// Furthest point after `start_index` the agent can see from where it stands.
    fn optimize_segment_visibility(&self, path: &NavigationPath, start_index: usize) -> usize {
        let next = start_index + 1;
        let Some(nav_data) = self.navigation_data() else {
            return next;
        };
        if !path.is_navmesh() {
            return next;
        }

        let points = path.points();
        let start_area = points[start_index].area;
        let filter = NavQueryFilter {
            only_area: Some(start_area),
            ..self.request_filter()
        };

        let agent = self.movement().collision_cylinder();
        let feet = self.movement().feet_location();
        let lift = Vec3::new(0.0, agent.half_height + SWEEP_LIFT, 0.0);
        let sweep = self
            .collision_query()
            .filter(|_| self.settings().use_physics_for_visibility);

        let mut index = start_index + 2;
        while index < points.len() {
            let point = &points[index];
            if nav_data.raycast(&feet, &point.location, &filter).is_some() {
                break;
            }
            if let Some(collision) = sweep
                && collision.sweep_capsule(&(feet + lift), &(point.location + lift), agent.radius, agent.half_height)
            {
                break;
            }
            if point.area != start_area || point.is_off_mesh_connection() || point.custom_link.is_some() {
                return index;
            }
            index += 1;
        }
        index - 1
    }

    pub(crate) fn check_path_for_tick(&mut self) -> bool {
        let Some(path) = self.path() else {
            self.abort_current(
                "no path",
                RequestMatch::Current,
                true,
                false,
                MoveMessageFlags::from_flags(&[MoveMessageFlag::NoPath]),
            );
            return false;
        };

        if !path.is_valid() {
            if !path.is_waiting_for_repath() {
                log::debug!(
                    "[{}] {}",
                    self.id(),
                    PathFollowingError::PathNotValid(path.id().0)
                );
                self.abort_current(
                    "invalid path",
                    RequestMatch::Current,
                    true,
                    false,
                    MoveMessageFlags::from_flags(&[MoveMessageFlag::NoPath]),
                );
            }
            return false;
        }
        true
    }

    fn standard_update_path_segment(&mut self) {
        if !self.check_path_for_tick() {
            return;
        }
        let Some(path) = self.path().cloned() else {
            return;
        };

        let can_reach_target = self.movement().can_stop_path_following();
        if can_reach_target && self.status() == PathFollowingStatus::Moving {
            let feet = self.movement().feet_location();
            let following_last = self.segment.end_index + 1 >= path.points().len();

            if self.collided_with_goal() {
                self.on_segment_finished();
                self.on_path_finished(PathFollowingResult::Success);
            } else if self.has_reached_destination(&feet) {
                self.on_segment_finished();
                self.on_path_finished(PathFollowingResult::Success);
            } else if following_last {
                self.aim_at_goal(&path, &feet);
                self.update_move_focus();
            } else if self.has_reached_current_target(&feet) {
                self.on_segment_finished();
                self.set_next_move_segment();
            }
        }

        self.update_block_detection(can_reach_target);
    }

    /// On the last segment, head for the goal itself when nothing blocks the way.
    fn aim_at_goal(&mut self, path: &NavigationPath, feet: &Vec3) {
        if path.is_partial() {
            return;
        }
        let Some(goal) = self.goal().and_then(|g| g.upgrade()) else {
            return;
        };

        let base = if goal.is_nav_agent() {
            goal.nav_agent_location()
        } else {
            goal.location()
        };
        let goal_location = base + goal.rotation() * self.move_offset();
        let destination = self.current_target_location();

        let reachable = match self.navigation_data() {
            None => true,
            Some(nav) => {
                (goal_location - destination).norm_squared() > SMALL_DISTANCE_SQ
                    && nav.raycast(feet, &goal_location, &self.request_filter()).is_none()
            }
        };
        if reachable {
            self.segment.destination = Some(goal_location);
        }
    }

    pub(crate) fn update_block_detection(&mut self, can_reach_target: bool) {
        if !can_reach_target || self.status() != PathFollowingStatus::Moving {
            return;
        }
        let location = self.movement().feet_location_based();
        if self.block.sample(self.now, location) && self.block.is_blocked() {
            log::info!("[{}] agent is blocked", self.id());
            self.on_path_finished(PathFollowingResult::Blocked);
        }
    }

    fn standard_follow_path_segment(&mut self, delta: f32) {
        let Some(path) = self.path() else {
            return;
        };
        if delta <= 0.0 {
            return;
        }

        let not_following_last = self.segment.start_index + 2 < path.points().len();
        let feet = self.movement().feet_location();
        let velocity = (self.current_target_location() - feet) / delta;
        self.request_direct_move(velocity, not_following_last);
    }

    /// Where the agent is currently heading.
    pub fn current_target_location(&self) -> Vec3 {
        self.segment
            .destination
            .unwrap_or_else(|| self.movement().feet_location())
    }

    pub fn current_direction(&self) -> Vec3 {
        self.segment.direction
    }

    fn destination_reach_test(&self) -> ReachTest {
        ReachTest {
            agent: self.movement().collision_cylinder(),
            radius_threshold: self.acceptance_radius(),
            agent_radius_multiplier: if self.stop_on_overlap() {
                self.settings().min_agent_radius_pct
            } else {
                0.0
            },
            half_height_pct: self.settings().min_agent_half_height_pct,
        }
    }

    fn segment_reach_test(&self) -> ReachTest {
        ReachTest {
            agent: self.movement().collision_cylinder(),
            radius_threshold: self.current_acceptance_radius,
            agent_radius_multiplier: self.settings().segment_reach_radius_pct,
            half_height_pct: self.settings().min_agent_half_height_pct,
        }
    }

    /// Reach cylinder of the move's final target: the goal when it is still around and the
    /// path is complete, else the last path point.
    fn final_reach_target(&self) -> Option<ReachTarget> {
        let path = self.path()?;
        let last = path.destination()?;
        if !path.is_partial()
            && let Some(goal) = self.goal().and_then(|g| g.upgrade())
        {
            return Some(ReachTarget::from_goal(goal.as_ref(), &self.move_offset()));
        }
        Some(ReachTarget::point(last))
    }

    pub fn has_reached_destination(&self, location: &Vec3) -> bool {
        self.final_reach_target()
            .is_some_and(|target| self.destination_reach_test().passes(&target, location))
    }

    pub fn has_reached_current_target(&self, location: &Vec3) -> bool {
        let target = self.current_target_location();
        // Overshot: the target is behind us along the segment.
        if (target - location).dot(&self.current_direction()) < 0.0 {
            return true;
        }
        self.segment_reach_test()
            .passes(&ReachTarget::point(target), location)
    }

    /// Reach test against an arbitrary point. `acceptance_radius` defaults to the agent radius.
    pub fn has_reached_point(&self, point: &Vec3, acceptance_radius: Option<f32>, exact_spot: bool) -> bool {
        let test = self.point_reach_test(acceptance_radius, exact_spot);
        test.passes(&ReachTarget::point(*point), &self.movement().feet_location())
    }

    /// Reach test against `goal`, including its own reach geometry.
    pub fn has_reached_goal(&self, goal: &dyn MoveGoal, acceptance_radius: Option<f32>, exact_spot: bool) -> bool {
        let feet = self.movement().feet_location();
        let target = ReachTarget::from_goal(goal, &goal.move_goal_offset(&feet));
        self.point_reach_test(acceptance_radius, exact_spot)
            .passes(&target, &feet)
    }

    fn point_reach_test(&self, acceptance_radius: Option<f32>, exact_spot: bool) -> ReachTest {
        let agent = self.movement().collision_cylinder();
        ReachTest {
            agent,
            radius_threshold: acceptance_radius.unwrap_or(agent.radius),
            agent_radius_multiplier: if exact_spot {
                0.0
            } else {
                self.settings().min_agent_radius_pct
            },
            half_height_pct: self.settings().min_agent_half_height_pct,
        }
    }

    /// Breakdown of the reach test that currently decides progress.
    pub fn debug_reach_test(&self) -> Option<ReachReport> {
        let path = self.path()?;
        let feet = self.movement().feet_location();
        let direction = self.current_direction();

        if self.segment.end_index + 1 >= path.points().len() {
            let target = self.final_reach_target()?;
            Some(self.destination_reach_test().report(&target, &feet, &direction))
        } else {
            let target = ReachTarget::point(self.current_target_location());
            Some(self.segment_reach_test().report(&target, &feet, &direction))
        }
    }
}
