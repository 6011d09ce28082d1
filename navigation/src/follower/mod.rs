//! Path following state machine.
//!
//! ```text
//! Idle -> Waiting -> Moving <-> Paused
//!   ^        |         |          |
//!   +--------+---------+----------+   finish / abort
//! ```
//!
//! A [`PathFollower`] owns its movement back-end and walks it along a shared
//! [`NavigationPath`] one segment at a time. Completion is reported three ways: the per-request
//! callback, the persistent observer list and an outbox of [`MoveFinished`] events the owner
//! drains. State is reset before anyone is notified, so a callback may issue the next move.

mod debug;
mod segment;

use std::{fmt, sync::Arc};

pub use debug::{DebugToken, DebugTokenKind};

use crate::{
    bitmask_flags::BitmaskFlags,
    block_detection::BlockDetector,
    constants::{MOVE_FOCUS_DISTANCE, NAV_LOCATION_TOLERANCE},
    crowd::Steering,
    define_bitmask_flags,
    error::{FollowResult, PathFollowingError},
    goal::{WeakGoal, same_goal},
    movement::NavMovement,
    nav_link::{FollowerId, NavLinkCustom},
    navigation_data::{CollisionQuery, NavLocation, NavQueryFilter, NavigationData},
    path::{CustomLinkId, NavigationPath, SharedPath},
    request::{MoveRequest, MoveUserData, RequestId, RequestIdAllocator, RequestMatch},
    resource_lock::{RequestPriority, ResourceLock},
    settings::PathFollowingSettings,
    types::{INVALID_NAV_NODE_REF, NavNodeRef, Vec3, nearly_equal},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PathFollowingStatus {
    #[default]
    Idle,
    /// Request accepted, path not ready yet.
    Waiting,
    Paused,
    Moving,
}

impl fmt::Display for PathFollowingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathFollowingStatus::Idle => "Idle",
            PathFollowingStatus::Waiting => "Waiting",
            PathFollowingStatus::Paused => "Paused",
            PathFollowingStatus::Moving => "Moving",
        };
        f.write_str(name)
    }
}

/// How a move ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathFollowingResult {
    Success,
    Blocked,
    OffPath,
    Aborted,
    /// Aborted silently, usually replaced by another request.
    Skipped,
    Invalid,
}

impl PathFollowingResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PathFollowingResult::Success)
    }
}

impl fmt::Display for PathFollowingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PathFollowingResult::Success => "Success",
            PathFollowingResult::Blocked => "Blocked",
            PathFollowingResult::OffPath => "OffPath",
            PathFollowingResult::Aborted => "Aborted",
            PathFollowingResult::Skipped => "Skipped",
            PathFollowingResult::Invalid => "Invalid",
        };
        f.write_str(name)
    }
}

define_bitmask_flags!(
    /// Extra detail attached to a finished move.
    MoveMessageFlag, u8, {
        NoPath,
        OtherRequest,
    }
);

pub type MoveMessageFlags = BitmaskFlags<u8>;

/// Coarse description of what the follower is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathAction {
    NoMove,
    DirectMove,
    PartialPath,
    PathToGoal,
    Error,
}

/// Notifications about the path a follower is using.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathEvent {
    NewPath,
    UpdatedDueToGoalMoved,
    UpdatedDueToNavigationChanged,
    Invalidated,
    RepathFailed,
}

/// Published whenever a request finishes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveFinished {
    pub follower: FollowerId,
    pub request_id: RequestId,
    pub result: PathFollowingResult,
    pub flags: MoveMessageFlags,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickTime {
    /// Game time in seconds.
    pub now: f32,
    pub delta: f32,
}

impl TickTime {
    pub fn new(now: f32, delta: f32) -> Self {
        Self { now, delta }
    }
}

pub type CompletionCallback<M> =
    Box<dyn FnOnce(&mut PathFollower<M>, RequestId, PathFollowingResult) + Send + Sync>;
pub type MoveObserver = Box<dyn FnMut(&MoveFinished) + Send + Sync>;
/// Adjusts the velocity about to be requested; receives the feet location.
pub type PostProcessMove = Box<dyn FnMut(&Vec3, &mut Vec3) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MoveSegment {
    pub start_index: usize,
    pub end_index: usize,
    pub start_ref: NavNodeRef,
    pub end_ref: NavNodeRef,
    pub direction: Vec3,
    /// Where the agent is heading right now. Usually the end point, sometimes the goal itself.
    pub destination: Option<Vec3>,
}

impl Default for MoveSegment {
    fn default() -> Self {
        Self {
            start_index: 0,
            end_index: 1,
            start_ref: INVALID_NAV_NODE_REF,
            end_ref: INVALID_NAV_NODE_REF,
            direction: Vec3::zeros(),
            destination: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PauseSnapshot {
    location: Vec3,
    path_timestamp: f32,
}

struct ActiveLink {
    id: CustomLinkId,
    link: Arc<dyn NavLinkCustom>,
}

pub struct PathFollower<M: NavMovement> {
    id: FollowerId,
    settings: PathFollowingSettings,
    movement: M,
    nav_data: Option<Arc<dyn NavigationData>>,
    collision: Option<Arc<dyn CollisionQuery>>,
    request_ids: RequestIdAllocator,

    status: PathFollowingStatus,
    current_request_id: RequestId,
    request: Option<MoveRequest>,
    path: Option<SharedPath>,
    on_complete: Option<CompletionCallback<M>>,
    observers: Vec<MoveObserver>,
    events: Vec<MoveFinished>,
    post_process: Option<PostProcessMove>,

    pub(crate) segment: MoveSegment,
    acceptance_radius: f32,
    pub(crate) current_acceptance_radius: f32,
    stop_on_overlap: bool,
    goal: Option<WeakGoal>,
    move_offset: Vec3,
    collided_with_goal: bool,
    last_move_reached_goal: bool,
    custom_link: Option<ActiveLink>,
    pub(crate) block: BlockDetector,
    resource_lock: ResourceLock,
    paused: Option<PauseSnapshot>,
    focus: Option<Vec3>,
    nav_location: NavLocation,
    nav_location_source: Option<Vec3>,
    pub(crate) now: f32,
    pub(crate) steering: Steering,
}

impl<M: NavMovement> PathFollower<M> {
    pub fn new(
        id: FollowerId,
        movement: M,
        settings: PathFollowingSettings,
        request_ids: RequestIdAllocator,
    ) -> Self {
        let acceptance_radius = movement.agent_radius();
        Self {
            id,
            block: BlockDetector::new(settings.block_detection.clone()),
            settings,
            movement,
            nav_data: None,
            collision: None,
            request_ids,
            status: PathFollowingStatus::Idle,
            current_request_id: RequestId::INVALID,
            request: None,
            path: None,
            on_complete: None,
            observers: Vec::new(),
            events: Vec::new(),
            post_process: None,
            segment: MoveSegment::default(),
            acceptance_radius,
            current_acceptance_radius: 0.0,
            stop_on_overlap: true,
            goal: None,
            move_offset: Vec3::zeros(),
            collided_with_goal: false,
            last_move_reached_goal: false,
            custom_link: None,
            resource_lock: ResourceLock::default(),
            paused: None,
            focus: None,
            nav_location: NavLocation::unprojected(Vec3::zeros()),
            nav_location_source: None,
            now: 0.0,
            steering: Steering::Standard,
        }
    }

    pub fn with_navigation_data(mut self, nav_data: Arc<dyn NavigationData>) -> Self {
        self.nav_data = Some(nav_data);
        self
    }

    pub fn with_collision_query(mut self, collision: Arc<dyn CollisionQuery>) -> Self {
        self.collision = Some(collision);
        self
    }

    pub fn id(&self) -> FollowerId {
        self.id
    }

    pub fn settings(&self) -> &PathFollowingSettings {
        &self.settings
    }

    pub fn movement(&self) -> &M {
        &self.movement
    }

    pub fn movement_mut(&mut self) -> &mut M {
        &mut self.movement
    }

    pub fn navigation_data(&self) -> Option<&Arc<dyn NavigationData>> {
        self.nav_data.as_ref()
    }

    pub fn status(&self) -> PathFollowingStatus {
        self.status
    }

    pub fn current_request_id(&self) -> RequestId {
        self.current_request_id
    }

    pub fn current_request(&self) -> Option<&MoveRequest> {
        self.request.as_ref()
    }

    pub fn move_user_data(&self) -> Option<&MoveUserData> {
        self.request
            .as_ref()
            .and_then(|r| r.user_data.as_ref())
            .map(|d| &d.0)
    }

    pub fn path(&self) -> Option<&SharedPath> {
        self.path.as_ref()
    }

    pub fn acceptance_radius(&self) -> f32 {
        self.acceptance_radius
    }

    pub fn current_acceptance_radius(&self) -> f32 {
        self.current_acceptance_radius
    }

    /// Start and end point indices of the segment being followed.
    pub fn move_segment(&self) -> (usize, usize) {
        (self.segment.start_index, self.segment.end_index)
    }

    pub fn next_path_index(&self) -> usize {
        self.segment.end_index
    }

    pub fn focal_point(&self) -> Option<Vec3> {
        self.focus
    }

    pub fn is_resource_locked(&self) -> bool {
        self.resource_lock.is_locked()
    }

    pub fn resource_lock(&self) -> &ResourceLock {
        &self.resource_lock
    }

    pub fn did_move_reach_goal(&self) -> bool {
        self.last_move_reached_goal
    }

    pub fn set_last_move_at_goal(&mut self, finished_at_goal: bool) {
        self.last_move_reached_goal = finished_at_goal;
    }

    pub fn current_custom_link(&self) -> Option<CustomLinkId> {
        self.custom_link.as_ref().map(|l| l.id)
    }

    pub fn is_path_following_allowed(&self) -> bool {
        self.movement.can_start_path_following()
    }

    /// Multipliers applied to the agent cylinder by destination reach tests.
    pub fn set_precise_reach_threshold(&mut self, agent_radius_pct: f32, agent_half_height_pct: f32) {
        self.settings.min_agent_radius_pct = agent_radius_pct;
        self.settings.min_agent_half_height_pct = agent_half_height_pct;
    }

    pub fn set_use_visibility_optimization(&mut self, enabled: bool) {
        self.settings.use_visibility_optimization = enabled;
    }

    pub fn set_stop_movement_on_finish(&mut self, enabled: bool) {
        self.settings.stop_movement_on_finish = enabled;
    }

    pub fn set_post_process_move(&mut self, hook: Option<PostProcessMove>) {
        self.post_process = hook;
    }

    pub fn add_observer(&mut self, observer: MoveObserver) {
        self.observers.push(observer);
    }

    /// Finished-move events since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<MoveFinished> {
        std::mem::take(&mut self.events)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Request a move along `path`.
    ///
    /// A paused follower handed its own path (same id) and goal resumes instead of restarting.
    /// Any other accepted request replaces the current one, which finishes as `Skipped`.
    pub fn request_move(
        &mut self,
        request: MoveRequest,
        path: SharedPath,
        on_complete: Option<CompletionCallback<M>>,
    ) -> FollowResult<RequestId> {
        let acceptance_radius = request
            .acceptance_radius
            .unwrap_or_else(|| self.movement.agent_radius());

        log::debug!(
            "[{}] request_move: path({}) accept({:.2}{}) target({:?})",
            self.id,
            NavigationPath::describe(Some(&path)),
            acceptance_radius,
            if request.stop_on_overlap() { " + agent" } else { "" },
            request.target,
        );

        if let Some(priority) = self.resource_lock.highest_priority() {
            log::info!("[{}] rejecting move request, locked by {priority}", self.id);
            return Err(PathFollowingError::ResourceLocked(priority));
        }
        if path.is_degenerate() {
            return Err(PathFollowingError::InvalidPath(path.id().0));
        }
        if acceptance_radius < 0.0 {
            return Err(PathFollowingError::NegativeAcceptanceRadius(acceptance_radius));
        }
        if !self.movement.can_start_path_following() {
            log::warn!("[{}] request_move: movement back-end unavailable", self.id);
            return Err(PathFollowingError::MovementUnavailable);
        }

        if self.status == PathFollowingStatus::Paused && self.is_same_paused_move(&request, &path) {
            self.path = Some(path);
            self.resume_move(RequestMatch::Current)?;
            return Ok(self.current_request_id);
        }

        if self.status == PathFollowingStatus::Moving {
            let previous = self.current_request_id;
            self.abort_current(
                "new request",
                previous,
                false,
                true,
                MoveMessageFlags::from_flags(&[MoveMessageFlag::OtherRequest]),
            );
        }

        self.reset();
        self.current_request_id = self.request_ids.next_id();

        self.goal = request.goal().cloned();
        self.move_offset = self
            .goal
            .as_ref()
            .and_then(|g| g.upgrade())
            .filter(|g| g.is_nav_agent())
            .map(|g| g.move_goal_offset(&self.movement.feet_location()))
            .unwrap_or_else(Vec3::zeros);
        self.acceptance_radius = acceptance_radius;
        self.stop_on_overlap = request.stop_on_overlap();
        self.request = Some(request);
        self.on_complete = on_complete;
        self.path = Some(path.clone());
        self.on_path_updated();

        let feet = self.movement.feet_location();
        if let Some(dest) = path.destination() {
            let to_dest = dest - feet;
            log::info!(
                "[{}] request_move: accepted id({}) dist2D({:.2}) distY({:.2})",
                self.id,
                self.current_request_id,
                to_dest.xz().norm(),
                to_dest.y.abs()
            );
        }

        // Async queries hand over pending paths; movement starts on update_move.
        if path.is_valid() {
            self.status = PathFollowingStatus::Moving;
            let start = self.determine_starting_path_point(&path);
            self.set_move_segment(start);
        } else {
            self.status = PathFollowingStatus::Waiting;
        }

        Ok(self.current_request_id)
    }

    fn is_same_paused_move(&self, request: &MoveRequest, path: &SharedPath) -> bool {
        let same_path = self.path.as_ref().is_some_and(|p| p.id() == path.id());
        let same_goal = match (&self.goal, request.goal()) {
            (None, None) => true,
            (Some(a), Some(b)) => same_goal(a, b),
            _ => false,
        };
        same_path && same_goal
    }

    /// Swap in a new version of the path for the active request.
    pub fn update_move(
        &mut self,
        path: SharedPath,
        request: impl Into<RequestMatch>,
    ) -> FollowResult<()> {
        let request = request.into();
        log::debug!(
            "[{}] update_move: path({}) status({}) request({request})",
            self.id,
            NavigationPath::describe(Some(&path)),
            self.status
        );

        if !path.is_valid() {
            return Err(PathFollowingError::PathNotValid(path.id().0));
        }
        if self.status == PathFollowingStatus::Idle {
            return Err(PathFollowingError::NotActive(self.status));
        }
        self.check_request(request)?;

        self.path = Some(path.clone());
        self.on_path_updated();

        if matches!(
            self.status,
            PathFollowingStatus::Waiting | PathFollowingStatus::Moving
        ) {
            self.status = PathFollowingStatus::Moving;
            let start = self.determine_starting_path_point(&path);
            self.set_move_segment(start);
        }
        Ok(())
    }

    /// Stop the active request. `silent` reports `Skipped` instead of `Aborted`.
    pub fn abort_move(
        &mut self,
        reason: &str,
        request: impl Into<RequestMatch>,
        reset_velocity: bool,
        silent: bool,
        flags: MoveMessageFlags,
    ) -> FollowResult<()> {
        let request = request.into();
        if self.status == PathFollowingStatus::Idle {
            return Err(PathFollowingError::NotActive(self.status));
        }
        self.check_request(request)?;
        self.abort_current(reason, request, reset_velocity, silent, flags);
        Ok(())
    }

    pub(crate) fn abort_current(
        &mut self,
        reason: &str,
        request: impl Into<RequestMatch>,
        reset_velocity: bool,
        silent: bool,
        flags: MoveMessageFlags,
    ) {
        let request = request.into();
        log::info!(
            "[{}] abort_move: reason({reason}) request({request}) status({})",
            self.id,
            self.status
        );

        let result = if silent {
            PathFollowingResult::Skipped
        } else {
            PathFollowingResult::Aborted
        };
        let aborted_id = request.resolve(self.current_request_id);
        let callback = self.on_complete.take();

        self.reset();
        self.last_move_reached_goal = false;
        self.update_move_focus();

        if reset_velocity && self.movement.can_stop_path_following() {
            self.movement.stop_movement_keep_pathing();
        }

        self.notify_finished(callback, aborted_id, result, flags);
    }

    pub fn pause_move(
        &mut self,
        request: impl Into<RequestMatch>,
        reset_velocity: bool,
    ) -> FollowResult<()> {
        let request = request.into();
        match self.status {
            PathFollowingStatus::Paused => return Ok(()),
            PathFollowingStatus::Idle => return Err(PathFollowingError::NotActive(self.status)),
            _ => {}
        }
        self.check_request(request)?;

        log::debug!("[{}] pause_move: request({request})", self.id);
        if reset_velocity && self.movement.can_stop_path_following() {
            self.movement.stop_movement_keep_pathing();
        }

        self.paused = Some(PauseSnapshot {
            location: self.movement.feet_location(),
            path_timestamp: self.path.as_ref().map(|p| p.timestamp()).unwrap_or(0.0),
        });
        self.status = PathFollowingStatus::Paused;
        self.update_move_focus();
        Ok(())
    }

    pub fn resume_move(&mut self, request: impl Into<RequestMatch>) -> FollowResult<()> {
        let request = request.into();
        if self.status != PathFollowingStatus::Paused {
            return Err(PathFollowingError::NotActive(self.status));
        }
        self.check_request(request)?;
        log::debug!("[{}] resume_move: request({request})", self.id);

        let moved_during_pause = self.should_check_path_on_resume();
        let paused_timestamp = self.paused.take().map(|p| p.path_timestamp).unwrap_or(0.0);

        if self.is_on_path() {
            self.status = PathFollowingStatus::Moving;
            let path = self.path.clone();
            let updated_while_paused = path
                .as_ref()
                .is_some_and(|p| p.timestamp() > paused_timestamp);

            match path {
                Some(path) if moved_during_pause || updated_while_paused => {
                    let start = self.determine_starting_path_point(&path);
                    self.set_move_segment(start);
                }
                _ => self.update_move_focus(),
            }
        } else if self
            .path
            .as_ref()
            .is_some_and(|p| p.is_valid() && !p.uses_navigation_data())
        {
            // Scripted paths have nothing to validate against.
            self.status = PathFollowingStatus::Moving;
            self.update_move_focus();
        } else {
            self.on_path_finished(PathFollowingResult::OffPath);
        }
        Ok(())
    }

    /// True when the agent moved far enough while paused that the segment must be re-derived.
    fn should_check_path_on_resume(&self) -> bool {
        let Some(paused) = self.paused else {
            return true;
        };
        let agent = self.movement.collision_cylinder();
        let current = self.movement.feet_location();
        let delta = current - paused.location;
        let moved_2d_sq = delta.x * delta.x + delta.z * delta.z;

        !(moved_2d_sq < agent.radius * agent.radius && delta.y.abs() < agent.half_height * 0.5)
    }

    /// Path change notification for the current path.
    pub fn on_path_event(&mut self, path: &SharedPath, event: PathEvent) {
        log::debug!("[{}] on_path_event: {event:?}", self.id);
        let is_current = self.path.as_ref().is_some_and(|p| p.id() == path.id());
        if !is_current {
            return;
        }

        match event {
            PathEvent::UpdatedDueToGoalMoved | PathEvent::UpdatedDueToNavigationChanged => {
                if let Err(err) = self.update_move(path.clone(), RequestMatch::Current) {
                    log::debug!("[{}] path update ignored: {err}", self.id);
                }
            }
            // Validity is checked on the next tick.
            PathEvent::Invalidated | PathEvent::RepathFailed => {
                self.path = Some(path.clone());
            }
            PathEvent::NewPath => {}
        }
    }

    pub fn tick(&mut self, time: TickTime) {
        self.now = time.now;

        if self.status == PathFollowingStatus::Moving {
            self.update_path_segment();
        }
        if self.status == PathFollowingStatus::Moving {
            self.follow_path_segment(time.delta);
        }
    }

    pub(crate) fn on_path_finished(&mut self, result: PathFollowingResult) {
        log::info!(
            "[{}] on_path_finished: {result} request({})",
            self.id,
            self.current_request_id
        );

        self.last_move_reached_goal = result.is_success() && !self.has_partial_path();
        let finished_id = self.current_request_id;
        let callback = self.on_complete.take();

        self.reset();
        self.update_move_focus();

        if self.movement.can_stop_path_following() && self.settings.stop_movement_on_finish {
            self.movement.stop_movement_keep_pathing();
        }

        self.notify_finished(callback, finished_id, result, MoveMessageFlags::empty());
    }

    fn notify_finished(
        &mut self,
        callback: Option<CompletionCallback<M>>,
        request_id: RequestId,
        result: PathFollowingResult,
        flags: MoveMessageFlags,
    ) {
        if let Some(callback) = callback {
            callback(self, request_id, result);
        }

        let event = MoveFinished {
            follower: self.id,
            request_id,
            result,
            flags,
        };
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
        self.events.push(event);
    }

    fn reset(&mut self) {
        self.finish_active_link();

        self.segment = MoveSegment {
            end_index: self.segment.end_index,
            ..MoveSegment::default()
        };
        self.block.reset();

        self.path = None;
        self.request = None;
        self.goal = None;
        self.move_offset = Vec3::zeros();
        self.on_complete = None;
        self.acceptance_radius = self.movement.agent_radius();
        self.current_acceptance_radius = 0.0;
        self.stop_on_overlap = true;
        self.collided_with_goal = false;
        self.paused = None;
        self.current_request_id = RequestId::INVALID;
        self.status = PathFollowingStatus::Idle;
        self.reset_steering();
    }

    fn check_request(&self, request: RequestMatch) -> FollowResult<()> {
        if request.matches(self.current_request_id) {
            Ok(())
        } else {
            Err(PathFollowingError::RequestMismatch {
                requested: request,
                current: self.current_request_id,
            })
        }
    }

    pub fn has_partial_path(&self) -> bool {
        self.path.as_ref().is_some_and(|p| p.is_partial())
    }

    pub fn has_direct_path(&self) -> bool {
        self.path.as_ref().is_some_and(|p| !p.is_navmesh())
    }

    pub fn path_destination(&self) -> Option<Vec3> {
        self.path.as_ref().and_then(|p| p.destination())
    }

    pub fn path_action(&self) -> PathAction {
        match self.status {
            PathFollowingStatus::Idle => PathAction::NoMove,
            _ => match &self.path {
                None => PathAction::Error,
                Some(p) if p.is_direct() => PathAction::DirectMove,
                Some(p) if p.is_partial() => PathAction::PartialPath,
                Some(_) => PathAction::PathToGoal,
            },
        }
    }

    pub(crate) fn goal(&self) -> Option<&WeakGoal> {
        self.goal.as_ref()
    }

    pub(crate) fn move_offset(&self) -> Vec3 {
        self.move_offset
    }

    pub(crate) fn stop_on_overlap(&self) -> bool {
        self.stop_on_overlap
    }

    pub(crate) fn collided_with_goal(&self) -> bool {
        self.collided_with_goal
    }

    pub(crate) fn collision_query(&self) -> Option<&Arc<dyn CollisionQuery>> {
        self.collision.as_ref()
    }

    pub(crate) fn request_filter(&self) -> NavQueryFilter {
        self.request.as_ref().map(|r| r.filter).unwrap_or_default()
    }

    pub(crate) fn request_direct_move(&mut self, velocity: Vec3, force_max_speed: bool) {
        let feet = self.movement.feet_location();
        let mut velocity = velocity;
        if let Some(hook) = self.post_process.as_mut() {
            hook(&feet, &mut velocity);
        }
        self.movement.request_direct_move(&velocity, force_max_speed);
    }

    /// The movement back-end hit `goal`. Finishes the move on the next tick when it is the
    /// request's goal.
    pub fn on_goal_bump(&mut self, goal: &WeakGoal) {
        if self.path.is_some() && self.goal.as_ref().is_some_and(|g| same_goal(g, goal)) {
            log::debug!("[{}] collided with goal", self.id);
            self.collided_with_goal = true;
        }
    }

    /// Focal point for the agent: the goal when strafing, else a point past the destination.
    pub fn move_focus(&self, allow_strafe: bool) -> Vec3 {
        if allow_strafe
            && let Some(goal) = self.goal.as_ref().and_then(|g| g.upgrade())
        {
            return goal.location();
        }
        self.current_target_location() + self.current_direction() * MOVE_FOCUS_DISTANCE
    }

    pub(crate) fn update_move_focus(&mut self) {
        self.focus = if self.status == PathFollowingStatus::Moving {
            let allow_strafe = self.request.as_ref().is_some_and(|r| r.can_strafe());
            Some(self.move_focus(allow_strafe))
        } else {
            None
        };
    }

    /// Projection of the agent onto navigation data, refreshed when the agent moved.
    pub fn current_nav_location(&mut self) -> NavLocation {
        let location = self.movement.feet_location();
        let Some(nav_data) = self.nav_data.as_ref() else {
            return NavLocation::unprojected(location);
        };

        let stale = self
            .nav_location_source
            .is_none_or(|source| !nearly_equal(&source, &location, NAV_LOCATION_TOLERANCE));
        if stale {
            self.nav_location = nav_data
                .project_point(&location)
                .unwrap_or_else(|| NavLocation::unprojected(location));
            self.nav_location_source = Some(location);
        }
        self.nav_location
    }

    /// True when the agent still stands on the current path's corridor.
    pub fn is_on_path(&mut self) -> bool {
        let Some(path) = self.path.clone() else {
            return false;
        };
        if !path.is_valid() || !path.uses_navigation_data() {
            return false;
        }
        if !path.is_navmesh() {
            return true;
        }
        let nav = self.current_nav_location();
        path.contains_node(nav.node_ref)
    }

    /// Remaining path length from the agent's navigation node.
    pub fn remaining_path_cost(&mut self) -> f32 {
        let Some(path) = self.path.clone() else {
            return 0.0;
        };
        if !path.is_valid() || self.status != PathFollowingStatus::Moving {
            return 0.0;
        }
        let nav = self.current_nav_location();
        path.cost_from_node(nav.node_ref)
    }

    pub fn lock_resource(&mut self, priority: RequestPriority) {
        if self.resource_lock.set(priority) {
            log::info!("[{}] locking move by {priority}", self.id);
            if let Err(err) = self.pause_move(RequestMatch::Current, true) {
                log::debug!("[{}] lock while not moving: {err}", self.id);
            }
        }
    }

    pub fn clear_resource_lock(&mut self, priority: RequestPriority) {
        if self.resource_lock.clear(priority) {
            log::info!("[{}] unlocking move", self.id);
            self.resume_after_unlock();
        }
    }

    pub fn force_unlock_resource(&mut self) {
        if self.resource_lock.clear_all() {
            log::info!("[{}] unlocking move (forced)", self.id);
            self.resume_after_unlock();
        }
    }

    fn resume_after_unlock(&mut self) {
        if let Err(err) = self.resume_move(RequestMatch::Current) {
            log::debug!("[{}] unlock with nothing to resume: {err}", self.id);
        }
    }

    pub fn set_block_detection(&mut self, distance: f32, interval: f32, sample_count: usize) {
        self.block.configure(distance, interval, sample_count);
    }

    pub fn set_block_detection_state(&mut self, enabled: bool) {
        self.block.set_enabled(enabled);
    }

    pub fn is_block_detection_enabled(&self) -> bool {
        self.block.is_enabled()
    }

    pub fn reset_block_detection_data(&mut self) {
        self.block.reset();
    }

    pub fn force_block_detection_update(&mut self) {
        self.block.force_update();
    }

    pub fn is_blocked(&self) -> bool {
        self.block.is_blocked()
    }

    pub fn block_detection_samples(&self) -> &[Vec3] {
        self.block.samples()
    }

    pub(crate) fn start_using_custom_link(
        &mut self,
        id: CustomLinkId,
        link: Arc<dyn NavLinkCustom>,
        destination: &Vec3,
    ) {
        if let Some(previous) = self.custom_link.take() {
            log::debug!("[{}] force finish custom link {}", self.id, previous.id);
            previous.link.on_link_move_finished(self.id);
        }

        let custom_move = link.on_link_move_started(self.id, destination);
        log::debug!(
            "[{}] {} custom link {id}",
            self.id,
            if custom_move { "moving with" } else { "notified" }
        );
        if custom_move {
            self.custom_link = Some(ActiveLink { id, link });
        }
    }

    /// Called once a link that took over the move is done with the agent.
    pub fn finish_using_custom_link(&mut self, id: CustomLinkId) {
        if self.custom_link.as_ref().is_some_and(|l| l.id == id) {
            log::debug!("[{}] finish custom link {id}", self.id);
            self.finish_active_link();
        }
    }

    fn finish_active_link(&mut self) {
        if let Some(active) = self.custom_link.take() {
            active.link.on_link_move_finished(self.id);
        }
    }

    /// Hook for path swaps.
    fn on_path_updated(&mut self) {
        self.nav_location_source = None;
    }

    pub(crate) fn on_segment_finished(&self) {
        log::trace!(
            "[{}] segment {}..{} finished",
            self.id,
            self.segment.start_index,
            self.segment.end_index
        );
    }

    /// Whether paths for this follower should be string-pulled.
    pub fn wants_path_postprocessing(&self) -> bool {
        !self.is_crowd_simulation_enabled()
    }
}

impl<M: NavMovement> fmt::Debug for PathFollower<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFollower")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("request", &self.current_request_id)
            .field("path", &NavigationPath::describe(self.path.as_ref()))
            .field("segment", &(self.segment.start_index, self.segment.end_index))
            .finish()
    }
}
