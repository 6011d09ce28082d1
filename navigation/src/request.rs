//! Move request identity and fingerprints.

use std::{
    any::Any,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use crate::{
    bitmask_flags::BitmaskFlags,
    constants::POINT_EQUALS_TOLERANCE,
    define_bitmask_flags,
    goal::{WeakGoal, same_goal},
    navigation_data::NavQueryFilter,
    types::{Vec3, nearly_equal},
};

/// Identifier of one accepted move request. Zero never names a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

impl RequestId {
    pub const INVALID: RequestId = RequestId(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which request an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestMatch {
    /// Any request, including none.
    Any,
    /// Whatever request is current.
    Current,
    Id(RequestId),
}

impl RequestMatch {
    pub fn matches(&self, current: RequestId) -> bool {
        match self {
            RequestMatch::Any | RequestMatch::Current => true,
            RequestMatch::Id(id) => *id == current,
        }
    }

    /// The concrete id this match names, falling back to `current`.
    pub fn resolve(&self, current: RequestId) -> RequestId {
        match self {
            RequestMatch::Id(id) if id.is_valid() => *id,
            _ => current,
        }
    }
}

impl From<RequestId> for RequestMatch {
    fn from(id: RequestId) -> Self {
        RequestMatch::Id(id)
    }
}

impl fmt::Display for RequestMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMatch::Any => f.write_str("any"),
            RequestMatch::Current => f.write_str("current"),
            RequestMatch::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Hands out request ids. Clones share the counter, so every follower that should see
/// distinct ids must be built from the same allocator.
#[derive(Clone, Debug, Default)]
pub struct RequestIdAllocator {
    next: Arc<AtomicU32>,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> RequestId {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return RequestId(id);
            }
        }
    }
}

define_bitmask_flags!(
    /// Options carried by a move request.
    MoveRequestFlag, u8, {
        StopOnOverlap,
        AllowPartialPath,
        UsePathfinding,
        CanStrafe,
        ProjectGoalLocation,
    }
);

pub type MoveRequestFlags = BitmaskFlags<u8>;

/// Opaque payload forwarded with a request (read back through the follower).
pub type MoveUserData = Arc<dyn Any + Send + Sync>;

/// Where a request is heading.
#[derive(Clone)]
pub enum MoveTarget {
    Location(Vec3),
    Goal(WeakGoal),
}

impl fmt::Debug for MoveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveTarget::Location(loc) => write!(f, "Location({:.2}, {:.2}, {:.2})", loc.x, loc.y, loc.z),
            MoveTarget::Goal(goal) => match goal.upgrade() {
                Some(g) => {
                    let loc = g.location();
                    write!(f, "Goal({:.2}, {:.2}, {:.2})", loc.x, loc.y, loc.z)
                }
                None => f.write_str("Goal(dropped)"),
            },
        }
    }
}

/// Fingerprint of a move request.
#[derive(Clone, Debug)]
pub struct MoveRequest {
    pub target: MoveTarget,
    /// `None` resolves to the agent radius when the move starts.
    pub acceptance_radius: Option<f32>,
    pub filter: NavQueryFilter,
    pub flags: MoveRequestFlags,
    pub user_data: Option<UserData>,
}

/// Wrapper so the payload can live inside a `Debug` fingerprint.
#[derive(Clone)]
pub struct UserData(pub MoveUserData);

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UserData(..)")
    }
}

impl MoveRequest {
    fn with_target(target: MoveTarget) -> Self {
        Self {
            target,
            acceptance_radius: None,
            filter: NavQueryFilter::default(),
            flags: MoveRequestFlags::from_flags(&[
                MoveRequestFlag::StopOnOverlap,
                MoveRequestFlag::AllowPartialPath,
                MoveRequestFlag::UsePathfinding,
                MoveRequestFlag::ProjectGoalLocation,
            ]),
            user_data: None,
        }
    }

    pub fn to_location(location: Vec3) -> Self {
        Self::with_target(MoveTarget::Location(location))
    }

    pub fn to_goal(goal: WeakGoal) -> Self {
        Self::with_target(MoveTarget::Goal(goal))
    }

    pub fn with_acceptance_radius(mut self, radius: f32) -> Self {
        self.acceptance_radius = Some(radius);
        self
    }

    pub fn with_filter(mut self, filter: NavQueryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_flag(mut self, flag: MoveRequestFlag, enabled: bool) -> Self {
        if enabled {
            self.flags.add(flag);
        } else {
            self.flags.remove(flag);
        }
        self
    }

    pub fn with_user_data(mut self, data: MoveUserData) -> Self {
        self.user_data = Some(UserData(data));
        self
    }

    pub fn goal(&self) -> Option<&WeakGoal> {
        match &self.target {
            MoveTarget::Goal(goal) => Some(goal),
            MoveTarget::Location(_) => None,
        }
    }

    /// Current goal location, or the fixed location. `None` once the goal is gone.
    pub fn goal_location(&self) -> Option<Vec3> {
        match &self.target {
            MoveTarget::Location(loc) => Some(*loc),
            MoveTarget::Goal(goal) => goal.upgrade().map(|g| g.location()),
        }
    }

    pub fn stop_on_overlap(&self) -> bool {
        self.flags.has(MoveRequestFlag::StopOnOverlap)
    }

    pub fn allow_partial_path(&self) -> bool {
        self.flags.has(MoveRequestFlag::AllowPartialPath)
    }

    pub fn can_strafe(&self) -> bool {
        self.flags.has(MoveRequestFlag::CanStrafe)
    }

    /// Same target, radius, filter and options. User data is ignored.
    pub fn is_equivalent(&self, other: &MoveRequest) -> bool {
        let same_target = match (&self.target, &other.target) {
            (MoveTarget::Location(a), MoveTarget::Location(b)) => {
                nearly_equal(a, b, POINT_EQUALS_TOLERANCE)
            }
            (MoveTarget::Goal(a), MoveTarget::Goal(b)) => same_goal(a, b),
            _ => false,
        };

        let same_radius = match (self.acceptance_radius, other.acceptance_radius) {
            (None, None) => true,
            (Some(a), Some(b)) => (a - b).abs() <= POINT_EQUALS_TOLERANCE,
            _ => false,
        };

        same_target && same_radius && self.filter == other.filter && self.flags == other.flags
    }
}
