//! Path following for navigation agents.
//!
//! A [`PathFollower`] takes a move request plus a [`NavigationPath`] and walks a
//! [`NavMovement`] back-end along it, one segment at a time, until the agent reaches the
//! destination, gets stuck, leaves the path or the move is aborted. Followers can hand
//! steering over to a crowd solver ([`CrowdSolver`]) instead of driving velocities directly.
//!
//! [`ObstacleWorld`], [`NavGrid`] and [`KinematicMover`] are a rapier-backed reference setup:
//! static geometry, a grid navigation graph baked from it, and a character controller.

pub mod bitmask_flags;
pub mod block_detection;
pub mod constants;
pub mod crowd;
pub mod error;
pub mod follower;
pub mod goal;
pub mod movement;
pub mod nav_grid;
pub mod nav_link;
pub mod navigation_data;
pub mod path;
pub mod reach;
pub mod request;
pub mod resource_lock;
pub mod settings;
pub mod types;
pub mod world;

#[cfg(test)]
pub(crate) mod test_support;

pub use bitmask_flags::{BitmaskFlags, FlagBitmask};
pub use crowd::{CrowdAgentState, CrowdFollowing, CrowdMoveRequest, CrowdSolver, CrowdSteering, Steering};
pub use error::{FollowResult, PathFollowingError};
pub use follower::{
    CompletionCallback, DebugToken, DebugTokenKind, MoveFinished, MoveMessageFlag, MoveMessageFlags,
    MoveObserver, PathAction, PathEvent, PathFollower, PathFollowingResult, PathFollowingStatus,
    PostProcessMove, TickTime,
};
pub use goal::{GoalReachTest, MoveGoal, SharedGoal, StaticGoal, WeakGoal};
pub use movement::{KinematicMover, NavMovement};
pub use nav_grid::{NavGrid, NavGridSettings};
pub use nav_link::{FollowerId, NavLinkCustom};
pub use navigation_data::{CollisionQuery, NavLocation, NavQueryFilter, NavigationData};
pub use path::{
    CustomLinkId, NavigationPath, PathId, PathKind, PathPoint, PathPointFlag, PathPointFlags,
    SharedPath,
};
pub use reach::{ReachReport, ReachTarget, ReachTest};
pub use request::{
    MoveRequest, MoveRequestFlag, MoveRequestFlags, MoveTarget, MoveUserData, RequestId,
    RequestIdAllocator, RequestMatch,
};
pub use resource_lock::{RequestPriority, ResourceLock};
pub use settings::{BlockDetectionSettings, CrowdSettings, MoverSettings, PathFollowingSettings};
pub use types::{Cylinder, INVALID_NAV_NODE_REF, NavNodeRef, Quat, Vec3};
pub use world::{ColliderShapeDef, GroundHit, ObstacleWorld, StaticKind, WorldStaticDef};
