use thiserror::Error;

use crate::{RequestId, RequestMatch, RequestPriority, follower::PathFollowingStatus};

/// Reasons a path following operation was refused.
///
/// Movement *outcomes* (arrived, blocked, aborted, ...) are not errors; they are delivered as
/// [`crate::PathFollowingResult`] values through the completion callback and event outbox.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathFollowingError {
    /// A resource lock is held; new move requests are rejected until it clears.
    #[error("move rejected: resource locked by {0}")]
    ResourceLocked(RequestPriority),

    /// The path is ready but can never be followed (fewer than two points).
    #[error("move rejected: path {0} has fewer than two points")]
    InvalidPath(u64),

    /// The path is not (or no longer) valid for following.
    #[error("update rejected: path {0} is not valid")]
    PathNotValid(u64),

    /// Explicit acceptance radius below zero.
    #[error("move rejected: negative acceptance radius {0}")]
    NegativeAcceptanceRadius(f32),

    /// The movement back-end refuses to start path following.
    #[error("move rejected: movement back-end does not allow path following")]
    MovementUnavailable,

    /// The request id does not match the active request.
    #[error("request {requested} does not match the current request {current}")]
    RequestMismatch {
        requested: RequestMatch,
        current: RequestId,
    },

    /// The operation needs an active move.
    #[error("no active move (status {0})")]
    NotActive(PathFollowingStatus),

    /// Crowd simulation can only be toggled while idle.
    #[error("crowd simulation can't change while {0}")]
    CrowdToggleWhileActive(PathFollowingStatus),

    /// Settings failed validation.
    #[error("config error: {0}")]
    Config(String),
}

pub type FollowResult<T> = Result<T, PathFollowingError>;
