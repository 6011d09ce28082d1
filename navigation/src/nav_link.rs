use crate::types::Vec3;

/// Identifies a follower to link implementations.
pub type FollowerId = u64;

/// Navigation link with custom traversal (doors, ladders, jump pads).
///
/// The follower reports when an agent starts using the link. A link that takes over the move
/// stays attached to the follower until the owner calls
/// [`PathFollower::finish_using_custom_link`](crate::PathFollower::finish_using_custom_link)
/// or the move ends.
pub trait NavLinkCustom: Send + Sync {
    /// Called when `follower` reaches the link start heading to `destination`.
    ///
    /// Return true to stay attached and be told when the traversal finishes; false means the
    /// call was only a notification.
    fn on_link_move_started(&self, follower: FollowerId, destination: &Vec3) -> bool;

    fn on_link_move_finished(&self, follower: FollowerId);
}
