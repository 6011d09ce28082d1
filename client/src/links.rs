//! Door links: an agent waits at the door while it opens, then steps through.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use bevy::prelude::*;
use navigation::{CustomLinkId, FollowerId, NavLinkCustom, NavMovement};

use crate::{
    agent::{Agent, AgentSet},
    convert::NavVec3,
    world::Level,
};

pub const DOOR_EAST_LINK: CustomLinkId = 1;
pub const DOOR_WEST_LINK: CustomLinkId = 2;
/// Time an agent waits at the door before it is moved through (seconds).
pub const DOOR_OPEN_SECS: f32 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Traversal {
    destination: NavVec3,
    remaining: f32,
}

/// Custom link shared by both door directions.
#[derive(Default)]
pub struct DoorLink {
    traversals: Mutex<HashMap<FollowerId, Traversal>>,
}

impl DoorLink {
    pub fn is_traversing(&self, follower: FollowerId) -> bool {
        self.traversals
            .lock()
            .map(|t| t.contains_key(&follower))
            .unwrap_or(false)
    }

    /// Advances every open door by `dt` and returns the agents that are through, with their
    /// exit location. Finished traversals stay registered until the follower lets go.
    pub fn advance(&self, dt: f32) -> Vec<(FollowerId, NavVec3)> {
        let Ok(mut traversals) = self.traversals.lock() else {
            return Vec::new();
        };
        traversals
            .iter_mut()
            .filter_map(|(follower, traversal)| {
                let was_open = traversal.remaining > 0.0;
                traversal.remaining -= dt;
                (was_open && traversal.remaining <= 0.0).then_some((*follower, traversal.destination))
            })
            .collect()
    }
}

impl NavLinkCustom for DoorLink {
    fn on_link_move_started(&self, follower: FollowerId, destination: &NavVec3) -> bool {
        debug!("agent {follower} opening door towards {destination:?}");
        if let Ok(mut traversals) = self.traversals.lock() {
            traversals.insert(
                follower,
                Traversal {
                    destination: *destination,
                    remaining: DOOR_OPEN_SECS,
                },
            );
            return true;
        }
        false
    }

    fn on_link_move_finished(&self, follower: FollowerId) {
        if let Ok(mut traversals) = self.traversals.lock() {
            traversals.remove(&follower);
        }
    }
}

pub(super) fn plugin(app: &mut App) {
    app.add_systems(FixedUpdate, operate_doors.in_set(AgentSet::Links));
}

/// Holds agents at the door while it opens and moves them through once it has.
fn operate_doors(level: Res<Level>, time: Res<Time>, mut agents: Query<&mut Agent>) {
    let through: HashMap<_, _> = level.doors.advance(time.delta_secs()).into_iter().collect();

    for mut agent in &mut agents {
        let follower = &mut agent.follower;
        let id = follower.id();
        if let Some(exit) = through.get(&id) {
            follower.movement_mut().teleport(*exit);
            // Releases the traversal through `on_link_move_finished`.
            if let Some(link) = follower.current_custom_link() {
                follower.finish_using_custom_link(link);
            }
            info!("agent {id} went through the door");
        } else if level.doors.is_traversing(id) {
            follower.movement_mut().stop_movement_keep_pathing();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn door_lets_the_agent_through_once() {
        let door = DoorLink::default();
        let exit = NavVec3::new(1.2, 0.0, 0.0);
        assert!(door.on_link_move_started(7, &exit));
        assert!(door.is_traversing(7));

        assert!(door.advance(0.5).is_empty());
        assert_eq!(door.advance(0.5), vec![(7, exit)]);
        // Still held until the follower lets go, but only reported once.
        assert!(door.advance(0.5).is_empty());
        assert!(door.is_traversing(7));

        door.on_link_move_finished(7);
        assert!(!door.is_traversing(7));
    }
}
