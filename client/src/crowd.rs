use std::collections::HashMap;

use bevy::prelude::*;
use navigation::{CrowdSolver, FollowerId};

use crate::{
    agent::{Agent, AgentSet},
    settings::SandboxConfig,
    world::Level,
};

#[derive(Resource, Deref)]
pub struct Crowd(CrowdSolver);

pub(super) fn plugin(app: &mut App) {
    let settings = app
        .world()
        .get_resource::<SandboxConfig>()
        .map(|c| c.path_following.crowd.clone())
        .unwrap_or_default();
    app.insert_resource(Crowd(CrowdSolver::new(settings)));
    app.add_systems(FixedUpdate, steer_crowd.in_set(AgentSet::Crowd));
}

/// Runs the solver over every crowd agent that wants steering and feeds the results back.
fn steer_crowd(crowd: Res<Crowd>, level: Res<Level>, mut agents: Query<&mut Agent>) {
    let states: Vec<_> = agents
        .iter()
        .filter_map(|agent| agent.follower.crowd_agent_state())
        .collect();
    if states.is_empty() {
        return;
    }

    let steering: HashMap<FollowerId, _> = crowd
        .solve(level.grid.as_ref(), &states)
        .into_iter()
        .map(|s| (s.follower, s))
        .collect();

    for mut agent in &mut agents {
        let id = agent.follower.id();
        if let Some(steering) = steering.get(&id)
            && !agent.follower.apply_crowd_steering(steering)
        {
            trace!("agent {id}: crowd velocity rejected");
        }
    }
}
