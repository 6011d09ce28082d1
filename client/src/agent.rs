//! Sandbox agents: a [`PathFollower`] driving a [`KinematicMover`] per entity.
//!
//! Everything runs in `FixedUpdate`, in [`AgentSet`] order: patrols plan new moves, followers
//! tick, doors hold or release agents, the crowd solver steers, then movers step and finished
//! moves are logged. `Update` only copies mover state into transforms.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bevy::prelude::*;
use navigation::{
    CompletionCallback, KinematicMover, MoveRequest, MoveRequestFlag, NavGrid, NavMovement,
    NavQueryFilter, PathFollower, PathFollowingResult, PathFollowingStatus, PathId, RequestId,
    RequestIdAllocator, TickTime,
};

use crate::{
    convert::{NavVec3, to_bevy},
    settings::SandboxConfig,
    world::Level,
};

/// Finished moves kept for the status overlay.
const MOVE_LOG_LEN: usize = 6;
/// Idle time before a patrol picks up its route again (seconds).
const PATROL_RESTART_DELAY: f32 = 1.0;

#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentSet {
    Plan,
    Follow,
    Links,
    Crowd,
    Move,
}

#[derive(Component)]
pub struct Agent {
    pub follower: PathFollower<KinematicMover>,
}

/// Loops over `waypoints` while nobody else is commanding the agent.
#[derive(Component)]
pub struct Patrol {
    pub waypoints: Arc<[NavVec3]>,
    idle_since: Option<f32>,
}

impl Patrol {
    pub fn new(waypoints: impl Into<Arc<[NavVec3]>>) -> Self {
        Self {
            waypoints: waypoints.into(),
            idle_since: None,
        }
    }
}

/// The agent that receives input and that the camera follows.
#[derive(Component)]
pub struct Selected;

/// Path ids for every path the sandbox asks the grid for.
#[derive(Resource, Clone, Default)]
pub struct PathIds(Arc<AtomicU64>);

impl PathIds {
    pub fn next_id(&self) -> PathId {
        PathId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Shared by all followers so request ids are unique across the sandbox.
#[derive(Resource, Clone, Default, Deref)]
pub struct RequestIds(RequestIdAllocator);

#[derive(Resource, Default)]
pub struct MoveLog(pub VecDeque<String>);

impl MoveLog {
    fn push(&mut self, line: String) {
        if self.0.len() == MOVE_LOG_LEN {
            self.0.pop_front();
        }
        self.0.push_back(line);
    }
}

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<PathIds>();
    app.init_resource::<RequestIds>();
    app.init_resource::<MoveLog>();

    app.configure_sets(
        FixedUpdate,
        (
            AgentSet::Plan,
            AgentSet::Follow,
            AgentSet::Links,
            AgentSet::Crowd,
            AgentSet::Move,
        )
            .chain(),
    );

    app.add_systems(Startup, spawn_agents);
    app.add_systems(FixedUpdate, plan_patrols.in_set(AgentSet::Plan));
    app.add_systems(FixedUpdate, tick_followers.in_set(AgentSet::Follow));
    app.add_systems(FixedUpdate, (step_movers, log_finished_moves).chain().in_set(AgentSet::Move));
    app.add_systems(Update, sync_transforms);
}

/// Finds a path on `grid` and hands it to `follower`. Crowd followers get the raw corridor.
pub fn move_to(
    follower: &mut PathFollower<KinematicMover>,
    grid: &NavGrid,
    path_id: PathId,
    target: NavVec3,
    on_complete: Option<CompletionCallback<KinematicMover>>,
) -> Option<RequestId> {
    let start = follower.movement().feet_location();
    let filter = NavQueryFilter::default();
    let Some(path) = grid.find_path_with(
        path_id,
        &start,
        &target,
        &filter,
        follower.wants_path_postprocessing(),
    ) else {
        warn!("agent {}: no path from {start:?}", follower.id());
        return None;
    };

    let request = MoveRequest::to_location(target)
        .with_filter(filter)
        .with_flag(MoveRequestFlag::AllowPartialPath, true);
    match follower.request_move(request, Arc::new(path), on_complete) {
        Ok(request_id) => Some(request_id),
        Err(err) => {
            warn!("agent {}: {err}", follower.id());
            None
        }
    }
}

/// Completion callback that heads to the waypoint after `reached` once the leg ends.
fn patrol_leg(
    grid: Arc<NavGrid>,
    path_ids: PathIds,
    waypoints: Arc<[NavVec3]>,
    reached: usize,
) -> CompletionCallback<KinematicMover> {
    Box::new(move |follower, _request_id, result| {
        // Anything else means someone took over the agent.
        if !matches!(
            result,
            PathFollowingResult::Success | PathFollowingResult::Blocked | PathFollowingResult::OffPath
        ) {
            return;
        }
        let next = (reached + 1) % waypoints.len();
        let target = waypoints[next];
        let callback = patrol_leg(grid.clone(), path_ids.clone(), waypoints.clone(), next);
        move_to(follower, &grid, path_ids.next_id(), target, Some(callback));
    })
}

fn patrol_routes() -> [Vec<NavVec3>; 2] {
    [
        vec![NavVec3::new(-12.0, 0.0, 8.0), NavVec3::new(12.0, 0.0, -12.0)],
        vec![
            NavVec3::new(-15.0, 0.0, -14.0),
            NavVec3::new(-5.0, 0.0, -8.0),
            NavVec3::new(-15.0, 0.0, 14.0),
        ],
    ]
}

/// East-side lanes; crowd agents run them in opposite directions so they meet halfway.
fn crowd_lane(index: usize) -> Vec<NavVec3> {
    let column = (index / 7) as f32;
    let row = (index % 7) as f32;
    let west = NavVec3::new(3.0 + column, 0.0, -8.0 + row * 2.5);
    let east = NavVec3::new(17.0 - column, 0.0, 7.0 - row * 2.5);
    vec![west, east]
}

fn spawn_agents(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    level: Res<Level>,
    config: Res<SandboxConfig>,
    request_ids: Res<RequestIds>,
) {
    let agents = &config.agents;
    let capsule = meshes.add(Mesh::from(Capsule3d {
        radius: agents.radius,
        half_length: (agents.half_height - agents.radius).max(0.0),
    }));
    let mut next_id = 0;
    let mut agent_bundle = |feet: NavVec3, crowd: bool, color: Color| {
        let mover = KinematicMover::new(
            feet,
            agents.radius,
            agents.half_height,
            config.path_following.mover.clone(),
        );
        let mut follower = PathFollower::new(
            next_id,
            mover,
            config.path_following.clone(),
            request_ids.0.clone(),
        )
        .with_navigation_data(level.grid.clone())
        .with_collision_query(level.world.clone());
        next_id += 1;

        if crowd && let Err(err) = follower.set_crowd_simulation_enabled(true) {
            warn!("agent {}: {err}", follower.id());
        }
        let center = to_bevy(&follower.movement().center());
        (
            Name::new(format!("Agent{}", follower.id())),
            Mesh3d(capsule.clone()),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: color,
                ..default()
            })),
            Transform::from_translation(center),
            Agent { follower },
        )
    };

    commands.spawn((
        agent_bundle(NavVec3::new(-6.0, 0.0, -4.0), false, Color::linear_rgb(0.2, 0.9, 0.8)),
        Selected,
    ));

    let routes = patrol_routes();
    for i in 0..agents.patrol_agents {
        let route = routes[i % routes.len()].clone();
        commands.spawn((
            agent_bundle(route[0], false, Color::linear_rgb(0.9, 0.5, 0.1)),
            Patrol::new(route),
        ));
    }

    for i in 0..agents.crowd_agents {
        let mut lane = crowd_lane(i);
        if i % 2 == 1 {
            lane.reverse();
        }
        commands.spawn((
            agent_bundle(lane[0], true, Color::linear_rgb(0.6, 0.3, 0.9)),
            Patrol::new(lane),
        ));
    }
    info!(
        "spawned {} agents ({} patrolling, {} in the crowd)",
        next_id, agents.patrol_agents, agents.crowd_agents
    );
}

/// Restarts patrols that have been idle for a while, for example after an abort.
fn plan_patrols(
    level: Res<Level>,
    path_ids: Res<PathIds>,
    time: Res<Time>,
    mut agents: Query<(&mut Agent, &mut Patrol)>,
) {
    let now = time.elapsed_secs();
    for (mut agent, mut patrol) in &mut agents {
        let follower = &mut agent.follower;
        if follower.status() != PathFollowingStatus::Idle || follower.is_resource_locked() {
            patrol.idle_since = None;
            continue;
        }
        let idle_since = *patrol.idle_since.get_or_insert(now);
        if now - idle_since < PATROL_RESTART_DELAY {
            continue;
        }
        patrol.idle_since = None;

        // Head for the waypoint after the closest one.
        let feet = follower.movement().feet_location();
        let Some(closest) = patrol
            .waypoints
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - feet).norm().total_cmp(&(*b - feet).norm()))
            .map(|(i, _)| i)
        else {
            continue;
        };
        let next = (closest + 1) % patrol.waypoints.len();
        let callback = patrol_leg(
            level.grid.clone(),
            path_ids.clone(),
            patrol.waypoints.clone(),
            next,
        );
        move_to(
            follower,
            &level.grid,
            path_ids.next_id(),
            patrol.waypoints[next],
            Some(callback),
        );
    }
}

fn tick_followers(time: Res<Time>, mut agents: Query<&mut Agent>) {
    let tick = TickTime::new(time.elapsed_secs(), time.delta_secs());
    for mut agent in &mut agents {
        agent.follower.tick(tick);
    }
}

fn step_movers(level: Res<Level>, time: Res<Time>, mut agents: Query<&mut Agent>) {
    let dt = time.delta_secs();
    for mut agent in &mut agents {
        let mover = agent.follower.movement_mut();
        let controller = mover.controller();
        mover.step(&level.world, &controller, dt);
    }
}

fn log_finished_moves(mut log: ResMut<MoveLog>, mut agents: Query<&mut Agent>) {
    for mut agent in &mut agents {
        for event in agent.follower.drain_events() {
            let line = format!(
                "agent {}: request {} {}",
                event.follower, event.request_id, event.result
            );
            info!("{line}");
            log.push(line);
        }
    }
}

fn sync_transforms(mut agents: Query<(&Agent, &mut Transform)>) {
    for (agent, mut transform) in &mut agents {
        let mover = agent.follower.movement();
        transform.translation = to_bevy(&mover.center());
        if let Some(yaw) = mover.facing() {
            transform.rotation = Quat::from_rotation_y(yaw);
        }
    }
}

#[cfg(test)]
mod tests {
    use navigation::{MoveMessageFlags, PathFollowingSettings};

    use super::*;
    use crate::world::build_level;

    fn follower_at(level: &Level, feet: NavVec3) -> PathFollower<KinematicMover> {
        let settings = PathFollowingSettings::default();
        PathFollower::new(
            1,
            KinematicMover::new(feet, 0.4, 0.9, settings.mover.clone()),
            settings,
            RequestIdAllocator::new(),
        )
        .with_navigation_data(level.grid.clone())
    }

    #[test]
    fn path_ids_are_unique_across_clones() {
        let ids = PathIds::default();
        let other = ids.clone();
        assert_eq!(ids.next_id(), PathId(1));
        assert_eq!(other.next_id(), PathId(2));
    }

    #[test]
    fn move_log_keeps_the_latest_lines() {
        let mut log = MoveLog::default();
        for i in 0..10 {
            log.push(i.to_string());
        }
        assert_eq!(log.0.len(), MOVE_LOG_LEN);
        assert_eq!(log.0.back().map(String::as_str), Some("9"));
    }

    #[test]
    fn patrol_callback_starts_the_next_leg() {
        let level = build_level(0.4);
        let ids = PathIds::default();
        let waypoints: Arc<[NavVec3]> =
            vec![NavVec3::new(-6.0, 0.0, -4.0), NavVec3::new(-6.0, 0.0, 4.0)].into();
        let mut follower = follower_at(&level, waypoints[0]);

        let callback = patrol_leg(level.grid.clone(), ids.clone(), waypoints.clone(), 0);
        let first = move_to(&mut follower, &level.grid, ids.next_id(), waypoints[1], Some(callback));
        assert!(first.is_some());

        // Aborting hands the agent back without a new leg.
        follower
            .abort_move("test", first.unwrap(), true, false, MoveMessageFlags::empty())
            .unwrap();
        assert_eq!(follower.status(), PathFollowingStatus::Idle);

        let callback = patrol_leg(level.grid.clone(), ids.clone(), waypoints.clone(), 0);
        move_to(&mut follower, &level.grid, ids.next_id(), waypoints[1], Some(callback));
        follower.movement_mut().teleport(waypoints[1]);
        follower.tick(TickTime::new(0.1, 0.1));

        // Arrived at waypoint 1 and already heading back to waypoint 0.
        assert_eq!(follower.status(), PathFollowingStatus::Moving);
        assert!((follower.path_destination().unwrap() - waypoints[0]).norm() < 1.0e-3);
    }
}
