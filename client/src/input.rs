use bevy::{picking::pointer::PointerInteraction, prelude::*};
use leafwing_input_manager::prelude::*;
use navigation::{MoveMessageFlags, PathFollowingStatus, RequestMatch, RequestPriority};

use crate::{
    agent::{Agent, PathIds, Selected, move_to},
    convert::to_nav,
    world::Level,
};

#[derive(Reflect, Actionlike, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputAction {
    LeftClick,
    CycleSelection,
    TogglePause,
    Abort,
    ToggleCrowd,
    ToggleLock,
    ToggleBlockDetection,
    ToggleOverlay,
}

pub(super) fn plugin(app: &mut App) {
    app.add_plugins(InputManagerPlugin::<InputAction>::default());

    app.register_type::<InputAction>();

    let mut input_map = InputMap::<InputAction>::default();
    input_map.insert(InputAction::LeftClick, MouseButton::Left);
    input_map.insert(InputAction::CycleSelection, KeyCode::Tab);
    input_map.insert(InputAction::TogglePause, KeyCode::KeyP);
    input_map.insert(InputAction::Abort, KeyCode::Escape);
    input_map.insert(InputAction::ToggleCrowd, KeyCode::KeyC);
    input_map.insert(InputAction::ToggleLock, KeyCode::KeyL);
    input_map.insert(InputAction::ToggleBlockDetection, KeyCode::KeyB);
    input_map.insert(InputAction::ToggleOverlay, KeyCode::F1);
    app.insert_resource(input_map);
    app.insert_resource(ActionState::<InputAction>::default());

    app.add_systems(
        Update,
        (handle_left_click, cycle_selection, handle_follower_toggles),
    );
}

/// Sends the selected agent to the clicked ground point.
fn handle_left_click(
    actions: Res<ActionState<InputAction>>,
    interactions: Query<&PointerInteraction>,
    level: Res<Level>,
    path_ids: Res<PathIds>,
    mut selected: Single<&mut Agent, With<Selected>>,
) {
    if !actions.just_pressed(&InputAction::LeftClick) {
        return;
    }
    let Ok(interaction) = interactions.single() else {
        return;
    };
    let Some((_entity, hit)) = interaction.get_nearest_hit() else {
        return;
    };
    let Some(pos) = hit.position else {
        return;
    };

    let follower = &mut selected.follower;
    if let Some(request_id) = move_to(follower, &level.grid, path_ids.next_id(), to_nav(pos), None) {
        info!("agent {}: request {request_id} to {pos}", follower.id());
    }
}

fn cycle_selection(
    mut commands: Commands,
    actions: Res<ActionState<InputAction>>,
    agents: Query<(Entity, Has<Selected>), With<Agent>>,
) {
    if !actions.just_pressed(&InputAction::CycleSelection) {
        return;
    }
    let mut entities: Vec<_> = agents.iter().collect();
    entities.sort_by_key(|(entity, _)| *entity);
    let Some(current) = entities.iter().position(|(_, selected)| *selected) else {
        if let Some((first, _)) = entities.first() {
            commands.entity(*first).insert(Selected);
        }
        return;
    };

    let next = (current + 1) % entities.len();
    commands.entity(entities[current].0).remove::<Selected>();
    commands.entity(entities[next].0).insert(Selected);
}

fn handle_follower_toggles(
    actions: Res<ActionState<InputAction>>,
    mut selected: Single<&mut Agent, With<Selected>>,
) {
    let follower = &mut selected.follower;
    let id = follower.id();

    if actions.just_pressed(&InputAction::TogglePause) {
        let result = if follower.status() == PathFollowingStatus::Paused {
            follower.resume_move(RequestMatch::Current)
        } else {
            follower.pause_move(RequestMatch::Current, true)
        };
        match result {
            Ok(()) => info!("agent {id}: {}", follower.status()),
            Err(err) => warn!("agent {id}: {err}"),
        }
    }

    if actions.just_pressed(&InputAction::Abort)
        && let Err(err) = follower.abort_move(
            "player abort",
            RequestMatch::Current,
            true,
            false,
            MoveMessageFlags::empty(),
        )
    {
        warn!("agent {id}: {err}");
    }

    if actions.just_pressed(&InputAction::ToggleCrowd) {
        let enabled = !follower.is_crowd_simulation_enabled();
        match follower.set_crowd_simulation_enabled(enabled) {
            Ok(()) => info!("agent {id}: crowd simulation {}", on_off(enabled)),
            Err(err) => warn!("agent {id}: {err}"),
        }
    }

    if actions.just_pressed(&InputAction::ToggleLock) {
        if follower.resource_lock().is_locked_by(RequestPriority::HardScript) {
            follower.clear_resource_lock(RequestPriority::HardScript);
        } else {
            follower.lock_resource(RequestPriority::HardScript);
        }
        info!("agent {id}: resource locked {}", follower.is_resource_locked());
    }

    if actions.just_pressed(&InputAction::ToggleBlockDetection) {
        let enabled = !follower.is_block_detection_enabled();
        follower.set_block_detection_state(enabled);
        info!("agent {id}: block detection {}", on_off(enabled));
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
