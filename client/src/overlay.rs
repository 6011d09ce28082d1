//! Path gizmos and the status panel for the selected agent.

use bevy::prelude::*;
use leafwing_input_manager::prelude::ActionState;
use navigation::{NavMovement, PathFollowingStatus};

use crate::{
    agent::{Agent, MoveLog, Selected},
    convert::to_bevy,
    input::InputAction,
};

const LIFT: Vec3 = Vec3::new(0.0, 0.05, 0.0);
const HELP: &str = "LMB move | Tab select | P pause | Esc abort | C crowd | L lock | B block detection | F1 overlay";

#[derive(Resource)]
pub struct OverlayEnabled(pub bool);

#[derive(Component)]
struct StatusText;

pub(super) fn plugin(app: &mut App) {
    app.insert_resource(OverlayEnabled(true));
    app.add_systems(Startup, spawn_status_text);
    app.add_systems(
        Update,
        (
            toggle_overlay,
            (draw_paths, update_status_text).run_if(|enabled: Res<OverlayEnabled>| enabled.0),
        ),
    );
}

fn spawn_status_text(mut commands: Commands) {
    commands.spawn((
        StatusText,
        Text::new(HELP),
        TextFont {
            font_size: 14.0,
            ..default()
        },
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        },
    ));
}

fn toggle_overlay(
    actions: Res<ActionState<InputAction>>,
    mut enabled: ResMut<OverlayEnabled>,
    mut text: Query<&mut Visibility, With<StatusText>>,
) {
    if !actions.just_pressed(&InputAction::ToggleOverlay) {
        return;
    }
    enabled.0 = !enabled.0;
    for mut visibility in &mut text {
        *visibility = if enabled.0 {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}

fn draw_paths(mut gizmos: Gizmos, agents: Query<(&Agent, Has<Selected>)>) {
    for (agent, selected) in &agents {
        let follower = &agent.follower;
        let Some(path) = follower.path() else {
            continue;
        };

        let (path_color, target_color) = match (selected, follower.status()) {
            (_, PathFollowingStatus::Paused) => (Color::srgb(0.6, 0.6, 0.6), Color::srgb(0.8, 0.8, 0.8)),
            (true, _) => (Color::srgb(1.0, 1.0, 0.2), Color::srgb(0.2, 1.0, 0.4)),
            (false, _) => (Color::srgba(1.0, 1.0, 1.0, 0.35), Color::srgba(0.2, 1.0, 0.4, 0.5)),
        };

        // Points already passed are skipped.
        let (start, _) = follower.move_segment();
        let feet = to_bevy(&follower.movement().feet_location());
        let corners = path.points().iter().skip(start + 1).map(|p| to_bevy(&p.location));
        gizmos.linestrip(std::iter::once(feet).chain(corners).map(|p| p + LIFT), path_color);

        for point in path.points().iter().filter(|p| p.custom_link.is_some()) {
            gizmos.sphere(
                Isometry3d::from_translation(to_bevy(&point.location) + LIFT),
                0.25,
                Color::srgb(1.0, 0.5, 0.1),
            );
        }

        gizmos.sphere(
            Isometry3d::from_translation(to_bevy(&follower.current_target_location()) + LIFT),
            follower.current_acceptance_radius().max(0.1),
            target_color,
        );

        if selected {
            for sample in follower.block_detection_samples() {
                gizmos.sphere(
                    Isometry3d::from_translation(to_bevy(sample) + LIFT),
                    0.05,
                    Color::srgb(1.0, 0.2, 0.2),
                );
            }
            if let Some(focus) = follower.focal_point().map(|f| to_bevy(&f))
                && focus.distance_squared(feet) > 0.01
            {
                gizmos.arrow(feet + LIFT, focus + LIFT, Color::srgb(0.3, 0.6, 1.0));
            }
        }
    }
}

fn update_status_text(
    selected: Single<&Agent, With<Selected>>,
    log: Res<MoveLog>,
    mut text: Single<&mut Text, With<StatusText>>,
) {
    let follower = &selected.follower;
    let mut status = format!(
        "agent {}: {}\naction {:?} | crowd {} | locked {} | block detection {}",
        follower.id(),
        follower.debug_string(),
        follower.path_action(),
        follower.is_crowd_simulation_enabled(),
        follower.is_resource_locked(),
        follower.is_block_detection_enabled(),
    );
    for line in &log.0 {
        status.push('\n');
        status.push_str(line);
    }
    status.push('\n');
    status.push_str(HELP);
    text.0 = status;
}
