// Support configuring Bevy lints within code.
#![cfg_attr(bevy_lint, feature(register_tool), register_tool(bevy))]
// Disable console on Windows for non-dev builds.
#![cfg_attr(not(feature = "dev"), windows_subsystem = "windows")]

#[cfg(feature = "dev_native")]
mod debug_tools;

mod agent;
mod camera;
mod convert;
mod crowd;
mod input;
mod links;
mod overlay;
mod settings;
mod world;

#[cfg(target_os = "macos")]
use bevy::window::CompositeAlphaMode;

use bevy::picking::prelude::*;
use bevy::prelude::*;

fn main() -> AppExit {
    App::new().add_plugins(AppPlugin).run()
}

pub struct AppPlugin;
impl Plugin for AppPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            DefaultPlugins.set(WindowPlugin {
                primary_window: Window {
                    title: "Path Following Sandbox".to_string(),
                    fit_canvas_to_parent: true,
                    transparent: true,
                    #[cfg(target_os = "macos")]
                    composite_alpha_mode: CompositeAlphaMode::PostMultiplied,
                    #[cfg(target_os = "linux")]
                    composite_alpha_mode: CompositeAlphaMode::PreMultiplied,
                    ..default()
                }
                .into(),
                ..default()
            }),
            MeshPickingPlugin,
        ));

        app.add_plugins((
            settings::plugin,
            world::plugin,
            links::plugin,
            agent::plugin,
            crowd::plugin,
            camera::plugin,
            input::plugin,
            overlay::plugin,
        ));

        #[cfg(feature = "dev_native")]
        app.add_plugins(debug_tools::plugin);
    }
}
