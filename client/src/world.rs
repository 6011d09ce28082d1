use std::sync::Arc;

use bevy::prelude::*;
use navigation::{
    ColliderShapeDef, NavGrid, NavGridSettings, ObstacleWorld, StaticKind, WorldStaticDef,
};

use crate::{
    convert::NavVec3,
    links::{DOOR_EAST_LINK, DOOR_WEST_LINK, DoorLink},
    settings::SandboxConfig,
};

/// Half size of the baked and rendered floor (meters).
pub const LEVEL_HALF_SIZE: f32 = 20.0;
/// Area id of the mud patch south-west of the wall.
pub const MUD_AREA: u8 = 3;
/// Door ends on either side of the wall.
pub const DOOR_WEST: NavVec3 = NavVec3::new(-1.2, 0.0, 0.0);
pub const DOOR_EAST: NavVec3 = NavVec3::new(1.2, 0.0, 0.0);

/// Static geometry plus the navigation data baked from it.
#[derive(Resource, Clone)]
pub struct Level {
    pub world: Arc<ObstacleWorld>,
    pub grid: Arc<NavGrid>,
    pub doors: Arc<DoorLink>,
}

pub(super) fn plugin(app: &mut App) {
    let agent_radius = app
        .world()
        .get_resource::<SandboxConfig>()
        .map(|c| c.agents.radius)
        .unwrap_or(0.4);
    app.insert_resource(build_level(agent_radius));
    app.add_systems(Startup, setup);
}

fn level_statics() -> Vec<WorldStaticDef> {
    vec![
        WorldStaticDef::ground_plane(1, 0.0, 0),
        // North-south wall with a gap at the far north end; the door is the shortcut.
        WorldStaticDef::obstacle_box(2, NavVec3::new(0.0, 1.0, -4.0), NavVec3::new(0.25, 1.0, 14.0)),
        WorldStaticDef::obstacle_box(3, NavVec3::new(6.0, 1.0, -5.0), NavVec3::new(1.0, 1.0, 1.0)),
        WorldStaticDef::obstacle_box(4, NavVec3::new(-7.0, 1.0, 6.0), NavVec3::new(1.5, 1.0, 0.5)),
        WorldStaticDef::obstacle_box(5, NavVec3::new(10.0, 1.0, 6.0), NavVec3::new(0.5, 1.0, 2.0)),
        WorldStaticDef::ground_patch(10, (-10.0, -10.0), 0.02, (3.0, 3.0), MUD_AREA),
    ]
}

pub fn build_level(agent_radius: f32) -> Level {
    let world = ObstacleWorld::build(level_statics());
    let mut grid = NavGrid::build(
        &world,
        NavGridSettings {
            min: (-LEVEL_HALF_SIZE, -LEVEL_HALF_SIZE),
            max: (LEVEL_HALF_SIZE, LEVEL_HALF_SIZE),
            agent_radius,
            ..NavGridSettings::default()
        },
    );

    let doors = Arc::new(DoorLink::default());
    for (id, start, end) in [
        (DOOR_EAST_LINK, DOOR_WEST, DOOR_EAST),
        (DOOR_WEST_LINK, DOOR_EAST, DOOR_WEST),
    ] {
        if !grid.add_custom_link(id, start, end, doors.clone()) {
            warn!("door link {id} could not be placed");
        }
    }
    info!("level built: {grid:?}");

    Level {
        world: Arc::new(world),
        grid: Arc::new(grid),
        doors,
    }
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let ground = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.2, 0.3, 0.25),
        perceptual_roughness: 1.0,
        metallic: 0.0,
        ..default()
    });
    let mud = materials.add(StandardMaterial {
        base_color: Color::linear_rgb(0.3, 0.2, 0.1),
        perceptual_roughness: 1.0,
        ..default()
    });
    let obstacle = materials.add(Color::srgb_u8(124, 144, 255));

    for def in level_statics() {
        let translation = Vec3::new(def.translation.x, def.translation.y, def.translation.z);
        let mesh = match &def.shape {
            ColliderShapeDef::Plane { .. } => meshes.add(
                Plane3d::default()
                    .mesh()
                    .size(LEVEL_HALF_SIZE * 2.0, LEVEL_HALF_SIZE * 2.0)
                    .build(),
            ),
            ColliderShapeDef::Cuboid { half_extents } => meshes.add(Cuboid::new(
                half_extents.x * 2.0,
                half_extents.y * 2.0,
                half_extents.z * 2.0,
            )),
            other => {
                warn!("no mesh for static {}: {other:?}", def.id);
                continue;
            }
        };
        let material = match def.kind {
            StaticKind::Ground { area } if area == MUD_AREA => mud.clone(),
            StaticKind::Ground { .. } => ground.clone(),
            StaticKind::Obstacle => obstacle.clone(),
        };
        commands.spawn((
            Name::new(format!("Static{}", def.id)),
            Pickable::default(),
            Mesh3d(mesh),
            MeshMaterial3d(material),
            Transform::from_translation(translation),
        ));
    }

    // Door frame; the link itself has no collider.
    commands.spawn((
        Name::new("Door"),
        Mesh3d(meshes.add(Cuboid::new(0.6, 2.2, 1.2))),
        MeshMaterial3d(materials.add(Color::srgb_u8(170, 110, 60))),
        Transform::from_xyz(0.0, 1.1, 0.0),
    ));

    commands.spawn((
        PointLight {
            shadows_enabled: true,
            range: 60.0,
            intensity: 4_000_000.0,
            ..default()
        },
        Transform::from_xyz(4.0, 16.0, 4.0),
    ));
}

#[cfg(test)]
mod tests {
    use navigation::{NavQueryFilter, PathId};

    use super::*;

    #[test]
    fn door_is_the_shortcut_through_the_wall() {
        let level = build_level(0.4);
        let start = NavVec3::new(-4.0, 0.0, 0.0);
        let end = NavVec3::new(4.0, 0.0, 0.0);
        let path = level
            .grid
            .find_path(PathId(1), &start, &end, &NavQueryFilter::default())
            .unwrap();

        assert!(!path.is_partial());
        assert!(path.points().iter().any(|p| p.custom_link == Some(DOOR_EAST_LINK)));
    }

    #[test]
    fn mud_can_be_avoided() {
        let level = build_level(0.4);
        let start = NavVec3::new(-14.0, 0.0, -10.0);
        let end = NavVec3::new(-6.0, 0.0, -10.0);
        let filter = NavQueryFilter::default().excluding(MUD_AREA);
        let path = level.grid.find_path(PathId(2), &start, &end, &filter).unwrap();

        assert!(!path.is_partial());
        assert!(path.points().iter().all(|p| p.area != MUD_AREA));
    }
}
