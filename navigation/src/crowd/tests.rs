use std::sync::Arc;

use super::*;
use crate::{
    RequestIdAllocator,
    error::PathFollowingError,
    follower::{MoveMessageFlags, TickTime},
    path::{PathId, PathPoint, SharedPath},
    request::MoveRequest,
    settings::PathFollowingSettings,
    test_support::{FakeNavData, LinkCall, RecordingLink, TestMover, tile_path},
};

const DT: f32 = 0.1;

fn v(x: f32, z: f32) -> Vec3 {
    Vec3::new(x, 0.0, z)
}

fn crowd_follower(feet: Vec3, crowd: CrowdSettings) -> PathFollower<TestMover> {
    let settings = PathFollowingSettings {
        crowd,
        ..PathFollowingSettings::default()
    };
    let mut follower = PathFollower::new(4, TestMover::at(feet), settings, RequestIdAllocator::new())
        .with_navigation_data(Arc::new(FakeNavData::open()));
    follower.set_crowd_simulation_enabled(true).unwrap();
    follower
}

fn small_parts() -> CrowdSettings {
    CrowdSettings {
        path_part_size: 3,
        ..CrowdSettings::default()
    }
}

fn corridor_path(to_x: f32) -> SharedPath {
    Arc::new(tile_path(1, &[v(0.5, 0.5), v(to_x, 0.5)]))
}

#[test]
fn toggle_only_while_idle() {
    let mut follower = crowd_follower(v(0.5, 0.5), CrowdSettings::default());
    assert!(follower.is_crowd_simulation_enabled());
    assert!(!follower.wants_path_postprocessing());

    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), corridor_path(8.5), None)
        .unwrap();
    assert_eq!(
        follower.set_crowd_simulation_enabled(false),
        Err(PathFollowingError::CrowdToggleWhileActive(PathFollowingStatus::Moving))
    );
    // Asking for the current mode is always fine.
    assert!(follower.set_crowd_simulation_enabled(true).is_ok());

    follower
        .abort_move("test", crate::RequestMatch::Current, true, true, MoveMessageFlags::empty())
        .unwrap();
    follower.set_crowd_simulation_enabled(false).unwrap();
    assert!(follower.crowd_following().is_none());
    assert!(follower.wants_path_postprocessing());
}

#[test]
fn corridor_is_handed_over_in_parts() {
    let mut follower = crowd_follower(v(0.5, 0.5), small_parts());
    let path = corridor_path(8.5);
    let corridor = path.corridor().unwrap().to_vec();
    assert_eq!(corridor.len(), 9);

    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), path, None)
        .unwrap();

    let crowd = follower.crowd_following().unwrap();
    assert_eq!(crowd.part(), Some((0, 3)));
    assert!(!crowd.is_final_path_part());
    assert_eq!(
        follower.crowd_request(),
        CrowdMoveRequest::FollowCorridor {
            corridor: corridor[0..=3].to_vec(),
            target: v(3.5, 0.5),
            final_part: false,
        }
    );
    assert_eq!(follower.move_segment(), (0, 1));
    assert_eq!(follower.current_acceptance_radius(), 0.0);
    assert_eq!(follower.current_target_location(), v(3.5, 0.5));
}

#[test]
fn starting_part_follows_the_agent_polygon() {
    let mut follower = crowd_follower(v(5.5, 0.5), small_parts());
    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), corridor_path(8.5), None)
        .unwrap();

    let crowd = follower.crowd_following().unwrap();
    assert_eq!(crowd.part(), Some((5, 8)));
    assert!(crowd.is_final_path_part());
    assert_eq!(follower.current_target_location(), v(8.5, 0.5));
    assert_eq!(follower.current_acceptance_radius(), 0.4);
}

#[test]
fn part_stops_before_a_link_start() {
    let mut follower = crowd_follower(v(0.5, 0.5), small_parts());
    let corridor: Vec<_> = (0..9)
        .map(|x| FakeNavData::tile_ref(x as f32 + 0.5, 0.5))
        .collect();
    let points = vec![
        PathPoint::on_node(v(0.5, 0.5), corridor[0]),
        PathPoint::on_node(v(3.5, 0.5), corridor[3]).with_custom_link(1),
        PathPoint::on_node(v(8.5, 0.5), corridor[8]),
    ];
    let path = Arc::new(NavigationPath::navmesh(PathId(1), points, corridor));

    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), path, None)
        .unwrap();
    assert_eq!(follower.crowd_following().unwrap().part(), Some((0, 2)));
}

#[test]
fn crowd_agent_enters_a_custom_link_once() {
    let link = RecordingLink::new(true);
    let nav = Arc::new(FakeNavData::open().with_link(1, link.clone()));
    let mut follower = crowd_follower(v(0.5, 0.5), small_parts()).with_navigation_data(nav.clone());
    let solver = CrowdSolver::default();

    let corridor: Vec<_> = (0..9)
        .map(|x| FakeNavData::tile_ref(x as f32 + 0.5, 0.5))
        .collect();
    let points = vec![
        PathPoint::on_node(v(0.5, 0.5), corridor[0]),
        PathPoint::on_node(v(3.5, 0.5), corridor[3]).with_custom_link(1),
        PathPoint::on_node(v(8.5, 0.5), corridor[8]),
    ];
    let path = Arc::new(NavigationPath::navmesh(PathId(1), points, corridor));
    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), path, None)
        .unwrap();
    assert!(link.calls().is_empty());

    let mut now = 0.0;
    for _ in 0..100 {
        if follower.current_custom_link().is_some() {
            break;
        }
        now += DT;
        follower.tick(TickTime::new(now, DT));
        if let Some(state) = follower.crowd_agent_state() {
            for steering in solver.solve(&*nav, &[state]) {
                follower.apply_crowd_steering(&steering);
            }
        }
        follower.movement_mut().step(DT);
    }
    assert_eq!(follower.current_custom_link(), Some(1));
    assert_eq!(link.calls(), vec![LinkCall::Started(4, v(8.5, 0.5))]);

    // Standing on the link polygon doesn't start it again.
    follower.movement_mut().feet = v(3.5, 0.5);
    now += DT;
    follower.tick(TickTime::new(now, DT));
    assert_eq!(link.calls().len(), 1);

    follower.finish_using_custom_link(1);
    assert_eq!(follower.current_custom_link(), None);
    assert_eq!(link.calls().last(), Some(&LinkCall::Finished(4)));

    now += DT;
    follower.tick(TickTime::new(now, DT));
    assert_eq!(link.calls().len(), 2);
}

#[test]
fn scripted_path_update_keeps_passed_corners() {
    let mut follower = crowd_follower(v(0.0, 0.0), CrowdSettings::default());
    let path: SharedPath = Arc::new(NavigationPath::scripted(
        PathId(3),
        [v(0.0, 0.0), v(4.0, 0.0), v(4.0, 4.0), v(8.0, 4.0)],
    ));
    let request = follower
        .request_move(MoveRequest::to_location(v(8.0, 4.0)), path.clone(), None)
        .unwrap();
    assert_eq!(follower.move_segment(), (0, 1));

    follower.movement_mut().feet = v(4.0, 0.0);
    follower.tick(TickTime::new(0.1, DT));
    assert_eq!(follower.move_segment(), (1, 2));

    follower.movement_mut().feet = v(4.0, 2.0);
    follower.update_move(path, request).unwrap();
    assert_eq!(follower.move_segment(), (1, 2));
    assert_eq!(follower.current_target_location(), v(4.0, 4.0));
    assert_eq!(
        follower.crowd_request(),
        CrowdMoveRequest::Direct {
            direction: v(0.0, 1.0)
        }
    );
}

#[test]
fn crowd_drives_the_agent_to_the_end() {
    let mut follower = crowd_follower(v(0.5, 0.5), small_parts());
    let nav = FakeNavData::open();
    let solver = CrowdSolver::default();
    follower
        .request_move(MoveRequest::to_location(v(16.5, 0.5)), corridor_path(16.5), None)
        .unwrap();

    let mut now = 0.0;
    let mut last_part_start = 0;
    let mut saw_final = false;
    for _ in 0..200 {
        if follower.status() == PathFollowingStatus::Idle {
            break;
        }
        now += DT;
        follower.tick(TickTime::new(now, DT));

        if let Some(crowd) = follower.crowd_following() {
            if let Some((start, _)) = crowd.part() {
                assert!(start >= last_part_start);
                last_part_start = start;
            }
            saw_final |= crowd.is_final_path_part();
        }

        if let Some(state) = follower.crowd_agent_state() {
            for steering in solver.solve(&nav, &[state]) {
                follower.apply_crowd_steering(&steering);
            }
        }
        follower.movement_mut().step(DT);
    }

    assert!(saw_final);
    assert_eq!(follower.status(), PathFollowingStatus::Idle);
    assert!(follower.did_move_reach_goal());
    let events = follower.drain_events();
    assert_eq!(events[0].result, PathFollowingResult::Success);
    // The request is cleared for the solver once the move is over.
    assert_eq!(follower.crowd_request(), CrowdMoveRequest::Inactive);
}

#[test]
fn suspended_steering_takes_no_velocity() {
    let mut follower = crowd_follower(v(0.5, 0.5), CrowdSettings::default());
    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), corridor_path(8.5), None)
        .unwrap();

    follower.suspend_crowd_steering(true);
    assert!(follower.is_crowd_steering_suspended());
    assert_eq!(follower.crowd_request(), CrowdMoveRequest::Inactive);
    assert!(follower.crowd_agent_state().is_none());
    assert!(!follower.apply_crowd_agent_velocity(&v(2.0, 0.0), &v(8.5, 0.5), false));
    assert!(follower.movement().requested.is_none());

    follower.suspend_crowd_steering(false);
    let state = follower.crowd_agent_state().unwrap();
    assert_eq!(state.follower, 4);
    assert_eq!(state.radius, 0.4);
    assert!(follower.apply_crowd_agent_velocity(&v(2.0, 0.0), &v(8.5, 0.5), false));
    assert_eq!(follower.movement().requested, Some((v(2.0, 0.0), false)));
}

#[test]
fn movement_angle_check_rejects_sideways_velocity() {
    let mut follower = crowd_follower(
        v(0.5, 0.5),
        CrowdSettings {
            check_movement_angle: true,
            ..CrowdSettings::default()
        },
    );
    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), corridor_path(8.5), None)
        .unwrap();

    let corner = v(3.5, 0.5);
    assert!(!follower.apply_crowd_agent_velocity(&v(0.0, -2.0), &corner, false));
    assert!(follower.movement().requested.is_none());
    assert_eq!(follower.current_direction(), v(1.0, 0.0));

    // Links steer however they like.
    assert!(follower.apply_crowd_agent_velocity(&v(0.0, -2.0), &corner, true));
    assert!(follower.apply_crowd_agent_velocity(&v(2.0, 0.2), &corner, false));
    let agent_dir = follower.crowd_following().unwrap().agent_move_direction();
    assert!(agent_dir.x > 0.9);
}

#[test]
fn steering_for_other_agents_is_ignored() {
    let mut follower = crowd_follower(v(0.5, 0.5), CrowdSettings::default());
    follower
        .request_move(MoveRequest::to_location(v(8.5, 0.5)), corridor_path(8.5), None)
        .unwrap();
    let steering = CrowdSteering {
        follower: 99,
        velocity: v(1.0, 0.0),
        next_corner: v(3.5, 0.5),
        traversing_link: false,
    };
    assert!(!follower.apply_crowd_steering(&steering));
}

#[test]
fn paths_without_corridor_become_direct_requests() {
    let mut follower = crowd_follower(v(0.0, 0.0), CrowdSettings::default());
    let path = Arc::new(NavigationPath::scripted(PathId(2), [v(0.0, 0.0), v(4.0, 0.0)]));
    follower
        .request_move(MoveRequest::to_location(v(4.0, 0.0)), path, None)
        .unwrap();

    assert_eq!(
        follower.crowd_request(),
        CrowdMoveRequest::Direct {
            direction: v(1.0, 0.0)
        }
    );
    let crowd = follower.crowd_following().unwrap();
    assert_eq!(crowd.part(), None);
    assert!(crowd.is_final_path_part());

    // Drifting off the line re-aims the desired direction at the target.
    follower.movement_mut().feet = v(0.0, 1.0);
    follower.tick(TickTime::new(0.1, DT));
    let CrowdMoveRequest::Direct { direction } = follower.crowd_request() else {
        panic!("expected a direct request");
    };
    assert!(direction.z < 0.0);
    assert!((direction.norm() - 1.0).abs() < 1.0e-5);
}

#[test]
fn standard_followers_ignore_crowd_input() {
    let mut follower = PathFollower::new(
        1,
        TestMover::at(v(0.0, 0.0)),
        PathFollowingSettings::default(),
        RequestIdAllocator::new(),
    );
    let path = Arc::new(NavigationPath::scripted(PathId(2), [v(0.0, 0.0), v(4.0, 0.0)]));
    follower
        .request_move(MoveRequest::to_location(v(4.0, 0.0)), path, None)
        .unwrap();

    assert!(follower.wants_path_postprocessing());
    assert_eq!(follower.crowd_request(), CrowdMoveRequest::Inactive);
    assert!(!follower.apply_crowd_agent_velocity(&v(1.0, 0.0), &v(4.0, 0.0), false));
}
