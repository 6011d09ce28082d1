//! Reference crowd solver: corner picking along the corridor plus separation steering.
//!
//! Good enough to drive a sandbox full of agents. It does no velocity-obstacle avoidance and
//! ignores custom links.

use crate::{
    crowd::CrowdMoveRequest,
    nav_link::FollowerId,
    navigation_data::{NavQueryFilter, NavigationData},
    settings::CrowdSettings,
    types::{NavNodeRef, Vec3, safe_normal, size_2d},
};

/// Distance over which agents slow down on their final part.
const ARRIVAL_SLOWDOWN_DISTANCE: f32 = 1.0;

/// Solver input for one agent.
#[derive(Clone, Debug, PartialEq)]
pub struct CrowdAgentState {
    pub follower: FollowerId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub max_speed: f32,
    pub request: CrowdMoveRequest,
}

/// Solver output for one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrowdSteering {
    pub follower: FollowerId,
    pub velocity: Vec3,
    pub next_corner: Vec3,
    pub traversing_link: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CrowdSolver {
    settings: CrowdSettings,
}

impl CrowdSolver {
    pub fn new(settings: CrowdSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CrowdSettings {
        &self.settings
    }

    /// One steering result per active agent, in input order.
    pub fn solve(&self, nav: &dyn NavigationData, agents: &[CrowdAgentState]) -> Vec<CrowdSteering> {
        agents
            .iter()
            .enumerate()
            .filter_map(|(idx, agent)| {
                let (corner, preferred) = self.preferred_velocity(nav, agent)?;
                let separation = self.separation(idx, agents);
                let mut velocity = preferred + separation * agent.max_speed;
                velocity.y = 0.0;

                let speed = velocity.norm();
                if speed > agent.max_speed && speed > f32::EPSILON {
                    velocity *= agent.max_speed / speed;
                }

                Some(CrowdSteering {
                    follower: agent.follower,
                    velocity,
                    next_corner: corner,
                    traversing_link: false,
                })
            })
            .collect()
    }

    fn preferred_velocity(&self, nav: &dyn NavigationData, agent: &CrowdAgentState) -> Option<(Vec3, Vec3)> {
        match &agent.request {
            CrowdMoveRequest::Inactive => None,
            CrowdMoveRequest::Direct { direction } => {
                let corner = agent.position + direction;
                Some((corner, direction * agent.max_speed))
            }
            CrowdMoveRequest::FollowCorridor {
                corridor,
                target,
                final_part,
            } => {
                let corner = Self::next_corner(nav, agent, corridor, target);
                let to_corner = corner - agent.position;
                let mut speed = agent.max_speed;
                if *final_part {
                    let remaining = size_2d(&(target - agent.position));
                    speed *= (remaining / ARRIVAL_SLOWDOWN_DISTANCE).min(1.0);
                }
                Some((corner, safe_normal(&Vec3::new(to_corner.x, 0.0, to_corner.z)) * speed))
            }
        }
    }

    /// Furthest corridor point visible from the agent, checking the target first.
    fn next_corner(
        nav: &dyn NavigationData,
        agent: &CrowdAgentState,
        corridor: &[NavNodeRef],
        target: &Vec3,
    ) -> Vec3 {
        let filter = NavQueryFilter::default();
        if nav.raycast(&agent.position, target, &filter).is_none() {
            return *target;
        }

        let centers: Vec<Vec3> = corridor.iter().filter_map(|&node| nav.node_center(node)).collect();
        centers
            .iter()
            .rev()
            .find(|c| nav.raycast(&agent.position, c, &filter).is_none())
            .or(centers.first())
            .copied()
            .unwrap_or(*target)
    }

    /// Push away from neighbours closer than the separation radius.
    fn separation(&self, idx: usize, agents: &[CrowdAgentState]) -> Vec3 {
        let me = &agents[idx];
        let radius = self.settings.separation_radius;
        if radius <= 0.0 {
            return Vec3::zeros();
        }

        let mut push = Vec3::zeros();
        for (other_idx, other) in agents.iter().enumerate() {
            if other_idx == idx {
                continue;
            }
            let mut away = me.position - other.position;
            away.y = 0.0;
            let dist = away.norm();
            if dist >= radius {
                continue;
            }
            let dir = if dist > f32::EPSILON {
                away / dist
            } else {
                // Stacked agents split deterministically by follower id.
                let side = if me.follower < other.follower { 1.0 } else { -1.0 };
                Vec3::new(side, 0.0, 0.0)
            };
            push += dir * (1.0 - dist / radius);
        }
        push * self.settings.separation_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation_data::NavLocation;

    /// Open floor with a wall along x = 0 for z < 0; node `n` is centered at (n, 0, n).
    struct Floor;

    impl NavigationData for Floor {
        fn raycast(&self, from: &Vec3, to: &Vec3, _filter: &NavQueryFilter) -> Option<Vec3> {
            if (from.x < 0.0) == (to.x < 0.0) {
                return None;
            }
            let t = -from.x / (to.x - from.x);
            let z = from.z + t * (to.z - from.z);
            (z < 0.0).then_some(Vec3::new(0.0, 0.0, z))
        }

        fn project_point(&self, location: &Vec3) -> Option<NavLocation> {
            Some(NavLocation::new(*location, 1))
        }

        fn node_center(&self, node_ref: NavNodeRef) -> Option<Vec3> {
            let n = node_ref as f32;
            Some(Vec3::new(n, 0.0, n))
        }
    }

    fn agent(follower: FollowerId, position: Vec3, request: CrowdMoveRequest) -> CrowdAgentState {
        CrowdAgentState {
            follower,
            position,
            velocity: Vec3::zeros(),
            radius: 0.4,
            max_speed: 2.0,
            request,
        }
    }

    #[test]
    fn visible_target_is_the_corner() {
        let solver = CrowdSolver::default();
        let target = Vec3::new(5.0, 0.0, 5.0);
        let agents = [agent(
            1,
            Vec3::new(1.0, 0.0, 1.0),
            CrowdMoveRequest::FollowCorridor {
                corridor: vec![1, 2, 3],
                target,
                final_part: false,
            },
        )];

        let out = solver.solve(&Floor, &agents);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].next_corner, target);
        assert!((out[0].velocity.norm() - 2.0).abs() < 1.0e-4);
    }

    #[test]
    fn blocked_target_falls_back_to_visible_corridor_center() {
        let solver = CrowdSolver::default();
        let agents = [agent(
            1,
            Vec3::new(-3.0, 0.0, -1.0),
            CrowdMoveRequest::FollowCorridor {
                corridor: vec![1, 2],
                target: Vec3::new(3.0, 0.0, -3.0),
                final_part: true,
            },
        )];

        let out = solver.solve(&Floor, &agents);
        // The line to node 2 at (2, 0, 2) crosses x = 0 above z = 0.
        assert_eq!(out[0].next_corner, Vec3::new(2.0, 0.0, 2.0));
    }

    #[test]
    fn inactive_agents_produce_nothing() {
        let solver = CrowdSolver::default();
        let agents = [agent(7, Vec3::zeros(), CrowdMoveRequest::Inactive)];
        assert!(solver.solve(&Floor, &agents).is_empty());
    }

    #[test]
    fn neighbours_push_each_other_apart() {
        let solver = CrowdSolver::new(CrowdSettings {
            separation_radius: 2.0,
            separation_weight: 1.0,
            ..CrowdSettings::default()
        });
        let direction = Vec3::new(0.0, 0.0, 1.0);
        let agents = [
            agent(1, Vec3::new(0.0, 0.0, 0.0), CrowdMoveRequest::Direct { direction }),
            agent(2, Vec3::new(0.5, 0.0, 0.0), CrowdMoveRequest::Direct { direction }),
        ];

        let out = solver.solve(&Floor, &agents);
        assert!(out[0].velocity.x < 0.0);
        assert!(out[1].velocity.x > 0.0);
        for steering in out.iter() {
            assert!(steering.velocity.norm() <= 2.0 + 1.0e-4);
        }
    }

    #[test]
    fn final_part_slows_down_on_arrival() {
        let solver = CrowdSolver::default();
        let agents = [agent(
            1,
            Vec3::new(1.0, 0.0, 1.0),
            CrowdMoveRequest::FollowCorridor {
                corridor: vec![1],
                target: Vec3::new(1.5, 0.0, 1.0),
                final_part: true,
            },
        )];

        let out = solver.solve(&Floor, &agents);
        assert!((out[0].velocity.norm() - 1.0).abs() < 1.0e-4);
    }
}
