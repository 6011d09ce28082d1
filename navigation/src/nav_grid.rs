//! Grid navigation graph baked from an [`ObstacleWorld`].
//!
//! Cells are square and laid out X-major: `index = gx * depth + gz`. A node ref is the cell
//! index plus one so that zero stays the invalid ref. A cell is walkable when ground lies
//! below its center and an agent standing there would not overlap an obstacle.
//!
//! Paths come out of A* as a corridor of cells, then get string-pulled into corners with the
//! same line walk that backs [`NavigationData::raycast`]. Custom links are extra edges; the
//! corner before a link carries the link id.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::Arc,
};

use crate::{
    nav_link::NavLinkCustom,
    navigation_data::{NavLocation, NavQueryFilter, NavigationData},
    path::{CustomLinkId, NavigationPath, PathId, PathPoint, PathPointFlag},
    types::{NavNodeRef, Vec3},
    world::ObstacleWorld,
};

#[derive(Clone, Debug, PartialEq)]
pub struct NavGridSettings {
    pub cell_size: f32,
    /// Min corner (x, z) of the baked area.
    pub min: (f32, f32),
    /// Max corner (x, z) of the baked area.
    pub max: (f32, f32),
    pub agent_radius: f32,
    pub agent_height: f32,
    /// Obstacles lower than this above the ground do not block a cell.
    pub step_height: f32,
    /// Height ground probes start from.
    pub probe_height: f32,
    /// A* gives up (and returns a partial path) after expanding this many cells.
    pub max_search_nodes: usize,
}

impl Default for NavGridSettings {
    fn default() -> Self {
        Self {
            cell_size: 0.5,
            min: (-20.0, -20.0),
            max: (20.0, 20.0),
            agent_radius: 0.4,
            agent_height: 1.8,
            step_height: 0.3,
            probe_height: 50.0,
            max_search_nodes: 20_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct NavCell {
    walkable: bool,
    height: f32,
    area: u8,
}

struct GridLink {
    id: CustomLinkId,
    start_cell: usize,
    end_cell: usize,
    start: Vec3,
    end: Vec3,
    link: Arc<dyn NavLinkCustom>,
}

/// How A* entered a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Step {
    Walk,
    Link(usize),
}

#[derive(Clone, Copy, Debug)]
struct OpenNode {
    cell: usize,
    f_score: f32,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell && self.f_score == other.f_score
    }
}

impl Eq for OpenNode {}

impl Ord for OpenNode {
    // Reversed so BinaryHeap pops the lowest f first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct NavGrid {
    settings: NavGridSettings,
    width: usize,
    depth: usize,
    cells: Vec<NavCell>,
    links: Vec<GridLink>,
}

impl NavGrid {
    pub fn build(world: &ObstacleWorld, settings: NavGridSettings) -> Self {
        let size = settings.cell_size.max(0.05);
        let width = (((settings.max.0 - settings.min.0) / size).ceil().max(1.0)) as usize;
        let depth = (((settings.max.1 - settings.min.1) / size).ceil().max(1.0)) as usize;

        let clearance = (settings.agent_height - settings.step_height).max(0.1) * 0.5;
        let half_extents = Vec3::new(settings.agent_radius, clearance, settings.agent_radius);

        let mut cells = Vec::with_capacity(width * depth);
        for gx in 0..width {
            for gz in 0..depth {
                let x = settings.min.0 + (gx as f32 + 0.5) * size;
                let z = settings.min.1 + (gz as f32 + 0.5) * size;

                let cell = match world.ground_below(x, settings.probe_height, z, settings.probe_height * 2.0) {
                    Some(ground) => {
                        let center = Vec3::new(x, ground.height + settings.step_height + clearance, z);
                        NavCell {
                            walkable: !world.obstacle_overlaps_box(&center, &half_extents),
                            height: ground.height,
                            area: ground.area,
                        }
                    }
                    None => NavCell::default(),
                };
                cells.push(cell);
            }
        }

        let walkable = cells.iter().filter(|c| c.walkable).count();
        log::info!(
            "nav grid baked: {width}x{depth} cells ({walkable} walkable), cell size {size:.2}"
        );

        Self {
            settings: NavGridSettings {
                cell_size: size,
                ..settings
            },
            width,
            depth,
            cells,
            links: Vec::new(),
        }
    }

    pub fn settings(&self) -> &NavGridSettings {
        &self.settings
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.depth)
    }

    /// Registers a one-way link from `start` to `end`. Both ends must be on walkable cells.
    pub fn add_custom_link(
        &mut self,
        id: CustomLinkId,
        start: Vec3,
        end: Vec3,
        link: Arc<dyn NavLinkCustom>,
    ) -> bool {
        let (Some(start_cell), Some(end_cell)) = (self.walkable_cell_at(&start), self.walkable_cell_at(&end))
        else {
            log::warn!("custom link {id} rejected: an end is off the grid or blocked");
            return false;
        };

        let start = Vec3::new(start.x, self.cells[start_cell].height, start.z);
        let end = Vec3::new(end.x, self.cells[end_cell].height, end.z);
        self.links.retain(|l| l.id != id);
        self.links.push(GridLink {
            id,
            start_cell,
            end_cell,
            start,
            end,
            link,
        });
        true
    }

    pub fn node_ref(cell: usize) -> NavNodeRef {
        cell as NavNodeRef + 1
    }

    fn cell_of_ref(&self, node_ref: NavNodeRef) -> Option<usize> {
        let idx = (node_ref as usize).checked_sub(1)?;
        (idx < self.cells.len()).then_some(idx)
    }

    fn coords(&self, x: f32, z: f32) -> Option<(usize, usize)> {
        let size = self.settings.cell_size;
        let gx = ((x - self.settings.min.0) / size).floor();
        let gz = ((z - self.settings.min.1) / size).floor();
        if gx < 0.0 || gz < 0.0 || gx >= self.width as f32 || gz >= self.depth as f32 {
            return None;
        }
        Some((gx as usize, gz as usize))
    }

    fn cell_at(&self, location: &Vec3) -> Option<usize> {
        self.coords(location.x, location.z)
            .map(|(gx, gz)| gx * self.depth + gz)
    }

    fn walkable_cell_at(&self, location: &Vec3) -> Option<usize> {
        self.cell_at(location).filter(|&c| self.cells[c].walkable)
    }

    pub fn is_walkable(&self, location: &Vec3) -> bool {
        self.walkable_cell_at(location).is_some()
    }

    fn cell_center(&self, cell: usize) -> Vec3 {
        let size = self.settings.cell_size;
        let gx = cell / self.depth;
        let gz = cell % self.depth;
        Vec3::new(
            self.settings.min.0 + (gx as f32 + 0.5) * size,
            self.cells[cell].height,
            self.settings.min.1 + (gz as f32 + 0.5) * size,
        )
    }

    fn on_cell(&self, cell: usize, location: &Vec3) -> Vec3 {
        Vec3::new(location.x, self.cells[cell].height, location.z)
    }

    fn passable(&self, cell: usize, filter: &NavQueryFilter) -> bool {
        let c = &self.cells[cell];
        c.walkable && filter.allows(c.area)
    }

    /// Closest walkable cell within two rings of `location`.
    fn nearest_passable(&self, location: &Vec3, filter: &NavQueryFilter) -> Option<usize> {
        let (gx, gz) = self.coords(location.x, location.z)?;
        let mut best: Option<(usize, f32)> = None;
        for dx in -2_i64..=2 {
            for dz in -2_i64..=2 {
                let (x, z) = (gx as i64 + dx, gz as i64 + dz);
                if x < 0 || z < 0 || x >= self.width as i64 || z >= self.depth as i64 {
                    continue;
                }
                let cell = x as usize * self.depth + z as usize;
                if !self.passable(cell, filter) {
                    continue;
                }
                let d = (self.cell_center(cell) - location).xz().norm_squared();
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((cell, d));
                }
            }
        }
        best.map(|(cell, _)| cell)
    }

    fn neighbours(&self, cell: usize, filter: &NavQueryFilter, out: &mut Vec<(usize, f32, Step)>) {
        out.clear();
        let size = self.settings.cell_size;
        let gx = (cell / self.depth) as i64;
        let gz = (cell % self.depth) as i64;
        let open = |x: i64, z: i64| -> Option<usize> {
            if x < 0 || z < 0 || x >= self.width as i64 || z >= self.depth as i64 {
                return None;
            }
            let idx = x as usize * self.depth + z as usize;
            self.passable(idx, filter).then_some(idx)
        };

        for dx in -1..=1_i64 {
            for dz in -1..=1_i64 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let Some(next) = open(gx + dx, gz + dz) else {
                    continue;
                };
                // No corner cutting past blocked cells.
                if dx != 0 && dz != 0 && (open(gx + dx, gz).is_none() || open(gx, gz + dz).is_none()) {
                    continue;
                }
                let cost = if dx != 0 && dz != 0 {
                    size * std::f32::consts::SQRT_2
                } else {
                    size
                };
                out.push((next, cost, Step::Walk));
            }
        }

        for (idx, link) in self.links.iter().enumerate() {
            if link.start_cell == cell && self.passable(link.end_cell, filter) {
                out.push((link.end_cell, (link.end - link.start).norm(), Step::Link(idx)));
            }
        }
    }

    /// True when the straight line between `from` and `to` stays on passable cells.
    fn line_clear(&self, from: &Vec3, to: &Vec3, filter: &NavQueryFilter) -> Result<(), Vec3> {
        let delta = to - from;
        let planar = delta.xz().norm();
        let step = self.settings.cell_size * 0.25;
        let samples = (planar / step).ceil().max(1.0) as usize;

        for i in 0..=samples {
            let t = i as f32 / samples as f32;
            let p = from + delta * t;
            match self.cell_at(&p) {
                Some(cell) if self.passable(cell, filter) => {}
                _ => return Err(p),
            }
        }
        Ok(())
    }

    /// Finds a path from `start` to `end`.
    ///
    /// When `end` can't be reached the path stops at the explored cell closest to it and is
    /// marked partial. Returns `None` when `start` is not on the grid.
    pub fn find_path(
        &self,
        id: PathId,
        start: &Vec3,
        end: &Vec3,
        filter: &NavQueryFilter,
    ) -> Option<NavigationPath> {
        self.find_path_with(id, start, end, filter, true)
    }

    /// [`NavGrid::find_path`] with optional string pulling. Without it the points are only
    /// the start, the link ends and the end; crowd agents steer along the corridor instead.
    pub fn find_path_with(
        &self,
        id: PathId,
        start: &Vec3,
        end: &Vec3,
        filter: &NavQueryFilter,
        string_pull: bool,
    ) -> Option<NavigationPath> {
        let start_cell = self.nearest_passable(start, filter)?;
        let goal_cell = self.walkable_cell_at(end).filter(|&c| self.passable(c, filter));

        let heuristic = |cell: usize| (self.cell_center(cell) - end).xz().norm();

        let mut g_score = vec![f32::INFINITY; self.cells.len()];
        let mut came_from: Vec<Option<(usize, Step)>> = vec![None; self.cells.len()];
        let mut open = BinaryHeap::new();
        let mut scratch = Vec::with_capacity(8);

        g_score[start_cell] = 0.0;
        open.push(OpenNode {
            cell: start_cell,
            f_score: heuristic(start_cell),
        });

        let mut best = (start_cell, heuristic(start_cell));
        let mut expanded = 0;
        let mut reached = false;

        while let Some(OpenNode { cell, f_score }) = open.pop() {
            if f_score > g_score[cell] + heuristic(cell) + 1.0e-4 {
                continue;
            }
            if Some(cell) == goal_cell {
                reached = true;
                break;
            }

            let h = heuristic(cell);
            if h < best.1 {
                best = (cell, h);
            }

            expanded += 1;
            if expanded >= self.settings.max_search_nodes {
                log::debug!("path {id}: search limit reached after {expanded} cells");
                break;
            }

            self.neighbours(cell, filter, &mut scratch);
            for &(next, cost, step) in scratch.iter() {
                let tentative = g_score[cell] + cost;
                if tentative < g_score[next] {
                    g_score[next] = tentative;
                    came_from[next] = Some((cell, step));
                    open.push(OpenNode {
                        cell: next,
                        f_score: tentative + heuristic(next),
                    });
                }
            }
        }

        let last_cell = match (reached, goal_cell) {
            (true, Some(goal)) => goal,
            _ => best.0,
        };

        // Each entry records how its cell was entered.
        let mut entered_by = Vec::new();
        let mut cursor = last_cell;
        while let Some((prev, step)) = came_from[cursor] {
            entered_by.push((cursor, step));
            cursor = prev;
        }
        entered_by.push((cursor, Step::Walk));
        entered_by.reverse();

        let end_location = if reached {
            self.on_cell(last_cell, end)
        } else {
            self.cell_center(last_cell)
        };
        let start_location = self.on_cell(start_cell, start);
        let points = if string_pull {
            self.string_pull(&entered_by, start_location, end_location, filter)
        } else {
            self.corridor_points(&entered_by, start_location, end_location)
        };
        let refs = entered_by.iter().map(|&(c, _)| Self::node_ref(c)).collect();

        log::debug!(
            "path {id}: {} corridor cells, {} points{}",
            entered_by.len(),
            points.len(),
            if reached { "" } else { " (partial)" }
        );

        Some(NavigationPath::navmesh(id, points, refs).with_partial(!reached))
    }

    fn point_on(&self, cell: usize, location: Vec3) -> PathPoint {
        PathPoint::on_node(location, Self::node_ref(cell)).with_area(self.cells[cell].area)
    }

    fn string_pull(
        &self,
        corridor: &[(usize, Step)],
        start: Vec3,
        end: Vec3,
        filter: &NavQueryFilter,
    ) -> Vec<PathPoint> {
        let Some(&(first_cell, _)) = corridor.first() else {
            return Vec::new();
        };

        let mut points = vec![self.point_on(first_cell, start).with_flag(PathPointFlag::Start)];
        let mut anchor = start;
        let mut i = 1;

        while i < corridor.len() {
            let (cell, step) = corridor[i];
            if let Step::Link(link_idx) = step {
                let link = &self.links[link_idx];
                let (prev_cell, _) = corridor[i - 1];
                if self.line_clear(&anchor, &link.start, filter).is_err() {
                    points.push(self.point_on(prev_cell, self.cell_center(prev_cell)));
                }
                points.push(
                    self.point_on(link.start_cell, link.start)
                        .with_flag(PathPointFlag::OffMeshConnection)
                        .with_custom_link(link.id),
                );
                points.push(self.point_on(link.end_cell, link.end));
                anchor = link.end;
                i += 1;
                continue;
            }

            let target = if i + 1 == corridor.len() {
                end
            } else {
                self.cell_center(cell)
            };
            if self.line_clear(&anchor, &target, filter).is_err() {
                let (prev_cell, _) = corridor[i - 1];
                let corner = self.cell_center(prev_cell);
                points.push(self.point_on(prev_cell, corner));
                anchor = corner;
            }
            i += 1;
        }

        self.close_points(&mut points, corridor[corridor.len() - 1].0, end);
        points
    }

    fn close_points(&self, points: &mut Vec<PathPoint>, last_cell: usize, end: Vec3) {
        if points.last().map(|p| p.location) != Some(end) || points.len() < 2 {
            points.push(self.point_on(last_cell, end));
        }
        if let Some(last) = points.last_mut() {
            last.flags.add(PathPointFlag::End);
        }
    }

    fn corridor_points(&self, corridor: &[(usize, Step)], start: Vec3, end: Vec3) -> Vec<PathPoint> {
        let Some(&(first_cell, _)) = corridor.first() else {
            return Vec::new();
        };

        let mut points = vec![self.point_on(first_cell, start).with_flag(PathPointFlag::Start)];
        for &(_, step) in corridor.iter().skip(1) {
            if let Step::Link(link_idx) = step {
                let link = &self.links[link_idx];
                points.push(
                    self.point_on(link.start_cell, link.start)
                        .with_flag(PathPointFlag::OffMeshConnection)
                        .with_custom_link(link.id),
                );
                points.push(self.point_on(link.end_cell, link.end));
            }
        }

        self.close_points(&mut points, corridor[corridor.len() - 1].0, end);
        points
    }

    pub fn cell_area(&self, node_ref: NavNodeRef) -> Option<u8> {
        self.cell_of_ref(node_ref).map(|c| self.cells[c].area)
    }
}

impl NavigationData for NavGrid {
    fn raycast(&self, from: &Vec3, to: &Vec3, filter: &NavQueryFilter) -> Option<Vec3> {
        self.line_clear(from, to, filter).err()
    }

    fn project_point(&self, location: &Vec3) -> Option<NavLocation> {
        let cell = self.walkable_cell_at(location)?;
        Some(NavLocation::new(self.on_cell(cell, location), Self::node_ref(cell)))
    }

    fn node_center(&self, node_ref: NavNodeRef) -> Option<Vec3> {
        self.cell_of_ref(node_ref).map(|c| self.cell_center(c))
    }

    fn custom_link(&self, id: CustomLinkId) -> Option<Arc<dyn NavLinkCustom>> {
        self.links.iter().find(|l| l.id == id).map(|l| l.link.clone())
    }
}

impl std::fmt::Debug for NavGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavGrid")
            .field("width", &self.width)
            .field("depth", &self.depth)
            .field("cell_size", &self.settings.cell_size)
            .field("links", &self.links.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        nav_link::FollowerId,
        world::WorldStaticDef,
    };
    use std::sync::Mutex;

    fn grid_with_wall() -> NavGrid {
        // Wall along x = 0 from z = -6 to z = 4; the gap is at z > 4.
        let world = ObstacleWorld::build(vec![
            WorldStaticDef::ground_plane(1, 0.0, 0),
            WorldStaticDef::obstacle_box(2, Vec3::new(0.0, 1.0, -1.0), Vec3::new(0.25, 1.0, 5.0)),
            WorldStaticDef::ground_patch(3, (6.0, -6.0), 0.02, (1.5, 1.5), 4),
        ]);
        NavGrid::build(
            &world,
            NavGridSettings {
                min: (-8.0, -8.0),
                max: (8.0, 8.0),
                ..NavGridSettings::default()
            },
        )
    }

    #[test]
    fn wall_cells_are_blocked() {
        let grid = grid_with_wall();
        assert!(!grid.is_walkable(&Vec3::new(0.0, 0.0, 0.0)));
        assert!(grid.is_walkable(&Vec3::new(-3.0, 0.0, 0.0)));
        assert!(grid.is_walkable(&Vec3::new(0.0, 0.0, 6.0)));
    }

    #[test]
    fn raycast_reports_blocking_point() {
        let grid = grid_with_wall();
        let filter = NavQueryFilter::default();
        let hit = grid
            .raycast(&Vec3::new(-3.0, 0.0, 0.0), &Vec3::new(3.0, 0.0, 0.0), &filter)
            .unwrap();
        assert!(hit.x < 0.0 && hit.x > -1.0);
        assert!(grid
            .raycast(&Vec3::new(-3.0, 0.0, 6.0), &Vec3::new(3.0, 0.0, 6.0), &filter)
            .is_none());
    }

    #[test]
    fn path_goes_around_the_wall() {
        let grid = grid_with_wall();
        let start = Vec3::new(-3.0, 0.0, 0.0);
        let end = Vec3::new(3.0, 0.0, 0.0);
        let path = grid
            .find_path(PathId(1), &start, &end, &NavQueryFilter::default())
            .unwrap();

        assert!(path.is_valid());
        assert!(!path.is_partial());
        assert!(path.points().len() >= 3);
        assert!(path.points().iter().any(|p| p.location.z > 4.0));
        let last = path.destination().unwrap();
        assert!((last - end).norm() < 1.0e-4);
        assert!(path.points()[0].flags.has(PathPointFlag::Start));
        assert!(path.points()[path.points().len() - 1].flags.has(PathPointFlag::End));

        // Every consecutive pair of corners must be mutually visible.
        for pair in path.points().windows(2) {
            assert!(grid
                .raycast(&pair[0].location, &pair[1].location, &NavQueryFilter::default())
                .is_none());
        }
    }

    #[test]
    fn straight_path_has_two_points() {
        let grid = grid_with_wall();
        let path = grid
            .find_path(
                PathId(2),
                &Vec3::new(-5.0, 0.0, -5.0),
                &Vec3::new(-2.0, 0.0, 2.0),
                &NavQueryFilter::default(),
            )
            .unwrap();
        assert_eq!(path.points().len(), 2);
    }

    #[test]
    fn unreachable_goal_gives_partial_path() {
        let grid = grid_with_wall();
        let filter = NavQueryFilter::default().excluding(4);
        let path = grid
            .find_path(PathId(3), &Vec3::new(2.0, 0.0, -2.0), &Vec3::new(6.0, 0.0, -6.0), &filter)
            .unwrap();
        assert!(path.is_partial());
        assert!(path.is_valid());
    }

    #[test]
    fn unpulled_path_keeps_only_ends_and_corridor() {
        let grid = grid_with_wall();
        let start = Vec3::new(-3.0, 0.0, 0.0);
        let end = Vec3::new(3.0, 0.0, 0.0);
        let filter = NavQueryFilter::default();
        let pulled = grid.find_path(PathId(5), &start, &end, &filter).unwrap();
        let raw = grid
            .find_path_with(PathId(5), &start, &end, &filter, false)
            .unwrap();

        assert_eq!(raw.points().len(), 2);
        assert_eq!(raw.corridor(), pulled.corridor());
        assert!((raw.destination().unwrap() - end).norm() < 1.0e-4);
    }

    #[derive(Default)]
    struct CountingLink {
        started: Mutex<Vec<FollowerId>>,
    }

    impl NavLinkCustom for CountingLink {
        fn on_link_move_started(&self, follower: FollowerId, _destination: &Vec3) -> bool {
            if let Ok(mut started) = self.started.lock() {
                started.push(follower);
            }
            true
        }

        fn on_link_move_finished(&self, _follower: FollowerId) {}
    }

    #[test]
    fn custom_link_shortcuts_through_wall() {
        let mut grid = grid_with_wall();
        let link = Arc::new(CountingLink::default());
        assert!(grid.add_custom_link(9, Vec3::new(-0.75, 0.0, 0.0), Vec3::new(0.75, 0.0, 0.0), link));
        assert!(grid.custom_link(9).is_some());

        let path = grid
            .find_path(
                PathId(4),
                &Vec3::new(-3.0, 0.0, 0.0),
                &Vec3::new(3.0, 0.0, 0.0),
                &NavQueryFilter::default(),
            )
            .unwrap();

        let link_point = path
            .points()
            .iter()
            .position(|p| p.custom_link == Some(9))
            .unwrap();
        assert!(path.points()[link_point].is_off_mesh_connection());
        assert!(path.points()[link_point + 1].location.x > 0.0);
        assert!(path.points().iter().all(|p| p.location.z < 4.0));
    }
}
