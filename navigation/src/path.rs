//! Navigation paths as produced by a pathfinder and consumed by followers.
//!
//! A path is an immutable value shared through [`SharedPath`]. Repathing (goal moved,
//! navigation rebuilt) produces a new value with the same [`PathId`], so followers can tell
//! "my path was updated" apart from "I was handed a different path".

use std::{fmt, sync::Arc};

use crate::{
    bitmask_flags::BitmaskFlags,
    define_bitmask_flags,
    types::{INVALID_NAV_NODE_REF, NavNodeRef, Vec3},
};

pub type SharedPath = Arc<NavigationPath>;

/// Identifier of a custom navigation link (see [`crate::NavLinkCustom`]).
pub type CustomLinkId = u32;

/// Stable identity of a path across repaths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(pub u64);

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

define_bitmask_flags!(
    /// Per-point flags reported by the pathfinder.
    PathPointFlag, u8, {
        Start,
        End,
        OffMeshConnection,
    }
);

pub type PathPointFlags = BitmaskFlags<u8>;

/// Area id used when a point carries no area information.
pub const DEFAULT_AREA: u8 = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct PathPoint {
    pub location: Vec3,
    pub node_ref: NavNodeRef,
    /// Navigation area the point lies in.
    pub area: u8,
    pub flags: PathPointFlags,
    pub custom_link: Option<CustomLinkId>,
}

impl PathPoint {
    pub fn new(location: Vec3) -> Self {
        Self {
            location,
            node_ref: INVALID_NAV_NODE_REF,
            area: DEFAULT_AREA,
            flags: PathPointFlags::empty(),
            custom_link: None,
        }
    }

    pub fn on_node(location: Vec3, node_ref: NavNodeRef) -> Self {
        Self {
            node_ref,
            ..Self::new(location)
        }
    }

    pub fn with_area(mut self, area: u8) -> Self {
        self.area = area;
        self
    }

    pub fn with_flag(mut self, flag: PathPointFlag) -> Self {
        self.flags.add(flag);
        self
    }

    pub fn with_custom_link(mut self, link: CustomLinkId) -> Self {
        self.custom_link = Some(link);
        self
    }

    pub fn is_off_mesh_connection(&self) -> bool {
        self.flags.has(PathPointFlag::OffMeshConnection)
    }
}

/// What produced the path, which decides how much a follower can reason about it.
#[derive(Clone, Debug, PartialEq)]
pub enum PathKind {
    /// Navmesh path with the polygon corridor it was string-pulled from.
    NavMesh { corridor: Vec<NavNodeRef> },
    /// Straight line produced by navigation data without a corridor.
    Direct,
    /// Hand-authored points; no navigation data backs them.
    Scripted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NavigationPath {
    id: PathId,
    points: Vec<PathPoint>,
    kind: PathKind,
    ready: bool,
    up_to_date: bool,
    partial: bool,
    waiting_for_repath: bool,
    timestamp: f32,
}

impl NavigationPath {
    fn with_points(id: PathId, points: Vec<PathPoint>, kind: PathKind) -> Self {
        Self {
            id,
            points,
            kind,
            ready: true,
            up_to_date: true,
            partial: false,
            waiting_for_repath: false,
            timestamp: 0.0,
        }
    }

    /// Navmesh path with its polygon corridor.
    pub fn navmesh(id: PathId, points: Vec<PathPoint>, corridor: Vec<NavNodeRef>) -> Self {
        Self::with_points(id, points, PathKind::NavMesh { corridor })
    }

    /// Straight move from `start` to `end` validated by navigation data.
    pub fn direct(id: PathId, start: Vec3, end: Vec3) -> Self {
        Self::with_points(
            id,
            vec![
                PathPoint::new(start).with_flag(PathPointFlag::Start),
                PathPoint::new(end).with_flag(PathPointFlag::End),
            ],
            PathKind::Direct,
        )
    }

    /// Waypoints not backed by navigation data.
    pub fn scripted(id: PathId, locations: impl IntoIterator<Item = Vec3>) -> Self {
        let points = locations.into_iter().map(PathPoint::new).collect();
        Self::with_points(id, points, PathKind::Scripted)
    }

    /// Placeholder for an asynchronous query that has not produced points yet.
    pub fn pending(id: PathId) -> Self {
        Self {
            ready: false,
            ..Self::with_points(id, Vec::new(), PathKind::NavMesh { corridor: Vec::new() })
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Same path id with new geometry, e.g. after the goal moved.
    pub fn repathed(&self, points: Vec<PathPoint>, kind: PathKind, timestamp: f32) -> Self {
        Self {
            timestamp,
            ..Self::with_points(self.id, points, kind)
        }
    }

    /// Copy marked out of date, optionally with a repath already scheduled.
    pub fn invalidated(&self, waiting_for_repath: bool) -> Self {
        Self {
            up_to_date: false,
            waiting_for_repath,
            ..self.clone()
        }
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<&PathPoint> {
        self.points.get(index)
    }

    pub fn location(&self, index: usize) -> Option<Vec3> {
        self.points.get(index).map(|p| p.location)
    }

    pub fn kind(&self) -> &PathKind {
        &self.kind
    }

    pub fn corridor(&self) -> Option<&[NavNodeRef]> {
        match &self.kind {
            PathKind::NavMesh { corridor } => Some(corridor),
            _ => None,
        }
    }

    pub fn is_navmesh(&self) -> bool {
        matches!(self.kind, PathKind::NavMesh { .. })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, PathKind::Direct)
    }

    /// Scripted paths carry no navigation data.
    pub fn uses_navigation_data(&self) -> bool {
        !matches!(self.kind, PathKind::Scripted)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn is_waiting_for_repath(&self) -> bool {
        self.waiting_for_repath
    }

    pub fn timestamp(&self) -> f32 {
        self.timestamp
    }

    /// Ready, up to date and long enough to follow.
    pub fn is_valid(&self) -> bool {
        self.ready && self.up_to_date && self.points.len() > 1
    }

    /// Ready paths with fewer than two points can never become followable.
    pub fn is_degenerate(&self) -> bool {
        self.ready && self.points.len() < 2
    }

    pub fn destination(&self) -> Option<Vec3> {
        self.points.last().map(|p| p.location)
    }

    pub fn contains_node(&self, node_ref: NavNodeRef) -> bool {
        match &self.kind {
            PathKind::NavMesh { corridor } => corridor.contains(&node_ref),
            _ => self.points.iter().any(|p| p.node_ref == node_ref),
        }
    }

    /// Remaining polyline length measured from the first point on `node_ref`.
    ///
    /// For navmesh paths a node that only appears in the corridor maps to the first point on
    /// the same or a later corridor polygon. Unknown nodes cost nothing.
    pub fn cost_from_node(&self, node_ref: NavNodeRef) -> f32 {
        let Some(start) = self.first_point_at_or_after_node(node_ref) else {
            return 0.0;
        };

        self.points[start..]
            .windows(2)
            .map(|pair| (pair[1].location - pair[0].location).norm())
            .sum()
    }

    fn first_point_at_or_after_node(&self, node_ref: NavNodeRef) -> Option<usize> {
        if let Some(idx) = self.points.iter().position(|p| p.node_ref == node_ref) {
            return Some(idx);
        }

        let corridor = self.corridor()?;
        let poly_idx = corridor.iter().position(|&n| n == node_ref)?;
        self.points.iter().position(|p| {
            corridor
                .iter()
                .position(|&n| n == p.node_ref)
                .is_some_and(|idx| idx >= poly_idx)
        })
    }

    /// Short description used in logs: `missing`, `invalid` or `complete:N` / `partial:N`.
    pub fn describe(path: Option<&SharedPath>) -> String {
        match path {
            None => "missing".to_string(),
            Some(p) if !p.is_valid() => "invalid".to_string(),
            Some(p) => format!(
                "{}:{}",
                if p.partial { "partial" } else { "complete" },
                p.points.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corridor_path() -> NavigationPath {
        NavigationPath::navmesh(
            PathId(7),
            vec![
                PathPoint::on_node(Vec3::new(0.0, 0.0, 0.0), 10),
                PathPoint::on_node(Vec3::new(3.0, 0.0, 0.0), 12),
                PathPoint::on_node(Vec3::new(3.0, 0.0, 4.0), 14),
            ],
            vec![10, 11, 12, 13, 14],
        )
    }

    #[test]
    fn validity_requires_ready_and_two_points() {
        assert!(corridor_path().is_valid());
        assert!(!NavigationPath::pending(PathId(1)).is_valid());
        assert!(!NavigationPath::pending(PathId(1)).is_degenerate());

        let single = NavigationPath::scripted(PathId(2), [Vec3::zeros()]);
        assert!(!single.is_valid());
        assert!(single.is_degenerate());
    }

    #[test]
    fn invalidated_copy_keeps_identity() {
        let path = corridor_path();
        let stale = path.invalidated(true);
        assert_eq!(stale.id(), path.id());
        assert!(!stale.is_valid());
        assert!(stale.is_waiting_for_repath());
    }

    #[test]
    fn corridor_membership_uses_polygons() {
        let path = corridor_path();
        assert!(path.contains_node(11));
        assert!(!path.contains_node(99));

        let scripted = NavigationPath::scripted(PathId(3), [Vec3::zeros(), Vec3::x()]);
        assert!(!scripted.contains_node(11));
        assert!(!scripted.uses_navigation_data());
    }

    #[test]
    fn cost_from_node_sums_remaining_segments() {
        let path = corridor_path();
        assert!((path.cost_from_node(10) - 7.0).abs() < 1.0e-5);
        assert!((path.cost_from_node(12) - 4.0).abs() < 1.0e-5);
        // Corridor-only polygon maps to the next point on the path.
        assert!((path.cost_from_node(13) - 0.0).abs() < 1.0e-5);
        assert!((path.cost_from_node(11) - 4.0).abs() < 1.0e-5);
        assert_eq!(path.cost_from_node(999), 0.0);
    }

    #[test]
    fn describe_reports_state() {
        let path: SharedPath = Arc::new(corridor_path().with_partial(true));
        assert_eq!(NavigationPath::describe(Some(&path)), "partial:3");
        assert_eq!(NavigationPath::describe(None), "missing");
    }
}
