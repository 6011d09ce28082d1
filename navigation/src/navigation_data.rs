//! Collaborators the follower queries but does not own.

use std::sync::Arc;

use crate::{
    nav_link::NavLinkCustom,
    path::CustomLinkId,
    types::{INVALID_NAV_NODE_REF, NavNodeRef, Vec3},
};

/// Area restrictions for navigation queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NavQueryFilter {
    /// When set, only this area is traversable.
    pub only_area: Option<u8>,
    /// Bit `n` excludes area `n` (areas 0..64).
    pub excluded_areas: u64,
}

impl NavQueryFilter {
    pub fn restricted_to(area: u8) -> Self {
        Self {
            only_area: Some(area),
            ..Self::default()
        }
    }

    pub fn excluding(mut self, area: u8) -> Self {
        if area < 64 {
            self.excluded_areas |= 1 << area;
        }
        self
    }

    pub fn allows(&self, area: u8) -> bool {
        if self.only_area.is_some_and(|only| only != area) {
            return false;
        }
        area >= 64 || self.excluded_areas & (1 << area) == 0
    }
}

/// Location projected onto navigation data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NavLocation {
    pub location: Vec3,
    pub node_ref: NavNodeRef,
}

impl NavLocation {
    pub fn new(location: Vec3, node_ref: NavNodeRef) -> Self {
        Self { location, node_ref }
    }

    pub fn unprojected(location: Vec3) -> Self {
        Self::new(location, INVALID_NAV_NODE_REF)
    }

    pub fn has_node_ref(&self) -> bool {
        self.node_ref != INVALID_NAV_NODE_REF
    }
}

/// Navigation graph queries (navmesh or equivalent).
pub trait NavigationData: Send + Sync {
    /// Walks from `from` to `to` on the graph. Returns the first blocking point, or `None`
    /// when the whole segment is traversable under `filter`.
    fn raycast(&self, from: &Vec3, to: &Vec3, filter: &NavQueryFilter) -> Option<Vec3>;

    /// Projects a world location onto the graph.
    fn project_point(&self, location: &Vec3) -> Option<NavLocation>;

    /// Center of a graph node, used as an intermediate target for partial corridors.
    fn node_center(&self, _node_ref: NavNodeRef) -> Option<Vec3> {
        None
    }

    /// Custom link registered under `id`.
    fn custom_link(&self, _id: CustomLinkId) -> Option<Arc<dyn NavLinkCustom>> {
        None
    }
}

/// Physics scene queries used to confirm navigation shortcuts.
pub trait CollisionQuery: Send + Sync {
    /// True when a vertical capsule swept from `from` to `to` hits static geometry.
    ///
    /// Positions are capsule centers.
    fn sweep_capsule(&self, from: &Vec3, to: &Vec3, radius: f32, half_height: f32) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_restricts_and_excludes_areas() {
        let filter = NavQueryFilter::default().excluding(3);
        assert!(filter.allows(0));
        assert!(!filter.allows(3));

        let only = NavQueryFilter::restricted_to(2);
        assert!(only.allows(2));
        assert!(!only.allows(0));
    }

    #[test]
    fn unprojected_location_has_no_node() {
        let loc = NavLocation::unprojected(Vec3::new(1.0, 2.0, 3.0));
        assert!(!loc.has_node_ref());
    }
}
