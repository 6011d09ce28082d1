//! Tuning defaults for path following.
//!
//! Units are meters and seconds. These are the values `PathFollowingSettings::default()`
//! starts from; per-agent overrides go through the settings struct, not these constants.

/// Agent radius multiplier used by the destination reach test.
///
/// Values above 1.0 let the agent finish while its collision cylinder still overlaps the goal.
pub const MIN_AGENT_RADIUS_PCT: f32 = 1.1;

/// Agent half-height multiplier used by every reach test (vertical tolerance).
pub const MIN_AGENT_HALF_HEIGHT_PCT: f32 = 1.05;

/// Agent radius multiplier for intermediate path corners.
///
/// Corners need a near-exact hit, otherwise agents cut into walls next to them.
pub const SEGMENT_REACH_RADIUS_PCT: f32 = 0.05;

/// Maximum spread (meters) of the block detection samples around their centroid.
pub const BLOCK_DETECTION_DISTANCE: f32 = 0.1;

/// Minimum time between two block detection samples (seconds).
pub const BLOCK_DETECTION_INTERVAL: f32 = 0.5;

/// Size of the block detection sample ring.
pub const BLOCK_DETECTION_SAMPLE_COUNT: usize = 10;

/// Distance ahead of the current destination used as the move focal point (meters).
pub const MOVE_FOCUS_DISTANCE: f32 = 0.2;

/// Tolerance when deciding whether the cached navigation location is still current (meters).
pub const NAV_LOCATION_TOLERANCE: f32 = 0.01;

/// Squared distance below which the goal and the current destination are considered the same.
pub const SMALL_DISTANCE_SQ: f32 = 1.0e-8;

/// Two path points closer than this are treated as one location (meters).
pub const POINT_EQUALS_TOLERANCE: f32 = 1.0e-4;

/// Number of corridor polygons handed to the crowd simulation per path part.
pub const CROWD_PATH_PART_SIZE: usize = 15;

/// Largest allowed angle between crowd velocity and the direction to the next corner (degrees).
pub const CROWD_MAX_MOVEMENT_ANGLE_DEG: f32 = 50.0;
