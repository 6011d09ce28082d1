use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        BLOCK_DETECTION_DISTANCE, BLOCK_DETECTION_INTERVAL, BLOCK_DETECTION_SAMPLE_COUNT,
        CROWD_MAX_MOVEMENT_ANGLE_DEG, CROWD_PATH_PART_SIZE, MIN_AGENT_HALF_HEIGHT_PCT,
        MIN_AGENT_RADIUS_PCT, SEGMENT_REACH_RADIUS_PCT,
    },
    error::{FollowResult, PathFollowingError},
};

/// Tuning for one path follower.
///
/// Every field has a default, so a settings file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFollowingSettings {
    /// Agent radius multiplier for the destination reach test.
    pub min_agent_radius_pct: f32,

    /// Agent half-height multiplier for every reach test.
    pub min_agent_half_height_pct: f32,

    /// Agent radius multiplier for intermediate corners.
    pub segment_reach_radius_pct: f32,

    /// Skip path corners the agent can already see.
    pub use_visibility_optimization: bool,

    /// Also require a clear capsule sweep before skipping a corner.
    pub use_physics_for_visibility: bool,

    /// Stop the movement back-end when a move finishes.
    pub stop_movement_on_finish: bool,

    pub block_detection: BlockDetectionSettings,
    pub crowd: CrowdSettings,
    pub mover: MoverSettings,
}

impl Default for PathFollowingSettings {
    fn default() -> Self {
        Self {
            min_agent_radius_pct: MIN_AGENT_RADIUS_PCT,
            min_agent_half_height_pct: MIN_AGENT_HALF_HEIGHT_PCT,
            segment_reach_radius_pct: SEGMENT_REACH_RADIUS_PCT,
            use_visibility_optimization: false,
            use_physics_for_visibility: false,
            stop_movement_on_finish: true,
            block_detection: BlockDetectionSettings::default(),
            crowd: CrowdSettings::default(),
            mover: MoverSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDetectionSettings {
    pub enabled: bool,
    /// Largest spread of the samples around their centroid (meters).
    pub distance: f32,
    /// Minimum time between samples (seconds).
    pub interval: f32,
    pub sample_count: usize,
}

impl Default for BlockDetectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            distance: BLOCK_DETECTION_DISTANCE,
            interval: BLOCK_DETECTION_INTERVAL,
            sample_count: BLOCK_DETECTION_SAMPLE_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdSettings {
    /// Corridor polygons per path part.
    pub path_part_size: usize,
    /// Reject crowd velocities that turn away from the next corner.
    pub check_movement_angle: bool,
    pub max_movement_angle_deg: f32,
    /// Neighbour distance used by the reference separation solver (meters).
    pub separation_radius: f32,
    pub separation_weight: f32,
}

impl Default for CrowdSettings {
    fn default() -> Self {
        Self {
            path_part_size: CROWD_PATH_PART_SIZE,
            check_movement_angle: false,
            max_movement_angle_deg: CROWD_MAX_MOVEMENT_ANGLE_DEG,
            separation_radius: 1.5,
            separation_weight: 2.0,
        }
    }
}

/// Kinematic character controller settings for [`crate::KinematicMover`].
///
/// Values are meters, seconds and degrees (converted to radians when the controller is built).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverSettings {
    pub max_speed_mps: f32,
    /// Small gap kept between the capsule and the world. Keep it non-zero.
    pub offset: f32,
    pub max_slope_climb_deg: f32,
    pub min_slope_slide_deg: f32,
    pub autostep_max_height: f32,
    pub autostep_min_width: f32,
    pub snap_to_ground: f32,
    pub slide: bool,
    pub normal_nudge_factor: f32,
    /// Constant falling speed applied while airborne (m/s).
    pub fall_speed_mps: f32,
    /// Downward bias applied while grounded so snap-to-ground engages (m/s).
    pub grounded_down_bias_mps: f32,
}

impl Default for MoverSettings {
    fn default() -> Self {
        Self {
            max_speed_mps: 4.0,
            offset: 0.01,
            max_slope_climb_deg: 45.0,
            min_slope_slide_deg: 30.0,
            autostep_max_height: 0.3,
            autostep_min_width: 0.2,
            snap_to_ground: 0.3,
            slide: true,
            normal_nudge_factor: 1.0e-4,
            fall_speed_mps: 9.0,
            grounded_down_bias_mps: 0.125,
        }
    }
}

fn config_error(msg: String) -> PathFollowingError {
    PathFollowingError::Config(msg)
}

impl PathFollowingSettings {
    pub fn validate(&self) -> FollowResult<()> {
        if self.min_agent_radius_pct < 0.0 {
            return Err(config_error(format!(
                "min_agent_radius_pct must be >= 0, got {}",
                self.min_agent_radius_pct
            )));
        }
        if self.min_agent_half_height_pct < 0.0 {
            return Err(config_error(format!(
                "min_agent_half_height_pct must be >= 0, got {}",
                self.min_agent_half_height_pct
            )));
        }
        if !(0.0..=1.0).contains(&self.segment_reach_radius_pct) {
            return Err(config_error(format!(
                "segment_reach_radius_pct must be in [0, 1], got {}",
                self.segment_reach_radius_pct
            )));
        }

        let block = &self.block_detection;
        if block.distance <= 0.0 {
            return Err(config_error(format!(
                "block_detection.distance must be > 0, got {}",
                block.distance
            )));
        }
        if block.interval < 0.0 {
            return Err(config_error(format!(
                "block_detection.interval must be >= 0, got {}",
                block.interval
            )));
        }
        if block.sample_count < 2 {
            return Err(config_error(format!(
                "block_detection.sample_count must be >= 2, got {}",
                block.sample_count
            )));
        }

        if self.crowd.path_part_size < 2 {
            return Err(config_error(format!(
                "crowd.path_part_size must be >= 2, got {}",
                self.crowd.path_part_size
            )));
        }
        if !(0.0..=180.0).contains(&self.crowd.max_movement_angle_deg) {
            return Err(config_error(format!(
                "crowd.max_movement_angle_deg must be in [0, 180], got {}",
                self.crowd.max_movement_angle_deg
            )));
        }

        let mover = &self.mover;
        if mover.max_speed_mps <= 0.0 {
            return Err(config_error(format!(
                "mover.max_speed_mps must be > 0, got {}",
                mover.max_speed_mps
            )));
        }
        if mover.offset <= 0.0 {
            return Err(config_error(
                "mover.offset must be > 0".to_string(),
            ));
        }
        if mover.min_slope_slide_deg > mover.max_slope_climb_deg {
            return Err(config_error(format!(
                "mover.min_slope_slide_deg ({}) must not exceed mover.max_slope_climb_deg ({})",
                mover.min_slope_slide_deg, mover.max_slope_climb_deg
            )));
        }
        Ok(())
    }
}
