use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunable physics and visual constants, overridable from a RON file
/// via `--scene`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,

    /// Ball edge length in pixels (the ball is a square).
    pub ball_size: f64,
    /// Horizontal drift, px/s.
    pub ball_speed_x: f64,
    /// Downward acceleration, px/s^2.
    pub gravity: f64,
    /// Fraction of vertical speed kept on a bounce.
    pub restitution: f64,
    /// Landing slower than this (px/s) sticks instead of bouncing.
    pub rest_speed: f64,
    /// Per-frame horizontal decay while resting.
    pub friction: f64,

    pub platform_width: f64,
    pub platform_height: f64,
    /// Horizontal padding around the pitch-lane span.
    pub lane_margin: f64,
    /// How fast the platform staircase descends, px/s.
    pub descent_rate: f64,
    /// Seconds a platform stays active; None keeps every platform live
    /// for the whole run.
    pub platform_lifetime: Option<f64>,

    pub camera_margin: f64,
    pub camera_alpha: f64,

    /// Speed under which the ball counts as settled.
    pub settle_speed: f64,
    /// Consecutive settled frames required before the run ends.
    pub settle_frames: u32,

    pub hit_animation_frames: u32,
    pub hit_shrink: f64,

    pub background: [u8; 3],
    pub ball_color: [u8; 3],
    pub platform_color: [u8; 3],
    pub carve_color: [u8; 3],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 1088,
            height: 1920,
            ball_size: 100.0,
            ball_speed_x: 0.0,
            gravity: 2800.0,
            restitution: 0.82,
            rest_speed: 300.0,
            friction: 0.88,
            platform_width: 280.0,
            platform_height: 40.0,
            lane_margin: 60.0,
            descent_rate: 240.0,
            platform_lifetime: None,
            camera_margin: 0.4,
            camera_alpha: 0.12,
            settle_speed: 2.0,
            settle_frames: 12,
            hit_animation_frames: 15,
            hit_shrink: 0.5,
            background: [168, 168, 168],
            ball_color: [247, 62, 62],
            platform_color: [61, 63, 65],
            carve_color: [255, 255, 255],
        }
    }
}

impl SceneConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        ron::from_str(&text).map_err(|e| Error::SceneConfig {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Left edge of the lane for a pitch: 0 at the left margin, 127 at
    /// the right.
    pub fn lane_x(&self, pitch: u8) -> f64 {
        let span = self.width as f64 - 2.0 * self.lane_margin - self.platform_width;
        self.lane_margin + pitch as f64 / 127.0 * span
    }
}
