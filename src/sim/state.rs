use crate::scene::SceneConfig;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

pub fn lerp(start: f64, end: f64, alpha: f64) -> f64 {
    start + (end - start) * alpha
}

/// A platform spawned by a note onset. Platforms are never removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    pub id: usize,
    /// Top-left corner in world pixels.
    pub position: Vec2,
    pub spawned_at_seconds: f64,
    /// Index of the spawning note in the extracted event sequence.
    pub spawned_by: usize,
}

impl Platform {
    pub fn is_active(&self, now: f64, config: &SceneConfig) -> bool {
        match config.platform_lifetime {
            Some(lifetime) => now < self.spawned_at_seconds + lifetime,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Exhausted,
}

/// The complete simulation state for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub frame_index: u64,
    pub time_seconds: f64,
    /// Ball top-left corner in world pixels.
    pub ball_position: Vec2,
    /// Pixels per second.
    pub ball_velocity: Vec2,
    pub camera_offset: Vec2,
    /// Platform id the ball is resting on, if any.
    pub resting_on: Option<usize>,
    /// Frames elapsed since the last platform contact.
    pub frames_since_contact: u32,
    pub settled_frames: u32,
    /// Cursor into the event sequence.
    pub next_event: usize,
    pub phase: Phase,
    pub platforms: Vec<Platform>,
    pub carve_path: Vec<Vec2>,
}

impl SimulationState {
    pub fn ball_center(&self, config: &SceneConfig) -> Vec2 {
        Vec2::new(
            self.ball_position.x + config.ball_size / 2.0,
            self.ball_position.y + config.ball_size / 2.0,
        )
    }

    pub fn active_platforms<'a>(
        &'a self,
        config: &'a SceneConfig,
    ) -> impl Iterator<Item = &'a Platform> {
        self.platforms
            .iter()
            .filter(move |p| p.is_active(self.time_seconds, config))
    }

    /// The part of a state the renderer needs. Platform and carve data
    /// are prefixes of the final state's vectors.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            index: self.frame_index,
            timestamp_seconds: self.time_seconds,
            ball_position: self.ball_position,
            camera_offset: self.camera_offset,
            frames_since_contact: self.frames_since_contact,
            platforms_len: self.platforms.len(),
            carve_len: self.carve_path.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    pub index: u64,
    pub timestamp_seconds: f64,
    pub ball_position: Vec2,
    pub camera_offset: Vec2,
    pub frames_since_contact: u32,
    pub platforms_len: usize,
    pub carve_len: usize,
}
