mod state;
mod step;

pub use state::{FrameSnapshot, Phase, Platform, SimulationState, Vec2, lerp};
pub use step::{SimParams, initial, step};
