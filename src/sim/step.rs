use crate::events::NoteEvent;
use crate::scene::SceneConfig;
use crate::select::TrackPolicy;

use super::state::{Phase, Platform, SimulationState, Vec2, lerp};

/// Read-only inputs shared by every step of one run.
#[derive(Debug, Clone, Copy)]
pub struct SimParams<'a> {
    pub events: &'a [NoteEvent],
    pub policy: &'a TrackPolicy,
    pub config: &'a SceneConfig,
    pub frame_rate: u32,
    /// Shifts every animation trigger this many frames later.
    pub lead_in_frames: u32,
    pub max_frames: Option<u64>,
}

impl SimParams<'_> {
    pub fn dt(&self) -> f64 {
        1.0 / self.frame_rate as f64
    }

    pub fn lead_in_seconds(&self) -> f64 {
        self.lead_in_frames as f64 / self.frame_rate as f64
    }

    /// The frame whose window contains an onset: frame j covers
    /// [j/fps, (j+1)/fps), so a note at 0.0s lands in frame 0.
    pub fn onset_frame(&self, onset_seconds: f64) -> u64 {
        ((onset_seconds + self.lead_in_seconds()) * self.frame_rate as f64).floor() as u64
    }
}

/// State for frame 0. Onsets inside the first frame window already have
/// their platforms by the time this returns.
pub fn initial(params: &SimParams) -> SimulationState {
    let config = params.config;
    let mut state = SimulationState {
        frame_index: 0,
        time_seconds: 0.0,
        ball_position: Vec2::new(
            config.width as f64 / 2.0 - config.ball_size / 2.0,
            config.height as f64 / 2.0,
        ),
        ball_velocity: Vec2::new(config.ball_speed_x, 0.0),
        camera_offset: Vec2::default(),
        resting_on: None,
        frames_since_contact: u32::MAX,
        settled_frames: 0,
        next_event: 0,
        phase: Phase::Running,
        platforms: Vec::new(),
        carve_path: Vec::new(),
    };
    spawn_due_platforms(&mut state, params);
    resolve_collisions(&mut state, params);
    update_camera(&mut state, params);
    check_terminal(&mut state, params);
    state
}

/// Advances one fixed timestep. Consumes the predecessor and returns
/// the successor; nothing outside the state is read or written.
pub fn step(state: SimulationState, params: &SimParams) -> SimulationState {
    debug_assert_eq!(state.phase, Phase::Running);
    let mut next = state;
    next.frame_index += 1;
    next.time_seconds = next.frame_index as f64 / params.frame_rate as f64;
    integrate(&mut next, params);
    spawn_due_platforms(&mut next, params);
    resolve_collisions(&mut next, params);
    update_camera(&mut next, params);
    check_terminal(&mut next, params);
    next
}

// Gravity, unless the ball is resting on an active platform directly
// beneath it; resting trades gravity for horizontal friction.
fn integrate(state: &mut SimulationState, params: &SimParams) {
    let config = params.config;
    let dt = params.dt();

    if let Some(id) = state.resting_on {
        let platform = &state.platforms[id];
        let still_under = platform.is_active(state.time_seconds, config)
            && state.ball_position.x + config.ball_size > platform.position.x
            && state.ball_position.x < platform.position.x + config.platform_width;
        if still_under {
            state.ball_velocity.y = 0.0;
            state.ball_velocity.x *= config.friction;
            state.ball_position.x += state.ball_velocity.x * dt;
            state.ball_position.y = platform.position.y - config.ball_size;
            return;
        }
        state.resting_on = None;
    }

    state.ball_velocity.y += config.gravity * dt;
    state.ball_position.x += state.ball_velocity.x * dt;
    state.ball_position.y += state.ball_velocity.y * dt;
}

// Spawns a platform for every animated note whose lead-shifted onset
// falls inside the current frame window, in event order.
fn spawn_due_platforms(state: &mut SimulationState, params: &SimParams) {
    let config = params.config;
    let lead = params.lead_in_seconds();

    while let Some(event) = params.events.get(state.next_event) {
        if params.onset_frame(event.onset_seconds) > state.frame_index {
            break;
        }
        let effective_onset = event.onset_seconds + lead;
        if params.policy.animates(event.track_id) {
            let start_y = config.height as f64 / 2.0;
            state.platforms.push(Platform {
                id: state.platforms.len(),
                position: Vec2::new(
                    config.lane_x(event.pitch),
                    start_y + config.ball_size + effective_onset * config.descent_rate,
                ),
                spawned_at_seconds: state.time_seconds,
                spawned_by: state.next_event,
            });
        }
        state.next_event += 1;
    }
}

// AABB collision against the active platforms in spawn order, resolved
// on the side with the least overlap. First hit wins.
fn resolve_collisions(state: &mut SimulationState, params: &SimParams) {
    let config = params.config;
    let size = config.ball_size;
    let mut contact = None;

    for platform in state.platforms.iter() {
        if !platform.is_active(state.time_seconds, config) {
            continue;
        }
        let ball_left = state.ball_position.x;
        let ball_right = ball_left + size;
        let ball_top = state.ball_position.y;
        let ball_bottom = ball_top + size;

        let plat_left = platform.position.x;
        let plat_right = plat_left + config.platform_width;
        let plat_top = platform.position.y;
        let plat_bottom = plat_top + config.platform_height;

        if ball_right <= plat_left
            || ball_left >= plat_right
            || ball_bottom <= plat_top
            || ball_top >= plat_bottom
        {
            continue;
        }

        let overlap_left = ball_right - plat_left;
        let overlap_right = plat_right - ball_left;
        let overlap_top = ball_bottom - plat_top;
        let overlap_bottom = plat_bottom - ball_top;
        let min_overlap = overlap_left
            .min(overlap_right)
            .min(overlap_top)
            .min(overlap_bottom);

        if min_overlap == overlap_left {
            state.ball_velocity.x = -state.ball_velocity.x.abs();
            state.ball_position.x = plat_left - size;
        } else if min_overlap == overlap_right {
            state.ball_velocity.x = state.ball_velocity.x.abs();
            state.ball_position.x = plat_right;
        } else if min_overlap == overlap_top {
            state.ball_position.y = plat_top - size;
            if state.ball_velocity.y.abs() <= config.rest_speed {
                state.ball_velocity.y = 0.0;
                state.resting_on = Some(platform.id);
            } else {
                state.ball_velocity.y = -(state.ball_velocity.y.abs() * config.restitution);
            }
        } else {
            state.ball_velocity.y = state.ball_velocity.y.abs();
            state.ball_position.y = plat_bottom;
        }

        contact = Some(Vec2::new(
            state.ball_position.x + size / 2.0,
            state.ball_position.y + size / 2.0,
        ));
        break;
    }

    match contact {
        Some(point) => {
            state.carve_path.push(point);
            state.frames_since_contact = 0;
        }
        None => state.frames_since_contact = state.frames_since_contact.saturating_add(1),
    }
}

// Keeps the ball inside the camera's comfort box, lerp-smoothed.
fn update_camera(state: &mut SimulationState, params: &SimParams) {
    let config = params.config;
    let width = config.width as f64;
    let height = config.height as f64;
    let edge_x = width * config.camera_margin;
    let edge_y = height * config.camera_margin;

    let mut desired = state.camera_offset;
    let ball = state.ball_position;
    if ball.x - desired.x < edge_x {
        desired.x = ball.x - edge_x;
    } else if ball.x - desired.x > width - edge_x {
        desired.x = ball.x - (width - edge_x);
    }
    if ball.y - desired.y < edge_y {
        desired.y = ball.y - edge_y;
    } else if ball.y - desired.y > height - edge_y {
        desired.y = ball.y - (height - edge_y);
    }

    state.camera_offset.x = lerp(state.camera_offset.x, desired.x, config.camera_alpha);
    state.camera_offset.y = lerp(state.camera_offset.y, desired.y, config.camera_alpha);
}

fn check_terminal(state: &mut SimulationState, params: &SimParams) {
    if let Some(max_frames) = params.max_frames {
        if state.frame_index + 1 >= max_frames {
            state.phase = Phase::Exhausted;
            return;
        }
    }

    let v = state.ball_velocity;
    let speed = (v.x * v.x + v.y * v.y).sqrt();
    if state.next_event >= params.events.len() && speed < params.config.settle_speed {
        state.settled_frames += 1;
        if state.settled_frames >= params.config.settle_frames {
            state.phase = Phase::Exhausted;
        }
    } else {
        state.settled_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn note(track_id: usize, pitch: u8, onset: f64) -> NoteEvent {
        NoteEvent {
            track_id,
            pitch,
            velocity: 100,
            onset_seconds: onset,
            duration_seconds: 0.5,
        }
    }

    fn policy(animate: &[usize]) -> TrackPolicy {
        TrackPolicy {
            animate_tracks: BTreeSet::from_iter(animate.iter().copied()),
            ..Default::default()
        }
    }

    fn run(params: &SimParams) -> Vec<SimulationState> {
        let mut states = vec![initial(params)];
        while states.last().is_some_and(|s| s.phase == Phase::Running) {
            let prev = states.last().cloned().unwrap();
            states.push(step(prev, params));
        }
        states
    }

    #[test]
    fn onset_at_zero_spawns_in_frame_zero() {
        // Two tracks, only track 0 animated: the pitch-60 platform must
        // exist from frame 0 and pitch 64 must never appear.
        let events = vec![note(0, 60, 0.0), note(1, 64, 0.5)];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(60),
        };

        let states = run(&params);
        assert_eq!(states[0].platforms.len(), 1);
        assert_eq!(states[0].platforms[0].spawned_by, 0);
        let last = states.last().unwrap();
        assert_eq!(last.platforms.len(), 1, "non-animated track spawned");
    }

    #[test]
    fn onset_maps_to_floor_of_onset_times_fps() {
        let events = vec![note(0, 64, 0.5)];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(40),
        };
        assert_eq!(params.onset_frame(0.5), 15);

        let states = run(&params);
        assert!(states[14].platforms.is_empty());
        assert_eq!(states[15].platforms.len(), 1);
    }

    #[test]
    fn lead_in_shifts_spawns() {
        let events = vec![note(0, 60, 0.0)];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 15,
            max_frames: Some(40),
        };
        let states = run(&params);
        assert!(states[14].platforms.is_empty());
        assert_eq!(states[15].platforms.len(), 1);
    }

    #[test]
    fn empty_animate_set_is_pure_free_fall() {
        let events = vec![note(0, 60, 0.0), note(1, 64, 0.5)];
        let p = policy(&[]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(90),
        };

        let states = run(&params);
        let last = states.last().unwrap();
        assert!(last.platforms.is_empty());
        assert!(last.carve_path.is_empty());
        // Strictly accelerating downward the whole way.
        for pair in states.windows(2) {
            assert!(pair[1].ball_velocity.y > pair[0].ball_velocity.y);
            assert!(pair[1].ball_position.y > pair[0].ball_position.y);
        }
    }

    #[test]
    fn max_frames_caps_the_run_exactly() {
        let events = vec![note(0, 60, 0.0)];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(10),
        };

        let states = run(&params);
        assert_eq!(states.len(), 10);
        assert_eq!(states.last().unwrap().phase, Phase::Exhausted);
    }

    #[test]
    fn timestamps_are_frame_index_over_rate() {
        let events = vec![];
        let p = policy(&[]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(48),
        };
        for (i, state) in run(&params).iter().enumerate() {
            assert_eq!(state.frame_index, i as u64);
            assert_eq!(state.time_seconds, i as f64 / 30.0);
        }
    }

    #[test]
    fn ball_settles_once_events_run_out() {
        // One note right under the drop point: the ball bounces out its
        // energy, rests, and the run exhausts well before the cap.
        let events = vec![note(0, 60, 0.0)];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(1000),
        };

        let states = run(&params);
        let last = states.last().unwrap();
        assert_eq!(last.phase, Phase::Exhausted);
        assert!(states.len() < 1000, "never settled");
        assert_eq!(last.resting_on, Some(0));
        assert!(!last.carve_path.is_empty());
        assert_eq!(last.ball_velocity.y, 0.0);
    }

    #[test]
    fn same_frame_spawns_follow_event_order() {
        // Both onsets land in frame 0 at 30 fps.
        let events = vec![note(0, 60, 0.0), note(0, 72, 0.01)];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 30,
            lead_in_frames: 0,
            max_frames: Some(5),
        };
        let first = initial(&params);
        assert_eq!(first.platforms.len(), 2);
        assert_eq!(first.platforms[0].spawned_by, 0);
        assert_eq!(first.platforms[1].spawned_by, 1);
        assert_eq!(first.platforms[0].id, 0);
    }

    #[test]
    fn identical_inputs_replay_identically() {
        let events = vec![
            note(0, 55, 0.0),
            note(0, 67, 0.4),
            note(0, 62, 0.9),
            note(0, 71, 1.3),
        ];
        let p = policy(&[0]);
        let config = SceneConfig::default();
        let params = SimParams {
            events: &events,
            policy: &p,
            config: &config,
            frame_rate: 60,
            lead_in_frames: 0,
            max_frames: Some(240),
        };

        let a = run(&params);
        let b = run(&params);
        assert_eq!(a.len(), b.len());
        let (fa, fb) = (a.last().unwrap(), b.last().unwrap());
        assert_eq!(fa.platforms, fb.platforms);
        assert_eq!(fa.carve_path, fb.carve_path);
        assert_eq!(fa.ball_position, fb.ball_position);
    }
}
