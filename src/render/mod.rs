mod draw;

use image::{Rgb, RgbImage};

use crate::scene::SceneConfig;
use crate::sim::{FrameSnapshot, Platform, Vec2};

pub use draw::brighten;

/// One finished video frame.
pub struct Frame {
    pub index: u64,
    pub timestamp_seconds: f64,
    pub image: RgbImage,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub show_carve: bool,
    pub show_platform: bool,
}

/// Draws simulation snapshots. Holds only shared read-only data from
/// the finished run; each snapshot renders the prefix that existed on
/// its frame.
pub struct FrameRenderer<'a> {
    config: &'a SceneConfig,
    options: RenderOptions,
    platforms: &'a [Platform],
    carve_path: &'a [Vec2],
}

impl<'a> FrameRenderer<'a> {
    pub fn new(
        config: &'a SceneConfig,
        options: RenderOptions,
        platforms: &'a [Platform],
        carve_path: &'a [Vec2],
    ) -> Self {
        Self {
            config,
            options,
            platforms,
            carve_path,
        }
    }

    pub fn render(&self, snapshot: &FrameSnapshot) -> Frame {
        let config = self.config;
        let mut image = RgbImage::from_pixel(config.width, config.height, Rgb(config.background));
        let cam = snapshot.camera_offset;

        let spawned = &self.platforms[..snapshot.platforms_len];

        if self.options.show_platform {
            let marker = brighten(config.platform_color, 60);
            for platform in spawned {
                draw::stroke_rect(
                    &mut image,
                    platform.position.x - cam.x - 3.0,
                    platform.position.y - cam.y - 3.0,
                    config.platform_width + 6.0,
                    config.platform_height + 6.0,
                    2.0,
                    marker,
                );
            }
        }

        for platform in spawned {
            if !platform.is_active(snapshot.timestamp_seconds, config) {
                continue;
            }
            draw::fill_rect(
                &mut image,
                platform.position.x - cam.x,
                platform.position.y - cam.y,
                config.platform_width,
                config.platform_height,
                Rgb(config.platform_color),
            );
        }

        if self.options.show_carve {
            let carve = &self.carve_path[..snapshot.carve_len];
            let color = Rgb(config.carve_color);
            for pair in carve.windows(2) {
                draw::draw_line(
                    &mut image,
                    (pair[0].x - cam.x, pair[0].y - cam.y),
                    (pair[1].x - cam.x, pair[1].y - cam.y),
                    2.0,
                    color,
                );
            }
            if carve.len() == 1 {
                draw::fill_rect(&mut image, carve[0].x - cam.x - 2.0, carve[0].y - cam.y - 2.0, 4.0, 4.0, color);
            }
        }

        let size = config.ball_size * throb_factor(snapshot.frames_since_contact, config);
        let inset = (config.ball_size - size) / 2.0;
        draw::fill_rect(
            &mut image,
            snapshot.ball_position.x - cam.x + inset,
            snapshot.ball_position.y - cam.y + inset,
            size,
            size,
            Rgb(config.ball_color),
        );

        Frame {
            index: snapshot.index,
            timestamp_seconds: snapshot.timestamp_seconds,
            image,
        }
    }
}

// Triangular size wobble for a few frames after a platform contact.
fn throb_factor(frames_since_contact: u32, config: &SceneConfig) -> f64 {
    let length = config.hit_animation_frames;
    if length == 0 || frames_since_contact >= length {
        return 1.0;
    }
    let remaining = (length - frames_since_contact) as i64;
    let width = length as i64 * 2;
    let midpoint = width / 2;
    let position = ((-remaining - 1).rem_euclid(width) - midpoint).abs() as f64;
    let throb = length as f64 / 2.0 - position;
    1.0 - config.hit_shrink * (throb / length as f64)
}
