use image::{Rgb, RgbImage};

/// Fills an axis-aligned rectangle, clipped to the image bounds.
pub fn fill_rect(image: &mut RgbImage, x: f64, y: f64, w: f64, h: f64, color: Rgb<u8>) {
    let (iw, ih) = (image.width() as i64, image.height() as i64);
    let x0 = (x.floor() as i64).max(0);
    let y0 = (y.floor() as i64).max(0);
    let x1 = ((x + w).ceil() as i64).min(iw);
    let y1 = ((y + h).ceil() as i64).min(ih);
    for py in y0..y1 {
        for px in x0..x1 {
            image.put_pixel(px as u32, py as u32, color);
        }
    }
}

/// Outlines a rectangle with a border of `thickness` pixels.
pub fn stroke_rect(
    image: &mut RgbImage,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    thickness: f64,
    color: Rgb<u8>,
) {
    fill_rect(image, x, y, w, thickness, color);
    fill_rect(image, x, y + h - thickness, w, thickness, color);
    fill_rect(image, x, y, thickness, h, color);
    fill_rect(image, x + w - thickness, y, thickness, h, color);
}

/// Steps one pixel at a time, stamping a square of `radius` at each
/// step.
pub fn draw_line(
    image: &mut RgbImage,
    from: (f64, f64),
    to: (f64, f64),
    radius: f64,
    color: Rgb<u8>,
) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let cx = from.0 + dx * t;
        let cy = from.1 + dy * t;
        fill_rect(
            image,
            cx - radius,
            cy - radius,
            radius * 2.0,
            radius * 2.0,
            color,
        );
    }
}

pub fn brighten(color: [u8; 3], increase: u8) -> Rgb<u8> {
    Rgb([
        color[0].saturating_add(increase),
        color[1].saturating_add(increase),
        color[2].saturating_add(increase),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_clips_to_bounds() {
        let mut image = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        fill_rect(&mut image, -4.0, -4.0, 100.0, 100.0, Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(7, 7), Rgb([255, 0, 0]));
    }

    #[test]
    fn draw_line_touches_both_endpoints() {
        let mut image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        draw_line(&mut image, (2.0, 2.0), (13.0, 13.0), 1.0, Rgb([0, 255, 0]));
        assert_eq!(*image.get_pixel(2, 2), Rgb([0, 255, 0]));
        assert_eq!(*image.get_pixel(13, 13), Rgb([0, 255, 0]));
    }

    #[test]
    fn brighten_saturates() {
        assert_eq!(brighten([250, 10, 0], 20), Rgb([255, 30, 20]));
    }
}
