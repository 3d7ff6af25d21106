//! Rotation applicator
//!
//! Rotates by the decided primitive angle with canvas expansion and checks
//! that quarter turns actually swapped width and height.

use super::types::{
    Interpolation, RotationDecision, RotationOptions, RotationOutcome,
    RotationVerificationWarning, ALPHA_OPAQUE,
};
use crate::buffer::ImageBuffer;
use image::{DynamicImage, Luma, LumaA, Pixel, Rgb, Rgba};
use tracing::{debug, warn};

type PixelBuffer<P> = image::ImageBuffer<P, Vec<u8>>;

/// Tolerance for treating an angle as an exact quarter turn
const QUARTER_TURN_EPSILON: f64 = 1e-9;

/// Rotation applicator
pub struct RotationApplicator;

impl RotationApplicator {
    /// Apply `decision` to `buffer`
    ///
    /// Returns the input untouched when the decision says not to rotate.
    pub fn apply(
        buffer: ImageBuffer,
        decision: &RotationDecision,
        options: &RotationOptions,
    ) -> RotationOutcome {
        if !decision.should_rotate {
            return RotationOutcome {
                buffer,
                rotated: false,
                verification: None,
            };
        }

        let before = buffer.dimensions();
        let angle = decision.applied_angle;
        let rotated = rotate_ccw(buffer.as_dynamic(), angle as f64, options);
        let rotated = ImageBuffer::new(rotated);
        let after = rotated.dimensions();

        let verification = verify_dimensions(angle, before, after);
        match &verification {
            Some(warning) => warn!(%warning, "rotation verification failed, continuing"),
            None => debug!(
                angle,
                before = ?before,
                after = ?after,
                "rotation verified"
            ),
        }

        RotationOutcome {
            buffer: rotated,
            rotated: true,
            verification,
        }
    }
}

/// Check dimensions after a quarter-turn rotation
///
/// Angles congruent to 90 mod 180 must swap width and height; multiples of
/// 180 must preserve them. Other angles are not checked.
pub fn verify_dimensions(
    applied_angle: i32,
    before: (u32, u32),
    after: (u32, u32),
) -> Option<RotationVerificationWarning> {
    let expected = match applied_angle.rem_euclid(180) {
        90 => (before.1, before.0),
        0 => before,
        _ => return None,
    };

    (after != expected).then_some(RotationVerificationWarning {
        applied_angle,
        before,
        after,
        expected,
    })
}

/// Rotate counter-clockwise by `degrees`, expanding the canvas to fit
///
/// Quarter turns are exact pixel permutations. Other angles resample onto
/// an expanded canvas filled with the background color. The color layout of
/// 8-bit inputs is preserved.
pub fn rotate_ccw(image: &DynamicImage, degrees: f64, options: &RotationOptions) -> DynamicImage {
    let normalized = degrees.rem_euclid(360.0);
    let quarter = (normalized / 90.0).round();
    if (normalized - quarter * 90.0).abs() < QUARTER_TURN_EPSILON {
        // The image crate's helpers turn clockwise
        return match quarter as u32 % 4 {
            0 => image.clone(),
            1 => image.rotate270(),
            2 => image.rotate180(),
            _ => image.rotate90(),
        };
    }

    // Expanded-canvas mapping below treats positive angles as clockwise
    let cw = -degrees;
    let [r, g, b] = options.background_color;
    let lum = luminance(r, g, b);
    let mode = options.interpolation;

    match image {
        DynamicImage::ImageLuma8(img) => {
            DynamicImage::ImageLuma8(rotate_expanded(img, cw, Luma([lum]), mode))
        }
        DynamicImage::ImageLumaA8(img) => DynamicImage::ImageLumaA8(rotate_expanded(
            img,
            cw,
            LumaA([lum, ALPHA_OPAQUE]),
            mode,
        )),
        DynamicImage::ImageRgb8(img) => {
            DynamicImage::ImageRgb8(rotate_expanded(img, cw, Rgb([r, g, b]), mode))
        }
        DynamicImage::ImageRgba8(img) => DynamicImage::ImageRgba8(rotate_expanded(
            img,
            cw,
            Rgba([r, g, b, ALPHA_OPAQUE]),
            mode,
        )),
        other if other.color().channel_count() == 1 => DynamicImage::ImageLuma8(rotate_expanded(
            &other.to_luma8(),
            cw,
            Luma([lum]),
            mode,
        )),
        other => DynamicImage::ImageRgba8(rotate_expanded(
            &other.to_rgba8(),
            cw,
            Rgba([r, g, b, ALPHA_OPAQUE]),
            mode,
        )),
    }
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u8
}

/// Clockwise rotation onto an expanded canvas
fn rotate_expanded<P>(
    img: &PixelBuffer<P>,
    angle_degrees: f64,
    fill: P,
    mode: Interpolation,
) -> PixelBuffer<P>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = img.dimensions();
    let angle_rad = angle_degrees.to_radians();
    let cos_a = angle_rad.cos();
    let sin_a = angle_rad.sin();

    let new_width = ((width as f64 * cos_a.abs()) + (height as f64 * sin_a.abs())).ceil() as u32;
    let new_height = ((width as f64 * sin_a.abs()) + (height as f64 * cos_a.abs())).ceil() as u32;

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let ncx = new_width as f64 / 2.0;
    let ncy = new_height as f64 / 2.0;

    let mut rotated = PixelBuffer::from_pixel(new_width, new_height, fill);
    if width == 0 || height == 0 {
        return rotated;
    }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    for ny in 0..new_height {
        for nx in 0..new_width {
            // Sample at pixel centers, map back to source coordinates
            let dx = nx as f64 + 0.5 - ncx;
            let dy = ny as f64 + 0.5 - ncy;
            let ox = dx * cos_a + dy * sin_a + cx - 0.5;
            let oy = -dx * sin_a + dy * cos_a + cy - 0.5;

            if ox >= -0.5 && ox <= max_x + 0.5 && oy >= -0.5 && oy <= max_y + 0.5 {
                let ox = ox.clamp(0.0, max_x);
                let oy = oy.clamp(0.0, max_y);
                let pixel = match mode {
                    Interpolation::Nearest => nearest_neighbor(img, ox, oy),
                    Interpolation::Bilinear => bilinear(img, ox, oy),
                };
                rotated.put_pixel(nx, ny, pixel);
            }
        }
    }

    rotated
}

fn nearest_neighbor<P>(img: &PixelBuffer<P>, x: f64, y: f64) -> P
where
    P: Pixel<Subpixel = u8> + 'static,
{
    *img.get_pixel(x.round() as u32, y.round() as u32)
}

fn bilinear<P>(img: &PixelBuffer<P>, x: f64, y: f64) -> P
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = img.dimensions();
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let dx = x - x0 as f64;
    let dy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = *p00;
    for (i, channel) in result.channels_mut().iter_mut().enumerate() {
        let v00 = p00.channels()[i] as f64;
        let v10 = p10.channels()[i] as f64;
        let v01 = p01.channels()[i] as f64;
        let v11 = p11.channels()[i] as f64;

        let v = v00 * (1.0 - dx) * (1.0 - dy)
            + v10 * dx * (1.0 - dy)
            + v01 * (1.0 - dx) * dy
            + v11 * dx * dy;

        *channel = v.round().clamp(0.0, 255.0) as u8;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ColorMode;
    use crate::rotation::{DecisionReason, RotationDecision};
    use image::{GenericImageView, GrayImage, RgbImage};

    fn rotate_decision(applied_angle: i32) -> RotationDecision {
        RotationDecision {
            should_rotate: true,
            applied_angle,
            rotate_degrees: Some((-applied_angle).rem_euclid(360) as u32),
            confidence: Some(1.0),
            threshold: 0.3,
            reason: DecisionReason::ConfidenceAboveThreshold,
        }
    }

    fn rgb_buffer(width: u32, height: u32) -> ImageBuffer {
        ImageBuffer::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb([200, 180, 160]),
        )))
    }

    fn gray_buffer(width: u32, height: u32) -> ImageBuffer {
        ImageBuffer::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            width,
            height,
            Luma([90]),
        )))
    }

    #[test]
    fn test_no_rotation_returns_input() {
        let input = rgb_buffer(30, 20);
        let decision = RotationDecision::no_rotation(DecisionReason::AlreadyUpright, 0.3);
        let outcome = RotationApplicator::apply(input.clone(), &decision, &RotationOptions::default());
        assert!(!outcome.rotated);
        assert_eq!(outcome.buffer, input);
        assert!(outcome.verification.is_none());
    }

    #[test]
    fn test_quarter_turns_swap_dimensions() {
        for angle in [-270, -90, 90, 270] {
            let outcome = RotationApplicator::apply(
                rgb_buffer(30, 20),
                &rotate_decision(angle),
                &RotationOptions::default(),
            );
            assert_eq!(outcome.buffer.dimensions(), (20, 30), "angle {}", angle);
            assert!(outcome.verification.is_none());
        }
    }

    #[test]
    fn test_half_turns_preserve_dimensions() {
        for angle in [-180, 180, 0, 360] {
            let outcome = RotationApplicator::apply(
                rgb_buffer(30, 20),
                &rotate_decision(angle),
                &RotationOptions::default(),
            );
            assert_eq!(outcome.buffer.dimensions(), (30, 20), "angle {}", angle);
            assert!(outcome.verification.is_none());
        }
    }

    #[test]
    fn test_single_channel_quarter_turn_swaps() {
        // Regression: grayscale input must swap exactly like color input
        for angle in [-90, -270] {
            let outcome = RotationApplicator::apply(
                gray_buffer(1052, 16),
                &rotate_decision(angle),
                &RotationOptions::default(),
            );
            assert_eq!(outcome.buffer.dimensions(), (16, 1052));
            assert_eq!(outcome.buffer.color_mode(), ColorMode::Gray);
            assert!(outcome.verification.is_none());
        }
    }

    #[test]
    fn test_ccw_direction() {
        // Marker at top-left; a 90 degree counter-clockwise turn moves it to bottom-left
        let mut img = RgbImage::from_pixel(4, 2, Rgb([255, 255, 255]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let rotated = rotate_ccw(&DynamicImage::ImageRgb8(img), 90.0, &RotationOptions::default());
        assert_eq!(rotated.dimensions(), (2, 4));
        assert_eq!(rotated.to_rgb8().get_pixel(0, 3), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_negative_270_equals_positive_90() {
        let mut img = RgbImage::from_pixel(5, 3, Rgb([255, 255, 255]));
        img.put_pixel(4, 0, Rgb([0, 0, 255]));
        let img = DynamicImage::ImageRgb8(img);
        let opts = RotationOptions::default();
        assert_eq!(rotate_ccw(&img, -270.0, &opts), rotate_ccw(&img, 90.0, &opts));
    }

    #[test]
    fn test_arbitrary_angle_expands_canvas() {
        let rotated = rotate_ccw(
            rgb_buffer(100, 50).as_dynamic(),
            30.0,
            &RotationOptions::default(),
        );
        let (w, h) = rotated.dimensions();
        // 100cos30 + 50sin30 = 111.6, 100sin30 + 50cos30 = 93.3
        assert_eq!((w, h), (112, 94));
        assert_eq!(rotated.color(), image::ColorType::Rgb8);
        // Corners are background
        assert_eq!(rotated.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
        // Center keeps the content color
        assert_eq!(rotated.to_rgb8().get_pixel(w / 2, h / 2), &Rgb([200, 180, 160]));
    }

    #[test]
    fn test_arbitrary_angle_keeps_grayscale() {
        let rotated = rotate_ccw(
            gray_buffer(40, 20).as_dynamic(),
            15.0,
            &RotationOptions::builder()
                .interpolation(Interpolation::Nearest)
                .build(),
        );
        assert_eq!(rotated.color(), image::ColorType::L8);
    }

    #[test]
    fn test_verify_dimensions() {
        assert!(verify_dimensions(-270, (1052, 1604), (1604, 1052)).is_none());
        assert!(verify_dimensions(-180, (1052, 1604), (1052, 1604)).is_none());
        assert!(verify_dimensions(30, (10, 10), (14, 14)).is_none());

        let warning = verify_dimensions(-90, (1052, 1604), (1052, 1604)).unwrap();
        assert_eq!(warning.expected, (1604, 1052));
        assert_eq!(warning.after, (1052, 1604));
        assert!(warning.to_string().contains("expected 1604x1052"));
    }

    #[test]
    fn test_rotate_preserves_pixels_count() {
        let outcome = RotationApplicator::apply(
            rgb_buffer(7, 3),
            &rotate_decision(-90),
            &RotationOptions::default(),
        );
        let (w, h) = outcome.buffer.dimensions();
        assert_eq!(w * h, 21);
    }
}
