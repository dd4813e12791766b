use image::{imageops, RgbImage};

use crate::video::detect::FaceRegion;

/// Overwrite each detected region with a heavy Gaussian blur.
///
/// The blur is applied to the cropped region only, so a frame with zero
/// regions is byte-identical after this call. The sigma is kept large
/// relative to the minimum detectable region size, making the obfuscation
/// irreversible by simple sharpening.
pub fn blur_regions(frame: &mut RgbImage, regions: &[FaceRegion], sigma: f32) {
    for region in regions {
        let Some(r) = region.clamp_to(frame.width(), frame.height()) else {
            continue;
        };
        let roi = imageops::crop_imm(frame, r.x, r.y, r.width, r.height).to_image();
        let blurred = imageops::blur(&roi, sigma);
        imageops::replace(frame, &blurred, i64::from(r.x), i64::from(r.y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// A frame with enough structure that a blur must change pixel values.
    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_no_regions_leaves_frame_byte_identical() {
        let original = checkerboard(32, 32);
        let mut frame = original.clone();
        blur_regions(&mut frame, &[], 30.0);
        assert_eq!(frame.as_raw(), original.as_raw());
    }

    #[test]
    fn test_blur_changes_pixels_inside_region_only() {
        let original = checkerboard(64, 64);
        let mut frame = original.clone();
        let region = FaceRegion {
            x: 8,
            y: 8,
            width: 16,
            height: 16,
        };
        blur_regions(&mut frame, &[region], 5.0);

        // Inside the region at least one pixel changed.
        let mut changed_inside = false;
        for y in 8..24 {
            for x in 8..24 {
                if frame.get_pixel(x, y) != original.get_pixel(x, y) {
                    changed_inside = true;
                }
            }
        }
        assert!(changed_inside, "blur should alter the region");

        // Every pixel outside the region is untouched.
        for y in 0..64 {
            for x in 0..64 {
                let inside = (8..24).contains(&x) && (8..24).contains(&y);
                if !inside {
                    assert_eq!(
                        frame.get_pixel(x, y),
                        original.get_pixel(x, y),
                        "pixel outside region changed at ({}, {})",
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_region_overhanging_frame_edge_is_clipped() {
        let mut frame = checkerboard(32, 32);
        let region = FaceRegion {
            x: 24,
            y: 24,
            width: 100,
            height: 100,
        };
        // Must not panic; the region is clipped to the frame.
        blur_regions(&mut frame, &[region], 5.0);
        assert_eq!(frame.dimensions(), (32, 32));
    }

    #[test]
    fn test_region_fully_outside_frame_is_ignored() {
        let original = checkerboard(32, 32);
        let mut frame = original.clone();
        let region = FaceRegion {
            x: 40,
            y: 40,
            width: 10,
            height: 10,
        };
        blur_regions(&mut frame, &[region], 5.0);
        assert_eq!(frame.as_raw(), original.as_raw());
    }

    #[test]
    fn test_uniform_region_blurs_to_itself() {
        // A flat-color region is a fixed point of the blur.
        let mut frame = RgbImage::from_pixel(32, 32, Rgb([120, 130, 140]));
        let original = frame.clone();
        blur_regions(
            &mut frame,
            &[FaceRegion {
                x: 4,
                y: 4,
                width: 8,
                height: 8,
            }],
            10.0,
        );
        assert_eq!(frame.as_raw(), original.as_raw());
    }
}
