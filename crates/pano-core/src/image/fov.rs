//! Conversions between field of view, focal length and crop factor.
//!
//! The sensor is modelled as a 35mm-equivalent diagonal divided by the crop factor, with the
//! aspect ratio of the image. Each image projection has its own closed form.

use log::warn;

use super::{var, Projection, SrcPanoImage};
use crate::{Real, Size2D};

/// Diagonal of a 36×24mm frame.
pub const FULL_FRAME_DIAGONAL: Real = 43.266_615_305_567_875;

/// Thoby fisheye constants, `r = K1 · f · sin(K2 · θ)`.
const THOBY_K1: Real = 1.47;
const THOBY_K2: Real = 0.713;

/// Sensor width in mm for a crop factor and image aspect ratio.
fn sensor_width(crop: Real, size: Size2D) -> Option<Real> {
    if crop <= 0.0 || size.is_empty() {
        return None;
    }
    let diag = FULL_FRAME_DIAGONAL / crop;
    let r = size.aspect();
    Some(diag / (1.0 + 1.0 / (r * r)).sqrt())
}

fn finite_positive(v: Real) -> Option<Real> {
    (v.is_finite() && v > 0.0).then_some(v)
}

/// Horizontal field of view in degrees.
///
/// Returns 360 and logs a warning when the inputs are degenerate or outside the domain
/// of the projection formula.
pub fn calc_hfov(projection: Projection, focal_length: Real, crop: Real, size: Size2D) -> Real {
    let hfov = sensor_width(crop, size)
        .filter(|_| focal_length > 0.0)
        .and_then(|sx| {
            let f = focal_length;
            let rad = match projection {
                Projection::Rectilinear => 2.0 * (sx / (2.0 * f)).atan(),
                Projection::Panoramic
                | Projection::CircularFisheye
                | Projection::FullFrameFisheye
                | Projection::Equirectangular => sx / f,
                Projection::FisheyeOrthographic => asin_checked(sx / (2.0 * f))? * 2.0,
                Projection::FisheyeStereographic => 4.0 * (sx / (4.0 * f)).atan(),
                Projection::FisheyeEquisolid => asin_checked(sx / (4.0 * f))? * 4.0,
                Projection::FisheyeThoby => {
                    2.0 * asin_checked(sx / (2.0 * THOBY_K1 * f))? / THOBY_K2
                }
            };
            finite_positive(rad.to_degrees())
        });
    hfov.unwrap_or_else(|| {
        warn!(
            "cannot compute hfov for {projection:?}, focal length {focal_length}, crop {crop}, size {}x{}",
            size.width, size.height
        );
        360.0
    })
}

/// Focal length in mm; 0 with a warning when it cannot be computed.
pub fn calc_focal_length(projection: Projection, hfov: Real, crop: Real, size: Size2D) -> Real {
    let fl = sensor_width(crop, size)
        .filter(|_| hfov > 0.0)
        .and_then(|sx| {
            let h = hfov.to_radians();
            let f = match projection {
                Projection::Rectilinear => sx / 2.0 / (h / 2.0).tan(),
                Projection::Panoramic
                | Projection::CircularFisheye
                | Projection::FullFrameFisheye
                | Projection::Equirectangular => sx / h,
                Projection::FisheyeOrthographic => sx / (2.0 * (h / 2.0).sin()),
                Projection::FisheyeStereographic => sx / (4.0 * (h / 4.0).tan()),
                Projection::FisheyeEquisolid => sx / (4.0 * (h / 4.0).sin()),
                Projection::FisheyeThoby => sx / (2.0 * THOBY_K1 * (THOBY_K2 * h / 2.0).sin()),
            };
            finite_positive(f)
        });
    fl.unwrap_or_else(|| {
        warn!("cannot compute focal length for {projection:?}, hfov {hfov}, crop {crop}");
        0.0
    })
}

/// Crop factor matching `hfov` at `focal_length`; 0 with a warning when undefined.
pub fn calc_crop_factor(projection: Projection, hfov: Real, focal_length: Real, size: Size2D) -> Real {
    let crop = (hfov > 0.0 && focal_length > 0.0 && !size.is_empty())
        .then(|| {
            let h = hfov.to_radians();
            let f = focal_length;
            let sx = match projection {
                Projection::Rectilinear => 2.0 * f * (h / 2.0).tan(),
                Projection::Panoramic
                | Projection::CircularFisheye
                | Projection::FullFrameFisheye
                | Projection::Equirectangular => f * h,
                Projection::FisheyeOrthographic => 2.0 * f * (h / 2.0).sin(),
                Projection::FisheyeStereographic => 4.0 * f * (h / 4.0).tan(),
                Projection::FisheyeEquisolid => 4.0 * f * (h / 4.0).sin(),
                Projection::FisheyeThoby => 2.0 * THOBY_K1 * f * (THOBY_K2 * h / 2.0).sin(),
            };
            let r = size.aspect();
            let diag = sx * (1.0 + 1.0 / (r * r)).sqrt();
            FULL_FRAME_DIAGONAL / diag
        })
        .and_then(finite_positive);
    crop.unwrap_or_else(|| {
        warn!("cannot compute crop factor for {projection:?}, hfov {hfov}, focal length {focal_length}");
        0.0
    })
}

fn asin_checked(v: Real) -> Option<Real> {
    (-1.0..=1.0).contains(&v).then(|| v.asin())
}

impl SrcPanoImage {
    /// Focal length from the current HFOV and EXIF crop factor.
    pub fn focal_length(&self) -> Real {
        calc_focal_length(
            self.projection(),
            self.hfov(),
            self.get::<var::ExifCropFactor>(),
            self.size(),
        )
    }

    /// Set HFOV from a focal length at the current crop factor.
    pub fn update_focal_length(&mut self, focal_length: Real) {
        let hfov = calc_hfov(
            self.projection(),
            focal_length,
            self.get::<var::ExifCropFactor>(),
            self.size(),
        );
        self.set::<var::Hfov>(hfov);
    }

    /// Change the crop factor keeping the focal length; HFOV follows.
    pub fn update_crop_factor(&mut self, crop: Real) {
        let focal_length = self.focal_length();
        self.set::<var::ExifCropFactor>(crop);
        if focal_length > 0.0 {
            self.update_focal_length(focal_length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: Size2D = Size2D::new(3000, 2000);

    #[test]
    fn rectilinear_full_frame() {
        // 36mm wide sensor at 18mm covers 90 degrees
        let hfov = calc_hfov(Projection::Rectilinear, 18.0, 1.0, SIZE);
        assert!((hfov - 90.0).abs() < 1e-9, "hfov {hfov}");
    }

    #[test]
    fn hfov_and_focal_length_are_inverse() {
        for projection in Projection::ALL {
            for fl in [8.0, 10.5, 24.0, 50.0] {
                let hfov = calc_hfov(projection, fl, 1.6, SIZE);
                if hfov == 360.0 {
                    continue;
                }
                let back = calc_focal_length(projection, hfov, 1.6, SIZE);
                assert!((back - fl).abs() < 1e-9, "{projection:?}: {fl} -> {hfov} -> {back}");
            }
        }
        for projection in [
            Projection::Rectilinear,
            Projection::CircularFisheye,
            Projection::FullFrameFisheye,
        ] {
            let hfov = calc_hfov(projection, 10.5, 1.5, SIZE);
            assert!(hfov < 360.0);
            let back = calc_focal_length(projection, hfov, 1.5, SIZE);
            assert!((back - 10.5).abs() < 1e-9);
        }
    }

    #[test]
    fn crop_factor_is_consistent() {
        for projection in Projection::ALL {
            let hfov = calc_hfov(projection, 24.0, 1.5, SIZE);
            let crop = calc_crop_factor(projection, hfov, 24.0, SIZE);
            assert!((crop - 1.5).abs() < 1e-9, "{projection:?}: {crop}");
        }
    }

    #[test]
    fn degenerate_inputs_give_sentinels() {
        assert_eq!(calc_hfov(Projection::Rectilinear, 0.0, 1.0, SIZE), 360.0);
        assert_eq!(calc_hfov(Projection::Rectilinear, 18.0, 0.0, SIZE), 360.0);
        assert_eq!(calc_hfov(Projection::FisheyeOrthographic, 1.0, 1.0, SIZE), 360.0);
        assert_eq!(calc_focal_length(Projection::Rectilinear, 0.0, 1.0, SIZE), 0.0);
        assert_eq!(calc_crop_factor(Projection::Rectilinear, 90.0, 18.0, Size2D::default()), 0.0);
    }

    #[test]
    fn crop_factor_update_keeps_focal_length() {
        let mut img = SrcPanoImage::new("a.jpg", SIZE);
        img.set::<var::ExifCropFactor>(1.0);
        img.update_focal_length(18.0);
        assert!((img.hfov() - 90.0).abs() < 1e-9);
        img.update_crop_factor(2.0);
        assert!((img.focal_length() - 18.0).abs() < 1e-9);
        assert!(img.hfov() < 90.0);
    }
}
