use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::{MaskPolygon, MaskType, Real, Rect2D, Size2D, Vec2};

mod codes;
mod exif;
mod fov;
mod lensdb;
mod variables;

pub use codes::*;
pub use exif::*;
pub use fov::*;
pub use lensdb::*;
pub use variables::*;

/// Lens projection of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    #[default]
    Rectilinear,
    Panoramic,
    CircularFisheye,
    FullFrameFisheye,
    Equirectangular,
    FisheyeOrthographic,
    FisheyeStereographic,
    FisheyeEquisolid,
    FisheyeThoby,
}

impl Projection {
    pub const ALL: [Projection; 9] = [
        Projection::Rectilinear,
        Projection::Panoramic,
        Projection::CircularFisheye,
        Projection::FullFrameFisheye,
        Projection::Equirectangular,
        Projection::FisheyeOrthographic,
        Projection::FisheyeStereographic,
        Projection::FisheyeEquisolid,
        Projection::FisheyeThoby,
    ];

    /// Numeric code used in PTO `f` fields.
    pub fn code(self) -> i32 {
        match self {
            Self::Rectilinear => 0,
            Self::Panoramic => 1,
            Self::CircularFisheye => 2,
            Self::FullFrameFisheye => 3,
            Self::Equirectangular => 4,
            Self::FisheyeOrthographic => 8,
            Self::FisheyeStereographic => 10,
            Self::FisheyeEquisolid => 21,
            Self::FisheyeThoby => 20,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| i64::from(p.code()) == code)
    }
}

/// Shape of the usable image area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    #[default]
    NoCrop,
    Rectangle,
    Circle,
}

/// Camera response model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    #[default]
    Emor,
    Linear,
    Gamma,
    File,
    Icc,
}

impl ResponseType {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Emor,
            1 => Self::Linear,
            2 => Self::Gamma,
            3 => Self::File,
            4 => Self::Icc,
            _ => return None,
        })
    }
}

/// Vignetting correction flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VigCorrMode(pub u32);

impl VigCorrMode {
    pub const NONE: Self = Self(0);
    pub const RADIAL: Self = Self(1);
    pub const FLATFIELD: Self = Self(2);
    /// Divide by the vignetting curve instead of adding it.
    pub const DIV: Self = Self(4);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for VigCorrMode {
    fn default() -> Self {
        Self::RADIAL | Self::DIV
    }
}

impl BitOr for VigCorrMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Inset of the crop region when clipping positive masks.
const MASK_CROP_BORDER: i32 = 2;

impl SrcPanoImage {
    /// Image with a file name and pixel size; everything else at defaults.
    pub fn new(filename: impl Into<String>, size: Size2D) -> Self {
        let mut img = Self::default();
        img.set::<var::Filename>(filename.into());
        img.set::<var::Size>(size);
        img
    }

    pub fn filename(&self) -> String {
        self.get::<var::Filename>()
    }

    pub fn size(&self) -> Size2D {
        self.get::<var::Size>()
    }

    pub fn projection(&self) -> Projection {
        self.get::<var::Projection>()
    }

    pub fn hfov(&self) -> Real {
        self.get::<var::Hfov>()
    }

    pub fn crop_mode(&self) -> CropMode {
        self.get::<var::CropMode>()
    }

    pub fn crop_rect(&self) -> Rect2D {
        self.get::<var::CropRect>()
    }

    pub fn is_active(&self) -> bool {
        self.get::<var::Active>()
    }

    /// Change the pixel size and rescale every pixel-space quantity.
    ///
    /// Shifts, shear and crop scale by `new.width / old.width`. A rectangular crop is
    /// intersected with the new bounds; a circular one is only scaled.
    pub fn resize(&mut self, size: Size2D) {
        let old = self.size();
        if old.width == 0 || old == size {
            self.set::<var::Size>(size);
            return;
        }
        let scale = Real::from(size.width) / Real::from(old.width);
        self.update::<var::RadialDistortionCenterShift>(|v| *v *= scale);
        self.update::<var::Shear>(|v| *v *= scale);
        self.update::<var::RadialVigCorrCenterShift>(|v| *v *= scale);
        match self.crop_mode() {
            CropMode::NoCrop => self.set::<var::CropRect>(Rect2D::from_size(size)),
            CropMode::Rectangle => {
                let r = self.crop_rect().scaled(scale).intersect(&Rect2D::from_size(size));
                self.set::<var::CropRect>(r);
            }
            CropMode::Circle => {
                let r = self.crop_rect().scaled(scale);
                self.set::<var::CropRect>(r);
            }
        }
        self.update::<var::Masks>(|masks| {
            for m in masks.iter_mut() {
                m.scale(scale, scale);
            }
        });
        self.update::<var::ActiveMasks>(|masks| {
            for m in masks.iter_mut() {
                m.scale(scale, scale);
            }
        });
        self.set::<var::Size>(size);
    }

    /// True if `p` lies in the crop region and, unless `ignore_masks`, outside every active mask.
    pub fn is_inside(&self, p: &Vec2, ignore_masks: bool) -> bool {
        let inside_crop = match self.crop_mode() {
            CropMode::NoCrop | CropMode::Rectangle => self.crop_rect().contains(p),
            CropMode::Circle => {
                let size = self.size();
                if p.x < 0.0
                    || p.y < 0.0
                    || p.x >= Real::from(size.width)
                    || p.y >= Real::from(size.height)
                {
                    return false;
                }
                let crop = self.crop_rect();
                let radius = Real::from(crop.width().min(crop.height())) / 2.0;
                (p - crop.center()).norm_squared() < radius * radius
            }
        };
        inside_crop && (ignore_masks || !self.is_inside_masks(p))
    }

    /// True when the projection defaults to a circular crop.
    pub fn is_circular_crop(&self) -> bool {
        matches!(
            self.projection(),
            Projection::CircularFisheye | Projection::FisheyeOrthographic | Projection::FisheyeThoby
        )
    }

    /// Derive the crop mode from the crop rectangle and projection.
    pub fn update_crop_mode(&mut self) {
        let r = self.crop_rect();
        let mode = if r.is_empty() || r == Rect2D::from_size(self.size()) {
            CropMode::NoCrop
        } else if self.is_circular_crop() {
            CropMode::Circle
        } else {
            CropMode::Rectangle
        };
        if mode != self.crop_mode() {
            self.set::<var::CropMode>(mode);
        }
    }

    /// Move the crop rectangle so it is centered on the distortion center.
    pub fn center_crop(&mut self) {
        if self.crop_mode() == CropMode::NoCrop {
            return;
        }
        let center = self.radial_distortion_center();
        let r = self.crop_rect();
        let c = r.center();
        let dx = (center.x - c.x).round() as i32;
        let dy = (center.y - c.y).round() as i32;
        if dx != 0 || dy != 0 {
            self.set::<var::CropRect>(r.move_by(dx, dy));
        }
    }

    /// Crop region shrunk by a small border, as used when clipping positive masks.
    pub fn mask_clip(&self, mask: &mut MaskPolygon) -> bool {
        match self.crop_mode() {
            CropMode::Circle => {
                let r = self.crop_rect();
                let radius = Real::from(r.width().min(r.height())) / 2.0 - Real::from(MASK_CROP_BORDER);
                mask.clip_polygon_circle(&r.center(), radius)
            }
            _ => mask.clip_polygon(&self.crop_rect().expanded(-MASK_CROP_BORDER)),
        }
    }

    pub fn radial_distortion_center(&self) -> Vec2 {
        self.size().as_vec2() / 2.0 + self.get::<var::RadialDistortionCenterShift>()
    }

    pub fn radial_vig_corr_center(&self) -> Vec2 {
        (self.size().as_vec2() - Vec2::new(1.0, 1.0)) / 2.0
            + self.get::<var::RadialVigCorrCenterShift>()
    }

    /// Linear exposure factor, `1 / 2^EV`.
    pub fn exposure(&self) -> Real {
        1.0 / self.get::<var::ExposureValue>().exp2()
    }

    pub fn set_exposure(&mut self, exposure: Real) {
        if exposure > 0.0 {
            self.set::<var::ExposureValue>(-exposure.log2());
        }
    }

    /// True if red or blue distortion differs from the identity polynomial.
    pub fn correct_tca(&self) -> bool {
        let identity = [0.0, 0.0, 0.0, 1.0];
        self.get::<var::RadialDistortionRed>() != identity
            || self.get::<var::RadialDistortionBlue>() != identity
    }

    /// True if shear is set.
    pub fn horizontal_warp_needed(&self) -> bool {
        self.get::<var::Shear>() != Vec2::zeros()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Masks
    // ─────────────────────────────────────────────────────────────────────────

    pub fn has_masks(&self) -> bool {
        self.with::<var::Masks, _>(|m| !m.is_empty())
    }

    pub fn has_positive_masks(&self) -> bool {
        self.with::<var::Masks, _>(|m| m.iter().any(MaskPolygon::is_positive))
    }

    pub fn has_active_masks(&self) -> bool {
        self.with::<var::ActiveMasks, _>(|m| !m.is_empty())
    }

    pub fn add_mask(&mut self, mask: MaskPolygon) {
        self.update::<var::Masks>(|m| m.push(mask));
    }

    pub fn add_active_mask(&mut self, mask: MaskPolygon) {
        self.update::<var::ActiveMasks>(|m| m.push(mask));
    }

    pub fn clear_masks(&mut self) {
        self.set::<var::Masks>(Vec::new());
    }

    pub fn clear_active_masks(&mut self) {
        self.set::<var::ActiveMasks>(Vec::new());
    }

    /// Remove mask `index`; out-of-range indices are ignored.
    pub fn delete_mask(&mut self, index: usize) {
        self.update::<var::Masks>(|m| {
            if index < m.len() {
                m.remove(index);
            }
        });
    }

    pub fn change_mask_type(&mut self, index: usize, mask_type: MaskType) {
        self.update::<var::Masks>(|m| {
            if let Some(mask) = m.get_mut(index) {
                mask.set_mask_type(mask_type);
            }
        });
    }

    /// True if `p` is covered by any active mask.
    pub fn is_inside_masks(&self, p: &Vec2) -> bool {
        self.with::<var::ActiveMasks, _>(|masks| masks.iter().any(|m| m.is_inside(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_scales_pixel_quantities() {
        let mut img = SrcPanoImage::new("a.jpg", Size2D::new(2000, 1000));
        img.set::<var::RadialDistortionCenterShift>(Vec2::new(10.0, -4.0));
        img.set::<var::Shear>(Vec2::new(0.2, 0.4));
        img.set::<var::RadialVigCorrCenterShift>(Vec2::new(6.0, 8.0));
        img.set::<var::CropMode>(CropMode::Rectangle);
        img.set::<var::CropRect>(Rect2D::new(100, 50, 1900, 950));
        img.add_mask(MaskPolygon::new(
            MaskType::Negative,
            vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0), Vec2::new(100.0, 100.0)],
        ));

        img.resize(Size2D::new(1000, 500));

        assert_eq!(img.size(), Size2D::new(1000, 500));
        assert_eq!(img.get::<var::RadialDistortionCenterShift>(), Vec2::new(5.0, -2.0));
        assert_eq!(img.get::<var::Shear>(), Vec2::new(0.1, 0.2));
        assert_eq!(img.get::<var::RadialVigCorrCenterShift>(), Vec2::new(3.0, 4.0));
        assert_eq!(img.crop_rect(), Rect2D::new(50, 25, 950, 475));
        let masks = img.get::<var::Masks>();
        assert_eq!(masks[0].polygon()[1], Vec2::new(50.0, 0.0));
    }

    #[test]
    fn resize_without_crop_covers_new_size() {
        let mut img = SrcPanoImage::new("a.jpg", Size2D::new(2000, 1000));
        img.resize(Size2D::new(1000, 500));
        assert_eq!(img.crop_rect(), Rect2D::new(0, 0, 1000, 500));
    }

    #[test]
    fn circular_crop_containment() {
        let mut img = SrcPanoImage::new("fish.jpg", Size2D::new(200, 100));
        img.set::<var::Projection>(Projection::CircularFisheye);
        img.set::<var::CropRect>(Rect2D::new(50, 0, 150, 100));
        img.update_crop_mode();
        assert_eq!(img.crop_mode(), CropMode::Circle);
        assert!(img.is_inside(&Vec2::new(100.0, 50.0), false));
        assert!(!img.is_inside(&Vec2::new(55.0, 5.0), false));
        assert!(!img.is_inside(&Vec2::new(250.0, 50.0), true));
    }

    #[test]
    fn masks_exclude_points_unless_ignored() {
        let mut img = SrcPanoImage::new("a.jpg", Size2D::new(100, 100));
        assert!(!img.is_inside_masks(&Vec2::new(5.0, 5.0)));
        img.add_active_mask(MaskPolygon::new(
            MaskType::Negative,
            vec![Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0), Vec2::new(0.0, 10.0)],
        ));
        assert!(!img.is_inside(&Vec2::new(5.0, 5.0), false));
        assert!(img.is_inside(&Vec2::new(5.0, 5.0), true));
        assert!(img.is_inside(&Vec2::new(50.0, 50.0), false));
    }

    #[test]
    fn crop_mode_follows_rect() {
        let mut img = SrcPanoImage::new("a.jpg", Size2D::new(100, 80));
        img.update_crop_mode();
        assert_eq!(img.crop_mode(), CropMode::NoCrop);
        img.set::<var::CropRect>(Rect2D::new(10, 10, 90, 70));
        img.update_crop_mode();
        assert_eq!(img.crop_mode(), CropMode::Rectangle);
        img.set::<var::RadialDistortionCenterShift>(Vec2::new(4.0, 0.0));
        img.center_crop();
        assert_eq!(img.crop_rect(), Rect2D::new(14, 10, 94, 70));
    }

    #[test]
    fn exposure_and_projection_codes() {
        let mut img = SrcPanoImage::default();
        img.set_exposure(0.25);
        assert!((img.get::<var::ExposureValue>() - 2.0).abs() < 1e-12);
        assert!((img.exposure() - 0.25).abs() < 1e-12);
        assert_eq!(Projection::from_code(20), Some(Projection::FisheyeThoby));
        assert_eq!(Projection::from_code(7), None);
        assert!(VigCorrMode::default().contains(VigCorrMode::DIV));
    }
}
