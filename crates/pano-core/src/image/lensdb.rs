use log::debug;

use super::{var, CropMode, Projection, SrcPanoImage, VigCorrMode};
use crate::{Real, Rect2D, Size2D};

/// Lookup key for lens database queries.
#[derive(Debug, Clone, PartialEq)]
pub struct LensQuery {
    pub make: String,
    pub model: String,
    pub lens: String,
    pub focal_length: Real,
    pub aperture: Real,
    pub distance: Real,
}

/// External lens database. Every lookup is best effort; the defaults know nothing.
pub trait LensDatabase {
    fn crop_factor(&self, _query: &LensQuery) -> Option<Real> {
        None
    }

    fn projection(&self, _query: &LensQuery) -> Option<Projection> {
        None
    }

    /// Crop rectangle for an image of the given size.
    fn crop(&self, _query: &LensQuery, _size: Size2D) -> Option<Rect2D> {
        None
    }

    /// Radial distortion coefficients `a, b, c`.
    fn distortion(&self, _query: &LensQuery) -> Option<[Real; 3]> {
        None
    }

    /// Radial vignetting coefficients `b, c, d`.
    fn vignetting(&self, _query: &LensQuery) -> Option<[Real; 3]> {
        None
    }
}

impl SrcPanoImage {
    pub fn lens_query(&self) -> LensQuery {
        LensQuery {
            make: self.get::<var::ExifMake>(),
            model: self.get::<var::ExifModel>(),
            lens: self.get::<var::ExifLens>(),
            focal_length: self.get::<var::ExifFocalLength>(),
            aperture: self.get::<var::ExifAperture>(),
            distance: self.get::<var::ExifDistance>(),
        }
    }

    pub fn read_crop_factor_from_db(&mut self, db: &dyn LensDatabase) -> bool {
        match db.crop_factor(&self.lens_query()).filter(|c| *c > 0.1) {
            Some(crop) => {
                self.set::<var::ExifCropFactor>(crop);
                true
            }
            None => false,
        }
    }

    /// Projection and, when known, crop from the database.
    pub fn read_projection_from_db(&mut self, db: &dyn LensDatabase) -> bool {
        let query = self.lens_query();
        let Some(projection) = db.projection(&query) else {
            return false;
        };
        self.set::<var::Projection>(projection);
        if let Some(rect) = db.crop(&query, self.size()) {
            self.set::<var::CropRect>(rect);
            self.update_crop_mode();
        } else if self.crop_mode() != CropMode::NoCrop && !self.is_circular_crop() {
            self.set::<var::CropMode>(CropMode::NoCrop);
        }
        true
    }

    pub fn read_distortion_from_db(&mut self, db: &dyn LensDatabase) -> bool {
        let query = self.lens_query();
        if query.focal_length <= 0.0 {
            return false;
        }
        match db.distortion(&query) {
            Some([a, b, c]) => {
                self.set::<var::RadialDistortion>([a, b, c, 1.0 - a - b - c]);
                true
            }
            None => {
                debug!("no distortion data for {} {}", query.make, query.lens);
                false
            }
        }
    }

    pub fn read_vignetting_from_db(&mut self, db: &dyn LensDatabase) -> bool {
        let query = self.lens_query();
        if query.focal_length <= 0.0 || query.aperture <= 0.0 {
            return false;
        }
        match db.vignetting(&query) {
            Some([b, c, d]) => {
                self.set::<var::RadialVigCorrCoeff>([1.0, b, c, d]);
                self.set::<var::VigCorrMode>(VigCorrMode::RADIAL | VigCorrMode::DIV);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl LensDatabase for Empty {}

    struct Fisheye;
    impl LensDatabase for Fisheye {
        fn projection(&self, _query: &LensQuery) -> Option<Projection> {
            Some(Projection::CircularFisheye)
        }

        fn crop(&self, _query: &LensQuery, size: Size2D) -> Option<Rect2D> {
            Some(Rect2D::new(10, 0, size.width as i32 - 10, size.height as i32))
        }

        fn distortion(&self, _query: &LensQuery) -> Option<[Real; 3]> {
            Some([0.01, -0.02, 0.0])
        }
    }

    #[test]
    fn misses_leave_image_untouched() {
        let mut img = SrcPanoImage::new("a.jpg", Size2D::new(100, 80));
        img.set::<var::ExifFocalLength>(10.0);
        let before = img.get::<var::RadialDistortion>();
        assert!(!img.read_crop_factor_from_db(&Empty));
        assert!(!img.read_projection_from_db(&Empty));
        assert!(!img.read_distortion_from_db(&Empty));
        assert!(!img.read_vignetting_from_db(&Empty));
        assert_eq!(img.get::<var::RadialDistortion>(), before);
        assert_eq!(img.projection(), Projection::Rectilinear);
    }

    #[test]
    fn hits_are_applied() {
        let mut img = SrcPanoImage::new("a.jpg", Size2D::new(100, 80));
        img.set::<var::ExifFocalLength>(10.0);
        assert!(img.read_projection_from_db(&Fisheye));
        assert_eq!(img.crop_mode(), CropMode::Circle);
        assert!(img.read_distortion_from_db(&Fisheye));
        let d = img.get::<var::RadialDistortion>();
        assert!((d[3] - 1.01).abs() < 1e-12);
    }
}
