//! Mapping between image pixels and view directions on the unit sphere.
//!
//! Pixel model: `pixel = center + distort(focal · project(R⁻¹ · dir))`, where `R` is the
//! camera-to-world rotation from yaw/pitch/roll and `distort` is the radial polynomial
//! `r · (a·r³ + b·r² + c·r + d)` with `d = 1 − a − b − c`, normalized by half the shorter
//! image side. Translation and shear are not modelled.

use crate::{camera_rotation, var, Projection, Real, Rot3, SrcPanoImage, Vec2, Vec3};

const THOBY_K1: Real = 1.47;
const THOBY_K2: Real = 0.713;

/// Pixel ⇄ direction transform of one image, captured from its current variables.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    projection: Projection,
    center: Vec2,
    focal: Real,
    rotation: Rot3,
    radial: [Real; 4],
    radius_norm: Real,
}

impl ImageTransform {
    pub fn new(img: &SrcPanoImage) -> Self {
        let size = img.size();
        let width = Real::from(size.width.max(1));
        let half_fov = img.hfov().to_radians().clamp(1e-6, std::f64::consts::TAU) / 2.0;
        let projection = img.projection();
        let focal = match projection {
            Projection::Rectilinear => width / 2.0 / half_fov.min(1.5).tan(),
            Projection::Panoramic
            | Projection::CircularFisheye
            | Projection::FullFrameFisheye
            | Projection::Equirectangular => width / (2.0 * half_fov),
            Projection::FisheyeOrthographic => width / 2.0 / half_fov.min(std::f64::consts::FRAC_PI_2).sin(),
            Projection::FisheyeStereographic => width / 4.0 / (half_fov / 2.0).tan(),
            Projection::FisheyeEquisolid => width / 4.0 / (half_fov / 2.0).sin(),
            Projection::FisheyeThoby => width / 2.0 / (THOBY_K1 * (THOBY_K2 * half_fov).sin()),
        };
        let [a, b, c, _] = img.get::<var::RadialDistortion>();
        Self {
            projection,
            center: img.radial_distortion_center(),
            focal,
            rotation: camera_rotation(
                img.get::<var::Yaw>(),
                img.get::<var::Pitch>(),
                img.get::<var::Roll>(),
            ),
            radial: [a, b, c, 1.0 - a - b - c],
            radius_norm: Real::from(size.width.min(size.height).max(1)) / 2.0,
        }
    }

    /// World direction seen by pixel `p`.
    pub fn image_to_sphere(&self, p: &Vec2) -> Option<Vec3> {
        let mut q = p - self.center;
        let rs = q.norm() / self.radius_norm;
        if rs > 0.0 {
            let ri = self.undistort(rs)?;
            q *= ri / rs;
        }
        let u = q / self.focal;
        let cam = match self.projection {
            Projection::Rectilinear => Vec3::new(u.x, u.y, 1.0),
            Projection::Panoramic => Vec3::new(u.x.sin(), u.y, u.x.cos()),
            Projection::Equirectangular => {
                let (lon, lat) = (u.x, u.y);
                Vec3::new(lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos())
            }
            _ => {
                let r = u.norm();
                let theta = self.fisheye_angle(r)?;
                if r < 1e-12 {
                    Vec3::z()
                } else {
                    let s = theta.sin() / r;
                    Vec3::new(u.x * s, u.y * s, theta.cos())
                }
            }
        };
        Some(self.rotation * cam.normalize())
    }

    /// Pixel showing world direction `dir`, if the image can see it.
    pub fn sphere_to_image(&self, dir: &Vec3) -> Option<Vec2> {
        let cam = self.rotation.inverse() * dir.try_normalize(1e-12)?;
        let u = match self.projection {
            Projection::Rectilinear => {
                if cam.z <= 1e-9 {
                    return None;
                }
                Vec2::new(cam.x / cam.z, cam.y / cam.z)
            }
            Projection::Panoramic => {
                let h = (cam.x * cam.x + cam.z * cam.z).sqrt();
                if h < 1e-12 {
                    return None;
                }
                Vec2::new(cam.x.atan2(cam.z), cam.y / h)
            }
            Projection::Equirectangular => Vec2::new(cam.x.atan2(cam.z), cam.y.clamp(-1.0, 1.0).asin()),
            _ => {
                let theta = cam.z.clamp(-1.0, 1.0).acos();
                let r = self.fisheye_radius(theta)?;
                let h = (cam.x * cam.x + cam.y * cam.y).sqrt();
                if h < 1e-12 {
                    Vec2::zeros()
                } else {
                    Vec2::new(cam.x, cam.y) * (r / h)
                }
            }
        };
        let mut q = u * self.focal;
        let ri = q.norm() / self.radius_norm;
        if ri > 0.0 {
            q *= self.distort(ri) / ri;
        }
        Some(self.center + q)
    }

    fn fisheye_angle(&self, r: Real) -> Option<Real> {
        let theta = match self.projection {
            Projection::FisheyeOrthographic => asin(r)?,
            Projection::FisheyeStereographic => 2.0 * (r / 2.0).atan(),
            Projection::FisheyeEquisolid => 2.0 * asin(r / 2.0)?,
            Projection::FisheyeThoby => asin(r / THOBY_K1)? / THOBY_K2,
            _ => r,
        };
        (theta <= std::f64::consts::PI).then_some(theta)
    }

    fn fisheye_radius(&self, theta: Real) -> Option<Real> {
        match self.projection {
            Projection::FisheyeOrthographic => {
                (theta <= std::f64::consts::FRAC_PI_2).then(|| theta.sin())
            }
            Projection::FisheyeStereographic => {
                (theta < std::f64::consts::PI - 1e-6).then(|| 2.0 * (theta / 2.0).tan())
            }
            Projection::FisheyeEquisolid => Some(2.0 * (theta / 2.0).sin()),
            Projection::FisheyeThoby => {
                (THOBY_K2 * theta <= std::f64::consts::FRAC_PI_2).then(|| THOBY_K1 * (THOBY_K2 * theta).sin())
            }
            _ => Some(theta),
        }
    }

    fn distort(&self, r: Real) -> Real {
        let [a, b, c, d] = self.radial;
        r * (((a * r + b) * r + c) * r + d)
    }

    /// Newton inverse of [`Self::distort`].
    fn undistort(&self, rs: Real) -> Option<Real> {
        let [a, b, c, d] = self.radial;
        let mut r = rs;
        for _ in 0..30 {
            let f = self.distort(r) - rs;
            let df = ((4.0 * a * r + 3.0 * b) * r + 2.0 * c) * r + d;
            if df.abs() < 1e-12 {
                return None;
            }
            let step = f / df;
            r -= step;
            if step.abs() < 1e-12 {
                break;
            }
        }
        (r.is_finite() && r >= 0.0).then_some(r)
    }

    /// Map a pixel of the image this transform was built from into `target`.
    pub fn transfer(&self, p: &Vec2, target: &ImageTransform) -> Option<Vec2> {
        target.sphere_to_image(&self.image_to_sphere(p)?)
    }
}

fn asin(v: Real) -> Option<Real> {
    (-1.0..=1.0).contains(&v).then(|| v.asin())
}

/// Estimates how much of one image is also seen by another.
pub trait ImageOverlap {
    /// Fraction in `[0, 1]` of `src`'s usable area visible in `dst`.
    fn overlap(&self, src: &SrcPanoImage, dst: &SrcPanoImage) -> Real;
}

/// Overlap by projecting a regular grid of sample pixels.
#[derive(Debug, Clone, Copy)]
pub struct SampledOverlap {
    /// Samples per image axis.
    pub samples: usize,
}

impl Default for SampledOverlap {
    fn default() -> Self {
        Self { samples: 16 }
    }
}

impl ImageOverlap for SampledOverlap {
    fn overlap(&self, src: &SrcPanoImage, dst: &SrcPanoImage) -> Real {
        let size = src.size();
        if size.is_empty() || dst.size().is_empty() || self.samples == 0 {
            return 0.0;
        }
        let from = ImageTransform::new(src);
        let to = ImageTransform::new(dst);
        let n = self.samples;
        let (mut inside, mut hits) = (0usize, 0usize);
        for j in 0..n {
            for i in 0..n {
                let p = Vec2::new(
                    (i as Real + 0.5) * Real::from(size.width) / n as Real,
                    (j as Real + 0.5) * Real::from(size.height) / n as Real,
                );
                if !src.is_inside(&p, true) {
                    continue;
                }
                inside += 1;
                if from.transfer(&p, &to).is_some_and(|q| dst.is_inside(&q, true)) {
                    hits += 1;
                }
            }
        }
        if inside == 0 {
            0.0
        } else {
            hits as Real / inside as Real
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Size2D;

    fn image(projection: Projection, hfov: Real, yaw: Real) -> SrcPanoImage {
        let mut img = SrcPanoImage::new("t.jpg", Size2D::new(600, 400));
        img.set::<var::Projection>(projection);
        img.set::<var::Hfov>(hfov);
        img.set::<var::Yaw>(yaw);
        img.set::<var::Pitch>(10.0);
        img.set::<var::Roll>(-5.0);
        img.set::<var::RadialDistortion>([0.0, -0.02, 0.01, 1.0]);
        img
    }

    #[test]
    fn pixel_round_trip_for_every_projection() {
        for projection in Projection::ALL {
            let t = ImageTransform::new(&image(projection, 100.0, 30.0));
            for p in [Vec2::new(300.0, 200.0), Vec2::new(120.0, 310.0), Vec2::new(500.0, 90.0)] {
                let dir = t.image_to_sphere(&p).expect("pixel maps to sphere");
                let back = t.sphere_to_image(&dir).expect("direction maps back");
                assert!((back - p).norm() < 1e-6, "{projection:?}: {p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn yaw_offsets_shift_content() {
        let a = image(Projection::Rectilinear, 90.0, 0.0);
        let mut b = a.clone();
        b.set::<var::Pitch>(10.0);
        b.set::<var::Yaw>(0.0);
        let (ta, tb) = (ImageTransform::new(&a), ImageTransform::new(&b));
        let p = Vec2::new(250.0, 180.0);
        let q = ta.transfer(&p, &tb).unwrap();
        assert!((q - p).norm() < 1e-6);

        let mut c = a.clone();
        c.set::<var::Yaw>(180.0);
        assert!(ta.transfer(&Vec2::new(300.0, 200.0), &ImageTransform::new(&c)).is_none());
    }

    #[test]
    fn sampled_overlap_of_identical_and_opposite_images() {
        let a = image(Projection::Rectilinear, 60.0, 0.0);
        let b = image(Projection::Rectilinear, 60.0, 180.0);
        let est = SampledOverlap::default();
        assert!((est.overlap(&a, &a) - 1.0).abs() < 1e-12);
        assert_eq!(est.overlap(&a, &b), 0.0);
    }
}
