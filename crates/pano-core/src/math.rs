use nalgebra::{Matrix3, Point2, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub type Real = f64;

pub type Vec2 = Vector2<Real>;
pub type Vec3 = Vector3<Real>;
pub type Pt2 = Point2<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Rot3 = Rotation3<Real>;

/// Image or canvas size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size2D {
    pub width: u32,
    pub height: u32,
}

impl Size2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; zero for a degenerate size.
    pub fn aspect(&self) -> Real {
        if self.height == 0 {
            0.0
        } else {
            Real::from(self.width) / Real::from(self.height)
        }
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(Real::from(self.width), Real::from(self.height))
    }
}

/// Integer pixel rectangle, `right` and `bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect2D {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect2D {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering a full image of `size`.
    pub fn from_size(size: Size2D) -> Self {
        Self::new(0, 0, clamp_i32(size.width), clamp_i32(size.height))
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn size(&self) -> Size2D {
        Size2D::new(self.width().max(0) as u32, self.height().max(0) as u32)
    }

    pub fn intersect(&self, other: &Rect2D) -> Rect2D {
        let r = Rect2D::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() {
            Rect2D::default()
        } else {
            r
        }
    }

    /// Pixel containment, `right`/`bottom` excluded.
    pub fn contains(&self, p: &Vec2) -> bool {
        p.x >= Real::from(self.left)
            && p.x < Real::from(self.right)
            && p.y >= Real::from(self.top)
            && p.y < Real::from(self.bottom)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            Real::from(self.left + self.right) / 2.0,
            Real::from(self.top + self.bottom) / 2.0,
        )
    }

    pub fn move_by(&self, dx: i32, dy: i32) -> Rect2D {
        Rect2D::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Grow (or shrink, for negative `border`) on every side.
    pub fn expanded(&self, border: i32) -> Rect2D {
        Rect2D::new(
            self.left - border,
            self.top - border,
            self.right + border,
            self.bottom + border,
        )
    }

    /// Scale all corners, rounding to the nearest pixel.
    pub fn scaled(&self, factor: Real) -> Rect2D {
        let s = |v: i32| (Real::from(v) * factor).round() as i32;
        Rect2D::new(s(self.left), s(self.top), s(self.right), s(self.bottom))
    }
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Camera-to-world rotation for yaw/pitch/roll in degrees.
///
/// Camera frame: x right, y down, z forward.
pub fn camera_rotation(yaw: Real, pitch: Real, roll: Real) -> Rot3 {
    let ry = Rot3::from_axis_angle(&Vec3::y_axis(), yaw.to_radians());
    let rx = Rot3::from_axis_angle(&Vec3::x_axis(), pitch.to_radians());
    let rz = Rot3::from_axis_angle(&Vec3::z_axis(), roll.to_radians());
    ry * rx * rz
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_intersection_and_scaling() {
        let a = Rect2D::new(0, 0, 100, 50);
        let b = Rect2D::new(20, 10, 200, 30);
        assert_eq!(a.intersect(&b), Rect2D::new(20, 10, 100, 30));
        assert_eq!(a.intersect(&Rect2D::new(150, 0, 160, 10)), Rect2D::default());
        assert_eq!(a.scaled(0.5), Rect2D::new(0, 0, 50, 25));
        assert_eq!(Rect2D::from_size(Size2D::new(10, 4)).size(), Size2D::new(10, 4));
    }

    #[test]
    fn rect_containment_excludes_far_edges() {
        let r = Rect2D::new(0, 0, 10, 10);
        assert!(r.contains(&Vec2::new(0.0, 0.0)));
        assert!(r.contains(&Vec2::new(9.5, 9.5)));
        assert!(!r.contains(&Vec2::new(10.0, 5.0)));
    }

    #[test]
    fn rotation_yaw_turns_forward_axis_right() {
        let r = camera_rotation(90.0, 0.0, 0.0);
        let v = r * Vec3::z();
        assert!((v.x - 1.0).abs() < 1e-12 && v.z.abs() < 1e-12);
        let up = camera_rotation(0.0, 90.0, 0.0) * Vec3::z();
        assert!((up.y + 1.0).abs() < 1e-12, "positive pitch looks up: {up:?}");
    }
}
