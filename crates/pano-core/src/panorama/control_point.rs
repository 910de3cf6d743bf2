use serde::{Deserialize, Serialize};

use crate::Real;

/// A pair of corresponding pixel positions in two images.
///
/// `mode` selects what the optimizer constrains: both coordinates ([`ControlPoint::X_Y`]),
/// only x ([`ControlPoint::X`], a vertical line), only y ([`ControlPoint::Y`], a horizontal
/// line), or, for values of [`ControlPoint::FIRST_LINE`] and above, membership in a
/// numbered straight line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPoint {
    pub image1: usize,
    pub x1: Real,
    pub y1: Real,
    pub image2: usize,
    pub x2: Real,
    pub y2: Real,
    /// Residual after the last optimization.
    #[serde(default)]
    pub error: Real,
    pub mode: i32,
}

impl ControlPoint {
    pub const X_Y: i32 = 0;
    pub const X: i32 = 1;
    pub const Y: i32 = 2;
    pub const FIRST_LINE: i32 = 3;

    pub fn new(image1: usize, x1: Real, y1: Real, image2: usize, x2: Real, y2: Real, mode: i32) -> Self {
        Self {
            image1,
            x1,
            y1,
            image2,
            x2,
            y2,
            error: 0.0,
            mode,
        }
    }

    pub fn is_line(&self) -> bool {
        self.mode >= Self::FIRST_LINE
    }

    /// Same point with the two images exchanged.
    pub fn mirrored(&self) -> Self {
        Self {
            image1: self.image2,
            x1: self.x2,
            y1: self.y2,
            image2: self.image1,
            x2: self.x1,
            y2: self.y1,
            ..*self
        }
    }

    /// Identity used for duplicate detection; a point and its mirror share it.
    pub(crate) fn key(&self) -> (usize, u64, u64, usize, u64, u64, i32) {
        let cp = if self.image1 <= self.image2 {
            self.clone()
        } else {
            self.mirrored()
        };
        (
            cp.image1,
            cp.x1.to_bits(),
            cp.y1.to_bits(),
            cp.image2,
            cp.x2.to_bits(),
            cp.y2.to_bits(),
            cp.mode,
        )
    }
}

/// Equal when images, coordinates and mode agree; the residual is ignored.
impl PartialEq for ControlPoint {
    fn eq(&self, other: &Self) -> bool {
        self.image1 == other.image1
            && self.image2 == other.image2
            && self.x1 == other.x1
            && self.y1 == other.y1
            && self.x2 == other.x2
            && self.y2 == other.y2
            && self.mode == other.mode
    }
}

pub type CPVector = Vec<ControlPoint>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_shares_key() {
        let cp = ControlPoint::new(3, 1.0, 2.0, 1, 5.0, 6.0, ControlPoint::X_Y);
        let m = cp.mirrored();
        assert_eq!(m.image1, 1);
        assert_eq!((m.x2, m.y2), (1.0, 2.0));
        assert_eq!(cp.key(), m.key());
        assert_ne!(cp, m);
    }

    #[test]
    fn error_is_not_compared() {
        let a = ControlPoint::new(0, 1.0, 2.0, 1, 3.0, 4.0, 5);
        let mut b = a.clone();
        b.error = 2.5;
        assert_eq!(a, b);
        assert!(a.is_line());
    }
}
