use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::{PanoError, Real, Rect2D, Vec2};

/// Scope and polarity of a mask polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskType {
    /// Excluded region of this image only.
    #[default]
    Negative = 0,
    /// Region to keep; propagated as a negative mask onto overlapping images.
    Positive = 1,
    /// Excluded region shared by every image of the stack.
    StackNegative = 2,
    /// Region to keep, propagated onto the other images of the stack.
    StackPositive = 3,
    /// Excluded region shared by every image of the lens.
    NegativeLens = 4,
}

impl MaskType {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Negative,
            1 => Self::Positive,
            2 => Self::StackNegative,
            3 => Self::StackPositive,
            4 => Self::NegativeLens,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Self::Positive | Self::StackPositive)
    }
}

/// A polygon in image pixel coordinates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaskPolygon {
    mask_type: MaskType,
    polygon: Vec<Vec2>,
    img_nr: usize,
    #[serde(default)]
    inverted: bool,
}

impl PartialEq for MaskPolygon {
    fn eq(&self, other: &Self) -> bool {
        self.mask_type == other.mask_type && self.polygon == other.polygon
    }
}

#[derive(Debug, Clone, Copy)]
enum ClipSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl MaskPolygon {
    pub fn new(mask_type: MaskType, polygon: Vec<Vec2>) -> Self {
        Self {
            mask_type,
            polygon,
            img_nr: 0,
            inverted: false,
        }
    }

    pub fn mask_type(&self) -> MaskType {
        self.mask_type
    }

    pub fn set_mask_type(&mut self, mask_type: MaskType) {
        self.mask_type = mask_type;
    }

    pub fn is_positive(&self) -> bool {
        self.mask_type.is_positive()
    }

    pub fn polygon(&self) -> &[Vec2] {
        &self.polygon
    }

    pub fn set_polygon(&mut self, polygon: Vec<Vec2>) {
        self.polygon = polygon;
    }

    pub fn img_nr(&self) -> usize {
        self.img_nr
    }

    pub fn set_img_nr(&mut self, img_nr: usize) {
        self.img_nr = img_nr;
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    /// Even-odd containment test; an inverted mask covers everything outside its polygon.
    pub fn is_inside(&self, p: &Vec2) -> bool {
        if self.polygon.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut p_old = self.polygon[self.polygon.len() - 1];
        for &p_new in &self.polygon {
            let (p1, p2) = if p_new.x > p_old.x {
                (p_old, p_new)
            } else {
                (p_new, p_old)
            };
            if (p_new.x < p.x) == (p.x <= p_old.x)
                && (p.y - p1.y) * (p2.x - p1.x) < (p2.y - p1.y) * (p.x - p1.x)
            {
                inside = !inside;
            }
            p_old = p_new;
        }
        inside != self.inverted
    }

    /// Twice the signed area; positive for counter-clockwise order in y-down pixel space.
    pub fn signed_area(&self) -> Real {
        let n = self.polygon.len();
        (0..n)
            .map(|i| {
                let a = self.polygon[i];
                let b = self.polygon[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum()
    }

    pub fn add_point(&mut self, p: Vec2) {
        self.polygon.push(p);
    }

    pub fn insert_point(&mut self, index: usize, p: Vec2) {
        if index <= self.polygon.len() {
            self.polygon.insert(index, p);
        }
    }

    pub fn remove_point(&mut self, index: usize) {
        if index < self.polygon.len() {
            self.polygon.remove(index);
        }
    }

    pub fn move_point_to(&mut self, index: usize, p: Vec2) {
        if let Some(q) = self.polygon.get_mut(index) {
            *q = p;
        }
    }

    pub fn move_point_by(&mut self, index: usize, diff: Vec2) {
        if let Some(q) = self.polygon.get_mut(index) {
            *q += diff;
        }
    }

    pub fn scale(&mut self, fx: Real, fy: Real) {
        for p in &mut self.polygon {
            p.x *= fx;
            p.y *= fy;
        }
    }

    /// Map every vertex; used for reprojection between images.
    pub fn transform(&mut self, mut f: impl FnMut(&Vec2) -> Option<Vec2>) {
        self.polygon = self.polygon.iter().filter_map(|p| f(p)).collect();
    }

    /// Insert vertices so that no edge is longer than `max_distance`.
    pub fn sub_sample(&mut self, max_distance: Real) {
        let n = self.polygon.len();
        if n < 3 || max_distance <= 0.0 {
            return;
        }
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let a = self.polygon[i];
            let b = self.polygon[(i + 1) % n];
            out.push(a);
            let steps = ((b - a).norm() / max_distance).ceil() as usize;
            for k in 1..steps {
                out.push(a + (b - a) * (k as Real / steps as Real));
            }
        }
        self.polygon = out;
    }

    /// Rotate the polygon with its `width`×`height` image by 90 degrees.
    pub fn rotate90(&mut self, clockwise: bool, width: u32, height: u32) {
        for p in &mut self.polygon {
            let q = *p;
            if clockwise {
                *p = Vec2::new(Real::from(height) - q.y, q.x);
            } else {
                *p = Vec2::new(q.y, Real::from(width) - q.x);
            }
        }
    }

    /// Index at which a new vertex near `p` should be inserted, if `p` lies close to an edge.
    pub fn find_point_near_pos(&self, p: &Vec2, tol: Real) -> Option<usize> {
        let n = self.polygon.len();
        if n == 0 {
            return None;
        }
        let mut j = n - 1;
        for i in 0..n {
            let p1 = self.polygon[i];
            let p2 = self.polygon[j];
            let diff = p2 - p1;
            let len2 = diff.norm_squared();
            if len2 >= 1e-6 {
                let u = (p - p1).dot(&diff) / len2;
                if (0.1..=0.9).contains(&u) && (p - (p1 + diff * u)).norm() < tol {
                    return Some(if i == 0 { j + 1 } else { i });
                }
            }
            j = i;
        }
        None
    }

    /// Sutherland-Hodgman clip against `rect`; true while the polygon keeps more than two vertices.
    pub fn clip_polygon(&mut self, rect: &Rect2D) -> bool {
        for side in [ClipSide::Left, ClipSide::Right, ClipSide::Top, ClipSide::Bottom] {
            self.clip_on_plane(rect, side);
        }
        self.polygon.len() > 2
    }

    /// Clip against a circle, approximated by an inscribed regular polygon.
    pub fn clip_polygon_circle(&mut self, center: &Vec2, radius: Real) -> bool {
        const SEGMENTS: usize = 64;
        let step = std::f64::consts::TAU / SEGMENTS as Real;
        for k in 0..SEGMENTS {
            if self.polygon.len() < 3 {
                break;
            }
            let a = *center + Vec2::new((k as Real * step).cos(), (k as Real * step).sin()) * radius;
            let b = *center
                + Vec2::new(((k + 1) as Real * step).cos(), ((k + 1) as Real * step).sin()) * radius;
            // keep the side of edge a->b that contains the center
            let inward = |p: &Vec2| {
                let e = b - a;
                let side = e.x * (p.y - a.y) - e.y * (p.x - a.x);
                let c = e.x * (center.y - a.y) - e.y * (center.x - a.x);
                side * c >= 0.0
            };
            self.clip_generic(inward, |p, q| line_intersection(p, q, &a, &b));
        }
        self.polygon.len() > 2
    }

    fn clip_on_plane(&mut self, r: &Rect2D, side: ClipSide) {
        let (left, right) = (Real::from(r.left), Real::from(r.right));
        let (top, bottom) = (Real::from(r.top), Real::from(r.bottom));
        let is_side = |p: &Vec2| match side {
            ClipSide::Left => p.x >= left,
            ClipSide::Right => p.x <= right,
            ClipSide::Top => p.y >= top,
            ClipSide::Bottom => p.y <= bottom,
        };
        let intersect = |p: &Vec2, q: &Vec2| {
            let d = q - p;
            match side {
                ClipSide::Left | ClipSide::Right => {
                    let x = if matches!(side, ClipSide::Left) { left } else { right };
                    let t = if d.x == 0.0 { 0.0 } else { (x - p.x) / d.x };
                    Vec2::new(x, p.y + t * d.y)
                }
                ClipSide::Top | ClipSide::Bottom => {
                    let y = if matches!(side, ClipSide::Top) { top } else { bottom };
                    let t = if d.y == 0.0 { 0.0 } else { (y - p.y) / d.y };
                    Vec2::new(p.x + t * d.x, y)
                }
            }
        };
        self.clip_generic(is_side, intersect);
    }

    fn clip_generic(
        &mut self,
        inside: impl Fn(&Vec2) -> bool,
        intersect: impl Fn(&Vec2, &Vec2) -> Vec2,
    ) {
        if self.polygon.len() < 3 {
            return;
        }
        let mut s = self.polygon[self.polygon.len() - 1];
        let mut out = Vec::with_capacity(self.polygon.len() + 4);
        for &p in &self.polygon {
            if inside(&p) {
                if !inside(&s) {
                    out.push(intersect(&p, &s));
                }
                out.push(p);
            } else if inside(&s) {
                out.push(intersect(&s, &p));
            }
            s = p;
        }
        self.polygon = out;
    }

    /// Parse whitespace separated `x y` pairs; needs at least three vertices.
    pub fn parse_polygon_string(&mut self, s: &str) -> bool {
        let values: Vec<Real> = s
            .split_whitespace()
            .map_while(|t| t.parse::<Real>().ok())
            .collect();
        self.polygon = values
            .chunks_exact(2)
            .map(|c| Vec2::new(c[0], c[1]))
            .collect();
        self.polygon.len() > 2
    }

    /// Vertices formatted as `x y x y ...`.
    pub fn polygon_string(&self) -> String {
        let mut out = String::new();
        for (i, p) in self.polygon.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{} {}", p.x, p.y);
        }
        out
    }

    /// PTO `k` line for this mask, attached to image `img_nr`.
    pub fn polygon_line(&self, img_nr: usize) -> String {
        format!(
            "k i{} t{} p\"{}\"",
            img_nr,
            self.mask_type.code(),
            self.polygon_string()
        )
    }

    /// Parse the value part of a `k` line (`i<n> t<type> p"..."`).
    pub fn from_polygon_line(img_nr: usize, mask_type: i64, points: &str) -> Result<Self, PanoError> {
        let mask_type = MaskType::from_code(mask_type)
            .ok_or_else(|| PanoError::InvalidMask(format!("unknown mask type {mask_type}")))?;
        let mut mask = MaskPolygon::new(mask_type, Vec::new());
        mask.img_nr = img_nr;
        if !mask.parse_polygon_string(points) {
            return Err(PanoError::InvalidMask(format!(
                "need at least 3 vertices in \"{points}\""
            )));
        }
        Ok(mask)
    }
}

fn line_intersection(p: &Vec2, q: &Vec2, a: &Vec2, b: &Vec2) -> Vec2 {
    let r = q - p;
    let s = b - a;
    let denom = r.x * s.y - r.y * s.x;
    if denom.abs() < 1e-12 {
        return *p;
    }
    let t = ((a.x - p.x) * s.y - (a.y - p.y) * s.x) / denom;
    p + r * t
}

/// A list of masks.
pub type MaskPolygonVector = Vec<MaskPolygon>;
