//! Optimize vector maintenance driven by the master switches.

use std::{collections::BTreeSet, ops::BitOr};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{ControlPoint, OptimizeVector, Panorama, ProjectionFormat};
use crate::{var, variable_code, ImageGraph};

macro_rules! switch_flags {
    ($name:ident { $( $(#[$meta:meta])* $flag:ident = $bit:expr; )* }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $( $(#[$meta])* pub const $flag: Self = Self($bit); )*

            pub fn bits(self) -> u32 {
                self.0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// True when any bit of `other` is set.
            pub fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

switch_flags!(OptimizerSwitch {
    /// Positions from image pairs.
    PAIR = 1;
    POSITION = 2;
    /// Field of view.
    VIEW = 4;
    /// Radial distortion `b`.
    BARREL = 8;
    /// Positions, view and all lens distortion.
    ALL = 16;
    /// Camera translation `TrX/TrY/TrZ`.
    TRANSLATION = 32;
});

switch_flags!(PhotometricSwitch {
    EXPOSURE = 1;
    WHITEBALANCE = 2;
    VIGNETTING = 4;
    VIGNETTING_CENTER = 8;
    RESPONSE = 16;
});

/// Codes managed by a nonzero geometric switch.
const GEOMETRIC_CODES: [&str; 16] = [
    "y", "p", "r", "TrX", "TrY", "TrZ", "Tpy", "Tpp", "v", "a", "b", "c", "d", "e", "g", "t",
];

/// Codes managed by a nonzero photometric switch.
const PHOTOMETRIC_CODES: [&str; 14] = [
    "Eev", "Er", "Eb", "Va", "Vb", "Vc", "Vd", "Vx", "Vy", "Ra", "Rb", "Rc", "Rd", "Re",
];

/// Which position angles the reference images can take part in optimizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefOptStatus {
    pub yaw: bool,
    pub pitch: bool,
    pub roll: bool,
}

impl Panorama {
    pub fn optimize_vector(&self) -> &OptimizeVector {
        &self.optvec
    }

    pub fn set_optimize_vector(&mut self, optvec: OptimizeVector) {
        debug_assert_eq!(optvec.len(), self.images.len());
        self.optvec = optvec;
        self.optvec.resize(self.images.len(), BTreeSet::new());
    }

    pub fn optimizer_switch(&self) -> OptimizerSwitch {
        self.optimizer_switch
    }

    pub fn set_optimizer_switch(&mut self, switch: OptimizerSwitch) {
        if self.optimizer_switch != switch {
            self.optimizer_switch = switch;
            self.update_optimize_vector();
        }
    }

    pub fn photometric_optimizer_switch(&self) -> PhotometricSwitch {
        self.photometric_switch
    }

    pub fn set_photometric_optimizer_switch(&mut self, switch: PhotometricSwitch) {
        if self.photometric_switch != switch {
            self.photometric_switch = switch;
            self.update_optimize_vector();
        }
    }

    /// The optimize reference image plus every image sharing its yaw.
    pub fn ref_images(&self) -> BTreeSet<usize> {
        let anchor = self.options.optimize_reference_image;
        let mut refs = BTreeSet::new();
        let Some(anchor_img) = self.images.get(anchor) else {
            return refs;
        };
        refs.insert(anchor);
        if anchor_img.is_linked::<var::Yaw>() {
            refs.extend(
                (0..self.images.len())
                    .filter(|&i| i != anchor && self.images[i].is_linked_with::<var::Yaw>(anchor_img)),
            );
        }
        refs
    }

    /// Decide which angles of the reference images are constrained well enough to be
    /// optimized, from control point counts and the output projection.
    pub fn check_ref_opt_status(&self) -> RefOptStatus {
        let vertical = self.ctrl_points.iter().filter(|cp| cp.mode == ControlPoint::X).count();
        let horizontal = self.ctrl_points.iter().filter(|cp| cp.mode == ControlPoint::Y).count();
        let lines = vertical + horizontal;

        match self.options.projection() {
            ProjectionFormat::Rectilinear => RefOptStatus {
                yaw: lines >= 3 && vertical >= 1 && horizontal >= 1,
                pitch: lines >= 2,
                roll: lines >= 1,
            },
            ProjectionFormat::Cylindrical | ProjectionFormat::Equirectangular => RefOptStatus {
                yaw: false,
                pitch: lines > 1,
                roll: lines > 1,
            },
            _ => RefOptStatus::default(),
        }
    }

    /// True when no earlier image shares the variable behind `code` with image `i`.
    fn first_in_class(&self, i: usize, code: &str) -> bool {
        let Some(entry) = variable_code(code) else {
            return false;
        };
        (0..i).all(|j| !self.images[j].is_linked_with_kind(entry.kind, &self.images[i]))
    }

    fn in_class_of(&self, i: usize, anchor: usize, code: &str) -> bool {
        match (variable_code(code), self.images.get(anchor)) {
            (Some(entry), Some(anchor_img)) => {
                i == anchor || self.images[i].is_linked_with_kind(entry.kind, anchor_img)
            }
            _ => false,
        }
    }

    /// Rebuild the optimize vector from the master switches.
    ///
    /// A zero switch leaves its variables as set by hand. A nonzero one clears its
    /// variables and reselects them. Any geometric bit selects the orientation of every
    /// image outside the reference set. Lens and photometric variables are selected once
    /// per link class, on the first image of the class.
    pub fn update_optimize_vector(&mut self) {
        let n = self.images.len();
        self.optvec.resize(n, BTreeSet::new());
        if n == 0 {
            return;
        }
        let mut optvec = std::mem::take(&mut self.optvec);

        let geo = self.optimizer_switch;
        if !geo.is_empty() {
            for entry in &mut optvec {
                entry.retain(|code| !GEOMETRIC_CODES.contains(&code.as_str()));
            }
            let refs = self.ref_images();
            let status = self.check_ref_opt_status();
            let all = geo.contains(OptimizerSwitch::ALL);
            for (i, entry) in optvec.iter_mut().enumerate() {
                if refs.contains(&i) {
                    for (flag, code) in [(status.yaw, "y"), (status.pitch, "p"), (status.roll, "r")] {
                        if flag {
                            entry.insert(code.to_string());
                        }
                    }
                } else {
                    entry.extend(["y", "p", "r"].map(String::from));
                    if geo.contains(OptimizerSwitch::TRANSLATION) {
                        entry.extend(["TrX", "TrY", "TrZ"].map(String::from));
                    }
                }
                let mut lens = Vec::new();
                if all || geo.contains(OptimizerSwitch::VIEW) {
                    lens.push("v");
                }
                if all || geo.contains(OptimizerSwitch::BARREL) {
                    lens.push("b");
                }
                if all {
                    lens.extend(["a", "c", "d", "e"]);
                }
                for code in lens {
                    if self.first_in_class(i, code) {
                        entry.insert(code.to_string());
                    }
                }
            }
        }

        let photo = self.photometric_switch;
        if !photo.is_empty() {
            for entry in &mut optvec {
                entry.retain(|code| !PHOTOMETRIC_CODES.contains(&code.as_str()));
            }
            let color_ref = self.options.color_reference_image;
            for (i, entry) in optvec.iter_mut().enumerate() {
                let mut codes = Vec::new();
                if photo.contains(PhotometricSwitch::EXPOSURE) && !self.in_class_of(i, color_ref, "Eev") {
                    codes.push("Eev");
                }
                if photo.contains(PhotometricSwitch::WHITEBALANCE) {
                    codes.extend(["Er", "Eb"].into_iter().filter(|c| !self.in_class_of(i, color_ref, c)));
                }
                if photo.contains(PhotometricSwitch::VIGNETTING) {
                    codes.extend(["Vb", "Vc", "Vd"]);
                }
                if photo.contains(PhotometricSwitch::VIGNETTING_CENTER) {
                    codes.extend(["Vx", "Vy"]);
                }
                if photo.contains(PhotometricSwitch::RESPONSE) {
                    codes.extend(["Ra", "Rb", "Rc", "Rd", "Re"]);
                }
                for code in codes {
                    if self.first_in_class(i, code) {
                        entry.insert(code.to_string());
                    }
                }
            }
        }

        self.optvec = optvec;
        if !geo.is_empty() || !photo.is_empty() {
            debug!("optimize vector rebuilt (geometric {}, photometric {})", geo.bits(), photo.bits());
            if n > 1 && !ImageGraph::new(self).is_connected() {
                warn!("images are not connected by control points; optimization is underdetermined");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Size2D, SrcPanoImage};

    fn pano(n: usize) -> Panorama {
        let mut pano = Panorama::new();
        for i in 0..n {
            pano.add_image(SrcPanoImage::new(format!("img{i}.jpg"), Size2D::new(400, 300)));
        }
        pano
    }

    fn codes(pano: &Panorama, i: usize) -> Vec<&str> {
        pano.optimize_vector()[i].iter().map(String::as_str).collect()
    }

    #[test]
    fn ref_images_follow_yaw_links() {
        let mut pano = pano(4);
        pano.link_image_variable::<var::Yaw>(0, 2);
        assert_eq!(pano.ref_images(), BTreeSet::from([0, 2]));
    }

    #[test]
    fn ref_status_for_cylindrical_needs_lines() {
        let mut pano = pano(2);
        let mut opts = pano.options().clone();
        opts.set_projection(ProjectionFormat::Cylindrical);
        pano.set_options(opts);
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 1, 2.0, 2.0, ControlPoint::X));
        assert_eq!(pano.check_ref_opt_status(), RefOptStatus::default());
        pano.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 1, 2.0, 9.0, ControlPoint::X));
        let status = pano.check_ref_opt_status();
        assert!(status.pitch && status.roll && !status.yaw);
    }

    fn rectilinear(n: usize) -> Panorama {
        let mut pano = pano(n);
        let mut opts = pano.options().clone();
        opts.set_projection(ProjectionFormat::Rectilinear);
        pano.set_options(opts);
        pano
    }

    #[test]
    fn rectilinear_roll_follows_a_single_line() {
        let mut pano = rectilinear(3);
        pano.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 2, 2.0, 2.0, ControlPoint::X_Y));
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 1, 2.0, 2.0, ControlPoint::X_Y));
        assert_eq!(pano.check_ref_opt_status(), RefOptStatus::default());
        pano.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 1, 1.0, 200.0, ControlPoint::X));
        let status = pano.check_ref_opt_status();
        assert!(status.roll && !status.pitch && !status.yaw);

        pano.set_optimizer_switch(OptimizerSwitch::POSITION);
        assert_eq!(codes(&pano, 0), ["r"]);
        assert_eq!(codes(&pano, 1), ["p", "r", "y"]);
    }

    #[test]
    fn rectilinear_yaw_needs_both_orientations() {
        let mut pano = rectilinear(2);
        for _ in 0..3 {
            pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 1, 2.0, 2.0, ControlPoint::X));
        }
        let status = pano.check_ref_opt_status();
        assert!(!status.yaw && status.pitch && status.roll);
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 5.0, 1, 2.0, 7.0, ControlPoint::Y));
        assert!(pano.check_ref_opt_status().yaw);
    }

    #[test]
    fn lens_variables_once_per_class() {
        let mut pano = pano(3);
        pano.link_image_variable::<var::Hfov>(0, 1);
        pano.link_image_variable::<var::RadialDistortion>(0, 1);
        pano.set_optimizer_switch(OptimizerSwitch::VIEW | OptimizerSwitch::BARREL);
        assert_eq!(codes(&pano, 0), ["b", "v"]);
        assert_eq!(codes(&pano, 1), ["p", "r", "y"]);
        assert_eq!(codes(&pano, 2), ["b", "p", "r", "v", "y"]);
    }

    #[test]
    fn custom_switch_keeps_hand_selection() {
        let mut pano = pano(2);
        pano.set_optimize_vector(vec![BTreeSet::from(["v".to_string()]), BTreeSet::new()]);
        pano.update_optimize_vector();
        assert_eq!(codes(&pano, 0), ["v"]);

        pano.set_photometric_optimizer_switch(PhotometricSwitch::EXPOSURE);
        assert_eq!(codes(&pano, 0), ["v"]);
        assert_eq!(codes(&pano, 1), ["Eev"]);
    }

    #[test]
    fn white_balance_skips_color_reference_class() {
        let mut pano = pano(3);
        pano.link_image_variable::<var::WhiteBalanceRed>(0, 2);
        pano.set_photometric_optimizer_switch(PhotometricSwitch::WHITEBALANCE | PhotometricSwitch::RESPONSE);
        assert_eq!(codes(&pano, 0), ["Ra", "Rb", "Rc", "Rd", "Re"]);
        assert_eq!(codes(&pano, 1), ["Eb", "Er", "Ra", "Rb", "Rc", "Rd", "Re"]);
        assert_eq!(codes(&pano, 2), ["Eb", "Ra", "Rb", "Rc", "Rd", "Re"]);
    }

    #[test]
    fn any_geometric_bit_selects_orientation_off_reference() {
        let mut pano = pano(2);
        pano.set_optimizer_switch(OptimizerSwitch::VIEW);
        assert_eq!(codes(&pano, 0), ["v"]);
        assert_eq!(codes(&pano, 1), ["p", "r", "v", "y"]);
    }

    #[test]
    fn translation_adds_offsets_off_reference() {
        let mut pano = pano(2);
        pano.set_optimizer_switch(OptimizerSwitch::POSITION | OptimizerSwitch::TRANSLATION);
        assert!(codes(&pano, 0).is_empty());
        assert_eq!(codes(&pano, 1), ["TrX", "TrY", "TrZ", "p", "r", "y"]);
    }
}
