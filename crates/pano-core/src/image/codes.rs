use std::{collections::HashMap, sync::OnceLock};

use log::error;

use super::{var, ImageVariableKind, SrcPanoImage};
use crate::Real;

/// A scalar PTO variable code bound to its typed image variable.
pub struct VariableCode {
    pub code: &'static str,
    pub kind: ImageVariableKind,
    get: fn(&SrcPanoImage) -> Real,
    set: fn(&mut SrcPanoImage, Real),
}

impl VariableCode {
    pub fn get(&self, img: &SrcPanoImage) -> Real {
        (self.get)(img)
    }

    pub fn set(&self, img: &mut SrcPanoImage, value: Real) {
        (self.set)(img, value)
    }
}

impl std::fmt::Debug for VariableCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableCode")
            .field("code", &self.code)
            .field("kind", &self.kind)
            .finish()
    }
}

macro_rules! scalar {
    ($code:literal, $kind:ident) => {
        VariableCode {
            code: $code,
            kind: ImageVariableKind::$kind,
            get: |img| img.get::<var::$kind>(),
            set: |img, v| img.set::<var::$kind>(v),
        }
    };
}

macro_rules! element {
    ($code:literal, $kind:ident, $idx:literal) => {
        VariableCode {
            code: $code,
            kind: ImageVariableKind::$kind,
            get: |img| img.with::<var::$kind, _>(|a| a[$idx]),
            set: |img, v| img.update::<var::$kind>(|a| a[$idx] = v),
        }
    };
}

macro_rules! emor {
    ($code:literal, $idx:literal) => {
        VariableCode {
            code: $code,
            kind: ImageVariableKind::EmorParams,
            get: |img| img.with::<var::EmorParams, _>(|a| a.get($idx).copied().unwrap_or(0.0)),
            set: |img, v| {
                img.update::<var::EmorParams>(|a| {
                    if a.len() <= $idx {
                        a.resize($idx + 1, 0.0);
                    }
                    a[$idx] = v;
                })
            },
        }
    };
}

/// Every scalar code, in the order image lines list them.
pub static VARIABLE_CODES: &[VariableCode] = &[
    scalar!("v", Hfov),
    emor!("Ra", 0),
    emor!("Rb", 1),
    emor!("Rc", 2),
    emor!("Rd", 3),
    emor!("Re", 4),
    scalar!("Eev", ExposureValue),
    scalar!("Er", WhiteBalanceRed),
    scalar!("Eb", WhiteBalanceBlue),
    scalar!("r", Roll),
    scalar!("p", Pitch),
    scalar!("y", Yaw),
    scalar!("TrX", X),
    scalar!("TrY", Y),
    scalar!("TrZ", Z),
    scalar!("Tpy", TranslationPlaneYaw),
    scalar!("Tpp", TranslationPlanePitch),
    scalar!("j", Stack),
    element!("a", RadialDistortion, 0),
    element!("b", RadialDistortion, 1),
    element!("c", RadialDistortion, 2),
    element!("d", RadialDistortionCenterShift, 0),
    element!("e", RadialDistortionCenterShift, 1),
    element!("g", Shear, 0),
    element!("t", Shear, 1),
    element!("Va", RadialVigCorrCoeff, 0),
    element!("Vb", RadialVigCorrCoeff, 1),
    element!("Vc", RadialVigCorrCoeff, 2),
    element!("Vd", RadialVigCorrCoeff, 3),
    element!("Vx", RadialVigCorrCenterShift, 0),
    element!("Vy", RadialVigCorrCenterShift, 1),
];

/// Look up a code such as `"v"`, `"TrX"` or `"Vb"`.
pub fn variable_code(code: &str) -> Option<&'static VariableCode> {
    static INDEX: OnceLock<HashMap<&'static str, &'static VariableCode>> = OnceLock::new();
    INDEX
        .get_or_init(|| VARIABLE_CODES.iter().map(|c| (c.code, c)).collect())
        .get(code)
        .copied()
}

impl SrcPanoImage {
    /// Value of a PTO variable code; `None` and an error log for unknown codes.
    pub fn get_var(&self, code: &str) -> Option<Real> {
        match variable_code(code) {
            Some(c) => Some(c.get(self)),
            None => {
                error!("unknown image variable code `{code}`");
                None
            }
        }
    }

    /// Write a PTO variable code; returns false and logs for unknown codes.
    pub fn set_var(&mut self, code: &str, value: Real) -> bool {
        match variable_code(code) {
            Some(c) => {
                c.set(self, value);
                true
            }
            None => {
                error!("unknown image variable code `{code}`");
                false
            }
        }
    }

    /// All scalar code values of this image.
    pub fn variable_map(&self) -> Vec<(&'static str, Real)> {
        VARIABLE_CODES.iter().map(|c| (c.code, c.get(self))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;

    #[test]
    fn codes_reach_typed_variables() {
        let mut img = SrcPanoImage::default();
        assert!(img.set_var("b", 0.01));
        assert!(img.set_var("e", -3.0));
        assert!(img.set_var("Rc", 0.5));
        assert!(img.set_var("TrX", 1.5));
        assert_eq!(img.get::<var::RadialDistortion>(), [0.0, 0.01, 0.0, 1.0]);
        assert_eq!(img.get::<var::RadialDistortionCenterShift>(), Vec2::new(0.0, -3.0));
        assert_eq!(img.get::<var::EmorParams>()[2], 0.5);
        assert_eq!(img.get_var("TrX"), Some(1.5));
        assert_eq!(img.get_var("v"), Some(50.0));
    }

    #[test]
    fn unknown_code_is_a_no_op() {
        let mut img = SrcPanoImage::default();
        assert!(!img.set_var("zz", 1.0));
        assert_eq!(img.get_var("zz"), None);
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<_> = VARIABLE_CODES.iter().map(|c| c.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), VARIABLE_CODES.len());
        assert_eq!(variable_code("Vy").map(|c| c.kind), Some(ImageVariableKind::RadialVigCorrCenterShift));
    }
}
