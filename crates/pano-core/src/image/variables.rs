//! The image variable table.
//!
//! One row per variable: `Kind: field: Type = default;`. The macro expands the table into
//! the [`SrcPanoImage`] struct, the [`ImageVariableKind`] enum, one marker type per row in
//! [`var`], and kind-dispatched link operations used by the grouping code.

use serde::{Deserialize, Serialize};

use super::{CropMode, Projection, ResponseType, VigCorrMode};
use crate::{ImageVariable, MaskPolygon, Real, Rect2D, Size2D, Vec2};

/// Static access to one variable of a [`SrcPanoImage`].
pub trait Variable {
    type Value: Clone;
    const KIND: ImageVariableKind;

    fn cell(img: &SrcPanoImage) -> &ImageVariable<Self::Value>;
    fn cell_mut(img: &mut SrcPanoImage) -> &mut ImageVariable<Self::Value>;
}

macro_rules! image_variables {
    ($( $(#[$meta:meta])* $kind:ident : $field:ident : $ty:ty = $default:expr; )*) => {
        /// Parameters of one source photograph.
        ///
        /// Every variable is an independently linkable [`ImageVariable`]. Use the generic
        /// accessors with a marker from [`var`]:
        /// `img.set::<var::Hfov>(90.0)`, `img.link::<var::Hfov>(&other)`.
        #[derive(Clone, Debug, Serialize, Deserialize)]
        #[serde(default)]
        pub struct SrcPanoImage {
            $( $field: ImageVariable<$ty>, )*
        }

        impl Default for SrcPanoImage {
            fn default() -> Self {
                Self {
                    $( $field: ImageVariable::new($default), )*
                }
            }
        }

        /// Identifies one image variable, independent of its value type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum ImageVariableKind {
            $( $(#[$meta])* $kind, )*
        }

        impl ImageVariableKind {
            /// Every kind, in table order.
            pub const ALL: &'static [ImageVariableKind] = &[$( ImageVariableKind::$kind, )*];

            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$kind => stringify!($kind), )*
                }
            }
        }

        /// Marker types naming each variable for the generic accessors.
        pub mod var {
            $(
                $(#[$meta])*
                #[derive(Debug, Clone, Copy)]
                pub struct $kind;
            )*
        }

        $(
            impl Variable for var::$kind {
                type Value = $ty;
                const KIND: ImageVariableKind = ImageVariableKind::$kind;

                fn cell(img: &SrcPanoImage) -> &ImageVariable<$ty> {
                    &img.$field
                }

                fn cell_mut(img: &mut SrcPanoImage) -> &mut ImageVariable<$ty> {
                    &mut img.$field
                }
            }
        )*

        impl SrcPanoImage {
            /// Link only `kind`, leaving coupled variables alone.
            pub(crate) fn link_single(&mut self, kind: ImageVariableKind, other: &SrcPanoImage) {
                match kind {
                    $( ImageVariableKind::$kind => self.$field.link_with(&other.$field), )*
                }
            }

            fn unlink_single(&mut self, kind: ImageVariableKind) {
                match kind {
                    $( ImageVariableKind::$kind => self.$field.unlink(), )*
                }
            }

            /// Link state of the variable `kind`.
            pub fn is_linked_kind(&self, kind: ImageVariableKind) -> bool {
                match kind {
                    $( ImageVariableKind::$kind => self.$field.is_linked(), )*
                }
            }

            /// Pairwise link test of the variable `kind`.
            pub fn is_linked_with_kind(&self, kind: ImageVariableKind, other: &SrcPanoImage) -> bool {
                match kind {
                    $( ImageVariableKind::$kind => self.$field.is_linked_with(&other.$field), )*
                }
            }

            /// Copy every value of `other`, writing through existing links.
            pub fn assign_values(&mut self, other: &SrcPanoImage) {
                $( self.$field.set_value(other.$field.value()); )*
            }
        }
    };
}

image_variables! {
    /// Path of the image file.
    Filename: filename: String = String::new();
    /// Pixel size.
    Size: size: Size2D = Size2D::default();
    Projection: projection: Projection = Projection::Rectilinear;
    /// Horizontal field of view in degrees.
    Hfov: hfov: Real = 50.0;
    ResponseType: response_type: ResponseType = ResponseType::Emor;
    /// EMoR camera response coefficients.
    EmorParams: emor_params: Vec<Real> = vec![0.0; 5];
    ExposureValue: exposure_value: Real = 0.0;
    Gamma: gamma: Real = 1.0;
    WhiteBalanceRed: white_balance_red: Real = 1.0;
    WhiteBalanceBlue: white_balance_blue: Real = 1.0;
    Roll: roll: Real = 0.0;
    Pitch: pitch: Real = 0.0;
    Yaw: yaw: Real = 0.0;
    X: x: Real = 0.0;
    Y: y: Real = 0.0;
    Z: z: Real = 0.0;
    TranslationPlaneYaw: translation_plane_yaw: Real = 0.0;
    TranslationPlanePitch: translation_plane_pitch: Real = 0.0;
    /// Stack identifier.
    Stack: stack: Real = 0.0;
    /// Radial polynomial `a, b, c, d`.
    RadialDistortion: radial_distortion: [Real; 4] = [0.0, 0.0, 0.0, 1.0];
    RadialDistortionRed: radial_distortion_red: [Real; 4] = [0.0, 0.0, 0.0, 1.0];
    RadialDistortionBlue: radial_distortion_blue: [Real; 4] = [0.0, 0.0, 0.0, 1.0];
    RadialDistortionCenterShift: radial_distortion_center_shift: Vec2 = Vec2::zeros();
    Shear: shear: Vec2 = Vec2::zeros();
    CropMode: crop_mode: CropMode = CropMode::NoCrop;
    CropRect: crop_rect: Rect2D = Rect2D::default();
    AutoCenterCrop: auto_center_crop: bool = true;
    VigCorrMode: vig_corr_mode: VigCorrMode = VigCorrMode::default();
    FlatfieldFilename: flatfield_filename: String = String::new();
    RadialVigCorrCoeff: radial_vig_corr_coeff: [Real; 4] = [1.0, 0.0, 0.0, 0.0];
    RadialVigCorrCenterShift: radial_vig_corr_center_shift: Vec2 = Vec2::zeros();
    ExifModel: exif_model: String = String::new();
    ExifMake: exif_make: String = String::new();
    ExifLens: exif_lens: String = String::new();
    ExifCropFactor: exif_crop_factor: Real = 0.0;
    ExifFocalLength: exif_focal_length: Real = 0.0;
    ExifOrientation: exif_orientation: Real = 0.0;
    ExifAperture: exif_aperture: Real = 0.0;
    ExifIso: exif_iso: Real = 0.0;
    ExifDistance: exif_distance: Real = 0.0;
    ExifFocalLength35: exif_focal_length35: Real = 0.0;
    ExifExposureTime: exif_exposure_time: Real = 0.0;
    ExifDate: exif_date: String = String::new();
    ExifExposureMode: exif_exposure_mode: i32 = 0;
    /// Masks as entered by the user.
    Masks: masks: Vec<MaskPolygon> = Vec::new();
    /// Masks in effect after propagation.
    ActiveMasks: active_masks: Vec<MaskPolygon> = Vec::new();
    Active: active: bool = true;
}

impl ImageVariableKind {
    /// Variables that are linked and unlinked together with this one.
    pub fn coupled(self) -> &'static [ImageVariableKind] {
        match self {
            Self::RadialVigCorrCoeff | Self::RadialVigCorrCenterShift => &[Self::VigCorrMode],
            Self::EmorParams => &[Self::ResponseType],
            _ => &[],
        }
    }
}

impl SrcPanoImage {
    pub fn get<V: Variable>(&self) -> V::Value {
        V::cell(self).value()
    }

    /// Borrow a value without cloning it.
    pub fn with<V: Variable, R>(&self, f: impl FnOnce(&V::Value) -> R) -> R {
        V::cell(self).with(f)
    }

    /// Write a value, visible on every image linked on this variable.
    pub fn set<V: Variable>(&mut self, value: V::Value) {
        V::cell_mut(self).set_value(value);
        self.after_set(V::KIND);
    }

    pub fn update<V: Variable>(&mut self, f: impl FnOnce(&mut V::Value)) {
        V::cell_mut(self).update(f);
        self.after_set(V::KIND);
    }

    /// Join the link class of `other` for variable `V`, adopting its value.
    pub fn link<V: Variable>(&mut self, other: &SrcPanoImage) {
        self.link_kind(V::KIND, other);
    }

    pub fn unlink<V: Variable>(&mut self) {
        self.unlink_kind(V::KIND);
    }

    pub fn is_linked<V: Variable>(&self) -> bool {
        V::cell(self).is_linked()
    }

    pub fn is_linked_with<V: Variable>(&self, other: &SrcPanoImage) -> bool {
        V::cell(self).is_linked_with(V::cell(other))
    }

    pub fn variable<V: Variable>(&self) -> &ImageVariable<V::Value> {
        V::cell(self)
    }

    /// Link by kind, including coupled variables.
    pub fn link_kind(&mut self, kind: ImageVariableKind, other: &SrcPanoImage) {
        self.link_single(kind, other);
        for &k in kind.coupled() {
            self.link_single(k, other);
        }
    }

    /// Unlink by kind, including coupled variables.
    pub fn unlink_kind(&mut self, kind: ImageVariableKind) {
        self.unlink_single(kind);
        for &k in kind.coupled() {
            self.unlink_single(k);
        }
    }

    fn after_set(&mut self, kind: ImageVariableKind) {
        match kind {
            ImageVariableKind::Size | ImageVariableKind::CropMode => {
                if self.get::<var::CropMode>() == CropMode::NoCrop {
                    let full = Rect2D::from_size(self.get::<var::Size>());
                    self.crop_rect.set_value(full);
                }
            }
            _ => {}
        }
    }
}
