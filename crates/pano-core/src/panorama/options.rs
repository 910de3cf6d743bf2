//! Output panorama options.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::{Real, Rect2D, Size2D};

/// Output projection, numbered as in the `p` line `f` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionFormat {
    Rectilinear = 0,
    Cylindrical = 1,
    Equirectangular = 2,
    FullFrameFisheye = 3,
    Stereographic = 4,
    Mercator = 5,
    TransverseMercator = 6,
    Sinusoidal = 7,
    Lambert = 8,
    LambertAzimuthal = 9,
    AlbersEqualAreaConic = 10,
    MillerCylindrical = 11,
    Panini = 12,
    Architectural = 13,
    Orthographic = 14,
    Equisolid = 15,
    EquiPanini = 16,
    Biplane = 17,
    Triplane = 18,
    GeneralPanini = 19,
    Thoby = 20,
    HammerAitoff = 21,
}

/// Range and default of one projection parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParam {
    pub min: Real,
    pub max: Real,
    pub default: Real,
}

const fn param(min: Real, max: Real, default: Real) -> ProjectionParam {
    ProjectionParam { min, max, default }
}

impl ProjectionFormat {
    pub const ALL: [ProjectionFormat; 22] = [
        Self::Rectilinear,
        Self::Cylindrical,
        Self::Equirectangular,
        Self::FullFrameFisheye,
        Self::Stereographic,
        Self::Mercator,
        Self::TransverseMercator,
        Self::Sinusoidal,
        Self::Lambert,
        Self::LambertAzimuthal,
        Self::AlbersEqualAreaConic,
        Self::MillerCylindrical,
        Self::Panini,
        Self::Architectural,
        Self::Orthographic,
        Self::Equisolid,
        Self::EquiPanini,
        Self::Biplane,
        Self::Triplane,
        Self::GeneralPanini,
        Self::Thoby,
        Self::HammerAitoff,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn max_hfov(self) -> Real {
        match self {
            Self::Rectilinear | Self::TransverseMercator => 179.0,
            Self::Orthographic => 180.0,
            Self::Panini | Self::EquiPanini => 280.0,
            Self::GeneralPanini => 320.0,
            Self::Biplane | Self::Triplane => 359.0,
            _ => 360.0,
        }
    }

    pub fn max_vfov(self) -> Real {
        match self {
            Self::Rectilinear
            | Self::Cylindrical
            | Self::Mercator
            | Self::Lambert
            | Self::Panini
            | Self::EquiPanini
            | Self::Biplane
            | Self::Triplane => 179.0,
            Self::FullFrameFisheye
            | Self::Stereographic
            | Self::TransverseMercator
            | Self::LambertAzimuthal
            | Self::Equisolid
            | Self::Thoby => 360.0,
            Self::GeneralPanini => 320.0,
            _ => 180.0,
        }
    }

    /// Parameters accepted in the `P` field.
    pub fn parameters(self) -> &'static [ProjectionParam] {
        const ALBERS: &[ProjectionParam] = &[param(-90.0, 90.0, 0.0), param(-90.0, 90.0, 60.0)];
        const BIPLANE: &[ProjectionParam] = &[param(1.0, 179.0, 45.0)];
        const TRIPLANE: &[ProjectionParam] = &[param(1.0, 120.0, 60.0)];
        const GENERAL_PANINI: &[ProjectionParam] = &[
            param(0.0, 150.0, 0.0),
            param(-100.0, 100.0, 0.0),
            param(-100.0, 100.0, 0.0),
        ];
        match self {
            Self::AlbersEqualAreaConic => ALBERS,
            Self::Biplane => BIPLANE,
            Self::Triplane => TRIPLANE,
            Self::GeneralPanini => GENERAL_PANINI,
            _ => &[],
        }
    }

    /// True when the vertical field of view can be derived from the canvas size.
    pub fn fov_calc_supported(self) -> bool {
        matches!(
            self,
            Self::Rectilinear
                | Self::Cylindrical
                | Self::Equirectangular
                | Self::Mercator
                | Self::Sinusoidal
                | Self::MillerCylindrical
                | Self::Panini
        )
    }

    /// Horizontal canvas coordinate of longitude `lambda` on the equator.
    fn horizontal(self, lambda: Real) -> Real {
        match self {
            Self::Rectilinear => lambda.tan(),
            Self::Panini => 2.0 * (lambda / 2.0).tan(),
            _ => lambda,
        }
    }

    /// Vertical canvas coordinate of latitude `phi` on the central meridian.
    fn vertical(self, phi: Real) -> Real {
        match self {
            Self::Rectilinear | Self::Cylindrical | Self::Panini => phi.tan(),
            Self::Mercator => (FRAC_PI_4 + phi / 2.0).tan().ln(),
            Self::MillerCylindrical => 1.25 * (FRAC_PI_4 + 0.4 * phi).tan().ln(),
            _ => phi,
        }
    }

    fn latitude(self, y: Real) -> Real {
        match self {
            Self::Rectilinear | Self::Cylindrical | Self::Panini => y.atan(),
            Self::Mercator => y.sinh().atan(),
            Self::MillerCylindrical => 2.5 * (0.8 * y).exp().atan() - 0.625 * std::f64::consts::PI,
            _ => y,
        }
    }
}

/// Output file formats, in `n"..."` naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Jpeg,
    Png,
    Tiff,
    TiffM,
    TiffMask,
    TiffMultilayer,
    TiffMultilayerMask,
    Pict,
    Psd,
    PsdM,
    PsdMask,
    Pan,
    Ivr,
    IvrJava,
    Vrml,
    Qtvr,
    Hdr,
    HdrM,
    Exr,
    ExrM,
}

impl FileFormat {
    pub const ALL: [FileFormat; 20] = [
        Self::Jpeg,
        Self::Png,
        Self::Tiff,
        Self::TiffM,
        Self::TiffMask,
        Self::TiffMultilayer,
        Self::TiffMultilayerMask,
        Self::Pict,
        Self::Psd,
        Self::PsdM,
        Self::PsdMask,
        Self::Pan,
        Self::Ivr,
        Self::IvrJava,
        Self::Vrml,
        Self::Qtvr,
        Self::Hdr,
        Self::HdrM,
        Self::Exr,
        Self::ExrM,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Tiff => "TIFF",
            Self::TiffM => "TIFF_m",
            Self::TiffMask => "TIFF_mask",
            Self::TiffMultilayer => "TIFF_multilayer",
            Self::TiffMultilayerMask => "TIFF_multilayer_mask",
            Self::Pict => "PICT",
            Self::Psd => "PSD",
            Self::PsdM => "PSD_m",
            Self::PsdMask => "PSD_mask",
            Self::Pan => "PAN",
            Self::Ivr => "IVR",
            Self::IvrJava => "IVR_java",
            Self::Vrml => "VRML",
            Self::Qtvr => "QTVR",
            Self::Hdr => "HDR",
            Self::HdrM => "HDR_m",
            Self::Exr => "EXR",
            Self::ExrM => "EXR_m",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Tiff | Self::TiffM | Self::TiffMask | Self::TiffMultilayer | Self::TiffMultilayerMask => "tif",
            Self::Pict => "pict",
            Self::Psd | Self::PsdM | Self::PsdMask => "psd",
            Self::Pan => "pan",
            Self::Ivr => "ivr",
            Self::IvrJava => "IVR_java",
            Self::Vrml => "wrl",
            Self::Qtvr => "mov",
            Self::Hdr | Self::HdrM => "hdr",
            Self::Exr | Self::ExrM => "exr",
        }
    }

    /// Format by `n"..."` name; unknown names fall back to `TIFF_m` with an error log.
    pub fn from_name(name: &str) -> Self {
        Self::ALL.into_iter().find(|f| f.name() == name).unwrap_or_else(|| {
            error!("could not parse format {name}");
            Self::TiffM
        })
    }

    pub fn is_tiff(self) -> bool {
        matches!(
            self,
            Self::Tiff | Self::TiffM | Self::TiffMask | Self::TiffMultilayer | Self::TiffMultilayerMask
        )
    }
}

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant = $code,)*
        }

        impl $name {
            pub fn code(self) -> i32 {
                self as i32
            }

            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

coded_enum!(
    /// Remapping speedup requested from the stitcher.
    RemapAcceleration { NoSpeedup = 0, MaxSpeedup = 1, MediumSpeedup = 2 }
);

coded_enum!(
    OutputMode { Ldr = 0, Hdr = 1 }
);

coded_enum!(
    HdrMergeType { Average = 0, Deghost = 1 }
);

coded_enum!(
    BlendingMechanism { NoBlend = 0, PtBlender = 1, Enblend = 2, Smartblend = 3, PtMasker = 4 }
);

coded_enum!(
    Remapper { Nona = 0, PtMender = 1 }
);

coded_enum!(
    ColorCorrection { None = 0, BrightnessColor = 1, Brightness = 2, Color = 3 }
);

coded_enum!(
    /// Pixel interpolator of the remapper, `m` line `i` field.
    Interpolator {
        Cubic = 0,
        Spline16 = 1,
        Spline36 = 2,
        Sinc256 = 3,
        Spline64 = 4,
        Bilinear = 5,
        NearestNeighbour = 6,
        Sinc1024 = 7,
    }
);

impl BlendingMechanism {
    /// Name used by `#hugin_blender`.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoBlend => "none",
            Self::PtBlender => "PTblender",
            Self::Enblend => "enblend",
            Self::Smartblend => "smartblend",
            Self::PtMasker => "PTmasker",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::NoBlend, Self::PtBlender, Self::Enblend, Self::Smartblend, Self::PtMasker]
            .into_iter()
            .find(|b| b.name() == name)
    }
}

impl Remapper {
    /// Name used by `#hugin_remapper`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Nona => "nona",
            Self::PtMender => "PTmender",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Nona, Self::PtMender].into_iter().find(|r| r.name() == name)
    }
}

/// Everything about the output panorama that is not per image.
///
/// Size, field of view, projection and region of interest are kept consistent through the
/// setters; the remaining fields are plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaOptions {
    projection: ProjectionFormat,
    projection_params: Vec<Real>,
    hfov: Real,
    size: Size2D,
    roi: Rect2D,

    pub outfile: String,
    pub output_format: FileFormat,
    pub quality: i32,
    pub tiff_compression: String,
    pub tiff_save_roi: bool,
    pub color_correction: ColorCorrection,
    pub color_reference_image: usize,
    pub gamma: Real,
    pub interpolator: Interpolator,
    pub optimize_reference_image: usize,
    pub remap_acceleration: RemapAcceleration,
    pub blend_mode: BlendingMechanism,
    pub hdr_merge_mode: HdrMergeType,
    pub remapper: Remapper,
    pub remap_using_gpu: bool,
    pub save_coord_imgs: bool,
    pub huber_sigma: Real,
    pub photometric_huber_sigma: Real,
    pub photometric_symmetric_error: bool,
    pub output_mode: OutputMode,
    pub output_ldr_blended: bool,
    pub output_ldr_layers: bool,
    pub output_ldr_exposure_remapped: bool,
    pub output_ldr_exposure_layers: bool,
    pub output_ldr_exposure_layers_fused: bool,
    pub output_ldr_stacks: bool,
    pub output_ldr_exposure_blended: bool,
    pub output_hdr_blended: bool,
    pub output_hdr_layers: bool,
    pub output_hdr_stacks: bool,
    pub output_layers_compression: String,
    pub output_image_type: String,
    pub output_image_type_compression: String,
    pub output_image_type_hdr: String,
    pub output_image_type_hdr_compression: String,
    pub enblend_options: String,
    pub enfuse_options: String,
    pub hdrmerge_options: String,
    pub output_exposure_value: Real,
    pub output_emor_params: Vec<Real>,
    pub output_pixel_type: String,
    pub output_stacks_min_overlap: Real,
    pub output_layers_exposure_diff: Real,
}

impl Default for PanoramaOptions {
    fn default() -> Self {
        let size = Size2D::new(3000, 1500);
        Self {
            projection: ProjectionFormat::Equirectangular,
            projection_params: Vec::new(),
            hfov: 360.0,
            size,
            roi: Rect2D::from_size(size),
            outfile: "panorama".into(),
            output_format: FileFormat::TiffM,
            quality: 100,
            tiff_compression: "LZW".into(),
            tiff_save_roi: true,
            color_correction: ColorCorrection::None,
            color_reference_image: 0,
            gamma: 1.0,
            interpolator: Interpolator::Cubic,
            optimize_reference_image: 0,
            remap_acceleration: RemapAcceleration::MaxSpeedup,
            blend_mode: BlendingMechanism::Enblend,
            hdr_merge_mode: HdrMergeType::Average,
            remapper: Remapper::Nona,
            remap_using_gpu: false,
            save_coord_imgs: false,
            huber_sigma: 2.0,
            photometric_huber_sigma: 2.0 / 255.0,
            photometric_symmetric_error: false,
            output_mode: OutputMode::Ldr,
            output_ldr_blended: true,
            output_ldr_layers: false,
            output_ldr_exposure_remapped: false,
            output_ldr_exposure_layers: false,
            output_ldr_exposure_layers_fused: false,
            output_ldr_stacks: false,
            output_ldr_exposure_blended: false,
            output_hdr_blended: false,
            output_hdr_layers: false,
            output_hdr_stacks: false,
            output_layers_compression: "LZW".into(),
            output_image_type: "tif".into(),
            output_image_type_compression: "LZW".into(),
            output_image_type_hdr: "exr".into(),
            output_image_type_hdr_compression: "LZW".into(),
            enblend_options: String::new(),
            enfuse_options: String::new(),
            hdrmerge_options: String::new(),
            output_exposure_value: 0.0,
            output_emor_params: vec![0.0; 5],
            output_pixel_type: String::new(),
            output_stacks_min_overlap: 0.7,
            output_layers_exposure_diff: 0.5,
        }
    }
}

impl PanoramaOptions {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn projection(&self) -> ProjectionFormat {
        self.projection
    }

    pub fn projection_params(&self) -> &[Real] {
        &self.projection_params
    }

    pub fn hfov(&self) -> Real {
        self.hfov
    }

    pub fn size(&self) -> Size2D {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn roi(&self) -> Rect2D {
        self.roi
    }

    pub fn max_hfov(&self) -> Real {
        self.projection.max_hfov()
    }

    pub fn max_vfov(&self) -> Real {
        self.projection.max_vfov()
    }

    pub fn output_extension(&self) -> &'static str {
        self.output_format.extension()
    }

    fn has_full_roi(&self) -> bool {
        self.roi == Rect2D::from_size(self.size)
    }

    /// Region of interest, clipped to the canvas.
    pub fn set_roi(&mut self, roi: Rect2D) {
        self.roi = roi.intersect(&Rect2D::from_size(self.size));
    }

    /// Switch projection, keeping the field of view where both projections support it.
    pub fn set_projection(&mut self, projection: ProjectionFormat) {
        let keep = self.projection.fov_calc_supported() && projection.fov_calc_supported();
        let vfov = keep.then(|| self.vfov());
        self.projection = projection;
        self.reset_projection_parameters();
        self.set_hfov(self.hfov.min(projection.max_hfov()), false);
        if let Some(vfov) = vfov {
            self.set_vfov(vfov.min(projection.max_vfov()));
        }
    }

    pub fn reset_projection_parameters(&mut self) {
        self.projection_params = self.projection.parameters().iter().map(|p| p.default).collect();
    }

    /// Replace projection parameters, clamped to their ranges. A count mismatch is ignored.
    pub fn set_projection_params(&mut self, params: &[Real]) {
        let ranges = self.projection.parameters();
        if ranges.len() != params.len() {
            warn!(
                "{:?} takes {} parameters, got {}",
                self.projection,
                ranges.len(),
                params.len()
            );
            return;
        }
        self.projection_params = params
            .iter()
            .zip(ranges)
            .map(|(v, r)| v.clamp(r.min, r.max))
            .collect();
        if self.hfov > self.max_hfov() {
            self.set_hfov(self.max_hfov(), false);
        }
    }

    /// Set the horizontal field of view, clamped to `(0, max_hfov]`.
    ///
    /// With `keep_view` the vertical field of view is kept by resizing the canvas height.
    pub fn set_hfov(&mut self, hfov: Real, keep_view: bool) {
        let keep_view = keep_view && self.projection.fov_calc_supported();
        let hfov = if hfov <= 0.0 { 1.0 } else { hfov };
        let vfov = keep_view.then(|| self.vfov());
        self.hfov = hfov.min(self.max_hfov());
        if let Some(vfov) = vfov {
            self.set_vfov(vfov.min(self.max_vfov()));
        }
    }

    fn canvas_scale(&self) -> Real {
        let mut half = (self.hfov / 2.0).to_radians();
        if self.projection == ProjectionFormat::Rectilinear {
            half = half.min(FRAC_PI_2 - 1e-6);
        }
        Real::from(self.size.width) / 2.0 / self.projection.horizontal(half)
    }

    /// Vertical field of view of the canvas; the horizontal one when it cannot be derived.
    pub fn vfov(&self) -> Real {
        if !self.projection.fov_calc_supported() || self.size.width == 0 {
            return self.hfov;
        }
        let y = Real::from(self.size.height) / 2.0 / self.canvas_scale();
        2.0 * self.projection.latitude(y).to_degrees()
    }

    /// Resize the canvas height to show `vfov` degrees.
    pub fn set_vfov(&mut self, vfov: Real) {
        if !self.projection.fov_calc_supported() {
            return;
        }
        let vfov = vfov.min(self.max_vfov());
        let vfov = if vfov <= 0.0 { 1.0 } else { vfov };
        let half = (vfov / 2.0).to_radians().min(FRAC_PI_2 - 1e-6);
        let y = self.projection.vertical(half) * self.canvas_scale();
        let height = (2.0 * y).round().abs().max(1.0) as u32;
        self.set_height(height);
    }

    /// Set the canvas width. Equirectangular and sinusoidal widths are made even.
    ///
    /// A cropped ROI scales horizontally; with `keep_view` the height and ROI scale too.
    pub fn set_width(&mut self, width: u32, keep_view: bool) {
        let width = if matches!(
            self.projection,
            ProjectionFormat::Equirectangular | ProjectionFormat::Sinusoidal
        ) && width % 2 == 1
        {
            width + 1
        } else {
            width
        };
        let nocrop = self.has_full_roi();
        let scale = if self.size.width == 0 {
            1.0
        } else {
            Real::from(width) / Real::from(self.size.width)
        };
        let round = |v: i32| (Real::from(v) * scale).round() as i32;
        self.size.width = width;
        if nocrop {
            self.roi = Rect2D::from_size(self.size);
        } else {
            let r = self.roi;
            self.set_roi(Rect2D::new(round(r.left), r.top, round(r.right), r.bottom));
        }
        if keep_view {
            self.size.height = (Real::from(self.size.height) * scale).round() as u32;
            if nocrop {
                self.roi = Rect2D::from_size(self.size);
            } else {
                let r = self.roi;
                self.set_roi(Rect2D::new(r.left, round(r.top), r.right, round(r.bottom)));
            }
            if self.projection.fov_calc_supported() && self.vfov() > self.max_vfov() {
                self.set_vfov(self.max_vfov());
            }
        }
    }

    /// Set the canvas height; a cropped ROI moves by half the change.
    pub fn set_height(&mut self, height: u32) {
        let height = height.max(1);
        let nocrop = self.has_full_roi();
        let dh = i64::from(height) - i64::from(self.size.height);
        self.size.height = height;
        if nocrop {
            self.roi = Rect2D::from_size(self.size);
        } else {
            let shift = i32::try_from(dh / 2).unwrap_or(0);
            self.set_roi(self.roi.move_by(0, shift));
        }
    }
}
