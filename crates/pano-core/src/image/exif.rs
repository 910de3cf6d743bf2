use std::{collections::BTreeMap, path::Path};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::{calc_hfov, var, SrcPanoImage, FULL_FRAME_DIAGONAL};
use crate::{Real, Size2D};

/// One decoded EXIF tag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExifValue {
    Number(Vec<Real>),
    Text(String),
}

/// Pixel size and tags of an image file, keyed like `Exif.Photo.FNumber`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifRecord {
    pub width: u32,
    pub height: u32,
    pub tags: BTreeMap<String, ExifValue>,
}

impl ExifRecord {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_number(mut self, key: &str, value: Real) -> Self {
        self.tags.insert(key.to_string(), ExifValue::Number(vec![value]));
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), ExifValue::Text(value.to_string()));
        self
    }

    /// First numeric component of a tag; text tags are parsed when possible.
    pub fn number(&self, key: &str) -> Option<Real> {
        match self.tags.get(key)? {
            ExifValue::Number(v) => v.first().copied(),
            ExifValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Tag as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.tags.get(key)? {
            ExifValue::Text(s) => Some(s.trim().to_string()),
            ExifValue::Number(v) => v.first().map(|x| x.to_string()),
        }
    }

    fn positive(&self, key: &str) -> Real {
        self.number(key).filter(|v| *v > 0.0).unwrap_or(0.0)
    }
}

/// Source of EXIF metadata for image files.
pub trait ExifReader {
    /// Decode `path`; `None` if the file cannot be opened or decoded.
    fn read(&self, path: &Path) -> Option<ExifRecord>;
}

/// Results of EXIF ingestion besides the stored `Exif*` variables.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExifLensInfo {
    pub focal_length: Real,
    pub crop_factor: Real,
}

impl SrcPanoImage {
    /// Read EXIF metadata of the image file through `reader`.
    ///
    /// `focal_length` and `crop_factor` are caller fallbacks used when the tags lack them and
    /// are updated with the values found. With `apply_values`, roll, exposure (when
    /// `apply_exposure`) and HFOV are written to the image. Returns false if the file cannot
    /// be read, or if values should be applied but focal length or crop factor stay unknown.
    pub fn read_exif(
        &mut self,
        reader: &dyn ExifReader,
        lens: &mut ExifLensInfo,
        apply_values: bool,
        apply_exposure: bool,
    ) -> bool {
        let filename = self.filename();
        let Some(exif) = reader.read(Path::new(&filename)) else {
            warn!("unable to read EXIF data from {filename}");
            return false;
        };
        let (width, height) = (exif.width, exif.height);
        if width == 0 || height == 0 {
            warn!("{filename}: image has no pixels");
            return false;
        }
        self.set::<var::Size>(Size2D::new(width, height));
        let img_ratio = Real::from(width) / Real::from(height);

        let exposure_time = exif.positive("Exif.Photo.ExposureTime");
        let f_number = exif.positive("Exif.Photo.FNumber");
        let iso = exif.positive("Exif.Photo.ISOSpeedRatings");
        let mut ev = 0.0;
        if exposure_time > 0.0 && f_number > 0.0 {
            let gain = if iso > 0.0 { iso / 100.0 } else { 1.0 };
            ev = (f_number * f_number / (gain * exposure_time)).log2();
            debug!("{filename}: EV {ev}");
        }

        let make = exif.text("Exif.Image.Make").unwrap_or_else(|| "Unknown".into());
        let model = exif.text("Exif.Image.Model").unwrap_or_else(|| "Unknown".into());
        self.set::<var::ExifMake>(make);
        self.set::<var::ExifModel>(model.clone());
        if let Some(lens_name) = exif.text("Exif.Photo.LensModel") {
            self.set::<var::ExifLens>(lens_name);
        }
        if let Some(date) = exif.text("Exif.Photo.DateTimeOriginal") {
            self.set::<var::ExifDate>(date);
        }
        if let Some(mode) = exif.number("Exif.Photo.ExposureMode") {
            self.set::<var::ExifExposureMode>(mode as i32);
        }

        let mut roll = 0.0;
        if width >= height {
            roll = match exif.number("Exif.Image.Orientation").map(|o| o as i64) {
                Some(3) => 180.0,
                Some(6) => 90.0,
                Some(8) => 270.0,
                _ => 0.0,
            };
        }
        let pix_x = exif.positive("Exif.Photo.PixelXDimension");
        let pix_y = exif.positive("Exif.Photo.PixelYDimension");
        if pix_x > 0.0 && pix_y > 0.0 && (pix_x / pix_y - img_ratio).abs() > 0.1 {
            // the file was rotated without updating its tags
            roll = 0.0;
        }

        let mut crop_factor = lens.crop_factor;
        if let Some(c) = sensor_crop_factor(&exif, &model, width, height) {
            crop_factor = c;
        } else if let Some(diag) = exif.number("Exif.Olympus.FocalPlaneDiagonal").filter(|d| *d > 0.0) {
            crop_factor = FULL_FRAME_DIAGONAL / diag;
        }
        debug!("{filename}: crop factor {crop_factor}");

        let exif_focal = exif.positive("Exif.Photo.FocalLength");
        let exif_focal35 = exif.positive("Exif.Photo.FocalLengthIn35mmFilm");
        let mut focal_length = lens.focal_length;
        if exif_focal > 0.0 && crop_factor > 0.0 {
            focal_length = exif_focal;
        } else if exif_focal35 > 0.0 && exif_focal > 0.0 {
            crop_factor = exif_focal35 / exif_focal;
            focal_length = exif_focal;
        } else if exif_focal35 > 0.0 {
            // only a 35mm equivalent, assume a full frame sensor
            crop_factor = 1.0;
            focal_length = exif_focal35;
        } else if exif_focal > 0.0 {
            focal_length = exif_focal;
            crop_factor = 0.0;
        }

        self.set::<var::ExifFocalLength>(focal_length);
        self.set::<var::ExifFocalLength35>(exif_focal35);
        self.set::<var::ExifCropFactor>(crop_factor);
        self.set::<var::ExifOrientation>(roll);
        self.set::<var::ExifAperture>(f_number);
        self.set::<var::ExifIso>(iso);
        self.set::<var::ExifExposureTime>(exposure_time);
        self.set::<var::ExifDistance>(exif.positive("Exif.Photo.SubjectDistance"));
        lens.focal_length = focal_length;
        lens.crop_factor = crop_factor;

        if !apply_values {
            return true;
        }
        self.set::<var::Roll>(roll);
        if apply_exposure {
            self.set::<var::ExposureValue>(ev);
        }
        if focal_length > 0.0 && crop_factor > 0.0 {
            let hfov = calc_hfov(self.projection(), focal_length, crop_factor, self.size());
            self.set::<var::Hfov>(hfov);
            true
        } else {
            false
        }
    }
}

/// Crop factor from the focal plane resolution tags.
fn sensor_crop_factor(exif: &ExifRecord, model: &str, width: u32, height: u32) -> Option<Real> {
    let (mut px_w, mut px_h) = match (
        exif.positive("Exif.Image.ImageWidth"),
        exif.positive("Exif.Image.ImageLength"),
    ) {
        (w, h) if w > 0.0 && h > 0.0 => (w, h),
        _ => (Real::from(width), Real::from(height)),
    };
    if px_w < px_h {
        std::mem::swap(&mut px_w, &mut px_h);
    }
    let unit = match exif.number("Exif.Photo.FocalPlaneResolutionUnit").map(|u| u as i64) {
        Some(3) => 10.0,
        Some(4) => 1.0,
        Some(5) => 0.001,
        _ => 25.4,
    };
    let x_res = exif.positive("Exif.Photo.FocalPlaneXResolution");
    let y_res = exif.positive("Exif.Photo.FocalPlaneYResolution");
    if x_res <= 0.0 || y_res <= 0.0 {
        return None;
    }
    let (mut sx, mut sy) = (px_w * unit / x_res, px_h * unit / y_res);
    if model == "Canon EOS 20D" {
        (sx, sy) = (22.5, 15.0);
    }
    let r_sensor = sx / sy;
    let r_img = Real::from(width) / Real::from(height);
    if (r_sensor > 1.0 && r_img < 1.0) || (r_sensor < 1.0 && r_img > 1.0) {
        std::mem::swap(&mut sx, &mut sy);
    }
    Some(FULL_FRAME_DIAGONAL / (sx * sx + sy * sy).sqrt())
}
