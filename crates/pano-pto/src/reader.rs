//! Script reader.
//!
//! Reading happens in two passes. The first scans every line into plain records (`i`/`o`
//! lines, control points, masks, comments); the second merges the image records and builds
//! linked [`SrcPanoImage`]s in script order, so a link can only point at an image that
//! already exists.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::BufRead,
    path::Path,
};

use log::{debug, warn};
use pano_core::{
    var, BlendingMechanism, ColorCorrection, ControlPoint, FileFormat, ImageVariableKind, Interpolator,
    MaskPolygon, OptimizerSwitch, OutputMode, Panorama, PanoramaOptions, PhotometricSwitch, Projection,
    ProjectionFormat, Real, RemapAcceleration, Remapper, ResponseType, Size2D, SrcPanoImage, VigCorrMode,
    LENS_VARIABLES, VARIABLE_CODES,
};

use crate::{
    image_line::{HuginImageMeta, ImageLine, ImgFileLine},
    parse::{param, parse_rect, pt_param, string_param},
    PtoError,
};

/// Position variables that may only be shared together with yaw.
const YAW_DEPENDENT: [ImageVariableKind; 7] = [
    ImageVariableKind::Pitch,
    ImageVariableKind::Roll,
    ImageVariableKind::X,
    ImageVariableKind::Y,
    ImageVariableKind::Z,
    ImageVariableKind::TranslationPlaneYaw,
    ImageVariableKind::TranslationPlanePitch,
];

/// Lens variables without a script code; shared whenever a coded lens variable is.
const IMPLIED_LENS: [ImageVariableKind; 5] = [
    ImageVariableKind::Projection,
    ImageVariableKind::Gamma,
    ImageVariableKind::RadialDistortionRed,
    ImageVariableKind::RadialDistortionBlue,
    ImageVariableKind::FlatfieldFilename,
];

/// Read a script into a new panorama.
///
/// Relative image file names get `prefix` prepended; the prefix is also stored as the
/// panorama's file prefix. The result has not been through
/// [`Panorama::change_finished`]; hand it to [`Panorama::adopt_state`] to replace a live
/// project, which then stays untouched when reading fails.
///
/// # Errors
///
/// [`PtoError::Io`] on read failures, [`PtoError::Empty`] for input without any content,
/// [`PtoError::ForwardLink`] for a link to an image not yet defined and
/// [`PtoError::ProjectionMismatch`] for lens links between different projections.
/// Malformed single fields are logged and skipped.
pub fn read_pto<R: BufRead>(input: R, prefix: &str) -> Result<Panorama, PtoError> {
    let mut script = Script::default();
    let mut content = false;
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        content |= !line.is_empty();
        script.scan_line(idx + 1, line);
    }
    if !content {
        return Err(PtoError::Empty);
    }
    script.build(prefix)
}

#[derive(Debug, Default)]
struct Script {
    options: PanoramaOptions,
    optimizer_switch: OptimizerSwitch,
    photometric_switch: PhotometricSwitch,
    i_lines: Vec<ImageLine>,
    o_lines: Vec<ImageLine>,
    hugin_meta: Vec<HuginImageMeta>,
    img_files: Vec<ImgFileLine>,
    optimize: Vec<(String, usize)>,
    ctrl_points: Vec<ControlPoint>,
    masks: Vec<MaskPolygon>,
    ptgui: bool,
    /// Added to control point image numbers (newer PTGui scripts count from 1).
    cp_offset: i64,
    /// The next image line describes a PTGui dummy lens, not an image.
    skip_lens_line: bool,
}

impl Script {
    fn scan_line(&mut self, nr: usize, line: &str) {
        match line.as_bytes().first() {
            Some(b'p') => parse_panorama_line(&mut self.options, line),
            Some(b'm') => parse_misc_line(&mut self.options, line),
            Some(b'i' | b'o') if self.skip_lens_line => {
                debug!("line {nr}: skipping dummy lens line");
                self.skip_lens_line = false;
            }
            Some(b'i') => self.i_lines.push(ImageLine::parse(nr, line)),
            Some(b'o') => self.o_lines.push(ImageLine::parse(nr, line)),
            Some(b'v') => self.scan_optimize_line(nr, line),
            Some(b'c') => self.scan_ctrl_point(nr, line),
            Some(b'k') => self.scan_mask(nr, line),
            Some(b'#') => self.scan_comment(nr, line),
            Some(_) => debug!("line {nr}: ignoring `{line}`"),
            None => {}
        }
    }

    fn scan_optimize_line(&mut self, nr: usize, line: &str) {
        if self.ptgui {
            return;
        }
        for token in line[1..].split_whitespace() {
            // a bare letter means image 0
            let token = if token.len() == 1 {
                format!("{token}0")
            } else {
                token.to_owned()
            };
            let Some(split) = token.find(|c: char| c.is_ascii_digit()).filter(|&s| s > 0) else {
                debug!("line {nr}: ignoring optimize token `{token}`");
                continue;
            };
            match token[split..].parse::<usize>() {
                Ok(image) => self.optimize.push((token[..split].to_owned(), image)),
                Err(_) => warn!("line {nr}: ignoring optimize token `{token}`"),
            }
        }
    }

    fn scan_ctrl_point(&mut self, nr: usize, line: &str) {
        let image = |name| {
            param::<i64>(line, name)
                .map(|n| n + self.cp_offset)
                .and_then(|n| usize::try_from(n).ok())
        };
        let (Some(image1), Some(image2)) = (image("n"), image("N")) else {
            warn!("line {nr}: control point without valid images");
            return;
        };
        self.ctrl_points.push(ControlPoint::new(
            image1,
            param(line, "x").unwrap_or(0.0),
            param(line, "y").unwrap_or(0.0),
            image2,
            param(line, "X").unwrap_or(0.0),
            param(line, "Y").unwrap_or(0.0),
            param(line, "t").unwrap_or(ControlPoint::X_Y),
        ));
    }

    fn scan_mask(&mut self, nr: usize, line: &str) {
        let (Some(image), Some(kind), Some(points)) =
            (param::<usize>(line, "i"), param::<i64>(line, "t"), pt_param(line, "p"))
        else {
            warn!("line {nr}: incomplete mask line");
            return;
        };
        match MaskPolygon::from_polygon_line(image, kind, points) {
            Ok(mask) => self.masks.push(mask),
            Err(err) => warn!("line {nr}: {err}"),
        }
    }

    fn scan_comment(&mut self, nr: usize, line: &str) {
        if line.starts_with("# ptGui project file") {
            self.ptgui = true;
        }
        if line.starts_with("#-dummyimage") {
            self.skip_lens_line = true;
        }
        if self.ptgui {
            if let Some(version) = line.strip_prefix("#-fileversion").and_then(|v| v.trim().parse::<u32>().ok()) {
                debug!("line {nr}: PTGui script version {version}");
                if version > 7 {
                    self.cp_offset = -1;
                }
            }
        }

        if line.starts_with("#-hugin ") {
            self.hugin_meta.push(HuginImageMeta::parse(line));
        } else if line.starts_with("#-imgfile ") {
            match ImgFileLine::parse(line) {
                Some(file) => self.img_files.push(file),
                None => warn!("line {nr}: could not parse `{line}`"),
            }
        } else if let Some(option) = line.strip_prefix("#hugin_") {
            let (key, value) = option
                .split_once(char::is_whitespace)
                .map_or((option, ""), |(k, v)| (k, v.trim()));
            self.apply_option(nr, key, value);
        }
    }

    fn apply_option(&mut self, nr: usize, key: &str, value: &str) {
        let opts = &mut self.options;
        let flag = value == "true";
        match key {
            "ptoversion" => debug!("line {nr}: script version {value}"),
            "optimizeReferenceImage" => match value.parse() {
                Ok(image) => opts.optimize_reference_image = image,
                Err(_) => warn!("line {nr}: invalid reference image `{value}`"),
            },
            "remapper" => match Remapper::from_name(value) {
                Some(remapper) => opts.remapper = remapper,
                None => warn!("line {nr}: unknown remapper `{value}`"),
            },
            "blender" => match BlendingMechanism::from_name(value) {
                Some(blender) => opts.blend_mode = blender,
                None => warn!("line {nr}: unknown blender `{value}`"),
            },
            "remapUsingGPU" => opts.remap_using_gpu = flag,
            "outputLDRBlended" => opts.output_ldr_blended = flag,
            "outputLDRLayers" => opts.output_ldr_layers = flag,
            "outputLDRExposureRemapped" => opts.output_ldr_exposure_remapped = flag,
            "outputLDRExposureLayers" => opts.output_ldr_exposure_layers = flag,
            "outputLDRExposureLayersFused" => opts.output_ldr_exposure_layers_fused = flag,
            "outputLDRStacks" => opts.output_ldr_stacks = flag,
            "outputLDRExposureBlended" => opts.output_ldr_exposure_blended = flag,
            "outputHDRBlended" => opts.output_hdr_blended = flag,
            "outputHDRLayers" => opts.output_hdr_layers = flag,
            "outputHDRStacks" => opts.output_hdr_stacks = flag,
            "outputLayersCompression" => opts.output_layers_compression = value.to_owned(),
            "outputImageType" => opts.output_image_type = value.to_owned(),
            "outputImageTypeCompression" => opts.output_image_type_compression = value.to_owned(),
            "outputImageTypeHDR" => opts.output_image_type_hdr = value.to_owned(),
            "outputImageTypeHDRCompression" => opts.output_image_type_hdr_compression = value.to_owned(),
            "enblendOptions" => opts.enblend_options = value.to_owned(),
            "enfuseOptions" => opts.enfuse_options = value.to_owned(),
            "hdrmergeOptions" => opts.hdrmerge_options = value.to_owned(),
            "outputStacksMinOverlap" | "outputLayersExposureDiff" => match value.parse::<Real>() {
                Ok(v) if key == "outputStacksMinOverlap" => opts.output_stacks_min_overlap = v,
                Ok(v) => opts.output_layers_exposure_diff = v,
                Err(_) => warn!("line {nr}: invalid number for {key}: `{value}`"),
            },
            "optimizerMasterSwitch" => match value.parse() {
                Ok(bits) => self.optimizer_switch = OptimizerSwitch(bits),
                Err(_) => warn!("line {nr}: invalid optimizer switch `{value}`"),
            },
            "optimizerPhotoMasterSwitch" => match value.parse() {
                Ok(bits) => self.photometric_switch = PhotometricSwitch(bits),
                Err(_) => warn!("line {nr}: invalid photometric switch `{value}`"),
            },
            _ => debug!("line {nr}: ignoring option #hugin_{key}"),
        }
    }

    fn build(self, prefix: &str) -> Result<Panorama, PtoError> {
        let Script {
            mut options,
            optimizer_switch,
            photometric_switch,
            mut i_lines,
            o_lines,
            hugin_meta,
            img_files,
            optimize,
            ctrl_points,
            masks,
            ..
        } = self;

        // `i` lines are the reference; `o` lines only fill gaps when both describe the
        // same number of images
        if i_lines.len() < o_lines.len() {
            debug!("using {} o lines in place of {} i lines", o_lines.len(), i_lines.len());
            i_lines = o_lines;
        } else if i_lines.len() == o_lines.len() {
            for (i, o) in i_lines.iter_mut().zip(&o_lines) {
                i.merge_from(o);
            }
        }
        let n = i_lines.len();

        if img_files.len() == n {
            for (info, file) in i_lines.iter_mut().zip(img_files) {
                if !file.filename.is_empty() && file.width > 0 {
                    info.filename = Some(file.filename);
                    info.width = Some(file.width);
                    info.height = Some(file.height);
                }
            }
        }
        if !hugin_meta.is_empty() && hugin_meta.len() != n {
            debug!("{} image metadata lines for {n} images, ignored", hugin_meta.len());
        }
        let meta = (hugin_meta.len() == n).then_some(hugin_meta);

        let mut images: Vec<SrcPanoImage> = Vec::with_capacity(n);
        for (index, info) in i_lines.iter().enumerate() {
            let img_meta = meta.as_ref().map(|m| m[index]);
            let img = build_image(index, info, img_meta, &images, prefix)?;
            images.push(img);
        }

        for mask in masks {
            match images.get_mut(mask.img_nr()) {
                Some(img) => img.add_mask(mask),
                None => warn!("mask for missing image {}", mask.img_nr()),
            }
        }

        let mut optvec = vec![BTreeSet::new(); n];
        for (name, image) in optimize {
            match optvec.get_mut(image) {
                Some(entry) => {
                    entry.insert(name);
                }
                None => warn!("optimize variable {name}{image} for missing image"),
            }
        }

        let before = ctrl_points.len();
        let ctrl_points: Vec<ControlPoint> = ctrl_points
            .into_iter()
            .filter(|cp| cp.image1 < n && cp.image2 < n)
            .collect();
        if ctrl_points.len() != before {
            warn!("dropped {} control points of missing images", before - ctrl_points.len());
        }

        if options.optimize_reference_image >= n.max(1) {
            warn!("reference image {} out of range", options.optimize_reference_image);
            options.optimize_reference_image = 0;
        }
        if options.color_reference_image >= n.max(1) {
            warn!("color reference image {} out of range", options.color_reference_image);
            options.color_reference_image = 0;
        }

        let mut pano = Panorama::new();
        pano.set_file_prefix(prefix);
        pano.set_options(options);
        pano.set_optimizer_switch(optimizer_switch);
        pano.set_photometric_optimizer_switch(photometric_switch);
        for img in images {
            pano.add_image(img);
        }
        pano.set_optimize_vector(optvec);
        pano.set_ctrl_points(ctrl_points);
        debug!("read {} images, {} control points", n, pano.ctrl_points().len());
        Ok(pano)
    }
}

fn build_image(
    index: usize,
    info: &ImageLine,
    meta: Option<HuginImageMeta>,
    images: &[SrcPanoImage],
    prefix: &str,
) -> Result<SrcPanoImage, PtoError> {
    let name = info.filename.clone().unwrap_or_default();
    let name = if prefix.is_empty() || name.is_empty() || Path::new(&name).is_absolute() {
        name
    } else {
        format!("{prefix}{name}")
    };
    let size = Size2D::new(info.width.unwrap_or(0), info.height.unwrap_or(0));
    let mut img = SrcPanoImage::new(name, size);

    let projection = info.projection.map_or(Projection::Rectilinear, |code| {
        Projection::from_code(code).unwrap_or_else(|| {
            warn!("line {}: unknown image projection {code}", info.line);
            Projection::Rectilinear
        })
    });
    img.set::<var::Projection>(projection);
    for code in VARIABLE_CODES {
        code.set(&mut img, info.value(code.code));
    }

    match info.vig_corr_mode {
        Some(mode) => img.set::<var::VigCorrMode>(VigCorrMode(mode)),
        None => {
            // scripts without a mode predate vignetting coefficients
            img.set::<var::VigCorrMode>(VigCorrMode::RADIAL | VigCorrMode::DIV);
            img.set::<var::RadialVigCorrCoeff>([1.0, 0.0, 0.0, 0.0]);
        }
    }
    if let Some(flatfield) = &info.flatfield {
        img.set::<var::FlatfieldFilename>(flatfield.clone());
    }
    if let Some(code) = info.response_type {
        match ResponseType::from_code(code) {
            Some(response) => img.set::<var::ResponseType>(response),
            None => warn!("line {}: unknown response type {code}", info.line),
        }
    }
    if let Some(meta) = meta {
        if let Some(crop_factor) = meta.crop_factor {
            img.set::<var::ExifCropFactor>(crop_factor);
        }
        // older scripts write the flag only when it is set on a cropped image
        match meta.auto_center_crop {
            Some(auto) => img.set::<var::AutoCenterCrop>(auto),
            None if info.crop.is_some() => img.set::<var::AutoCenterCrop>(false),
            None => {}
        }
        img.set::<var::Active>(!meta.disabled);
    }

    link_to_earlier(index, info, &mut img, images)?;

    if let Some(crop) = info.crop {
        img.set::<var::CropRect>(crop);
        img.update_crop_mode();
    }
    Ok(img)
}

/// Link `img` (image `index`) as its script line says, repairing stack links.
fn link_to_earlier(
    index: usize,
    info: &ImageLine,
    img: &mut SrcPanoImage,
    images: &[SrcPanoImage],
) -> Result<(), PtoError> {
    let mut links: BTreeMap<ImageVariableKind, usize> = BTreeMap::new();
    for code in VARIABLE_CODES {
        let Some(target) = info.link(code.code) else {
            continue;
        };
        if target >= images.len() {
            return Err(PtoError::ForwardLink {
                line: info.line,
                link: target,
                images: images.len(),
            });
        }
        links.entry(code.kind).or_insert(target);
    }

    match links.get(&ImageVariableKind::Yaw).copied() {
        None => {
            for kind in YAW_DEPENDENT {
                if let Some(target) = links.remove(&kind) {
                    warn!(
                        "line {}: image {index} links {} to image {target} but not yaw, unlinking",
                        info.line,
                        kind.name()
                    );
                    for code in VARIABLE_CODES.iter().filter(|c| c.kind == kind) {
                        code.set(img, code.get(&images[target]));
                    }
                }
            }
        }
        Some(anchor) => {
            for kind in YAW_DEPENDENT {
                if !links.contains_key(&kind) {
                    warn!(
                        "line {}: image {index} links yaw but not {}, linking it to image {anchor}",
                        info.line,
                        kind.name()
                    );
                    links.insert(kind, anchor);
                }
            }
        }
    }

    if let Some(anchor) = LENS_VARIABLES.iter().find_map(|kind| links.get(kind).copied()) {
        let anchor_img = &images[anchor];
        if anchor_img.projection() != img.projection() {
            return Err(PtoError::ProjectionMismatch {
                line: info.line,
                image: index,
                anchor,
            });
        }
        for kind in IMPLIED_LENS {
            links.entry(kind).or_insert(anchor);
        }
        if anchor_img.size() == img.size() {
            links.entry(ImageVariableKind::Size).or_insert(anchor);
        } else {
            warn!(
                "line {}: image {index} shares a lens with image {anchor} but differs in size",
                info.line
            );
        }
    }

    for (kind, target) in links {
        img.link_kind(kind, &images[target]);
    }
    Ok(())
}

/// Apply a `p` line to `opts`.
fn parse_panorama_line(opts: &mut PanoramaOptions, line: &str) {
    let code = param::<i64>(line, "f").unwrap_or(0);
    opts.set_projection(ProjectionFormat::from_code(code).unwrap_or_else(|| {
        warn!("unknown panorama projection {code}");
        ProjectionFormat::Equirectangular
    }));
    opts.set_width(param(line, "w").unwrap_or(800), false);
    opts.set_hfov(param(line, "v").unwrap_or(50.0), false);
    opts.set_height(param(line, "h").unwrap_or(600));
    opts.output_exposure_value = param(line, "E").unwrap_or(0.0);
    opts.output_mode = param::<i64>(line, "R")
        .and_then(OutputMode::from_code)
        .unwrap_or(OutputMode::Ldr);
    opts.output_pixel_type = string_param(line, "T").unwrap_or_default();
    if let Some(roi) = pt_param(line, "S").and_then(parse_rect) {
        opts.set_roi(roi);
    }
    if let Some(raw) = pt_param(line, "P") {
        let params: Vec<Real> = raw.split_whitespace().filter_map(|v| v.parse().ok()).collect();
        if params.len() == opts.projection_params().len() {
            opts.set_projection_params(&params);
        } else {
            warn!("ignoring {} projection parameters for {:?}", params.len(), opts.projection());
        }
    }
    if let Some(format) = pt_param(line, "n") {
        parse_output_format(opts, format);
    }

    let (correction, reference) = [
        ("k", ColorCorrection::BrightnessColor),
        ("b", ColorCorrection::Brightness),
        ("d", ColorCorrection::Color),
    ]
    .into_iter()
    .find_map(|(name, correction)| param::<usize>(line, name).map(|r| (correction, r)))
    .unwrap_or((ColorCorrection::None, 0));
    opts.color_correction = correction;
    opts.color_reference_image = reference;
}

/// Apply the `n"..."` value of a `p` line, e.g. `JPEG q80` or `TIFF_m c:LZW r:CROP`.
fn parse_output_format(opts: &mut PanoramaOptions, format: &str) {
    let name = format.split_whitespace().next().unwrap_or_default();
    opts.output_format = FileFormat::from_name(name);
    match opts.output_format {
        FileFormat::Jpeg => {
            if let Some(quality) = param(format, "q") {
                opts.quality = quality;
            }
        }
        f if f.is_tiff() => {
            if f == FileFormat::TiffM {
                opts.save_coord_imgs = param::<i32>(format, "p").is_some_and(|p| p != 0);
            }
            if let Some(compression) = pt_param(format, "c:") {
                if matches!(compression, "NONE" | "LZW" | "DEFLATE") {
                    opts.tiff_compression = compression.to_owned();
                } else {
                    warn!("unknown TIFF compression `{compression}`");
                }
            }
            opts.tiff_save_roi = pt_param(format, "r:") == Some("CROP");
        }
        _ => {}
    }
}

/// Apply an `m` line to `opts`.
fn parse_misc_line(opts: &mut PanoramaOptions, line: &str) {
    if let Some(code) = param::<i64>(line, "i") {
        match Interpolator::from_code(code) {
            Some(interpolator) => opts.interpolator = interpolator,
            None => warn!("unknown interpolator {code}"),
        }
    }
    if let Some(gamma) = param(line, "g") {
        opts.gamma = gamma;
    }
    opts.remap_acceleration = match param::<i64>(line, "f") {
        Some(0) => RemapAcceleration::MaxSpeedup,
        Some(1) => RemapAcceleration::MediumSpeedup,
        _ => RemapAcceleration::NoSpeedup,
    };
    if let Some(sigma) = param(line, "m") {
        opts.huber_sigma = sigma;
    }
    if let Some(sigma) = param(line, "p") {
        opts.photometric_huber_sigma = sigma;
    }
    opts.photometric_symmetric_error = param::<i64>(line, "s").is_some_and(|s| s != 0);
}
