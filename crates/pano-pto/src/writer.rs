//! Script writer.

use std::{
    collections::{BTreeSet, HashSet},
    io::Write,
};

use pano_core::{
    var, ColorCorrection, CropMode, FileFormat, Panorama, PanoramaOptions, Rect2D, RemapAcceleration,
    SrcPanoImage, LENS_VARIABLES, VARIABLE_CODES,
};

use crate::{parse::format_rect, PtoError};

/// Write every image of `pano`.
///
/// Image file names starting with `strip_prefix` are written relative to it.
///
/// # Errors
///
/// [`PtoError::Io`] when writing fails.
pub fn write_pto<W: Write>(pano: &Panorama, out: W, strip_prefix: &str) -> Result<(), PtoError> {
    let all: BTreeSet<usize> = (0..pano.nr_of_images()).collect();
    write_pto_images(pano, &all, out, strip_prefix)
}

/// Write the images in `images`, renumbered in ascending order.
///
/// Links, optimize entries, control points and masks are written only where every image
/// they touch is part of the set. Indices past the end are ignored.
///
/// # Errors
///
/// [`PtoError::Io`] when writing fails.
pub fn write_pto_images<W: Write>(
    pano: &Panorama,
    images: &BTreeSet<usize>,
    mut out: W,
    strip_prefix: &str,
) -> Result<(), PtoError> {
    let order: Vec<usize> = images.iter().copied().filter(|&i| i < pano.nr_of_images()).collect();
    let script_index = |image: usize| order.iter().position(|&i| i == image);
    let imgs = pano.images();
    let opts = pano.options();

    writeln!(out, "# hugin project file")?;
    writeln!(out, "#hugin_ptoversion 2")?;
    let color_ref = script_index(opts.color_reference_image).unwrap_or(0);
    writeln!(out, "{}", panorama_line(opts, color_ref))?;
    writeln!(out, "{}", misc_line(opts))?;
    writeln!(out)?;

    writeln!(out, "# image lines")?;
    for (pos, &i) in order.iter().enumerate() {
        let img = &imgs[i];
        writeln!(out, "{}", hugin_line(img))?;
        writeln!(out, "{}", image_line(img, &order[..pos], imgs, strip_prefix))?;
    }
    writeln!(out)?;

    writeln!(out, "# specify variables that should be optimized")?;
    let optvec = pano.optimize_vector();
    // lens variables shared by several images are optimized once, at the first of them
    let mut written: HashSet<(&str, usize)> = HashSet::new();
    for (pos, &i) in order.iter().enumerate() {
        for name in &optvec[i] {
            let lens_kind = pano_core::variable_code(name)
                .map(|c| c.kind)
                .filter(|kind| LENS_VARIABLES.contains(kind));
            if let Some(kind) = lens_kind {
                let anchor = order[..pos]
                    .iter()
                    .position(|&prev| imgs[prev].is_linked_with_kind(kind, &imgs[i]))
                    .unwrap_or(pos);
                if !written.insert((name.as_str(), anchor)) {
                    continue;
                }
            }
            writeln!(out, "v {name}{pos}")?;
        }
    }
    writeln!(out, "v")?;
    writeln!(out)?;

    writeln!(out, "# control points")?;
    for cp in pano.ctrl_points() {
        if let (Some(n1), Some(n2)) = (script_index(cp.image1), script_index(cp.image2)) {
            writeln!(
                out,
                "c n{n1} N{n2} x{} y{} X{} Y{} t{}",
                cp.x1, cp.y1, cp.x2, cp.y2, cp.mode
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "# masks")?;
    for (pos, &i) in order.iter().enumerate() {
        for mask in imgs[i].get::<var::Masks>() {
            writeln!(out, "{}", mask.polygon_line(pos))?;
        }
    }
    writeln!(out)?;

    let flag = |b: bool| if b { "true" } else { "false" };
    writeln!(
        out,
        "#hugin_optimizeReferenceImage {}",
        script_index(opts.optimize_reference_image).unwrap_or(0)
    )?;
    writeln!(out, "#hugin_blender {}", opts.blend_mode.name())?;
    writeln!(out, "#hugin_remapper {}", opts.remapper.name())?;
    writeln!(out, "#hugin_remapUsingGPU {}", flag(opts.remap_using_gpu))?;
    writeln!(out, "#hugin_enblendOptions {}", opts.enblend_options)?;
    writeln!(out, "#hugin_enfuseOptions {}", opts.enfuse_options)?;
    writeln!(out, "#hugin_hdrmergeOptions {}", opts.hdrmerge_options)?;
    for (key, value) in [
        ("LDRBlended", opts.output_ldr_blended),
        ("LDRLayers", opts.output_ldr_layers),
        ("LDRExposureRemapped", opts.output_ldr_exposure_remapped),
        ("LDRExposureLayers", opts.output_ldr_exposure_layers),
        ("LDRExposureLayersFused", opts.output_ldr_exposure_layers_fused),
        ("LDRStacks", opts.output_ldr_stacks),
        ("LDRExposureBlended", opts.output_ldr_exposure_blended),
        ("HDRBlended", opts.output_hdr_blended),
        ("HDRLayers", opts.output_hdr_layers),
        ("HDRStacks", opts.output_hdr_stacks),
    ] {
        writeln!(out, "#hugin_output{key} {}", flag(value))?;
    }
    writeln!(out, "#hugin_outputLayersCompression {}", opts.output_layers_compression)?;
    writeln!(out, "#hugin_outputImageType {}", opts.output_image_type)?;
    writeln!(out, "#hugin_outputImageTypeCompression {}", opts.output_image_type_compression)?;
    writeln!(out, "#hugin_outputImageTypeHDR {}", opts.output_image_type_hdr)?;
    writeln!(out, "#hugin_outputImageTypeHDRCompression {}", opts.output_image_type_hdr_compression)?;
    writeln!(out, "#hugin_outputStacksMinOverlap {}", opts.output_stacks_min_overlap)?;
    writeln!(out, "#hugin_outputLayersExposureDiff {}", opts.output_layers_exposure_diff)?;
    writeln!(out, "#hugin_optimizerMasterSwitch {}", pano.optimizer_switch().bits())?;
    writeln!(out, "#hugin_optimizerPhotoMasterSwitch {}", pano.photometric_optimizer_switch().bits())?;
    out.flush()?;
    Ok(())
}

/// The `p` line; `color_ref` is the script index of the color reference image.
fn panorama_line(opts: &PanoramaOptions, color_ref: usize) -> String {
    let mut line = format!(
        "p f{} w{} h{} v{} ",
        opts.projection().code(),
        opts.width(),
        opts.height(),
        opts.hfov()
    );
    match opts.color_correction {
        ColorCorrection::None => {}
        ColorCorrection::BrightnessColor => line += &format!(" k{color_ref}"),
        ColorCorrection::Brightness => line += &format!(" b{color_ref}"),
        ColorCorrection::Color => line += &format!(" d{color_ref}"),
    }
    line += &format!(" E{} R{}", opts.output_exposure_value, opts.output_mode.code());
    if !opts.output_pixel_type.is_empty() {
        line += &format!(" T{}", opts.output_pixel_type);
    }
    if !opts.projection_params().is_empty() {
        let params: Vec<String> = opts.projection_params().iter().map(ToString::to_string).collect();
        line += &format!(" P\"{}\"", params.join(" "));
    }
    if opts.roi() != Rect2D::from_size(opts.size()) {
        line += &format!(" S{}", format_rect(&opts.roi()));
    }
    line += &format!(" n\"{}", opts.output_format.name());
    if opts.output_format == FileFormat::Jpeg {
        line += &format!(" q{}", opts.quality);
    } else if opts.output_format.is_tiff() {
        line += &format!(" c:{}", opts.tiff_compression);
        if opts.tiff_save_roi {
            line += " r:CROP";
        }
    }
    line.push('"');
    line
}

/// The `m` line.
fn misc_line(opts: &PanoramaOptions) -> String {
    let mut line = format!("m g{} i{}", opts.gamma, opts.interpolator.code());
    match opts.remap_acceleration {
        RemapAcceleration::NoSpeedup => {}
        RemapAcceleration::MaxSpeedup => line += " f0",
        RemapAcceleration::MediumSpeedup => line += " f1",
    }
    line += &format!(" m{} p{}", opts.huber_sigma, opts.photometric_huber_sigma);
    if opts.photometric_symmetric_error {
        line += " s1";
    }
    line
}

/// The `#-hugin` comment carrying what `i` lines cannot express.
fn hugin_line(img: &SrcPanoImage) -> String {
    let mut line = format!(
        "#-hugin  cropFactor={} autoCenterCrop={}",
        img.get::<var::ExifCropFactor>(),
        u8::from(img.get::<var::AutoCenterCrop>())
    );
    if !img.is_active() {
        line += " disabled";
    }
    line
}

/// The `i` line of `img`; `earlier` are the images already written, in script order.
fn image_line(img: &SrcPanoImage, earlier: &[usize], imgs: &[SrcPanoImage], strip_prefix: &str) -> String {
    let size = img.size();
    let mut line = format!("i w{} h{} f{}", size.width, size.height, img.projection().code());
    for code in VARIABLE_CODES {
        let anchor = earlier
            .iter()
            .position(|&prev| imgs[prev].is_linked_with_kind(code.kind, img));
        match anchor {
            Some(anchor) => line += &format!(" {}={anchor}", code.code),
            None => line += &format!(" {}{}", code.code, code.get(img)),
        }
    }
    if img.crop_mode() != CropMode::NoCrop {
        line += &format!(" S{}", format_rect(&img.crop_rect()));
    }
    line += &format!(" Vm{}", img.get::<var::VigCorrMode>().bits());
    let flatfield = img.get::<var::FlatfieldFilename>();
    if !flatfield.is_empty() {
        line += &format!(" Vf\"{flatfield}\"");
    }
    let response = img.get::<var::ResponseType>().code();
    if response > 0 {
        line += &format!(" Rt{response}");
    }
    let filename = img.filename();
    let filename = match filename.strip_prefix(strip_prefix) {
        Some(relative) if !strip_prefix.is_empty() => relative,
        _ => filename.as_str(),
    };
    line += &format!(" n\"{filename}\"");
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::{ProjectionFormat, Size2D};

    #[test]
    fn option_lines() {
        let mut opts = PanoramaOptions::default();
        opts.set_projection(ProjectionFormat::Cylindrical);
        opts.set_width(2000, false);
        opts.set_height(1000);
        opts.set_hfov(120.0, false);
        opts.color_correction = ColorCorrection::BrightnessColor;
        opts.color_reference_image = 1;
        opts.output_format = FileFormat::Jpeg;
        opts.quality = 90;
        opts.photometric_huber_sigma = 0.5;
        assert_eq!(panorama_line(&opts, 1), "p f1 w2000 h1000 v120  k1 E0 R0 n\"JPEG q90\"");
        assert_eq!(misc_line(&opts), "m g1 i0 f0 m2 p0.5");
    }

    #[test]
    fn image_lines_link_to_the_first_earlier_image() {
        let mut a = SrcPanoImage::new("/photos/a.jpg", Size2D::new(400, 300));
        let mut b = SrcPanoImage::new("/photos/b.jpg", Size2D::new(400, 300));
        a.set::<var::Hfov>(65.5);
        b.link::<var::Hfov>(&a);
        let imgs = [a, b];
        let line = image_line(&imgs[1], &[0], &imgs, "/photos/");
        assert!(line.starts_with("i w400 h300 f0 v=0 Ra0 "), "{line}");
        assert!(line.ends_with(" Vm5 n\"b.jpg\""), "{line}");
        let first = image_line(&imgs[0], &[], &imgs, "");
        assert!(first.starts_with("i w400 h300 f0 v65.5 "), "{first}");
        assert!(first.ends_with(" n\"/photos/a.jpg\""), "{first}");
        assert_eq!(hugin_line(&imgs[0]), "#-hugin  cropFactor=0 autoCenterCrop=1");
    }
}
