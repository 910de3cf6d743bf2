use std::{
    collections::BTreeSet,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use pano_core::{
    var, ImageGraph, OptimizerSwitch, Panorama, PhotometricSwitch, Projection, Real,
    StandardImageVariableGroups,
};
use pano_pto::{load_file, save_file, write_pto};
use serde::{Deserialize, Serialize};

/// Command line tools over PTO panorama projects.
#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and rewrite PTO panorama projects")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print images, lenses, stacks, control points and optimized variables as JSON.
    Summary {
        /// Project file to read.
        pto: PathBuf,
    },
    /// Read a project and write it back.
    Rewrite {
        input: PathBuf,
        output: PathBuf,
        /// Geometric optimizer switch bits; rebuilds the optimize vector.
        #[arg(long)]
        geometry: Option<u32>,
        /// Photometric optimizer switch bits; rebuilds the optimize vector.
        #[arg(long)]
        photometric: Option<u32>,
        /// Write image names under this prefix relative to it, instead of relative to the
        /// output directory.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the groups of images joined by control points or shared positions as JSON.
    Components {
        /// Project file to read.
        pto: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageSummary {
    filename: String,
    width: u32,
    height: u32,
    projection: Projection,
    hfov: Real,
    yaw: Real,
    pitch: Real,
    roll: Real,
    active: bool,
    lens: usize,
    stack: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectSummary {
    images: Vec<ImageSummary>,
    lenses: Vec<BTreeSet<usize>>,
    stacks: Vec<BTreeSet<usize>>,
    control_points: usize,
    optimize: Vec<BTreeSet<String>>,
    connected: bool,
}

fn summarize(pano: &Panorama) -> ProjectSummary {
    let groups = StandardImageVariableGroups::new(pano);
    let images = pano
        .images()
        .iter()
        .enumerate()
        .map(|(i, img)| ImageSummary {
            filename: img.filename(),
            width: img.size().width,
            height: img.size().height,
            projection: img.projection(),
            hfov: img.hfov(),
            yaw: img.get::<var::Yaw>(),
            pitch: img.get::<var::Pitch>(),
            roll: img.get::<var::Roll>(),
            active: img.is_active(),
            lens: groups.lenses().part_number(i),
            stack: groups.stacks().part_number(i),
        })
        .collect();
    ProjectSummary {
        images,
        lenses: groups.lenses().parts_set(),
        stacks: groups.stacks().parts_set(),
        control_points: pano.ctrl_points().len(),
        optimize: pano.optimize_vector().clone(),
        connected: ImageGraph::new(pano).is_connected(),
    }
}

fn summary_json(path: &Path) -> Result<String> {
    let pano = load_file(path)?;
    Ok(serde_json::to_string_pretty(&summarize(&pano))?)
}

fn components_json(path: &Path) -> Result<String> {
    let pano = load_file(path)?;
    let components = ImageGraph::new(&pano).components();
    Ok(serde_json::to_string_pretty(&components)?)
}

fn rewrite(
    input: &Path,
    output: &Path,
    geometry: Option<u32>,
    photometric: Option<u32>,
    prefix: Option<&str>,
) -> Result<()> {
    let mut pano = load_file(input)?;
    if geometry.is_some() || photometric.is_some() {
        if let Some(bits) = geometry {
            pano.set_optimizer_switch(OptimizerSwitch(bits));
        }
        if let Some(bits) = photometric {
            pano.set_photometric_optimizer_switch(PhotometricSwitch(bits));
        }
        pano.update_optimize_vector();
        debug!("rebuilt optimize vector for {} images", pano.nr_of_images());
    }
    match prefix {
        Some(prefix) => {
            let file = File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
            write_pto(&pano, BufWriter::new(file), prefix)
                .with_context(|| format!("failed to write project {}", output.display()))?;
        }
        None => save_file(&pano, output)?,
    }
    Ok(())
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Summary { pto } => println!("{}", summary_json(&pto)?),
        Command::Components { pto } => println!("{}", components_json(&pto)?),
        Command::Rewrite {
            input,
            output,
            geometry,
            photometric,
            prefix,
        } => rewrite(&input, &output, geometry, photometric, prefix.as_deref())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Write};
    use tempfile::NamedTempFile;

    const PROJECT: &str = "\
p f2 w3000 h1500 v360 n\"TIFF_m c:LZW r:CROP\"
m g1 i0 f0 m2 p0.00784314
i w400 h300 f0 v50 y0 n\"/photos/a.jpg\"
i w400 h300 f0 v=0 y40 n\"/photos/b.jpg\"
i w400 h300 f0 v=0 y=1 n\"/photos/c.jpg\"
i w600 h400 f0 v30 y120 n\"/photos/d.jpg\"
c n0 N1 x10 y10 X300 Y12 t0
";

    fn project_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(PROJECT.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn summary_lists_groups() {
        let file = project_file();
        let json = summary_json(file.path()).unwrap();
        let summary: ProjectSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary.images.len(), 4);
        assert_eq!(summary.lenses.len(), 2);
        assert_eq!(summary.stacks.len(), 3);
        assert_eq!(summary.control_points, 1);
        assert_eq!(summary.images[2].lens, summary.images[0].lens);
        assert_eq!(summary.images[2].stack, summary.images[1].stack);
        assert_eq!(summary.images[3].hfov, 30.0);
        assert!(!summary.connected);
    }

    #[test]
    fn components_follow_control_points_and_stacks() {
        let file = project_file();
        let json = components_json(file.path()).unwrap();
        let components: Vec<BTreeSet<usize>> = serde_json::from_str(&json).unwrap();
        assert_eq!(components, [BTreeSet::from([0, 1, 2]), BTreeSet::from([3])]);
    }

    #[test]
    fn rewrite_rebuilds_the_optimize_vector() {
        let input = project_file();
        let output = NamedTempFile::new().unwrap();
        rewrite(
            input.path(),
            output.path(),
            Some(OptimizerSwitch::VIEW.bits()),
            None,
            Some("/photos/"),
        )
        .unwrap();
        let text = fs::read_to_string(output.path()).unwrap();
        assert!(text.contains("n\"a.jpg\""), "{text}");
        for line in ["v v0", "v v3", "v y1", "v r3"] {
            assert!(text.lines().any(|l| l == line), "{line} missing from {text}");
        }
        assert!(!text.lines().any(|l| l == "v v1" || l == "v y0"), "{text}");
        assert!(text.contains("#hugin_optimizerMasterSwitch 4"), "{text}");
    }

    #[test]
    fn missing_input_is_reported() {
        let err = summary_json(Path::new("/nonexistent/project.pto")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to open"));
    }
}
