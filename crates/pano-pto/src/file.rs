use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, MAIN_SEPARATOR},
};

use anyhow::{Context, Result};
use log::info;
use pano_core::Panorama;

use crate::{read_pto, write_pto};

/// Directory part of `path` with a trailing separator, or empty for a bare file name.
pub fn path_prefix(path: &Path) -> String {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => format!("{}{MAIN_SEPARATOR}", dir.display()),
        _ => String::new(),
    }
}

/// Read the script at `path`; relative image names resolve against its directory.
pub fn load_file(path: impl AsRef<Path>) -> Result<Panorama> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let pano = read_pto(BufReader::new(file), &path_prefix(path))
        .with_context(|| format!("failed to read project {}", path.display()))?;
    info!("loaded {} images from {}", pano.nr_of_images(), path.display());
    Ok(pano)
}

/// Replace the state of `pano` with the script at `path` and notify its observers.
///
/// On failure `pano` is left as it was.
pub fn load_into(pano: &mut Panorama, path: impl AsRef<Path>) -> Result<()> {
    let loaded = load_file(path)?;
    pano.adopt_state(loaded);
    pano.change_finished(false);
    pano.clear_dirty();
    Ok(())
}

/// Write `pano` to `path`, with image names relative to its directory where possible.
pub fn save_file(pano: &Panorama, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_pto(pano, BufWriter::new(file), &path_prefix(path))
        .with_context(|| format!("failed to write project {}", path.display()))?;
    info!("saved {} images to {}", pano.nr_of_images(), path.display());
    Ok(())
}
