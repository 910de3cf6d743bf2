//! PTO project scripts for `pano-core` panoramas.
//!
//! - [`read_pto`] builds a [`pano_core::Panorama`] from a script, reconstructing variable
//!   links image by image,
//! - [`write_pto`] / [`write_pto_images`] serialize a panorama (or a subset of its images),
//! - [`load_file`], [`load_into`] and [`save_file`] wrap both for files on disk.
//!
//! Numbers are written with Rust's shortest round-trip formatting and parsed with
//! `str::parse`, neither of which depends on the process locale.

mod error;
mod file;
mod image_line;
/// Token scanning helpers for script lines.
pub mod parse;
mod reader;
mod writer;

pub use error::*;
pub use file::*;
pub use reader::*;
pub use writer::*;
