//! Core data model for `pano-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases and pixel-space geometry (`Real`, `Vec2`, [`Size2D`], [`Rect2D`]),
//! - shared, linkable value cells ([`ImageVariable`]),
//! - the per-photograph parameter set ([`SrcPanoImage`]) generated from one variable table,
//! - mask polygons and their propagation between images,
//! - link-derived image partitions (lenses, stacks) via [`ImageVariableGroup`],
//! - the root [`Panorama`] aggregate with change notification and optimize-vector heuristics,
//! - an image connectivity graph ([`ImageGraph`]).
//!
//! Link model:
//! `image.link::<var::Hfov>(&anchor)` makes `image` join the class of `anchor`; every cell of a
//! class observes writes made through any member.

/// Error types shared by the data model.
pub mod error;
/// Image connectivity from control points and linked positions.
pub mod graph;
/// Link groups over images (lenses, stacks).
pub mod groups;
/// Per-image parameters, PTO variable codes and lens helpers.
pub mod image;
/// Mask polygons.
pub mod mask;
/// Linear algebra type aliases and pixel geometry.
pub mod math;
/// The root panorama aggregate.
pub mod panorama;
/// Spherical image coordinate transforms.
pub mod transform;
/// Shared value cells with link semantics.
pub mod variable;

pub use error::*;
pub use graph::*;
pub use groups::*;
pub use image::*;
pub use mask::*;
pub use math::*;
pub use panorama::*;
pub use transform::*;
pub use variable::*;
