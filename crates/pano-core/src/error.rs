use thiserror::Error;

/// Errors raised by fallible data-model operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PanoError {
    /// Image index past the end of the panorama.
    #[error("image {index} out of range, panorama has {len} images")]
    ImageOutOfRange { index: usize, len: usize },
    /// Control point index past the end of the list.
    #[error("control point {index} out of range, panorama has {len} points")]
    CtrlPointOutOfRange { index: usize, len: usize },
    /// Part number not produced by the current partition.
    #[error("part {part} out of range, group has {parts} parts")]
    PartOutOfRange { part: usize, parts: usize },
    /// Mask polygon text could not be parsed.
    #[error("invalid mask polygon: {0}")]
    InvalidMask(String),
    /// A PTO variable code with no matching image variable.
    #[error("unknown image variable code `{0}`")]
    UnknownVariable(String),
}
