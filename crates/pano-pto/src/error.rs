use thiserror::Error;

/// Failures that abort reading or writing a whole script.
#[derive(Debug, Error)]
pub enum PtoError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A variable links to an image that has not been read yet.
    #[error("line {line}: variables must link to an earlier image, got link to {link} with {images} images read")]
    ForwardLink { line: usize, link: usize, images: usize },
    /// Lens variables linked between images of different projections.
    #[error("line {line}: image {image} cannot share a lens with image {anchor}, projections differ")]
    ProjectionMismatch { line: usize, image: usize, anchor: usize },
    #[error("script is empty")]
    Empty,
}
