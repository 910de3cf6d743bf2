use std::collections::BTreeSet;

use super::Panorama;

/// Receives change notifications from [`Panorama::change_finished`].
///
/// Observers are registered as weak references and called synchronously in registration
/// order. They get read access only.
pub trait PanoramaObserver {
    /// Called after every batch of changes.
    fn panorama_changed(&mut self, pano: &Panorama);

    /// Called before [`Self::panorama_changed`] when images changed, or when all images
    /// were removed.
    fn panorama_images_changed(&mut self, _pano: &Panorama, _changed: &BTreeSet<usize>) {}
}
