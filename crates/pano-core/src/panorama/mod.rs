//! The root aggregate: images, control points, output options and change tracking.
//!
//! Mutators record which images changed; callers finish a batch with
//! [`Panorama::change_finished`], which refreshes derived state (crop modes, active masks,
//! the optimize vector) and notifies observers.

use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
    rc::{Rc, Weak},
};

use log::{debug, error};

use crate::{
    var, variable_code, ImageOverlap, ImageVariableKind, PanoError, Real, SampledOverlap,
    SrcPanoImage, Variable,
};

mod control_point;
mod masks;
mod observer;
mod optimize;
mod options;
mod subset;

pub use control_point::*;
pub use observer::*;
pub use optimize::*;
pub use options::*;

/// PTO code → value for one image.
pub type VariableMap = BTreeMap<String, Real>;
pub type VariableMapVector = Vec<VariableMap>;

/// Per image, the PTO codes handed to the optimizer.
pub type OptimizeVector = Vec<BTreeSet<String>>;

/// Mutable access to `images[target]` next to shared access to `images[source]`.
fn pair_mut(images: &mut [SrcPanoImage], target: usize, source: usize) -> (&mut SrcPanoImage, &SrcPanoImage) {
    debug_assert_ne!(target, source);
    if target < source {
        let (head, tail) = images.split_at_mut(source);
        (&mut head[target], &tail[0])
    } else {
        let (head, tail) = images.split_at_mut(target);
        (&mut tail[0], &head[source])
    }
}

/// A panorama project.
///
/// Images own their variables; links between images are shared cells, so reordering or
/// removing images keeps the links of the others intact. Not thread safe.
pub struct Panorama {
    images: Vec<SrcPanoImage>,
    ctrl_points: CPVector,
    options: PanoramaOptions,
    optvec: OptimizeVector,
    optimizer_switch: OptimizerSwitch,
    photometric_switch: PhotometricSwitch,
    needs_optimization: bool,
    changed: BTreeSet<usize>,
    force_images_update: bool,
    dirty: bool,
    file_prefix: String,
    observers: Vec<Weak<RefCell<dyn PanoramaObserver>>>,
    overlap: Rc<dyn ImageOverlap>,
}

impl Default for Panorama {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            ctrl_points: Vec::new(),
            options: PanoramaOptions::default(),
            optvec: Vec::new(),
            optimizer_switch: OptimizerSwitch::NONE,
            photometric_switch: PhotometricSwitch::NONE,
            needs_optimization: false,
            changed: BTreeSet::new(),
            force_images_update: false,
            dirty: false,
            file_prefix: String::new(),
            observers: Vec::new(),
            overlap: Rc::new(SampledOverlap::default()),
        }
    }
}

impl fmt::Debug for Panorama {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Panorama")
            .field("images", &self.images.len())
            .field("ctrl_points", &self.ctrl_points.len())
            .field("changed", &self.changed)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl Panorama {
    pub fn new() -> Self {
        Self::default()
    }

    fn valid_image(&self, index: usize) -> bool {
        let ok = index < self.images.len();
        if !ok {
            let err = PanoError::ImageOutOfRange {
                index,
                len: self.images.len(),
            };
            error!("{err}");
            debug_assert!(ok, "{err}");
        }
        ok
    }

    fn valid_ctrl_point(&self, index: usize) -> bool {
        let ok = index < self.ctrl_points.len();
        if !ok {
            let err = PanoError::CtrlPointOutOfRange {
                index,
                len: self.ctrl_points.len(),
            };
            error!("{err}");
            debug_assert!(ok, "{err}");
        }
        ok
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Images
    // ─────────────────────────────────────────────────────────────────────────

    pub fn nr_of_images(&self) -> usize {
        self.images.len()
    }

    pub fn images(&self) -> &[SrcPanoImage] {
        &self.images
    }

    /// Image `index`. Panics when out of range.
    pub fn image(&self, index: usize) -> &SrcPanoImage {
        &self.images[index]
    }

    /// Append an image with an empty optimize set; returns its index.
    pub fn add_image(&mut self, img: SrcPanoImage) -> usize {
        let index = self.images.len();
        self.images.push(img);
        self.optvec.push(BTreeSet::new());
        self.image_changed(index);
        index
    }

    /// Remove image `index` and every control point touching it.
    ///
    /// Later images and control point references shift down by one, and so do the
    /// optimize and colour reference images. Removing a reference image resets it to 0.
    pub fn remove_image(&mut self, index: usize) {
        if !self.valid_image(index) {
            return;
        }
        debug!("removing image {index}");
        self.ctrl_points.retain(|cp| cp.image1 != index && cp.image2 != index);
        for cp in &mut self.ctrl_points {
            if cp.image1 > index {
                cp.image1 -= 1;
            }
            if cp.image2 > index {
                cp.image2 -= 1;
            }
        }
        self.images.remove(index);
        self.optvec.remove(index);

        let len = self.images.len();
        for reference in [
            &mut self.options.optimize_reference_image,
            &mut self.options.color_reference_image,
        ] {
            match (*reference).cmp(&index) {
                Ordering::Equal if len > 0 => {
                    *reference = 0;
                    self.changed.insert(0);
                }
                Ordering::Greater => *reference -= 1,
                _ => {}
            }
        }
        for i in index..len {
            self.image_changed(i);
        }
        self.force_images_update = true;
    }

    /// Copy all values of `img` into image `index`, writing through its links.
    pub fn set_src_image(&mut self, index: usize, img: &SrcPanoImage) {
        if !self.valid_image(index) {
            return;
        }
        self.images[index].assign_values(img);
        let linked: Vec<usize> = (0..self.images.len())
            .filter(|&j| {
                j != index
                    && ImageVariableKind::ALL
                        .iter()
                        .any(|&k| self.images[j].is_linked_with_kind(k, &self.images[index]))
            })
            .collect();
        self.image_changed(index);
        for j in linked {
            self.image_changed(j);
        }
        self.needs_optimization = true;
    }

    pub fn set_image_filename(&mut self, index: usize, filename: &str) {
        if !self.valid_image(index) {
            return;
        }
        self.images[index].set::<var::Filename>(filename.to_string());
        self.image_changed(index);
        self.force_images_update = true;
    }

    /// Exchange two images together with their control point and reference indices.
    pub fn swap_images(&mut self, a: usize, b: usize) {
        if !self.valid_image(a) || !self.valid_image(b) || a == b {
            return;
        }
        self.images.swap(a, b);
        self.optvec.swap(a, b);
        let swap = |i: &mut usize| {
            if *i == a {
                *i = b;
            } else if *i == b {
                *i = a;
            }
        };
        for cp in &mut self.ctrl_points {
            swap(&mut cp.image1);
            swap(&mut cp.image2);
        }
        swap(&mut self.options.color_reference_image);
        swap(&mut self.options.optimize_reference_image);
        self.image_changed(a);
        self.image_changed(b);
    }

    /// Move image `from` so that it ends up at position `to`; images in between shift.
    pub fn move_image(&mut self, from: usize, to: usize) {
        if !self.valid_image(from) || from == to {
            return;
        }
        let mut order: Vec<usize> = (0..self.images.len()).collect();
        order.remove(from);
        order.insert(to.min(order.len()), from);
        let mut new_index = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let mut images: Vec<Option<SrcPanoImage>> = std::mem::take(&mut self.images).into_iter().map(Some).collect();
        let mut optvec: Vec<Option<BTreeSet<String>>> =
            std::mem::take(&mut self.optvec).into_iter().map(Some).collect();
        for &old in &order {
            if let (Some(img), Some(opt)) = (images[old].take(), optvec[old].take()) {
                self.images.push(img);
                self.optvec.push(opt);
            }
        }
        for cp in &mut self.ctrl_points {
            cp.image1 = new_index[cp.image1];
            cp.image2 = new_index[cp.image2];
        }
        self.options.color_reference_image = new_index[self.options.color_reference_image.min(order.len() - 1)];
        self.options.optimize_reference_image =
            new_index[self.options.optimize_reference_image.min(order.len() - 1)];
        for i in 0..self.images.len() {
            self.image_changed(i);
        }
    }

    /// Enable or disable an image for stitching.
    pub fn activate_image(&mut self, index: usize, active: bool) {
        if !self.valid_image(index) {
            return;
        }
        if self.images[index].is_active() != active {
            self.images[index].set::<var::Active>(active);
            self.image_changed(index);
        }
    }

    pub fn active_images(&self) -> BTreeSet<usize> {
        (0..self.images.len())
            .filter(|&i| self.images[i].is_active())
            .collect()
    }

    /// Record that image `index` changed; reported by the next [`Self::change_finished`].
    pub fn image_changed(&mut self, index: usize) {
        self.changed.insert(index);
    }

    pub fn changed_images(&self) -> &BTreeSet<usize> {
        &self.changed
    }

    /// Multiply every image's white balance, visiting each link class once.
    pub fn update_white_balance(&mut self, red: Real, blue: Real) {
        let mut done_red = BTreeSet::new();
        let mut done_blue = BTreeSet::new();
        for i in 0..self.images.len() {
            if done_red.insert(i) {
                let v = self.images[i].get::<var::WhiteBalanceRed>();
                self.images[i].set::<var::WhiteBalanceRed>(v * red);
                self.image_changed(i);
                for j in i + 1..self.images.len() {
                    if self.images[i].is_linked_with::<var::WhiteBalanceRed>(&self.images[j]) {
                        done_red.insert(j);
                        self.image_changed(j);
                    }
                }
            }
            if done_blue.insert(i) {
                let v = self.images[i].get::<var::WhiteBalanceBlue>();
                self.images[i].set::<var::WhiteBalanceBlue>(v * blue);
                self.image_changed(i);
                for j in i + 1..self.images.len() {
                    if self.images[i].is_linked_with::<var::WhiteBalanceBlue>(&self.images[j]) {
                        done_blue.insert(j);
                        self.image_changed(j);
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Variables and links
    // ─────────────────────────────────────────────────────────────────────────

    fn mark_linked_changed(&mut self, index: usize, kind: ImageVariableKind) {
        let linked: Vec<usize> = (0..self.images.len())
            .filter(|&j| j != index && self.images[j].is_linked_with_kind(kind, &self.images[index]))
            .collect();
        self.image_changed(index);
        for j in linked {
            self.image_changed(j);
        }
        self.needs_optimization = true;
    }

    /// Write variable `V` of image `index`; every image sharing it is marked changed.
    pub fn update_variable<V: Variable>(&mut self, index: usize, value: V::Value) {
        if !self.valid_image(index) {
            return;
        }
        self.images[index].set::<V>(value);
        self.mark_linked_changed(index, V::KIND);
    }

    /// Write a variable by PTO code.
    ///
    /// # Errors
    ///
    /// [`PanoError::UnknownVariable`] for codes outside the variable table.
    pub fn update_variable_code(&mut self, index: usize, code: &str, value: Real) -> Result<(), PanoError> {
        let entry = variable_code(code).ok_or_else(|| PanoError::UnknownVariable(code.to_string()))?;
        if !self.valid_image(index) {
            return Err(PanoError::ImageOutOfRange {
                index,
                len: self.images.len(),
            });
        }
        entry.set(&mut self.images[index], value);
        self.mark_linked_changed(index, entry.kind);
        Ok(())
    }

    /// Code → value map of every image.
    pub fn variables(&self) -> VariableMapVector {
        (0..self.images.len()).map(|i| self.image_variables(i)).collect()
    }

    pub fn image_variables(&self, index: usize) -> VariableMap {
        self.images[index]
            .variable_map()
            .into_iter()
            .map(|(code, v)| (code.to_string(), v))
            .collect()
    }

    /// Apply a code map to one image. Unknown codes are logged and skipped.
    pub fn update_image_variables(&mut self, index: usize, vars: &VariableMap) {
        for (code, &value) in vars {
            if let Err(err) = self.update_variable_code(index, code, value) {
                error!("image {index}: {err}");
            }
        }
    }

    /// Apply one code map per image, in image order.
    pub fn update_variables(&mut self, vars: &[VariableMap]) {
        debug_assert_eq!(vars.len(), self.images.len());
        for (i, map) in vars.iter().enumerate().take(self.images.len()) {
            self.update_image_variables(i, map);
        }
    }

    /// Apply code maps to the listed images, in ascending index order.
    pub fn update_variables_for(&mut self, images: &BTreeSet<usize>, vars: &[VariableMap]) {
        debug_assert_eq!(vars.len(), images.len());
        for (&i, map) in images.iter().zip(vars) {
            self.update_image_variables(i, map);
        }
    }

    /// Make `image` share variable `V` with `anchor`, taking the anchor's value.
    pub fn link_image_variable<V: Variable>(&mut self, anchor: usize, image: usize) {
        self.link_image_variable_kind(V::KIND, anchor, image);
    }

    pub fn unlink_image_variable<V: Variable>(&mut self, image: usize) {
        self.unlink_image_variable_kind(V::KIND, image);
    }

    pub fn link_image_variable_kind(&mut self, kind: ImageVariableKind, anchor: usize, image: usize) {
        if !self.valid_image(anchor) || !self.valid_image(image) || anchor == image {
            return;
        }
        let (target, source) = pair_mut(&mut self.images, image, anchor);
        target.link_kind(kind, source);
        self.image_changed(anchor);
        self.image_changed(image);
        self.needs_optimization = true;
    }

    pub fn unlink_image_variable_kind(&mut self, kind: ImageVariableKind, image: usize) {
        if !self.valid_image(image) {
            return;
        }
        self.images[image].unlink_kind(kind);
        self.image_changed(image);
        self.needs_optimization = true;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control points
    // ─────────────────────────────────────────────────────────────────────────

    pub fn ctrl_points(&self) -> &[ControlPoint] {
        &self.ctrl_points
    }

    pub fn ctrl_point(&self, index: usize) -> Option<&ControlPoint> {
        self.ctrl_points.get(index)
    }

    /// Indices of the control points touching image `index`.
    pub fn ctrl_points_for_image(&self, index: usize) -> Vec<usize> {
        self.ctrl_points
            .iter()
            .enumerate()
            .filter(|(_, cp)| cp.image1 == index || cp.image2 == index)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn add_ctrl_point(&mut self, cp: ControlPoint) -> usize {
        debug_assert!(cp.image1 < self.images.len() && cp.image2 < self.images.len());
        self.image_changed(cp.image1);
        self.image_changed(cp.image2);
        self.ctrl_points.push(cp);
        self.needs_optimization = true;
        self.ctrl_points.len() - 1
    }

    pub fn remove_ctrl_point(&mut self, index: usize) {
        if !self.valid_ctrl_point(index) {
            return;
        }
        let cp = self.ctrl_points.remove(index);
        self.update_line_ctrl_points();
        self.image_changed(cp.image1);
        self.image_changed(cp.image2);
        self.needs_optimization = true;
    }

    pub fn change_control_point(&mut self, index: usize, cp: ControlPoint) {
        if !self.valid_ctrl_point(index) {
            return;
        }
        let old = &self.ctrl_points[index];
        let touched = [old.image1, old.image2, cp.image1, cp.image2];
        for i in touched {
            self.image_changed(i);
        }
        self.ctrl_points[index] = cp;
        self.needs_optimization = true;
        self.update_line_ctrl_points();
    }

    pub fn set_ctrl_points(&mut self, points: CPVector) {
        let touched: Vec<usize> = self
            .ctrl_points
            .iter()
            .chain(&points)
            .flat_map(|cp| [cp.image1, cp.image2])
            .collect();
        for i in touched {
            self.image_changed(i);
        }
        self.ctrl_points = points;
        self.needs_optimization = true;
        self.update_line_ctrl_points();
    }

    /// Copy residuals from an optimizer run over all control points.
    pub fn update_ctrl_point_errors(&mut self, cps: &[ControlPoint]) {
        if cps.len() != self.ctrl_points.len() {
            error!(
                "got {} control point errors for {} points",
                cps.len(),
                self.ctrl_points.len()
            );
            return;
        }
        for (cp, src) in self.ctrl_points.iter_mut().zip(cps) {
            cp.error = src.error;
            self.changed.insert(cp.image1);
            self.changed.insert(cp.image2);
        }
    }

    /// Copy residuals from an optimizer run over the subset `images`.
    ///
    /// `cps` holds, in order, the points whose two images both lie in `images`.
    pub fn update_ctrl_point_errors_for(&mut self, images: &BTreeSet<usize>, cps: &[ControlPoint]) {
        let targets: Vec<usize> = self
            .ctrl_points
            .iter()
            .enumerate()
            .filter(|(_, cp)| images.contains(&cp.image1) && images.contains(&cp.image2))
            .map(|(i, _)| i)
            .collect();
        if targets.len() != cps.len() {
            error!("got {} control point errors for {} points", cps.len(), targets.len());
            return;
        }
        for (&i, src) in targets.iter().zip(cps) {
            let cp = &mut self.ctrl_points[i];
            cp.error = src.error;
            self.changed.insert(cp.image1);
            self.changed.insert(cp.image2);
        }
    }

    /// Mode for a new line: one past the highest line in use, at least the first line.
    pub fn next_cp_type_line_number(&self) -> i32 {
        let max = self.ctrl_points.iter().map(|cp| cp.mode).max().unwrap_or(0);
        max.max(ControlPoint::FIRST_LINE - 1) + 1
    }

    /// Renumber line modes to close gaps, keeping their order.
    pub fn update_line_ctrl_points(&mut self) {
        let lines: BTreeSet<i32> = self
            .ctrl_points
            .iter()
            .filter(|cp| cp.is_line())
            .map(|cp| cp.mode)
            .collect();
        let renumber: BTreeMap<i32, i32> = lines
            .into_iter()
            .zip(ControlPoint::FIRST_LINE..)
            .collect();
        let mut touched = Vec::new();
        for cp in &mut self.ctrl_points {
            if let Some(&mode) = renumber.get(&cp.mode) {
                if mode != cp.mode {
                    cp.mode = mode;
                    touched.extend([cp.image1, cp.image2]);
                }
            }
        }
        for i in touched {
            self.image_changed(i);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Options and state
    // ─────────────────────────────────────────────────────────────────────────

    pub fn options(&self) -> &PanoramaOptions {
        &self.options
    }

    /// Replace the output options.
    ///
    /// A new projection marks every image changed; a new reference image marks the old and
    /// new reference.
    pub fn set_options(&mut self, opts: PanoramaOptions) {
        if opts.projection() != self.options.projection() {
            for i in 0..self.images.len() {
                self.image_changed(i);
            }
        }
        if opts.optimize_reference_image != self.options.optimize_reference_image {
            self.image_changed(opts.optimize_reference_image);
            self.image_changed(self.options.optimize_reference_image);
        }
        if opts.color_reference_image != self.options.color_reference_image {
            self.image_changed(opts.color_reference_image);
            self.image_changed(self.options.color_reference_image);
        }
        self.options = opts;
    }

    /// Prefix for relative image file names.
    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }

    pub fn set_file_prefix(&mut self, prefix: impl Into<String>) {
        self.file_prefix = prefix.into();
    }

    /// Replace the estimator used to propagate positive masks.
    pub fn set_overlap_estimator(&mut self, overlap: Rc<dyn ImageOverlap>) {
        self.overlap = overlap;
    }

    /// Drop all images, control points and options. Observers stay registered.
    pub fn reset(&mut self) {
        self.images.clear();
        self.ctrl_points.clear();
        self.optvec.clear();
        self.options.reset();
        self.needs_optimization = false;
        self.force_images_update = true;
    }

    /// Take over the project state of `other`, as after loading a file.
    ///
    /// Observers, the overlap estimator and the dirty flag of `self` are kept; every image
    /// is marked changed.
    pub fn adopt_state(&mut self, other: Panorama) {
        self.reset();
        self.images = other.images;
        self.ctrl_points = other.ctrl_points;
        self.options = other.options;
        self.optvec = other.optvec;
        self.optimizer_switch = other.optimizer_switch;
        self.photometric_switch = other.photometric_switch;
        self.needs_optimization = other.needs_optimization;
        self.file_prefix = other.file_prefix;
        self.optvec.resize(self.images.len(), BTreeSet::new());
        for i in 0..self.images.len() {
            self.image_changed(i);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn needs_optimization(&self) -> bool {
        self.needs_optimization
    }

    pub fn mark_as_optimized(&mut self, optimized: bool) {
        self.needs_optimization = !optimized;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `observer`; registering the same observer twice has no effect.
    pub fn add_observer<O: PanoramaObserver + 'static>(&mut self, observer: &Rc<RefCell<O>>) {
        let observer: Rc<RefCell<dyn PanoramaObserver>> = observer.clone();
        let weak = Rc::downgrade(&observer);
        if !self.observers.iter().any(|o| o.ptr_eq(&weak)) {
            self.observers.push(weak);
        }
    }

    /// Deregister `observer`; returns whether it was registered.
    pub fn remove_observer<O: PanoramaObserver + 'static>(&mut self, observer: &Rc<RefCell<O>>) -> bool {
        let target = Rc::as_ptr(observer) as *const ();
        let before = self.observers.len();
        self.observers.retain(|o| o.as_ptr() as *const () != target);
        self.observers.len() != before
    }

    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Finish a batch of changes.
    ///
    /// Refreshes crop modes (re-centering auto-centered crops) of changed images, rebuilds
    /// active masks and the optimize vector, then notifies observers: images first, when
    /// any changed or all were removed, then the panorama. Sets the dirty flag unless
    /// `keep_dirty`.
    pub fn change_finished(&mut self, keep_dirty: bool) {
        if self.images.is_empty() {
            self.force_images_update = true;
        }
        let len = self.images.len();
        self.changed.retain(|&i| i < len);

        let changed: Vec<usize> = self.changed.iter().copied().collect();
        for i in changed {
            let img = &mut self.images[i];
            img.update_crop_mode();
            if img.get::<var::AutoCenterCrop>() {
                img.center_crop();
            }
        }
        self.update_masks(false);
        self.update_optimize_vector();

        debug!("changed image(s) {:?}", self.changed);
        self.observers.retain(|o| o.strong_count() > 0);
        let observers: Vec<_> = self.observers.iter().filter_map(Weak::upgrade).collect();
        let changed = std::mem::take(&mut self.changed);
        for observer in observers {
            let mut observer = observer.borrow_mut();
            if !changed.is_empty() || self.force_images_update {
                observer.panorama_images_changed(self, &changed);
            }
            observer.panorama_changed(self);
        }
        self.force_images_update = false;
        if !keep_dirty {
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Size2D;

    fn pano(n: usize) -> Panorama {
        let mut pano = Panorama::new();
        for i in 0..n {
            pano.add_image(SrcPanoImage::new(format!("img{i}.jpg"), Size2D::new(400, 300)));
        }
        pano
    }

    #[derive(Default)]
    struct Recorder {
        images: Vec<BTreeSet<usize>>,
        changes: usize,
    }

    impl PanoramaObserver for Recorder {
        fn panorama_changed(&mut self, _pano: &Panorama) {
            self.changes += 1;
        }

        fn panorama_images_changed(&mut self, _pano: &Panorama, changed: &BTreeSet<usize>) {
            self.images.push(changed.clone());
        }
    }

    #[test]
    fn update_variable_marks_linked_images() {
        let mut pano = pano(3);
        pano.link_image_variable::<var::Hfov>(0, 2);
        pano.change_finished(false);
        assert!(pano.is_dirty());
        assert!(pano.changed_images().is_empty());

        pano.update_variable::<var::Hfov>(2, 80.0);
        assert_eq!(pano.image(0).hfov(), 80.0);
        assert_eq!(pano.changed_images(), &BTreeSet::from([0, 2]));
        assert!(pano.needs_optimization());
    }

    #[test]
    fn update_variable_by_code() {
        let mut pano = pano(2);
        pano.update_variable_code(1, "TrX", 2.5).unwrap();
        assert_eq!(pano.image(1).get::<var::X>(), 2.5);
        assert_eq!(
            pano.update_variable_code(1, "zz", 1.0),
            Err(PanoError::UnknownVariable("zz".into()))
        );
        let vars = pano.variables();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[1]["TrX"], 2.5);
    }

    #[test]
    fn remove_image_shifts_references() {
        let mut pano = pano(4);
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 1, 2.0, 2.0, ControlPoint::X_Y));
        pano.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 3, 2.0, 2.0, ControlPoint::X_Y));
        pano.add_ctrl_point(ControlPoint::new(2, 1.0, 1.0, 3, 2.0, 2.0, ControlPoint::X_Y));
        let mut opts = pano.options().clone();
        opts.optimize_reference_image = 3;
        pano.set_options(opts);
        pano.change_finished(false);

        pano.remove_image(1);
        assert_eq!(pano.nr_of_images(), 3);
        assert_eq!(pano.optimize_vector().len(), 3);
        assert_eq!(pano.ctrl_points().len(), 1);
        assert_eq!((pano.ctrl_points()[0].image1, pano.ctrl_points()[0].image2), (1, 2));
        assert_eq!(pano.options().optimize_reference_image, 2);
        assert_eq!(pano.image(1).filename(), "img2.jpg");
        assert!(pano.changed_images().contains(&1) && pano.changed_images().contains(&2));
    }

    #[test]
    fn removing_the_reference_image_falls_back_to_the_first() {
        let mut pano = pano(3);
        let mut opts = pano.options().clone();
        opts.optimize_reference_image = 1;
        opts.color_reference_image = 1;
        pano.set_options(opts);
        pano.change_finished(false);

        pano.remove_image(1);
        assert_eq!(pano.options().optimize_reference_image, 0);
        assert_eq!(pano.options().color_reference_image, 0);
        assert!(pano.changed_images().contains(&0));

        pano.remove_image(0);
        pano.remove_image(0);
        assert_eq!(pano.nr_of_images(), 0);
        assert_eq!(pano.options().optimize_reference_image, 0);
    }

    #[test]
    fn swap_and_move_keep_links() {
        let mut pano = pano(3);
        pano.link_image_variable::<var::Yaw>(0, 1);
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 2, 2.0, 2.0, ControlPoint::X_Y));

        pano.swap_images(0, 2);
        assert_eq!(pano.image(0).filename(), "img2.jpg");
        assert!(pano.image(2).is_linked_with::<var::Yaw>(pano.image(1)));
        assert_eq!((pano.ctrl_points()[0].image1, pano.ctrl_points()[0].image2), (2, 0));

        pano.move_image(0, 2);
        let names: Vec<_> = pano.images().iter().map(SrcPanoImage::filename).collect();
        assert_eq!(names, ["img1.jpg", "img0.jpg", "img2.jpg"]);
        assert!(pano.image(0).is_linked_with::<var::Yaw>(pano.image(1)));
        assert_eq!((pano.ctrl_points()[0].image1, pano.ctrl_points()[0].image2), (1, 2));
    }

    #[test]
    fn line_points_are_renumbered() {
        let mut pano = pano(2);
        let line = |mode| ControlPoint::new(0, 1.0, 1.0, 0, 5.0, 5.0, mode);
        pano.set_ctrl_points(vec![line(7), line(4), line(7), line(ControlPoint::X)]);
        let modes: Vec<_> = pano.ctrl_points().iter().map(|cp| cp.mode).collect();
        assert_eq!(modes, [4, 3, 4, 1]);
        assert_eq!(pano.next_cp_type_line_number(), 5);
        pano.remove_ctrl_point(1);
        let modes: Vec<_> = pano.ctrl_points().iter().map(|cp| cp.mode).collect();
        assert_eq!(modes, [3, 3, 1]);

        let mut empty = Panorama::new();
        assert_eq!(empty.next_cp_type_line_number(), 3);
        empty.reset();
    }

    #[test]
    fn white_balance_visits_link_class_once() {
        let mut pano = pano(3);
        pano.link_image_variable::<var::WhiteBalanceRed>(0, 1);
        pano.update_white_balance(2.0, 0.5);
        assert_eq!(pano.image(0).get::<var::WhiteBalanceRed>(), 2.0);
        assert_eq!(pano.image(1).get::<var::WhiteBalanceRed>(), 2.0);
        assert_eq!(pano.image(2).get::<var::WhiteBalanceRed>(), 2.0);
        assert_eq!(pano.image(1).get::<var::WhiteBalanceBlue>(), 0.5);
    }

    #[test]
    fn observers_are_notified_in_order_and_weakly_held() {
        let mut pano = pano(2);
        let first = Rc::new(RefCell::new(Recorder::default()));
        let second = Rc::new(RefCell::new(Recorder::default()));
        pano.add_observer(&first);
        pano.add_observer(&first);
        pano.add_observer(&second);

        pano.change_finished(false);
        assert_eq!(first.borrow().changes, 1);
        assert_eq!(first.borrow().images, vec![BTreeSet::from([0, 1])]);

        // nothing changed: only the panorama callback fires
        pano.change_finished(true);
        assert_eq!(first.borrow().changes, 2);
        assert_eq!(first.borrow().images.len(), 1);

        assert!(pano.remove_observer(&first));
        assert!(!pano.remove_observer(&first));
        drop(second);
        pano.remove_image(0);
        pano.remove_image(0);
        pano.change_finished(false);
        assert_eq!(first.borrow().changes, 2);
    }

    #[test]
    fn clearing_all_images_forces_notification() {
        let mut pano = pano(1);
        let rec = Rc::new(RefCell::new(Recorder::default()));
        pano.add_observer(&rec);
        pano.change_finished(false);
        pano.reset();
        pano.change_finished(false);
        assert_eq!(rec.borrow().images.last(), Some(&BTreeSet::new()));
    }

    #[test]
    fn set_src_image_writes_through_links() {
        let mut pano = pano(2);
        pano.link_image_variable::<var::Hfov>(0, 1);
        pano.change_finished(false);
        let mut img = pano.image(0).clone();
        img.set::<var::Hfov>(33.0);
        img.set::<var::Yaw>(12.0);
        pano.set_src_image(0, &img);
        assert_eq!(pano.image(1).hfov(), 33.0);
        assert_eq!(pano.image(1).get::<var::Yaw>(), 0.0);
        assert!(pano.image(1).is_linked_with::<var::Hfov>(pano.image(0)));
        assert_eq!(pano.changed_images(), &BTreeSet::from([0, 1]));
    }
}
