//! Active mask propagation.

use std::{collections::BTreeSet, rc::Rc};

use log::debug;

use super::Panorama;
use crate::{
    var, ConstImageVariableGroup, ImageTransform, MaskPolygon, MaskType, Real, Rect2D, Vec2, Vec3,
    LENS_VARIABLES,
};

/// Longest polygon edge, in pixels, before reprojection.
const MASK_SUBSAMPLE_DISTANCE: Real = 20.0;
/// Outward border when clipping reprojected masks to the target image.
const TARGET_CLIP_BORDER: i32 = 2;

impl Panorama {
    /// Replace the user masks of image `index`.
    pub fn update_masks_for_image(&mut self, index: usize, masks: Vec<MaskPolygon>) {
        if !self.valid_image(index) {
            return;
        }
        self.images[index].set::<var::Masks>(masks);
        self.image_changed(index);
    }

    fn yaw_linked(&self, index: usize) -> BTreeSet<usize> {
        let img = &self.images[index];
        (0..self.images.len())
            .filter(|&j| j != index && img.is_linked_with::<var::Yaw>(&self.images[j]))
            .collect()
    }

    /// Add `mask` of image `src` to the active masks of every image in `targets`, as a
    /// negative mask in the target's pixel space.
    ///
    /// Positive masks are first clipped to the source crop. Targets sharing the source's
    /// yaw receive the polygon unchanged.
    pub fn transfer_mask(&mut self, mask: &MaskPolygon, src: usize, targets: &BTreeSet<usize>) {
        if targets.is_empty() || !self.valid_image(src) {
            return;
        }
        let mut mask = mask.clone();
        if mask.is_positive() && !self.images[src].mask_clip(&mut mask) {
            return;
        }
        mask.sub_sample(MASK_SUBSAMPLE_DISTANCE);
        let from = ImageTransform::new(&self.images[src]);
        let dirs: Vec<Vec3> = mask.polygon().iter().filter_map(|p| from.image_to_sphere(p)).collect();
        let area = mask.signed_area();

        for &t in targets {
            if t == src || t >= self.images.len() {
                continue;
            }
            let target = &self.images[t];
            let mut out = mask.clone();
            if !target.is_linked_with::<var::Yaw>(&self.images[src]) {
                let to = ImageTransform::new(target);
                let polygon: Vec<Vec2> = dirs.iter().filter_map(|d| to.sphere_to_image(d)).collect();
                if polygon.len() < 3 {
                    continue;
                }
                out.set_polygon(polygon);
                if out.signed_area().signum() != area.signum() {
                    out.set_inverted(!out.is_inverted());
                }
            }
            if !out.clip_polygon(&Rect2D::from_size(target.size()).expanded(TARGET_CLIP_BORDER)) {
                continue;
            }
            out.set_mask_type(MaskType::Negative);
            out.set_img_nr(t);
            self.images[t].add_active_mask(out);
        }
    }

    /// Rebuild the active masks of every image from the user masks.
    ///
    /// Negative masks apply to their own image, lens masks to every image of the lens and
    /// stack masks to every image of the stack. Positive masks become negative masks on
    /// the overlapping images. With `convert_positive` every mask is applied to its own
    /// image only, as a negative mask.
    pub fn update_masks(&mut self, convert_positive: bool) {
        for img in &mut self.images {
            img.clear_active_masks();
        }
        let n = self.images.len();
        if n == 0 {
            return;
        }
        let lens_parts: Vec<usize> = {
            let lenses = ConstImageVariableGroup::new(LENS_VARIABLES, self);
            (0..n).map(|i| lenses.part_number(i)).collect()
        };

        let mut positive = false;
        for i in 0..n {
            for mut mask in self.images[i].get::<var::Masks>() {
                mask.set_img_nr(i);
                if convert_positive {
                    mask.set_mask_type(MaskType::Negative);
                    self.images[i].add_active_mask(mask);
                    continue;
                }
                match mask.mask_type() {
                    MaskType::Negative => self.images[i].add_active_mask(mask),
                    MaskType::Positive => positive = true,
                    MaskType::StackNegative => {
                        let stack = self.yaw_linked(i);
                        let mut own = mask.clone();
                        own.set_mask_type(MaskType::Negative);
                        self.images[i].add_active_mask(own);
                        self.transfer_mask(&mask, i, &stack);
                    }
                    MaskType::StackPositive => {
                        let stack = self.yaw_linked(i);
                        self.transfer_mask(&mask, i, &stack);
                    }
                    MaskType::NegativeLens => {
                        for j in (0..n).filter(|&j| lens_parts[j] == lens_parts[i]) {
                            let mut copy = mask.clone();
                            copy.set_img_nr(j);
                            self.images[j].add_active_mask(copy);
                        }
                    }
                }
            }
        }

        if positive {
            let overlap = Rc::clone(&self.overlap);
            let active = self.active_images();
            for i in 0..n {
                let masks = self.images[i].get::<var::Masks>();
                if !masks.iter().any(|m| m.mask_type() == MaskType::Positive) {
                    continue;
                }
                let targets: BTreeSet<usize> = active
                    .iter()
                    .copied()
                    .filter(|&k| k != i && overlap.overlap(&self.images[i], &self.images[k]) > 0.0)
                    .collect();
                debug!("image {i}: propagating positive masks to {targets:?}");
                for mask in masks.iter().filter(|m| m.mask_type() == MaskType::Positive) {
                    self.transfer_mask(mask, i, &targets);
                }
            }
        }
    }
}
