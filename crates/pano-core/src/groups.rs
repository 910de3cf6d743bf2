//! Partitions of images induced by shared variables.
//!
//! A group is a fixed set of [`ImageVariableKind`]s. Two images fall into the same *part*
//! when they are linked on any of those kinds. The standard groups are lenses (optical
//! variables) and stacks (position variables).

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{ImageVariableKind, Panorama, PanoError, Projection, Real, Size2D, SrcPanoImage, VARIABLE_CODES};

/// Variables shared by images taken through the same lens.
pub const LENS_VARIABLES: [ImageVariableKind; 18] = [
    ImageVariableKind::Size,
    ImageVariableKind::Projection,
    ImageVariableKind::Hfov,
    ImageVariableKind::ResponseType,
    ImageVariableKind::EmorParams,
    ImageVariableKind::ExposureValue,
    ImageVariableKind::Gamma,
    ImageVariableKind::WhiteBalanceRed,
    ImageVariableKind::WhiteBalanceBlue,
    ImageVariableKind::RadialDistortion,
    ImageVariableKind::RadialDistortionRed,
    ImageVariableKind::RadialDistortionBlue,
    ImageVariableKind::RadialDistortionCenterShift,
    ImageVariableKind::Shear,
    ImageVariableKind::VigCorrMode,
    ImageVariableKind::FlatfieldFilename,
    ImageVariableKind::RadialVigCorrCoeff,
    ImageVariableKind::RadialVigCorrCenterShift,
];

/// Variables shared by images taken from the same position.
pub const STACK_VARIABLES: [ImageVariableKind; 9] = [
    ImageVariableKind::Yaw,
    ImageVariableKind::Pitch,
    ImageVariableKind::Roll,
    ImageVariableKind::Stack,
    ImageVariableKind::X,
    ImageVariableKind::Y,
    ImageVariableKind::Z,
    ImageVariableKind::TranslationPlaneYaw,
    ImageVariableKind::TranslationPlanePitch,
];

/// Assign part numbers in image order.
///
/// Image 0 opens part 0. Each later image joins the part of the first representative it
/// is linked with on any kind, or opens a new part. Parts that only become connected
/// through a later image are not merged.
fn compute_part_numbers(
    images: &[SrcPanoImage],
    variables: &BTreeSet<ImageVariableKind>,
) -> (Vec<usize>, usize) {
    let mut representatives: Vec<usize> = Vec::new();
    let mut parts = Vec::with_capacity(images.len());
    for (i, img) in images.iter().enumerate() {
        let found = representatives.iter().position(|&r| {
            variables
                .iter()
                .any(|&kind| img.is_linked_with_kind(kind, &images[r]))
        });
        match found {
            Some(part) => parts.push(part),
            None => {
                parts.push(representatives.len());
                representatives.push(i);
            }
        }
    }
    (parts, representatives.len())
}

fn parts_set(part_numbers: &[usize], num_parts: usize) -> Vec<BTreeSet<usize>> {
    let mut result = vec![BTreeSet::new(); num_parts];
    for (image, &part) in part_numbers.iter().enumerate() {
        result[part].insert(image);
    }
    result
}

/// Link state of `kind` across a part, judged from its first two images.
///
/// True when the first image is linked at all; otherwise false if a second image exists;
/// true for a single-image part.
fn var_linked_in_part(
    images: &[SrcPanoImage],
    part_numbers: &[usize],
    kind: ImageVariableKind,
    part: usize,
) -> bool {
    let mut members = part_numbers
        .iter()
        .enumerate()
        .filter(|(_, &p)| p == part)
        .map(|(i, _)| i);
    match members.next() {
        Some(first) if images[first].is_linked_kind(kind) => true,
        Some(_) => members.next().is_none(),
        None => true,
    }
}

/// Read-only partition over a borrowed panorama.
pub struct ConstImageVariableGroup<'a> {
    pano: &'a Panorama,
    variables: BTreeSet<ImageVariableKind>,
    part_numbers: Vec<usize>,
    num_parts: usize,
}

impl<'a> ConstImageVariableGroup<'a> {
    pub fn new(variables: impl IntoIterator<Item = ImageVariableKind>, pano: &'a Panorama) -> Self {
        let variables: BTreeSet<_> = variables.into_iter().collect();
        let (part_numbers, num_parts) = compute_part_numbers(pano.images(), &variables);
        Self {
            pano,
            variables,
            part_numbers,
            num_parts,
        }
    }

    pub fn variables(&self) -> &BTreeSet<ImageVariableKind> {
        &self.variables
    }

    pub fn part_number(&self, image: usize) -> usize {
        self.part_numbers[image]
    }

    pub fn number_of_parts(&self) -> usize {
        self.num_parts
    }

    pub fn parts_set(&self) -> Vec<BTreeSet<usize>> {
        parts_set(&self.part_numbers, self.num_parts)
    }

    pub fn var_linked_in_part(&self, kind: ImageVariableKind, part: usize) -> bool {
        var_linked_in_part(self.pano.images(), &self.part_numbers, kind, part)
    }

    pub fn update_part_numbers(&mut self) {
        (self.part_numbers, self.num_parts) = compute_part_numbers(self.pano.images(), &self.variables);
    }
}

/// Partition that can also change links.
///
/// The group does not hold on to the panorama; every call takes it explicitly, and
/// mutating calls recompute the partition afterwards.
#[derive(Debug, Clone)]
pub struct ImageVariableGroup {
    variables: BTreeSet<ImageVariableKind>,
    part_numbers: Vec<usize>,
    num_parts: usize,
}

impl ImageVariableGroup {
    pub fn new(variables: impl IntoIterator<Item = ImageVariableKind>, pano: &Panorama) -> Self {
        let mut group = Self {
            variables: variables.into_iter().collect(),
            part_numbers: Vec::new(),
            num_parts: 0,
        };
        group.update_part_numbers(pano);
        group
    }

    pub fn variables(&self) -> &BTreeSet<ImageVariableKind> {
        &self.variables
    }

    /// Part of `image`. Panics if `image` was not in the panorama at the last update.
    pub fn part_number(&self, image: usize) -> usize {
        self.part_numbers[image]
    }

    pub fn number_of_parts(&self) -> usize {
        self.num_parts
    }

    pub fn parts_set(&self) -> Vec<BTreeSet<usize>> {
        parts_set(&self.part_numbers, self.num_parts)
    }

    pub fn update_part_numbers(&mut self, pano: &Panorama) {
        (self.part_numbers, self.num_parts) = compute_part_numbers(pano.images(), &self.variables);
        debug!("{} images in {} parts", self.part_numbers.len(), self.num_parts);
    }

    pub fn var_linked_in_part(&self, pano: &Panorama, kind: ImageVariableKind, part: usize) -> bool {
        var_linked_in_part(pano.images(), &self.part_numbers, kind, part)
    }

    fn members(&self, part: usize) -> impl Iterator<Item = usize> + '_ {
        self.part_numbers
            .iter()
            .enumerate()
            .filter(move |(_, &p)| p == part)
            .map(|(i, _)| i)
    }

    fn check(&self, kind: ImageVariableKind) -> bool {
        let ok = self.variables.contains(&kind);
        debug_assert!(ok, "{kind:?} is not a variable of this group");
        if !ok {
            error!("{kind:?} is not a variable of this group");
        }
        ok
    }

    /// Link `kind` on every image of `part` to the first image of the part.
    pub fn link_variable_part(&mut self, pano: &mut Panorama, kind: ImageVariableKind, part: usize) {
        if !self.check(kind) {
            return;
        }
        let members: Vec<usize> = self.members(part).collect();
        if let Some((&anchor, rest)) = members.split_first() {
            for &image in rest {
                pano.link_image_variable_kind(kind, anchor, image);
            }
        }
        self.update_part_numbers(pano);
    }

    /// Unlink `kind` on every image of `part`.
    pub fn unlink_variable_part(&mut self, pano: &mut Panorama, kind: ImageVariableKind, part: usize) {
        if !self.check(kind) {
            return;
        }
        let members: Vec<usize> = self.members(part).collect();
        for image in members {
            pano.unlink_image_variable_kind(kind, image);
        }
        self.update_part_numbers(pano);
    }

    /// Link `kind` across the part containing `image`.
    pub fn link_variable_image(&mut self, pano: &mut Panorama, kind: ImageVariableKind, image: usize) {
        let part = self.part_numbers[image];
        self.link_variable_part(pano, kind, part);
    }

    /// Unlink `kind` across the part containing `image`.
    pub fn unlink_variable_image(&mut self, pano: &mut Panorama, kind: ImageVariableKind, image: usize) {
        let part = self.part_numbers[image];
        self.unlink_variable_part(pano, kind, part);
    }

    /// Move `image` into `part`.
    ///
    /// The image takes over whichever group variables are linked on a member of the target
    /// part, or all group variables when that member is linked on none. Passing
    /// `part == number_of_parts()` detaches the image into a part of its own.
    ///
    /// # Errors
    ///
    /// [`PanoError::PartOutOfRange`] if `part > number_of_parts()`.
    pub fn switch_parts(&mut self, pano: &mut Panorama, image: usize, part: usize) -> Result<(), PanoError> {
        if self.part_numbers.get(image) == Some(&part) {
            return Ok(());
        }
        if part > self.num_parts {
            error!("cannot move image {image} to nonexistent part {part}");
            return Err(PanoError::PartOutOfRange {
                part,
                parts: self.num_parts,
            });
        }
        debug!("moving image {image} to part {part}");
        let target = self.members(part).next().map(|rep| {
            let linked: Vec<ImageVariableKind> = self
                .variables
                .iter()
                .copied()
                .filter(|&kind| pano.image(rep).is_linked_kind(kind))
                .collect();
            if linked.is_empty() {
                (rep, self.variables.iter().copied().collect())
            } else {
                (rep, linked)
            }
        });
        for &kind in &self.variables {
            pano.unlink_image_variable_kind(kind, image);
        }
        if let Some((rep, linked)) = target {
            for kind in linked {
                pano.link_image_variable_kind(kind, rep, image);
            }
        }
        pano.image_changed(image);
        self.update_part_numbers(pano);
        Ok(())
    }
}

/// One lens variable in the legacy aggregate form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensVariable {
    pub name: String,
    pub value: Real,
    pub linked: bool,
}

/// Legacy per-lens summary keyed by PTO code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lens {
    pub projection: Projection,
    pub image_size: Size2D,
    pub crop_factor: Real,
    pub variables: BTreeMap<String, LensVariable>,
}

/// The lens and stack groups of a panorama.
#[derive(Debug, Clone)]
pub struct StandardImageVariableGroups {
    lenses: ImageVariableGroup,
    stacks: ImageVariableGroup,
}

impl StandardImageVariableGroups {
    pub fn new(pano: &Panorama) -> Self {
        Self {
            lenses: ImageVariableGroup::new(LENS_VARIABLES, pano),
            stacks: ImageVariableGroup::new(STACK_VARIABLES, pano),
        }
    }

    pub fn lens_variables() -> BTreeSet<ImageVariableKind> {
        LENS_VARIABLES.into_iter().collect()
    }

    pub fn stack_variables() -> BTreeSet<ImageVariableKind> {
        STACK_VARIABLES.into_iter().collect()
    }

    pub fn lenses(&self) -> &ImageVariableGroup {
        &self.lenses
    }

    pub fn lenses_mut(&mut self) -> &mut ImageVariableGroup {
        &mut self.lenses
    }

    pub fn stacks(&self) -> &ImageVariableGroup {
        &self.stacks
    }

    pub fn stacks_mut(&mut self) -> &mut ImageVariableGroup {
        &mut self.stacks
    }

    pub fn update(&mut self, pano: &Panorama) {
        self.lenses.update_part_numbers(pano);
        self.stacks.update_part_numbers(pano);
    }

    /// Legacy lens of the first image using lens `lens`.
    pub fn lens(&self, pano: &Panorama, lens: usize) -> Option<Lens> {
        let image = self.lenses.part_numbers.iter().position(|&p| p == lens);
        if image.is_none() {
            error!("no image uses lens {lens}");
        }
        image.map(|i| Self::lens_for_image(pano, i))
    }

    /// Lens summary of one image. Each code is flagged linked if the image's variable is.
    pub fn lens_for_image(pano: &Panorama, image: usize) -> Lens {
        let img = pano.image(image);
        let variables = VARIABLE_CODES
            .iter()
            .filter(|c| LENS_VARIABLES.contains(&c.kind))
            .map(|c| {
                let var = LensVariable {
                    name: c.code.to_string(),
                    value: c.get(img),
                    linked: img.is_linked_kind(c.kind),
                };
                (var.name.clone(), var)
            })
            .collect();
        Lens {
            projection: img.projection(),
            image_size: img.size(),
            crop_factor: img.get::<crate::var::ExifCropFactor>(),
            variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var;

    fn pano(n: usize) -> Panorama {
        let mut pano = Panorama::new();
        for i in 0..n {
            pano.add_image(SrcPanoImage::new(format!("{i}.jpg"), Size2D::new(100, 80)));
        }
        pano
    }

    #[test]
    fn unlinked_images_each_own_a_part() {
        let pano = pano(3);
        let group = ConstImageVariableGroup::new(LENS_VARIABLES, &pano);
        assert_eq!(group.number_of_parts(), 3);
        assert_eq!(group.parts_set()[2], BTreeSet::from([2]));
    }

    #[test]
    fn link_and_unlink_part() {
        let mut pano = pano(3);
        let mut stacks = ImageVariableGroup::new(STACK_VARIABLES, &pano);
        pano.link_image_variable::<var::Yaw>(0, 1);
        stacks.update_part_numbers(&pano);
        assert_eq!(stacks.number_of_parts(), 2);

        stacks.link_variable_part(&mut pano, ImageVariableKind::Pitch, 0);
        assert!(pano.image(1).is_linked_with::<var::Pitch>(pano.image(0)));
        assert!(stacks.var_linked_in_part(&pano, ImageVariableKind::Pitch, 0));
        assert!(!stacks.var_linked_in_part(&pano, ImageVariableKind::Roll, 0));
        // single image part reports linked
        assert!(stacks.var_linked_in_part(&pano, ImageVariableKind::Roll, 1));

        stacks.unlink_variable_image(&mut pano, ImageVariableKind::Yaw, 1);
        assert_eq!(stacks.number_of_parts(), 2);
        stacks.unlink_variable_image(&mut pano, ImageVariableKind::Pitch, 1);
        assert_eq!(stacks.number_of_parts(), 3);
    }

    #[test]
    fn switch_parts_takes_linked_set_of_target() {
        let mut pano = pano(3);
        pano.link_image_variable::<var::Hfov>(0, 1);
        pano.link_image_variable::<var::RadialDistortion>(0, 1);
        let mut lenses = ImageVariableGroup::new(LENS_VARIABLES, &pano);
        assert_eq!(lenses.part_number(2), 1);

        lenses.switch_parts(&mut pano, 2, 0).unwrap();
        assert_eq!(lenses.number_of_parts(), 1);
        assert!(pano.image(2).is_linked_with::<var::Hfov>(pano.image(0)));
        assert!(pano.image(2).is_linked_with::<var::RadialDistortion>(pano.image(0)));
        assert!(!pano.image(2).is_linked::<var::Gamma>());
    }

    #[test]
    fn switch_into_singleton_links_everything() {
        let mut pano = pano(2);
        let mut lenses = ImageVariableGroup::new(LENS_VARIABLES, &pano);
        lenses.switch_parts(&mut pano, 1, 0).unwrap();
        for kind in LENS_VARIABLES {
            assert!(pano.image(1).is_linked_with_kind(kind, pano.image(0)), "{kind:?}");
        }
        // and out again into a fresh part
        lenses.switch_parts(&mut pano, 1, 1).unwrap();
        assert_eq!(lenses.number_of_parts(), 2);
        assert!(!pano.image(1).is_linked::<var::Hfov>());
        assert!(lenses.switch_parts(&mut pano, 1, 5).is_err());
    }

    #[test]
    fn lens_reports_codes_and_links() {
        let mut pano = pano(2);
        pano.link_image_variable::<var::Hfov>(0, 1);
        pano.update_variable::<var::Hfov>(1, 72.0);
        let groups = StandardImageVariableGroups::new(&pano);
        let lens = groups.lens(&pano, 0).unwrap();
        assert_eq!(lens.variables["v"].value, 72.0);
        assert!(lens.variables["v"].linked);
        assert!(!lens.variables["a"].linked);
        assert!(lens.variables.contains_key("Va"));
        assert!(!lens.variables.contains_key("y"));
        assert_eq!(lens.image_size, Size2D::new(100, 80));
        assert!(groups.lens(&pano, 3).is_none());
    }
}
