//! Copying, subsetting and merging panoramas.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, info};

use super::{pair_mut, ControlPoint, Panorama};
use crate::{ImageVariableKind, PanoError};

impl Panorama {
    /// Copies of the images at `order`, linked among themselves as the originals are.
    fn copy_images(&self, order: &[usize]) -> Panorama {
        let mut out = Panorama::new();
        out.options = self.options.clone();
        out.optimizer_switch = self.optimizer_switch;
        out.photometric_switch = self.photometric_switch;
        out.needs_optimization = self.needs_optimization;
        out.file_prefix = self.file_prefix.clone();

        let mut new_index = BTreeMap::new();
        for (new, &old) in order.iter().enumerate() {
            let mut img = self.images[old].clone();
            for &kind in ImageVariableKind::ALL {
                if let Some(anchor) = order[..new]
                    .iter()
                    .position(|&prev| self.images[prev].is_linked_with_kind(kind, &self.images[old]))
                {
                    img.link_single(kind, &out.images[anchor]);
                }
            }
            out.images.push(img);
            out.optvec.push(self.optvec[old].clone());
            new_index.insert(old, new);
        }

        out.ctrl_points = self
            .ctrl_points
            .iter()
            .filter_map(|cp| {
                let (&image1, &image2) = (new_index.get(&cp.image1)?, new_index.get(&cp.image2)?);
                Some(ControlPoint {
                    image1,
                    image2,
                    ..cp.clone()
                })
            })
            .collect();
        out.options.optimize_reference_image =
            new_index.get(&self.options.optimize_reference_image).copied().unwrap_or(0);
        out.options.color_reference_image = new_index.get(&self.options.color_reference_image).copied().unwrap_or(0);
        for i in 0..out.images.len() {
            out.image_changed(i);
        }
        out
    }

    /// A standalone panorama holding the images in `images`, renumbered in ascending order.
    ///
    /// Links among the chosen images, control points between them and the reference images
    /// (image 0 when not chosen) carry over. Observers do not.
    ///
    /// # Errors
    ///
    /// [`PanoError::ImageOutOfRange`] when an index is past the end.
    pub fn subset(&self, images: &BTreeSet<usize>) -> Result<Panorama, PanoError> {
        if let Some(&index) = images.iter().find(|&&i| i >= self.images.len()) {
            return Err(PanoError::ImageOutOfRange {
                index,
                len: self.images.len(),
            });
        }
        let order: Vec<usize> = images.iter().copied().collect();
        Ok(self.copy_images(&order))
    }

    /// Deep copy with its own link cells; observers are not copied.
    pub fn duplicate(&self) -> Panorama {
        let order: Vec<usize> = (0..self.images.len()).collect();
        self.copy_images(&order)
    }

    /// Append the images of `other` whose file names are not already present, with their
    /// links among each other, optimize sets and control points. Line control points of
    /// `other` get fresh line numbers.
    pub fn merge_panorama(&mut self, other: &Panorama) {
        let mut index = BTreeMap::new();
        let mut added = Vec::new();
        for (i, img) in other.images.iter().enumerate() {
            let name = img.filename();
            match self.images.iter().position(|own| own.filename() == name) {
                Some(existing) => {
                    index.insert(i, existing);
                }
                None => {
                    let new = self.add_image(img.clone());
                    self.optvec[new] = other.optvec[i].clone();
                    index.insert(i, new);
                    added.push(i);
                }
            }
        }

        for (pos, &i) in added.iter().enumerate() {
            let target = index[&i];
            for &kind in ImageVariableKind::ALL {
                if let Some(&anchor) = added[..pos]
                    .iter()
                    .find(|&&prev| other.images[prev].is_linked_with_kind(kind, &other.images[i]))
                {
                    let (image, source) = pair_mut(&mut self.images, target, index[&anchor]);
                    image.link_single(kind, source);
                }
            }
        }

        let line_offset = self.next_cp_type_line_number() - ControlPoint::FIRST_LINE;
        for cp in &other.ctrl_points {
            let mut cp = cp.clone();
            cp.image1 = index[&cp.image1];
            cp.image2 = index[&cp.image2];
            if cp.is_line() {
                cp.mode += line_offset;
            }
            self.add_ctrl_point(cp);
        }
        info!("merged {} new image(s), {} control points", added.len(), other.ctrl_points.len());
        self.remove_duplicate_ctrl_points();
    }

    /// Drop control points equal to an earlier one, or to its mirror.
    pub fn remove_duplicate_ctrl_points(&mut self) {
        let mut seen = HashSet::new();
        let before = self.ctrl_points.len();
        let mut touched = Vec::new();
        self.ctrl_points.retain(|cp| {
            let keep = seen.insert(cp.key());
            if !keep {
                touched.extend([cp.image1, cp.image2]);
            }
            keep
        });
        if self.ctrl_points.len() != before {
            debug!("removed {} duplicate control points", before - self.ctrl_points.len());
            for i in touched {
                self.image_changed(i);
            }
            self.update_line_ctrl_points();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{var, Size2D, SrcPanoImage};

    fn pano(names: &[&str]) -> Panorama {
        let mut pano = Panorama::new();
        for name in names {
            pano.add_image(SrcPanoImage::new(*name, Size2D::new(400, 300)));
        }
        pano
    }

    #[test]
    fn subset_keeps_links_and_renumbers() {
        let mut pano = pano(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        pano.link_image_variable::<var::Hfov>(1, 3);
        pano.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 3, 2.0, 2.0, ControlPoint::X_Y));
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 3, 2.0, 2.0, ControlPoint::X_Y));
        let mut opts = pano.options().clone();
        opts.optimize_reference_image = 3;
        pano.set_options(opts);

        let sub = pano.subset(&BTreeSet::from([1, 3])).unwrap();
        assert_eq!(sub.nr_of_images(), 2);
        assert_eq!(sub.image(0).filename(), "b.jpg");
        assert!(sub.image(1).is_linked_with::<var::Hfov>(sub.image(0)));
        assert!(!sub.image(0).is_linked_with::<var::Hfov>(pano.image(1)));
        assert_eq!(sub.ctrl_points().len(), 1);
        assert_eq!((sub.ctrl_points()[0].image1, sub.ctrl_points()[0].image2), (0, 1));
        assert_eq!(sub.options().optimize_reference_image, 1);
        assert_eq!(sub.options().color_reference_image, 0);

        assert_eq!(
            pano.subset(&BTreeSet::from([1, 9])).unwrap_err(),
            PanoError::ImageOutOfRange { index: 9, len: 4 }
        );
    }

    #[test]
    fn copies_keep_coupled_variables_apart() {
        let mut pano = pano(&["a.jpg", "b.jpg", "c.jpg"]);
        pano.link_image_variable::<var::EmorParams>(0, 2);
        pano.unlink_image_variable::<var::ResponseType>(2);
        assert!(pano.image(2).is_linked_with::<var::EmorParams>(pano.image(0)));
        assert!(!pano.image(2).is_linked_with::<var::ResponseType>(pano.image(0)));

        let sub = pano.subset(&BTreeSet::from([0, 2])).unwrap();
        assert!(sub.image(1).is_linked_with::<var::EmorParams>(sub.image(0)));
        assert!(!sub.image(1).is_linked_with::<var::ResponseType>(sub.image(0)));

        let mut merged = Panorama::new();
        merged.merge_panorama(&pano);
        assert!(merged.image(2).is_linked_with::<var::EmorParams>(merged.image(0)));
        assert!(!merged.image(2).is_linked_with::<var::ResponseType>(merged.image(0)));
    }

    #[test]
    fn duplicate_is_independent() {
        let mut pano = pano(&["a.jpg", "b.jpg"]);
        pano.link_image_variable::<var::Yaw>(0, 1);
        let mut copy = pano.duplicate();
        copy.update_variable::<var::Yaw>(0, 30.0);
        assert_eq!(copy.image(1).get::<var::Yaw>(), 30.0);
        assert_eq!(pano.image(0).get::<var::Yaw>(), 0.0);
    }

    #[test]
    fn merge_skips_known_files_and_offsets_lines() {
        let mut pano = pano(&["a.jpg", "b.jpg"]);
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 1, 2.0, 2.0, ControlPoint::X_Y));
        pano.add_ctrl_point(ControlPoint::new(0, 1.0, 1.0, 0, 5.0, 5.0, 3));

        let mut other = self::pano(&["b.jpg", "c.jpg", "d.jpg", "a.jpg"]);
        other.link_image_variable::<var::Hfov>(1, 2);
        other.add_ctrl_point(ControlPoint::new(0, 2.0, 2.0, 2, 1.0, 1.0, ControlPoint::X_Y));
        // mirror of the first point of `pano`
        other.add_ctrl_point(ControlPoint::new(0, 2.0, 2.0, 3, 1.0, 1.0, ControlPoint::X_Y));
        other.add_ctrl_point(ControlPoint::new(1, 1.0, 1.0, 1, 4.0, 4.0, 3));

        pano.merge_panorama(&other);
        let names: Vec<_> = pano.images().iter().map(SrcPanoImage::filename).collect();
        assert_eq!(names, ["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        assert!(pano.image(3).is_linked_with::<var::Hfov>(pano.image(2)));
        assert_eq!(pano.optimize_vector().len(), 4);
        let cps = pano.ctrl_points();
        assert_eq!(cps.len(), 4);
        assert_eq!((cps[2].image1, cps[2].image2), (1, 3));
        assert_eq!((cps[3].image1, cps[3].mode), (2, 4));
    }

    #[test]
    fn duplicates_and_mirrors_are_removed() {
        let mut pano = pano(&["a.jpg", "b.jpg"]);
        let cp = ControlPoint::new(0, 1.0, 1.0, 1, 2.0, 2.0, ControlPoint::X_Y);
        pano.set_ctrl_points(vec![cp.clone(), cp.mirrored(), cp.clone()]);
        pano.remove_duplicate_ctrl_points();
        assert_eq!(pano.ctrl_points().to_vec(), vec![cp]);
    }
}
