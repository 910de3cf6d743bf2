//! End-to-end behaviour of the panorama aggregate and its link groups.

use std::collections::BTreeSet;

use pano_core::{
    var, ControlPoint, ImageVariableKind, OptimizerSwitch, Panorama, ProjectionFormat, Size2D,
    SrcPanoImage, StandardImageVariableGroups,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn pano(n: usize) -> Panorama {
    let mut pano = Panorama::new();
    for i in 0..n {
        pano.add_image(SrcPanoImage::new(format!("img{i}.jpg"), Size2D::new(3000, 2000)));
    }
    pano
}

#[test]
fn three_images_two_lenses() {
    let mut pano = pano(3);
    pano.link_image_variable::<var::Hfov>(0, 1);
    let groups = StandardImageVariableGroups::new(&pano);
    let lenses = groups.lenses();
    assert_eq!(lenses.number_of_parts(), 2);
    assert_eq!(lenses.part_number(0), lenses.part_number(1));
    assert_ne!(lenses.part_number(0), lenses.part_number(2));

    pano.unlink_image_variable::<var::Hfov>(1);
    let groups = StandardImageVariableGroups::new(&pano);
    assert_eq!(groups.lenses().number_of_parts(), 3);
}

#[test]
fn partition_does_not_merge_through_later_images() {
    // 0-2 share the field of view, 1-2 share distortion; 0 and 1 share nothing
    let mut pano = pano(3);
    pano.link_image_variable::<var::Hfov>(0, 2);
    pano.link_image_variable::<var::RadialDistortion>(1, 2);
    let groups = StandardImageVariableGroups::new(&pano);
    let lenses = groups.lenses();
    assert_eq!(lenses.number_of_parts(), 2);
    assert_eq!(lenses.part_number(2), lenses.part_number(0));
    assert_eq!(lenses.part_number(1), 1);
    assert_eq!(
        lenses.parts_set(),
        [BTreeSet::from([0, 2]), BTreeSet::from([1])]
    );
}

#[test]
fn chained_links_form_one_lens() {
    // 0-1 and 1-2 share the field of view, so 0 and 2 end up in one part through 1
    let mut pano = pano(3);
    pano.link_image_variable::<var::Hfov>(0, 1);
    pano.link_image_variable::<var::RadialDistortion>(1, 2);
    assert!(!pano.image(2).is_linked_with::<var::Hfov>(pano.image(0)));
    let groups = StandardImageVariableGroups::new(&pano);
    let lenses = groups.lenses();
    assert_eq!(lenses.number_of_parts(), 1);
    assert_eq!(lenses.parts_set(), [BTreeSet::from([0, 1, 2])]);
}

#[test]
fn removing_the_reference_image() {
    let mut pano = pano(4);
    let mut opts = pano.options().clone();
    opts.optimize_reference_image = 2;
    opts.color_reference_image = 3;
    pano.set_options(opts);

    pano.remove_image(2);
    assert_eq!(pano.options().optimize_reference_image, 0);
    assert_eq!(pano.options().color_reference_image, 2);
    assert_eq!(pano.image(2).filename(), "img3.jpg");

    pano.remove_image(0);
    assert_eq!(pano.options().optimize_reference_image, 0);
    assert_eq!(pano.options().color_reference_image, 1);
    pano.set_optimizer_switch(OptimizerSwitch::POSITION);
    pano.change_finished(false);
    assert!(pano.optimize_vector()[0].is_empty());
    assert_eq!(pano.optimize_vector()[1].len(), 3);
}

#[test]
fn remove_image_renumbers_control_points() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..25 {
        let n = rng.random_range(2..9);
        let mut pano = pano(n);
        for _ in 0..rng.random_range(0..20) {
            let a = rng.random_range(0..n);
            let b = rng.random_range(0..n);
            pano.add_ctrl_point(ControlPoint::new(a, 1.0, 2.0, b, 3.0, 4.0, ControlPoint::X_Y));
        }
        let before = pano.ctrl_points().to_vec();
        let k = rng.random_range(0..n);
        pano.remove_image(k);

        assert_eq!(pano.nr_of_images(), n - 1);
        assert_eq!(pano.optimize_vector().len(), n - 1);
        let shift = |i: usize| if i > k { i - 1 } else { i };
        let expected: Vec<(usize, usize)> = before
            .iter()
            .filter(|cp| cp.image1 != k && cp.image2 != k)
            .map(|cp| (shift(cp.image1), shift(cp.image2)))
            .collect();
        let actual: Vec<(usize, usize)> = pano.ctrl_points().iter().map(|cp| (cp.image1, cp.image2)).collect();
        assert_eq!(actual, expected);
    }
}

#[test]
fn position_switch_limits_reference_angles() {
    let mut pano = pano(3);
    let mut opts = pano.options().clone();
    opts.set_projection(ProjectionFormat::Rectilinear);
    opts.set_hfov(90.0, false);
    pano.set_options(opts);
    pano.add_ctrl_point(ControlPoint::new(0, 10.0, 10.0, 1, 20.0, 20.0, ControlPoint::X_Y));
    pano.add_ctrl_point(ControlPoint::new(1, 30.0, 30.0, 2, 40.0, 40.0, ControlPoint::X_Y));
    pano.add_ctrl_point(ControlPoint::new(2, 50.0, 10.0, 2, 52.0, 900.0, ControlPoint::X));
    pano.set_optimizer_switch(OptimizerSwitch::POSITION);
    pano.change_finished(false);

    let optvec = pano.optimize_vector();
    assert_eq!(optvec[0], BTreeSet::from(["r".to_string()]));
    for entry in &optvec[1..] {
        assert_eq!(entry, &BTreeSet::from(["p".to_string(), "r".to_string(), "y".to_string()]));
    }
}

#[test]
fn switching_lens_parts_from_the_panorama() {
    let mut pano = pano(3);
    for kind in StandardImageVariableGroups::lens_variables() {
        pano.link_image_variable_kind(kind, 0, 1);
    }
    let mut groups = StandardImageVariableGroups::new(&pano);
    assert_eq!(groups.lenses().number_of_parts(), 2);

    groups.lenses_mut().switch_parts(&mut pano, 2, 0).unwrap();
    assert!(pano.image(2).is_linked_with_kind(ImageVariableKind::Hfov, pano.image(0)));
    assert_eq!(groups.lenses().number_of_parts(), 1);

    pano.update_variable::<var::Hfov>(2, 70.0);
    assert_eq!(pano.image(1).hfov(), 70.0);
}
