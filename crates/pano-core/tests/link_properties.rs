//! Randomized checks of variable linking through the PTO code table.

use pano_core::{ImageVariableKind, Size2D, SrcPanoImage, VARIABLE_CODES};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[test]
fn linked_writes_are_shared_until_unlinked() {
    let mut rng = StdRng::seed_from_u64(7);
    for code in VARIABLE_CODES {
        let mut a = SrcPanoImage::new("a.jpg", Size2D::new(640, 480));
        let mut b = SrcPanoImage::new("b.jpg", Size2D::new(640, 480));
        b.link_kind(code.kind, &a);
        assert!(a.is_linked_with_kind(code.kind, &b), "{}", code.code);

        let x: f64 = rng.random_range(-10.0..10.0);
        code.set(&mut a, x);
        assert_eq!(code.get(&b), x, "{}", code.code);

        b.unlink_kind(code.kind);
        let y: f64 = rng.random_range(20.0..30.0);
        code.set(&mut b, y);
        assert_eq!(code.get(&a), x, "{}", code.code);
        assert_eq!(code.get(&b), y, "{}", code.code);
    }
}

#[test]
fn chains_of_links_form_one_class() {
    let mut rng = StdRng::seed_from_u64(11);
    let kinds = [ImageVariableKind::Hfov, ImageVariableKind::Yaw, ImageVariableKind::ExposureValue];
    for _ in 0..20 {
        let n = rng.random_range(2..8);
        let mut images: Vec<SrcPanoImage> = (0..n)
            .map(|i| SrcPanoImage::new(format!("{i}.jpg"), Size2D::new(100, 100)))
            .collect();
        let kind = kinds[rng.random_range(0..kinds.len())];
        for i in 1..n {
            let anchor = rng.random_range(0..i);
            let (head, tail) = images.split_at_mut(i);
            tail[0].link_kind(kind, &head[anchor]);
        }
        for i in 0..n {
            for j in 0..n {
                assert!(images[i].is_linked_with_kind(kind, &images[j]));
            }
        }
        let code = VARIABLE_CODES.iter().find(|c| c.kind == kind).unwrap();
        let v = rng.random_range(1.0..5.0);
        let last = n - 1;
        code.set(&mut images[last], v);
        assert!(images.iter().all(|img| code.get(img) == v));
    }
}
