use rand::prelude::*;

use crate::bounds::{Aabb3, Plane};
use crate::error::PointIndexError;
use crate::octree::{Octree, OctreeOptions};

type P = [f64; 3];

fn pos(p: &P) -> [f64; 3] {
    *p
}

fn random_points(n: usize, extent: f64, seed: u64) -> Vec<P> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            [
                rng.gen_range(-extent..extent),
                rng.gen_range(-extent..extent),
                rng.gen_range(-extent..extent),
            ]
        })
        .collect()
}

fn sq_dist(a: &P, b: [f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Six inward-facing planes forming the box `[min, max]`.
fn box_frustum(min: [f64; 3], max: [f64; 3]) -> [Plane<f64>; 6] {
    [
        Plane::new([1.0, 0.0, 0.0], -min[0]),
        Plane::new([-1.0, 0.0, 0.0], max[0]),
        Plane::new([0.0, 1.0, 0.0], -min[1]),
        Plane::new([0.0, -1.0, 0.0], max[1]),
        Plane::new([0.0, 0.0, 1.0], -min[2]),
        Plane::new([0.0, 0.0, -1.0], max[2]),
    ]
}

#[test]
fn invalid_configuration() {
    assert!(matches!(
        Octree::with_options(
            pos,
            OctreeOptions {
                initial_half_extent: 0.0,
                ..Default::default()
            }
        ),
        Err(PointIndexError::InvalidConfig(_))
    ));
}

#[test]
fn empty_tree_queries_are_empty_not_errors() {
    let tree: Octree<f64, P, _> = Octree::new(pos);
    assert!(tree.find_nearest([0.0, 0.0, 0.0]).is_none());
    assert!(tree
        .find_in_bounds(Aabb3::new([-1.0; 3], [1.0; 3]))
        .is_empty());
    assert!(tree.find_in_sphere([0.0; 3], 10.0).is_empty());
    assert!(tree.bounds().is_none());
}

#[test]
fn root_is_created_around_the_first_point() {
    let mut tree = Octree::new(pos);
    tree.insert([500.0, -3.0, 7.5]);
    let bounds = tree.bounds().unwrap();
    assert!(bounds.contains([500.0, -3.0, 7.5]));
    assert_eq!(*tree.find_nearest([0.0, 0.0, 0.0]).unwrap(), [500.0, -3.0, 7.5]);
}

#[test]
fn expansion_never_loses_items() {
    let mut tree = Octree::new(pos);
    // Outliers at exponentially growing distances force repeated re-rooting.
    let mut points: Vec<P> = random_points(200, 1.0, 13);
    for i in 0..12 {
        let d = 2.0f64.powi(i);
        points.push([d, -d, d / 2.0]);
        points.push([-d, d, -d]);
    }
    for &p in &points {
        tree.insert(p);
    }
    assert_eq!(tree.len(), points.len());

    let hits = tree.find_in_bounds(Aabb3::new([-5000.0; 3], [5000.0; 3]));
    assert_eq!(hits.len(), points.len());
}

#[test]
fn find_in_bounds_matches_linear_scan() {
    let points = random_points(400, 50.0, 17);
    let mut tree = Octree::new(pos);
    for &p in &points {
        tree.insert(p);
    }

    let mut rng = StdRng::seed_from_u64(18);
    for _ in 0..40 {
        let min = [
            rng.gen_range(-60.0..40.0),
            rng.gen_range(-60.0..40.0),
            rng.gen_range(-60.0..40.0),
        ];
        let size = rng.gen_range(5.0..40.0);
        let region = Aabb3::new(min, [min[0] + size, min[1] + size, min[2] + size]);
        let mut hits: Vec<P> = tree.find_in_bounds(region).into_iter().copied().collect();
        hits.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut expected: Vec<P> = points
            .iter()
            .copied()
            .filter(|p| region.contains(*p))
            .collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(hits, expected);
    }
}

#[test]
fn find_in_sphere_matches_linear_scan() {
    let points = random_points(400, 50.0, 29);
    let mut tree = Octree::new(pos);
    for &p in &points {
        tree.insert(p);
    }

    let mut rng = StdRng::seed_from_u64(30);
    for _ in 0..40 {
        let center = [
            rng.gen_range(-60.0..60.0),
            rng.gen_range(-60.0..60.0),
            rng.gen_range(-60.0..60.0),
        ];
        let radius = rng.gen_range(1.0..40.0);
        let mut hits: Vec<P> = tree
            .find_in_sphere(center, radius)
            .into_iter()
            .copied()
            .collect();
        hits.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mut expected: Vec<P> = points
            .iter()
            .copied()
            .filter(|p| sq_dist(p, center) <= radius * radius)
            .collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(hits, expected);
    }
}

#[test]
fn nearest_matches_linear_scan() {
    let mut points = random_points(500, 50.0, 41);
    points.extend_from_slice(&points.clone()[..30]); // duplicates
    let mut tree = Octree::new(pos);
    for &p in &points {
        tree.insert(p);
    }

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let target = [
            rng.gen_range(-80.0..80.0),
            rng.gen_range(-80.0..80.0),
            rng.gen_range(-80.0..80.0),
        ];
        let found = tree.find_nearest(target).unwrap();
        let best = points
            .iter()
            .map(|p| sq_dist(p, target))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(sq_dist(found, target), best);
    }
}

#[test]
fn frustum_culling_matches_plane_tests() {
    let points = random_points(500, 50.0, 53);
    let mut tree = Octree::new(pos);
    for &p in &points {
        tree.insert(p);
    }

    let planes = box_frustum([-20.0, -10.0, -30.0], [25.0, 40.0, 5.0]);
    let mut hits: Vec<P> = tree.find_in_frustum(&planes).into_iter().copied().collect();
    hits.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut expected: Vec<P> = points
        .iter()
        .copied()
        .filter(|p| planes.iter().all(|plane| plane.distance(*p) >= 0.0))
        .collect();
    expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!(!expected.is_empty());
    assert_eq!(hits, expected);
}

#[test]
fn duplicate_points_bottom_out_at_max_depth() {
    let mut tree = Octree::new(pos);
    for _ in 0..100 {
        tree.insert([3.0, 3.0, 3.0]);
    }
    assert_eq!(tree.len(), 100);
    assert_eq!(
        tree.find_in_sphere([3.0, 3.0, 3.0], 0.5).len(),
        100
    );
}

#[test]
fn buffer_variant_reuses_the_buffer() {
    let mut tree = Octree::new(pos);
    tree.insert([1.0, 1.0, 1.0]);
    tree.insert([9.0, 9.0, 9.0]);

    let mut buf = Vec::new();
    tree.find_in_bounds_into(Aabb3::new([-100.0; 3], [100.0; 3]), &mut buf);
    assert_eq!(buf.len(), 2);
    tree.find_in_sphere_into([1.0, 1.0, 1.0], 1.0, &mut buf);
    assert_eq!(buf, vec![&[1.0, 1.0, 1.0]]);
}

#[test]
fn clear_resets_everything() {
    let mut tree = Octree::new(pos);
    for &p in &random_points(50, 10.0, 61) {
        tree.insert(p);
    }
    tree.clear();
    assert!(tree.is_empty());
    assert!(tree.bounds().is_none());
    tree.insert([1.0, 2.0, 3.0]);
    assert_eq!(tree.len(), 1);
}
