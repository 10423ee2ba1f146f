use criterion::{criterion_group, criterion_main, Criterion};
use point_index::kdtree::KdTree;
use point_index::octree::Octree;
use point_index::quadtree::{QuadTree, QuadTreeOptions};
use point_index::Aabb2;
use rand::prelude::*;

const EXTENT: f64 = 1000.0;

fn load_points(n: usize) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            [
                rng.gen_range(0.0..EXTENT),
                rng.gen_range(0.0..EXTENT),
                rng.gen_range(0.0..EXTENT),
            ]
        })
        .collect()
}

fn load_targets(n: usize) -> Vec<[f64; 3]> {
    let mut rng = StdRng::seed_from_u64(8);
    (0..n)
        .map(|_| {
            [
                rng.gen_range(0.0..EXTENT),
                rng.gen_range(0.0..EXTENT),
                rng.gen_range(0.0..EXTENT),
            ]
        })
        .collect()
}

fn sq_dist(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let points = load_points(10_000);
    let targets = load_targets(100);

    let kdtree = KdTree::build(|p: &[f64; 3]| *p, points.clone()).unwrap();

    let mut octree = Octree::new(|p: &[f64; 3]| *p);
    for &p in &points {
        octree.insert(p);
    }

    let mut quadtree = QuadTree::with_options(
        Aabb2::new(0.0, 0.0, EXTENT, EXTENT),
        |p: &[f64; 3]| [p[0], p[1]],
        QuadTreeOptions {
            spatial_threshold: 0,
            ..Default::default()
        },
    )
    .unwrap();
    for &p in &points {
        quadtree.insert(p).unwrap();
    }

    c.bench_function("construction (kdtree bulk)", |b| {
        b.iter(|| KdTree::build(|p: &[f64; 3]| *p, points.clone()).unwrap())
    });

    c.bench_function("nearest (kdtree)", |b| {
        b.iter(|| {
            for t in &targets {
                kdtree.find_nearest(*t).unwrap();
            }
        })
    });

    c.bench_function("nearest (octree)", |b| {
        b.iter(|| {
            for t in &targets {
                octree.find_nearest(*t).unwrap();
            }
        })
    });

    c.bench_function("nearest 2d (quadtree)", |b| {
        b.iter(|| {
            for t in &targets {
                quadtree.find_nearest([t[0], t[1]]).unwrap();
            }
        })
    });

    c.bench_function("nearest (linear scan)", |b| {
        b.iter(|| {
            for t in &targets {
                points
                    .iter()
                    .map(|p| sq_dist(p, t))
                    .fold(f64::INFINITY, f64::min);
            }
        })
    });

    c.bench_function("nearest k=10 (kdtree)", |b| {
        b.iter(|| {
            for t in &targets {
                kdtree.find_nearest_k(*t, 10);
            }
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
