#![doc = include_str!("../README.md")]

mod bounds;
mod coord;
mod error;
pub mod grid;
pub mod kdtree;
pub mod octree;
pub mod quadtree;

pub use bounds::{Aabb2, Aabb3, Plane};
pub use coord::CoordNum;
pub use error::PointIndexError;

#[cfg(test)]
pub(crate) mod test;
