//! A mutable 2-D point index over a fixed bounding box.

#![warn(missing_docs)]

mod tree;

pub use tree::{QuadTree, QuadTreeOptions};
