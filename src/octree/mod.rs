//! A mutable 3-D point index whose root bounds expand to fit what is
//! inserted.

#![warn(missing_docs)]

mod tree;

pub use tree::{Octree, OctreeOptions};

#[cfg(test)]
mod test;
