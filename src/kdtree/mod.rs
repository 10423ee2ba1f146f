//! A mutable k-dimensional point index with a pluggable distance metric.

#![warn(missing_docs)]

mod metric;
mod tree;

pub use metric::{Manhattan, Metric, SquaredEuclidean};
pub use tree::KdTree;
