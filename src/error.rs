use std::fmt::Debug;
use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
pub enum PointIndexError {
    /// A structure was constructed with an unusable parameter, such as a
    /// non-positive cell size or an empty bounding box.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A point was inserted outside an index whose bounds are fixed at
    /// construction.
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// A nearest-neighbor result was requested from an index with no items.
    #[error("The index is empty")]
    EmptyIndex,
}

pub type Result<T> = std::result::Result<T, PointIndexError>;
