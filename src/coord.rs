use std::fmt::Debug;

use num_traits::Float;

/// A trait for scalar types that can be used as indexed coordinates.
///
/// This trait is sealed and cannot be implemented for external types. The
/// structures in this crate rely on real (floating-point) arithmetic for
/// midpoints, squared distances, and cell keying, so only `f32` and `f64`
/// qualify.
pub trait CoordNum: private::Sealed + Float + Debug + Default + Send + Sync {}

impl CoordNum for f32 {}
impl CoordNum for f64 {}

// https://rust-lang.github.io/api-guidelines/future-proofing.html#sealed-traits-protect-against-downstream-implementations-c-sealed
mod private {
    pub trait Sealed {}

    impl Sealed for f32 {}
    impl Sealed for f64 {}
}
