//! General type definitions

use num::complex::Complex;

/// Types the active communication backend can transfer.
///
/// With the `mpi` feature this is [`mpi::datatype::Equivalence`], so that buffers are sent
/// with their MPI datatype.
#[cfg(feature = "mpi")]
pub trait Transferable: mpi::datatype::Equivalence {}

#[cfg(feature = "mpi")]
impl<T: mpi::datatype::Equivalence> Transferable for T {}

/// Types the active communication backend can transfer.
#[cfg(not(feature = "mpi"))]
pub trait Transferable {}

#[cfg(not(feature = "mpi"))]
impl<T> Transferable for T {}

/// Plain data that can be moved between processes.
pub trait Payload: Copy + Default + Send + Sync + Transferable + 'static {}

macro_rules! impl_payload {
    ($($t:ty),*) => {
        $(
            impl Payload for $t {}
        )*
    };
}

impl_payload!(u8, u32, u64, usize, i32, i64, isize, f32, f64, Complex<f32>, Complex<f64>);

/// Entry type of a distributed matrix.
///
/// Integer matrices (for example permutation vectors) only need this bound.
pub trait Element: Payload + PartialEq + std::fmt::Debug + std::ops::AddAssign {}

impl<T: Payload + PartialEq + std::fmt::Debug + std::ops::AddAssign> Element for T {}

/// The real base type of a scalar.
pub type Base<T> = <T as cauchy::Scalar>::Real;

/// Real or complex scalar type.
///
/// `<T as cauchy::Scalar>::Real` plays the role of the base field.
pub trait Scalar: cauchy::Scalar + Element {
    /// Is the type complex?
    const IS_COMPLEX: bool;

    /// Build a value from its parts. Real types drop the imaginary part.
    fn from_parts(re: Base<Self>, im: Base<Self>) -> Self;
}

macro_rules! impl_real_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const IS_COMPLEX: bool = false;
                fn from_parts(re: $t, _im: $t) -> Self {
                    re
                }
            }
        )*
    };
}

macro_rules! impl_complex_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for Complex<$t> {
                const IS_COMPLEX: bool = true;
                fn from_parts(re: $t, im: $t) -> Self {
                    Complex::new(re, im)
                }
            }
        )*
    };
}

impl_real_scalar!(f32, f64);
impl_complex_scalar!(f32, f64);

/// A single matrix entry addressed by its indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry<T> {
    /// Row index
    pub i: usize,
    /// Column index
    pub j: usize,
    /// Value
    pub value: T,
}

impl<T> Entry<T> {
    /// Create an entry
    pub fn new(i: usize, j: usize, value: T) -> Self {
        Self { i, j, value }
    }
}

/// How a matrix relates to the storage it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewType {
    /// The matrix owns and may reallocate its storage.
    Owner,
    /// The matrix owns its storage but its shape is fixed.
    OwnerFixedSize,
    /// The matrix aliases storage owned by another matrix.
    View,
    /// The matrix aliases storage owned by another matrix and may not write to it.
    LockedView,
}

impl ViewType {
    /// Does the matrix alias foreign storage?
    pub fn is_viewing(self) -> bool {
        matches!(self, ViewType::View | ViewType::LockedView)
    }

    /// Is writing forbidden?
    pub fn is_locked(self) -> bool {
        matches!(self, ViewType::LockedView)
    }

    /// Is the shape fixed?
    pub fn is_fixed_size(self) -> bool {
        !matches!(self, ViewType::Owner)
    }
}

/// A symmetric pivot: `nb` rows/columns starting at the current position are swapped with
/// the rows/columns listed in `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LdlPivot {
    /// Block size of the pivot (1 or 2)
    pub nb: usize,
    /// Source indices, relative to the current position
    pub from: [usize; 2],
}

/// A value together with the index it was found at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueIndex<R> {
    /// The value
    pub value: R,
    /// The index of the value
    pub index: usize,
}
