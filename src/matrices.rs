//! Matrix generators
//!
//! Every generator resizes its target (so a view must already have the requested shape)
//! and writes only the locally stored entries. Random generators draw on one process per
//! group of processes storing the same entries and broadcast from there, so redundant
//! copies agree no matter which generator each process passes in.
use crate::comm::Comm;
use crate::dist_matrix::DistMatrix;
use crate::error::{Error, Result};
use crate::types::{Base, Element, Scalar};
use rand::Rng;

/// Set `a` to the `height x width` zero matrix.
pub fn zeros<T: Element, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    height: usize,
    width: usize,
) -> Result<()> {
    a.resize(height, width)?;
    a.matrix_mut()?.fill(T::default());
    Ok(())
}

/// Set `a` to the `height x width` identity.
pub fn identity<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    height: usize,
    width: usize,
) -> Result<()> {
    zeros(a, height, width)?;
    set_diagonal(a, T::one(), 0)
}

/// Set every entry of diagonal `offset` (above the main diagonal if positive) to `value`.
pub fn set_diagonal<T: Element, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    value: T,
    offset: isize,
) -> Result<()> {
    a.assert_not_locked()?;
    if !a.participating() {
        return Ok(());
    }
    for j_loc in 0..a.local_width() {
        let j = a.global_col(j_loc);
        let i = j as isize - offset;
        if i >= 0 && (i as usize) < a.height() && a.is_local_row(i as usize) {
            let i_loc = a.local_row_offset(i as usize);
            a.set_local(i_loc, j_loc, value);
        }
    }
    Ok(())
}

/// Set every entry `(i, j)` to `f(i, j)`.
pub fn fill_with<T: Element, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    f: impl Fn(usize, usize) -> T,
) -> Result<()> {
    a.assert_not_locked()?;
    if !a.participating() {
        return Ok(());
    }
    for j_loc in 0..a.local_width() {
        let j = a.global_col(j_loc);
        for i_loc in 0..a.local_height() {
            let i = a.global_row(i_loc);
            a.set_local(i_loc, j_loc, f(i, j));
        }
    }
    Ok(())
}

/// Number of superdiagonals of a Grcar matrix unless requested otherwise
pub const GRCAR_SUPERDIAGONALS: usize = 3;

/// The `n x n` Grcar matrix: `-1` on the first subdiagonal and `1` on the main diagonal
/// and the first `k` superdiagonals, [`GRCAR_SUPERDIAGONALS`] if `k` is `None`.
pub fn grcar<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    n: usize,
    k: Option<usize>,
) -> Result<()> {
    let k = k.unwrap_or(GRCAR_SUPERDIAGONALS);
    zeros(a, n, n)?;
    if n > 1 {
        set_diagonal(a, -T::one(), -1)?;
    }
    for offset in 0..n.min(k + 1) {
        set_diagonal(a, T::one(), offset as isize)?;
    }
    Ok(())
}

/// Draw the local entries on the first process of each redundant group and share them
/// with the rest of the group.
fn fill_redundant<T: Scalar, C: Comm, R: Rng>(
    a: &mut DistMatrix<'_, T, C>,
    rng: &mut R,
    mut sample: impl FnMut(&mut R) -> T,
) -> Result<()> {
    a.assert_not_locked()?;
    if !a.grid().participating() {
        return Err(Error::NotParticipating.report());
    }
    if !a.participating() {
        return Ok(());
    }
    let comm = a.redundant_comm();
    let mut values = if a.redundant_rank() == 0 {
        (0..a.local_height() * a.local_width())
            .map(|_| sample(rng))
            .collect()
    } else {
        vec![]
    };
    if comm.size() > 1 {
        log::trace!("Sharing {} random entries", values.len());
        comm.broadcast(&mut values, 0);
    }
    let height = a.local_height();
    for (index, value) in values.into_iter().enumerate() {
        a.set_local(index % height, index / height, value);
    }
    Ok(())
}

/// Entries are `1` and `-1` each with probability `p / 2` and `0` otherwise.
///
/// Collective over the grid.
pub fn three_valued<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    height: usize,
    width: usize,
    p: f64,
    rng: &mut impl Rng,
) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(Error::InvalidArgument(format!("probability {p} is not in [0, 1]")).report());
    }
    a.resize(height, width)?;
    fill_redundant(a, rng, |rng| {
        let u: f64 = rng.gen();
        if u < p / 2.0 {
            T::one()
        } else if u < p {
            -T::one()
        } else {
            T::zero()
        }
    })
}

/// Entries are `1` or `-1` with equal probability. Collective over the grid.
pub fn rademacher<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    height: usize,
    width: usize,
    rng: &mut impl Rng,
) -> Result<()> {
    three_valued(a, height, width, 1.0, rng)
}

/// Entries are drawn uniformly from the ball of radius `radius` around `center`: an
/// interval for real and a disc for complex scalars. Collective over the grid.
pub fn uniform<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    height: usize,
    width: usize,
    center: T,
    radius: Base<T>,
    rng: &mut impl Rng,
) -> Result<()> {
    a.resize(height, width)?;
    fill_redundant(a, rng, |rng| {
        let offset = if T::IS_COMPLEX {
            let r = rng.gen::<f64>().sqrt();
            let theta = rng.gen_range(0.0..std::f64::consts::TAU);
            T::from_parts(T::real(r * theta.cos()), T::real(r * theta.sin()))
        } else {
            T::from_real(T::real(rng.gen_range(-1.0f64..=1.0)))
        };
        center + offset * T::from_real(radius)
    })
}
