//! Cholesky factorisation of Hermitian positive (semi-)definite matrices
//!
//! The lower triangle of `A` is overwritten with `L` such that `P A P^T = L L^H`, where
//! `P` is the permutation produced by symmetric pivoting on the largest remaining
//! diagonal entry. The strictly upper triangle is never referenced.
//!
//! The blocked variant factors a panel of `block_size` columns with a left-looking
//! algorithm, keeping the pending updates in two column panels `X` (`[MC, *]`) and
//! `Y` (`[MR, *]`), and then applies them to the trailing matrix in one local rank-k
//! update.
pub mod pivot;
pub mod sequential;

use crate::blas_like::{hermitian_swap_lower, local_gemv, local_trrk_lower, row_swap};
use crate::comm::Comm;
use crate::dist::Dist;
use crate::dist_matrix::DistMatrix;
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::redist;
use crate::types::{Base, Scalar};
use num::{Float, One, ToPrimitive, Zero};

/// Options for a Cholesky factorisation
#[derive(Debug, Clone)]
pub struct CholeskyOptions {
    /// Number of columns factored per panel
    block_size: usize,
}

impl Default for CholeskyOptions {
    fn default() -> Self {
        Self { block_size: 128 }
    }
}

impl CholeskyOptions {
    /// Set the number of columns factored per panel.
    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size;
    }
    /// Number of columns factored per panel
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

fn check_square<T: Scalar, C: Comm>(a: &DistMatrix<'_, T, C>) -> Result<()> {
    if a.height() != a.width() {
        return Err(Error::NotSquare {
            height: a.height(),
            width: a.width(),
        }
        .report());
    }
    if !a.grid().participating() {
        return Err(Error::NotParticipating.report());
    }
    Ok(())
}

fn check_block_size(options: &CholeskyOptions) -> Result<()> {
    if options.block_size == 0 {
        return Err(Error::InvalidArgument("block size must be positive".to_string()).report());
    }
    Ok(())
}

/// The permutation vector `[0, 1, ..., n - 1]` as a `[VC, *]` column.
fn identity_permutation<C: Comm>(grid: &Grid<C>, n: usize) -> DistMatrix<'_, usize, C> {
    let mut p = DistMatrix::with_size(grid, Distribution::VC_STAR, n, 1);
    for i_loc in 0..p.local_height() {
        let i = p.global_row(i_loc);
        p.set_local(i_loc, 0, i);
    }
    p
}

/// Run `factor` on `a`, or on an elemental `[MC, MR]` copy of it that is copied back.
fn with_elemental_proxy<T, C, F>(a: &mut DistMatrix<'_, T, C>, factor: F) -> Result<()>
where
    T: Scalar,
    C: Comm,
    F: FnOnce(&mut DistMatrix<'_, T, C>) -> Result<()>,
{
    if a.distribution() == Distribution::MC_MR && a.is_elemental() {
        return factor(a);
    }
    log::debug!("Factoring a {} matrix through an [MC, MR] proxy", a.distribution());
    let mut proxy = DistMatrix::new(a.grid(), Distribution::MC_MR);
    redist::copy(a, &mut proxy)?;
    factor(&mut proxy)?;
    redist::copy(&proxy, a)
}

/// Column panels `X` (`[MC, *]`, aligned with the rows of `a`) and `Y` (`[MR, *]`,
/// aligned with the columns of `a`).
fn panel_operands<'g, T: Scalar, C: Comm>(
    a: &DistMatrix<'g, T, C>,
    width: usize,
) -> Result<(DistMatrix<'g, T, C>, DistMatrix<'g, T, C>)> {
    let mut x = DistMatrix::new(a.grid(), Distribution::new(Dist::Mc, Dist::Star)?);
    x.align_cols(a.col_align(), false)?;
    x.resize(a.height(), width)?;
    let mut y = DistMatrix::new(a.grid(), Distribution::new(Dist::Mr, Dist::Star)?);
    y.align_cols(a.row_align(), false)?;
    y.resize(a.width(), width)?;
    Ok((x, y))
}

/// Take the square root of the pivot `(k, k)`, scale the column below it and store that
/// column in column `j` of `x` and, conjugated, of `y`.
fn finish_column<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    x: &mut DistMatrix<'_, T, C>,
    y: &mut DistMatrix<'_, T, C>,
    k: usize,
    j: usize,
) -> Result<()> {
    let n = a.height();
    a.make_real(k, k)?;
    let delta_sq = a.get_real_part(k, k)?;
    if !(delta_sq > <Base<T> as Zero>::zero()) {
        return Err(Error::NotPositiveDefinite {
            index: k,
            value: delta_sq.to_f64().unwrap_or(f64::NAN),
        }
        .report());
    }
    let delta = Float::sqrt(delta_sq);
    a.set_real_part(k, k, delta)?;
    {
        let mut a21 = a.view_mut(k + 1..n, k..k + 1)?;
        a21.scale(T::from_real(<Base<T> as One>::one() / delta))?;
    }

    let a21 = a.view(k + 1..n, k..k + 1)?;
    {
        let mut x21 = x.view_mut(k + 1..n, j..j + 1)?;
        redist::copy(&a21, &mut x21)?;
    }
    let mut y21 = y.view_mut(k + 1..n, j..j + 1)?;
    redist::copy(&a21, &mut y21)?;
    for i_loc in 0..y21.local_height() {
        for j_loc in 0..y21.local_width() {
            y21.conjugate_local(i_loc, j_loc);
        }
    }
    Ok(())
}

/// Left-looking factorisation of the `nb` columns of `a` starting at `off`.
///
/// Swaps are applied to all of `a`, to `p` and to the panels, and the updates of the
/// factored columns are left in `x` and `y` for the caller to apply.
fn panel<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    mut p: Option<&mut DistMatrix<'_, usize, C>>,
    x: &mut DistMatrix<'_, T, C>,
    y: &mut DistMatrix<'_, T, C>,
    nb: usize,
    off: usize,
) -> Result<()> {
    let n = a.height();
    if off + nb > n || x.width() < nb || y.width() < nb || x.height() != n || y.height() != n
    {
        return Err(Error::SizeMismatch {
            expected: (n, nb),
            found: (x.height(), x.width()),
        }
        .report());
    }
    if x.col_align() != a.col_align() || y.col_align() != a.row_align() {
        return Err(Error::IncompatibleDistribution(
            "panels are not aligned with the matrix".to_string(),
        )
        .report());
    }
    x.matrix_mut()?.fill(T::zero());
    y.matrix_mut()?.fill(T::zero());

    for j in 0..nb {
        let k = off + j;
        if let Some(p) = p.as_mut() {
            let pivot = {
                let abr = a.view(k..n, k..n)?;
                let xb0 = x.view(k..n, 0..j)?;
                let yb0 = y.view(k..n, 0..j)?;
                pivot::panel_full(&abr, &xb0, &yb0)?
            };
            let from = k + pivot.from[0];
            if from != k {
                log::trace!("Swapping {k} with {from}");
                hermitian_swap_lower(a, k, from)?;
                row_swap(p, k, from)?;
                row_swap(x, k, from)?;
                row_swap(y, k, from)?;
            }
        }

        if j > 0 {
            // a(k:n, k) -= X(k:n, 0:j) * Y(k, 0:j)^T
            let xb0 = x.view(k..n, 0..j)?;
            let y10 = y.view(k..k + 1, 0..j)?;
            let mut ab1 = a.view_mut(k..n, k..k + 1)?;
            if ab1.local_width() == 1 && y10.local_height() == 1 {
                let y_row = (0..j).map(|l| y10.get_local(0, l)).collect::<Vec<_>>();
                local_gemv(
                    -T::one(),
                    xb0.locked_matrix(),
                    &y_row,
                    T::one(),
                    ab1.matrix_mut()?.column_mut(0),
                );
            }
        }

        finish_column(a, x, y, k, j)?;
    }
    Ok(())
}

/// Blocked factorisation, pivoting when `p` is given.
fn blocked<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    mut p: Option<&mut DistMatrix<'_, usize, C>>,
    block_size: usize,
) -> Result<()> {
    let n = a.height();
    let (mut x, mut y) = panel_operands(a, block_size.min(n))?;
    let mut k = 0;
    while k < n {
        let nb = block_size.min(n - k);
        log::debug!("Factoring columns {k}..{}", k + nb);
        panel(a, p.as_mut().map(|p| &mut **p), &mut x, &mut y, nb, k)?;

        let x21 = x.view(k + nb..n, 0..nb)?;
        let y21 = y.view(k + nb..n, 0..nb)?;
        let mut a22 = a.view_mut(k + nb..n, k + nb..n)?;
        local_trrk_lower(-T::one(), &x21, &y21, &mut a22)?;
        k += nb;
    }
    Ok(())
}

/// Right-looking factorisation one column at a time.
fn unblocked<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    p: &mut DistMatrix<'_, usize, C>,
) -> Result<()> {
    let n = a.height();
    let (mut x, mut y) = panel_operands(a, 1)?;
    for k in 0..n {
        let pivot = {
            let abr = a.view(k..n, k..n)?;
            pivot::full(&abr)?
        };
        let from = k + pivot.from[0];
        if from != k {
            hermitian_swap_lower(a, k, from)?;
            row_swap(p, k, from)?;
        }
        finish_column(a, &mut x, &mut y, k, 0)?;

        let x21 = x.view(k + 1..n, 0..1)?;
        let y21 = y.view(k + 1..n, 0..1)?;
        let mut a22 = a.view_mut(k + 1..n, k + 1..n)?;
        local_trrk_lower(-T::one(), &x21, &y21, &mut a22)?;
    }
    Ok(())
}

/// Blocked Cholesky factorisation without pivoting: `A = L L^H`.
///
/// Fails with [`Error::NotPositiveDefinite`] at the first non-positive pivot.
pub fn lvar3<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    options: &CholeskyOptions,
) -> Result<()> {
    check_square(a)?;
    check_block_size(options)?;
    with_elemental_proxy(a, |a| blocked(a, None, options.block_size))
}

/// Blocked Cholesky factorisation with full symmetric pivoting: `P A P^T = L L^H`.
///
/// On exit the lower triangle of `a` holds `L` and `p` holds the permutation as a vector:
/// row `i` of `P A P^T` is row `p[i]` of `A`. `p` may have any distribution; an owning
/// `p` is resized to `n x 1`. Collective over the grid.
pub fn lvar3_pivoted<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    p: &mut DistMatrix<'_, usize, C>,
    options: &CholeskyOptions,
) -> Result<()> {
    check_square(a)?;
    check_block_size(options)?;
    p.assert_same_grid(a.grid().id())?;
    let mut perm = identity_permutation(a.grid(), a.height());
    with_elemental_proxy(a, |a| blocked(a, Some(&mut perm), options.block_size))?;
    redist::copy(&perm, p)
}

/// Unblocked Cholesky factorisation with full symmetric pivoting.
///
/// Same contract as [`lvar3_pivoted`].
pub fn l_unblocked_pivoted<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    p: &mut DistMatrix<'_, usize, C>,
) -> Result<()> {
    check_square(a)?;
    p.assert_same_grid(a.grid().id())?;
    let mut perm = identity_permutation(a.grid(), a.height());
    with_elemental_proxy(a, |a| unblocked(a, &mut perm))?;
    redist::copy(&perm, p)
}

/// Factor the `nb` columns of `a` starting at `off` with full symmetric pivoting.
///
/// `a` is `[MC, MR]`. `x` (`[MC, *]`, aligned with the rows of `a`) and `y` (`[MR, *]`,
/// aligned with the columns of `a`) must be `n x nb` or wider; on exit their first `nb`
/// columns hold the update `A22 -= X21 Y21^T` still to be applied to the trailing
/// matrix. `p` is permuted along with `a`. Collective over the grid.
pub fn l_panel_pivoted<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    p: &mut DistMatrix<'_, usize, C>,
    x: &mut DistMatrix<'_, T, C>,
    y: &mut DistMatrix<'_, T, C>,
    nb: usize,
    off: usize,
) -> Result<()> {
    check_square(a)?;
    if a.distribution() != Distribution::MC_MR || !a.is_elemental() {
        return Err(Error::IncompatibleDistribution(format!(
            "panel factorisation needs an elemental [MC, MR] matrix, got {}",
            a.distribution()
        ))
        .report());
    }
    panel(a, Some(p), x, y, nb, off)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::ThreadUniverse;
    use approx::assert_relative_eq;

    fn from_rows<'a, C: Comm>(
        grid: &'a Grid<C>,
        dist: Distribution,
        rows: &[&[f64]],
    ) -> DistMatrix<'a, f64, C> {
        let n = rows.len();
        let mut a = DistMatrix::with_size(grid, dist, n, n);
        for (i, row) in rows.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                a.set(i, j, value).unwrap();
            }
        }
        a
    }

    /// Collect the lower triangle of `a` on every process.
    fn lower<C: Comm>(a: &DistMatrix<'_, f64, C>) -> Vec<Vec<f64>> {
        (0..a.height())
            .map(|i| (0..=i).map(|j| a.get(i, j).unwrap()).collect())
            .collect()
    }

    const SPD: [&[f64]; 3] = [
        &[4.0, 12.0, -16.0],
        &[12.0, 37.0, -43.0],
        &[-16.0, -43.0, 98.0],
    ];

    #[test]
    fn test_lvar3_unpivoted() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = from_rows(&grid, Distribution::MC_MR, &SPD);
            let mut options = CholeskyOptions::default();
            options.set_block_size(2);
            lvar3(&mut a, &options).unwrap();
            lower(&a)
        });
        let expected = [vec![2.0], vec![6.0, 1.0], vec![-8.0, 5.0, 3.0]];
        for l in results {
            for (row, expected_row) in l.iter().zip(&expected) {
                for (value, expected) in row.iter().zip(expected_row) {
                    assert_relative_eq!(value, expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_unblocked_matches_blocked() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let rows: Vec<Vec<f64>> = (0..6)
                .map(|i| {
                    (0..6)
                        .map(|j| if i == j { 10.0 + i as f64 } else { 1.0 / (1 + i + j) as f64 })
                        .collect()
                })
                .collect();
            let rows = rows.iter().map(|r| r.as_slice()).collect::<Vec<_>>();

            let mut a = from_rows(&grid, Distribution::MC_MR, &rows);
            let mut p = DistMatrix::new(&grid, Distribution::STAR_STAR);
            l_unblocked_pivoted(&mut a, &mut p).unwrap();

            let mut b = from_rows(&grid, Distribution::MC_MR, &rows);
            let mut q = DistMatrix::new(&grid, Distribution::STAR_STAR);
            let mut options = CholeskyOptions::default();
            options.set_block_size(4);
            lvar3_pivoted(&mut b, &mut q, &options).unwrap();

            let p = (0..6).map(|i| p.get(i, 0).unwrap()).collect::<Vec<_>>();
            let q = (0..6).map(|i| q.get(i, 0).unwrap()).collect::<Vec<_>>();
            (lower(&a), lower(&b), p, q)
        });
        for (la, lb, p, q) in results {
            // The largest diagonal entry is the last one.
            assert_eq!(p[0], 5);
            assert_eq!(p, q);
            for (ra, rb) in la.iter().zip(&lb) {
                for (va, vb) in ra.iter().zip(rb) {
                    assert_relative_eq!(va, vb, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_not_positive_definite() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = from_rows(
                &grid,
                Distribution::MC_MR,
                &[&[1.0, 2.0], &[2.0, 1.0]],
            );
            lvar3(&mut a, &CholeskyOptions::default())
        });
        for result in results {
            match result {
                Err(Error::NotPositiveDefinite { index, value }) => {
                    assert_eq!(index, 1);
                    assert_relative_eq!(value, -3.0, epsilon = 1e-12);
                }
                other => panic!("unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let results = ThreadUniverse::run(1, |comm| {
            let grid = Grid::new(comm, 1).unwrap();
            let mut a = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, 2, 3);
            let mut p = DistMatrix::new(&grid, Distribution::VC_STAR);
            let mut options = CholeskyOptions::default();
            let not_square = lvar3_pivoted(&mut a, &mut p, &options);
            let mut b = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, 2, 2);
            options.set_block_size(0);
            (not_square, lvar3(&mut b, &options))
        });
        let (not_square, zero_block) = &results[0];
        assert!(matches!(
            not_square,
            Err(Error::NotSquare {
                height: 2,
                width: 3
            })
        ));
        assert!(matches!(zero_block, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_factor_through_proxy() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = from_rows(&grid, Distribution::VC_STAR, &SPD);
            lvar3(&mut a, &CholeskyOptions::default()).unwrap();
            (a.distribution(), lower(&a))
        });
        for (dist, l) in results {
            assert_eq!(dist, Distribution::VC_STAR);
            assert_relative_eq!(l[2][0], -8.0, epsilon = 1e-12);
            assert_relative_eq!(l[2][2], 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_panel_leaves_update_in_x_and_y() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = from_rows(&grid, Distribution::MC_MR, &SPD);
            let mut p = identity_permutation(&grid, 3);
            let (mut x, mut y) = panel_operands(&a, 1).unwrap();
            l_panel_pivoted(&mut a, &mut p, &mut x, &mut y, 1, 0).unwrap();
            // The first pivot is the entry 98 at index 2.
            let perm = (0..3).map(|i| p.get(i, 0).unwrap()).collect::<Vec<_>>();
            let l00 = a.get(0, 0).unwrap();
            let x10 = x.get(1, 0).unwrap();
            let a10 = a.get(1, 0).unwrap();
            (perm, l00, x10, a10)
        });
        for (perm, l00, x10, a10) in results {
            assert_eq!(perm, vec![2, 1, 0]);
            assert_relative_eq!(l00, 98f64.sqrt(), epsilon = 1e-12);
            assert_relative_eq!(a10, -43.0 / 98f64.sqrt(), epsilon = 1e-12);
            assert_relative_eq!(x10, a10, epsilon = 1e-12);
        }
    }
}
