//! Cholesky factorisation of a matrix held by a single process
use super::CholeskyOptions;
use crate::blas_like::{local_gemv, local_hermitian_swap_lower, trrk_lower};
use crate::error::{Error, Result};
use crate::local_matrix::LocalMatrix;
use crate::types::{Base, Scalar};
use cauchy::Scalar as _;
use num::{One, ToPrimitive, Zero};

fn check(a: &LocalMatrix<'_, impl Scalar>, p: Option<&[usize]>) -> Result<()> {
    if a.height() != a.width() {
        return Err(Error::NotSquare {
            height: a.height(),
            width: a.width(),
        }
        .report());
    }
    if let Some(p) = p {
        if p.len() != a.height() {
            return Err(Error::SizeMismatch {
                expected: (a.height(), 1),
                found: (p.len(), 1),
            }
            .report());
        }
    }
    if a.is_locked() {
        return Err(Error::Locked.report());
    }
    Ok(())
}

/// Index of the largest `|Re(a(i, i) - x(i, :) . y(i, :))|` for `i >= k`; ties go to the
/// smallest index.
fn pivot<T: Scalar>(
    a: &LocalMatrix<'_, T>,
    x: &LocalMatrix<'_, T>,
    y: &LocalMatrix<'_, T>,
    k: usize,
    j: usize,
) -> usize {
    let mut best = (k, <Base<T> as Zero>::zero());
    for i in k..a.height() {
        let update = (0..j)
            .map(|l| x.get(i, l) * y.get(i, l))
            .fold(T::zero(), |acc, v| acc + v);
        let value = (a.get(i, i) - update).re().abs();
        if i == k || value > best.1 {
            best = (i, value);
        }
    }
    best.0
}

/// Square root of the pivot and scaling of the column below it.
fn finish_column<T: Scalar>(a: &mut LocalMatrix<'_, T>, k: usize) -> Result<()> {
    a.make_real(k, k);
    let delta_sq = a.get_real_part(k, k);
    if !(delta_sq > <Base<T> as Zero>::zero()) {
        return Err(Error::NotPositiveDefinite {
            index: k,
            value: delta_sq.to_f64().unwrap_or(f64::NAN),
        }
        .report());
    }
    let delta = num::Float::sqrt(delta_sq);
    a.set_real_part(k, k, delta);
    let scale = T::from_real(<Base<T> as One>::one() / delta);
    for value in &mut a.column_mut(k)[k + 1..] {
        *value *= scale;
    }
    Ok(())
}

fn panel<T: Scalar>(
    a: &mut LocalMatrix<'_, T>,
    mut p: Option<&mut [usize]>,
    x: &mut LocalMatrix<'_, T>,
    y: &mut LocalMatrix<'_, T>,
    nb: usize,
    off: usize,
) -> Result<()> {
    let n = a.height();
    x.fill(T::zero());
    y.fill(T::zero());
    for j in 0..nb {
        let k = off + j;
        if let Some(p) = p.as_deref_mut() {
            let from = pivot(a, x, y, k, j);
            if from != k {
                local_hermitian_swap_lower(a, k, from);
                p.swap(k, from);
                x.swap_rows(k, from);
                y.swap_rows(k, from);
            }
        }
        if j > 0 {
            let y_row = (0..j).map(|l| y.get(k, l)).collect::<Vec<_>>();
            let xb0 = x.view(k..n, 0..j);
            let mut ab1 = a.view_mut(k..n, k..k + 1);
            local_gemv(-T::one(), &xb0, &y_row, T::one(), ab1.column_mut(0));
        }
        finish_column(a, k)?;
        for i in k + 1..n {
            let value = a.get(i, k);
            x.set(i, j, value);
            y.set(i, j, value.conj());
        }
    }
    Ok(())
}

fn blocked<T: Scalar>(
    a: &mut LocalMatrix<'_, T>,
    mut p: Option<&mut [usize]>,
    options: &CholeskyOptions,
) -> Result<()> {
    let n = a.height();
    let bs = options.block_size();
    if bs == 0 {
        return Err(Error::InvalidArgument("block size must be positive".to_string()).report());
    }
    let mut x = LocalMatrix::zeros(n, bs.min(n));
    let mut y = LocalMatrix::zeros(n, bs.min(n));
    let mut k = 0;
    while k < n {
        let nb = bs.min(n - k);
        panel(a, p.as_deref_mut(), &mut x, &mut y, nb, k)?;
        let x21 = x.view(k + nb..n, 0..nb);
        let y21 = y.view(k + nb..n, 0..nb);
        let mut a22 = a.view_mut(k + nb..n, k + nb..n);
        trrk_lower(-T::one(), &x21, &y21, &mut a22);
        k += nb;
    }
    Ok(())
}

fn identity(p: &mut [usize]) {
    for (i, value) in p.iter_mut().enumerate() {
        *value = i;
    }
}

/// Blocked Cholesky factorisation `A = L L^H` of a local matrix.
pub fn lvar3<T: Scalar>(a: &mut LocalMatrix<'_, T>, options: &CholeskyOptions) -> Result<()> {
    check(a, None)?;
    blocked(a, None, options)
}

/// Blocked Cholesky factorisation with full symmetric pivoting, `P A P^T = L L^H`.
///
/// `p` must have length `n`; on exit row `i` of `P A P^T` is row `p[i]` of `A`.
pub fn lvar3_pivoted<T: Scalar>(
    a: &mut LocalMatrix<'_, T>,
    p: &mut [usize],
    options: &CholeskyOptions,
) -> Result<()> {
    check(a, Some(&*p))?;
    identity(p);
    blocked(a, Some(p), options)
}

/// Unblocked right-looking Cholesky factorisation with full symmetric pivoting.
pub fn l_unblocked_pivoted<T: Scalar>(a: &mut LocalMatrix<'_, T>, p: &mut [usize]) -> Result<()> {
    check(a, Some(&*p))?;
    identity(p);
    let n = a.height();
    let empty: LocalMatrix<'_, T> = LocalMatrix::zeros(n, 0);
    for k in 0..n {
        let from = pivot(a, &empty, &empty, k, 0);
        if from != k {
            local_hermitian_swap_lower(a, k, from);
            p.swap(k, from);
        }
        finish_column(a, k)?;
        let a21 = a.view(k + 1..n, k..k + 1).to_owned();
        let mut y21 = a21.to_owned();
        for value in y21.column_mut(0) {
            *value = value.conj();
        }
        let mut a22 = a.view_mut(k + 1..n, k + 1..n);
        trrk_lower(-T::one(), &a21, &y21, &mut a22);
    }
    Ok(())
}

/// Factor the `nb` columns of `a` starting at `off` with full symmetric pivoting.
///
/// `x` and `y` must be `n x nb`; on exit they hold the update `A22 -= X21 Y21^T` still
/// to be applied to the trailing matrix.
pub fn l_panel_pivoted<T: Scalar>(
    a: &mut LocalMatrix<'_, T>,
    p: &mut [usize],
    x: &mut LocalMatrix<'_, T>,
    y: &mut LocalMatrix<'_, T>,
    nb: usize,
    off: usize,
) -> Result<()> {
    check(a, Some(&*p))?;
    let n = a.height();
    if off + nb > n || (x.height(), x.width()) != (n, nb) || (y.height(), y.width()) != (n, nb) {
        return Err(Error::SizeMismatch {
            expected: (n, nb),
            found: (x.height(), x.width()),
        }
        .report());
    }
    panel(a, Some(p), x, y, nb, off)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use num::complex::Complex;

    fn spd() -> LocalMatrix<'static, f64> {
        LocalMatrix::from_column_major(
            3,
            3,
            vec![4.0, 12.0, -16.0, 12.0, 37.0, -43.0, -16.0, -43.0, 98.0],
        )
    }

    /// `L L^H` from the lower triangle of `l`.
    fn reconstruct<T: Scalar>(l: &LocalMatrix<'_, T>) -> Vec<Vec<T>> {
        let n = l.height();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        (0..=i.min(j))
                            .map(|k| l.get(i, k) * l.get(j, k).conj())
                            .fold(T::zero(), |acc, v| acc + v)
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_unpivoted() {
        let mut a = spd();
        lvar3(&mut a, &CholeskyOptions::default()).unwrap();
        for (i, j, expected) in [(0, 0, 2.0), (1, 0, 6.0), (1, 1, 1.0), (2, 0, -8.0), (2, 1, 5.0), (2, 2, 3.0)] {
            assert_relative_eq!(a.get(i, j), expected, epsilon = 1e-12);
        }
        // The upper triangle is untouched.
        assert_eq!(a.get(0, 2), -16.0);
    }

    #[test]
    fn test_pivoted_variants_agree() {
        let original = spd();
        let mut a = spd();
        let mut p = vec![0; 3];
        l_unblocked_pivoted(&mut a, &mut p).unwrap();
        assert_eq!(p, vec![2, 1, 0]);
        assert_relative_eq!(a.get(0, 0), 98f64.sqrt(), epsilon = 1e-12);

        let mut b = spd();
        let mut q = vec![0; 3];
        let mut options = CholeskyOptions::default();
        options.set_block_size(2);
        lvar3_pivoted(&mut b, &mut q, &options).unwrap();
        assert_eq!(p, q);

        let llh = reconstruct(&b);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a.get(i.max(j), i.min(j)), b.get(i.max(j), i.min(j)), epsilon = 1e-12);
                assert_relative_eq!(llh[i][j], original.get(q[i], q[j]), epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_complex_pivoted() {
        let n = 4;
        let entry = |i: usize, j: usize| {
            if i == j {
                Complex::new(5.0 + i as f64, 0.0)
            } else {
                let (re, im) = (1.0 / (1 + i + j) as f64, 0.5 * (i as f64 - j as f64));
                Complex::new(re, im / 4.0)
            }
        };
        let data = (0..n)
            .flat_map(|j| (0..n).map(move |i| (i, j)))
            .map(|(i, j)| entry(i, j))
            .collect();
        let mut a = LocalMatrix::from_column_major(n, n, data);
        let mut p = vec![0; n];
        lvar3_pivoted(&mut a, &mut p, &CholeskyOptions::default()).unwrap();
        assert_eq!(p[0], 3);
        let llh = reconstruct(&a);
        for i in 0..n {
            for j in 0..n {
                let expected = entry(p[i], p[j]);
                assert_relative_eq!(llh[i][j].re, expected.re, epsilon = 1e-10);
                assert_relative_eq!(llh[i][j].im, expected.im, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_panel_and_errors() {
        let mut a = spd();
        let mut p = vec![0, 1, 2];
        let mut x = LocalMatrix::zeros(3, 2);
        let mut y = LocalMatrix::zeros(3, 2);
        l_panel_pivoted(&mut a, &mut p, &mut x, &mut y, 2, 0).unwrap();
        assert_eq!(p[0], 2);
        assert_relative_eq!(x.get(2, 0), a.get(2, 0), epsilon = 1e-12);
        assert_relative_eq!(y.get(2, 1), a.get(2, 1), epsilon = 1e-12);

        let mut bad = LocalMatrix::from_column_major(2, 2, vec![1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(
            lvar3(&mut bad, &CholeskyOptions::default()),
            Err(Error::NotPositiveDefinite { index: 1, .. })
        ));
        let mut short = vec![0; 2];
        assert!(matches!(
            lvar3_pivoted(&mut spd(), &mut short, &CholeskyOptions::default()),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
