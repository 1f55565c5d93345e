use approx::assert_relative_eq;
use cauchy::{c32, c64};
use distmat::cholesky::{l_unblocked_pivoted, lvar3_pivoted, CholeskyOptions};
use distmat::matrices::fill_with;
use distmat::redist::redistribute;
use distmat::types::Base;
use distmat::{DistMatrix, Distribution, Grid, LocalMatrix, Scalar, ThreadUniverse};
use num::ToPrimitive;
use paste::paste;

const N: usize = 7;

/// A Hermitian, strictly diagonally dominant `n x n` test matrix.
fn entry<T: Scalar>(n: usize, i: usize, j: usize) -> T {
    if i == j {
        T::from_real(T::real(2 * n + i))
    } else {
        let re = 1.0 / (1 + i + j) as f64;
        let im = 0.1 * (i as f64 - j as f64);
        T::from_parts(T::real(re), T::real(im))
    }
}

fn distance<T: Scalar>(a: T, b: T) -> f64 {
    let d: Base<T> = (a - b).abs();
    d.to_f64().unwrap_or(f64::INFINITY)
}

/// Factor on a 2 x 2 grid and return `L` and `p` as seen by every process.
fn factor<T: Scalar>(
    n: usize,
    dist: Distribution,
    block_size: Option<usize>,
) -> Vec<(Vec<T>, Vec<usize>)> {
    ThreadUniverse::run(4, |comm| {
        let grid = Grid::new(comm, 2).unwrap();
        let mut a = DistMatrix::<T, _>::with_size(&grid, dist, n, n);
        fill_with(&mut a, |i, j| entry::<T>(n, i, j)).unwrap();
        let mut p = DistMatrix::new(&grid, Distribution::STAR_STAR);
        match block_size {
            Some(block_size) => {
                let mut options = CholeskyOptions::default();
                options.set_block_size(block_size);
                lvar3_pivoted(&mut a, &mut p, &options).unwrap();
            }
            None => l_unblocked_pivoted(&mut a, &mut p).unwrap(),
        }
        let l = redistribute(&a, Distribution::STAR_STAR).unwrap();
        (
            l.locked_matrix().to_column_major(),
            p.locked_matrix().to_column_major(),
        )
    })
}

/// Check `L L^H = P A P^T` on every process.
fn check<T: Scalar>(n: usize, results: Vec<(Vec<T>, Vec<usize>)>, tol: f64) {
    let (first_l, first_p) = results[0].clone();
    assert_eq!(first_p[0], n - 1);
    for (l, p) in results {
        assert_eq!(p, first_p);
        assert_eq!(l, first_l);
        let l = LocalMatrix::from_column_major(n, n, l);
        for i in 0..n {
            for j in 0..n {
                let llh = (0..=i.min(j))
                    .map(|k| l.get(i, k) * l.get(j, k).conj())
                    .fold(T::zero(), |acc, v| acc + v);
                assert!(
                    distance(llh, entry::<T>(n, p[i], p[j])) < tol,
                    "entry ({i}, {j}) of L L^H is off"
                );
            }
        }
        for i in 0..n {
            assert_relative_eq!(l.get(i, i).im().to_f64().unwrap(), 0.0);
        }
    }
}

macro_rules! test_cholesky {
    ($(($scalar:ident, $tol:expr)),+) => {
        $(
            paste! {
                #[test]
                fn [<test_blocked_mc_mr_ $scalar>]() {
                    check(N, factor::<$scalar>(N, Distribution::MC_MR, Some(3)), $tol);
                }

                #[test]
                fn [<test_blocked_vc_star_ $scalar>]() {
                    check(N, factor::<$scalar>(N, Distribution::VC_STAR, Some(2)), $tol);
                }

                #[test]
                fn [<test_single_panel_star_star_ $scalar>]() {
                    check(N, factor::<$scalar>(N, Distribution::STAR_STAR, Some(128)), $tol);
                }

                #[test]
                fn [<test_unblocked_mr_mc_ $scalar>]() {
                    let dist = Distribution::new(distmat::Dist::Mr, distmat::Dist::Mc).unwrap();
                    check(N, factor::<$scalar>(N, dist, None), $tol);
                }

                #[test]
                fn [<test_small_extents_ $scalar>]() {
                    // Sizes below the grid dimensions and not multiples of the block size
                    for n in [1, 2, 3, 5] {
                        check(n, factor::<$scalar>(n, Distribution::MC_MR, Some(2)), $tol);
                    }
                }
            }
        )*
    };
}

test_cholesky!((f32, 1e-3), (f64, 1e-11), (c32, 1e-3), (c64, 1e-11));
