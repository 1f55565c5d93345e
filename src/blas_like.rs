//! Local kernels and distributed swaps used by the factorisations
use crate::comm::Comm;
use crate::dist_matrix::DistMatrix;
use crate::error::{Error, Result};
use crate::grid::CommKind;
use crate::local_matrix::LocalMatrix;
use crate::types::{Base, Element, Scalar, ValueIndex};
use cauchy::Scalar as _;
use rayon::prelude::*;

/// `y = alpha * a * x + beta * y` on local data.
pub fn local_gemv<T: Scalar>(alpha: T, a: &LocalMatrix<'_, T>, x: &[T], beta: T, y: &mut [T]) {
    assert_eq!(a.width(), x.len(), "Length of x does not match the matrix");
    assert_eq!(a.height(), y.len(), "Length of y does not match the matrix");
    for value in y.iter_mut() {
        *value *= beta;
    }
    for (column, &xj) in (0..a.width()).map(|j| a.column(j)).zip(x) {
        let factor = alpha * xj;
        for (value, &aij) in y.iter_mut().zip(column) {
            *value += factor * aij;
        }
    }
}

/// Lower triangular rank-k update `C += alpha * X * Y^T` on the local data.
///
/// `x` is `[MC, *]` aligned with the rows of `c` and `y` is `[MR, *]` aligned with its
/// columns, so every process owns the rows of `x` and `y` it needs. Only entries on or
/// below the global diagonal of `c` are touched.
pub fn local_trrk_lower<T: Scalar, C: Comm>(
    alpha: T,
    x: &DistMatrix<'_, T, C>,
    y: &DistMatrix<'_, T, C>,
    c: &mut DistMatrix<'_, T, C>,
) -> Result<()> {
    if x.width() != y.width() || x.height() != c.height() || y.height() != c.width() {
        return Err(Error::SizeMismatch {
            expected: (c.height(), c.width()),
            found: (x.height(), y.height()),
        }
        .report());
    }
    if x.col_align() != c.col_align() || y.col_align() != c.row_align() {
        return Err(Error::IncompatibleDistribution(
            "rank-k update operands are not aligned with the target".to_string(),
        )
        .report());
    }
    let rows = (0..c.local_height())
        .map(|i_loc| c.global_row(i_loc))
        .collect::<Vec<_>>();
    let cols = (0..c.local_width())
        .map(|j_loc| c.global_col(j_loc))
        .collect::<Vec<_>>();
    trrk_lower_kernel(
        alpha,
        x.locked_matrix(),
        y.locked_matrix(),
        c.matrix_mut()?,
        &rows,
        &cols,
    );
    Ok(())
}

/// Lower triangular rank-k update `C += alpha * X * Y^T` of a local matrix.
pub fn trrk_lower<T: Scalar>(
    alpha: T,
    x: &LocalMatrix<'_, T>,
    y: &LocalMatrix<'_, T>,
    c: &mut LocalMatrix<'_, T>,
) {
    assert!(
        x.width() == y.width() && x.height() == c.height() && y.height() == c.width(),
        "Operands of a rank-k update do not match"
    );
    let rows = (0..c.height()).collect::<Vec<_>>();
    let cols = (0..c.width()).collect::<Vec<_>>();
    trrk_lower_kernel(alpha, x, y, c, &rows, &cols);
}

/// `c(r, s) += alpha * x(r, :) . y(s, :)` wherever `rows[r] >= cols[s]`; `rows` is
/// increasing.
fn trrk_lower_kernel<T: Scalar>(
    alpha: T,
    x: &LocalMatrix<'_, T>,
    y: &LocalMatrix<'_, T>,
    c: &mut LocalMatrix<'_, T>,
    rows: &[usize],
    cols: &[usize],
) {
    let rank = x.width();
    let columns = c.columns_mut().collect::<Vec<_>>();
    columns
        .into_par_iter()
        .zip(cols.par_iter())
        .enumerate()
        .for_each(|(j_loc, (column, &j))| {
            let first = rows.partition_point(|&i| i < j);
            for l in 0..rank {
                let factor = alpha * y.get(j_loc, l);
                let x_column = x.column(l);
                for i_loc in first..column.len() {
                    column[i_loc] += factor * x_column[i_loc];
                }
            }
        });
}

/// A target entry, the entry its new value comes from, and whether to conjugate it.
type Move = ((usize, usize), (usize, usize), bool);

/// Entry moves of a symmetric swap of `first < second` in the lower triangle.
fn hermitian_swap_moves(n: usize, first: usize, second: usize) -> Vec<Move> {
    let mut moves = Vec::with_capacity(2 * n + 1);
    // Below both
    for i in second + 1..n {
        moves.push(((i, first), (i, second), false));
        moves.push(((i, second), (i, first), false));
    }
    // Between the two: a column segment trades places with a row segment
    for m in first + 1..second {
        moves.push(((m, first), (second, m), true));
        moves.push(((second, m), (m, first), true));
    }
    moves.push(((second, first), (second, first), true));
    moves.push(((first, first), (second, second), false));
    moves.push(((second, second), (first, first), false));
    // Left of both
    for j in 0..first {
        moves.push(((first, j), (second, j), false));
        moves.push(((second, j), (first, j), false));
    }
    moves
}

/// Symmetric swap of rows and columns `origin` and `dest` in the lower triangle of a
/// local Hermitian matrix.
pub fn local_hermitian_swap_lower<T: Scalar>(a: &mut LocalMatrix<'_, T>, origin: usize, dest: usize) {
    let (first, second) = (origin.min(dest), origin.max(dest));
    if first == second {
        return;
    }
    let moves = hermitian_swap_moves(a.height(), first, second);
    let values = moves
        .iter()
        .map(|&(_, from, conj)| {
            let value = a.get(from.0, from.1);
            if conj {
                value.conj()
            } else {
                value
            }
        })
        .collect::<Vec<_>>();
    for (&(to, _, _), value) in moves.iter().zip(values) {
        a.set(to.0, to.1, value);
    }
}

fn apply_moves<T: Element, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    moves: &[Move],
    conjugate: impl Fn(T) -> T,
) -> Result<()> {
    a.assert_not_locked()?;
    let local = moves
        .iter()
        .filter(|(to, _, _)| a.is_local(to.0, to.1))
        .collect::<Vec<_>>();
    a.reserve_pulls(local.len());
    for (_, from, _) in &local {
        a.queue_pull(from.0, from.1)?;
    }
    let values = a.process_pull_queue()?;
    for ((to, _, conj), value) in local.into_iter().zip(values) {
        let value = if *conj { conjugate(value) } else { value };
        a.set(to.0, to.1, value)?;
    }
    Ok(())
}

/// Swap rows `first` and `second` of a distributed matrix. Collective over the grid.
pub fn row_swap<T: Element, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    first: usize,
    second: usize,
) -> Result<()> {
    if first.max(second) >= a.height() {
        return Err(Error::OutOfRange {
            i: first.max(second),
            j: 0,
            height: a.height(),
            width: a.width(),
        }
        .report());
    }
    if first == second {
        return Ok(());
    }
    let moves = (0..a.width())
        .flat_map(|j| [((first, j), (second, j), false), ((second, j), (first, j), false)])
        .collect::<Vec<_>>();
    apply_moves(a, &moves, |value| value)
}

/// Symmetric permutation of rows and columns `origin` and `dest` of a Hermitian matrix
/// of which only the lower triangle is referenced. Collective over the grid.
pub fn hermitian_swap_lower<T: Scalar, C: Comm>(
    a: &mut DistMatrix<'_, T, C>,
    origin: usize,
    dest: usize,
) -> Result<()> {
    let n = a.height();
    if n != a.width() {
        return Err(Error::NotSquare {
            height: n,
            width: a.width(),
        }
        .report());
    }
    let (first, second) = (origin.min(dest), origin.max(dest));
    if second >= n {
        return Err(Error::OutOfRange {
            i: second,
            j: second,
            height: n,
            width: n,
        }
        .report());
    }
    if first == second {
        return Ok(());
    }

    let moves = hermitian_swap_moves(n, first, second);
    apply_moves(a, &moves, |value| value.conj())
}

/// Entry of a column vector with the largest absolute value.
///
/// Ties go to the smallest index. Collective over the grid.
pub fn vector_max_abs<T: Scalar, C: Comm>(x: &DistMatrix<'_, T, C>) -> Result<ValueIndex<Base<T>>> {
    if x.width() != 1 {
        return Err(Error::InvalidArgument(format!(
            "expected a column vector, got width {}",
            x.width()
        ))
        .report());
    }
    let grid = x.grid();
    if !grid.participating() {
        return Err(Error::NotParticipating.report());
    }

    let mut best: Option<ValueIndex<Base<T>>> = None;
    if x.participating() {
        for i_loc in 0..x.local_height() {
            let candidate = ValueIndex {
                value: x.get_local(i_loc, 0).abs(),
                index: x.global_row(i_loc),
            };
            best = Some(better(best, candidate));
        }
    }
    let (values, indices) = match best {
        Some(b) => (vec![T::from_real(b.value)], vec![b.index]),
        None => (vec![], vec![]),
    };
    let comm = grid.comm(CommKind::Vc);
    let values = comm.all_gather_v(&values);
    let indices = comm.all_gather_v(&indices);

    let best = values
        .iter()
        .flatten()
        .zip(indices.iter().flatten())
        .fold(None, |best, (value, &index)| {
            Some(better(
                best,
                ValueIndex {
                    value: value.re(),
                    index,
                },
            ))
        });
    Ok(best.unwrap_or(ValueIndex {
        value: <Base<T> as num::Zero>::zero(),
        index: 0,
    }))
}

fn better<R: PartialOrd + Copy>(best: Option<ValueIndex<R>>, candidate: ValueIndex<R>) -> ValueIndex<R> {
    match best {
        Some(b) if b.value > candidate.value => b,
        Some(b) if b.value == candidate.value && b.index < candidate.index => b,
        _ => candidate,
    }
}
