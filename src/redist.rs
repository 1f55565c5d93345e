//! Copying between distributions
//!
//! [`copy`] moves the entries of one distributed matrix into another one living on the
//! same grid. The cheapest [`Transform`] that is valid for the two descriptors is chosen
//! by [`plan`]; the general fallback is a single personalised exchange over the whole
//! grid, which works for every pair of distributions, alignments and block sizes.
use crate::comm::Comm;
use crate::dist::{Axis, Dist, DistData};
use crate::dist_matrix::DistMatrix;
use crate::distribution::{Distribution, OwnerMap};
use crate::error::{Error, Result};
use crate::grid::{CommKind, Grid};
use crate::types::Element;
use itertools::izip;

/// A way of moving data between two distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Identical descriptors: copy the local buffer.
    LocalCopy,
    /// Every target entry is already held locally by the source.
    Filter,
    /// Gather a distributed axis into a `*` axis over the axis communicator.
    AllGather(Axis),
    /// Gather a `VC`/`VR` axis into `MC`/`MR` over the complementary communicator.
    PartialAllGather(Axis),
    /// Shift the local blocks of one axis to a new alignment.
    Realign(Axis),
    /// Move a `[CIRC, CIRC]` matrix from one root to another.
    RootToRoot,
    /// Send every entry straight to its new holders.
    AllToAll,
}

fn distribution(data: &DistData) -> Distribution {
    Distribution {
        col: data.col_dist,
        row: data.row_dist,
    }
}

/// Do both descriptors lay out `axis` in the same way?
fn same_axis(source: &DistData, target: &DistData, axis: Axis) -> bool {
    let dist = source.dist(axis);
    if dist != target.dist(axis) {
        return false;
    }
    !dist.is_distributed()
        || (source.align(axis) == target.align(axis)
            && source.block(axis) == target.block(axis)
            && source.cut(axis) == target.cut(axis))
}

/// Does every process holding a target index of `axis` hold it in the source too?
fn axis_available<C: Comm>(grid: &Grid<C>, source: &DistData, target: &DistData, axis: Axis) -> bool {
    let (from, to) = (source.dist(axis), target.dist(axis));
    if from == Dist::Star || same_axis(source, target, axis) {
        return true;
    }
    let elemental = source.block(axis) == 1
        && target.block(axis) == 1
        && source.cut(axis) == 0
        && target.cut(axis) == 0;
    from.is_distributed()
        && to != from
        && to.partial() == from
        && elemental
        && target.align(axis) % grid.stride(from) == source.align(axis)
}

fn locally_available<C: Comm>(grid: &Grid<C>, source: &DistData, target: &DistData) -> bool {
    if distribution(source).restricted_by_cross() {
        return distribution(source) == distribution(target)
            && source.root == target.root
            && same_axis(source, target, Axis::Col)
            && same_axis(source, target, Axis::Row);
    }
    axis_available(grid, source, target, Axis::Col) && axis_available(grid, source, target, Axis::Row)
}

/// Choose how to move data from `source` to `target`.
pub fn plan<C: Comm>(grid: &Grid<C>, source: &DistData, target: &DistData) -> Transform {
    let (from, to) = (distribution(source), distribution(target));
    if from == to
        && source.root == target.root
        && same_axis(source, target, Axis::Col)
        && same_axis(source, target, Axis::Row)
    {
        return Transform::LocalCopy;
    }
    if locally_available(grid, source, target) {
        return Transform::Filter;
    }
    if from == Distribution::CIRC_CIRC && to == Distribution::CIRC_CIRC {
        return Transform::RootToRoot;
    }
    if from.restricted_by_cross() || to.restricted_by_cross() {
        return Transform::AllToAll;
    }
    for axis in [Axis::Col, Axis::Row] {
        if !same_axis(source, target, axis.other()) {
            continue;
        }
        let (s, t) = (source.dist(axis), target.dist(axis));
        let vector_tag = matches!(s, Dist::Vc | Dist::Vr);
        if t == Dist::Star && (vector_tag || matches!(s, Dist::Mc | Dist::Mr)) {
            return Transform::AllGather(axis);
        }
        let elemental = source.block(axis) == 1
            && target.block(axis) == 1
            && source.cut(axis) == 0
            && target.cut(axis) == 0;
        if vector_tag
            && t == s.partial()
            && elemental
            && target.align(axis) == source.align(axis) % grid.stride(t)
        {
            return Transform::PartialAllGather(axis);
        }
        if s == t
            && s != Dist::Md
            && s.is_distributed()
            && source.block(axis) == target.block(axis)
            && source.cut(axis) == target.cut(axis)
        {
            return Transform::Realign(axis);
        }
    }
    Transform::AllToAll
}

/// Copy `source` into `target`.
///
/// An owning target is realigned (where its alignments are free) and resized to match
/// the source; a view must already have the size of the source. Collective over the grid.
pub fn copy<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
) -> Result<()> {
    let grid = source.grid();
    target.assert_same_grid(grid.id())?;
    target.assert_not_locked()?;
    if !grid.participating() {
        return Err(Error::NotParticipating.report());
    }
    if target.viewing() {
        source.assert_same_size(target)?;
    } else {
        target.align_with(&source.dist_data(), false, true)?;
        target.resize(source.height(), source.width())?;
    }

    let transform = plan(grid, &source.dist_data(), &target.dist_data());
    log::trace!(
        "Copying {} x {} from {} to {} by {transform:?}",
        source.height(),
        source.width(),
        source.distribution(),
        target.distribution()
    );
    match transform {
        Transform::LocalCopy => local_copy(source, target),
        Transform::Filter => filter(source, target),
        Transform::AllGather(axis) => all_gather(source, target, axis),
        Transform::PartialAllGather(axis) => partial_all_gather(source, target, axis),
        Transform::Realign(axis) => realign(source, target, axis),
        Transform::RootToRoot => root_to_root(source, target),
        Transform::AllToAll => all_to_all(source, target),
    }
}

/// A new matrix with distribution `dist` holding a copy of `source`.
pub fn redistribute<'a, T: Element, C: Comm>(
    source: &DistMatrix<'a, T, C>,
    dist: Distribution,
) -> Result<DistMatrix<'a, T, C>> {
    let mut target = DistMatrix::new(source.grid(), dist);
    copy(source, &mut target)?;
    Ok(target)
}

fn local_copy<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
) -> Result<()> {
    let from = source.locked_matrix();
    let to = target.matrix_mut()?;
    for j in 0..to.width() {
        to.column_mut(j).copy_from_slice(from.column(j));
    }
    Ok(())
}

fn filter<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
) -> Result<()> {
    target.assert_not_locked()?;
    let rows = (0..target.local_height())
        .map(|i_loc| source.local_row_offset(target.global_row(i_loc)))
        .collect::<Vec<_>>();
    for j_loc in 0..target.local_width() {
        let j_source = source.local_col_offset(target.global_col(j_loc));
        for (i_loc, &i_source) in rows.iter().enumerate() {
            target.set_local(i_loc, j_loc, source.get_local(i_source, j_source));
        }
    }
    Ok(())
}

fn all_gather<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
    axis: Axis,
) -> Result<()> {
    let comm = source.grid().comm(CommKind::of(source.dist(axis)));
    let gathered = comm.all_gather_v(&source.locked_matrix().to_column_major());
    let (local_height, local_width) = (target.local_height(), target.local_width());
    let to = target.matrix_mut()?;
    match axis {
        Axis::Row => {
            let layout = source.row_layout();
            for (rank, data) in gathered.iter().enumerate() {
                for (j_loc, column) in data.chunks_exact(local_height.max(1)).enumerate() {
                    to.column_mut(layout.global_index(j_loc, rank))
                        .copy_from_slice(&column[..local_height]);
                }
            }
        }
        Axis::Col => {
            let layout = source.col_layout();
            if local_width == 0 {
                return Ok(());
            }
            for (rank, data) in gathered.iter().enumerate() {
                let rows = data.len() / local_width;
                for j in 0..local_width {
                    for i_loc in 0..rows {
                        to.set(layout.global_index(i_loc, rank), j, data[i_loc + j * rows]);
                    }
                }
            }
        }
    }
    Ok(())
}

fn partial_all_gather<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
    axis: Axis,
) -> Result<()> {
    let grid = source.grid();
    let tag = source.dist(axis);
    let comm = grid.comm(CommKind::of(tag.partial_union()));
    let gathered = comm.all_gather_v(&source.locked_matrix().to_column_major());
    let coords = grid.local_coords();
    let sender = |rank: usize| match tag {
        Dist::Vc => grid.vc_of_mc_mr(coords.mc, rank),
        _ => rank * grid.width() + coords.mr,
    };

    match axis {
        Axis::Col => {
            let layout = source.col_layout();
            let width = target.local_width();
            if width == 0 {
                return Ok(());
            }
            for (rank, data) in gathered.iter().enumerate() {
                let rows = data.len() / width;
                for i_loc in 0..rows {
                    let i = target.local_row_offset(layout.global_index(i_loc, sender(rank)));
                    for j in 0..width {
                        target.set_local(i, j, data[i_loc + j * rows]);
                    }
                }
            }
        }
        Axis::Row => {
            let layout = source.row_layout();
            let height = target.local_height();
            for (rank, data) in gathered.iter().enumerate() {
                for (j_loc, column) in data.chunks_exact(height.max(1)).enumerate() {
                    let j = target.local_col_offset(layout.global_index(j_loc, sender(rank)));
                    for (i, &value) in column[..height].iter().enumerate() {
                        target.set_local(i, j, value);
                    }
                }
            }
        }
    }
    Ok(())
}

fn realign<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
    axis: Axis,
) -> Result<()> {
    let comm = source.grid().comm(CommKind::of(source.dist(axis)));
    let stride = comm.size();
    let (from, to) = (source.dist_data().align(axis), target.dist_data().align(axis));
    let rank = comm.rank();
    let dest = (rank + to + stride - from) % stride;
    let origin = (rank + from + stride - to) % stride;
    let received = comm.send_recv(&source.locked_matrix().to_column_major(), dest, origin);

    let height = target.local_height();
    let matrix = target.matrix_mut()?;
    if height > 0 {
        for (j, column) in received.chunks_exact(height).enumerate() {
            matrix.column_mut(j).copy_from_slice(column);
        }
    }
    Ok(())
}

fn root_to_root<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
) -> Result<()> {
    let comm = source.grid().comm(CommKind::Vc);
    let data = if source.participating() {
        source.locked_matrix().to_column_major()
    } else {
        Vec::new()
    };
    let received = comm.send_recv(&data, target.root(), source.root());
    if target.participating() {
        let height = target.local_height();
        let matrix = target.matrix_mut()?;
        if height > 0 {
            for (j, column) in received.chunks_exact(height).enumerate() {
                matrix.column_mut(j).copy_from_slice(column);
            }
        }
    }
    Ok(())
}

fn all_to_all<T: Element, C: Comm>(
    source: &DistMatrix<'_, T, C>,
    target: &mut DistMatrix<'_, T, C>,
) -> Result<()> {
    let grid = source.grid();
    let comm = grid.comm(CommKind::Vc);
    let map = OwnerMap::new(grid, target.distribution(), target.root());
    let mut indices = vec![Vec::new(); comm.size()];
    let mut values = vec![Vec::new(); comm.size()];

    // One copy of the source is enough; its first redundant holder sends.
    if source.participating() && source.redundant_rank() == 0 {
        for j_loc in 0..source.local_width() {
            let j = source.global_col(j_loc);
            let col_owner = target.col_owner(j);
            for i_loc in 0..source.local_height() {
                let i = source.global_row(i_loc);
                let value = source.get_local(i_loc, j_loc);
                for &holder in map.holders(target.row_owner(i), col_owner) {
                    indices[holder].extend([i, j]);
                    values[holder].push(value);
                }
            }
        }
    }
    let indices = comm.all_to_all_v(indices);
    let values = comm.all_to_all_v(values);

    target.assert_not_locked()?;
    for (indices, values) in izip!(&indices, &values) {
        for (ij, &value) in izip!(indices.chunks_exact(2), values) {
            let (i_loc, j_loc) = (target.local_row_offset(ij[0]), target.local_col_offset(ij[1]));
            target.set_local(i_loc, j_loc, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::ThreadUniverse;

    fn fill<C: Comm>(a: &mut DistMatrix<'_, f64, C>) {
        for j_loc in 0..a.local_width() {
            for i_loc in 0..a.local_height() {
                let (i, j) = (a.global_row(i_loc), a.global_col(j_loc));
                a.set_local(i_loc, j_loc, (100 * i + j) as f64);
            }
        }
    }

    fn holds_numbers<C: Comm>(a: &DistMatrix<'_, f64, C>) -> bool {
        (0..a.local_width()).all(|j_loc| {
            (0..a.local_height()).all(|i_loc| {
                let (i, j) = (a.global_row(i_loc), a.global_col(j_loc));
                a.get_local(i_loc, j_loc) == (100 * i + j) as f64
            })
        })
    }

    #[test]
    fn test_plan() {
        ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let data = |d: Distribution, col_align: usize, row_align: usize| {
                let mut a = DistMatrix::<f64, _>::new(&grid, d);
                a.align(col_align, row_align, false).unwrap();
                a.dist_data()
            };
            let mc_star = Distribution::new(Dist::Mc, Dist::Star).unwrap();
            let mr_star = Distribution::new(Dist::Mr, Dist::Star).unwrap();
            let mc_mr = data(Distribution::MC_MR, 1, 0);

            assert_eq!(plan(&grid, &mc_mr, &mc_mr), Transform::LocalCopy);
            assert_eq!(
                plan(&grid, &mc_mr, &data(mc_star, 1, 0)),
                Transform::AllGather(Axis::Row)
            );
            assert_eq!(
                plan(&grid, &data(mc_star, 1, 0), &mc_mr),
                Transform::Filter
            );
            assert_eq!(
                plan(&grid, &data(Distribution::VC_STAR, 3, 0), &data(mc_star, 1, 0)),
                Transform::PartialAllGather(Axis::Col)
            );
            assert_eq!(
                plan(&grid, &data(mc_star, 1, 0), &data(Distribution::VC_STAR, 3, 0)),
                Transform::Filter
            );
            assert_eq!(
                plan(&grid, &mc_mr, &data(Distribution::MC_MR, 0, 0)),
                Transform::Realign(Axis::Col)
            );
            assert_eq!(
                plan(&grid, &mc_mr, &data(mr_star, 0, 0)),
                Transform::AllToAll
            );
            assert_eq!(
                plan(&grid, &data(Distribution::STAR_STAR, 0, 0), &mc_mr),
                Transform::Filter
            );
        });
    }

    #[test]
    fn test_round_trip_through_every_distribution() {
        let results = ThreadUniverse::run(6, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = DistMatrix::<f64, _>::new(&grid, Distribution::MC_MR);
            a.align(1, 2, false).unwrap();
            a.resize(7, 5).unwrap();
            fill(&mut a);
            let mut ok = true;
            for dist in Distribution::all() {
                let b = redistribute(&a, dist).unwrap();
                ok &= (b.height(), b.width()) == (7, 5);
                ok &= holds_numbers(&b);
                for other in Distribution::all() {
                    let c = redistribute(&b, other).unwrap();
                    ok &= holds_numbers(&c);
                }
            }
            ok
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn test_blocked_copies() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a =
                DistMatrix::<f64, _>::new_blocked(&grid, Distribution::MC_MR, 2, 3).unwrap();
            a.resize(9, 8).unwrap();
            fill(&mut a);
            let mut b = DistMatrix::<f64, _>::new(&grid, Distribution::MC_MR);
            copy(&a, &mut b).unwrap();
            let mut c =
                DistMatrix::<f64, _>::new_blocked(&grid, Distribution::VC_STAR, 3, 1).unwrap();
            copy(&b, &mut c).unwrap();
            holds_numbers(&b) && holds_numbers(&c) && c.block_height() == 3
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn test_copy_into_views() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, 6, 6);
            fill(&mut a);
            let mc_star = Distribution::new(Dist::Mc, Dist::Star).unwrap();
            let mr_star = Distribution::new(Dist::Mr, Dist::Star).unwrap();
            let mut x = DistMatrix::<f64, _>::new(&grid, mc_star);
            x.align_cols_with(&a.dist_data(), false, false).unwrap();
            x.resize(6, 2).unwrap();
            let mut y = DistMatrix::<f64, _>::new(&grid, mr_star);
            y.align_cols_with(&a.dist_data(), false, false).unwrap();
            y.resize(6, 2).unwrap();

            let a21 = a.view(3..6, 2..3).unwrap();
            let gather = {
                let mut x21 = x.view_mut(3..6, 1..2).unwrap();
                copy(&a21, &mut x21).unwrap();
                plan(&grid, &a21.dist_data(), &x21.dist_data())
            };
            {
                let mut y21 = y.view_mut(3..6, 1..2).unwrap();
                copy(&a21, &mut y21).unwrap();
            }
            let too_small = {
                let mut x_top = x.view_mut(0..3, 0..2).unwrap();
                copy(&a.view(0..2, 0..2).unwrap(), &mut x_top)
            };

            let mut ok = gather == Transform::AllGather(Axis::Row);
            for i in 3..6 {
                ok &= x.get(i, 1).unwrap() == (100 * i + 2) as f64;
                ok &= y.get(i, 1).unwrap() == (100 * i + 2) as f64;
                ok &= x.get(i, 0).unwrap() == 0.0;
            }
            ok && matches!(too_small, Err(Error::SizeMismatch { .. }))
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn test_circ_root_change() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = DistMatrix::<f64, _>::new(&grid, Distribution::CIRC_CIRC);
            a.set_root(2, false).unwrap();
            a.resize(3, 3).unwrap();
            fill(&mut a);
            let mut b = DistMatrix::<f64, _>::new(&grid, Distribution::CIRC_CIRC);
            b.set_root(1, true).unwrap();
            let transform = plan(&grid, &a.dist_data(), &b.dist_data());
            copy(&a, &mut b).unwrap();
            (
                transform,
                b.root(),
                b.participating() && holds_numbers(&b) && b.local_height() == 3,
                b.get(2, 1).unwrap(),
            )
        });
        for (rank, (transform, root, holds, value)) in results.into_iter().enumerate() {
            assert_eq!(transform, Transform::RootToRoot);
            assert_eq!(root, 1);
            assert_eq!(holds, rank == 1);
            assert_eq!(value, 201.0);
        }
    }
}
