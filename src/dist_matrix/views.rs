//! Submatrix views and diagonals
use super::DistMatrix;
use crate::comm::Comm;
use crate::dist::{AxisLayout, Dist};
use crate::distribution::Distribution;
use crate::error::Result;
use crate::local_matrix::LocalMatrix;
use crate::redist;
use crate::types::{Element, ViewType};
use std::cell::RefCell;
use std::ops::Range;

/// Everything a view inherits from its parent except the storage.
struct ViewHeader {
    dist: Distribution,
    block_height: usize,
    block_width: usize,
    col: AxisLayout,
    row: AxisLayout,
    root: usize,
    height: usize,
    width: usize,
    local_rows: Range<usize>,
    local_cols: Range<usize>,
}

impl ViewHeader {
    fn into_matrix<'b, T: Element, C: Comm>(
        self,
        grid: &'b crate::grid::Grid<C>,
        matrix: LocalMatrix<'b, T>,
        view_type: ViewType,
    ) -> DistMatrix<'b, T, C> {
        let mut view = DistMatrix {
            grid,
            dist: self.dist,
            block_height: self.block_height,
            block_width: self.block_width,
            col_cut: self.col.cut,
            row_cut: self.row.cut,
            col_align: self.col.align,
            row_align: self.row.align,
            root: self.root,
            col_constrained: true,
            row_constrained: true,
            root_constrained: true,
            col_shift: 0,
            row_shift: 0,
            view_type,
            height: self.height,
            width: self.width,
            matrix,
            remote_updates: Vec::new(),
            remote_pulls: RefCell::new(Vec::new()),
        };
        view.set_shifts();
        view
    }
}

impl<'a, T: Element, C: Comm> DistMatrix<'a, T, C> {
    fn view_header(&self, rows: &Range<usize>, cols: &Range<usize>) -> Result<ViewHeader> {
        let height = rows.end.saturating_sub(rows.start);
        let width = cols.end.saturating_sub(cols.start);
        self.assert_valid_submatrix(rows.start, cols.start, height, width)?;
        let (local_rows, local_cols) = if self.participating() {
            (
                self.local_row_offset(rows.start)..self.local_row_offset(rows.start + height),
                self.local_col_offset(cols.start)..self.local_col_offset(cols.start + width),
            )
        } else {
            (0..0, 0..0)
        };
        Ok(ViewHeader {
            dist: self.dist,
            block_height: self.block_height,
            block_width: self.block_width,
            col: self.col_layout().offset_by(rows.start),
            row: self.row_layout().offset_by(cols.start),
            root: self.root,
            height,
            width,
            local_rows,
            local_cols,
        })
    }

    /// A read-only view of the global rows `rows` and columns `cols`.
    ///
    /// The view keeps the distribution and block sizes; alignments and cuts follow from
    /// the offset, and are constrained.
    pub fn view(&self, rows: Range<usize>, cols: Range<usize>) -> Result<DistMatrix<'_, T, C>> {
        let header = self.view_header(&rows, &cols)?;
        let matrix = self
            .matrix
            .view(header.local_rows.clone(), header.local_cols.clone());
        Ok(header.into_matrix(self.grid, matrix, ViewType::LockedView))
    }

    /// A writable view of the global rows `rows` and columns `cols`.
    pub fn view_mut(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<DistMatrix<'_, T, C>> {
        self.assert_not_locked()?;
        let header = self.view_header(&rows, &cols)?;
        let grid = self.grid;
        let matrix = self
            .matrix
            .view_mut(header.local_rows.clone(), header.local_cols.clone());
        Ok(header.into_matrix(grid, matrix, ViewType::View))
    }

    // Diagonals

    fn diagonal_start(&self, offset: isize) -> (usize, usize) {
        if offset >= 0 {
            (0, offset.unsigned_abs())
        } else {
            (offset.unsigned_abs(), 0)
        }
    }

    /// Length of the diagonal `offset` above (or below, if negative) the main diagonal.
    pub fn diagonal_length(&self, offset: isize) -> usize {
        let (i0, j0) = self.diagonal_start(offset);
        self.height
            .saturating_sub(i0)
            .min(self.width.saturating_sub(j0))
    }

    fn diagonal_owner(&self, offset: isize) -> Option<crate::grid::Coords> {
        let (i0, j0) = self.diagonal_start(offset);
        let owner = self.owner(i0, j0);
        let vc = match (self.dist.col, self.dist.row) {
            (Dist::Mc, Dist::Mr) => owner,
            (Dist::Mr, Dist::Mc) => self.grid.vc_of_vr(owner),
            _ => return None,
        };
        Some(self.grid.coords(vc))
    }

    /// Root of a `[MD, *]` vector holding diagonal `offset` without communication
    pub fn diagonal_root(&self, offset: isize) -> usize {
        self.diagonal_owner(offset)
            .map_or(self.root, |coords| coords.path)
    }

    /// Alignment of a `[MD, *]` vector holding diagonal `offset` without communication
    pub fn diagonal_align(&self, offset: isize) -> usize {
        self.diagonal_owner(offset).map_or(0, |coords| coords.md)
    }

    /// Can diagonal `offset` be copied into a matrix described by `data` locally?
    pub fn diagonal_aligned_with(&self, data: &crate::dist::DistData, offset: isize) -> bool {
        if data.grid != self.grid.id() {
            return false;
        }
        match (self.dist.col, self.dist.row) {
            (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc) => {
                let align = self.diagonal_align(offset);
                self.is_elemental()
                    && data.is_elemental()
                    && data.root == self.diagonal_root(offset)
                    && match (data.col_dist, data.row_dist) {
                        (Dist::Md, Dist::Star) => data.col_align == align,
                        (Dist::Star, Dist::Md) => data.row_align == align,
                        _ => false,
                    }
            }
            _ => data.col_dist == Dist::Star && data.row_dist == Dist::Star,
        }
    }

    /// Diagonal `offset` as a column vector.
    ///
    /// For `[MC, MR]` and `[MR, MC]` the result is a `[MD, *]` vector aligned with the
    /// diagonal and no data moves. Other distributions gather into a `[*, *]` vector.
    pub fn get_diagonal(&self, offset: isize) -> Result<DistMatrix<'a, T, C>> {
        let n = self.diagonal_length(offset);
        let (i0, j0) = self.diagonal_start(offset);
        let local_diagonal = matches!(
            (self.dist.col, self.dist.row),
            (Dist::Mc, Dist::Mr) | (Dist::Mr, Dist::Mc)
        ) && self.is_elemental();

        if local_diagonal {
            let mut d = DistMatrix::new(self.grid, Distribution::new(Dist::Md, Dist::Star)?);
            d.set_root(self.diagonal_root(offset), false)?;
            d.align(self.diagonal_align(offset), 0, false)?;
            d.resize(n, 1)?;
            for k_loc in 0..d.local_height() {
                let k = d.global_row(k_loc);
                let value = self.get_local(
                    self.local_row_offset(i0 + k),
                    self.local_col_offset(j0 + k),
                );
                d.set_local(k_loc, 0, value);
            }
            Ok(d)
        } else {
            let mut full = DistMatrix::new(self.grid, Distribution::STAR_STAR);
            redist::copy(self, &mut full)?;
            let mut d = DistMatrix::with_size(self.grid, Distribution::STAR_STAR, n, 1);
            if d.participating() {
                for k in 0..n {
                    d.set_local(k, 0, full.get_local(i0 + k, j0 + k));
                }
            }
            Ok(d)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::ThreadUniverse;
    use crate::grid::Grid;

    fn numbered<'a, C: Comm>(grid: &'a Grid<C>, dist: Distribution, n: usize) -> DistMatrix<'a, f64, C> {
        let mut a = DistMatrix::with_size(grid, dist, n, n);
        for j in 0..n {
            for i in 0..n {
                a.set(i, j, (i * n + j) as f64).unwrap();
            }
        }
        a
    }

    #[test]
    fn test_view_entries() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut ok = true;
            for dist in Distribution::all() {
                let a = numbered(&grid, dist, 7);
                let v = a.view(2..6, 3..7).unwrap();
                ok &= (v.height(), v.width()) == (4, 4);
                ok &= v.locked();
                for i in 0..4 {
                    for j in 0..4 {
                        ok &= v.get(i, j).unwrap() == ((i + 2) * 7 + j + 3) as f64;
                    }
                }
            }
            ok
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn test_view_of_blocked_matrix() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = DistMatrix::<f64, _>::new_blocked(&grid, Distribution::MC_MR, 3, 2).unwrap();
            a.resize(9, 9).unwrap();
            for j in 0..9 {
                for i in 0..9 {
                    a.set(i, j, (10 * i + j) as f64).unwrap();
                }
            }
            let v = a.view(4..9, 1..8).unwrap();
            let mut ok = v.col_cut() == 1 && v.row_cut() == 1;
            for j in 0..7 {
                for i in 0..5 {
                    ok &= v.get(i, j).unwrap() == (10 * (i + 4) + j + 1) as f64;
                }
            }
            ok
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn test_view_mut_writes_through() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut a = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, 5, 5);
            {
                let mut v = a.view_mut(1..4, 2..5).unwrap();
                v.set(1, 1, 3.5).unwrap();
                v.update(2, 2, 1.0).unwrap();
            }
            (a.get(2, 3).unwrap(), a.get(3, 4).unwrap())
        });
        for r in results {
            assert_eq!(r, (3.5, 1.0));
        }
    }

    #[test]
    fn test_diagonal() {
        let results = ThreadUniverse::run(4, |comm| {
            let grid = Grid::new(comm, 2).unwrap();
            let mut ok = true;
            for dist in Distribution::all() {
                let a = numbered(&grid, dist, 5);
                for offset in [-2isize, 0, 1] {
                    let d = a.get_diagonal(offset).unwrap();
                    ok &= d.height() == a.diagonal_length(offset);
                    ok &= a.diagonal_aligned_with(&d.dist_data(), offset);
                    for k in 0..d.height() {
                        let (i, j) = if offset >= 0 {
                            (k, k + offset as usize)
                        } else {
                            (k + (-offset) as usize, k)
                        };
                        ok &= d.get(k, 0).unwrap() == (i * 5 + j) as f64;
                    }
                }
            }
            ok
        });
        assert!(results.into_iter().all(|ok| ok));
    }

    #[test]
    fn test_diagonal_length() {
        let results = ThreadUniverse::run(1, |comm| {
            let grid = Grid::new(comm, 1).unwrap();
            let a = DistMatrix::<f64, _>::with_size(&grid, Distribution::MC_MR, 3, 5);
            (
                a.diagonal_length(0),
                a.diagonal_length(3),
                a.diagonal_length(-2),
                a.diagonal_length(-4),
            )
        });
        assert_eq!(results[0], (3, 2, 1, 0));
    }
}
