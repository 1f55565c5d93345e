//! Distributed matrices
//!
//! A [`DistMatrix`] is a global `height x width` matrix of which every process stores the
//! entries assigned to it by the matrix's [`Distribution`] and alignments. The process
//! holds a reference to the [`Grid`] it lives on and a [`LocalMatrix`] with its share.
//!
//! Operations on global indices (`get`, `set`, ...) and the queue operations are
//! collective or owner-only as documented on each method. Operations on local indices
//! (`get_local`, `set_local`, ...) never communicate and panic on invalid indices, like
//! slice indexing does.
mod queues;
mod views;

use crate::comm::Comm;
use crate::dist::{global_index, local_length, shift, Axis, AxisLayout, Dist, DistData};
use crate::distribution::Distribution;
use crate::error::{Error, Result};
use crate::grid::{CommKind, GridId, Grid};
use crate::local_matrix::LocalMatrix;
use crate::types::{Base, Element, Entry, Scalar, ViewType};
use cauchy::Scalar as _;
use std::cell::RefCell;
use std::ops::MulAssign;

/// A matrix distributed over a process grid.
pub struct DistMatrix<'a, T: Element, C: Comm> {
    grid: &'a Grid<C>,
    dist: Distribution,
    block_height: usize,
    block_width: usize,
    col_cut: usize,
    row_cut: usize,
    col_align: usize,
    row_align: usize,
    root: usize,
    col_constrained: bool,
    row_constrained: bool,
    root_constrained: bool,
    col_shift: usize,
    row_shift: usize,
    view_type: ViewType,
    height: usize,
    width: usize,
    matrix: LocalMatrix<'a, T>,
    remote_updates: Vec<Entry<T>>,
    remote_pulls: RefCell<Vec<(usize, usize)>>,
}

/// Value of the alignment of a `this`-distributed axis that matches the descriptor `data`.
fn matching_align(this: Dist, stride: usize, data: &DistData) -> Option<usize> {
    if data.col_dist == this || data.col_dist == this.partial() {
        Some(data.col_align)
    } else if data.row_dist == this || data.row_dist == this.partial() {
        Some(data.row_align)
    } else if data.col_dist.partial() == this {
        Some(data.col_align % stride)
    } else if data.row_dist.partial() == this {
        Some(data.row_align % stride)
    } else {
        None
    }
}

impl<'a, T: Element, C: Comm> DistMatrix<'a, T, C> {
    /// An empty element-cyclic matrix
    pub fn new(grid: &'a Grid<C>, dist: Distribution) -> Self {
        let mut matrix = Self {
            grid,
            dist,
            block_height: 1,
            block_width: 1,
            col_cut: 0,
            row_cut: 0,
            col_align: 0,
            row_align: 0,
            root: 0,
            col_constrained: false,
            row_constrained: false,
            root_constrained: false,
            col_shift: 0,
            row_shift: 0,
            view_type: ViewType::Owner,
            height: 0,
            width: 0,
            matrix: LocalMatrix::new(),
            remote_updates: Vec::new(),
            remote_pulls: RefCell::new(Vec::new()),
        };
        matrix.set_shifts();
        matrix
    }

    /// An empty block-cyclic matrix
    pub fn new_blocked(
        grid: &'a Grid<C>,
        dist: Distribution,
        block_height: usize,
        block_width: usize,
    ) -> Result<Self> {
        if block_height == 0 || block_width == 0 {
            return Err(Error::InvalidArgument(format!(
                "block size {block_height} x {block_width} must be positive"
            ))
            .report());
        }
        let mut matrix = Self::new(grid, dist);
        matrix.block_height = block_height;
        matrix.block_width = block_width;
        Ok(matrix)
    }

    /// A zero element-cyclic matrix of the given size
    pub fn with_size(grid: &'a Grid<C>, dist: Distribution, height: usize, width: usize) -> Self {
        let mut matrix = Self::new(grid, dist);
        matrix.set_dims(height, width, None);
        matrix
    }

    fn set_shifts(&mut self) {
        if self.participating() {
            self.col_shift = shift(self.col_rank(), self.col_align, self.col_stride());
            self.row_shift = shift(self.row_rank(), self.row_align, self.row_stride());
        } else {
            self.col_shift = 0;
            self.row_shift = 0;
        }
    }

    fn local_lengths(&self, height: usize, width: usize) -> (usize, usize) {
        if !self.participating() {
            return (0, 0);
        }
        (
            local_length(
                height,
                self.col_shift,
                self.block_height,
                self.col_cut,
                self.col_stride(),
            ),
            local_length(
                width,
                self.row_shift,
                self.block_width,
                self.row_cut,
                self.row_stride(),
            ),
        )
    }

    fn set_dims(&mut self, height: usize, width: usize, ldim: Option<usize>) {
        self.height = height;
        self.width = width;
        let (local_height, local_width) = self.local_lengths(height, width);
        match ldim {
            Some(ldim) => self.matrix.resize_with_ldim(local_height, local_width, ldim),
            None => self.matrix.resize(local_height, local_width),
        }
    }

    /// Set the global size and allocate the local share.
    ///
    /// The contents are kept if the size is unchanged. A view can only be "resized" to
    /// its current size.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<()> {
        self.assert_resizable(height, width)?;
        self.set_dims(height, width, None);
        Ok(())
    }

    /// Set the global size with a local leading dimension of at least `ldim`.
    pub fn resize_with_ldim(&mut self, height: usize, width: usize, ldim: usize) -> Result<()> {
        self.assert_resizable(height, width)?;
        if self.view_type.is_viewing() {
            return Ok(());
        }
        self.set_dims(height, width, Some(ldim));
        Ok(())
    }

    fn assert_resizable(&self, height: usize, width: usize) -> Result<()> {
        if self.view_type.is_fixed_size() && (height, width) != (self.height, self.width) {
            return Err(Error::ViewResize {
                height: self.height,
                width: self.width,
                new_height: height,
                new_width: width,
            }
            .report());
        }
        Ok(())
    }

    /// Release everything: size, storage, alignments and their constraints.
    pub fn empty(&mut self) {
        self.empty_data();
        self.col_align = 0;
        self.row_align = 0;
        self.col_constrained = false;
        self.row_constrained = false;
        self.root_constrained = false;
        self.set_shifts();
    }

    /// Release size and storage, keeping alignments and constraints. Views become owners.
    pub fn empty_data(&mut self) {
        self.height = 0;
        self.width = 0;
        self.matrix = LocalMatrix::new();
        self.view_type = ViewType::Owner;
        self.remote_updates.clear();
        self.remote_pulls.borrow_mut().clear();
    }

    /// Release size and data, keeping alignments, constraints and the storage a view
    /// points at.
    pub fn soft_empty_data(&mut self) {
        self.height = 0;
        self.width = 0;
        self.matrix.empty();
        self.remote_updates.clear();
        self.remote_pulls.borrow_mut().clear();
    }

    /// Move the matrix to another grid. Its contents are released.
    pub fn set_grid(&mut self, grid: &'a Grid<C>) {
        self.empty();
        self.grid = grid;
        if self.root >= self.cross_size() {
            self.root = 0;
        }
        self.set_shifts();
    }

    /// Make the size on every process equal to the size on the first process of the grid.
    pub fn make_size_consistent(&mut self) -> Result<()> {
        let mut dims = vec![self.height, self.width];
        self.grid.viewing_comm().broadcast(&mut dims, 0);
        if (dims[0], dims[1]) != (self.height, self.width) {
            log::debug!(
                "Adopting size {} x {} instead of {} x {}",
                dims[0],
                dims[1],
                self.height,
                self.width
            );
        }
        self.resize(dims[0], dims[1])
    }

    /// Exchange two matrices of the same distribution.
    pub fn shallow_swap(&mut self, other: &mut Self) -> Result<()> {
        if self.dist != other.dist {
            return Err(Error::IncompatibleDistribution(format!(
                "cannot swap {} with {}",
                self.dist, other.dist
            ))
            .report());
        }
        std::mem::swap(self, other);
        Ok(())
    }

    // Alignment

    fn align_axis(
        &mut self,
        axis: Axis,
        align: usize,
        constrain: bool,
        allow_mismatch: bool,
    ) -> Result<()> {
        let stride = self.grid.stride(self.dist(axis));
        if align >= stride {
            return Err(Error::InvalidArgument(format!(
                "{axis} alignment {align} is not below the stride {stride}"
            ))
            .report());
        }
        let (current, constrained) = match axis {
            Axis::Col => (self.col_align, self.col_constrained),
            Axis::Row => (self.row_align, self.row_constrained),
        };
        if align != current {
            if constrained {
                if allow_mismatch {
                    log::warn!(
                        "Keeping constrained {axis} alignment {current} instead of {align}"
                    );
                    return Ok(());
                }
                return Err(Error::AlignmentMismatch {
                    axis,
                    current,
                    requested: align,
                }
                .report());
            }
            if self.view_type.is_viewing() {
                return Err(
                    Error::InvalidArgument("a view cannot be realigned".to_string()).report(),
                );
            }
            self.empty_data();
            match axis {
                Axis::Col => self.col_align = align,
                Axis::Row => self.row_align = align,
            }
        }
        if constrain {
            match axis {
                Axis::Col => self.col_constrained = true,
                Axis::Row => self.row_constrained = true,
            }
        }
        self.set_shifts();
        Ok(())
    }

    /// Set both alignments.
    pub fn align(&mut self, col_align: usize, row_align: usize, constrain: bool) -> Result<()> {
        self.align_cols(col_align, constrain)?;
        self.align_rows(row_align, constrain)
    }

    /// Set the column alignment.
    pub fn align_cols(&mut self, align: usize, constrain: bool) -> Result<()> {
        self.align_axis(Axis::Col, align, constrain, false)
    }

    /// Set the row alignment.
    pub fn align_rows(&mut self, align: usize, constrain: bool) -> Result<()> {
        self.align_axis(Axis::Row, align, constrain, false)
    }

    fn align_axis_with(
        &mut self,
        axis: Axis,
        data: &DistData,
        constrain: bool,
        allow_mismatch: bool,
    ) -> Result<()> {
        self.assert_same_grid(data.grid)?;
        let this = self.dist(axis);
        let stride = self.grid.stride(this);
        match matching_align(this, stride, data) {
            Some(align) => self.align_axis(axis, align, constrain, allow_mismatch),
            None => {
                let nonsensical = this.is_distributed()
                    && (data.col_dist.is_distributed() || data.row_dist.is_distributed());
                if nonsensical && !allow_mismatch {
                    Err(Error::NonsensicalAlignment {
                        axis,
                        this,
                        col: data.col_dist,
                        row: data.row_dist,
                    }
                    .report())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Align the columns with a compatible axis of `data`.
    pub fn align_cols_with(
        &mut self,
        data: &DistData,
        constrain: bool,
        allow_mismatch: bool,
    ) -> Result<()> {
        self.align_axis_with(Axis::Col, data, constrain, allow_mismatch)
    }

    /// Align the rows with a compatible axis of `data`.
    pub fn align_rows_with(
        &mut self,
        data: &DistData,
        constrain: bool,
        allow_mismatch: bool,
    ) -> Result<()> {
        self.align_axis_with(Axis::Row, data, constrain, allow_mismatch)
    }

    /// Adopt the alignments (and root) of `data` as far as the distributions relate.
    pub fn align_with(&mut self, data: &DistData, constrain: bool, allow_mismatch: bool) -> Result<()> {
        self.align_cols_with(data, constrain, allow_mismatch)?;
        self.align_rows_with(data, constrain, allow_mismatch)?;
        let other = Distribution {
            col: data.col_dist,
            row: data.row_dist,
        };
        if self.dist.restricted_by_cross() && self.dist.cross_comm() == other.cross_comm() {
            self.set_root_with(data.root, constrain, allow_mismatch)?;
        }
        Ok(())
    }

    /// Set alignments and size in one step.
    ///
    /// With `force`, constrained alignments that differ are an error; otherwise they are
    /// kept.
    pub fn align_and_resize(
        &mut self,
        col_align: usize,
        row_align: usize,
        height: usize,
        width: usize,
        force: bool,
        constrain: bool,
    ) -> Result<()> {
        self.align_axis(Axis::Col, col_align, constrain, !force)?;
        self.align_axis(Axis::Row, row_align, constrain, !force)?;
        self.resize(height, width)
    }

    /// Forget all alignment constraints. Alignments are unchanged.
    pub fn free_alignments(&mut self) {
        if !self.view_type.is_viewing() {
            self.col_constrained = false;
            self.row_constrained = false;
            self.root_constrained = false;
        }
    }

    fn set_root_with(&mut self, root: usize, constrain: bool, allow_mismatch: bool) -> Result<()> {
        let cross_size = self.cross_size();
        if root >= cross_size {
            return Err(Error::InvalidArgument(format!(
                "root {root} is not below the cross size {cross_size}"
            ))
            .report());
        }
        if root != self.root {
            if self.root_constrained {
                if allow_mismatch {
                    log::warn!("Keeping constrained root {} instead of {root}", self.root);
                    return Ok(());
                }
                return Err(Error::InvalidArgument(format!(
                    "root is constrained to {}, cannot move to {root}",
                    self.root
                ))
                .report());
            }
            if self.view_type.is_viewing() {
                return Err(Error::InvalidArgument("a view cannot change its root".to_string())
                    .report());
            }
            self.empty_data();
            self.root = root;
        }
        if constrain {
            self.root_constrained = true;
        }
        self.set_shifts();
        Ok(())
    }

    /// Set the root within the cross communicator.
    pub fn set_root(&mut self, root: usize, constrain: bool) -> Result<()> {
        self.set_root_with(root, constrain, false)
    }

    // Basic queries

    /// The grid of the matrix
    pub fn grid(&self) -> &'a Grid<C> {
        self.grid
    }
    /// The distribution pair
    pub fn distribution(&self) -> Distribution {
        self.dist
    }
    /// Tag of an axis
    pub fn dist(&self, axis: Axis) -> Dist {
        match axis {
            Axis::Col => self.dist.col,
            Axis::Row => self.dist.row,
        }
    }
    /// Tag of the row indices
    pub fn col_dist(&self) -> Dist {
        self.dist.col
    }
    /// Tag of the column indices
    pub fn row_dist(&self) -> Dist {
        self.dist.row
    }
    /// Collected tag of the row indices
    pub fn collected_col_dist(&self) -> Dist {
        self.dist.col.collected()
    }
    /// Collected tag of the column indices
    pub fn collected_row_dist(&self) -> Dist {
        self.dist.row.collected()
    }
    /// Partial tag of the row indices
    pub fn partial_col_dist(&self) -> Dist {
        self.dist.col.partial()
    }
    /// Partial tag of the column indices
    pub fn partial_row_dist(&self) -> Dist {
        self.dist.row.partial()
    }
    /// Partial union tag of the row indices
    pub fn partial_union_col_dist(&self) -> Dist {
        self.dist.col.partial_union()
    }
    /// Partial union tag of the column indices
    pub fn partial_union_row_dist(&self) -> Dist {
        self.dist.row.partial_union()
    }

    /// Descriptor of the distribution
    pub fn dist_data(&self) -> DistData {
        DistData {
            col_dist: self.dist.col,
            row_dist: self.dist.row,
            block_height: self.block_height,
            block_width: self.block_width,
            col_align: self.col_align,
            row_align: self.row_align,
            col_cut: self.col_cut,
            row_cut: self.row_cut,
            root: self.root,
            grid: self.grid.id(),
        }
    }

    /// Is the matrix element-cyclic?
    pub fn is_elemental(&self) -> bool {
        self.dist_data().is_elemental()
    }

    /// Global height
    pub fn height(&self) -> usize {
        self.height
    }
    /// Global width
    pub fn width(&self) -> usize {
        self.width
    }
    /// Local height
    pub fn local_height(&self) -> usize {
        self.matrix.height()
    }
    /// Local width
    pub fn local_width(&self) -> usize {
        self.matrix.width()
    }
    /// Leading dimension of the local storage
    pub fn ldim(&self) -> usize {
        self.matrix.ldim()
    }
    /// Number of entries allocated locally
    pub fn allocated_memory(&self) -> usize {
        self.matrix.allocated_memory()
    }

    /// Relation of the matrix to its storage
    pub fn view_type(&self) -> ViewType {
        self.view_type
    }
    /// Does the matrix alias another matrix's storage?
    pub fn viewing(&self) -> bool {
        self.view_type.is_viewing()
    }
    /// Is writing forbidden?
    pub fn locked(&self) -> bool {
        self.view_type.is_locked()
    }

    /// Block height
    pub fn block_height(&self) -> usize {
        self.block_height
    }
    /// Block width
    pub fn block_width(&self) -> usize {
        self.block_width
    }
    /// Cut of the first block row
    pub fn col_cut(&self) -> usize {
        self.col_cut
    }
    /// Cut of the first block column
    pub fn row_cut(&self) -> usize {
        self.row_cut
    }
    /// Column alignment
    pub fn col_align(&self) -> usize {
        self.col_align
    }
    /// Row alignment
    pub fn row_align(&self) -> usize {
        self.row_align
    }
    /// Column shift of this process
    pub fn col_shift(&self) -> usize {
        self.col_shift
    }
    /// Row shift of this process
    pub fn row_shift(&self) -> usize {
        self.row_shift
    }
    /// Is the column alignment constrained?
    pub fn col_constrained(&self) -> bool {
        self.col_constrained
    }
    /// Is the row alignment constrained?
    pub fn row_constrained(&self) -> bool {
        self.row_constrained
    }
    /// Is the root constrained?
    pub fn root_constrained(&self) -> bool {
        self.root_constrained
    }
    /// Root within the cross communicator
    pub fn root(&self) -> usize {
        self.root
    }

    /// Does this process hold a share of the matrix?
    pub fn participating(&self) -> bool {
        self.grid.participating() && self.cross_rank() == self.root
    }

    // Communicators, strides and ranks

    /// Number of processes the row indices are spread over
    pub fn col_stride(&self) -> usize {
        self.grid.stride(self.dist.col)
    }
    /// Number of processes the column indices are spread over
    pub fn row_stride(&self) -> usize {
        self.grid.stride(self.dist.row)
    }
    /// Stride of the partial column tag
    pub fn partial_col_stride(&self) -> usize {
        self.grid.stride(self.partial_col_dist())
    }
    /// Stride of the partial row tag
    pub fn partial_row_stride(&self) -> usize {
        self.grid.stride(self.partial_row_dist())
    }
    /// Stride of the partial union column tag
    pub fn partial_union_col_stride(&self) -> usize {
        self.grid.stride(self.partial_union_col_dist())
    }
    /// Stride of the partial union row tag
    pub fn partial_union_row_stride(&self) -> usize {
        self.grid.stride(self.partial_union_row_dist())
    }
    /// Size of the distribution communicator
    pub fn dist_size(&self) -> usize {
        self.col_stride() * self.row_stride()
    }
    /// Size of the cross communicator
    pub fn cross_size(&self) -> usize {
        match self.dist.cross_comm() {
            CommKind::MdPerp => self.grid.gcd(),
            CommKind::Vc => self.grid.size(),
            _ => 1,
        }
    }
    /// Size of the redundant communicator
    pub fn redundant_size(&self) -> usize {
        match self.dist.redundant_comm() {
            CommKind::Mc => self.grid.height(),
            CommKind::Mr => self.grid.width(),
            CommKind::Vc => self.grid.size(),
            _ => 1,
        }
    }

    fn tag_rank(&self, dist: Dist) -> usize {
        self.grid.dist_rank(dist, &self.grid.local_coords())
    }

    /// Rank in the column communicator
    pub fn col_rank(&self) -> usize {
        self.tag_rank(self.dist.col)
    }
    /// Rank in the row communicator
    pub fn row_rank(&self) -> usize {
        self.tag_rank(self.dist.row)
    }
    /// Rank in the partial column communicator
    pub fn partial_col_rank(&self) -> usize {
        self.tag_rank(self.partial_col_dist())
    }
    /// Rank in the partial row communicator
    pub fn partial_row_rank(&self) -> usize {
        self.tag_rank(self.partial_row_dist())
    }
    /// Rank in the partial union column communicator
    pub fn partial_union_col_rank(&self) -> usize {
        self.tag_rank(self.partial_union_col_dist())
    }
    /// Rank in the partial union row communicator
    pub fn partial_union_row_rank(&self) -> usize {
        self.tag_rank(self.partial_union_row_dist())
    }
    /// Rank in the distribution communicator
    pub fn dist_rank(&self) -> usize {
        self.col_rank() + self.row_rank() * self.col_stride()
    }
    /// Rank in the cross communicator
    pub fn cross_rank(&self) -> usize {
        self.dist.cross_rank(&self.grid.local_coords())
    }
    /// Rank in the redundant communicator
    pub fn redundant_rank(&self) -> usize {
        self.dist.redundant_rank(&self.grid.local_coords())
    }

    /// Communicator of the column tag
    pub fn col_comm(&self) -> &'a C {
        self.grid.comm(CommKind::of(self.dist.col))
    }
    /// Communicator of the row tag
    pub fn row_comm(&self) -> &'a C {
        self.grid.comm(CommKind::of(self.dist.row))
    }
    /// Communicator of the partial column tag
    pub fn partial_col_comm(&self) -> &'a C {
        self.grid.comm(CommKind::of(self.partial_col_dist()))
    }
    /// Communicator of the partial row tag
    pub fn partial_row_comm(&self) -> &'a C {
        self.grid.comm(CommKind::of(self.partial_row_dist()))
    }
    /// Communicator of the partial union column tag
    pub fn partial_union_col_comm(&self) -> &'a C {
        self.grid.comm(CommKind::of(self.partial_union_col_dist()))
    }
    /// Communicator of the partial union row tag
    pub fn partial_union_row_comm(&self) -> &'a C {
        self.grid.comm(CommKind::of(self.partial_union_row_dist()))
    }
    /// Communicator over which every entry has one owner
    pub fn dist_comm(&self) -> &'a C {
        self.grid.comm(self.dist.dist_comm())
    }
    /// Communicator selecting the processes that hold data
    pub fn cross_comm(&self) -> &'a C {
        self.grid.comm(self.dist.cross_comm())
    }
    /// Communicator over which the data are replicated
    pub fn redundant_comm(&self) -> &'a C {
        self.grid.comm(self.dist.redundant_comm())
    }

    // Index mapping

    /// Layout of the row indices
    pub fn col_layout(&self) -> AxisLayout {
        AxisLayout {
            align: self.col_align,
            block: self.block_height,
            cut: self.col_cut,
            stride: self.col_stride(),
        }
    }

    /// Layout of the column indices
    pub fn row_layout(&self) -> AxisLayout {
        AxisLayout {
            align: self.row_align,
            block: self.block_width,
            cut: self.row_cut,
            stride: self.row_stride(),
        }
    }

    /// Rank in the column communicator owning row `i`
    pub fn row_owner(&self, i: usize) -> usize {
        self.col_layout().owner(i)
    }
    /// Rank in the row communicator owning column `j`
    pub fn col_owner(&self, j: usize) -> usize {
        self.row_layout().owner(j)
    }
    /// Rank in the distribution communicator owning entry `(i, j)`
    pub fn owner(&self, i: usize, j: usize) -> usize {
        self.row_owner(i) + self.col_owner(j) * self.col_stride()
    }

    /// Number of local rows with global index below `i`
    pub fn local_row_offset(&self, i: usize) -> usize {
        if !self.participating() {
            return 0;
        }
        local_length(
            i,
            self.col_shift,
            self.block_height,
            self.col_cut,
            self.col_stride(),
        )
    }
    /// Number of local columns with global index below `j`
    pub fn local_col_offset(&self, j: usize) -> usize {
        if !self.participating() {
            return 0;
        }
        local_length(
            j,
            self.row_shift,
            self.block_width,
            self.row_cut,
            self.row_stride(),
        )
    }

    /// Global index of local row `i_loc`
    pub fn global_row(&self, i_loc: usize) -> usize {
        global_index(
            i_loc,
            self.col_shift,
            self.block_height,
            self.col_cut,
            self.col_stride(),
        )
    }
    /// Global index of local column `j_loc`
    pub fn global_col(&self, j_loc: usize) -> usize {
        global_index(
            j_loc,
            self.row_shift,
            self.block_width,
            self.row_cut,
            self.row_stride(),
        )
    }

    /// Is row `i` stored by this process?
    pub fn is_local_row(&self, i: usize) -> bool {
        self.participating() && self.row_owner(i) == self.col_rank()
    }
    /// Is column `j` stored by this process?
    pub fn is_local_col(&self, j: usize) -> bool {
        self.participating() && self.col_owner(j) == self.row_rank()
    }
    /// Is entry `(i, j)` stored by this process?
    pub fn is_local(&self, i: usize, j: usize) -> bool {
        self.is_local_row(i) && self.is_local_col(j)
    }

    /// Local index of row `i`
    pub fn local_row(&self, i: usize) -> Result<usize> {
        if !self.is_local_row(i) {
            return Err(Error::InvalidArgument(format!("row {i} is not stored locally")).report());
        }
        Ok(self.local_row_offset(i))
    }
    /// Local index of column `j`
    pub fn local_col(&self, j: usize) -> Result<usize> {
        if !self.is_local_col(j) {
            return Err(
                Error::InvalidArgument(format!("column {j} is not stored locally")).report(),
            );
        }
        Ok(self.local_col_offset(j))
    }

    // Storage

    /// The local share
    pub fn locked_matrix(&self) -> &LocalMatrix<'a, T> {
        &self.matrix
    }
    /// The local share for writing
    pub fn matrix_mut(&mut self) -> Result<&mut LocalMatrix<'a, T>> {
        self.assert_not_locked()?;
        Ok(&mut self.matrix)
    }
    /// The local buffer
    pub fn locked_buffer(&self) -> &[T] {
        self.matrix.data()
    }
    /// The local buffer for writing
    pub fn buffer(&mut self) -> Result<&mut [T]> {
        self.assert_not_locked()?;
        Ok(self.matrix.data_mut())
    }

    // Global entry access

    /// Entry `(i, j)`, observed by every process of the grid.
    ///
    /// Collective over the grid.
    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        self.assert_valid_entry(i, j)?;
        if !self.grid.participating() {
            return Err(Error::NotParticipating.report());
        }
        let mut value = T::default();
        if self.participating() {
            let owner = self.owner(i, j);
            if owner == self.dist_rank() {
                value = self.get_local(self.local_row_offset(i), self.local_col_offset(j));
            }
            value = self.dist_comm().broadcast_value(value, owner);
        }
        if self.dist.restricted_by_cross() {
            value = self.cross_comm().broadcast_value(value, self.root);
        }
        Ok(value)
    }

    /// Overwrite entry `(i, j)` on the processes storing it.
    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.assert_valid_entry(i, j)?;
        self.assert_not_locked()?;
        if self.is_local(i, j) {
            let (i_loc, j_loc) = (self.local_row_offset(i), self.local_col_offset(j));
            self.matrix.set(i_loc, j_loc, value);
        }
        Ok(())
    }

    /// Add to entry `(i, j)` on the processes storing it.
    pub fn update(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.assert_valid_entry(i, j)?;
        self.assert_not_locked()?;
        if self.is_local(i, j) {
            let (i_loc, j_loc) = (self.local_row_offset(i), self.local_col_offset(j));
            self.matrix.update(i_loc, j_loc, value);
        }
        Ok(())
    }

    /// Overwrite an entry
    pub fn set_entry(&mut self, entry: Entry<T>) -> Result<()> {
        self.set(entry.i, entry.j, entry.value)
    }

    /// Add to an entry
    pub fn update_entry(&mut self, entry: Entry<T>) -> Result<()> {
        self.update(entry.i, entry.j, entry.value)
    }

    // Local entry access

    /// Local entry `(i_loc, j_loc)`
    pub fn get_local(&self, i_loc: usize, j_loc: usize) -> T {
        self.matrix.get(i_loc, j_loc)
    }
    /// Overwrite local entry `(i_loc, j_loc)`. Panics for a locked view.
    pub fn set_local(&mut self, i_loc: usize, j_loc: usize, value: T) {
        self.matrix.set(i_loc, j_loc, value)
    }
    /// Add to local entry `(i_loc, j_loc)`. Panics for a locked view.
    pub fn update_local(&mut self, i_loc: usize, j_loc: usize, value: T) {
        self.matrix.update(i_loc, j_loc, value)
    }

    // Checks

    /// Fail for a locked view.
    pub fn assert_not_locked(&self) -> Result<()> {
        if self.locked() {
            Err(Error::Locked.report())
        } else {
            Ok(())
        }
    }

    /// Fail if the matrix holds data.
    pub fn assert_not_storing_data(&self) -> Result<()> {
        if self.height > 0 || self.width > 0 || self.matrix.allocated_memory() > 0 {
            Err(Error::InvalidArgument("matrix is already storing data".to_string()).report())
        } else {
            Ok(())
        }
    }

    /// Fail unless `(i, j)` lies inside the matrix.
    pub fn assert_valid_entry(&self, i: usize, j: usize) -> Result<()> {
        if i >= self.height || j >= self.width {
            Err(Error::OutOfRange {
                i,
                j,
                height: self.height,
                width: self.width,
            }
            .report())
        } else {
            Ok(())
        }
    }

    /// Fail unless the `height x width` block at `(i, j)` lies inside the matrix.
    pub fn assert_valid_submatrix(&self, i: usize, j: usize, height: usize, width: usize) -> Result<()> {
        if i + height > self.height || j + width > self.width {
            Err(Error::OutOfRange {
                i: i + height,
                j: j + width,
                height: self.height,
                width: self.width,
            }
            .report())
        } else {
            Ok(())
        }
    }

    /// Fail unless `other` has the same size.
    pub fn assert_same_size<U: Element>(&self, other: &DistMatrix<'_, U, C>) -> Result<()> {
        if (self.height, self.width) != (other.height, other.width) {
            Err(Error::SizeMismatch {
                expected: (self.height, self.width),
                found: (other.height, other.width),
            }
            .report())
        } else {
            Ok(())
        }
    }

    /// Fail unless `grid` is the grid of this matrix.
    pub fn assert_same_grid(&self, grid: GridId) -> Result<()> {
        if grid != self.grid.id() {
            Err(Error::GridMismatch.report())
        } else {
            Ok(())
        }
    }
}

impl<T: Scalar, C: Comm> DistMatrix<'_, T, C> {
    /// Fail for real scalar types.
    pub fn complain_if_real(&self) -> Result<()> {
        if T::IS_COMPLEX {
            Ok(())
        } else {
            Err(Error::InvalidArgument("called complex-only routine with real data".to_string())
                .report())
        }
    }

    /// Real part of entry `(i, j)`. Collective over the grid.
    pub fn get_real_part(&self, i: usize, j: usize) -> Result<Base<T>> {
        Ok(self.get(i, j)?.re())
    }

    /// Imaginary part of entry `(i, j)`. Collective over the grid.
    pub fn get_imag_part(&self, i: usize, j: usize) -> Result<Base<T>> {
        Ok(self.get(i, j)?.im())
    }

    fn local_entry(&mut self, i: usize, j: usize) -> Result<Option<(usize, usize)>> {
        self.assert_valid_entry(i, j)?;
        self.assert_not_locked()?;
        Ok(self
            .is_local(i, j)
            .then(|| (self.local_row_offset(i), self.local_col_offset(j))))
    }

    /// Overwrite the real part of entry `(i, j)` on the processes storing it.
    pub fn set_real_part(&mut self, i: usize, j: usize, value: Base<T>) -> Result<()> {
        if let Some((i_loc, j_loc)) = self.local_entry(i, j)? {
            self.matrix.set_real_part(i_loc, j_loc, value);
        }
        Ok(())
    }

    /// Overwrite the imaginary part of entry `(i, j)` on the processes storing it.
    pub fn set_imag_part(&mut self, i: usize, j: usize, value: Base<T>) -> Result<()> {
        self.complain_if_real()?;
        if let Some((i_loc, j_loc)) = self.local_entry(i, j)? {
            self.matrix.set_imag_part(i_loc, j_loc, value);
        }
        Ok(())
    }

    /// Add to the real part of entry `(i, j)` on the processes storing it.
    pub fn update_real_part(&mut self, i: usize, j: usize, value: Base<T>) -> Result<()> {
        if let Some((i_loc, j_loc)) = self.local_entry(i, j)? {
            self.matrix.update_real_part(i_loc, j_loc, value);
        }
        Ok(())
    }

    /// Add to the imaginary part of entry `(i, j)` on the processes storing it.
    pub fn update_imag_part(&mut self, i: usize, j: usize, value: Base<T>) -> Result<()> {
        self.complain_if_real()?;
        if let Some((i_loc, j_loc)) = self.local_entry(i, j)? {
            self.matrix.update_imag_part(i_loc, j_loc, value);
        }
        Ok(())
    }

    /// Drop the imaginary part of entry `(i, j)` on the processes storing it.
    pub fn make_real(&mut self, i: usize, j: usize) -> Result<()> {
        if let Some((i_loc, j_loc)) = self.local_entry(i, j)? {
            self.matrix.make_real(i_loc, j_loc);
        }
        Ok(())
    }

    /// Conjugate entry `(i, j)` on the processes storing it.
    pub fn conjugate(&mut self, i: usize, j: usize) -> Result<()> {
        if let Some((i_loc, j_loc)) = self.local_entry(i, j)? {
            self.matrix.conjugate(i_loc, j_loc);
        }
        Ok(())
    }

    /// Real part of local entry `(i_loc, j_loc)`
    pub fn get_local_real_part(&self, i_loc: usize, j_loc: usize) -> Base<T> {
        self.matrix.get_real_part(i_loc, j_loc)
    }
    /// Imaginary part of local entry `(i_loc, j_loc)`
    pub fn get_local_imag_part(&self, i_loc: usize, j_loc: usize) -> Base<T> {
        self.matrix.get_imag_part(i_loc, j_loc)
    }
    /// Overwrite the real part of local entry `(i_loc, j_loc)`
    pub fn set_local_real_part(&mut self, i_loc: usize, j_loc: usize, value: Base<T>) {
        self.matrix.set_real_part(i_loc, j_loc, value)
    }
    /// Overwrite the imaginary part of local entry `(i_loc, j_loc)`
    pub fn set_local_imag_part(&mut self, i_loc: usize, j_loc: usize, value: Base<T>) {
        self.matrix.set_imag_part(i_loc, j_loc, value)
    }
    /// Add to the real part of local entry `(i_loc, j_loc)`
    pub fn update_local_real_part(&mut self, i_loc: usize, j_loc: usize, value: Base<T>) {
        self.matrix.update_real_part(i_loc, j_loc, value)
    }
    /// Add to the imaginary part of local entry `(i_loc, j_loc)`
    pub fn update_local_imag_part(&mut self, i_loc: usize, j_loc: usize, value: Base<T>) {
        self.matrix.update_imag_part(i_loc, j_loc, value)
    }
    /// Drop the imaginary part of local entry `(i_loc, j_loc)`
    pub fn make_local_real(&mut self, i_loc: usize, j_loc: usize) {
        self.matrix.make_real(i_loc, j_loc)
    }
    /// Conjugate local entry `(i_loc, j_loc)`
    pub fn conjugate_local(&mut self, i_loc: usize, j_loc: usize) {
        self.matrix.conjugate(i_loc, j_loc)
    }

    /// Multiply every entry by `alpha`.
    pub fn scale(&mut self, alpha: T) -> Result<()> {
        self.assert_not_locked()?;
        self.matrix.scale(alpha);
        Ok(())
    }
}

impl<T: Scalar, C: Comm> MulAssign<T> for DistMatrix<'_, T, C> {
    /// Same as [`DistMatrix::scale`].
    ///
    /// # Panics
    ///
    /// Panics for a locked view.
    fn mul_assign(&mut self, alpha: T) {
        if let Err(err) = self.scale(alpha) {
            panic!("Cannot scale the matrix: {err}");
        }
    }
}
