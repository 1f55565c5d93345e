//! Distribution tags, descriptors and the index algebra of one axis
//!
//! An axis of length `n` is cut into blocks of `block` consecutive indices, the first of
//! which is shortened by `cut`. Blocks are dealt out cyclically over `stride` processes,
//! starting with the process at `align`. With `block = 1` and `cut = 0` this is the
//! element-cyclic ("elemental") distribution.
use crate::grid::GridId;
use std::fmt;

/// How one axis of a matrix is spread over the process grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dist {
    /// Only the root process holds the axis.
    Circ,
    /// Every process holds the whole axis.
    Star,
    /// Distributed over the processes of a grid column.
    Mc,
    /// Distributed over the processes of a grid row.
    Mr,
    /// Distributed over the processes of a grid diagonal.
    Md,
    /// Distributed over all processes in column-major order.
    Vc,
    /// Distributed over all processes in row-major order.
    Vr,
}

impl Dist {
    /// All tags
    pub const ALL: [Dist; 7] = [
        Dist::Circ,
        Dist::Star,
        Dist::Mc,
        Dist::Mr,
        Dist::Md,
        Dist::Vc,
        Dist::Vr,
    ];

    /// The tag holding the whole axis on every process of the group.
    pub fn collected(self) -> Dist {
        match self {
            Dist::Circ => Dist::Circ,
            _ => Dist::Star,
        }
    }

    /// The coarser tag whose communicator contains the communicator of this tag.
    pub fn partial(self) -> Dist {
        match self {
            Dist::Vc => Dist::Mc,
            Dist::Vr => Dist::Mr,
            d => d,
        }
    }

    /// The complementary tag that rebuilds [`Dist::partial`] from this tag.
    pub fn partial_union(self) -> Dist {
        match self {
            Dist::Vc => Dist::Mr,
            Dist::Vr => Dist::Mc,
            _ => Dist::Star,
        }
    }

    /// Is every index held by a single rank of the tag's communicator?
    pub fn is_distributed(self) -> bool {
        !matches!(self, Dist::Star | Dist::Circ)
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dist::Circ => "CIRC",
            Dist::Star => "STAR",
            Dist::Mc => "MC",
            Dist::Mr => "MR",
            Dist::Md => "MD",
            Dist::Vc => "VC",
            Dist::Vr => "VR",
        };
        write!(f, "{name}")
    }
}

/// Matrix axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The column axis (row indices)
    Col,
    /// The row axis (column indices)
    Row,
}

impl Axis {
    /// The other axis
    pub fn other(self) -> Axis {
        match self {
            Axis::Col => Axis::Row,
            Axis::Row => Axis::Col,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Col => write!(f, "column"),
            Axis::Row => write!(f, "row"),
        }
    }
}

/// Shift of `rank` relative to the alignment `align`.
pub fn shift(rank: usize, align: usize, stride: usize) -> usize {
    (rank + stride - align % stride) % stride
}

/// Rank owning global index `i`.
pub fn owner(i: usize, align: usize, block: usize, cut: usize, stride: usize) -> usize {
    ((i + cut) / block + align) % stride
}

/// Number of the first `n` indices held by the process with the given shift.
pub fn local_length(n: usize, shift: usize, block: usize, cut: usize, stride: usize) -> usize {
    let total = n + cut;
    let full = total / block;
    let remainder = total % block;
    let owned_blocks = if full > shift {
        (full - shift - 1) / stride + 1
    } else {
        0
    };
    let mut length = owned_blocks * block;
    if remainder > 0 && full % stride == shift {
        length += remainder;
    }
    if shift == 0 {
        length -= cut.min(length);
    }
    length
}

/// Local index of global index `i` on its owner.
pub fn local_offset(i: usize, shift: usize, block: usize, cut: usize, stride: usize) -> usize {
    local_length(i, shift, block, cut, stride)
}

/// Global index of local index `i_loc` of the process with the given shift.
pub fn global_index(i_loc: usize, shift: usize, block: usize, cut: usize, stride: usize) -> usize {
    let padded = if shift == 0 { i_loc + cut } else { i_loc };
    let local_block = padded / block;
    let offset = padded % block;
    (shift + local_block * stride) * block + offset - cut
}

/// The layout of one axis: everything but the length and the local shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisLayout {
    /// Rank holding the first block
    pub align: usize,
    /// Block size
    pub block: usize,
    /// Shortening of the first block
    pub cut: usize,
    /// Number of ranks the axis is spread over
    pub stride: usize,
}

impl AxisLayout {
    /// Shift of `rank` in this layout
    pub fn shift(&self, rank: usize) -> usize {
        shift(rank, self.align, self.stride)
    }

    /// Rank owning global index `i`
    pub fn owner(&self, i: usize) -> usize {
        owner(i, self.align, self.block, self.cut, self.stride)
    }

    /// Number of indices among the first `n` held by `rank`
    pub fn local_length(&self, n: usize, rank: usize) -> usize {
        local_length(n, self.shift(rank), self.block, self.cut, self.stride)
    }

    /// Local index of `i` on its owner
    pub fn local_offset(&self, i: usize) -> usize {
        local_offset(
            i,
            self.shift(self.owner(i)),
            self.block,
            self.cut,
            self.stride,
        )
    }

    /// Global index of local index `i_loc` on `rank`
    pub fn global_index(&self, i_loc: usize, rank: usize) -> usize {
        global_index(i_loc, self.shift(rank), self.block, self.cut, self.stride)
    }

    /// The layout of the sub-axis starting at global index `i0`.
    pub fn offset_by(&self, i0: usize) -> AxisLayout {
        AxisLayout {
            align: self.owner(i0),
            block: self.block,
            cut: (i0 + self.cut) % self.block,
            stride: self.stride,
        }
    }
}

/// Full description of how a matrix is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistData {
    /// Distribution of the row indices
    pub col_dist: Dist,
    /// Distribution of the column indices
    pub row_dist: Dist,
    /// Block height
    pub block_height: usize,
    /// Block width
    pub block_width: usize,
    /// Column alignment
    pub col_align: usize,
    /// Row alignment
    pub row_align: usize,
    /// Cut of the first block row
    pub col_cut: usize,
    /// Cut of the first block column
    pub row_cut: usize,
    /// Root within the cross communicator
    pub root: usize,
    /// Grid the matrix lives on
    pub grid: GridId,
}

impl DistData {
    /// Is this an element-cyclic descriptor?
    pub fn is_elemental(&self) -> bool {
        self.block_height == 1 && self.block_width == 1 && self.col_cut == 0 && self.row_cut == 0
    }

    /// Tag of the given axis
    pub fn dist(&self, axis: Axis) -> Dist {
        match axis {
            Axis::Col => self.col_dist,
            Axis::Row => self.row_dist,
        }
    }

    /// Alignment of the given axis
    pub fn align(&self, axis: Axis) -> usize {
        match axis {
            Axis::Col => self.col_align,
            Axis::Row => self.row_align,
        }
    }

    /// Block size of the given axis
    pub fn block(&self, axis: Axis) -> usize {
        match axis {
            Axis::Col => self.block_height,
            Axis::Row => self.block_width,
        }
    }

    /// Cut of the given axis
    pub fn cut(&self, axis: Axis) -> usize {
        match axis {
            Axis::Col => self.col_cut,
            Axis::Row => self.row_cut,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_elemental_length() {
        // ceil((n - shift) / stride), clipped at zero
        for stride in 1usize..5 {
            for shift in 0..stride {
                for n in 0..20 {
                    let expected = if n > shift {
                        (n - shift).div_ceil(stride)
                    } else {
                        0
                    };
                    assert_eq!(local_length(n, shift, 1, 0, stride), expected);
                }
            }
        }
    }

    #[test]
    fn test_lengths_partition_axis() {
        for stride in 1..5 {
            for block in 1..4 {
                for cut in 0..block {
                    for n in 0..25 {
                        let total = (0..stride)
                            .map(|s| local_length(n, s, block, cut, stride))
                            .sum::<usize>();
                        assert_eq!(total, n, "n={n} block={block} cut={cut} stride={stride}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_owner_and_offset_roundtrip() {
        for stride in 1..5 {
            for align in 0..stride {
                for block in 1..4 {
                    for cut in 0..block {
                        let layout = AxisLayout {
                            align,
                            block,
                            cut,
                            stride,
                        };
                        for i in 0..30 {
                            let rank = layout.owner(i);
                            let i_loc = layout.local_offset(i);
                            assert_eq!(layout.global_index(i_loc, rank), i);
                            assert!(i_loc < layout.local_length(30, rank));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_block_cyclic_example() {
        // Blocks of 3 with the first block cut by 1 over 2 ranks:
        // indices 0,1 | 2,3,4 | 5,6,7 | 8,9
        let layout = AxisLayout {
            align: 0,
            block: 3,
            cut: 1,
            stride: 2,
        };
        let owners = (0..10).map(|i| layout.owner(i)).collect::<Vec<_>>();
        assert_eq!(owners, vec![0, 0, 1, 1, 1, 0, 0, 0, 1, 1]);
        assert_eq!(layout.local_length(10, 0), 5);
        assert_eq!(layout.local_length(10, 1), 5);
        assert_eq!(layout.local_offset(6), 3);
        assert_eq!(layout.global_index(2, 0), 5);
    }

    #[test]
    fn test_offset_by() {
        let layout = AxisLayout {
            align: 1,
            block: 2,
            cut: 0,
            stride: 3,
        };
        let sub = layout.offset_by(5);
        for i in 0..10 {
            assert_eq!(sub.owner(i), layout.owner(i + 5));
        }
    }

    #[test]
    fn test_tag_relations() {
        assert_eq!(Dist::Vc.partial(), Dist::Mc);
        assert_eq!(Dist::Vr.partial(), Dist::Mr);
        assert_eq!(Dist::Md.partial(), Dist::Md);
        assert_eq!(Dist::Vc.partial_union(), Dist::Mr);
        assert_eq!(Dist::Vr.partial_union(), Dist::Mc);
        assert_eq!(Dist::Mc.partial_union(), Dist::Star);
        assert_eq!(Dist::Circ.collected(), Dist::Circ);
        assert_eq!(Dist::Md.collected(), Dist::Star);
        assert_eq!(Dist::Vr.to_string(), "VR");
    }
}
