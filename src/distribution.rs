//! Legal distribution pairs
//!
//! Everything that depends on the pair of tags, rather than on each tag separately, lives
//! here: which pairs are legal and which communicators a pair distributes, replicates
//! and restricts over.
use crate::comm::Comm;
use crate::dist::Dist;
use crate::error::{Error, Result};
use crate::grid::{CommKind, Coords, Grid};
use std::fmt;

/// A `(column, row)` pair of distribution tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Distribution {
    /// Distribution of the row indices
    pub col: Dist,
    /// Distribution of the column indices
    pub row: Dist,
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.col, self.row)
    }
}

impl Distribution {
    /// The canonical two-dimensional distribution
    pub const MC_MR: Distribution = Distribution {
        col: Dist::Mc,
        row: Dist::Mr,
    };
    /// Every process holds everything
    pub const STAR_STAR: Distribution = Distribution {
        col: Dist::Star,
        row: Dist::Star,
    };
    /// A single process holds everything
    pub const CIRC_CIRC: Distribution = Distribution {
        col: Dist::Circ,
        row: Dist::Circ,
    };
    /// Rows dealt out over the whole grid, column-major
    pub const VC_STAR: Distribution = Distribution {
        col: Dist::Vc,
        row: Dist::Star,
    };
    /// Columns dealt out over the whole grid, row-major
    pub const STAR_VR: Distribution = Distribution {
        col: Dist::Star,
        row: Dist::Vr,
    };

    /// A legal pair
    pub fn new(col: Dist, row: Dist) -> Result<Self> {
        if Self::is_legal(col, row) {
            Ok(Self { col, row })
        } else {
            Err(Error::IllegalDistribution(col, row).report())
        }
    }

    /// Does the pair name a distribution?
    pub fn is_legal(col: Dist, row: Dist) -> bool {
        use Dist::{Circ, Mc, Md, Mr, Star, Vc, Vr};
        matches!(
            (col, row),
            (Circ, Circ)
                | (Star, Star)
                | (Mc, Mr)
                | (Mr, Mc)
                | (Mc | Mr | Md | Vc | Vr, Star)
                | (Star, Mc | Mr | Md | Vc | Vr)
        )
    }

    /// Every legal pair
    pub fn all() -> impl Iterator<Item = Distribution> {
        Dist::ALL.into_iter().flat_map(|col| {
            Dist::ALL
                .into_iter()
                .filter(move |&row| Self::is_legal(col, row))
                .map(move |row| Distribution { col, row })
        })
    }

    /// The transposed pair
    pub fn transpose(self) -> Self {
        Self {
            col: self.row,
            row: self.col,
        }
    }

    /// Communicator over which each entry has a unique owner
    pub fn dist_comm(self) -> CommKind {
        use Dist::{Mc, Md, Mr, Star, Vc, Vr};
        match (self.col, self.row) {
            (Mc, Mr) | (Vc, _) | (_, Vc) => CommKind::Vc,
            (Mr, Mc) | (Vr, _) | (_, Vr) => CommKind::Vr,
            (Mc, Star) | (Star, Mc) => CommKind::Mc,
            (Mr, Star) | (Star, Mr) => CommKind::Mr,
            (Md, _) | (_, Md) => CommKind::Md,
            _ => CommKind::SelfComm,
        }
    }

    /// Communicator over which the local data is replicated
    pub fn redundant_comm(self) -> CommKind {
        use Dist::{Mc, Mr, Star};
        match (self.col, self.row) {
            (Mc, Star) | (Star, Mc) => CommKind::Mr,
            (Mr, Star) | (Star, Mr) => CommKind::Mc,
            (Star, Star) => CommKind::Vc,
            _ => CommKind::SelfComm,
        }
    }

    /// Communicator selecting which processes hold data at all
    pub fn cross_comm(self) -> CommKind {
        match (self.col, self.row) {
            (Dist::Md, _) | (_, Dist::Md) => CommKind::MdPerp,
            (Dist::Circ, Dist::Circ) => CommKind::Vc,
            _ => CommKind::SelfComm,
        }
    }

    /// Are data restricted to the processes at the root of the cross communicator?
    pub fn restricted_by_cross(self) -> bool {
        self.cross_comm() != CommKind::SelfComm
    }

    /// Rank of the process at `coords` in the cross communicator
    pub fn cross_rank(self, coords: &Coords) -> usize {
        match self.cross_comm() {
            CommKind::MdPerp => coords.path,
            CommKind::Vc => coords.vc,
            _ => 0,
        }
    }

    /// Rank of the process at `coords` in the redundant communicator
    pub fn redundant_rank(self, coords: &Coords) -> usize {
        match self.redundant_comm() {
            CommKind::Mc => coords.mc,
            CommKind::Mr => coords.mr,
            CommKind::Vc => coords.vc,
            _ => 0,
        }
    }

    /// Rank in the distribution communicator of the owner of `(col_owner, row_owner)`
    pub fn dist_rank<C: Comm>(self, grid: &Grid<C>, col_owner: usize, row_owner: usize) -> usize {
        col_owner + row_owner * grid.stride(self.col)
    }
}

/// The processes holding each `(column owner, row owner)` cell of a distribution.
///
/// Holders are listed by increasing column-major rank; the first of them is the one with
/// redundant rank zero.
#[derive(Debug, Clone)]
pub struct OwnerMap {
    col_stride: usize,
    holders: Vec<Vec<usize>>,
}

impl OwnerMap {
    /// Tabulate the holders of `dist` with cross root `root` on `grid`.
    pub fn new<C: Comm>(grid: &Grid<C>, dist: Distribution, root: usize) -> Self {
        let col_stride = grid.stride(dist.col);
        let row_stride = grid.stride(dist.row);
        let mut holders = vec![Vec::new(); col_stride * row_stride];
        for vc in 0..grid.size() {
            let coords = grid.coords(vc);
            if dist.cross_rank(&coords) != root {
                continue;
            }
            let col = grid.dist_rank(dist.col, &coords);
            let row = grid.dist_rank(dist.row, &coords);
            holders[col + row * col_stride].push(vc);
        }
        Self {
            col_stride,
            holders,
        }
    }

    /// Column-major ranks holding the cell
    pub fn holders(&self, col_owner: usize, row_owner: usize) -> &[usize] {
        &self.holders[col_owner + row_owner * self.col_stride]
    }

    /// The holder answering for the cell
    pub fn designated(&self, col_owner: usize, row_owner: usize) -> usize {
        self.holders(col_owner, row_owner)[0]
    }
}
