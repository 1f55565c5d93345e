//! Error kinds

use crate::dist::{Axis, Dist};

/// Errors raised by distributed matrix operations.
///
/// All of them are fatal for the process group: the distributed invariants cannot be
/// restored once one rank has stopped taking part in collectives.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A square matrix was required.
    #[error("Matrix must be square, got {height} x {width}")]
    NotSquare {
        /// Height of the offending matrix
        height: usize,
        /// Width of the offending matrix
        width: usize,
    },
    /// Operands live on different grids.
    #[error("Operands are not distributed over the same grid")]
    GridMismatch,
    /// A constrained alignment was asked to change.
    #[error("{axis} alignment is constrained to {current}, cannot realign to {requested}")]
    AlignmentMismatch {
        /// The axis being realigned
        axis: Axis,
        /// The current (constrained) alignment
        current: usize,
        /// The requested alignment
        requested: usize,
    },
    /// The distributions of two matrices have no alignment relationship.
    #[error("Nonsensical alignment of a {axis} distributed as {this} with [{col}, {row}]")]
    NonsensicalAlignment {
        /// The axis being aligned
        axis: Axis,
        /// The tag of the axis being aligned
        this: Dist,
        /// Column tag of the descriptor aligned with
        col: Dist,
        /// Row tag of the descriptor aligned with
        row: Dist,
    },
    /// Write access to a locked view.
    #[error("Attempted to modify a locked view")]
    Locked,
    /// A global or local index lies outside the matrix.
    #[error("Entry ({i}, {j}) is out of bounds of a {height} x {width} matrix")]
    OutOfRange {
        /// Row index
        i: usize,
        /// Column index
        j: usize,
        /// Matrix height
        height: usize,
        /// Matrix width
        width: usize,
    },
    /// A view can only be resized to its current shape.
    #[error("Cannot resize a {height} x {width} view to {new_height} x {new_width}")]
    ViewResize {
        /// Current height
        height: usize,
        /// Current width
        width: usize,
        /// Requested height
        new_height: usize,
        /// Requested width
        new_width: usize,
    },
    /// The tag pair does not name a distribution.
    #[error("[{0}, {1}] is not a legal distribution")]
    IllegalDistribution(Dist, Dist),
    /// The distributions of the operands cannot be combined.
    #[error("Incompatible distributions: {0}")]
    IncompatibleDistribution(String),
    /// Operand dimensions disagree.
    #[error("Size mismatch: expected {expected:?}, found {found:?}")]
    SizeMismatch {
        /// Expected (height, width)
        expected: (usize, usize),
        /// Actual (height, width)
        found: (usize, usize),
    },
    /// The requested grid shape does not fit the communicator.
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),
    /// Any other contract violation on an argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A non-positive pivot was met during a Cholesky factorization.
    #[error("Matrix is not positive definite: pivot {index} has value {value}")]
    NotPositiveDefinite {
        /// Global index of the pivot
        index: usize,
        /// Real part of the pivot before the square root
        value: f64,
    },
    /// A collective was called from a process that holds no share of the grid.
    #[error("Process does not participate in the grid")]
    NotParticipating,
}

impl Error {
    /// Send the error to the diagnostic sink and hand it back.
    pub(crate) fn report(self) -> Self {
        log::error!("{self}");
        self
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        let e = Error::NotSquare {
            height: 3,
            width: 4,
        };
        assert_eq!(e.to_string(), "Matrix must be square, got 3 x 4");

        let e = Error::IllegalDistribution(Dist::Mc, Dist::Mc);
        assert_eq!(e.to_string(), "[MC, MC] is not a legal distribution");

        let e = Error::AlignmentMismatch {
            axis: Axis::Col,
            current: 1,
            requested: 0,
        };
        assert_eq!(
            e.to_string(),
            "column alignment is constrained to 1, cannot realign to 0"
        );
    }
}
