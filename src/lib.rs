//! Distributed dense matrices
//!
//! A matrix is split element-wise (or block-wise) across a two-dimensional grid of
//! processes. The distribution of the rows and of the columns is each described by a
//! [`dist::Dist`] tag, and the pair of tags together with alignments, block sizes and a
//! root forms a [`dist::DistData`] descriptor. Algorithms are written against
//! [`dist_matrix::DistMatrix`] and do not depend on how a matrix is spread out, except
//! through the [`redist`] engine that moves data between descriptors.
//!
//! Processes communicate through the [`comm::Comm`] trait. The in-process backend
//! [`comm::ThreadUniverse`] runs every rank as a thread; the `mpi` feature adds a backend
//! built on the `mpi` crate.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

pub mod blas_like;
pub mod cholesky;
pub mod comm;
pub mod dist;
pub mod dist_matrix;
pub mod distribution;
pub mod error;
pub mod grid;
pub mod local_matrix;
pub mod matrices;
pub mod redist;
pub mod types;

pub use comm::{Comm, ThreadComm, ThreadUniverse};
pub use dist::{Dist, DistData};
pub use dist_matrix::DistMatrix;
pub use distribution::Distribution;
pub use error::{Error, Result};
pub use grid::Grid;
pub use local_matrix::LocalMatrix;
pub use types::{Element, Entry, Payload, Scalar, ViewType};
