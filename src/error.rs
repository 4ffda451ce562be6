//! Error types for the solver and its boundary protocol.

use thiserror::Error;

use crate::boundary::{BoundaryKind, FaceState};
use crate::lattice::{Face, LatticeKind};

#[derive(Debug, Error, PartialEq)]
pub enum BoundaryError {
    #[error("{kind:?} boundary is not implemented on the {face} face")]
    Unsupported { face: Face, kind: BoundaryKind },

    #[error("the {face} face does not exist on a {lattice:?} lattice")]
    FaceNotInLattice { face: Face, lattice: LatticeKind },

    #[error("no boundary condition assigned to the {face} face")]
    Unassigned { face: Face },

    #[error("faces {first} and {second} cannot be paired")]
    InvalidPairing { first: Face, second: Face },

    #[error("direction {direction} was not captured on the {face} face")]
    MissingDirection { face: Face, direction: usize },

    #[error("{face} face is {found:?}, expected {expected:?}")]
    OutOfOrder {
        face: Face,
        expected: FaceState,
        found: FaceState,
    },

    #[error("{face} face was prepared as {found:?}, operation needs {expected:?}")]
    KindMismatch {
        face: Face,
        expected: BoundaryKind,
        found: BoundaryKind,
    },

    #[error("{face} face has {expected} sites, got {found} values")]
    SliceLength {
        face: Face,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("boundary protocol failed: {0}")]
    Boundary(#[from] BoundaryError),

    #[error("relaxation time must be positive, got {0}")]
    InvalidTau(f64),

    #[error("medium is {medium:?} but fluid is {fluid:?}")]
    ShapeMismatch {
        medium: (usize, usize, usize),
        fluid: (usize, usize, usize),
    },

    #[error("grid {nx}x{ny}x{nz} does not fit a {lattice:?} lattice")]
    UnsupportedGrid {
        nx: usize,
        ny: usize,
        nz: usize,
        lattice: LatticeKind,
    },

    #[error("diagnostic output failed: {0}")]
    Output(#[from] OutputError),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("layer {layer} is outside a field with {depth} layers")]
    LayerOutOfRange { layer: usize, depth: usize },
}

pub type Result<T> = std::result::Result<T, SolverError>;
