pub mod boundary;
pub mod config;
pub mod distribution;
pub mod error;
pub mod field;
pub mod fluid;
pub mod geometry;
pub mod lattice;
pub mod output;
pub mod solver;

pub use boundary::{BoundaryCondition, BoundaryKind, BoundaryManager, BoundarySet, FaceState, SliceMap};
pub use config::Config;
pub use distribution::Populations;
pub use error::{BoundaryError, OutputError, SolverError};
pub use field::{Field, Shape};
pub use fluid::Fluid;
pub use geometry::Medium;
pub use lattice::{Axis, Face, Lattice, LatticeKind};
pub use output::{Diagnostics, FieldName, HeatMapWriter, VtkWriter};
pub use solver::{DiagnosticSink, IterationReport, SrtSolver};

pub type Float = f64;
