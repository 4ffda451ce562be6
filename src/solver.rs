use log::{debug, info, warn};
use rayon::prelude::*;
use crate::boundary::{BoundaryManager, BoundarySet};
use crate::error::{OutputError, Result, SolverError};
use crate::field::Shape;
use crate::fluid::Fluid;
use crate::geometry::Medium;
use crate::lattice::Lattice;
use crate::Float;

/// Receives the solver state at the diagnostic frequency.
pub trait DiagnosticSink {
    fn record(&mut self, iteration: usize, fluid: &Fluid, medium: &Medium)
        -> std::result::Result<(), OutputError>;
}

/// Outcome of one completed iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub total_rho: Float,
}

/// Single-relaxation-time (BGK) solver driving the boundary protocol.
pub struct SrtSolver {
    tau: Float,
    medium: Medium,
    fluid: Fluid,
    boundaries: BoundarySet,
    manager: BoundaryManager,
    has_obstacles: bool,
    iteration: usize,
    output_frequency: usize,
    sink: Option<Box<dyn DiagnosticSink>>,
    scratch: Vec<Float>,
}

impl SrtSolver {
    pub fn new(tau: Float, medium: Medium, fluid: Fluid, boundaries: BoundarySet) -> Result<Self> {
        if !tau.is_finite() || tau <= 0.0 {
            return Err(SolverError::InvalidTau(tau));
        }
        if tau <= 0.5 {
            warn!("tau = {} is at or below the stability limit of 0.5", tau);
        }

        let lattice = fluid.lattice();
        let shape = fluid.shape();
        if medium.shape() != shape {
            return Err(SolverError::ShapeMismatch {
                medium: medium.size(),
                fluid: (shape.nx, shape.ny, shape.nz),
            });
        }
        let too_small = shape.nx < 2 || shape.ny < 2 || (lattice.dim == 3 && shape.nz < 2);
        if too_small || (lattice.dim == 2 && shape.nz != 1) {
            return Err(SolverError::UnsupportedGrid {
                nx: shape.nx,
                ny: shape.ny,
                nz: shape.nz,
                lattice: lattice.kind,
            });
        }
        boundaries.validate(lattice)?;

        let has_obstacles = medium.solid_count() > 0;
        let manager = BoundaryManager::new(lattice, shape).with_medium(&medium);
        info!(
            "SRT solver on {:?} {}x{}x{}, tau = {}, {} solid cells",
            lattice.kind,
            shape.nx,
            shape.ny,
            shape.nz,
            tau,
            medium.solid_count()
        );

        Ok(Self {
            tau,
            medium,
            fluid,
            boundaries,
            manager,
            has_obstacles,
            iteration: 0,
            output_frequency: 0,
            sink: None,
            scratch: Vec::with_capacity(shape.plane_len()),
        })
    }

    /// Hand the state to `sink` every `frequency` iterations.
    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticSink>, frequency: usize) -> Self {
        self.sink = Some(sink);
        self.output_frequency = frequency;
        self
    }

    pub fn tau(&self) -> Float {
        self.tau
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn fluid(&self) -> &Fluid {
        &self.fluid
    }

    pub fn fluid_mut(&mut self) -> &mut Fluid {
        &mut self.fluid
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn boundaries(&self) -> &BoundarySet {
        &self.boundaries
    }

    pub fn lattice(&self) -> &'static Lattice {
        self.fluid.lattice()
    }

    /// Equilibrium populations from the current density and velocity.
    pub fn compute_equilibrium(&mut self) {
        let lattice = self.fluid.lattice();
        let fluid = &mut self.fluid;
        let rho = fluid.rho.as_slice();
        let (vx, vy, vz) = (fluid.vx.as_slice(), fluid.vy.as_slice(), fluid.vz.as_slice());
        fluid
            .feq
            .fields_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(q, field)| {
                for (i, out) in field.as_mut_slice().iter_mut().enumerate() {
                    *out = lattice.equilibrium(q, rho[i], [vx[i], vy[i], vz[i]]);
                }
            });
    }

    /// BGK relaxation `f += (feq - f) / tau`.
    pub fn collide(&mut self) {
        let omega = 1.0 / self.tau;
        let fluid = &mut self.fluid;
        let feq = fluid.feq.fields();
        fluid
            .f
            .fields_mut()
            .par_iter_mut()
            .zip(feq.par_iter())
            .for_each(|(fq, eq)| {
                for (f, &e) in fq.as_mut_slice().iter_mut().zip(eq.as_slice()) {
                    *f += (e - *f) * omega;
                }
            });
    }

    /// Propagate every population one cell along its direction. Only fluid
    /// cells send and receive; a population aimed at an in-grid solid cell
    /// returns to its source in the opposite direction, and one aimed out of
    /// the grid is left to the boundary manager.
    pub fn stream(&mut self) {
        let lattice = self.fluid.lattice();
        let shape = self.fluid.shape();
        let reflections = if self.has_obstacles {
            self.obstacle_reflections()
        } else {
            Vec::new()
        };

        for q in 1..lattice.q {
            let c = lattice.velocities[q];
            let depth = lattice.depth_offset(q);
            let data = self.fluid.f[q].as_mut_slice();
            stream_direction(data, shape, c, depth, &self.medium, &mut self.scratch);
        }

        for (q, idx, value) in reflections {
            self.fluid.f[q].as_mut_slice()[idx] = value;
        }
    }

    fn obstacle_reflections(&self) -> Vec<(usize, usize, Float)> {
        let lattice = self.fluid.lattice();
        let shape = self.fluid.shape();
        let medium = &self.medium;
        let f = &self.fluid.f;
        (0..shape.len())
            .into_par_iter()
            .filter(|&idx| medium.is_fluid_site(shape.site(idx)))
            .flat_map_iter(|idx| {
                let site = shape.site(idx);
                (1..lattice.q).filter_map(move |q| {
                    let target = shape.offset(site, lattice.velocities[q])?;
                    (!medium.is_fluid_site(target))
                        .then(|| (lattice.opposite[q], idx, f[q].as_slice()[idx]))
                })
            })
            .collect()
    }

    /// Seed the populations from the equilibrium of the current macroscopic
    /// fields.
    pub fn initialize(&mut self) -> IterationReport {
        self.compute_equilibrium();
        let Fluid { f, feq, .. } = &mut self.fluid;
        f.copy_from(feq);
        self.fluid.recalculate();
        self.manager.reset();
        self.iteration = 0;
        IterationReport {
            iteration: 0,
            total_rho: self.fluid.total_rho(),
        }
    }

    /// One full iteration: collision, boundary capture, streaming, boundary
    /// transform and write-back, then the macroscopic fields and equilibrium.
    pub fn step(&mut self) -> Result<IterationReport> {
        self.collide();
        if let Err(err) = self.manager.prepare_all(&self.boundaries, &self.fluid.f) {
            self.manager.reset();
            return Err(err.into());
        }
        self.stream();
        let applied = self
            .manager
            .apply_all(&self.boundaries, &self.fluid.f)
            .and_then(|()| self.manager.record_all(&self.boundaries, &mut self.fluid.f));
        if let Err(err) = applied {
            self.manager.reset();
            return Err(err.into());
        }

        self.fluid.recalculate();
        self.compute_equilibrium();
        self.iteration += 1;

        let total_rho = self.fluid.total_rho();
        debug!("Iteration {}: total rho = {}", self.iteration, total_rho);

        if self.output_frequency > 0 && self.iteration % self.output_frequency == 0 {
            if let Some(sink) = self.sink.as_mut() {
                sink.record(self.iteration, &self.fluid, &self.medium)?;
            }
        }

        Ok(IterationReport {
            iteration: self.iteration,
            total_rho,
        })
    }

    /// Initialise and run `iterations` steps; returns the last report.
    pub fn solve(&mut self, iterations: usize) -> Result<IterationReport> {
        let mut report = self.initialize();
        info!(
            "Solving {} iterations, initial total rho = {}",
            iterations, report.total_rho
        );
        for _ in 0..iterations {
            report = self.step()?;
        }
        info!(
            "Finished after {} iterations, total rho = {}",
            report.iteration, report.total_rho
        );
        Ok(report)
    }
}

/// Stream one direction's grid in place. Planes are visited against the
/// depth offset so every source plane is read before it is overwritten;
/// in-plane directions stream through a copy of the plane.
fn stream_direction(
    data: &mut [Float],
    shape: Shape,
    c: [i32; 3],
    depth: i32,
    medium: &Medium,
    scratch: &mut Vec<Float>,
) {
    let plane = shape.plane_len();
    let nz = shape.nz;
    match depth {
        0 => {
            for z in 0..nz {
                let dst = &mut data[z * plane..(z + 1) * plane];
                scratch.clear();
                scratch.extend_from_slice(dst);
                stream_plane(dst, scratch, z, z, shape, c, medium);
            }
        }
        dz if dz > 0 => {
            for z in (1..nz).rev() {
                let (below, rest) = data.split_at_mut(z * plane);
                stream_plane(&mut rest[..plane], &below[(z - 1) * plane..], z, z - 1, shape, c, medium);
            }
        }
        _ => {
            for z in 0..nz.saturating_sub(1) {
                let (head, above) = data.split_at_mut((z + 1) * plane);
                stream_plane(&mut head[z * plane..], &above[..plane], z, z + 1, shape, c, medium);
            }
        }
    }
}

fn stream_plane(
    dst: &mut [Float],
    src: &[Float],
    z_dst: usize,
    z_src: usize,
    shape: Shape,
    c: [i32; 3],
    medium: &Medium,
) {
    let nx = shape.nx;
    let ny = shape.ny as i64;
    dst.par_chunks_mut(nx).enumerate().for_each(|(y, row)| {
        let sy = y as i64 - c[1] as i64;
        if sy < 0 || sy >= ny {
            return;
        }
        let sy = sy as usize;
        for (x, out) in row.iter_mut().enumerate() {
            let sx = x as i64 - c[0] as i64;
            if sx < 0 || sx >= nx as i64 {
                continue;
            }
            let sx = sx as usize;
            if medium.is_fluid(z_dst, y, x) && medium.is_fluid(z_src, sy, sx) {
                *out = src[sx + sy * nx];
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryCondition;
    use crate::lattice::Face;
    use approx::assert_relative_eq;

    fn closed(lattice: &'static Lattice, medium: Medium) -> SrtSolver {
        let (nx, ny, nz) = medium.size();
        let fluid = Fluid::new(lattice, nx, ny, nz);
        let set = BoundarySet::uniform(lattice, BoundaryCondition::BounceBack);
        SrtSolver::new(1.0, medium, fluid, set).unwrap()
    }

    fn fill_numbered(fluid: &mut Fluid) {
        for q in 0..fluid.lattice().q {
            for (i, v) in fluid.f[q].as_mut_slice().iter_mut().enumerate() {
                *v = 1.0 + (q * 100 + i) as Float;
            }
        }
    }

    #[test]
    fn equilibrium_at_rest_is_weighted_density() {
        let mut solver = closed(&Lattice::D3Q19, Medium::fluid(3, 3, 3));
        solver.fluid_mut().set_uniform(1.4, [0.0; 3]);
        solver.compute_equilibrium();
        let lattice = solver.lattice();
        for q in 0..lattice.q {
            for &v in solver.fluid().feq[q].as_slice() {
                assert_eq!(v, lattice.weights[q] * 1.4);
            }
        }
    }

    #[test]
    fn collision_relaxes_towards_equilibrium() {
        let lattice = &Lattice::D2Q9;
        let fluid = Fluid::new(lattice, 3, 3, 1);
        let set = BoundarySet::uniform(lattice, BoundaryCondition::BounceBack);
        let mut solver = SrtSolver::new(2.0, Medium::fluid(3, 3, 1), fluid, set).unwrap();
        solver.compute_equilibrium();
        solver.collide();
        for q in 0..lattice.q {
            assert_relative_eq!(solver.fluid().f[q].get(0, 1, 1), 0.5 * lattice.weights[q]);
        }
    }

    #[test]
    fn fully_solid_medium_streams_nothing() {
        for lattice in [&Lattice::D2Q9, &Lattice::D3Q19] {
            let nz = if lattice.dim == 2 { 1 } else { 3 };
            let mut solver = closed(lattice, Medium::solid(4, 3, nz));
            fill_numbered(solver.fluid_mut());
            let before = solver.fluid().f.clone();
            solver.stream();
            for q in 0..lattice.q {
                assert_eq!(solver.fluid().f[q], before[q]);
            }
        }
    }

    #[test]
    fn in_plane_streaming_shifts_by_one_cell() {
        let mut solver = closed(&Lattice::D2Q9, Medium::fluid(4, 4, 1));
        solver.fluid_mut().f[1].set(0, 1, 1, 7.0);
        solver.fluid_mut().f[6].set(0, 1, 2, 3.0);
        solver.stream();
        let f = &solver.fluid().f;
        assert_eq!(f[1].get(0, 1, 2), 7.0);
        assert_eq!(f[1].get(0, 1, 1), 0.0);
        assert_eq!(f[6].get(0, 2, 1), 3.0);
    }

    #[test]
    fn out_of_grid_targets_keep_old_values() {
        let mut solver = closed(&Lattice::D2Q9, Medium::fluid(3, 3, 1));
        fill_numbered(solver.fluid_mut());
        let before = solver.fluid().f.clone();
        solver.stream();
        // Direction 1 at x = 0 has no upstream cell
        for y in 0..3 {
            assert_eq!(solver.fluid().f[1].get(0, y, 0), before[1].get(0, y, 0));
            assert_eq!(solver.fluid().f[1].get(0, y, 1), before[1].get(0, y, 0));
        }
    }

    #[test]
    fn depth_passes_read_before_overwrite() {
        let mut solver = closed(&Lattice::D3Q19, Medium::fluid(3, 3, 4));
        fill_numbered(solver.fluid_mut());
        let before = solver.fluid().f.clone();
        solver.stream();
        let f = &solver.fluid().f;
        for z in 1..4 {
            // 9 = (0, 0, +1)
            assert_eq!(f[9].get(z, 1, 1), before[9].get(z - 1, 1, 1));
            // 17 = (-1, 0, -1)
            assert_eq!(f[17].get(z - 1, 1, 0), before[17].get(z, 1, 1));
        }
        assert_eq!(f[9].get(0, 1, 1), before[9].get(0, 1, 1));
    }

    #[test]
    fn obstacles_reflect_into_opposite_direction() {
        let medium = Medium::from_fn(4, 3, 1, |x, y, _| x == 2 && y == 1);
        let mut solver = closed(&Lattice::D2Q9, medium);
        solver.fluid_mut().f[1].set(0, 1, 1, 5.0);
        solver.fluid_mut().f[1].set(0, 1, 2, 9.0);
        solver.stream();
        let f = &solver.fluid().f;
        assert_eq!(f[3].get(0, 1, 1), 5.0);
        assert_eq!(f[1].get(0, 1, 2), 9.0);
        assert_eq!(f[1].get(0, 1, 3), 0.0);
    }

    #[test]
    fn construction_is_validated() {
        let lattice = &Lattice::D2Q9;
        let set = BoundarySet::uniform(lattice, BoundaryCondition::BounceBack);
        let fluid = Fluid::new(lattice, 4, 4, 1);
        assert!(matches!(
            SrtSolver::new(0.0, Medium::fluid(4, 4, 1), fluid.clone(), set),
            Err(SolverError::InvalidTau(_))
        ));
        assert!(matches!(
            SrtSolver::new(1.0, Medium::fluid(4, 5, 1), fluid.clone(), set),
            Err(SolverError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            SrtSolver::new(
                1.0,
                Medium::fluid(4, 4, 1),
                fluid.clone(),
                set.with(Face::Top, BoundaryCondition::Velocity([0.01, 0.0, 0.0]))
            ),
            Err(SolverError::Boundary(_))
        ));
        let thin = Fluid::new(lattice, 4, 1, 1);
        assert!(matches!(
            SrtSolver::new(1.0, Medium::fluid(4, 1, 1), thin, set),
            Err(SolverError::UnsupportedGrid { .. })
        ));
    }

    #[test]
    fn step_counts_iterations() {
        let mut solver = closed(&Lattice::D2Q9, Medium::fluid(5, 5, 1));
        let start = solver.initialize();
        assert_eq!(start.iteration, 0);
        let report = solver.step().unwrap();
        assert_eq!(report.iteration, 1);
        assert_relative_eq!(report.total_rho, 25.0, epsilon = 1e-12);
    }
}
