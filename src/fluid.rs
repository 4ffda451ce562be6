use log::{debug, warn};
use rayon::prelude::*;
use crate::distribution::Populations;
use crate::field::{Field, Shape, Site};
use crate::lattice::{Axis, Lattice};
use crate::Float;

/// Densities below this are treated as empty when dividing out momentum.
const DENSITY_FLOOR: Float = 1e-12;

/// Fluid state: populations, their equilibrium and the macroscopic moments.
#[derive(Debug, Clone)]
pub struct Fluid {
    pub f: Populations,
    pub feq: Populations,
    pub rho: Field,
    pub vx: Field,
    pub vy: Field,
    pub vz: Field,
}

impl Fluid {
    /// Fluid at rest with unit density.
    pub fn new(lattice: &'static Lattice, nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            f: Populations::new(lattice, nx, ny, nz),
            feq: Populations::new(lattice, nx, ny, nz),
            rho: Field::filled(nx, ny, nz, 1.0),
            vx: Field::new(nx, ny, nz),
            vy: Field::new(nx, ny, nz),
            vz: Field::new(nx, ny, nz),
        }
    }

    pub fn lattice(&self) -> &'static Lattice {
        self.f.lattice()
    }

    pub fn shape(&self) -> Shape {
        self.rho.shape()
    }

    /// Uniform density and velocity everywhere.
    pub fn set_uniform(&mut self, density: Float, velocity: [Float; 3]) {
        self.rho.fill(density);
        self.vx.fill(velocity[0]);
        self.vy.fill(velocity[1]);
        self.vz.fill(velocity[2]);
    }

    /// Parabolic channel profile: velocity along `flow` peaking at `max_velocity`
    /// midway across `across`, zero one cell outside the grid on both sides.
    pub fn set_poiseuille(&mut self, flow: Axis, across: Axis, max_velocity: Float) {
        let shape = self.shape();
        let width = shape.extent(across) as Float + 1.0;
        let component = match flow {
            Axis::X => &mut self.vx,
            Axis::Y => &mut self.vy,
            Axis::Z => &mut self.vz,
        };
        for idx in 0..shape.len() {
            let site = shape.site(idx);
            let s = site[across as usize] as Float + 1.0;
            component.as_mut_slice()[idx] = 4.0 * max_velocity * s * (width - s) / (width * width);
        }
        debug!(
            "Seeded Poiseuille profile along {:?} across {:?}, u_max = {}",
            flow, across, max_velocity
        );
    }

    pub fn velocity_at(&self, site: Site) -> [Float; 3] {
        [self.vx.at(site), self.vy.at(site), self.vz.at(site)]
    }

    /// Density as the zeroth moment of the populations.
    pub fn recalculate_rho(&mut self) {
        let fields = self.f.fields();
        self.rho
            .as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, rho)| *rho = fields.iter().map(|fq| fq.as_slice()[i]).sum());
    }

    /// Velocity as the first moment divided by the current density.
    pub fn recalculate_velocity(&mut self) {
        let lattice = self.f.lattice();
        let fields = self.f.fields();
        let rho = self.rho.as_slice();
        self.vx
            .as_mut_slice()
            .par_iter_mut()
            .zip(self.vy.as_mut_slice().par_iter_mut())
            .zip(self.vz.as_mut_slice().par_iter_mut())
            .enumerate()
            .for_each(|(i, ((vx, vy), vz))| {
                let mut j = [0.0; 3];
                for (q, fq) in fields.iter().enumerate() {
                    let c = lattice.velocities[q];
                    let v = fq.as_slice()[i];
                    j[0] += v * c[0] as Float;
                    j[1] += v * c[1] as Float;
                    j[2] += v * c[2] as Float;
                }
                if rho[i].abs() > DENSITY_FLOOR {
                    *vx = j[0] / rho[i];
                    *vy = j[1] / rho[i];
                    *vz = j[2] / rho[i];
                } else {
                    *vx = 0.0;
                    *vy = 0.0;
                    *vz = 0.0;
                }
            });
    }

    pub fn recalculate(&mut self) {
        self.recalculate_rho();
        self.recalculate_velocity();
    }

    pub fn total_rho(&self) -> Float {
        let total = self.rho.sum();
        if !total.is_finite() {
            warn!("Total density is not finite: {}", total);
        }
        total
    }
}
