use serde::{Deserialize, Serialize};
use crate::boundary::{BoundaryCondition, BoundarySet};
use crate::fluid::Fluid;
use crate::lattice::{Axis, Face, Lattice, LatticeKind};
use crate::output::FieldName;
use crate::Float;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub lattice: LatticeKind,
    pub domain: DomainConfig,
    pub physics: PhysicsConfig,
    pub boundaries: BoundarySet,
    #[serde(default)]
    pub initial_condition: InitialCondition,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub nx: usize,
    pub ny: usize,
    #[serde(default = "default_nz")]
    pub nz: usize,
}

fn default_nz() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    /// Relaxation time; derived from the Reynolds number when absent.
    #[serde(default)]
    pub tau: Option<Float>,
    #[serde(default)]
    pub reynolds_number: Option<Float>,
    #[serde(default = "default_density")]
    pub density: Float,
    #[serde(default)]
    pub initial_velocity: [Float; 3],
}

fn default_density() -> Float {
    1.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialCondition {
    #[default]
    Uniform,
    /// Parabolic channel profile along the inflow direction.
    Poiseuille { max_velocity: Float },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_directory")]
    pub directory: String,
    /// Iterations between diagnostic writes; 0 disables them.
    #[serde(default = "default_frequency")]
    pub frequency: usize,
    #[serde(default = "default_precision")]
    pub precision: usize,
    #[serde(default)]
    pub fields: Vec<FieldName>,
    #[serde(default)]
    pub slice: SliceConfig,
    #[serde(default)]
    pub vtk: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            frequency: default_frequency(),
            precision: default_precision(),
            fields: Vec::new(),
            slice: SliceConfig::default(),
            vtk: false,
        }
    }
}

fn default_directory() -> String {
    "output".to_string()
}

fn default_frequency() -> usize {
    50
}

fn default_precision() -> usize {
    3
}

/// Grid plane written by the heat maps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceConfig {
    pub axis: Axis,
    pub index: usize,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            axis: Axis::Z,
            index: 0,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }

    pub fn descriptor(&self) -> &'static Lattice {
        self.lattice.descriptor()
    }

    pub fn boundary_set(&self) -> BoundarySet {
        self.boundaries
    }

    /// Characteristic velocity: the fastest prescribed boundary or initial
    /// speed.
    pub fn characteristic_velocity(&self) -> Float {
        let speed = |u: [Float; 3]| (u[0] * u[0] + u[1] * u[1] + u[2] * u[2]).sqrt();
        let boundary = Face::ALL
            .iter()
            .filter_map(|&f| match self.boundaries.get(f) {
                Some(BoundaryCondition::Velocity(u)) => Some(speed(u)),
                _ => None,
            })
            .fold(0.0, Float::max);
        let initial = match self.initial_condition {
            InitialCondition::Uniform => speed(self.physics.initial_velocity),
            InitialCondition::Poiseuille { max_velocity } => max_velocity.abs(),
        };
        boundary.max(initial)
    }

    /// Relaxation time: explicit `tau`, else `3 nu + 0.5` with
    /// `nu = U L / Re` over the channel height.
    pub fn tau(&self) -> anyhow::Result<Float> {
        if let Some(tau) = self.physics.tau {
            return Ok(tau);
        }
        let re = self
            .physics
            .reynolds_number
            .ok_or_else(|| anyhow::anyhow!("physics needs either tau or reynolds_number"))?;
        if re <= 0.0 {
            anyhow::bail!("reynolds_number must be positive, got {}", re);
        }
        let length = self.channel_height() as Float;
        let viscosity = self.characteristic_velocity() * length / re;
        Ok(3.0 * viscosity + 0.5)
    }

    /// Extent across the main flow: `ny` in 2D, `nx` in 3D (the flow runs
    /// along `z`).
    pub fn channel_height(&self) -> usize {
        match self.lattice {
            LatticeKind::D2Q9 => self.domain.ny,
            LatticeKind::D3Q19 => self.domain.nx,
        }
    }

    /// Fluid with the configured initial condition applied.
    pub fn initial_fluid(&self) -> Fluid {
        let lattice = self.descriptor();
        let d = &self.domain;
        let mut fluid = Fluid::new(lattice, d.nx, d.ny, d.nz);
        fluid.set_uniform(self.physics.density, self.physics.initial_velocity);
        if let InitialCondition::Poiseuille { max_velocity } = self.initial_condition {
            match self.lattice {
                LatticeKind::D2Q9 => fluid.set_poiseuille(Axis::X, Axis::Y, max_velocity),
                LatticeKind::D3Q19 => fluid.set_poiseuille(Axis::Z, Axis::X, max_velocity),
            }
        }
        fluid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CHANNEL: &str = r#"{
        "lattice": "D2Q9",
        "domain": { "nx": 40, "ny": 20 },
        "physics": { "reynolds_number": 10.0 },
        "boundaries": {
            "top": "bounce_back",
            "bottom": "bounce_back",
            "left": { "velocity": [0.05, 0.0, 0.0] },
            "right": "bounce_back"
        },
        "initial_condition": { "poiseuille": { "max_velocity": 0.05 } },
        "simulation": { "iterations": 200 },
        "output": { "directory": "out", "frequency": 50, "fields": ["vx", "vy"] }
    }"#;

    #[test]
    fn parses_channel_config() {
        let config = Config::from_str(CHANNEL).unwrap();
        assert_eq!(config.lattice, LatticeKind::D2Q9);
        assert_eq!(config.domain.nz, 1);
        assert_eq!(config.physics.density, 1.0);
        assert_eq!(
            config.boundary_set().get(Face::Left),
            Some(BoundaryCondition::Velocity([0.05, 0.0, 0.0]))
        );
        assert_eq!(config.output.fields, vec![FieldName::Vx, FieldName::Vy]);
        assert_eq!(config.output.precision, 3);
        assert_eq!(config.output.slice, SliceConfig::default());
        assert!(config.boundary_set().validate(config.descriptor()).is_ok());
    }

    #[test]
    fn tau_from_reynolds_number() {
        let config = Config::from_str(CHANNEL).unwrap();
        // nu = 0.05 * 20 / 10
        assert_relative_eq!(config.tau().unwrap(), 3.0 * 0.1 + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn explicit_tau_wins() {
        let mut config = Config::from_str(CHANNEL).unwrap();
        config.physics.tau = Some(0.8);
        assert_eq!(config.tau().unwrap(), 0.8);
        config.physics.tau = None;
        config.physics.reynolds_number = None;
        assert!(config.tau().is_err());
    }

    #[test]
    fn demo_configs_are_valid() {
        for text in [
            include_str!("../demos/channel2d.json"),
            include_str!("../demos/duct3d.json"),
        ] {
            let config = Config::from_str(text).unwrap();
            assert!(config.boundary_set().validate(config.descriptor()).is_ok());
            assert!(config.tau().unwrap() > 0.5);
        }
    }

    #[test]
    fn initial_fluid_has_profile() {
        let config = Config::from_str(CHANNEL).unwrap();
        let fluid = config.initial_fluid();
        assert_eq!(fluid.shape().nx, 40);
        assert!(fluid.vx.max_abs() <= 0.05 + 1e-12);
        assert!(fluid.vx.get(0, 10, 0) > fluid.vx.get(0, 0, 0));
    }
}
