use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::error::OutputError;
use crate::field::{Field, Shape};
use crate::fluid::Fluid;
use crate::geometry::Medium;
use crate::lattice::Axis;
use crate::solver::DiagnosticSink;
use crate::Float;

type Result<T> = std::result::Result<T, OutputError>;

/// Macroscopic field selectable for heat-map output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldName {
    Rho,
    Vx,
    Vy,
    Vz,
}

impl FieldName {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::Rho => "rho",
            FieldName::Vx => "vx",
            FieldName::Vy => "vy",
            FieldName::Vz => "vz",
        }
    }

    pub fn select(self, fluid: &Fluid) -> &Field {
        match self {
            FieldName::Rho => &fluid.rho,
            FieldName::Vx => &fluid.vx,
            FieldName::Vy => &fluid.vy,
            FieldName::Vz => &fluid.vz,
        }
    }
}

/// Plain-text dumps of one grid slice: a line per row of the slice, values
/// separated by single spaces, no newline after the last row.
#[derive(Debug, Clone)]
pub struct HeatMapWriter {
    directory: PathBuf,
    precision: usize,
}

impl HeatMapWriter {
    pub fn new(directory: impl Into<PathBuf>, precision: usize) -> Self {
        Self {
            directory: directory.into(),
            precision,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<directory>/<name><iteration>.txt`
    pub fn path_for(&self, name: &str, iteration: usize) -> PathBuf {
        self.directory.join(format!("{}{}.txt", name, iteration))
    }

    /// Write the `z = layer` plane of `field`, one line per `y` row.
    pub fn write_layer(&self, name: &str, iteration: usize, field: &Field, layer: usize) -> Result<PathBuf> {
        self.write_slice(name, iteration, field, Axis::Z, layer)
    }

    /// Write the plane of `field` normal to `axis` at `index`. Rows run along
    /// the fastest remaining axis.
    pub fn write_slice(
        &self,
        name: &str,
        iteration: usize,
        field: &Field,
        axis: Axis,
        index: usize,
    ) -> Result<PathBuf> {
        let shape = field.shape();
        let depth = shape.extent(axis);
        if index >= depth {
            return Err(OutputError::LayerOutOfRange { layer: index, depth });
        }

        let (row_len, rows) = slice_rows(shape, axis);
        let path = self.path_for(name, iteration);
        let mut out = BufWriter::new(File::create(&path)?);
        for r in 0..rows {
            for c in 0..row_len {
                let site = slice_site(axis, index, r, c);
                if c > 0 {
                    write!(out, " ")?;
                }
                write!(out, "{:.*}", self.precision, field.at(site))?;
            }
            if r + 1 < rows {
                writeln!(out)?;
            }
        }
        out.flush()?;
        Ok(path)
    }
}

/// Row length and row count of the plane normal to `axis`.
fn slice_rows(shape: Shape, axis: Axis) -> (usize, usize) {
    match axis {
        Axis::X => (shape.ny, shape.nz),
        Axis::Y => (shape.nx, shape.nz),
        Axis::Z => (shape.nx, shape.ny),
    }
}

fn slice_site(axis: Axis, index: usize, row: usize, col: usize) -> [usize; 3] {
    match axis {
        Axis::X => [index, col, row],
        Axis::Y => [col, index, row],
        Axis::Z => [col, row, index],
    }
}

/// Legacy ASCII VTK snapshots plus a ParaView collection of the files written.
#[derive(Debug, Clone, Default)]
pub struct VtkWriter {
    entries: Vec<(usize, PathBuf)>,
}

impl VtkWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: &Path, fluid: &Fluid, medium: &Medium, iteration: usize) -> Result<()> {
        let shape = fluid.shape();
        let n = shape.len();
        let mut file = BufWriter::new(File::create(path)?);

        writeln!(file, "# vtk DataFile Version 3.0")?;
        writeln!(file, "LBM SRT solution - iteration {}", iteration)?;
        writeln!(file, "ASCII")?;
        writeln!(file, "DATASET STRUCTURED_POINTS")?;
        writeln!(file, "DIMENSIONS {} {} {}", shape.nx, shape.ny, shape.nz)?;
        writeln!(file, "ORIGIN 0 0 0")?;
        writeln!(file, "SPACING 1 1 1")?;
        writeln!(file, "POINT_DATA {}", n)?;

        writeln!(file, "SCALARS Density float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for v in fluid.rho.as_slice() {
            writeln!(file, "{:.6}", v)?;
        }

        writeln!(file, "VECTORS Velocity float")?;
        for i in 0..n {
            let site = shape.site(i);
            let [u, v, w] = fluid.velocity_at(site);
            writeln!(file, "{:.6} {:.6} {:.6}", u, v, w)?;
        }

        writeln!(file, "SCALARS VelocityMagnitude float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for i in 0..n {
            let [u, v, w] = fluid.velocity_at(shape.site(i));
            let magnitude: Float = (u * u + v * v + w * w).sqrt();
            writeln!(file, "{:.6}", magnitude)?;
        }

        // 0 for fluid, 1 for solid
        writeln!(file, "SCALARS Occupancy float")?;
        writeln!(file, "LOOKUP_TABLE default")?;
        for i in 0..n {
            let solid = !medium.is_fluid_site(shape.site(i));
            writeln!(file, "{:.1}", if solid { 1.0 } else { 0.0 })?;
        }
        file.flush()?;

        self.entries.push((iteration, path.to_path_buf()));
        Ok(())
    }

    /// ParaView `.pvd` collection referencing every snapshot written so far.
    pub fn write_collection(&self, path: &Path) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "<?xml version=\"1.0\"?>")?;
        writeln!(file, "<VTKFile type=\"Collection\" version=\"0.1\">")?;
        writeln!(file, "  <Collection>")?;
        for (iteration, snapshot) in &self.entries {
            let name = snapshot
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            writeln!(
                file,
                "    <DataSet timestep=\"{}\" part=\"0\" file=\"{}\"/>",
                iteration, name
            )?;
        }
        writeln!(file, "  </Collection>")?;
        writeln!(file, "</VTKFile>")?;
        file.flush()?;
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }
}

/// Periodic output: heat maps of the chosen fields and, optionally, a VTK
/// snapshot with a running `solution.pvd` collection.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    heat_maps: HeatMapWriter,
    fields: Vec<FieldName>,
    axis: Axis,
    index: usize,
    vtk: Option<VtkWriter>,
}

impl Diagnostics {
    /// Creates `directory` if needed. The slice at `index` along `axis` must
    /// lie inside `shape`.
    pub fn new(
        directory: impl Into<PathBuf>,
        precision: usize,
        fields: Vec<FieldName>,
        shape: Shape,
        axis: Axis,
        index: usize,
    ) -> Result<Self> {
        let depth = shape.extent(axis);
        if index >= depth {
            return Err(OutputError::LayerOutOfRange { layer: index, depth });
        }
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            heat_maps: HeatMapWriter::new(directory, precision),
            fields,
            axis,
            index,
            vtk: None,
        })
    }

    pub fn with_vtk(mut self) -> Self {
        self.vtk = Some(VtkWriter::new());
        self
    }

    pub fn heat_maps(&self) -> &HeatMapWriter {
        &self.heat_maps
    }
}

impl DiagnosticSink for Diagnostics {
    fn record(&mut self, iteration: usize, fluid: &Fluid, medium: &Medium) -> Result<()> {
        for name in &self.fields {
            let path = self.heat_maps.write_slice(
                name.as_str(),
                iteration,
                name.select(fluid),
                self.axis,
                self.index,
            )?;
            info!("Wrote {}", path.display());
        }
        if let Some(vtk) = self.vtk.as_mut() {
            let path = self
                .heat_maps
                .directory()
                .join(format!("output_{:06}.vtk", iteration));
            vtk.write(&path, fluid, medium, iteration)?;
            vtk.write_collection(&self.heat_maps.directory().join("solution.pvd"))?;
            info!("Wrote {}", path.display());
        }
        Ok(())
    }
}
