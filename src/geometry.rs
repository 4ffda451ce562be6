use log::info;
use nalgebra::Point3;
use stl_io::read_stl;
use crate::field::{Shape, Site};

/// Solid/fluid occupancy mask. The solver only ever queries it.
#[derive(Debug, Clone, PartialEq)]
pub struct Medium {
    shape: Shape,
    solid: Vec<bool>,
}

impl Medium {
    /// Every cell is fluid.
    pub fn fluid(nx: usize, ny: usize, nz: usize) -> Self {
        let shape = Shape::new(nx, ny, nz);
        Self {
            shape,
            solid: vec![false; shape.len()],
        }
    }

    /// Every cell is solid.
    pub fn solid(nx: usize, ny: usize, nz: usize) -> Self {
        let shape = Shape::new(nx, ny, nz);
        Self {
            shape,
            solid: vec![true; shape.len()],
        }
    }

    /// Marks a cell solid wherever `is_solid(x, y, z)` holds.
    pub fn from_fn(
        nx: usize,
        ny: usize,
        nz: usize,
        is_solid: impl Fn(usize, usize, usize) -> bool,
    ) -> Self {
        let shape = Shape::new(nx, ny, nz);
        let solid = (0..shape.len())
            .map(|idx| {
                let [x, y, z] = shape.site(idx);
                is_solid(x, y, z)
            })
            .collect();
        Self { shape, solid }
    }

    /// Voxelise the triangles of an STL file onto the grid; `dx` is the cell
    /// size in STL units and the grid origin sits at the STL origin. A 2D grid
    /// takes the slab `0 <= z < dx`.
    pub fn from_stl(path: &str, shape: Shape, dx: f32) -> anyhow::Result<Self> {
        if shape.is_empty() {
            anyhow::bail!(
                "cannot voxelise {} onto an empty {}x{}x{} grid",
                path,
                shape.nx,
                shape.ny,
                shape.nz
            );
        }
        let mut file = std::fs::File::open(path)?;
        let stl = read_stl(&mut file)?;
        let mut medium = Self::fluid(shape.nx, shape.ny, shape.nz);

        for face in &stl.faces {
            let corner = |i: usize| {
                let v = stl.vertices[face.vertices[i]];
                Point3::new(v[0], v[1], v[2])
            };
            let triangle = [corner(0), corner(1), corner(2)];
            medium.voxelize_triangle(&triangle, dx);
        }

        info!(
            "Voxelised {} triangles from {}: {} solid, {} fluid cells",
            stl.faces.len(),
            path,
            medium.solid_count(),
            medium.fluid_count()
        );
        Ok(medium)
    }

    fn voxelize_triangle(&mut self, triangle: &[Point3<f32>; 3], dx: f32) {
        let lo = |axis: usize| triangle.iter().map(|v| v[axis]).fold(f32::INFINITY, f32::min);
        let hi = |axis: usize| triangle.iter().map(|v| v[axis]).fold(f32::NEG_INFINITY, f32::max);
        let extent = [self.shape.nx, self.shape.ny, self.shape.nz];

        // Cell range covered by the triangle's bounding box, clamped to the grid
        let mut range = [(0usize, 0usize); 3];
        for axis in 0..3 {
            let n = extent[axis] as i64;
            let first = ((lo(axis) / dx).floor() as i64).clamp(0, n - 1);
            let last = ((hi(axis) / dx).ceil() as i64).clamp(0, n - 1);
            if (hi(axis) / dx) < 0.0 || (lo(axis) / dx) >= n as f32 {
                return;
            }
            range[axis] = (first as usize, last as usize);
        }

        const SAMPLES: usize = 3;
        let threshold = 0.8 * dx;
        for z in range[2].0..=range[2].1 {
            for y in range[1].0..=range[1].1 {
                for x in range[0].0..=range[0].1 {
                    let mut inside = 0;
                    for (sx, sy, sz) in sample_offsets(SAMPLES) {
                        let point = Point3::new(
                            (x as f32 + sx) * dx,
                            (y as f32 + sy) * dx,
                            (z as f32 + sz) * dx,
                        );
                        if point_triangle_distance(&point, triangle) < threshold {
                            inside += 1;
                        }
                    }
                    // Majority vote over the samples of the cell
                    if inside > SAMPLES * SAMPLES * SAMPLES / 2 {
                        self.set_solid([x, y, z], true);
                    }
                }
            }
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Grid extent as `(nx, ny, nz)`.
    pub fn size(&self) -> (usize, usize, usize) {
        (self.shape.nx, self.shape.ny, self.shape.nz)
    }

    #[inline]
    pub fn is_fluid(&self, z: usize, y: usize, x: usize) -> bool {
        !self.solid[self.shape.index([x, y, z])]
    }

    #[inline]
    pub fn is_fluid_site(&self, site: Site) -> bool {
        !self.solid[self.shape.index(site)]
    }

    pub fn set_solid(&mut self, site: Site, solid: bool) {
        let idx = self.shape.index(site);
        self.solid[idx] = solid;
    }

    pub fn solid_count(&self) -> usize {
        self.solid.iter().filter(|&&s| s).count()
    }

    pub fn fluid_count(&self) -> usize {
        self.solid.len() - self.solid_count()
    }
}

/// Cell-relative sample positions on an `n × n × n` sub-grid.
fn sample_offsets(n: usize) -> impl Iterator<Item = (f32, f32, f32)> {
    let offset = move |i: usize| (i as f32 + 0.5) / n as f32;
    (0..n).flat_map(move |i| {
        (0..n).flat_map(move |j| (0..n).map(move |k| (offset(i), offset(j), offset(k))))
    })
}

fn point_triangle_distance(point: &Point3<f32>, triangle: &[Point3<f32>; 3]) -> f32 {
    let v0 = triangle[1] - triangle[0];
    let v1 = triangle[2] - triangle[0];
    let v2 = point - triangle[0];

    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() > f32::EPSILON {
        // Barycentric coordinates of the projection onto the triangle plane
        let u = (dot11 * dot02 - dot01 * dot12) / denom;
        let v = (dot00 * dot12 - dot01 * dot02) / denom;
        if u >= 0.0 && v >= 0.0 && u + v <= 1.0 {
            let normal = v0.cross(&v1).normalize();
            return v2.dot(&normal).abs();
        }
    }

    let d1 = point_segment_distance(point, &triangle[0], &triangle[1]);
    let d2 = point_segment_distance(point, &triangle[1], &triangle[2]);
    let d3 = point_segment_distance(point, &triangle[2], &triangle[0]);
    d1.min(d2).min(d3)
}

fn point_segment_distance(point: &Point3<f32>, a: &Point3<f32>, b: &Point3<f32>) -> f32 {
    let ab = b - a;
    let ap = point - a;
    let len_sq = ab.dot(&ab);
    if len_sq == 0.0 {
        return ap.magnitude();
    }
    let t = (ap.dot(&ab) / len_sq).clamp(0.0, 1.0);
    (point - (a + ab * t)).magnitude()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn constructors() {
        let fluid = Medium::fluid(3, 2, 1);
        assert_eq!(fluid.fluid_count(), 6);
        assert!(fluid.is_fluid(0, 1, 2));

        let solid = Medium::solid(3, 2, 1);
        assert_eq!(solid.solid_count(), 6);

        let walls = Medium::from_fn(4, 4, 1, |x, _, _| x == 0 || x == 3);
        assert!(!walls.is_fluid(0, 2, 0));
        assert!(walls.is_fluid(0, 2, 1));
        assert_eq!(walls.solid_count(), 8);
    }

    #[test]
    fn distance_to_triangle() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let above = Point3::new(0.2, 0.2, 0.5);
        assert!((point_triangle_distance(&above, &tri) - 0.5).abs() < 1e-6);
        let beside = Point3::new(2.0, 0.0, 0.0);
        assert!((point_triangle_distance(&beside, &tri) - 1.0).abs() < 1e-6);
    }

    fn plate_stl() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // A square plate at z = 1.5 covering the whole 4x4 footprint
        write!(
            file,
            "solid plate\n\
             facet normal 0 0 1\n outer loop\n  vertex 0 0 1.5\n  vertex 4 0 1.5\n  vertex 4 4 1.5\n endloop\nendfacet\n\
             facet normal 0 0 1\n outer loop\n  vertex 0 0 1.5\n  vertex 4 4 1.5\n  vertex 0 4 1.5\n endloop\nendfacet\n\
             endsolid plate\n"
        )
        .unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn stl_plate_becomes_solid_layer() {
        let file = plate_stl();
        let path = file.path().to_str().unwrap().to_string();
        let medium = Medium::from_stl(&path, Shape::new(4, 4, 4), 1.0).unwrap();
        assert!(!medium.is_fluid(1, 2, 2));
        assert!(medium.is_fluid(3, 2, 2));
        assert!(medium.solid_count() > 0);
    }

    #[test]
    fn stl_onto_empty_grid_is_an_error() {
        let file = plate_stl();
        let path = file.path().to_str().unwrap().to_string();
        assert!(Medium::from_stl(&path, Shape::new(0, 4, 4), 1.0).is_err());
        assert!(Medium::from_stl(&path, Shape::new(4, 4, 0), 1.0).is_err());
    }
}
