use std::ops::{Index, IndexMut};
use rayon::prelude::*;
use crate::lattice::Axis;
use crate::Float;

/// Grid coordinates ordered `[x, y, z]`, so a site can be indexed by `Axis`.
pub type Site = [usize; 3];

/// Extent of a dense grid. Two-dimensional grids have `nz == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Shape {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn plane_len(&self) -> usize {
        self.nx * self.ny
    }

    pub fn extent(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.nx,
            Axis::Y => self.ny,
            Axis::Z => self.nz,
        }
    }

    #[inline]
    pub fn index(&self, site: Site) -> usize {
        site[0] + site[1] * self.nx + site[2] * self.nx * self.ny
    }

    #[inline]
    pub fn site(&self, index: usize) -> Site {
        let plane = self.plane_len();
        [index % self.nx, (index % plane) / self.nx, index / plane]
    }

    /// The site reached from `site` by the integer offset `c`, if it lies in
    /// the grid.
    #[inline]
    pub fn offset(&self, site: Site, c: [i32; 3]) -> Option<Site> {
        let x = site[0] as i64 + c[0] as i64;
        let y = site[1] as i64 + c[1] as i64;
        let z = site[2] as i64 + c[2] as i64;
        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        (x < self.nx && y < self.ny && z < self.nz).then_some([x, y, z])
    }

    /// Number of sites on a face normal to `axis`.
    pub fn face_len(&self, axis: Axis) -> usize {
        self.len() / self.extent(axis)
    }

    /// Sites of the face normal to `axis` on the `sign` side, `z` outermost
    /// and `x` innermost. Opposite faces enumerate their sites in the same
    /// tangential order.
    pub fn face_sites(&self, axis: Axis, sign: i32) -> impl Iterator<Item = Site> + '_ {
        let fixed = if sign > 0 { self.extent(axis) - 1 } else { 0 };
        let a = axis as usize;
        let mut reduced = [self.nx, self.ny, self.nz];
        reduced[a] = 1;
        (0..reduced[2]).flat_map(move |z| {
            (0..reduced[1]).flat_map(move |y| {
                (0..reduced[0]).map(move |x| {
                    let mut site = [x, y, z];
                    site[a] = fixed;
                    site
                })
            })
        })
    }

    /// Position of `site` within the enumeration of its face normal to `axis`.
    pub fn face_index(&self, axis: Axis, site: Site) -> usize {
        let mut reduced = [self.nx, self.ny, self.nz];
        let mut s = site;
        reduced[axis as usize] = 1;
        s[axis as usize] = 0;
        s[0] + s[1] * reduced[0] + s[2] * reduced[0] * reduced[1]
    }
}

/// Dense scalar field over the grid, stored `z`-major with `x` fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    shape: Shape,
    data: Vec<Float>,
}

impl Field {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self::filled(nx, ny, nz, 0.0)
    }

    pub fn filled(nx: usize, ny: usize, nz: usize, value: Float) -> Self {
        let shape = Shape::new(nx, ny, nz);
        Self {
            shape,
            data: vec![value; shape.len()],
        }
    }

    pub fn with_shape(shape: Shape, value: Float) -> Self {
        Self::filled(shape.nx, shape.ny, shape.nz, value)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> Float {
        self.data[self.shape.index([x, y, z])]
    }

    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: Float) {
        let idx = self.shape.index([x, y, z]);
        self.data[idx] = value;
    }

    #[inline]
    pub fn at(&self, site: Site) -> Float {
        self.data[self.shape.index(site)]
    }

    #[inline]
    pub fn at_mut(&mut self, site: Site) -> &mut Float {
        let idx = self.shape.index(site);
        &mut self.data[idx]
    }

    pub fn fill(&mut self, value: Float) {
        self.data.fill(value);
    }

    pub fn sum(&self) -> Float {
        self.data.par_iter().sum()
    }

    pub fn max_abs(&self) -> Float {
        self.data.iter().fold(0.0, |m, v| m.max(v.abs()))
    }

    pub fn as_slice(&self) -> &[Float] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Float] {
        &mut self.data
    }

    pub fn copy_from(&mut self, other: &Field) {
        debug_assert_eq!(self.shape, other.shape);
        self.data.copy_from_slice(&other.data);
    }

    pub fn plane(&self, z: usize) -> &[Float] {
        let n = self.shape.plane_len();
        &self.data[z * n..(z + 1) * n]
    }

    pub fn plane_mut(&mut self, z: usize) -> &mut [Float] {
        let n = self.shape.plane_len();
        &mut self.data[z * n..(z + 1) * n]
    }

    /// One `z` layer flattened row by row.
    pub fn layer_values(&self, z: usize) -> Vec<Float> {
        self.plane(z).to_vec()
    }
}

impl Index<Site> for Field {
    type Output = Float;

    fn index(&self, site: Site) -> &Float {
        &self.data[self.shape.index(site)]
    }
}

impl IndexMut<Site> for Field {
    fn index_mut(&mut self, site: Site) -> &mut Float {
        let idx = self.shape.index(site);
        &mut self.data[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_site_round_trip() {
        let shape = Shape::new(4, 3, 2);
        for idx in 0..shape.len() {
            assert_eq!(shape.index(shape.site(idx)), idx);
        }
        assert_eq!(shape.site(5), [1, 1, 0]);
    }

    #[test]
    fn offset_respects_bounds() {
        let shape = Shape::new(3, 3, 1);
        assert_eq!(shape.offset([0, 0, 0], [1, 1, 0]), Some([1, 1, 0]));
        assert_eq!(shape.offset([0, 0, 0], [-1, 0, 0]), None);
        assert_eq!(shape.offset([2, 1, 0], [1, 0, 0]), None);
        assert_eq!(shape.offset([1, 1, 0], [0, 0, 1]), None);
    }

    #[test]
    fn face_sites_are_ordered_and_paired() {
        let shape = Shape::new(4, 3, 2);
        let left: Vec<Site> = shape.face_sites(Axis::X, -1).collect();
        let right: Vec<Site> = shape.face_sites(Axis::X, 1).collect();
        assert_eq!(left.len(), shape.face_len(Axis::X));
        assert_eq!(left[0], [0, 0, 0]);
        assert_eq!(left[1], [0, 1, 0]);
        assert_eq!(left[3], [0, 0, 1]);
        for (i, (l, r)) in left.iter().zip(&right).enumerate() {
            assert_eq!(r[0], 3);
            assert_eq!((l[1], l[2]), (r[1], r[2]));
            assert_eq!(shape.face_index(Axis::X, *l), i);
            assert_eq!(shape.face_index(Axis::X, *r), i);
        }
        let top: Vec<Site> = shape.face_sites(Axis::Z, 1).collect();
        assert_eq!(top.len(), 12);
        assert!(top.iter().all(|s| s[2] == 1));
    }

    #[test]
    fn planes_and_sums() {
        let mut field = Field::filled(3, 2, 2, 1.0);
        field.plane_mut(1).fill(2.0);
        assert_eq!(field.sum(), 6.0 + 12.0);
        assert_eq!(field.get(1, 1, 2), 2.0);
        field.set(0, 1, 2, 5.0);
        assert_eq!(field[[2, 1, 0]], 5.0);
        assert_eq!(field.layer_values(0), vec![1.0, 1.0, 1.0, 1.0, 1.0, 5.0]);
    }
}
