use std::ops::{Index, IndexMut};
use crate::error::BoundaryError;
use crate::field::{Field, Shape, Site};
use crate::lattice::{Face, FaceDirections, Lattice};
use crate::Float;

/// Per-direction population grids with face-slice access for the boundary
/// protocol.
#[derive(Debug, Clone)]
pub struct Populations {
    lattice: &'static Lattice,
    shape: Shape,
    fields: Vec<Field>,
    /// Transient marks of the `(face, direction)` slices written since the
    /// last [`Populations::clear_boundary_scratch`].
    written: Vec<bool>,
}

impl Populations {
    pub fn new(lattice: &'static Lattice, nx: usize, ny: usize, nz: usize) -> Self {
        let shape = Shape::new(nx, ny, nz);
        Self {
            lattice,
            shape,
            fields: (0..lattice.q).map(|_| Field::with_shape(shape, 0.0)).collect(),
            written: vec![false; Face::ALL.len() * lattice.q],
        }
    }

    pub fn lattice(&self) -> &'static Lattice {
        self.lattice
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn copy_from(&mut self, other: &Populations) {
        for (dst, src) in self.fields.iter_mut().zip(&other.fields) {
            dst.copy_from(src);
        }
    }

    /// All `q` populations at one site.
    pub fn at(&self, site: Site) -> Vec<Float> {
        self.fields.iter().map(|f| f.at(site)).collect()
    }

    /// Sum of every population over the whole grid.
    pub fn total(&self) -> Float {
        self.fields.iter().map(Field::sum).sum()
    }

    fn face(&self, face: Face) -> Result<&'static FaceDirections, BoundaryError> {
        self.lattice
            .face(face)
            .ok_or(BoundaryError::FaceNotInLattice {
                face,
                lattice: self.lattice.kind,
            })
    }

    /// Number of sites on `face`.
    pub fn face_len(&self, face: Face) -> Result<usize, BoundaryError> {
        let fd = self.face(face)?;
        Ok(self.shape.face_len(fd.axis))
    }

    /// Population `q` along `face`, one value per face site.
    pub fn boundary_values(&self, face: Face, q: usize) -> Result<Vec<Float>, BoundaryError> {
        let mut out = Vec::new();
        self.boundary_values_into(face, q, &mut out)?;
        Ok(out)
    }

    /// As [`Populations::boundary_values`], reusing `out`.
    pub fn boundary_values_into(
        &self,
        face: Face,
        q: usize,
        out: &mut Vec<Float>,
    ) -> Result<(), BoundaryError> {
        let fd = self.face(face)?;
        let field = &self.fields[q];
        out.clear();
        out.extend(self.shape.face_sites(fd.axis, fd.sign).map(|s| field.at(s)));
        Ok(())
    }

    /// Overwrite population `q` along `face`.
    pub fn set_boundary_values(
        &mut self,
        face: Face,
        q: usize,
        values: &[Float],
    ) -> Result<(), BoundaryError> {
        let fd = self.face(face)?;
        let expected = self.shape.face_len(fd.axis);
        if values.len() != expected {
            return Err(BoundaryError::SliceLength {
                face,
                expected,
                found: values.len(),
            });
        }
        let shape = self.shape;
        let field = &mut self.fields[q];
        for (site, &v) in shape.face_sites(fd.axis, fd.sign).zip(values) {
            *field.at_mut(site) = v;
        }
        self.written[face.index() * self.lattice.q + q] = true;
        Ok(())
    }

    /// Directions written on `face` since the scratch marks were last cleared.
    pub fn boundary_writes(&self, face: Face) -> impl Iterator<Item = usize> + '_ {
        let q = self.lattice.q;
        let base = face.index() * q;
        (0..q).filter(move |&d| self.written[base + d])
    }

    pub fn clear_boundary_scratch(&mut self) {
        self.written.fill(false);
    }
}

impl Index<usize> for Populations {
    type Output = Field;

    fn index(&self, q: usize) -> &Field {
        &self.fields[q]
    }
}

impl IndexMut<usize> for Populations {
    fn index_mut(&mut self, q: usize) -> &mut Field {
        &mut self.fields[q]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_values_follow_face_order() {
        let mut f = Populations::new(&Lattice::D2Q9, 3, 4, 1);
        for y in 0..4 {
            f[3].set(0, y, 0, y as Float);
        }
        assert_eq!(f.boundary_values(Face::Left, 3).unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(f.face_len(Face::Top).unwrap(), 3);

        f.set_boundary_values(Face::Right, 3, &[9.0, 8.0, 7.0, 6.0]).unwrap();
        assert_eq!(f[3].get(0, 0, 2), 9.0);
        assert_eq!(f[3].get(0, 3, 2), 6.0);
        assert_eq!(f.boundary_writes(Face::Right).collect::<Vec<_>>(), vec![3]);

        f.clear_boundary_scratch();
        assert_eq!(f.boundary_writes(Face::Right).count(), 0);
    }

    #[test]
    fn slice_length_is_checked() {
        let mut f = Populations::new(&Lattice::D2Q9, 3, 4, 1);
        let err = f.set_boundary_values(Face::Top, 2, &[1.0]).unwrap_err();
        assert_eq!(
            err,
            BoundaryError::SliceLength {
                face: Face::Top,
                expected: 3,
                found: 1
            }
        );
    }

    #[test]
    fn missing_face_is_rejected() {
        let f = Populations::new(&Lattice::D2Q9, 3, 3, 1);
        assert!(matches!(
            f.boundary_values(Face::Near, 0),
            Err(BoundaryError::FaceNotInLattice { face: Face::Near, .. })
        ));
    }
}
