use serde::{Deserialize, Serialize};
use std::fmt;
use crate::Float;

/// Cartesian axis of the grid. Fields are stored `z`-major, `x` fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

/// Domain faces. In 2D only the first four exist; `Top`/`Bottom` then lie on
/// the `y` axis, while in 3D they lie on the depth (`z`) axis and `Near`/`Far`
/// take over `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    Top,
    Bottom,
    Left,
    Right,
    Near,
    Far,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Top,
        Face::Bottom,
        Face::Left,
        Face::Right,
        Face::Near,
        Face::Far,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::Top => Face::Bottom,
            Face::Bottom => Face::Top,
            Face::Left => Face::Right,
            Face::Right => Face::Left,
            Face::Near => Face::Far,
            Face::Far => Face::Near,
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Face::Top => "TOP",
            Face::Bottom => "BOTTOM",
            Face::Left => "LEFT",
            Face::Right => "RIGHT",
            Face::Near => "NEAR",
            Face::Far => "FAR",
        };
        f.write_str(name)
    }
}

/// Geometry of one face: the axis it is normal to, the sign of its outward
/// normal and the directions that leave the domain through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceDirections {
    pub face: Face,
    pub axis: Axis,
    pub sign: i32,
    pub outgoing: &'static [usize],
}

/// Which descriptor a configuration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatticeKind {
    D2Q9,
    D3Q19,
}

impl LatticeKind {
    pub fn descriptor(self) -> &'static Lattice {
        match self {
            LatticeKind::D2Q9 => &Lattice::D2Q9,
            LatticeKind::D3Q19 => &Lattice::D3Q19,
        }
    }
}

/// Immutable lattice descriptor: discrete velocities, quadrature weights,
/// opposite pairing and per-face direction subsets.
#[derive(Debug, PartialEq)]
pub struct Lattice {
    pub kind: LatticeKind,
    pub dim: usize,
    pub q: usize,
    pub velocities: &'static [[i32; 3]],
    pub weights: &'static [Float],
    pub opposite: &'static [usize],
    pub faces: &'static [FaceDirections],
    /// Faces on which the prescribed-velocity condition is implemented.
    pub velocity_faces: &'static [Face],
}

const D2Q9_VELOCITIES: [[i32; 3]; 9] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [-1, 0, 0],
    [0, -1, 0],
    [1, 1, 0],
    [-1, 1, 0],
    [-1, -1, 0],
    [1, -1, 0],
];

const D2Q9_WEIGHTS: [Float; 9] = [
    4.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

const D2Q9_OPPOSITE: [usize; 9] = [0, 3, 4, 1, 2, 7, 8, 5, 6];

const D2Q9_FACES: [FaceDirections; 4] = [
    FaceDirections { face: Face::Top, axis: Axis::Y, sign: 1, outgoing: &[2, 5, 6] },
    FaceDirections { face: Face::Bottom, axis: Axis::Y, sign: -1, outgoing: &[4, 7, 8] },
    FaceDirections { face: Face::Left, axis: Axis::X, sign: -1, outgoing: &[3, 6, 7] },
    FaceDirections { face: Face::Right, axis: Axis::X, sign: 1, outgoing: &[1, 5, 8] },
];

const D3Q19_VELOCITIES: [[i32; 3]; 19] = [
    // Middle plane, same layout as D2Q9
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [-1, 0, 0],
    [0, -1, 0],
    [1, 1, 0],
    [-1, 1, 0],
    [-1, -1, 0],
    [1, -1, 0],
    // Upper plane
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [-1, 0, 1],
    [0, -1, 1],
    // Lower plane
    [0, 0, -1],
    [1, 0, -1],
    [0, 1, -1],
    [-1, 0, -1],
    [0, -1, -1],
];

const D3Q19_WEIGHTS: [Float; 19] = [
    1.0 / 3.0,
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 18.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 18.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 18.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

const D3Q19_OPPOSITE: [usize; 19] = [
    0, 3, 4, 1, 2, 7, 8, 5, 6, // middle plane
    14, 17, 18, 15, 16, // upper -> lower
    9, 12, 13, 10, 11, // lower -> upper
];

const D3Q19_FACES: [FaceDirections; 6] = [
    FaceDirections { face: Face::Top, axis: Axis::Z, sign: 1, outgoing: &[9, 10, 11, 12, 13] },
    FaceDirections { face: Face::Bottom, axis: Axis::Z, sign: -1, outgoing: &[14, 15, 16, 17, 18] },
    FaceDirections { face: Face::Left, axis: Axis::X, sign: -1, outgoing: &[3, 6, 7, 12, 17] },
    FaceDirections { face: Face::Right, axis: Axis::X, sign: 1, outgoing: &[1, 5, 8, 10, 15] },
    FaceDirections { face: Face::Near, axis: Axis::Y, sign: -1, outgoing: &[4, 7, 8, 13, 18] },
    FaceDirections { face: Face::Far, axis: Axis::Y, sign: 1, outgoing: &[2, 5, 6, 11, 16] },
];

impl Lattice {
    /// Two-dimensional, nine-direction lattice.
    pub const D2Q9: Lattice = Lattice {
        kind: LatticeKind::D2Q9,
        dim: 2,
        q: 9,
        velocities: &D2Q9_VELOCITIES,
        weights: &D2Q9_WEIGHTS,
        opposite: &D2Q9_OPPOSITE,
        faces: &D2Q9_FACES,
        velocity_faces: &[Face::Left],
    };

    /// Three-dimensional, nineteen-direction lattice.
    pub const D3Q19: Lattice = Lattice {
        kind: LatticeKind::D3Q19,
        dim: 3,
        q: 19,
        velocities: &D3Q19_VELOCITIES,
        weights: &D3Q19_WEIGHTS,
        opposite: &D3Q19_OPPOSITE,
        faces: &D3Q19_FACES,
        velocity_faces: &[Face::Top],
    };

    /// Speed of sound squared in lattice units
    pub const CS2: Float = 1.0 / 3.0;

    pub fn face(&self, face: Face) -> Option<&FaceDirections> {
        self.faces.iter().find(|f| f.face == face)
    }

    pub fn has_face(&self, face: Face) -> bool {
        self.face(face).is_some()
    }

    pub fn supports_velocity(&self, face: Face) -> bool {
        self.velocity_faces.contains(&face)
    }

    /// Directions leaving the domain through `face`; empty for a face the
    /// lattice does not have.
    pub fn outgoing(&self, face: Face) -> &'static [usize] {
        self.face(face).map(|f| f.outgoing).unwrap_or(&[])
    }

    /// Directions entering the domain through `face`, paired index-wise
    /// with [`Lattice::outgoing`].
    pub fn incoming(&self, face: Face) -> impl Iterator<Item = usize> + '_ {
        self.outgoing(face).iter().map(move |&q| self.opposite[q])
    }

    /// Directions with no component along the normal of `face`.
    pub fn tangential(&self, face: Face) -> impl Iterator<Item = usize> + '_ {
        let axis = self.face(face).map(|f| f.axis as usize);
        (0..self.q).filter(move |&q| match axis {
            Some(a) => self.velocities[q][a] == 0,
            None => false,
        })
    }

    /// Axes lying in the plane of `face`.
    pub fn tangential_axes(&self, face: Face) -> impl Iterator<Item = Axis> + '_ {
        let normal = self.face(face).map(|f| f.axis);
        [Axis::X, Axis::Y, Axis::Z]
            .into_iter()
            .take(self.dim)
            .filter(move |&a| Some(a) != normal)
    }

    /// The face crossed when leaving the domain along `axis` with `sign`.
    pub fn face_on(&self, axis: Axis, sign: i32) -> Option<Face> {
        self.faces
            .iter()
            .find(|f| f.axis == axis && f.sign == sign)
            .map(|f| f.face)
    }

    /// Projection `e_q · v`.
    #[inline]
    pub fn dot(&self, q: usize, v: [Float; 3]) -> Float {
        let c = self.velocities[q];
        c[0] as Float * v[0] + c[1] as Float * v[1] + c[2] as Float * v[2]
    }

    /// Second-order equilibrium distribution for direction `q`.
    #[inline]
    pub fn equilibrium(&self, q: usize, density: Float, velocity: [Float; 3]) -> Float {
        let cu = self.dot(q, velocity);
        let u2 = velocity[0] * velocity[0] + velocity[1] * velocity[1] + velocity[2] * velocity[2];
        self.weights[q] * density * (1.0 + 3.0 * cu + 4.5 * cu * cu - 1.5 * u2)
    }

    /// Depth offset of direction `q` (zero for every 2D direction).
    #[inline]
    pub fn depth_offset(&self, q: usize) -> i32 {
        self.velocities[q][2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lattices() -> [&'static Lattice; 2] {
        [&Lattice::D2Q9, &Lattice::D3Q19]
    }

    #[test]
    fn opposite_is_an_involution() {
        for lattice in lattices() {
            assert_eq!(lattice.opposite[0], 0);
            for q in 0..lattice.q {
                let opp = lattice.opposite[q];
                assert_eq!(lattice.opposite[opp], q);
                for axis in 0..3 {
                    assert_eq!(lattice.velocities[opp][axis], -lattice.velocities[q][axis]);
                }
            }
        }
    }

    #[test]
    fn weights_sum_to_one() {
        for lattice in lattices() {
            assert_eq!(lattice.weights.len(), lattice.q);
            assert_eq!(lattice.velocities.len(), lattice.q);
            let total: Float = lattice.weights.iter().sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn second_moment_is_isotropic() {
        for lattice in lattices() {
            for a in 0..lattice.dim {
                for b in 0..lattice.dim {
                    let m: Float = (0..lattice.q)
                        .map(|q| {
                            let c = lattice.velocities[q];
                            lattice.weights[q] * (c[a] * c[b]) as Float
                        })
                        .sum();
                    let expected = if a == b { Lattice::CS2 } else { 0.0 };
                    assert_relative_eq!(m, expected, epsilon = 1e-14);
                }
            }
        }
    }

    #[test]
    fn face_tables_match_velocities() {
        for lattice in lattices() {
            for f in lattice.faces {
                let expected: Vec<usize> = (0..lattice.q)
                    .filter(|&q| lattice.velocities[q][f.axis as usize] == f.sign)
                    .collect();
                let mut table = f.outgoing.to_vec();
                table.sort_unstable();
                assert_eq!(table, expected, "{} on {:?}", f.face, lattice.kind);
            }
        }
    }

    #[test]
    fn d2q9_face_sets() {
        let l = &Lattice::D2Q9;
        assert_eq!(l.outgoing(Face::Top), &[2, 5, 6]);
        assert_eq!(l.outgoing(Face::Bottom), &[4, 7, 8]);
        assert_eq!(l.outgoing(Face::Left), &[3, 6, 7]);
        assert_eq!(l.outgoing(Face::Right), &[1, 5, 8]);
        assert_eq!(l.incoming(Face::Left).collect::<Vec<_>>(), vec![1, 8, 5]);
        assert_eq!(l.tangential(Face::Left).collect::<Vec<_>>(), vec![0, 2, 4]);
        assert!(!l.has_face(Face::Near));
        assert!(l.outgoing(Face::Far).is_empty());
    }

    #[test]
    fn d3q19_face_sets() {
        let l = &Lattice::D3Q19;
        assert_eq!(l.outgoing(Face::Top), &[9, 10, 11, 12, 13]);
        assert_eq!(l.outgoing(Face::Bottom), &[14, 15, 16, 17, 18]);
        assert_eq!(l.outgoing(Face::Near), &[4, 7, 8, 13, 18]);
        assert_eq!(l.outgoing(Face::Far), &[2, 5, 6, 11, 16]);
        assert_eq!(l.tangential(Face::Top).count(), 9);
        assert_eq!(l.tangential_axes(Face::Top).collect::<Vec<_>>(), vec![Axis::X, Axis::Y]);
        assert_eq!(l.face_on(Axis::Z, 1), Some(Face::Top));
    }

    #[test]
    fn equilibrium_at_rest_is_weighted_density() {
        for lattice in lattices() {
            for q in 0..lattice.q {
                let feq = lattice.equilibrium(q, 1.3, [0.0; 3]);
                assert_eq!(feq, lattice.weights[q] * 1.3);
            }
        }
    }

    #[test]
    fn equilibrium_reproduces_moments() {
        let u = [0.02, -0.01, 0.005];
        let lattice = &Lattice::D3Q19;
        let rho: Float = (0..lattice.q).map(|q| lattice.equilibrium(q, 1.1, u)).sum();
        assert_relative_eq!(rho, 1.1, epsilon = 1e-12);
        for axis in 0..3 {
            let j: Float = (0..lattice.q)
                .map(|q| lattice.equilibrium(q, 1.1, u) * lattice.velocities[q][axis] as Float)
                .sum();
            assert_relative_eq!(j, 1.1 * u[axis], epsilon = 1e-12);
        }
    }
}
