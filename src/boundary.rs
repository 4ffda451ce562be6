//! Boundary protocol around the streaming step.
//!
//! Populations that would stream out of the grid are captured per face
//! before streaming ([`BoundaryManager::prepare`]), transformed according to
//! the face's condition once streaming is done ([`BoundaryManager::periodic`],
//! [`BoundaryManager::bounce_back`], [`BoundaryManager::velocity`]) and written
//! back into the incoming directions ([`BoundaryManager::record`]). Streaming
//! itself therefore never has to look outside the grid.

use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::distribution::Populations;
use crate::error::BoundaryError;
use crate::field::{Shape, Site};
use crate::geometry::Medium;
use crate::lattice::{Face, FaceDirections, Lattice};
use crate::Float;

/// Boundary family requested when capturing or recording a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    Periodic,
    BounceBack,
    VonNeumann,
}

/// Condition declared for a face, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    Periodic,
    BounceBack,
    /// Prescribed velocity (Zou/He).
    Velocity([Float; 3]),
}

impl BoundaryCondition {
    pub fn kind(&self) -> BoundaryKind {
        match self {
            BoundaryCondition::Periodic => BoundaryKind::Periodic,
            BoundaryCondition::BounceBack => BoundaryKind::BounceBack,
            BoundaryCondition::Velocity(_) => BoundaryKind::VonNeumann,
        }
    }
}

/// Condition per face. Faces the lattice lacks stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundarySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<BoundaryCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<BoundaryCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<BoundaryCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<BoundaryCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near: Option<BoundaryCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub far: Option<BoundaryCondition>,
}

impl BoundarySet {
    /// The same condition on every face of `lattice`.
    pub fn uniform(lattice: &Lattice, condition: BoundaryCondition) -> Self {
        lattice
            .faces
            .iter()
            .fold(Self::default(), |set, f| set.with(f.face, condition))
    }

    pub fn with(mut self, face: Face, condition: BoundaryCondition) -> Self {
        *self.slot_mut(face) = Some(condition);
        self
    }

    pub fn get(&self, face: Face) -> Option<BoundaryCondition> {
        match face {
            Face::Top => self.top,
            Face::Bottom => self.bottom,
            Face::Left => self.left,
            Face::Right => self.right,
            Face::Near => self.near,
            Face::Far => self.far,
        }
    }

    fn slot_mut(&mut self, face: Face) -> &mut Option<BoundaryCondition> {
        match face {
            Face::Top => &mut self.top,
            Face::Bottom => &mut self.bottom,
            Face::Left => &mut self.left,
            Face::Right => &mut self.right,
            Face::Near => &mut self.near,
            Face::Far => &mut self.far,
        }
    }

    /// Condition of a lattice face, failing when none was assigned.
    pub fn condition(&self, face: Face) -> Result<BoundaryCondition, BoundaryError> {
        self.get(face).ok_or(BoundaryError::Unassigned { face })
    }

    /// Checks the whole set against `lattice` without touching any state.
    pub fn validate(&self, lattice: &Lattice) -> Result<(), BoundaryError> {
        for face in Face::ALL {
            if !lattice.has_face(face) {
                if self.get(face).is_some() {
                    return Err(BoundaryError::FaceNotInLattice {
                        face,
                        lattice: lattice.kind,
                    });
                }
                continue;
            }
            let condition = self.condition(face)?;
            check_supported(lattice, face, condition.kind())?;
            if condition.kind() == BoundaryKind::Periodic {
                let other = face.opposite();
                if self.get(other).map(|c| c.kind()) != Some(BoundaryKind::Periodic) {
                    return Err(BoundaryError::InvalidPairing { first: face, second: other });
                }
            }
        }
        Ok(())
    }
}

fn check_supported(lattice: &Lattice, face: Face, kind: BoundaryKind) -> Result<(), BoundaryError> {
    if !lattice.has_face(face) {
        return Err(BoundaryError::FaceNotInLattice {
            face,
            lattice: lattice.kind,
        });
    }
    if kind == BoundaryKind::VonNeumann && !lattice.supports_velocity(face) {
        return Err(BoundaryError::Unsupported { face, kind });
    }
    Ok(())
}

/// Per-face lifecycle within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceState {
    Uninitialized,
    Prepared,
    Transformed,
    Recorded,
    Invalid,
}

/// Captured face values keyed by direction, one slot per lattice direction.
/// Released buffers are kept for the next capture.
#[derive(Debug, Clone, Default)]
pub struct SliceMap {
    slots: Box<[Option<Vec<Float>>]>,
    spare: Vec<Vec<Float>>,
}

impl SliceMap {
    pub fn new(q: usize) -> Self {
        Self {
            slots: vec![None; q].into_boxed_slice(),
            spare: Vec::new(),
        }
    }

    /// Number of captured directions.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, direction: usize) -> bool {
        matches!(self.slots.get(direction), Some(Some(_)))
    }

    pub fn get(&self, direction: usize) -> Option<&[Float]> {
        self.slots.get(direction)?.as_deref()
    }

    pub fn get_mut(&mut self, direction: usize) -> Option<&mut [Float]> {
        self.slots.get_mut(direction)?.as_deref_mut()
    }

    /// Captured directions in ascending order.
    pub fn directions(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(d, s)| s.as_ref().map(|_| d))
    }

    pub fn insert(&mut self, direction: usize, values: Vec<Float>) {
        if let Some(old) = self.slots[direction].replace(values) {
            self.spare.push(old);
        }
    }

    pub fn remove(&mut self, direction: usize) -> Option<Vec<Float>> {
        self.slots.get_mut(direction)?.take()
    }

    fn discard(&mut self, direction: usize) {
        if let Some(old) = self.remove(direction) {
            self.spare.push(old);
        }
    }

    /// Exchange the labels of two directions.
    pub fn swap_labels(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
    }

    fn buffer(&mut self) -> Vec<Float> {
        let mut buf = self.spare.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(old) = slot.take() {
                self.spare.push(old);
            }
        }
    }
}

impl PartialEq for SliceMap {
    fn eq(&self, other: &Self) -> bool {
        self.slots == other.slots
    }
}

impl fmt::Display for SliceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.directions() {
            write!(f, "f[{}] =", d)?;
            for v in self.get(d).unwrap_or_default() {
                write!(f, " {:.3}", v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FaceSlot {
    kind: Option<BoundaryKind>,
    state: FaceState,
    map: SliceMap,
}

/// Captures, transforms and restores the populations crossing each face.
#[derive(Debug, Clone)]
pub struct BoundaryManager {
    lattice: &'static Lattice,
    shape: Shape,
    medium: Medium,
    faces: Vec<FaceSlot>,
}

impl BoundaryManager {
    pub fn new(lattice: &'static Lattice, shape: Shape) -> Self {
        let faces = Face::ALL
            .iter()
            .map(|_| FaceSlot {
                kind: None,
                state: FaceState::Uninitialized,
                map: SliceMap::new(lattice.q),
            })
            .collect();
        Self {
            lattice,
            shape,
            medium: Medium::fluid(shape.nx, shape.ny, shape.nz),
            faces,
        }
    }

    /// Restrict the write-back to the fluid sites of `medium`. Without it
    /// every site counts as fluid.
    pub fn with_medium(mut self, medium: &Medium) -> Self {
        debug_assert_eq!(medium.shape(), self.shape);
        self.medium = medium.clone();
        self
    }

    pub fn state(&self, face: Face) -> FaceState {
        self.faces[face.index()].state
    }

    /// Values currently held for `face`.
    pub fn slice(&self, face: Face) -> &SliceMap {
        &self.faces[face.index()].map
    }

    /// Forget any half-finished iteration.
    pub fn reset(&mut self) {
        for slot in &mut self.faces {
            slot.kind = None;
            slot.state = FaceState::Uninitialized;
            slot.map.clear();
        }
    }

    fn directions(&self, face: Face) -> Result<&'static FaceDirections, BoundaryError> {
        self.lattice
            .face(face)
            .ok_or(BoundaryError::FaceNotInLattice {
                face,
                lattice: self.lattice.kind,
            })
    }

    /// Capture the values at `face` that `kind` will need. Bounce-back and
    /// periodic faces keep the outgoing directions; a velocity face keeps
    /// every direction known after streaming (tangential and outgoing).
    pub fn prepare(
        &mut self,
        face: Face,
        kind: BoundaryKind,
        f: &Populations,
    ) -> Result<(), BoundaryError> {
        if let Err(err) = check_supported(self.lattice, face, kind) {
            self.faces[face.index()].state = FaceState::Invalid;
            return Err(err);
        }
        let fd = self.directions(face)?;
        let lattice = self.lattice;
        let slot = &mut self.faces[face.index()];
        match slot.state {
            FaceState::Uninitialized | FaceState::Recorded => {}
            found => {
                return Err(BoundaryError::OutOfOrder {
                    face,
                    expected: FaceState::Uninitialized,
                    found,
                });
            }
        }

        slot.map.clear();
        let capture = |q: usize, map: &mut SliceMap| -> Result<(), BoundaryError> {
            let mut buf = map.buffer();
            f.boundary_values_into(face, q, &mut buf)?;
            map.insert(q, buf);
            Ok(())
        };
        if kind == BoundaryKind::VonNeumann {
            for q in lattice.tangential(face) {
                capture(q, &mut slot.map)?;
            }
        }
        for &q in fd.outgoing {
            capture(q, &mut slot.map)?;
        }

        slot.kind = Some(kind);
        slot.state = FaceState::Prepared;
        trace!("{} prepared as {:?}: directions {:?}", face, kind, slot.map.directions().collect::<Vec<_>>());
        Ok(())
    }

    /// Validate the whole set, then capture every face of the lattice. No face
    /// is captured when any of them is invalid.
    pub fn prepare_all(&mut self, set: &BoundarySet, f: &Populations) -> Result<(), BoundaryError> {
        if let Err(err) = set.validate(self.lattice) {
            if let BoundaryError::Unsupported { face, .. } = err {
                self.faces[face.index()].state = FaceState::Invalid;
            }
            return Err(err);
        }
        for fd in self.lattice.faces {
            self.prepare(fd.face, set.condition(fd.face)?.kind(), f)?;
        }
        Ok(())
    }

    fn expect_transformable(&self, face: Face, kind: BoundaryKind) -> Result<(), BoundaryError> {
        let slot = &self.faces[face.index()];
        match slot.state {
            FaceState::Prepared | FaceState::Transformed => {}
            found => {
                return Err(BoundaryError::OutOfOrder {
                    face,
                    expected: FaceState::Prepared,
                    found,
                });
            }
        }
        match slot.kind {
            Some(found) if found != kind => Err(BoundaryError::KindMismatch {
                face,
                expected: kind,
                found,
            }),
            _ => Ok(()),
        }
    }

    /// Hand each face of an opposite pair the other's captured values.
    pub fn periodic(&mut self, first: Face, second: Face) -> Result<(), BoundaryError> {
        if first.opposite() != second || !self.lattice.has_face(first) || !self.lattice.has_face(second) {
            return Err(BoundaryError::InvalidPairing { first, second });
        }
        self.expect_transformable(first, BoundaryKind::Periodic)?;
        self.expect_transformable(second, BoundaryKind::Periodic)?;

        let a = std::mem::take(&mut self.faces[first.index()].map);
        let b = std::mem::replace(&mut self.faces[second.index()].map, a);
        self.faces[first.index()].map = b;

        self.faces[first.index()].state = FaceState::Transformed;
        self.faces[second.index()].state = FaceState::Transformed;
        trace!("{} <-> {} swapped", first, second);
        Ok(())
    }

    /// Relabel each captured direction as its opposite. Applying it twice
    /// restores the captured labels.
    pub fn bounce_back(&mut self, face: Face) -> Result<(), BoundaryError> {
        let fd = self.directions(face)?;
        self.expect_transformable(face, BoundaryKind::BounceBack)?;
        let slot = &mut self.faces[face.index()];
        for &d in fd.outgoing {
            let opp = self.lattice.opposite[d];
            if !slot.map.contains(d) && !slot.map.contains(opp) {
                return Err(BoundaryError::MissingDirection { face, direction: d });
            }
            slot.map.swap_labels(d, opp);
        }
        slot.state = FaceState::Transformed;
        trace!("{} bounced back", face);
        Ok(())
    }

    /// Zou/He velocity condition: rebuild the incoming populations at `face`
    /// so that each site carries `velocity`. Known directions are taken from
    /// the post-streaming store wherever streaming could deliver them, the
    /// captured values standing in elsewhere. Only the rebuilt directions stay
    /// in the slice map afterwards.
    pub fn velocity(
        &mut self,
        face: Face,
        f: &Populations,
        velocity: [Float; 3],
    ) -> Result<(), BoundaryError> {
        let fd = self.directions(face)?;
        let lattice = self.lattice;
        let shape = self.shape;
        {
            let slot = &self.faces[face.index()];
            if slot.state != FaceState::Prepared {
                return Err(BoundaryError::OutOfOrder {
                    face,
                    expected: FaceState::Prepared,
                    found: slot.state,
                });
            }
            match slot.kind {
                Some(BoundaryKind::VonNeumann) | None => {}
                Some(found) => {
                    return Err(BoundaryError::KindMismatch {
                        face,
                        expected: BoundaryKind::VonNeumann,
                        found,
                    });
                }
            }
        }
        check_supported(lattice, face, BoundaryKind::VonNeumann)?;

        let known: Vec<usize> = lattice
            .tangential(face)
            .chain(fd.outgoing.iter().copied())
            .collect();
        let map = &mut self.faces[face.index()].map;

        for &k in &known {
            let c = lattice.velocities[k];
            let upstream = [-c[0], -c[1], -c[2]];
            let values = map
                .get_mut(k)
                .ok_or(BoundaryError::MissingDirection { face, direction: k })?;
            let field = &f[k];
            for (i, site) in shape.face_sites(fd.axis, fd.sign).enumerate() {
                if shape.offset(site, upstream).is_some() {
                    values[i] = field.at(site);
                }
            }
        }

        let n_sites = shape.face_len(fd.axis);
        let mut rebuilt: Vec<(usize, Vec<Float>)> = Vec::with_capacity(fd.outgoing.len());
        for &d in fd.outgoing {
            let mut buf = map.buffer();
            buf.resize(n_sites, 0.0);
            rebuilt.push((lattice.opposite[d], buf));
        }

        let axis = fd.axis as usize;
        let normal_velocity = fd.sign as Float * velocity[axis];
        let captured: &SliceMap = map;
        let value = |q: usize, i: usize| captured.get(q).map_or(0.0, |v| v[i]);
        for i in 0..n_sites {
            let mut tangential = 0.0;
            let mut momentum = [0.0; 3];
            for q in lattice.tangential(face) {
                let v = value(q, i);
                let c = lattice.velocities[q];
                tangential += v;
                for t in 0..3 {
                    momentum[t] += v * c[t] as Float;
                }
            }
            let outgoing: Float = fd.outgoing.iter().map(|&q| value(q, i)).sum();
            let rho = (tangential + 2.0 * outgoing) / (1.0 + normal_velocity);

            // Transverse momentum correction per in-plane axis
            let mut correction = [0.0; 3];
            for t in lattice.tangential_axes(face) {
                let t = t as usize;
                correction[t] = 0.5 * momentum[t] - rho * velocity[t] / 3.0;
            }

            for (&d, (incoming, out)) in fd.outgoing.iter().zip(rebuilt.iter_mut()) {
                let c = lattice.velocities[*incoming];
                let mut fi = value(d, i)
                    + 6.0 * lattice.weights[*incoming] * rho * lattice.dot(*incoming, velocity);
                for t in 0..3 {
                    if t != axis {
                        fi -= c[t] as Float * correction[t];
                    }
                }
                out[i] = fi;
            }
        }

        let map = &mut self.faces[face.index()].map;
        for &k in &known {
            map.discard(k);
        }
        for (q, values) in rebuilt {
            map.insert(q, values);
        }
        self.faces[face.index()].state = FaceState::Transformed;
        trace!("{} velocity set to {:?}", face, velocity);
        Ok(())
    }

    /// Apply the declared condition on every face.
    pub fn apply_all(&mut self, set: &BoundarySet, f: &Populations) -> Result<(), BoundaryError> {
        for fd in self.lattice.faces {
            match set.condition(fd.face)? {
                BoundaryCondition::Periodic => {
                    // Each pair is swapped once, from its first listed face
                    if matches!(fd.face, Face::Top | Face::Left | Face::Near) {
                        self.periodic(fd.face, fd.face.opposite())?;
                    }
                }
                BoundaryCondition::BounceBack => self.bounce_back(fd.face)?,
                BoundaryCondition::Velocity(u) => self.velocity(fd.face, f, u)?,
            }
        }
        Ok(())
    }

    /// Write the transformed values of `face` into its incoming directions.
    pub fn record(
        &mut self,
        face: Face,
        kind: BoundaryKind,
        f: &mut Populations,
    ) -> Result<(), BoundaryError> {
        let fd = self.directions(face)?;
        let slot = &self.faces[face.index()];
        if slot.state != FaceState::Transformed {
            return Err(BoundaryError::OutOfOrder {
                face,
                expected: FaceState::Transformed,
                found: slot.state,
            });
        }
        if let Some(found) = slot.kind {
            if found != kind {
                return Err(BoundaryError::KindMismatch {
                    face,
                    expected: kind,
                    found,
                });
            }
        }
        for q in self.lattice.incoming(face) {
            if !slot.map.contains(q) {
                return Err(BoundaryError::MissingDirection { face, direction: q });
            }
        }

        let mut buf = Vec::new();
        match kind {
            BoundaryKind::BounceBack | BoundaryKind::VonNeumann => {
                for q in self.lattice.incoming(face) {
                    if let Some(values) = slot.map.get(q) {
                        f.boundary_values_into(face, q, &mut buf)?;
                        let sites = self.shape.face_sites(fd.axis, fd.sign);
                        for ((site, out), &v) in sites.zip(buf.iter_mut()).zip(values) {
                            if self.medium.is_fluid_site(site) {
                                *out = v;
                            }
                        }
                        f.set_boundary_values(face, q, &buf)?;
                    }
                }
            }
            BoundaryKind::Periodic => {
                let mut reflected = Vec::new();
                for q in self.lattice.incoming(face) {
                    if let Some(values) = slot.map.get(q) {
                        f.boundary_values_into(face, q, &mut buf)?;
                        self.wrap_into(fd, q, values, &mut buf, &mut reflected);
                        f.set_boundary_values(face, q, &buf)?;
                    }
                }
                for (q, site, value) in reflected {
                    *f[q].at_mut(site) = value;
                }
            }
        }

        let slot = &mut self.faces[face.index()];
        slot.map.clear();
        slot.state = FaceState::Recorded;
        trace!("{} recorded", face);
        Ok(())
    }

    /// Place values captured on the opposite face at their periodic
    /// destinations on `fd`. A destination pushed past an edge of the face
    /// wraps around when the face across that edge is periodic too and is
    /// left to that face's own condition otherwise. Solid sources send
    /// nothing; a value aimed at a solid destination is pushed to `reflected`
    /// as `(opposite(q), source, value)`.
    fn wrap_into(
        &self,
        fd: &FaceDirections,
        q: usize,
        values: &[Float],
        out: &mut [Float],
        reflected: &mut Vec<(usize, Site, Float)>,
    ) {
        let shape = self.shape;
        let c = self.lattice.velocities[q];
        let axis = fd.axis as usize;
        let source_layer = if fd.sign > 0 { 0 } else { shape.extent(fd.axis) - 1 };
        'sites: for (i, site) in shape.face_sites(fd.axis, fd.sign).enumerate() {
            let mut source = site;
            source[axis] = source_layer;
            if !self.medium.is_fluid_site(source) {
                continue;
            }
            let mut dest: Site = site;
            for t in 0..3 {
                if t == axis || c[t] == 0 {
                    continue;
                }
                let extent = [shape.nx, shape.ny, shape.nz][t] as i64;
                let moved = site[t] as i64 + c[t] as i64;
                if (0..extent).contains(&moved) {
                    dest[t] = moved as usize;
                    continue;
                }
                let across = self.lattice.faces.iter().find(|f| f.axis as usize == t && f.sign == c[t]);
                let wraps = across
                    .map(|f| self.faces[f.face.index()].kind == Some(BoundaryKind::Periodic))
                    .unwrap_or(false);
                if !wraps {
                    continue 'sites;
                }
                dest[t] = moved.rem_euclid(extent) as usize;
            }
            if self.medium.is_fluid_site(dest) {
                out[shape.face_index(fd.axis, dest)] = values[i];
            } else {
                reflected.push((self.lattice.opposite[q], source, values[i]));
            }
        }
    }

    /// Record every face of the lattice, then clear the store's boundary
    /// scratch state and start the next iteration fresh.
    pub fn record_all(&mut self, set: &BoundarySet, f: &mut Populations) -> Result<(), BoundaryError> {
        for fd in self.lattice.faces {
            self.record(fd.face, set.condition(fd.face)?.kind(), f)?;
        }
        f.clear_boundary_scratch();
        for slot in &mut self.faces {
            slot.state = FaceState::Uninitialized;
        }
        Ok(())
    }
}

impl fmt::Display for BoundaryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fd in self.lattice.faces {
            writeln!(f, "{} BOUNDARY ------", fd.face)?;
            write!(f, "{}", self.slice(fd.face))?;
        }
        Ok(())
    }
}
