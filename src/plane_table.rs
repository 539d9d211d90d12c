///! Session plane table. Planes are stored in pairs: `2k` and `2k + 1` hold
///! the same plane with opposite normals, and the even one always has its
///! dominant normal component positive.

use glam::DVec3;

use crate::{error::{check_capacity, Error}, geom::{self, Plane}, limits};

/// Count of distance hash buckets
const PLANE_HASHES: usize = 1024;

/// Plane identifier
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
pub struct PlaneId(u32);

impl PlaneId {
    /// Build id from table index
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get table index
    pub fn into_index(self) -> usize {
        self.0 as usize
    }

    /// Same plane, opposite direction
    pub fn negated(self) -> Self {
        Self(self.0 ^ 1)
    }

    /// Canonical (even) plane of the pair
    pub fn positive(self) -> Self {
        Self(self.0 & !1)
    }

    /// Is this the odd plane of the pair
    pub fn is_back(self) -> bool {
        self.0 & 1 != 0
    }

    /// Plane of the same pair with the given side bit
    pub fn with_side(self, back: bool) -> Self {
        Self((self.0 & !1) | back as u32)
    }
}

/// Deduplicating plane storage
pub struct PlaneTable {
    /// All planes, in pairs
    planes: Vec<Plane>,

    /// Hash chains by absolute distance
    hash: Vec<Vec<PlaneId>>,
}

/// Snap nearly-axial normals and nearly-integer distances
fn snap_plane(mut normal: DVec3, mut distance: f64) -> (DVec3, f64) {
    for axis in 0..3 {
        if (normal[axis] - 1.0).abs() < geom::NORMAL_EPSILON {
            normal = DVec3::ZERO;
            normal[axis] = 1.0;
            break;
        }
        if (normal[axis] + 1.0).abs() < geom::NORMAL_EPSILON {
            normal = DVec3::ZERO;
            normal[axis] = -1.0;
            break;
        }
    }

    let rounded = distance.round();
    if (distance - rounded).abs() < geom::DIST_EPSILON {
        distance = rounded;
    }

    (normal, distance)
}

fn hash_distance(distance: f64) -> usize {
    (distance.abs() as usize).wrapping_mul(27) & (PLANE_HASHES - 1)
}

fn plane_equal(plane: &Plane, normal: DVec3, distance: f64) -> bool {
    true
        && (plane.normal.x - normal.x).abs() < geom::NORMAL_EPSILON
        && (plane.normal.y - normal.y).abs() < geom::NORMAL_EPSILON
        && (plane.normal.z - normal.z).abs() < geom::NORMAL_EPSILON
        && (plane.distance - distance).abs() < geom::DIST_EPSILON
}

impl PlaneTable {
    /// Create empty table
    pub fn new() -> Self {
        Self {
            planes: Vec::new(),
            hash: vec![Vec::new(); PLANE_HASHES],
        }
    }

    /// Find plane or register new plane pair
    pub fn find_or_add(&mut self, normal: DVec3, distance: f64) -> Result<PlaneId, Error> {
        if normal.length() < 0.5 {
            return Err(Error::InvalidPlane(normal));
        }

        let (normal, distance) = snap_plane(normal, distance);
        let hash = hash_distance(distance);

        for bucket in [hash.wrapping_sub(1), hash, hash + 1] {
            for id in &self.hash[bucket & (PLANE_HASHES - 1)] {
                if plane_equal(&self.planes[id.into_index()], normal, distance) {
                    return Ok(*id);
                }
            }
        }

        check_capacity("planes", self.planes.len() + 2, limits::MAX_MAP_PLANES)?;

        let plane = Plane::new(normal, distance);
        let flipped = plane.negate_direction();
        let index = self.planes.len();

        let requested = if plane.normal[plane.ty.axis()] > 0.0 {
            self.planes.push(plane);
            self.planes.push(flipped);
            PlaneId::from_index(index)
        } else {
            self.planes.push(flipped);
            self.planes.push(plane);
            PlaneId::from_index(index + 1)
        };

        self.hash[hash].push(PlaneId::from_index(index));
        self.hash[hash].push(PlaneId::from_index(index + 1));

        Ok(requested)
    }

    /// Register plane built from three points
    pub fn from_points(&mut self, p0: DVec3, p1: DVec3, p2: DVec3) -> Result<Option<PlaneId>, Error> {
        match Plane::from_points(p0, p1, p2) {
            Some(plane) => self.find_or_add(plane.normal, plane.distance).map(Some),
            None => Ok(None),
        }
    }

    /// Get plane by id
    pub fn get(&self, id: PlaneId) -> &Plane {
        &self.planes[id.into_index()]
    }

    /// All planes
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Count of planes
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// Check if table is empty
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }
}

impl Default for PlaneTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;

    #[test]
    fn pairs_are_canonical() {
        let mut table = PlaneTable::new();

        let down = table.find_or_add(DVec3::NEG_Z, -64.0).unwrap();
        let up = table.find_or_add(DVec3::Z, 64.0).unwrap();

        assert!(down.is_back());
        assert_eq!(up, down.negated());
        assert_eq!(up.positive(), up);
        assert_eq!(table.get(up).normal, DVec3::Z);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn snapping_merges_close_planes() {
        let mut table = PlaneTable::new();

        let a = table.find_or_add(DVec3::new(0.0, 0.999999, 0.0), 31.995).unwrap();
        let b = table.find_or_add(DVec3::Y, 32.0).unwrap();

        assert_eq!(a, b);
        assert_eq!(table.get(a).distance, 32.0);
    }

    #[test]
    fn distinct_planes_get_distinct_ids() {
        let mut table = PlaneTable::new();
        let normal = DVec3::new(1.0, -1.0, 0.0).normalize();

        let a = table.find_or_add(normal, 10.0).unwrap();
        let b = table.find_or_add(normal, 10.5).unwrap();
        let c = table.find_or_add(-normal, -10.0).unwrap();

        assert_ne!(a.positive(), b.positive());
        assert_eq!(c, a.negated());
        assert!(table.get(a.positive()).normal.x > 0.0);
    }

    #[test]
    fn degenerate_normal_is_rejected() {
        let mut table = PlaneTable::new();

        assert!(matches!(
            table.find_or_add(DVec3::splat(0.1), 0.0),
            Err(Error::InvalidPlane(_))
        ));
    }
}

// plane_table.rs
