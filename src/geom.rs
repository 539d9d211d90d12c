///! Basic geometry: planes, bounding boxes and convex windings

use glam::DVec3;

/// Maximal absolute world coordinate
pub const MAX_WORLD_WIDTH: f64 = 4096.0;

/// Half-size of base windings, larger than any world
pub const BOGUS_RANGE: f64 = MAX_WORLD_WIDTH * 4.0;

/// Default point-on-plane classification epsilon
pub const ON_EPSILON: f64 = 0.1;

/// Edges shorter than this don't count in tiny winding check
pub const EDGE_LENGTH: f64 = 0.2;

/// Plane normal comparison epsilon
pub const NORMAL_EPSILON: f64 = 0.00001;

/// Plane distance comparison epsilon
pub const DIST_EPSILON: f64 = 0.01;

/// Plane classifier by the dominant normal axis
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaneType {
    /// Normal is exactly (±1, 0, 0)
    X,

    /// Normal is exactly (0, ±1, 0)
    Y,

    /// Normal is exactly (0, 0, ±1)
    Z,

    /// Non-axial, X component dominates
    AnyX,

    /// Non-axial, Y component dominates
    AnyY,

    /// Non-axial, Z component dominates
    AnyZ,
}

impl PlaneType {
    /// Classify normal
    pub fn for_normal(normal: DVec3) -> Self {
        if normal.x == 1.0 || normal.x == -1.0 {
            return Self::X;
        }
        if normal.y == 1.0 || normal.y == -1.0 {
            return Self::Y;
        }
        if normal.z == 1.0 || normal.z == -1.0 {
            return Self::Z;
        }

        let abs = normal.abs();

        if abs.x >= abs.y && abs.x >= abs.z {
            Self::AnyX
        } else if abs.y >= abs.z {
            Self::AnyY
        } else {
            Self::AnyZ
        }
    }

    /// Is plane axis-aligned
    pub fn is_axial(self) -> bool {
        matches!(self, Self::X | Self::Y | Self::Z)
    }

    /// Dominant axis index
    pub fn axis(self) -> usize {
        match self {
            Self::X | Self::AnyX => 0,
            Self::Y | Self::AnyY => 1,
            Self::Z | Self::AnyZ => 2,
        }
    }
}

/// Plane represetnation structure
///
/// ## Equation
/// Point `p` lies on the plane if `normal · p = distance`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    /// Plane normal, unit length
    pub normal: DVec3,

    /// number to multiply normal to to get basic point
    pub distance: f64,

    /// Axis classifier
    pub ty: PlaneType,
}

impl Plane {
    /// Build plane from normal and distance
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance, ty: PlaneType::for_normal(normal) }
    }

    /// Build plane from three points. Points are clockwise if watched from plane front.
    pub fn from_points(p0: DVec3, p1: DVec3, p2: DVec3) -> Option<Self> {
        let normal = (p2 - p0).cross(p1 - p0);
        let length = normal.length();

        if length < 0.5 {
            return None;
        }

        let normal = normal / length;

        Some(Self::new(normal, normal.dot(p0)))
    }

    /// Signed distance from the plane to point
    pub fn distance_to(&self, point: DVec3) -> f64 {
        self.normal.dot(point) - self.distance
    }

    /// Make plane that contains equal point set, but has counter-directional normal
    pub fn negate_direction(self) -> Self {
        Self::new(-self.normal, -self.distance)
    }
}

/// Bounding box
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundBox {
    /// minimal vector
    pub min: DVec3,

    /// maximal vector
    pub max: DVec3,
}

impl BoundBox {
    /// 'Empty' bounding box
    pub fn zero() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Build minimal boundbox that contains this pair of points
    pub fn new(p1: DVec3, p2: DVec3) -> Self {
        Self { min: p1.min(p2), max: p1.max(p2) }
    }

    /// Check if boundbox contains nothing
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get boundbox dimensions
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Boundbox center point
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Extend boundbox to contain point
    pub fn add_point(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Extend boundbox by some (positive) vector.
    pub fn extend(self, delta: DVec3) -> Self {
        Self { min: self.min - delta, max: self.max + delta }
    }

    /// Get minimal boundbox that contains all points from both of `self` and `rhs`
    pub fn total(&self, rhs: &BoundBox) -> Self {
        Self { min: self.min.min(rhs.min), max: self.max.max(rhs.max) }
    }

    /// Calculate common boundbox for some point sef.
    pub fn for_points(iter: impl Iterator<Item = DVec3>) -> Self {
        let mut result = Self::zero();

        for point in iter {
            result.add_point(point);
        }

        result
    }

    /// Check if boundbox intersection isn't empty
    pub fn is_intersecting(&self, another: &BoundBox) -> bool {
        true
            && self.max.x >= another.min.x && self.min.x <= another.max.x
            && self.max.y >= another.min.y && self.min.y <= another.max.y
            && self.max.z >= another.min.z && self.min.z <= another.max.z
    } // is_intersecting

    /// Check if boundbox completely contains another one
    pub fn contains(&self, another: &BoundBox) -> bool {
        true
            && another.min.x >= self.min.x && another.max.x <= self.max.x
            && another.min.y >= self.min.y && another.max.y <= self.max.y
            && another.min.z >= self.min.z && another.max.z <= self.max.z
    }

    /// Check if point lies inside of the boundbox
    pub fn contains_point(&self, point: DVec3) -> bool {
        true
            && point.x >= self.min.x && point.x <= self.max.x
            && point.y >= self.min.y && point.y <= self.max.y
            && point.z >= self.min.z && point.z <= self.max.z
    }
}

/// Convex polygon. Points are clockwise if watched from the front.
#[derive(Debug, Clone, PartialEq)]
pub struct Winding {
    /// Polygon points
    pub points: Vec<DVec3>,
}

impl Winding {
    /// Build winding from point vector
    pub fn new(points: Vec<DVec3>) -> Self {
        Self { points }
    }

    /// Build huge quad lying on the plane
    pub fn base_for_plane(normal: DVec3, distance: f64) -> Self {
        // find the major axis
        let abs = normal.abs();
        let axis = if abs.x >= abs.y && abs.x >= abs.z {
            0
        } else if abs.y >= abs.z {
            1
        } else {
            2
        };

        let mut vup = match axis {
            0 | 1 => DVec3::Z,
            _ => DVec3::X,
        };

        vup = (vup - normal * vup.dot(normal)).normalize() * BOGUS_RANGE;

        let org = normal * distance;
        let vright = vup.cross(normal);

        Self {
            points: vec![
                org - vright + vup,
                org + vright + vup,
                org + vright - vup,
                org - vright - vup,
            ],
        }
    }

    /// Plane the winding lies on
    pub fn plane(&self) -> Option<Plane> {
        if self.points.len() < 3 {
            return None;
        }

        let normal = (self.points[2] - self.points[0])
            .cross(self.points[1] - self.points[0])
            .try_normalize()?;

        Some(Plane::new(normal, normal.dot(self.points[0])))
    }

    /// Polygon area
    pub fn area(&self) -> f64 {
        let Some(&first) = self.points.first() else {
            return 0.0;
        };

        self.points
            .windows(2)
            .skip(1)
            .map(|pair| (pair[0] - first).cross(pair[1] - first).length() * 0.5)
            .sum()
    }

    /// Average of winding points
    pub fn center(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }

        self.points.iter().copied().sum::<DVec3>() / self.points.len() as f64
    }

    /// Winding boundbox
    pub fn bounds(&self) -> BoundBox {
        BoundBox::for_points(self.points.iter().copied())
    }

    /// Same winding watched from back
    pub fn reversed(&self) -> Self {
        Self { points: self.points.iter().rev().copied().collect() }
    }

    /// Check if winding has less than three 'real' edges
    pub fn is_tiny(&self) -> bool {
        let mut edges = 0;

        for i in 0..self.points.len() {
            let j = (i + 1) % self.points.len();

            if (self.points[j] - self.points[i]).length() > EDGE_LENGTH {
                edges += 1;
                if edges == 3 {
                    return false;
                }
            }
        }

        true
    }

    /// Check if winding reaches base winding range
    pub fn is_huge(&self) -> bool {
        self.points
            .iter()
            .any(|p| p.abs().max_element() > BOGUS_RANGE - 1.0)
    }

    /// Remove points lying on the line between their neighbours
    pub fn remove_colinear_points(&mut self) {
        let count = self.points.len();
        let mut kept = Vec::with_capacity(count);

        for i in 0..count {
            let next = self.points[(i + 1) % count];
            let prev = self.points[(i + count - 1) % count];

            let v1 = (next - self.points[i]).normalize_or_zero();
            let v2 = (self.points[i] - prev).normalize_or_zero();

            if v1.dot(v2) < 0.999 {
                kept.push(self.points[i]);
            }
        }

        if kept.len() >= 3 {
            self.points = kept;
        }
    }

    /// Split winding by plane into (front, back) parts. Points closer than
    /// `epsilon` to the plane belong to both parts.
    pub fn clip(&self, normal: DVec3, distance: f64, epsilon: f64) -> (Option<Winding>, Option<Winding>) {
        #[derive(Copy, Clone, PartialEq, Eq)]
        enum Side {
            Front,
            Back,
            On,
        }

        let dists = self.points
            .iter()
            .map(|p| normal.dot(*p) - distance)
            .collect::<Vec<_>>();

        let sides = dists
            .iter()
            .map(|d| if *d > epsilon {
                Side::Front
            } else if *d < -epsilon {
                Side::Back
            } else {
                Side::On
            })
            .collect::<Vec<_>>();

        let front_count = sides.iter().filter(|s| **s == Side::Front).count();
        let back_count = sides.iter().filter(|s| **s == Side::Back).count();

        if front_count == 0 {
            return (None, Some(self.clone()));
        }
        if back_count == 0 {
            return (Some(self.clone()), None);
        }

        let count = self.points.len();
        let mut front = Vec::with_capacity(count + 4);
        let mut back = Vec::with_capacity(count + 4);

        for i in 0..count {
            let p1 = self.points[i];

            match sides[i] {
                Side::On => {
                    front.push(p1);
                    back.push(p1);
                    continue;
                }
                Side::Front => front.push(p1),
                Side::Back => back.push(p1),
            }

            let j = (i + 1) % count;

            if sides[j] == Side::On || sides[j] == sides[i] {
                continue;
            }

            // generate a split point
            let p2 = self.points[j];
            let dot = dists[i] / (dists[i] - dists[j]);
            let mut mid = DVec3::ZERO;

            for axis in 0..3 {
                // avoid round off error when possible
                mid[axis] = if normal[axis] == 1.0 {
                    distance
                } else if normal[axis] == -1.0 {
                    -distance
                } else {
                    p1[axis] + dot * (p2[axis] - p1[axis])
                };
            }

            front.push(mid);
            back.push(mid);
        }

        let finish = |points: Vec<DVec3>| {
            let winding = Winding { points };

            if winding.points.len() < 3 || winding.area() < 1e-8 {
                None
            } else {
                Some(winding)
            }
        };

        (finish(front), finish(back))
    }

    /// Clip winding keeping part in front of plane only
    pub fn chop(self, normal: DVec3, distance: f64, epsilon: f64) -> Option<Winding> {
        self.clip(normal, distance, epsilon).0
    }
}


// geom.rs
