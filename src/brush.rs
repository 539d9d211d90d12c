///! Convex brushes and brush splitting

use bitflags::bitflags;
use glam::DVec3;

use crate::{
    error::Error,
    flags::{Contents, SurfaceFlags},
    geom::{self, BoundBox, Plane, Winding},
    plane_table::{PlaneId, PlaneTable},
};

/// Plane epsilon used in box side test
pub const PLANESIDE_EPSILON: f64 = 0.001;

bitflags! {
    /// Brush side state
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SideFlags: u8 {
        /// Side is seen from some non-solid leaf
        const VISIBLE = 0x1;

        /// Side plane was already tested as splitter in current node
        const TESTED = 0x2;

        /// Side is an expansion bevel, never a splitter and never drawn
        const BEVEL = 0x4;

        /// Side lies on some node plane already
        const NODE = 0x8;
    }
}

bitflags! {
    /// Brush relation to the plane
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct PlaneSide: u8 {
        const FRONT = 0x1;
        const BACK = 0x2;
        const BOTH = 0x3;

        /// Brush has a side on this plane
        const FACING = 0x4;
    }
}

/// Reference to a side of map brush
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct SideRef {
    /// Map brush index in session brush arena
    pub brush: usize,

    /// Side index in map brush
    pub side: usize,
}

/// Brush side
#[derive(Clone, Debug)]
pub struct Side {
    /// Side plane, normal points outside of brush
    pub plane: PlaneId,

    /// Texture projection, none for sides made by splits
    pub texinfo: Option<usize>,

    /// Side polygon
    pub winding: Option<Winding>,

    /// Map side this side originates from
    pub original: Option<SideRef>,

    /// Side contents
    pub contents: Contents,

    /// Side surface flags
    pub surface: SurfaceFlags,

    /// Side state
    pub flags: SideFlags,
}

impl Side {
    /// Side made on some splitter plane
    pub fn new_split(plane: PlaneId, winding: Option<Winding>) -> Self {
        Self {
            plane,
            texinfo: None,
            winding,
            original: None,
            contents: Contents::empty(),
            surface: SurfaceFlags::empty(),
            flags: SideFlags::NODE,
        }
    }

    /// Can side be used as a splitter at all
    pub fn is_splitter_candidate(&self) -> bool {
        true
            && !self.flags.intersects(SideFlags::BEVEL | SideFlags::NODE | SideFlags::TESTED)
            && self.winding.is_some()
            && !self.surface.contains(SurfaceFlags::SKIP)
    }
}

/// Brush as loaded from map, one per session brush arena entry
#[derive(Clone, Debug)]
pub struct MapBrush {
    /// Index of entity brush belongs to
    pub entity: usize,

    /// Brush index inside of source entity (for diagnostics)
    pub brush_num: usize,

    /// Brush contents
    pub contents: Contents,

    /// Brush sides, bevels last
    pub sides: Vec<Side>,

    /// Brush bounds
    pub bounds: BoundBox,

    /// Brush was already placed to some level region
    pub finished: bool,
}

impl MapBrush {
    /// Build side windings, set visibility and bounds
    pub fn make_windings(&mut self, planes: &PlaneTable) {
        self.bounds = BoundBox::zero();

        for i in 0..self.sides.len() {
            let plane = planes.get(self.sides[i].plane);
            let mut winding = Some(Winding::base_for_plane(plane.normal, plane.distance));

            for (j, other) in self.sides.iter().enumerate() {
                if i == j || other.flags.contains(SideFlags::BEVEL) || other.plane == self.sides[i].plane.negated() {
                    continue;
                }
                let Some(w) = winding.take() else {
                    break;
                };

                let clip = planes.get(other.plane.negated());
                winding = w.chop(clip.normal, clip.distance, 0.0);
            }

            if let Some(w) = &winding {
                for point in &w.points {
                    self.bounds.add_point(*point);
                }
                self.sides[i].flags.insert(SideFlags::VISIBLE);
            }

            self.sides[i].winding = winding;
        }
    }

    /// Count of sides that have polygons
    pub fn visible_side_count(&self) -> usize {
        self.sides
            .iter()
            .filter(|side| side.flags.contains(SideFlags::VISIBLE) && side.winding.is_some())
            .count()
    }
}

/// Brush (or brush fragment) used during BSP construction
#[derive(Clone, Debug)]
pub struct Brush {
    /// Map brush this fragment is cut from, none for node volumes
    pub original: Option<usize>,

    /// Contents of original brush
    pub contents: Contents,

    /// Brush sides
    pub sides: Vec<Side>,

    /// Brush bounds
    pub bounds: BoundBox,
}

/// Brush to plane test result
#[derive(Copy, Clone, Debug, Default)]
pub struct PlaneTest {
    /// Brush side relative to plane
    pub side: PlaneSide,

    /// Count of visible sides split
    pub splits: u32,

    /// Some hint side is split
    pub hint_split: bool,

    /// Brush almost touches the plane
    pub epsilon_brush: bool,
}

/// Get side of box relative to the plane
pub fn box_on_plane_side(bounds: &BoundBox, plane: &Plane) -> PlaneSide {
    // axial planes are easy
    if plane.ty.is_axial() {
        let axis = plane.ty.axis();
        let mut side = PlaneSide::empty();

        if bounds.max[axis] > plane.distance + PLANESIDE_EPSILON {
            side |= PlaneSide::FRONT;
        }
        if bounds.min[axis] < plane.distance - PLANESIDE_EPSILON {
            side |= PlaneSide::BACK;
        }
        return side;
    }

    // create the proper leading and trailing verts for the box
    let mut corners = [DVec3::ZERO; 2];
    for axis in 0..3 {
        if plane.normal[axis] < 0.0 {
            corners[0][axis] = bounds.min[axis];
            corners[1][axis] = bounds.max[axis];
        } else {
            corners[1][axis] = bounds.min[axis];
            corners[0][axis] = bounds.max[axis];
        }
    }

    let dist1 = plane.distance_to(corners[0]);
    let dist2 = plane.distance_to(corners[1]);
    let mut side = PlaneSide::empty();

    if dist1 >= PLANESIDE_EPSILON {
        side = PlaneSide::FRONT;
    }
    if dist2 < PLANESIDE_EPSILON {
        side |= PlaneSide::BACK;
    }

    side
}

impl Brush {
    /// Copy map brush for BSP construction
    pub fn from_map_brush(index: usize, map_brush: &MapBrush) -> Self {
        let sides = map_brush.sides
            .iter()
            .enumerate()
            .map(|(i, side)| {
                let mut side = side.clone();

                side.original = Some(SideRef { brush: index, side: i });
                side.flags.remove(SideFlags::TESTED | SideFlags::NODE);

                // hints are always visible
                if side.surface.contains(SurfaceFlags::HINT) {
                    side.flags.insert(SideFlags::VISIBLE);
                }

                side
            })
            .collect();

        Self {
            original: Some(index),
            contents: map_brush.contents,
            sides,
            bounds: map_brush.bounds,
        }
    }

    /// Build axial box brush
    pub fn from_bounds(bounds: &BoundBox, planes: &mut PlaneTable) -> Result<Self, Error> {
        let mut sides = Vec::with_capacity(6);

        for axis in 0..3 {
            let mut normal = DVec3::ZERO;
            normal[axis] = 1.0;
            sides.push(Side::new_split(planes.find_or_add(normal, bounds.max[axis])?, None));
        }
        for axis in 0..3 {
            let mut normal = DVec3::ZERO;
            normal[axis] = -1.0;
            sides.push(Side::new_split(planes.find_or_add(normal, -bounds.min[axis])?, None));
        }

        let mut brush = Self {
            original: None,
            contents: Contents::empty(),
            sides,
            bounds: BoundBox::zero(),
        };
        brush.create_windings(planes);

        Ok(brush)
    }

    /// Build side windings from side planes
    pub fn create_windings(&mut self, planes: &PlaneTable) {
        for i in 0..self.sides.len() {
            let plane = planes.get(self.sides[i].plane);
            let mut winding = Some(Winding::base_for_plane(plane.normal, plane.distance));

            for (j, other) in self.sides.iter().enumerate() {
                if i == j || other.flags.contains(SideFlags::BEVEL) {
                    continue;
                }
                let Some(w) = winding.take() else {
                    break;
                };

                let clip = planes.get(other.plane.negated());
                winding = w.chop(clip.normal, clip.distance, 0.0);
            }

            self.sides[i].winding = winding;
        }

        self.compute_bounds();
    }

    /// Recalculate bounds from side windings
    pub fn compute_bounds(&mut self) {
        self.bounds = BoundBox::for_points(self.sides
            .iter()
            .filter_map(|side| side.winding.as_ref())
            .flat_map(|winding| winding.points.iter().copied())
        );
    }

    /// Brush volume
    pub fn volume(&self, planes: &PlaneTable) -> f64 {
        // grab the first valid point as the corner
        let Some(first) = self.sides.iter().position(|side| side.winding.is_some()) else {
            return 0.0;
        };
        let Some(corner) = self.sides[first].winding.as_ref().and_then(|w| w.points.first().copied()) else {
            return 0.0;
        };

        let mut volume = 0.0;

        for side in &self.sides[first..] {
            let Some(winding) = &side.winding else {
                continue;
            };

            let d = -planes.get(side.plane).distance_to(corner);
            volume += d * winding.area();
        }

        volume / 3.0
    }

    /// Find side brush mostly lies on
    pub fn mostly_on_side(&self, plane: &Plane) -> PlaneSide {
        let mut max = 0.0;
        let mut side = PlaneSide::FRONT;

        for winding in self.sides.iter().filter_map(|side| side.winding.as_ref()) {
            for point in &winding.points {
                let d = plane.distance_to(*point);

                if d > max {
                    max = d;
                    side = PlaneSide::FRONT;
                }
                if -d > max {
                    max = -d;
                    side = PlaneSide::BACK;
                }
            }
        }

        side
    }

    /// Test brush against the (positive) splitter candidate
    pub fn test_to_plane(&self, plane_id: PlaneId, planes: &PlaneTable) -> PlaneTest {
        let mut result = PlaneTest::default();

        // if the brush actually uses the plane, we can tell the side for sure
        for side in &self.sides {
            if side.plane == plane_id {
                result.side = PlaneSide::BACK | PlaneSide::FACING;
                return result;
            }
            if side.plane == plane_id.negated() {
                result.side = PlaneSide::FRONT | PlaneSide::FACING;
                return result;
            }
        }

        let plane = planes.get(plane_id);

        result.side = box_on_plane_side(&self.bounds, plane);
        if result.side != PlaneSide::BOTH {
            return result;
        }

        // if on both sides, count the visible faces split
        let mut d_front = 0.0f64;
        let mut d_back = 0.0f64;

        for side in &self.sides {
            if side.flags.contains(SideFlags::NODE) || !side.flags.contains(SideFlags::VISIBLE) {
                continue;
            }
            let Some(winding) = &side.winding else {
                continue;
            };

            let mut front = false;
            let mut back = false;

            for point in &winding.points {
                let d = plane.distance_to(*point);

                d_front = d_front.max(d);
                d_back = d_back.min(d);

                front |= d > 0.1;
                back |= d < -0.1;
            }

            if front && back && !side.surface.contains(SurfaceFlags::SKIP) {
                result.splits += 1;
                if side.surface.contains(SurfaceFlags::HINT) {
                    result.hint_split = true;
                }
            }
        }

        result.epsilon_brush = (d_front > 0.0 && d_front < 1.0) || (d_back < 0.0 && d_back > -1.0);

        result
    }

    /// Split brush by plane into (front, back) pieces. Generates no new brush if
    /// the brush is on one side of plane entirely.
    pub fn split(&self, plane_id: PlaneId, planes: &PlaneTable) -> (Option<Brush>, Option<Brush>) {
        let plane = planes.get(plane_id);

        // check all points
        let mut d_front = 0.0f64;
        let mut d_back = 0.0f64;

        for winding in self.sides.iter().filter_map(|side| side.winding.as_ref()) {
            for point in &winding.points {
                let d = plane.distance_to(*point);

                if d > 0.0 && d > d_front {
                    d_front = d;
                }
                if d < 0.0 && d < d_back {
                    d_back = d;
                }
            }
        }

        if d_front < 0.1 {
            return (None, Some(self.clone()));
        }
        if d_back > -0.1 {
            return (Some(self.clone()), None);
        }

        // create a new winding from the split plane
        let mut mid = Some(Winding::base_for_plane(plane.normal, plane.distance));
        for side in &self.sides {
            let Some(w) = mid.take() else {
                break;
            };
            let clip = planes.get(side.plane.negated());
            mid = w.chop(clip.normal, clip.distance, 0.0);
        }

        let mid = match mid {
            Some(mid) if !mid.is_tiny() => mid,
            _ => {
                return if self.mostly_on_side(plane) == PlaneSide::BACK {
                    (None, Some(self.clone()))
                } else {
                    (Some(self.clone()), None)
                };
            }
        };

        if mid.is_huge() {
            log::warn!("huge winding in brush split");
        }

        // split all the current windings
        let mut halves = [self.empty_copy(), self.empty_copy()];

        for side in &self.sides {
            let Some(winding) = &side.winding else {
                continue;
            };

            let (front, back) = winding.clip(plane.normal, plane.distance, 0.0);

            for (half, piece) in halves.iter_mut().zip([front, back]) {
                if let Some(piece) = piece {
                    let mut new_side = side.clone();
                    new_side.winding = Some(piece);
                    new_side.flags.remove(SideFlags::TESTED);
                    half.sides.push(new_side);
                }
            }
        }

        // see if we have valid polygons on both sides
        let mut valid = [false; 2];
        for (i, half) in halves.iter_mut().enumerate() {
            half.compute_bounds();

            let in_world = (0..3).all(|axis| true
                && half.bounds.min[axis] >= -geom::MAX_WORLD_WIDTH
                && half.bounds.max[axis] <= geom::MAX_WORLD_WIDTH
            );
            if !in_world {
                log::debug!("bogus brush after clip");
            }

            valid[i] = half.sides.len() >= 3 && in_world;
        }

        match valid {
            [true, true] => {}
            [true, false] => {
                log::debug!("split not on both sides");
                return (Some(self.clone()), None);
            }
            [false, true] => {
                log::debug!("split not on both sides");
                return (None, Some(self.clone()));
            }
            [false, false] => {
                log::debug!("split removed brush");
                return (None, None);
            }
        }

        // add the midwinding to both sides
        let [mut front, mut back] = halves;
        front.sides.push(Side::new_split(plane_id.negated(), Some(mid.reversed())));
        back.sides.push(Side::new_split(plane_id, Some(mid)));

        let keep = |brush: Brush| if brush.volume(planes) < 1.0 {
            None
        } else {
            Some(brush)
        };

        (keep(front), keep(back))
    }

    /// Brush copy without sides
    fn empty_copy(&self) -> Brush {
        Brush {
            original: self.original,
            contents: self.contents,
            sides: Vec::with_capacity(self.sides.len() + 1),
            bounds: BoundBox::zero(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;
    use glam::DVec3;

    use super::*;

    /// Axial solid box brush for tests
    pub fn box_brush(min: DVec3, max: DVec3, planes: &mut PlaneTable) -> Brush {
        let mut brush = Brush::from_bounds(&BoundBox::new(min, max), planes).unwrap();

        for side in &mut brush.sides {
            side.flags = SideFlags::VISIBLE;
        }
        brush.contents = Contents::SOLID;
        brush.original = Some(0);
        brush
    }

    #[test]
    fn box_volume_and_bounds() {
        let mut planes = PlaneTable::new();
        let brush = box_brush(DVec3::ZERO, DVec3::new(64.0, 32.0, 16.0), &mut planes);

        assert_relative_eq!(brush.volume(&planes), 64.0 * 32.0 * 16.0, epsilon = 1e-6);
        assert_eq!(brush.bounds.min, DVec3::ZERO);
        assert_eq!(brush.bounds.max, DVec3::new(64.0, 32.0, 16.0));
        assert!(brush.sides.iter().all(|side| side.winding.as_ref().unwrap().points.len() == 4));
    }

    #[test]
    fn split_through_middle() {
        let mut planes = PlaneTable::new();
        let brush = box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes);
        let plane = planes.find_or_add(DVec3::X, 16.0).unwrap();

        let (front, back) = brush.split(plane, &planes);
        let front = front.unwrap();
        let back = back.unwrap();

        assert_relative_eq!(front.volume(&planes), 48.0 * 64.0 * 64.0, epsilon = 1e-6);
        assert_relative_eq!(back.volume(&planes), 16.0 * 64.0 * 64.0, epsilon = 1e-6);
        assert_eq!(front.sides.len(), 6);
        assert!(front.sides.iter().any(|side| side.plane == plane.negated()));
        assert!(back.sides.iter().any(|side| side.plane == plane && side.flags.contains(SideFlags::NODE)));
        assert_eq!(front.bounds.min.x, 16.0);
    }

    #[test]
    fn split_by_outside_plane_keeps_brush() {
        let mut planes = PlaneTable::new();
        let brush = box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes);
        let plane = planes.find_or_add(DVec3::Z, 100.0).unwrap();

        let (front, back) = brush.split(plane, &planes);

        assert!(front.is_none());
        assert_eq!(back.unwrap().sides.len(), 6);
    }

    #[test]
    fn plane_tests() {
        let mut planes = PlaneTable::new();
        let brush = box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes);

        let top = planes.find_or_add(DVec3::Z, 64.0).unwrap();
        assert_eq!(brush.test_to_plane(top, &planes).side, PlaneSide::BACK | PlaneSide::FACING);

        let bottom = planes.find_or_add(DVec3::Z, 0.0).unwrap();
        assert_eq!(brush.test_to_plane(bottom, &planes).side, PlaneSide::FRONT | PlaneSide::FACING);

        let middle = planes.find_or_add(DVec3::Z, 32.0).unwrap();
        let test = brush.test_to_plane(middle, &planes);
        assert_eq!(test.side, PlaneSide::BOTH);
        assert_eq!(test.splits, 4);
        assert!(!test.epsilon_brush);

        let above = planes.find_or_add(DVec3::Z, 200.0).unwrap();
        assert_eq!(brush.test_to_plane(above, &planes).side, PlaneSide::BACK);
    }
}

// brush.rs
