///! Constructive solid geometry on brush lists: removal of brush overlaps

use std::collections::VecDeque;

use crate::{
    brush::Brush,
    flags::Contents,
    plane_table::PlaneTable,
};

/// Count of fragments used when a brush can't bite another one
const NO_BITE: usize = usize::MAX;

/// Bites that leave more fragments than this are not done
const MAX_BITE_FRAGMENTS: usize = 4;

/// Check if brushes can't share any volume
pub fn brushes_disjoint(b1: &Brush, b2: &Brush) -> bool {
    // check bounding boxes
    for axis in 0..3 {
        if b1.bounds.min[axis] >= b2.bounds.max[axis] || b1.bounds.max[axis] <= b2.bounds.min[axis] {
            return true;
        }
    }

    // check for opposing planes
    b1.sides
        .iter()
        .any(|s1| b2.sides.iter().any(|s2| s1.plane == s2.plane.negated()))
}

/// Returns true if `b1` is allowed to bite `b2`
pub fn brush_ge(b1: &Brush, b2: &Brush) -> bool {
    // detail brushes never bite structural brushes
    if b1.contents.contains(Contents::DETAIL) && !b2.contents.contains(Contents::DETAIL) {
        return false;
    }

    if b1.contents.contains(Contents::SOLID) {
        return true;
    }

    // water, windows and such clip only each other
    true
        && !b2.contents.contains(Contents::SOLID)
        && !b1.contents.visible().is_empty()
        && !b2.contents.visible().is_empty()
}

/// Carve `b` out of `a`. Returns `None` if brushes don't really intersect,
/// otherwise fragments of `a` outside of `b` (empty if `a` is swallowed).
pub fn subtract(a: &Brush, b: &Brush, planes: &PlaneTable) -> Option<Vec<Brush>> {
    let mut outside = Vec::new();
    let mut inside = a.clone();

    for side in &b.sides {
        let (front, back) = inside.split(side.plane, planes);

        if let Some(front) = front {
            outside.push(front);
        }

        // nothing left inside of b, so it didn't really intersect
        inside = back?;
    }

    Some(outside)
}

/// Remove overlaps of brush list, keeping the list order stable for
/// brushes that don't intersect anything
pub fn chop_brushes(brushes: Vec<Brush>, planes: &PlaneTable) -> Vec<Brush> {
    let start_count = brushes.len();

    let mut keep = Vec::with_capacity(brushes.len());
    let mut work = VecDeque::from(brushes);

    'work_loop: while let Some(b1) = work.pop_front() {
        for index in 0..work.len() {
            let b2 = &work[index];

            if brushes_disjoint(&b1, b2) {
                continue;
            }

            let mut sub = None;
            let mut c1 = NO_BITE;
            if brush_ge(b2, &b1) {
                match subtract(&b1, b2, planes) {
                    Some(fragments) => {
                        c1 = fragments.len();
                        sub = Some(fragments);
                    }
                    None => continue,
                }
            }

            let mut sub2 = None;
            let mut c2 = NO_BITE;
            if brush_ge(&b1, b2) {
                match subtract(b2, &b1, planes) {
                    Some(fragments) => {
                        c2 = fragments.len();
                        sub2 = Some(fragments);
                    }
                    None => continue,
                }
            }

            if sub.is_none() && sub2.is_none() {
                // neither one can bite
                continue;
            }

            // only accept if it didn't fragment too much
            if c1 > MAX_BITE_FRAGMENTS && c2 > MAX_BITE_FRAGMENTS {
                continue;
            }

            if c1 < c2 {
                work.extend(sub.unwrap_or_default());
            } else {
                work.remove(index);
                work.extend(sub2.unwrap_or_default());
                work.push_front(b1);
            }

            continue 'work_loop;
        }

        // b1 doesn't intersect anything anymore, so keep it
        keep.push(b1);
    }

    log::debug!("csg: {} brushes -> {} fragments", start_count, keep.len());

    keep
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::DVec3;

    use super::*;
    use crate::brush::tests::box_brush;

    fn total_volume(brushes: &[Brush], planes: &PlaneTable) -> f64 {
        brushes.iter().map(|brush| brush.volume(planes)).sum()
    }

    #[test]
    fn tiling_brushes_are_untouched() {
        let mut planes = PlaneTable::new();
        let brushes = vec![
            box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes),
            box_brush(DVec3::new(64.0, 0.0, 0.0), DVec3::new(128.0, 64.0, 64.0), &mut planes),
            box_brush(DVec3::new(0.0, 64.0, 0.0), DVec3::new(128.0, 128.0, 64.0), &mut planes),
        ];

        let chopped = chop_brushes(brushes.clone(), &planes);

        assert_eq!(chopped.len(), 3);
        for (before, after) in brushes.iter().zip(chopped.iter()) {
            assert_eq!(before.bounds, after.bounds);
            assert_eq!(before.sides.len(), after.sides.len());
        }
    }

    #[test]
    fn overlap_is_removed() {
        let mut planes = PlaneTable::new();
        let brushes = vec![
            box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes),
            box_brush(DVec3::splat(32.0), DVec3::splat(96.0), &mut planes),
        ];

        let chopped = chop_brushes(brushes, &planes);
        let union = 2.0 * 64.0f64.powi(3) - 32.0f64.powi(3);

        assert_relative_eq!(total_volume(&chopped, &planes), union, epsilon = 1e-3);

        for (i, a) in chopped.iter().enumerate() {
            for b in &chopped[i + 1..] {
                assert!(brushes_disjoint(a, b));
            }
        }
    }

    #[test]
    fn swallowed_brush_disappears() {
        let mut planes = PlaneTable::new();
        let brushes = vec![
            box_brush(DVec3::splat(16.0), DVec3::splat(32.0), &mut planes),
            box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes),
        ];

        let chopped = chop_brushes(brushes, &planes);

        assert_eq!(chopped.len(), 1);
        assert_eq!(chopped[0].bounds.max, DVec3::splat(64.0));
    }

    #[test]
    fn fragmenting_bite_is_skipped() {
        let mut planes = PlaneTable::new();
        let mut detail = box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes);
        detail.contents |= Contents::DETAIL;

        // pokes into the detail brush from above, five of its sides cut it
        let deep = box_brush(DVec3::new(16.0, 16.0, 32.0), DVec3::new(48.0, 48.0, 96.0), &mut planes);
        let chopped = chop_brushes(vec![detail.clone(), deep], &planes);
        assert_eq!(chopped.len(), 2);
        assert!(chopped.iter().any(|brush| brush.contents.contains(Contents::DETAIL) && brush.bounds == detail.bounds));

        // crosses it along y, three sides cut it
        let wide = box_brush(DVec3::new(16.0, -16.0, 32.0), DVec3::new(48.0, 80.0, 96.0), &mut planes);
        let chopped = chop_brushes(vec![detail, wide], &planes);
        assert_eq!(chopped.len(), 4);
        assert_relative_eq!(
            total_volume(&chopped, &planes),
            64.0f64.powi(3) - 32.0 * 64.0 * 32.0 + 32.0 * 96.0 * 64.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn bite_rules() {
        let mut planes = PlaneTable::new();
        let solid = box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes);

        let mut water = box_brush(DVec3::splat(32.0), DVec3::splat(96.0), &mut planes);
        water.contents = Contents::WATER;

        let mut detail = solid.clone();
        detail.contents |= Contents::DETAIL;

        assert!(brush_ge(&solid, &water));
        assert!(!brush_ge(&water, &solid));
        assert!(!brush_ge(&detail, &solid));
        assert!(brush_ge(&solid, &detail));
        assert!(brush_ge(&water, &water.clone()));

        // water is the one cut
        let chopped = chop_brushes(vec![water, solid], &planes);
        let water_volume = chopped
            .iter()
            .filter(|brush| brush.contents == Contents::WATER)
            .map(|brush| brush.volume(&planes))
            .sum::<f64>();
        assert_relative_eq!(water_volume, 64.0f64.powi(3) - 32.0f64.powi(3), epsilon = 1e-3);
        assert!(chopped.iter().any(|brush| brush.contents == Contents::SOLID && brush.bounds.max == DVec3::splat(64.0)));
        assert!(chopped
            .iter()
            .filter(|brush| brush.contents == Contents::WATER)
            .all(|brush| brush.bounds.min.max_element() >= 32.0));
    }
}

// csg.rs
