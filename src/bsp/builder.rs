///! Brush BSP construction

use crate::{
    brush::{Brush, PlaneSide, SideFlags, SideRef},
    error::Error,
    flags::{Contents, SurfaceFlags},
    geom::{self, BoundBox},
    plane_table::{PlaneId, PlaneTable},
};

use super::{Node, NodeId, NodeKind, Tree};

/// Gap between brushes and the tree volume
pub const SIDESPACE: f64 = 8.0;

/// Chosen splitter
#[derive(Clone, Debug)]
pub struct Splitter {
    /// Positive splitter plane
    pub plane: PlaneId,

    /// Map side the plane was taken from
    pub side: Option<SideRef>,

    /// Side of every brush relative to the plane
    pub brush_sides: Vec<PlaneSide>,
}

/// Check that plane cuts the volume into two non-empty pieces
fn check_plane_against_volume(plane: PlaneId, volume: &Brush, planes: &PlaneTable) -> bool {
    let (front, back) = volume.split(plane, planes);
    front.is_some() && back.is_some()
}

/// Choose splitter out of brush sides. Search order is visible-structural,
/// visible-detail, nonvisible-structural, nonvisible-detail; the first pass
/// that gives any candidate ends the search.
pub fn select_split_side(brushes: &mut [Brush], volume: &Brush, planes: &PlaneTable) -> Option<Splitter> {
    let mut best: Option<Splitter> = None;
    let mut best_value = -99999;
    let mut test_sides = vec![PlaneSide::empty(); brushes.len()];

    'pass_loop: for pass in 0..4 {
        for brush_index in 0..brushes.len() {
            let is_detail = brushes[brush_index].contents.contains(Contents::DETAIL);
            if (pass & 1 == 1) != is_detail {
                continue;
            }

            for side_index in 0..brushes[brush_index].sides.len() {
                let side = &brushes[brush_index].sides[side_index];

                if !side.is_splitter_candidate() {
                    continue;
                }
                // only check visible faces on first passes
                if side.flags.contains(SideFlags::VISIBLE) != (pass < 2) {
                    continue;
                }

                let plane = side.plane.positive();
                let is_hint = side.surface.contains(SurfaceFlags::HINT);
                let original = side.original;

                if !check_plane_against_volume(plane, volume, planes) {
                    // would produce a tiny volume
                    continue;
                }

                let mut front = 0i32;
                let mut back = 0i32;
                let mut facing = 0i32;
                let mut splits = 0i32;
                let mut epsilon_brushes = 0i32;
                let mut hint_split = false;

                for (test, test_side) in brushes.iter_mut().zip(test_sides.iter_mut()) {
                    let result = test.test_to_plane(plane, planes);

                    splits += result.splits as i32;
                    hint_split |= result.hint_split;
                    epsilon_brushes += result.epsilon_brush as i32;
                    *test_side = result.side;

                    // don't bother testing this plane again
                    if result.side.contains(PlaneSide::FACING) {
                        facing += 1;
                        for s in &mut test.sides {
                            if s.plane.positive() == plane {
                                s.flags.insert(SideFlags::TESTED);
                            }
                        }
                    }
                    if result.side.contains(PlaneSide::FRONT) {
                        front += 1;
                    }
                    if result.side.contains(PlaneSide::BACK) {
                        back += 1;
                    }
                }

                let mut value = 5 * facing - 5 * splits - (front - back).abs();
                if planes.get(plane).ty.is_axial() {
                    value += 5;
                }
                value -= epsilon_brushes * 1000;

                // never split a hint side except with another hint
                if hint_split && !is_hint {
                    value = -9999999;
                }

                if value > best_value {
                    best_value = value;
                    best = Some(Splitter {
                        plane,
                        side: original,
                        brush_sides: test_sides.clone(),
                    });
                }
            }
        }

        if best.is_some() {
            if pass > 1 {
                log::trace!("non-visible splitter chosen");
            }
            break 'pass_loop;
        }
    }

    // clear all the tested flags we set
    for brush in brushes.iter_mut() {
        for side in &mut brush.sides {
            side.flags.remove(SideFlags::TESTED);
        }
    }

    best
}

/// Distribute brushes to (front, back) lists of a splitter
pub fn split_brush_list(brushes: Vec<Brush>, splitter: &Splitter, planes: &PlaneTable) -> (Vec<Brush>, Vec<Brush>) {
    let mut front = Vec::new();
    let mut back = Vec::new();

    for (mut brush, side) in brushes.into_iter().zip(splitter.brush_sides.iter().copied()) {
        if side == PlaneSide::BOTH {
            let (f, b) = brush.split(splitter.plane, planes);
            front.extend(f);
            back.extend(b);
            continue;
        }

        // the plane is a part of the brush, so it won't be tried again
        if side.contains(PlaneSide::FACING) {
            for brush_side in &mut brush.sides {
                if brush_side.plane.positive() == splitter.plane {
                    brush_side.flags.insert(SideFlags::NODE);
                }
            }
        }

        if side.contains(PlaneSide::FRONT) {
            front.push(brush);
        } else if side.contains(PlaneSide::BACK) {
            back.push(brush);
        } else {
            log::trace!("brush fell off the tree");
        }
    }

    (front, back)
}

/// Contents of leaf holding the brush fragments
pub fn leaf_contents(brushes: &[Brush]) -> Contents {
    let mut contents = Contents::empty();

    for brush in brushes {
        // solid brush with all sides on nodes eats everything
        if true
            && brush.contents.contains(Contents::SOLID)
            && !brush.contents.contains(Contents::PASSABLE)
            && brush.sides.iter().all(|side| side.flags.contains(SideFlags::NODE))
        {
            return Contents::SOLID;
        }
        contents |= brush.contents;
    }

    contents
}

/// Build BSP tree of the brush list. `bounds` is the region tree must cover.
pub fn build_tree(brushes: Vec<Brush>, bounds: &BoundBox, micro_volume: f64, planes: &mut PlaneTable) -> Result<Tree, Error> {
    let mut visible_faces = 0;
    let mut nonvisible_faces = 0;
    let mut brush_bounds = BoundBox::zero();

    for brush in &brushes {
        let volume = brush.volume(planes);
        if volume < micro_volume {
            log::warn!("brush {:?}: microbrush, volume {:.3}", brush.original, volume);
        }

        for side in &brush.sides {
            if side.flags.intersects(SideFlags::BEVEL | SideFlags::NODE) || side.winding.is_none() {
                continue;
            }
            if side.flags.contains(SideFlags::VISIBLE) {
                visible_faces += 1;
            } else {
                nonvisible_faces += 1;
            }
        }

        brush_bounds = brush_bounds.total(&brush.bounds);
    }

    log::debug!(
        "bsp: {} brushes, {} visible faces, {} nonvisible faces",
        brushes.len(),
        visible_faces,
        nonvisible_faces
    );

    let mut tree = Tree::new(brush_bounds);
    // padded volume still has to pass the world bounds check of brush splitting
    let mut head_bounds = bounds.extend(glam::DVec3::splat(SIDESPACE));
    head_bounds.min = head_bounds.min.max(glam::DVec3::splat(-geom::MAX_WORLD_WIDTH));
    head_bounds.max = head_bounds.max.min(glam::DVec3::splat(geom::MAX_WORLD_WIDTH));
    let head_volume = Brush::from_bounds(&head_bounds, planes)?;
    tree.node_mut(tree.head).volume = Some(head_volume);

    let planes = &*planes;
    let mut node_count = 1;
    let mut leaf_count = 0;
    let mut stack = vec![(tree.head, brushes)];

    while let Some((node, mut brushes)) = stack.pop() {
        let splitter = match &tree.node(node).volume {
            Some(volume) => select_split_side(&mut brushes, volume, planes),
            None => None,
        };

        let Some(splitter) = splitter else {
            let contents = leaf_contents(&brushes);
            let node = tree.node_mut(node);
            node.kind = NodeKind::Leaf { contents };
            node.side = None;
            node.brushes = brushes;
            leaf_count += 1;
            continue;
        };

        let (front_brushes, back_brushes) = split_brush_list(brushes, &splitter, planes);

        let (front_volume, back_volume) = match &tree.node(node).volume {
            Some(volume) => volume.split(splitter.plane, planes),
            None => (None, None),
        };

        let mut front = Node::new_leaf(Some(node), Contents::empty());
        front.volume = front_volume;
        let mut back = Node::new_leaf(Some(node), Contents::empty());
        back.volume = back_volume;

        let children = [tree.add_node(front), tree.add_node(back)];
        node_count += 2;

        let parent = tree.node_mut(node);
        parent.kind = NodeKind::Internal { plane: splitter.plane, children };
        parent.side = splitter.side;

        stack.push((children[1], back_brushes));
        stack.push((children[0], front_brushes));
    }

    log::debug!("bsp: {} nodes, {} leafs", node_count, leaf_count);

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::brush::tests::box_brush;

    fn single_box_tree(planes: &mut PlaneTable) -> Tree {
        let brush = box_brush(DVec3::ZERO, DVec3::splat(64.0), planes);
        let bounds = brush.bounds;

        build_tree(vec![brush], &bounds, 1.0, planes).unwrap()
    }

    #[test]
    fn box_gets_single_solid_leaf() {
        let mut planes = PlaneTable::new();
        let tree = single_box_tree(&mut planes);

        let solid_leaves = tree
            .leaves()
            .into_iter()
            .filter(|leaf| tree.node(*leaf).leaf_contents() == Some(Contents::SOLID))
            .count();

        assert_eq!(solid_leaves, 1);
        assert_eq!(tree.leaves().len(), 7);

        let inside = tree.point_leaf(DVec3::splat(32.0), &planes);
        assert_eq!(tree.node(inside).leaf_contents(), Some(Contents::SOLID));

        let outside = tree.point_leaf(DVec3::new(70.0, 32.0, 32.0), &planes);
        assert_eq!(tree.node(outside).leaf_contents(), Some(Contents::empty()));
    }

    #[test]
    fn world_sized_volume_is_split() {
        let mut planes = PlaneTable::new();
        let brush = box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes);
        let world = BoundBox::new(DVec3::splat(-geom::MAX_WORLD_WIDTH), DVec3::splat(geom::MAX_WORLD_WIDTH));
        let tree = build_tree(vec![brush], &world, 1.0, &mut planes).unwrap();

        assert_eq!(tree.leaves().len(), 7);

        let inside = tree.point_leaf(DVec3::splat(32.0), &planes);
        assert_eq!(tree.node(inside).leaf_contents(), Some(Contents::SOLID));
    }

    #[test]
    fn point_leaf_is_total_and_single_valued() {
        let mut planes = PlaneTable::new();
        let brushes = vec![
            box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes),
            box_brush(DVec3::new(96.0, 0.0, 0.0), DVec3::new(128.0, 64.0, 32.0), &mut planes),
        ];
        let bounds = brushes[0].bounds.total(&brushes[1].bounds);
        let tree = build_tree(brushes, &bounds, 1.0, &mut planes).unwrap();
        let leaves = tree.leaves();

        for x in (-8..=128).step_by(8) {
            for z in (-8..=64).step_by(8) {
                let point = DVec3::new(x as f64 + 0.5, 32.5, z as f64 + 0.5);
                let leaf = tree.point_leaf(point, &planes);

                assert!(leaves.contains(&leaf));

                // the point lies inside of leaf volume
                let volume = tree.node(leaf).volume.as_ref().unwrap();
                for side in &volume.sides {
                    assert!(planes.get(side.plane).distance_to(point) <= 0.01);
                }

                let in_first = (0..64).contains(&x) && (0..64).contains(&z);
                let in_second = (96..128).contains(&x) && (0..32).contains(&z);
                let contents = tree.node(leaf).leaf_contents().unwrap();
                assert_eq!(contents.contains(Contents::SOLID), in_first || in_second);
            }
        }
    }

    #[test]
    fn splitter_prefers_axial_facing_planes() {
        let mut planes = PlaneTable::new();
        let mut brushes = vec![
            box_brush(DVec3::ZERO, DVec3::splat(64.0), &mut planes),
            box_brush(DVec3::new(64.0, 0.0, 0.0), DVec3::new(128.0, 64.0, 64.0), &mut planes),
        ];
        let volume = Brush::from_bounds(&BoundBox::new(DVec3::splat(-8.0), DVec3::new(136.0, 72.0, 72.0)), &mut planes).unwrap();

        let splitter = select_split_side(&mut brushes, &volume, &planes).unwrap();

        // shared plane faces both brushes and splits nothing
        assert_eq!(planes.get(splitter.plane).normal, DVec3::X);
        assert_eq!(planes.get(splitter.plane).distance, 64.0);
        assert_eq!(splitter.brush_sides, vec![PlaneSide::BACK | PlaneSide::FACING, PlaneSide::FRONT | PlaneSide::FACING]);
        assert!(brushes.iter().all(|brush| brush.sides.iter().all(|side| !side.flags.contains(SideFlags::TESTED))));
    }
}

// builder.rs
