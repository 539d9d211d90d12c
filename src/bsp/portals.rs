///! Portal generation and visible side search

use glam::DVec3;

use crate::{
    brush::{MapBrush, SideFlags, SideRef},
    geom::{self, BoundBox, Plane, Winding},
    plane_table::PlaneTable,
};

use super::{builder::SIDESPACE, NodeId, NodeKind, PortalId, Tree};

/// Epsilon of node base winding clipping by parents
const BASE_WINDING_EPSILON: f64 = 0.001;

/// Epsilon of portal splitting
const SPLIT_WINDING_EPSILON: f64 = 0.001;

/// Build six portals connecting head node with the outside leaf
pub fn make_headnode_portals(tree: &mut Tree) {
    let bounds = tree.bounds.extend(DVec3::splat(SIDESPACE));

    let mut planes = Vec::with_capacity(6);
    for axis in 0..3 {
        for j in 0..2 {
            let mut normal = DVec3::ZERO;
            if j == 0 {
                normal[axis] = 1.0;
                planes.push(Plane::new(normal, bounds.min[axis]));
            } else {
                normal[axis] = -1.0;
                planes.push(Plane::new(normal, -bounds.max[axis]));
            }
        }
    }

    // clip base windings by all the other planes
    'portal_loop: for i in 0..planes.len() {
        let mut winding = Winding::base_for_plane(planes[i].normal, planes[i].distance);

        for (j, clip) in planes.iter().enumerate() {
            if i == j {
                continue;
            }
            match winding.chop(clip.normal, clip.distance, geom::ON_EPSILON) {
                Some(w) => winding = w,
                None => continue 'portal_loop,
            }
        }

        let portal = tree.add_portal(planes[i], winding, None);
        tree.add_portal_to_nodes(portal, tree.head, tree.outside);
    }
}

/// Node plane base winding clipped by all parent planes
fn base_winding_for_node(tree: &Tree, node: NodeId, planes: &PlaneTable) -> Option<Winding> {
    let plane = planes.get(tree.node(node).plane()?);
    let mut winding = Winding::base_for_plane(plane.normal, plane.distance);

    let mut child = node;
    while let Some(parent) = tree.node(child).parent {
        let NodeKind::Internal { plane, children } = tree.node(parent).kind else {
            break;
        };
        let plane = planes.get(plane);

        winding = if children[0] == child {
            winding.chop(plane.normal, plane.distance, BASE_WINDING_EPSILON)?
        } else {
            winding.chop(-plane.normal, -plane.distance, BASE_WINDING_EPSILON)?
        };

        child = parent;
    }

    Some(winding)
}

/// Create portal on node plane, connecting node children
pub fn make_node_portal(tree: &mut Tree, node: NodeId, planes: &PlaneTable) {
    let NodeKind::Internal { plane, children } = tree.node(node).kind else {
        return;
    };
    let Some(mut winding) = base_winding_for_node(tree, node, planes) else {
        return;
    };

    // clip the portal by all the other portals in the node
    for (portal, side) in tree.node_portals(node) {
        let p = &tree.portal(portal).plane;
        let (normal, distance) = if side == 0 {
            (p.normal, p.distance)
        } else {
            (-p.normal, -p.distance)
        };

        match winding.chop(normal, distance, geom::ON_EPSILON) {
            Some(w) => winding = w,
            None => return,
        }
    }

    if winding.is_tiny() {
        log::trace!("tiny node portal dropped");
        return;
    }

    let portal = tree.add_portal(*planes.get(plane), winding, Some(node));
    tree.add_portal_to_nodes(portal, children[0], children[1]);
}

/// Move portals of node to its children, splitting them by node plane
pub fn split_node_portals(tree: &mut Tree, node: NodeId, planes: &PlaneTable) {
    let NodeKind::Internal { plane, children: [front, back] } = tree.node(node).kind else {
        return;
    };
    let plane = planes.get(plane);

    for (portal, side) in tree.node_portals(node) {
        let other = tree.portal(portal).nodes[side ^ 1];

        let [n0, n1] = tree.portal(portal).nodes;
        tree.remove_portal_from_node(portal, n0);
        tree.remove_portal_from_node(portal, n1);

        // cut the portal into two portals, one on each side of the cut plane
        let (front_winding, back_winding) = tree
            .portal(portal)
            .winding
            .clip(plane.normal, plane.distance, SPLIT_WINDING_EPSILON);

        let front_winding = front_winding.filter(|w| !w.is_tiny());
        let back_winding = back_winding.filter(|w| !w.is_tiny());

        let link = |tree: &mut Tree, portal: PortalId, child: NodeId| {
            if side == 0 {
                tree.add_portal_to_nodes(portal, child, other);
            } else {
                tree.add_portal_to_nodes(portal, other, child);
            }
        };

        match (front_winding, back_winding) {
            (None, None) => {
                log::trace!("tiny portal dropped");
            }
            (None, Some(_)) => link(tree, portal, back),
            (Some(_), None) => link(tree, portal, front),
            (Some(front_winding), Some(back_winding)) => {
                let p = tree.portal(portal);
                let (portal_plane, on_node) = (p.plane, p.on_node);

                let new_portal = tree.add_portal(portal_plane, back_winding, on_node);
                tree.portal_mut(portal).winding = front_winding;

                link(tree, portal, front);
                link(tree, new_portal, back);
            }
        }
    }

    tree.node_mut(node).portals = None;
}

/// Calculate node bounds from its portals
fn calc_node_bounds(tree: &mut Tree, node: NodeId) {
    let bounds = BoundBox::for_points(tree
        .node_portals(node)
        .into_iter()
        .flat_map(|(portal, _)| tree.portal(portal).winding.points.clone())
    );

    tree.node_mut(node).bounds = bounds;
}

/// Build portals of the whole tree
pub fn make_tree_portals(tree: &mut Tree, planes: &PlaneTable) {
    make_headnode_portals(tree);

    let mut stack = vec![tree.head];

    while let Some(node) = stack.pop() {
        calc_node_bounds(tree, node);

        let bounds = tree.node(node).bounds;
        if bounds.min.x >= bounds.max.x {
            log::debug!("node {} without a volume", node.into_index());
        }
        if (0..3).any(|axis| bounds.min[axis] < -8000.0 || bounds.max[axis] > 8000.0) {
            log::debug!("node {} with unbounded volume", node.into_index());
        }

        let Some(children) = tree.node(node).children() else {
            continue;
        };

        make_node_portal(tree, node, planes);
        split_node_portals(tree, node, planes);

        stack.push(children[1]);
        stack.push(children[0]);
    }

    log::debug!("portals: {} made", tree.portals.len());
}

/// Find map side portal is drawn with. Exact plane match wins, otherwise
/// the side with the closest normal is taken.
fn find_portal_side(tree: &Tree, portal: PortalId, map_brushes: &[MapBrush], planes: &PlaneTable) -> Option<SideRef> {
    let p = tree.portal(portal);
    let on_node = p.on_node?;

    let contents = [
        tree.node(p.nodes[0]).leaf_contents().unwrap_or_default(),
        tree.node(p.nodes[1]).leaf_contents().unwrap_or_default(),
    ];

    // portal does not bridge different visible contents
    let vis_contents = (contents[0] ^ contents[1]).strongest_visible();
    if vis_contents.is_empty() {
        return None;
    }

    let plane = tree.node(on_node).plane()?;
    let normal = planes.get(plane).normal;

    let mut best = None;
    let mut best_dot = 0.0;

    for node in p.nodes {
        for fragment in &tree.node(node).brushes {
            let Some(index) = fragment.original else {
                continue;
            };
            let brush = &map_brushes[index];

            if !brush.contents.intersects(vis_contents) {
                continue;
            }

            for (side_index, side) in brush.sides.iter().enumerate() {
                if side.flags.intersects(SideFlags::BEVEL | SideFlags::NODE) {
                    continue;
                }

                let side_ref = SideRef { brush: index, side: side_index };

                if side.plane.positive() == plane {
                    return Some(side_ref);
                }

                // see how close the match is
                let dot = planes.get(side.plane.positive()).normal.dot(normal);
                if dot > best_dot {
                    best_dot = dot;
                    best = Some(side_ref);
                }
            }
        }
    }

    if best.is_none() {
        log::debug!("side not found for portal {}", portal.into_index());
    }

    best
}

/// Find portal sides and mark sides of the listed map brushes seen from non-empty leaves
pub fn mark_visible_sides(tree: &mut Tree, map_brushes: &mut [MapBrush], brushes: impl IntoIterator<Item = usize>, planes: &PlaneTable) {
    for index in brushes {
        for side in &mut map_brushes[index].sides {
            side.flags.remove(SideFlags::VISIBLE);
        }
    }

    for leaf in tree.leaves() {
        // empty leaves are never boundary leaves
        if tree.node(leaf).leaf_contents().unwrap_or_default().is_empty() {
            continue;
        }

        for (portal, _) in tree.node_portals(leaf) {
            if tree.portal(portal).on_node.is_none() {
                continue;
            }

            if !tree.portal(portal).side_found {
                let side = find_portal_side(tree, portal, map_brushes, planes);
                let p = tree.portal_mut(portal);
                p.side = side;
                p.side_found = true;
            }

            if let Some(side) = tree.portal(portal).side {
                map_brushes[side.brush].sides[side.side].flags.insert(SideFlags::VISIBLE);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use glam::DVec3;

    use super::*;
    use crate::{
        brush::{tests::box_brush, Brush},
        bsp::builder::build_tree,
        flags::Contents,
    };

    /// Map brush arena out of box brushes
    pub fn box_map_brushes(boxes: &[(DVec3, DVec3)], planes: &mut PlaneTable) -> Vec<MapBrush> {
        boxes
            .iter()
            .enumerate()
            .map(|(index, (min, max))| {
                let brush = box_brush(*min, *max, planes);
                MapBrush {
                    entity: 0,
                    brush_num: index,
                    contents: brush.contents,
                    sides: brush.sides,
                    bounds: brush.bounds,
                    finished: false,
                }
            })
            .collect()
    }

    /// Tree with portals of map brush arena
    pub fn portal_tree(map_brushes: &[MapBrush], planes: &mut PlaneTable) -> Tree {
        let brushes = map_brushes
            .iter()
            .enumerate()
            .map(|(index, brush)| Brush::from_map_brush(index, brush))
            .collect::<Vec<_>>();
        let bounds = brushes
            .iter()
            .fold(BoundBox::zero(), |bounds, brush| bounds.total(&brush.bounds));

        let mut tree = build_tree(brushes, &bounds, 1.0, planes).unwrap();
        make_tree_portals(&mut tree, planes);
        tree
    }

    #[test]
    fn portals_are_linked_symmetrically() {
        let mut planes = PlaneTable::new();
        let map_brushes = box_map_brushes(&[
            (DVec3::ZERO, DVec3::splat(64.0)),
            (DVec3::new(64.0, 0.0, 0.0), DVec3::new(128.0, 32.0, 32.0)),
            (DVec3::new(0.0, 96.0, 0.0), DVec3::new(32.0, 128.0, 96.0)),
        ], &mut planes);
        let tree = portal_tree(&map_brushes, &mut planes);

        let mut occurrences = HashMap::<PortalId, usize>::new();
        let mut nodes = tree.leaves();
        nodes.push(tree.outside);

        for node in nodes {
            for (portal, side) in tree.node_portals(node) {
                assert_eq!(tree.portal(portal).nodes[side], node);
                *occurrences.entry(portal).or_default() += 1;
            }
        }

        assert!(!occurrences.is_empty());
        assert!(occurrences.values().all(|count| *count == 2));

        // internal nodes pass all portals to children
        for node in &tree.nodes {
            if node.children().is_some() {
                assert!(node.portals.is_none());
            }
        }
    }

    #[test]
    fn portal_faces_its_front_node() {
        let mut planes = PlaneTable::new();
        let map_brushes = box_map_brushes(&[(DVec3::ZERO, DVec3::splat(64.0))], &mut planes);
        let tree = portal_tree(&map_brushes, &mut planes);

        for leaf in tree.leaves() {
            for (portal, _) in tree.node_portals(leaf) {
                let p = tree.portal(portal);
                let center = p.winding.center();

                let front = tree.point_leaf(center + p.plane.normal * 0.5, &planes);
                let back = tree.point_leaf(center - p.plane.normal * 0.5, &planes);

                if p.on_node.is_some() {
                    assert_eq!(front, p.nodes[0]);
                    assert_eq!(back, p.nodes[1]);
                }
            }
        }
    }

    #[test]
    fn box_sides_are_visible() {
        let mut planes = PlaneTable::new();
        let mut map_brushes = box_map_brushes(&[(DVec3::ZERO, DVec3::splat(64.0))], &mut planes);
        let mut tree = portal_tree(&map_brushes, &mut planes);

        mark_visible_sides(&mut tree, &mut map_brushes, 0..1, &planes);

        assert!(map_brushes[0].sides.iter().all(|side| side.flags.contains(SideFlags::VISIBLE)));

        let sided = tree
            .leaves()
            .into_iter()
            .filter(|leaf| tree.node(*leaf).leaf_contents() == Some(Contents::SOLID))
            .flat_map(|leaf| tree.node_portals(leaf))
            .filter(|(portal, _)| tree.portal(*portal).side.is_some())
            .count();
        assert_eq!(sided, 6);
    }
}

// portals.rs
