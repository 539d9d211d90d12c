///! Face extraction from portals, coplanar face merging and subdivision

use glam::DVec3;

use crate::{
    brush::MapBrush,
    error::Error,
    flags::{Contents, SurfaceFlags},
    geom::{self, Winding},
    map::Entity,
    plane_table::PlaneTable,
    texinfo::TexInfoTable,
};

use super::{Face, FaceId, NodeId, NodeKind, PortalId, Tree};

/// Point equality epsilon of merge edge search
const EQUAL_EPSILON: f64 = 0.001;

/// Convexity epsilon of merged polygon
const CONTINUOUS_EPSILON: f64 = 0.001;

/// Face extraction settings and session tables
pub struct FaceContext<'a> {
    /// Session planes
    pub planes: &'a PlaneTable,

    /// Session brush arena
    pub map_brushes: &'a [MapBrush],

    /// Session texinfos
    pub texinfos: &'a TexInfoTable,

    /// Map entities, brushes refer to them
    pub entities: &'a [Entity],

    /// Merge coplanar faces
    pub merge: bool,

    /// Maximal face extent along texture axes, none disables subdivision
    pub subdivide_size: Option<f64>,

    /// Drop faces looking down
    pub backclip: bool,
}

/// Build face of the portal side looking into `pside` node
fn face_from_portal(tree: &Tree, portal: PortalId, pside: usize, ctx: &FaceContext) -> Option<Face> {
    let p = tree.portal(portal);

    // portal does not bridge different visible contents
    let side_ref = p.side?;
    let side = &ctx.map_brushes[side_ref.brush].sides[side_ref.side];
    let texinfo = side.texinfo?;

    if side.surface.contains(SurfaceFlags::NODRAW) {
        return None;
    }

    let contents = tree.node(p.nodes[pside]).leaf_contents().unwrap_or_default();
    let other_contents = tree.node(p.nodes[pside ^ 1]).leaf_contents().unwrap_or_default();

    // don't show insides of windows
    if contents.contains(Contents::WINDOW) && (contents ^ other_contents).visible() == Contents::WINDOW {
        return None;
    }

    let plane = side.plane.positive().with_side(pside == 1);

    // faces looking down are never seen from above
    if ctx.backclip && ctx.planes.get(plane).normal.z < -0.9 {
        let entity = ctx.map_brushes[side_ref.brush].entity;
        let rotating = ctx.entities
            .get(entity)
            .is_some_and(|entity| entity.classname() == "func_rotating");

        if !rotating && !ctx.texinfos.get(texinfo).flags.contains(SurfaceFlags::LIGHT) {
            return None;
        }
    }

    let winding = if pside == 1 {
        p.winding.reversed()
    } else {
        p.winding.clone()
    };

    Some(Face {
        plane,
        texinfo,
        contents,
        winding,
        vertices: Vec::new(),
        merged: None,
        split: [None, None],
        portal: Some(portal),
        output: None,
    })
}

/// Merge two polygons sharing an edge if the result stays convex
pub fn try_merge_winding(f1: &Winding, f2: &Winding, normal: DVec3) -> Option<Winding> {
    let n1 = f1.points.len();
    let n2 = f2.points.len();

    let equal = |a: DVec3, b: DVec3| (a - b).abs().max_element() <= EQUAL_EPSILON;

    // find a common edge
    let (i, j) = (0..n1)
        .flat_map(|i| (0..n2).map(move |j| (i, j)))
        .find(|&(i, j)| true
            && equal(f1.points[i], f2.points[(j + 1) % n2])
            && equal(f1.points[(i + 1) % n1], f2.points[j])
        )?;

    let p1 = f1.points[i];
    let p2 = f1.points[(i + 1) % n1];

    // check slope of connected lines, colinear points are removed
    let back = f1.points[(i + n1 - 1) % n1];
    let edge_normal = normal.cross(p1 - back).normalize_or_zero();
    let dot = (f2.points[(j + 2) % n2] - p1).dot(edge_normal);
    if dot > CONTINUOUS_EPSILON {
        return None;
    }
    let keep1 = dot < -CONTINUOUS_EPSILON;

    let back = f1.points[(i + 2) % n1];
    let edge_normal = normal.cross(back - p2).normalize_or_zero();
    let dot = (f2.points[(j + n2 - 1) % n2] - p2).dot(edge_normal);
    if dot > CONTINUOUS_EPSILON {
        return None;
    }
    let keep2 = dot < -CONTINUOUS_EPSILON;

    // build the new polygon
    let mut points = Vec::with_capacity(n1 + n2);

    let mut k = (i + 1) % n1;
    while k != i {
        if k != (i + 1) % n1 || keep2 {
            points.push(f1.points[k]);
        }
        k = (k + 1) % n1;
    }

    let mut l = (j + 1) % n2;
    while l != j {
        if l != (j + 1) % n2 || keep1 {
            points.push(f2.points[l]);
        }
        l = (l + 1) % n2;
    }

    Some(Winding::new(points))
}

/// Try to merge two node faces
fn try_merge(f1: &Face, f2: &Face, planes: &PlaneTable) -> Option<Face> {
    if f1.texinfo != f2.texinfo || f1.plane != f2.plane || f1.contents != f2.contents {
        return None;
    }

    let winding = try_merge_winding(&f1.winding, &f2.winding, planes.get(f1.plane).normal)?;

    Some(f1.with_winding(winding))
}

/// Merge all faces of the node. Merged faces are appended to the node list,
/// so they are checked against all the faces again.
fn merge_node_faces(tree: &mut Tree, node: NodeId, planes: &PlaneTable) -> usize {
    let mut merge_count = 0;
    let mut i = 0;

    while i < tree.node(node).faces.len() {
        let f1 = tree.node(node).faces[i];
        i += 1;

        if !tree.face(f1).is_final() {
            continue;
        }

        for j in 0..i - 1 {
            let f2 = tree.node(node).faces[j];
            if !tree.face(f2).is_final() {
                continue;
            }

            let Some(merged) = try_merge(tree.face(f1), tree.face(f2), planes) else {
                continue;
            };

            let merged = tree.add_face(merged);
            tree.face_mut(f1).merged = Some(merged);
            tree.face_mut(f2).merged = Some(merged);
            tree.node_mut(node).faces.push(merged);
            merge_count += 1;
            break;
        }
    }

    merge_count
}

/// Chop node faces that are larger than subdivide size along texture axes
fn subdivide_node_faces(tree: &mut Tree, node: NodeId, size: f64, texinfos: &TexInfoTable) -> Result<usize, Error> {
    let mut subdivide_count = 0;
    let mut i = 0;

    'face_loop: while i < tree.node(node).faces.len() {
        let face_id = tree.node(node).faces[i];
        i += 1;

        let face = tree.face(face_id);
        if !face.is_final() {
            continue;
        }

        // special (non-surface cached) faces don't need subdivision
        let texinfo = texinfos.get(face.texinfo);
        if texinfo.flags.contains(SurfaceFlags::WARP) {
            continue;
        }

        for axis in 0..2 {
            let vec = texinfo.axis(axis);

            let mut min = f64::MAX;
            let mut max = f64::MIN;
            for point in &face.winding.points {
                let v = point.dot(vec);
                min = min.min(v);
                max = max.max(v);
            }

            // no subdivision along this axis
            if max - min <= size {
                continue;
            }

            let length = vec.length();
            if length == 0.0 {
                continue;
            }
            let normal = vec / length;
            let distance = (min + size - 16.0) / length;

            let (Some(front), Some(back)) = face.winding.clip(normal, distance, geom::ON_EPSILON) else {
                log::error!("subdivision didn't split the polygon (texture '{}')", texinfo.texture);
                return Err(Error::SubdivideFailed);
            };

            let front = face.with_winding(front);
            let back = face.with_winding(back);

            let split = [tree.add_face(front), tree.add_face(back)];
            tree.face_mut(face_id).split = [Some(split[0]), Some(split[1])];
            tree.node_mut(node).faces.extend(split);
            subdivide_count += 1;

            // pieces are processed later in this loop
            continue 'face_loop;
        }
    }

    Ok(subdivide_count)
}

/// Build faces of the whole tree
pub fn make_faces(tree: &mut Tree, ctx: &FaceContext) -> Result<(), Error> {
    let mut face_count = 0;
    let mut merge_count = 0;
    let mut subdivide_count = 0;

    // post-order walk, node is visited again after its children
    let mut stack = vec![(tree.head, false)];

    while let Some((node, children_done)) = stack.pop() {
        match tree.node(node).kind {
            NodeKind::Internal { children, .. } => {
                if !children_done {
                    stack.push((node, true));
                    stack.push((children[1], false));
                    stack.push((children[0], false));
                    continue;
                }

                if ctx.merge {
                    merge_count += merge_node_faces(tree, node, ctx.planes);
                }
                if let Some(size) = ctx.subdivide_size {
                    subdivide_count += subdivide_node_faces(tree, node, size, ctx.texinfos)?;
                }
            }
            NodeKind::Leaf { contents } => {
                // solid leaves never have visible faces
                if contents.contains(Contents::SOLID) {
                    continue;
                }

                for (portal, pside) in tree.node_portals(node) {
                    let Some(face) = face_from_portal(tree, portal, pside, ctx) else {
                        continue;
                    };
                    let Some(on_node) = tree.portal(portal).on_node else {
                        continue;
                    };

                    let face = tree.add_face(face);
                    tree.portal_mut(portal).faces[pside] = Some(face);
                    tree.node_mut(on_node).faces.push(face);
                    face_count += 1;
                }
            }
        }
    }

    log::debug!("faces: {} made, {} merged, {} subdivided", face_count, merge_count, subdivide_count);

    Ok(())
}

/// Faces of node that go to output
pub fn final_faces(tree: &Tree, node: NodeId) -> impl Iterator<Item = FaceId> + '_ {
    tree.node(node)
        .faces
        .iter()
        .copied()
        .filter(|face| tree.face(*face).is_final())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn square(min: DVec3, size: f64) -> Winding {
        // clockwise seen from +Z
        Winding::new(vec![
            min,
            min + DVec3::new(0.0, size, 0.0),
            min + DVec3::new(size, size, 0.0),
            min + DVec3::new(size, 0.0, 0.0),
        ])
    }

    #[test]
    fn adjacent_squares_merge() {
        let a = square(DVec3::ZERO, 16.0);
        let b = square(DVec3::new(16.0, 0.0, 0.0), 16.0);
        let normal = a.plane().unwrap().normal;

        let merged = try_merge_winding(&a, &b, normal).unwrap();

        // colinear points are dropped
        assert_eq!(merged.points.len(), 4);
        assert_relative_eq!(merged.area(), 512.0, epsilon = 1e-6);
        assert_relative_eq!(merged.plane().unwrap().normal.dot(normal), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn concave_result_is_rejected() {
        let a = square(DVec3::ZERO, 16.0);
        let b = square(DVec3::new(16.0, 8.0, 0.0), 16.0);
        let normal = a.plane().unwrap().normal;

        assert!(try_merge_winding(&a, &b, normal).is_none());

        // L-shaped union
        let c = Winding::new(vec![
            DVec3::new(16.0, 0.0, 0.0),
            DVec3::new(16.0, 16.0, 0.0),
            DVec3::new(32.0, 16.0, 0.0),
            DVec3::new(32.0, 0.0, 0.0),
        ]);
        let tall = Winding::new(vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, 32.0, 0.0),
            DVec3::new(16.0, 32.0, 0.0),
            DVec3::new(16.0, 16.0, 0.0),
            DVec3::new(16.0, 0.0, 0.0),
        ]);
        assert!(try_merge_winding(&tall, &c, normal).is_none());
    }

    #[test]
    fn disjoint_squares_dont_merge() {
        let a = square(DVec3::ZERO, 16.0);
        let b = square(DVec3::new(32.0, 0.0, 0.0), 16.0);

        assert!(try_merge_winding(&a, &b, DVec3::Z).is_none());
    }
}

// faces.rs
