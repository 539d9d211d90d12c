///! Compiled tree to output lumps writer

use crate::{
    brush::MapBrush,
    error::{check_capacity, Error},
    flags::Contents,
    geom::BoundBox,
    limits,
    plane_table::PlaneTable,
    texinfo::TexInfoTable,
};

use super::{
    faces::final_faces,
    format::{self, BspFile},
    tjunc::{EdgeTable, VertexPool},
    FaceId, NodeId, NodeKind, Tree,
};

/// Head node reference of model without any nodes
pub const EMPTY_MODEL: i32 = -1;

/// Output file under construction
pub struct Emitter {
    /// Lumps written so far
    pub file: BspFile,

    /// Edge sharing table
    pub edges: EdgeTable,
}

/// Node bounds in output format
fn bounds_i16(bounds: &BoundBox) -> ([i16; 3], [i16; 3]) {
    let cast = |value: f64| value.clamp(i16::MIN as f64, i16::MAX as f64) as i16;

    (
        [cast(bounds.min.x.floor()), cast(bounds.min.y.floor()), cast(bounds.min.z.floor())],
        [cast(bounds.max.x.ceil()), cast(bounds.max.y.ceil()), cast(bounds.max.z.ceil())],
    )
}

/// Leaf reference for node children
pub fn leaf_child(leaf: usize) -> i32 {
    -(leaf as i32 + 1)
}

/// Leaf index of child reference, none for nodes
pub fn child_leaf(child: i32) -> Option<usize> {
    if child < 0 {
        Some((-child - 1) as usize)
    } else {
        None
    }
}

impl Emitter {
    /// Start new file. Leaf 0 is the common solid leaf without faces.
    pub fn new(share_edges: bool) -> Self {
        let mut file = BspFile::default();
        file.leafs.push(format::Leaf {
            contents: Contents::SOLID.bits(),
            ..Default::default()
        });

        Self { file, edges: EdgeTable::new(share_edges) }
    }

    /// Write all map brushes, leaf brush references are map brush indices
    pub fn emit_brushes(&mut self, map_brushes: &[MapBrush]) -> Result<(), Error> {
        for brush in map_brushes {
            check_capacity("brushes", self.file.brushes.len() + 1, limits::MAX_MAP_BRUSHES)?;

            self.file.brushes.push(format::Brush {
                first_side: self.file.brush_sides.len() as i32,
                side_count: brush.sides.len() as i32,
                contents: brush.contents.bits(),
            });

            for side in &brush.sides {
                check_capacity("brushsides", self.file.brush_sides.len() + 1, limits::MAX_MAP_BRUSHSIDES)?;

                self.file.brush_sides.push(format::BrushSide {
                    plane: side.plane.into_index() as u16,
                    texinfo: side.texinfo.map(|texinfo| texinfo as i16).unwrap_or(-1),
                });
            }
        }

        Ok(())
    }

    /// Write single face, faces that lost their polygon are skipped
    fn emit_face(&mut self, tree: &mut Tree, face_id: FaceId) -> Result<(), Error> {
        let face = tree.face(face_id);
        if face.vertices.len() < 3 {
            return Ok(());
        }

        check_capacity("faces", self.file.faces.len() + 1, limits::MAX_MAP_FACES)?;
        check_capacity("surfedges", self.file.surfedges.len() + face.vertices.len(), limits::MAX_MAP_SURFEDGES)?;

        let first_edge = self.file.surfedges.len();
        let count = face.vertices.len();

        for i in 0..count {
            let edge = self.edges.get_edge(face.vertices[i], face.vertices[(i + 1) % count], face.contents)?;
            self.file.surfedges.push(edge);
        }

        self.file.faces.push(format::Face {
            plane: face.plane.positive().into_index() as u16,
            side: face.plane.is_back() as u16,
            first_edge: first_edge as i32,
            edge_count: count as u16,
            texinfo: face.texinfo as u16,
            light_offset: -1,
        });

        tree.face_mut(face_id).output = Some(self.file.faces.len() - 1);

        Ok(())
    }

    /// Add output faces the leaf sees through the face (and its pieces)
    fn mark_leaf_faces(tree: &Tree, face: FaceId, first: usize, leaf_faces: &mut Vec<u16>) -> Result<(), Error> {
        let mut stack = vec![face];

        while let Some(mut face) = stack.pop() {
            while let Some(merged) = tree.face(face).merged {
                face = merged;
            }

            let f = tree.face(face);
            if let [Some(front), Some(back)] = f.split {
                stack.push(back);
                stack.push(front);
                continue;
            }

            // face was dropped
            let Some(output) = f.output else {
                continue;
            };
            let output = output as u16;

            if !leaf_faces[first..].contains(&output) {
                check_capacity("leaffaces", leaf_faces.len() + 1, limits::MAX_MAP_LEAFFACES)?;
                leaf_faces.push(output);
            }
        }

        Ok(())
    }

    /// Write leaf, returns its index
    fn emit_leaf(&mut self, tree: &Tree, node: NodeId, contents: Contents) -> Result<usize, Error> {
        check_capacity("leafs", self.file.leafs.len() + 1, limits::MAX_MAP_LEAFS)?;

        let n = tree.node(node);
        let (mins, maxs) = bounds_i16(&n.bounds);

        let first_leaf_brush = self.file.leaf_brushes.len();
        for brush in &n.brushes {
            let Some(original) = brush.original else {
                continue;
            };
            let original = original as u16;

            if !self.file.leaf_brushes[first_leaf_brush..].contains(&original) {
                check_capacity("leafbrushes", self.file.leaf_brushes.len() + 1, limits::MAX_MAP_LEAFBRUSHES)?;
                self.file.leaf_brushes.push(original);
            }
        }

        let first_leaf_face = self.file.leaf_faces.len();

        // solid leaves never see anything
        if !contents.contains(Contents::SOLID) {
            for (portal, side) in tree.node_portals(node) {
                if let Some(face) = tree.portal(portal).faces[side] {
                    Self::mark_leaf_faces(tree, face, first_leaf_face, &mut self.file.leaf_faces)?;
                }
            }
        }

        self.file.leafs.push(format::Leaf {
            contents: contents.bits(),
            mins,
            maxs,
            first_leaf_face: first_leaf_face as u16,
            leaf_face_count: (self.file.leaf_faces.len() - first_leaf_face) as u16,
            first_leaf_brush: first_leaf_brush as u16,
            leaf_brush_count: (self.file.leaf_brushes.len() - first_leaf_brush) as u16,
        });

        Ok(self.file.leafs.len() - 1)
    }

    /// Write tree nodes in pre-order, returns head reference
    pub fn emit_tree(&mut self, tree: &mut Tree) -> Result<i32, Error> {
        // (node, parent output node and child slot)
        let mut stack: Vec<(NodeId, Option<(usize, usize)>)> = vec![(tree.head, None)];
        let mut head = EMPTY_MODEL;

        while let Some((node, parent)) = stack.pop() {
            let reference = match tree.node(node).kind {
                NodeKind::Leaf { contents } => leaf_child(self.emit_leaf(tree, node, contents)?),
                NodeKind::Internal { plane, children } => {
                    check_capacity("nodes", self.file.nodes.len() + 1, limits::MAX_MAP_NODES)?;

                    debug_assert!(!plane.is_back(), "node plane must be positive");

                    let index = self.file.nodes.len();
                    let (mins, maxs) = bounds_i16(&tree.node(node).bounds);
                    let first_face = self.file.faces.len();

                    self.file.nodes.push(format::Node {
                        plane: plane.into_index() as i32,
                        children: [0, 0],
                        mins,
                        maxs,
                        first_face: 0,
                        face_count: 0,
                    });

                    let faces = final_faces(tree, node).collect::<Vec<_>>();
                    for face in faces {
                        self.emit_face(tree, face)?;
                    }

                    let out = &mut self.file.nodes[index];
                    out.first_face = first_face as u16;
                    out.face_count = (self.file.faces.len() - first_face) as u16;

                    stack.push((children[1], Some((index, 1))));
                    stack.push((children[0], Some((index, 0))));

                    index as i32
                }
            };

            match parent {
                Some((parent, slot)) => {
                    let mut children = self.file.nodes[parent].children;
                    children[slot] = reference;
                    self.file.nodes[parent].children = children;
                }
                None => head = reference,
            }
        }

        Ok(head)
    }

    /// Bounds of node or leaf reference
    fn child_bounds(&self, child: i32) -> ([i16; 3], [i16; 3]) {
        match child_leaf(child) {
            Some(leaf) => {
                let leaf = &self.file.leafs[leaf];
                (leaf.mins, leaf.maxs)
            }
            None => {
                let node = &self.file.nodes[child as usize];
                (node.mins, node.maxs)
            }
        }
    }

    /// Join subtrees with planeless nodes, both children of those must be searched
    pub fn join_subtrees(&mut self, subtrees: &[i32]) -> Result<i32, Error> {
        let mut result = EMPTY_MODEL;

        for &subtree in subtrees {
            if subtree == EMPTY_MODEL {
                continue;
            }
            if result == EMPTY_MODEL {
                result = subtree;
                continue;
            }

            check_capacity("nodes", self.file.nodes.len() + 1, limits::MAX_MAP_NODES)?;

            let (min0, max0) = self.child_bounds(result);
            let (min1, max1) = self.child_bounds(subtree);

            self.file.nodes.push(format::Node {
                plane: -1,
                children: [result, subtree],
                mins: std::array::from_fn(|i| min0[i].min(min1[i])),
                maxs: std::array::from_fn(|i| max0[i].max(max1[i])),
                first_face: 0,
                face_count: 0,
            });

            result = self.file.nodes.len() as i32 - 1;
        }

        Ok(result)
    }

    /// Write session tables that are complete only at the end of compilation
    pub fn finish(mut self, planes: &PlaneTable, texinfos: &TexInfoTable, vertices: &VertexPool, entities: String) -> BspFile {
        self.file.planes = planes
            .planes()
            .iter()
            .map(|plane| format::Plane {
                normal: plane.normal.into(),
                distance: plane.distance as f32,
                ty: plane.ty as u32,
            })
            .collect();

        self.file.texinfo = texinfos
            .infos()
            .iter()
            .map(|info| format::TexInfo {
                vecs: info.vecs,
                flags: info.flags.bits(),
                value: info.value,
                texture: format::texture_name_bytes(&info.texture),
                next_texinfo: info.next_texinfo,
            })
            .collect();

        self.file.vertexes = vertices
            .points()
            .iter()
            .map(|point| format::Vertex { point: (*point).into() })
            .collect();

        self.file.edges = self.edges
            .edges()
            .iter()
            .map(|[v1, v2]| format::Edge { v: [*v1 as u16, *v2 as u16] })
            .collect();

        self.file.entities = entities;

        self.file
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use crate::{
        bsp::{
            faces::{make_faces, FaceContext},
            portals::{self, tests::{box_map_brushes, portal_tree}},
            tjunc::fix_tjuncs,
        },
        plane_table::PlaneTable,
        texinfo::TexInfoTable,
    };

    use super::*;

    #[test]
    fn box_tree_is_written() {
        let mut planes = PlaneTable::new();
        let mut map_brushes = box_map_brushes(&[(DVec3::ZERO, DVec3::splat(64.0))], &mut planes);
        let mut texinfos = TexInfoTable::new();
        let texinfo = texinfos.find_or_add(crate::texinfo::TexInfo {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            flags: Default::default(),
            value: 0,
            texture: "tex/grey".to_string(),
            next_texinfo: -1,
        }).unwrap();
        for side in &mut map_brushes[0].sides {
            side.texinfo = Some(texinfo);
        }

        let mut tree = portal_tree(&map_brushes, &mut planes);
        portals::mark_visible_sides(&mut tree, &mut map_brushes, 0..1, &planes);
        make_faces(&mut tree, &FaceContext {
            planes: &planes,
            map_brushes: &map_brushes,
            texinfos: &texinfos,
            entities: &[],
            merge: true,
            subdivide_size: None,
            backclip: false,
        }).unwrap();

        let mut pool = VertexPool::new(true);
        fix_tjuncs(&mut tree, &mut pool, true).unwrap();

        let mut emitter = Emitter::new(true);
        emitter.emit_brushes(&map_brushes).unwrap();
        let head = emitter.emit_tree(&mut tree).unwrap();
        let file = emitter.finish(&planes, &texinfos, &pool, String::new());

        assert_eq!(head, 0);
        assert_eq!(file.faces.len(), 6);
        assert_eq!(file.vertexes.len(), 8);
        // 12 box edges plus the dummy one
        assert_eq!(file.edges.len(), 13);
        assert!(file.surfedges.iter().all(|edge| *edge != 0));

        let solid = file.leafs[1..]
            .iter()
            .filter(|leaf| leaf.contents & Contents::SOLID.bits() != 0)
            .collect::<Vec<_>>();
        assert_eq!(solid.len(), 1);
        assert_eq!({ solid[0].leaf_face_count }, 0);
        assert_eq!({ solid[0].leaf_brush_count }, 1);

        // every face is visible from some empty leaf
        let mut seen = file.leafs[1..]
            .iter()
            .flat_map(|leaf| {
                let first = leaf.first_leaf_face as usize;
                file.leaf_faces[first..first + leaf.leaf_face_count as usize].to_vec()
            })
            .collect::<Vec<_>>();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, (0..6).collect::<Vec<u16>>());
    }

    #[test]
    fn subtrees_are_joined() {
        let mut emitter = Emitter::new(true);
        emitter.file.leafs.push(format::Leaf { mins: [0, 0, 0], maxs: [8, 8, 8], ..Default::default() });
        emitter.file.leafs.push(format::Leaf { mins: [-8, 0, 0], maxs: [0, 16, 8], ..Default::default() });

        assert_eq!(emitter.join_subtrees(&[EMPTY_MODEL, EMPTY_MODEL]).unwrap(), EMPTY_MODEL);
        assert_eq!(emitter.join_subtrees(&[EMPTY_MODEL, leaf_child(1)]).unwrap(), leaf_child(1));

        let joined = emitter.join_subtrees(&[leaf_child(1), EMPTY_MODEL, leaf_child(2)]).unwrap();
        let node = emitter.file.nodes[joined as usize];

        assert_eq!({ node.plane }, -1);
        assert_eq!({ node.children }, [leaf_child(1), leaf_child(2)]);
        assert_eq!({ node.mins }, [-8, 0, 0]);
        assert_eq!({ node.maxs }, [8, 16, 8]);
    }
}

// emit.rs
