///! Line of sight tests against compiled level models

use glam::DVec3;

use crate::{
    bsp::{
        emit::{child_leaf, EMPTY_MODEL},
        format::{BspFile, Leaf, Node, Plane},
    },
    flags::Contents,
    limits,
};

/// Distance from node plane segment is considered lying on it
const TRACE_EPSILON: f64 = 0.1;

/// Segment tracer through all visible level models of the file
pub struct Tracer<'a> {
    /// File nodes
    nodes: &'a [Node],

    /// File leaves
    leafs: &'a [Leaf],

    /// File planes
    planes: &'a [Plane],

    /// Head nodes of non-empty visible level models
    heads: Vec<i32>,
}

impl<'a> Tracer<'a> {
    /// Build tracer of the file
    pub fn new(file: &'a BspFile) -> Self {
        let heads = file.models
            .iter()
            .take(limits::LEVEL_WEAPONCLIP)
            .map(|model| model.head_node)
            .filter(|head| *head != EMPTY_MODEL)
            .collect();

        Self {
            nodes: &file.nodes,
            leafs: &file.leafs,
            planes: &file.planes,
            heads,
        }
    }

    /// Check if segment passes through solid leaf of any model
    pub fn test_line(&self, start: DVec3, end: DVec3) -> bool {
        self.heads.iter().any(|head| self.test_line_node(*head, start, end))
    }

    /// Trace segment through subtree
    fn test_line_node(&self, head: i32, start: DVec3, end: DVec3) -> bool {
        let mut stack = vec![(head, start, end)];

        while let Some((node, start, end)) = stack.pop() {
            if let Some(leaf) = child_leaf(node) {
                let contents = self.leafs.get(leaf).map(|leaf| leaf.contents).unwrap_or(0);
                if contents & Contents::SOLID.bits() != 0 {
                    return true;
                }
                continue;
            }

            let Some(n) = self.nodes.get(node as usize) else {
                continue;
            };
            let children = n.children;

            // merge node, both subtrees hold geometry
            if n.plane < 0 {
                stack.push((children[1], start, end));
                stack.push((children[0], start, end));
                continue;
            }

            let plane = self.planes[n.plane as usize];
            let normal = DVec3::from(plane.normal);
            let distance = plane.distance as f64;

            let d1 = normal.dot(start) - distance;
            let d2 = normal.dot(end) - distance;

            if d1 >= -TRACE_EPSILON && d2 >= -TRACE_EPSILON {
                stack.push((children[0], start, end));
                continue;
            }
            if d1 < TRACE_EPSILON && d2 < TRACE_EPSILON {
                stack.push((children[1], start, end));
                continue;
            }

            // segment crosses the plane, near half goes first
            let side = (d1 < 0.0) as usize;
            let middle = start + (end - start) * (d1 / (d1 - d2));

            stack.push((children[side ^ 1], middle, end));
            stack.push((children[side], start, middle));
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bsp::compiler::compile_bsp,
        map::{loader::tests::box_brush_text, Map},
        options::CompileOptions,
    };

    use super::*;

    #[test]
    fn box_blocks_lines() {
        let text = format!(
            "{{ \"classname\" \"worldspawn\" {{ {} }} }}",
            box_brush_text(DVec3::ZERO, DVec3::splat(64.0), "tex/grey", "")
        );
        let file = compile_bsp(&Map::parse(&text).unwrap(), &CompileOptions::default()).unwrap();
        let tracer = Tracer::new(&file);

        assert!(tracer.test_line(DVec3::new(-16.0, 32.0, 32.0), DVec3::new(80.0, 32.0, 32.0)));
        assert!(!tracer.test_line(DVec3::new(-16.0, 32.0, 80.0), DVec3::new(80.0, 32.0, 80.0)));
        assert!(!tracer.test_line(DVec3::new(-16.0, -16.0, 0.0), DVec3::new(-16.0, 80.0, 64.0)));
    }

    #[test]
    fn empty_file_blocks_nothing() {
        let file = BspFile::default();

        assert!(!Tracer::new(&file).test_line(DVec3::ZERO, DVec3::splat(100.0)));
    }
}

// trace.rs
