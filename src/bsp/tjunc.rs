///! Vertex welding, T-junction repair and edge sharing

use std::collections::HashMap;

use glam::DVec3;

use crate::{
    error::{check_capacity, Error},
    flags::Contents,
    geom::{self, Winding},
    limits,
};

use super::{faces::final_faces, FaceId, NodeId, NodeKind, Tree};

/// Distance from integer coordinate vertex is snapped from
const INTEGRAL_EPSILON: f64 = 0.01;

/// Per-axis distance of equal vertices
const POINT_EPSILON: f64 = 0.5;

/// Distance from edge vertex is considered lying on
const OFF_EPSILON: f64 = 0.5;

/// Hash grid size along each axis
const HASH_SIZE: i32 = 64;

/// Session vertex storage with x/y spatial hash
pub struct VertexPool {
    /// All emitted vertices
    points: Vec<DVec3>,

    /// Next vertex in the same hash cell
    chain: Vec<Option<usize>>,

    /// First vertex of every hash cell
    hash: Vec<Option<usize>>,

    /// Share vertices within the tree
    weld: bool,
}

/// Hash cell coordinate of the value
fn hash_coordinate(value: f64) -> i32 {
    ((geom::MAX_WORLD_WIDTH as i32 + (value + 0.5) as i32) >> 7).clamp(0, HASH_SIZE - 1)
}

/// Snap coordinates that are close to integers
fn snap_point(point: DVec3) -> DVec3 {
    let rounded = point.round();
    let mut result = point;

    for axis in 0..3 {
        if (point[axis] - rounded[axis]).abs() < INTEGRAL_EPSILON {
            result[axis] = rounded[axis];
        }
    }

    result
}

impl VertexPool {
    /// Create empty pool
    pub fn new(weld: bool) -> Self {
        Self {
            points: Vec::new(),
            chain: Vec::new(),
            hash: vec![None; (HASH_SIZE * HASH_SIZE) as usize],
            weld,
        }
    }

    /// Forget hashed vertices, so next tree won't weld to them
    pub fn reset_hash(&mut self) {
        self.hash.fill(None);
    }

    /// Vertex by index
    pub fn point(&self, index: usize) -> DVec3 {
        self.points[index]
    }

    /// All vertices
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    /// Count of vertices
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if pool is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append vertex without hashing
    fn push(&mut self, point: DVec3) -> Result<usize, Error> {
        check_capacity("vertexes", self.points.len() + 1, limits::MAX_MAP_VERTS)?;

        self.points.push(point);
        self.chain.push(None);
        Ok(self.points.len() - 1)
    }

    /// Find existing vertex or allocate a new one
    pub fn find_or_add(&mut self, point: DVec3) -> Result<usize, Error> {
        // make every point unique
        if !self.weld {
            return self.push(point);
        }

        let point = snap_point(point);
        let cell = (hash_coordinate(point.y) * HASH_SIZE + hash_coordinate(point.x)) as usize;

        let mut current = self.hash[cell];
        while let Some(index) = current {
            if (self.points[index] - point).abs().max_element() < POINT_EPSILON {
                return Ok(index);
            }
            current = self.chain[index];
        }

        let index = self.push(point)?;
        self.chain[index] = self.hash[cell];
        self.hash[cell] = Some(index);

        Ok(index)
    }

    /// Hashed vertices in cells covered by the edge
    fn edge_vertices(&self, v1: DVec3, v2: DVec3) -> Vec<usize> {
        let (x1, x2) = (hash_coordinate(v1.x), hash_coordinate(v2.x));
        let (y1, y2) = (hash_coordinate(v1.y), hash_coordinate(v2.y));

        let mut result = Vec::new();

        for x in x1.min(x2)..=x1.max(x2) {
            for y in y1.min(y2)..=y1.max(y2) {
                let mut current = self.hash[(y * HASH_SIZE + x) as usize];
                while let Some(index) = current {
                    result.push(index);
                    current = self.chain[index];
                }
            }
        }

        result
    }
}

/// Polygon of pool vertices
fn winding_for(pool: &VertexPool, vertices: &[usize]) -> Winding {
    Winding::new(vertices.iter().map(|index| pool.point(*index)).collect())
}

/// Set face vertices, splitting the face into linked pieces if it has more
/// than `MAXEDGES` of them. `superverts[base]` becomes the first vertex.
fn face_from_superverts(tree: &mut Tree, node: NodeId, face: FaceId, superverts: &[usize], mut base: usize, pool: &VertexPool) -> usize {
    let count = superverts.len();
    let mut remaining = count;
    let mut face = face;
    let mut overflows = 0;

    // must split into two faces, because of vertex overload
    while remaining > limits::MAXEDGES {
        let vertices = (0..limits::MAXEDGES)
            .map(|i| superverts[(i + base) % count])
            .collect::<Vec<_>>();

        let mut piece = tree.face(face).with_winding(winding_for(pool, &vertices));
        piece.vertices = vertices;
        let piece = tree.add_face(piece);

        let rest = tree.face(face).with_winding(Winding::new(Vec::new()));
        let rest = tree.add_face(rest);

        tree.face_mut(face).split = [Some(piece), Some(rest)];
        tree.node_mut(node).faces.extend([piece, rest]);

        face = rest;
        remaining -= limits::MAXEDGES - 2;
        base = (base + limits::MAXEDGES - 1) % count;
        overflows += 1;
    }

    let vertices = (0..remaining)
        .map(|i| superverts[(i + base) % count])
        .collect::<Vec<_>>();

    let face = tree.face_mut(face);
    if face.winding.points.is_empty() {
        face.winding = winding_for(pool, &vertices);
    }
    face.vertices = vertices;

    overflows
}

/// Edge being fixed
struct EdgeTest<'a> {
    /// Edge start point
    start: DVec3,

    /// Normalized edge direction
    direction: DVec3,

    /// Vertices that may lie on the edge
    candidates: &'a [usize],

    /// Vertex storage
    pool: &'a VertexPool,

    /// Resulting face vertices
    superverts: Vec<usize>,

    /// Count of vertices inserted
    tjunctions: usize,

    /// Count of degenerate edges
    degenerate: usize,
}

impl EdgeTest<'_> {
    /// Append `p1` and all the vertices lying strictly inside of the edge
    fn test(&mut self, start: f64, end: f64, p1: usize, p2: usize, first_candidate: usize) {
        if p1 == p2 {
            self.degenerate += 1;
            return;
        }

        for k in first_candidate..self.candidates.len() {
            let j = self.candidates[k];
            if j == p1 || j == p2 {
                continue;
            }

            let point = self.pool.point(j);
            let distance = (point - self.start).dot(self.direction);

            // off an end
            if distance <= start || distance >= end {
                continue;
            }

            let exact = self.start + self.direction * distance;
            if (point - exact).length() > OFF_EPSILON {
                continue;
            }

            // break the edge
            self.tjunctions += 1;
            self.test(start, distance, p1, j, k + 1);
            self.test(distance, end, j, p2, k + 1);
            return;
        }

        // the edge p1 to p2 is now free of tjunctions
        self.superverts.push(p1);
    }
}

/// Tree T-junction repair statistics
#[derive(Copy, Clone, Debug, Default)]
pub struct TjuncStats {
    /// Vertices referenced
    pub total_vertices: usize,

    /// Vertices added to pool
    pub unique_vertices: usize,

    /// Vertices inserted into edges
    pub tjunctions: usize,

    /// Faces that lost all the area
    pub collapsed: usize,

    /// Faces split because of vertex count
    pub overflows: usize,

    /// Faces without good start vertex
    pub bad_start_vertices: usize,
}

/// Insert vertices lying on face edges into the face
fn fix_face_edges(tree: &mut Tree, node: NodeId, face: FaceId, pool: &VertexPool, stats: &mut TjuncStats) {
    let vertices = tree.face(face).vertices.clone();
    let n = vertices.len();
    if n == 0 {
        return;
    }

    let mut superverts = Vec::new();
    let mut count = vec![0; n];
    let mut start = vec![0; n];

    for i in 0..n {
        let p1 = vertices[i];
        let p2 = vertices[(i + 1) % n];

        let v1 = pool.point(p1);
        let v2 = pool.point(p2);
        let candidates = pool.edge_vertices(v1, v2);

        let mut edge = EdgeTest {
            start: v1,
            direction: (v2 - v1).normalize_or_zero(),
            candidates: &candidates,
            pool,
            superverts: std::mem::take(&mut superverts),
            tjunctions: 0,
            degenerate: 0,
        };

        start[i] = edge.superverts.len();
        edge.test(0.0, (v2 - v1).length(), p1, p2, 0);
        count[i] = edge.superverts.len() - start[i];

        stats.tjunctions += edge.tjunctions;
        superverts = edge.superverts;
    }

    // entire face collapsed
    if superverts.len() < 3 {
        tree.face_mut(face).vertices.clear();
        stats.collapsed += 1;
        return;
    }

    // pick a vertex that doesn't have tjunctions on either side
    let base = match (0..n).find(|&i| count[i] == 1 && count[(i + n - 1) % n] == 1) {
        Some(i) => start[i],
        None => {
            stats.bad_start_vertices += 1;
            0
        }
    };

    stats.overflows += face_from_superverts(tree, node, face, &superverts, base, pool);
}

/// Internal nodes of tree, in pre-order
fn internal_nodes(tree: &Tree) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut stack = vec![tree.head];

    while let Some(node) = stack.pop() {
        if let NodeKind::Internal { children, .. } = tree.node(node).kind {
            result.push(node);
            stack.push(children[1]);
            stack.push(children[0]);
        }
    }

    result
}

/// Snap and weld face vertices, then break edges on T-junctions
pub fn fix_tjuncs(tree: &mut Tree, pool: &mut VertexPool, fix_edges: bool) -> Result<TjuncStats, Error> {
    let mut stats = TjuncStats::default();
    let nodes = internal_nodes(tree);

    pool.reset_hash();
    let start_vertex_count = pool.len();

    for &node in &nodes {
        let faces = final_faces(tree, node).collect::<Vec<_>>();

        for face in faces {
            let superverts = tree
                .face(face)
                .winding
                .points
                .iter()
                .map(|point| pool.find_or_add(*point))
                .collect::<Result<Vec<_>, Error>>()?;

            stats.total_vertices += superverts.len();
            stats.overflows += face_from_superverts(tree, node, face, &superverts, 0, pool);
        }
    }
    stats.unique_vertices = pool.len() - start_vertex_count;

    if fix_edges {
        for &node in &nodes {
            let faces = final_faces(tree, node).collect::<Vec<_>>();

            for face in faces {
                fix_face_edges(tree, node, face, pool, &mut stats);
            }
        }
    }

    log::debug!(
        "tjunc: {} unique vertices from {}, {} tjunctions, {} faces collapsed, {} overflows, {} bad start vertices",
        stats.unique_vertices,
        stats.total_vertices,
        stats.tjunctions,
        stats.collapsed,
        stats.overflows,
        stats.bad_start_vertices,
    );

    Ok(stats)
}

/// Edge of output file with its users
struct EdgeUse {
    /// Contents of face that created the edge
    contents: Contents,

    /// Edge is already used in reverse direction
    shared: bool,
}

/// Output edge table. Edge 0 is never used, because surfedge sign means
/// edge direction.
pub struct EdgeTable {
    /// Edge vertex pairs
    edges: Vec<[usize; 2]>,

    /// Per-edge user data
    uses: Vec<EdgeUse>,

    /// Edges of current model by vertex pair
    lookup: HashMap<(usize, usize), Vec<usize>>,

    /// Share edges between faces
    share: bool,
}

impl EdgeTable {
    /// Create table with the dummy edge
    pub fn new(share: bool) -> Self {
        Self {
            edges: vec![[0, 0]],
            uses: vec![EdgeUse { contents: Contents::empty(), shared: true }],
            lookup: HashMap::new(),
            share,
        }
    }

    /// Start new model, edges are never shared between models
    pub fn begin_model(&mut self) {
        self.lookup.clear();
    }

    /// Get surfedge for the face edge. Negative values are edges used in
    /// reverse direction.
    pub fn get_edge(&mut self, v1: usize, v2: usize, contents: Contents) -> Result<i32, Error> {
        if self.share {
            if let Some(candidates) = self.lookup.get(&(v2, v1)) {
                for &index in candidates {
                    let edge_use = &mut self.uses[index];
                    if edge_use.contents == contents && !edge_use.shared {
                        edge_use.shared = true;
                        return Ok(-(index as i32));
                    }
                }
            }
        }

        // emit an edge
        check_capacity("edges", self.edges.len() + 1, limits::MAX_MAP_EDGES)?;

        let index = self.edges.len();
        self.edges.push([v1, v2]);
        self.uses.push(EdgeUse { contents, shared: false });
        self.lookup.entry((v1, v2)).or_default().push(index);

        Ok(index as i32)
    }

    /// All edges, dummy one included
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_vertices_are_welded() {
        let mut pool = VertexPool::new(true);

        let a = pool.find_or_add(DVec3::new(10.004, 20.0, 30.0)).unwrap();
        let b = pool.find_or_add(DVec3::new(10.3, 20.2, 29.9)).unwrap();
        let c = pool.find_or_add(DVec3::new(11.0, 20.0, 30.0)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.point(a), DVec3::new(10.0, 20.0, 30.0));

        // far away points are clamped into the edge cells
        assert!(pool.find_or_add(DVec3::splat(10000.0)).is_ok());
    }

    #[test]
    fn noweld_makes_vertices_unique() {
        let mut pool = VertexPool::new(false);

        let a = pool.find_or_add(DVec3::ONE).unwrap();
        let b = pool.find_or_add(DVec3::ONE).unwrap();

        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn edge_on_vertex_is_broken() {
        let mut pool = VertexPool::new(true);
        let p1 = pool.find_or_add(DVec3::ZERO).unwrap();
        let p2 = pool.find_or_add(DVec3::new(64.0, 0.0, 0.0)).unwrap();
        let mid = pool.find_or_add(DVec3::new(32.0, 0.2, 0.0)).unwrap();
        let _off = pool.find_or_add(DVec3::new(16.0, 4.0, 0.0)).unwrap();

        let candidates = pool.edge_vertices(pool.point(p1), pool.point(p2));
        let mut edge = EdgeTest {
            start: DVec3::ZERO,
            direction: DVec3::X,
            candidates: &candidates,
            pool: &pool,
            superverts: Vec::new(),
            tjunctions: 0,
            degenerate: 0,
        };
        edge.test(0.0, 64.0, p1, p2, 0);

        assert_eq!(edge.superverts, vec![p1, mid]);
        assert_eq!(edge.tjunctions, 1);
    }

    #[test]
    fn edges_are_shared_once() {
        let mut edges = EdgeTable::new(true);

        let a = edges.get_edge(1, 2, Contents::empty()).unwrap();
        let b = edges.get_edge(2, 1, Contents::empty()).unwrap();
        let c = edges.get_edge(2, 1, Contents::empty()).unwrap();
        let d = edges.get_edge(2, 1, Contents::WATER).unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, -1);
        assert_eq!(c, 2);
        assert_eq!(d, 3);

        edges.begin_model();
        assert_eq!(edges.get_edge(1, 2, Contents::empty()).unwrap(), 4);
        assert_eq!(edges.edges().len(), 5);
    }
}

// tjunc.rs
