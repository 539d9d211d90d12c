///! Compiled region BSP structure declaration module

use std::num::NonZeroU32;

use glam::DVec3;

use crate::{
    brush::{Brush, SideRef},
    flags::Contents,
    geom::{self, BoundBox, Winding},
    plane_table::{PlaneId, PlaneTable},
};

/// Splitter selection and tree construction
pub mod builder;

/// Portal generation
pub mod portals;

/// Face extraction, merging and subdivision
pub mod faces;

/// Vertex welding, T-junction repair and edge sharing
pub mod tjunc;

/// Tree to lump writer
pub mod emit;

/// Binary file format
pub mod format;

/// Level and inline model partitioning
pub mod levels;

/// Compilation session and pipeline
pub mod compiler;

/// Generic id implementation
macro_rules! impl_id {
    ($name: ident) => {
        /// Unique identifier
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Build id from index
            pub fn from_index(index: usize) -> Self {
                $name(NonZeroU32::MIN.saturating_add(index as u32))
            }

            /// Get index by id
            pub fn into_index(self) -> usize {
                self.0.get() as usize - 1
            }
        }
    };
}

impl_id!(NodeId);
impl_id!(PortalId);
impl_id!(FaceId);

/// Node payload
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Space partition
    Internal {
        /// Splitter, always positive
        plane: PlaneId,

        /// Front and back subtrees
        children: [NodeId; 2],
    },

    /// Convex space piece
    Leaf {
        /// Leaf contents
        contents: Contents,
    },
}

/// Tree node
#[derive(Clone, Debug)]
pub struct Node {
    /// Parent node, none for head
    pub parent: Option<NodeId>,

    /// Partition or leaf data
    pub kind: NodeKind,

    /// Bounds, calculated from portals
    pub bounds: BoundBox,

    /// Convex volume of the node, used to check splitters
    pub volume: Option<Brush>,

    /// Brush fragments of the leaf
    pub brushes: Vec<Brush>,

    /// First portal of the node list
    pub portals: Option<PortalId>,

    /// Faces lying on the node plane
    pub faces: Vec<FaceId>,

    /// Map side that produced the splitter
    pub side: Option<SideRef>,
}

impl Node {
    /// Leaf node without any data
    pub fn new_leaf(parent: Option<NodeId>, contents: Contents) -> Self {
        Self {
            parent,
            kind: NodeKind::Leaf { contents },
            bounds: BoundBox::zero(),
            volume: None,
            brushes: Vec::new(),
            portals: None,
            faces: Vec::new(),
            side: None,
        }
    }

    /// Leaf contents, none for internal nodes
    pub fn leaf_contents(&self) -> Option<Contents> {
        match self.kind {
            NodeKind::Leaf { contents } => Some(contents),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Splitter plane, none for leaves
    pub fn plane(&self) -> Option<PlaneId> {
        match self.kind {
            NodeKind::Internal { plane, .. } => Some(plane),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Children, none for leaves
    pub fn children(&self) -> Option<[NodeId; 2]> {
        match self.kind {
            NodeKind::Internal { children, .. } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }
}

/// Convex polygon connecting two nodes
#[derive(Clone, Debug)]
pub struct Portal {
    /// Portal plane, front faces `nodes[0]`
    pub plane: geom::Plane,

    /// Portal polygon
    pub winding: Winding,

    /// Front and back nodes
    pub nodes: [NodeId; 2],

    /// Next portal in lists of `nodes[0]` and `nodes[1]`
    pub next: [Option<PortalId>; 2],

    /// Node portal was made on, none for head portals
    pub on_node: Option<NodeId>,

    /// Map side portal is drawn with
    pub side: Option<SideRef>,

    /// Side search was already performed
    pub side_found: bool,

    /// Faces made from the portal, per side
    pub faces: [Option<FaceId>; 2],
}

/// Polygon on some node plane
#[derive(Clone, Debug)]
pub struct Face {
    /// Face plane, including side bit
    pub plane: PlaneId,

    /// Session texinfo index
    pub texinfo: usize,

    /// Contents of the leaf face is visible from
    pub contents: Contents,

    /// Face polygon
    pub winding: Winding,

    /// Vertex pool indices, empty until vertices are emitted
    pub vertices: Vec<usize>,

    /// Face this one was merged into
    pub merged: Option<FaceId>,

    /// Pieces this one was split into
    pub split: [Option<FaceId>; 2],

    /// Portal face is made from
    pub portal: Option<PortalId>,

    /// Index in output face lump
    pub output: Option<usize>,
}

impl Face {
    /// Face is neither merged nor split, so it goes to output
    pub fn is_final(&self) -> bool {
        self.merged.is_none() && self.split[0].is_none() && self.split[1].is_none()
    }

    /// Face piece with same attributes and new polygon
    pub fn with_winding(&self, winding: Winding) -> Self {
        Self {
            plane: self.plane,
            texinfo: self.texinfo,
            contents: self.contents,
            winding,
            vertices: Vec::new(),
            merged: None,
            split: [None, None],
            portal: self.portal,
            output: None,
        }
    }
}

/// Region BSP tree with all of its portals and faces
pub struct Tree {
    /// Node arena
    pub nodes: Vec<Node>,

    /// Portal arena. Removed portals stay in arena unlinked
    pub portals: Vec<Portal>,

    /// Face arena
    pub faces: Vec<Face>,

    /// Root node
    pub head: NodeId,

    /// Synthetic empty leaf around the whole tree
    pub outside: NodeId,

    /// Bounds of brushes tree is built from
    pub bounds: BoundBox,
}

impl Tree {
    /// Tree with single empty head leaf and the outside leaf
    pub fn new(bounds: BoundBox) -> Self {
        Self {
            nodes: vec![
                Node::new_leaf(None, Contents::empty()),
                Node::new_leaf(None, Contents::empty()),
            ],
            portals: Vec::new(),
            faces: Vec::new(),
            head: NodeId::from_index(0),
            outside: NodeId::from_index(1),
            bounds,
        }
    }

    /// Get node by id
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.into_index()]
    }

    /// Get node by id
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.into_index()]
    }

    /// Get portal by id
    pub fn portal(&self, id: PortalId) -> &Portal {
        &self.portals[id.into_index()]
    }

    /// Get portal by id
    pub fn portal_mut(&mut self, id: PortalId) -> &mut Portal {
        &mut self.portals[id.into_index()]
    }

    /// Get face by id
    pub fn face(&self, id: FaceId) -> &Face {
        &self.faces[id.into_index()]
    }

    /// Get face by id
    pub fn face_mut(&mut self, id: FaceId) -> &mut Face {
        &mut self.faces[id.into_index()]
    }

    /// Add new node to arena
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId::from_index(self.nodes.len() - 1)
    }

    /// Add new face to arena
    pub fn add_face(&mut self, face: Face) -> FaceId {
        self.faces.push(face);
        FaceId::from_index(self.faces.len() - 1)
    }

    /// Add unlinked portal to arena
    pub fn add_portal(&mut self, plane: geom::Plane, winding: Winding, on_node: Option<NodeId>) -> PortalId {
        self.portals.push(Portal {
            plane,
            winding,
            nodes: [self.outside, self.outside],
            next: [None, None],
            on_node,
            side: None,
            side_found: false,
            faces: [None, None],
        });
        PortalId::from_index(self.portals.len() - 1)
    }

    /// Link portal into lists of front and back nodes
    pub fn add_portal_to_nodes(&mut self, portal: PortalId, front: NodeId, back: NodeId) {
        let front_head = self.node(front).portals;
        let back_head = self.node(back).portals;

        let p = self.portal_mut(portal);
        p.nodes = [front, back];
        p.next = [front_head, back_head];

        self.node_mut(front).portals = Some(portal);
        self.node_mut(back).portals = Some(portal);
    }

    /// Side of portal that is looking at the node (0 - front, 1 - back)
    pub fn portal_side(&self, portal: PortalId, node: NodeId) -> usize {
        let p = self.portal(portal);

        if p.nodes[0] == node {
            0
        } else {
            debug_assert!(p.nodes[1] == node, "portal is not linked to node");
            1
        }
    }

    /// Unlink portal from node list
    pub fn remove_portal_from_node(&mut self, portal: PortalId, node: NodeId) {
        let mut prev: Option<(PortalId, usize)> = None;
        let mut current = self.node(node).portals;

        while let Some(t) = current {
            let side = self.portal_side(t, node);
            let next = self.portal(t).next[side];

            if t == portal {
                match prev {
                    Some((prev, prev_side)) => self.portal_mut(prev).next[prev_side] = next,
                    None => self.node_mut(node).portals = next,
                }
                self.portal_mut(portal).next[side] = None;
                return;
            }

            prev = Some((t, side));
            current = next;
        }

        log::debug!("portal {} not found in node {} list", portal.into_index(), node.into_index());
    }

    /// Portals of node list with the side they look at the node from
    pub fn node_portals(&self, node: NodeId) -> Vec<(PortalId, usize)> {
        let mut result = Vec::new();
        let mut current = self.node(node).portals;

        while let Some(portal) = current {
            let side = self.portal_side(portal, node);
            result.push((portal, side));
            current = self.portal(portal).next[side];
        }

        result
    }

    /// Find leaf that contains the point. Points on a plane go to the front.
    pub fn point_leaf(&self, point: DVec3, planes: &PlaneTable) -> NodeId {
        let mut node = self.head;

        while let NodeKind::Internal { plane, children } = self.node(node).kind {
            let d = planes.get(plane).distance_to(point);
            node = children[if d >= 0.0 { 0 } else { 1 }];
        }

        node
    }

    /// Leaves of the tree, in pre-order
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.head];

        while let Some(node) = stack.pop() {
            match self.node(node).kind {
                NodeKind::Internal { children, .. } => {
                    stack.push(children[1]);
                    stack.push(children[0]);
                }
                NodeKind::Leaf { .. } => leaves.push(node),
            }
        }

        leaves
    }
}

// mod.rs
