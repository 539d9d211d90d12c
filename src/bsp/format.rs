///! IBSP file format description module

use bytemuck::{AnyBitPattern, NoUninit, Zeroable};
use glam::DVec3;

use crate::{error::{check_capacity, Error}, limits};

/// .BSP file magic number
pub const MAGIC: u32 = u32::from_le_bytes(*b"IBSP");

/// Supported format version
pub const VERSION: u32 = 71;

/// Count of lumps in header
pub const HEADER_LUMPS: usize = 15;

/// Maximal length of texture name, including terminating zero
pub const TEXTURE_NAME_LENGTH: usize = 32;

// Binary format
macro_rules! bin_format {
    ($name: ident) => {
        unsafe impl Zeroable for $name {}
        unsafe impl AnyBitPattern for $name {}
        unsafe impl NoUninit for $name {}
    };

    ($head: ident, $($tail: ident),* $(,)?) => {
        bin_format!($head);

        bin_format!($($tail),*);
    };
}

/// Lump indices
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lump {
    Entities = 0,
    Planes = 1,
    Vertexes = 2,
    Nodes = 3,
    TexInfo = 4,
    Faces = 5,
    Lighting = 6,
    Leafs = 7,
    LeafFaces = 8,
    LeafBrushes = 9,
    Edges = 10,
    Surfedges = 11,
    Models = 12,
    Brushes = 13,
    BrushSides = 14,
}

/// Span in file
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Span {
    /// Byte offset
    pub offset: u32,

    /// Byte size
    pub size: u32,
}

impl Span {
    /// Range
    pub fn range(self) -> std::ops::Range<usize> {
        self.offset as usize..self.offset as usize + self.size as usize
    }

    /// Span of range
    pub fn from_range(range: std::ops::Range<usize>) -> Self {
        Self {
            offset: range.start as u32,
            size: (range.end - range.start) as u32,
        }
    }
}

/// Header
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct Header {
    /// IBSP file magic
    pub magic: u32,

    /// Format version
    pub version: u32,

    /// Lump spans, indexed by `Lump`
    pub lumps: [Span; HEADER_LUMPS],
}

/// Stable (e.g. with certain field order) 3-component float vector
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X coordinate
    pub x: f32,

    /// Y coordinate
    pub y: f32,

    /// Z coordinate
    pub z: f32,
}

impl From<DVec3> for Vec3 {
    fn from(value: DVec3) -> Self {
        Self { x: value.x as f32, y: value.y as f32, z: value.z as f32 }
    }
}

impl From<Vec3> for DVec3 {
    fn from(value: Vec3) -> Self {
        DVec3::new(value.x as f64, value.y as f64, value.z as f64)
    }
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Plane {
    /// Plane normal vector
    pub normal: Vec3,

    /// Distance from origin to plane
    pub distance: f32,

    /// Axis classifier, 0..=2 axial, 3..=5 nearly axial
    pub ty: u32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Vertex {
    /// Vertex position
    pub point: Vec3,
}

/// BSP node. Negative children are leaves, `-(leaf + 1)`.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Node {
    /// Plane index, -1 for merge nodes
    pub plane: i32,

    /// Front and back children
    pub children: [i32; 2],

    /// Bounding box minimum
    pub mins: [i16; 3],

    /// Bounding box maximum
    pub maxs: [i16; 3],

    /// First face on the node
    pub first_face: u16,

    /// Count of faces on the node
    pub face_count: u16,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct TexInfo {
    /// [s/t][xyz offset]
    pub vecs: [[f32; 4]; 2],

    /// Surface flags
    pub flags: u32,

    /// Light emission and such
    pub value: i32,

    /// Zero-terminated texture name
    pub texture: [u8; TEXTURE_NAME_LENGTH],

    /// Next animation frame texinfo, -1 if none
    pub next_texinfo: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Face {
    /// Positive plane index
    pub plane: u16,

    /// 1 if face looks to plane back
    pub side: u16,

    /// First surfedge
    pub first_edge: i32,

    /// Count of surfedges
    pub edge_count: u16,

    /// TexInfo index
    pub texinfo: u16,

    /// Lightmap start in lighting lump, -1 if none
    pub light_offset: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Leaf {
    /// Leaf contents
    pub contents: u32,

    /// Bounding box minimum
    pub mins: [i16; 3],

    /// Bounding box maximum
    pub maxs: [i16; 3],

    /// First leaf face
    pub first_leaf_face: u16,

    /// Count of leaf faces
    pub leaf_face_count: u16,

    /// First leaf brush
    pub first_leaf_brush: u16,

    /// Count of leaf brushes
    pub leaf_brush_count: u16,
}

/// Edge, referenced by surfedges
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Edge {
    /// Vertex indices
    pub v: [u16; 2],
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Model {
    /// Bounding box minimum
    pub mins: Vec3,

    /// Bounding box maximum
    pub maxs: Vec3,

    /// Model origin
    pub origin: Vec3,

    /// Head node index, -1 if model is empty
    pub head_node: i32,

    /// First face of model
    pub first_face: i32,

    /// Count of model faces
    pub face_count: i32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct Brush {
    /// First brush side
    pub first_side: i32,

    /// Count of brush sides
    pub side_count: i32,

    /// Brush contents
    pub contents: u32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default)]
pub struct BrushSide {
    /// Plane index, outward facing
    pub plane: u16,

    /// TexInfo index, -1 if none
    pub texinfo: i16,
}

// Binary format
bin_format!(
    Span,
    Header,
    Vec3,
    Plane,
    Vertex,
    Node,
    TexInfo,
    Face,
    Leaf,
    Edge,
    Model,
    Brush,
    BrushSide,
);

/// Convert texture name to fixed size zero-terminated array
pub fn texture_name_bytes(name: &str) -> [u8; TEXTURE_NAME_LENGTH] {
    let mut result = [0u8; TEXTURE_NAME_LENGTH];
    let bytes = name.as_bytes();
    let length = bytes.len().min(TEXTURE_NAME_LENGTH - 1);

    if bytes.len() > length {
        log::warn!("texture name \"{}\" truncated", name);
    }
    result[..length].copy_from_slice(&bytes[..length]);

    result
}

/// Get texture name out of zero-terminated array
pub fn texture_name_string(bytes: &[u8; TEXTURE_NAME_LENGTH]) -> String {
    let length = bytes.iter().position(|b| *b == 0).unwrap_or(TEXTURE_NAME_LENGTH);

    String::from_utf8_lossy(&bytes[..length]).into_owned()
}

/// Whole compiled map
#[derive(Clone, Debug, Default)]
pub struct BspFile {
    /// Entity string
    pub entities: String,

    /// Planes
    pub planes: Vec<Plane>,

    /// Vertices
    pub vertexes: Vec<Vertex>,

    /// Nodes
    pub nodes: Vec<Node>,

    /// Texture projections
    pub texinfo: Vec<TexInfo>,

    /// Faces
    pub faces: Vec<Face>,

    /// Lightmap bytes
    pub lighting: Vec<u8>,

    /// Leaves
    pub leafs: Vec<Leaf>,

    /// Leaf to face references
    pub leaf_faces: Vec<u16>,

    /// Leaf to brush references
    pub leaf_brushes: Vec<u16>,

    /// Edges, edge 0 is unused
    pub edges: Vec<Edge>,

    /// Face edge references, negative ones are reversed
    pub surfedges: Vec<i32>,

    /// Models, world levels first
    pub models: Vec<Model>,

    /// Brushes
    pub brushes: Vec<Brush>,

    /// Brush sides
    pub brush_sides: Vec<BrushSide>,
}

/// Read lump of elements
fn read_lump<T: AnyBitPattern>(data: &[u8], span: Span) -> Result<Vec<T>, Error> {
    let bytes = data.get(span.range()).ok_or(Error::BadBspFile("lump out of file"))?;

    if bytes.len() % std::mem::size_of::<T>() != 0 {
        return Err(Error::BadBspFile("odd lump size"));
    }

    Ok(bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

impl BspFile {
    /// Check all the lump capacities
    pub fn check_limits(&self) -> Result<(), Error> {
        check_capacity("entity string", self.entities.len() + 1, limits::MAX_MAP_ENTSTRING)?;
        check_capacity("planes", self.planes.len(), limits::MAX_MAP_PLANES)?;
        check_capacity("vertexes", self.vertexes.len(), limits::MAX_MAP_VERTS)?;
        check_capacity("nodes", self.nodes.len(), limits::MAX_MAP_NODES)?;
        check_capacity("texinfo", self.texinfo.len(), limits::MAX_MAP_TEXINFO)?;
        check_capacity("faces", self.faces.len(), limits::MAX_MAP_FACES)?;
        check_capacity("lighting", self.lighting.len(), limits::MAX_MAP_LIGHTING)?;
        check_capacity("leafs", self.leafs.len(), limits::MAX_MAP_LEAFS)?;
        check_capacity("leaffaces", self.leaf_faces.len(), limits::MAX_MAP_LEAFFACES)?;
        check_capacity("leafbrushes", self.leaf_brushes.len(), limits::MAX_MAP_LEAFBRUSHES)?;
        check_capacity("edges", self.edges.len(), limits::MAX_MAP_EDGES)?;
        check_capacity("surfedges", self.surfedges.len(), limits::MAX_MAP_SURFEDGES)?;
        check_capacity("models", self.models.len(), limits::MAX_MAP_MODELS)?;
        check_capacity("brushes", self.brushes.len(), limits::MAX_MAP_BRUSHES)?;
        check_capacity("brushsides", self.brush_sides.len(), limits::MAX_MAP_BRUSHSIDES)?;

        Ok(())
    }

    /// Load BSP file
    pub fn load(src: &mut dyn std::io::Read) -> Result<Self, Error> {
        let mut data = Vec::<u8>::new();
        src.read_to_end(&mut data)?;

        let header_data = data
            .get(..std::mem::size_of::<Header>())
            .ok_or(Error::BadBspFile("unexpected file end"))?;
        let header = bytemuck::pod_read_unaligned::<Header>(header_data);

        if header.magic != MAGIC {
            return Err(Error::BadBspFile("invalid magic"));
        }
        if header.version != VERSION {
            return Err(Error::BadBspFile("unsupported version"));
        }

        let lumps = header.lumps;
        let lump = |lump: Lump| lumps[lump as usize];

        let entity_bytes = read_lump::<u8>(&data, lump(Lump::Entities))?;
        let entity_length = entity_bytes.iter().position(|b| *b == 0).unwrap_or(entity_bytes.len());
        let entities = String::from_utf8(entity_bytes[..entity_length].to_vec())
            .map_err(|_| Error::BadBspFile("entity string is not utf-8"))?;

        let file = Self {
            entities,
            planes: read_lump(&data, lump(Lump::Planes))?,
            vertexes: read_lump(&data, lump(Lump::Vertexes))?,
            nodes: read_lump(&data, lump(Lump::Nodes))?,
            texinfo: read_lump(&data, lump(Lump::TexInfo))?,
            faces: read_lump(&data, lump(Lump::Faces))?,
            lighting: read_lump(&data, lump(Lump::Lighting))?,
            leafs: read_lump(&data, lump(Lump::Leafs))?,
            leaf_faces: read_lump(&data, lump(Lump::LeafFaces))?,
            leaf_brushes: read_lump(&data, lump(Lump::LeafBrushes))?,
            edges: read_lump(&data, lump(Lump::Edges))?,
            surfedges: read_lump(&data, lump(Lump::Surfedges))?,
            models: read_lump(&data, lump(Lump::Models))?,
            brushes: read_lump(&data, lump(Lump::Brushes))?,
            brush_sides: read_lump(&data, lump(Lump::BrushSides))?,
        };

        file.check_limits()?;

        Ok(file)
    }

    /// Save BSP file
    pub fn save(&self, dst: &mut dyn std::io::Write) -> Result<(), Error> {
        self.check_limits()?;

        let mut body = Vec::<u8>::new();
        let mut lumps = [Span::default(); HEADER_LUMPS];

        let mut entity_bytes = self.entities.as_bytes().to_vec();
        entity_bytes.push(0);

        let lump_data: [(Lump, &[u8]); HEADER_LUMPS] = [
            (Lump::Entities, &entity_bytes),
            (Lump::Planes, bytemuck::cast_slice(&self.planes)),
            (Lump::Vertexes, bytemuck::cast_slice(&self.vertexes)),
            (Lump::Nodes, bytemuck::cast_slice(&self.nodes)),
            (Lump::TexInfo, bytemuck::cast_slice(&self.texinfo)),
            (Lump::Faces, bytemuck::cast_slice(&self.faces)),
            (Lump::Lighting, &self.lighting),
            (Lump::Leafs, bytemuck::cast_slice(&self.leafs)),
            (Lump::LeafFaces, bytemuck::cast_slice(&self.leaf_faces)),
            (Lump::LeafBrushes, bytemuck::cast_slice(&self.leaf_brushes)),
            (Lump::Edges, bytemuck::cast_slice(&self.edges)),
            (Lump::Surfedges, bytemuck::cast_slice(&self.surfedges)),
            (Lump::Models, bytemuck::cast_slice(&self.models)),
            (Lump::Brushes, bytemuck::cast_slice(&self.brushes)),
            (Lump::BrushSides, bytemuck::cast_slice(&self.brush_sides)),
        ];

        let header_size = std::mem::size_of::<Header>();

        for (lump, bytes) in lump_data {
            let start = header_size + body.len();
            body.extend_from_slice(bytes);
            lumps[lump as usize] = Span::from_range(start..start + bytes.len());

            // keep lumps 4-byte aligned
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }

        let header = Header { magic: MAGIC, version: VERSION, lumps };

        dst.write_all(bytemuck::bytes_of(&header))?;
        dst.write_all(&body)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load() {
        let mut file = BspFile::default();
        file.entities = "{\n\"classname\" \"worldspawn\"\n}\n".to_string();
        file.vertexes.push(Vertex { point: Vec3 { x: 1.0, y: 2.0, z: 3.0 } });
        file.edges.push(Edge::default());
        file.edges.push(Edge { v: [0, 0] });
        file.surfedges.extend([1, -1, 1]);
        file.lighting.extend([4, 1, 2, 3, 255]);
        file.texinfo.push(TexInfo {
            vecs: [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]],
            flags: 0x80,
            value: 0,
            texture: texture_name_bytes("tex_common/nodraw"),
            next_texinfo: -1,
        });

        let mut data = Vec::new();
        file.save(&mut data).unwrap();
        let loaded = BspFile::load(&mut data.as_slice()).unwrap();

        assert_eq!(loaded.entities, file.entities);
        assert_eq!({ loaded.vertexes[0].point },Vec3 { x: 1.0, y: 2.0, z: 3.0 });
        assert_eq!(loaded.edges.len(), 2);
        assert_eq!(loaded.surfedges, vec![1, -1, 1]);
        assert_eq!(loaded.lighting, vec![4, 1, 2, 3, 255]);
        assert_eq!(texture_name_string(&loaded.texinfo[0].texture), "tex_common/nodraw");
        assert!(loaded.nodes.is_empty());
    }

    #[test]
    fn bad_files_are_rejected() {
        assert!(matches!(BspFile::load(&mut [0u8; 8].as_slice()), Err(Error::BadBspFile(_))));

        let mut data = Vec::new();
        BspFile::default().save(&mut data).unwrap();
        data[0] = b'X';
        assert!(matches!(BspFile::load(&mut data.as_slice()), Err(Error::BadBspFile("invalid magic"))));
    }
}

// format.rs
