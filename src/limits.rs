///! Output format capacities

pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_BRUSHES: usize = 8192;
pub const MAX_MAP_ENTITIES: usize = 2048;
pub const MAX_MAP_ENTSTRING: usize = 0x40000;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_PLANES: usize = 65536;
pub const MAX_MAP_NODES: usize = 65536;
pub const MAX_MAP_BRUSHSIDES: usize = 65536;
pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAX_MAP_VERTS: usize = 65536;
pub const MAX_MAP_FACES: usize = 65536;
pub const MAX_MAP_LEAFFACES: usize = 65536;
pub const MAX_MAP_LEAFBRUSHES: usize = 65536;
pub const MAX_MAP_EDGES: usize = 128000;
pub const MAX_MAP_SURFEDGES: usize = 256000;
pub const MAX_MAP_LIGHTING: usize = 0x1000000;

/// Maximal vertex count of a single emitted face
pub const MAXEDGES: usize = 64;

/// Maximal lightmap sample count of a single face
pub const SINGLEMAP: usize = 256 * 256;

/// Count of level models: 256 level flag combinations plus weapon and actor clip
pub const NUM_LEVEL_MODELS: usize = 258;

/// Level of weapon clip brushes
pub const LEVEL_WEAPONCLIP: usize = 256;

/// Level of actor clip brushes
pub const LEVEL_ACTORCLIP: usize = 257;

/// Grid unit size of the game
pub const UNIT_SIZE: f64 = 32.0;

// limits.rs
