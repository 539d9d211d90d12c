/// Main library module

// Pipeline:
// MAP -> [load, csg, bsp, portals, faces, tjunc] -> BSP -> [radiosity] -> lit BSP
//
// MAP - Brush map text format, entities with brushes
// BSP - Binary compiled file, 258 level models, inline models and entity string

/// Basic geometry
pub mod geom;

/// Compiler error type
pub mod error;

/// Content and surface flags
pub mod flags;

/// Table capacities and engine constants
pub mod limits;

/// Compiler configuration
pub mod options;

/// Plane deduplication table
pub mod plane_table;

/// Texture projections
pub mod texinfo;

/// Brush representation
pub mod brush;

/// Brush overlap removal
pub mod csg;

/// Map format implementation
pub mod map;

/// Compiled map implementation
pub mod bsp;

/// Radiosity lighting
pub mod light;

/// Index-parallel work distribution
pub mod threads;

pub use error::Error;

// lib.rs
