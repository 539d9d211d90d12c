///! Compiler error type

use crate::map::parser::MapParseError;

/// Fatal compilation error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Map text is malformed
    #[error("map parsing error: {0}")]
    MapParse(#[from] MapParseError),

    /// No worldspawn entity
    #[error("map has no worldspawn entity")]
    NoWorldspawn,

    /// Worldspawn must come first
    #[error("first entity is \"{0}\", expected worldspawn")]
    FirstEntityNotWorldspawn(String),

    /// Contradictory content flags on a brush
    #[error("entity {entity}, brush {brush}: {reason}")]
    InvalidBrushFlags {
        /// Entity index
        entity: usize,

        /// Brush index inside of the entity
        brush: usize,

        /// What's wrong
        reason: &'static str,
    },

    /// ORIGIN brushes are allowed in inline models only
    #[error("entity {entity}, brush {brush}: origin brushes not allowed in world")]
    OriginBrushInWorld {
        /// Entity index
        entity: usize,

        /// Brush index inside of the entity
        brush: usize,
    },

    /// Some session table or output lump overflowed
    #[error("{what} limit exceeded ({limit})")]
    CapacityExceeded {
        /// Table name
        what: &'static str,

        /// Table capacity
        limit: usize,
    },

    /// Plane normal can't be normalized
    #[error("degenerate plane normal {0:?}")]
    InvalidPlane(glam::DVec3),

    /// Lightmap of a face has too many samples
    #[error("surface too large to light ({width}x{height} samples)")]
    SurfaceTooLarge {
        /// Sample count along S axis
        width: usize,

        /// Sample count along T axis
        height: usize,
    },

    /// Face subdivision produced no pieces
    #[error("face subdivision failed")]
    SubdivideFailed,

    /// Input BSP file is broken
    #[error("bad bsp file: {0}")]
    BadBspFile(&'static str),

    /// Command line is wrong
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Build capacity check result
pub fn check_capacity(what: &'static str, len: usize, limit: usize) -> Result<(), Error> {
    if len > limit {
        Err(Error::CapacityExceeded { what, limit })
    } else {
        Ok(())
    }
}

// error.rs
