//! Errors raised by the simulation core

/// Fatal errors surfaced by map loading and session binding
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    /// Boundary text contained a record that is neither `#` nor `<x>,<y>`
    #[error("Malformed map geometry at line {line}: {content:?}")]
    MalformedGeometry { line: usize, content: String },

    /// A player id was referenced that is not registered in the world
    #[error("Player not found: {0}")]
    PlayerNotFound(String),
}
