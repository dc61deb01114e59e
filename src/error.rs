use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while reading, editing or saving a font
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Unknown file type for file {path:?}")]
    /// The file type is unknown
    UnknownFileType {
        /// The path of the file
        path: PathBuf,
    },

    /// A required field was set to null
    #[error("{field} is a required field and cannot be None")]
    RequiredNone {
        /// The field name
        field: String,
    },

    /// A required field was set to an empty string or list
    #[error("{field} is a required field and cannot be empty")]
    RequiredEmpty {
        /// The field name
        field: String,
    },

    /// A value of the wrong JSON type was given for a field
    #[error("{field} must be {expected}")]
    WrongType {
        /// The field name
        field: String,
        /// What the field holds
        expected: &'static str,
    },

    /// A value outside a field's permitted set
    #[error("{field} must be one of {allowed}")]
    NotAllowed {
        /// The field name
        field: String,
        /// The permitted values
        allowed: String,
    },

    /// A per-master datum is missing on one of the masters
    #[error("Anchor {anchor} not found on glyph {glyph} in master {master}")]
    IncompatibleMasters {
        /// The anchor name
        anchor: String,
        /// The glyph name
        glyph: String,
        /// The master id
        master: String,
    },

    /// The glyph was not found in the font
    #[error("Glyph {glyph} not found")]
    GlyphNotFound {
        /// The glyph name
        glyph: String,
    },

    /// The master was not found in the font
    #[error("Master {master} not found")]
    MasterNotFound {
        /// The master id
        master: String,
    },

    /// An axis could not be used
    #[error("Ill-defined axis {axis_name}!: {reason}")]
    IllDefinedAxis {
        /// The axis name
        axis_name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Saving needs a path and the font has none
    #[error("No filename provided and font has no stored filename")]
    NoPath,

    /// A node could not be read
    #[error("Bad node {0}")]
    BadNode(String),

    /// A path's nodes do not form a drawable outline
    #[error("Ill-constructed path")]
    BadPath,

    #[error("Called a method which requires a decomposed layer on a layer which had components")]
    /// The operation cannot handle components
    NeedsDecomposition,

    /// A date field could not be parsed
    #[error("Bad date {date:?}: {reason}")]
    BadDate {
        /// The stored text
        date: String,
        /// The parser's complaint
        reason: String,
    },

    /// General error with a message
    #[error("Error parsing font: {0}")]
    General(String),

    #[error("IO Error: {0}")]
    /// IO error
    IO(#[from] io::Error),

    #[error("JSON Error: {0}")]
    /// JSON parse or type error
    Json(#[from] serde_json::Error),
}
