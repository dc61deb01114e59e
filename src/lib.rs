#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
//! An in-memory font object model with change tracking.
//!
//! Every font object (font, glyph, layer, shape, node, ...) is a typed
//! facade over a dynamic record. Facades are built lazily: loading a package
//! reads the JSON but creates no glyph or layer objects until they are asked
//! for. Once tracking is switched on, every edit marks the object dirty in a
//! set of independent contexts ([`FILE_SAVING`], [`CANVAS_RENDER`], ...)
//! and the change propagates up to the font. Saving rewrites only the files
//! holding something dirty.
//!
//! ```no_run
//! use context_font::SaveOptions;
//!
//! let font = context_font::load("MyFont.babelfont")?;
//! font.initialize_dirty_tracking();
//! if let Some(glyph) = font.glyphs().get("A") {
//!     glyph.set_category("mark")?;
//! }
//! let report = font.save(None, &SaveOptions::default())?;
//! assert_eq!(report.written.len(), 1);
//! # Ok::<(), context_font::ContextError>(())
//! ```

#[macro_use]
mod macros;

mod anchor;
mod axis;
mod common;
/// Readers and writers for font packages
pub mod convertors;
mod dirty;
mod error;
mod features;
mod filenames;
mod font;
mod glyph;
mod guide;
mod i18ndictionary;
mod instance;
mod layer;
mod master;
/// The name table
pub mod names;
mod node;
pub mod record;
pub mod schema;
mod serializer;
mod shape;
mod tracking;
mod userdata;

pub use crate::{
    anchor::Anchor,
    axis::Axis,
    common::{Color, Direction, FieldValue, Location, Position},
    convertors::nfsf::{SaveOptions, SaveReport},
    dirty::{DirtyContext, DirtyState, CANVAS_RENDER, COMPILE, FILE_SAVING, UNDO},
    error::ContextError,
    features::Features,
    filenames::user_name_to_file_name,
    font::{CallbackId, CallbackResult, Font, KernGroups, SaveCallback, SaveEvent},
    glyph::{Glyph, GlyphList},
    guide::Guide,
    i18ndictionary::I18NDictionary,
    instance::Instance,
    layer::Layer,
    master::{Kerning, Master, CORE_METRICS},
    names::Names,
    node::{Node, NodeType},
    shape::Shape,
    tracking::{Facade, ObjectCore, Tracked, TrackedSequence},
    userdata::{
        user_data_tracking_suppressed, SuppressUserDataTracking, TrackedArray, TrackedMapping,
    },
};
use std::path::PathBuf;
use std::rc::Rc;

/// Loads a font, choosing the reader by file extension.
pub fn load(filename: impl Into<PathBuf>) -> Result<Rc<Font>, ContextError> {
    let pb = filename.into();
    match pb.extension() {
        Some(ext) if ext == "babelfont" => crate::convertors::nfsf::load(&pb),
        _ => Err(ContextError::UnknownFileType { path: pb }),
    }
}
