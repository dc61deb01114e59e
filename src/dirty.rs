//! Dirty-tracking contexts and per-object dirty state.
//!
//! Every font object carries a [`DirtyState`] recording, for each
//! [`DirtyContext`], whether the object has changed and which of its fields
//! changed. Contexts are fully independent: saving a font clears
//! [`FILE_SAVING`] but leaves [`CANVAS_RENDER`] alone, so a renderer still
//! knows it must redraw.
//!
//! A state whose flag table has never been created is *uninitialized*: the
//! object has never been marked clean or dirty. An initialized table with no
//! flag set for a context means the object is clean in that context.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};

/// A named, independent change-tracking channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirtyContext(&'static str);

impl DirtyContext {
    /// Creates an application-defined context.
    pub const fn custom(name: &'static str) -> Self {
        DirtyContext(name)
    }

    /// The context's name
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl Display for DirtyContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Changed since the package was last written to disk.
pub const FILE_SAVING: DirtyContext = DirtyContext("file_saving");

/// Changed since the object was last drawn.
pub const CANVAS_RENDER: DirtyContext = DirtyContext("canvas_render");

/// Changed since the last undo checkpoint.
pub const UNDO: DirtyContext = DirtyContext("undo");

/// Changed since the font was last compiled.
pub const COMPILE: DirtyContext = DirtyContext("compile");

/// Per-object record of which contexts are dirty and which fields changed.
#[derive(Debug, Clone, Default)]
pub struct DirtyState {
    flags: Option<HashMap<DirtyContext, bool>>,
    fields: HashMap<DirtyContext, BTreeSet<String>>,
}

impl DirtyState {
    /// A state with nothing dirty
    pub fn new() -> Self {
        DirtyState::default()
    }

    /// Has this object ever been marked clean or dirty?
    pub fn is_initialized(&self) -> bool {
        self.flags.is_some()
    }

    pub(crate) fn initialize(&mut self) {
        self.flags.get_or_insert_with(HashMap::new);
    }

    /// Sets the flag for `context`, recording `field` if given.
    ///
    /// Returns whether the object was already dirty in that context, which
    /// callers use to avoid walking the ancestor chain twice.
    pub fn mark(&mut self, context: DirtyContext, field: Option<&str>) -> bool {
        let flags = self.flags.get_or_insert_with(HashMap::new);
        let was_dirty = flags.insert(context, true).unwrap_or(false);
        if let Some(field) = field {
            let fields = self.fields.entry(context).or_default();
            if !fields.contains(field) {
                fields.insert(field.to_string());
            }
        }
        was_dirty
    }

    /// Forgets all dirtiness in one context
    pub fn clear(&mut self, context: DirtyContext) {
        self.flags
            .get_or_insert_with(HashMap::new)
            .insert(context, false);
        self.fields.remove(&context);
    }

    /// Is anything dirty in this context?
    pub fn is_dirty(&self, context: DirtyContext) -> bool {
        self.flags
            .as_ref()
            .and_then(|flags| flags.get(&context))
            .copied()
            .unwrap_or(false)
    }

    /// The fields recorded as changed in this context
    pub fn fields(&self, context: DirtyContext) -> BTreeSet<String> {
        self.fields.get(&context).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn has_field(&self, context: DirtyContext, field: &str) -> bool {
        self.fields
            .get(&context)
            .is_some_and(|fields| fields.contains(field))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uninitialized_is_not_clean_state() {
        let mut state = DirtyState::new();
        assert!(!state.is_initialized());
        assert!(!state.is_dirty(FILE_SAVING));
        state.clear(FILE_SAVING);
        assert!(state.is_initialized());
        assert!(!state.is_dirty(FILE_SAVING));
    }

    #[test]
    fn mark_reports_previous_flag() {
        let mut state = DirtyState::new();
        assert!(!state.mark(FILE_SAVING, Some("width")));
        assert!(state.mark(FILE_SAVING, Some("height")));
        assert_eq!(
            state.fields(FILE_SAVING).into_iter().collect::<Vec<_>>(),
            vec!["height".to_string(), "width".to_string()]
        );
    }

    #[test]
    fn contexts_are_independent() {
        let mut state = DirtyState::new();
        state.mark(FILE_SAVING, Some("width"));
        state.mark(CANVAS_RENDER, Some("width"));
        state.clear(FILE_SAVING);
        assert!(!state.is_dirty(FILE_SAVING));
        assert!(state.fields(FILE_SAVING).is_empty());
        assert!(state.is_dirty(CANVAS_RENDER));
        assert!(state.has_field(CANVAS_RENDER, "width"));
        assert!(!state.is_dirty(UNDO));
        assert!(!state.is_dirty(COMPILE));
    }

    #[test]
    fn custom_contexts() {
        const MINE: DirtyContext = DirtyContext::custom("mine");
        let mut state = DirtyState::new();
        state.mark(MINE, None);
        assert!(state.is_dirty(MINE));
        assert_eq!(MINE.to_string(), "mine");
    }
}
