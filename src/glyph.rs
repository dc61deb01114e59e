use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::json;

use crate::{
    common::Direction,
    dirty::{DirtyContext, FILE_SAVING},
    filenames::user_name_to_file_name,
    font::Font,
    layer::Layer,
    record::{self, RecordRef},
    schema::Kind,
    tracking::{ancestor, ChildList, ChildSlot, Facade, ObjectCore, Tracked, TrackedSequence},
    ContextError,
};

/// A glyph and its layers.
pub struct Glyph {
    core: ObjectCore,
    layers: ChildList<Layer>,
}

facade!(Glyph, Kind::Glyph);

impl Glyph {
    fn build(core: ObjectCore) -> Self {
        Glyph {
            core,
            layers: ChildList::new("layers"),
        }
    }

    /// A new glyph with no layers
    pub fn new(name: &str) -> Result<Rc<Glyph>, ContextError> {
        Glyph::from_document(&json!({ "name": name }))
    }

    defaulted_fields! {
        category: String = "category";
        codepoints: Vec<u32> = "codepoints";
        exported: bool = "exported";
        direction: String = "direction";
    }

    optional_fields! {
        production_name: String = "production_name";
    }

    /// The glyph name
    pub fn name(&self) -> String {
        self.get("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Renames the glyph, keeping its font's glyph index in step.
    pub fn set_name(&self, name: &str) -> Result<(), ContextError> {
        let old = self.name();
        if old == name {
            return Ok(());
        }
        let font = self.font();
        if let Some(font) = &font {
            if font.glyphs().contains(name) {
                return Err(ContextError::General(format!(
                    "A glyph named {} already exists",
                    name
                )));
            }
        }
        self.set("name", json!(name))?;
        if let Some(font) = font {
            font.glyphs().rekey(&old, name);
        }
        Ok(())
    }

    /// The writing direction, parsed
    pub fn text_direction(&self) -> Result<Direction, ContextError> {
        Direction::from_str(&self.direction())
    }

    /// The glyph's layers
    pub fn layers(&self) -> TrackedSequence<Layer> {
        self.layers.get(&self.core)
    }

    /// Has the layer list been read since the glyph was loaded?
    pub fn layers_materialized(&self) -> bool {
        self.layers.cached().is_some()
    }

    /// Are any of the materialized layers dirty in `context`?
    pub(crate) fn any_layer_dirty(&self, context: DirtyContext) -> bool {
        self.layers.any_dirty(context)
    }

    /// Cleans the materialized layers without touching the glyph itself.
    pub(crate) fn clean_layers(&self, context: DirtyContext) {
        self.layers.clean(&self.core, context);
    }

    /// The layer with this id
    pub fn layer(&self, id: &str) -> Option<Rc<Layer>> {
        self.layers()
            .iter()
            .find(|l| l.id().as_deref() == Some(id))
    }

    /// The first layer drawn for the given master.
    pub fn layer_for_master(&self, master_id: &str) -> Option<Rc<Layer>> {
        self.layers()
            .iter()
            .find(|l| l.master_id().as_deref() == Some(master_id))
    }

    /// The font holding this glyph
    pub fn font(&self) -> Option<Rc<Font>> {
        ancestor(self)
    }

    /// The path of this glyph's layer file within a package.
    pub fn filename(&self) -> String {
        glyph_file_name(&self.name())
    }
}

impl Tracked for Glyph {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, context: DirtyContext) {
        self.layers.clean(&self.core, context);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

pub(crate) fn glyph_file_name(name: &str) -> String {
    format!("glyphs/{}.nfsglyph", user_name_to_file_name(name))
}

/// The glyphs of a font, in order and indexed by name.
///
/// Glyphs are built on first lookup and the built glyph replaces the raw
/// record in its slot.
pub struct GlyphList {
    owner: Weak<dyn Tracked>,
    record: RecordRef,
    index: RefCell<IndexMap<String, ChildSlot<Glyph>>>,
}

impl std::fmt::Debug for GlyphList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.index.borrow().keys()).finish()
    }
}

fn record_name(record: &RecordRef) -> String {
    record
        .borrow()
        .json("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

impl GlyphList {
    pub(crate) fn new(owner: &ObjectCore) -> Self {
        let record = owner.record().clone();
        let mut index = IndexMap::new();
        let mut duplicates = false;
        for glyph in record::children(&record, "glyphs") {
            let name = record_name(&glyph);
            if index.contains_key(&name) {
                log::warn!("Duplicate glyph name {}; keeping the first", name);
                duplicates = true;
                continue;
            }
            index.insert(name, ChildSlot::Raw(glyph));
        }
        if duplicates {
            *record.borrow_mut().records_mut("glyphs") =
                index.values().map(ChildSlot::record).collect();
        }
        GlyphList {
            owner: owner.this(),
            record,
            index: RefCell::new(index),
        }
    }

    fn owner(&self) -> Option<Rc<dyn Tracked>> {
        self.owner.upgrade()
    }

    fn adopt(&self, glyph: &Glyph) {
        glyph.core().set_parent(Some(self.owner.clone()));
        if self.owner().is_some_and(|o| o.tracking_enabled()) {
            glyph.enable_tracking();
        }
    }

    /// Links a glyph added through the list. Under tracking it is flagged
    /// so that its layer file gets written.
    fn adopt_new(&self, glyph: &Glyph) {
        self.adopt(glyph);
        if glyph.tracking_enabled() {
            glyph.mark_dirty(FILE_SAVING, Some("layers"), false);
        }
    }

    fn changed(&self) {
        if let Some(owner) = self.owner() {
            owner.field_changed("glyphs");
        }
    }

    /// The number of glyphs
    pub fn len(&self) -> usize {
        self.index.borrow().len()
    }

    /// Is the font glyphless?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Is there a glyph of this name?
    pub fn contains(&self, name: &str) -> bool {
        self.index.borrow().contains_key(name)
    }

    /// Every glyph name, in order
    pub fn names(&self) -> Vec<String> {
        self.index.borrow().keys().cloned().collect()
    }

    /// The index of the named glyph
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.borrow().get_index_of(name)
    }

    fn materialize(&self, slot: usize) -> Option<Rc<Glyph>> {
        let raw = match self.index.borrow().get_index(slot)? {
            (_, ChildSlot::Materialized(glyph)) => return Some(glyph.clone()),
            (_, ChildSlot::Raw(record)) => record.clone(),
        };
        let glyph = Glyph::from_record(raw);
        self.adopt(&glyph);
        if let Some((_, value)) = self.index.borrow_mut().get_index_mut(slot) {
            *value = ChildSlot::Materialized(glyph.clone());
        }
        Some(glyph)
    }

    /// Looks a glyph up by name, building it if needed.
    pub fn get(&self, name: &str) -> Option<Rc<Glyph>> {
        let slot = self.position(name)?;
        self.materialize(slot)
    }

    /// The glyph at `index`, built if needed
    pub fn get_index(&self, index: usize) -> Option<Rc<Glyph>> {
        self.materialize(index)
    }

    /// Every glyph in order. Builds all of them.
    pub fn iter(&self) -> std::vec::IntoIter<Rc<Glyph>> {
        (0..self.len())
            .filter_map(|ix| self.materialize(ix))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Has the named glyph been built yet?
    pub fn is_materialized(&self, name: &str) -> bool {
        self.index
            .borrow()
            .get(name)
            .is_some_and(ChildSlot::is_materialized)
    }

    /// Every slot in order: name, record, and the glyph if it has been built.
    pub(crate) fn entries(&self) -> Vec<(String, RecordRef, Option<Rc<Glyph>>)> {
        self.index
            .borrow()
            .iter()
            .map(|(name, slot)| {
                let glyph = match slot {
                    ChildSlot::Materialized(glyph) => Some(glyph.clone()),
                    ChildSlot::Raw(_) => None,
                };
                (name.clone(), slot.record(), glyph)
            })
            .collect()
    }

    /// The glyphs that have been built so far, in order.
    pub fn materialized(&self) -> Vec<Rc<Glyph>> {
        self.index
            .borrow()
            .values()
            .filter_map(|slot| match slot {
                ChildSlot::Materialized(glyph) => Some(glyph.clone()),
                ChildSlot::Raw(_) => None,
            })
            .collect()
    }

    /// Adds a glyph at the end, or replaces the glyph of the same name in
    /// place.
    pub fn append(&self, glyph: Rc<Glyph>) {
        let name = glyph.name();
        self.adopt_new(&glyph);
        let existing = self.position(&name);
        {
            let mut rec = self.record.borrow_mut();
            let records = rec.records_mut("glyphs");
            match existing {
                Some(ix) => records[ix] = glyph.record(),
                None => records.push(glyph.record()),
            }
        }
        let old = self
            .index
            .borrow_mut()
            .insert(name, ChildSlot::Materialized(glyph));
        if let Some(ChildSlot::Materialized(old)) = old {
            old.core().set_parent(None);
        }
        self.changed();
    }

    /// Inserts a glyph at `index` (clamped to the end). A glyph of the same
    /// name is replaced first.
    pub fn insert(&self, index: usize, glyph: Rc<Glyph>) {
        let name = glyph.name();
        if self.contains(&name) {
            self.remove(&name);
        }
        let index = index.min(self.len());
        self.adopt_new(&glyph);
        self.record
            .borrow_mut()
            .records_mut("glyphs")
            .insert(index, glyph.record());
        self.index
            .borrow_mut()
            .shift_insert(index, name, ChildSlot::Materialized(glyph));
        self.changed();
    }

    /// Removes and returns the named glyph
    pub fn remove(&self, name: &str) -> Option<Rc<Glyph>> {
        let (ix, _, slot) = self.index.borrow_mut().shift_remove_full(name)?;
        self.record.borrow_mut().records_mut("glyphs").remove(ix);
        let glyph = match slot {
            ChildSlot::Materialized(glyph) => glyph,
            ChildSlot::Raw(record) => Glyph::from_record(record),
        };
        glyph.core().set_parent(None);
        self.changed();
        Some(glyph)
    }

    /// Moves a slot to a new key, keeping its position.
    pub(crate) fn rekey(&self, old: &str, new: &str) {
        let mut index = self.index.borrow_mut();
        if let Some((ix, _, slot)) = index.shift_remove_full(old) {
            index.shift_insert(ix, new.to_string(), slot);
            drop(index);
            self.changed();
        }
    }

    pub(crate) fn clean(&self, context: DirtyContext) {
        let tracking = self.owner().is_some_and(|o| o.tracking_enabled());
        for glyph in self.materialized() {
            if tracking {
                glyph.enable_tracking();
            }
            glyph.mark_clean(context, true);
        }
    }
}

impl IntoIterator for &GlyphList {
    type Item = Rc<Glyph>;
    type IntoIter = std::vec::IntoIter<Rc<Glyph>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn filenames() {
        assert_eq!(Glyph::new("A").unwrap().filename(), "glyphs/A_.nfsglyph");
        assert_eq!(Glyph::new("a").unwrap().filename(), "glyphs/a.nfsglyph");
        assert_eq!(
            Glyph::new(".notdef").unwrap().filename(),
            "glyphs/_notdef.nfsglyph"
        );
    }

    #[test]
    fn defaults() {
        let glyph = Glyph::new("a").unwrap();
        assert_eq!(glyph.category(), "base");
        assert!(glyph.exported());
        assert_eq!(glyph.text_direction().unwrap(), Direction::LeftToRight);
        assert!(glyph.codepoints().is_empty());
        assert!(glyph.production_name().is_none());
    }

    #[test]
    fn name_is_required() {
        assert!(Glyph::from_document(&json!({"category": "mark"})).is_err());
        let glyph = Glyph::new("a").unwrap();
        assert!(glyph.set_name("").is_err());
        assert_eq!(glyph.name(), "a");
    }

    #[test]
    fn setting_the_value_already_read_is_not_a_change() {
        let glyph = Glyph::new("a").unwrap();
        glyph.enable_tracking();
        glyph.set_category("base").unwrap();
        glyph.set_exported(true).unwrap();
        glyph.set_codepoints(Vec::<u32>::new()).unwrap();
        glyph.unset("direction").unwrap();
        assert!(!glyph.is_dirty(FILE_SAVING));
        assert!(!glyph.is_dirty(crate::dirty::CANVAS_RENDER));
        assert!(!glyph.record().borrow().contains_key("category"));
        assert!(!glyph.record().borrow().contains_key("codepoints"));

        glyph.set_category("mark").unwrap();
        glyph.mark_clean(FILE_SAVING, false);
        glyph.unset("category").unwrap();
        assert_eq!(glyph.category(), "base");
        assert_eq!(
            glyph.dirty_fields(FILE_SAVING).into_iter().collect::<Vec<_>>(),
            vec!["category".to_string()]
        );
    }

    #[test]
    fn storing_the_default_explicitly_then_unsetting_is_not_a_change() {
        let glyph = Glyph::from_document(&json!({"name": "a", "category": "base"})).unwrap();
        glyph.enable_tracking();
        glyph.unset("category").unwrap();
        assert!(!glyph.is_dirty(FILE_SAVING));
        assert!(!glyph.record().borrow().contains_key("category"));
    }

    #[test]
    fn layers_stay_raw_until_read() {
        let glyph = Glyph::new("a").unwrap();
        glyph
            .core()
            .record()
            .borrow_mut()
            .insert("layers", record::DocumentValue::Json(json!([{"width": 500}])));
        assert!(!glyph.layers_materialized());
        assert_eq!(glyph.layers().first().unwrap().width(), 500);
        assert!(glyph.layers_materialized());
    }
}
