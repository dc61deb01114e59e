use std::any::Any;
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::{
    axis::Axis,
    common::{FieldValue, Location},
    convertors::nfsf::{self, SaveOptions, SaveReport},
    dirty::{DirtyContext, CANVAS_RENDER, FILE_SAVING},
    features::Features,
    glyph::GlyphList,
    instance::Instance,
    master::Master,
    names::Names,
    record::DynamicRecord,
    schema::Kind,
    tracking::{ChildList, ChildOne, Facade, ObjectCore, Tracked, TrackedSequence},
    userdata::SuppressUserDataTracking,
    ContextError,
};

/// Kerning groups: group name to member glyph names.
pub type KernGroups = IndexMap<String, Vec<String>>;

impl FieldValue for KernGroups {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_object().map(|map| {
            map.iter()
                .map(|(group, members)| {
                    let members = members
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|m| m.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    (group.clone(), members)
                })
                .collect()
        })
    }
    fn to_json(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(group, members)| (group.clone(), json!(members)))
                .collect(),
        )
    }
}

/// The moments of a save at which callbacks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveEvent {
    /// Before any file is written
    BeforeSave,
    /// After a save succeeds
    AfterSave,
    /// After a save fails
    OnError,
}

/// What a save callback returns
pub type CallbackResult = Result<(), Box<dyn std::error::Error>>;

/// A hook run around [`Font::save`]. Errors returned by a hook are logged
/// and otherwise ignored.
pub enum SaveCallback {
    /// Runs before any file is written
    BeforeSave(Box<dyn Fn(&Font, &Path) -> CallbackResult>),
    /// Runs after a save succeeds, with the time it took
    AfterSave(Box<dyn Fn(&Font, &Path, Duration) -> CallbackResult>),
    /// Runs after a save fails, with the error
    OnError(Box<dyn Fn(&Font, &Path, &ContextError) -> CallbackResult>),
}

impl SaveCallback {
    /// The event this callback runs at
    pub fn event(&self) -> SaveEvent {
        match self {
            SaveCallback::BeforeSave(_) => SaveEvent::BeforeSave,
            SaveCallback::AfterSave(_) => SaveEvent::AfterSave,
            SaveCallback::OnError(_) => SaveEvent::OnError,
        }
    }
}

impl std::fmt::Debug for SaveCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SaveCallback({:?})", self.event())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Identifies a registered callback so that it can be removed
pub struct CallbackId(u64);

/// A font, with one or more masters.
pub struct Font {
    core: ObjectCore,
    axes: ChildList<Axis>,
    instances: ChildList<Instance>,
    masters: ChildList<Master>,
    glyphs: OnceCell<GlyphList>,
    names: ChildOne<Names>,
    features: ChildOne<Features>,
    filename: RefCell<Option<PathBuf>>,
    callbacks: RefCell<Vec<(CallbackId, Rc<SaveCallback>)>>,
    next_callback: Cell<u64>,
}

facade!(Font, Kind::Font);

impl Font {
    fn build(core: ObjectCore) -> Self {
        Font {
            core,
            axes: ChildList::new("axes"),
            instances: ChildList::new("instances"),
            masters: ChildList::new("masters"),
            glyphs: OnceCell::new(),
            names: ChildOne::new("names"),
            features: ChildOne::new("features"),
            filename: RefCell::new(None),
            callbacks: RefCell::new(vec![]),
            next_callback: Cell::new(0),
        }
    }

    /// An empty font dated now.
    pub fn new() -> Rc<Font> {
        let record = DynamicRecord::new_ref(Kind::Font);
        record
            .borrow_mut()
            .set_json("date", chrono::Local::now().naive_local().to_json());
        Font::from_record(record)
    }

    defaulted_fields! {
        /// Units per em
        upm: i64 = "upm";
        first_kern_groups: KernGroups = "first_kern_groups";
        second_kern_groups: KernGroups = "second_kern_groups";
    }

    optional_fields! {
        /// A free-form note about this font
        note: String = "note";
        date: NaiveDateTime = "date";
        /// Values placed in OpenType tables on export, overriding defaults
        custom_opentype_values: Value = "customOpenTypeValues";
    }

    /// The font version as (major, minor).
    pub fn version(&self) -> (i64, i64) {
        let version = self.get("version").unwrap_or(Value::Null);
        (
            version.get(0).and_then(Value::as_i64).unwrap_or(1),
            version.get(1).and_then(Value::as_i64).unwrap_or(0),
        )
    }

    /// Sets the major and minor version together
    pub fn set_version(&self, major: i64, minor: i64) -> Result<(), ContextError> {
        self.set("version", json!([major, minor]))
    }

    /// The font's axes
    pub fn axes(&self) -> TrackedSequence<Axis> {
        self.axes.get(&self.core)
    }

    /// The font's named instances
    pub fn instances(&self) -> TrackedSequence<Instance> {
        self.instances.get(&self.core)
    }

    /// The font's masters
    pub fn masters(&self) -> TrackedSequence<Master> {
        self.masters.get(&self.core)
    }

    /// The glyphs, in order and by name. Glyph objects are built on demand.
    pub fn glyphs(&self) -> &GlyphList {
        self.glyphs.get_or_init(|| GlyphList::new(&self.core))
    }

    /// The font's names, created empty if the font has none.
    pub fn names(&self) -> Rc<Names> {
        if let Some(names) = self.names.get(&self.core) {
            return names;
        }
        let names = Names::new();
        self.names.set(&self.core, Some(names.clone()));
        names
    }

    /// Replaces the name table
    pub fn set_names(&self, names: Rc<Names>) {
        self.names.set(&self.core, Some(names));
        self.field_changed("names");
    }

    /// The font's feature code, created empty if the font has none.
    pub fn features(&self) -> Rc<Features> {
        if let Some(features) = self.features.get(&self.core) {
            return features;
        }
        let features = Features::new();
        self.features.set(&self.core, Some(features.clone()));
        features
    }

    /// Replaces the feature code
    pub fn set_features(&self, features: Rc<Features>) {
        self.features.set(&self.core, Some(features));
        self.field_changed("features");
    }

    pub(crate) fn cached_names(&self) -> Option<Rc<Names>> {
        self.names.cached()
    }

    pub(crate) fn cached_features(&self) -> Option<Rc<Features>> {
        self.features.cached()
    }

    /// Has anything written to `info.json` changed in `context`?
    pub(crate) fn info_dirty(&self, context: DirtyContext) -> bool {
        let fields = self.dirty_fields(context);
        Kind::Font.inline_fields().any(|f| fields.contains(f))
            || self.axes.any_dirty(context)
            || self.instances.any_dirty(context)
            || self.masters.any_dirty(context)
    }

    /// Cleans the font itself and the children written with it.
    pub(crate) fn clean_info(&self, context: DirtyContext) {
        self.axes.clean(&self.core, context);
        self.instances.clean(&self.core, context);
        self.masters.clean(&self.core, context);
        self.mark_clean(context, false);
    }

    /// The package this font was loaded from or last saved to.
    pub fn filename(&self) -> Option<PathBuf> {
        self.filename.borrow().clone()
    }

    /// Sets or clears the path the font saves to by default
    pub fn set_filename(&self, filename: Option<PathBuf>) {
        *self.filename.borrow_mut() = filename;
    }

    /// Locates a master by its id.
    pub fn master(&self, id: &str) -> Option<Rc<Master>> {
        self.masters().iter().find(|m| m.id() == id)
    }

    /// The master at the default location, or the only master.
    pub fn default_master(&self) -> Option<Rc<Master>> {
        let default_location: Location = self
            .axes()
            .iter()
            .filter_map(|axis| Some((axis.tag()?, axis.map_forward(axis.default()?))))
            .collect();
        let masters = self.masters();
        if let Some(master) = masters
            .iter()
            .find(|m| m.location() == default_location)
        {
            return Some(master);
        }
        if masters.len() == 1 {
            return masters.first();
        }
        None
    }

    /// Maps a location from userspace to designspace, axis by axis.
    pub fn map_forward(&self, location: &Location) -> Location {
        let mut mapped = location.clone();
        for axis in self.axes().iter() {
            if let Some(value) = axis.tag().and_then(|tag| mapped.get_mut(&tag)) {
                *value = axis.map_forward(*value);
            }
        }
        mapped
    }

    /// Maps a location from designspace to userspace, axis by axis.
    pub fn map_backward(&self, location: &Location) -> Location {
        let mut mapped = location.clone();
        for axis in self.axes().iter() {
            if let Some(value) = axis.tag().and_then(|tag| mapped.get_mut(&tag)) {
                *value = axis.map_backward(*value);
            }
        }
        mapped
    }

    /// Codepoint to glyph name. Builds every glyph.
    pub fn unicode_map(&self) -> BTreeMap<u32, String> {
        let mut map = BTreeMap::new();
        for glyph in self.glyphs() {
            let name = glyph.name();
            for codepoint in glyph.codepoints() {
                map.insert(codepoint, name.clone());
            }
        }
        map
    }

    /// Names of the glyphs that are exported
    pub fn exported_glyphs(&self) -> Vec<String> {
        self.glyphs()
            .iter()
            .filter(|g| g.exported())
            .map(|g| g.name())
            .collect()
    }

    /// The position of an anchor in each master, keyed by the master's
    /// designspace location.
    pub fn variable_anchor(
        &self,
        glyph: &str,
        anchor: &str,
    ) -> Result<Vec<(Location, i64, i64)>, ContextError> {
        let mut values = vec![];
        for master in self.masters().iter() {
            let found = master
                .glyph_layer(glyph)
                .and_then(|layer| layer.anchor(anchor));
            let Some(found) = found else {
                return Err(ContextError::IncompatibleMasters {
                    anchor: anchor.to_string(),
                    glyph: glyph.to_string(),
                    master: master
                        .name()
                        .get_default()
                        .cloned()
                        .unwrap_or_else(|| master.id()),
                });
            };
            values.push((self.map_forward(&master.location()), found.x(), found.y()));
        }
        Ok(values)
    }

    /// Switches change tracking on.
    ///
    /// The font becomes clean for file saving, since it matches what is on
    /// disk, and dirty for canvas rendering. Children already built are
    /// switched on now; the rest are switched on as they are built.
    pub fn initialize_dirty_tracking(&self) {
        self.enable_tracking();
        self.mark_clean(FILE_SAVING, true);
        self.mark_dirty(CANVAS_RENDER, None, false);
    }

    /// Registers a save callback
    pub fn register_callback(&self, callback: SaveCallback) -> CallbackId {
        let id = CallbackId(self.next_callback.get());
        self.next_callback.set(id.0 + 1);
        self.callbacks.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    /// Removes a callback. Returns whether it was registered.
    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(cid, _)| *cid != id);
        callbacks.len() != before
    }

    /// Removes the callbacks for one event, or for all events.
    pub fn clear_callbacks(&self, event: Option<SaveEvent>) {
        self.callbacks
            .borrow_mut()
            .retain(|(_, cb)| event.is_some_and(|e| cb.event() != e));
    }

    fn callbacks_for(&self, event: SaveEvent) -> Vec<Rc<SaveCallback>> {
        self.callbacks
            .borrow()
            .iter()
            .filter(|(_, cb)| cb.event() == event)
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    fn run_callbacks(
        &self,
        event: SaveEvent,
        path: &Path,
        outcome: Result<Duration, &ContextError>,
    ) {
        for callback in self.callbacks_for(event) {
            let result = match (&*callback, outcome) {
                (SaveCallback::BeforeSave(f), _) => f(self, path),
                (SaveCallback::AfterSave(f), Ok(duration)) => f(self, path, duration),
                (SaveCallback::OnError(f), Err(error)) => f(self, path, error),
                _ => Ok(()),
            };
            if let Err(e) = result {
                log::error!("Error in {:?} callback: {}", event, e);
            }
        }
    }

    /// Saves the font as a package, to `path` or else to the font's stored
    /// filename. Only partitions holding changed data are rewritten.
    pub fn save(
        &self,
        path: Option<&Path>,
        options: &SaveOptions,
    ) -> Result<SaveReport, ContextError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.filename().ok_or(ContextError::NoPath)?,
        };
        self.run_callbacks(SaveEvent::BeforeSave, &path, Ok(Duration::ZERO));
        let start = Instant::now();
        let result = {
            let _suppress = SuppressUserDataTracking::new();
            nfsf::save(self, &path, options)
        };
        match result {
            Ok(report) => {
                self.set_filename(Some(path.clone()));
                let elapsed = start.elapsed();
                log::debug!("Saved {} in {:.2?}", path.display(), elapsed);
                self.run_callbacks(SaveEvent::AfterSave, &path, Ok(elapsed));
                Ok(report)
            }
            Err(error) => {
                self.run_callbacks(SaveEvent::OnError, &path, Err(&error));
                Err(error)
            }
        }
    }
}

impl Tracked for Font {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, context: DirtyContext) {
        self.axes.clean(&self.core, context);
        self.instances.clean(&self.core, context);
        self.masters.clean(&self.core, context);
        if let Some(glyphs) = self.glyphs.get() {
            glyphs.clean(context);
        }
        self.names.clean(&self.core, context);
        self.features.clean(&self.core, context);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{anchor::Anchor, glyph::Glyph, layer::Layer};
    use pretty_assertions::assert_eq;

    fn two_master_font() -> Rc<Font> {
        let font = Font::from_document(&json!({
            "axes": [{"name": "Weight", "tag": "wght", "min": 100, "max": 900, "default": 400}],
            "masters": [
                {"name": "Regular", "id": "m1", "location": {"wght": 400}},
                {"name": "Black", "id": "m2", "location": {"wght": 900}}
            ],
            "glyphs": [
                {"name": "A", "codepoints": [65]},
                {"name": "B", "codepoints": [66, 67], "exported": false}
            ]
        }))
        .unwrap();
        for (master, x) in [("m1", 250), ("m2", 300)] {
            let layer = Layer::new(500, Some(master)).unwrap();
            layer.anchors().push(Anchor::new("top", x, 700).unwrap());
            font.glyphs().get("A").unwrap().layers().push(layer);
        }
        font
    }

    #[test]
    fn master_lookup() {
        let font = two_master_font();
        assert_eq!(font.master("m2").unwrap().id(), "m2");
        assert!(font.master("m3").is_none());
        assert_eq!(font.default_master().unwrap().id(), "m1");
        assert!(font.masters().iter().all(|m| m.valid()));
    }

    #[test]
    fn glyph_queries() {
        let font = two_master_font();
        let map = font.unicode_map();
        assert_eq!(map.get(&67).map(String::as_str), Some("B"));
        assert_eq!(font.exported_glyphs(), vec!["A".to_string()]);
    }

    #[test]
    fn variable_anchor() {
        let font = two_master_font();
        let values = font.variable_anchor("A", "top").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!((values[1].1, values[1].2), (300, 700));
        let err = font.variable_anchor("A", "bottom").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Anchor bottom not found on glyph A in master Regular"
        );
        assert!(font.variable_anchor("B", "top").is_err());
    }

    #[test]
    fn version_and_defaults() {
        let font = Font::new();
        assert_eq!(font.upm(), 1000);
        assert_eq!(font.version(), (1, 0));
        assert!(font.date().is_some());
        font.set_version(2, 3).unwrap();
        assert_eq!(font.version(), (2, 3));
    }

    #[test]
    fn initialize_dirty_tracking() {
        let font = two_master_font();
        let glyph = font.glyphs().get("A").unwrap();
        font.initialize_dirty_tracking();
        assert!(!font.is_dirty(FILE_SAVING));
        assert!(font.is_dirty(CANVAS_RENDER));
        assert!(glyph.tracking_enabled());
        let layer = glyph.layers().first().unwrap();
        layer.set_width(600).unwrap();
        assert!(glyph.is_dirty(FILE_SAVING));
        assert!(font.is_dirty(FILE_SAVING));
        font.mark_clean(FILE_SAVING, true);
        assert!(!layer.is_dirty(FILE_SAVING));
        assert!(layer.is_dirty(CANVAS_RENDER));
    }

    #[test]
    fn appending_glyphs_marks_the_font() {
        let font = Font::new();
        font.initialize_dirty_tracking();
        font.glyphs().append(Glyph::new("space").unwrap());
        assert!(font.dirty_fields(FILE_SAVING).contains("glyphs"));
        assert!(font.glyphs().get("space").unwrap().tracking_enabled());
    }

    #[test]
    fn save_without_a_path_fails_before_callbacks() {
        let font = Font::new();
        let called = Rc::new(Cell::new(false));
        let seen = called.clone();
        font.register_callback(SaveCallback::BeforeSave(Box::new(move |_, _| {
            seen.set(true);
            Ok(())
        })));
        let err = font.save(None, &SaveOptions::default()).unwrap_err();
        assert!(matches!(err, ContextError::NoPath));
        assert!(!called.get());
    }

    #[test]
    fn callbacks_can_be_removed() {
        let font = Font::new();
        let a = font.register_callback(SaveCallback::BeforeSave(Box::new(|_, _| Ok(()))));
        font.register_callback(SaveCallback::AfterSave(Box::new(|_, _, _| Ok(()))));
        assert!(font.unregister_callback(a));
        assert!(!font.unregister_callback(a));
        font.clear_callbacks(Some(SaveEvent::BeforeSave));
        assert_eq!(font.callbacks_for(SaveEvent::AfterSave).len(), 1);
        font.clear_callbacks(None);
        assert!(font.callbacks_for(SaveEvent::AfterSave).is_empty());
    }
}
