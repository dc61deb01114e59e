//! Change tracking and lazy materialization shared by every font object.
//!
//! Each facade owns an [`ObjectCore`]: the [`DynamicRecord`] it reads and
//! writes through, its [`DirtyState`], a weak link to its logical parent and
//! a handle to itself. Parents own children strongly (through their child
//! caches); children only ever point upwards weakly.
//!
//! Child facades are built the first time a parent's child accessor is
//! called. Until then the parent's record holds plain records (or raw JSON)
//! that are clean by construction, and recursive cleaning skips them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::{
    common::FieldValue,
    dirty::{DirtyContext, DirtyState, CANVAS_RENDER, FILE_SAVING},
    record::{self, DocumentValue, DynamicRecord, RecordRef},
    schema::{is_falsy, json_eq, Kind},
    userdata::TrackedMapping,
    ContextError,
};

/// The state every font object carries: its record, dirty flags and parent link
pub struct ObjectCore {
    record: RecordRef,
    dirty: RefCell<DirtyState>,
    parent: RefCell<Option<Weak<dyn Tracked>>>,
    this: Weak<dyn Tracked>,
    tracking: Cell<bool>,
}

impl ObjectCore {
    pub(crate) fn new(record: RecordRef, this: Weak<dyn Tracked>) -> Self {
        ObjectCore {
            record,
            dirty: RefCell::new(DirtyState::new()),
            parent: RefCell::new(None),
            this,
            tracking: Cell::new(false),
        }
    }

    /// The backing record
    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    pub(crate) fn this(&self) -> Weak<dyn Tracked> {
        self.this.clone()
    }

    pub(crate) fn set_parent(&self, parent: Option<Weak<dyn Tracked>>) {
        *self.parent.borrow_mut() = parent;
    }

    /// Links a child to this object, handing down the tracking switch.
    pub(crate) fn adopt(&self, child: &dyn Tracked) {
        child.core().set_parent(Some(self.this.clone()));
        if self.tracking.get() {
            child.enable_tracking();
        }
    }

    /// Cleans a materialized child as part of a recursive clean.
    pub(crate) fn clean_child(&self, child: &dyn Tracked, context: DirtyContext) {
        if self.tracking.get() {
            child.enable_tracking();
        }
        child.mark_clean(context, true);
    }
}

impl Debug for ObjectCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCore")
            .field("kind", &self.record.borrow().kind())
            .field("dirty", &self.dirty.borrow())
            .field("tracking", &self.tracking.get())
            .finish()
    }
}

/// Behaviour common to every font object: dirty bookkeeping, parent
/// navigation and field access through the backing record.
pub trait Tracked: 'static {
    /// The shared object state
    fn core(&self) -> &ObjectCore;

    /// Marks already-materialized children clean. Never materializes.
    fn mark_children_clean(&self, context: DirtyContext);

    /// Upcasts for ancestor lookups
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// The kind of object
    fn kind(&self) -> Kind {
        self.core().record.borrow().kind()
    }

    /// The backing record
    fn record(&self) -> RecordRef {
        self.core().record.clone()
    }

    /// Flags this object dirty in `context`, recording `field` if given.
    ///
    /// When `propagate` is set and the object was not already dirty in that
    /// context, the parent chain is marked too.
    fn mark_dirty(&self, context: DirtyContext, field: Option<&str>, propagate: bool) {
        let was_dirty = self.core().dirty.borrow_mut().mark(context, field);
        if propagate && !was_dirty {
            if let Some(parent) = self.parent() {
                parent.mark_dirty(context, None, true);
            }
        }
    }

    /// Clears dirtiness in `context`, and in materialized children when `recursive`
    fn mark_clean(&self, context: DirtyContext, recursive: bool) {
        self.core().dirty.borrow_mut().clear(context);
        if recursive {
            self.mark_children_clean(context);
        }
    }

    /// Is this object dirty in `context`?
    fn is_dirty(&self, context: DirtyContext) -> bool {
        self.core().dirty.borrow().is_dirty(context)
    }

    /// The fields changed in `context`
    fn dirty_fields(&self, context: DirtyContext) -> BTreeSet<String> {
        self.core().dirty.borrow().fields(context)
    }

    /// A snapshot of the dirty flags
    fn dirty_state(&self) -> DirtyState {
        self.core().dirty.borrow().clone()
    }

    /// Switches dirty bookkeeping on for this object only.
    fn enable_tracking(&self) {
        self.core().tracking.set(true);
        self.core().dirty.borrow_mut().initialize();
    }

    /// Is dirty bookkeeping on?
    fn tracking_enabled(&self) -> bool {
        self.core().tracking.get()
    }

    /// The owning object, if attached and alive
    fn parent(&self) -> Option<Rc<dyn Tracked>> {
        self.core().parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// The stored JSON value of a field, or its default when absent.
    fn get(&self, field: &str) -> Option<Value> {
        let kind = self.kind();
        let name = kind
            .field_by_any_name(field)
            .map(|spec| spec.name)
            .unwrap_or(field);
        if let Some(value) = self.core().record.borrow().json(name) {
            return Some(value.clone());
        }
        kind.field(name).and_then(|spec| spec.default_value())
    }

    /// Validates and stores a field value. Storing the current value is a
    /// no-op; a change marks the object dirty when tracking is on.
    fn set(&self, field: &str, value: Value) -> Result<(), ContextError> {
        let (name, value) = match self.kind().field_by_any_name(field) {
            Some(spec) => {
                let value = spec.normalize(value);
                spec.validate(&value)?;
                (spec.name, value)
            }
            None => (field, value),
        };
        let before = self.get(name);
        let changed = if value.is_null() {
            self.core().record.borrow_mut().set_json(name, value);
            !reads_the_same(before.as_ref(), self.get(name).as_ref())
        } else if reads_the_same(before.as_ref(), Some(&value)) {
            false
        } else {
            self.core().record.borrow_mut().set_json(name, value)
        };
        if changed {
            self.field_changed(name);
        }
        Ok(())
    }

    /// Removes a field, reverting it to its default.
    fn unset(&self, field: &str) -> Result<(), ContextError> {
        self.set(field, Value::Null)
    }

    /// Records a change to `field` in the file-saving and canvas contexts.
    fn field_changed(&self, field: &str) {
        if self.tracking_enabled() {
            self.mark_dirty(FILE_SAVING, Some(field), true);
            self.mark_dirty(CANVAS_RENDER, Some(field), true);
        }
    }

    /// The free-form user data stored under `_`.
    fn user_data(&self) -> TrackedMapping {
        TrackedMapping::root(self.core().this(), self.core().record.clone())
    }

    /// The object as a plain JSON document
    fn to_document(&self) -> Value {
        self.core().record.borrow().to_document()
    }
}

/// A typed object kind that can be built over a record.
pub trait Facade: Tracked + Sized {
    /// The kind this facade wraps
    const KIND: Kind;

    /// Wraps a record
    fn from_record(record: RecordRef) -> Rc<Self>;

    /// Builds an object from a literal document, validating it.
    fn from_document(document: &Value) -> Result<Rc<Self>, ContextError> {
        Ok(Self::from_record(DynamicRecord::from_document(
            Self::KIND,
            document,
            true,
        )?))
    }
}

/// Would a field read back the same? An absent field with no default reads
/// as its type's empty value.
fn reads_the_same(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => json_eq(a, b),
        (None, None) => true,
        (None, Some(v)) | (Some(v), None) => is_falsy(v),
    }
}

/// Walks up the parent chain to the nearest ancestor of type `T`.
pub(crate) fn ancestor<T: Tracked>(start: &dyn Tracked) -> Option<Rc<T>> {
    let mut current = start.parent();
    while let Some(object) = current {
        match object.clone().into_any().downcast::<T>() {
            Ok(found) => return Some(found),
            Err(_) => current = object.parent(),
        }
    }
    None
}

pub(crate) fn read_field<T: FieldValue>(object: &dyn Tracked, field: &str) -> Option<T> {
    object.get(field).and_then(|v| T::from_json(&v))
}

pub(crate) fn write_field<T: FieldValue>(
    object: &dyn Tracked,
    field: &str,
    value: T,
) -> Result<(), ContextError> {
    object.set(field, value.to_json())
}

/// Either a record nobody has asked for yet or the facade built over it.
#[derive(Debug)]
pub enum ChildSlot<T> {
    /// Not yet built
    Raw(RecordRef),
    /// Built and cached
    Materialized(Rc<T>),
}

impl<T: Facade> ChildSlot<T> {
    /// The slot's record
    pub fn record(&self) -> RecordRef {
        match self {
            ChildSlot::Raw(record) => record.clone(),
            ChildSlot::Materialized(object) => object.record(),
        }
    }

    /// Has the facade been built?
    pub fn is_materialized(&self) -> bool {
        matches!(self, ChildSlot::Materialized(_))
    }
}

/// Lazily-built cache of a one-to-many child field.
pub(crate) struct ChildList<T: Facade> {
    field: &'static str,
    cache: RefCell<Option<TrackedSequence<T>>>,
}

impl<T: Facade> ChildList<T> {
    pub(crate) fn new(field: &'static str) -> Self {
        ChildList {
            field,
            cache: RefCell::new(None),
        }
    }

    pub(crate) fn get(&self, core: &ObjectCore) -> TrackedSequence<T> {
        if let Some(sequence) = self.cache.borrow().as_ref() {
            return sequence.clone();
        }
        let items = record::children(&core.record, self.field)
            .into_iter()
            .map(|r| {
                let child = T::from_record(r);
                core.adopt(&*child);
                child
            })
            .collect();
        let sequence = TrackedSequence::new(core, self.field, items);
        *self.cache.borrow_mut() = Some(sequence.clone());
        sequence
    }

    pub(crate) fn cached(&self) -> Option<TrackedSequence<T>> {
        self.cache.borrow().clone()
    }

    pub(crate) fn clean(&self, core: &ObjectCore, context: DirtyContext) {
        if let Some(sequence) = self.cached() {
            for child in sequence.iter() {
                core.clean_child(&*child, context);
            }
        }
    }

    /// Any materialized child dirty in `context`?
    pub(crate) fn any_dirty(&self, context: DirtyContext) -> bool {
        self.cached()
            .is_some_and(|sequence| sequence.iter().any(|c| c.is_dirty(context)))
    }
}

/// Lazily-built cache of a single child field.
pub(crate) struct ChildOne<T: Facade> {
    field: &'static str,
    cache: RefCell<Option<Rc<T>>>,
}

impl<T: Facade> ChildOne<T> {
    pub(crate) fn new(field: &'static str) -> Self {
        ChildOne {
            field,
            cache: RefCell::new(None),
        }
    }

    pub(crate) fn get(&self, core: &ObjectCore) -> Option<Rc<T>> {
        if let Some(child) = self.cache.borrow().as_ref() {
            return Some(child.clone());
        }
        let child = T::from_record(record::child(&core.record, self.field)?);
        core.adopt(&*child);
        *self.cache.borrow_mut() = Some(child.clone());
        Some(child)
    }

    /// Replaces the child, keeping the parent record in step.
    pub(crate) fn set(&self, core: &ObjectCore, child: Option<Rc<T>>) {
        match &child {
            Some(child) => {
                core.adopt(&**child);
                core.record
                    .borrow_mut()
                    .insert(self.field, DocumentValue::Record(child.record()));
            }
            None => {
                core.record.borrow_mut().remove(self.field);
            }
        }
        if let Some(old) = self.cache.replace(child) {
            old.core().set_parent(None);
        }
    }

    pub(crate) fn cached(&self) -> Option<Rc<T>> {
        self.cache.borrow().clone()
    }

    pub(crate) fn clean(&self, core: &ObjectCore, context: DirtyContext) {
        if let Some(child) = self.cached() {
            core.clean_child(&*child, context);
        }
    }
}

struct SequenceInner<T> {
    owner: Weak<dyn Tracked>,
    record: RecordRef,
    field: &'static str,
    items: RefCell<Vec<Rc<T>>>,
}

/// A list of child objects that keeps its owner's record list in step and
/// marks the owner dirty when it changes.
///
/// Handles are cheap to clone and all clones share the same list.
pub struct TrackedSequence<T: Facade> {
    inner: Rc<SequenceInner<T>>,
}

impl<T: Facade> Clone for TrackedSequence<T> {
    fn clone(&self) -> Self {
        TrackedSequence {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Facade> Debug for TrackedSequence<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedSequence")
            .field("field", &self.inner.field)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Facade> TrackedSequence<T> {
    pub(crate) fn new(owner: &ObjectCore, field: &'static str, items: Vec<Rc<T>>) -> Self {
        TrackedSequence {
            inner: Rc::new(SequenceInner {
                owner: owner.this(),
                record: owner.record.clone(),
                field,
                items: RefCell::new(items),
            }),
        }
    }

    /// The number of items
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Is the list empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `index`, built if needed
    pub fn get(&self, index: usize) -> Option<Rc<T>> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// The first item
    pub fn first(&self) -> Option<Rc<T>> {
        self.get(0)
    }

    /// The last item
    pub fn last(&self) -> Option<Rc<T>> {
        self.inner.items.borrow().last().cloned()
    }

    /// Every item, built
    pub fn to_vec(&self) -> Vec<Rc<T>> {
        self.inner.items.borrow().clone()
    }

    /// Iterates over a snapshot of the list.
    pub fn iter(&self) -> std::vec::IntoIter<Rc<T>> {
        self.to_vec().into_iter()
    }

    /// The index of this exact object
    pub fn position(&self, item: &Rc<T>) -> Option<usize> {
        self.inner
            .items
            .borrow()
            .iter()
            .position(|x| Rc::ptr_eq(x, item))
    }

    /// Appends an item, adopting it
    pub fn push(&self, item: Rc<T>) {
        self.adopt(&item);
        self.records_mut(|records| records.push(item.record()));
        self.inner.items.borrow_mut().push(item);
        self.changed();
    }

    /// Inserts at `index`, or appends when `index` is past the end.
    pub fn insert(&self, index: usize, item: Rc<T>) {
        let index = index.min(self.len());
        self.adopt(&item);
        self.records_mut(|records| records.insert(index, item.record()));
        self.inner.items.borrow_mut().insert(index, item);
        self.changed();
    }

    /// Removes and returns the item at `index`
    pub fn remove(&self, index: usize) -> Option<Rc<T>> {
        if index >= self.len() {
            return None;
        }
        self.records_mut(|records| {
            records.remove(index);
        });
        let removed = self.inner.items.borrow_mut().remove(index);
        removed.core().set_parent(None);
        self.changed();
        Some(removed)
    }

    /// Replaces the item at `index`, returning the old one.
    pub fn set(&self, index: usize, item: Rc<T>) -> Option<Rc<T>> {
        if index >= self.len() {
            return None;
        }
        self.adopt(&item);
        self.records_mut(|records| records[index] = item.record());
        let old = std::mem::replace(&mut self.inner.items.borrow_mut()[index], item);
        old.core().set_parent(None);
        self.changed();
        Some(old)
    }

    /// Removes every item
    pub fn clear(&self) {
        self.replace_all(vec![]);
    }

    /// Replaces the whole list
    pub fn replace_all(&self, items: Vec<Rc<T>>) {
        for item in &items {
            self.adopt(item);
        }
        let records: Vec<RecordRef> = items.iter().map(|i| i.record()).collect();
        self.records_mut(|list| *list = records);
        let old = self.inner.items.replace(items);
        for item in old {
            item.core().set_parent(None);
        }
        self.changed();
    }

    fn records_mut(&self, f: impl FnOnce(&mut Vec<RecordRef>)) {
        let mut record = self.inner.record.borrow_mut();
        f(record.records_mut(self.inner.field));
    }

    fn owner_tracking(&self) -> Option<Rc<dyn Tracked>> {
        self.inner
            .owner
            .upgrade()
            .filter(|owner| owner.tracking_enabled())
    }

    fn adopt(&self, item: &Rc<T>) {
        item.core().set_parent(Some(self.inner.owner.clone()));
        if self.owner_tracking().is_some() {
            item.enable_tracking();
        }
    }

    fn changed(&self) {
        if let Some(owner) = self.owner_tracking() {
            owner.field_changed(self.inner.field);
        }
    }
}

impl<T: Facade> IntoIterator for &TrackedSequence<T> {
    type Item = Rc<T>;
    type IntoIter = std::vec::IntoIter<Rc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
