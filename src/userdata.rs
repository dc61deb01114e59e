//! Change-tracked views of the free-form user data stored under `_`.
//!
//! A [`TrackedMapping`] or [`TrackedArray`] is a path into the owner's user
//! data value rather than a copy of it, so nested handles stay in sync with
//! each other and every mutation, however deep, goes through a method that
//! can mark the owner dirty. There is no way to reach the underlying JSON
//! mutably without going through a handle.

use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::rc::Weak;

use serde_json::{Map, Value};

use crate::{
    record::{DocumentValue, RecordRef},
    schema::USER_DATA,
    tracking::Tracked,
};

thread_local! {
    static SUPPRESSED: Cell<usize> = const { Cell::new(0) };
}

/// While alive, user data mutations do not mark their owners dirty.
///
/// Held by the serializer for the duration of a save. Guards nest.
#[must_use]
pub struct SuppressUserDataTracking {
    _private: (),
}

impl SuppressUserDataTracking {
    /// Suppresses tracking until dropped
    pub fn new() -> Self {
        SUPPRESSED.with(|depth| depth.set(depth.get() + 1));
        SuppressUserDataTracking { _private: () }
    }
}

impl Default for SuppressUserDataTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SuppressUserDataTracking {
    fn drop(&mut self) {
        SUPPRESSED.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Is user data tracking suppressed?
pub fn user_data_tracking_suppressed() -> bool {
    SUPPRESSED.with(|depth| depth.get() > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Clone)]
struct Handle {
    owner: Weak<dyn Tracked>,
    record: RecordRef,
    path: Vec<Segment>,
}

impl Handle {
    fn child(&self, segment: Segment) -> Handle {
        let mut path = self.path.clone();
        path.push(segment);
        Handle {
            owner: self.owner.clone(),
            record: self.record.clone(),
            path,
        }
    }

    fn read<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let record = self.record.borrow();
        let mut value = record.json(USER_DATA);
        for segment in &self.path {
            value = value.and_then(|v| match segment {
                Segment::Key(k) => v.as_object().and_then(|m| m.get(k)),
                Segment::Index(i) => v.as_array().and_then(|a| a.get(*i)),
            });
        }
        f(value)
    }

    /// Runs `f` on the target value, which reports whether it changed
    /// anything. Returns `None` if the target no longer exists.
    fn modify<R>(&self, f: impl FnOnce(&mut Value) -> (R, bool)) -> Option<R> {
        let (result, changed) = {
            let mut record = self.record.borrow_mut();
            if self.path.is_empty() && record.json(USER_DATA).is_none() {
                record.insert(USER_DATA, DocumentValue::Json(Value::Object(Map::new())));
            }
            let mut value = record.json_mut(USER_DATA)?;
            for segment in &self.path {
                value = match segment {
                    Segment::Key(k) => value.as_object_mut()?.get_mut(k)?,
                    Segment::Index(i) => value.as_array_mut()?.get_mut(*i)?,
                };
            }
            let outcome = f(value);
            if record
                .json(USER_DATA)
                .is_some_and(|root| root.as_object().is_some_and(Map::is_empty))
            {
                record.remove(USER_DATA);
            }
            outcome
        };
        if changed && !user_data_tracking_suppressed() {
            if let Some(owner) = self.owner.upgrade() {
                owner.field_changed(USER_DATA);
            }
        }
        Some(result)
    }
}

/// A change-tracked JSON object inside an object's user data.
#[derive(Clone)]
pub struct TrackedMapping {
    handle: Handle,
}

impl Debug for TrackedMapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackedMapping({})", self.to_value())
    }
}

impl TrackedMapping {
    pub(crate) fn root(owner: Weak<dyn Tracked>, record: RecordRef) -> Self {
        TrackedMapping {
            handle: Handle {
                owner,
                record,
                path: vec![],
            },
        }
    }

    fn read_map<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> Option<R> {
        self.handle.read(|v| v.and_then(Value::as_object).map(f))
    }

    fn modify_map<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> (R, bool)) -> Option<R> {
        self.handle
            .modify(|v| match v.as_object_mut() {
                Some(map) => {
                    let (r, changed) = f(map);
                    (Some(r), changed)
                }
                None => (None, false),
            })
            .flatten()
    }

    /// A copy of the current contents.
    pub fn to_value(&self) -> Value {
        self.handle
            .read(|v| v.cloned())
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// The value at `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read_map(|m| m.get(key).cloned()).flatten()
    }

    /// Is there a value at `key`?
    pub fn contains_key(&self, key: &str) -> bool {
        self.read_map(|m| m.contains_key(key)).unwrap_or(false)
    }

    /// The keys, in order
    pub fn keys(&self) -> Vec<String> {
        self.read_map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The number of entries
    pub fn len(&self) -> usize {
        self.read_map(Map::len).unwrap_or(0)
    }

    /// Is the mapping empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        self.modify_map(|m| {
            let changed = m.get(&key) != Some(&value);
            (m.insert(key, value), changed)
        })
        .flatten()
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.modify_map(|m| {
            let old = m.shift_remove(key);
            let changed = old.is_some();
            (old, changed)
        })
        .flatten()
    }

    /// Same as [`remove`](Self::remove).
    pub fn pop(&self, key: &str) -> Option<Value> {
        self.remove(key)
    }

    /// Removes and returns the most recently inserted entry.
    pub fn pop_item(&self) -> Option<(String, Value)> {
        self.modify_map(|m| {
            let last = m.keys().last().cloned();
            let item = last.and_then(|k| m.shift_remove(&k).map(|v| (k, v)));
            let changed = item.is_some();
            (item, changed)
        })
        .flatten()
    }

    /// Removes every entry
    pub fn clear(&self) {
        self.modify_map(|m| {
            let changed = !m.is_empty();
            m.clear();
            ((), changed)
        });
    }

    /// Returns the value of `key`, inserting `default` first if absent.
    /// Only an insertion counts as a change.
    pub fn set_default(&self, key: impl Into<String>, default: impl Into<Value>) -> Value {
        let key = key.into();
        let default = default.into();
        self.modify_map(|m| {
            if let Some(existing) = m.get(&key) {
                (existing.clone(), false)
            } else {
                m.insert(key, default.clone());
                (default, true)
            }
        })
        .unwrap_or(Value::Null)
    }

    /// Merges entries in, marking the owner at most once.
    pub fn update<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.modify_map(|m| {
            let mut changed = false;
            for (k, v) in entries {
                if m.get(&k) != Some(&v) {
                    changed = true;
                    m.insert(k, v);
                }
            }
            ((), changed)
        });
    }

    /// A tracked view of a nested object, if `key` holds one.
    pub fn mapping(&self, key: &str) -> Option<TrackedMapping> {
        self.get(key).filter(Value::is_object).map(|_| TrackedMapping {
            handle: self.handle.child(Segment::Key(key.to_string())),
        })
    }

    /// A tracked view of a nested array, if `key` holds one.
    pub fn array(&self, key: &str) -> Option<TrackedArray> {
        self.get(key).filter(Value::is_array).map(|_| TrackedArray {
            handle: self.handle.child(Segment::Key(key.to_string())),
        })
    }
}

/// A change-tracked JSON array inside an object's user data.
#[derive(Clone)]
pub struct TrackedArray {
    handle: Handle,
}

impl Debug for TrackedArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackedArray({})", self.to_value())
    }
}

impl TrackedArray {
    fn read_vec<R>(&self, f: impl FnOnce(&Vec<Value>) -> R) -> Option<R> {
        self.handle.read(|v| v.and_then(Value::as_array).map(f))
    }

    fn modify_vec<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> (R, bool)) -> Option<R> {
        self.handle
            .modify(|v| match v.as_array_mut() {
                Some(items) => {
                    let (r, changed) = f(items);
                    (Some(r), changed)
                }
                None => (None, false),
            })
            .flatten()
    }

    /// The array as plain JSON
    pub fn to_value(&self) -> Value {
        self.handle
            .read(|v| v.cloned())
            .unwrap_or_else(|| Value::Array(vec![]))
    }

    /// The value at `index`
    pub fn get(&self, index: usize) -> Option<Value> {
        self.read_vec(|items| items.get(index).cloned()).flatten()
    }

    /// The number of items
    pub fn len(&self) -> usize {
        self.read_vec(Vec::len).unwrap_or(0)
    }

    /// Is the array empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a value
    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        self.modify_vec(|items| {
            items.push(value);
            ((), true)
        });
    }

    /// Inserts at `index`, or appends when `index` is past the end.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        self.modify_vec(|items| {
            items.insert(index.min(items.len()), value);
            ((), true)
        });
    }

    /// Removes and returns the value at `index`
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.modify_vec(|items| {
            if index < items.len() {
                (Some(items.remove(index)), true)
            } else {
                (None, false)
            }
        })
        .flatten()
    }

    /// Replaces the item at `index`, returning the old one.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let value = value.into();
        self.modify_vec(|items| match items.get_mut(index) {
            Some(slot) => {
                let changed = *slot != value;
                (Some(std::mem::replace(slot, value)), changed)
            }
            None => (None, false),
        })
        .flatten()
    }

    /// Removes every item
    pub fn clear(&self) {
        self.modify_vec(|items| {
            let changed = !items.is_empty();
            items.clear();
            ((), changed)
        });
    }

    /// A handle to the mapping at `index`
    pub fn mapping(&self, index: usize) -> Option<TrackedMapping> {
        self.get(index).filter(Value::is_object).map(|_| TrackedMapping {
            handle: self.handle.child(Segment::Index(index)),
        })
    }

    /// A handle to the array at `index`
    pub fn array(&self, index: usize) -> Option<TrackedArray> {
        self.get(index).filter(Value::is_array).map(|_| TrackedArray {
            handle: self.handle.child(Segment::Index(index)),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        dirty::{CANVAS_RENDER, FILE_SAVING},
        glyph::Glyph,
        tracking::Facade,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::rc::Rc;

    fn glyph() -> Rc<Glyph> {
        let glyph = Glyph::from_document(&json!({
            "name": "a",
            "_": {
                "k": "v",
                "list": [1, 2],
                "nested": {"deep": {"x": 1}}
            }
        }))
        .unwrap();
        glyph.enable_tracking();
        glyph
    }

    fn assert_marked(glyph: &Glyph, changed: bool) {
        for context in [FILE_SAVING, CANVAS_RENDER] {
            assert_eq!(glyph.is_dirty(context), changed, "{}", context);
            assert_eq!(glyph.dirty_fields(context).contains(USER_DATA), changed);
        }
    }

    #[rstest]
    #[case::insert_new(|m: &TrackedMapping| { m.insert("new", 1); }, true)]
    #[case::insert_same(|m: &TrackedMapping| { m.insert("k", "v"); }, false)]
    #[case::remove(|m: &TrackedMapping| { m.remove("k"); }, true)]
    #[case::remove_missing(|m: &TrackedMapping| { m.remove("nope"); }, false)]
    #[case::pop(|m: &TrackedMapping| { m.pop("list"); }, true)]
    #[case::pop_item(|m: &TrackedMapping| { m.pop_item(); }, true)]
    #[case::set_default_new(|m: &TrackedMapping| { m.set_default("fresh", 0); }, true)]
    #[case::set_default_existing(|m: &TrackedMapping| { m.set_default("k", "other"); }, false)]
    #[case::update(|m: &TrackedMapping| m.update([("k", "w"), ("z", "z")]), true)]
    #[case::update_same(|m: &TrackedMapping| m.update([("k", "v")]), false)]
    #[case::clear(|m: &TrackedMapping| m.clear(), true)]
    #[case::array_push(|m: &TrackedMapping| m.array("list").unwrap().push(3), true)]
    #[case::array_insert(|m: &TrackedMapping| m.array("list").unwrap().insert(0, 0), true)]
    #[case::array_remove(|m: &TrackedMapping| { m.array("list").unwrap().remove(0); }, true)]
    #[case::array_remove_missing(|m: &TrackedMapping| { m.array("list").unwrap().remove(9); }, false)]
    #[case::array_set(|m: &TrackedMapping| { m.array("list").unwrap().set(1, 5); }, true)]
    #[case::array_set_same(|m: &TrackedMapping| { m.array("list").unwrap().set(1, 2); }, false)]
    #[case::array_clear(|m: &TrackedMapping| m.array("list").unwrap().clear(), true)]
    #[case::nested(|m: &TrackedMapping| { m.mapping("nested").unwrap().insert("y", 2); }, true)]
    fn mutations_mark_the_owner(#[case] mutate: fn(&TrackedMapping), #[case] changed: bool) {
        let glyph = glyph();
        mutate(&glyph.user_data());
        assert_marked(&glyph, changed);
    }

    #[test]
    fn deeply_nested_handles_write_through() {
        let glyph = glyph();
        let deep = glyph
            .user_data()
            .mapping("nested")
            .unwrap()
            .mapping("deep")
            .unwrap();
        deep.insert("x", 2);
        assert_marked(&glyph, true);
        assert_eq!(
            glyph.user_data().to_value()["nested"],
            json!({"deep": {"x": 2}})
        );
        // A second handle to the same place sees the change
        let again = glyph.user_data().mapping("nested").unwrap().mapping("deep").unwrap();
        assert_eq!(again.get("x"), Some(json!(2)));
    }

    #[test]
    fn empty_user_data_stays_absent() {
        let glyph = Glyph::new("b").unwrap();
        glyph.enable_tracking();
        let data = glyph.user_data();
        data.clear();
        assert!(data.is_empty());
        assert_marked(&glyph, false);
        data.insert("a", 1);
        assert_eq!(data.pop("a"), Some(json!(1)));
        assert!(!glyph.record().borrow().contains_key(USER_DATA));
    }

    #[test]
    fn suppressed_mutations_leave_the_owner_clean() {
        let glyph = glyph();
        {
            let _guard = SuppressUserDataTracking::new();
            assert!(user_data_tracking_suppressed());
            glyph.user_data().insert("cache", true);
        }
        assert!(!user_data_tracking_suppressed());
        assert_eq!(glyph.user_data().get("cache"), Some(json!(true)));
        assert_marked(&glyph, false);
        glyph.user_data().remove("cache");
        assert_marked(&glyph, true);
    }
}
