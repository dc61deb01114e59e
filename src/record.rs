//! The dynamically-typed documents backing every font object.
//!
//! A [`DynamicRecord`] is an ordered map from API field name to
//! [`DocumentValue`]. Scalars and free-form values are plain JSON; child
//! objects are nested records shared by reference, so a child facade writing
//! into its own record is immediately visible through its parent's record.
//!
//! Child lists read from disk may stay as raw JSON until someone asks for
//! them. Turning raw JSON into records ("inflation") normalizes the compact
//! on-disk spellings: node arrays, position and color arrays, bare-string
//! localized names and aliased field names.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::schema::{FieldType, Kind, USER_DATA};
use crate::ContextError;

/// A shared, mutable record
pub type RecordRef = Rc<RefCell<DynamicRecord>>;

#[derive(Debug, Clone)]
/// A record field: plain JSON, or child records once inflated
pub enum DocumentValue {
    /// Plain JSON
    Json(Value),
    /// A single child record
    Record(RecordRef),
    /// A list of child records
    Records(Vec<RecordRef>),
}

#[derive(Debug, Clone)]
/// An ordered set of fields belonging to one object kind
pub struct DynamicRecord {
    kind: Kind,
    fields: IndexMap<String, DocumentValue>,
}

impl DynamicRecord {
    /// An empty record of this kind
    pub fn new(kind: Kind) -> Self {
        DynamicRecord {
            kind,
            fields: IndexMap::new(),
        }
    }

    /// An empty shared record of this kind
    pub fn new_ref(kind: Kind) -> RecordRef {
        Rc::new(RefCell::new(DynamicRecord::new(kind)))
    }

    /// The kind of object this record backs
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// A field, if present
    pub fn get(&self, key: &str) -> Option<&DocumentValue> {
        self.fields.get(key)
    }

    /// A plain JSON field.
    pub fn json(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key) {
            Some(DocumentValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn json_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self.fields.get_mut(key) {
            Some(DocumentValue::Json(v)) => Some(v),
            _ => None,
        }
    }

    /// Is the field present?
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The field names, in order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// The fields, in order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocumentValue)> {
        self.fields.iter()
    }

    /// Stores a JSON value, removing the field for `null`.
    ///
    /// Returns whether the stored value changed.
    pub fn set_json(&mut self, key: &str, value: Value) -> bool {
        if value.is_null() {
            return self.fields.shift_remove(key).is_some();
        }
        if let Some(DocumentValue::Json(old)) = self.fields.get(key) {
            if *old == value {
                return false;
            }
        }
        self.fields.insert(key.to_string(), DocumentValue::Json(value));
        true
    }

    pub(crate) fn insert(&mut self, key: &str, value: DocumentValue) {
        self.fields.insert(key.to_string(), value);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<DocumentValue> {
        self.fields.shift_remove(key)
    }

    /// The mutable record list behind a child-list field, created empty if
    /// absent. Raw JSON is inflated first.
    pub(crate) fn records_mut(&mut self, key: &str) -> &mut Vec<RecordRef> {
        if !matches!(self.fields.get(key), Some(DocumentValue::Records(_))) {
            let inflated = match (self.fields.get(key), self.child_kind(key)) {
                (Some(DocumentValue::Json(raw)), Some(kind)) => inflate_list(kind, raw),
                _ => vec![],
            };
            self.fields
                .insert(key.to_string(), DocumentValue::Records(inflated));
        }
        match self.fields.get_mut(key) {
            Some(DocumentValue::Records(list)) => list,
            _ => unreachable!("field was just made a record list"),
        }
    }

    /// Has this child-list field been inflated from raw JSON yet?
    pub fn is_inflated(&self, key: &str) -> bool {
        !matches!(self.fields.get(key), Some(DocumentValue::Json(_)))
    }

    fn child_kind(&self, key: &str) -> Option<Kind> {
        match self.kind.field(key).map(|f| f.ty) {
            Some(FieldType::Children(kind)) | Some(FieldType::Child(kind)) => Some(kind),
            _ => None,
        }
    }

    /// Converts the record (and everything below it) to a JSON document
    /// using API field names and expanded value forms.
    pub fn to_document(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.fields {
            let doc = match (value, self.child_kind(key)) {
                (DocumentValue::Json(raw), Some(kind)) => match raw {
                    Value::Array(_) => Value::Array(
                        inflate_list(kind, raw)
                            .iter()
                            .map(|r| r.borrow().to_document())
                            .collect(),
                    ),
                    _ => inflate_one(kind, raw)
                        .map(|r| r.borrow().to_document())
                        .unwrap_or(Value::Null),
                },
                (DocumentValue::Json(raw), None) => raw.clone(),
                (DocumentValue::Record(r), _) => r.borrow().to_document(),
                (DocumentValue::Records(list), _) => {
                    Value::Array(list.iter().map(|r| r.borrow().to_document()).collect())
                }
            };
            map.insert(key.clone(), doc);
        }
        Value::Object(map)
    }

    /// Builds a record tree from a document in either API form or on-disk
    /// form.
    ///
    /// With `validate`, every known field is checked and missing required
    /// fields are reported; loading trusted package data skips this.
    pub fn from_document(
        kind: Kind,
        document: &Value,
        validate: bool,
    ) -> Result<RecordRef, ContextError> {
        let expanded;
        let document = if kind == Kind::Node {
            expanded = expand_node(document, validate)?;
            &expanded
        } else {
            document
        };
        let map = document.as_object().ok_or_else(|| {
            ContextError::General(format!("Expected an object for {:?}, got {}", kind, document))
        })?;
        let mut record = DynamicRecord::new(kind);
        let mut components = vec![];
        for (key, value) in map {
            if key == USER_DATA {
                record.insert(USER_DATA, DocumentValue::Json(value.clone()));
                continue;
            }
            if kind == Kind::Layer && key == "components" {
                if let Some(items) = value.as_array() {
                    components.extend(items.iter().cloned());
                }
                continue;
            }
            let Some(spec) = kind.field_by_any_name(key) else {
                record.insert(key, DocumentValue::Json(value.clone()));
                continue;
            };
            match spec.ty {
                FieldType::Children(child_kind) => {
                    let items = value.as_array().cloned().unwrap_or_default();
                    let records = items
                        .iter()
                        .map(|item| DynamicRecord::from_document(child_kind, item, validate))
                        .collect::<Result<Vec<_>, _>>()?;
                    record.insert(spec.name, DocumentValue::Records(records));
                }
                FieldType::Child(child_kind) => {
                    if value.is_null() {
                        continue;
                    }
                    let child = DynamicRecord::from_document(child_kind, value, validate)?;
                    record.insert(spec.name, DocumentValue::Record(child));
                }
                _ => {
                    let value = spec.normalize(value.clone());
                    if validate {
                        spec.validate(&value)?;
                    }
                    record.insert(spec.name, DocumentValue::Json(value));
                }
            }
        }
        if !components.is_empty() {
            let mut shapes = components
                .iter()
                .map(|c| DynamicRecord::from_document(Kind::Shape, c, validate))
                .collect::<Result<Vec<_>, _>>()?;
            record.records_mut("shapes").append(&mut shapes);
        }
        if validate {
            for spec in kind.fields().iter().filter(|f| f.required) {
                if !record.contains_key(spec.name) {
                    return Err(ContextError::RequiredNone {
                        field: spec.name.to_string(),
                    });
                }
            }
        }
        Ok(Rc::new(RefCell::new(record)))
    }
}

/// Node documents may be compact `[x, y, type]` / `[x, y, type, extra]`
/// arrays or full objects.
fn expand_node(document: &Value, validate: bool) -> Result<Value, ContextError> {
    let Some(items) = document.as_array() else {
        return Ok(document.clone());
    };
    if validate && !(3..=4).contains(&items.len()) {
        return Err(ContextError::BadNode(document.to_string()));
    }
    let mut map = Map::new();
    for (ix, key) in ["x", "y", "type", USER_DATA].iter().enumerate() {
        if let Some(item) = items.get(ix) {
            map.insert(key.to_string(), item.clone());
        }
    }
    Ok(Value::Object(map))
}

/// Tolerant inflation of a raw child list: malformed items are logged and
/// dropped rather than failing a read that cannot report errors.
pub(crate) fn inflate_list(kind: Kind, raw: &Value) -> Vec<RecordRef> {
    let Some(items) = raw.as_array() else {
        log::warn!("Expected a list of {:?} records, got {}", kind, raw);
        return vec![];
    };
    items
        .iter()
        .filter_map(|item| inflate_one(kind, item))
        .collect()
}

pub(crate) fn inflate_one(kind: Kind, raw: &Value) -> Option<RecordRef> {
    match DynamicRecord::from_document(kind, raw, false) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Dropping malformed {:?} record: {}", kind, e);
            None
        }
    }
}

/// Returns the records of a child-list field, inflating raw JSON in place
/// the first time. An absent field yields an empty list and is left absent.
pub(crate) fn children(record: &RecordRef, key: &str) -> Vec<RecordRef> {
    let mut rec = record.borrow_mut();
    match rec.get(key) {
        None => vec![],
        Some(DocumentValue::Records(list)) => list.clone(),
        Some(_) => rec.records_mut(key).clone(),
    }
}

/// Returns the record of a single-child field, inflating raw JSON in place.
pub(crate) fn child(record: &RecordRef, key: &str) -> Option<RecordRef> {
    let mut rec = record.borrow_mut();
    let kind = rec.child_kind(key)?;
    match rec.get(key) {
        Some(DocumentValue::Record(r)) => Some(r.clone()),
        Some(DocumentValue::Json(raw)) => {
            let inflated = inflate_one(kind, raw)?;
            rec.insert(key, DocumentValue::Record(inflated.clone()));
            Some(inflated)
        }
        _ => None,
    }
}
